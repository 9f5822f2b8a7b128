//! The per-call routing state machine and the fan-out operations.
//!
//! Every relayed call ends in exactly one terminal state:
//!
//! - **Forwarded**: sent to one selected exit peer, response relayed back
//! - **Blocked**: denied by the kill switch; the call is held for its own
//!   timeout so blocked traffic is indistinguishable from a slow network and
//!   callers keep their existing timeout handling
//! - **NoExitNode**: resolution produced an empty exit set
//! - **Failed**: the single forwarding attempt failed; there is no retry
//!   against another replica, because replicas are connection owners for the
//!   same backends and a retry storm multiplies load exactly when the mesh
//!   is degraded

use crate::block_list::BlockList;
use crate::dispatch::{CallDispatch, PeerStore};
use crate::egress::{EgressNodes, ExitAssignment};
use crate::metrics::RouterMetrics;
use crate::ring::Ring;
use crate::score::PreferOutgoing;
use relaymesh_common::collect::collect_parallel;
use relaymesh_common::{CallRequest, CallResponse, RelayError, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Service name the relay uses for its own mesh-internal calls.
pub const MESH_SERVICE: &str = "relaymesh";

/// Timeouts for the router's own outbound operations. Relayed calls carry
/// their own timeout and are not affected by these.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Per-exit-node budget for advertisement propagation.
    pub relay_ad_timeout: Duration,
    /// Budget for connectivity introspection fan-outs.
    pub introspect_timeout: Duration,
    /// Per-member budget for k-value propagation.
    pub set_k_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            relay_ad_timeout: Duration::from_millis(500),
            introspect_timeout: Duration::from_secs(5),
            set_k_timeout: Duration::from_secs(2),
        }
    }
}

/// Terminal state of one relayed call.
#[derive(Debug)]
pub enum RouteOutcome {
    /// The call reached an exit peer and this is its response.
    Forwarded(CallResponse),
    /// Denied by the kill switch after being held for the call's timeout.
    Blocked,
    /// Exit-node resolution produced an empty set.
    NoExitNode,
    /// The single forwarding attempt failed.
    Failed(RelayError),
}

impl RouteOutcome {
    pub fn is_forwarded(&self) -> bool {
        matches!(self, RouteOutcome::Forwarded(_))
    }
}

/// One service as announced by a backend instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceAdvertisement {
    pub service_name: String,
    /// Advertised routing cost. Accepted for forward compatibility; the
    /// router does not weight by it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<u32>,
}

/// The payload an entry relay pushes to one exit node: which backend
/// instance is announcing which services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayAdvertisement {
    pub hostport: String,
    pub services: Vec<ServiceAdvertisement>,
}

/// The routing core: kill switch, exit resolution, peer selection, and a
/// single dispatch attempt per call, plus the advertisement and
/// introspection fan-outs.
pub struct RelayRouter {
    block_list: Arc<BlockList>,
    egress: Arc<EgressNodes>,
    dispatch: Arc<dyn CallDispatch>,
    peers: Arc<dyn PeerStore>,
    ring: Arc<dyn Ring>,
    metrics: Arc<RouterMetrics>,
    config: RouterConfig,
    /// Backend instances that advertised each service to this node, valid
    /// only while this node is in the service's exit set.
    advertised: RwLock<HashMap<String, HashSet<String>>>,
}

impl RelayRouter {
    pub fn new(
        block_list: Arc<BlockList>,
        egress: Arc<EgressNodes>,
        dispatch: Arc<dyn CallDispatch>,
        peers: Arc<dyn PeerStore>,
        ring: Arc<dyn Ring>,
        config: RouterConfig,
    ) -> Self {
        RelayRouter {
            block_list,
            egress,
            dispatch,
            peers,
            ring,
            metrics: Arc::new(RouterMetrics::new()),
            config,
            advertised: RwLock::new(HashMap::new()),
        }
    }

    pub fn block_list(&self) -> &Arc<BlockList> {
        &self.block_list
    }

    pub fn egress(&self) -> &Arc<EgressNodes> {
        &self.egress
    }

    pub fn ring(&self) -> &Arc<dyn Ring> {
        &self.ring
    }

    pub fn metrics(&self) -> &Arc<RouterMetrics> {
        &self.metrics
    }

    /// Routes one call to completion. See the module docs for the terminal
    /// states.
    pub async fn route(&self, call: &CallRequest) -> RouteOutcome {
        if self.block_list.is_blocked(&call.caller, &call.service).await {
            debug!(
                caller = %call.caller,
                service = %call.service,
                "call denied by kill switch, holding for its timeout"
            );
            // Hold rather than reject: a reject frame would teach callers to
            // retry immediately against a service that is switched off.
            tokio::time::sleep(call.timeout()).await;
            self.metrics.record_blocked();
            return RouteOutcome::Blocked;
        }

        let assignment = match self.egress.exits_for(&call.service).await {
            Ok(assignment) => assignment,
            Err(e) => {
                warn!(service = %call.service, error = %e, "exit resolution failed");
                self.metrics.record_failed();
                return RouteOutcome::Failed(e);
            }
        };

        if assignment.is_empty() {
            self.metrics.record_no_exit_nodes();
            return RouteOutcome::NoExitNode;
        }

        // One deadline covers selection and dispatch together, so a slow
        // connection open can never stretch the call past its own timeout.
        let deadline = tokio::time::Instant::now() + call.timeout();

        let exit = match self
            .select_exit_peer(&assignment, deadline, call.timeout_ms)
            .await
        {
            Ok(hostport) => hostport,
            Err(e) => {
                warn!(service = %call.service, error = %e, "no usable exit peer");
                self.metrics.record_failed();
                return RouteOutcome::Failed(e);
            }
        };

        debug!(
            caller = %call.caller,
            service = %call.service,
            method = %call.method,
            exit = %exit,
            "forwarding call"
        );

        // Exactly one attempt. A failure here is terminal, never a cue to
        // try the next replica.
        match tokio::time::timeout_at(deadline, self.dispatch.send(&exit, call)).await {
            Ok(Ok(response)) => {
                self.metrics.record_forwarded();
                RouteOutcome::Forwarded(response)
            }
            Ok(Err(e)) => {
                warn!(service = %call.service, exit = %exit, error = %e, "forward failed");
                self.metrics.record_failed();
                RouteOutcome::Failed(e)
            }
            Err(_) => {
                self.metrics.record_failed();
                RouteOutcome::Failed(RelayError::Timeout(call.timeout_ms))
            }
        }
    }

    /// Picks the best-scored known peer across the exit set. When no peer is
    /// known at all, opens a fresh connection to the first exit node within
    /// the call's remaining budget.
    async fn select_exit_peer(
        &self,
        assignment: &ExitAssignment,
        deadline: tokio::time::Instant,
        timeout_ms: u64,
    ) -> Result<String> {
        let scorers: Vec<PreferOutgoing> = assignment
            .nodes()
            .iter()
            .flat_map(|node| self.peers.peers_for(node))
            .map(PreferOutgoing::new)
            .collect();

        for scorer in &scorers {
            scorer.maybe_reconnect();
        }

        let best = scorers
            .iter()
            .map(|scorer| (scorer.score(), scorer))
            .max_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, scorer)| scorer.peer().hostport().to_string());

        if let Some(hostport) = best {
            return Ok(hostport);
        }

        // Nothing known yet toward any exit node; connect on demand.
        let first = assignment.nodes().into_iter().next().ok_or_else(|| {
            RelayError::NoExitNodes("exit set drained during selection".to_string())
        })?;
        let peer = tokio::time::timeout_at(deadline, self.peers.open(&first))
            .await
            .map_err(|_| RelayError::Timeout(timeout_ms))??;
        Ok(peer.hostport().to_string())
    }

    /// Handles a backend instance announcing its services at this entry
    /// node: resolves each service's exit set, groups services by exit node,
    /// and pushes one relay advertisement per exit node in parallel.
    ///
    /// A dead exit node never fails the advertisement; the instance is still
    /// registered everywhere else. Returns per-service counts of exit nodes
    /// that acknowledged.
    pub async fn advertise(
        &self,
        hostport: &str,
        services: Vec<ServiceAdvertisement>,
    ) -> Result<Vec<(String, usize)>> {
        let mut by_exit: Vec<(String, Vec<ServiceAdvertisement>)> = Vec::new();
        for service in &services {
            let assignment = self.egress.exits_for(&service.service_name).await?;
            for node in assignment.nodes() {
                match by_exit.iter_mut().find(|(n, _)| *n == node) {
                    Some((_, list)) => list.push(service.clone()),
                    None => by_exit.push((node, vec![service.clone()])),
                }
            }
        }

        let dispatch = Arc::clone(&self.dispatch);
        let ad_timeout = self.config.relay_ad_timeout;
        let results = collect_parallel(by_exit, |node_services, node: String| {
            let dispatch = Arc::clone(&dispatch);
            let ad = RelayAdvertisement {
                hostport: hostport.to_string(),
                services: node_services,
            };
            async move {
                let call =
                    CallRequest::new(MESH_SERVICE, MESH_SERVICE, "relay_advertise", serde_json::to_value(&ad)?)
                        .with_timeout(ad_timeout.as_millis() as u64);
                match tokio::time::timeout(ad_timeout, dispatch.send(&node, &call)).await {
                    Ok(result) => result,
                    Err(_) => Err(RelayError::Timeout(ad_timeout.as_millis() as u64)),
                }
            }
        })
        .await;

        let mut acked_exits: HashSet<String> = HashSet::new();
        for (node, result) in &results {
            match result {
                Ok(response) if response.ok => {
                    acked_exits.insert(node.clone());
                }
                Ok(response) => {
                    warn!(exit = %node, body = %response.body, "exit declined advertisement");
                }
                Err(e) => {
                    warn!(exit = %node, error = %e, "advertisement push failed");
                }
            }
        }

        let mut counts = Vec::with_capacity(services.len());
        for service in &services {
            let assignment = self.egress.exits_for(&service.service_name).await?;
            let count = assignment
                .nodes()
                .iter()
                .filter(|node| acked_exits.contains(*node))
                .count();
            counts.push((service.service_name.clone(), count));
        }
        Ok(counts)
    }

    /// Handles a relay advertisement arriving at this node as an exit.
    ///
    /// Services this node does not actually own are logged and skipped; a
    /// stale sender's view of the ring must not pollute the instance table.
    pub async fn handle_relay_advertise(&self, ad: RelayAdvertisement) -> Result<usize> {
        let local = self.ring.whoami();
        let mut accepted = 0;
        for service in &ad.services {
            let assignment = self.egress.exits_for(&service.service_name).await?;
            if !assignment.contains(&local) {
                warn!(
                    service = %service.service_name,
                    instance = %ad.hostport,
                    "advertisement for a service this node is not an exit for"
                );
                continue;
            }
            self.advertised
                .write()
                .await
                .entry(service.service_name.clone())
                .or_default()
                .insert(ad.hostport.clone());
            accepted += 1;
        }
        Ok(accepted)
    }

    /// How many backend instances have advertised `service` to this node.
    pub async fn exit_connections(&self, service: &str) -> usize {
        self.advertised
            .read()
            .await
            .get(service)
            .map(|instances| instances.len())
            .unwrap_or(0)
    }

    /// Asks every exit node for `service` how many backend instances it
    /// knows, in parallel. Per-host failures come back per host.
    pub async fn service_connections(
        &self,
        service: &str,
    ) -> Result<Vec<(String, Result<serde_json::Value>)>> {
        let assignment = self.egress.exits_for(service).await?;
        if assignment.is_empty() {
            return Err(RelayError::NoExitNodes(service.to_string()));
        }

        let dispatch = Arc::clone(&self.dispatch);
        let timeout = self.config.introspect_timeout;
        let service_name = service.to_string();
        let targets: Vec<(String, ())> = assignment
            .nodes()
            .into_iter()
            .map(|node| (node, ()))
            .collect();

        let results = collect_parallel(targets, |_unit, node: String| {
            let dispatch = Arc::clone(&dispatch);
            let service = service_name.clone();
            async move {
                let call = CallRequest::new(
                    MESH_SERVICE,
                    MESH_SERVICE,
                    "exit_connections",
                    json!({ "service": service }),
                )
                .with_timeout(timeout.as_millis() as u64);
                let response = match tokio::time::timeout(timeout, dispatch.send(&node, &call))
                    .await
                {
                    Ok(result) => result?,
                    Err(_) => return Err(RelayError::Timeout(timeout.as_millis() as u64)),
                };
                Ok(response.body)
            }
        })
        .await;

        Ok(results)
    }

    /// Propagates a new k value for `service` to every ring member in
    /// parallel, local node included. Per-member failures come back per
    /// member.
    pub async fn fanout_set_k(
        &self,
        service: &str,
        k: usize,
    ) -> Vec<(String, Result<()>)> {
        let dispatch = Arc::clone(&self.dispatch);
        let timeout = self.config.set_k_timeout;
        let service_name = service.to_string();
        let targets: Vec<(String, ())> = self
            .ring
            .members()
            .into_iter()
            .map(|member| (member, ()))
            .collect();

        collect_parallel(targets, |_unit, member: String| {
            let dispatch = Arc::clone(&dispatch);
            let service = service_name.clone();
            async move {
                let call = CallRequest::new(
                    MESH_SERVICE,
                    MESH_SERVICE,
                    "set_k",
                    json!({ "service": service, "k": k }),
                )
                .with_timeout(timeout.as_millis() as u64);
                let response = match tokio::time::timeout(timeout, dispatch.send(&member, &call))
                    .await
                {
                    Ok(result) => result?,
                    Err(_) => return Err(RelayError::Timeout(timeout.as_millis() as u64)),
                };
                if response.ok {
                    Ok(())
                } else {
                    Err(RelayError::Declined {
                        service,
                        message: response.body.to_string(),
                    })
                }
            }
        })
        .await
    }
}
