//! Transport collaborators.
//!
//! The routing core never owns connections. It sees the transport through
//! three traits: [`CallDispatch`] sends a typed call to a hostport,
//! [`PeerStore`] enumerates and opens peers toward a hostport, and [`Peer`]
//! answers read-only capability queries about one peer's connection state.
//!
//! [`HttpDispatch`] and [`StaticPeerStore`] are the adapters the standalone
//! binary uses: calls go out as JSON-over-HTTP and every configured peer is
//! modeled as an identified outbound connection. Production embedders plug in
//! their own transport.

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use relaymesh_common::{CallRequest, CallResponse, RelayError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Direction of a connection relative to the local node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Read-only capability queries about one peer.
///
/// Peer objects are owned by the transport layer; the scorer and router only
/// hold references. `connect` is fire-and-forget: it kicks off an async
/// outbound connection attempt and returns immediately.
pub trait Peer: Send + Sync {
    /// The peer's hostport identity.
    fn hostport(&self) -> &str;

    /// Whether an inbound connection from this peer exists.
    fn has_inbound(&self) -> bool;

    /// Whether an outbound connection object toward this peer exists.
    fn has_outbound(&self) -> bool;

    /// Direction of the current outbound connection object. Meaningful only
    /// when `has_outbound` is true.
    fn outbound_direction(&self) -> Direction;

    /// Whether the outbound connection has completed identification.
    fn outbound_identified(&self) -> bool;

    /// Load-weighted random value in `[0, 1)` used as the scoring
    /// tie-breaker.
    fn weighted_random(&self) -> f64;

    /// Kicks off an outbound connection attempt (fire-and-forget).
    fn connect(&self, identified: bool);

    /// Whether the owning transport has been shut down. No reconnects are
    /// triggered once this returns true.
    fn is_shutdown(&self) -> bool;
}

/// Enumerates and opens peers toward a hostport.
#[async_trait]
pub trait PeerStore: Send + Sync {
    /// Currently known peers toward `hostport`. May be empty.
    fn peers_for(&self, hostport: &str) -> Vec<Arc<dyn Peer>>;

    /// Opens a fresh outbound connection toward `hostport`, resolving once
    /// the peer is usable. Callers bound this with the call's own timeout.
    async fn open(&self, hostport: &str) -> Result<Arc<dyn Peer>>;
}

/// Sends a typed call to a destination hostport.
#[async_trait]
pub trait CallDispatch: Send + Sync {
    async fn send(&self, hostport: &str, call: &CallRequest) -> Result<CallResponse>;
}

/// JSON-over-HTTP call dispatch.
///
/// Each call creates its own client request, so concurrent calls to the same
/// host never serialize on a shared connection.
#[derive(Debug, Default, Clone)]
pub struct HttpDispatch;

impl HttpDispatch {
    pub fn new() -> Self {
        HttpDispatch
    }
}

#[async_trait]
impl CallDispatch for HttpDispatch {
    async fn send(&self, hostport: &str, call: &CallRequest) -> Result<CallResponse> {
        let url = format!("http://{}/relay", hostport);
        let body = serde_json::to_vec(call)?;

        let http_request = hyper::Request::builder()
            .method("POST")
            .uri(&url)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| RelayError::Transport(format!("failed to build request: {e}")))?;

        let client = Client::builder(TokioExecutor::new()).build_http();
        let response = client
            .request(http_request)
            .await
            .map_err(|e| RelayError::Transport(format!("HTTP request to {hostport} failed: {e}")))?;

        let body_bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| RelayError::Transport(format!("failed to read response: {e}")))?
            .to_bytes();

        let parsed: CallResponse = serde_json::from_slice(&body_bytes)?;
        Ok(parsed)
    }
}

/// Peer store for the standalone binary: every known hostport is one
/// always-identified outbound peer.
///
/// The full four-tier connection lifecycle only exists in transports that
/// track real connection state; over stateless HTTP every reachable host is
/// `ReadyOutgoing`.
pub struct StaticPeerStore {
    peers: HashMap<String, Arc<dyn Peer>>,
}

impl StaticPeerStore {
    pub fn new(hostports: Vec<String>) -> Self {
        let peers = hostports
            .into_iter()
            .map(|hp| {
                let peer: Arc<dyn Peer> = Arc::new(StaticPeer { hostport: hp.clone() });
                (hp, peer)
            })
            .collect();
        StaticPeerStore { peers }
    }
}

#[async_trait]
impl PeerStore for StaticPeerStore {
    fn peers_for(&self, hostport: &str) -> Vec<Arc<dyn Peer>> {
        self.peers.get(hostport).cloned().into_iter().collect()
    }

    async fn open(&self, hostport: &str) -> Result<Arc<dyn Peer>> {
        // Nothing to open for stateless HTTP; unknown hosts are still
        // addressable.
        Ok(Arc::new(StaticPeer {
            hostport: hostport.to_string(),
        }))
    }
}

struct StaticPeer {
    hostport: String,
}

impl Peer for StaticPeer {
    fn hostport(&self) -> &str {
        &self.hostport
    }

    fn has_inbound(&self) -> bool {
        false
    }

    fn has_outbound(&self) -> bool {
        true
    }

    fn outbound_direction(&self) -> Direction {
        Direction::Outbound
    }

    fn outbound_identified(&self) -> bool {
        true
    }

    fn weighted_random(&self) -> f64 {
        rand::random::<f64>()
    }

    fn connect(&self, _identified: bool) {}

    fn is_shutdown(&self) -> bool {
        false
    }
}
