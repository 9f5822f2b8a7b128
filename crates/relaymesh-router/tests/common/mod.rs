//! Shared test doubles for the routing core.
#![allow(dead_code)]

use async_trait::async_trait;
use relaymesh_common::{CallRequest, CallResponse, RelayError, Result};
use relaymesh_router::{CallDispatch, Direction, Peer, PeerStore, Ring};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a mock dispatch target answers with.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(Value),
    NotOk(Value),
    TransportError(String),
    /// Sleep this long, then answer Ok with a null body.
    Delay(Duration),
}

/// Records every outbound call and answers per configured host.
pub struct MockDispatch {
    calls: Mutex<Vec<(String, CallRequest)>>,
    per_host: HashMap<String, Reply>,
    default: Reply,
}

impl MockDispatch {
    pub fn answering(default: Reply) -> Self {
        MockDispatch {
            calls: Mutex::new(Vec::new()),
            per_host: HashMap::new(),
            default,
        }
    }

    pub fn with_host(mut self, host: &str, reply: Reply) -> Self {
        self.per_host.insert(host.to_string(), reply);
        self
    }

    pub fn calls(&self) -> Vec<(String, CallRequest)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CallDispatch for MockDispatch {
    async fn send(&self, hostport: &str, call: &CallRequest) -> Result<CallResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((hostport.to_string(), call.clone()));
        let reply = self.per_host.get(hostport).unwrap_or(&self.default).clone();
        match reply {
            Reply::Ok(body) => Ok(CallResponse::ok(body)),
            Reply::NotOk(body) => Ok(CallResponse::not_ok(body)),
            Reply::TransportError(message) => Err(RelayError::Transport(message)),
            Reply::Delay(duration) => {
                tokio::time::sleep(duration).await;
                Ok(CallResponse::ok(Value::Null))
            }
        }
    }
}

/// A peer with fixed connection state and a deterministic tie-breaker.
pub struct TestPeer {
    hostport: String,
    inbound: bool,
    outbound: bool,
    identified: bool,
    random: f64,
    pub connects: AtomicUsize,
}

impl TestPeer {
    pub fn ready(hostport: &str, random: f64) -> Arc<TestPeer> {
        Arc::new(TestPeer {
            hostport: hostport.to_string(),
            inbound: false,
            outbound: true,
            identified: true,
            random,
            connects: AtomicUsize::new(0),
        })
    }

    pub fn only_incoming(hostport: &str, random: f64) -> Arc<TestPeer> {
        Arc::new(TestPeer {
            hostport: hostport.to_string(),
            inbound: true,
            outbound: false,
            identified: false,
            random,
            connects: AtomicUsize::new(0),
        })
    }
}

impl Peer for TestPeer {
    fn hostport(&self) -> &str {
        &self.hostport
    }

    fn has_inbound(&self) -> bool {
        self.inbound
    }

    fn has_outbound(&self) -> bool {
        self.outbound
    }

    fn outbound_direction(&self) -> Direction {
        Direction::Outbound
    }

    fn outbound_identified(&self) -> bool {
        self.identified
    }

    fn weighted_random(&self) -> f64 {
        self.random
    }

    fn connect(&self, _identified: bool) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    fn is_shutdown(&self) -> bool {
        false
    }
}

/// Peer store with a fixed peer table and configurable open behavior.
pub struct MockPeerStore {
    peers: HashMap<String, Vec<Arc<dyn Peer>>>,
    open_delay: Option<Duration>,
    pub opens: AtomicUsize,
}

impl MockPeerStore {
    pub fn empty() -> Self {
        MockPeerStore {
            peers: HashMap::new(),
            open_delay: None,
            opens: AtomicUsize::new(0),
        }
    }

    pub fn with_peers(mut self, host: &str, peers: Vec<Arc<dyn Peer>>) -> Self {
        self.peers.insert(host.to_string(), peers);
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }
}

#[async_trait]
impl PeerStore for MockPeerStore {
    fn peers_for(&self, hostport: &str) -> Vec<Arc<dyn Peer>> {
        self.peers.get(hostport).cloned().unwrap_or_default()
    }

    async fn open(&self, hostport: &str) -> Result<Arc<dyn Peer>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(TestPeer::ready(hostport, 0.5))
    }
}

/// A ring that assigns shard key `service~i` to `nodes[i % len]`, so tests
/// know exactly which members end up in an exit set.
pub struct RoundRobinRing {
    pub local: String,
    pub nodes: Vec<String>,
}

impl Ring for RoundRobinRing {
    fn lookup(&self, key: &str) -> Result<String> {
        let index: usize = key
            .rsplit_once('~')
            .and_then(|(_, idx)| idx.parse().ok())
            .unwrap_or(0);
        Ok(self.nodes[index % self.nodes.len()].clone())
    }

    fn whoami(&self) -> String {
        self.local.clone()
    }

    fn members(&self) -> Vec<String> {
        self.nodes.clone()
    }
}
