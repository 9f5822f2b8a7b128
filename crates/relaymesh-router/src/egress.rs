//! Exit-node resolution.
//!
//! Every service is sharded across the membership ring by looking up `k`
//! shard keys of the form `service~index` for `index` in `0..k`. The set of
//! distinct nodes those keys land on is the service's exit set: the only
//! relays allowed to hold connections to that service's backends.
//!
//! `k` is the per-service replication factor. It defaults to
//! [`DEFAULT_K`] and can be overridden per service at runtime, which is how
//! operators widen the exit set for hot services.

use crate::ring::Ring;
use relaymesh_common::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Separator between the service name and the shard index in a shard key.
pub const SHARD_KEY_SEPARATOR: char = '~';

/// Default per-service replication factor.
pub const DEFAULT_K: usize = 10;

/// Builds the shard key for one replica of a service.
pub fn shard_key(service: &str, index: usize) -> String {
    format!("{service}{SHARD_KEY_SEPARATOR}{index}")
}

/// The resolved exit set for one service.
///
/// Preserves which shard keys landed on which node: several of the `k` keys
/// routinely hash to the same node, and fan-out callers need the key list
/// per node while routing callers only need the distinct node set.
///
/// Entries are ordered by first appearance, so iteration order is the shard
/// key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitAssignment {
    entries: Vec<(String, Vec<String>)>,
}

impl ExitAssignment {
    /// Records that `key` resolved to `node`.
    pub fn push(&mut self, node: String, key: String) {
        match self.entries.iter_mut().find(|(n, _)| *n == node) {
            Some((_, keys)) => keys.push(key),
            None => self.entries.push((node, vec![key])),
        }
    }

    /// Distinct exit nodes, in first-appearance order.
    pub fn nodes(&self) -> Vec<String> {
        self.entries.iter().map(|(node, _)| node.clone()).collect()
    }

    /// Shard keys that resolved to `node`.
    pub fn shard_keys(&self, node: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(n, _)| n == node)
            .map(|(_, keys)| keys.as_slice())
            .unwrap_or(&[])
    }

    pub fn node_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total_shard_keys(&self) -> usize {
        self.entries.iter().map(|(_, keys)| keys.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, node: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == node)
    }

    pub fn entries(&self) -> &[(String, Vec<String>)] {
        &self.entries
    }
}

/// Resolves services to their exit-node sets over a membership ring.
pub struct EgressNodes {
    ring: Arc<dyn Ring>,
    default_k: usize,
    k_overrides: RwLock<HashMap<String, usize>>,
}

impl EgressNodes {
    pub fn new(ring: Arc<dyn Ring>) -> Self {
        EgressNodes::with_default_k(ring, DEFAULT_K)
    }

    pub fn with_default_k(ring: Arc<dyn Ring>, default_k: usize) -> Self {
        EgressNodes {
            ring,
            default_k,
            k_overrides: RwLock::new(HashMap::new()),
        }
    }

    /// The replication factor in effect for `service`.
    pub async fn k_for(&self, service: &str) -> usize {
        self.k_overrides
            .read()
            .await
            .get(service)
            .copied()
            .unwrap_or(self.default_k)
    }

    /// Overrides the replication factor for `service`. Takes effect on the
    /// next resolution; in-flight resolutions keep the k they started with.
    pub async fn set_k_for(&self, service: &str, k: usize) {
        self.k_overrides
            .write()
            .await
            .insert(service.to_string(), k);
    }

    /// Resolves the exit set for `service` by looking up its `k` shard keys.
    ///
    /// The k value is read once at the start, so a concurrent `set_k_for`
    /// never yields a mixed resolution. Any ring lookup error aborts the
    /// whole resolution.
    pub async fn exits_for(&self, service: &str) -> Result<ExitAssignment> {
        let k = self.k_for(service).await;
        let mut assignment = ExitAssignment::default();
        for index in 0..k {
            let key = shard_key(service, index);
            let node = self.ring.lookup(&key)?;
            assignment.push(node, key);
        }
        Ok(assignment)
    }

    /// Whether the local node is in `service`'s exit set.
    pub async fn is_exit_for(&self, service: &str) -> Result<bool> {
        let assignment = self.exits_for(service).await?;
        Ok(assignment.contains(&self.ring.whoami()))
    }
}
