//! Traffic kill switch.
//!
//! Operators block traffic per caller/service pair. Either side may be the
//! wildcard `*`, so one entry can silence everything a caller sends or
//! everything addressed to a service. Membership checks sit on the hot path
//! of every relayed call, so the table is a flat set of joined keys behind a
//! read-mostly lock.

use std::collections::HashSet;
use std::fmt;
use tokio::sync::RwLock;

/// Matches any caller or any service in a block entry.
pub const WILDCARD: &str = "*";

const KEY_SEPARATOR: &str = "~~";

/// One caller/service block rule, as rendered to operators.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockEntry {
    pub caller: String,
    pub service: String,
}

impl fmt::Display for BlockEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ==> {}", self.caller, self.service)
    }
}

/// The set of blocked caller/service pairs.
#[derive(Debug, Default)]
pub struct BlockList {
    entries: RwLock<HashSet<String>>,
}

impl BlockList {
    pub fn new() -> Self {
        BlockList::default()
    }

    fn key(caller: &str, service: &str) -> String {
        format!("{caller}{KEY_SEPARATOR}{service}")
    }

    /// Adds a block rule. Returns false when the rule was already present.
    pub async fn block(&self, caller: &str, service: &str) -> bool {
        self.entries.write().await.insert(Self::key(caller, service))
    }

    /// Removes a block rule. Returns false when no such rule existed.
    pub async fn unblock(&self, caller: &str, service: &str) -> bool {
        self.entries.write().await.remove(&Self::key(caller, service))
    }

    /// Whether a call from `caller` to `service` is blocked, by exact pair
    /// or by a wildcard on either side.
    pub async fn is_blocked(&self, caller: &str, service: &str) -> bool {
        let entries = self.entries.read().await;
        entries.contains(&Self::key(caller, service))
            || entries.contains(&Self::key(WILDCARD, service))
            || entries.contains(&Self::key(caller, WILDCARD))
    }

    /// Current rules, sorted for stable operator output.
    pub async fn snapshot(&self) -> Vec<BlockEntry> {
        let mut rules: Vec<BlockEntry> = self
            .entries
            .read()
            .await
            .iter()
            .filter_map(|key| {
                key.split_once(KEY_SEPARATOR).map(|(caller, service)| BlockEntry {
                    caller: caller.to_string(),
                    service: service.to_string(),
                })
            })
            .collect();
        rules.sort();
        rules
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
