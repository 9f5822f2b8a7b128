//! Membership ring collaborator.
//!
//! The gossip/membership protocol that builds the ring is out of scope; the
//! routing core only needs deterministic key-to-node lookup plus the local
//! identity and the member list for fan-outs.

use relaymesh_common::Result;
use rustc_hash::FxHasher;
use std::hash::Hasher;

/// Key-to-node lookup over the current membership.
///
/// `lookup` is synchronous and deterministic for a fixed membership. A known
/// rough edge of the underlying ring implementations is preserved here rather
/// than papered over: `lookup` MAY return the local node's own identity even
/// when it logically should report "no node found". Callers that care about
/// self-exit must compare the result against `whoami()`.
pub trait Ring: Send + Sync {
    /// Maps a shard key to the identity (hostport) of the owning node.
    fn lookup(&self, key: &str) -> Result<String>;

    /// The local node's own identity.
    fn whoami(&self) -> String;

    /// All current members, local node included.
    fn members(&self) -> Vec<String>;
}

/// A fixed-membership ring using rendezvous (highest-random-weight) hashing.
///
/// Deterministic for a given member list, which makes it suitable for
/// embedding behind a static host file and for tests. It reproduces the
/// documented ring quirk: with no members configured, `lookup` falls back to
/// the local identity instead of reporting a miss.
pub struct StaticRing {
    local: String,
    members: Vec<String>,
}

impl StaticRing {
    /// Creates a ring over `members`. The local identity is added to the
    /// membership if it is not already present.
    pub fn new(local: impl Into<String>, members: Vec<String>) -> Self {
        let local = local.into();
        let mut members = members;
        if !members.contains(&local) {
            members.push(local.clone());
        }
        StaticRing { local, members }
    }

    /// A ring whose membership is only the local node.
    pub fn solo(local: impl Into<String>) -> Self {
        StaticRing::new(local, Vec::new())
    }

    fn weight(member: &str, key: &str) -> u64 {
        let mut hasher = FxHasher::default();
        hasher.write(member.as_bytes());
        hasher.write(b"/");
        hasher.write(key.as_bytes());
        hasher.finish()
    }
}

impl Ring for StaticRing {
    fn lookup(&self, key: &str) -> Result<String> {
        self.members
            .iter()
            .max_by_key(|member| Self::weight(member, key))
            .cloned()
            // The documented fallback: an empty ring answers with the local
            // node instead of a miss.
            .map_or_else(|| Ok(self.local.clone()), Ok)
    }

    fn whoami(&self) -> String {
        self.local.clone()
    }

    fn members(&self) -> Vec<String> {
        self.members.clone()
    }
}
