//! Peer connection scoring.
//!
//! Candidate exit peers are ranked by the quality of their connection to the
//! local node. The ranking prefers identified outgoing connections: an
//! outgoing connection is one the relay opened itself, so it is known-good
//! and addressable, while an incoming-only peer may not even be reachable in
//! the reverse direction.
//!
//! Tiers map onto disjoint score bands, so a peer in a better tier always
//! outranks every peer in a worse tier regardless of the random tie-breaker:
//!
//! - `ReadyOutgoing` scores in `[0.4, 1.0)`
//! - all other tiers score in `[0.1, 0.4)`
//!
//! Within a band the peer's load-weighted random value spreads choices so
//! repeated selections do not pile onto a single peer.

use crate::dispatch::{Direction, Peer};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Connection-quality tier of a peer, worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    /// No usable connection in either direction.
    Unconnected = 0,
    /// Only an inbound connection exists; the peer may not be addressable.
    OnlyIncoming = 1,
    /// An outgoing connection exists but has not finished identification.
    FreshOutgoing = 2,
    /// An identified outgoing connection, ready to carry calls.
    ReadyOutgoing = 3,
}

impl Tier {
    fn from_u8(raw: u8) -> Tier {
        match raw {
            1 => Tier::OnlyIncoming,
            2 => Tier::FreshOutgoing,
            3 => Tier::ReadyOutgoing,
            _ => Tier::Unconnected,
        }
    }
}

/// Scores one peer by preferring identified outgoing connections.
///
/// Tier derivation ([`PreferOutgoing::tier`]) and scoring
/// ([`PreferOutgoing::score`]) are pure; the reconnect side effect lives in
/// [`PreferOutgoing::maybe_reconnect`] so callers decide when it fires. The
/// router calls `maybe_reconnect` once per selection pass, then `score`.
pub struct PreferOutgoing {
    peer: Arc<dyn Peer>,
    last_tier: AtomicU8,
}

impl PreferOutgoing {
    pub fn new(peer: Arc<dyn Peer>) -> Self {
        let tier = derive_tier(peer.as_ref());
        PreferOutgoing {
            peer,
            last_tier: AtomicU8::new(tier as u8),
        }
    }

    pub fn peer(&self) -> &Arc<dyn Peer> {
        &self.peer
    }

    /// The peer's current connection tier.
    pub fn tier(&self) -> Tier {
        let tier = derive_tier(self.peer.as_ref());
        self.last_tier.store(tier as u8, Ordering::Relaxed);
        tier
    }

    /// The tier observed by the most recent `tier`/`score` call.
    pub fn last_tier(&self) -> Tier {
        Tier::from_u8(self.last_tier.load(Ordering::Relaxed))
    }

    /// Kicks off an identified outbound connection when the peer is stuck at
    /// `OnlyIncoming`, so an addressable connection exists by the time the
    /// peer is scored again. No-op once the transport is shut down.
    pub fn maybe_reconnect(&self) {
        if derive_tier(self.peer.as_ref()) == Tier::OnlyIncoming && !self.peer.is_shutdown() {
            self.peer.connect(true);
        }
    }

    /// Scores the peer into its tier's band using the peer's load-weighted
    /// random value as the in-band position.
    pub fn score(&self) -> f64 {
        let tier = self.tier();
        let random = self.peer.weighted_random();
        match tier {
            Tier::ReadyOutgoing => 0.4 + random * 0.6,
            _ => 0.1 + random * 0.3,
        }
    }
}

fn derive_tier(peer: &dyn Peer) -> Tier {
    // Rule order matters: an outbound connection object whose direction is
    // not actually outbound counts as OnlyIncoming, not Unconnected, so the
    // reconnect kick still fires for it.
    if !peer.has_inbound() && !peer.has_outbound() {
        Tier::Unconnected
    } else if !peer.has_outbound() || peer.outbound_direction() != Direction::Outbound {
        Tier::OnlyIncoming
    } else if !peer.outbound_identified() {
        Tier::FreshOutgoing
    } else {
        Tier::ReadyOutgoing
    }
}
