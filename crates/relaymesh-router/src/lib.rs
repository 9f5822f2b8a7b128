//! relaymesh Routing Core
//!
//! This crate composes the four pieces that make the relay a relay:
//!
//! 1. **Exit-node resolution** ([`egress`]): shard a service name across the
//!    membership ring with a per-service replication factor
//! 2. **Peer scoring** ([`score`]): rank candidate peer connections by
//!    connection quality, preferring identified outgoing connections
//! 3. **Kill switch** ([`block_list`]): administratively deny caller/service
//!    pairs on the hot path
//! 4. **Routing** ([`router`]): the per-call state machine tying the above to
//!    the transport, plus the fan-out operations built on
//!    `relaymesh_common::collect`
//!
//! The membership ring, the peer/connection lifecycle, and the wire transport
//! are collaborators behind the traits in [`ring`] and [`dispatch`]; this
//! crate ships a static rendezvous-hash ring and an HTTP dispatch adapter so
//! the binary and the tests can stand alone, but production embedders supply
//! their own.
//!
//! The admin surface ([`admin_router`], [`http_server`]) exposes the kill
//! switch, exit-host resolution, k-value management, and connectivity
//! introspection as structured ok/body operations over HTTP.

pub mod admin_router;
pub mod block_list;
pub mod dispatch;
pub mod egress;
pub mod http_server;
pub mod metrics;
pub mod ring;
pub mod router;
pub mod score;

pub use admin_router::AdminRouter;
pub use block_list::{BlockEntry, BlockList, WILDCARD};
pub use dispatch::{CallDispatch, Direction, HttpDispatch, Peer, PeerStore, StaticPeerStore};
pub use egress::{EgressNodes, ExitAssignment, DEFAULT_K, SHARD_KEY_SEPARATOR};
pub use http_server::HttpServer;
pub use metrics::{MetricsSnapshot, RouterMetrics};
pub use ring::{Ring, StaticRing};
pub use router::{
    RelayAdvertisement, RelayRouter, RouteOutcome, RouterConfig, ServiceAdvertisement,
};
pub use score::{PreferOutgoing, Tier};
