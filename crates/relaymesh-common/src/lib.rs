//! relaymesh Common Types
//!
//! This crate provides the shared protocol definitions and the fan-out/collect
//! primitive used by the relaymesh routing core.
//!
//! # Overview
//!
//! relaymesh is the routing core of a service-mesh relay: inbound calls for a
//! named service are assigned to a bounded set of exit nodes, forwarded over
//! the best currently-available peer connection, and subject to an
//! administrative kill switch. This crate contains the pieces every component
//! shares:
//!
//! - **Protocol Layer**: call/response frames, the admin envelope, and the
//!   error taxonomy
//! - **Collect Layer**: the parallel fan-out/collect primitive used whenever
//!   the relay addresses multiple peers concurrently
//!
//! # Components
//!
//! - [`protocol`] - Core protocol types (CallRequest, CallResponse, RelayError)
//! - [`collect`] - Concurrent fan-out with per-target outcome aggregation

pub mod collect;
pub mod protocol;

pub use protocol::*;
