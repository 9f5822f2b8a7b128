//! Call frames delivered by the transport.
//!
//! The wire framing itself is a black box: the transport hands the router
//! typed [`CallRequest`] frames and expects a [`CallResponse`] back. Bodies
//! are JSON values end to end.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Application headers carried alongside a call.
pub type CallHeaders = HashMap<String, String>;

/// Default per-call timeout when the caller does not supply one.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 5000;

/// An inbound call for a named service.
///
/// # Fields
///
/// - `caller`: identity of the calling service (the kill switch keys on this)
/// - `service`: destination service name
/// - `method`: method/endpoint name on the destination
/// - `headers`: application headers, passed through untouched
/// - `body`: JSON body, passed through untouched
/// - `timeout_ms`: the caller-supplied timeout; the router must not hold
///   per-call resources past it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallRequest {
    pub caller: String,
    pub service: String,
    pub method: String,
    #[serde(default)]
    pub headers: CallHeaders,
    pub body: Value,
    pub timeout_ms: u64,
}

impl CallRequest {
    pub fn new(
        caller: impl Into<String>,
        service: impl Into<String>,
        method: impl Into<String>,
        body: Value,
    ) -> Self {
        CallRequest {
            caller: caller.into(),
            service: service.into(),
            method: method.into(),
            headers: CallHeaders::new(),
            body,
            timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// The call's timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// The response to a call.
///
/// `ok` distinguishes application-level rejection (the destination answered
/// but declined) from success; transport-level failures never produce a
/// `CallResponse` at all, they surface on the call's error channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallResponse {
    pub ok: bool,
    pub body: Value,
}

impl CallResponse {
    /// Creates a successful response.
    pub fn ok(body: Value) -> Self {
        CallResponse { ok: true, body }
    }

    /// Creates an application-level rejection with a structured body.
    pub fn not_ok(body: Value) -> Self {
        CallResponse { ok: false, body }
    }
}
