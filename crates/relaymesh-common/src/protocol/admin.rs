//! Administrative envelope.
//!
//! Every administrative operation returns a structured ok/body result, even on
//! failure; the admin surface never surfaces an unhandled crash. Failure
//! bodies carry a stable `type` tag plus the offending field where one exists,
//! so tooling can distinguish validation, not-found, and transport causes.

use crate::protocol::error::RelayError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// An administrative request: an operation name plus JSON parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminRequest {
    /// Operation name, e.g. `kill_switch`, `exit_hosts`, `set_k`.
    pub op: String,
    /// Operation parameters; `null` when the operation takes none.
    #[serde(default)]
    pub params: Value,
}

impl AdminRequest {
    pub fn new(op: impl Into<String>, params: Value) -> Self {
        AdminRequest {
            op: op.into(),
            params,
        }
    }
}

/// The structured result of an administrative operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminResponse {
    pub ok: bool,
    pub body: Value,
}

impl AdminResponse {
    pub fn success(body: Value) -> Self {
        AdminResponse { ok: true, body }
    }

    pub fn failure(body: Value) -> Self {
        AdminResponse { ok: false, body }
    }

    /// Converts a [`RelayError`] into a failure response with the error's
    /// kind tag and, for validation errors, the offending field.
    pub fn from_error(err: &RelayError) -> Self {
        let body = match err {
            RelayError::Validation { field, reason } => json!({
                "type": err.kind(),
                "field": field,
                "message": reason,
            }),
            other => json!({
                "type": other.kind(),
                "message": other.to_string(),
            }),
        };
        AdminResponse::failure(body)
    }
}
