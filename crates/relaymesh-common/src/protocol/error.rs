use thiserror::Error;

/// Error taxonomy for the relay core.
///
/// The variants fall into four families that callers are expected to tell
/// apart:
///
/// - **Validation** - malformed administrative/query input, handled at the
///   boundary and never reaching the routing core
/// - **NoExitNodes** - a service resolved to zero exit nodes
/// - **Transport / Timeout / Io** - network-layer failures while forwarding,
///   propagated to the original caller's error channel
/// - **Ring** - the ring-lookup collaborator failed; resolver failures
///   propagate synchronously with no internal retry
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("could not find any exit nodes for service: {0}")]
    NoExitNodes(String),

    #[error("ring lookup failed: {0}")]
    Ring(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timeout after {0}ms")]
    Timeout(u64),

    #[error("call declined by {service}: {message}")]
    Declined { service: String, message: String },

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Shorthand for a validation error naming the offending field.
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        RelayError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Stable tag for the error family, used in structured failure bodies so
    /// callers can distinguish validation, not-found, and transport causes.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Validation { .. } => "validation",
            RelayError::NoExitNodes(_) => "no-exit-nodes",
            RelayError::Ring(_) => "ring",
            RelayError::Transport(_) => "transport",
            RelayError::Timeout(_) => "timeout",
            RelayError::Declined { .. } => "declined",
            RelayError::JsonSerialization(_) => "serialization",
            RelayError::Io(_) => "io",
        }
    }

    /// True for network-layer failures (as opposed to application-level
    /// rejection or bad input).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RelayError::Transport(_) | RelayError::Timeout(_) | RelayError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
