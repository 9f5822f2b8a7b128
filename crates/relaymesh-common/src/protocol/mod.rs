pub mod admin;
pub mod call;
pub mod error;

pub use admin::{AdminRequest, AdminResponse};
pub use call::{CallHeaders, CallRequest, CallResponse};
pub use error::{RelayError, Result};
