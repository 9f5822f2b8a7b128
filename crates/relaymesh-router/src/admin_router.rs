//! Admin operation dispatch.
//!
//! Admin traffic is structured ok/body frames, never raw HTTP errors: a
//! validation failure names the offending field so tooling can render it,
//! and an unknown op is an error body, not a 404. Field validation is the
//! boundary's job; the library types below this layer assume clean input.

use crate::block_list::WILDCARD;
use crate::router::RelayRouter;
use relaymesh_common::{AdminRequest, AdminResponse, RelayError};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

/// Routes admin operations by name to the routing core.
pub struct AdminRouter {
    router: Arc<RelayRouter>,
}

impl AdminRouter {
    pub fn new(router: Arc<RelayRouter>) -> Self {
        AdminRouter { router }
    }

    /// Handles one admin request. Always produces a response frame; errors
    /// are carried in the body.
    pub async fn handle(&self, request: AdminRequest) -> AdminResponse {
        // Non-object params (including null) read as "no parameters given";
        // the per-op field checks produce the precise error.
        let params = request.params.as_object().cloned().unwrap_or_default();
        match request.op.as_str() {
            "kill_switch" => self.kill_switch(&params).await,
            "exit_hosts" => self.exit_hosts(&params).await,
            "service_connections" => self.service_connections(&params).await,
            "get_k" => self.get_k(&params).await,
            "set_k" => self.set_k(&params).await,
            "fanout_set_k" => self.fanout_set_k(&params).await,
            "_info" => self.info().await,
            other => AdminResponse::from_error(&RelayError::validation(
                "op",
                format!("unknown admin op: {other}"),
            )),
        }
    }

    async fn kill_switch(&self, params: &Map<String, Value>) -> AdminResponse {
        let kind = match required_str(params, "type") {
            Ok(kind) => kind,
            Err(e) => return AdminResponse::from_error(&e),
        };

        match kind {
            "query" => {
                let blockings: Vec<String> = self
                    .router
                    .block_list()
                    .snapshot()
                    .await
                    .iter()
                    .map(|entry| entry.to_string())
                    .collect();
                AdminResponse::success(json!({ "blockings": blockings }))
            }
            "block" | "unblock" => {
                let caller = match required_str(params, "caller") {
                    Ok(caller) => caller,
                    Err(e) => return AdminResponse::from_error(&e),
                };
                let service = match required_str(params, "service") {
                    Ok(service) => service,
                    Err(e) => return AdminResponse::from_error(&e),
                };
                if let Err(e) = validate_block_side("caller", caller) {
                    return AdminResponse::from_error(&e);
                }
                if let Err(e) = validate_block_side("service", service) {
                    return AdminResponse::from_error(&e);
                }

                if kind == "block" {
                    let added = self.router.block_list().block(caller, service).await;
                    info!(caller, service, added, "kill switch engaged");
                    AdminResponse::success(json!({
                        "blocked": format!("{caller} ==> {service}"),
                        "added": added,
                    }))
                } else {
                    let removed = self.router.block_list().unblock(caller, service).await;
                    info!(caller, service, removed, "kill switch released");
                    if removed {
                        AdminResponse::success(json!({
                            "unblocked": format!("{caller} ==> {service}"),
                        }))
                    } else {
                        AdminResponse::failure(json!({
                            "type": "not-found",
                            "message": format!("no block entry for {caller} ==> {service}"),
                        }))
                    }
                }
            }
            other => AdminResponse::from_error(&RelayError::validation(
                "type",
                format!("expected block, unblock or query, got: {other}"),
            )),
        }
    }

    async fn exit_hosts(&self, params: &Map<String, Value>) -> AdminResponse {
        let service = match required_service_name(params) {
            Ok(service) => service,
            Err(e) => return AdminResponse::from_error(&e),
        };
        match self.router.egress().exits_for(service).await {
            Ok(assignment) => AdminResponse::success(json!({
                "service": service,
                "exit_hosts": assignment.nodes(),
            })),
            Err(e) => AdminResponse::from_error(&e),
        }
    }

    async fn service_connections(&self, params: &Map<String, Value>) -> AdminResponse {
        let service = match required_service_name(params) {
            Ok(service) => service,
            Err(e) => return AdminResponse::from_error(&e),
        };
        match self.router.service_connections(service).await {
            Ok(results) => {
                let mut per_host = Map::new();
                for (host, result) in results {
                    let value = match result {
                        Ok(body) => body,
                        Err(e) => json!({ "error": e.to_string() }),
                    };
                    per_host.insert(host, value);
                }
                AdminResponse::success(json!({
                    "service": service,
                    "connections": Value::Object(per_host),
                }))
            }
            Err(e) => AdminResponse::from_error(&e),
        }
    }

    async fn get_k(&self, params: &Map<String, Value>) -> AdminResponse {
        let service = match required_service_name(params) {
            Ok(service) => service,
            Err(e) => return AdminResponse::from_error(&e),
        };
        let k = self.router.egress().k_for(service).await;
        AdminResponse::success(json!({ "service": service, "k": k }))
    }

    async fn set_k(&self, params: &Map<String, Value>) -> AdminResponse {
        let (service, k) = match required_service_and_k(params) {
            Ok(parsed) => parsed,
            Err(e) => return AdminResponse::from_error(&e),
        };
        self.router.egress().set_k_for(service, k).await;
        info!(service, k, "k value updated");
        AdminResponse::success(json!({ "service": service, "k": k }))
    }

    async fn fanout_set_k(&self, params: &Map<String, Value>) -> AdminResponse {
        let (service, k) = match required_service_and_k(params) {
            Ok(parsed) => parsed,
            Err(e) => return AdminResponse::from_error(&e),
        };
        let results = self.router.fanout_set_k(service, k).await;
        let mut per_member = Map::new();
        for (member, result) in results {
            let value = match result {
                Ok(()) => json!({ "ok": true }),
                Err(e) => json!({ "ok": false, "error": e.to_string() }),
            };
            per_member.insert(member, value);
        }
        info!(service, k, "k value fanned out");
        AdminResponse::success(json!({
            "service": service,
            "k": k,
            "members": Value::Object(per_member),
        }))
    }

    async fn info(&self) -> AdminResponse {
        let metrics = self.router.metrics().snapshot();
        AdminResponse::success(json!({
            "whoami": self.router.ring().whoami(),
            "members": self.router.ring().members(),
            "block_entries": self.router.block_list().len().await,
            "metrics": metrics,
        }))
    }
}

fn required_str<'a>(
    params: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, RelayError> {
    match params.get(field).and_then(Value::as_str) {
        Some(value) if !value.is_empty() => Ok(value),
        Some(_) => Err(RelayError::validation(field, "must not be empty")),
        None => Err(RelayError::validation(field, "missing required string")),
    }
}

fn required_service_name(params: &Map<String, Value>) -> Result<&str, RelayError> {
    let service = required_str(params, "service")?;
    if !is_valid_service_name(service) {
        return Err(RelayError::validation(
            "service",
            format!("invalid service name: {service}"),
        ));
    }
    Ok(service)
}

fn required_service_and_k(params: &Map<String, Value>) -> Result<(&str, usize), RelayError> {
    let service = required_service_name(params)?;
    let k = params
        .get("k")
        .and_then(Value::as_u64)
        .ok_or_else(|| RelayError::validation("k", "missing required integer"))?;
    if k < 1 {
        return Err(RelayError::validation("k", "must be at least 1"));
    }
    Ok((service, k as usize))
}

/// A block side is either the wildcard or a plain service identifier.
fn validate_block_side(field: &'static str, value: &str) -> Result<(), RelayError> {
    if value == WILDCARD || is_valid_service_name(value) {
        Ok(())
    } else {
        Err(RelayError::validation(
            field,
            format!("expected a service name or {WILDCARD}, got: {value}"),
        ))
    }
}

/// Service names are limited to ASCII alphanumerics, dashes and underscores.
fn is_valid_service_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_validation() {
        assert!(is_valid_service_name("steve"));
        assert!(is_valid_service_name("steve-v2_canary"));
        assert!(!is_valid_service_name(""));
        assert!(!is_valid_service_name("steve mary"));
        assert!(!is_valid_service_name("steve~0"));
        assert!(!is_valid_service_name("a/b"));
    }

    #[test]
    fn test_block_side_accepts_wildcard() {
        assert!(validate_block_side("caller", "*").is_ok());
        assert!(validate_block_side("caller", "alice").is_ok());
        assert!(validate_block_side("caller", "a b").is_err());
    }

    #[test]
    fn test_required_str_rejects_empty_and_missing() {
        let mut params = Map::new();
        assert!(required_str(&params, "service").is_err());
        params.insert("service".to_string(), json!(""));
        assert!(required_str(&params, "service").is_err());
        params.insert("service".to_string(), json!("steve"));
        assert_eq!(required_str(&params, "service").unwrap(), "steve");
    }

    #[test]
    fn test_required_k_bounds() {
        let mut params = Map::new();
        params.insert("service".to_string(), json!("steve"));
        params.insert("k".to_string(), json!(0));
        assert!(required_service_and_k(&params).is_err());
        params.insert("k".to_string(), json!(3));
        assert_eq!(required_service_and_k(&params).unwrap(), ("steve", 3));
    }
}
