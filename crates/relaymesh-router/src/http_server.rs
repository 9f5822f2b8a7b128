//! HTTP front end.
//!
//! Three surfaces on one listener:
//!
//! - `POST /relay`: call frames, relayed through the routing core. Calls the
//!   relay addresses to itself (the mesh service) are handled in place
//!   instead of being routed again.
//! - `POST /advertise`: backend instances announcing their services at this
//!   entry node.
//! - `POST /admin`: structured admin operations.
//!
//! Plus `GET /__health` for load balancers.

use crate::admin_router::AdminRouter;
use crate::router::{RelayAdvertisement, RelayRouter, RouteOutcome, MESH_SERVICE};
use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use relaymesh_common::{AdminRequest, AdminResponse, CallRequest, CallResponse, Result};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

#[derive(Clone)]
struct AppState {
    router: Arc<RelayRouter>,
    admin: Arc<AdminRouter>,
}

/// The relay's HTTP listener.
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    pub fn new(router: Arc<RelayRouter>) -> Self {
        let admin = Arc::new(AdminRouter::new(Arc::clone(&router)));
        HttpServer {
            state: AppState { router, admin },
        }
    }

    /// Builds the axum router, exposed separately so tests can drive it
    /// without binding a socket.
    pub fn axum_router(&self) -> axum::Router {
        axum::Router::new()
            .route("/relay", post(handle_relay))
            .route("/advertise", post(handle_advertise))
            .route("/admin", post(handle_admin))
            .route("/__health", get(health))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Binds and serves until the process is stopped.
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let app = self.axum_router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "relay listening");
        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn handle_relay(
    State(state): State<AppState>,
    Json(call): Json<CallRequest>,
) -> Json<CallResponse> {
    if call.service == MESH_SERVICE {
        return Json(handle_mesh_call(&state, &call).await);
    }

    let response = match state.router.route(&call).await {
        RouteOutcome::Forwarded(response) => response,
        // The hold already consumed the call's timeout; the body keeps the
        // response timeout-shaped for callers that do read it.
        RouteOutcome::Blocked => CallResponse::not_ok(json!({
            "type": "timeout",
            "message": format!("request timeout after {}ms", call.timeout_ms),
        })),
        RouteOutcome::NoExitNode => CallResponse::not_ok(json!({
            "type": "no-exit-nodes",
            "message": format!("could not find any exit nodes for service: {}", call.service),
        })),
        RouteOutcome::Failed(e) => CallResponse::not_ok(json!({
            "type": e.kind(),
            "message": e.to_string(),
        })),
    };
    Json(response)
}

/// Mesh-internal methods another relay sends to this node directly.
async fn handle_mesh_call(state: &AppState, call: &CallRequest) -> CallResponse {
    match call.method.as_str() {
        "relay_advertise" => {
            let ad: RelayAdvertisement = match serde_json::from_value(call.body.clone()) {
                Ok(ad) => ad,
                Err(e) => {
                    return CallResponse::not_ok(json!({
                        "type": "validation",
                        "message": format!("malformed relay advertisement: {e}"),
                    }))
                }
            };
            match state.router.handle_relay_advertise(ad).await {
                Ok(accepted) => CallResponse::ok(json!({ "accepted": accepted })),
                Err(e) => CallResponse::not_ok(json!({
                    "type": e.kind(),
                    "message": e.to_string(),
                })),
            }
        }
        "exit_connections" => {
            let service = call
                .body
                .get("service")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            if service.is_empty() {
                return CallResponse::not_ok(json!({
                    "type": "validation",
                    "field": "service",
                    "message": "missing required string",
                }));
            }
            let count = state.router.exit_connections(service).await;
            CallResponse::ok(json!({ "service": service, "connection_count": count }))
        }
        "set_k" => {
            // Same shape as the admin op; this path is how fan-outs from
            // other members land.
            let request = AdminRequest::new("set_k", call.body.clone());
            let result = state.admin.handle(request).await;
            CallResponse {
                ok: result.ok,
                body: result.body,
            }
        }
        other => CallResponse::not_ok(json!({
            "type": "validation",
            "message": format!("unknown mesh method: {other}"),
        })),
    }
}

#[derive(Debug, Deserialize)]
struct AdvertiseBody {
    hostport: String,
    services: Vec<crate::router::ServiceAdvertisement>,
}

async fn handle_advertise(
    State(state): State<AppState>,
    Json(body): Json<AdvertiseBody>,
) -> Json<AdminResponse> {
    if body.hostport.is_empty() {
        return Json(AdminResponse::failure(json!({
            "type": "validation",
            "field": "hostport",
            "message": "must not be empty",
        })));
    }
    match state.router.advertise(&body.hostport, body.services).await {
        Ok(counts) => {
            let services: Vec<serde_json::Value> = counts
                .into_iter()
                .map(|(service_name, connection_count)| {
                    json!({
                        "service_name": service_name,
                        "connection_count": connection_count,
                    })
                })
                .collect();
            Json(AdminResponse::success(json!({ "services": services })))
        }
        Err(e) => Json(AdminResponse::from_error(&e)),
    }
}

async fn handle_admin(
    State(state): State<AppState>,
    Json(request): Json<AdminRequest>,
) -> Json<AdminResponse> {
    Json(state.admin.handle(request).await)
}

async fn health() -> &'static str {
    "OK"
}
