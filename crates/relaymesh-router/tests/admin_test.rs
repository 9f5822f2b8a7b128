mod common;

use common::{MockDispatch, MockPeerStore, Reply, RoundRobinRing};
use relaymesh_common::AdminRequest;
use relaymesh_router::{
    AdminRouter, BlockList, CallDispatch, EgressNodes, PeerStore, RelayRouter, Ring,
    RouterConfig, StaticRing, DEFAULT_K,
};
use serde_json::json;
use std::sync::Arc;

const LOCAL: &str = "127.0.0.1:4000";

fn admin_with(ring: Arc<dyn Ring>, dispatch: MockDispatch) -> AdminRouter {
    let dispatch: Arc<dyn CallDispatch> = Arc::new(dispatch);
    let peers: Arc<dyn PeerStore> = Arc::new(MockPeerStore::empty());
    let router = RelayRouter::new(
        Arc::new(BlockList::new()),
        Arc::new(EgressNodes::new(Arc::clone(&ring))),
        dispatch,
        peers,
        ring,
        RouterConfig::default(),
    );
    AdminRouter::new(Arc::new(router))
}

fn admin() -> AdminRouter {
    admin_with(
        Arc::new(StaticRing::solo(LOCAL)),
        MockDispatch::answering(Reply::Ok(json!(null))),
    )
}

#[tokio::test]
async fn test_kill_switch_block_requires_both_fields() {
    let admin = admin();
    let res = admin
        .handle(AdminRequest::new(
            "kill_switch",
            json!({"type": "block", "caller": "alice"}),
        ))
        .await;
    assert!(!res.ok);
    assert_eq!(res.body["type"], "validation");
    assert_eq!(res.body["field"], "service");
}

#[tokio::test]
async fn test_kill_switch_rejects_empty_fields() {
    let admin = admin();
    let res = admin
        .handle(AdminRequest::new(
            "kill_switch",
            json!({"type": "block", "caller": "", "service": "steve"}),
        ))
        .await;
    assert!(!res.ok);
    assert_eq!(res.body["field"], "caller");
}

#[tokio::test]
async fn test_kill_switch_block_query_unblock_cycle() {
    let admin = admin();

    let res = admin
        .handle(AdminRequest::new(
            "kill_switch",
            json!({"type": "block", "caller": "*", "service": "steve"}),
        ))
        .await;
    assert!(res.ok);

    let res = admin
        .handle(AdminRequest::new("kill_switch", json!({"type": "query"})))
        .await;
    assert!(res.ok);
    assert_eq!(res.body["blockings"], json!(["* ==> steve"]));

    let res = admin
        .handle(AdminRequest::new(
            "kill_switch",
            json!({"type": "unblock", "caller": "*", "service": "steve"}),
        ))
        .await;
    assert!(res.ok);

    // Unblocking an absent entry is a not-found, not a validation error.
    let res = admin
        .handle(AdminRequest::new(
            "kill_switch",
            json!({"type": "unblock", "caller": "*", "service": "steve"}),
        ))
        .await;
    assert!(!res.ok);
    assert_eq!(res.body["type"], "not-found");
}

#[tokio::test]
async fn test_kill_switch_rejects_unknown_type() {
    let admin = admin();
    let res = admin
        .handle(AdminRequest::new("kill_switch", json!({"type": "pause"})))
        .await;
    assert!(!res.ok);
    assert_eq!(res.body["field"], "type");
}

#[tokio::test]
async fn test_exit_hosts_validates_service_name() {
    let admin = admin();
    let res = admin
        .handle(AdminRequest::new(
            "exit_hosts",
            json!({"service": "steve mary"}),
        ))
        .await;
    assert!(!res.ok);
    assert_eq!(res.body["type"], "validation");
    assert_eq!(res.body["field"], "service");
}

#[tokio::test]
async fn test_exit_hosts_resolves() {
    let admin = admin();
    let res = admin
        .handle(AdminRequest::new("exit_hosts", json!({"service": "steve"})))
        .await;
    assert!(res.ok);
    assert_eq!(res.body["service"], "steve");
    assert_eq!(res.body["exit_hosts"], json!([LOCAL]));
}

#[tokio::test]
async fn test_get_k_defaults_and_set_k_overrides() {
    let admin = admin();

    let res = admin
        .handle(AdminRequest::new("get_k", json!({"service": "steve"})))
        .await;
    assert!(res.ok);
    assert_eq!(res.body["k"], DEFAULT_K);

    let res = admin
        .handle(AdminRequest::new("set_k", json!({"service": "steve", "k": 3})))
        .await;
    assert!(res.ok);

    let res = admin
        .handle(AdminRequest::new("get_k", json!({"service": "steve"})))
        .await;
    assert_eq!(res.body["k"], 3);
}

#[tokio::test]
async fn test_set_k_rejects_zero() {
    let admin = admin();
    let res = admin
        .handle(AdminRequest::new("set_k", json!({"service": "steve", "k": 0})))
        .await;
    assert!(!res.ok);
    assert_eq!(res.body["field"], "k");
}

#[tokio::test]
async fn test_fanout_set_k_reports_per_member() {
    let ring = Arc::new(RoundRobinRing {
        local: "a:1".to_string(),
        nodes: vec!["a:1".to_string(), "dead:1".to_string()],
    });
    let admin = admin_with(
        ring,
        MockDispatch::answering(Reply::Ok(json!(null)))
            .with_host("dead:1", Reply::TransportError("down".to_string())),
    );

    let res = admin
        .handle(AdminRequest::new(
            "fanout_set_k",
            json!({"service": "steve", "k": 5}),
        ))
        .await;
    assert!(res.ok);
    assert_eq!(res.body["members"]["a:1"]["ok"], true);
    assert_eq!(res.body["members"]["dead:1"]["ok"], false);
}

#[tokio::test]
async fn test_service_connections_maps_results_per_host() {
    let ring = Arc::new(RoundRobinRing {
        local: "a:1".to_string(),
        nodes: vec!["a:1".to_string(), "dead:1".to_string()],
    });
    let admin = admin_with(
        ring,
        MockDispatch::answering(Reply::Ok(json!({"connection_count": 4})))
            .with_host("dead:1", Reply::TransportError("down".to_string())),
    );

    let res = admin
        .handle(AdminRequest::new(
            "service_connections",
            json!({"service": "steve"}),
        ))
        .await;
    assert!(res.ok);
    assert_eq!(res.body["connections"]["a:1"]["connection_count"], 4);
    assert!(res.body["connections"]["dead:1"]["error"].is_string());
}

#[tokio::test]
async fn test_service_connections_with_no_exits_is_an_error() {
    let ring: Arc<dyn Ring> = Arc::new(StaticRing::solo(LOCAL));
    let dispatch: Arc<dyn CallDispatch> = Arc::new(MockDispatch::answering(Reply::Ok(json!(null))));
    let peers: Arc<dyn PeerStore> = Arc::new(MockPeerStore::empty());
    let router = Arc::new(RelayRouter::new(
        Arc::new(BlockList::new()),
        Arc::new(EgressNodes::new(Arc::clone(&ring))),
        dispatch,
        peers,
        ring,
        RouterConfig::default(),
    ));
    router.egress().set_k_for("ghost", 0).await;
    let admin = AdminRouter::new(router);

    let res = admin
        .handle(AdminRequest::new(
            "service_connections",
            json!({"service": "ghost"}),
        ))
        .await;
    assert!(!res.ok);
    assert_eq!(res.body["type"], "no-exit-nodes");
}

#[tokio::test]
async fn test_info_reports_identity_and_counters() {
    let admin = admin();
    let res = admin.handle(AdminRequest::new("_info", json!(null))).await;
    assert!(res.ok);
    assert_eq!(res.body["whoami"], LOCAL);
    assert_eq!(res.body["members"], json!([LOCAL]));
    assert_eq!(res.body["metrics"]["forwarded"], 0);
    assert_eq!(res.body["block_entries"], 0);
}

#[tokio::test]
async fn test_unknown_op_is_a_structured_error() {
    let admin = admin();
    let res = admin
        .handle(AdminRequest::new("reboot", json!({})))
        .await;
    assert!(!res.ok);
    assert_eq!(res.body["type"], "validation");
    assert_eq!(res.body["field"], "op");
}
