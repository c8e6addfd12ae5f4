// system-tests/tests/common/mod.rs
// ============================================================================
// Module: Shared Test Fixtures
// Description: Graph builders and router wiring shared by the end-to-end
//              scenario tests.
// Purpose: Keep each scenario file focused on the behavior it exercises.
// ============================================================================

use std::sync::Arc;

use axum::body::to_bytes;
use axum::body::Body;
use axum::http::Request;
use axum::http::StatusCode;
use axum::Router;
use flowgate_core::core::condition::Condition;
use flowgate_core::core::condition::Leaf;
use flowgate_core::core::condition::Operator;
use flowgate_core::core::graph::BranchRule;
use flowgate_core::core::graph::Edge;
use flowgate_core::core::graph::GraphDefinition;
use flowgate_core::core::graph::Node;
use flowgate_core::core::graph::NodeKind;
use flowgate_core::core::identifiers::FlowType;
use flowgate_core::core::identifiers::FlowVersion;
use flowgate_core::core::identifiers::GraphId;
use flowgate_core::core::identifiers::NodeId;
use flowgate_core::runtime::registry::InMemoryFlowRegistry;
use flowgate_core::runtime::store::ShardedStateStore;
use flowgate_core::Executor;
use flowgate_http::router;
use serde_json::json;
use serde_json::Value;
use tower::ServiceExt;

/// `start -> identify -> end`, a single capability, no branching.
pub fn linear_graph() -> GraphDefinition {
    GraphDefinition {
        id: GraphId::from("login"),
        flow_version: FlowVersion::from("v1"),
        profile_id: "default".to_string(),
        nodes: vec![
            Node { id: NodeId::from("start"), kind: NodeKind::Start },
            Node {
                id: NodeId::from("identify"),
                kind: NodeKind::Capability { capability_template: json!({"kind": "identifier"}) },
            },
            Node { id: NodeId::from("end"), kind: NodeKind::End },
        ],
        edges: vec![
            Edge { source_node_id: NodeId::from("start"), target_node_id: NodeId::from("identify"), source_handle: None, before_event: None, after_event: None },
            Edge { source_node_id: NodeId::from("identify"), target_node_id: NodeId::from("end"), source_handle: None, before_event: None, after_event: None },
        ],
    }
}

/// `start -> identify -> route -> {mfa|ok} -> end`, routing on `risk.score`.
pub fn decision_graph() -> GraphDefinition {
    GraphDefinition {
        id: GraphId::from("login"),
        flow_version: FlowVersion::from("v1"),
        profile_id: "default".to_string(),
        nodes: vec![
            Node { id: NodeId::from("start"), kind: NodeKind::Start },
            Node {
                id: NodeId::from("identify"),
                kind: NodeKind::Capability { capability_template: json!({"kind": "identifier"}) },
            },
            Node {
                id: NodeId::from("route"),
                kind: NodeKind::Decision {
                    branches: vec![BranchRule {
                        id: "high_risk".to_string(),
                        condition: Condition::Leaf(Leaf {
                            field: "risk.score".to_string(),
                            claim_path: None,
                            operator: Operator::Gte,
                            value: json!(80),
                        }),
                    }],
                    default: Some("__default__".to_string()),
                },
            },
            Node {
                id: NodeId::from("mfa"),
                kind: NodeKind::Capability { capability_template: json!({"kind": "mfa"}) },
            },
            Node {
                id: NodeId::from("ok"),
                kind: NodeKind::Capability { capability_template: json!({"kind": "confirm"}) },
            },
            Node { id: NodeId::from("end"), kind: NodeKind::End },
        ],
        edges: vec![
            Edge { source_node_id: NodeId::from("start"), target_node_id: NodeId::from("identify"), source_handle: None, before_event: None, after_event: None },
            Edge { source_node_id: NodeId::from("identify"), target_node_id: NodeId::from("route"), source_handle: None, before_event: None, after_event: None },
            Edge { source_node_id: NodeId::from("route"), target_node_id: NodeId::from("mfa"), source_handle: Some("high_risk".to_string()), before_event: None, after_event: None },
            Edge { source_node_id: NodeId::from("route"), target_node_id: NodeId::from("ok"), source_handle: Some("__default__".to_string()), before_event: None, after_event: None },
            Edge { source_node_id: NodeId::from("mfa"), target_node_id: NodeId::from("end"), source_handle: None, before_event: None, after_event: None },
            Edge { source_node_id: NodeId::from("ok"), target_node_id: NodeId::from("end"), source_handle: None, before_event: None, after_event: None },
        ],
    }
}

/// Builds a router over `graph` registered under `flow_type`, with a fresh
/// in-memory registry and a single-shard state store.
pub async fn router_for(flow_type: &str, graph: GraphDefinition) -> Router {
    let registry = InMemoryFlowRegistry::new();
    registry.register(&FlowType::from(flow_type), None, graph).await;
    let store = ShardedStateStore::new(4);
    let executor = Arc::new(Executor::new(Arc::new(registry), store));
    router(executor)
}

/// Builds a router over `graph` with a caller-supplied executor (for
/// dispatcher-hook scenarios that need direct access to the dispatcher).
pub async fn router_with_executor(executor: Arc<Executor<InMemoryFlowRegistry>>) -> Router {
    router(executor)
}

/// POSTs a JSON body and returns `(status, parsed body)`.
pub async fn post_json(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("dispatch request");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
    let parsed: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, parsed)
}

/// GETs a path and returns `(status, parsed body)`.
pub async fn get_json(app: &Router, path: &str) -> (StatusCode, Value) {
    let request = Request::builder().method("GET").uri(path).body(Body::empty()).expect("build request");
    let response = app.clone().oneshot(request).await.expect("dispatch request");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
    let parsed: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, parsed)
}

/// Runs `init` for `flow_type` against `app` and returns the new session id.
pub async fn init_session(app: &Router, flow_type: &str, client_id: &str) -> String {
    let (status, body) = post_json(app, "/api/flow/init", json!({"flowType": flow_type, "clientId": client_id})).await;
    assert_eq!(status, StatusCode::OK, "init failed: {body}");
    body["sessionId"].as_str().expect("sessionId present").to_string()
}
