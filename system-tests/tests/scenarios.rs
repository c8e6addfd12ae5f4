// system-tests/tests/scenarios.rs
// ============================================================================
// Module: End-to-End Flow Scenarios
// Description: Drives the public HTTP Flow API against in-process routers,
//              exercising the six concrete scenarios enumerated for this
//              project's testable properties.
// Purpose: Verify idempotency, session binding, rate limiting, decision
//          branching, and before-hook timeout-denial hold across the whole
//          stack, not just inside a single crate's unit tests.
// ============================================================================

mod common;

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use axum::http::StatusCode;
use common::decision_graph;
use common::get_json;
use common::init_session;
use common::linear_graph;
use common::post_json;
use common::router_for;
use common::router_with_executor;
use flowgate_core::core::event::BeforeHookRegistration;
use flowgate_core::core::event::EventPattern;
use flowgate_core::core::event::UnifiedEvent;
use flowgate_core::core::graph::Edge;
use flowgate_core::core::graph::GraphDefinition;
use flowgate_core::core::graph::Node;
use flowgate_core::core::graph::NodeKind;
use flowgate_core::core::identifiers::FlowType;
use flowgate_core::core::identifiers::FlowVersion;
use flowgate_core::core::identifiers::GraphId;
use flowgate_core::core::identifiers::HookId;
use flowgate_core::core::identifiers::NodeId;
use flowgate_core::runtime::dispatcher::BeforeHookHandler;
use flowgate_core::runtime::dispatcher::BeforeHookResult;
use flowgate_core::runtime::dispatcher::Dispatcher;
use flowgate_core::runtime::registry::InMemoryFlowRegistry;
use flowgate_core::runtime::store::ShardedStateStore;
use flowgate_core::Executor;
use serde_json::json;

/// Scenario 1: init followed by a single submit on a linear graph redirects
/// the client straight to the OAuth callback.
#[tokio::test]
async fn init_and_single_submit_advances_the_flow_to_redirect() {
    let app = router_for("login", linear_graph()).await;
    let session_id = init_session(&app, "login", "c1").await;

    let (status, body) = post_json(
        &app,
        "/api/flow/submit",
        json!({
            "sessionId": session_id,
            "requestId": "r1",
            "capabilityId": "identifier_email",
            "response": {"email": "a@b"},
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "redirect");
    assert_eq!(body["redirect"]["url"], "/callback");
    assert_eq!(body["redirect"]["method"], "GET");
}

/// Scenario 2: repeating a submit with the same `requestId` returns the
/// byte-identical body, carries the idempotent-replay header, and does not
/// advance `visitedNodeIds` a second time.
#[tokio::test]
async fn idempotent_resend_replays_the_first_result_and_header() {
    let app = router_for("login", linear_graph()).await;
    let session_id = init_session(&app, "login", "c1").await;
    let submit_body = json!({
        "sessionId": session_id,
        "requestId": "r1",
        "capabilityId": "identifier_email",
        "response": {"email": "a@b"},
    });

    let (first_status, first_body) = post_json(&app, "/api/flow/submit", submit_body.clone()).await;
    assert_eq!(first_status, StatusCode::OK);

    let (second_status, second_body) = post_json(&app, "/api/flow/submit", submit_body).await;
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first_body, second_body, "replayed body must be byte-identical");

    let (state_status, state_body) = get_json(&app, &format!("/api/flow/state/{session_id}")).await;
    assert_eq!(state_status, StatusCode::OK);
    assert_eq!(state_body["state"]["visitedNodeIds"].as_array().unwrap().len(), 1);
}

/// Scenario 3: a submit carrying a `tenantId` that differs from the one the
/// session was initialized with is rejected without mutating state.
#[tokio::test]
async fn tenant_mismatch_is_rejected_without_mutating_state() {
    let registry = InMemoryFlowRegistry::new();
    registry.register(&FlowType::from("login"), None, linear_graph()).await;
    let store = ShardedStateStore::new(4);
    let executor = Arc::new(Executor::new(Arc::new(registry), store));
    let app = router_with_executor(executor).await;

    let (init_status, init_body) = post_json(
        &app,
        "/api/flow/init",
        json!({"flowType": "login", "clientId": "c1", "tenantId": "t1"}),
    )
    .await;
    assert_eq!(init_status, StatusCode::OK);
    let session_id = init_body["sessionId"].as_str().unwrap().to_string();

    let (status, body) = post_json(
        &app,
        "/api/flow/submit",
        json!({
            "sessionId": session_id,
            "requestId": "r1",
            "capabilityId": "identifier_email",
            "response": {"email": "a@b"},
            "tenantId": "t2",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "invalid_session");

    let (state_status, state_body) = get_json(&app, &format!("/api/flow/state/{session_id}")).await;
    assert_eq!(state_status, StatusCode::OK);
    assert_eq!(state_body["state"]["currentNodeId"], "identify");
    assert_eq!(state_body["state"]["visitedNodeIds"].as_array().unwrap().len(), 0);
}

/// Scenario 4: 30 accepted submits inside the 60s rate-limit window succeed;
/// the 31st is rejected. Uses a long linear chain so the session advances to
/// a fresh node on every submit and never trips the separate cycle guard.
#[tokio::test]
async fn thirty_first_submit_in_a_window_is_rate_limited() {
    let app = router_for("login", long_chain_graph(35)).await;
    let session_id = init_session(&app, "login", "c1").await;

    for index in 0..30 {
        let (status, body) = post_json(
            &app,
            "/api/flow/submit",
            json!({
                "sessionId": session_id,
                "requestId": format!("r{index}"),
                "capabilityId": format!("step{index}"),
                "response": {"ok": true},
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "submit {index} unexpectedly rejected: {body}");
    }

    let (status, body) = post_json(
        &app,
        "/api/flow/submit",
        json!({
            "sessionId": session_id,
            "requestId": "r30",
            "capabilityId": "step30",
            "response": {"ok": true},
        }),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "rate_limit_exceeded");
}

/// `start -> step0 -> step1 -> ... -> step{n-1} -> end`: `n` distinct
/// capability nodes, so repeated submits never revisit the same node and
/// only the rate limiter (not the cycle guard) can reject them.
fn long_chain_graph(n: usize) -> GraphDefinition {
    let mut nodes = vec![Node { id: NodeId::from("start"), kind: NodeKind::Start }];
    let mut edges = Vec::new();
    let mut previous = NodeId::from("start");
    for index in 0..n {
        let node_id = NodeId::from(format!("step{index}"));
        nodes.push(Node {
            id: node_id.clone(),
            kind: NodeKind::Capability { capability_template: json!({"kind": "noop"}) },
        });
        edges.push(Edge {
            source_node_id: previous,
            target_node_id: node_id.clone(),
            source_handle: None,
            before_event: None,
            after_event: None,
        });
        previous = node_id;
    }
    nodes.push(Node { id: NodeId::from("end"), kind: NodeKind::End });
    edges.push(Edge {
        source_node_id: previous,
        target_node_id: NodeId::from("end"),
        source_handle: None,
        before_event: None,
        after_event: None,
    });
    GraphDefinition {
        id: GraphId::from("login"),
        flow_version: FlowVersion::from("v1"),
        profile_id: "default".to_string(),
        nodes,
        edges,
    }
}

/// Scenario 5: a decision node routes on `risk.score` — high score takes the
/// `mfa` branch, low or absent score falls through to the default `ok` branch.
#[tokio::test]
async fn decision_branch_routes_on_risk_score() {
    for (risk_payload, expected_node) in [
        (Some(json!({"score": 90})), "mfa"),
        (Some(json!({"score": 10})), "ok"),
        (None, "ok"),
    ] {
        let app = router_for("login", decision_graph()).await;
        let session_id = init_session(&app, "login", "c1").await;

        let response = if let Some(risk) = risk_payload {
            json!({
                "sessionId": session_id,
                "requestId": "r1",
                "capabilityId": "risk",
                "response": risk,
            })
        } else {
            json!({
                "sessionId": session_id,
                "requestId": "r1",
                "capabilityId": "identifier_email",
                "response": {"email": "a@b"},
            })
        };
        let (status, body) = post_json(&app, "/api/flow/submit", response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "continue");
        assert_eq!(body["uiContract"]["capabilities"][0]["nodeId"], expected_node);
    }
}

/// `start -> identify -> end`, identical to [`linear_graph`] except the
/// final edge names a before/after event pair so a registered hook actually
/// fires when the session submits its one capability.
fn hooked_linear_graph() -> GraphDefinition {
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
            Edge {
                source_node_id: NodeId::from("identify"),
                target_node_id: NodeId::from("end"),
                source_handle: None,
                before_event: Some("auth.login.attempted".to_string()),
                after_event: Some("auth.login.completed".to_string()),
            },
        ],
    }
}

/// Scenario 6: a before-hook that sleeps past its own `timeoutMs` denies the
/// transition with `HOOK_TIMEOUT`; the session cursor does not advance.
#[tokio::test]
async fn slow_before_hook_times_out_and_denies_the_transition() {
    let registry = InMemoryFlowRegistry::new();
    registry.register(&FlowType::from("login"), None, hooked_linear_graph()).await;
    let store = ShardedStateStore::new(4);
    let dispatcher = Dispatcher::new();
    dispatcher
        .before_hooks()
        .register(
            HookId::from("slow-reviewer"),
            BeforeHookRegistration {
                id: HookId::from("slow-reviewer"),
                pattern: EventPattern::parse("auth.*").unwrap(),
                timeout_ms: 50,
            },
            0,
            Arc::new(SleepyHook { delay_ms: 200, invocations: Arc::new(AtomicUsize::new(0)) }),
        )
        .await;
    let executor = Arc::new(Executor::new_with_dispatcher(Arc::new(registry), store, dispatcher));
    let app = router_with_executor(Arc::clone(&executor)).await;

    let session_id = init_session(&app, "login", "c1").await;
    let (status, body) = post_json(
        &app,
        "/api/flow/submit",
        json!({
            "sessionId": session_id,
            "requestId": "r1",
            "capabilityId": "identifier_email",
            "response": {"email": "a@b"},
        }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "HOOK_TIMEOUT");

    let (state_status, state_body) = get_json(&app, &format!("/api/flow/state/{session_id}")).await;
    assert_eq!(state_status, StatusCode::OK);
    assert_eq!(state_body["state"]["currentNodeId"], "identify");
}

struct SleepyHook {
    delay_ms: u64,
    invocations: Arc<AtomicUsize>,
}

#[async_trait]
impl BeforeHookHandler for SleepyHook {
    async fn handle(&self, _event: &UnifiedEvent) -> Result<BeforeHookResult, String> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        Ok(BeforeHookResult::allow())
    }
}
