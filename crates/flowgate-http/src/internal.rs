// flowgate-http/src/internal.rs
// ============================================================================
// Module: Internal Shard Actor Protocol
// Description: Non-public router exposing the Flow State Store's per-shard
//              operations directly, bypassing Executor-level business logic.
// Purpose: Give tests and out-of-process shard deployments a way to drive
//          init/check-request/submit/state/cancel against one session's
//          owning shard without going through the public Flow API.
// Dependencies: axum, flowgate_core::runtime::store
// ============================================================================

//! ## Overview
//! This router is never mounted on the public listener; callers are other
//! processes in the same deployment (out-of-process shard workers) or test
//! harnesses that need to inspect raw shard state without the Executor's
//! idempotency replay, rate limiting, or branch evaluation in the way.

use std::collections::VecDeque;
use std::sync::Arc;

use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::delete;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use flowgate_core::core::identifiers::CapabilityId;
use flowgate_core::core::identifiers::ClientId;
use flowgate_core::core::identifiers::FlowType;
use flowgate_core::core::identifiers::NodeId;
use flowgate_core::core::identifiers::RequestId;
use flowgate_core::core::identifiers::SessionId;
use flowgate_core::core::identifiers::TenantId;
use flowgate_core::core::state::RuntimeState;
use flowgate_core::core::time::Timestamp;
use flowgate_core::runtime::store::InitParams;
use flowgate_core::runtime::store::ShardedStateStore;
use flowgate_core::runtime::store::SubmitParams;
use flowgate_core::StoreError;

use crate::clock;

/// Shared state for the internal shard protocol router.
#[derive(Clone)]
pub struct InternalState {
    /// The store every handler operates against.
    pub store: Arc<ShardedStateStore>,
}

/// Builds the internal per-shard actor protocol router.
///
/// Never mount this alongside the public API on an externally reachable
/// listener; it exposes raw shard state without session-binding checks.
#[must_use]
pub fn router(store: Arc<ShardedStateStore>) -> Router {
    Router::new()
        .route("/internal/shard/{session_id}/init", post(init))
        .route("/internal/shard/{session_id}/check-request", post(check_request))
        .route("/internal/shard/{session_id}/submit", post(submit))
        .route("/internal/shard/{session_id}/state", get(state))
        .route("/internal/shard/{session_id}/cancel", delete(cancel))
        .with_state(InternalState { store })
}

/// Body of `POST /internal/shard/{sessionId}/init`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitBody {
    /// Flow type to initialize.
    flow_type: String,
    /// Tenant to bind to the new session.
    tenant_id: String,
    /// Client to bind to the new session.
    client_id: String,
    /// Node the session should start at, already resolved by the caller.
    entry_node_id: String,
    /// Opaque OAuth passthrough parameters.
    #[serde(default)]
    oauth_params: Map<String, Value>,
    /// Session lifetime in milliseconds.
    ttl_ms: i64,
}

/// Handles `POST /internal/shard/{sessionId}/init`.
async fn init(State(state): State<InternalState>, Path(session_id): Path<String>, Json(body): Json<InitBody>) -> Response {
    let now = clock::now();
    let result = state
        .store
        .init(InitParams {
            session_id: SessionId::from(session_id),
            flow_type: FlowType::from(body.flow_type),
            tenant_id: TenantId::from(body.tenant_id),
            client_id: ClientId::from(body.client_id),
            entry_node_id: NodeId::from(body.entry_node_id),
            oauth_params: body.oauth_params,
            created_at: now,
            ttl_ms: body.ttl_ms,
        })
        .await;
    match result {
        Ok(runtime_state) => (StatusCode::OK, Json(InitReply::success(runtime_state))).into_response(),
        Err(err) => (StatusCode::CONFLICT, Json(InitReply::error(err.to_string()))).into_response(),
    }
}

/// Response body for `POST /internal/shard/{sessionId}/init`.
#[derive(Serialize)]
struct InitReply {
    /// True if the session was created.
    success: bool,
    /// The newly created session, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<RuntimeState>,
    /// Human-readable failure description, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    /// Stable wire code, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl InitReply {
    /// Builds a success reply carrying the new session's state.
    fn success(state: RuntimeState) -> Self {
        Self {
            success: true,
            state: Some(state),
            error: None,
            code: None,
        }
    }

    /// Builds a failure reply; `init` only fails with `session_exists`.
    fn error(message: String) -> Self {
        Self {
            success: false,
            state: None,
            error: Some(message),
            code: Some("session_exists"),
        }
    }
}

/// Body of `POST /internal/shard/{sessionId}/check-request`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckRequestBody {
    /// Idempotency key being probed.
    request_id: String,
}

/// Response body for `POST /internal/shard/{sessionId}/check-request`.
#[derive(Serialize)]
struct CheckRequestReply {
    /// True if `requestId` has a cached result.
    found: bool,
    /// The cached result, if found.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    /// The session's current state.
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<RuntimeState>,
}

/// Handles `POST /internal/shard/{sessionId}/check-request`.
async fn check_request(
    State(state): State<InternalState>,
    Path(session_id): Path<String>,
    Json(body): Json<CheckRequestBody>,
) -> Response {
    let now = clock::now();
    let session_id = SessionId::from(session_id);
    match state.store.check_request(&session_id, &RequestId::from(body.request_id), now).await {
        Ok((found, result, runtime_state)) => (
            StatusCode::OK,
            Json(CheckRequestReply {
                found,
                result,
                state: Some(runtime_state),
            }),
        )
            .into_response(),
        Err(err) => (StatusCode::NOT_FOUND, Json(ErrorReply::from(err))).into_response(),
    }
}

/// Body of `POST /internal/shard/{sessionId}/submit`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody {
    /// Idempotency key for this submit.
    request_id: String,
    /// Capability whose response is being merged into `collectedData`.
    capability_id: String,
    /// Opaque capability response payload.
    response: Value,
    /// Wire response to cache for idempotent replay.
    result: Value,
    /// Node the session advances to.
    next_node_id: String,
    /// Visited-node history, already bounds-enforced by the caller.
    visited_nodes: VecDeque<String>,
    /// Submit-timestamp history (milliseconds), already bounds-enforced by the caller.
    request_timestamps_ms: VecDeque<i64>,
}

/// Handles `POST /internal/shard/{sessionId}/submit`.
async fn submit(State(state): State<InternalState>, Path(session_id): Path<String>, Json(body): Json<SubmitBody>) -> Response {
    let session_id = SessionId::from(session_id);
    let visited_nodes = body.visited_nodes.into_iter().map(NodeId::from).collect();
    let request_timestamps = body.request_timestamps_ms.into_iter().map(Timestamp::from_millis).collect();
    let result = state
        .store
        .submit(
            &session_id,
            SubmitParams {
                request_id: RequestId::from(body.request_id),
                capability_id: CapabilityId::from(body.capability_id),
                response: body.response,
                result: body.result,
                next_node_id: NodeId::from(body.next_node_id),
                visited_nodes,
                request_timestamps,
                annotations: Map::new(),
                hook_errors: Vec::new(),
            },
        )
        .await;
    match result {
        Ok(runtime_state) => (StatusCode::OK, Json(runtime_state)).into_response(),
        Err(err) => (StatusCode::NOT_FOUND, Json(ErrorReply::from(err))).into_response(),
    }
}

/// Handles `GET /internal/shard/{sessionId}/state`.
async fn state(State(state): State<InternalState>, Path(session_id): Path<String>) -> Response {
    let now = clock::now();
    match state.store.state(&SessionId::from(session_id), now).await {
        Ok(runtime_state) => (StatusCode::OK, Json(StateReply { state: runtime_state })).into_response(),
        Err(err) => (StatusCode::NOT_FOUND, Json(ErrorReply::from(err))).into_response(),
    }
}

/// Response body for `GET /internal/shard/{sessionId}/state`.
#[derive(Serialize)]
struct StateReply {
    /// The session's current state.
    state: RuntimeState,
}

/// Handles `DELETE /internal/shard/{sessionId}/cancel`.
async fn cancel(State(state): State<InternalState>, Path(session_id): Path<String>) -> Response {
    match state.store.cancel(&SessionId::from(session_id), crate::clock::now()).await {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({"success": true}))).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorReply::from(err))).into_response(),
    }
}

/// Generic `{error}` body for internal protocol failures.
#[derive(Serialize)]
struct ErrorReply {
    /// Human-readable failure description.
    error: String,
}

impl From<StoreError> for ErrorReply {
    fn from(err: StoreError) -> Self {
        Self { error: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn init_then_state_round_trips_through_the_same_shard() {
        let store = Arc::new(ShardedStateStore::new(2));
        let app = router(Arc::clone(&store));

        let init_request = Request::builder()
            .method("POST")
            .uri("/internal/shard/sess-1/init")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "flowType": "login",
                    "tenantId": "tenant-a",
                    "clientId": "client-a",
                    "entryNodeId": "identify",
                    "ttlMs": 600_000,
                })
                .to_string(),
            ))
            .unwrap();
        let init_response = app.clone().oneshot(init_request).await.unwrap();
        assert_eq!(init_response.status(), StatusCode::OK);

        let state_request = Request::builder()
            .method("GET")
            .uri("/internal/shard/sess-1/state")
            .body(Body::empty())
            .unwrap();
        let state_response = app.oneshot(state_request).await.unwrap();
        assert_eq!(state_response.status(), StatusCode::OK);
        let bytes = to_bytes(state_response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["state"]["current_node_id"], "identify");
    }

    #[tokio::test]
    async fn duplicate_init_reports_session_exists() {
        let store = Arc::new(ShardedStateStore::new(1));
        let app = router(Arc::clone(&store));
        let body = json!({
            "flowType": "login",
            "tenantId": "tenant-a",
            "clientId": "client-a",
            "entryNodeId": "identify",
            "ttlMs": 600_000,
        });
        for expected_status in [StatusCode::OK, StatusCode::CONFLICT] {
            let request = Request::builder()
                .method("POST")
                .uri("/internal/shard/sess-1/init")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), expected_status);
        }
    }
}
