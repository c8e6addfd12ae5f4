// flowgate-http/src/api.rs
// ============================================================================
// Module: Public Flow API
// Description: One axum handler per endpoint of the public HTTP Flow API.
// Purpose: Adapt flowgate-core's Executor to HTTP, reading the wall clock at
//          the boundary and translating domain errors to wire responses.
// Dependencies: axum, flowgate_core, crate::{dto,error,clock,ids}
// ============================================================================

use std::sync::Arc;

use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;

use flowgate_core::core::identifiers::CapabilityId;
use flowgate_core::core::identifiers::ClientId;
use flowgate_core::core::identifiers::FlowType;
use flowgate_core::core::identifiers::RequestId;
use flowgate_core::core::identifiers::TenantId;
use flowgate_core::interfaces::FlowRegistry;
use flowgate_core::Executor;

use crate::clock;
use crate::dto::CancelRequest;
use crate::dto::CancelResponseBody;
use crate::dto::ErrorEnvelope;
use crate::dto::InitRequest;
use crate::dto::InitResponseBody;
use crate::dto::StateResponseBody;
use crate::dto::SubmitRequest;
use crate::dto::SubmitResponseBody;
use crate::error::ApiError;
use crate::ids::generate_session_id;

/// Header set on a `submit` response served from the idempotency cache.
pub const IDEMPOTENT_REPLAY_HEADER: &str = "x-idempotent";

/// Shared state handed to every public API handler.
pub struct AppState<R: FlowRegistry> {
    /// The engine the handlers delegate to.
    pub executor: Arc<Executor<R>>,
}

impl<R: FlowRegistry> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
        }
    }
}

/// Builds the public Flow API router: `init`, `submit`, `state`, `cancel`.
#[must_use]
pub fn router<R: FlowRegistry + Send + Sync + 'static>(executor: Arc<Executor<R>>) -> Router {
    Router::new()
        .route("/api/flow/init", post(init::<R>))
        .route("/api/flow/submit", post(submit::<R>))
        .route("/api/flow/state/{session_id}", get(state::<R>))
        .route("/api/flow/cancel", post(cancel::<R>))
        .with_state(AppState { executor })
}

/// Handles `POST /api/flow/init`.
async fn init<R: FlowRegistry + Send + Sync + 'static>(
    State(state): State<AppState<R>>,
    Json(request): Json<InitRequest>,
) -> Response {
    if request.flow_type.trim().is_empty() || request.client_id.trim().is_empty() {
        return error_envelope(ApiError::invalid_request("flowType and clientId must be non-empty"));
    }
    let tenant_id = request
        .tenant_id
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .map(TenantId::from)
        .unwrap_or_else(|| TenantId::from(""));
    let session_id = generate_session_id();
    let now = clock::now();

    match state
        .executor
        .init(
            FlowType::from(request.flow_type),
            tenant_id,
            ClientId::from(request.client_id),
            request.oauth_params,
            session_id,
            now,
        )
        .await
    {
        Ok(response) => {
            let body = InitResponseBody {
                session_id: response.session_id.as_str().to_string(),
                ui_contract_version: response.ui_contract_version,
                ui_contract: response.ui_contract.into(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => error_envelope(ApiError::from(err)),
    }
}

/// Handles `POST /api/flow/submit`.
async fn submit<R: FlowRegistry + Send + Sync + 'static>(
    State(state): State<AppState<R>>,
    Json(request): Json<SubmitRequest>,
) -> Response {
    if request.session_id.trim().is_empty() || request.request_id.trim().is_empty() {
        return error_envelope(ApiError::invalid_request("sessionId and requestId must be non-empty"));
    }
    let now = clock::now();
    let result = state
        .executor
        .submit(
            request.session_id.as_str().into(),
            RequestId::from(request.request_id),
            CapabilityId::from(request.capability_id),
            request.response,
            request.tenant_id.map(TenantId::from),
            request.client_id.map(ClientId::from),
            now,
        )
        .await;

    match result {
        Ok(response) => {
            let body = SubmitResponseBody::from(response.outcome);
            let mut reply = (StatusCode::OK, Json(body)).into_response();
            if response.replayed {
                reply
                    .headers_mut()
                    .insert(IDEMPOTENT_REPLAY_HEADER, HeaderValue::from_static("true"));
            }
            reply
        }
        Err(err) => error_envelope(ApiError::from(err)),
    }
}

/// Handles `GET /api/flow/state/{sessionId}`.
async fn state<R: FlowRegistry + Send + Sync + 'static>(
    State(state): State<AppState<R>>,
    Path(session_id): Path<String>,
) -> Response {
    let now = clock::now();
    match state.executor.state(&session_id.as_str().into(), now).await {
        Ok((runtime_state, ui_contract)) => {
            let body = StateResponseBody {
                state: (&runtime_state).into(),
                ui_contract: ui_contract.into(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Handles `POST /api/flow/cancel`.
async fn cancel<R: FlowRegistry + Send + Sync + 'static>(
    State(state): State<AppState<R>>,
    Json(request): Json<CancelRequest>,
) -> Response {
    if request.session_id.trim().is_empty() {
        return ApiError::invalid_request("sessionId must be non-empty").into_response();
    }
    let session_id = request.session_id.clone();
    match state.executor.cancel(&session_id.as_str().into(), clock::now()).await {
        Ok(()) => {
            let body = CancelResponseBody {
                success: true,
                session_id,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Wraps an [`ApiError`] in the `{type:"error", error:{...}}` envelope used
/// by `init`/`submit`, where the success body is itself discriminated by type.
fn error_envelope(err: ApiError) -> Response {
    (err.status, Json(ErrorEnvelope::new(err.body))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::body::to_bytes;
    use axum::http::Request;
    use flowgate_core::core::graph::Edge;
    use flowgate_core::core::graph::GraphDefinition;
    use flowgate_core::core::graph::Node;
    use flowgate_core::core::graph::NodeKind;
    use flowgate_core::core::identifiers::FlowVersion;
    use flowgate_core::core::identifiers::GraphId;
    use flowgate_core::core::identifiers::NodeId;
    use flowgate_core::runtime::registry::InMemoryFlowRegistry;
    use flowgate_core::runtime::store::ShardedStateStore;
    use serde_json::json;
    use tower::ServiceExt;

    fn sample_graph() -> GraphDefinition {
        GraphDefinition {
            id: GraphId::from("login"),
            flow_version: FlowVersion::from("v1"),
            profile_id: "default".to_string(),
            nodes: vec![
                Node {
                    id: NodeId::from("start"),
                    kind: NodeKind::Start,
                },
                Node {
                    id: NodeId::from("identify"),
                    kind: NodeKind::Capability {
                        capability_template: json!({"kind": "identifier"}),
                    },
                },
                Node {
                    id: NodeId::from("end"),
                    kind: NodeKind::End,
                },
            ],
            edges: vec![
                Edge {
                    source_node_id: NodeId::from("start"),
                    target_node_id: NodeId::from("identify"),
                    source_handle: None,
                    before_event: None,
                    after_event: None,
                },
                Edge {
                    source_node_id: NodeId::from("identify"),
                    target_node_id: NodeId::from("end"),
                    source_handle: None,
                    before_event: None,
                    after_event: None,
                },
            ],
        }
    }

    async fn build_test_router() -> Router {
        let registry = InMemoryFlowRegistry::new();
        registry.register(&FlowType::from("login"), None, sample_graph()).await;
        let store = ShardedStateStore::new(4);
        let executor = Arc::new(Executor::new(Arc::new(registry), store));
        router(executor)
    }

    #[tokio::test]
    async fn init_returns_the_first_capability_contract() {
        let app = build_test_router().await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/flow/init")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"flowType": "login", "clientId": "client-a"}).to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["uiContract"]["capabilities"][0]["nodeId"], "identify");
        assert_eq!(body["uiContract"]["state"], "in_progress");
        assert_eq!(body["uiContract"]["intent"], "default");
    }

    #[tokio::test]
    async fn init_rejects_an_unknown_flow_type() {
        let app = build_test_router().await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/flow/init")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"flowType": "nonexistent", "clientId": "client-a"}).to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["type"], "error");
        assert_eq!(body["error"]["code"], "flow_not_found");
    }

    #[tokio::test]
    async fn submit_marks_idempotent_replay_with_a_header() {
        let app = build_test_router().await;
        let init_request = Request::builder()
            .method("POST")
            .uri("/api/flow/init")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"flowType": "login", "clientId": "client-a"}).to_string(),
            ))
            .unwrap();
        let init_response = app.clone().oneshot(init_request).await.unwrap();
        let bytes = to_bytes(init_response.into_body(), usize::MAX).await.unwrap();
        let init_body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let session_id = init_body["sessionId"].as_str().unwrap().to_string();

        let submit_body = json!({
            "sessionId": session_id,
            "requestId": "req-1",
            "capabilityId": "identify",
            "response": {"value": "ok"},
        });

        let first = Request::builder()
            .method("POST")
            .uri("/api/flow/submit")
            .header("content-type", "application/json")
            .body(Body::from(submit_body.to_string()))
            .unwrap();
        let first_response = app.clone().oneshot(first).await.unwrap();
        assert_eq!(first_response.status(), StatusCode::OK);
        assert!(first_response.headers().get(IDEMPOTENT_REPLAY_HEADER).is_none());

        let second = Request::builder()
            .method("POST")
            .uri("/api/flow/submit")
            .header("content-type", "application/json")
            .body(Body::from(submit_body.to_string()))
            .unwrap();
        let second_response = app.oneshot(second).await.unwrap();
        assert_eq!(second_response.status(), StatusCode::OK);
        assert_eq!(
            second_response.headers().get(IDEMPOTENT_REPLAY_HEADER).unwrap(),
            "true"
        );
    }
}
