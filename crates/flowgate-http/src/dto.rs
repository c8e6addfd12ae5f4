// flowgate-http/src/dto.rs
// ============================================================================
// Module: Wire DTOs
// Description: JSON request/response shapes for the public Flow API.
// Purpose: Translate between the core's internal types and the camelCase
//          wire format clients see, without leaking internal structure.
// Dependencies: flowgate_core, serde, serde_json
// ============================================================================

//! ## Overview
//! `flowgate-core` types use Rust-idiomatic snake_case field names and a
//! simplified UI Contract shape; these DTOs own the camelCase wire format and
//! the translation in both directions. No DTO here performs validation beyond
//! shape — validation lives in the handlers.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use flowgate_core::core::identifiers::CapabilityId;
use flowgate_core::core::identifiers::NodeId;
use flowgate_core::core::state::RuntimeState;
use flowgate_core::core::ui_contract::FlowStatus;
use flowgate_core::core::ui_contract::UiAction;
use flowgate_core::core::ui_contract::UiContract;
use flowgate_core::core::ui_contract::UiContractActions;
use flowgate_core::core::ui_contract::UiContractFeatures;
use flowgate_core::SubmitOutcome;

/// Body of `POST /api/flow/init`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    /// Flow type to initialize.
    pub flow_type: String,
    /// Client identifier bound to the new session.
    pub client_id: String,
    /// Optional tenant identifier; absent means the unscoped registry entry is used.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Opaque OAuth passthrough parameters.
    #[serde(default)]
    pub oauth_params: Map<String, Value>,
}

/// Success body of `POST /api/flow/init`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponseBody {
    /// Newly created session id.
    pub session_id: String,
    /// UI Contract version.
    pub ui_contract_version: u32,
    /// Initial UI Contract.
    pub ui_contract: UiContractWire,
}

/// Body of `POST /api/flow/submit`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Session to advance.
    pub session_id: String,
    /// Caller-supplied idempotency key.
    pub request_id: String,
    /// Capability being fulfilled.
    pub capability_id: String,
    /// Opaque capability response payload.
    pub response: Value,
    /// Optional tenant id to re-validate against the session's bound identity.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Optional client id to re-validate against the session's bound identity.
    #[serde(default)]
    pub client_id: Option<String>,
}

/// Success body of `POST /api/flow/submit`, tagged by `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubmitResponseBody {
    /// The flow continues; the client receives the next UI Contract.
    Continue {
        /// The next UI Contract.
        ui_contract: UiContractWire,
    },
    /// The flow concluded; the client should follow the redirect.
    Redirect {
        /// Redirect instructions.
        redirect: RedirectWire,
    },
}

/// Redirect target carried by a concluded flow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectWire {
    /// Redirect target URL.
    pub url: String,
    /// HTTP method the client should use.
    pub method: String,
}

/// Success body of `GET /api/flow/state/:sessionId`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponseBody {
    /// Snapshot of session progress.
    pub state: StateWire,
    /// Freshly generated UI Contract for the session's current node.
    pub ui_contract: UiContractWire,
}

/// Minimal session progress snapshot exposed to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateWire {
    /// Node the session is currently positioned at.
    pub current_node_id: String,
    /// Ordered history of visited node ids.
    pub visited_node_ids: Vec<String>,
    /// Capabilities completed so far.
    pub completed_capabilities: Vec<String>,
}

/// Body of `POST /api/flow/cancel`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    /// Session to cancel.
    pub session_id: String,
}

/// Success body of `POST /api/flow/cancel`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponseBody {
    /// Always true; cancellation never fails on an absent session.
    pub success: bool,
    /// Echoed session id.
    pub session_id: String,
}

/// Wire shape of a UI Contract.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiContractWire {
    /// Wire schema version of this contract.
    pub version: u32,
    /// Current state of the flow.
    pub state: &'static str,
    /// High-level purpose of the flow.
    pub intent: String,
    /// Capability-independent feature flags available at this step.
    pub features: UiContractFeaturesWire,
    /// Capabilities still open for the client to fulfill.
    pub capabilities: Vec<UiCapabilityWire>,
    /// Named actions available to the client at this step.
    pub actions: UiContractActionsWire,
}

/// Wire shape of [`UiContractFeatures`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiContractFeaturesWire {
    /// Opaque policy descriptor.
    pub policy: Value,
    /// Target systems this step may act against.
    pub targets: Vec<String>,
    /// Client-side authentication methods available at this step.
    pub auth_methods: Vec<String>,
}

/// Wire shape of a capability the client may fulfill.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiCapabilityWire {
    /// Node id backing this capability.
    pub node_id: String,
    /// Capability identifier naming the client-side action.
    pub capability_id: String,
    /// Opaque template projected verbatim from the compiled node.
    pub template: Value,
}

/// Wire shape of a single named action.
#[derive(Debug, Clone, Serialize)]
pub struct UiActionWire {
    /// Action kind, e.g. `submit` or `redirect`.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Human-readable label for the action.
    pub label: String,
}

/// Wire shape of the `actions` object; `primary` plus any named extras.
#[derive(Debug, Clone, Serialize)]
pub struct UiContractActionsWire {
    /// The action the client is expected to take next.
    pub primary: UiActionWire,
    /// Additional named actions beyond `primary`, if any.
    #[serde(flatten)]
    pub extra: BTreeMap<String, UiActionWire>,
}

impl From<UiContract> for UiContractWire {
    fn from(contract: UiContract) -> Self {
        Self {
            version: contract.version,
            state: status_label(contract.state),
            intent: contract.intent,
            features: contract.features.into(),
            capabilities: contract.capabilities.into_iter().map(UiCapabilityWire::from).collect(),
            actions: contract.actions.into(),
        }
    }
}

impl From<UiContractFeatures> for UiContractFeaturesWire {
    fn from(features: UiContractFeatures) -> Self {
        Self {
            policy: features.policy,
            targets: features.targets,
            auth_methods: features.auth_methods,
        }
    }
}

impl From<flowgate_core::core::ui_contract::UiCapability> for UiCapabilityWire {
    fn from(capability: flowgate_core::core::ui_contract::UiCapability) -> Self {
        Self {
            node_id: capability.node_id.as_str().to_string(),
            capability_id: capability.capability_id.as_str().to_string(),
            template: capability.template,
        }
    }
}

impl From<UiAction> for UiActionWire {
    fn from(action: UiAction) -> Self {
        Self {
            action_type: action.action_type,
            label: action.label,
        }
    }
}

impl From<UiContractActions> for UiContractActionsWire {
    fn from(actions: UiContractActions) -> Self {
        Self {
            primary: actions.primary.into(),
            extra: actions.extra.into_iter().map(|(key, action)| (key, action.into())).collect(),
        }
    }
}

/// Maps a [`FlowStatus`] to its wire string.
fn status_label(status: FlowStatus) -> &'static str {
    match status {
        FlowStatus::InProgress => "in_progress",
        FlowStatus::Completed => "completed",
        FlowStatus::Cancelled => "cancelled",
        FlowStatus::Expired => "expired",
    }
}

impl From<SubmitOutcome> for SubmitResponseBody {
    fn from(outcome: SubmitOutcome) -> Self {
        match outcome {
            SubmitOutcome::Continue(contract) => Self::Continue {
                ui_contract: contract.into(),
            },
            SubmitOutcome::Redirect { url, method } => Self::Redirect {
                redirect: RedirectWire { url, method },
            },
        }
    }
}

impl From<&RuntimeState> for StateWire {
    fn from(state: &RuntimeState) -> Self {
        Self {
            current_node_id: state.current_node_id.as_str().to_string(),
            visited_node_ids: state.visited_nodes.iter().map(|id: &NodeId| id.as_str().to_string()).collect(),
            completed_capabilities: state
                .completed_capabilities
                .iter()
                .map(|id: &CapabilityId| id.as_str().to_string())
                .collect(),
        }
    }
}

/// `{code, message}` error body shared by every endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Stable wire error code.
    pub code: String,
    /// Human-friendly message; never internal diagnostics.
    pub message: String,
}

/// `{type:"error", error:{code,message}}` envelope used by `init`/`submit`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorEnvelope {
    /// Discriminator, always the literal `"error"`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// The underlying error body.
    pub error: ErrorBody,
}

impl ErrorEnvelope {
    /// Wraps `body` in the `type:"error"` envelope.
    #[must_use]
    pub const fn new(body: ErrorBody) -> Self {
        Self { kind: "error", error: body }
    }
}
