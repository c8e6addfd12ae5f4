// flowgate-core/src/core/ui_contract.rs
// ============================================================================
// Module: Flow Engine UI Contract
// Description: Wire shape returned to clients describing what to render next.
// Purpose: Give clients a self-describing, capability-shaped response instead
//          of leaking internal node/graph structure.
// Dependencies: crate::core::identifiers, crate::core::graph, serde_json
// ============================================================================

//! ## Overview
//! A [`UiContract`] is the only shape a client ever sees from `init`/`submit`/
//! `state`. It carries a `state`, an `intent` describing what the flow is
//! for, feature flags the client can use to shape its rendering, the
//! capabilities still open to fulfill, and the actions available at this
//! step. Decision and switch nodes never reach the client directly; the
//! executor walks through them internally via `determineNext` before
//! generating a contract.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::CapabilityId;
use crate::core::identifiers::NodeId;

// ============================================================================
// SECTION: UI Contract
// ============================================================================

/// Wire schema version of [`UiContract`], carried verbatim as the HTTP
/// response's top-level `uiContractVersion` field on `init`.
pub const UI_CONTRACT_VERSION: u32 = 1;

/// Client-facing description of the flow's current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiContract {
    /// Wire schema version of this contract.
    pub version: u32,
    /// Current status of the flow.
    pub state: FlowStatus,
    /// High-level purpose of the flow, taken from the graph's `profileId`.
    pub intent: String,
    /// Capability-independent feature flags available at this step.
    pub features: UiContractFeatures,
    /// Capabilities still open for the client to fulfill; empty once `state` is terminal.
    pub capabilities: Vec<UiCapability>,
    /// Named actions available to the client at this step.
    pub actions: UiContractActions,
}

/// Coarse-grained flow status surfaced to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    /// The flow is awaiting a capability submission.
    InProgress,
    /// The flow reached an `end` node successfully.
    Completed,
    /// The flow was cancelled by the client or an operator.
    Cancelled,
    /// The flow's session expired before reaching an `end` node.
    Expired,
}

/// Capability-independent feature flags a [`UiContract`] carries at a step.
///
/// No policy engine or target-system registry exists in this project, so
/// `policy` is always `null` and `targets` is always empty; both fields are
/// carried so a future policy layer can populate them without a wire change.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UiContractFeatures {
    /// Opaque policy descriptor; always `null`, no policy engine is wired in.
    pub policy: Value,
    /// Target systems this step may act against; always empty, no target registry exists.
    pub targets: Vec<String>,
    /// Client-side authentication methods available at this step.
    pub auth_methods: Vec<String>,
}

/// A single capability the client may fulfill to advance the flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiCapability {
    /// Node id backing this capability, opaque to the client but useful for support/debugging.
    pub node_id: NodeId,
    /// Capability identifier naming the client-side action.
    pub capability_id: CapabilityId,
    /// Opaque template projected verbatim from the compiled node.
    pub template: Value,
}

/// A single named action the client may take at this step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiAction {
    /// Action kind, e.g. `submit` or `redirect`.
    pub action_type: String,
    /// Human-readable label for the action.
    pub label: String,
}

/// Named actions carried by a [`UiContract`]; `primary` is always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiContractActions {
    /// The action the client is expected to take next.
    pub primary: UiAction,
    /// Additional named actions beyond `primary`, if any.
    #[serde(flatten)]
    pub extra: BTreeMap<String, UiAction>,
}

/// Builds the terminal contract for a completed, cancelled, or expired session.
#[must_use]
pub fn terminal_contract(profile_id: &str, state: FlowStatus) -> UiContract {
    let (action_type, label) = match state {
        FlowStatus::Completed => ("redirect", "Continue"),
        FlowStatus::Cancelled => ("none", "Cancelled"),
        FlowStatus::Expired => ("none", "Expired"),
        FlowStatus::InProgress => ("none", "Waiting"),
    };
    UiContract {
        version: UI_CONTRACT_VERSION,
        state,
        intent: profile_id.to_string(),
        features: UiContractFeatures::default(),
        capabilities: Vec::new(),
        actions: UiContractActions {
            primary: UiAction {
                action_type: action_type.to_string(),
                label: label.to_string(),
            },
            extra: BTreeMap::new(),
        },
    }
}

/// Builds the in-progress contract pointing at the next capability.
#[must_use]
pub fn in_progress_contract(
    profile_id: &str,
    node_id: NodeId,
    capability_id: CapabilityId,
    template: Value,
) -> UiContract {
    UiContract {
        version: UI_CONTRACT_VERSION,
        state: FlowStatus::InProgress,
        intent: profile_id.to_string(),
        features: UiContractFeatures {
            policy: Value::Null,
            targets: Vec::new(),
            auth_methods: vec![capability_id.as_str().to_string()],
        },
        capabilities: vec![UiCapability {
            node_id,
            capability_id,
            template,
        }],
        actions: UiContractActions {
            primary: UiAction {
                action_type: "submit".to_string(),
                label: "Continue".to_string(),
            },
            extra: BTreeMap::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_contract_carries_no_capabilities() {
        let contract = terminal_contract("login-default", FlowStatus::Completed);
        assert!(contract.capabilities.is_empty());
        assert_eq!(contract.state, FlowStatus::Completed);
        assert_eq!(contract.intent, "login-default");
        assert_eq!(contract.actions.primary.action_type, "redirect");
    }

    #[test]
    fn in_progress_contract_projects_template_verbatim() {
        let template = json!({"kind": "otp", "length": 6});
        let contract = in_progress_contract(
            "login-default",
            NodeId::from("verify_otp"),
            CapabilityId::from("identifier_otp"),
            template.clone(),
        );
        let capability = contract
            .capabilities
            .first()
            .expect("in-progress contract has a capability");
        assert_eq!(capability.template, template);
        assert_eq!(contract.features.auth_methods, vec!["identifier_otp".to_string()]);
        assert_eq!(contract.actions.primary.action_type, "submit");
    }
}
