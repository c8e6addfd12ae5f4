// flowgate-core/src/core/plan.rs
// ============================================================================
// Module: Flow Engine Compiled Plan
// Description: Immutable, execution-ready shape produced by the compiler.
// Purpose: Give the executor O(1) node lookup and precomputed linear
//          transitions, so request handling never walks the raw graph.
// Dependencies: crate::core::graph, crate::core::identifiers, std::collections
// ============================================================================

//! ## Overview
//! A [`CompiledPlan`] is the output of `runtime::compiler::compile` and the
//! only shape the executor ever reads at request time. It is keyed by
//! `(graph.id, flowVersion)`, cacheable, and immutable once built: nodes are
//! indexed in a map and linear (non-branching) nodes carry a precomputed
//! `next_on_success` so the executor never re-evaluates graph topology.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::graph::BranchRule;
use crate::core::graph::CaseRule;
use crate::core::identifiers::FlowVersion;
use crate::core::identifiers::GraphId;
use crate::core::identifiers::NodeId;

// ============================================================================
// SECTION: Compiled Plan
// ============================================================================

/// Execution-ready compilation of a [`crate::core::graph::GraphDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledPlan {
    /// Source graph identifier.
    pub graph_id: GraphId,
    /// Source flow version.
    pub flow_version: FlowVersion,
    /// Opaque client profile identifier, forwarded to UI Contract generation.
    pub profile_id: String,
    /// Entry node, reached by every session's `init` call.
    pub start_node_id: NodeId,
    /// All nodes, indexed by id for O(1) lookup at request time.
    pub nodes: HashMap<NodeId, CompiledNode>,
}

impl CompiledPlan {
    /// Returns the compiled node cache key for this plan.
    #[must_use]
    pub fn cache_key(&self) -> (GraphId, FlowVersion) {
        (self.graph_id.clone(), self.flow_version.clone())
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&CompiledNode> {
        self.nodes.get(id)
    }
}

/// A single compiled node plus its precomputed transition, if linear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledNode {
    /// Node identifier.
    pub id: NodeId,
    /// Type-specific compiled payload.
    pub kind: CompiledNodeKind,
    /// Precomputed successor for linear (non-branching) nodes; `None` for
    /// `decision`/`switch` nodes, whose successor is resolved by
    /// `determineNext` at request time, and for `end` nodes.
    pub next_on_success: Option<NodeId>,
    /// Event name published before `next_on_success` is taken, carried over
    /// from the source edge's `before_event`.
    #[serde(default)]
    pub next_before_event: Option<String>,
    /// Event name published after `next_on_success` is taken, carried over
    /// from the source edge's `after_event`.
    #[serde(default)]
    pub next_after_event: Option<String>,
}

/// Type-specific compiled node payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CompiledNodeKind {
    /// The single entry point of the compiled plan.
    Start,
    /// A capability node; the template is forwarded verbatim to UI Contract generation.
    Capability {
        /// Opaque capability template.
        capability_template: Value,
    },
    /// A decision node with its branch rules in declared evaluation order.
    Decision {
        /// Branch rules, evaluated in order; first match wins.
        branches: Vec<CompiledBranch>,
        /// Node reached when no branch matches and a default handle is declared.
        default: Option<NodeId>,
        /// Event name published before the default transition is taken.
        #[serde(default)]
        default_before_event: Option<String>,
        /// Event name published after the default transition is taken.
        #[serde(default)]
        default_after_event: Option<String>,
    },
    /// A switch node with its case rules in declared evaluation order.
    Switch {
        /// Dotted path resolved against the runtime context.
        switch_key: String,
        /// Case rules, evaluated in order; first match wins.
        cases: Vec<CompiledCase>,
        /// Node reached when no case matches and a default handle is declared.
        default: Option<NodeId>,
        /// Event name published before the default transition is taken.
        #[serde(default)]
        default_before_event: Option<String>,
        /// Event name published after the default transition is taken.
        #[serde(default)]
        default_after_event: Option<String>,
    },
    /// A terminal node.
    End,
}

/// A compiled decision branch: condition plus resolved target node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledBranch {
    /// Branch rule, carrying its condition.
    pub rule: BranchRule,
    /// Node reached when `rule.condition` evaluates to `true`.
    pub target: NodeId,
    /// Event name published before this branch's transition is taken.
    #[serde(default)]
    pub before_event: Option<String>,
    /// Event name published after this branch's transition is taken.
    #[serde(default)]
    pub after_event: Option<String>,
}

/// A compiled switch case: matching values plus resolved target node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledCase {
    /// Case rule, carrying its matching values.
    pub rule: CaseRule,
    /// Node reached when the resolved switch key matches `rule.values`.
    pub target: NodeId,
    /// Event name published before this case's transition is taken.
    #[serde(default)]
    pub before_event: Option<String>,
    /// Event name published after this case's transition is taken.
    #[serde(default)]
    pub after_event: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_with_single_end_node() -> CompiledPlan {
        let mut nodes = HashMap::new();
        nodes.insert(
            NodeId::from("end"),
            CompiledNode {
                id: NodeId::from("end"),
                kind: CompiledNodeKind::End,
                next_on_success: None,
                next_before_event: None,
                next_after_event: None,
            },
        );
        CompiledPlan {
            graph_id: GraphId::from("login"),
            flow_version: FlowVersion::from("v1"),
            profile_id: "default".to_string(),
            start_node_id: NodeId::from("end"),
            nodes,
        }
    }

    #[test]
    fn node_lookup_is_keyed_by_id() {
        let plan = plan_with_single_end_node();
        assert!(plan.node(&NodeId::from("end")).is_some());
        assert!(plan.node(&NodeId::from("missing")).is_none());
    }

    #[test]
    fn cache_key_pairs_graph_id_and_flow_version() {
        let plan = plan_with_single_end_node();
        assert_eq!(
            plan.cache_key(),
            (GraphId::from("login"), FlowVersion::from("v1"))
        );
    }
}
