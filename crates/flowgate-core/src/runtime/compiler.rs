// flowgate-core/src/runtime/compiler.rs
// ============================================================================
// Module: Flow Compiler
// Description: Validates a graph definition's invariants and compiles it into
//              an execution-ready plan.
// Purpose: Move graph-shape validation and transition resolution out of the
//          request path entirely.
// Dependencies: crate::core::graph, crate::core::plan, crate::errors
// ============================================================================

//! ## Overview
//! `compile` is deterministic and referentially transparent: the same graph
//! definition always compiles to the same plan, or fails with the same set
//! of [`CompileError`] violations. The compiler never reads the wall clock
//! or performs I/O; a cache keyed by `(graph.id, flowVersion)` is the
//! caller's responsibility (`runtime::registry`).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::HashSet;

use crate::core::graph::Edge;
use crate::core::graph::GraphDefinition;
use crate::core::graph::NodeKind;
use crate::core::identifiers::NodeId;
use crate::core::plan::CompiledBranch;
use crate::core::plan::CompiledCase;
use crate::core::plan::CompiledNode;
use crate::core::plan::CompiledNodeKind;
use crate::core::plan::CompiledPlan;
use crate::errors::CompileError;

/// Marker `sourceHandle` meaning "the default branch/case edge".
const DEFAULT_HANDLE: &str = "__default__";

/// Compiles `graph` into an execution-ready [`CompiledPlan`].
///
/// # Errors
///
/// Returns the first [`CompileError`] encountered. Callers that want every
/// violation at once should call the cheaper per-invariant checks directly;
/// this function stops at the first failure, matching how invariants are
/// expected to be fixed one at a time during authoring.
pub fn compile(graph: &GraphDefinition) -> Result<CompiledPlan, CompileError> {
    let start_node_id = validate_unique_ids_and_single_start(graph)?;
    let edges_by_source = index_edges_by_source(graph);

    let mut nodes = HashMap::with_capacity(graph.nodes.len());
    for node in &graph.nodes {
        let outgoing = edges_by_source.get(&node.id).map(Vec::as_slice).unwrap_or_default();
        let compiled = compile_node(node.id.clone(), &node.kind, outgoing, graph)?;
        nodes.insert(node.id.clone(), compiled);
    }

    validate_end_reachable(&start_node_id, &nodes)?;

    Ok(CompiledPlan {
        graph_id: graph.id.clone(),
        flow_version: graph.flow_version.clone(),
        profile_id: graph.profile_id.clone(),
        start_node_id,
        nodes,
    })
}

/// Validates unique node ids and exactly one `start` node; returns its id.
fn validate_unique_ids_and_single_start(graph: &GraphDefinition) -> Result<NodeId, CompileError> {
    let mut seen = HashSet::with_capacity(graph.nodes.len());
    let mut start: Option<NodeId> = None;
    for node in &graph.nodes {
        if !seen.insert(&node.id) {
            return Err(CompileError::DuplicateNodeId(node.id.as_str().to_string()));
        }
        if node.kind.is_start() {
            if start.is_some() {
                return Err(CompileError::InvalidStartNodeCount(2));
            }
            start = Some(node.id.clone());
        }
    }
    start.ok_or(CompileError::InvalidStartNodeCount(0))
}

/// Groups edges by their source node id, preserving author order.
fn index_edges_by_source(graph: &GraphDefinition) -> HashMap<NodeId, Vec<&Edge>> {
    let mut index: HashMap<NodeId, Vec<&Edge>> = HashMap::new();
    for edge in &graph.edges {
        index.entry(edge.source_node_id.clone()).or_default().push(edge);
    }
    index
}

/// Compiles one node, resolving its transitions against `graph`'s full node set.
fn compile_node(
    id: NodeId,
    kind: &NodeKind,
    outgoing: &[&Edge],
    graph: &GraphDefinition,
) -> Result<CompiledNode, CompileError> {
    let known_ids: HashSet<&NodeId> = graph.nodes.iter().map(|n| &n.id).collect();
    for edge in outgoing {
        if !known_ids.contains(&edge.target_node_id) {
            return Err(CompileError::UnknownNodeReference(edge.target_node_id.as_str().to_string()));
        }
    }

    match kind {
        NodeKind::Start => {
            let target = single_outgoing_edge(&id, outgoing)?;
            Ok(CompiledNode {
                id: id.clone(),
                kind: CompiledNodeKind::Start,
                next_on_success: Some(target.target_node_id.clone()),
                next_before_event: target.before_event.clone(),
                next_after_event: target.after_event.clone(),
            })
        }
        NodeKind::Capability { capability_template } => {
            let target = single_outgoing_edge(&id, outgoing)?;
            Ok(CompiledNode {
                id: id.clone(),
                kind: CompiledNodeKind::Capability {
                    capability_template: capability_template.clone(),
                },
                next_on_success: Some(target.target_node_id.clone()),
                next_before_event: target.before_event.clone(),
                next_after_event: target.after_event.clone(),
            })
        }
        NodeKind::End => Ok(CompiledNode {
            id,
            kind: CompiledNodeKind::End,
            next_on_success: None,
            next_before_event: None,
            next_after_event: None,
        }),
        NodeKind::Decision { branches, default } => {
            let mut seen_handles = HashSet::with_capacity(branches.len());
            let mut compiled_branches = Vec::with_capacity(branches.len());
            for branch in branches {
                if !seen_handles.insert(branch.id.clone()) {
                    return Err(CompileError::AmbiguousHandle(id.as_str().to_string(), branch.id.clone()));
                }
                let edge = resolve_handle(&id, outgoing, &branch.id)?;
                compiled_branches.push(CompiledBranch {
                    rule: branch.clone(),
                    target: edge.target_node_id.clone(),
                    before_event: edge.before_event.clone(),
                    after_event: edge.after_event.clone(),
                });
            }
            let default_edge = default
                .as_ref()
                .map(|handle| resolve_handle(&id, outgoing, handle))
                .transpose()?;
            Ok(CompiledNode {
                id,
                kind: CompiledNodeKind::Decision {
                    branches: compiled_branches,
                    default: default_edge.map(|edge| edge.target_node_id.clone()),
                    default_before_event: default_edge.and_then(|edge| edge.before_event.clone()),
                    default_after_event: default_edge.and_then(|edge| edge.after_event.clone()),
                },
                next_on_success: None,
                next_before_event: None,
                next_after_event: None,
            })
        }
        NodeKind::Switch {
            switch_key,
            cases,
            default,
        } => {
            let mut seen_handles = HashSet::with_capacity(cases.len());
            let mut compiled_cases = Vec::with_capacity(cases.len());
            for case in cases {
                if !seen_handles.insert(case.id.clone()) {
                    return Err(CompileError::AmbiguousHandle(id.as_str().to_string(), case.id.clone()));
                }
                let edge = resolve_handle(&id, outgoing, &case.id)?;
                compiled_cases.push(CompiledCase {
                    rule: case.clone(),
                    target: edge.target_node_id.clone(),
                    before_event: edge.before_event.clone(),
                    after_event: edge.after_event.clone(),
                });
            }
            let default_edge = default
                .as_ref()
                .map(|handle| resolve_handle(&id, outgoing, handle))
                .transpose()?;
            Ok(CompiledNode {
                id,
                kind: CompiledNodeKind::Switch {
                    switch_key: switch_key.clone(),
                    cases: compiled_cases,
                    default: default_edge.map(|edge| edge.target_node_id.clone()),
                    default_before_event: default_edge.and_then(|edge| edge.before_event.clone()),
                    default_after_event: default_edge.and_then(|edge| edge.after_event.clone()),
                },
                next_on_success: None,
                next_before_event: None,
                next_after_event: None,
            })
        }
    }
}

/// Resolves the sole outgoing edge of a linear node; rejects zero or multiple edges.
fn single_outgoing_edge<'a>(id: &NodeId, outgoing: &[&'a Edge]) -> Result<&'a Edge, CompileError> {
    match outgoing {
        [only] => Ok(only),
        other => Err(CompileError::InvalidLinearFanOut(id.as_str().to_string(), other.len())),
    }
}

/// Resolves the edge whose `sourceHandle` equals `handle`, or the default-marker edge.
fn resolve_handle<'a>(id: &NodeId, outgoing: &[&'a Edge], handle: &str) -> Result<&'a Edge, CompileError> {
    outgoing
        .iter()
        .find(|edge| edge.source_handle.as_deref() == Some(handle))
        .copied()
        .ok_or_else(|| CompileError::OrphanHandle(id.as_str().to_string(), handle.to_string()))
}

/// Breadth-first reachability check from `start` over `nodes`' linear and
/// branching transitions, failing unless at least one `end` node is reached.
fn validate_end_reachable(start: &NodeId, nodes: &HashMap<NodeId, CompiledNode>) -> Result<(), CompileError> {
    let mut visited = HashSet::new();
    let mut queue = vec![start.clone()];
    while let Some(current) = queue.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        let Some(node) = nodes.get(&current) else {
            continue;
        };
        match &node.kind {
            CompiledNodeKind::End => return Ok(()),
            CompiledNodeKind::Start | CompiledNodeKind::Capability { .. } => {
                if let Some(next) = &node.next_on_success {
                    queue.push(next.clone());
                }
            }
            CompiledNodeKind::Decision { branches, default } => {
                queue.extend(branches.iter().map(|b| b.target.clone()));
                if let Some(default) = default {
                    queue.push(default.clone());
                }
            }
            CompiledNodeKind::Switch { cases, default, .. } => {
                queue.extend(cases.iter().map(|c| c.target.clone()));
                if let Some(default) = default {
                    queue.push(default.clone());
                }
            }
        }
    }
    Err(CompileError::UnreachableEnd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::condition::Condition;
    use crate::core::condition::Leaf;
    use crate::core::condition::Operator;
    use crate::core::graph::BranchRule;
    use crate::core::graph::Node;
    use crate::core::identifiers::FlowVersion;
    use crate::core::identifiers::GraphId;
    use serde_json::json;

    fn node(id: &str, kind: NodeKind) -> Node {
        Node {
            id: NodeId::from(id),
            kind,
        }
    }

    fn edge(source: &str, target: &str) -> Edge {
        Edge {
            source_node_id: NodeId::from(source),
            target_node_id: NodeId::from(target),
            source_handle: None,
            before_event: None,
            after_event: None,
        }
    }

    fn linear_graph() -> GraphDefinition {
        GraphDefinition {
            id: GraphId::from("login"),
            flow_version: FlowVersion::from("v1"),
            profile_id: "default".to_string(),
            nodes: vec![
                node("start", NodeKind::Start),
                node(
                    "identify",
                    NodeKind::Capability {
                        capability_template: json!({"kind": "email"}),
                    },
                ),
                node("end", NodeKind::End),
            ],
            edges: vec![edge("start", "identify"), edge("identify", "end")],
        }
    }

    #[test]
    fn compiles_a_simple_linear_graph() {
        let plan = compile(&linear_graph()).unwrap();
        assert_eq!(plan.start_node_id, NodeId::from("start"));
        assert_eq!(
            plan.node(&NodeId::from("start")).unwrap().next_on_success,
            Some(NodeId::from("identify"))
        );
    }

    #[test]
    fn rejects_duplicate_node_ids() {
        let mut graph = linear_graph();
        graph.nodes.push(node("start", NodeKind::End));
        assert!(matches!(compile(&graph), Err(CompileError::DuplicateNodeId(_))));
    }

    #[test]
    fn rejects_zero_outgoing_edges_on_a_linear_node() {
        let mut graph = linear_graph();
        graph.edges.retain(|e| e.source_node_id != NodeId::from("identify"));
        assert!(matches!(compile(&graph), Err(CompileError::InvalidLinearFanOut(..))));
    }

    #[test]
    fn rejects_edges_to_unknown_nodes() {
        let mut graph = linear_graph();
        graph.edges.push(edge("end", "ghost"));
        assert!(matches!(compile(&graph), Err(CompileError::UnknownNodeReference(_))));
    }

    #[test]
    fn rejects_unreachable_end_node() {
        let graph = GraphDefinition {
            id: GraphId::from("login"),
            flow_version: FlowVersion::from("v1"),
            profile_id: "default".to_string(),
            nodes: vec![
                node("start", NodeKind::Start),
                node("island", NodeKind::End),
            ],
            edges: vec![edge("start", "start")],
        };
        assert!(matches!(compile(&graph), Err(_)));
    }

    #[test]
    fn compiles_decision_branches_with_default() {
        let mut graph = linear_graph();
        graph.nodes.insert(
            2,
            node(
                "route",
                NodeKind::Decision {
                    branches: vec![BranchRule {
                        id: "high_risk".to_string(),
                        condition: Condition::Leaf(Leaf {
                            field: "risk.score".to_string(),
                            claim_path: None,
                            operator: Operator::Gte,
                            value: json!(80),
                        }),
                    }],
                    default: Some(DEFAULT_HANDLE.to_string()),
                },
            ),
        );
        graph.edges = vec![
            edge("start", "identify"),
            edge("identify", "route"),
            Edge {
                source_node_id: NodeId::from("route"),
                target_node_id: NodeId::from("end"),
                source_handle: Some("high_risk".to_string()),
                before_event: None,
                after_event: None,
            },
            Edge {
                source_node_id: NodeId::from("route"),
                target_node_id: NodeId::from("end"),
                source_handle: Some(DEFAULT_HANDLE.to_string()),
                before_event: None,
                after_event: None,
            },
        ];
        let plan = compile(&graph).unwrap();
        let route = plan.node(&NodeId::from("route")).unwrap();
        assert!(matches!(route.kind, CompiledNodeKind::Decision { .. }));
    }

    #[test]
    fn rejects_ambiguous_shared_branch_handle() {
        let mut graph = linear_graph();
        graph.nodes.insert(
            2,
            node(
                "route",
                NodeKind::Decision {
                    branches: vec![
                        BranchRule {
                            id: "dup".to_string(),
                            condition: Condition::Leaf(Leaf {
                                field: "a".to_string(),
                                claim_path: None,
                                operator: Operator::Eq,
                                value: json!(1),
                            }),
                        },
                        BranchRule {
                            id: "dup".to_string(),
                            condition: Condition::Leaf(Leaf {
                                field: "b".to_string(),
                                claim_path: None,
                                operator: Operator::Eq,
                                value: json!(2),
                            }),
                        },
                    ],
                    default: None,
                },
            ),
        );
        graph.edges.push(edge("identify", "route"));
        assert!(matches!(compile(&graph), Err(CompileError::AmbiguousHandle(..))));
    }
}
