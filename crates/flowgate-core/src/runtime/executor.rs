// flowgate-core/src/runtime/executor.rs
// ============================================================================
// Module: Flow Executor
// Description: Stateless per-request orchestrator tying the registry, plan
//              cache, state store, and dispatcher together.
// Purpose: Implement init/submit/state/cancel exactly as specified, including
//          idempotency, session binding, rate limiting, TTL, and cycle guards.
// Dependencies: crate::core::*, crate::runtime::{registry,store,dispatcher},
//               crate::interfaces::FlowRegistry
// ============================================================================

//! ## Overview
//! The executor holds no per-process state beyond the shared [`PlanCache`]
//! and [`ShardedStateStore`]; it is safe to invoke concurrently across
//! threads. Every externally observable time value — `now`, the rate-limit
//! window, the session-timeout check — is an explicit [`Timestamp`] argument
//! rather than a wall-clock read, so the security gates stay deterministic
//! and directly testable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;

use crate::core::condition::evaluate;
use crate::core::condition::path_has_forbidden_segment;
use crate::core::condition::resolve_path;
use crate::core::event::UnifiedEvent;
use crate::core::graph::GraphDefinition;
use crate::core::identifiers::CapabilityId;
use crate::core::identifiers::ClientId;
use crate::core::identifiers::EventId;
use crate::core::identifiers::FlowType;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::RequestId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::TenantId;
use crate::core::plan::CompiledNode;
use crate::core::plan::CompiledNodeKind;
use crate::core::plan::CompiledPlan;
use crate::core::state::RuntimeState;
use crate::core::time::Timestamp;
use crate::core::ui_contract::in_progress_contract;
use crate::core::ui_contract::terminal_contract;
use crate::core::ui_contract::FlowStatus;
use crate::core::ui_contract::UiContract;
use crate::core::ui_contract::UI_CONTRACT_VERSION;
use crate::errors::ExecutorError;
use crate::interfaces::FlowRegistry;
use crate::runtime::dispatcher::Dispatcher;
use crate::runtime::registry::PlanCache;
use crate::runtime::store::InitParams;
use crate::runtime::store::ShardedStateStore;
use crate::runtime::store::SubmitParams;

/// Maximum accepted submits inside the rate-limit window.
pub const MAX_REQUESTS_PER_WINDOW: usize = 30;
/// Rate-limit sliding-window width, in milliseconds.
pub const RATE_LIMIT_WINDOW_MS: i64 = 60_000;
/// Hard session timeout since `createdAt`, in milliseconds.
pub const SESSION_TIMEOUT_MS: i64 = 1_800_000;
/// Maximum times a single node may appear in visited-node history before `circular_reference`.
pub const MAX_VISITS_PER_NODE: usize = 3;
/// Maximum visited-node history length before `flow_too_long`.
pub const MAX_TOTAL_NODES: usize = 50;
/// Default session TTL, in milliseconds.
pub const DEFAULT_FLOW_TTL_MS: i64 = 600_000;

/// Outcome of a successful `submit` call.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The flow should continue; the client receives the attached contract.
    Continue(UiContract),
    /// The flow concluded; the client should follow the OAuth redirect.
    Redirect {
        /// Redirect target URL.
        url: String,
        /// HTTP method the client should use.
        method: String,
    },
}

/// Result returned by `submit`, distinguishing a fresh outcome from an
/// idempotent replay so the HTTP layer can set the replay marker.
#[derive(Debug, Clone)]
pub struct SubmitResponse {
    /// The continue/redirect outcome.
    pub outcome: SubmitOutcome,
    /// True if this response was served from the idempotency cache.
    pub replayed: bool,
}

/// Response returned by `init`.
#[derive(Debug, Clone)]
pub struct InitResponse {
    /// Newly created session id.
    pub session_id: SessionId,
    /// UI Contract version, mirrored verbatim from the wire shape.
    pub ui_contract_version: u32,
    /// Initial UI Contract for the session's actual entry node.
    pub ui_contract: UiContract,
}

/// Orchestrates the flow lifecycle over a registry, plan cache, and state store.
pub struct Executor<R: FlowRegistry> {
    registry: Arc<R>,
    plans: PlanCache,
    store: ShardedStateStore,
    dispatcher: Dispatcher,
}

impl<R: FlowRegistry> Executor<R> {
    /// Builds an executor over the given registry and state store, with an
    /// empty dispatcher (no hooks registered, no sinks attached).
    #[must_use]
    pub fn new(registry: Arc<R>, store: ShardedStateStore) -> Self {
        Self::new_with_dispatcher(registry, store, Dispatcher::new())
    }

    /// Builds an executor with a caller-configured dispatcher. Use this when
    /// sinks need to be attached before the executor is wrapped in an `Arc`
    /// and shared across request handlers.
    #[must_use]
    pub fn new_with_dispatcher(registry: Arc<R>, store: ShardedStateStore, dispatcher: Dispatcher) -> Self {
        Self {
            registry,
            plans: PlanCache::new(),
            store,
            dispatcher,
        }
    }

    /// Returns the state store backing this executor, so a host layer can
    /// expose the per-shard actor protocol alongside the public API over
    /// the same sessions.
    #[must_use]
    pub fn store(&self) -> &ShardedStateStore {
        &self.store
    }

    /// Returns the dispatcher backing this executor, so a host layer can
    /// register before/after hook handlers once the executor is constructed.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Initializes a new session for `flow_type`, advancing past a leading
    /// `start` node so the first UI Contract is never for a start node.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::FlowNotFound`] if no graph resolves, a
    /// `CompileError`-derived init failure if the graph fails to compile, or
    /// [`ExecutorError::SessionExists`] on a session id collision.
    pub async fn init(
        &self,
        flow_type: FlowType,
        tenant_id: TenantId,
        client_id: ClientId,
        oauth_params: Map<String, Value>,
        session_id: SessionId,
        now: Timestamp,
    ) -> Result<InitResponse, ExecutorError> {
        let plan = self.resolve_plan(&flow_type, Some(&tenant_id)).await?;
        let entry_node = plan
            .node(&plan.start_node_id)
            .ok_or_else(|| ExecutorError::NodeNotFound(plan.start_node_id.as_str().to_string()))?;
        let waypoint = resolve_waypoint(entry_node, &plan, &Value::Object(Map::new()))?;
        let actual_entry_id = waypoint
            .landed
            .ok_or_else(|| ExecutorError::NextNodeNotFound(plan.start_node_id.as_str().to_string()))?;

        self.store
            .init(InitParams {
                session_id: session_id.clone(),
                flow_type,
                tenant_id,
                client_id,
                entry_node_id: actual_entry_id.clone(),
                oauth_params,
                created_at: now,
                ttl_ms: DEFAULT_FLOW_TTL_MS,
            })
            .await
            .map_err(|err| match err {
                crate::errors::StoreError::SessionExists => ExecutorError::SessionExists,
                other => ExecutorError::InitFailed(other.to_string()),
            })?;

        let actual_entry = plan
            .node(&actual_entry_id)
            .ok_or_else(|| ExecutorError::NodeNotFound(actual_entry_id.as_str().to_string()))?;
        let ui_contract = generate_ui_contract(actual_entry, &plan.profile_id, &Map::new());

        Ok(InitResponse {
            session_id,
            ui_contract_version: UI_CONTRACT_VERSION,
            ui_contract,
        })
    }

    /// Submits a capability response and advances the flow. If the resolved
    /// transition carries a `before_event`, it is published through the
    /// dispatcher before the transition commits; a deny aborts the submit
    /// with [`ExecutorError::HookDenied`] and no state is persisted. If the
    /// transition carries an `after_event`, it is published once the new
    /// state has committed, as a side effect that never affects the response.
    ///
    /// # Errors
    ///
    /// Returns the relevant [`ExecutorError`] variant for each security gate,
    /// plan/node resolution failure, before-hook denial, or state-store
    /// failure. On idempotency hit, the cached result is returned and no
    /// gate is re-evaluated.
    pub async fn submit(
        &self,
        session_id: SessionId,
        request_id: RequestId,
        capability_id: CapabilityId,
        response: Value,
        tenant_id: Option<TenantId>,
        client_id: Option<ClientId>,
        now: Timestamp,
    ) -> Result<SubmitResponse, ExecutorError> {
        let request_id_str = request_id.as_str().to_string();
        let (found, cached, mut state) = self
            .store
            .check_request(&session_id, &request_id, now)
            .await
            .map_err(|err| match err {
                crate::errors::StoreError::SessionNotFound => ExecutorError::SessionNotFound(session_id.as_str().to_string()),
                other => ExecutorError::StateFetchFailed(other.to_string()),
            })?;
        if found {
            let cached = cached.unwrap_or(Value::Null);
            return Ok(SubmitResponse {
                outcome: decode_submit_outcome(&cached),
                replayed: true,
            });
        }

        if let Some(tenant_id) = &tenant_id {
            if tenant_id != &state.tenant_id {
                return Err(ExecutorError::InvalidSession);
            }
        }
        if let Some(client_id) = &client_id {
            if client_id != &state.client_id {
                return Err(ExecutorError::InvalidSession);
            }
        }

        while state.request_timestamps.len() > crate::core::state::MAX_REQUEST_TIMESTAMPS {
            state.request_timestamps.pop_front();
        }
        let recent: VecDeque<Timestamp> = state
            .request_timestamps
            .iter()
            .copied()
            .filter(|ts| now.millis_since(*ts) < RATE_LIMIT_WINDOW_MS)
            .collect();
        if recent.len() >= MAX_REQUESTS_PER_WINDOW {
            return Err(ExecutorError::RateLimitExceeded);
        }

        if now.millis_since(state.created_at) > SESSION_TIMEOUT_MS {
            return Err(ExecutorError::SessionTimeout);
        }

        while state.visited_nodes.len() > crate::core::state::MAX_VISITED_HISTORY {
            state.visited_nodes.pop_front();
        }
        let current_node_id = state.current_node_id.clone();
        if state.visit_count(&current_node_id) >= MAX_VISITS_PER_NODE {
            return Err(ExecutorError::CircularReference);
        }
        if state.visited_nodes.len() >= MAX_TOTAL_NODES {
            return Err(ExecutorError::FlowTooLong);
        }

        let plan = self.resolve_plan(&state.flow_type, Some(&state.tenant_id)).await?;
        let current_node = plan
            .node(&state.current_node_id)
            .ok_or_else(|| ExecutorError::NodeNotFound(state.current_node_id.as_str().to_string()))?;

        let context = build_runtime_context(&state);
        let waypoint = resolve_waypoint(current_node, &plan, &context)?;

        let mut annotations = Map::new();
        let mut hook_errors = Vec::new();
        for event_name in &waypoint.before_events {
            let event = UnifiedEvent {
                id: EventId::from(format!("{request_id_str}:before:{event_name}")),
                name: event_name.clone(),
                session_id: session_id.clone(),
                occurred_at: now,
                payload: context.clone(),
                deduplication_key: None,
            };
            let result = self.dispatcher.publish(&event).await;
            if !result.success {
                let code = result
                    .denied_by
                    .map(|(_, _, code)| code)
                    .unwrap_or_else(|| "HOOK_DENIED".to_string());
                return Err(ExecutorError::HookDenied(code));
            }
            for (key, value) in result.annotations {
                annotations.insert(key, value);
            }
            for (hook_id, message) in result.recoverable_hook_errors {
                hook_errors.push(format!("{}: {message}", hook_id.as_str()));
            }
        }

        let next_node_id = waypoint.landed.clone();
        let (outcome, next_current_node_id) = match &next_node_id {
            None => {
                let redirect_url = state
                    .oauth_params
                    .get("redirect_uri")
                    .and_then(Value::as_str)
                    .unwrap_or("/callback")
                    .to_string();
                (
                    SubmitOutcome::Redirect {
                        url: redirect_url,
                        method: "GET".to_string(),
                    },
                    current_node.id.clone(),
                )
            }
            Some(next_id) => {
                let next_node = plan
                    .node(next_id)
                    .ok_or_else(|| ExecutorError::NextNodeNotFound(next_id.as_str().to_string()))?;
                if matches!(next_node.kind, CompiledNodeKind::End) {
                    let redirect_url = state
                        .oauth_params
                        .get("redirect_uri")
                        .and_then(Value::as_str)
                        .unwrap_or("/callback")
                        .to_string();
                    (
                        SubmitOutcome::Redirect {
                            url: redirect_url,
                            method: "GET".to_string(),
                        },
                        next_id.clone(),
                    )
                } else {
                    let contract = generate_ui_contract(next_node, &plan.profile_id, &state.collected_data);
                    (SubmitOutcome::Continue(contract), next_id.clone())
                }
            }
        };

        let mut visited_nodes = state.visited_nodes.clone();
        visited_nodes.push_back(current_node.id.clone());
        for hop in &waypoint.intermediate_hops {
            visited_nodes.push_back(hop.clone());
        }
        while visited_nodes.len() > crate::core::state::MAX_VISITED_HISTORY {
            visited_nodes.pop_front();
        }
        let mut request_timestamps = recent;
        request_timestamps.push_back(now);

        let result_json = encode_submit_outcome(&outcome);

        self.store
            .submit(
                &session_id,
                SubmitParams {
                    request_id,
                    capability_id,
                    response,
                    result: result_json,
                    next_node_id: next_current_node_id,
                    visited_nodes,
                    request_timestamps,
                    annotations,
                    hook_errors,
                },
            )
            .await
            .map_err(|err| ExecutorError::SubmitFailed(err.to_string()))?;

        for event_name in &waypoint.after_events {
            let event = UnifiedEvent {
                id: EventId::from(format!("{request_id_str}:after:{event_name}")),
                name: event_name.clone(),
                session_id: session_id.clone(),
                occurred_at: now,
                payload: context.clone(),
                deduplication_key: None,
            };
            let _ = self.dispatcher.publish(&event).await;
        }

        Ok(SubmitResponse {
            outcome,
            replayed: false,
        })
    }

    /// Returns the session snapshot and a freshly generated UI Contract.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::SessionNotFound`] if the session is absent or expired.
    pub async fn state(&self, session_id: &SessionId, now: Timestamp) -> Result<(RuntimeState, UiContract), ExecutorError> {
        let state = self
            .store
            .state(session_id, now)
            .await
            .map_err(|_| ExecutorError::SessionNotFound(session_id.as_str().to_string()))?;
        let plan = self.resolve_plan(&state.flow_type, Some(&state.tenant_id)).await?;
        let contract = match plan.node(&state.current_node_id) {
            Some(node) if !matches!(node.kind, CompiledNodeKind::End) => {
                generate_ui_contract(node, &plan.profile_id, &state.collected_data)
            }
            _ => terminal_contract(&plan.profile_id, FlowStatus::Completed),
        };
        Ok((state, contract))
    }

    /// Cancels a session. Always succeeds, even if the session is already absent.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::CancelFailed`] only on a state-store transport failure.
    pub async fn cancel(&self, session_id: &SessionId, now: Timestamp) -> Result<(), ExecutorError> {
        self.store
            .cancel(session_id, now)
            .await
            .map(|_| ())
            .map_err(|err| ExecutorError::CancelFailed(err.to_string()))
    }

    /// Resolves the compiled plan for `flow_type`, recompiling from the
    /// registry if absent from the cache.
    async fn resolve_plan(&self, flow_type: &FlowType, tenant_id: Option<&TenantId>) -> Result<Arc<CompiledPlan>, ExecutorError> {
        let graph: GraphDefinition = self
            .registry
            .get_flow(flow_type, tenant_id)
            .await
            .map_err(|err| ExecutorError::InitFailed(err.to_string()))?
            .ok_or_else(|| ExecutorError::FlowNotFound(flow_type.as_str().to_string()))?;

        if let Some(cached) = self.plans.get(&graph.id, &graph.flow_version).await {
            return Ok(cached);
        }
        self.plans
            .compile_and_cache(&graph)
            .await
            .map_err(|err| ExecutorError::InitFailed(err.to_string()))
    }
}

// ============================================================================
// SECTION: Branch Evaluation
// ============================================================================

/// The edge a `submit` call takes, plus the hook event names carried on that
/// edge, resolved up front so the before/after hook dispatch and the
/// transition itself always agree on which edge was taken.
#[derive(Debug, Clone, PartialEq)]
struct ResolvedTransition {
    /// Node reached by this transition, or `None` if the flow should conclude.
    target: Option<NodeId>,
    /// Event name to publish before this transition is taken, if the source
    /// edge carries one.
    before_event: Option<String>,
    /// Event name to publish after this transition is taken, if the source
    /// edge carries one.
    after_event: Option<String>,
}

/// Resolves the next node after `node`, or `None` if the flow should
/// conclude. For linear nodes returns the precomputed `nextOnSuccess`; for
/// `decision`/`switch` nodes evaluates branches/cases in declared order.
///
/// # Errors
///
/// Returns [`ExecutorError::DangerousKey`] if a switch key resolves through
/// a rejected path segment.
fn determine_next(node: &CompiledNode, _plan: &CompiledPlan, context: &Value) -> Result<ResolvedTransition, ExecutorError> {
    match &node.kind {
        CompiledNodeKind::Start | CompiledNodeKind::Capability { .. } => Ok(ResolvedTransition {
            target: node.next_on_success.clone(),
            before_event: node.next_before_event.clone(),
            after_event: node.next_after_event.clone(),
        }),
        CompiledNodeKind::End => Ok(ResolvedTransition {
            target: None,
            before_event: None,
            after_event: None,
        }),
        CompiledNodeKind::Decision {
            branches,
            default,
            default_before_event,
            default_after_event,
        } => {
            for branch in branches {
                if evaluate(&branch.rule.condition, context) {
                    return Ok(ResolvedTransition {
                        target: Some(branch.target.clone()),
                        before_event: branch.before_event.clone(),
                        after_event: branch.after_event.clone(),
                    });
                }
            }
            Ok(ResolvedTransition {
                target: default.clone(),
                before_event: default_before_event.clone(),
                after_event: default_after_event.clone(),
            })
        }
        CompiledNodeKind::Switch {
            switch_key,
            cases,
            default,
            default_before_event,
            default_after_event,
        } => {
            if path_has_forbidden_segment(switch_key) {
                return Err(ExecutorError::DangerousKey);
            }
            let Some(resolved) = resolve_path(context, switch_key) else {
                return Ok(ResolvedTransition {
                    target: default.clone(),
                    before_event: default_before_event.clone(),
                    after_event: default_after_event.clone(),
                });
            };
            for case in cases {
                if case.rule.values.contains(resolved) {
                    return Ok(ResolvedTransition {
                        target: Some(case.target.clone()),
                        before_event: case.before_event.clone(),
                        after_event: case.after_event.clone(),
                    });
                }
            }
            Ok(ResolvedTransition {
                target: default.clone(),
                before_event: default_before_event.clone(),
                after_event: default_after_event.clone(),
            })
        }
    }
}

/// Builds the runtime context used by `determineNext`: the session's
/// collected data verbatim, since `tenantId`/`clientId` are never read from
/// this context (the session's stored identity is authoritative, §4.5 step 8).
fn build_runtime_context(state: &RuntimeState) -> Value {
    Value::Object(state.collected_data.clone())
}

/// The result of walking from a node through zero or more chained
/// `decision`/`switch` hops, per §4.2: those node kinds never reach the UI
/// Contract generator, so `determineNext` is applied repeatedly until a
/// `capability` node, an `end` node, or flow conclusion is reached.
#[derive(Debug, Clone, PartialEq)]
struct Waypoint {
    /// The node the flow lands on, or `None` if the flow concludes (a
    /// decision/switch with no matching branch/case and no default).
    landed: Option<NodeId>,
    /// Decision/switch node ids passed through on the way to `landed`, in
    /// traversal order. Each one still counts as a node visit for cycle
    /// detection even though the client never sees it.
    intermediate_hops: Vec<NodeId>,
    /// Before-hook event names collected from every transition taken, in
    /// the order the transitions were taken.
    before_events: Vec<String>,
    /// After-hook event names collected from every transition taken, in
    /// the order the transitions were taken.
    after_events: Vec<String>,
}

/// Walks from `start` through chained decision/switch nodes, evaluating
/// `context` once per hop (the context does not change mid-walk; only
/// `collectedData` submitted so far feeds branch/case conditions).
///
/// # Errors
///
/// Returns [`ExecutorError::NextNodeNotFound`] if a transition names a node
/// absent from `plan`, or [`ExecutorError::FlowTooLong`] if the chain of
/// decision/switch hops exceeds [`MAX_TOTAL_NODES`] (a defensive bound; the
/// compiler does not guarantee decision/switch chains are acyclic).
fn resolve_waypoint(start: &CompiledNode, plan: &CompiledPlan, context: &Value) -> Result<Waypoint, ExecutorError> {
    let mut current = start;
    let mut intermediate_hops = Vec::new();
    let mut before_events = Vec::new();
    let mut after_events = Vec::new();
    loop {
        let transition = determine_next(current, plan, context)?;
        if let Some(name) = transition.before_event {
            before_events.push(name);
        }
        if let Some(name) = transition.after_event {
            after_events.push(name);
        }
        let Some(next_id) = transition.target else {
            return Ok(Waypoint { landed: None, intermediate_hops, before_events, after_events });
        };
        let next_node = plan
            .node(&next_id)
            .ok_or_else(|| ExecutorError::NextNodeNotFound(next_id.as_str().to_string()))?;
        match &next_node.kind {
            CompiledNodeKind::Decision { .. } | CompiledNodeKind::Switch { .. } => {
                intermediate_hops.push(next_id);
                if intermediate_hops.len() > MAX_TOTAL_NODES {
                    return Err(ExecutorError::FlowTooLong);
                }
                current = next_node;
            }
            CompiledNodeKind::Start | CompiledNodeKind::Capability { .. } | CompiledNodeKind::End => {
                return Ok(Waypoint { landed: Some(next_id), intermediate_hops, before_events, after_events });
            }
        }
    }
}

/// Projects a compiled node into its client-facing UI Contract.
fn generate_ui_contract(node: &CompiledNode, profile_id: &str, _collected_data: &Map<String, Value>) -> UiContract {
    match &node.kind {
        CompiledNodeKind::Capability { capability_template } => in_progress_contract(
            profile_id,
            node.id.clone(),
            CapabilityId::from(node.id.as_str()),
            capability_template.clone(),
        ),
        CompiledNodeKind::End => terminal_contract(profile_id, FlowStatus::Completed),
        CompiledNodeKind::Start | CompiledNodeKind::Decision { .. } | CompiledNodeKind::Switch { .. } => {
            terminal_contract(profile_id, FlowStatus::InProgress)
        }
    }
}

/// Encodes a submit outcome into the JSON shape cached for idempotent replay.
fn encode_submit_outcome(outcome: &SubmitOutcome) -> Value {
    match outcome {
        SubmitOutcome::Continue(contract) => serde_json::json!({
            "type": "continue",
            "uiContract": contract,
        }),
        SubmitOutcome::Redirect { url, method } => serde_json::json!({
            "type": "redirect",
            "redirect": {"url": url, "method": method},
        }),
    }
}

/// Decodes a cached idempotency-replay result back into a [`SubmitOutcome`].
fn decode_submit_outcome(cached: &Value) -> SubmitOutcome {
    if cached.get("type").and_then(Value::as_str) == Some("redirect") {
        let url = cached
            .pointer("/redirect/url")
            .and_then(Value::as_str)
            .unwrap_or("/callback")
            .to_string();
        let method = cached
            .pointer("/redirect/method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_string();
        return SubmitOutcome::Redirect { url, method };
    }
    let contract: UiContract = cached
        .get("uiContract")
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_else(|| terminal_contract("", FlowStatus::Completed));
    SubmitOutcome::Continue(contract)
}
