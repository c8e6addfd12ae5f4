// flowgate-core/src/errors.rs
// ============================================================================
// Module: Error Taxonomy
// Description: thiserror-derived error enums for every fallible boundary,
//              each carrying a stable wire code string.
// Purpose: Give the HTTP edge a total mapping from internal failure to
//          {code, message} without leaking internal diagnostics.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every crate-boundary error type here implements [`WireError::wire_code`],
//! a total function from variant to the stable string the HTTP layer puts on
//! the wire. Internal detail (lock state, I/O messages) stays inside the
//! `Display` message for the audit log; it is never forwarded verbatim to a
//! client.

use thiserror::Error;

/// A fallible boundary's error type exposes a stable wire code.
pub trait WireError {
    /// Returns the stable wire code for this error variant.
    fn wire_code(&self) -> &'static str;
}

/// Errors raised while compiling a [`crate::core::graph::GraphDefinition`].
#[derive(Debug, Error)]
pub enum CompileError {
    /// Two or more nodes declared the same id.
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),
    /// An edge referenced a node id absent from the graph.
    #[error("edge references unknown node: {0}")]
    UnknownNodeReference(String),
    /// The graph did not declare exactly one `start` node.
    #[error("graph must declare exactly one start node, found {0}")]
    InvalidStartNodeCount(usize),
    /// No `end` node is reachable from `start`.
    #[error("no end node is reachable from start")]
    UnreachableEnd,
    /// A linear (non-branching) node had zero or more than one outgoing edge.
    #[error("linear node {0} must have exactly one outgoing edge, found {1}")]
    InvalidLinearFanOut(String, usize),
    /// A decision or switch node declared an outgoing edge whose handle
    /// matches no branch/case id and is not the default marker.
    #[error("node {0} has an orphan edge handle: {1}")]
    OrphanHandle(String, String),
    /// Two decision branches declared the same `sourceHandle`.
    #[error("node {0} has multiple branches sharing handle: {1}")]
    AmbiguousHandle(String, String),
}

impl WireError for CompileError {
    fn wire_code(&self) -> &'static str {
        match self {
            Self::DuplicateNodeId(_)
            | Self::UnknownNodeReference(_)
            | Self::InvalidStartNodeCount(_)
            | Self::UnreachableEnd
            | Self::InvalidLinearFanOut(..)
            | Self::OrphanHandle(..)
            | Self::AmbiguousHandle(..) => "invalid_transition",
        }
    }
}

/// Errors raised by the Flow Executor's public operations.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The requested flow type has no registered graph.
    #[error("no graph registered for flow type: {0}")]
    FlowNotFound(String),
    /// The session id does not correspond to a known session.
    #[error("session not found: {0}")]
    SessionNotFound(String),
    /// The session's current node is absent from its compiled plan.
    #[error("node not found in compiled plan: {0}")]
    NodeNotFound(String),
    /// `determineNext` resolved a target node id absent from the compiled plan.
    #[error("next node not found in compiled plan: {0}")]
    NextNodeNotFound(String),
    /// No compiled plan is cached or recompilable for this session's flow type.
    #[error("no compiled plan available")]
    PlanNotFound,
    /// Caller-supplied `tenantId`/`clientId` did not match the stored session identity.
    #[error("tenant or client does not match the session's bound identity")]
    InvalidSession,
    /// `init` was called for a session id that already has durable state.
    #[error("session already exists")]
    SessionExists,
    /// More than the configured submits occurred within the rate-limit window.
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    /// The session exceeded its hard wall-clock timeout since creation.
    #[error("session timed out")]
    SessionTimeout,
    /// The current node was visited at least the configured maximum number of times.
    #[error("circular reference detected")]
    CircularReference,
    /// The session's visited-node history exceeded the configured maximum length.
    #[error("flow exceeded maximum length")]
    FlowTooLong,
    /// A switch key resolved through a rejected (prototype-pollution-prone) path segment.
    #[error("switch key resolution rejected a dangerous path segment")]
    DangerousKey,
    /// A before-hook denied the transition, carrying the hook's own deny code.
    #[error("transition denied by hook: {0}")]
    HookDenied(String),
    /// The state store failed to initialize a session.
    #[error("failed to initialize session: {0}")]
    InitFailed(String),
    /// The state store failed to persist a submit.
    #[error("failed to persist submit: {0}")]
    SubmitFailed(String),
    /// The state store failed to fetch a session snapshot.
    #[error("failed to fetch session state: {0}")]
    StateFetchFailed(String),
    /// The state store failed to cancel a session.
    #[error("failed to cancel session: {0}")]
    CancelFailed(String),
}

impl WireError for ExecutorError {
    fn wire_code(&self) -> &'static str {
        match self {
            Self::FlowNotFound(_) => "flow_not_found",
            Self::SessionNotFound(_) => "session_not_found",
            Self::NodeNotFound(_) => "node_not_found",
            Self::NextNodeNotFound(_) => "next_node_not_found",
            Self::PlanNotFound => "plan_not_found",
            Self::InvalidSession => "invalid_session",
            Self::SessionExists => "session_exists",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::SessionTimeout => "session_timeout",
            Self::CircularReference => "circular_reference",
            Self::FlowTooLong => "flow_too_long",
            Self::DangerousKey => "dangerous_key",
            Self::HookDenied(code) => {
                if code == "HOOK_TIMEOUT" {
                    "HOOK_TIMEOUT"
                } else {
                    "hook_denied"
                }
            }
            Self::InitFailed(_) => "init_failed",
            Self::SubmitFailed(_) => "submit_failed",
            Self::StateFetchFailed(_) => "state_fetch_failed",
            Self::CancelFailed(_) => "cancel_failed",
        }
    }
}

/// Errors raised by the Flow State Store actor protocol.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `init` was called against a session id with existing durable state.
    #[error("session already exists")]
    SessionExists,
    /// The requested session has no durable state (never created, cancelled, or TTL-expired).
    #[error("session not found")]
    SessionNotFound,
    /// The underlying durable backend failed.
    #[error("backend failure: {0}")]
    Backend(String),
}

impl WireError for StoreError {
    fn wire_code(&self) -> &'static str {
        match self {
            Self::SessionExists => "session_exists",
            Self::SessionNotFound => "session_not_found",
            Self::Backend(_) => "init_failed",
        }
    }
}

/// Errors raised while publishing an event or running hooks.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A before-hook timed out; treated as a deny, never a retry.
    #[error("hook timeout")]
    HookTimeout,
    /// A sink failed to deliver an after-hook side effect and `continue_on_error` was false.
    #[error("sink delivery failed: {0}")]
    SinkFailed(String),
    /// The event name or a registered pattern failed validation.
    #[error("invalid event name: {0}")]
    InvalidEventName(#[from] crate::core::event::EventNameError),
}

impl WireError for DispatchError {
    fn wire_code(&self) -> &'static str {
        match self {
            Self::HookTimeout => "HOOK_TIMEOUT",
            Self::SinkFailed(_) => "submit_failed",
            Self::InvalidEventName(_) => "invalid_transition",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_executor_error_variant_has_a_wire_code() {
        let variants = vec![
            ExecutorError::FlowNotFound("x".into()),
            ExecutorError::SessionNotFound("x".into()),
            ExecutorError::NodeNotFound("x".into()),
            ExecutorError::NextNodeNotFound("x".into()),
            ExecutorError::PlanNotFound,
            ExecutorError::InvalidSession,
            ExecutorError::SessionExists,
            ExecutorError::RateLimitExceeded,
            ExecutorError::SessionTimeout,
            ExecutorError::CircularReference,
            ExecutorError::FlowTooLong,
            ExecutorError::DangerousKey,
            ExecutorError::HookDenied("HOOK_TIMEOUT".into()),
            ExecutorError::HookDenied("custom_deny".into()),
            ExecutorError::InitFailed("x".into()),
            ExecutorError::SubmitFailed("x".into()),
            ExecutorError::StateFetchFailed("x".into()),
            ExecutorError::CancelFailed("x".into()),
        ];
        for variant in &variants {
            assert!(!variant.wire_code().is_empty());
        }
    }

    #[test]
    fn hook_timeout_deny_maps_to_the_fixed_timeout_code() {
        let err = ExecutorError::HookDenied("HOOK_TIMEOUT".into());
        assert_eq!(err.wire_code(), "HOOK_TIMEOUT");
    }
}
