// flowgate-core/src/core/state.rs
// ============================================================================
// Module: Flow Engine Runtime State
// Description: Per-session state owned by a single Flow State Store shard.
// Purpose: Hold identity, cursor, collected data, security histories, the
//          idempotency cache, and the append-only audit trail for one
//          in-flight or completed flow.
// Dependencies: crate::core::identifiers, crate::core::time, crate::core::hashing
// ============================================================================

//! ## Overview
//! A [`RuntimeState`] is owned by exactly one shard actor and mutated only
//! through `submit`/`init`/`cancel`. It never calls a wall clock: every
//! timestamp recorded here is supplied by the caller (§10.5 of the project's
//! design notes). Security histories (`request_timestamps`, `visited_nodes`)
//! and the idempotency cache are all bounded, FIFO-evicted collections so a
//! long-lived session never grows without limit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;
use std::collections::VecDeque;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::CapabilityId;
use crate::core::identifiers::ClientId;
use crate::core::identifiers::FlowType;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::RequestId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

/// Default bound on `visited_nodes` and `request_timestamps` histories.
pub const MAX_VISITED_HISTORY: usize = 200;
/// Default bound on the submit-timestamp history used for rate limiting.
pub const MAX_REQUEST_TIMESTAMPS: usize = 100;
/// Default FIFO capacity of the idempotency cache.
pub const DEFAULT_IDEMPOTENCY_CAPACITY: usize = 100;

// ============================================================================
// SECTION: Runtime State
// ============================================================================

/// Per-session state, owned by one Flow State Store shard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeState {
    /// Session identifier.
    pub session_id: SessionId,
    /// Flow type this session was initialized against.
    pub flow_type: FlowType,
    /// Tenant bound to this session at `init` time.
    pub tenant_id: TenantId,
    /// Client bound to this session at `init` time.
    pub client_id: ClientId,
    /// Node the session is currently positioned at.
    pub current_node_id: NodeId,
    /// Ordered, bounded history of nodes visited (used for cycle detection).
    pub visited_nodes: VecDeque<NodeId>,
    /// Capabilities completed so far.
    pub completed_capabilities: HashSet<CapabilityId>,
    /// Opaque per-capability responses, plus well-known context keys.
    pub collected_data: Map<String, Value>,
    /// Opaque OAuth passthrough parameters; only `redirect_uri` is read by the core.
    pub oauth_params: Map<String, Value>,
    /// Timestamp this session was created.
    pub created_at: Timestamp,
    /// Timestamp this session expires and its deletion alarm fires.
    pub expires_at: Timestamp,
    /// Bounded history of recent submit timestamps, used for rate limiting.
    pub request_timestamps: VecDeque<Timestamp>,
    /// FIFO idempotency cache of `(requestId, cachedResult)`.
    idempotency_cache: VecDeque<(RequestId, Value)>,
    /// Capacity of `idempotency_cache`; entries beyond it are evicted FIFO.
    idempotency_capacity: usize,
    /// Append-only audit trail for this session.
    pub audit_log: Vec<AuditRecord>,
}

impl RuntimeState {
    /// Creates a freshly initialized session positioned at `entry_node_id`.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        flow_type: FlowType,
        tenant_id: TenantId,
        client_id: ClientId,
        entry_node_id: NodeId,
        oauth_params: Map<String, Value>,
        created_at: Timestamp,
        ttl_ms: i64,
        idempotency_capacity: usize,
    ) -> Self {
        Self {
            session_id,
            flow_type,
            tenant_id,
            client_id,
            current_node_id: entry_node_id,
            visited_nodes: VecDeque::new(),
            completed_capabilities: HashSet::new(),
            collected_data: Map::new(),
            oauth_params,
            created_at,
            expires_at: created_at.plus_millis(ttl_ms),
            request_timestamps: VecDeque::new(),
            idempotency_cache: VecDeque::new(),
            idempotency_capacity,
            audit_log: Vec::new(),
        }
    }

    /// Returns true if `now` is at or past `expires_at`, or `created_at` is
    /// otherwise unusable — sessions fail closed rather than being treated
    /// as perpetually valid.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now.millis_since(self.expires_at) >= 0
    }

    /// Looks up a cached idempotent result for `request_id`.
    #[must_use]
    pub fn cached_result(&self, request_id: &RequestId) -> Option<&Value> {
        self.idempotency_cache
            .iter()
            .find(|(id, _)| id == request_id)
            .map(|(_, result)| result)
    }

    /// Records a new idempotent result, evicting the oldest entry if the
    /// cache is at capacity. Re-inserting an already-present `request_id`
    /// is a no-op: the first durable outcome always wins.
    pub fn record_idempotent_result(&mut self, request_id: RequestId, result: Value) {
        if self.cached_result(&request_id).is_some() {
            return;
        }
        if self.idempotency_cache.len() >= self.idempotency_capacity {
            self.idempotency_cache.pop_front();
        }
        self.idempotency_cache.push_back((request_id, result));
    }

    /// Appends `node_id` to the visited-nodes history, dropping the oldest
    /// entry once [`MAX_VISITED_HISTORY`] is exceeded.
    pub fn push_visited_node(&mut self, node_id: NodeId) {
        self.visited_nodes.push_back(node_id);
        while self.visited_nodes.len() > MAX_VISITED_HISTORY {
            self.visited_nodes.pop_front();
        }
    }

    /// Appends `timestamp` to the request-timestamp history, dropping the
    /// oldest entry once [`MAX_REQUEST_TIMESTAMPS`] is exceeded.
    pub fn push_request_timestamp(&mut self, timestamp: Timestamp) {
        self.request_timestamps.push_back(timestamp);
        while self.request_timestamps.len() > MAX_REQUEST_TIMESTAMPS {
            self.request_timestamps.pop_front();
        }
    }

    /// Counts how many times `node_id` appears in the visited-nodes history.
    #[must_use]
    pub fn visit_count(&self, node_id: &NodeId) -> usize {
        self.visited_nodes.iter().filter(|id| *id == node_id).count()
    }

    /// Counts submit timestamps within `window_ms` of `now`.
    #[must_use]
    pub fn recent_request_count(&self, now: Timestamp, window_ms: i64) -> usize {
        self.request_timestamps
            .iter()
            .filter(|ts| now.millis_since(**ts) < window_ms)
            .count()
    }

    /// Appends an audit record, bounding the log the same way visited-node
    /// history is bounded so a long-lived session cannot grow unboundedly.
    pub fn record_audit(&mut self, record: AuditRecord) {
        self.audit_log.push(record);
        while self.audit_log.len() > MAX_VISITED_HISTORY {
            self.audit_log.remove(0);
        }
    }
}

// ============================================================================
// SECTION: Audit Trail
// ============================================================================

/// The operation an [`AuditRecord`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    /// A session was created.
    Init,
    /// An idempotency probe was performed.
    CheckRequest,
    /// A capability response was submitted and a transition was taken.
    Submit,
    /// A session was cancelled.
    Cancel,
    /// A before-hook denied a transition.
    HookDenied,
    /// A before-hook raised a non-timeout error and was treated as fail-open.
    HookError,
    /// A session's TTL deletion alarm fired and evicted it from its shard.
    Expire,
}

/// Outcome recorded against an [`AuditRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The operation completed as requested.
    Success,
    /// The operation was rejected; see the record's `code`, if present.
    Rejected,
}

/// A single append-only audit entry: what happened, its outcome, and a
/// canonical hash of the request/response pair, but never the raw payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Operation this record describes.
    pub operation: AuditOperation,
    /// Whether the operation succeeded or was rejected.
    pub outcome: AuditOutcome,
    /// Stable wire error code when `outcome == Rejected`, or the recoverable
    /// hook error message for a [`AuditOperation::HookError`] record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Canonical content hash of the request/response pair.
    pub digest: HashDigest,
    /// Caller-supplied timestamp of when the operation was recorded.
    pub recorded_at: Timestamp,
}
