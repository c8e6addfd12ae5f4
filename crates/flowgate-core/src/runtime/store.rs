// flowgate-core/src/runtime/store.rs
// ============================================================================
// Module: Flow State Store
// Description: Sharded, single-writer-per-session actor store for runtime
//              session state.
// Purpose: Serialize all mutation of a given session through one owning
//          shard task, addressable by a stable hash of sessionId.
// Dependencies: crate::core::state, crate::errors, tokio::{sync,task}
// ============================================================================

//! ## Overview
//! Sessions are partitioned across a fixed number of shard tasks via FNV-1a
//! hashing of `sessionId`. Each shard owns an in-memory `HashMap<SessionId,
//! RuntimeState>` behind a single mailbox (`tokio::sync::mpsc`): every
//! request against a shard is handled one at a time by that shard's task, so
//! operations on a single session are linearizable without locking the whole
//! store. Every operation takes an explicit `now: Timestamp` and treats an
//! expired session as absent, deleting it and recording an
//! [`AuditOperation::Expire`] record on the spot — this catches a session
//! that is read again after expiring. The TTL "deletion alarm" itself is
//! [`ShardedStateStore::sweep_expired`]: a host layer (`flowgate-http`, which
//! already owns the wall clock) calls it on a timer so a session that is
//! never read again still gets evicted instead of leaking for the life of
//! the process. The core still never reads the wall clock itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::VecDeque;

use serde_json::Map;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use crate::core::identifiers::CapabilityId;
use crate::core::identifiers::ClientId;
use crate::core::identifiers::FlowType;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::RequestId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::TenantId;
use crate::core::hashing::hash_canonical_json;
use crate::core::state::AuditOperation;
use crate::core::state::AuditOutcome;
use crate::core::state::AuditRecord;
use crate::core::state::DEFAULT_IDEMPOTENCY_CAPACITY;
use crate::core::state::RuntimeState;
use crate::core::time::Timestamp;
use crate::errors::StoreError;

/// Default number of shard tasks; configurable via `flowgate-config`.
pub const DEFAULT_SHARD_COUNT: usize = 32;

/// Parameters for initializing a new session.
#[derive(Debug, Clone)]
pub struct InitParams {
    /// Session identifier, generated by the Executor before calling `init`.
    pub session_id: SessionId,
    /// Flow type the session was initialized against.
    pub flow_type: FlowType,
    /// Tenant bound to the session.
    pub tenant_id: TenantId,
    /// Client bound to the session.
    pub client_id: ClientId,
    /// Entry node resolved by the Executor.
    pub entry_node_id: NodeId,
    /// Opaque OAuth passthrough parameters.
    pub oauth_params: Map<String, Value>,
    /// Caller-supplied creation timestamp.
    pub created_at: Timestamp,
    /// Session lifetime in milliseconds.
    pub ttl_ms: i64,
}

/// Parameters for a durable submit write, already bounds-checked by the Executor.
#[derive(Debug, Clone)]
pub struct SubmitParams {
    /// Idempotency key for this submit.
    pub request_id: RequestId,
    /// Capability whose response is being merged into `collectedData`.
    pub capability_id: CapabilityId,
    /// Opaque capability response, merged into `collectedData[capabilityId]`.
    pub response: Value,
    /// Wire response to cache for idempotent replay.
    pub result: Value,
    /// Node the session advances to.
    pub next_node_id: NodeId,
    /// Visited-node history, already bounds-enforced by the Executor.
    pub visited_nodes: VecDeque<NodeId>,
    /// Submit-timestamp history, already bounds-enforced by the Executor.
    pub request_timestamps: VecDeque<Timestamp>,
    /// Before-hook annotations, already merged left-to-right by the Executor,
    /// folded into `collectedData.variables`.
    pub annotations: Map<String, Value>,
    /// Non-timeout before-hook errors, one per hook that failed open, recorded
    /// as [`AuditOperation::HookError`] entries rather than dropped silently.
    pub hook_errors: Vec<String>,
}

/// A single request sent to a shard's mailbox.
enum ShardRequest {
    Init {
        params: InitParams,
        idempotency_capacity: usize,
        reply: oneshot::Sender<Result<RuntimeState, StoreError>>,
    },
    CheckRequest {
        session_id: SessionId,
        request_id: RequestId,
        now: Timestamp,
        reply: oneshot::Sender<Result<(bool, Option<Value>, RuntimeState), StoreError>>,
    },
    Submit {
        session_id: SessionId,
        params: SubmitParams,
        reply: oneshot::Sender<Result<RuntimeState, StoreError>>,
    },
    State {
        session_id: SessionId,
        now: Timestamp,
        reply: oneshot::Sender<Result<RuntimeState, StoreError>>,
    },
    Cancel {
        session_id: SessionId,
        now: Timestamp,
        reply: oneshot::Sender<Option<RuntimeState>>,
    },
    Sweep {
        now: Timestamp,
        reply: oneshot::Sender<Vec<RuntimeState>>,
    },
}

/// A handle to one shard's mailbox.
#[derive(Clone)]
struct ShardHandle {
    sender: mpsc::Sender<ShardRequest>,
}

impl ShardHandle {
    fn spawn() -> Self {
        let (sender, mut receiver) = mpsc::channel::<ShardRequest>(1024);
        tokio::spawn(async move {
            let mut sessions: HashMap<SessionId, RuntimeState> = HashMap::new();
            while let Some(request) = receiver.recv().await {
                handle_request(&mut sessions, request);
            }
        });
        Self { sender }
    }
}

/// Handles one mailbox message against this shard's owned session map.
fn handle_request(sessions: &mut HashMap<SessionId, RuntimeState>, request: ShardRequest) {
    match request {
        ShardRequest::Init {
            params,
            idempotency_capacity,
            reply,
        } => {
            let result = if sessions.contains_key(&params.session_id) {
                Err(StoreError::SessionExists)
            } else {
                let recorded_at = params.created_at;
                let digest = audit_digest(&(&params.session_id, &params.flow_type, &params.entry_node_id));
                let mut state = RuntimeState::new(
                    params.session_id.clone(),
                    params.flow_type,
                    params.tenant_id,
                    params.client_id,
                    params.entry_node_id,
                    params.oauth_params,
                    params.created_at,
                    params.ttl_ms,
                    idempotency_capacity,
                );
                state.record_audit(AuditRecord {
                    operation: AuditOperation::Init,
                    outcome: AuditOutcome::Success,
                    code: None,
                    digest,
                    recorded_at,
                });
                sessions.insert(params.session_id, state.clone());
                Ok(state)
            };
            let _ = reply.send(result);
        }
        ShardRequest::CheckRequest {
            session_id,
            request_id,
            now,
            reply,
        } => {
            let result = read_live_session(sessions, &session_id, now).map(|state| {
                let cached = state.cached_result(&request_id).cloned();
                (cached.is_some(), cached, state.clone())
            });
            let _ = reply.send(result);
        }
        ShardRequest::Submit {
            session_id,
            params,
            reply,
        } => {
            let result = match sessions.get_mut(&session_id) {
                Some(state) => {
                    if state.cached_result(&params.request_id).is_none() {
                        let recorded_at = params.request_timestamps.back().copied().unwrap_or(state.created_at);
                        let digest =
                            audit_digest(&(&params.request_id, &params.capability_id, &params.next_node_id));
                        if let Some(existing) = state.collected_data.get_mut(params.capability_id.as_str()) {
                            *existing = params.response.clone();
                        } else {
                            state
                                .collected_data
                                .insert(params.capability_id.as_str().to_string(), params.response.clone());
                        }
                        state.completed_capabilities.insert(params.capability_id.clone());
                        state.current_node_id = params.next_node_id.clone();
                        state.visited_nodes = params.visited_nodes.clone();
                        state.request_timestamps = params.request_timestamps.clone();
                        state.record_idempotent_result(params.request_id.clone(), params.result.clone());
                        if !params.annotations.is_empty() {
                            let variables = state
                                .collected_data
                                .entry("variables".to_string())
                                .or_insert_with(|| Value::Object(Map::new()));
                            if let Value::Object(variables) = variables {
                                for (key, value) in &params.annotations {
                                    variables.insert(key.clone(), value.clone());
                                }
                            }
                        }
                        state.record_audit(AuditRecord {
                            operation: AuditOperation::Submit,
                            outcome: AuditOutcome::Success,
                            code: None,
                            digest,
                            recorded_at,
                        });
                        for message in &params.hook_errors {
                            state.record_audit(AuditRecord {
                                operation: AuditOperation::HookError,
                                outcome: AuditOutcome::Success,
                                code: Some(message.clone()),
                                digest: audit_digest(&message),
                                recorded_at,
                            });
                        }
                    }
                    Ok(state.clone())
                }
                None => Err(StoreError::SessionNotFound),
            };
            let _ = reply.send(result);
        }
        ShardRequest::State { session_id, now, reply } => {
            let result = read_live_session(sessions, &session_id, now).map(|state| state.clone());
            let _ = reply.send(result);
        }
        ShardRequest::Cancel { session_id, now, reply } => {
            let removed = sessions.remove(&session_id).map(|mut state| {
                let digest = audit_digest(&(&state.session_id, &state.current_node_id));
                state.record_audit(AuditRecord {
                    operation: AuditOperation::Cancel,
                    outcome: AuditOutcome::Success,
                    code: None,
                    digest,
                    recorded_at: now,
                });
                state
            });
            let _ = reply.send(removed);
        }
        ShardRequest::Sweep { now, reply } => {
            let expired: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, state)| state.is_expired(now))
                .map(|(session_id, _)| session_id.clone())
                .collect();
            let evicted = expired
                .into_iter()
                .filter_map(|session_id| evict_expired(sessions, &session_id, now))
                .collect();
            let _ = reply.send(evicted);
        }
    }
}

/// Evicts `session_id` if its TTL deletion alarm has fired by `now`,
/// recording an [`AuditOperation::Expire`] record against its final state
/// before the map entry is dropped, mirroring how `Cancel` audits the state
/// it removes. Returns the evicted state, if any.
fn evict_expired(
    sessions: &mut HashMap<SessionId, RuntimeState>,
    session_id: &SessionId,
    now: Timestamp,
) -> Option<RuntimeState> {
    sessions.remove(session_id).map(|mut state| {
        let digest = audit_digest(&(&state.session_id, &state.current_node_id));
        state.record_audit(AuditRecord {
            operation: AuditOperation::Expire,
            outcome: AuditOutcome::Success,
            code: None,
            digest,
            recorded_at: now,
        });
        state
    })
}

/// Reads a session, lazily evicting it (with an `Expire` audit record) and
/// reporting not-found if it has expired as of `now`.
fn read_live_session<'a>(
    sessions: &'a mut HashMap<SessionId, RuntimeState>,
    session_id: &SessionId,
    now: Timestamp,
) -> Result<&'a RuntimeState, StoreError> {
    let expired = sessions
        .get(session_id)
        .map(|state| state.is_expired(now))
        .unwrap_or(false);
    if expired {
        evict_expired(sessions, session_id, now);
    }
    sessions.get(session_id).ok_or(StoreError::SessionNotFound)
}

// ============================================================================
// SECTION: Sharded Store
// ============================================================================

/// A sharded Flow State Store: one actor task per shard, sessions hashed
/// onto shards by a stable FNV-1a hash of `sessionId`. Cheap to clone: each
/// shard handle is just a cloned mailbox sender, so a clone shares the same
/// underlying shard tasks and sessions rather than copying them.
#[derive(Clone)]
pub struct ShardedStateStore {
    shards: Vec<ShardHandle>,
    idempotency_capacity: usize,
}

impl ShardedStateStore {
    /// Spawns `shard_count` shard tasks.
    #[must_use]
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count).map(|_| ShardHandle::spawn()).collect(),
            idempotency_capacity: DEFAULT_IDEMPOTENCY_CAPACITY,
        }
    }

    /// Overrides the idempotency cache capacity applied to newly initialized sessions.
    #[must_use]
    pub fn with_idempotency_capacity(mut self, capacity: usize) -> Self {
        self.idempotency_capacity = capacity;
        self
    }

    /// Returns the shard index `sessionId` hashes onto, addressable as `flow-{shardIndex}`.
    #[must_use]
    pub fn shard_index(&self, session_id: &SessionId) -> usize {
        (fnv1a(session_id.as_str()) as usize) % self.shards.len()
    }

    fn shard_for(&self, session_id: &SessionId) -> &ShardHandle {
        &self.shards[self.shard_index(session_id)]
    }

    /// Creates a new session. Fails with [`StoreError::SessionExists`] if already present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the session already exists or the shard task is unreachable.
    pub async fn init(&self, params: InitParams) -> Result<RuntimeState, StoreError> {
        let (reply, rx) = oneshot::channel();
        let shard = self.shard_for(&params.session_id);
        shard
            .sender
            .send(ShardRequest::Init {
                params,
                idempotency_capacity: self.idempotency_capacity,
                reply,
            })
            .await
            .map_err(|_| StoreError::Backend("shard mailbox closed".to_string()))?;
        rx.await.map_err(|_| StoreError::Backend("shard reply dropped".to_string()))?
    }

    /// Atomic idempotency probe: returns the cached result without mutating state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SessionNotFound`] if the session is absent or expired.
    pub async fn check_request(
        &self,
        session_id: &SessionId,
        request_id: &RequestId,
        now: Timestamp,
    ) -> Result<(bool, Option<Value>, RuntimeState), StoreError> {
        let (reply, rx) = oneshot::channel();
        self.shard_for(session_id)
            .sender
            .send(ShardRequest::CheckRequest {
                session_id: session_id.clone(),
                request_id: request_id.clone(),
                now,
                reply,
            })
            .await
            .map_err(|_| StoreError::Backend("shard mailbox closed".to_string()))?;
        rx.await.map_err(|_| StoreError::Backend("shard reply dropped".to_string()))?
    }

    /// Persists a submit. Idempotent w.r.t. re-submission of the same `requestId`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SessionNotFound`] if the session is absent.
    pub async fn submit(&self, session_id: &SessionId, params: SubmitParams) -> Result<RuntimeState, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.shard_for(session_id)
            .sender
            .send(ShardRequest::Submit {
                session_id: session_id.clone(),
                params,
                reply,
            })
            .await
            .map_err(|_| StoreError::Backend("shard mailbox closed".to_string()))?;
        rx.await.map_err(|_| StoreError::Backend("shard reply dropped".to_string()))?
    }

    /// Returns the full session snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SessionNotFound`] if the session is absent or expired.
    pub async fn state(&self, session_id: &SessionId, now: Timestamp) -> Result<RuntimeState, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.shard_for(session_id)
            .sender
            .send(ShardRequest::State {
                session_id: session_id.clone(),
                now,
                reply,
            })
            .await
            .map_err(|_| StoreError::Backend("shard mailbox closed".to_string()))?;
        rx.await.map_err(|_| StoreError::Backend("shard reply dropped".to_string()))?
    }

    /// Deletes a session, recording one [`AuditOperation::Cancel`] record against
    /// its final state before the map entry is dropped. Always succeeds, even if
    /// the session is already absent (in which case there is nothing to record
    /// against, and `None` is returned).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only if the shard task itself is unreachable.
    pub async fn cancel(&self, session_id: &SessionId, now: Timestamp) -> Result<Option<RuntimeState>, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.shard_for(session_id)
            .sender
            .send(ShardRequest::Cancel {
                session_id: session_id.clone(),
                now,
                reply,
            })
            .await
            .map_err(|_| StoreError::Backend("shard mailbox closed".to_string()))?;
        rx.await.map_err(|_| StoreError::Backend("shard reply dropped".to_string()))
    }

    /// Drives the TTL deletion alarm: evicts every session expired as of
    /// `now` across all shards, recording an [`AuditOperation::Expire`]
    /// record against each before it is dropped. Intended to be called on a
    /// timer by a host layer that owns the wall clock, so a session that is
    /// never read again is still reclaimed instead of leaking for the life
    /// of the process.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only if a shard task itself is unreachable.
    pub async fn sweep_expired(&self, now: Timestamp) -> Result<Vec<RuntimeState>, StoreError> {
        let mut evicted = Vec::new();
        for shard in &self.shards {
            let (reply, rx) = oneshot::channel();
            shard
                .sender
                .send(ShardRequest::Sweep { now, reply })
                .await
                .map_err(|_| StoreError::Backend("shard mailbox closed".to_string()))?;
            let mut shard_evicted = rx.await.map_err(|_| StoreError::Backend("shard reply dropped".to_string()))?;
            evicted.append(&mut shard_evicted);
        }
        Ok(evicted)
    }
}

/// Hashes `value` for an audit record, falling back to an empty digest if
/// canonicalization fails rather than losing the record entirely.
fn audit_digest<T: serde::Serialize>(value: &T) -> crate::core::hashing::HashDigest {
    hash_canonical_json(value).unwrap_or_else(|_| crate::core::hashing::HashDigest {
        algorithm: crate::core::hashing::DEFAULT_HASH_ALGORITHM,
        value: String::new(),
    })
}

/// Stable FNV-1a hash, used to partition sessions across shards.
fn fnv1a(value: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01B3;
    let mut hash = OFFSET_BASIS;
    for byte in value.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
