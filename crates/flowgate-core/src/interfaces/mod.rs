// flowgate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Runtime Interfaces
// Description: Trait seams the runtime depends on, implemented in-memory here
//              and durably/transport-ly in sibling crates.
// Purpose: Keep flowgate-core free of transport and storage dependencies.
// ============================================================================

//! ## Overview
//! `flowgate-core` depends only on these traits, never on a concrete
//! transport or storage technology. `flowgate-store-sqlite` implements
//! [`FlowRegistry`] durably; `flowgate-dispatch` implements [`AfterHookSink`]
//! and [`EventSource`] over webhooks, logs, and in-process channels.

use async_trait::async_trait;

use crate::core::graph::GraphDefinition;
use crate::core::identifiers::FlowType;
use crate::core::identifiers::TenantId;
use crate::errors::StoreError;

/// Resolves a flow type (optionally scoped to a tenant) to a graph definition.
///
/// Backed by a built-in table first, then an opaque key/value store keyed
/// `flow:{tenantId}:{flowType}` (§6.4). A basic shape check at the boundary
/// rejects malformed records before they reach the compiler.
#[async_trait]
pub trait FlowRegistry: Send + Sync {
    /// Looks up the graph definition for `flow_type`, optionally scoped to `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing store is unreachable. A
    /// resolvable-but-absent flow type returns `Ok(None)`, not an error.
    async fn get_flow(
        &self,
        flow_type: &FlowType,
        tenant_id: Option<&TenantId>,
    ) -> Result<Option<GraphDefinition>, StoreError>;
}

/// Delivers an after-hook side effect to a concrete transport.
///
/// Implemented by `flowgate-dispatch` for webhooks, audit-log sinks, and
/// in-process channel handlers, so the dispatcher core never depends on a
/// specific transport.
#[async_trait]
pub trait AfterHookSink: Send + Sync {
    /// Delivers `payload` for the named event. Implementations apply their
    /// own timeout; the dispatcher only observes success/failure.
    ///
    /// # Errors
    ///
    /// Returns a human-readable failure description on delivery failure.
    async fn deliver(&self, event_name: &str, payload: &serde_json::Value) -> Result<(), String>;
}

/// A source of externally triggered events (e.g. an inbound webhook or queue
/// consumer) that the dispatcher can be wired to ingest.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Polls for the next externally produced event, if any is pending.
    ///
    /// # Errors
    ///
    /// Returns a human-readable failure description on transport failure.
    async fn poll(&self) -> Result<Option<serde_json::Value>, String>;
}
