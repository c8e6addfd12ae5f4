// flowgate-core/src/runtime/registry.rs
// ============================================================================
// Module: Flow Registry & Compiled Plan Cache
// Description: In-memory FlowRegistry implementation plus the compiled-plan
//              cache the Executor consults before falling back to recompile.
// Purpose: Resolve a flow type to a graph definition, and cache its compiled
//          plan keyed by (graph.id, flowVersion).
// Dependencies: crate::core::graph, crate::core::plan, crate::interfaces,
//               crate::runtime::compiler, tokio::sync::RwLock
// ============================================================================

//! ## Overview
//! [`InMemoryFlowRegistry`] is a built-in table of graph definitions, the
//! default backing for [`crate::interfaces::FlowRegistry`]; `flowgate-store-sqlite`
//! supplies a durable alternative behind the same trait. [`PlanCache`] sits in
//! front of the registry and the compiler: concurrent reads, copy-on-write
//! replace on a `flowVersion` change, no LRU eviction (plan count is bounded
//! by registered flows, per the design notes).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::graph::GraphDefinition;
use crate::core::identifiers::FlowType;
use crate::core::identifiers::GraphId;
use crate::core::identifiers::FlowVersion;
use crate::core::identifiers::TenantId;
use crate::core::plan::CompiledPlan;
use crate::errors::CompileError;
use crate::errors::StoreError;
use crate::interfaces::FlowRegistry;
use crate::runtime::compiler::compile;

/// A built-in, in-memory [`FlowRegistry`], keyed `flow:{tenantId}:{flowType}`
/// with an un-scoped fallback key `flow:*:{flowType}`.
#[derive(Debug, Default)]
pub struct InMemoryFlowRegistry {
    graphs: RwLock<HashMap<String, GraphDefinition>>,
}

impl InMemoryFlowRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `graph` under `flow_type`, optionally scoped to `tenant_id`.
    pub async fn register(&self, flow_type: &FlowType, tenant_id: Option<&TenantId>, graph: GraphDefinition) {
        let key = registry_key(flow_type, tenant_id);
        self.graphs.write().await.insert(key, graph);
    }

    /// Returns true if a record exists under the given scope, for tests.
    pub async fn contains(&self, flow_type: &FlowType, tenant_id: Option<&TenantId>) -> bool {
        self.graphs.read().await.contains_key(&registry_key(flow_type, tenant_id))
    }
}

#[async_trait]
impl FlowRegistry for InMemoryFlowRegistry {
    async fn get_flow(
        &self,
        flow_type: &FlowType,
        tenant_id: Option<&TenantId>,
    ) -> Result<Option<GraphDefinition>, StoreError> {
        let graphs = self.graphs.read().await;
        if let Some(tenant_id) = tenant_id {
            if let Some(scoped) = graphs.get(&registry_key(flow_type, Some(tenant_id))) {
                return Ok(Some(scoped.clone()));
            }
        }
        Ok(graphs.get(&registry_key(flow_type, None)).cloned())
    }
}

/// Builds the registry key `flow:{tenantId}:{flowType}` or `flow:*:{flowType}`.
fn registry_key(flow_type: &FlowType, tenant_id: Option<&TenantId>) -> String {
    match tenant_id {
        Some(tenant_id) => format!("flow:{}:{}", tenant_id.as_str(), flow_type.as_str()),
        None => format!("flow:*:{}", flow_type.as_str()),
    }
}

/// Concurrent-read, copy-on-write cache of compiled plans keyed by `(graph.id, flowVersion)`.
#[derive(Debug, Default)]
pub struct PlanCache {
    plans: RwLock<HashMap<(GraphId, FlowVersion), Arc<CompiledPlan>>>,
}

impl PlanCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached plan for `graph_id`/`flow_version`, if present.
    pub async fn get(&self, graph_id: &GraphId, flow_version: &FlowVersion) -> Option<Arc<CompiledPlan>> {
        self.plans.read().await.get(&(graph_id.clone(), flow_version.clone())).cloned()
    }

    /// Compiles `graph` and publishes the result, replacing any existing
    /// entry for the same `(graph.id, flowVersion)`.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] if `graph` violates a compiler invariant; the
    /// cache is left unchanged.
    pub async fn compile_and_cache(&self, graph: &GraphDefinition) -> Result<Arc<CompiledPlan>, CompileError> {
        let plan = Arc::new(compile(graph)?);
        self.plans.write().await.insert(plan.cache_key(), Arc::clone(&plan));
        Ok(plan)
    }
}
