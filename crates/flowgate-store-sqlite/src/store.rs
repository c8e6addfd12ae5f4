// flowgate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Flow Registry & Session Snapshot Store
// Description: Durable FlowRegistry backed by SQLite WAL, plus a session
//              snapshot table for RuntimeState.
// Purpose: Let deployments keep registered flow graphs and in-flight
//          session state across a process restart.
// Dependencies: flowgate-core, rusqlite, serde_jcs
// ============================================================================

//! ## Overview
//! Graph definitions and `RuntimeState` snapshots are stored as canonical
//! JSON (RFC 8785, the same scheme `flowgate-core` uses for its audit
//! trail) alongside a SHA-256 digest of that JSON. A load recomputes the
//! digest and fails closed on mismatch rather than deserializing tampered
//! or truncated rows. `SQLite` access is serialized through a mutex and run
//! on the blocking thread pool so this store can sit behind
//! [`flowgate_core::interfaces::FlowRegistry`], an `async_trait`, without
//! blocking the async runtime.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use flowgate_core::core::graph::GraphDefinition;
use flowgate_core::core::hashing::canonical_json_bytes;
use flowgate_core::core::hashing::hash_bytes;
use flowgate_core::core::identifiers::FlowType;
use flowgate_core::core::identifiers::SessionId;
use flowgate_core::core::identifiers::TenantId;
use flowgate_core::core::state::RuntimeState;
use flowgate_core::errors::StoreError;
use flowgate_core::interfaces::FlowRegistry;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

/// `SQLite` schema version for this store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `PRAGMA journal_mode` value for this mode.
    const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
        }
    }
}

/// Configuration for opening a [`SqliteFlowRegistry`].
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
}

/// Serde default for [`SqliteStoreConfig::busy_timeout_ms`].
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced by [`SqliteFlowRegistry`].
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored row failed digest verification on load.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Value could not be canonicalized or parsed.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Db(message) => Self::Backend(message),
            SqliteStoreError::Corrupt(message) => Self::Backend(format!("corrupt: {message}")),
            SqliteStoreError::Invalid(message) => Self::Backend(format!("invalid: {message}")),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed durable [`FlowRegistry`] plus a session snapshot table.
///
/// # Invariants
/// - `SQLite` connection access is serialized through a mutex.
/// - Every row's JSON payload is digest-verified before deserialization.
#[derive(Clone)]
pub struct SqliteFlowRegistry {
    /// Shared handle to the underlying `SQLite` connection.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteFlowRegistry {
    /// Opens (creating if absent) a `SQLite`-backed flow registry.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the database cannot be opened or initialized.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let connection = open_connection(config)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    /// Opens an in-memory `SQLite`-backed registry, useful for tests.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the schema cannot be initialized.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let mut connection = Connection::open_in_memory().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        initialize_schema(&mut connection)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    /// Locks the underlying connection, mapping mutex poisoning to a backend error.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("connection mutex poisoned".to_string()))
    }

    /// Registers `graph` under `flow_type`, optionally scoped to `tenant_id`,
    /// replacing any prior registration sharing the same key.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the graph cannot be canonicalized or the write fails.
    pub fn register_flow(
        &self,
        flow_type: &FlowType,
        tenant_id: Option<&TenantId>,
        graph: &GraphDefinition,
    ) -> Result<(), SqliteStoreError> {
        let key = registry_key(flow_type, tenant_id);
        let json = canonical_json_bytes(graph).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let digest = hash_bytes(&json);
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO flow_graphs (key, graph_json, digest) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET graph_json = excluded.graph_json, digest = excluded.digest",
                params![key, String::from_utf8_lossy(&json).into_owned(), digest.value],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(())
    }

    /// Looks up a graph definition, scoped lookup falling back to unscoped.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on a backend failure or digest mismatch.
    pub fn get_flow_blocking(
        &self,
        flow_type: &FlowType,
        tenant_id: Option<&TenantId>,
    ) -> Result<Option<GraphDefinition>, SqliteStoreError> {
        let connection = self.lock()?;
        if let Some(tenant_id) = tenant_id {
            let scoped = registry_key(flow_type, Some(tenant_id));
            if let Some(graph) = read_graph_row(&connection, &scoped)? {
                return Ok(Some(graph));
            }
        }
        read_graph_row(&connection, &registry_key(flow_type, None))
    }

    /// Persists a session snapshot, replacing any prior snapshot for the same session.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the state cannot be canonicalized or the write fails.
    pub fn save_session(&self, state: &RuntimeState) -> Result<(), SqliteStoreError> {
        let json = canonical_json_bytes(state).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let digest = hash_bytes(&json);
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO session_snapshots (session_id, state_json, digest) VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id) DO UPDATE SET state_json = excluded.state_json, digest = excluded.digest",
                params![state.session_id.as_str(), String::from_utf8_lossy(&json).into_owned(), digest.value],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(())
    }

    /// Loads a session snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on a backend failure or digest mismatch.
    pub fn load_session(&self, session_id: &SessionId) -> Result<Option<RuntimeState>, SqliteStoreError> {
        let connection = self.lock()?;
        let row: Option<(String, String)> = connection
            .query_row(
                "SELECT state_json, digest FROM session_snapshots WHERE session_id = ?1",
                params![session_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let Some((state_json, digest)) = row else {
            return Ok(None);
        };
        let recomputed = hash_bytes(state_json.as_bytes());
        if recomputed.value != digest {
            return Err(SqliteStoreError::Corrupt(format!(
                "session {} snapshot digest mismatch",
                session_id.as_str()
            )));
        }
        let state: RuntimeState =
            serde_json::from_str(&state_json).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        Ok(Some(state))
    }

    /// Deletes a session snapshot. Always succeeds, even if absent.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on a backend failure.
    pub fn delete_session(&self, session_id: &SessionId) -> Result<(), SqliteStoreError> {
        let connection = self.lock()?;
        connection
            .execute("DELETE FROM session_snapshots WHERE session_id = ?1", params![session_id.as_str()])
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl FlowRegistry for SqliteFlowRegistry {
    async fn get_flow(
        &self,
        flow_type: &FlowType,
        tenant_id: Option<&TenantId>,
    ) -> Result<Option<GraphDefinition>, StoreError> {
        let registry = self.clone();
        let flow_type = flow_type.clone();
        let tenant_id = tenant_id.cloned();
        tokio::task::spawn_blocking(move || registry.get_flow_blocking(&flow_type, tenant_id.as_ref()))
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?
            .map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the registry key `flow:{tenantId}:{flowType}` or `flow:*:{flowType}`,
/// matching `flowgate_core::runtime::registry::InMemoryFlowRegistry`.
fn registry_key(flow_type: &FlowType, tenant_id: Option<&TenantId>) -> String {
    match tenant_id {
        Some(tenant_id) => format!("flow:{}:{}", tenant_id.as_str(), flow_type.as_str()),
        None => format!("flow:*:{}", flow_type.as_str()),
    }
}

/// Reads and digest-verifies a single `flow_graphs` row by key.
fn read_graph_row(connection: &Connection, key: &str) -> Result<Option<GraphDefinition>, SqliteStoreError> {
    let row: Option<(String, String)> = connection
        .query_row(
            "SELECT graph_json, digest FROM flow_graphs WHERE key = ?1",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let Some((graph_json, digest)) = row else {
        return Ok(None);
    };
    let recomputed = hash_bytes(graph_json.as_bytes());
    if recomputed.value != digest {
        return Err(SqliteStoreError::Corrupt(format!("flow graph '{key}' digest mismatch")));
    }
    let graph: GraphDefinition =
        serde_json::from_str(&graph_json).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    Ok(Some(graph))
}

/// Opens a connection at `config.path`, applying pragmas and schema migrations.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    if let Some(parent) = config.path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_parent_dir(parent)?;
    }
    let mut connection = Connection::open(&config.path).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .pragma_update(None, "journal_mode", config.journal_mode.pragma_value())
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    initialize_schema(&mut connection)?;
    Ok(connection)
}

/// Creates the parent directory of the database file if it does not exist.
fn ensure_parent_dir(parent: &Path) -> Result<(), SqliteStoreError> {
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Db(err.to_string()))
}

/// Creates the schema tables if absent and records the schema version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_meta (version INTEGER NOT NULL);
         CREATE TABLE IF NOT EXISTS flow_graphs (
             key TEXT PRIMARY KEY,
             graph_json TEXT NOT NULL,
             digest TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS session_snapshots (
             session_id TEXT PRIMARY KEY,
             state_json TEXT NOT NULL,
             digest TEXT NOT NULL
         );",
    )
    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let existing: i64 = tx
        .query_row("SELECT COUNT(*) FROM schema_meta", [], |row| row.get(0))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    if existing == 0 {
        tx.execute("INSERT INTO schema_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))
}

#[cfg(test)]
mod tests {
    use flowgate_core::core::graph::Edge;
    use flowgate_core::core::graph::GraphDefinition;
    use flowgate_core::core::graph::Node;
    use flowgate_core::core::graph::NodeKind;
    use flowgate_core::core::identifiers::GraphId;
    use flowgate_core::core::identifiers::FlowVersion;
    use flowgate_core::core::identifiers::NodeId;

    use super::*;

    fn sample_graph() -> GraphDefinition {
        GraphDefinition {
            id: GraphId::from("g1"),
            flow_version: FlowVersion::from("v1"),
            profile_id: "login".to_string(),
            nodes: vec![
                Node { id: NodeId::from("start"), kind: NodeKind::Start },
                Node { id: NodeId::from("end"), kind: NodeKind::End },
            ],
            edges: vec![Edge {
                source_node_id: NodeId::from("start"),
                target_node_id: NodeId::from("end"),
                source_handle: None,
                before_event: None,
                after_event: None,
            }],
        }
    }

    #[tokio::test]
    async fn register_then_get_flow_round_trips() {
        let registry = SqliteFlowRegistry::open_in_memory().unwrap();
        let flow_type = FlowType::from("login");
        registry.register_flow(&flow_type, None, &sample_graph()).unwrap();
        let loaded = registry.get_flow(&flow_type, None).await.unwrap().unwrap();
        assert_eq!(loaded.id, GraphId::from("g1"));
    }

    #[tokio::test]
    async fn tenant_scoped_lookup_falls_back_to_unscoped() {
        let registry = SqliteFlowRegistry::open_in_memory().unwrap();
        let flow_type = FlowType::from("login");
        registry.register_flow(&flow_type, None, &sample_graph()).unwrap();
        let tenant_id = TenantId::from("tenant-a");
        let loaded = registry.get_flow(&flow_type, Some(&tenant_id)).await.unwrap();
        assert!(loaded.is_some());
    }

    #[tokio::test]
    async fn unregistered_flow_type_resolves_to_none() {
        let registry = SqliteFlowRegistry::open_in_memory().unwrap();
        let loaded = registry.get_flow(&FlowType::from("missing"), None).await.unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn tampered_graph_row_fails_closed_on_load() {
        let registry = SqliteFlowRegistry::open_in_memory().unwrap();
        let flow_type = FlowType::from("login");
        registry.register_flow(&flow_type, None, &sample_graph()).unwrap();
        {
            let connection = registry.lock().unwrap();
            connection
                .execute(
                    "UPDATE flow_graphs SET graph_json = '{}' WHERE key = ?1",
                    params![registry_key(&flow_type, None)],
                )
                .unwrap();
        }
        let err = registry.get_flow_blocking(&flow_type, None).unwrap_err();
        assert!(matches!(err, SqliteStoreError::Corrupt(_)));
    }

    #[test]
    fn session_snapshot_round_trips_and_deletes() {
        use flowgate_core::core::identifiers::ClientId;
        use flowgate_core::core::state::RuntimeState;
        use flowgate_core::core::time::Timestamp;

        let registry = SqliteFlowRegistry::open_in_memory().unwrap();
        let state = RuntimeState::new(
            SessionId::from("flow_1"),
            FlowType::from("login"),
            TenantId::from("tenant-a"),
            ClientId::from("client-a"),
            NodeId::from("start"),
            serde_json::Map::new(),
            Timestamp::from_millis(0),
            600_000,
            100,
        );
        registry.save_session(&state).unwrap();
        let loaded = registry.load_session(&state.session_id).unwrap().unwrap();
        assert_eq!(loaded.session_id, state.session_id);
        assert!(loaded.visited_nodes.is_empty());
        assert!(loaded.completed_capabilities.is_empty());

        registry.delete_session(&state.session_id).unwrap();
        assert!(registry.load_session(&state.session_id).unwrap().is_none());
    }
}
