// flowgate-store-sqlite/src/lib.rs
// ============================================================================
// Crate: flowgate-store-sqlite
// Description: Durable FlowRegistry and session-snapshot backend over SQLite.
// ============================================================================

//! ## Overview
//! `flowgate-core`'s in-memory [`flowgate_core::interfaces::FlowRegistry`]
//! and `ShardedStateStore` are sufficient for tests and single-process
//! deployments. This crate gives deployments that need restarts to survive
//! a durable `SQLite`-backed registry of flow graph definitions plus a
//! snapshot store for `RuntimeState`, both behind the same canonical-JSON
//! hashing scheme `flowgate-core` uses for its audit trail.

pub mod store;

pub use store::SqliteFlowRegistry;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
