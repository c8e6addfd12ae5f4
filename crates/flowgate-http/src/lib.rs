// flowgate-http/src/lib.rs
// ============================================================================
// Crate: flowgate-http
// Description: Thin axum host layer over flowgate-core: one handler per
//              public Flow API endpoint, plus the internal per-shard actor
//              protocol exposed as its own non-public router.
// ============================================================================

//! ## Overview
//! This crate is the only place in the workspace that reads the wall clock
//! ([`clock::now`]) and converts it into the core's explicit `Timestamp`.
//! Everything else — idempotency, rate limiting, branch evaluation, the
//! audit trail — lives in `flowgate-core` and is exercised here only through
//! its public API.

/// One axum handler per public Flow API endpoint (`init`/`submit`/`state`/`cancel`).
pub mod api;
/// The single wall-clock read in the workspace.
pub mod clock;
/// Wire DTOs translating between the core's types and the camelCase wire format.
pub mod dto;
/// HTTP-to-wire error mapping.
pub mod error;
/// Session id generation for `init`.
pub mod ids;
/// Non-public per-shard actor protocol router.
pub mod internal;
/// TLS, listener binding, and graceful shutdown.
pub mod server;
/// Background TTL deletion alarm sweeping expired sessions off the store.
pub mod sweeper;

pub use api::router;
pub use api::AppState;
pub use api::IDEMPOTENT_REPLAY_HEADER;
pub use error::ApiError;
pub use internal::router as internal_router;
pub use internal::InternalState;
pub use server::serve;
pub use server::HttpServerConfig;
pub use server::ServerError;
pub use server::TlsPaths;
pub use sweeper::spawn_ttl_sweeper;
