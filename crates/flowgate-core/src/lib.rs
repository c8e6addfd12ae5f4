// flowgate-core/src/lib.rs
// ============================================================================
// Crate: flowgate-core
// Description: Pure data model, condition evaluator, compiler, sharded state
//              store, event dispatcher, and executor for the flow engine.
// ============================================================================

//! ## Overview
//! `flowgate-core` is a transport-agnostic library: it depends on `tokio`
//! for its actor mailboxes and timeouts but never on a specific network
//! stack or storage backend. `flowgate-http` adapts it to HTTP; `flowgate-store-sqlite`
//! supplies a durable [`interfaces::FlowRegistry`]; `flowgate-dispatch`
//! supplies concrete [`interfaces::AfterHookSink`] implementations.

/// Pure data model: identifiers, time, hashing, condition evaluation, graph
/// definition, compiled plan, events, runtime state, and UI Contracts.
pub mod core;
/// Error taxonomy shared across crate boundaries.
pub mod errors;
/// Trait seams consumed by the runtime and implemented by sibling crates.
pub mod interfaces;
/// Stateful orchestration: compiler, registry, state store, dispatcher, executor.
pub mod runtime;

pub use errors::CompileError;
pub use errors::DispatchError;
pub use errors::ExecutorError;
pub use errors::StoreError;
pub use errors::WireError;
pub use runtime::executor::Executor;
pub use runtime::executor::InitResponse;
pub use runtime::executor::SubmitOutcome;
pub use runtime::executor::SubmitResponse;
