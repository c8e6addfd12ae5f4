// flowgate-core/src/core/mod.rs
// ============================================================================
// Module: Core Data Model
// Description: Pure, side-effect-free types and evaluators shared by every
//              runtime subsystem.
// ============================================================================

//! ## Overview
//! Types in `core` never perform I/O and never read the wall clock; every
//! time-dependent computation takes a [`time::Timestamp`] explicitly. This
//! keeps the data model and the condition/UI-contract evaluators directly
//! unit-testable without mocking a clock.

/// Boolean condition AST and pure evaluation against a runtime context.
pub mod condition;
/// Published events, hook registrations, and deterministic pattern matching.
pub mod event;
/// Author-facing graph definition: nodes, edges, and their invariants.
pub mod graph;
/// Deterministic canonical-JSON hashing for audit records.
pub mod hashing;
/// Opaque, strongly typed identifiers.
pub mod identifiers;
/// Immutable, execution-ready compiled plan produced from a graph definition.
pub mod plan;
/// Per-session runtime state and the append-only audit trail.
pub mod state;
/// Explicit timestamp type threaded through the core instead of wall-clock reads.
pub mod time;
/// Client-facing UI Contract wire shape and its generator.
pub mod ui_contract;
