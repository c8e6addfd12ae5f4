// flowgate-dispatch/src/sinks/mod.rs
// ============================================================================
// Module: Dispatch Sinks
// Description: Concrete AfterHookSink implementations.
// Purpose: Deliver after-hook side effects to webhooks, an audit log file,
//          or an in-process channel.
// Dependencies: flowgate-core
// ============================================================================

//! ## Overview
//! Every sink implements [`flowgate_core::interfaces::AfterHookSink`] and
//! fails closed: a delivery error is always returned rather than swallowed,
//! leaving the dispatcher's own delivery-count bookkeeping (§4.7) as the
//! single place retry/ignore policy is decided.

pub mod channel;
pub mod log;
pub mod webhook;
