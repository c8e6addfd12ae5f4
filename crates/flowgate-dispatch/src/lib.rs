// flowgate-dispatch/src/lib.rs
// ============================================================================
// Crate: flowgate-dispatch
// Description: Concrete after-hook sinks and event sources for the dispatcher.
// Purpose: Keep flowgate-core free of transport dependencies while giving
//          deployments ready-made webhook/log/channel delivery and inbound
//          event polling.
// Dependencies: flowgate-core, reqwest, tokio, url
// ============================================================================

//! ## Overview
//! `flowgate-core`'s `Dispatcher` depends only on the [`flowgate_core::interfaces::AfterHookSink`]
//! and [`flowgate_core::interfaces::EventSource`] traits. This crate supplies
//! concrete implementations: an outbound webhook sink (SSRF-guarded HTTP
//! POST), an audit-log sink (append-only canonical-JSON-hash lines to a
//! file), an in-process channel sink, an inline in-memory event source for
//! tests, and an HTTP polling event source for inbound webhooks.
//! Invariants:
//! - Sinks never panic on delivery failure; failures are returned as `Err`.
//! - The webhook sink and HTTP event source both resolve and pin DNS before
//!   connecting, and reject requests that resolve to a private/link-local
//!   address.

pub mod error;
pub mod sinks;
pub mod sources;

pub use error::TransportError;
pub use sinks::channel::ChannelSink;
pub use sinks::channel::DispatchMessage;
pub use sinks::log::LogSink;
pub use sinks::webhook::WebhookSink;
pub use sinks::webhook::WebhookSinkConfig;
pub use sources::http::HttpEventSource;
pub use sources::http::HttpEventSourceConfig;
pub use sources::inline::InlineEventSource;
pub use sources::HostPolicy;
