// flowgate-dispatch/src/sources/http.rs
// ============================================================================
// Module: HTTP Event Source
// Description: Polls a remote inbox endpoint for externally triggered events.
// Purpose: Let an upstream system hand events to the dispatcher via a plain
//          HTTP GET, without the dispatcher core depending on a transport.
// Dependencies: flowgate-core, reqwest, url
// ============================================================================

//! ## Overview
//! [`HttpEventSource`] issues a `GET` against a configured inbox URL on each
//! `poll`. A `204 No Content` (or an empty body) means no event is pending.
//! Any other success status is parsed as a single JSON event. The target
//! host is resolved and checked against [`crate::sources::HostPolicy`] before
//! each request, and the client is pinned to the resolved address the same
//! request uses, so the policy decision cannot be bypassed by a second DNS
//! answer.

use std::time::Duration;

use async_trait::async_trait;
use flowgate_core::interfaces::EventSource;
use reqwest::Client;
use reqwest::redirect::Policy;
use serde_json::Value;
use url::Url;

use crate::sources::HostPolicy;

/// Configuration for an [`HttpEventSource`].
#[derive(Debug, Clone)]
pub struct HttpEventSourceConfig {
    /// Inbox URL polled on every call to `poll`.
    pub inbox_url: Url,
    /// Request timeout.
    pub timeout: Duration,
    /// Host policy enforced before each request.
    pub policy: HostPolicy,
}

impl HttpEventSourceConfig {
    /// Creates a config with a 10 second timeout and the default host policy.
    #[must_use]
    pub fn new(inbox_url: Url) -> Self {
        Self { inbox_url, timeout: Duration::from_secs(10), policy: HostPolicy::new() }
    }
}

/// Polls a remote HTTP inbox for the next pending event.
///
/// # Invariants
/// - Redirects are rejected; the resolved host is re-validated against policy
///   on every poll.
#[derive(Debug)]
pub struct HttpEventSource {
    /// Source configuration, including the inbox URL and host policy.
    config: HttpEventSourceConfig,
}

impl HttpEventSource {
    /// Creates a new HTTP event source from the given configuration.
    #[must_use]
    pub const fn new(config: HttpEventSourceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn poll(&self) -> Result<Option<Value>, String> {
        let url = &self.config.inbox_url;
        let host = url.host_str().ok_or_else(|| "inbox url has no host".to_string())?;
        let port = url.port_or_known_default().ok_or_else(|| "inbox url has no resolvable port".to_string())?;
        let resolved = self.config.policy.resolve(host, port).await.map_err(|err| err.to_string())?;

        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(self.config.timeout)
            .resolve(host, resolved)
            .build()
            .map_err(|err| format!("failed to build http client: {err}"))?;

        let response = client.get(url.as_str()).send().await.map_err(|err| format!("inbox poll failed: {err}"))?;
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(format!("inbox poll returned status {}", response.status()));
        }
        let bytes = response.bytes().await.map_err(|err| format!("failed to read inbox response: {err}"))?;
        if bytes.is_empty() {
            return Ok(None);
        }
        let event: Value = serde_json::from_slice(&bytes).map_err(|err| format!("invalid inbox event json: {err}"))?;
        if event.is_null() {
            return Ok(None);
        }
        Ok(Some(event))
    }
}
