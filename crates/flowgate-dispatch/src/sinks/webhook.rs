// flowgate-dispatch/src/sinks/webhook.rs
// ============================================================================
// Module: Webhook Sink
// Description: AfterHookSink implementation delivering events via HTTP POST.
// Purpose: Let operators wire after-hook side effects to an external system
//          over plain HTTP, without the dispatcher core depending on reqwest.
// Dependencies: flowgate-core, reqwest, url
// ============================================================================

//! ## Overview
//! [`WebhookSink`] posts `{eventName, payload}` as a JSON body to a configured
//! URL, pinned to a DNS-resolved, policy-checked address the same way
//! [`crate::sources::http::HttpEventSource`] resolves its inbox. A non-2xx
//! response is a delivery failure.

use std::time::Duration;

use async_trait::async_trait;
use flowgate_core::interfaces::AfterHookSink;
use reqwest::Client;
use reqwest::redirect::Policy;
use serde_json::Value;
use url::Url;

use crate::sources::HostPolicy;

/// Configuration for a [`WebhookSink`].
#[derive(Debug, Clone)]
pub struct WebhookSinkConfig {
    /// Destination URL events are POSTed to.
    pub target_url: Url,
    /// Request timeout.
    pub timeout: Duration,
    /// Host policy enforced before each delivery.
    pub policy: HostPolicy,
}

impl WebhookSinkConfig {
    /// Creates a config with a 10 second timeout and the default host policy.
    #[must_use]
    pub fn new(target_url: Url) -> Self {
        Self { target_url, timeout: Duration::from_secs(10), policy: HostPolicy::new() }
    }
}

/// Delivers after-hook events to an external system via HTTP POST.
///
/// # Invariants
/// - Redirects are rejected.
/// - The target host is resolved and policy-checked on every delivery.
#[derive(Debug)]
pub struct WebhookSink {
    /// Sink configuration, including the target URL and host policy.
    config: WebhookSinkConfig,
}

impl WebhookSink {
    /// Creates a new webhook sink from the given configuration.
    #[must_use]
    pub const fn new(config: WebhookSinkConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AfterHookSink for WebhookSink {
    async fn deliver(&self, event_name: &str, payload: &Value) -> Result<(), String> {
        let url = &self.config.target_url;
        let host = url.host_str().ok_or_else(|| "webhook url has no host".to_string())?;
        let port = url.port_or_known_default().ok_or_else(|| "webhook url has no resolvable port".to_string())?;
        let resolved = self.config.policy.resolve(host, port).await.map_err(|err| err.to_string())?;

        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(self.config.timeout)
            .resolve(host, resolved)
            .build()
            .map_err(|err| format!("failed to build http client: {err}"))?;

        let body = serde_json::json!({"eventName": event_name, "payload": payload});
        let response = client
            .post(url.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|err| format!("webhook delivery failed: {err}"))?;
        if !response.status().is_success() {
            return Err(format!("webhook returned status {}", response.status()));
        }
        Ok(())
    }
}
