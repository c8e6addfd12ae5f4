// flowgate-core/src/runtime/dispatcher.rs
// ============================================================================
// Module: Event Dispatcher, Hook & Handler Registries
// Description: Publishes UnifiedEvents through before-hooks, business logic,
//              and after-hooks, with deduplication and deterministic pattern
//              matching.
// Purpose: Decouple flow transitions and side effects from any specific
//          transport; sinks are injected via crate::interfaces::AfterHookSink.
// Dependencies: crate::core::event, crate::interfaces, tokio::{sync,time}
// ============================================================================

//! ## Overview
//! [`Dispatcher::publish`] runs before-hooks in priority-descending order,
//! each bounded by its own `timeout_ms` — a timeout always denies
//! (`HOOK_TIMEOUT`); any other hook error (`BeforeHookHandler::handle`
//! returning `Err`) is recorded in [`PublishResult::recoverable_hook_errors`]
//! and treated as `{continue: true}` (fail-open for incidental bugs,
//! fail-closed for timeouts, per the project's recorded policy decision).
//! Allowing hooks may also return annotations, merged left-to-right into
//! [`PublishResult::annotations`] with later hooks overwriting earlier keys.
//! Once the event is allowed, after-hooks run: synchronous ones are awaited,
//! asynchronous ones are fire-and-forget through the registered
//! [`AfterHookSink`]s. Before any of that, `publish` consults a
//! deduplication cache keyed by [`UnifiedEvent::dedup_key`] (the explicit
//! `deduplication_key` if set, else the event id); a hit within the
//! configured TTL (one hour by default) short-circuits to
//! `{deduplicated: true}` with no hook run and no side effect attempted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::event::AfterHookRegistration;
use crate::core::event::BeforeHookOutcome;
use crate::core::event::BeforeHookRegistration;
use crate::core::event::EventPattern;
use crate::core::event::UnifiedEvent;
use crate::core::identifiers::HookId;
use crate::core::time::Timestamp;
use crate::interfaces::AfterHookSink;

/// Default before-hook timeout, applied when a registration omits one.
pub const DEFAULT_BEFORE_HOOK_TIMEOUT_MS: u64 = 5_000;
/// Default after-hook timeout, applied when a registration omits one.
pub const DEFAULT_AFTER_HOOK_TIMEOUT_MS: u64 = 30_000;
/// Default registration priority.
pub const DEFAULT_HOOK_PRIORITY: i32 = 0;
/// Default deduplication-cache TTL: one hour.
pub const DEFAULT_DEDUPLICATION_TTL_MS: i64 = 3_600_000;

/// Outcome of a single before-hook invocation.
#[derive(Debug, Clone)]
pub struct BeforeHookResult {
    /// Whether the pipeline may continue.
    pub outcome: BeforeHookOutcome,
    /// Human-readable deny reason, set when `outcome == Deny`.
    pub deny_reason: Option<String>,
    /// Stable deny code, set when `outcome == Deny`.
    pub deny_code: Option<String>,
    /// Context annotations to merge into downstream processing.
    pub annotations: serde_json::Map<String, serde_json::Value>,
}

impl BeforeHookResult {
    /// Builds an allowing result with no annotations.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            outcome: BeforeHookOutcome::Allow,
            deny_reason: None,
            deny_code: None,
            annotations: serde_json::Map::new(),
        }
    }

    /// Builds a denying result with the given reason and code.
    #[must_use]
    pub fn deny(reason: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            outcome: BeforeHookOutcome::Deny,
            deny_reason: Some(reason.into()),
            deny_code: Some(code.into()),
            annotations: serde_json::Map::new(),
        }
    }
}

/// A callable before-hook body.
#[async_trait]
pub trait BeforeHookHandler: Send + Sync {
    /// Validates or annotates `event` before the transition it guards commits.
    ///
    /// # Errors
    ///
    /// A non-timeout `Err` is treated as fail-open (`{continue: true}`) and
    /// recorded in [`PublishResult::recoverable_hook_errors`]; a timeout
    /// (enforced by the caller via the registration's `timeout_ms`) is the
    /// only outcome that denies.
    async fn handle(&self, event: &UnifiedEvent) -> Result<BeforeHookResult, String>;
}

/// A callable after-hook body, delivered through an [`AfterHookSink`].
#[async_trait]
pub trait AfterHookHandler: Send + Sync {
    /// Performs a side effect for `event` once the transition it follows has committed.
    ///
    /// # Errors
    ///
    /// Returns a human-readable failure description on failure.
    async fn handle(&self, event: &UnifiedEvent) -> Result<(), String>;
}

/// Delivery counts for one category of after-hook side effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryCounts {
    /// Deliveries that completed without error.
    pub sent: u32,
    /// Deliveries that errored or timed out.
    pub failed: u32,
    /// Deliveries never attempted because the event was denied before they ran.
    pub skipped: u32,
}

/// Breakdown of after-hook side-effect delivery for one published event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Delivery counts for registered [`AfterHookSink`]s (the "webhooks" channel).
    pub webhooks: DeliveryCounts,
    /// Delivery counts for registered [`AfterHookHandler`]s (the "handlers" channel).
    pub handlers: DeliveryCounts,
}

/// Result of publishing one event through the dispatcher.
#[derive(Debug, Clone)]
pub struct PublishResult {
    /// True if this publish was a deduplication-cache hit: no hook ran and
    /// no side effect was attempted.
    pub deduplicated: bool,
    /// Whether the event was allowed through every before-hook.
    pub success: bool,
    /// Before-hooks that denied the event, in evaluation order, stopping at the first deny.
    pub denied_by: Option<(HookId, String, String)>,
    /// Non-timeout errors raised by before-hooks, in evaluation order. Each
    /// one was treated as fail-open and did not stop the pipeline.
    pub recoverable_hook_errors: Vec<(HookId, String)>,
    /// Annotations from every allowing before-hook, merged left-to-right in
    /// priority-descending evaluation order; a later hook's keys overwrite
    /// an earlier hook's.
    pub annotations: serde_json::Map<String, serde_json::Value>,
    /// After-hooks that failed delivery and were not configured to continue past the failure.
    pub after_hook_errors: Vec<(HookId, String)>,
    /// Per-channel delivery counts for this event's after-hook side effects.
    pub delivery: DeliveryReport,
}

// ============================================================================
// SECTION: Hook Registry
// ============================================================================

/// A single registration entry paired with its callable body.
struct Entry<H: ?Sized> {
    registration_priority: i32,
    enabled: bool,
    handler: Arc<H>,
}

/// An in-memory registry of before- or after-hooks, keyed by [`HookId`].
///
/// Registration with an existing id replaces the prior entry. Reads
/// (`matches_for`) are the hot path; writes (`register`/`set_enabled`) are
/// rare and take a short exclusive lock.
pub struct HookRegistry<R, H: ?Sized> {
    entries: RwLock<HashMap<HookId, (R, Entry<H>)>>,
}

impl<R, H: ?Sized> Default for HookRegistry<R, H> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<R, H: ?Sized> HookRegistry<R, H>
where
    R: Clone,
{
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `registration`, replacing any existing entry sharing its id.
    pub async fn register(&self, id: HookId, registration: R, priority: i32, handler: Arc<H>) {
        self.entries.write().await.insert(
            id,
            (
                registration,
                Entry {
                    registration_priority: priority,
                    enabled: true,
                    handler,
                },
            ),
        );
    }

    /// Removes a registration by id.
    pub async fn unregister(&self, id: &HookId) {
        self.entries.write().await.remove(id);
    }

    /// Enables or disables a registration without removing it.
    pub async fn set_enabled(&self, id: &HookId, enabled: bool) {
        if let Some((_, entry)) = self.entries.write().await.get_mut(id) {
            entry.enabled = enabled;
        }
    }
}

impl<H: ?Sized> HookRegistry<BeforeHookRegistration, H> {
    /// Returns enabled before-hook registrations whose pattern matches
    /// `event_name`, in priority-descending order.
    pub async fn matches_for(&self, event_name: &str) -> Vec<(HookId, u64, Arc<H>)> {
        matching_entries(&self.entries, event_name, |registration| &registration.pattern)
            .await
            .into_iter()
            .map(|(id, registration, handler)| (id, registration.timeout_ms, handler))
            .collect()
    }
}

impl<H: ?Sized> HookRegistry<AfterHookRegistration, H> {
    /// Returns enabled after-hook registrations whose pattern matches
    /// `event_name`, in priority-descending order.
    pub async fn matches_for(&self, event_name: &str) -> Vec<(HookId, AfterHookRegistration, Arc<H>)> {
        matching_entries(&self.entries, event_name, |registration| &registration.pattern).await
    }
}

/// Shared matching logic: filter enabled + pattern-matching entries, then
/// sort by declared priority, descending.
async fn matching_entries<R, H: ?Sized>(
    entries: &RwLock<HashMap<HookId, (R, Entry<H>)>>,
    event_name: &str,
    pattern_of: impl Fn(&R) -> &EventPattern,
) -> Vec<(HookId, R, Arc<H>)>
where
    R: Clone,
{
    let guard = entries.read().await;
    let mut matches: Vec<(HookId, R, Arc<H>, i32)> = guard
        .iter()
        .filter(|(_, (_, entry))| entry.enabled)
        .filter(|(_, (registration, _))| pattern_of(registration).matches(event_name))
        .map(|(id, (registration, entry))| {
            (id.clone(), registration.clone(), Arc::clone(&entry.handler), entry.registration_priority)
        })
        .collect();
    matches.sort_by(|a, b| b.3.cmp(&a.3));
    matches.into_iter().map(|(id, registration, handler, _)| (id, registration, handler)).collect()
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Publishes events through before-hooks and after-hooks, delivering
/// after-hook side effects via injected [`AfterHookSink`]s.
pub struct Dispatcher {
    before_hooks: HookRegistry<BeforeHookRegistration, dyn BeforeHookHandler>,
    after_hooks: HookRegistry<AfterHookRegistration, dyn AfterHookHandler>,
    sinks: Vec<Arc<dyn AfterHookSink>>,
    dedup_cache: RwLock<HashMap<String, Timestamp>>,
    dedup_ttl_ms: i64,
}

impl Dispatcher {
    /// Creates a dispatcher with no registered hooks or sinks, and the
    /// default one-hour deduplication-cache TTL.
    #[must_use]
    pub fn new() -> Self {
        Self {
            before_hooks: HookRegistry::new(),
            after_hooks: HookRegistry::new(),
            sinks: Vec::new(),
            dedup_cache: RwLock::new(HashMap::new()),
            dedup_ttl_ms: DEFAULT_DEDUPLICATION_TTL_MS,
        }
    }

    /// Overrides the deduplication-cache TTL applied to subsequent publishes.
    #[must_use]
    pub fn with_deduplication_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.dedup_ttl_ms = ttl_ms;
        self
    }

    /// Registers an after-hook delivery sink.
    pub fn add_sink(&mut self, sink: Arc<dyn AfterHookSink>) {
        self.sinks.push(sink);
    }

    /// Returns a reference to the before-hook registry for direct registration.
    #[must_use]
    pub fn before_hooks(&self) -> &HookRegistry<BeforeHookRegistration, dyn BeforeHookHandler> {
        &self.before_hooks
    }

    /// Returns a reference to the after-hook registry for direct registration.
    #[must_use]
    pub fn after_hooks(&self) -> &HookRegistry<AfterHookRegistration, dyn AfterHookHandler> {
        &self.after_hooks
    }

    /// Publishes `event`: consults the deduplication cache first (a hit
    /// returns `{deduplicated: true}` with no hook run and no side effect),
    /// then runs before-hooks (timeout ⇒ deny, non-timeout error ⇒ fail-open)
    /// and, on success, after-hooks (sync awaited, async fire-and-forget via
    /// sinks).
    pub async fn publish(&self, event: &UnifiedEvent) -> PublishResult {
        if self.check_and_record_dedup(event).await {
            return PublishResult {
                deduplicated: true,
                success: true,
                denied_by: None,
                recoverable_hook_errors: Vec::new(),
                annotations: serde_json::Map::new(),
                after_hook_errors: Vec::new(),
                delivery: DeliveryReport::default(),
            };
        }

        let mut annotations = serde_json::Map::new();
        let mut recoverable_hook_errors = Vec::new();
        for (hook_id, timeout_ms, handler) in self.before_hooks.matches_for(&event.name).await {
            let timeout = Duration::from_millis(timeout_ms);
            match tokio::time::timeout(timeout, handler.handle(event)).await {
                Ok(Ok(result)) if result.outcome == BeforeHookOutcome::Deny => {
                    return PublishResult {
                        deduplicated: false,
                        success: false,
                        denied_by: Some((
                            hook_id,
                            result.deny_reason.unwrap_or_default(),
                            result.deny_code.unwrap_or_default(),
                        )),
                        recoverable_hook_errors,
                        annotations,
                        after_hook_errors: Vec::new(),
                        delivery: DeliveryReport {
                            webhooks: DeliveryCounts { skipped: self.sinks.len() as u32, ..DeliveryCounts::default() },
                            handlers: DeliveryCounts {
                                skipped: self.after_hooks.matches_for(&event.name).await.len() as u32,
                                ..DeliveryCounts::default()
                            },
                        },
                    };
                }
                Ok(Ok(result)) => {
                    for (key, value) in result.annotations {
                        annotations.insert(key, value);
                    }
                }
                Ok(Err(message)) => {
                    recoverable_hook_errors.push((hook_id, message));
                }
                Err(_) => {
                    return PublishResult {
                        deduplicated: false,
                        success: false,
                        denied_by: Some((hook_id, "Hook timeout".to_string(), "HOOK_TIMEOUT".to_string())),
                        recoverable_hook_errors,
                        annotations,
                        after_hook_errors: Vec::new(),
                        delivery: DeliveryReport {
                            webhooks: DeliveryCounts { skipped: self.sinks.len() as u32, ..DeliveryCounts::default() },
                            handlers: DeliveryCounts {
                                skipped: self.after_hooks.matches_for(&event.name).await.len() as u32,
                                ..DeliveryCounts::default()
                            },
                        },
                    };
                }
            }
        }

        let mut after_hook_errors = Vec::new();
        let mut handlers_report = DeliveryCounts::default();
        for (hook_id, registration, handler) in self.after_hooks.matches_for(&event.name).await {
            if registration.synchronous {
                let timeout = Duration::from_millis(DEFAULT_AFTER_HOOK_TIMEOUT_MS);
                let outcome = tokio::time::timeout(timeout, handler.handle(event)).await;
                let failed = !matches!(outcome, Ok(Ok(())));
                if failed {
                    handlers_report.failed += 1;
                    after_hook_errors.push((hook_id, "after-hook failed or timed out".to_string()));
                    if !registration.continue_on_error {
                        break;
                    }
                } else {
                    handlers_report.sent += 1;
                }
            } else {
                handlers_report.sent += 1;
                let event = event.clone();
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let _ = handler.handle(&event).await;
                });
            }
        }

        let mut webhooks_report = DeliveryCounts::default();
        for sink in &self.sinks {
            match sink.deliver(&event.name, &event.payload).await {
                Ok(()) => webhooks_report.sent += 1,
                Err(_) => webhooks_report.failed += 1,
            }
        }

        PublishResult {
            deduplicated: false,
            success: true,
            denied_by: None,
            recoverable_hook_errors,
            annotations,
            after_hook_errors,
            delivery: DeliveryReport { webhooks: webhooks_report, handlers: handlers_report },
        }
    }

    /// Checks `event`'s deduplication key against the cache. Returns `true`
    /// (a hit) if the key was recorded within `dedup_ttl_ms` of
    /// `event.occurred_at`. On a miss, records the key at `event.occurred_at`
    /// and opportunistically prunes every entry older than the TTL so the
    /// cache does not grow without bound across long-running processes.
    async fn check_and_record_dedup(&self, event: &UnifiedEvent) -> bool {
        let key = event.dedup_key().to_string();
        {
            let cache = self.dedup_cache.read().await;
            if let Some(recorded_at) = cache.get(&key) {
                if event.occurred_at.millis_since(*recorded_at) < self.dedup_ttl_ms {
                    return true;
                }
            }
        }
        let mut cache = self.dedup_cache.write().await;
        if let Some(recorded_at) = cache.get(&key) {
            if event.occurred_at.millis_since(*recorded_at) < self.dedup_ttl_ms {
                return true;
            }
        }
        cache.retain(|_, recorded_at| event.occurred_at.millis_since(*recorded_at) < self.dedup_ttl_ms);
        cache.insert(key, event.occurred_at);
        false
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifiers::EventId;
    use crate::core::identifiers::SessionId;
    use crate::core::time::Timestamp;

    fn sample_event(name: &str) -> UnifiedEvent {
        UnifiedEvent {
            id: EventId::from("evt1"),
            name: name.to_string(),
            session_id: SessionId::from("flow_1"),
            occurred_at: Timestamp::from_millis(0),
            payload: serde_json::json!({}),
            deduplication_key: None,
        }
    }

    struct AlwaysAllow;
    #[async_trait]
    impl BeforeHookHandler for AlwaysAllow {
        async fn handle(&self, _event: &UnifiedEvent) -> Result<BeforeHookResult, String> {
            Ok(BeforeHookResult::allow())
        }
    }

    struct SlowHook {
        delay_ms: u64,
    }
    #[async_trait]
    impl BeforeHookHandler for SlowHook {
        async fn handle(&self, _event: &UnifiedEvent) -> Result<BeforeHookResult, String> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(BeforeHookResult::allow())
        }
    }

    struct AnnotatingHook {
        annotations: serde_json::Map<String, serde_json::Value>,
    }
    #[async_trait]
    impl BeforeHookHandler for AnnotatingHook {
        async fn handle(&self, _event: &UnifiedEvent) -> Result<BeforeHookResult, String> {
            Ok(BeforeHookResult {
                annotations: self.annotations.clone(),
                ..BeforeHookResult::allow()
            })
        }
    }

    struct FailingHook {
        message: &'static str,
    }
    #[async_trait]
    impl BeforeHookHandler for FailingHook {
        async fn handle(&self, _event: &UnifiedEvent) -> Result<BeforeHookResult, String> {
            Err(self.message.to_string())
        }
    }

    #[tokio::test]
    async fn allowing_before_hook_lets_the_event_through() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .before_hooks()
            .register(
                HookId::from("h1"),
                BeforeHookRegistration {
                    id: HookId::from("h1"),
                    pattern: EventPattern::parse("auth.*").unwrap(),
                    timeout_ms: DEFAULT_BEFORE_HOOK_TIMEOUT_MS,
                },
                DEFAULT_HOOK_PRIORITY,
                Arc::new(AlwaysAllow),
            )
            .await;
        let result = dispatcher.publish(&sample_event("auth.login.attempted")).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn slow_before_hook_times_out_and_denies() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .before_hooks()
            .register(
                HookId::from("h1"),
                BeforeHookRegistration {
                    id: HookId::from("h1"),
                    pattern: EventPattern::parse("auth.*").unwrap(),
                    timeout_ms: 50,
                },
                DEFAULT_HOOK_PRIORITY,
                Arc::new(SlowHook { delay_ms: 200 }),
            )
            .await;
        let result = dispatcher.publish(&sample_event("auth.login.attempted")).await;
        assert!(!result.success);
        let (_, reason, code) = result.denied_by.unwrap();
        assert_eq!(reason, "Hook timeout");
        assert_eq!(code, "HOOK_TIMEOUT");
    }

    #[tokio::test]
    async fn non_matching_pattern_is_not_invoked() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .before_hooks()
            .register(
                HookId::from("h1"),
                BeforeHookRegistration {
                    id: HookId::from("h1"),
                    pattern: EventPattern::parse("billing.*").unwrap(),
                    timeout_ms: DEFAULT_BEFORE_HOOK_TIMEOUT_MS,
                },
                DEFAULT_HOOK_PRIORITY,
                Arc::new(SlowHook { delay_ms: 200 }),
            )
            .await;
        let result = dispatcher.publish(&sample_event("auth.login.attempted")).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn non_timeout_before_hook_error_fails_open_and_is_recorded() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .before_hooks()
            .register(
                HookId::from("h1"),
                BeforeHookRegistration {
                    id: HookId::from("h1"),
                    pattern: EventPattern::parse("auth.*").unwrap(),
                    timeout_ms: DEFAULT_BEFORE_HOOK_TIMEOUT_MS,
                },
                DEFAULT_HOOK_PRIORITY,
                Arc::new(FailingHook { message: "downstream lookup failed" }),
            )
            .await;
        let result = dispatcher.publish(&sample_event("auth.login.attempted")).await;
        assert!(result.success, "a non-timeout before-hook error must fail open");
        assert_eq!(result.recoverable_hook_errors.len(), 1);
        assert_eq!(result.recoverable_hook_errors[0].1, "downstream lookup failed");
    }

    #[tokio::test]
    async fn annotations_merge_left_to_right_with_later_hooks_overwriting() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .before_hooks()
            .register(
                HookId::from("low-priority"),
                BeforeHookRegistration {
                    id: HookId::from("low-priority"),
                    pattern: EventPattern::parse("auth.*").unwrap(),
                    timeout_ms: DEFAULT_BEFORE_HOOK_TIMEOUT_MS,
                },
                0,
                Arc::new(AnnotatingHook {
                    annotations: serde_json::json!({"risk_tier": "low", "source": "first"})
                        .as_object()
                        .unwrap()
                        .clone(),
                }),
            )
            .await;
        dispatcher
            .before_hooks()
            .register(
                HookId::from("high-priority"),
                BeforeHookRegistration {
                    id: HookId::from("high-priority"),
                    pattern: EventPattern::parse("auth.*").unwrap(),
                    timeout_ms: DEFAULT_BEFORE_HOOK_TIMEOUT_MS,
                },
                10,
                Arc::new(AnnotatingHook {
                    annotations: serde_json::json!({"source": "second"}).as_object().unwrap().clone(),
                }),
            )
            .await;
        let result = dispatcher.publish(&sample_event("auth.login.attempted")).await;
        assert!(result.success);
        assert_eq!(result.annotations.get("risk_tier"), Some(&serde_json::json!("low")));
        assert_eq!(result.annotations.get("source"), Some(&serde_json::json!("second")));
    }

    #[tokio::test]
    async fn republishing_the_same_event_id_within_the_ttl_is_deduplicated() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .before_hooks()
            .register(
                HookId::from("h1"),
                BeforeHookRegistration {
                    id: HookId::from("h1"),
                    pattern: EventPattern::parse("auth.*").unwrap(),
                    timeout_ms: DEFAULT_BEFORE_HOOK_TIMEOUT_MS,
                },
                DEFAULT_HOOK_PRIORITY,
                Arc::new(AlwaysAllow),
            )
            .await;
        let event = sample_event("auth.login.attempted");
        let first = dispatcher.publish(&event).await;
        assert!(first.success);
        assert!(!first.deduplicated);

        let second = dispatcher.publish(&event).await;
        assert!(second.deduplicated);
        assert!(second.annotations.is_empty());
    }

    #[tokio::test]
    async fn republishing_after_the_ttl_elapses_runs_hooks_again() {
        let dispatcher = Dispatcher::new().with_deduplication_ttl_ms(1_000);
        let mut first_event = sample_event("auth.login.attempted");
        first_event.occurred_at = Timestamp::from_millis(0);
        let first = dispatcher.publish(&first_event).await;
        assert!(!first.deduplicated);

        let mut later_event = first_event.clone();
        later_event.occurred_at = Timestamp::from_millis(1_001);
        let second = dispatcher.publish(&later_event).await;
        assert!(!second.deduplicated);
    }

    #[tokio::test]
    async fn explicit_deduplication_key_is_used_over_event_id() {
        let dispatcher = Dispatcher::new();
        let mut a = sample_event("auth.login.attempted");
        a.id = EventId::from("evt-a");
        a.deduplication_key = Some("shared-key".to_string());
        let mut b = sample_event("auth.login.attempted");
        b.id = EventId::from("evt-b");
        b.deduplication_key = Some("shared-key".to_string());

        let first = dispatcher.publish(&a).await;
        assert!(!first.deduplicated);
        let second = dispatcher.publish(&b).await;
        assert!(second.deduplicated, "distinct event ids sharing a deduplication key must collapse");
    }
}
