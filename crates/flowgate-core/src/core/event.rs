// flowgate-core/src/core/event.rs
// ============================================================================
// Module: Flow Engine Events
// Description: Unified event shape and deterministic pattern matching for the
//              before/after hook registries.
// Purpose: Let operators register hooks against a dotted event name pattern
//          without pulling a regex engine into the request path.
// Dependencies: crate::core::identifiers, crate::core::time, serde_json
// ============================================================================

//! ## Overview
//! Every side effect the executor triggers — a transition taken, a capability
//! fulfilled, a session cancelled — is published as a [`UnifiedEvent`] with a
//! dotted name such as `"flow.transition.taken"`. Hooks subscribe with a
//! [`EventPattern`]: a pattern with fewer dotted segments than the event is a
//! prefix match, a pattern with equal segment count is a segment-wise glob
//! match (`*` matches any single segment), and a pattern with more segments
//! than the event never matches. Matching is segment-counted and
//! charset-restricted on purpose — a regex engine is unnecessary surface area
//! for a closed, operator-authored vocabulary.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::EventId;
use crate::core::identifiers::HookId;
use crate::core::identifiers::SessionId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Event
// ============================================================================

/// Maximum dotted segments allowed in an event name or pattern.
pub const MAX_EVENT_NAME_SEGMENTS: usize = 10;

/// Maximum length of an event name or pattern, in bytes.
pub const MAX_EVENT_NAME_LEN: usize = 256;

/// A published event, identifying the session and carrying an opaque payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedEvent {
    /// Unique id for this event instance.
    pub id: EventId,
    /// Dotted event name, e.g. `"flow.transition.taken"`.
    pub name: String,
    /// Session this event pertains to.
    pub session_id: SessionId,
    /// Caller-supplied timestamp of when the event occurred.
    pub occurred_at: Timestamp,
    /// Opaque event-specific payload.
    pub payload: Value,
    /// Explicit deduplication key. When absent, [`UnifiedEvent::id`] is used
    /// as the deduplication cache key instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deduplication_key: Option<String>,
}

impl UnifiedEvent {
    /// Returns the key the dispatcher's deduplication cache indexes this
    /// event under: `deduplication_key` if set, else `id`.
    #[must_use]
    pub fn dedup_key(&self) -> &str {
        self.deduplication_key.as_deref().unwrap_or_else(|| self.id.as_str())
    }
}

/// Outcome returned by a before-hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeforeHookOutcome {
    /// The transition may proceed.
    Allow,
    /// The transition is blocked; the caller receives an error response.
    Deny,
}

/// A registered before-hook: validates or annotates a transition before it commits.
#[derive(Debug, Clone)]
pub struct BeforeHookRegistration {
    /// Stable identifier for this registration.
    pub id: HookId,
    /// Pattern matched against the event name this hook fires on.
    pub pattern: EventPattern,
    /// Maximum time this hook may run before it is treated as a timeout (denied).
    pub timeout_ms: u64,
}

/// A registered after-hook: performs a side effect once a transition has committed.
#[derive(Debug, Clone)]
pub struct AfterHookRegistration {
    /// Stable identifier for this registration.
    pub id: HookId,
    /// Pattern matched against the event name this hook fires on.
    pub pattern: EventPattern,
    /// Whether a synchronous after-hook is run inline (`true`) or best-effort
    /// dispatched without blocking the response (`false`).
    pub synchronous: bool,
    /// Whether a failure in this hook should still allow dependent after-hooks to run.
    pub continue_on_error: bool,
}

// ============================================================================
// SECTION: Event Pattern Matching
// ============================================================================

/// A dotted event-name pattern, validated at registration time.
///
/// # Invariants
/// - Charset restricted to `[A-Za-z0-9._*-]`.
/// - At most [`MAX_EVENT_NAME_LEN`] bytes and [`MAX_EVENT_NAME_SEGMENTS`] dot-separated segments.
/// - No empty segments (no leading/trailing/doubled dots).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventPattern(String);

/// Errors raised while validating an event name or pattern.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EventNameError {
    /// The name or pattern exceeded [`MAX_EVENT_NAME_LEN`] bytes.
    #[error("event name exceeds {MAX_EVENT_NAME_LEN} bytes")]
    TooLong,
    /// The name or pattern exceeded [`MAX_EVENT_NAME_SEGMENTS`] segments.
    #[error("event name exceeds {MAX_EVENT_NAME_SEGMENTS} segments")]
    TooManySegments,
    /// A segment was empty (leading, trailing, or doubled dot).
    #[error("event name contains an empty segment")]
    EmptySegment,
    /// A segment contained a character outside `[A-Za-z0-9._*-]`.
    #[error("event name contains a character outside the allowed charset")]
    InvalidCharacter,
}

impl EventPattern {
    /// Parses and validates a dotted pattern string.
    ///
    /// # Errors
    ///
    /// Returns [`EventNameError`] when the pattern violates the charset,
    /// length, segment-count, or wildcard-placement invariants.
    pub fn parse(raw: impl Into<String>) -> Result<Self, EventNameError> {
        let raw = raw.into();
        if raw.len() > MAX_EVENT_NAME_LEN {
            return Err(EventNameError::TooLong);
        }
        let segments: Vec<&str> = raw.split('.').collect();
        if segments.len() > MAX_EVENT_NAME_SEGMENTS {
            return Err(EventNameError::TooManySegments);
        }
        for segment in &segments {
            if segment.is_empty() {
                return Err(EventNameError::EmptySegment);
            }
            if !segment.chars().all(is_allowed_char) {
                return Err(EventNameError::InvalidCharacter);
            }
        }
        Ok(Self(raw))
    }

    /// Returns the pattern as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this pattern matches `event_name`.
    ///
    /// A pattern with fewer segments than `event_name` is a prefix match over
    /// its own segment count; a pattern with the same segment count is a
    /// segment-wise glob match (`*` matches any single segment); a pattern
    /// with more segments than `event_name` never matches.
    #[must_use]
    pub fn matches(&self, event_name: &str) -> bool {
        let pattern_segments: Vec<&str> = self.0.split('.').collect();
        let event_segments: Vec<&str> = event_name.split('.').collect();
        if pattern_segments.len() > event_segments.len() {
            return false;
        }
        pattern_segments
            .iter()
            .zip(event_segments.iter())
            .all(|(pattern, event)| *pattern == "*" || pattern == event)
    }
}

/// Returns true for characters permitted in event names and patterns.
fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '*' | '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universal_wildcard_matches_anything() {
        let pattern = EventPattern::parse("*").unwrap();
        assert!(pattern.matches("flow.transition.taken"));
        assert!(pattern.matches("x"));
    }

    #[test]
    fn shorter_pattern_is_a_prefix_match() {
        let pattern = EventPattern::parse("auth.*").unwrap();
        assert!(pattern.matches("auth.login.succeeded"));
        assert!(!pattern.matches("auth"));
        assert!(!pattern.matches("billing.invoice.paid"));
    }

    #[test]
    fn equal_length_pattern_is_a_glob_match() {
        let pattern = EventPattern::parse("*.*.failed").unwrap();
        assert!(pattern.matches("auth.login.failed"));
        assert!(!pattern.matches("auth.login.succeeded"));
        assert!(!pattern.matches("auth.login.mfa.failed"));
    }

    #[test]
    fn exact_pattern_matches_only_itself() {
        let pattern = EventPattern::parse("flow.session.cancelled").unwrap();
        assert!(pattern.matches("flow.session.cancelled"));
        assert!(!pattern.matches("flow.session.cancelled.extra"));
    }

    #[test]
    fn longer_pattern_than_event_never_matches() {
        let pattern = EventPattern::parse("flow.session.cancelled.extra").unwrap();
        assert!(!pattern.matches("flow.session.cancelled"));
    }

    #[test]
    fn rejects_empty_segments() {
        assert_eq!(
            EventPattern::parse("flow..taken").unwrap_err(),
            EventNameError::EmptySegment
        );
    }

    #[test]
    fn rejects_characters_outside_charset() {
        assert_eq!(
            EventPattern::parse("flow.transition!").unwrap_err(),
            EventNameError::InvalidCharacter
        );
    }

    #[test]
    fn rejects_too_many_segments() {
        let raw = (0..MAX_EVENT_NAME_SEGMENTS + 1)
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(".");
        assert_eq!(EventPattern::parse(raw).unwrap_err(), EventNameError::TooManySegments);
    }
}
