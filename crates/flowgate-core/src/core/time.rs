// flowgate-core/src/core/time.rs
// ============================================================================
// Module: Flow Engine Time
// Description: Explicit timestamp type threaded through the core instead of
//              wall-clock reads.
// Purpose: Keep evaluation, compilation, and security gates deterministic.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The core never reads the wall clock directly. Callers (the HTTP host layer,
//! tests, the CLI) supply a [`Timestamp`] explicitly to every operation that
//! needs "now" — session TTL checks, the rate-limit sliding window, and audit
//! record stamping. This keeps `evaluate`, `determineNext`, and UI Contract
//! generation referentially transparent for identical inputs.

use serde::Deserialize;
use serde::Serialize;

/// Milliseconds since the Unix epoch, supplied by the caller.
///
/// # Invariants
/// - Never constructed by reading the wall clock inside `flowgate-core`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Wraps a raw millisecond value supplied by the caller.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the underlying millisecond value.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns the difference `self - other` in milliseconds.
    #[must_use]
    pub const fn millis_since(self, other: Self) -> i64 {
        self.0 - other.0
    }

    /// Returns `self + millis`, saturating at the integer bounds.
    #[must_use]
    pub fn plus_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_since_computes_signed_delta() {
        let later = Timestamp::from_millis(1_500);
        let earlier = Timestamp::from_millis(1_000);
        assert_eq!(later.millis_since(earlier), 500);
        assert_eq!(earlier.millis_since(later), -500);
    }

    #[test]
    fn plus_millis_saturates_instead_of_overflowing() {
        let ts = Timestamp::from_millis(i64::MAX - 10);
        assert_eq!(ts.plus_millis(1_000).as_millis(), i64::MAX);
    }
}
