// flowgate-http/src/clock.rs
// ============================================================================
// Module: Wall Clock
// Description: The one place in the whole workspace permitted to read the
//              system clock, converting it into the core's explicit Timestamp.
// Purpose: Keep flowgate-core deterministic and testable; isolate the single
//          wall-clock read behind one function.
// Dependencies: std::time, flowgate_core::core::time
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use flowgate_core::core::time::Timestamp;

/// Reads the system wall clock and converts it to a [`Timestamp`].
///
/// Saturates to `0` if the clock reads before the Unix epoch, and to
/// `i64::MAX` if the duration overflows a signed 64-bit millisecond count.
#[must_use]
pub fn now() -> Timestamp {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0);
    Timestamp::from_millis(millis)
}
