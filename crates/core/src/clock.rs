//! Time source abstraction for lease expiry.
//!
//! The in-memory lock store reads the current time through [`Clock`] so tests
//! can drive lease expiry deterministically instead of sleeping for minutes.

use crate::types::Timestamp;

/// A source of "now" for lease calculations.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time via [`chrono::Utc::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now()
    }
}
