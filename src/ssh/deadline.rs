//! Monotonic deadlines
//!
//! A deadline is derived once per top-level operation from the caller's
//! timeout. Every sub-step draws from the same deadline; nothing resets it.

use std::time::{Duration, Instant};

/// Absolute point on the monotonic clock after which work must stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `timeout_secs` seconds from now. Non-positive values are already expired.
    pub fn from_timeout_secs(timeout_secs: i32) -> Self {
        let secs = u64::try_from(timeout_secs).unwrap_or(0);
        Self::after(Duration::from_secs(secs))
    }

    pub fn from_timeout_ms(timeout_ms: u64) -> Self {
        Self::after(Duration::from_millis(timeout_ms))
    }

    pub fn after(budget: Duration) -> Self {
        let now = Instant::now();
        Self {
            at: now.checked_add(budget).unwrap_or(now),
        }
    }

    /// Remaining time, zero once expired
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Remaining milliseconds, clamped to `0..=i32::MAX`
    pub fn remaining_ms(&self) -> i32 {
        let ms = self.remaining().as_millis();
        i32::try_from(ms).unwrap_or(i32::MAX)
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_ms() <= 0
    }
}

/// Milliseconds elapsed since `start`
pub fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
