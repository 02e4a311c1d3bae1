//! Watermark policy: eligibility, cursor advance, scheduling.
//!
//! Pure, no IO. The runner loads the watermark, asks these functions what to
//! do, and persists the result.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use tsync_client::status::backoff_delay;
use tsync_schemas::{Cursor, Watermark};

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// Terminal until an operator clears it; forced runs do not bypass it.
    Disabled,
    NotDue { until: DateTime<Utc> },
    /// `attempt_window_end + grace` has passed. The caller disables the watermark.
    WindowClosed,
}

/// Forced runs bypass timing (`next_attempt_not_before` and the window) only.
pub fn eligibility(wm: &Watermark, now: DateTime<Utc>, grace: Duration, forced: bool) -> Eligibility {
    if wm.disabled {
        return Eligibility::Disabled;
    }
    if forced {
        return Eligibility::Eligible;
    }
    if let Some(end) = wm.attempt_window_end {
        if now > end + grace {
            return Eligibility::WindowClosed;
        }
    }
    if now < wm.next_attempt_not_before {
        return Eligibility::NotDue {
            until: wm.next_attempt_not_before,
        };
    }
    Eligibility::Eligible
}

// ---------------------------------------------------------------------------
// Cursor advance
// ---------------------------------------------------------------------------

/// A proposed cursor that is not strictly after the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkRegression {
    pub current: Cursor,
    pub proposed: Cursor,
}

impl fmt::Display for WatermarkRegression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "watermark regression: ({}, {}) does not follow ({}, {})",
            self.proposed.last_modified.to_rfc3339(),
            self.proposed.last_id,
            self.current.last_modified.to_rfc3339(),
            self.current.last_id
        )
    }
}

impl std::error::Error for WatermarkRegression {}

/// Composite order: a later timestamp, or the same timestamp with a larger id.
pub fn check_advance(current: Cursor, proposed: Cursor) -> Result<(), WatermarkRegression> {
    if proposed > current {
        Ok(())
    } else {
        Err(WatermarkRegression { current, proposed })
    }
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePolicy {
    pub error_backoff_base: Duration,
    pub error_backoff_max: Duration,
    pub window_grace: Duration,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            error_backoff_base: Duration::seconds(300),
            error_backoff_max: Duration::seconds(86_400),
            window_grace: Duration::days(7),
        }
    }
}

/// Clean run: counters cleared, next attempt one interval out.
pub fn on_success(wm: &mut Watermark, now: DateTime<Utc>, interval: Duration) {
    wm.error_count = 0;
    wm.last_error = None;
    wm.next_attempt_not_before = now + interval;
}

/// Failed run: count it and back off `base * 2^(n-1)`, capped.
pub fn on_failure(wm: &mut Watermark, now: DateTime<Utc>, message: &str, policy: &SchedulePolicy) {
    wm.error_count = wm.error_count.saturating_add(1);
    wm.last_error = Some(message.to_string());
    wm.next_attempt_not_before = now
        + backoff_delay(
            policy.error_backoff_base,
            policy.error_backoff_max,
            wm.error_count,
        );
}
