//! # SLA Classification
//!
//! Pure time-remaining math for order deadlines. The engine crate owns the
//! scheduler that calls into this every tick.
//!
//! ## Urgency Buckets
//! ```text
//!   seconds left:   0 ──────── 30 ──────── 60 ──────────────► ∞
//!                   │ critical  │  warning  │       ok
//!                   ▲
//!                   └── expired when nothing is left
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::types::{Order, OrderStatus};

/// At or below this many seconds left a clock is critical.
pub const CRITICAL_THRESHOLD_SECS: i64 = 30;

/// At or below this many seconds left (and above critical) a clock is a warning.
pub const WARNING_THRESHOLD_SECS: i64 = 60;

/// Which deadline a clock is tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SlaKind {
    /// `sla_accept_by`, while the order is `new`.
    Acceptance,
    /// `sla_deliver_by`, from `accepted` through `in_transit`.
    Delivery,
}

impl fmt::Display for SlaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlaKind::Acceptance => f.write_str("acceptance"),
            SlaKind::Delivery => f.write_str("delivery"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Ok,
    Warning,
    Critical,
}

impl UrgencyLevel {
    /// Buckets a non-negative number of seconds left.
    pub fn classify(seconds_left: i64) -> Self {
        if seconds_left <= CRITICAL_THRESHOLD_SECS {
            UrgencyLevel::Critical
        } else if seconds_left <= WARNING_THRESHOLD_SECS {
            UrgencyLevel::Warning
        } else {
            UrgencyLevel::Ok
        }
    }
}

/// Remaining time on one deadline at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SlaSnapshot {
    pub seconds_left: i64,
    pub is_expired: bool,
    /// Always within `0.0..=100.0`.
    pub percentage_left: f64,
    pub urgency_level: UrgencyLevel,
}

impl SlaSnapshot {
    /// Classifies `deadline` as seen at `now`.
    ///
    /// `total_window_secs` is the nominal window for the deadline's kind
    /// (90 for acceptance by default). A non-positive window reports 0%.
    ///
    /// ```rust
    /// use chrono::{Duration, Utc};
    /// use concourse_core::sla::{SlaSnapshot, UrgencyLevel};
    ///
    /// let start = Utc::now();
    /// let deadline = start + Duration::seconds(90);
    ///
    /// let late = SlaSnapshot::compute(deadline, start + Duration::seconds(95), 90);
    /// assert_eq!(late.seconds_left, 0);
    /// assert!(late.is_expired);
    /// assert_eq!(late.urgency_level, UrgencyLevel::Critical);
    /// ```
    pub fn compute(deadline: DateTime<Utc>, now: DateTime<Utc>, total_window_secs: i64) -> Self {
        // Partial seconds round up so an unexpired deadline never shows 0.
        let millis_left = (deadline - now).num_milliseconds();
        let seconds_left = (millis_left + 999).div_euclid(1000).max(0);

        let percentage_left = if total_window_secs > 0 {
            (seconds_left as f64 / total_window_secs as f64 * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        SlaSnapshot {
            seconds_left,
            is_expired: deadline <= now,
            percentage_left,
            urgency_level: UrgencyLevel::classify(seconds_left),
        }
    }
}

/// The clock kind an order in `status` is monitored under, if any.
pub fn monitored_kind(status: OrderStatus) -> Option<SlaKind> {
    match status {
        OrderStatus::New => Some(SlaKind::Acceptance),
        OrderStatus::Accepted
        | OrderStatus::Preparing
        | OrderStatus::Ready
        | OrderStatus::InTransit => Some(SlaKind::Delivery),
        _ => None,
    }
}

impl Order {
    /// The deadline the order should be monitored against right now.
    pub fn active_deadline(&self) -> Option<(SlaKind, DateTime<Utc>)> {
        monitored_kind(self.status).map(|kind| match kind {
            SlaKind::Acceptance => (kind, self.sla_accept_by),
            SlaKind::Delivery => (kind, self.sla_deliver_by),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at_elapsed(elapsed: i64) -> SlaSnapshot {
        let start = Utc::now();
        let deadline = start + Duration::seconds(90);
        SlaSnapshot::compute(deadline, start + Duration::seconds(elapsed), 90)
    }

    #[test]
    fn test_acceptance_window_examples() {
        let s = at_elapsed(20);
        assert_eq!(s.seconds_left, 70);
        assert_eq!(s.urgency_level, UrgencyLevel::Ok);

        let s = at_elapsed(45);
        assert_eq!(s.seconds_left, 45);
        assert_eq!(s.urgency_level, UrgencyLevel::Warning);

        let s = at_elapsed(65);
        assert_eq!(s.seconds_left, 25);
        assert_eq!(s.urgency_level, UrgencyLevel::Critical);
        assert!(!s.is_expired);

        let s = at_elapsed(95);
        assert_eq!(s.seconds_left, 0);
        assert_eq!(s.urgency_level, UrgencyLevel::Critical);
        assert!(s.is_expired);
    }

    #[test]
    fn test_sub_second_remainder_is_not_expired() {
        let start = Utc::now();
        let deadline = start + Duration::seconds(90);

        let s = SlaSnapshot::compute(deadline, deadline - Duration::milliseconds(400), 90);
        assert!(!s.is_expired);
        assert_eq!(s.seconds_left, 1);
        assert_eq!(s.urgency_level, UrgencyLevel::Critical);

        let s = SlaSnapshot::compute(deadline, deadline, 90);
        assert!(s.is_expired);
        assert_eq!(s.seconds_left, 0);

        let s = SlaSnapshot::compute(deadline, deadline + Duration::milliseconds(1), 90);
        assert!(s.is_expired);
        assert_eq!(s.seconds_left, 0);
    }

    #[test]
    fn test_threshold_edges() {
        assert_eq!(UrgencyLevel::classify(0), UrgencyLevel::Critical);
        assert_eq!(UrgencyLevel::classify(30), UrgencyLevel::Critical);
        assert_eq!(UrgencyLevel::classify(31), UrgencyLevel::Warning);
        assert_eq!(UrgencyLevel::classify(60), UrgencyLevel::Warning);
        assert_eq!(UrgencyLevel::classify(61), UrgencyLevel::Ok);
    }

    #[test]
    fn test_percentage_always_in_bounds() {
        let now = Utc::now();
        for (offset, window) in [(-500, 90), (0, 90), (45, 90), (90, 90), (5000, 90), (10, 0), (10, -5)] {
            let s = SlaSnapshot::compute(now + Duration::seconds(offset), now, window);
            assert!((0.0..=100.0).contains(&s.percentage_left), "{offset}/{window}");
        }
        assert_eq!(at_elapsed(45).percentage_left, 50.0);
        assert_eq!(at_elapsed(0).percentage_left, 100.0);
    }

    #[test]
    fn test_monitored_kinds() {
        assert_eq!(monitored_kind(OrderStatus::New), Some(SlaKind::Acceptance));
        assert_eq!(monitored_kind(OrderStatus::InTransit), Some(SlaKind::Delivery));
        assert_eq!(monitored_kind(OrderStatus::RefundRequested), None);
        assert_eq!(monitored_kind(OrderStatus::Delivered), None);
    }
}
