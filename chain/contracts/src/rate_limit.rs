//! Per-period swap counter
//!
//! The period key is a discrete time unit supplied by the caller (the host's
//! block height). Observing a new period resets the count to 1, counting the
//! swap that observed it.

use serde::{Deserialize, Serialize};

/// Swap counter for the current period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RateLimitWindow {
    period_key: u64,
    count: u32,
}

impl RateLimitWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one swap in `period`. Returns `false` without recording when
    /// the period is already at `limit`.
    pub fn try_record(&mut self, period: u64, limit: u32) -> bool {
        if period != self.period_key || self.count == 0 {
            if limit == 0 {
                return false;
            }
            self.period_key = period;
            self.count = 1;
            return true;
        }
        if self.count >= limit {
            return false;
        }
        self.count += 1;
        true
    }

    /// Swaps recorded in `period`.
    pub fn used(&self, period: u64) -> u32 {
        if period == self.period_key {
            self.count
        } else {
            0
        }
    }

    /// Swaps still allowed in `period` under `limit`.
    pub fn remaining(&self, period: u64, limit: u32) -> u32 {
        limit.saturating_sub(self.used(period))
    }

    pub fn period_key(&self) -> u64 {
        self.period_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_up_to_limit() {
        let mut window = RateLimitWindow::new();
        for _ in 0..10 {
            assert!(window.try_record(5, 10));
        }
        assert!(!window.try_record(5, 10), "11th swap in the period must fail");
        assert_eq!(window.used(5), 10);
        assert_eq!(window.remaining(5, 10), 0);
    }

    #[test]
    fn test_new_period_resets_to_one() {
        let mut window = RateLimitWindow::new();
        for _ in 0..10 {
            window.try_record(5, 10);
        }
        assert!(window.try_record(6, 10));
        assert_eq!(window.used(6), 1);
        assert_eq!(window.period_key(), 6);
        assert_eq!(window.remaining(6, 10), 9);
    }

    #[test]
    fn test_rejection_does_not_count() {
        let mut window = RateLimitWindow::new();
        window.try_record(1, 1);
        assert!(!window.try_record(1, 1));
        assert_eq!(window.used(1), 1);
    }

    #[test]
    fn test_untouched_period_reports_full_allowance() {
        let window = RateLimitWindow::new();
        assert_eq!(window.remaining(42, 10), 10);
    }
}
