//! Fixed-window entries and admission decisions.

use std::time::Duration;

/// Request accounting for one composite key within one fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    /// Requests admitted in the current window. Always at least 1.
    count: u32,
    /// Milliseconds since the Unix epoch at which the window ends.
    reset_at: u64,
}

impl WindowEntry {
    /// Open a fresh window at `now`, counting the request that opened it.
    pub fn open(now: u64, window: Duration) -> Self {
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        Self {
            count: 1,
            reset_at: now.saturating_add(window_ms),
        }
    }

    /// Requests admitted so far in this window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// End of the window in milliseconds since the Unix epoch.
    pub fn reset_at(&self) -> u64 {
        self.reset_at
    }

    /// Whether the window has ended. Expired entries must be treated as absent.
    pub fn is_expired(&self, now: u64) -> bool {
        self.reset_at <= now
    }

    /// Count one more admitted request if the window has room.
    ///
    /// Returns `false` and leaves the entry untouched once `max` is reached.
    pub fn try_increment(&mut self, max: u32) -> bool {
        if self.count < max {
            self.count += 1;
            true
        } else {
            false
        }
    }

    /// Whole seconds until the window ends, rounded up.
    pub fn seconds_until_reset(&self, now: u64) -> u64 {
        self.reset_at.saturating_sub(now).div_ceil(1000)
    }
}

/// Quota state reported on every admission outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    /// Maximum admitted requests per window.
    pub limit: u32,
    /// Requests still admissible in the current window.
    pub remaining: u32,
    /// End of the current window in milliseconds since the Unix epoch.
    pub reset_at: u64,
}

impl Quota {
    /// End of the current window as Unix seconds, rounded up.
    pub fn reset_epoch_secs(&self) -> u64 {
        self.reset_at.div_ceil(1000)
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request was counted and may proceed.
    Allow(Quota),
    /// The window is exhausted. Nothing was counted.
    Deny {
        /// Quota state; `remaining` is always 0.
        quota: Quota,
        /// Whole seconds until the window resets.
        retry_after_secs: u64,
    },
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }

    /// Quota state for response headers.
    pub fn quota(&self) -> &Quota {
        match self {
            Decision::Allow(quota) => quota,
            Decision::Deny { quota, .. } => quota,
        }
    }

    /// Seconds to wait before retrying, for denials only.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Decision::Allow(_) => None,
            Decision::Deny {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_counts_first_request() {
        let entry = WindowEntry::open(10_000, Duration::from_secs(60));

        assert_eq!(entry.count(), 1);
        assert_eq!(entry.reset_at(), 70_000);
        assert!(!entry.is_expired(69_999));
        assert!(entry.is_expired(70_000));
    }

    #[test]
    fn test_increment_stops_at_max() {
        let mut entry = WindowEntry::open(0, Duration::from_secs(1));

        assert!(entry.try_increment(3));
        assert!(entry.try_increment(3));
        assert!(!entry.try_increment(3));
        assert_eq!(entry.count(), 3);
    }

    #[test]
    fn test_seconds_until_reset_rounds_up() {
        let entry = WindowEntry::open(0, Duration::from_secs(10));

        assert_eq!(entry.seconds_until_reset(0), 10);
        assert_eq!(entry.seconds_until_reset(5_000), 5);
        assert_eq!(entry.seconds_until_reset(9_001), 1);
        assert_eq!(entry.seconds_until_reset(12_000), 0);
    }

    #[test]
    fn test_reset_epoch_secs_rounds_up() {
        let quota = Quota {
            limit: 5,
            remaining: 4,
            reset_at: 1_700_000_000_001,
        };
        assert_eq!(quota.reset_epoch_secs(), 1_700_000_001);
    }

    #[test]
    fn test_decision_accessors() {
        let quota = Quota {
            limit: 1,
            remaining: 0,
            reset_at: 1_000,
        };

        let allow = Decision::Allow(quota);
        assert!(allow.is_allowed());
        assert_eq!(allow.retry_after_secs(), None);

        let deny = Decision::Deny {
            quota,
            retry_after_secs: 1,
        };
        assert!(!deny.is_allowed());
        assert_eq!(deny.retry_after_secs(), Some(1));
        assert_eq!(deny.quota(), &quota);
    }
}
