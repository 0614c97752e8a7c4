//! Usage-rate computation over cumulative CPU tick counters.
//!
//! Every platform reduces its native counters to [`CpuTicks`] (Windows maps
//! FILETIME-based system times onto the same four buckets) and shares this
//! delta logic.

/// Cumulative per-state CPU time since boot, in whatever unit the OS uses.
/// Only deltas between two readings are meaningful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTicks {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
}

/// Turns consecutive [`CpuTicks`] readings into a usage percentage.
///
/// Owned by exactly one monitor instance and updated once per poll; sharing
/// one tracker across concurrent pollers would corrupt the deltas.
#[derive(Debug, Default)]
pub struct UsageTracker {
    prev: Option<CpuTicks>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute busy percentage since the previous call and store `current`
    /// as the new baseline.
    ///
    /// The first call has no baseline and returns exactly 0.0 by convention.
    /// Counter resets or wraparound clamp the affected delta to zero instead
    /// of underflowing.
    pub fn update(&mut self, current: CpuTicks) -> f64 {
        let prev = match self.prev.replace(current) {
            Some(prev) => prev,
            None => return 0.0,
        };

        let user = current.user.saturating_sub(prev.user);
        let nice = current.nice.saturating_sub(prev.nice);
        let system = current.system.saturating_sub(prev.system);
        let idle = current.idle.saturating_sub(prev.idle);

        let busy = user + nice + system;
        let total = busy + idle;
        if total == 0 {
            return 0.0;
        }
        100.0 * busy as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_returns_zero() {
        let mut tracker = UsageTracker::new();
        let usage = tracker.update(CpuTicks {
            user: 12345,
            nice: 17,
            system: 999,
            idle: 88888,
        });
        assert_eq!(usage, 0.0);
    }

    #[test]
    fn delta_between_two_samples() {
        let mut tracker = UsageTracker::new();
        tracker.update(CpuTicks {
            user: 100,
            nice: 0,
            system: 50,
            idle: 850,
        });
        let usage = tracker.update(CpuTicks {
            user: 150,
            nice: 0,
            system: 60,
            idle: 1010,
        });
        // delta (50, 0, 10, 160): busy 60 of 220
        assert!((usage - 100.0 * 60.0 / 220.0).abs() < 1e-9);
    }

    #[test]
    fn usage_stays_in_range() {
        let mut tracker = UsageTracker::new();
        tracker.update(CpuTicks::default());

        let all_busy = tracker.update(CpuTicks {
            user: 100,
            nice: 100,
            system: 100,
            idle: 0,
        });
        assert_eq!(all_busy, 100.0);

        let all_idle = tracker.update(CpuTicks {
            user: 100,
            nice: 100,
            system: 100,
            idle: 500,
        });
        assert_eq!(all_idle, 0.0);
    }

    #[test]
    fn counter_wraparound_clamps_to_zero() {
        let mut tracker = UsageTracker::new();
        tracker.update(CpuTicks {
            user: u64::MAX - 5,
            nice: 0,
            system: 40,
            idle: 100,
        });
        // user counter reset below its previous value
        let usage = tracker.update(CpuTicks {
            user: 10,
            nice: 0,
            system: 50,
            idle: 200,
        });
        assert!((0.0..=100.0).contains(&usage));
        // busy 10 (system only) of 110
        assert!((usage - 100.0 * 10.0 / 110.0).abs() < 1e-9);
    }

    #[test]
    fn no_elapsed_time_reports_zero() {
        let mut tracker = UsageTracker::new();
        let ticks = CpuTicks {
            user: 7,
            nice: 0,
            system: 3,
            idle: 90,
        };
        tracker.update(ticks);
        assert_eq!(tracker.update(ticks), 0.0);
    }
}
