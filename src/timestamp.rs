//! Hardware timestamp conversion
//!
//! The peripheral stamps every frame with a monotonic microsecond counter.
//! At interface start the offset between wall-clock time and the monotonic
//! clock is captured once; every decoded frame adds its counter to that
//! base to get an absolute time.

use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime};

/// Time source for the timestamp base
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn wall(&self) -> SystemTime;

    /// Time elapsed on the monotonic clock the hardware counter follows
    fn monotonic(&self) -> Duration;
}

/// Host clocks
///
/// The monotonic reading is measured from the first use of this clock in
/// the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn wall(&self) -> SystemTime {
        SystemTime::now()
    }

    fn monotonic(&self) -> Duration {
        static ORIGIN: OnceLock<Instant> = OnceLock::new();
        ORIGIN.get_or_init(Instant::now).elapsed()
    }
}

/// Wall-clock time at which the hardware counter read zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampBase {
    base: SystemTime,
}

impl TimestampBase {
    /// Capture `wall - monotonic` from `clock`
    ///
    /// Must be called on every interface start, the monotonic clock may
    /// have been reset (suspend/resume) since the last run.
    pub fn capture(clock: &dyn Clock) -> Self {
        let wall = clock.wall();
        let since_boot = clock.monotonic();
        let base = wall.checked_sub(since_boot).unwrap_or(SystemTime::UNIX_EPOCH);
        Self { base }
    }

    /// Base captured at a known instant
    pub fn from_system_time(base: SystemTime) -> Self {
        Self { base }
    }

    /// The captured base
    pub fn base(&self) -> SystemTime {
        self.base
    }

    /// Convert a hardware microsecond counter to absolute time
    pub fn to_absolute(&self, hw_timestamp_us: u64) -> SystemTime {
        let offset = Duration::from_nanos(hw_timestamp_us.saturating_mul(1000));
        self.base.checked_add(offset).unwrap_or(self.base)
    }
}

impl Default for TimestampBase {
    fn default() -> Self {
        Self::from_system_time(SystemTime::UNIX_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock {
        wall: SystemTime,
        monotonic: Duration,
    }

    impl Clock for FixedClock {
        fn wall(&self) -> SystemTime {
            self.wall
        }

        fn monotonic(&self) -> Duration {
            self.monotonic
        }
    }

    #[test]
    fn test_capture_subtracts_monotonic() {
        let wall = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let clock = FixedClock {
            wall,
            monotonic: Duration::from_secs(3600),
        };
        let base = TimestampBase::capture(&clock);
        assert_eq!(base.base(), wall - Duration::from_secs(3600));
        assert_eq!(base.to_absolute(3_600_000_000), wall);
    }

    #[test]
    fn test_to_absolute_scales_microseconds() {
        let base = TimestampBase::from_system_time(SystemTime::UNIX_EPOCH);
        assert_eq!(
            base.to_absolute(1_500_000),
            SystemTime::UNIX_EPOCH + Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_zero_counter_equals_wall_clock_at_capture() {
        let wall = SystemTime::UNIX_EPOCH + Duration::from_secs(42);
        let clock = FixedClock {
            wall,
            monotonic: Duration::ZERO,
        };
        let base = TimestampBase::capture(&clock);
        assert_eq!(base.to_absolute(0), wall);
    }

    #[test]
    fn test_system_clock_counter_tracks_wall_clock() {
        let clock = SystemClock;
        let before = SystemTime::now();
        let base = TimestampBase::capture(&clock);
        let after = SystemTime::now();

        let now_counter = clock.monotonic().as_micros() as u64;
        let absolute = base.to_absolute(now_counter);
        let slack = Duration::from_millis(50);
        assert!(absolute + slack >= before);
        assert!(absolute <= after + slack);
    }

    #[test]
    fn test_recapture_replaces_base() {
        let mut clock = FixedClock {
            wall: SystemTime::UNIX_EPOCH + Duration::from_secs(100),
            monotonic: Duration::from_secs(10),
        };
        let first = TimestampBase::capture(&clock);

        // Monotonic clock restarted (suspend/resume)
        clock.wall += Duration::from_secs(5);
        clock.monotonic = Duration::ZERO;
        let second = TimestampBase::capture(&clock);

        assert_ne!(first, second);
        assert_eq!(second.to_absolute(0), clock.wall);
    }
}
