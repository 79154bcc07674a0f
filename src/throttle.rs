//! Error log rate limiting
//!
//! One cooldown window is shared by every error class reported through a
//! throttle: emitting any line silences all its classes until the window
//! ends. The scheduler keeps the sticky peripheral error status on a
//! throttle of its own.

use std::time::{Duration, Instant};

/// Category of a throttled error report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bus-level protocol error in a received frame
    Protocol,
    /// FIFO overrun, frames lost (including counter overflow)
    MissedFrames,
    /// Peripheral error status bits
    Peripheral,
}

/// Shared-cooldown log limiter
#[derive(Debug, Clone)]
pub struct ErrorLogThrottle {
    cooldown: Duration,
    last_error_log_time: Option<Instant>,
    suppressed: u64,
}

impl ErrorLogThrottle {
    /// Create a throttle with the given cooldown window
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_error_log_time: None,
            suppressed: 0,
        }
    }

    /// Decide whether a line may be emitted at `now`
    ///
    /// Returns `true` and restarts the shared window when allowed.
    pub fn permit(&mut self, now: Instant) -> bool {
        let allowed = match self.last_error_log_time {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.cooldown,
        };
        if allowed {
            self.last_error_log_time = Some(now);
        } else {
            self.suppressed += 1;
        }
        allowed
    }

    /// Emit `message` at warn level for `label` if the window allows it
    pub fn warn(&mut self, now: Instant, label: &str, class: ErrorClass, message: &str) -> bool {
        self.emit(now, log::Level::Warn, label, class, message)
    }

    /// Emit `message` at error level for `label` if the window allows it
    pub fn error(&mut self, now: Instant, label: &str, class: ErrorClass, message: &str) -> bool {
        self.emit(now, log::Level::Error, label, class, message)
    }

    fn emit(
        &mut self,
        now: Instant,
        level: log::Level,
        label: &str,
        class: ErrorClass,
        message: &str,
    ) -> bool {
        if !self.permit(now) {
            log::trace!("{}: suppressed {:?} report", label, class);
            return false;
        }
        log::log!(level, "{}: {}", label, message);
        true
    }

    /// Time of the last emitted line
    pub fn last_error_log_time(&self) -> Option<Instant> {
        self.last_error_log_time
    }

    /// Number of reports dropped by the cooldown
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    /// Length of the cooldown window
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_secs(15);

    #[test]
    fn test_same_class_within_window_logs_once() {
        let mut throttle = ErrorLogThrottle::new(COOLDOWN);
        let t0 = Instant::now();

        assert!(throttle.warn(t0, "can0", ErrorClass::Protocol, "CRC error detected"));
        assert!(!throttle.warn(
            t0 + Duration::from_secs(3),
            "can0",
            ErrorClass::Protocol,
            "CRC error detected"
        ));
        assert!(throttle.warn(
            t0 + Duration::from_secs(16),
            "can0",
            ErrorClass::Protocol,
            "CRC error detected"
        ));
        assert_eq!(throttle.suppressed(), 1);
    }

    #[test]
    fn test_window_is_shared_across_classes() {
        let mut throttle = ErrorLogThrottle::new(COOLDOWN);
        let t0 = Instant::now();

        assert!(throttle.warn(t0, "can0", ErrorClass::MissedFrames, "missed frames: 3"));
        assert!(!throttle.error(
            t0 + Duration::from_secs(1),
            "can0",
            ErrorClass::Peripheral,
            "peripheral error: 1"
        ));
        assert!(!throttle.warn(
            t0 + Duration::from_secs(14),
            "can0",
            ErrorClass::Protocol,
            "Form error detected"
        ));
    }

    #[test]
    fn test_window_restarts_on_emit() {
        let mut throttle = ErrorLogThrottle::new(COOLDOWN);
        let t0 = Instant::now();

        assert!(throttle.permit(t0));
        assert!(throttle.permit(t0 + COOLDOWN));
        assert_eq!(throttle.last_error_log_time(), Some(t0 + COOLDOWN));
        assert!(!throttle.permit(t0 + COOLDOWN + Duration::from_secs(14)));
    }

    #[test]
    fn test_suppressed_reports_do_not_extend_window() {
        let mut throttle = ErrorLogThrottle::new(COOLDOWN);
        let t0 = Instant::now();

        assert!(throttle.permit(t0));
        for s in 1..15 {
            assert!(!throttle.permit(t0 + Duration::from_secs(s)));
        }
        assert!(throttle.permit(t0 + Duration::from_secs(15)));
    }
}
