//! Interface configuration

use std::time::Duration;

use crate::constants::{
    DEFAULT_CLOCK_HZ, DEFAULT_ERROR_LOG_COOLDOWN, DEFAULT_POLL_BUDGET, DEFAULT_POLL_INTERVAL,
};
use crate::error::{Result, YpCanError};

/// Per-interface settings
///
/// The bit rate is deliberately absent: it is set through
/// [`YpCan::set_bit_rate`](crate::YpCan::set_bit_rate) and has no default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Interface label, `can<N>`
    pub label: String,
    /// The `N` of the label
    pub instance_id: u32,
    /// Backoff between FIFO occupancy checks
    pub poll_interval: Duration,
    /// Frames drained per scheduler invocation
    pub budget: u32,
    /// Shared cooldown of throttled error reports
    pub error_log_cooldown: Duration,
    /// Peripheral CAN clock in Hz
    pub clock_hz: u32,
}

impl DeviceConfig {
    /// Build a configuration from an interface label such as `can0`
    pub fn from_label(label: &str) -> Result<Self> {
        let instance_id = parse_instance_id(label)
            .ok_or_else(|| YpCanError::InvalidLabel(label.to_string()))?;

        Ok(Self {
            label: label.to_string(),
            instance_id,
            poll_interval: DEFAULT_POLL_INTERVAL,
            budget: DEFAULT_POLL_BUDGET,
            error_log_cooldown: DEFAULT_ERROR_LOG_COOLDOWN,
            clock_hz: DEFAULT_CLOCK_HZ,
        })
    }

    /// Set the backoff interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the drain budget (at least 1)
    pub fn with_budget(mut self, budget: u32) -> Self {
        self.budget = budget.max(1);
        self
    }

    /// Set the error log cooldown
    pub fn with_error_log_cooldown(mut self, cooldown: Duration) -> Self {
        self.error_log_cooldown = cooldown;
        self
    }

    /// Set the peripheral clock
    pub fn with_clock_hz(mut self, clock_hz: u32) -> Self {
        self.clock_hz = clock_hz;
        self
    }
}

fn parse_instance_id(label: &str) -> Option<u32> {
    let digits = label.strip_prefix("can")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_label_defaults() {
        let config = DeviceConfig::from_label("can3").unwrap();
        assert_eq!(config.label, "can3");
        assert_eq!(config.instance_id, 3);
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.budget, 256);
        assert_eq!(config.error_log_cooldown, Duration::from_secs(15));
        assert_eq!(config.clock_hz, 40_000_000);
    }

    #[test]
    fn test_invalid_labels() {
        for label in ["", "can", "vcan0", "can-1", "can1a", "CAN0"] {
            assert!(
                matches!(DeviceConfig::from_label(label), Err(YpCanError::InvalidLabel(_))),
                "{label:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_budget_clamped() {
        let config = DeviceConfig::from_label("can0").unwrap().with_budget(0);
        assert_eq!(config.budget, 1);
    }
}
