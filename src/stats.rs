//! Interface receive counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Receive counters shared between the poll worker and the device handle
#[derive(Debug, Default)]
pub struct InterfaceStats {
    rx_packets: AtomicU64,
    rx_bytes: AtomicU64,
    rx_errors: AtomicU64,
    rx_missed: AtomicU64,
    rx_dropped: AtomicU64,
}

impl InterfaceStats {
    /// Count one valid data frame
    pub fn record_frame(&self, bytes: usize) {
        self.rx_packets.fetch_add(1, Ordering::Relaxed);
        self.rx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Count one protocol error event
    pub fn record_error(&self) {
        self.rx_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count frames the hardware lost
    pub fn record_missed(&self, frames: u32) {
        self.rx_missed.fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Count one frame dropped for lack of a container
    pub fn record_dropped(&self) {
        self.rx_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rx_packets: self.rx_packets.load(Ordering::Relaxed),
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            rx_errors: self.rx_errors.load(Ordering::Relaxed),
            rx_missed: self.rx_missed.load(Ordering::Relaxed),
            rx_dropped: self.rx_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`InterfaceStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub rx_errors: u64,
    pub rx_missed: u64,
    pub rx_dropped: u64,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RX packets: {}\nRX bytes: {}\nRX errors: {}\nRX missed: {}\nRX dropped: {}",
            self.rx_packets, self.rx_bytes, self.rx_errors, self.rx_missed, self.rx_dropped
        )
    }
}
