//! Simulated YP-CAN register block
//!
//! [`SimulatedBus`] implements [`RegisterBus`] over an in-memory FIFO so the
//! decoder, scheduler and device can run without hardware. Every access is
//! recorded, which lets tests assert register order and barrier placement.
//! [`CollectingSink`] is a [`FrameSink`] that keeps what it is given.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::bus::RegisterBus;
use crate::constants::*;
use crate::frame::{DecodedEvent, FrameSink, SinkFull};

/// One register access seen by the simulated bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusAccess {
    Read(usize),
    Write(usize, u32),
    Barrier,
}

/// Raw register contents of one queued FIFO entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawEntry {
    pub frame_type: u32,
    pub timestamp: u64,
    pub can_id: u32,
    pub dlc: u32,
    pub crc: u32,
    pub data: u64,
}

impl RawEntry {
    /// Standard data frame carrying `payload` (up to 8 bytes)
    pub fn data(id: u32, payload: &[u8]) -> Self {
        let len = payload.len().min(CAN_MAX_DLEN);
        let mut bytes = [0u8; CAN_MAX_DLEN];
        bytes[..len].copy_from_slice(&payload[..len]);

        let data = if len <= 4 {
            u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64
        } else {
            let high = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            let low = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
            ((high as u64) << 32) | low as u64
        };

        Self {
            can_id: id & ID_FIELD_MASK,
            dlc: len as u32,
            data,
            ..Default::default()
        }
    }

    /// Extended (29-bit) data frame
    pub fn extended(id: u32, payload: &[u8]) -> Self {
        let mut entry = Self::data(id, payload);
        entry.can_id |= ID_EFF_BIT;
        entry
    }

    /// Remote transmission request
    pub fn remote(id: u32, dlc: u8) -> Self {
        Self {
            can_id: (id & ID_FIELD_MASK) | ID_RTR_BIT,
            dlc: dlc as u32 & DLC_MASK,
            ..Default::default()
        }
    }

    /// Entry flagged with protocol error bits (`FRAME_*_ERROR_BIT`)
    pub fn protocol_error(bits: u32) -> Self {
        Self {
            frame_type: bits,
            // Garbage in the frame fields, the decoder must ignore it
            can_id: 0x5A5A_5A5A,
            dlc: 0xF,
            data: 0xDEAD_BEEF_DEAD_BEEF,
            ..Default::default()
        }
    }

    /// Set the hardware timestamp in microseconds
    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp = timestamp_us;
        self
    }

    /// Set the raw DATA_HIGH:DATA_LOW and DLC registers
    pub fn with_raw_data(mut self, dlc: u8, data: u64) -> Self {
        self.dlc = dlc as u32;
        self.data = data;
        self
    }
}

/// In-memory register block with a hardware-like FIFO
#[derive(Debug, Default)]
pub struct SimulatedBus {
    fifo: VecDeque<RawEntry>,
    error_status: u32,
    missed_status: u32,
    written: HashMap<usize, u32>,
    log: Vec<BusAccess>,
    reset_count: usize,
    entries_read: usize,
}

impl SimulatedBus {
    /// Create an empty simulated peripheral
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an entry in the FIFO
    pub fn push(&mut self, entry: RawEntry) {
        self.fifo.push_back(entry);
    }

    /// Queue `count` data frames with ids 0..count
    pub fn fill(&mut self, count: usize) {
        for i in 0..count {
            self.push(RawEntry::data(i as u32, &[i as u8]).with_timestamp(i as u64));
        }
    }

    /// Number of queued entries
    pub fn pending(&self) -> usize {
        self.fifo.len()
    }

    /// Set the ERROR_STATUS register
    pub fn set_error_status(&mut self, raw: u32) {
        self.error_status = raw;
    }

    /// Set the MISSED_STATUS register (cleared by a reset pulse)
    pub fn set_missed_status(&mut self, raw: u32) {
        self.missed_status = raw;
    }

    /// Last value written to a write-side register
    pub fn register(&self, offset: usize) -> u32 {
        self.written.get(&offset).copied().unwrap_or(0)
    }

    /// Every access since creation or the last [`clear_log`](Self::clear_log)
    pub fn log(&self) -> &[BusAccess] {
        &self.log
    }

    /// Forget recorded accesses
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Number of completed reset pulses
    pub fn reset_count(&self) -> usize {
        self.reset_count
    }

    /// Number of FIFO reads (DATA_HIGH accesses), including empty ones
    pub fn entries_read(&self) -> usize {
        self.entries_read
    }

    fn front(&self) -> RawEntry {
        self.fifo.front().copied().unwrap_or_default()
    }
}

impl RegisterBus for SimulatedBus {
    fn read32(&mut self, offset: usize) -> u32 {
        self.log.push(BusAccess::Read(offset));
        let entry = self.front();
        match offset {
            REG_STATUS_BUFFER => (self.fifo.len() as u32).min(BUFFER_USAGE_MASK),
            REG_STATUS_ERROR => self.error_status,
            REG_STATUS_MISSED => self.missed_status,
            REG_FRAME_TYPE => entry.frame_type,
            REG_TIMESTAMP_LOW => entry.timestamp as u32,
            REG_TIMESTAMP_HIGH => (entry.timestamp >> 32) as u32,
            REG_CAN_ID => entry.can_id,
            REG_DLC => entry.dlc,
            REG_CRC => entry.crc,
            REG_DATA_LOW => entry.data as u32,
            REG_DATA_HIGH => {
                self.entries_read += 1;
                self.fifo.pop_front();
                (entry.data >> 32) as u32
            }
            other => self.register(other),
        }
    }

    fn write32(&mut self, offset: usize, value: u32) {
        self.log.push(BusAccess::Write(offset, value));
        if offset == REG_RESET {
            let previous = self.register(REG_RESET);
            if previous == RESET_ASSERT && value == RESET_RELEASE {
                self.reset_count += 1;
                self.missed_status = 0;
            }
        }
        self.written.insert(offset, value);
    }

    fn barrier(&mut self) {
        self.log.push(BusAccess::Barrier);
    }
}

#[derive(Debug, Default)]
struct SinkState {
    events: Vec<DecodedEvent>,
    stats_bytes: Vec<usize>,
    capacity: Option<usize>,
    refused: usize,
}

/// Frame sink that stores delivered events
///
/// Clones share the same storage, so one clone can be handed to a device
/// while the test keeps another for inspection.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    state: Arc<Mutex<SinkState>>,
}

impl CollectingSink {
    /// Create a sink without a capacity limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that fails allocation once `capacity` events are held
    pub fn with_capacity(capacity: usize) -> Self {
        let sink = Self::default();
        sink.lock().capacity = Some(capacity);
        sink
    }

    /// Events delivered so far
    pub fn events(&self) -> Vec<DecodedEvent> {
        self.lock().events.clone()
    }

    /// Byte counts passed to `record_stats`
    pub fn stats_bytes(&self) -> Vec<usize> {
        self.lock().stats_bytes.clone()
    }

    /// Number of refused deliveries
    pub fn refused(&self) -> usize {
        self.lock().refused
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FrameSink for CollectingSink {
    fn deliver(&mut self, event: DecodedEvent) -> Result<(), SinkFull> {
        let mut state = self.lock();
        if state.capacity.is_some_and(|cap| state.events.len() >= cap) {
            state.refused += 1;
            return Err(SinkFull);
        }
        state.events.push(event);
        Ok(())
    }

    fn record_stats(&mut self, bytes: usize) {
        self.lock().stats_bytes.push(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_entry_layout() {
        let short = RawEntry::data(0x10, &[0xAA, 0xBB]);
        assert_eq!(short.dlc, 2);
        assert_eq!(short.data, 0x0000_0000_AABB_0000);

        let long = RawEntry::data(0x10, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(long.dlc, 8);
        assert_eq!(long.data, 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_fifo_advances_on_data_high() {
        let mut bus = SimulatedBus::new();
        bus.fill(2);
        assert_eq!(bus.read32(REG_STATUS_BUFFER), 2);
        bus.read32(REG_DATA_LOW);
        assert_eq!(bus.pending(), 2);
        bus.read32(REG_DATA_HIGH);
        assert_eq!(bus.pending(), 1);
        assert_eq!(bus.entries_read(), 1);
    }

    #[test]
    fn test_reset_clears_missed_status() {
        let mut bus = SimulatedBus::new();
        bus.set_missed_status(7);
        bus.write32(REG_RESET, RESET_ASSERT);
        assert_eq!(bus.read32(REG_STATUS_MISSED), 7);
        bus.write32(REG_RESET, RESET_RELEASE);
        assert_eq!(bus.read32(REG_STATUS_MISSED), 0);
        assert_eq!(bus.reset_count(), 1);
    }

    #[test]
    fn test_sink_capacity() {
        let mut sink = CollectingSink::with_capacity(1);
        let event = DecodedEvent::Frame(Default::default());
        assert!(sink.deliver(event.clone()).is_ok());
        assert_eq!(sink.deliver(event), Err(SinkFull));
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.refused(), 1);
    }
}
