//! Register block access
//!
//! [`RegisterBus`] is the raw 32-bit accessor for the peripheral window.
//! [`RegisterBlock`] owns the bus behind a single spin lock and is the only
//! way the rest of the crate talks to the hardware. Every operation holds the
//! lock for its whole register sequence, including single status reads,
//! because unserialized accesses corrupt unrelated in-flight bus transactions
//! on this peripheral.

use std::ptr::NonNull;
use std::sync::atomic::{fence, Ordering};

use spin::Mutex;

use crate::constants::*;
use crate::registers::{
    BufferStatus, CanIdReg, CrcReg, DlcReg, ErrorStatus, FrameTypeReg, HardwareSnapshot,
    MissedStatus, StatusRegs,
};
use crate::timing::BitTiming;

/// Raw 32-bit access to the peripheral register window
///
/// Offsets are byte offsets from the start of the window and are always
/// 4-byte aligned.
pub trait RegisterBus: Send {
    /// Read the register at `offset`
    fn read32(&mut self, offset: usize) -> u32;

    /// Write `value` to the register at `offset`
    fn write32(&mut self, offset: usize, value: u32);

    /// Full memory barrier between two register accesses
    fn barrier(&mut self) {
        fence(Ordering::SeqCst);
    }
}

/// Memory-mapped register window
pub struct MmioBus {
    base: NonNull<u32>,
    len: usize,
}

impl MmioBus {
    /// Wrap an already mapped register window
    ///
    /// # Safety
    ///
    /// `base` must point to a mapping of at least [`REG_BLOCK_SIZE`] bytes
    /// of device memory that stays valid for the lifetime of the returned
    /// value, and nothing else may access that mapping concurrently.
    pub unsafe fn new(base: NonNull<u32>) -> Self {
        Self {
            base,
            len: REG_BLOCK_SIZE,
        }
    }

    fn register(&self, offset: usize) -> *mut u32 {
        assert!(
            offset % 4 == 0 && offset + 4 <= self.len,
            "register offset 0x{:02x} outside window",
            offset
        );
        // SAFETY: offset is checked against the window size given to `new`.
        unsafe { self.base.as_ptr().add(offset / 4) }
    }
}

// SAFETY: the mapping is owned exclusively by this value (see `new`), so it
// can move to another thread together with it.
unsafe impl Send for MmioBus {}

impl RegisterBus for MmioBus {
    fn read32(&mut self, offset: usize) -> u32 {
        // SAFETY: `register` returns an aligned pointer inside the mapping.
        unsafe { std::ptr::read_volatile(self.register(offset)) }
    }

    fn write32(&mut self, offset: usize, value: u32) {
        // SAFETY: `register` returns an aligned pointer inside the mapping.
        unsafe { std::ptr::write_volatile(self.register(offset), value) }
    }
}

impl std::fmt::Debug for MmioBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmioBus")
            .field("base", &self.base)
            .field("len", &format_args!("0x{:x}", self.len))
            .finish()
    }
}

/// Sole owner of the peripheral register block
pub struct RegisterBlock<B: RegisterBus> {
    bus: Mutex<B>,
}

impl<B: RegisterBus> RegisterBlock<B> {
    /// Take ownership of a register bus
    pub fn new(bus: B) -> Self {
        Self {
            bus: Mutex::new(bus),
        }
    }

    /// Read the buffer, error and missed status registers
    pub fn read_status(&self) -> StatusRegs {
        let mut bus = self.bus.lock();
        read_status_locked(&mut *bus)
    }

    /// Read one full FIFO entry
    ///
    /// The sequence is fixed: status, frame type, timestamp, id, dlc, crc,
    /// data low, barrier, data high. The DATA_HIGH read advances the FIFO,
    /// so every call consumes one buffered entry.
    pub fn read_frame(&self) -> HardwareSnapshot {
        let mut bus = self.bus.lock();
        let bus = &mut *bus;

        let status = read_status_locked(bus);
        let frame_type = FrameTypeReg(bus.read32(REG_FRAME_TYPE));

        let ts_lo = bus.read32(REG_TIMESTAMP_LOW);
        let ts_hi = bus.read32(REG_TIMESTAMP_HIGH);

        let can_id = CanIdReg(bus.read32(REG_CAN_ID));
        let dlc = DlcReg(bus.read32(REG_DLC));
        let crc = CrcReg(bus.read32(REG_CRC));

        let data_lo = bus.read32(REG_DATA_LOW);
        // DATA_HIGH must not be issued before DATA_LOW has completed
        bus.barrier();
        let data_hi = bus.read32(REG_DATA_HIGH);

        HardwareSnapshot {
            status,
            frame_type,
            timestamp: ((ts_hi as u64) << 32) | ts_lo as u64,
            can_id,
            dlc,
            crc,
            data: ((data_hi as u64) << 32) | data_lo as u64,
        }
    }

    /// Write the bit timing registers
    pub fn write_timing(&self, timing: &BitTiming) {
        let mut bus = self.bus.lock();
        bus.write32(REG_SYNC_SEG, timing.sync_seg as u32);
        bus.write32(REG_PROP_SEG, timing.prop_seg as u32);
        bus.write32(REG_PHASE_SEG1, timing.phase_seg1 as u32);
        bus.write32(REG_PHASE_SEG2, timing.phase_seg2 as u32);
        bus.write32(REG_PRESCALER, timing.brp as u32);
    }

    /// Strobe the reset line: assert, barrier, release
    pub fn pulse_reset(&self) {
        let mut bus = self.bus.lock();
        bus.write32(REG_RESET, RESET_ASSERT);
        bus.barrier();
        bus.write32(REG_RESET, RESET_RELEASE);
    }

    /// Run `f` with the locked bus
    #[cfg(any(test, feature = "sim"))]
    pub fn with_bus<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        let mut bus = self.bus.lock();
        f(&mut *bus)
    }
}

fn read_status_locked<B: RegisterBus>(bus: &mut B) -> StatusRegs {
    StatusRegs {
        buffer: BufferStatus(bus.read32(REG_STATUS_BUFFER)),
        error: ErrorStatus(bus.read32(REG_STATUS_ERROR)),
        missed: MissedStatus(bus.read32(REG_STATUS_MISSED)),
    }
}
