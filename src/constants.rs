//! YP-CAN register map and protocol constants
//!
//! This module contains the register offsets of the peripheral, the bit
//! layout of each register, the SocketCAN-compatible CAN id flags and
//! error-frame codes, and the driver defaults.

use std::time::Duration;

// ============================================================================
// Register Offsets (read side, one FIFO entry)
// ============================================================================

/// FIFO buffer usage
pub const REG_STATUS_BUFFER: usize = 0x00;
/// Peripheral error status
pub const REG_STATUS_ERROR: usize = 0x04;
/// Missed frame counter and overflow flag
pub const REG_STATUS_MISSED: usize = 0x08;
/// Protocol error flags and frame type
pub const REG_FRAME_TYPE: usize = 0x0C;
/// Hardware timestamp, low 32 bits (microseconds)
pub const REG_TIMESTAMP_LOW: usize = 0x10;
/// Hardware timestamp, high 32 bits (microseconds)
pub const REG_TIMESTAMP_HIGH: usize = 0x14;
/// CAN identifier and RTR/EFF/ERR flags
pub const REG_CAN_ID: usize = 0x18;
/// Data length code
pub const REG_DLC: usize = 0x1C;
/// Received CRC
pub const REG_CRC: usize = 0x20;
/// Frame data, low 32 bits
pub const REG_DATA_LOW: usize = 0x24;
/// Frame data, high 32 bits. Reading it advances the FIFO.
pub const REG_DATA_HIGH: usize = 0x28;

// ============================================================================
// Register Offsets (write side, bit timing and reset)
// ============================================================================

/// Synchronization segment
pub const REG_SYNC_SEG: usize = 0x40;
/// Propagation segment
pub const REG_PROP_SEG: usize = 0x44;
/// Phase segment 1
pub const REG_PHASE_SEG1: usize = 0x48;
/// Phase segment 2
pub const REG_PHASE_SEG2: usize = 0x4C;
/// Baud rate prescaler
pub const REG_PRESCALER: usize = 0x50;
/// Reset strobe
pub const REG_RESET: usize = 0x54;

/// Size of the mapped register window in bytes
pub const REG_BLOCK_SIZE: usize = 0x58;

/// Reset strobe asserted
pub const RESET_ASSERT: u32 = 1;
/// Reset strobe released
pub const RESET_RELEASE: u32 = 0;

// ============================================================================
// Register Bit Fields
// ============================================================================

/// BUFFER_STATUS: buffer usage, bits 0..10
pub const BUFFER_USAGE_MASK: u32 = 0x0000_03FF;

/// ERROR_STATUS: peripheral error state, bits 0..16
pub const PERIPHERAL_ERROR_MASK: u32 = 0x0000_FFFF;

/// MISSED_STATUS: missed frame counter, bits 0..24
pub const MISSED_FRAMES_MASK: u32 = 0x00FF_FFFF;
/// MISSED_STATUS: counter overflow, bit 24
pub const MISSED_OVERFLOW_BIT: u32 = 1 << 24;

/// FRAME_TYPE: bit stuffing error
pub const FRAME_STUFF_ERROR_BIT: u32 = 1 << 0;
/// FRAME_TYPE: form error
pub const FRAME_FORM_ERROR_BIT: u32 = 1 << 1;
/// FRAME_TYPE: sample (acknowledge) error
pub const FRAME_SAMPLE_ERROR_BIT: u32 = 1 << 2;
/// FRAME_TYPE: CRC error
pub const FRAME_CRC_ERROR_BIT: u32 = 1 << 3;
/// FRAME_TYPE: frame type code shift (2.0, FD, XL, ...)
pub const FRAME_TYPE_SHIFT: u32 = 16;
/// FRAME_TYPE: frame type code mask (after shift)
pub const FRAME_TYPE_MASK: u32 = 0xFF;

/// CAN_ID: identifier, bits 0..29
pub const ID_FIELD_MASK: u32 = 0x1FFF_FFFF;
/// CAN_ID: remote transmission request, bit 29
pub const ID_RTR_BIT: u32 = 1 << 29;
/// CAN_ID: extended frame format, bit 30
pub const ID_EFF_BIT: u32 = 1 << 30;
/// CAN_ID: error frame, bit 31
pub const ID_ERR_BIT: u32 = 1 << 31;

/// DLC: data length code, bits 0..4
pub const DLC_MASK: u32 = 0x0F;

/// CRC: received CRC, bits 0..15
pub const CRC_MASK: u32 = 0x7FFF;

// ============================================================================
// CAN ID Flags (in CAN frame identifier)
// ============================================================================

/// Extended frame format flag (29-bit ID)
pub const CAN_EFF_FLAG: u32 = 0x8000_0000;
/// Remote transmission request flag
pub const CAN_RTR_FLAG: u32 = 0x4000_0000;
/// Error message frame flag
pub const CAN_ERR_FLAG: u32 = 0x2000_0000;

/// Standard frame format mask (11-bit ID)
pub const CAN_SFF_MASK: u32 = 0x0000_07FF;
/// Extended frame format mask (29-bit ID)
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;

/// Maximum data length for classic CAN
pub const CAN_MAX_DLEN: usize = 8;

// ============================================================================
// Error Frame Definitions (SocketCAN layout)
// ============================================================================

/// Error frames always carry eight bytes of payload
pub const CAN_ERR_DLC: u8 = 8;

/// Error class: protocol violation (details in data[2] and data[3])
pub const CAN_ERR_PROT: u32 = 0x0000_0008;
/// Error class: received no ACK on transmission
pub const CAN_ERR_ACK: u32 = 0x0000_0020;

/// data[2]: form error
pub const CAN_ERR_PROT_FORM: u8 = 0x02;
/// data[2]: bit stuffing error
pub const CAN_ERR_PROT_STUFF: u8 = 0x04;

/// data[3]: CRC sequence
pub const CAN_ERR_PROT_LOC_CRC_SEQ: u8 = 0x08;

/// Payload index of the protocol error type byte
pub const CAN_ERR_PROT_TYPE_INDEX: usize = 2;
/// Payload index of the protocol error location byte
pub const CAN_ERR_PROT_LOC_INDEX: usize = 3;

// ============================================================================
// Control Mode
// ============================================================================

/// Listen-only mode (the peripheral never transmits)
pub const CAN_CTRLMODE_LISTENONLY: u32 = 0x02;

// ============================================================================
// Driver Defaults
// ============================================================================

/// Backoff between FIFO occupancy checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Frames drained per scheduler invocation (hardware FIFO size)
pub const DEFAULT_POLL_BUDGET: u32 = 256;
/// Shared cooldown of the error log throttle
pub const DEFAULT_ERROR_LOG_COOLDOWN: Duration = Duration::from_secs(15);
/// Peripheral CAN clock
pub const DEFAULT_CLOCK_HZ: u32 = 40_000_000;
