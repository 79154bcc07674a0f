//! YP-CAN register value types
//!
//! Each hardware register is modelled as a newtype over its raw `u32` with
//! named accessors that mask and shift the fields. Nothing here touches the
//! hardware; see [`crate::bus`] for access.

use crate::constants::*;

/// BUFFER_STATUS register: FIFO occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferStatus(pub u32);

impl BufferStatus {
    /// Number of frames queued in the FIFO
    pub fn buffer_usage(&self) -> u16 {
        (self.0 & BUFFER_USAGE_MASK) as u16
    }
}

/// ERROR_STATUS register: peripheral error state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorStatus(pub u32);

impl ErrorStatus {
    /// Raw peripheral error bits
    pub fn peripheral_error(&self) -> u16 {
        (self.0 & PERIPHERAL_ERROR_MASK) as u16
    }

    /// Check if any peripheral error bit is set
    pub fn has_error(&self) -> bool {
        self.peripheral_error() != 0
    }
}

/// MISSED_STATUS register: frames lost because the FIFO was full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MissedStatus(pub u32);

impl MissedStatus {
    /// Missed frame counter (24 bits)
    pub fn missed_frames(&self) -> u32 {
        self.0 & MISSED_FRAMES_MASK
    }

    /// Counter wrapped since the last reset
    pub fn overflow(&self) -> bool {
        (self.0 & MISSED_OVERFLOW_BIT) != 0
    }
}

/// FRAME_TYPE register: protocol error flags and frame format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameTypeReg(pub u32);

impl FrameTypeReg {
    /// Bit stuffing error
    pub fn stuff_error(&self) -> bool {
        (self.0 & FRAME_STUFF_ERROR_BIT) != 0
    }

    /// Form error
    pub fn form_error(&self) -> bool {
        (self.0 & FRAME_FORM_ERROR_BIT) != 0
    }

    /// Sample error, reported as an acknowledge error
    pub fn sample_error(&self) -> bool {
        (self.0 & FRAME_SAMPLE_ERROR_BIT) != 0
    }

    /// CRC mismatch
    pub fn crc_error(&self) -> bool {
        (self.0 & FRAME_CRC_ERROR_BIT) != 0
    }

    /// Check if any of the four protocol error flags is set
    pub fn has_protocol_error(&self) -> bool {
        self.stuff_error() || self.form_error() || self.sample_error() || self.crc_error()
    }

    /// Frame format code (reserved for FD/XL, classic frames only here)
    pub fn frame_type(&self) -> u8 {
        ((self.0 >> FRAME_TYPE_SHIFT) & FRAME_TYPE_MASK) as u8
    }
}

/// CAN_ID register: identifier and flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CanIdReg(pub u32);

impl CanIdReg {
    /// 11-bit or 29-bit identifier
    pub fn id(&self) -> u32 {
        self.0 & ID_FIELD_MASK
    }

    /// Remote transmission request
    pub fn rtr(&self) -> bool {
        (self.0 & ID_RTR_BIT) != 0
    }

    /// Extended frame format
    pub fn eff(&self) -> bool {
        (self.0 & ID_EFF_BIT) != 0
    }

    /// Error frame flag
    pub fn err(&self) -> bool {
        (self.0 & ID_ERR_BIT) != 0
    }
}

/// DLC register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DlcReg(pub u32);

impl DlcReg {
    /// Data length code (0-8 by hardware contract)
    pub fn dlc(&self) -> u8 {
        (self.0 & DLC_MASK) as u8
    }
}

/// CRC register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CrcReg(pub u32);

impl CrcReg {
    /// 15-bit received CRC
    pub fn crc(&self) -> u16 {
        (self.0 & CRC_MASK) as u16
    }
}

/// Status triple read on every backoff timer tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusRegs {
    pub buffer: BufferStatus,
    pub error: ErrorStatus,
    pub missed: MissedStatus,
}

impl StatusRegs {
    /// Number of frames queued in the FIFO
    pub fn buffer_usage(&self) -> u16 {
        self.buffer.buffer_usage()
    }
}

/// One FIFO entry, read in a single locked register sequence
///
/// `buffer_status` is sampled at the start of the sequence and includes the
/// entry being read. When it is zero the FIFO was empty and the remaining
/// fields are undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HardwareSnapshot {
    pub status: StatusRegs,
    pub frame_type: FrameTypeReg,
    /// Hardware monotonic counter in microseconds
    pub timestamp: u64,
    pub can_id: CanIdReg,
    pub dlc: DlcReg,
    pub crc: CrcReg,
    /// DATA_HIGH in the upper half, DATA_LOW in the lower half
    pub data: u64,
}

impl HardwareSnapshot {
    /// FIFO occupancy when this entry was read
    pub fn buffer_usage(&self) -> u16 {
        self.status.buffer_usage()
    }

    /// Check if this snapshot holds a real FIFO entry
    pub fn is_valid(&self) -> bool {
        self.buffer_usage() != 0
    }

    /// Low 32 bits of the data field
    pub fn data_low(&self) -> u32 {
        self.data as u32
    }

    /// High 32 bits of the data field
    pub fn data_high(&self) -> u32 {
        (self.data >> 32) as u32
    }
}

impl std::fmt::Display for HardwareSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Usage: {}\nFrame type: 0x{:08x}\nTimestamp: {} us\nCAN ID: 0x{:08x}\nDLC: {}\nCRC: 0x{:04x}\nData: 0x{:016x}",
            self.buffer_usage(),
            self.frame_type.0,
            self.timestamp,
            self.can_id.0,
            self.dlc.dlc(),
            self.crc.crc(),
            self.data
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_status_ignores_reserved_bits() {
        let status = BufferStatus(0xFFFF_FC05);
        assert_eq!(status.buffer_usage(), 5);
        assert_eq!(BufferStatus(0x3FF).buffer_usage(), 1023);
    }

    #[test]
    fn test_missed_status_fields() {
        let missed = MissedStatus(MISSED_OVERFLOW_BIT | 0x12);
        assert_eq!(missed.missed_frames(), 0x12);
        assert!(missed.overflow());
        assert!(!MissedStatus(0x00FF_FFFF).overflow());
    }

    #[test]
    fn test_frame_type_fields() {
        let reg = FrameTypeReg((0x2A << 16) | FRAME_CRC_ERROR_BIT);
        assert!(reg.crc_error());
        assert!(!reg.stuff_error());
        assert!(reg.has_protocol_error());
        assert_eq!(reg.frame_type(), 0x2A);

        // Reserved error bits are not protocol errors
        assert!(!FrameTypeReg(0x0000_FFF0).has_protocol_error());
    }

    #[test]
    fn test_can_id_fields() {
        let reg = CanIdReg(ID_EFF_BIT | ID_RTR_BIT | 0x1234_5678);
        assert_eq!(reg.id(), 0x1234_5678);
        assert!(reg.eff());
        assert!(reg.rtr());
        assert!(!reg.err());
    }

    #[test]
    fn test_dlc_and_crc_masks() {
        assert_eq!(DlcReg(0xF8).dlc(), 8);
        assert_eq!(CrcReg(0xFFFF).crc(), 0x7FFF);
    }

    #[test]
    fn test_snapshot_data_halves() {
        let snap = HardwareSnapshot {
            data: 0x1122_3344_5566_7788,
            ..Default::default()
        };
        assert_eq!(snap.data_high(), 0x1122_3344);
        assert_eq!(snap.data_low(), 0x5566_7788);
        assert!(!snap.is_valid());
    }
}
