//! YP-CAN frame decoding
//!
//! This module turns one [`HardwareSnapshot`] into a [`DecodedEvent`]: a
//! classic CAN data/remote frame, or a SocketCAN-style error frame when the
//! hardware flagged a protocol error.

use std::time::SystemTime;

use crate::constants::*;
use crate::registers::HardwareSnapshot;
use crate::timestamp::TimestampBase;

/// Convert DLC to data length
pub fn dlc_to_len(dlc: u8) -> usize {
    (dlc as usize).min(CAN_MAX_DLEN)
}

/// Classic CAN frame as delivered upward
#[derive(Clone, PartialEq, Eq)]
pub struct CanFrame {
    /// CAN identifier with EFF/RTR/ERR flags
    pub can_id: u32,
    /// Data length code as read from hardware
    pub can_dlc: u8,
    /// Frame data
    pub data: [u8; CAN_MAX_DLEN],
    /// Absolute receive time
    pub timestamp: SystemTime,
}

impl Default for CanFrame {
    fn default() -> Self {
        Self {
            can_id: 0,
            can_dlc: 0,
            data: [0u8; CAN_MAX_DLEN],
            timestamp: SystemTime::UNIX_EPOCH,
        }
    }
}

impl CanFrame {
    /// Get the arbitration ID (without flags)
    pub fn arbitration_id(&self) -> u32 {
        if self.is_extended_id() {
            self.can_id & CAN_EFF_MASK
        } else {
            self.can_id & CAN_SFF_MASK
        }
    }

    /// Check if this is an extended ID frame (29-bit)
    pub fn is_extended_id(&self) -> bool {
        (self.can_id & CAN_EFF_FLAG) != 0
    }

    /// Check if this is a remote transmission request
    pub fn is_remote_frame(&self) -> bool {
        (self.can_id & CAN_RTR_FLAG) != 0
    }

    /// Check if the ERR flag was passed through from the id register
    pub fn is_error_frame(&self) -> bool {
        (self.can_id & CAN_ERR_FLAG) != 0
    }

    /// Get actual data length based on DLC
    pub fn data_length(&self) -> usize {
        dlc_to_len(self.can_dlc)
    }

    /// Get frame data as a slice
    pub fn data(&self) -> &[u8] {
        &self.data[..self.data_length()]
    }
}

impl std::fmt::Display for CanFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data_str = if self.is_remote_frame() {
            "remote request".to_string()
        } else {
            self.data()
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(" ")
        };

        write!(
            f,
            "{:>8X}   [{}]  {}",
            self.arbitration_id(),
            self.data_length(),
            data_str
        )
    }
}

impl std::fmt::Debug for CanFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanFrame")
            .field("can_id", &format_args!("0x{:08X}", self.can_id))
            .field("can_dlc", &self.can_dlc)
            .field("data", &format_args!("{:02X?}", self.data()))
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Protocol error reported in the FRAME_TYPE register
///
/// Ordered by reporting priority, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolError {
    /// Six consecutive bits of the same level between SOF and CRC
    Stuff,
    /// Invalid bit level in a fixed-form field
    Form,
    /// Nobody drove the ACK slot dominant (sample error)
    Ack,
    /// Received CRC differs from the computed one
    Crc,
}

impl ProtocolError {
    /// Log text for this error
    pub fn description(&self) -> &'static str {
        match self {
            ProtocolError::Stuff => "Bit stuffing error detected",
            ProtocolError::Form => "Form error detected",
            ProtocolError::Ack => "ACK error detected",
            ProtocolError::Crc => "CRC error detected",
        }
    }
}

/// Error frame synthesized from protocol error flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    /// CAN_ERR_FLAG plus error class bits
    pub can_id: u32,
    /// Error details, SocketCAN layout
    pub data: [u8; CAN_MAX_DLEN],
    /// Highest-priority error present
    pub primary: ProtocolError,
    /// Absolute receive time
    pub timestamp: SystemTime,
}

impl ErrorEvent {
    /// Error frames always report eight bytes
    pub fn can_dlc(&self) -> u8 {
        CAN_ERR_DLC
    }

    /// Protocol error type byte
    pub fn prot_type(&self) -> u8 {
        self.data[CAN_ERR_PROT_TYPE_INDEX]
    }

    /// Protocol error location byte
    pub fn prot_location(&self) -> u8 {
        self.data[CAN_ERR_PROT_LOC_INDEX]
    }
}

/// Output of the decoder for one FIFO entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    Frame(CanFrame),
    Error(ErrorEvent),
}

impl DecodedEvent {
    /// Absolute receive time
    pub fn timestamp(&self) -> SystemTime {
        match self {
            DecodedEvent::Frame(frame) => frame.timestamp,
            DecodedEvent::Error(err) => err.timestamp,
        }
    }

    /// Check if this is a synthesized error frame
    pub fn is_error(&self) -> bool {
        matches!(self, DecodedEvent::Error(_))
    }
}

/// Delivery was refused because no frame container could be allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkFull;

/// Upward hand-off for decoded events
pub trait FrameSink: Send {
    /// Hand one event to the network stack
    fn deliver(&mut self, event: DecodedEvent) -> Result<(), SinkFull>;

    /// Account one received data frame of `bytes` payload bytes
    fn record_stats(&mut self, _bytes: usize) {}
}

/// Snapshot decoder bound to one timestamp base
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder {
    base: TimestampBase,
}

impl FrameDecoder {
    /// Create a decoder using `base` for absolute timestamps
    pub fn new(base: TimestampBase) -> Self {
        Self { base }
    }

    /// Timestamp base in use
    pub fn base(&self) -> TimestampBase {
        self.base
    }

    /// Decode one FIFO entry
    pub fn decode(&self, snap: &HardwareSnapshot) -> DecodedEvent {
        let timestamp = self.base.to_absolute(snap.timestamp);
        if snap.frame_type.has_protocol_error() {
            DecodedEvent::Error(decode_error(snap, timestamp))
        } else {
            DecodedEvent::Frame(decode_frame(snap, timestamp))
        }
    }
}

fn decode_error(snap: &HardwareSnapshot, timestamp: SystemTime) -> ErrorEvent {
    let flags = snap.frame_type;
    let mut can_id = CAN_ERR_FLAG;
    let mut data = [0u8; CAN_MAX_DLEN];
    let mut primary = None;

    if flags.stuff_error() {
        can_id |= CAN_ERR_PROT;
        data[CAN_ERR_PROT_TYPE_INDEX] |= CAN_ERR_PROT_STUFF;
        primary.get_or_insert(ProtocolError::Stuff);
    }
    if flags.form_error() {
        can_id |= CAN_ERR_PROT;
        data[CAN_ERR_PROT_TYPE_INDEX] |= CAN_ERR_PROT_FORM;
        primary.get_or_insert(ProtocolError::Form);
    }
    if flags.sample_error() {
        can_id |= CAN_ERR_ACK;
        primary.get_or_insert(ProtocolError::Ack);
    }
    if flags.crc_error() {
        can_id |= CAN_ERR_PROT;
        data[CAN_ERR_PROT_LOC_INDEX] = CAN_ERR_PROT_LOC_CRC_SEQ;
        primary.get_or_insert(ProtocolError::Crc);
    }

    ErrorEvent {
        can_id,
        data,
        // Only called with at least one flag set
        primary: primary.unwrap_or(ProtocolError::Crc),
        timestamp,
    }
}

fn decode_frame(snap: &HardwareSnapshot, timestamp: SystemTime) -> CanFrame {
    let reg = snap.can_id;
    let mut can_id = reg.id();
    if reg.eff() {
        can_id |= CAN_EFF_FLAG;
    }
    if reg.rtr() {
        can_id |= CAN_RTR_FLAG;
    }
    // Passed through unvalidated, a data frame does not normally carry it
    if reg.err() {
        can_id |= CAN_ERR_FLAG;
    }

    let can_dlc = snap.dlc.dlc();
    let mut data = [0u8; CAN_MAX_DLEN];

    // Both halves are big-endian on the wire side of the register
    if can_dlc <= 4 {
        let low = snap.data_low().to_be_bytes();
        let len = can_dlc as usize;
        data[..len].copy_from_slice(&low[..len]);
    } else {
        data[..4].copy_from_slice(&snap.data_high().to_be_bytes());
        data[4..].copy_from_slice(&snap.data_low().to_be_bytes());
    }

    CanFrame {
        can_id,
        can_dlc,
        data,
        timestamp,
    }
}
