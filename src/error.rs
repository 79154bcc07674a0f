//! Error types for the YP-CAN driver core
//!
//! Only configuration and lifecycle failures surface as errors. Bus-level
//! conditions (protocol errors, missed frames, allocation failures) are
//! recovered inside the poll loop and never reach the caller.

use thiserror::Error;

/// Result type alias for YP-CAN operations
pub type Result<T> = std::result::Result<T, YpCanError>;

/// Error types for YP-CAN operations
#[derive(Error, Debug)]
pub enum YpCanError {
    /// Requested bit rate is not in the timing table
    #[error("Unsupported bitrate {bitrate}")]
    UnsupportedBitrate { bitrate: u32 },

    /// A timing parameter falls outside the device limits
    #[error("Invalid bit timing: {field} = {value} (allowed {min}..={max})")]
    InvalidTiming {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// Interface started without a bit rate
    #[error("Bit rate has not been configured")]
    BitrateNotConfigured,

    /// Interface is already up
    #[error("Interface is already started")]
    AlreadyStarted,

    /// Label does not follow the `can<N>` convention
    #[error("Invalid interface label: {0:?}")]
    InvalidLabel(String),

    /// Poll worker thread could not be spawned
    #[error("Failed to spawn poll worker: {0}")]
    Spawn(#[from] std::io::Error),
}

impl YpCanError {
    /// Check if this error was caused by the caller's configuration
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            YpCanError::UnsupportedBitrate { .. }
                | YpCanError::InvalidTiming { .. }
                | YpCanError::BitrateNotConfigured
                | YpCanError::InvalidLabel(_)
        )
    }
}
