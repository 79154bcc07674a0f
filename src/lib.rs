//! YP-CAN receive core for Rust
//!
//! This crate implements the frame acquisition engine of the YellowPirat
//! FIFO-buffered CAN receiver: a receive-only peripheral exposed through a
//! small block of memory-mapped registers, with no interrupt line.
//!
//! # Features
//!
//! - Locked, barrier-correct register access ([`RegisterBlock`])
//! - Classic CAN frame and protocol error decoding ([`FrameDecoder`])
//! - Absolute frame timestamps from the hardware microsecond counter
//! - Adaptive poll scheduling with budgeted FIFO draining ([`PollScheduler`])
//! - Fixed bit timing table (500 kbps, 1 Mbps)
//! - Rate-limited error logging through the `log` facade
//!
//! # Example
//!
//! ```no_run
//! use std::ptr::NonNull;
//! use yp_can::{DecodedEvent, DeviceConfig, FrameSink, MmioBus, SinkFull, YpCan};
//!
//! struct Printer;
//!
//! impl FrameSink for Printer {
//!     fn deliver(&mut self, event: DecodedEvent) -> Result<(), SinkFull> {
//!         match event {
//!             DecodedEvent::Frame(frame) => println!("RX  {}", frame),
//!             DecodedEvent::Error(err) => println!("ERR {}", err.primary.description()),
//!         }
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> yp_can::Result<()> {
//!     # let mapped: *mut u32 = std::ptr::null_mut();
//!     let base = NonNull::new(mapped).expect("register window not mapped");
//!     let bus = unsafe { MmioBus::new(base) };
//!
//!     let mut dev = YpCan::new(bus, DeviceConfig::from_label("can0")?, Printer);
//!     dev.set_bit_rate(500_000)?;
//!     dev.start()?;
//!
//!     std::thread::sleep(std::time::Duration::from_secs(10));
//!     dev.stop();
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod frame;
pub mod registers;
pub mod scheduler;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod stats;
pub mod throttle;
pub mod timestamp;
pub mod timing;

// Re-export main types at crate root
pub use constants::{
    // CAN ID flags
    CAN_EFF_FLAG,
    // CAN ID masks
    CAN_EFF_MASK,
    // Error frame classes
    CAN_ERR_ACK,
    CAN_ERR_FLAG,
    CAN_ERR_PROT,
    CAN_RTR_FLAG,
    CAN_SFF_MASK,
};

pub use bus::{MmioBus, RegisterBlock, RegisterBus};
pub use config::DeviceConfig;
pub use device::{CanState, YpCan};
pub use error::{Result, YpCanError};
pub use frame::{CanFrame, DecodedEvent, ErrorEvent, FrameDecoder, FrameSink, ProtocolError, SinkFull};
pub use registers::HardwareSnapshot;
pub use scheduler::{DrainOutcome, PollMode, PollScheduler, TimerOutcome};
pub use stats::StatsSnapshot;
pub use timestamp::{Clock, SystemClock, TimestampBase};
pub use timing::{resolve, BitTiming, TimingConstraints};
