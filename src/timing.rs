//! Bit timing table
//!
//! The peripheral runs from a fixed 40 MHz clock and supports exactly two
//! nominal bit rates. Timing values are looked up, checked against the
//! device limits, then written and latched with a reset pulse.

use crate::bus::{RegisterBlock, RegisterBus};
use crate::error::{Result, YpCanError};

/// CAN bit timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitTiming {
    /// Synchronization segment (always 1)
    pub sync_seg: u8,
    /// Propagation segment
    pub prop_seg: u8,
    /// Phase segment 1
    pub phase_seg1: u8,
    /// Phase segment 2
    pub phase_seg2: u8,
    /// Synchronization jump width
    pub sjw: u8,
    /// Baud rate prescaler
    pub brp: u8,
}

impl BitTiming {
    /// Create a timing configuration with the fixed sync segment and SJW 1
    pub const fn new(prop_seg: u8, phase_seg1: u8, phase_seg2: u8, brp: u8) -> Self {
        Self {
            sync_seg: 1,
            prop_seg,
            phase_seg1,
            phase_seg2,
            sjw: 1,
            brp,
        }
    }

    /// Time segment 1 (propagation + phase 1)
    pub fn tseg1(&self) -> u32 {
        self.prop_seg as u32 + self.phase_seg1 as u32
    }

    /// Time segment 2
    pub fn tseg2(&self) -> u32 {
        self.phase_seg2 as u32
    }

    /// Time quanta per bit
    pub fn bit_time_quanta(&self) -> u32 {
        self.sync_seg as u32 + self.tseg1() + self.tseg2()
    }

    /// Sample point in percent of the bit time
    pub fn sample_point(&self) -> f32 {
        let before = (self.sync_seg as u32 + self.tseg1()) as f32;
        before * 100.0 / self.bit_time_quanta() as f32
    }

    /// Resulting bit rate for a peripheral clock
    pub fn bitrate(&self, clock_hz: u32) -> u32 {
        clock_hz / (self.brp as u32 * self.bit_time_quanta())
    }
}

impl std::fmt::Display for BitTiming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Sync Seg: {}\nProp Seg: {}\nPhase Seg 1: {}\nPhase Seg 2: {}\nSJW: {}\nBRP: {}",
            self.sync_seg, self.prop_seg, self.phase_seg1, self.phase_seg2, self.sjw, self.brp
        )
    }
}

/// Bit timing limits of the device
#[derive(Debug, Clone, Copy)]
pub struct TimingConstraints {
    /// Minimum TSEG1 value
    pub tseg1_min: u32,
    /// Maximum TSEG1 value
    pub tseg1_max: u32,
    /// Minimum TSEG2 value
    pub tseg2_min: u32,
    /// Maximum TSEG2 value
    pub tseg2_max: u32,
    /// Maximum SJW value
    pub sjw_max: u32,
    /// Minimum BRP value
    pub brp_min: u32,
    /// Maximum BRP value
    pub brp_max: u32,
}

/// Documented limits of the YP-CAN timing registers
pub const YP_CAN_TIMING_CONSTRAINTS: TimingConstraints = TimingConstraints {
    tseg1_min: 1,
    tseg1_max: 32,
    tseg2_min: 1,
    tseg2_max: 8,
    sjw_max: 4,
    brp_min: 1,
    brp_max: 64,
};

impl TimingConstraints {
    /// Check every field of `timing` against these limits
    pub fn validate(&self, timing: &BitTiming) -> Result<()> {
        check("tseg1", timing.tseg1(), self.tseg1_min, self.tseg1_max)?;
        check("tseg2", timing.tseg2(), self.tseg2_min, self.tseg2_max)?;
        check("sjw", timing.sjw as u32, 1, self.sjw_max)?;
        check("brp", timing.brp as u32, self.brp_min, self.brp_max)?;
        Ok(())
    }
}

fn check(field: &'static str, value: u32, min: u32, max: u32) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(YpCanError::InvalidTiming {
            field,
            value,
            min,
            max,
        })
    }
}

/// Look up the timing for a nominal bit rate
///
/// # Supported bitrates
/// - 500000 (500 kbps)
/// - 1000000 (1 Mbps)
pub fn resolve(bitrate: u32) -> Result<BitTiming> {
    match bitrate {
        500_000 => Ok(BitTiming::new(5, 7, 7, 4)),
        1_000_000 => Ok(BitTiming::new(2, 4, 3, 4)),
        _ => Err(YpCanError::UnsupportedBitrate { bitrate }),
    }
}

/// Resolve, validate and program a bit rate
///
/// Hardware is left untouched on any error. On success the timing registers
/// are written and the peripheral is reset so the new timing is latched.
pub fn program<B: RegisterBus>(regs: &RegisterBlock<B>, bitrate: u32) -> Result<BitTiming> {
    let timing = resolve(bitrate)?;
    YP_CAN_TIMING_CONSTRAINTS.validate(&timing)?;

    regs.write_timing(&timing);
    regs.pulse_reset();
    Ok(timing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_CLOCK_HZ, REG_PRESCALER, REG_RESET};
    use crate::sim::{BusAccess, SimulatedBus};

    #[test]
    fn test_resolve_500k() {
        let timing = resolve(500_000).unwrap();
        assert_eq!(timing.sync_seg, 1);
        assert_eq!(timing.prop_seg, 5);
        assert_eq!(timing.phase_seg1, 7);
        assert_eq!(timing.phase_seg2, 7);
        assert_eq!(timing.brp, 4);
    }

    #[test]
    fn test_resolve_1m() {
        assert_eq!(resolve(1_000_000).unwrap(), BitTiming::new(2, 4, 3, 4));
    }

    #[test]
    fn test_resolve_unsupported() {
        for bitrate in [0, 125_000, 250_000, 800_000, 2_000_000] {
            assert!(matches!(
                resolve(bitrate),
                Err(YpCanError::UnsupportedBitrate { bitrate: b }) if b == bitrate
            ));
        }
    }

    #[test]
    fn test_table_matches_clock() {
        for bitrate in [500_000, 1_000_000] {
            let timing = resolve(bitrate).unwrap();
            assert!(YP_CAN_TIMING_CONSTRAINTS.validate(&timing).is_ok());
            assert_eq!(timing.bitrate(DEFAULT_CLOCK_HZ), bitrate);
        }
        assert_eq!(resolve(500_000).unwrap().sample_point(), 65.0);
        assert_eq!(resolve(1_000_000).unwrap().sample_point(), 70.0);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let timing = BitTiming::new(20, 13, 2, 4);
        assert!(matches!(
            YP_CAN_TIMING_CONSTRAINTS.validate(&timing),
            Err(YpCanError::InvalidTiming { field: "tseg1", value: 33, .. })
        ));

        let timing = BitTiming::new(1, 1, 9, 4);
        assert!(matches!(
            YP_CAN_TIMING_CONSTRAINTS.validate(&timing),
            Err(YpCanError::InvalidTiming { field: "tseg2", .. })
        ));

        let timing = BitTiming::new(1, 1, 1, 0);
        assert!(matches!(
            YP_CAN_TIMING_CONSTRAINTS.validate(&timing),
            Err(YpCanError::InvalidTiming { field: "brp", .. })
        ));

        let mut timing = BitTiming::new(1, 1, 1, 1);
        timing.sjw = 5;
        assert!(matches!(
            YP_CAN_TIMING_CONSTRAINTS.validate(&timing),
            Err(YpCanError::InvalidTiming { field: "sjw", .. })
        ));
    }

    #[test]
    fn test_program_writes_then_resets() {
        let regs = RegisterBlock::new(SimulatedBus::new());
        let timing = program(&regs, 1_000_000).unwrap();
        assert_eq!(timing.phase_seg2, 3);

        let log = regs.with_bus(|bus| bus.log().to_vec());
        let prescaler = log
            .iter()
            .position(|a| *a == BusAccess::Write(REG_PRESCALER, 4))
            .unwrap();
        let reset = log
            .iter()
            .position(|a| matches!(a, BusAccess::Write(REG_RESET, _)))
            .unwrap();
        assert!(prescaler < reset);
        regs.with_bus(|bus| assert_eq!(bus.reset_count(), 1));
    }

    #[test]
    fn test_program_unsupported_leaves_hardware_untouched() {
        let regs = RegisterBlock::new(SimulatedBus::new());
        assert!(program(&regs, 250_000).is_err());
        regs.with_bus(|bus| assert!(bus.log().is_empty()));
    }
}
