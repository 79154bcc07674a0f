//! Adaptive FIFO poll scheduler
//!
//! The peripheral has no interrupt line. The scheduler alternates between a
//! backoff timer that checks FIFO occupancy and budgeted bursts that drain
//! it:
//!
//! ```text
//!            start()              occupancy > 0
//! Stopped ───────────▶ Armed ─────────────────────▶ Draining
//!    ▲                  ▲  │ occupancy == 0            │  │
//!    │                  │  └──── re-arm ◀───┘          │  │ budget exhausted:
//!    │                  └────── drained < budget ──────┘  │ caller re-invokes
//!    └──────────────── stop() from any state              ▼ drain() at once
//! ```
//!
//! The scheduler never loops past its budget inside one [`drain`] call; the
//! caller owns re-invocation, like a NAPI poll loop.
//!
//! [`drain`]: PollScheduler::drain

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bus::{RegisterBlock, RegisterBus};
use crate::config::DeviceConfig;
use crate::frame::{DecodedEvent, FrameDecoder, FrameSink};
use crate::registers::StatusRegs;
use crate::stats::InterfaceStats;
use crate::throttle::{ErrorClass, ErrorLogThrottle};
use crate::timestamp::{Clock, TimestampBase};

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Interface down, no register access
    Stopped,
    /// Backoff timer pending
    Armed,
    /// Pulling budgeted bursts
    Draining,
}

/// What the timer owner must do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    /// Fire again after this delay
    Rearm(Duration),
    /// Frames are queued, invoke [`PollScheduler::drain`]
    Drain,
    /// Scheduler is stopped, do nothing
    Stopped,
}

/// Result of one drain invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Entries consumed from the FIFO
    pub drained: u32,
    /// Budget of this invocation
    pub budget: u32,
}

impl DrainOutcome {
    /// Whole budget used, re-invoke without delay
    pub fn exhausted(&self) -> bool {
        self.drained >= self.budget
    }
}

/// Mutable scheduler state, owned by one execution context
#[derive(Debug, Clone)]
pub struct PollState {
    /// Budget left in the current burst
    pub budget_remaining: u32,
    /// Current mode
    pub mode: PollMode,
    /// Entries known to be queued after the last read
    pub pending: u16,
    /// Shared window of protocol and missed-frame reports
    pub throttle: ErrorLogThrottle,
    /// Separate window for the sticky peripheral error status
    pub peripheral_throttle: ErrorLogThrottle,
}

/// Poll scheduler for one interface
pub struct PollScheduler {
    label: String,
    poll_interval: Duration,
    budget: u32,
    decoder: FrameDecoder,
    state: PollState,
    stats: Arc<InterfaceStats>,
}

impl PollScheduler {
    /// Create a stopped scheduler
    pub fn new(config: &DeviceConfig, stats: Arc<InterfaceStats>) -> Self {
        Self {
            label: config.label.clone(),
            poll_interval: config.poll_interval,
            budget: config.budget.max(1),
            decoder: FrameDecoder::default(),
            state: PollState {
                budget_remaining: 0,
                mode: PollMode::Stopped,
                pending: 0,
                throttle: ErrorLogThrottle::new(config.error_log_cooldown),
                peripheral_throttle: ErrorLogThrottle::new(config.error_log_cooldown),
            },
            stats,
        }
    }

    /// Current mode
    pub fn mode(&self) -> PollMode {
        self.state.mode
    }

    /// Read-only view of the state
    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Timestamp base captured by the last [`start`](Self::start)
    pub fn timestamp_base(&self) -> TimestampBase {
        self.decoder.base()
    }

    /// Capture the timestamp base and arm the backoff timer
    ///
    /// Returns the delay before the first tick.
    pub fn start(&mut self, clock: &dyn Clock) -> Duration {
        self.decoder = FrameDecoder::new(TimestampBase::capture(clock));
        self.state.mode = PollMode::Armed;
        self.state.pending = 0;
        self.state.budget_remaining = 0;
        log::debug!("{}: poll scheduler armed", self.label);
        self.poll_interval
    }

    /// Disarm; no register access happens after this returns
    pub fn stop(&mut self) {
        self.state.mode = PollMode::Stopped;
        self.state.pending = 0;
        self.state.budget_remaining = 0;
        log::debug!("{}: poll scheduler stopped", self.label);
    }

    /// Backoff timer expiry
    pub fn on_timer<B: RegisterBus>(&mut self, regs: &RegisterBlock<B>, now: Instant) -> TimerOutcome {
        match self.state.mode {
            PollMode::Stopped => return TimerOutcome::Stopped,
            PollMode::Draining => return TimerOutcome::Drain,
            PollMode::Armed => {}
        }

        let usage = self.check_status(regs, now);
        if usage == 0 {
            return TimerOutcome::Rearm(self.poll_interval);
        }

        log::trace!("{}: {} frames queued, draining", self.label, usage);
        self.state.pending = usage;
        self.state.mode = PollMode::Draining;
        TimerOutcome::Drain
    }

    /// Drain up to one budget of FIFO entries into `sink`
    ///
    /// Goes back to [`PollMode::Armed`] when fewer than the budget were
    /// drained; the caller must then re-arm the timer. An exhausted budget
    /// leaves the scheduler in [`PollMode::Draining`].
    pub fn drain<B, S>(&mut self, regs: &RegisterBlock<B>, sink: &mut S, now: Instant) -> DrainOutcome
    where
        B: RegisterBus,
        S: FrameSink + ?Sized,
    {
        let budget = self.budget;
        if self.state.mode != PollMode::Draining {
            return DrainOutcome { drained: 0, budget };
        }

        if self.state.pending == 0 {
            self.state.pending = regs.read_status().buffer_usage();
        }

        self.state.budget_remaining = budget;
        let mut drained = 0;
        while self.state.budget_remaining > 0 && self.state.pending > 0 {
            let snap = regs.read_frame();
            if !snap.is_valid() {
                self.state.pending = 0;
                break;
            }
            self.state.pending = snap.buffer_usage() - 1;
            self.state.budget_remaining -= 1;
            drained += 1;

            let event = self.decoder.decode(&snap);
            if !self.dispatch(event, sink, now) {
                break;
            }
        }

        let outcome = DrainOutcome { drained, budget };
        if !outcome.exhausted() {
            self.state.mode = PollMode::Armed;
            log::trace!("{}: drained {} frames, re-arming", self.label, drained);
        }
        outcome
    }

    /// Read status, report errors and return FIFO occupancy
    fn check_status<B: RegisterBus>(&mut self, regs: &RegisterBlock<B>, now: Instant) -> u16 {
        let status: StatusRegs = regs.read_status();

        if status.error.has_error() {
            self.state.peripheral_throttle.error(
                now,
                &self.label,
                ErrorClass::Peripheral,
                &format!("peripheral error: {:x}", status.error.peripheral_error()),
            );
        }

        let missed = status.missed;
        if missed.missed_frames() != 0 || missed.overflow() {
            self.stats.record_missed(missed.missed_frames());
            let message = if missed.overflow() {
                format!("missed frames: {} (counter overflow)", missed.missed_frames())
            } else {
                format!("missed frames: {}", missed.missed_frames())
            };
            self.state
                .throttle
                .warn(now, &self.label, ErrorClass::MissedFrames, &message);
            regs.pulse_reset();
        }

        status.buffer_usage()
    }

    /// Hand one event upward; `false` when no container was available
    ///
    /// Counters and the protocol error warning only follow a successful
    /// delivery. Frames carrying the error flag are delivered but not counted.
    fn dispatch<S: FrameSink + ?Sized>(&mut self, event: DecodedEvent, sink: &mut S, now: Instant) -> bool {
        let counted_bytes = match &event {
            DecodedEvent::Frame(frame) if !frame.is_error_frame() => Some(frame.data_length()),
            _ => None,
        };
        let protocol_error = match &event {
            DecodedEvent::Error(err) => Some(err.primary),
            DecodedEvent::Frame(_) => None,
        };

        if sink.deliver(event).is_err() {
            self.stats.record_dropped();
            log::debug!("{}: no frame buffer, ending burst", self.label);
            return false;
        }

        if let Some(primary) = protocol_error {
            self.stats.record_error();
            self.state
                .throttle
                .warn(now, &self.label, ErrorClass::Protocol, primary.description());
        }
        if let Some(bytes) = counted_bytes {
            self.stats.record_frame(bytes);
            sink.record_stats(bytes);
        }
        true
    }
}

impl std::fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("label", &self.label)
            .field("mode", &self.state.mode)
            .field("budget", &self.budget)
            .field("pending", &self.state.pending)
            .finish()
    }
}
