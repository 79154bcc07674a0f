//! YP-CAN device implementation
//!
//! This module provides the `YpCan` struct: the configuration and lifecycle
//! surface of one receive-only CAN interface. While the interface is up a
//! dedicated worker thread plays both the backoff timer and the budgeted
//! drain loop of the [`PollScheduler`].

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::bus::{RegisterBlock, RegisterBus};
use crate::config::DeviceConfig;
use crate::constants::CAN_CTRLMODE_LISTENONLY;
use crate::error::{Result, YpCanError};
use crate::frame::FrameSink;
use crate::scheduler::{PollScheduler, TimerOutcome};
use crate::stats::{InterfaceStats, StatsSnapshot};
use crate::timestamp::{Clock, SystemClock};
use crate::timing::{self, BitTiming};

type SharedSink = Arc<Mutex<Box<dyn FrameSink>>>;

/// CAN controller state as seen by the network stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanState {
    /// Normal operation
    ErrorActive,
    /// Interface down
    Stopped,
}

impl CanState {
    /// Get human-readable name for the state
    pub fn name(&self) -> &'static str {
        match self {
            CanState::ErrorActive => "ERROR_ACTIVE",
            CanState::Stopped => "STOPPED",
        }
    }
}

impl std::fmt::Display for CanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

struct PollWorker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// YP-CAN interface handle
///
/// # Example
///
/// ```no_run
/// use std::ptr::NonNull;
/// use yp_can::{DecodedEvent, DeviceConfig, FrameSink, MmioBus, SinkFull, YpCan};
///
/// struct Printer;
///
/// impl FrameSink for Printer {
///     fn deliver(&mut self, event: DecodedEvent) -> Result<(), SinkFull> {
///         println!("RX  {:?}", event);
///         Ok(())
///     }
/// }
///
/// # let mapped: *mut u32 = std::ptr::null_mut();
/// let base = NonNull::new(mapped).expect("register window not mapped");
/// let bus = unsafe { MmioBus::new(base) };
///
/// let mut dev = YpCan::new(bus, DeviceConfig::from_label("can0")?, Printer);
/// dev.set_bit_rate(500_000)?;
/// dev.start()?;
/// // ... frames are delivered to `Printer` from the poll worker ...
/// dev.stop();
/// # Ok::<(), yp_can::YpCanError>(())
/// ```
pub struct YpCan<B: RegisterBus + 'static> {
    config: DeviceConfig,
    regs: Arc<RegisterBlock<B>>,
    stats: Arc<InterfaceStats>,
    sink: SharedSink,
    clock: Arc<dyn Clock>,
    bitrate: Option<u32>,
    last_timing: Option<BitTiming>,
    worker: Option<PollWorker>,
}

impl<B: RegisterBus + 'static> YpCan<B> {
    /// Create a stopped interface over `bus` delivering into `sink`
    pub fn new(bus: B, config: DeviceConfig, sink: impl FrameSink + 'static) -> Self {
        log::info!("{}: YP-CAN interface created", config.label);
        let sink: Box<dyn FrameSink> = Box::new(sink);
        Self {
            config,
            regs: Arc::new(RegisterBlock::new(bus)),
            stats: Arc::new(InterfaceStats::default()),
            sink: Arc::new(Mutex::new(sink)),
            clock: Arc::new(SystemClock),
            bitrate: None,
            last_timing: None,
            worker: None,
        }
    }

    /// Use `clock` for the timestamp base instead of the host clocks
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Program the nominal bit rate
    ///
    /// Must be called before [`start`](Self::start). Only the bit rates of the
    /// timing table are accepted; hardware is untouched on error.
    pub fn set_bit_rate(&mut self, bitrate: u32) -> Result<()> {
        if self.is_started() {
            return Err(YpCanError::AlreadyStarted);
        }

        let timing = timing::program(&*self.regs, bitrate)?;
        log::info!(
            "{}: bitrate {} (brp {}, {} tq, sample point {:.1}%)",
            self.config.label,
            timing.bitrate(self.config.clock_hz),
            timing.brp,
            timing.bit_time_quanta(),
            timing.sample_point()
        );

        self.bitrate = Some(bitrate);
        self.last_timing = Some(timing);
        Ok(())
    }

    /// Bring the interface up and start polling
    pub fn start(&mut self) -> Result<()> {
        if self.is_started() {
            return Err(YpCanError::AlreadyStarted);
        }
        if self.bitrate.is_none() {
            return Err(YpCanError::BitrateNotConfigured);
        }

        let mut scheduler = PollScheduler::new(&self.config, self.stats.clone());
        let first_delay = scheduler.start(self.clock.as_ref());
        let poll_interval = self.config.poll_interval;

        let (stop_tx, stop_rx) = mpsc::channel();
        let regs = self.regs.clone();
        let sink = self.sink.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-poll", self.config.label))
            .spawn(move || {
                poll_loop(scheduler, &*regs, &sink, &stop_rx, first_delay, poll_interval)
            })?;

        self.worker = Some(PollWorker { stop_tx, handle });
        log::info!("{}: interface up", self.config.label);
        Ok(())
    }

    /// Bring the interface down
    ///
    /// Blocks until the poll worker has returned; no register access happens
    /// after this call. Stopping a stopped interface is a no-op.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        // A send error means the worker already exited
        let _ = worker.stop_tx.send(());
        if worker.handle.join().is_err() {
            log::error!("{}: poll worker panicked", self.config.label);
        }
        log::info!("{}: interface down", self.config.label);
    }

    /// Network stack hook for interface up
    pub fn on_interface_up(&mut self) -> Result<()> {
        self.start()
    }

    /// Network stack hook for interface down
    pub fn on_interface_down(&mut self) {
        self.stop()
    }

    /// Check if the interface is up
    pub fn is_started(&self) -> bool {
        self.worker.is_some()
    }

    /// Current controller state
    pub fn state(&self) -> CanState {
        if self.is_started() {
            CanState::ErrorActive
        } else {
            CanState::Stopped
        }
    }

    /// Supported control modes (receive only)
    pub fn ctrlmode_supported(&self) -> u32 {
        CAN_CTRLMODE_LISTENONLY
    }

    /// Configured bit rate
    pub fn bitrate(&self) -> Option<u32> {
        self.bitrate
    }

    /// Timing written by the last successful `set_bit_rate`
    pub fn last_timing(&self) -> Option<BitTiming> {
        self.last_timing
    }

    /// Receive counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Interface configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Register block, for driving a simulated peripheral
    #[cfg(any(test, feature = "sim"))]
    pub fn registers(&self) -> &RegisterBlock<B> {
        &self.regs
    }
}

impl<B: RegisterBus + 'static> std::fmt::Debug for YpCan<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YpCan")
            .field("label", &self.config.label)
            .field("instance_id", &self.config.instance_id)
            .field("state", &self.state())
            .field("bitrate", &self.bitrate)
            .finish()
    }
}

impl<B: RegisterBus + 'static> Drop for YpCan<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// `true` once a stop was requested or the device handle went away
fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty))
}

fn lock_sink(sink: &SharedSink) -> MutexGuard<'_, Box<dyn FrameSink>> {
    sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn poll_loop<B: RegisterBus>(
    mut scheduler: PollScheduler,
    regs: &RegisterBlock<B>,
    sink: &SharedSink,
    stop_rx: &Receiver<()>,
    first_delay: Duration,
    poll_interval: Duration,
) {
    let mut delay = first_delay;
    loop {
        match stop_rx.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        match scheduler.on_timer(regs, Instant::now()) {
            TimerOutcome::Rearm(next) => delay = next,
            TimerOutcome::Stopped => break,
            TimerOutcome::Drain => {
                let mut sink = lock_sink(sink);
                loop {
                    let outcome = scheduler.drain(regs, &mut **sink, Instant::now());
                    if !outcome.exhausted() {
                        break;
                    }
                    if stop_requested(stop_rx) {
                        scheduler.stop();
                        return;
                    }
                }
                delay = poll_interval;
            }
        }
    }
    scheduler.stop();
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::constants::FRAME_STUFF_ERROR_BIT;
    use crate::frame::DecodedEvent;
    use crate::sim::{CollectingSink, RawEntry, SimulatedBus};

    fn device(sink: &CollectingSink) -> YpCan<SimulatedBus> {
        let config = DeviceConfig::from_label("can0").unwrap().with_budget(4);
        YpCan::new(SimulatedBus::new(), config, sink.clone())
    }

    fn wait_for_events(sink: &CollectingSink, count: usize) -> Vec<DecodedEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let events = sink.events();
            if events.len() >= count || Instant::now() > deadline {
                return events;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    struct FrozenClock;

    impl Clock for FrozenClock {
        fn wall(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_000)
        }

        fn monotonic(&self) -> Duration {
            Duration::from_secs(100)
        }
    }

    #[test]
    fn test_start_requires_bitrate() {
        let sink = CollectingSink::new();
        let mut dev = device(&sink);
        assert!(matches!(dev.start(), Err(YpCanError::BitrateNotConfigured)));
        assert_eq!(dev.state(), CanState::Stopped);
    }

    #[test]
    fn test_unsupported_bitrate_is_rejected() {
        let sink = CollectingSink::new();
        let mut dev = device(&sink);
        assert!(matches!(
            dev.set_bit_rate(250_000),
            Err(YpCanError::UnsupportedBitrate { bitrate: 250_000 })
        ));
        assert_eq!(dev.bitrate(), None);
        dev.registers().with_bus(|bus| assert!(bus.log().is_empty()));
    }

    #[test]
    fn test_set_bit_rate_programs_and_resets() {
        let sink = CollectingSink::new();
        let mut dev = device(&sink);
        dev.set_bit_rate(1_000_000).unwrap();
        assert_eq!(dev.bitrate(), Some(1_000_000));
        assert_eq!(dev.last_timing(), Some(BitTiming::new(2, 4, 3, 4)));
        dev.registers().with_bus(|bus| assert_eq!(bus.reset_count(), 1));
    }

    #[test]
    fn test_receive_frames_end_to_end() {
        let sink = CollectingSink::new();
        let mut dev = device(&sink).with_clock(Arc::new(FrozenClock));
        dev.set_bit_rate(500_000).unwrap();
        dev.start().unwrap();
        assert_eq!(dev.state(), CanState::ErrorActive);

        dev.registers().with_bus(|bus| {
            bus.push(RawEntry::data(0x123, &[0xDE, 0xAD]).with_timestamp(2_000_000));
            bus.push(RawEntry::extended(0x1234_5678, &[1, 2, 3, 4, 5, 6, 7, 8]));
            bus.push(RawEntry::protocol_error(FRAME_STUFF_ERROR_BIT));
            for i in 0..7 {
                bus.push(RawEntry::data(0x200 + i, &[i as u8]));
            }
        });

        let events = wait_for_events(&sink, 10);
        dev.stop();

        assert_eq!(events.len(), 10);
        match &events[0] {
            DecodedEvent::Frame(frame) => {
                assert_eq!(frame.can_id, 0x123);
                assert_eq!(frame.data(), &[0xDE, 0xAD]);
                // base = 1000 s - 100 s, plus 2 s of hardware time
                assert_eq!(
                    frame.timestamp,
                    SystemTime::UNIX_EPOCH + Duration::from_secs(902)
                );
            }
            other => panic!("unexpected {:?}", other),
        }
        match &events[1] {
            DecodedEvent::Frame(frame) => {
                assert!(frame.is_extended_id());
                assert_eq!(frame.data(), &[1, 2, 3, 4, 5, 6, 7, 8]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(events[2].is_error());

        let stats = dev.stats();
        assert_eq!(stats.rx_packets, 9);
        assert_eq!(stats.rx_bytes, 2 + 8 + 7);
        assert_eq!(stats.rx_errors, 1);
    }

    #[test]
    fn test_stop_is_synchronous() {
        let sink = CollectingSink::new();
        let mut dev = device(&sink);
        dev.set_bit_rate(500_000).unwrap();
        dev.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        dev.stop();
        assert!(!dev.is_started());

        let accesses = dev.registers().with_bus(|bus| bus.log().len());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(dev.registers().with_bus(|bus| bus.log().len()), accesses);

        // Frames queued after stop stay in the FIFO
        dev.registers().with_bus(|bus| bus.fill(3));
        thread::sleep(Duration::from_millis(10));
        dev.registers().with_bus(|bus| assert_eq!(bus.pending(), 3));
    }

    #[test]
    fn test_lifecycle_errors() {
        let sink = CollectingSink::new();
        let mut dev = device(&sink);
        dev.set_bit_rate(500_000).unwrap();
        dev.start().unwrap();

        assert!(matches!(dev.start(), Err(YpCanError::AlreadyStarted)));
        assert!(matches!(dev.set_bit_rate(1_000_000), Err(YpCanError::AlreadyStarted)));

        dev.on_interface_down();
        dev.on_interface_down();
        assert_eq!(dev.state(), CanState::Stopped);

        // Restart keeps the configured bit rate
        dev.on_interface_up().unwrap();
        dev.registers().with_bus(|bus| bus.fill(2));
        assert_eq!(wait_for_events(&sink, 2).len(), 2);
    }

    #[test]
    fn test_capabilities() {
        let sink = CollectingSink::new();
        let dev = device(&sink);
        assert_eq!(dev.ctrlmode_supported(), CAN_CTRLMODE_LISTENONLY);
        assert_eq!(dev.config().instance_id, 0);
        assert_eq!(CanState::Stopped.to_string(), "STOPPED");
    }
}
