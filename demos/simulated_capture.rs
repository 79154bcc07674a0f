//! Simulated Capture Example
//!
//! This example runs the full receive path against a simulated peripheral:
//! - Programming the bit rate
//! - Bringing the interface up
//! - Feeding data, remote and error frames into the hardware FIFO
//! - Printing what the poll worker delivers
//!
//! Run with `RUST_LOG=debug` to see scheduler and throttle output.

use std::time::{Duration, Instant};

use yp_can::constants::{FRAME_CRC_ERROR_BIT, MISSED_OVERFLOW_BIT};
use yp_can::sim::{CollectingSink, RawEntry, SimulatedBus};
use yp_can::{DecodedEvent, DeviceConfig, YpCan};

fn main() {
    // Initialize logging
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> yp_can::Result<()> {
    let sink = CollectingSink::new();
    let config = DeviceConfig::from_label("can0")?.with_budget(16);
    let mut dev = YpCan::new(SimulatedBus::new(), config, sink.clone());
    println!("Created {:?}", dev);

    // Anything outside the table is refused
    if let Err(e) = dev.set_bit_rate(250_000) {
        println!("250 kbps rejected: {}", e);
    }

    dev.set_bit_rate(500_000)?;
    if let Some(timing) = dev.last_timing() {
        println!("Bitrate set to 500 kbps\n{}", timing);
    }

    dev.start()?;
    println!("Interface {}\n", dev.state());

    let data: [u8; 8] = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0];
    dev.registers().with_bus(|bus| {
        bus.push(RawEntry::data(0x7FF, &data).with_timestamp(1_000));
        bus.push(RawEntry::data(0x7FF, &[]).with_timestamp(2_000));
        bus.push(RawEntry::extended(0x1234_5678, &data[..3]).with_timestamp(3_000));
        bus.push(RawEntry::remote(0x123, 4).with_timestamp(4_000));
        bus.push(RawEntry::protocol_error(FRAME_CRC_ERROR_BIT).with_timestamp(5_000));
        bus.fill(40);
        bus.set_missed_status(MISSED_OVERFLOW_BIT | 12);
    });

    let expected = 45;
    let deadline = Instant::now() + Duration::from_secs(2);
    while sink.events().len() < expected && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    dev.stop();

    for event in sink.events().iter().take(8) {
        match event {
            DecodedEvent::Frame(frame) => println!("RX  {}", frame),
            DecodedEvent::Error(err) => {
                println!("ERR {:08X}  {}", err.can_id, err.primary.description())
            }
        }
    }
    println!("... {} events total\n", sink.events().len());
    println!("{}", dev.stats());
    println!("Interface {}", dev.state());

    Ok(())
}
