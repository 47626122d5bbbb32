//! Frame builders and a hand-driven clock for tests and benchmarks
//!
//! Every builder produces a complete, checksummed frame the way the BMS would put it on the
//! wire.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::provider::Clock;
use crate::relay::{BmsRelay, CELL_COUNT, TEMPERATURE_COUNT};
use crate::types::packet_type::{
    CELL_VOLTAGES, CURRENT, POWER_OFF, SERIAL, SOC, STATUS, TEMPERATURES,
};
use crate::types::{PREAMBLE, checksum};

/// Relay wired to an in-memory source and sink.
pub type TestRelay = BmsRelay<VecDeque<u8>, Vec<u8>, ManualClock>;

/// Preamble, type, payload and a correct big-endian checksum.
pub fn build_frame(packet_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(payload.len() + 6);
    bytes.extend_from_slice(&PREAMBLE);
    bytes.push(packet_type);
    bytes.extend_from_slice(payload);
    let sum = checksum(&bytes);
    bytes.extend_from_slice(&sum.to_be_bytes());
    bytes
}

pub fn status_frame(flags: u8) -> Vec<u8> {
    build_frame(STATUS, &[flags])
}

pub fn serial_frame(serial: u32) -> Vec<u8> {
    build_frame(SERIAL, &serial.to_be_bytes())
}

/// Raw current units, 55 mA each; positive is discharge.
pub fn current_frame(raw: i16) -> Vec<u8> {
    build_frame(CURRENT, &raw.to_be_bytes())
}

pub fn soc_frame(percent: u8) -> Vec<u8> {
    build_frame(SOC, &[percent])
}

pub fn cell_voltage_frame(cells: &[u16; CELL_COUNT]) -> Vec<u8> {
    let mut payload: Vec<u8> = cells.iter().flat_map(|mv| mv.to_be_bytes()).collect();
    // Trailing word the relay does not interpret.
    payload.extend_from_slice(&[0x00, 0x00]);
    build_frame(CELL_VOLTAGES, &payload)
}

/// All cells at the same voltage.
pub fn uniform_cell_voltage_frame(millivolts: u16) -> Vec<u8> {
    cell_voltage_frame(&[millivolts; CELL_COUNT])
}

pub fn temperature_frame(probes: [i8; TEMPERATURE_COUNT]) -> Vec<u8> {
    let payload: Vec<u8> = probes.iter().map(|&t| t as u8).collect();
    build_frame(TEMPERATURES, &payload)
}

pub fn power_off_frame() -> Vec<u8> {
    build_frame(POWER_OFF, &[0x00, 0x00])
}

/// A clock the test moves by hand. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self(Arc::new(AtomicU64::new(start_millis)))
    }

    pub fn set(&self, millis: u64) {
        self.0.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fresh relay plus a handle on its clock, starting at `0`.
pub fn test_relay() -> (TestRelay, ManualClock) {
    let clock = ManualClock::new(0);
    (BmsRelay::new(VecDeque::new(), Vec::new(), clock.clone()), clock)
}

/// Queue `bytes` on the relay's source.
pub fn feed(relay: &mut TestRelay, bytes: &[u8]) {
    relay.source_mut().extend(bytes.iter().copied());
}

/// One second of typical BMS traffic while charging: status, cells, current, SOC and
/// temperatures, with a little line noise in between.
pub fn sample_traffic(seconds: usize) -> Vec<u8> {
    let mut bytes = Vec::new();
    for second in 0..seconds {
        let cell = 3600 + (second % 200) as u16;
        bytes.extend(status_frame(0x20));
        bytes.extend(uniform_cell_voltage_frame(cell));
        for _ in 0..5 {
            bytes.extend(current_frame(-40));
        }
        bytes.extend(soc_frame(50));
        bytes.extend(temperature_frame([20, 21, 22, 23, 24]));
        bytes.extend_from_slice(&[0x13, 0x37]);
    }
    bytes
}
