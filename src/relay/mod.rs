//! The byte-stream relay between the BMS and the motor controller.
//!
//! [`BmsRelay`] pulls bytes one at a time from a [`ByteSource`], reassembles them into
//! frames, runs each frame through a fixed pipeline (tracker, observers, field rewriters)
//! and writes the result to a [`ByteSink`]. Anything that cannot be framed is passed
//! through unchanged, so the controller never loses bytes to a desync.
//!
//! ## Framing
//!
//! The accumulation buffer is compared against the preamble for as many bytes as it holds.
//! On the first mismatch, or when the type byte names a type with no known length, the
//! whole buffer is flushed to the sink as unknown data and framing starts over with the
//! next byte. Once the buffer reaches the type's length it is ingested and cleared.
//!
//! ## Ingestion
//!
//! 1. record the frame in the [`PacketTracker`]
//! 2. notify "received" observers with the untouched frame
//! 3. run the rewriters in order: status, serial, current, SOC, cell voltages,
//!    temperatures, power-off
//! 4. recompute the checksum, notify "forwarded" observers if the frame is still forwarded
//! 5. recompute the checksum again and write the frame to the sink if still forwarded
//!
//! ## Replay
//!
//! After the source drains, every packet type that has been quiet for longer than its
//! [`replay_timeout`] is re-ingested from the tracker's copy of its last raw frame. This
//! keeps the controller fed with current and SOC frames when the BMS throttles them.

mod parsers;
mod snapshot;
#[cfg(test)]
mod tests;

pub use snapshot::{PacketStatsSnapshot, RelaySnapshot};

use tracing::{debug, trace};

use crate::fuel_gauge::{FuelGauge, FuelGaugeState};
use crate::provider::{ByteSink, ByteSource, Clock};
use crate::tracker::PacketTracker;
use crate::types::{Frame, PREAMBLE, StatusFlags, frame_length, replay_timeout};

/// Observer for framed packets.
pub type PacketCallback = Box<dyn FnMut(&BatteryState, &Frame<'_>) + Send>;
/// Observer for bytes passed through without framing.
pub type UnknownDataCallback = Box<dyn FnMut(u8) + Send>;
/// Fired once for every power-off frame.
pub type PowerOffCallback = Box<dyn FnMut() + Send>;

/// Cell count of the pack.
pub const CELL_COUNT: usize = 15;
/// Temperature probe count.
pub const TEMPERATURE_COUNT: usize = 5;

/// Everything the rewriters have decoded from the BMS so far.
#[derive(Debug, Clone, Default)]
pub struct BatteryState {
    serial_override: Option<u32>,
    captured_serial: Option<u32>,
    bms_soc_percent: Option<u8>,
    overridden_soc_percent: Option<u8>,
    cell_millivolts: [u16; CELL_COUNT],
    total_voltage_millivolts: u32,
    temperatures_celsius: [i8; TEMPERATURE_COUNT],
    average_temperature_celsius: i8,
    current_milliamps: i32,
    status: StatusFlags,
    power_off_count: u32,
    fuel_gauge: FuelGauge,
}

impl BatteryState {
    pub fn serial_override(&self) -> Option<u32> {
        self.serial_override
    }

    /// Serial number from the first serial frame seen.
    pub fn captured_serial(&self) -> Option<u32> {
        self.captured_serial
    }

    /// Percentage as reported by the BMS.
    pub fn bms_soc_percent(&self) -> Option<u8> {
        self.bms_soc_percent
    }

    /// Percentage actually sent to the controller.
    pub fn overridden_soc_percent(&self) -> Option<u8> {
        self.overridden_soc_percent
    }

    pub fn cell_millivolts(&self) -> &[u16; CELL_COUNT] {
        &self.cell_millivolts
    }

    /// Sum of all cells, `0` until the first cell voltage frame.
    pub fn total_voltage_millivolts(&self) -> u32 {
        self.total_voltage_millivolts
    }

    pub fn temperatures_celsius(&self) -> &[i8; TEMPERATURE_COUNT] {
        &self.temperatures_celsius
    }

    pub fn average_temperature_celsius(&self) -> i8 {
        self.average_temperature_celsius
    }

    pub fn current_milliamps(&self) -> i32 {
        self.current_milliamps
    }

    pub fn status(&self) -> StatusFlags {
        self.status
    }

    pub fn is_charging(&self) -> bool {
        self.status.is_charging()
    }

    pub fn is_battery_empty(&self) -> bool {
        self.status.is_battery_empty()
    }

    pub fn is_battery_temp_out_of_range(&self) -> bool {
        self.status.is_temp_out_of_range()
    }

    pub fn is_battery_overcharged(&self) -> bool {
        self.status.is_overcharged()
    }

    /// Number of power-off frames seen, replays excluded by construction.
    pub fn power_off_count(&self) -> u32 {
        self.power_off_count
    }

    pub fn used_charge_mah(&self) -> i64 {
        self.fuel_gauge.milliamp_seconds_discharged() / 3600
    }

    pub fn regenerated_charge_mah(&self) -> i64 {
        self.fuel_gauge.milliamp_seconds_recharged() / 3600
    }

    pub fn fuel_gauge(&self) -> &FuelGauge {
        &self.fuel_gauge
    }
}

#[derive(Default)]
struct Observers {
    received: Vec<PacketCallback>,
    forwarded: Vec<PacketCallback>,
    unknown_data: Vec<UnknownDataCallback>,
    power_off: Vec<PowerOffCallback>,
}

/// The per-frame pipeline, split from the byte buffer so a frame can borrow the buffer
/// while the pipeline is mutated.
#[derive(Default)]
struct Pipeline {
    tracker: PacketTracker,
    state: BatteryState,
    observers: Observers,
}

impl Pipeline {
    fn ingest<K: ByteSink>(&mut self, frame: &mut Frame<'_>, now_millis: u64, sink: &mut K) {
        self.tracker.process(frame, now_millis);
        for callback in &mut self.observers.received {
            callback(&self.state, frame);
        }

        self.state.status_parser(frame);
        self.state.serial_parser(frame);
        self.state.current_parser(frame, now_millis);
        self.state.soc_parser(frame);
        self.state.cell_voltage_parser(frame, now_millis);
        self.state.temperature_parser(frame);
        if self.state.power_off_parser(frame) {
            for callback in &mut self.observers.power_off {
                callback();
            }
        }

        // Observers should see the checksum that goes on the wire.
        frame.recalculate_checksum();
        if frame.should_forward() {
            for callback in &mut self.observers.forwarded {
                callback(&self.state, frame);
            }
        }
        frame.recalculate_checksum();

        trace!(
            packet_type = ?frame.packet_type(),
            len = frame.len(),
            forwarded = frame.should_forward(),
            "Ingested frame"
        );
        if frame.should_forward() {
            for &byte in frame.as_bytes() {
                sink.write_byte(byte);
            }
        }
    }
}

/// Inline relay between the BMS (source) and the motor controller (sink).
pub struct BmsRelay<S, K, C> {
    source: S,
    sink: K,
    clock: C,
    buffer: Vec<u8>,
    pipeline: Pipeline,
    now_millis: u64,
}

impl<S, K, C> BmsRelay<S, K, C>
where
    S: ByteSource,
    K: ByteSink,
    C: Clock,
{
    pub fn new(source: S, sink: K, clock: C) -> Self {
        Self {
            source,
            sink,
            clock,
            buffer: Vec::with_capacity(64),
            pipeline: Pipeline::default(),
            now_millis: 0,
        }
    }

    /// Restore the fuel gauge's persisted reference points.
    ///
    /// Call right after construction, before the first [`poll`](Self::poll).
    pub fn with_fuel_gauge_state(mut self, state: FuelGaugeState) -> Self {
        self.pipeline.state.fuel_gauge.restore(state);
        self
    }

    /// Drain the source, then replay stale packet types.
    ///
    /// Returns the number of bytes read from the source.
    pub fn poll(&mut self) -> usize {
        self.now_millis = self.clock.now_millis();
        let mut consumed = 0;
        while let Some(byte) = self.source.read_byte() {
            consumed += 1;
            self.buffer.push(byte);
            self.process_next_byte();
        }
        self.replay_stale_packets();
        consumed
    }

    fn process_next_byte(&mut self) {
        let preamble_matches =
            self.buffer.iter().zip(PREAMBLE.iter()).all(|(byte, expected)| byte == expected);
        if !preamble_matches {
            self.purge_unknown_data();
            return;
        }
        if self.buffer.len() <= PREAMBLE.len() {
            return;
        }
        let Some(len) = frame_length(self.buffer[PREAMBLE.len()]) else {
            self.purge_unknown_data();
            return;
        };
        if self.buffer.len() < len {
            return;
        }
        let mut frame = Frame::new(&mut self.buffer[..len]);
        if !frame.is_valid() {
            debug!(len, "Checksum mismatch");
        }
        self.pipeline.ingest(&mut frame, self.now_millis, &mut self.sink);
        self.buffer.clear();
    }

    fn purge_unknown_data(&mut self) {
        debug!(bytes = self.buffer.len(), "Passing through unframed data");
        for &byte in &self.buffer {
            self.sink.write_byte(byte);
        }
        for callback in &mut self.pipeline.observers.unknown_data {
            for &byte in &self.buffer {
                callback(byte);
            }
        }
        self.pipeline.tracker.unknown_bytes(self.buffer.len());
        self.buffer.clear();
    }

    fn replay_stale_packets(&mut self) {
        let now = self.now_millis;
        let stale: Vec<Vec<u8>> = self
            .pipeline
            .tracker
            .iter()
            .filter(|stat| {
                replay_timeout(stat.id).is_some_and(|timeout| {
                    now.saturating_sub(stat.last_packet_millis) >= timeout.as_millis() as u64
                })
            })
            .map(|stat| stat.last_seen_packet.clone())
            .collect();

        for mut bytes in stale {
            let mut frame = Frame::new(&mut bytes);
            trace!(packet_type = ?frame.packet_type(), now, "Replaying stale packet");
            self.pipeline.ingest(&mut frame, now, &mut self.sink);
        }
    }

    pub fn add_received_packet_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&BatteryState, &Frame<'_>) + Send + 'static,
    {
        self.pipeline.observers.received.push(Box::new(callback));
    }

    /// Observe frames after rewriting, only when they are actually forwarded.
    pub fn add_forwarded_packet_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&BatteryState, &Frame<'_>) + Send + 'static,
    {
        self.pipeline.observers.forwarded.push(Box::new(callback));
    }

    pub fn add_unknown_data_callback<F>(&mut self, callback: F)
    where
        F: FnMut(u8) + Send + 'static,
    {
        self.pipeline.observers.unknown_data.push(Box::new(callback));
    }

    pub fn add_power_off_callback<F>(&mut self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.pipeline.observers.power_off.push(Box::new(callback));
    }

    /// Spoof the BMS serial sent to the controller. `None` forwards the real serial.
    ///
    /// The serial is on the sticker at the bottom of the BMS: the lower number without its
    /// 4 leading digits.
    pub fn set_bms_serial_override(&mut self, serial: Option<u32>) {
        self.pipeline.state.serial_override = serial;
    }

    pub fn state(&self) -> &BatteryState {
        &self.pipeline.state
    }

    pub fn fuel_gauge(&self) -> &FuelGauge {
        &self.pipeline.state.fuel_gauge
    }

    pub fn packet_tracker(&self) -> &PacketTracker {
        &self.pipeline.tracker
    }

    /// Clock reading taken at the start of the latest poll.
    pub fn now_millis(&self) -> u64 {
        self.now_millis
    }

    /// Bytes held back while a frame is being assembled.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn snapshot(&self) -> RelaySnapshot {
        RelaySnapshot::capture(&self.pipeline.state, &self.pipeline.tracker, self.now_millis)
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }
}
