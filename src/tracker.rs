//! Per packet type traffic statistics
//!
//! The tracker keeps, for every packet type it has seen, an occurrence count, the arrival
//! period statistics and an owned copy of the most recent raw frame. The relay replays those
//! copies when a type goes quiet, see [`BmsRelay::poll`](crate::BmsRelay::poll).

use serde::Serialize;
use tracing::{trace, warn};

use crate::stats::RunningStats;
use crate::types::{FRAME_LENGTHS, Frame};

/// Counters over all traffic the relay has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GlobalStats {
    pub total_known_packets_received: u64,
    pub total_known_bytes_received: u64,
    pub total_packet_checksum_mismatches: u64,
    pub total_unknown_bytes_received: u64,
}

/// Traffic record for one packet type.
#[derive(Debug, Clone)]
pub struct PacketStats {
    /// Packet type byte.
    pub id: u8,
    /// Number of frames of this type seen so far.
    pub total_num: u64,
    /// Raw bytes of the latest frame, exactly as received.
    pub last_seen_packet: Vec<u8>,
    /// Clock reading at the latest frame.
    pub last_packet_millis: u64,
    period: RunningStats,
}

impl PacketStats {
    fn new(id: u8) -> Self {
        Self {
            id,
            total_num: 0,
            last_seen_packet: Vec::new(),
            last_packet_millis: 0,
            period: RunningStats::new(),
        }
    }

    /// Mean time between frames of this type, `0` until two frames have arrived.
    pub fn mean_period_millis(&self) -> i64 {
        self.period.mean().round() as i64
    }

    /// Standard deviation of the arrival period; needs at least two measured periods.
    pub fn deviation_millis(&self) -> Option<i64> {
        self.period.stddev().map(|sd| sd.round() as i64)
    }

    /// Underlying period accumulator.
    pub fn period(&self) -> &RunningStats {
        &self.period
    }
}

#[derive(Debug, Clone)]
pub struct PacketTracker {
    global: GlobalStats,
    per_type: Vec<Option<PacketStats>>,
}

impl Default for PacketTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketTracker {
    pub fn new() -> Self {
        Self { global: GlobalStats::default(), per_type: vec![None; FRAME_LENGTHS.len()] }
    }

    /// Record one framed packet seen at `now_millis`.
    pub fn process(&mut self, frame: &Frame<'_>, now_millis: u64) {
        if !frame.is_valid() {
            self.global.total_packet_checksum_mismatches += 1;
        }
        // A u8 type bounds the table at 256 entries no matter what the line carries.
        let Some(packet_type) = frame.packet_type() else {
            return;
        };
        let index = packet_type as usize;
        if index >= self.per_type.len() {
            self.per_type.resize(index + 1, None);
        }
        self.global.total_known_bytes_received += frame.len() as u64;
        self.global.total_known_packets_received += 1;

        let stat = self.per_type[index].get_or_insert_with(|| PacketStats::new(packet_type));
        stat.last_seen_packet.clear();
        stat.last_seen_packet.extend_from_slice(frame.as_bytes());
        stat.total_num += 1;

        let previous = std::mem::replace(&mut stat.last_packet_millis, now_millis);
        if stat.total_num == 1 {
            return;
        }
        if now_millis < previous {
            warn!(packet_type, now_millis, previous, "Clock went backwards, dropping period sample");
            return;
        }
        let elapsed = now_millis - previous;
        stat.period.add(elapsed as f64);
        trace!(packet_type, elapsed, "Packet period sample");
    }

    /// Account for `count` bytes that could not be framed.
    pub fn unknown_bytes(&mut self, count: usize) {
        self.global.total_unknown_bytes_received += count as u64;
    }

    pub fn global_stats(&self) -> &GlobalStats {
        &self.global
    }

    /// Record for `packet_type`, if it has been seen.
    pub fn packet_stats(&self, packet_type: u8) -> Option<&PacketStats> {
        self.per_type.get(packet_type as usize).and_then(Option::as_ref)
    }

    /// All packet types seen so far, in type order.
    pub fn iter(&self) -> impl Iterator<Item = &PacketStats> {
        self.per_type.iter().flatten()
    }
}
