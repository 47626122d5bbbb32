//! Field rewriters, run on every ingested frame in a fixed order.
//!
//! Each rewriter ignores frames of other types and frames whose payload does not have the
//! expected size. Invalid frames have no type, so they pass through all of them untouched.

use tracing::info;

use super::{BatteryState, CELL_COUNT, TEMPERATURE_COUNT};
use crate::types::packet_type::{CELL_VOLTAGES, CURRENT, POWER_OFF, SERIAL, SOC, STATUS, TEMPERATURES};
use crate::types::{Frame, StatusFlags};

/// Milliamps per unit of the raw current field.
pub const CURRENT_SCALER_MILLIAMPS: i32 = 55;

fn payload_array<const N: usize>(frame: &Frame<'_>, packet_type: u8) -> Option<[u8; N]> {
    if frame.packet_type() != Some(packet_type) {
        return None;
    }
    frame.payload().and_then(|payload| payload.try_into().ok())
}

impl BatteryState {
    pub(super) fn status_parser(&mut self, frame: &mut Frame<'_>) {
        let Some([raw]) = payload_array::<1>(frame, STATUS) else {
            return;
        };
        self.status = StatusFlags::new(raw);
        self.fuel_gauge.update_charging_status(self.status.is_charging());
        // Anything without a flag the controller reacts to is noise to it.
        if !self.status.needs_forwarding() {
            frame.set_should_forward(false);
        }
    }

    pub(super) fn serial_parser(&mut self, frame: &mut Frame<'_>) {
        let Some(raw) = payload_array::<4>(frame, SERIAL) else {
            return;
        };
        if self.captured_serial.is_none() {
            let serial = u32::from_be_bytes(raw);
            info!(serial, "Captured BMS serial");
            self.captured_serial = Some(serial);
        }
        let Some(serial) = self.serial_override else {
            return;
        };
        if let Some(payload) = frame.payload_mut() {
            payload.copy_from_slice(&serial.to_be_bytes());
        }
    }

    pub(super) fn current_parser(&mut self, frame: &mut Frame<'_>, now_millis: u64) {
        let Some(raw) = payload_array::<2>(frame, CURRENT) else {
            return;
        };
        self.current_milliamps = i16::from_be_bytes(raw) as i32 * CURRENT_SCALER_MILLIAMPS;
        self.fuel_gauge.update_current(self.current_milliamps, now_millis);
        // The controller only needs to see current while charging.
        if !self.is_charging() {
            frame.set_should_forward(false);
        }
    }

    pub(super) fn soc_parser(&mut self, frame: &mut Frame<'_>) {
        let Some([reported]) = payload_array::<1>(frame, SOC) else {
            return;
        };
        self.bms_soc_percent = Some(reported);
        if !self.fuel_gauge.has_voltage_baseline() {
            frame.set_should_forward(false);
            return;
        }
        let soc = self.fuel_gauge.soc().clamp(0, u8::MAX as i32) as u8;
        self.overridden_soc_percent = Some(soc);
        if let Some(payload) = frame.payload_mut() {
            payload[0] = soc;
        }
    }

    pub(super) fn cell_voltage_parser(&mut self, frame: &mut Frame<'_>, now_millis: u64) {
        let Some(raw) = payload_array::<{ CELL_COUNT * 2 + 2 }>(frame, CELL_VOLTAGES) else {
            return;
        };
        let mut total = 0u32;
        let mut lowest = u16::MAX;
        for (cell, bytes) in self.cell_millivolts.iter_mut().zip(raw.chunks_exact(2)) {
            *cell = u16::from_be_bytes([bytes[0], bytes[1]]);
            total += *cell as u32;
            lowest = lowest.min(*cell);
        }
        self.total_voltage_millivolts = total;
        self.fuel_gauge.update_voltage(lowest as i32, now_millis);
    }

    pub(super) fn temperature_parser(&mut self, frame: &mut Frame<'_>) {
        let Some(raw) = payload_array::<TEMPERATURE_COUNT>(frame, TEMPERATURES) else {
            return;
        };
        let mut sum = 0i16;
        for (probe, byte) in self.temperatures_celsius.iter_mut().zip(raw) {
            *probe = byte as i8;
            sum += *probe as i16;
        }
        self.average_temperature_celsius = (sum / TEMPERATURE_COUNT as i16) as i8;
    }

    /// Returns `true` when the frame is a power-off notice.
    pub(super) fn power_off_parser(&mut self, frame: &Frame<'_>) -> bool {
        if frame.packet_type() != Some(POWER_OFF) {
            return false;
        }
        self.power_off_count += 1;
        info!(count = self.power_off_count, "BMS announced power off");
        true
    }
}
