use serde::Serialize;

use super::{BatteryState, CELL_COUNT, TEMPERATURE_COUNT};
use crate::fuel_gauge::FuelGaugeState;
use crate::tracker::{GlobalStats, PacketStats, PacketTracker};

/// Arrival statistics of one packet type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PacketStatsSnapshot {
    pub id: u8,
    pub count: u64,
    pub mean_period_millis: i64,
    pub deviation_millis: Option<i64>,
}

impl From<&PacketStats> for PacketStatsSnapshot {
    fn from(stats: &PacketStats) -> Self {
        Self {
            id: stats.id,
            count: stats.total_num,
            mean_period_millis: stats.mean_period_millis(),
            deviation_millis: stats.deviation_millis(),
        }
    }
}

/// Point-in-time copy of everything the relay knows, ready to be serialized for a status
/// page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelaySnapshot {
    pub taken_at_millis: u64,
    pub captured_serial: Option<u32>,
    pub serial_override: Option<u32>,
    pub bms_soc_percent: Option<u8>,
    pub overridden_soc_percent: Option<u8>,
    pub cell_millivolts: [u16; CELL_COUNT],
    pub total_voltage_millivolts: u32,
    pub temperatures_celsius: [i8; TEMPERATURE_COUNT],
    pub average_temperature_celsius: i8,
    pub current_milliamps: i32,
    pub status: u8,
    pub is_charging: bool,
    pub used_charge_mah: i64,
    pub regenerated_charge_mah: i64,
    pub power_off_count: u32,
    pub fuel_gauge: FuelGaugeState,
    pub filtered_cell_millivolts: Option<f64>,
    pub global: GlobalStats,
    pub packets: Vec<PacketStatsSnapshot>,
}

impl RelaySnapshot {
    pub(super) fn capture(state: &BatteryState, tracker: &PacketTracker, now_millis: u64) -> Self {
        Self {
            taken_at_millis: now_millis,
            captured_serial: state.captured_serial,
            serial_override: state.serial_override,
            bms_soc_percent: state.bms_soc_percent,
            overridden_soc_percent: state.overridden_soc_percent,
            cell_millivolts: state.cell_millivolts,
            total_voltage_millivolts: state.total_voltage_millivolts,
            temperatures_celsius: state.temperatures_celsius,
            average_temperature_celsius: state.average_temperature_celsius,
            current_milliamps: state.current_milliamps,
            status: state.status.value(),
            is_charging: state.is_charging(),
            used_charge_mah: state.used_charge_mah(),
            regenerated_charge_mah: state.regenerated_charge_mah(),
            power_off_count: state.power_off_count,
            fuel_gauge: state.fuel_gauge.snapshot(),
            filtered_cell_millivolts: state.fuel_gauge.filtered_cell_millivolts(),
            global: *tracker.global_stats(),
            packets: tracker.iter().map(PacketStatsSnapshot::from).collect(),
        }
    }
}
