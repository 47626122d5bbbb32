//! Coulomb counting state of charge estimator with voltage drift correction.
//!
//! The gauge tracks a discharge range bounded by two reference points:
//!
//! - **top**: zero discharge depth, with the SOC the cell voltage suggested there
//! - **bottom**: the deepest discharge depth seen so far, with its voltage SOC
//!
//! The current position inside that range (`current_depth_mas`) comes from integrating
//! the pack current, and the reported SOC is a linear interpolation between the two
//! reference SOCs. Voltage only ever recalibrates a reference point while the gauge sits
//! exactly on it, or when coulomb counting has clearly drifted near the ends of the curve.
//!
//! The gauge assumes it sees all of the energy going into and out of the battery.
//!
//! Invariants held after every call:
//!
//! - `bottom_soc <= top_soc`
//! - `0 <= current_depth_mas <= bottom_depth_mas`
//! - `bottom_soc <= soc() <= top_soc`

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::stats::LowPassFilter;

/// Open circuit SOC lookup over 2700..=4200 mV in 50 mV steps.
const OCV_TABLE_MIN_MV: i32 = 2700;
const OCV_TABLE_MAX_MV: i32 = 4200;
const OCV_TABLE: [u8; 31] = [
    0, 0, 0, 0, 1, 2, 3, 4, 5, 7, 8, 11, 14, 16, 18, 19, 25, 30, 33, 37, 43, 48, 53, 60, 67, 71,
    76, 82, 92, 97, 100,
];

/// Below this voltage SOC the bottom reference may be pulled down.
const LOW_DRIFT_SOC: i32 = 10;
/// Above this voltage SOC (while charging) the top reference may be pushed up.
const HIGH_DRIFT_SOC: i32 = 90;

/// SOC percentage suggested by a resting cell voltage.
///
/// Linear interpolation over the calibration table, clamped to its edges.
pub fn open_circuit_soc(cell_millivolts: i32) -> i32 {
    let range = OCV_TABLE_MAX_MV - OCV_TABLE_MIN_MV;
    // Capping at range - 1 keeps the left index at most len - 2.
    let offset = (cell_millivolts - OCV_TABLE_MIN_MV).clamp(0, range - 1);
    let position = offset as f64 * (OCV_TABLE.len() - 1) as f64 / range as f64;
    let left = position as usize;
    let fraction = position - left as f64;
    let left_value = OCV_TABLE[left] as f64;
    let right_value = OCV_TABLE[left + 1] as f64;
    let soc = left_value + ((right_value - left_value) * fraction).round();
    (soc as i32).clamp(0, 100)
}

/// The part of the gauge that survives a power cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelGaugeState {
    /// Voltage SOC at zero discharge depth.
    pub top_soc: i32,
    /// Voltage SOC at the deepest known discharge depth.
    pub bottom_soc: i32,
    /// Current discharge depth below the top reference, in mAs.
    pub current_depth_mas: i64,
    /// Discharge depth of the bottom reference, in mAs.
    pub bottom_depth_mas: i64,
}

impl FuelGaugeState {
    /// Pull the state back inside the gauge invariants.
    ///
    /// SOCs are clamped to 0..=100 and put in order, depths become non-negative and the
    /// current depth is kept within the bottom depth.
    pub fn sanitized(self) -> Self {
        let a = self.top_soc.clamp(0, 100);
        let b = self.bottom_soc.clamp(0, 100);
        let bottom_depth_mas = self.bottom_depth_mas.max(0);
        Self {
            top_soc: a.max(b),
            bottom_soc: a.min(b),
            current_depth_mas: self.current_depth_mas.clamp(0, bottom_depth_mas),
            bottom_depth_mas,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FuelGauge {
    state: FuelGaugeState,
    cell_voltage_filter: LowPassFilter,
    /// Open circuit SOC of the filtered voltage, `None` until the first voltage sample.
    voltage_soc: Option<i32>,
    last_current_milliamps: i32,
    last_current_millis: Option<u64>,
    /// Integration remainder below one mAs, in units of 0.5 µAs.
    remainder: i64,
    charging: bool,
    milliamp_seconds_discharged: i64,
    milliamp_seconds_recharged: i64,
}

impl FuelGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore persisted reference points. Must precede every other call on a fresh gauge.
    ///
    /// State that breaks the gauge invariants is repaired with [`FuelGaugeState::sanitized`].
    pub fn restore(&mut self, state: FuelGaugeState) {
        let sanitized = state.sanitized();
        if sanitized != state {
            warn!(?state, ?sanitized, "Restored fuel gauge state was inconsistent");
        }
        self.state = sanitized;
    }

    pub fn snapshot(&self) -> FuelGaugeState {
        self.state
    }

    /// Whether at least one voltage sample has been seen since construction.
    pub fn has_voltage_baseline(&self) -> bool {
        self.voltage_soc.is_some()
    }

    /// Feed the lowest cell voltage in millivolts.
    pub fn update_voltage(&mut self, cell_millivolts: i32, _now_millis: u64) {
        if self.cell_voltage_filter.is_initialized() {
            self.cell_voltage_filter.step(cell_millivolts as f64);
        } else {
            self.cell_voltage_filter.reset_to(cell_millivolts as f64);
        }
        let estimate = open_circuit_soc(self.cell_voltage_filter.get().round() as i32);
        self.voltage_soc = Some(estimate);

        let s = &mut self.state;
        let at_top = s.current_depth_mas == 0;
        let at_bottom = s.current_depth_mas == s.bottom_depth_mas;
        match (at_top, at_bottom) {
            (true, true) => {
                s.top_soc = estimate;
                s.bottom_soc = estimate;
            }
            (false, true) => s.bottom_soc = estimate.min(s.top_soc),
            (true, false) => s.top_soc = estimate.max(s.bottom_soc),
            (false, false) => {}
        }

        // Coulomb counting error accumulates; near empty the voltage curve is steep enough
        // to trust over a bottom reference that sits too high.
        if estimate <= LOW_DRIFT_SOC && 3 * estimate < s.bottom_soc {
            debug!(
                estimate,
                bottom_soc = s.bottom_soc,
                depth = s.current_depth_mas,
                "Re-anchoring bottom reference from voltage"
            );
            s.bottom_soc = 3 * estimate;
            s.bottom_depth_mas = s.current_depth_mas;
        }
        if self.charging && estimate >= HIGH_DRIFT_SOC {
            let corrected = 100 - 3 * (100 - estimate);
            if corrected > s.top_soc {
                debug!(estimate, top_soc = s.top_soc, corrected, "Re-anchoring top reference from voltage");
                s.top_soc = corrected;
                s.current_depth_mas = 0;
            }
        }
    }

    /// Feed the pack current in milliamps; positive is discharge.
    pub fn update_current(&mut self, milliamps: i32, now_millis: u64) {
        let previous_millis = self.last_current_millis.replace(now_millis);
        let previous_milliamps = std::mem::replace(&mut self.last_current_milliamps, milliamps);
        let Some(previous_millis) = previous_millis else {
            return;
        };
        let Some(estimate) = self.voltage_soc else {
            return;
        };
        let elapsed = now_millis.saturating_sub(previous_millis) as i64;
        let scaled = (previous_milliamps as i64 + milliamps as i64) * elapsed + self.remainder;
        let delta_mas = scaled / 2000;
        self.remainder = scaled % 2000;
        if delta_mas > 0 {
            self.milliamp_seconds_discharged += delta_mas;
        } else {
            self.milliamp_seconds_recharged -= delta_mas;
        }

        let s = &mut self.state;
        s.current_depth_mas += delta_mas;
        if s.current_depth_mas < 0 {
            // Charged past the known top: the overshoot is new headroom.
            s.bottom_depth_mas -= s.current_depth_mas;
            s.current_depth_mas = 0;
            if estimate > s.top_soc {
                s.top_soc = estimate.max(s.bottom_soc);
            }
        } else if s.current_depth_mas > s.bottom_depth_mas {
            s.bottom_depth_mas = s.current_depth_mas;
            if estimate < s.bottom_soc {
                s.bottom_soc = estimate.min(s.top_soc);
            }
        }
    }

    pub fn update_charging_status(&mut self, charging: bool) {
        self.charging = charging;
    }

    pub fn is_charging(&self) -> bool {
        self.charging
    }

    /// Estimated state of charge in percent.
    pub fn soc(&self) -> i32 {
        let s = &self.state;
        if s.bottom_depth_mas == 0 {
            return s.top_soc;
        }
        let span = (s.top_soc - s.bottom_soc) as i64;
        s.top_soc - (span * s.current_depth_mas / s.bottom_depth_mas) as i32
    }

    /// Open circuit SOC of the filtered cell voltage, if any voltage has been seen.
    pub fn voltage_soc(&self) -> Option<i32> {
        self.voltage_soc
    }

    pub fn filtered_cell_millivolts(&self) -> Option<f64> {
        self.cell_voltage_filter.is_initialized().then(|| self.cell_voltage_filter.get())
    }

    pub fn milliamp_seconds_discharged(&self) -> i64 {
        self.milliamp_seconds_discharged
    }

    pub fn milliamp_seconds_recharged(&self) -> i64 {
        self.milliamp_seconds_recharged
    }
}
