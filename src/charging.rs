//! Charge curve sampling
//!
//! While the board charges, the relay forwards current frames to the controller. The
//! [`ChargingTracker`] piggybacks on exactly those frames to record how the weakest cell's
//! voltage rises as charge flows in: a curve of `(millivolts, mAh)` points, one every
//! `step_mah` of regenerated charge.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::debug;

use crate::provider::{ByteSink, ByteSource, Clock};
use crate::relay::{BatteryState, BmsRelay};
use crate::types::Frame;
use crate::types::packet_type::CURRENT;

/// One sample of the charge curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChargePoint {
    /// Voltage of the tracked cell.
    pub millivolts: i32,
    /// Regenerated charge when the sample was taken.
    pub total_mah: i64,
}

/// Called with the whole curve every time a point becomes fixed.
pub type NewPointCallback = Box<dyn FnMut(&[ChargePoint]) + Send>;

pub struct ChargingTracker {
    points: Vec<ChargePoint>,
    step_mah: i64,
    tracked_cell: usize,
    on_new_point: NewPointCallback,
}

impl std::fmt::Debug for ChargingTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChargingTracker")
            .field("points", &self.points)
            .field("step_mah", &self.step_mah)
            .field("tracked_cell", &self.tracked_cell)
            .finish_non_exhaustive()
    }
}

impl ChargingTracker {
    /// `step_mah` below one is raised to one.
    pub fn new<F>(step_mah: i32, on_new_point: F) -> Self
    where
        F: FnMut(&[ChargePoint]) + Send + 'static,
    {
        Self {
            points: Vec::with_capacity(128),
            step_mah: step_mah.max(1) as i64,
            tracked_cell: 0,
            on_new_point: Box::new(on_new_point),
        }
    }

    /// Create a tracker and register it as a forwarded-packet observer on `relay`.
    pub fn attach<S, K, C, F>(
        relay: &mut BmsRelay<S, K, C>,
        step_mah: i32,
        on_new_point: F,
    ) -> Arc<Mutex<Self>>
    where
        S: ByteSource,
        K: ByteSink,
        C: Clock,
        F: FnMut(&[ChargePoint]) + Send + 'static,
    {
        let tracker = Arc::new(Mutex::new(Self::new(step_mah, on_new_point)));
        let observer = Arc::clone(&tracker);
        relay.add_forwarded_packet_callback(move |state, frame| {
            let mut tracker = observer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            tracker.observe(state, frame);
        });
        tracker
    }

    /// Feed one forwarded frame. Only current frames are looked at, and only once the pack
    /// voltage is known.
    pub fn observe(&mut self, state: &BatteryState, frame: &Frame<'_>) {
        if frame.packet_type() != Some(CURRENT) || state.total_voltage_millivolts() == 0 {
            return;
        }
        let total_mah = state.regenerated_charge_mah();
        let cells = state.cell_millivolts();

        let Some(last) = self.points.last_mut() else {
            let (index, &lowest) = cells
                .iter()
                .enumerate()
                .min_by_key(|&(_, mv)| *mv)
                .unwrap_or((0, &0));
            self.tracked_cell = index;
            let seed = ChargePoint { millivolts: lowest as i32, total_mah };
            debug!(cell = index, millivolts = lowest, total_mah, "Charge curve started");
            // The first point stays put; the second follows the live reading.
            self.points.extend([seed, seed]);
            return;
        };
        last.millivolts = cells[self.tracked_cell] as i32;
        last.total_mah = total_mah;
        let last = *last;

        let fixed = self.points[self.points.len() - 2];
        if last.total_mah - fixed.total_mah >= self.step_mah {
            self.points.push(last);
            debug!(millivolts = last.millivolts, total_mah = last.total_mah, "Charge curve point");
            (self.on_new_point)(&self.points);
        }
    }

    /// Fixed points followed by the live one.
    pub fn points(&self) -> &[ChargePoint] {
        &self.points
    }

    /// Index of the cell whose voltage the curve follows.
    pub fn tracked_cell(&self) -> usize {
        self.tracked_cell
    }
}
