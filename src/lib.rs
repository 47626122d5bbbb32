//! Inline relay for BMS serial telemetry.
//!
//! The relay sits on the wire between a battery management system and a motor controller.
//! It forwards the BMS byte stream while it:
//!
//! - reframes the stream and passes anything unframeable through untouched
//! - tracks per packet type arrival statistics
//! - replaces the BMS's state of charge with a coulomb counting estimate
//! - spoofs the BMS serial number on request
//! - drops status and current frames the controller does not need
//! - replays frames the BMS has gone quiet on
//!
//! # Features
//!
//! - **Byte-level relay**: [`BmsRelay`] over any [`ByteSource`], [`ByteSink`] and [`Clock`]
//! - **Fuel gauge**: [`FuelGauge`] with voltage drift correction and persisted reference points
//! - **Charge curves**: [`charging::ChargingTracker`] samples the weakest cell while charging
//! - **Async driver**: [`driver::Driver`] polls on a tokio task and streams [`RelaySnapshot`]s
//!
//! ## Example
//!
//! ```rust
//! use bms_relay::BmsRelay;
//! use std::collections::VecDeque;
//!
//! let serial: [u8; 10] = [0xFF, 0x55, 0xAA, 0x06, 0x01, 0x02, 0x03, 0x04, 0x02, 0x0E];
//! let mut relay = BmsRelay::new(VecDeque::from(serial.to_vec()), Vec::<u8>::new(), || 0u64);
//! relay.set_bms_serial_override(Some(0x0102_0309));
//! relay.poll();
//!
//! assert_eq!(relay.state().captured_serial(), Some(0x0102_0304));
//! assert_eq!(relay.sink()[7], 0x09);
//! ```

mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;

// Wire protocol and numerics
pub mod stats;
pub mod types;

// Relay pipeline
pub mod charging;
pub mod fuel_gauge;
pub mod provider;
pub mod relay;
pub mod tracker;

// Host integration
pub mod config;
pub mod driver;
pub mod persistence;

pub use config::RelayConfig;
pub use driver::{Driver, DriverHandle, DriverOptions};
pub use error::*;
pub use fuel_gauge::{FuelGauge, FuelGaugeState};
pub use persistence::{MemoryStateStore, StateStore, YamlStateStore};
pub use provider::{ByteSink, ByteSource, Clock, MonotonicClock};
pub use relay::{BatteryState, BmsRelay, RelaySnapshot};
pub use tracker::PacketTracker;
pub use types::{Frame, StatusFlags};
