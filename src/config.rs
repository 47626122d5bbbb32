//! Relay configuration loaded from YAML
//!
//! ```yaml
//! bms_serial_override: 4242
//! charge_curve_step_mah: 50
//! poll_interval_ms: 10
//! state_file: /var/lib/bms-relay/gauge.yaml
//! log_filter: bms_relay=debug
//! ```
//!
//! Every key is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use std::sync::{Arc, Mutex};

use crate::charging::{ChargePoint, ChargingTracker};
use crate::provider::{ByteSink, ByteSource, Clock};
use crate::relay::BmsRelay;
use crate::{RelayError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Serial reported to the controller instead of the BMS's own.
    pub bms_serial_override: Option<u32>,
    /// Regenerated charge between two fixed charge curve points.
    pub charge_curve_step_mah: i32,
    /// Delay between two relay polls in the driver.
    pub poll_interval_ms: u64,
    /// Where fuel gauge reference points are persisted, if anywhere.
    pub state_file: Option<PathBuf>,
    /// `tracing` filter directive used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bms_serial_override: None,
            charge_curve_step_mah: 50,
            poll_interval_ms: 10,
            state_file: None,
            log_filter: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| RelayError::yaml_error("relay configuration", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| RelayError::file_error(path, e))?;
        let config: Self = serde_yaml_ng::from_str(&yaml)
            .map_err(|e| RelayError::yaml_error(path.display().to_string(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(RelayError::invalid_config("poll_interval_ms", "must be greater than zero"));
        }
        if self.charge_curve_step_mah <= 0 {
            return Err(RelayError::invalid_config(
                "charge_curve_step_mah",
                format!("must be positive, got {}", self.charge_curve_step_mah),
            ));
        }
        if self.bms_serial_override == Some(0) {
            return Err(RelayError::invalid_config(
                "bms_serial_override",
                "zero is not a serial; omit the key to forward the real serial",
            ));
        }
        EnvFilter::try_new(&self.log_filter)
            .map_err(|e| RelayError::invalid_config("log_filter", e.to_string()))?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Push the relay-facing settings into `relay`.
    pub fn apply<S, K, C>(&self, relay: &mut BmsRelay<S, K, C>)
    where
        S: ByteSource,
        K: ByteSink,
        C: Clock,
    {
        relay.set_bms_serial_override(self.bms_serial_override);
    }

    /// Sample a charge curve on `relay` every [`charge_curve_step_mah`](Self::charge_curve_step_mah).
    pub fn attach_charging_tracker<S, K, C, F>(
        &self,
        relay: &mut BmsRelay<S, K, C>,
        on_new_point: F,
    ) -> Arc<Mutex<ChargingTracker>>
    where
        S: ByteSource,
        K: ByteSink,
        C: Clock,
        F: FnMut(&[ChargePoint]) + Send + 'static,
    {
        ChargingTracker::attach(relay, self.charge_curve_step_mah, on_new_point)
    }

    /// Install a global fmt subscriber filtered by `RUST_LOG`, or by
    /// [`log_filter`](Self::log_filter) when the variable is unset.
    ///
    /// Returns `false` if a global subscriber was already installed.
    pub fn init_tracing(&self) -> Result<bool> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&self.log_filter)
                .map_err(|e| RelayError::invalid_config("log_filter", e.to_string()))?,
        };
        Ok(tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .is_ok())
    }
}
