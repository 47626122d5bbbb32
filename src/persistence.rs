//! Fuel gauge state that survives power cycles
//!
//! The BMS announces a power off shortly before it cuts the supply. That is the moment the
//! gauge's reference points get written out, and they are restored with
//! [`BmsRelay::with_fuel_gauge_state`](crate::BmsRelay::with_fuel_gauge_state) on the next
//! boot.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

pub use crate::fuel_gauge::FuelGaugeState;
use crate::{RelayError, Result};

/// Somewhere to keep a [`FuelGaugeState`] between boots.
pub trait StateStore: Send + Sync {
    /// Last stored state, `None` if nothing has been stored yet.
    fn load(&self) -> Result<Option<FuelGaugeState>>;

    fn store(&self, state: &FuelGaugeState) -> Result<()>;
}

/// Stores the state as a small YAML document.
///
/// Writes go to a sibling temporary file which is then renamed over the target, so a power
/// loss mid-write leaves the previous state intact.
#[derive(Debug, Clone)]
pub struct YamlStateStore {
    path: PathBuf,
}

impl YamlStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for YamlStateStore {
    fn load(&self) -> Result<Option<FuelGaugeState>> {
        let yaml = match std::fs::read_to_string(&self.path) {
            Ok(yaml) => yaml,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RelayError::file_error(&self.path, e)),
        };
        let state = serde_yaml_ng::from_str(&yaml)
            .map_err(|e| RelayError::yaml_error(self.path.display().to_string(), e))?;
        Ok(Some(state))
    }

    fn store(&self, state: &FuelGaugeState) -> Result<()> {
        let yaml = serde_yaml_ng::to_string(state)
            .map_err(|e| RelayError::persistence_failed_with_source("serializing state", Box::new(e)))?;
        let temp = self.temp_path();
        std::fs::write(&temp, yaml).map_err(|e| {
            RelayError::persistence_failed_with_source(
                format!("writing {}", temp.display()),
                Box::new(e),
            )
        })?;
        std::fs::rename(&temp, &self.path).map_err(|e| {
            RelayError::persistence_failed_with_source(
                format!("replacing {}", self.path.display()),
                Box::new(e),
            )
        })?;
        debug!(path = %self.path.display(), ?state, "Stored fuel gauge state");
        Ok(())
    }
}

/// Keeps the state in memory only.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<FuelGaugeState>>,
    writes: Mutex<u64>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: FuelGaugeState) -> Self {
        Self { state: Mutex::new(Some(state)), writes: Mutex::new(0) }
    }

    /// Number of successful [`store`](StateStore::store) calls.
    pub fn writes(&self) -> u64 {
        *self.writes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<FuelGaugeState>> {
        Ok(*self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    fn store(&self, state: &FuelGaugeState) -> Result<()> {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(*state);
        *self.writes.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(())
    }
}
