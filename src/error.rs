//! Error types for the relay's configuration and persistence surfaces.
//!
//! The relay core itself never fails: framing desyncs, checksum mismatches, out-of-order
//! clock readings and unknown packet types are all recovered in place and only show up in
//! the packet tracker's counters. Errors in this module come from the edges of the crate:
//! loading a [`RelayConfig`](crate::RelayConfig), and storing or loading the fuel gauge
//! reference points.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use bms_relay::RelayError;
//!
//! let error = RelayError::persistence_failed("flash busy");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Main error type for relay configuration and persistence.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error in {context}")]
    Yaml {
        context: String,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Failed to persist fuel gauge state: {reason}")]
    Persistence {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RelayError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::File { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            RelayError::Yaml { .. } => false,
            RelayError::InvalidConfig { .. } => false,
            RelayError::Persistence { .. } => true,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RelayError::File { .. } => vec![
                "Check the file exists and is readable",
                "Check directory permissions",
                "Ensure the storage device is mounted",
            ],
            RelayError::Yaml { .. } => vec![
                "Check the YAML syntax",
                "Compare field names against the documented configuration keys",
            ],
            RelayError::InvalidConfig { .. } => vec![
                "Correct the reported configuration value",
                "Remove the key to fall back to the default",
            ],
            RelayError::Persistence { .. } => vec![
                "Retry after the next power-off notification",
                "Check free space on the state file's volume",
                "Delete a corrupt state file to recalibrate from voltage",
            ],
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RelayError::File { path: path.into(), source }
    }

    /// Helper constructor for YAML errors.
    pub fn yaml_error(context: impl Into<String>, source: serde_yaml_ng::Error) -> Self {
        RelayError::Yaml { context: context.into(), source }
    }

    /// Helper constructor for configuration validation errors.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        RelayError::InvalidConfig { field: field.into(), reason: reason.into() }
    }

    /// Helper constructor for persistence errors.
    pub fn persistence_failed(reason: impl Into<String>) -> Self {
        RelayError::Persistence { reason: reason.into(), source: None }
    }

    /// Helper constructor for persistence errors with source.
    pub fn persistence_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        RelayError::Persistence { reason: reason.into(), source: Some(source) }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}
