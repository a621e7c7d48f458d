//! Errors raised while assembling a [`Config`](super::Config).

use crate::line::UnsupportedBaudRate;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file is not TOML, or does not fit the schema (including baud
    /// rates outside the standard set).
    #[error("malformed config {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A baud override names a rate termios does not have.
    #[error("{origin}: {source}")]
    UnsupportedBaud {
        origin: String,
        #[source]
        source: UnsupportedBaudRate,
    },

    /// An `ASYNC_SERIAL_*` variable holds a value that does not parse.
    #[error("{var}={value:?}: {reason}")]
    BadOverride {
        var: String,
        value: String,
        reason: String,
    },

    /// `port.path` is present but blank.
    #[error("port.path must name a device")]
    BlankPath,

    /// `logging.level` is not a usable tracing filter.
    #[error("logging.level {level:?} is not a valid filter: {reason}")]
    LogLevel { level: String, reason: String },

    /// No device was named on the command line or in the config.
    #[error("no serial device given; pass a path or set port.path")]
    NoDevice,
}

impl ConfigError {
    pub fn bad_override(var: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::BadOverride {
            var: var.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
