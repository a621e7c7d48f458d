//! Configuration schema definitions.
//!
//! Every section has defaults, so a partial file (or none) is valid.

use super::error::{ConfigError, ConfigResult};
use crate::line::{BaudRate, DataBits, LineConfiguration, OpenMode, Parity, StopBits};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing_subscriber::EnvFilter;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial port configuration
    pub port: PortSection,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Check values serde cannot check on its own.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.port.path.as_deref().is_some_and(|path| path.trim().is_empty()) {
            return Err(ConfigError::BlankPath);
        }
        EnvFilter::try_new(&self.logging.level).map_err(|e| ConfigError::LogLevel {
            level: self.logging.level.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

/// Serial port section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSection {
    /// Device path or alias
    pub path: Option<String>,
    /// Access mode: "read-only", "write-only", "read-write"
    pub mode: OpenMode,
    /// Baud rate; one of the standard termios rates
    pub baud: BaudRate,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub data_bits: DataBits,
    /// Friendly names for device paths
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl Default for PortSection {
    fn default() -> Self {
        Self {
            path: None,
            mode: OpenMode::ReadWrite,
            baud: BaudRate::B9600,
            parity: Parity::None,
            stop_bits: StopBits::One,
            data_bits: DataBits::Eight,
            aliases: HashMap::new(),
        }
    }
}

impl PortSection {
    /// Resolve a port name through aliases
    pub fn resolve_path(&self, name: &str) -> String {
        self.aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// The line parameters this section describes.
    pub fn line_configuration(&self) -> LineConfiguration {
        LineConfiguration {
            baud_rate: self.baud,
            parity: self.parity,
            stop_bits: self.stop_bits,
            data_bits: self.data_bits,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    Pretty,
    /// Compact format
    #[default]
    Compact,
}
