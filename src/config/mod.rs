//! Configuration for the `serial-pipe` tool and other embedders.
//!
//! Settings come from a TOML file, then environment overrides on top.
//!
//! # Configuration Resolution
//!
//! 1. `ASYNC_SERIAL_CONFIG` environment variable (explicit path)
//! 2. `./async-serial.toml` (current directory)
//! 3. `$XDG_CONFIG_HOME/async-serial/config.toml` or `~/.config/async-serial/config.toml`
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! - `ASYNC_SERIAL_PORT_PATH=/dev/ttyUSB0`
//! - `ASYNC_SERIAL_PORT_BAUD=115200`
//! - `ASYNC_SERIAL_PORT_MODE=read-write`
//! - `ASYNC_SERIAL_LOG_LEVEL=debug`
//!
//! # Example
//!
//! ```rust,ignore
//! use async_serial::config::ConfigLoader;
//!
//! let config = ConfigLoader::load()?.into_config();
//! let line = config.port.line_configuration();
//! println!("{} at {}", config.port.path.unwrap_or_default(), line);
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{get_default_config_path, resolve_config_path, ConfigLoader};
pub use schema::{Config, LogFormat, LoggingConfig, PortSection};
