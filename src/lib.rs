//! Async Serial Library
//!
//! Full-duplex, non-blocking communication with a serial device. A background
//! readiness loop reads incoming bytes and hands them to an observer, while
//! any thread may queue outgoing bytes without blocking.
//!
//! # Modules
//!
//! - `line`: Line parameters (baud, parity, stop/data bits, open mode) and their termios mapping
//! - `reactor`: Poll-based readiness loop with suspendable watches
//! - `port`: The serial port handle, outgoing buffer, reader and observers
//! - `config`: Configuration management with TOML support

pub mod config;
pub mod line;
pub mod port;
pub mod reactor;

// Re-export commonly used types for convenience
pub use line::{BaudRate, DataBits, LineConfiguration, OpenMode, Parity, StopBits};
pub use port::{
    ChannelObserver, IoDirection, IoError, PortError, PortEvent, PortResult, SerialPort,
    SerialPortObserver,
};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
