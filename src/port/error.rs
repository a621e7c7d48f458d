//! Port-specific error types.
//!
//! `PortError` covers everything surfaced synchronously to the caller of a
//! port operation. Failures that happen later on the I/O thread are reported
//! to the observer as [`IoError`] instead.

use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by [`SerialPort`](super::SerialPort) operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The port was constructed with an empty (or otherwise unusable) path.
    #[error("Invalid serial port path")]
    InvalidPath,

    /// The operating system refused to open the device.
    #[error("Failed to open serial port: {0}")]
    FailedToOpen(String),

    /// Attempted to use a port that's not open.
    #[error("Port is not open")]
    PortNotOpen,

    /// Attempted to open a port that's already open.
    #[error("Port is already open")]
    AlreadyOpen,

    /// Reading or applying the terminal attributes failed.
    #[error("Configuration error: {0}")]
    Configure(#[source] io::Error),

    /// Setting up the I/O loop failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PortError {
    /// Create a FailedToOpen error from the OS error.
    pub fn failed_to_open(error: &io::Error) -> Self {
        Self::FailedToOpen(error.to_string())
    }
}

/// Result type for port operations.
pub type PortResult<T> = Result<T, PortError>;

/// Which half of the duplex stream an asynchronous failure happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDirection {
    Read,
    Write,
}

impl fmt::Display for IoDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoDirection::Read => f.write_str("read"),
            IoDirection::Write => f.write_str("write"),
        }
    }
}

/// An I/O failure observed on the background I/O thread.
#[derive(Debug, Clone, Error)]
#[error("{direction} failed: {source}")]
pub struct IoError {
    pub direction: IoDirection,
    #[source]
    pub source: Arc<io::Error>,
    /// Pending outgoing bytes dropped because of this failure.
    pub discarded: usize,
}

impl IoError {
    pub fn read(source: io::Error) -> Self {
        Self {
            direction: IoDirection::Read,
            source: Arc::new(source),
            discarded: 0,
        }
    }

    pub fn write(source: io::Error, discarded: usize) -> Self {
        Self {
            direction: IoDirection::Write,
            source: Arc::new(source),
            discarded,
        }
    }

    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }
}
