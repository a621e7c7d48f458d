//! Device abstraction.
//!
//! Defines the `Device` trait the reader and writer drive, and `TtyDevice`,
//! the real character device behind an open file descriptor.

use super::error::{PortError, PortResult};
use crate::line::{open_flags, LineConfiguration, OpenMode};
use rustix::fs::{open, Mode};
use rustix::termios::{tcgetattr, tcsetattr, OptionalActions};
use std::fmt;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use tracing::debug;

/// Non-blocking byte I/O on a device.
///
/// Both calls return immediately with whatever the OS could transfer.
/// Implementations report "nothing right now" as `io::ErrorKind::WouldBlock`.
pub trait Device: Send + Sync + fmt::Debug {
    /// Read up to `buffer.len()` bytes.
    fn read_bytes(&self, buffer: &mut [u8]) -> io::Result<usize>;

    /// Write a prefix of `data`, returning how many bytes were accepted.
    fn write_bytes(&self, data: &[u8]) -> io::Result<usize>;

    /// Get the name/path of this device.
    fn name(&self) -> &str;
}

/// A character device opened in non-blocking mode.
///
/// The descriptor is closed when the value is dropped.
pub struct TtyDevice {
    fd: OwnedFd,
    path: String,
    mode: OpenMode,
}

impl TtyDevice {
    /// Open `path` with the access mode `mode`.
    ///
    /// # Example
    /// ```no_run
    /// use async_serial::line::OpenMode;
    /// use async_serial::port::TtyDevice;
    ///
    /// let device = TtyDevice::open("/dev/ttyUSB0", OpenMode::ReadWrite)?;
    /// # Ok::<(), async_serial::port::PortError>(())
    /// ```
    pub fn open(path: &str, mode: OpenMode) -> PortResult<Self> {
        if path.is_empty() || path.contains('\0') {
            return Err(PortError::InvalidPath);
        }

        let fd = open(path, open_flags(mode), Mode::empty())
            .map_err(|e| PortError::failed_to_open(&e.into()))?;
        lock_exclusive(&fd)?;
        debug!(path, fd = fd.as_raw_fd(), ?mode, "opened device");

        Ok(Self {
            fd,
            path: path.to_string(),
            mode,
        })
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Read the current attributes, overlay `config`, and apply them now.
    pub fn set_line_configuration(&self, config: &LineConfiguration) -> io::Result<()> {
        let mut termios = tcgetattr(&self.fd)?;
        config.apply_to(&mut termios)?;
        tcsetattr(&self.fd, OptionalActions::Now, &termios)?;
        Ok(())
    }
}

/// BSD-family systems let other processes share a tty unless it is locked.
#[cfg(any(target_vendor = "apple", target_os = "freebsd", target_os = "dragonfly"))]
fn lock_exclusive(fd: &OwnedFd) -> PortResult<()> {
    use rustix::fs::{flock, FlockOperation};

    flock(fd, FlockOperation::NonBlockingLockExclusive)
        .map_err(|e| PortError::failed_to_open(&e.into()))
}

#[cfg(not(any(target_vendor = "apple", target_os = "freebsd", target_os = "dragonfly")))]
fn lock_exclusive(_fd: &OwnedFd) -> PortResult<()> {
    Ok(())
}

impl AsFd for TtyDevice {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl Device for TtyDevice {
    fn read_bytes(&self, buffer: &mut [u8]) -> io::Result<usize> {
        Ok(rustix::io::read(&self.fd, buffer)?)
    }

    fn write_bytes(&self, data: &[u8]) -> io::Result<usize> {
        Ok(rustix::io::write(&self.fd, data)?)
    }

    fn name(&self) -> &str {
        &self.path
    }
}

impl fmt::Debug for TtyDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtyDevice")
            .field("path", &self.path)
            .field("fd", &self.fd.as_raw_fd())
            .field("mode", &self.mode)
            .finish()
    }
}
