//! Shared test utilities for the async serial tests.
//!
//! Provides a pseudo-terminal pair standing in for a serial device, plus an
//! observer that collects everything a port delivers.

#![allow(dead_code)]

use async_serial::{IoError, SerialPort, SerialPortObserver};
use nix::pty::{openpty, OpenptyResult};
use parking_lot::{Condvar, Mutex};
use rustix::fs::{fcntl_getfl, fcntl_setfl, OFlags};
use rustix::io::Errno;
use rustix::termios::{tcgetattr, tcsetattr, OptionalActions};
use std::io;
use std::os::fd::OwnedFd;
use std::time::{Duration, Instant};

/// Default time to wait for asynchronous effects.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// A pseudo-terminal. The port under test opens `slave_path`; the test talks
/// to it through the master side.
pub struct Pty {
    master: OwnedFd,
    /// Keeps the slave side alive and raw between port sessions.
    _slave: OwnedFd,
    pub slave_path: String,
}

impl Pty {
    pub fn new() -> io::Result<Self> {
        let OpenptyResult { master, slave } = openpty(None, None)?;
        let slave_path = rustix::pty::ptsname(&master, Vec::new())?
            .to_string_lossy()
            .into_owned();

        // No line discipline processing in either direction.
        let mut termios = tcgetattr(&slave)?;
        termios.make_raw();
        tcsetattr(&slave, OptionalActions::Now, &termios)?;

        fcntl_setfl(&master, fcntl_getfl(&master)? | OFlags::NONBLOCK)?;

        Ok(Self {
            master,
            _slave: slave,
            slave_path,
        })
    }

    /// Write all of `data` to the master side.
    pub fn write_all(&self, mut data: &[u8]) {
        let deadline = Instant::now() + TIMEOUT;
        while !data.is_empty() {
            match rustix::io::write(&self.master, data) {
                Ok(n) if n > 0 => data = &data[n..],
                Ok(_) | Err(Errno::AGAIN) | Err(Errno::INTR) => {
                    assert!(Instant::now() < deadline, "timed out writing to pty master");
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => panic!("pty master write failed: {}", e),
            }
        }
    }

    /// Read from the master side until `len` bytes arrived or the timeout hits.
    pub fn read_exact(&self, len: usize, timeout: Duration) -> Vec<u8> {
        let mut out = Vec::with_capacity(len.min(4096));
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 4096];
        while out.len() < len && Instant::now() < deadline {
            match rustix::io::read(&self.master, &mut buf[..]) {
                Ok(n) if n > 0 => out.extend_from_slice(&buf[..n]),
                _ => std::thread::sleep(Duration::from_millis(1)),
            }
        }
        out
    }

    /// Read from the master side until the stream ends with `suffix`.
    pub fn read_until(&self, suffix: &[u8], timeout: Duration) -> Vec<u8> {
        let mut out = Vec::new();
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 4096];
        while !out.ends_with(suffix) && Instant::now() < deadline {
            match rustix::io::read(&self.master, &mut buf[..]) {
                Ok(n) if n > 0 => out.extend_from_slice(&buf[..n]),
                _ => std::thread::sleep(Duration::from_millis(1)),
            }
        }
        out
    }

    /// Everything that arrives on the master side within `timeout`.
    pub fn read_available(&self, timeout: Duration) -> Vec<u8> {
        self.read_exact(usize::MAX, timeout)
    }
}

/// Observer that records every delivery.
#[derive(Default)]
pub struct Collector {
    state: Mutex<Collected>,
    changed: Condvar,
}

#[derive(Default)]
pub struct Collected {
    pub data: Vec<u8>,
    pub deliveries: usize,
    pub errors: Vec<IoError>,
}

impl Collector {
    /// Wait until at least `len` bytes were received; returns what arrived.
    pub fn wait_for_bytes(&self, len: usize, timeout: Duration) -> Vec<u8> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.data.len() < len {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.data.clone()
    }

    /// Wait until at least one error was reported.
    pub fn wait_for_error(&self, timeout: Duration) -> Option<IoError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.errors.is_empty() {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.errors.first().cloned()
    }

    pub fn data(&self) -> Vec<u8> {
        self.state.lock().data.clone()
    }

    pub fn deliveries(&self) -> usize {
        self.state.lock().deliveries
    }

    pub fn errors(&self) -> Vec<IoError> {
        self.state.lock().errors.clone()
    }
}

impl SerialPortObserver for Collector {
    fn serial_port_did_receive(&self, _port: &SerialPort, data: &[u8]) {
        let mut state = self.state.lock();
        state.data.extend_from_slice(data);
        state.deliveries += 1;
        self.changed.notify_all();
    }

    fn serial_port_did_fail(&self, _port: &SerialPort, error: &IoError) {
        self.state.lock().errors.push(error.clone());
        self.changed.notify_all();
    }
}

/// Poll `condition` until it holds or `timeout` expires.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
