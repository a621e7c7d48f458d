//! Reader half of the I/O loop.

use super::device::Device;
use super::error::IoError;
use super::observer::Delivery;
use crate::reactor::{Readiness, Watch};
use rustix::io::Errno;
use std::io;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tracing::{debug, trace};

/// Size of the scratch buffer used for each read.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Performs one bounded read per readability event and publishes the result.
#[derive(Debug)]
pub struct Reader<D: ?Sized> {
    device: Arc<D>,
    deliveries: Sender<Delivery>,
    scratch: Box<[u8; READ_CHUNK_SIZE]>,
}

impl<D: Device + ?Sized> Reader<D> {
    pub fn new(device: Arc<D>, deliveries: Sender<Delivery>) -> Self {
        Self {
            device,
            deliveries,
            scratch: Box::new([0u8; READ_CHUNK_SIZE]),
        }
    }

    /// Handle one readability event.
    ///
    /// Exactly one data delivery is produced: the bytes read (possibly
    /// none), or the error. A hang-up that yields no data is additionally
    /// reported as an `UnexpectedEof` failure and suspends `watch`, since the
    /// descriptor would otherwise stay readable forever. A descriptor not
    /// open for reading (`EBADF`) suspends `watch` without a failure.
    pub fn on_readable(&mut self, watch: &Watch, readiness: Readiness) {
        let delivery = match self.device.read_bytes(&mut self.scratch[..]) {
            Ok(n) => {
                trace!(device = self.device.name(), bytes = n, "read");
                if n == 0 && (readiness.hang_up || readiness.error) {
                    debug!(device = self.device.name(), "device hung up, suspending reads");
                    watch.suspend();
                    let _ = self.deliveries.send(Delivery::Received(Vec::new()));
                    let hang_up = io::Error::new(io::ErrorKind::UnexpectedEof, "device hung up");
                    Delivery::Failed(IoError::read(hang_up))
                } else {
                    Delivery::Received(self.scratch[..n].to_vec())
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Delivery::Received(Vec::new())
            }
            // A write-only descriptor still polls readable when data arrives.
            Err(e) if e.raw_os_error() == Some(Errno::BADF.raw_os_error()) => {
                debug!(
                    device = self.device.name(),
                    "device not open for reading, suspending reads"
                );
                watch.suspend();
                Delivery::Received(Vec::new())
            }
            Err(e) => {
                debug!(device = self.device.name(), error = %e, "read failed, suspending reads");
                watch.suspend();
                Delivery::Failed(IoError::read(e))
            }
        };

        // The dispatcher only goes away once the port itself is gone.
        let _ = self.deliveries.send(delivery);
    }
}
