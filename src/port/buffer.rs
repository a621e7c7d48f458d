//! Outgoing buffer and its drain protocol.
//!
//! The buffer is either Idle (empty, write watch suspended) or Draining
//! (non-empty, write watch active). Producers move it Idle -> Draining in
//! [`OutgoingBuffer::enqueue`]; the writer moves it back in
//! [`OutgoingBuffer::drain`]. Both transitions happen under the same lock, so
//! a producer can never observe a non-empty buffer whose watch was just
//! suspended by a concurrent drain.

use super::device::Device;
use crate::reactor::Watch;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use tracing::{trace, warn};

/// Result of one writer step.
#[derive(Debug)]
pub enum DrainOutcome {
    /// Nothing was queued; the watch is suspended.
    Idle,
    /// The device accepted `written` bytes; `remaining` are still queued.
    Wrote { written: usize, remaining: usize },
    /// The device was not ready after all. The queue is untouched.
    Blocked,
    /// The device failed. All queued bytes were dropped.
    Failed { error: io::Error, discarded: usize },
}

/// FIFO of bytes waiting to be written.
#[derive(Debug, Default)]
pub struct OutgoingBuffer {
    queue: Mutex<VecDeque<u8>>,
}

impl OutgoingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes`, arming `watch` on the empty -> non-empty edge.
    ///
    /// Returns `true` when this call armed the watch.
    pub fn enqueue(&self, bytes: &[u8], watch: &Watch) -> bool {
        if bytes.is_empty() {
            return false;
        }
        let mut queue = self.queue.lock();
        let was_empty = queue.is_empty();
        queue.extend(bytes);
        if was_empty {
            watch.resume();
        }
        trace!(bytes = bytes.len(), queued = queue.len(), armed = was_empty, "enqueued");
        was_empty
    }

    /// Write as much of the queue as `device` accepts in one call.
    ///
    /// Suspends `watch` once the queue is empty.
    pub fn drain<D: Device + ?Sized>(&self, device: &D, watch: &Watch) -> DrainOutcome {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            watch.suspend();
            return DrainOutcome::Idle;
        }

        match device.write_bytes(queue.make_contiguous()) {
            Ok(written) => {
                let accepted = written.min(queue.len());
                queue.drain(..accepted);
                let remaining = queue.len();
                if remaining == 0 {
                    watch.suspend();
                }
                trace!(device = device.name(), written, remaining, "drained");
                DrainOutcome::Wrote { written, remaining }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                DrainOutcome::Blocked
            }
            Err(error) => {
                let discarded = queue.len();
                queue.clear();
                watch.suspend();
                warn!(
                    device = device.name(),
                    %error,
                    discarded,
                    "write failed, dropping queued bytes"
                );
                DrainOutcome::Failed { error, discarded }
            }
        }
    }

    /// Number of queued bytes.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
