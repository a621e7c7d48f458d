//! Mock device for testing.
//!
//! `MockDevice` simulates a non-blocking device without hardware: reads come
//! from a queue, writes are logged, each write can be capped to a prefix, and
//! errors can be scripted for the next read or write.

use super::device::Device;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MockDeviceState {
    /// Chunks returned by successive reads, one chunk per call.
    reads: VecDeque<io::Result<Vec<u8>>>,
    /// Every accepted write, in order.
    write_log: Vec<Vec<u8>>,
    /// Upper bound on bytes accepted per write call.
    write_limit: Option<usize>,
    /// Errors returned by the next write calls.
    write_errors: VecDeque<io::Error>,
    write_calls: usize,
}

/// In-memory [`Device`].
///
/// Clones share state, so a test can keep one handle while the code under
/// test drives another.
///
/// # Example
/// ```
/// use async_serial::port::{Device, MockDevice};
///
/// let device = MockDevice::new("MOCK0");
/// device.set_write_limit(Some(4));
///
/// assert_eq!(device.write_bytes(b"Hello, World!").unwrap(), 4);
/// assert_eq!(device.written(), b"Hell");
/// ```
#[derive(Debug, Clone)]
pub struct MockDevice {
    name: String,
    state: Arc<Mutex<MockDeviceState>>,
}

impl MockDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockDeviceState::default())),
        }
    }

    /// Queue one chunk to be returned by a single read.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.state.lock().reads.push_back(Ok(data.to_vec()));
    }

    /// Queue an error to be returned by a single read.
    pub fn enqueue_read_error(&self, error: io::Error) {
        self.state.lock().reads.push_back(Err(error));
    }

    /// Cap how many bytes each write accepts; `None` accepts everything.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.state.lock().write_limit = limit;
    }

    /// Make the next write fail with `error`.
    pub fn fail_next_write(&self, error: io::Error) {
        self.state.lock().write_errors.push_back(error);
    }

    /// All accepted bytes, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().write_log.concat()
    }

    /// Get a copy of every accepted write.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// Number of write calls, including failed ones.
    pub fn write_calls(&self) -> usize {
        self.state.lock().write_calls
    }
}

impl Device for MockDevice {
    fn read_bytes(&self, buffer: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        match state.reads.pop_front() {
            Some(Ok(mut chunk)) => {
                let n = chunk.len().min(buffer.len());
                buffer[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    state.reads.push_front(Ok(chunk.split_off(n)));
                }
                Ok(n)
            }
            Some(Err(error)) => Err(error),
            None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
        }
    }

    fn write_bytes(&self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        state.write_calls += 1;

        if let Some(error) = state.write_errors.pop_front() {
            return Err(error);
        }

        let n = state.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        if n == 0 && !data.is_empty() {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        state.write_log.push(data[..n].to_vec());
        Ok(n)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_and_read() {
        let device = MockDevice::new("MOCK0");
        device.enqueue_read(b"Hello");

        let mut buffer = [0u8; 10];
        let n = device.read_bytes(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"Hello");
    }

    #[test]
    fn test_oversized_chunk_is_split() {
        let device = MockDevice::new("MOCK0");
        device.enqueue_read(b"Hello, World!");

        let mut buffer = [0u8; 5];
        assert_eq!(device.read_bytes(&mut buffer).unwrap(), 5);
        assert_eq!(&buffer, b"Hello");
        let mut rest = [0u8; 16];
        let n = device.read_bytes(&mut rest).unwrap();
        assert_eq!(&rest[..n], b", World!");
    }

    #[test]
    fn test_empty_read_would_block() {
        let device = MockDevice::new("MOCK0");
        let mut buffer = [0u8; 10];
        let err = device.read_bytes(&mut buffer).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_write_limit_and_log() {
        let device = MockDevice::new("MOCK0");
        device.set_write_limit(Some(3));
        assert_eq!(device.write_bytes(b"Test1").unwrap(), 3);
        device.set_write_limit(None);
        assert_eq!(device.write_bytes(b"t1").unwrap(), 2);

        assert_eq!(device.get_write_log(), vec![b"Tes".to_vec(), b"t1".to_vec()]);
        assert_eq!(device.written(), b"Test1");
    }

    #[test]
    fn test_scripted_write_error() {
        let device = MockDevice::new("MOCK0");
        device.fail_next_write(io::Error::from(io::ErrorKind::BrokenPipe));
        assert_eq!(
            device.write_bytes(b"x").unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
        assert_eq!(device.write_bytes(b"x").unwrap(), 1);
        assert_eq!(device.write_calls(), 2);
    }
}
