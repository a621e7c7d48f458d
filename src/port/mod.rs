//! Asynchronous serial port.
//!
//! [`SerialPort`] owns the device descriptor and its background I/O loop.
//! Incoming bytes are pushed to a registered [`SerialPortObserver`]; outgoing
//! bytes are queued by [`SerialPort::send`] and written whenever the device
//! reports it can take more.
//!
//! # Example
//! ```no_run
//! use async_serial::line::{BaudRate, DataBits, OpenMode, Parity, StopBits};
//! use async_serial::port::{SerialPort, SerialPortObserver};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl SerialPortObserver for Printer {
//!     fn serial_port_did_receive(&self, port: &SerialPort, data: &[u8]) {
//!         println!("{}: {:?}", port.path(), data);
//!     }
//! }
//!
//! let printer = Arc::new(Printer);
//! let port = SerialPort::new("/dev/ttyUSB0");
//! port.set_observer(&printer);
//! port.open(OpenMode::ReadWrite)?;
//! port.configure(BaudRate::B115200, Parity::None, StopBits::One, DataBits::Eight)?;
//! port.send(b"AT\r\n")?;
//! # Ok::<(), async_serial::port::PortError>(())
//! ```

pub mod buffer;
pub mod device;
pub mod error;
pub mod mock;
pub mod observer;
pub mod reader;

pub use buffer::{DrainOutcome, OutgoingBuffer};
pub use device::{Device, TtyDevice};
pub use error::{IoDirection, IoError, PortError, PortResult};
pub use mock::MockDevice;
pub use observer::{ChannelObserver, PortEvent, SerialPortObserver};
pub use reader::{Reader, READ_CHUNK_SIZE};

use crate::line::{BaudRate, DataBits, LineConfiguration, OpenMode, Parity, StopBits};
use crate::reactor::{Reactor, Watch};
use observer::Delivery;
use parking_lot::RwLock;
use std::fmt;
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Everything that exists only while the port is open.
struct Session {
    device: Arc<TtyDevice>,
    outgoing: Arc<OutgoingBuffer>,
    read_watch: Watch,
    write_watch: Watch,
    reactor: Reactor,
}

impl Session {
    fn start(device: TtyDevice, port: Weak<PortInner>) -> PortResult<Self> {
        let device = Arc::new(device);
        let outgoing = Arc::new(OutgoingBuffer::new());
        let (deliveries, rx) = mpsc::channel();

        observer::spawn_dispatcher(port, rx)?;
        let reactor = Reactor::start("serial-io")?;

        let mut reader = Reader::new(Arc::clone(&device), deliveries.clone());
        let read_watch = reactor.register_readable(device.clone(), move |watch, readiness| {
            reader.on_readable(watch, readiness)
        });

        let writer_device = Arc::clone(&device);
        let writer_buffer = Arc::clone(&outgoing);
        let write_watch = reactor.register_writable(device.clone(), move |watch, _| {
            let outcome = writer_buffer.drain(&*writer_device, watch);
            if let DrainOutcome::Failed { error, discarded } = outcome {
                let _ = deliveries.send(Delivery::Failed(IoError::write(error, discarded)));
            }
        });

        Ok(Self {
            device,
            outgoing,
            read_watch,
            write_watch,
            reactor,
        })
    }

    /// Cancel both watches, stop the loop, and release the descriptor.
    fn close(mut self) {
        self.read_watch.cancel();
        self.write_watch.cancel();
        self.reactor.shutdown();
        let discarded = self.outgoing.len();
        debug!(path = self.device.name(), discarded, "session closed");
    }
}

pub(crate) struct PortInner {
    path: String,
    session: RwLock<Option<Session>>,
    observer: RwLock<Option<Weak<dyn SerialPortObserver>>>,
}

impl Drop for PortInner {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.close();
        }
    }
}

/// Handle to one serial device.
///
/// Clones refer to the same port. The port is closed when the last handle is
/// dropped.
#[derive(Clone)]
pub struct SerialPort {
    inner: Arc<PortInner>,
}

impl SerialPort {
    /// Create a closed port for the device at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(PortInner {
                path: path.into(),
                session: RwLock::new(None),
                observer: RwLock::new(None),
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn is_open(&self) -> bool {
        self.inner.session.read().is_some()
    }

    /// Whether queued bytes are still waiting to be written.
    pub fn has_pending_outgoing_data(&self) -> bool {
        self.pending_outgoing_len() != 0
    }

    /// Number of queued outgoing bytes; zero when closed.
    pub fn pending_outgoing_len(&self) -> usize {
        self.inner
            .session
            .read()
            .as_ref()
            .map_or(0, |session| session.outgoing.len())
    }

    /// Register `observer`, replacing any previous one.
    ///
    /// Only a weak reference is kept.
    pub fn set_observer<O>(&self, observer: &Arc<O>)
    where
        O: SerialPortObserver + 'static,
    {
        let weak: Weak<dyn SerialPortObserver> = Arc::downgrade(observer) as Weak<O>;
        *self.inner.observer.write() = Some(weak);
    }

    pub fn clear_observer(&self) {
        *self.inner.observer.write() = None;
    }

    fn observer(&self) -> Option<Arc<dyn SerialPortObserver>> {
        self.inner.observer.read().as_ref().and_then(Weak::upgrade)
    }

    /// Open the device and start the I/O loop.
    ///
    /// Reads are watched immediately; writes are watched once data is sent.
    pub fn open(&self, mode: OpenMode) -> PortResult<()> {
        if self.inner.path.is_empty() {
            return Err(PortError::InvalidPath);
        }

        let mut slot = self.inner.session.write();
        if slot.is_some() {
            return Err(PortError::AlreadyOpen);
        }

        let device = TtyDevice::open(&self.inner.path, mode)?;
        *slot = Some(Session::start(device, Arc::downgrade(&self.inner))?);
        info!(path = %self.inner.path, ?mode, "port opened");
        Ok(())
    }

    /// Apply line parameters. Does nothing if the port is not open.
    pub fn configure(
        &self,
        baud_rate: BaudRate,
        parity: Parity,
        stop_bits: StopBits,
        data_bits: DataBits,
    ) -> PortResult<()> {
        self.configure_with(&LineConfiguration {
            baud_rate,
            parity,
            stop_bits,
            data_bits,
        })
    }

    /// Apply `config`. Does nothing if the port is not open.
    pub fn configure_with(&self, config: &LineConfiguration) -> PortResult<()> {
        let session = self.inner.session.read();
        let Some(session) = session.as_ref() else {
            return Ok(());
        };
        session
            .device
            .set_line_configuration(config)
            .map_err(PortError::Configure)?;
        info!(path = %self.inner.path, line = %config, "port configured");
        Ok(())
    }

    /// Queue `bytes` for transmission. Never blocks on the device.
    pub fn send(&self, bytes: &[u8]) -> PortResult<()> {
        let session = self.inner.session.read();
        let session = session.as_ref().ok_or(PortError::PortNotOpen)?;
        session.outgoing.enqueue(bytes, &session.write_watch);
        Ok(())
    }

    /// Stop the I/O loop and close the device. Unsent bytes are discarded.
    pub fn close(&self) {
        let session = self.inner.session.write().take();
        if let Some(session) = session {
            session.close();
            info!(path = %self.inner.path, "port closed");
        }
    }
}

impl fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialPort")
            .field("path", &self.inner.path)
            .field("open", &self.is_open())
            .field("pending", &self.pending_outgoing_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    impl SerialPortObserver for Silent {
        fn serial_port_did_receive(&self, _port: &SerialPort, _data: &[u8]) {}
    }

    #[test]
    fn test_empty_path_is_rejected() {
        let port = SerialPort::new("");
        assert!(matches!(port.open(OpenMode::ReadWrite), Err(PortError::InvalidPath)));
        assert!(!port.is_open());
    }

    #[test]
    fn test_missing_device_fails_to_open() {
        let port = SerialPort::new("/dev/nonexistent_port_12345");
        assert!(matches!(
            port.open(OpenMode::ReadWrite),
            Err(PortError::FailedToOpen(_))
        ));
        assert!(!port.is_open());
    }

    #[test]
    fn test_send_requires_open_port() {
        let port = SerialPort::new("/dev/ttyS0");
        assert!(matches!(port.send(b"hello"), Err(PortError::PortNotOpen)));
        assert!(!port.has_pending_outgoing_data());
        assert_eq!(port.pending_outgoing_len(), 0);
    }

    #[test]
    fn test_configure_closed_port_is_noop() {
        let port = SerialPort::new("/dev/ttyS0");
        port.configure(BaudRate::B9600, Parity::None, StopBits::One, DataBits::Eight)
            .unwrap();
    }

    #[test]
    fn test_close_is_idempotent() {
        let port = SerialPort::new("/dev/ttyS0");
        port.close();
        port.close();
        assert!(!port.is_open());
    }

    #[test]
    fn test_observer_is_held_weakly() {
        let port = SerialPort::new("/dev/ttyS0");
        let observer = Arc::new(Silent);
        port.set_observer(&observer);
        assert!(port.observer().is_some());
        assert_eq!(Arc::strong_count(&observer), 1);

        drop(observer);
        assert!(port.observer().is_none());

        port.set_observer(&Arc::new(Silent));
        port.clear_observer();
        assert!(port.observer().is_none());
    }
}
