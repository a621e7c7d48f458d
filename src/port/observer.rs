//! Observer interface and the delivery thread that feeds it.
//!
//! Reads complete on the I/O thread but are handed to observers on a separate
//! dispatch thread, so a slow observer never delays further I/O.

use super::error::IoError;
use super::{PortInner, SerialPort};
use std::io;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Weak};
use std::thread;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::trace;

/// Receives data and failures from a [`SerialPort`].
///
/// A port only keeps a weak reference to its observer. The caller owns the
/// observer and must keep it alive for as long as it wants notifications.
pub trait SerialPortObserver: Send + Sync {
    /// Bytes produced by one read. May be empty when a readiness event
    /// yielded no data; treat that as "try again", not end of stream.
    fn serial_port_did_receive(&self, port: &SerialPort, data: &[u8]);

    /// An I/O error on the background thread.
    fn serial_port_did_fail(&self, port: &SerialPort, error: &IoError) {
        let _ = (port, error);
    }
}

/// Message from the I/O thread to the dispatch thread.
#[derive(Debug)]
pub enum Delivery {
    Received(Vec<u8>),
    Failed(IoError),
}

pub(super) fn spawn_dispatcher(
    port: Weak<PortInner>,
    deliveries: Receiver<Delivery>,
) -> io::Result<()> {
    thread::Builder::new()
        .name("serial-dispatch".to_string())
        .spawn(move || {
            for delivery in deliveries {
                let Some(inner) = port.upgrade() else {
                    break;
                };
                let port = SerialPort { inner };
                let Some(observer) = port.observer() else {
                    trace!(path = port.path(), "no observer, dropping delivery");
                    continue;
                };
                match delivery {
                    Delivery::Received(bytes) => observer.serial_port_did_receive(&port, &bytes),
                    Delivery::Failed(error) => observer.serial_port_did_fail(&port, &error),
                }
            }
        })?;
    Ok(())
}

/// Event forwarded by a [`ChannelObserver`].
#[derive(Debug, Clone)]
pub enum PortEvent {
    Received(Vec<u8>),
    Failed(IoError),
}

/// Observer that forwards everything into a tokio channel.
///
/// Lets async code consume a port with `recv().await`. Empty reads are
/// not forwarded.
#[derive(Debug)]
pub struct ChannelObserver {
    events: UnboundedSender<PortEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Arc<Self>, UnboundedReceiver<PortEvent>) {
        let (events, rx) = unbounded_channel();
        (Arc::new(Self { events }), rx)
    }
}

impl SerialPortObserver for ChannelObserver {
    fn serial_port_did_receive(&self, _port: &SerialPort, data: &[u8]) {
        if !data.is_empty() {
            let _ = self.events.send(PortEvent::Received(data.to_vec()));
        }
    }

    fn serial_port_did_fail(&self, _port: &SerialPort, error: &IoError) {
        let _ = self.events.send(PortEvent::Failed(error.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::IoDirection;
    use rustix::io::Errno;

    #[test]
    fn test_channel_observer_forwards_data_and_skips_empty_reads() {
        let (observer, mut rx) = ChannelObserver::new();
        let port = SerialPort::new("/dev/ttyMOCK0");

        observer.serial_port_did_receive(&port, b"");
        observer.serial_port_did_receive(&port, b"ping");

        match rx.try_recv().unwrap() {
            PortEvent::Received(bytes) => assert_eq!(bytes, b"ping"),
            other => panic!("Expected data, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_observer_forwards_failures() {
        let (observer, mut rx) = ChannelObserver::new();
        let port = SerialPort::new("/dev/ttyMOCK0");
        let error = IoError::write(io::Error::from(Errno::IO), 12);

        observer.serial_port_did_fail(&port, &error);

        match rx.try_recv().unwrap() {
            PortEvent::Failed(e) => {
                assert_eq!(e.direction, IoDirection::Write);
                assert_eq!(e.discarded, 12);
            }
            other => panic!("Expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_default_failure_hook_is_a_no_op() {
        struct DataOnly;
        impl SerialPortObserver for DataOnly {
            fn serial_port_did_receive(&self, _port: &SerialPort, _data: &[u8]) {}
        }

        let port = SerialPort::new("/dev/ttyMOCK0");
        let error = IoError::read(io::Error::from(Errno::IO));
        DataOnly.serial_port_did_fail(&port, &error);
    }
}
