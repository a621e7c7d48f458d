//! Readiness reactor.
//!
//! A [`Reactor`] owns one background thread that waits in `poll(2)` on the
//! descriptors registered with it and invokes their callbacks when the kernel
//! reports readiness. Every callback of one reactor runs on that thread, so
//! callbacks never run concurrently with each other.
//!
//! Each registration hands back a [`Watch`]. A watch can be suspended (its
//! descriptor is left out of the poll set), resumed, or cancelled for good.
//! The reactor is woken through a self-pipe whenever the set of active
//! watches changes, so a resume from any thread takes effect immediately.

use parking_lot::Mutex;
use rustix::event::{poll, PollFd, PollFlags};
use rustix::fs::{fcntl_getfl, fcntl_setfl, OFlags};
use rustix::io::{fcntl_setfd, Errno, FdFlags};
use std::fmt;
use std::io;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, trace, warn};

/// The readiness a watch is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}

impl Interest {
    fn poll_flags(self) -> PollFlags {
        match self {
            Interest::Readable => PollFlags::IN,
            Interest::Writable => PollFlags::OUT,
        }
    }
}

/// Extra conditions the kernel reported alongside readiness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// The peer hung up (`POLLHUP`).
    pub hang_up: bool,
    /// An error condition is pending on the descriptor (`POLLERR`).
    pub error: bool,
}

impl Readiness {
    fn from_revents(revents: PollFlags) -> Self {
        Self {
            hang_up: revents.contains(PollFlags::HUP),
            error: revents.contains(PollFlags::ERR),
        }
    }
}

/// Callback invoked on the reactor thread with the watch that fired.
pub type Callback = Box<dyn FnMut(&Watch, Readiness) + Send>;

/// A descriptor the reactor can poll, shared with whoever does the I/O.
pub type Source = Arc<dyn AsFd + Send + Sync>;

/// Self-pipe used to interrupt `poll`.
#[derive(Debug)]
struct Waker {
    read: OwnedFd,
    write: OwnedFd,
}

impl Waker {
    fn new() -> io::Result<Self> {
        let (read, write) = rustix::pipe::pipe()?;
        set_nonblocking_cloexec(&read)?;
        set_nonblocking_cloexec(&write)?;
        Ok(Self { read, write })
    }

    fn wake(&self) {
        // A full pipe already guarantees a pending wake-up, so EAGAIN is fine.
        let _ = rustix::io::write(&self.write, &[1u8]);
    }

    fn drain(&self) {
        let mut buf = [0u8; 64];
        while let Ok(n) = rustix::io::read(&self.read, &mut buf[..]) {
            if n < buf.len() {
                break;
            }
        }
    }
}

fn set_nonblocking_cloexec<Fd: AsFd>(fd: Fd) -> io::Result<()> {
    let flags = fcntl_getfl(&fd)?;
    fcntl_setfl(&fd, flags | OFlags::NONBLOCK)?;
    fcntl_setfd(&fd, FdFlags::CLOEXEC)?;
    Ok(())
}

#[derive(Debug, Default)]
struct WatchState {
    active: AtomicBool,
    cancelled: AtomicBool,
}

/// Token controlling one registration.
///
/// Clones share state: suspending one clone suspends them all.
#[derive(Clone)]
pub struct Watch {
    state: Arc<WatchState>,
    waker: Option<Arc<Waker>>,
}

impl Watch {
    fn new(active: bool, waker: Arc<Waker>) -> Self {
        let state = WatchState::default();
        state.active.store(active, Ordering::Release);
        Self {
            state: Arc::new(state),
            waker: Some(waker),
        }
    }

    /// A watch not bound to any reactor, starting suspended.
    ///
    /// Lets buffer and reader logic be driven by hand, e.g. in tests.
    pub fn detached() -> Self {
        Self {
            state: Arc::new(WatchState::default()),
            waker: None,
        }
    }

    /// Put the watch back into the poll set.
    pub fn resume(&self) {
        if self.is_cancelled() {
            return;
        }
        if !self.state.active.swap(true, Ordering::AcqRel) {
            if let Some(waker) = &self.waker {
                waker.wake();
            }
        }
    }

    /// Leave the watch out of the poll set until resumed.
    pub fn suspend(&self) {
        self.state.active.store(false, Ordering::Release);
    }

    /// Remove the registration. A cancelled watch never fires again.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.active.store(false, Ordering::Release);
        if let Some(waker) = &self.waker {
            waker.wake();
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("active", &self.is_active())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct Registration {
    source: Source,
    interest: Interest,
    watch: Watch,
    callback: Mutex<Callback>,
}

struct Shared {
    registrations: Mutex<Vec<Arc<Registration>>>,
    waker: Arc<Waker>,
    shutdown: AtomicBool,
}

/// Handle to a running reactor thread. Dropping it stops the thread.
pub struct Reactor {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
    name: String,
}

impl Reactor {
    /// Spawn a reactor thread with the given name.
    pub fn start(name: impl Into<String>) -> io::Result<Self> {
        let name = name.into();
        let shared = Arc::new(Shared {
            registrations: Mutex::new(Vec::new()),
            waker: Arc::new(Waker::new()?),
            shutdown: AtomicBool::new(false),
        });

        let loop_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run(&loop_shared))?;
        let thread_id = thread.thread().id();
        debug!(reactor = %name, "reactor started");

        Ok(Self {
            shared,
            thread: Some(thread),
            thread_id,
            name,
        })
    }

    /// Watch `source` for readability. The watch starts active.
    pub fn register_readable<F>(&self, source: Source, callback: F) -> Watch
    where
        F: FnMut(&Watch, Readiness) + Send + 'static,
    {
        self.register(source, Interest::Readable, true, Box::new(callback))
    }

    /// Watch `source` for writability. The watch starts suspended.
    pub fn register_writable<F>(&self, source: Source, callback: F) -> Watch
    where
        F: FnMut(&Watch, Readiness) + Send + 'static,
    {
        self.register(source, Interest::Writable, false, Box::new(callback))
    }

    fn register(
        &self,
        source: Source,
        interest: Interest,
        active: bool,
        callback: Callback,
    ) -> Watch {
        let fd = source.as_fd().as_raw_fd();
        let watch = Watch::new(active, Arc::clone(&self.shared.waker));
        self.shared.registrations.lock().push(Arc::new(Registration {
            source,
            interest,
            watch: watch.clone(),
            callback: Mutex::new(callback),
        }));
        self.shared.waker.wake();
        trace!(reactor = %self.name, fd, ?interest, active, "registered watch");
        watch
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// When called from the reactor thread itself the loop is only told to
    /// stop; it exits once the current callback returns.
    pub fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.waker.wake();

        if thread::current().id() == self.thread_id {
            return;
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(reactor = %self.name, "reactor thread panicked");
            }
            debug!(reactor = %self.name, "reactor stopped");
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("name", &self.name)
            .field("registrations", &self.shared.registrations.lock().len())
            .finish()
    }
}

fn run(shared: &Shared) {
    while !shared.shutdown.load(Ordering::Acquire) {
        let ready: Vec<Arc<Registration>> = {
            let mut registrations = shared.registrations.lock();
            registrations.retain(|r| !r.watch.is_cancelled());
            registrations
                .iter()
                .filter(|r| r.watch.is_active())
                .cloned()
                .collect()
        };

        let mut fds = Vec::with_capacity(ready.len() + 1);
        fds.push(PollFd::new(&shared.waker.read, PollFlags::IN));
        fds.extend(
            ready
                .iter()
                .map(|r| PollFd::from_borrowed_fd(r.source.as_fd(), r.interest.poll_flags())),
        );

        match poll(&mut fds, None) {
            Ok(_) => {}
            Err(Errno::INTR) => continue,
            Err(err) => {
                warn!(error = %err, "poll failed, stopping reactor");
                break;
            }
        }
        let revents: Vec<PollFlags> = fds.iter().map(PollFd::revents).collect();
        drop(fds);

        if !revents[0].is_empty() {
            shared.waker.drain();
        }

        for (registration, &events) in ready.iter().zip(&revents[1..]) {
            if events.is_empty() {
                continue;
            }
            // Cancellation or a suspend from an earlier callback wins.
            if shared.shutdown.load(Ordering::Acquire) || !registration.watch.is_active() {
                continue;
            }
            if events.contains(PollFlags::NVAL) {
                let fd = registration.source.as_fd().as_raw_fd();
                warn!(fd, "descriptor no longer valid, suspending watch");
                registration.watch.suspend();
                continue;
            }
            let readiness = Readiness::from_revents(events);
            let mut callback = registration.callback.lock();
            (*callback)(&registration.watch, readiness);
        }
    }

    // Drop callbacks (and whatever they captured) on the way out.
    shared.registrations.lock().clear();
}
