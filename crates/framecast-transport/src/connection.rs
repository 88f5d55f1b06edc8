use std::io::{ErrorKind, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::endpoint;
use crate::error::{Result, TransportError};
use crate::event::{CloseReason, ConnectionEvent, ConnectionState};
use crate::reactor;
use crate::traits::ChunkWriter;

/// Callback invoked on the reactor thread for every [`ConnectionEvent`].
pub type EventHandler = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Callback run when [`Connection::close`] itself closes the connection.
pub type CloseHook = Arc<dyn Fn() + Send + Sync>;

/// A client session to a local stream-socket endpoint.
///
/// `attempt_open` is cheap and idempotent so callers can poll it on a timer
/// until the consumer has bound the socket. Once open, a background reactor
/// thread watches the socket and pushes [`ConnectionEvent`]s to the handlers
/// registered with [`Connection::on_event`]. A closed connection is never
/// reused; construct a new one to try again.
pub struct Connection {
    path: PathBuf,
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    state: Mutex<ConnectionState>,
    close_requested: AtomicBool,
    outbound: Mutex<Option<UnixStream>>,
    /// Set after every write attempt; the reactor polls for writability only
    /// while this is set.
    write_interest: AtomicBool,
    write_error: Mutex<Option<std::io::Error>>,
    waker: Mutex<Option<UnixStream>>,
    reactor: Mutex<Option<JoinHandle<()>>>,
    handlers: Mutex<Vec<EventHandler>>,
    close_hooks: Mutex<Vec<CloseHook>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Connection {
    /// Create an unopened connection targeting `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Unopened),
                close_requested: AtomicBool::new(false),
                outbound: Mutex::new(None),
                write_interest: AtomicBool::new(false),
                write_error: Mutex::new(None),
                waker: Mutex::new(None),
                reactor: Mutex::new(None),
                handlers: Mutex::new(Vec::new()),
                close_hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Endpoint path this connection targets.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *lock(&self.shared.state)
    }

    /// Register an event handler.
    ///
    /// Handlers run on the reactor thread and must not block; hand work off
    /// to another thread instead.
    pub fn on_event<F>(&self, handler: F)
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        lock(&self.shared.handlers).push(Arc::new(handler));
    }

    /// Register a hook for a locally requested close.
    ///
    /// Runs once, inside the [`close`](Self::close) call that moved the
    /// connection to `Closed`. A close observed by the reactor is reported
    /// through [`ConnectionEvent::Closed`] instead, so exactly one of the two
    /// fires per connection.
    pub fn on_local_close<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        lock(&self.shared.close_hooks).push(Arc::new(hook));
    }

    /// Try to open the connection, returning `true` once it is open.
    ///
    /// Designed to be called repeatedly on a fixed interval. A missing
    /// endpoint fails fast without touching any state.
    pub fn attempt_open(&self) -> bool {
        match self.try_open() {
            Ok(()) => true,
            Err(err) if err.is_retryable() => {
                debug!(path = ?self.path, %err, "connection attempt failed");
                false
            }
            Err(err) => {
                warn!(path = ?self.path, %err, "connection attempt failed");
                false
            }
        }
    }

    /// Like [`attempt_open`](Self::attempt_open) but reports why it failed.
    pub fn try_open(&self) -> Result<()> {
        let mut state = lock(&self.shared.state);
        match *state {
            ConnectionState::Closed => return Err(TransportError::Closed),
            ConnectionState::Open => return Ok(()),
            ConnectionState::Unopened | ConnectionState::Connecting => {}
        }

        endpoint::ensure_present(&self.path)?;
        *state = ConnectionState::Connecting;

        let stream = endpoint::connect_endpoint(&self.path)?;
        stream.set_nonblocking(true)?;
        let inbound = stream.try_clone()?;
        let (wake_tx, wake_rx) = UnixStream::pair()?;
        wake_tx.set_nonblocking(true)?;
        wake_rx.set_nonblocking(true)?;

        *lock(&self.shared.outbound) = Some(stream);
        *lock(&self.shared.waker) = Some(wake_tx);
        // The first writability report doubles as the initial space-available.
        self.shared.write_interest.store(true, Ordering::Release);

        // The state lock stays held until the reactor handle is stored, so a
        // concurrent close() always finds the handle and joins it.
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("framecast-reactor".to_string())
            .spawn(move || reactor::run(shared, inbound, wake_rx));
        match spawned {
            Ok(handle) => {
                *lock(&self.shared.reactor) = Some(handle);
                *state = ConnectionState::Open;
                drop(state);
                info!(path = ?self.path, "connection open");
                Ok(())
            }
            Err(err) => {
                self.shared.close_requested.store(true, Ordering::Release);
                *state = ConnectionState::Closed;
                drop(state);
                self.shared.release_streams();
                lock(&self.shared.waker).take();
                Err(TransportError::Io(err))
            }
        }
    }

    /// True while the connection is open and no close has been requested.
    pub fn is_ready(&self) -> bool {
        !self.shared.close_requested.load(Ordering::Acquire)
            && *lock(&self.shared.state) == ConnectionState::Open
    }

    /// Write at most `chunk.len()` bytes without blocking.
    ///
    /// Returns 0 when the socket buffer is full or the connection is not open.
    /// Hard I/O errors are reported through a `Closed` event, not here.
    pub fn write_chunk(&self, chunk: &[u8]) -> usize {
        if chunk.is_empty() || !self.is_ready() {
            return 0;
        }

        let written = {
            let mut outbound = lock(&self.shared.outbound);
            let Some(stream) = outbound.as_mut() else {
                return 0;
            };
            loop {
                match stream.write(chunk) {
                    Ok(n) => break n,
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) if err.kind() == ErrorKind::WouldBlock => break 0,
                    Err(err) => {
                        debug!(path = ?self.path, %err, "write failed");
                        *lock(&self.shared.write_error) = Some(err);
                        break 0;
                    }
                }
            }
        };

        self.shared.write_interest.store(true, Ordering::Release);
        self.shared.wake();
        written
    }

    /// Close the connection. Safe to call repeatedly and from any thread.
    ///
    /// Stops the reactor before returning, so no handler runs afterwards
    /// (unless called from a handler, in which case the current callback is
    /// the last one). Emits no event; hooks registered with
    /// [`on_local_close`](Self::on_local_close) run instead.
    pub fn close(&self) {
        let first = self.shared.mark_closed();
        self.shared.wake();

        let reactor = lock(&self.shared.reactor).take();
        if let Some(handle) = reactor {
            if handle.thread().id() == thread::current().id() {
                debug!("close requested from reactor thread");
            } else if handle.join().is_err() {
                warn!(path = ?self.path, "reactor thread panicked");
            }
        }

        self.shared.release_streams();
        lock(&self.shared.waker).take();

        if first {
            info!(path = ?self.path, "connection closed");
            let hooks = lock(&self.shared.close_hooks).clone();
            for hook in hooks {
                hook();
            }
        }
    }
}

impl ChunkWriter for Connection {
    fn is_ready(&self) -> bool {
        Connection::is_ready(self)
    }

    fn write_chunk(&self, chunk: &[u8]) -> usize {
        Connection::write_chunk(self, chunk)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}

impl Shared {
    pub(crate) fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::Acquire)
    }

    /// Clear the writability interest, returning whether it was set.
    pub(crate) fn take_write_interest(&self) -> bool {
        self.write_interest.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn wants_write(&self) -> bool {
        self.write_interest.load(Ordering::Acquire)
    }

    pub(crate) fn take_write_error(&self) -> Option<std::io::Error> {
        lock(&self.write_error).take()
    }

    /// Move to `Closed`. Returns true for the caller that made the transition.
    pub(crate) fn mark_closed(&self) -> bool {
        self.close_requested.store(true, Ordering::Release);
        let mut state = lock(&self.state);
        if *state == ConnectionState::Closed {
            return false;
        }
        *state = ConnectionState::Closed;
        true
    }

    pub(crate) fn release_streams(&self) {
        if let Some(stream) = lock(&self.outbound).take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Reactor-side termination: close and notify exactly once.
    pub(crate) fn finish(&self, reason: CloseReason) {
        if !self.mark_closed() {
            return;
        }
        self.release_streams();
        match &reason {
            CloseReason::PeerClosed => info!("peer closed connection"),
            CloseReason::Error(err) => warn!(error = %err, "connection stream error"),
        }
        self.emit(&ConnectionEvent::Closed(reason));
    }

    pub(crate) fn wake(&self) {
        if let Some(waker) = lock(&self.waker).as_mut() {
            // A full wake buffer already guarantees a pending wakeup.
            let _ = waker.write(&[1]);
        }
    }

    pub(crate) fn emit(&self, event: &ConnectionEvent) {
        let handlers = lock(&self.handlers).clone();
        for handler in handlers {
            handler(event);
        }
    }
}
