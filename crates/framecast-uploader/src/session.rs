//! Capture session: the producer-side lifecycle around one connection.
//!
//! A session announces itself to the host, keeps retrying the connection on a
//! fixed interval until the consumer's socket shows up, samples incoming
//! frames, and ends exactly once with a recorded reason.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use framecast_frame::FrameInfo;
use framecast_transport::{
    check_path_len, CloseReason, Connection, ConnectionEvent, ConnectionState,
};
use tracing::{debug, info, warn};

use crate::error::{Result, UploadError};
use crate::notify::{LifecycleEvent, LifecycleNotifier};
use crate::uploader::{Uploader, UploaderConfig, UploaderStats};

/// Default delay between connection attempts.
pub const DEFAULT_CONNECT_INTERVAL: Duration = Duration::from_millis(100);

/// Default frame sampling stride (every third frame is offered).
pub const DEFAULT_FRAME_STRIDE: u64 = 3;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connect_interval: Duration,
    /// Stop retrying after this many failed attempts. `None` retries forever.
    pub max_connect_attempts: Option<u32>,
    /// Only every `frame_stride`-th frame is offered to the uploader.
    /// Zero and one both mean every frame.
    pub frame_stride: u64,
    pub uploader: UploaderConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_interval: DEFAULT_CONNECT_INTERVAL,
            max_connect_attempts: None,
            frame_stride: DEFAULT_FRAME_STRIDE,
            uploader: UploaderConfig::default(),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// The host asked the session to stop.
    AppStopped,
    /// The consumer closed its end of the socket.
    PeerClosed,
    /// The stream failed.
    StreamError(String),
}

impl EndReason {
    /// Whether the host should be told capture stopped without its asking.
    ///
    /// A consumer closing the socket counts as host-initiated.
    pub fn notifies_host(reason: Option<&EndReason>) -> bool {
        !matches!(reason, Some(EndReason::AppStopped | EndReason::PeerClosed))
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndReason::AppStopped => f.write_str("stopped by app"),
            EndReason::PeerClosed => f.write_str("closed by peer"),
            EndReason::StreamError(err) => write!(f, "stream error: {err}"),
        }
    }
}

type EndHook = Arc<dyn Fn(&EndReason) + Send + Sync>;

struct Connector {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

struct SessionInner {
    connection: Arc<Connection>,
    uploader: Uploader<Connection>,
    notifier: Arc<dyn LifecycleNotifier>,
    config: SessionConfig,
    frame_count: AtomicU64,
    started: AtomicBool,
    finished: AtomicBool,
    end_reason: Mutex<Option<EndReason>>,
    on_end: Mutex<Option<EndHook>>,
    connector: Mutex<Option<Connector>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionInner {
    /// Record the first observed end cause and hand it to the host once.
    fn record_end(&self, reason: EndReason) {
        {
            let mut slot = lock(&self.end_reason);
            if slot.is_some() || self.finished.load(Ordering::Acquire) {
                return;
            }
            *slot = Some(reason.clone());
        }
        info!(%reason, "capture session ending");
        let hook = lock(&self.on_end).clone();
        if let Some(hook) = hook {
            hook(&reason);
        }
    }

    fn stop_connector(&self) {
        let connector = lock(&self.connector).take();
        if let Some(Connector { stop, thread: handle }) = connector {
            drop(stop);
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

/// One capture session bound to a consumer socket path.
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a session and subscribe it to stop requests from the host.
    ///
    /// Nothing is published and no connection is attempted until
    /// [`start`](Self::start). A path too long to ever connect is rejected
    /// here.
    pub fn new(
        path: impl Into<PathBuf>,
        notifier: Arc<dyn LifecycleNotifier>,
        config: SessionConfig,
    ) -> Result<Self> {
        let path = path.into();
        check_path_len(&path)?;
        let connection = Arc::new(Connection::new(path));
        let uploader = Uploader::attach(Arc::clone(&connection), config.uploader.clone())?;

        let inner = Arc::new(SessionInner {
            connection,
            uploader,
            notifier,
            config,
            frame_count: AtomicU64::new(0),
            started: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            end_reason: Mutex::new(None),
            on_end: Mutex::new(None),
            connector: Mutex::new(None),
        });

        let weak: Weak<SessionInner> = Arc::downgrade(&inner);
        inner.connection.on_event(move |event| {
            let ConnectionEvent::Closed(reason) = event else {
                return;
            };
            if let Some(inner) = weak.upgrade() {
                let reason = match reason {
                    CloseReason::PeerClosed => EndReason::PeerClosed,
                    CloseReason::Error(err) => EndReason::StreamError(err.to_string()),
                };
                inner.record_end(reason);
            }
        });

        let weak = Arc::downgrade(&inner);
        inner.notifier.observe(
            LifecycleEvent::StopRequested,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    debug!("stop requested by host");
                    inner.record_end(EndReason::AppStopped);
                    inner.stop_connector();
                    inner.connection.close();
                }
            }),
        );

        Ok(Self { inner })
    }

    /// Register the callback that receives the end reason.
    ///
    /// Called at most once, from whichever thread observed the end: the
    /// connection's event thread or the notifier's delivery thread.
    pub fn on_end<F>(&self, hook: F)
    where
        F: Fn(&EndReason) + Send + Sync + 'static,
    {
        *lock(&self.inner.on_end) = Some(Arc::new(hook));
    }

    /// Announce the session and begin connecting.
    pub fn start(&self) -> Result<()> {
        if self.inner.finished.load(Ordering::Acquire) {
            return Err(UploadError::Finished);
        }
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(UploadError::AlreadyStarted);
        }

        self.inner.frame_count.store(0, Ordering::Relaxed);
        self.inner
            .notifier
            .publish(LifecycleEvent::ExtensionStarted);

        let (stop, stopped) = mpsc::channel::<()>();
        let connection = Arc::clone(&self.inner.connection);
        let interval = self.inner.config.connect_interval;
        let max_attempts = self.inner.config.max_connect_attempts;

        let thread = thread::Builder::new()
            .name("framecast-connect".to_string())
            .spawn(move || {
                let mut attempts: u32 = 0;
                loop {
                    attempts += 1;
                    if connection.attempt_open() {
                        info!(path = ?connection.path(), attempts, "connected to consumer");
                        return;
                    }
                    if max_attempts.is_some_and(|max| attempts >= max) {
                        warn!(path = ?connection.path(), attempts, "giving up on connecting");
                        return;
                    }
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => return,
                    }
                }
            })
            .map_err(|source| UploadError::Spawn {
                name: "connect",
                source,
            })?;

        *lock(&self.inner.connector) = Some(Connector { stop, thread });
        info!(path = ?self.inner.connection.path(), "capture session started");
        Ok(())
    }

    /// Count a captured frame and offer every `frame_stride`-th one for upload.
    ///
    /// Returns `true` if the frame was accepted for sending.
    pub fn process_frame(&self, payload: &[u8], info: FrameInfo) -> bool {
        let stride = self.inner.config.frame_stride.max(1);
        let count = self.inner.frame_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count % stride != 0 {
            return false;
        }
        self.submit(payload, info)
    }

    /// Offer a frame for upload, bypassing sampling.
    pub fn submit(&self, payload: &[u8], info: FrameInfo) -> bool {
        self.inner.uploader.submit(payload, info)
    }

    /// End the session.
    ///
    /// Publishes [`LifecycleEvent::CaptureStoppedExternally`] unless the host
    /// or the consumer initiated the end, then stops connecting and closes
    /// the connection. Returns the recorded end reason. Later calls do
    /// nothing and return `None`.
    pub fn finish(&self) -> Option<EndReason> {
        if self.inner.finished.swap(true, Ordering::AcqRel) {
            return None;
        }
        let reason = lock(&self.inner.end_reason).take();
        if EndReason::notifies_host(reason.as_ref()) {
            self.inner
                .notifier
                .publish(LifecycleEvent::CaptureStoppedExternally);
        }

        self.inner.stop_connector();
        self.inner.connection.close();
        info!(reason = ?reason, "capture session finished");
        reason
    }

    /// The end reason observed so far, if any.
    pub fn end_reason(&self) -> Option<EndReason> {
        lock(&self.inner.end_reason).clone()
    }

    /// Current state of the underlying connection.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Whether the connection is open and frames can be submitted.
    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_ready()
    }

    /// Whether a frame is still being sent.
    pub fn is_busy(&self) -> bool {
        self.inner.uploader.is_busy()
    }

    /// Counters of the session's uploader.
    pub fn stats(&self) -> UploaderStats {
        self.inner.uploader.stats()
    }

    /// Number of frames seen by [`process_frame`](Self::process_frame).
    pub fn frames_seen(&self) -> u64 {
        self.inner.frame_count.load(Ordering::Relaxed)
    }

    /// Socket path of the consumer endpoint.
    pub fn path(&self) -> &std::path::Path {
        self.inner.connection.path()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.stop_connector();
        self.inner.connection.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.path())
            .field("state", &self.connection_state())
            .field("frames_seen", &self.frames_seen())
            .finish()
    }
}
