//! Freshest-frame-wins chunked uploader.
//!
//! At most one encoded message is in flight. A frame offered while another is
//! still draining is dropped rather than queued, so the consumer always gets
//! the most recent image the transport could take. The in-flight message is
//! owned by a single worker thread; every drain step for it runs there, which
//! keeps cursor updates and chunk writes strictly ordered.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use framecast_frame::{encode_message, FrameInfo};
use framecast_transport::ChunkWriter;
use tracing::{debug, trace};

use crate::error::{Result, UploadError};

/// Upper bound on the bytes handed to the transport in one drain step.
pub const CHUNK_SIZE: usize = 10 * 1024;

/// Uploader configuration.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Maximum bytes per write attempt. Zero is treated as [`CHUNK_SIZE`].
    pub chunk_size: usize,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
        }
    }
}

/// Result of one drain step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DrainOutcome {
    /// Bytes were accepted and more remain.
    Progress(usize),
    /// The transport accepted nothing; wait for the next space signal.
    Stalled,
    /// The last byte was accepted.
    Complete,
}

/// The in-flight message and the offset of its first unsent byte.
#[derive(Debug)]
pub(crate) struct PendingMessage {
    payload: Bytes,
    cursor: usize,
}

impl PendingMessage {
    pub(crate) fn new(payload: Bytes) -> Self {
        Self { payload, cursor: 0 }
    }

    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn remaining(&self) -> usize {
        self.payload.len() - self.cursor
    }

    /// Offer the next slice to `writer` and advance by what it accepted.
    ///
    /// Slices never cross a `chunk_size` boundary of the message, so a short
    /// write is topped up to the boundary before the next full chunk goes out.
    /// A 1500-byte message with a 1024 chunk size whose first write takes 500
    /// goes out as [500, 524, 476], not as [500, 1000] the way a plain
    /// `min(remaining, chunk_size)` slice would.
    pub(crate) fn drain_step<W>(&mut self, writer: &W, chunk_size: usize) -> DrainOutcome
    where
        W: ChunkWriter + ?Sized,
    {
        if self.remaining() == 0 {
            return DrainOutcome::Complete;
        }
        let window = chunk_size - self.cursor % chunk_size;
        let end = self.cursor + window.min(self.remaining());

        let written = writer.write_chunk(&self.payload[self.cursor..end]);
        if written == 0 {
            return DrainOutcome::Stalled;
        }
        let written = written.min(end - self.cursor);
        self.cursor += written;

        if self.remaining() == 0 {
            DrainOutcome::Complete
        } else {
            DrainOutcome::Progress(written)
        }
    }
}

/// Counters describing what happened to submitted frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploaderStats {
    /// Frames encoded and installed as the in-flight message.
    pub accepted: u64,
    /// Frames dropped because a message was still in flight.
    pub dropped_busy: u64,
    /// Frames dropped because the transport was not open.
    pub dropped_not_ready: u64,
    /// Frames dropped because they could not be encoded.
    pub dropped_encode: u64,
    /// Messages whose last byte reached the transport.
    pub completed: u64,
    /// Messages discarded part-way because the transport went away.
    pub abandoned: u64,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    dropped_busy: AtomicU64,
    dropped_not_ready: AtomicU64,
    dropped_encode: AtomicU64,
    completed: AtomicU64,
    abandoned: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> UploaderStats {
        UploaderStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped_busy: self.dropped_busy.load(Ordering::Relaxed),
            dropped_not_ready: self.dropped_not_ready.load(Ordering::Relaxed),
            dropped_encode: self.dropped_encode.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
struct UploaderShared {
    /// Set from a successful `submit` until the message completes or is abandoned.
    in_flight: AtomicBool,
    counters: Counters,
}

enum Job {
    Install(Bytes),
    Drain,
    Abandon,
    Shutdown,
}

/// Cloneable handle for feeding transport signals to an [`Uploader`].
///
/// Safe to call from the transport's event callbacks: both methods only
/// enqueue work for the uploader's worker thread.
#[derive(Debug, Clone)]
pub struct UploaderHandle {
    jobs: Sender<Job>,
}

impl UploaderHandle {
    /// The transport can take more bytes.
    pub fn space_available(&self) {
        let _ = self.jobs.send(Job::Drain);
    }

    /// The transport went away; drop any partially sent message.
    pub fn abandon(&self) {
        let _ = self.jobs.send(Job::Abandon);
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::Install(message) => write!(f, "Install({} bytes)", message.len()),
            Job::Drain => f.write_str("Drain"),
            Job::Abandon => f.write_str("Abandon"),
            Job::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Single-slot, drop-when-busy frame uploader over a [`ChunkWriter`].
pub struct Uploader<W: ChunkWriter> {
    writer: Arc<W>,
    shared: Arc<UploaderShared>,
    handle: UploaderHandle,
    worker: Option<JoinHandle<()>>,
}

impl<W: ChunkWriter> Uploader<W> {
    /// Create an uploader with default configuration.
    pub fn new(writer: Arc<W>) -> Result<Self> {
        Self::with_config(writer, UploaderConfig::default())
    }

    /// Create an uploader and start its worker thread.
    pub fn with_config(writer: Arc<W>, config: UploaderConfig) -> Result<Self> {
        let chunk_size = if config.chunk_size == 0 {
            CHUNK_SIZE
        } else {
            config.chunk_size
        };
        let shared = Arc::new(UploaderShared::default());
        let (jobs, queue) = mpsc::channel();

        let worker = {
            let writer = Arc::clone(&writer);
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("framecast-uploader".to_string())
                .spawn(move || run_worker(writer, shared, queue, chunk_size))
                .map_err(|source| UploadError::Spawn {
                    name: "uploader",
                    source,
                })?
        };

        Ok(Self {
            writer,
            shared,
            handle: UploaderHandle { jobs },
            worker: Some(worker),
        })
    }

    /// Offer a frame for sending.
    ///
    /// Returns `true` if the frame became the in-flight message. Returns
    /// `false`, dropping the frame, when the transport is not open, another
    /// message is still in flight, or the frame cannot be encoded. Never
    /// blocks on I/O.
    pub fn submit(&self, payload: &[u8], info: FrameInfo) -> bool {
        let counters = &self.shared.counters;
        if !self.writer.is_ready() {
            Counters::bump(&counters.dropped_not_ready);
            trace!("dropping frame: transport not open");
            return false;
        }
        if self
            .shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            Counters::bump(&counters.dropped_busy);
            trace!("dropping frame: previous frame still in flight");
            return false;
        }

        let message = match encode_message(info, payload) {
            Ok(message) => message,
            Err(err) => {
                self.shared.in_flight.store(false, Ordering::Release);
                Counters::bump(&counters.dropped_encode);
                debug!(%err, "dropping frame: encode failed");
                return false;
            }
        };

        let len = message.len();
        if self.handle.jobs.send(Job::Install(message)).is_err() {
            self.shared.in_flight.store(false, Ordering::Release);
            return false;
        }
        Counters::bump(&counters.accepted);
        trace!(bytes = len, "frame accepted");
        true
    }

    /// Signal that the transport can take more bytes.
    pub fn space_available(&self) {
        self.handle.space_available();
    }

    /// Drop any partially sent message.
    pub fn abandon(&self) {
        self.handle.abandon();
    }

    /// A handle that can be moved into transport event callbacks.
    pub fn handle(&self) -> UploaderHandle {
        self.handle.clone()
    }

    /// Whether a message is in flight.
    pub fn is_busy(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Snapshot of the uploader counters.
    pub fn stats(&self) -> UploaderStats {
        self.shared.counters.snapshot()
    }

    /// The transport this uploader writes to.
    pub fn writer(&self) -> &Arc<W> {
        &self.writer
    }
}

#[cfg(unix)]
impl Uploader<framecast_transport::Connection> {
    /// Create an uploader whose drains are driven by `connection`'s events.
    ///
    /// Space-available signals trigger a drain step. Closure abandons the
    /// in-flight message, whether the reactor saw it or
    /// [`Connection::close`](framecast_transport::Connection::close) did it.
    pub fn attach(
        connection: Arc<framecast_transport::Connection>,
        config: UploaderConfig,
    ) -> Result<Self> {
        use framecast_transport::ConnectionEvent;

        let uploader = Self::with_config(Arc::clone(&connection), config)?;
        let handle = uploader.handle();
        connection.on_event(move |event| match event {
            ConnectionEvent::SpaceAvailable => handle.space_available(),
            ConnectionEvent::Closed(_) => handle.abandon(),
            ConnectionEvent::OpenCompleted => {}
        });
        let local = uploader.handle();
        connection.on_local_close(move || local.abandon());
        Ok(uploader)
    }
}

impl<W: ChunkWriter> Drop for Uploader<W> {
    fn drop(&mut self) {
        let _ = self.handle.jobs.send(Job::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl<W: ChunkWriter> std::fmt::Debug for Uploader<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("busy", &self.is_busy())
            .field("stats", &self.stats())
            .finish()
    }
}

fn run_worker<W: ChunkWriter>(
    writer: Arc<W>,
    shared: Arc<UploaderShared>,
    queue: Receiver<Job>,
    chunk_size: usize,
) {
    let mut pending: Option<PendingMessage> = None;
    for job in queue {
        match job {
            Job::Install(message) => {
                pending = Some(PendingMessage::new(message));
            }
            Job::Drain => {}
            Job::Abandon => {
                abandon(&mut pending, &shared);
                continue;
            }
            Job::Shutdown => break,
        }
        drain(&mut pending, &*writer, &shared, chunk_size);
    }
    trace!("uploader worker stopped");
}

fn drain<W: ChunkWriter + ?Sized>(
    pending: &mut Option<PendingMessage>,
    writer: &W,
    shared: &UploaderShared,
    chunk_size: usize,
) {
    let Some(message) = pending.as_mut() else {
        return;
    };
    if !writer.is_ready() {
        abandon(pending, shared);
        return;
    }

    match message.drain_step(writer, chunk_size) {
        DrainOutcome::Complete => {
            *pending = None;
            Counters::bump(&shared.counters.completed);
            shared.in_flight.store(false, Ordering::Release);
            trace!("frame sent");
        }
        DrainOutcome::Progress(written) => {
            trace!(
                written,
                sent = message.cursor(),
                remaining = message.remaining(),
                "partial write"
            );
        }
        DrainOutcome::Stalled => trace!("transport full, waiting for space"),
    }
}

/// Clears the in-flight flag only when a message was actually dropped, so an
/// install still queued behind the abandon keeps its claim.
fn abandon(pending: &mut Option<PendingMessage>, shared: &UploaderShared) {
    if let Some(message) = pending.take() {
        Counters::bump(&shared.counters.abandoned);
        shared.in_flight.store(false, Ordering::Release);
        debug!(
            sent = message.cursor(),
            remaining = message.remaining(),
            "abandoned in-flight frame"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use bytes::BytesMut;
    use framecast_frame::{decode_frame, FrameConfig};

    use super::*;

    /// Writer whose per-call acceptance is scripted; unscripted calls use
    /// `default_accept` (None = take everything offered).
    #[derive(Default)]
    struct ScriptedWriter {
        ready: AtomicBool,
        script: Mutex<VecDeque<usize>>,
        default_accept: Mutex<Option<usize>>,
        requests: Mutex<Vec<usize>>,
        accepted: Mutex<Vec<usize>>,
        written: Mutex<Vec<u8>>,
    }

    impl ScriptedWriter {
        fn open() -> Arc<Self> {
            let writer = Self::default();
            writer.ready.store(true, Ordering::SeqCst);
            Arc::new(writer)
        }

        fn with_script(script: &[usize]) -> Arc<Self> {
            let writer = Self::open();
            writer.script.lock().unwrap().extend(script.iter().copied());
            writer
        }

        fn stalled() -> Arc<Self> {
            let writer = Self::open();
            *writer.default_accept.lock().unwrap() = Some(0);
            writer
        }

        fn unblock(&self) {
            *self.default_accept.lock().unwrap() = None;
        }

        fn requests(&self) -> Vec<usize> {
            self.requests.lock().unwrap().clone()
        }

        fn accepted(&self) -> Vec<usize> {
            self.accepted.lock().unwrap().clone()
        }

        fn written(&self) -> Vec<u8> {
            self.written.lock().unwrap().clone()
        }
    }

    impl ChunkWriter for ScriptedWriter {
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        fn write_chunk(&self, chunk: &[u8]) -> usize {
            self.requests.lock().unwrap().push(chunk.len());
            let limit = match self.script.lock().unwrap().pop_front() {
                Some(limit) => Some(limit),
                None => *self.default_accept.lock().unwrap(),
            };
            let n = limit.map_or(chunk.len(), |limit| limit.min(chunk.len()));
            if n > 0 {
                self.accepted.lock().unwrap().push(n);
                self.written.lock().unwrap().extend_from_slice(&chunk[..n]);
            }
            n
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    /// Keep signalling space until the uploader goes idle.
    fn pump<W: ChunkWriter>(uploader: &Uploader<W>) {
        assert!(wait_until(|| {
            uploader.space_available();
            !uploader.is_busy()
        }));
    }

    fn info() -> FrameInfo {
        FrameInfo::new(640, 480, 1)
    }

    #[test]
    fn drain_splits_at_chunk_size() {
        let writer = ScriptedWriter::open();
        let mut message = PendingMessage::new(Bytes::from(vec![7u8; 1500]));

        assert_eq!(
            message.drain_step(&*writer, 1024),
            DrainOutcome::Progress(1024)
        );
        assert_eq!(message.drain_step(&*writer, 1024), DrainOutcome::Complete);
        assert_eq!(writer.accepted(), vec![1024, 476]);
    }

    #[test]
    fn short_write_is_topped_up_to_chunk_boundary() {
        let writer = ScriptedWriter::with_script(&[500]);
        let mut message = PendingMessage::new(Bytes::from(vec![1u8; 1500]));

        assert_eq!(
            message.drain_step(&*writer, 1024),
            DrainOutcome::Progress(500)
        );
        assert_eq!(
            message.drain_step(&*writer, 1024),
            DrainOutcome::Progress(524)
        );
        assert_eq!(message.drain_step(&*writer, 1024), DrainOutcome::Complete);
        assert_eq!(writer.accepted(), vec![500, 524, 476]);
        assert_eq!(message.cursor(), 1500);
    }

    #[test]
    fn stalled_write_leaves_cursor_in_place() {
        let writer = ScriptedWriter::with_script(&[0]);
        let mut message = PendingMessage::new(Bytes::from_static(b"abcdef"));

        assert_eq!(message.drain_step(&*writer, 4), DrainOutcome::Stalled);
        assert_eq!(message.cursor(), 0);
        assert_eq!(message.drain_step(&*writer, 4), DrainOutcome::Progress(4));
        assert_eq!(message.drain_step(&*writer, 4), DrainOutcome::Complete);
        assert_eq!(writer.written(), b"abcdef");
    }

    #[test]
    fn overreporting_writer_cannot_push_cursor_past_slice() {
        struct Liar;
        impl ChunkWriter for Liar {
            fn is_ready(&self) -> bool {
                true
            }
            fn write_chunk(&self, chunk: &[u8]) -> usize {
                chunk.len() * 10
            }
        }

        let mut message = PendingMessage::new(Bytes::from(vec![0u8; 30]));
        assert_eq!(message.drain_step(&Liar, 16), DrainOutcome::Progress(16));
        assert_eq!(message.cursor(), 16);
        assert_eq!(message.drain_step(&Liar, 16), DrainOutcome::Complete);
    }

    #[test]
    fn sends_whole_message_in_bounded_chunks() {
        let writer = ScriptedWriter::open();
        let uploader = Uploader::new(Arc::clone(&writer)).unwrap();
        let payload = vec![0x5A; 3 * CHUNK_SIZE + 17];

        assert!(uploader.submit(&payload, info()));
        pump(&uploader);

        assert!(writer.requests().iter().all(|len| *len <= CHUNK_SIZE));
        let mut wire = BytesMut::from(writer.written().as_slice());
        let frame = decode_frame(&mut wire, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(frame.info(), info());
        assert_eq!(frame.payload.as_ref(), payload.as_slice());
        assert!(wire.is_empty());
        assert_eq!(uploader.stats().completed, 1);
    }

    #[test]
    fn drops_frames_while_busy() {
        let writer = ScriptedWriter::stalled();
        let uploader = Uploader::new(Arc::clone(&writer)).unwrap();

        assert!(uploader.submit(b"frame-a", info()));
        assert!(!uploader.submit(b"frame-b", info()));
        assert!(!uploader.submit(b"frame-c", info()));
        assert!(uploader.is_busy());

        writer.unblock();
        pump(&uploader);

        let mut wire = BytesMut::from(writer.written().as_slice());
        let frame = decode_frame(&mut wire, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(frame.payload.as_ref(), b"frame-a");
        assert!(wire.is_empty());

        let stats = uploader.stats();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.dropped_busy, 2);
        assert_eq!(stats.completed, 1);
    }

    #[test]
    fn accepts_again_once_idle() {
        let writer = ScriptedWriter::open();
        let uploader = Uploader::new(Arc::clone(&writer)).unwrap();

        assert!(uploader.submit(b"first", info()));
        pump(&uploader);
        assert!(uploader.submit(b"second", info()));
        pump(&uploader);

        let mut wire = BytesMut::from(writer.written().as_slice());
        let config = FrameConfig::default();
        let first = decode_frame(&mut wire, &config).unwrap().unwrap();
        let second = decode_frame(&mut wire, &config).unwrap().unwrap();
        assert_eq!(first.payload.as_ref(), b"first");
        assert_eq!(second.payload.as_ref(), b"second");
    }

    #[test]
    fn rejects_when_transport_not_ready() {
        let writer = Arc::new(ScriptedWriter::default());
        let uploader = Uploader::new(Arc::clone(&writer)).unwrap();

        assert!(!uploader.submit(b"frame", info()));
        assert!(!uploader.is_busy());
        assert_eq!(uploader.stats().dropped_not_ready, 1);
        assert!(writer.requests().is_empty());
    }

    #[test]
    fn rejects_empty_payload_without_claiming_slot() {
        let writer = ScriptedWriter::open();
        let uploader = Uploader::new(Arc::clone(&writer)).unwrap();

        assert!(!uploader.submit(b"", info()));
        assert!(!uploader.is_busy());
        assert_eq!(uploader.stats().dropped_encode, 1);
        assert!(uploader.submit(b"x", info()));
    }

    #[test]
    fn abandon_frees_the_slot() {
        let writer = ScriptedWriter::stalled();
        let uploader = Uploader::new(Arc::clone(&writer)).unwrap();

        assert!(uploader.submit(b"doomed", info()));
        uploader.abandon();
        assert!(wait_until(|| !uploader.is_busy()));
        assert_eq!(uploader.stats().abandoned, 1);
        assert!(uploader.submit(b"next", info()));
    }

    #[test]
    fn abandons_when_transport_drops_mid_message() {
        let writer = ScriptedWriter::with_script(&[100]);
        *writer.default_accept.lock().unwrap() = Some(0);
        let uploader = Uploader::new(Arc::clone(&writer)).unwrap();

        assert!(uploader.submit(&vec![3u8; 4096], info()));
        assert!(wait_until(|| writer.accepted() == vec![100]));

        writer.ready.store(false, Ordering::SeqCst);
        uploader.space_available();
        assert!(wait_until(|| !uploader.is_busy()));
        assert_eq!(uploader.stats().abandoned, 1);
        assert_eq!(uploader.stats().completed, 0);
    }

    #[test]
    fn at_most_one_message_in_flight_under_contention() {
        let writer = ScriptedWriter::stalled();
        let uploader = Arc::new(Uploader::new(Arc::clone(&writer)).unwrap());

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let uploader = Arc::clone(&uploader);
                thread::spawn(move || {
                    (0..50)
                        .filter(|_| uploader.submit(b"frame", info()))
                        .count()
                })
            })
            .collect();
        let accepted: usize = threads.into_iter().map(|t| t.join().unwrap()).sum();

        assert_eq!(accepted, 1);
        assert_eq!(uploader.stats().dropped_busy, 8 * 50 - 1);
    }

    #[test]
    fn drop_stops_worker() {
        let writer = ScriptedWriter::stalled();
        let uploader = Uploader::new(Arc::clone(&writer)).unwrap();
        assert!(uploader.submit(b"pending", info()));
        drop(uploader);
        assert_eq!(Arc::strong_count(&writer), 1);
    }
}
