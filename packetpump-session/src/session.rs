//! Capture session state machine
//!
//! A [`Session`] owns at most one open capture handle plus its dump sink and
//! readiness registration, borrows the caller's fixed output regions for the
//! Open → Close span, and drives the pump cycle that moves frames from the
//! handle into those regions and the host callback.
//!
//! All session-state mutation and every callback invocation happen on the
//! host's logical execution context. The only true concurrency is the OS
//! readiness signal, which the bridge reduces to a payload-free wake before
//! it ever reaches this module. Teardown while a pump cycle is in flight is
//! deferred: `close()` marks the session `Closing` and the cycle performs the
//! release when its loop exits, so the handle is never freed while the
//! capture library is dispatching against it.

use std::path::Path;
use std::sync::Arc;

use packetpump_core::{Error, LinkType, Result, SocketStats};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::bridge::ReadinessBridge;
use crate::dump::DumpSink;
use crate::relay::FrameBuffers;
use crate::source::{CaptureSource, Dispatch, LiveOptions, PcapSource, Readiness};

/// Host callback invoked once per delivered frame, after the output regions
/// have been populated.
pub type PacketCallback = Box<dyn FnMut() + Send + 'static>;

/// Callback for non-fatal open-time warnings (netmask lookup failures).
pub type WarningHandler = Box<dyn FnMut(&str) + Send + 'static>;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, never opened
    Unopened,
    /// Handle open, readiness registered, pump armed
    Open,
    /// Close requested while a pump cycle was in flight; release pending
    Closing,
    /// Resources released; may be reopened
    Closed,
}

struct SessionInner {
    state: SessionState,
    /// True only while a pump cycle is actively dispatching. Written and read
    /// exclusively on the host context.
    in_flight: bool,
    /// Bumped on every release so a pump task from a previous open can never
    /// touch a newer handle.
    epoch: u64,
    source: Option<Box<dyn CaptureSource>>,
    dump: Option<DumpSink>,
    buffers: Option<FrameBuffers>,
    callback: Option<PacketCallback>,
    close_signal: Option<Arc<Notify>>,
}

impl SessionInner {
    /// Release handle, dump sink, borrowed buffers, and callback. Idempotent;
    /// the sole authoritative release point. Must never run while a dispatch
    /// call is executing (`in_flight` guards that by construction).
    fn release(&mut self) {
        // Dump sink closes strictly before the handle it is bound to.
        if let Some(mut dump) = self.dump.take() {
            dump.close();
        }
        if self.source.take().is_some() {
            debug!("capture handle released");
        }
        self.buffers = None;
        self.callback = None;
        self.state = SessionState::Closed;
        self.epoch = self.epoch.wrapping_add(1);

        // Wake the pump task so it observes the closed state and exits.
        if let Some(signal) = self.close_signal.take() {
            signal.notify_one();
        }
    }

    /// Dispatch at most one frame: dump sink first (full, untruncated), then
    /// the relay into the caller's regions.
    fn deliver_one(&mut self) -> Dispatch {
        let Self {
            source,
            dump,
            buffers,
            ..
        } = self;

        let (Some(source), Some(buffers)) = (source.as_mut(), buffers.as_ref()) else {
            return Dispatch::Exhausted;
        };

        source.dispatch_one(&mut |frame| {
            if let Some(dump) = dump.as_mut() {
                dump.write(frame);
            }
            buffers.store(frame);
        })
    }
}

/// Handle lifecycle engine for one capture session.
///
/// Clones are cheap and refer to the same session, which is how the packet
/// callback can call [`Session::close`] on the session that is delivering to
/// it. A session is reusable: after `close()` it may be opened again.
///
/// `open_live` and `open_offline` must be called from within a tokio runtime;
/// the pump runs as a task on that runtime.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create an unopened session.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                state: SessionState::Unopened,
                in_flight: false,
                epoch: 0,
                source: None,
                dump: None,
                buffers: None,
                callback: None,
                close_signal: None,
            })),
        }
    }

    /// Open a live capture on `device`.
    ///
    /// Returns the link-layer classification of the activated handle. A
    /// previously open handle is closed first. Open-time netmask lookup
    /// failures go to `warning_handler` (or a log warning when `None`) and do
    /// not fail the open; every other failure aborts with the capture
    /// library's diagnostic text.
    pub fn open_live<F>(
        &self,
        device: &str,
        options: LiveOptions,
        buffers: FrameBuffers,
        on_packet: F,
        warning_handler: Option<WarningHandler>,
    ) -> Result<LinkType>
    where
        F: FnMut() + Send + 'static,
    {
        if device.is_empty() {
            return Err(Error::invalid_argument("device must not be empty"));
        }
        if options.snapshot_length <= 0 {
            return Err(Error::invalid_argument(
                "snapshot length must be greater than zero",
            ));
        }
        if options.buffer_size <= 0 {
            return Err(Error::invalid_argument(
                "buffer size must be greater than zero",
            ));
        }

        let mut warn_handler: WarningHandler =
            warning_handler.unwrap_or_else(|| Box::new(|message: &str| warn!("{}", message)));

        let mut source = PcapSource::open_live(device, &options, warn_handler.as_mut())?;

        let dump = match &options.out_file {
            Some(path) => Some(source.open_dump(path)?),
            None => None,
        };

        let link = self.open_source(Box::new(source), dump, buffers, Box::new(on_packet))?;
        info!(device, %link, "live capture session opened");
        Ok(link)
    }

    /// Open an offline session replaying a capture file.
    ///
    /// Frames are pumped through the same state machine as a live session;
    /// when the file is exhausted the session closes itself.
    pub fn open_offline<F>(
        &self,
        path: impl AsRef<Path>,
        filter: &str,
        buffers: FrameBuffers,
        on_packet: F,
    ) -> Result<LinkType>
    where
        F: FnMut() + Send + 'static,
    {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::invalid_argument("capture file path must not be empty"));
        }

        let source = PcapSource::open_offline(path, filter)?;
        let link = self.open_source(Box::new(source), None, buffers, Box::new(on_packet))?;
        info!(path = %path.display(), %link, "offline capture session opened");
        Ok(link)
    }

    /// Install an already-opened capture source and arm the pump.
    ///
    /// This is the shared tail of both open paths and the seam for driving
    /// the session with a non-libpcap [`CaptureSource`] implementation.
    pub fn open_source(
        &self,
        source: Box<dyn CaptureSource>,
        dump: Option<DumpSink>,
        buffers: FrameBuffers,
        callback: PacketCallback,
    ) -> Result<LinkType> {
        self.install_with_pump(source, dump, buffers, callback, true)
    }

    pub(crate) fn install_with_pump(
        &self,
        source: Box<dyn CaptureSource>,
        dump: Option<DumpSink>,
        buffers: FrameBuffers,
        callback: PacketCallback,
        spawn_pump: bool,
    ) -> Result<LinkType> {
        let mut inner = self.inner.lock();

        if inner.in_flight {
            return Err(Error::invalid_argument(
                "cannot reopen a session while a pump cycle is delivering packets",
            ));
        }

        // A new open implicitly closes the previous handle first.
        if matches!(inner.state, SessionState::Open | SessionState::Closing) {
            debug!("closing previously open handle before reopen");
            inner.release();
        }

        let link = source.link_type();

        let bridge = if spawn_pump {
            Some(match source.readiness() {
                #[cfg(unix)]
                Readiness::Descriptor(fd) => ReadinessBridge::poll(fd)?,
                Readiness::WaitObject => ReadinessBridge::always_ready()?,
            })
        } else {
            None
        };

        inner.source = Some(source);
        inner.dump = dump;
        inner.buffers = Some(buffers);
        inner.callback = Some(callback);
        inner.state = SessionState::Open;

        let epoch = inner.epoch;
        let close_signal = Arc::new(Notify::new());
        inner.close_signal = Some(Arc::clone(&close_signal));
        drop(inner);

        if let Some(bridge) = bridge {
            tokio::spawn(run_pump(
                Arc::clone(&self.inner),
                bridge,
                close_signal,
                epoch,
            ));
        }

        Ok(link)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Whether a handle is currently open (including a pending close).
    pub fn is_open(&self) -> bool {
        matches!(
            self.inner.lock().state,
            SessionState::Open | SessionState::Closing
        )
    }

    /// Raw socket statistics for the open handle.
    pub fn stats(&self) -> Result<SocketStats> {
        let mut inner = self.inner.lock();
        match inner.source.as_mut() {
            Some(source) => source.stats(),
            None => Err(Error::SessionClosed),
        }
    }

    /// Transmit raw bytes on the open capture handle.
    pub fn inject(&self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Err(Error::invalid_argument(
                "inject payload must not be empty",
            ));
        }

        let mut inner = self.inner.lock();
        let source = inner.source.as_mut().ok_or(Error::SessionClosed)?;
        let written = source.inject(data)?;
        if written < data.len() {
            return Err(Error::PartialWrite {
                requested: data.len(),
                written,
            });
        }
        Ok(written)
    }

    /// Close the session.
    ///
    /// Returns `true` when this call initiated the close, `false` when the
    /// session was already closed or closing (idempotent, never an error).
    /// If a pump cycle is in flight the release is deferred to the end of
    /// that cycle; calling this from inside the packet callback is safe.
    pub fn close(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Open => {
                if inner.in_flight {
                    debug!("close requested mid-pump; deferring release");
                    inner.state = SessionState::Closing;
                } else {
                    inner.release();
                    info!("capture session closed");
                }
                true
            }
            SessionState::Unopened | SessionState::Closing | SessionState::Closed => false,
        }
    }

    /// Call-by-demand front-end over the pump: run one pump cycle now and
    /// return the number of frames delivered. A session whose state is not
    /// `Open` yields zero.
    pub fn dispatch(&self) -> usize {
        let (delivered, _) = pump_cycle(&self.inner, None);
        delivered
    }
}

enum PumpOutcome {
    /// Keep the pump armed
    Continue,
    /// The session released or is gone; stop pumping
    Exit,
}

/// One bounded pump cycle.
///
/// Dispatches one frame at a time so the host callback runs between frames
/// instead of after a large batch, keeping per-wake latency bounded. The
/// callback is invoked with the session lock released, which is what allows
/// it to re-enter `close()` on the same session.
fn pump_cycle(inner: &Arc<Mutex<SessionInner>>, expected_epoch: Option<u64>) -> (usize, PumpOutcome) {
    let mut guard = inner.lock();

    if let Some(epoch) = expected_epoch {
        if guard.epoch != epoch {
            return (0, PumpOutcome::Exit);
        }
    }

    if guard.state != SessionState::Open {
        // A stale wake after close is a safe no-op.
        if guard.state == SessionState::Closing && !guard.in_flight {
            guard.release();
        }
        return (0, PumpOutcome::Exit);
    }

    if guard.in_flight {
        // Cycles never overlap; a concurrent manual dispatch backs off.
        return (0, PumpOutcome::Continue);
    }
    guard.in_flight = true;

    let mut delivered = 0usize;
    let mut implicit_close = false;

    loop {
        if guard.state == SessionState::Closing {
            break;
        }

        match guard.deliver_one() {
            Dispatch::Delivered => {
                delivered += 1;
                if let Some(mut callback) = guard.callback.take() {
                    drop(guard);
                    callback();
                    guard = inner.lock();
                    if guard.callback.is_none() {
                        guard.callback = Some(callback);
                    }
                }
            }
            Dispatch::Empty => break,
            Dispatch::Exhausted => {
                debug!("capture source exhausted; closing session");
                implicit_close = true;
                break;
            }
            Dispatch::Failed(message) => {
                // No synchronous caller exists to receive this; treat it as
                // an implicit close trigger.
                error!("dispatch failed: {}", message);
                implicit_close = true;
                break;
            }
        }
    }

    guard.in_flight = false;

    if guard.state == SessionState::Closing || implicit_close {
        guard.release();
        info!(delivered, "capture session closed at end of pump cycle");
        return (delivered, PumpOutcome::Exit);
    }

    (delivered, PumpOutcome::Continue)
}

/// Pump task: waits for bridge wakes, runs pump cycles, exits when its epoch
/// of the session is released.
async fn run_pump(
    inner: Arc<Mutex<SessionInner>>,
    mut bridge: ReadinessBridge,
    close_signal: Arc<Notify>,
    epoch: u64,
) {
    loop {
        tokio::select! {
            _ = close_signal.notified() => {
                let guard = inner.lock();
                if guard.epoch != epoch || guard.state != SessionState::Open {
                    break;
                }
            }
            ready = bridge.wake() => {
                if !ready {
                    break;
                }
                let (_, outcome) = pump_cycle(&inner, Some(epoch));
                if matches!(outcome, PumpOutcome::Exit) {
                    break;
                }
            }
        }
    }
    bridge.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryDumpWriter, MockEvent, MockSource, OwnedFrame};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn collecting_callback(
        buffers: &FrameBuffers,
    ) -> (PacketCallback, Arc<Mutex<Vec<(u32, Vec<u8>)>>>) {
        let seen: Arc<Mutex<Vec<(u32, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reader = buffers.clone();
        let callback = Box::new(move || {
            reader.with_frame(|header, data| {
                sink.lock().push((header.captured_len, data.to_vec()));
            });
        });
        (callback, seen)
    }

    fn open_manual(
        session: &Session,
        source: MockSource,
        dump: Option<DumpSink>,
        buffers: &FrameBuffers,
        callback: PacketCallback,
    ) -> LinkType {
        session
            .install_with_pump(Box::new(source), dump, buffers.clone(), callback, false)
            .expect("install failed")
    }

    #[test]
    fn test_new_session_is_unopened() {
        let session = Session::new();
        assert_eq!(session.state(), SessionState::Unopened);
        assert!(!session.is_open());
    }

    #[test]
    fn test_open_live_rejects_bad_arguments() {
        let session = Session::new();
        let buffers = FrameBuffers::new(64).unwrap();

        let result =
            session.open_live("", LiveOptions::default(), buffers.clone(), || {}, None);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));

        let options = LiveOptions {
            snapshot_length: 0,
            ..Default::default()
        };
        let result = session.open_live("lo", options, buffers, || {}, None);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));

        // Rejected before the adapter was touched: still unopened.
        assert_eq!(session.state(), SessionState::Unopened);
    }

    #[test]
    fn test_manual_dispatch_delivers_in_capture_order() {
        let session = Session::new();
        let buffers = FrameBuffers::new(64).unwrap();
        let (callback, seen) = collecting_callback(&buffers);

        let source = MockSource::with_frames(vec![
            OwnedFrame::new(1, &[0x01, 0x02]),
            OwnedFrame::new(2, &[0x03]),
            OwnedFrame::new(3, &[0x04, 0x05, 0x06]),
        ]);
        let link = open_manual(&session, source, None, &buffers, callback);
        assert_eq!(link, LinkType::Ethernet);
        assert_eq!(session.state(), SessionState::Open);

        // One cycle drains everything available; exhaustion then closes.
        let delivered = session.dispatch();
        assert_eq!(delivered, 3);
        assert_eq!(session.state(), SessionState::Closed);

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], (2, vec![0x01, 0x02]));
        assert_eq!(seen[1], (1, vec![0x03]));
        assert_eq!(seen[2], (3, vec![0x04, 0x05, 0x06]));
    }

    #[test]
    fn test_empty_dispatch_keeps_session_open() {
        let session = Session::new();
        let buffers = FrameBuffers::new(64).unwrap();
        let (callback, seen) = collecting_callback(&buffers);

        let source = MockSource::with_events(vec![
            MockEvent::Frame(OwnedFrame::new(1, &[0xaa])),
            MockEvent::Empty,
            MockEvent::Frame(OwnedFrame::new(2, &[0xbb])),
        ]);
        open_manual(&session, source, None, &buffers, callback);

        assert_eq!(session.dispatch(), 1);
        assert_eq!(session.state(), SessionState::Open);

        // The second cycle delivers the last frame and then hits exhaustion.
        assert_eq!(session.dispatch(), 1);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_truncation_observable_not_corrupting() {
        let session = Session::new();
        let buffers = FrameBuffers::new(4).unwrap();
        let (callback, seen) = collecting_callback(&buffers);

        let payload: Vec<u8> = (0u8..10).collect();
        let source = MockSource::with_frames(vec![OwnedFrame::new(1, &payload)]);
        open_manual(&session, source, None, &buffers, callback);

        session.dispatch();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        let (captured_len, data) = &seen[0];
        // Exactly capacity bytes in the region, true length in the header.
        assert_eq!(*captured_len, 10);
        assert_eq!(data, &payload[..4]);
        assert!(buffers.header().is_truncated(buffers.capacity()));
    }

    #[test]
    fn test_dump_sees_full_payload_in_order() {
        let session = Session::new();
        let buffers = FrameBuffers::new(4).unwrap();
        let (callback, seen) = collecting_callback(&buffers);

        let (writer, records) = MemoryDumpWriter::new();
        let first: Vec<u8> = (0u8..9).collect();
        let second = vec![0x42u8; 2];
        let source = MockSource::with_frames(vec![
            OwnedFrame::new(1, &first),
            OwnedFrame::new(2, &second),
        ]);
        open_manual(
            &session,
            source,
            Some(DumpSink::new(Box::new(writer))),
            &buffers,
            callback,
        );

        session.dispatch();

        // Callback observed both frames (truncated), dump holds them whole.
        assert_eq!(seen.lock().len(), 2);
        let records = records.lock();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].data, first);
        assert_eq!(records[1].data, second);
    }

    #[test]
    fn test_double_close_releases_exactly_once() {
        let session = Session::new();
        let buffers = FrameBuffers::new(16).unwrap();

        let source = MockSource::with_frames(vec![OwnedFrame::new(1, &[1])]);
        let released = source.release_flag();
        open_manual(&session, source, None, &buffers, Box::new(|| {}));

        assert!(session.close());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(released.load(Ordering::SeqCst), 1);

        assert!(!session.close());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_on_unopened_session_is_noop() {
        let session = Session::new();
        assert!(!session.close());
        assert_eq!(session.state(), SessionState::Unopened);
    }

    #[test]
    fn test_dispatch_after_close_delivers_nothing() {
        let session = Session::new();
        assert_eq!(session.dispatch(), 0);

        let buffers = FrameBuffers::new(16).unwrap();
        let source = MockSource::with_frames(vec![
            OwnedFrame::new(1, &[1]),
            OwnedFrame::new(2, &[2]),
        ]);
        open_manual(&session, source, None, &buffers, Box::new(|| {}));

        assert!(session.close());
        // A wake queued before close must find nothing to do.
        assert_eq!(session.dispatch(), 0);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_close_from_callback_defers_release() {
        let session = Session::new();
        let buffers = FrameBuffers::new(16).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let callback_count = Arc::clone(&count);
        let closer = session.clone();
        let callback = Box::new(move || {
            if callback_count.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
                // Honored at the end of the cycle, not immediately.
                assert!(closer.close());
                assert_eq!(closer.state(), SessionState::Closing);
            }
        });

        let source = MockSource::with_frames(vec![
            OwnedFrame::new(1, &[1]),
            OwnedFrame::new(2, &[2]),
            OwnedFrame::new(3, &[3]),
            OwnedFrame::new(4, &[4]),
        ]);
        let released = source.release_flag();
        open_manual(&session, source, None, &buffers, callback);

        let delivered = session.dispatch();

        // The loop stopped at the close request: frames 3 and 4 were never
        // delivered, and the handle was released exactly once afterwards.
        assert_eq!(delivered, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_error_closes_session() {
        let session = Session::new();
        let buffers = FrameBuffers::new(16).unwrap();
        let (callback, seen) = collecting_callback(&buffers);

        let source = MockSource::with_events(vec![
            MockEvent::Frame(OwnedFrame::new(1, &[7])),
            MockEvent::Fail("the interface went away".to_string()),
            MockEvent::Frame(OwnedFrame::new(2, &[8])),
        ]);
        open_manual(&session, source, None, &buffers, callback);

        assert_eq!(session.dispatch(), 1);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_stats_and_inject_on_closed_session() {
        let session = Session::new();
        assert!(matches!(session.stats(), Err(Error::SessionClosed)));
        assert!(matches!(
            session.inject(&[1, 2, 3]),
            Err(Error::SessionClosed)
        ));
    }

    #[test]
    fn test_inject_empty_fails_before_adapter() {
        let session = Session::new();
        let buffers = FrameBuffers::new(16).unwrap();

        let source = MockSource::with_frames(vec![]);
        let injected = source.injected();
        open_manual(&session, source, None, &buffers, Box::new(|| {}));

        assert!(matches!(
            session.inject(&[]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(injected.lock().is_empty());
    }

    #[test]
    fn test_inject_records_payload() {
        let session = Session::new();
        let buffers = FrameBuffers::new(16).unwrap();

        let source = MockSource::with_frames(vec![]);
        let injected = source.injected();
        open_manual(&session, source, None, &buffers, Box::new(|| {}));

        assert_eq!(session.inject(&[0xde, 0xad]).unwrap(), 2);
        assert_eq!(injected.lock().as_slice(), &[vec![0xde, 0xad]]);
    }

    #[test]
    fn test_inject_partial_write() {
        let session = Session::new();
        let buffers = FrameBuffers::new(16).unwrap();

        let source = MockSource::with_frames(vec![]).short_writes(1);
        open_manual(&session, source, None, &buffers, Box::new(|| {}));

        match session.inject(&[1, 2, 3]) {
            Err(Error::PartialWrite { requested, written }) => {
                assert_eq!(requested, 3);
                assert_eq!(written, 1);
            }
            other => panic!("expected PartialWrite, got {:?}", other),
        }
    }

    #[test]
    fn test_stats_passthrough() {
        let session = Session::new();
        let buffers = FrameBuffers::new(16).unwrap();

        let source = MockSource::with_frames(vec![]).stats(SocketStats {
            received: 10,
            dropped_by_kernel: 2,
            dropped_by_interface: 1,
        });
        open_manual(&session, source, None, &buffers, Box::new(|| {}));

        let stats = session.stats().unwrap();
        assert_eq!(stats.received, 10);
        assert_eq!(stats.dropped_by_kernel, 2);
        assert_eq!(stats.dropped_by_interface, 1);
    }

    #[test]
    fn test_reopen_after_close() {
        let session = Session::new();
        let buffers = FrameBuffers::new(16).unwrap();
        let (callback, seen) = collecting_callback(&buffers);

        let source = MockSource::with_frames(vec![OwnedFrame::new(1, &[1])]);
        open_manual(&session, source, None, &buffers, callback);
        session.dispatch();
        assert_eq!(session.state(), SessionState::Closed);

        let (callback, seen_again) = collecting_callback(&buffers);
        let source = MockSource::with_frames(vec![OwnedFrame::new(2, &[2, 2])]);
        open_manual(&session, source, None, &buffers, callback);
        assert_eq!(session.state(), SessionState::Open);
        session.dispatch();

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(seen_again.lock().len(), 1);
        assert_eq!(seen_again.lock()[0].1, vec![2, 2]);
    }

    #[test]
    fn test_open_over_open_releases_previous_handle() {
        let session = Session::new();
        let buffers = FrameBuffers::new(16).unwrap();

        let first = MockSource::with_frames(vec![OwnedFrame::new(1, &[1])]);
        let released = first.release_flag();
        open_manual(&session, first, None, &buffers, Box::new(|| {}));

        let second = MockSource::with_frames(vec![]);
        open_manual(&session, second, None, &buffers, Box::new(|| {}));

        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), SessionState::Open);
    }

    #[tokio::test]
    async fn test_readiness_pump_drains_and_closes() {
        let session = Session::new();
        let buffers = FrameBuffers::new(64).unwrap();
        let (callback, seen) = collecting_callback(&buffers);

        let source = MockSource::with_frames(vec![
            OwnedFrame::new(1, &[0x10]),
            OwnedFrame::new(2, &[0x20, 0x21]),
        ]);
        session
            .open_source(Box::new(source), None, buffers.clone(), callback)
            .unwrap();

        // The wait-object bridge drives the pump; exhaustion closes the
        // session without any host involvement.
        for _ in 0..200 {
            if session.state() == SessionState::Closed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(session.state(), SessionState::Closed);
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1, vec![0x10]);
        assert_eq!(seen[1].1, vec![0x20, 0x21]);
    }

    #[tokio::test]
    async fn test_close_races_pump_without_double_release() {
        let session = Session::new();
        let buffers = FrameBuffers::new(64).unwrap();

        let frames: Vec<OwnedFrame> = (0..50)
            .map(|i| OwnedFrame::new(i, &[i as u8]))
            .collect();
        let source = MockSource::with_frames(frames);
        let released = source.release_flag();
        session
            .open_source(Box::new(source), None, buffers.clone(), Box::new(|| {}))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1)).await;
        session.close();

        for _ in 0..200 {
            if session.state() == SessionState::Closed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
