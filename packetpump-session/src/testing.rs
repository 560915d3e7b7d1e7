//! In-memory capture source and dump writer for deterministic tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use packetpump_core::{Error, Frame, FrameHeader, LinkType, Result, SocketStats};
use parking_lot::Mutex;

use crate::dump::{DumpSink, DumpWriter};
use crate::source::{CaptureSource, Dispatch, Readiness};

/// Owned copy of one frame fed through the mock source.
#[derive(Debug, Clone)]
pub(crate) struct OwnedFrame {
    pub ts_sec: i64,
    pub data: Vec<u8>,
}

impl OwnedFrame {
    pub(crate) fn new(ts_sec: i64, data: &[u8]) -> Self {
        Self {
            ts_sec,
            data: data.to_vec(),
        }
    }

    fn as_frame(&self) -> Frame<'_> {
        Frame {
            ts_sec: self.ts_sec,
            ts_usec: 0,
            captured_len: self.data.len() as u32,
            original_len: self.data.len() as u32,
            data: &self.data,
        }
    }
}

/// One scripted dispatch outcome.
pub(crate) enum MockEvent {
    Frame(OwnedFrame),
    Empty,
    Fail(String),
}

/// Scripted capture source: pops one event per dispatch call and reports
/// exhaustion when the script runs out, like a savefile reaching its end.
pub(crate) struct MockSource {
    events: VecDeque<MockEvent>,
    injected: Arc<Mutex<Vec<Vec<u8>>>>,
    inject_cap: Option<usize>,
    stats: Option<SocketStats>,
    releases: Arc<AtomicUsize>,
}

impl MockSource {
    pub(crate) fn with_events(events: Vec<MockEvent>) -> Self {
        Self {
            events: events.into(),
            injected: Arc::new(Mutex::new(Vec::new())),
            inject_cap: None,
            stats: None,
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn with_frames(frames: Vec<OwnedFrame>) -> Self {
        Self::with_events(frames.into_iter().map(MockEvent::Frame).collect())
    }

    /// Report at most `cap` bytes written per inject.
    pub(crate) fn short_writes(mut self, cap: usize) -> Self {
        self.inject_cap = Some(cap);
        self
    }

    pub(crate) fn stats(mut self, stats: SocketStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Counter incremented when the source is dropped (handle released).
    pub(crate) fn release_flag(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.releases)
    }

    /// Shared view of payloads passed to `inject`.
    pub(crate) fn injected(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        Arc::clone(&self.injected)
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

impl CaptureSource for MockSource {
    fn dispatch_one(&mut self, sink: &mut dyn FnMut(&Frame<'_>)) -> Dispatch {
        match self.events.pop_front() {
            Some(MockEvent::Frame(frame)) => {
                sink(&frame.as_frame());
                Dispatch::Delivered
            }
            Some(MockEvent::Empty) => Dispatch::Empty,
            Some(MockEvent::Fail(message)) => Dispatch::Failed(message),
            None => Dispatch::Exhausted,
        }
    }

    fn inject(&mut self, data: &[u8]) -> Result<usize> {
        self.injected.lock().push(data.to_vec());
        Ok(self.inject_cap.map_or(data.len(), |cap| cap.min(data.len())))
    }

    fn stats(&mut self) -> Result<SocketStats> {
        self.stats
            .ok_or_else(|| Error::adapter("statistics unavailable"))
    }

    fn link_type(&self) -> LinkType {
        LinkType::Ethernet
    }

    fn open_dump(&mut self, _path: &Path) -> Result<DumpSink> {
        let (writer, _records) = MemoryDumpWriter::new();
        Ok(DumpSink::new(Box::new(writer)))
    }

    fn readiness(&self) -> Readiness {
        Readiness::WaitObject
    }
}

/// One record passed through a dump sink, untruncated.
#[derive(Debug, Clone)]
pub(crate) struct DumpRecord {
    pub header: FrameHeader,
    pub data: Vec<u8>,
}

/// Dump writer that records frames in memory.
pub(crate) struct MemoryDumpWriter {
    records: Arc<Mutex<Vec<DumpRecord>>>,
}

impl MemoryDumpWriter {
    pub(crate) fn new() -> (Self, Arc<Mutex<Vec<DumpRecord>>>) {
        let records: Arc<Mutex<Vec<DumpRecord>>> = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                records: Arc::clone(&records),
            },
            records,
        )
    }
}

impl DumpWriter for MemoryDumpWriter {
    fn write_frame(&mut self, frame: &Frame<'_>) -> Result<()> {
        self.records.lock().push(DumpRecord {
            header: FrameHeader::for_frame(frame),
            data: frame.data.to_vec(),
        });
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
