//! Pass-through dump sink
//!
//! When a session is opened with an output file, every accepted frame is
//! written to a standard capture-format file before the relay's truncation
//! ever happens, so the dump always carries the full payload the library
//! delivered. The sink's lifetime is tied to the owning handle: it is closed
//! no later than the handle, and closing twice is a no-op.

use packetpump_core::{Frame, Result};
use tracing::{debug, error};

/// Backing writer for a dump sink. The production writer is a capture-library
/// savefile; tests substitute an in-memory recorder.
pub(crate) trait DumpWriter: Send {
    fn write_frame(&mut self, frame: &Frame<'_>) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// Write sink for accepted frames, bound to one open capture handle.
pub struct DumpSink {
    writer: Option<Box<dyn DumpWriter>>,
}

impl DumpSink {
    pub(crate) fn new(writer: Box<dyn DumpWriter>) -> Self {
        Self {
            writer: Some(writer),
        }
    }

    /// Whether the sink has not been closed yet
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Pass one frame through, untruncated.
    ///
    /// Failures are logged rather than propagated: the pump cycle has no
    /// synchronous caller to receive them, and a dump problem must not stop
    /// packet delivery.
    pub(crate) fn write(&mut self, frame: &Frame<'_>) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.write_frame(frame) {
                error!("failed to write frame to dump file: {}", e);
            }
        }
    }

    /// Close the sink, flushing pending records. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                error!("failed to flush dump file on close: {}", e);
            }
            debug!("dump sink closed");
        }
    }
}

impl Drop for DumpSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Savefile-backed writer over the capture library's dump facility.
pub(crate) struct SavefileWriter {
    savefile: pcap::Savefile,
}

impl SavefileWriter {
    pub(crate) fn new(savefile: pcap::Savefile) -> Self {
        Self { savefile }
    }
}

impl DumpWriter for SavefileWriter {
    fn write_frame(&mut self, frame: &Frame<'_>) -> Result<()> {
        let header = pcap::PacketHeader {
            ts: libc::timeval {
                tv_sec: frame.ts_sec as libc::time_t,
                tv_usec: frame.ts_usec as libc::suseconds_t,
            },
            caplen: frame.captured_len,
            len: frame.original_len,
        };
        self.savefile.write(&pcap::Packet::new(&header, frame.data));
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.savefile
            .flush()
            .map_err(|e| packetpump_core::Error::adapter(e.to_string()))
    }
}
