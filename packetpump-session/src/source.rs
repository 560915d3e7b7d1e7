//! Capture source adapter
//!
//! The session engine talks to the capture library through the narrow
//! [`CaptureSource`] contract: bounded one-frame dispatch, inject, raw socket
//! statistics, link-type classification, dump-sink creation, and the shape of
//! the handle's readiness primitive. [`PcapSource`] is the production
//! implementation over libpcap; the engine never blocks on it because live
//! handles are put into non-blocking mode (or immediate mode when no read
//! timeout is requested) at open time.

#[cfg(unix)]
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use packetpump_core::{Error, Frame, LinkType, Result, SocketStats};
use pcap::{Active, Capture, Offline};
use tracing::debug;

use crate::dump::{DumpSink, SavefileWriter};

/// Default kernel ring buffer size: 10 MiB, matching the host wrapper default
pub const DEFAULT_BUFFER_SIZE: i32 = 10 * 1024 * 1024;

/// Default snapshot length (maximum bytes captured per frame)
pub const DEFAULT_SNAPSHOT_LENGTH: i32 = 65535;

/// Default read timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: i32 = 1000;

/// Tuning matrix for opening a live capture handle.
#[derive(Debug, Clone)]
pub struct LiveOptions {
    /// BPF filter expression, compiled once at open time (empty = none)
    pub filter: String,
    /// Kernel ring buffer size in bytes
    pub buffer_size: i32,
    /// Maximum bytes captured per frame
    pub snapshot_length: i32,
    /// Dump every accepted frame to this capture file (None = disabled)
    pub out_file: Option<PathBuf>,
    /// Enable 802.11 monitor mode
    pub monitor: bool,
    /// Read timeout in milliseconds; zero or negative selects immediate mode
    /// and disables timeout-based coalescing entirely
    pub read_timeout_ms: i32,
    /// Enable promiscuous mode
    pub promiscuous: bool,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            filter: String::new(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            snapshot_length: DEFAULT_SNAPSHOT_LENGTH,
            out_file: None,
            monitor: false,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            promiscuous: true,
        }
    }
}

/// Outcome of one bounded dispatch call, mirroring the capture library's
/// `frames / 0 / exhausted / error` contract.
#[derive(Debug)]
pub enum Dispatch {
    /// One frame was delivered to the sink
    Delivered,
    /// No frame is currently available
    Empty,
    /// The source is exhausted or was closed underneath us
    Exhausted,
    /// The library reported an error; message is its diagnostic text
    Failed(String),
}

/// Shape of the readiness primitive behind a handle.
#[derive(Debug, Clone, Copy)]
pub enum Readiness {
    /// A selectable descriptor the host loop can poll for readability
    #[cfg(unix)]
    Descriptor(RawFd),
    /// No pollable descriptor; a background wait object drives wake-ups
    WaitObject,
}

/// Narrow interface the session state machine consumes.
///
/// Implementations must never block in `dispatch_one`.
pub trait CaptureSource: Send {
    /// Deliver at most one available frame to `sink`.
    fn dispatch_one(&mut self, sink: &mut dyn FnMut(&Frame<'_>)) -> Dispatch;

    /// Transmit raw bytes on the capture source; returns bytes written.
    fn inject(&mut self, data: &[u8]) -> Result<usize>;

    /// Raw socket statistics, a live-capture concept.
    fn stats(&mut self) -> Result<SocketStats>;

    /// Link-layer type reported after activation.
    fn link_type(&self) -> LinkType;

    /// Open a dump sink bound to this handle.
    fn open_dump(&mut self, path: &Path) -> Result<DumpSink>;

    /// How readiness is signalled for this handle.
    fn readiness(&self) -> Readiness;
}

enum PcapHandle {
    Live(Capture<Active>),
    Offline(Capture<Offline>),
}

/// libpcap-backed capture source.
pub struct PcapSource {
    handle: PcapHandle,
}

impl PcapSource {
    /// Open and activate a live handle with the full tuning matrix.
    ///
    /// A failed netmask lookup for the device is routed to `warn` and open
    /// proceeds; the filter is then compiled without a netmask, exactly as a
    /// netmask of zero would behave. Every other failure aborts the open and
    /// carries the library's diagnostic text.
    pub fn open_live(
        device: &str,
        options: &LiveOptions,
        warn: &mut dyn FnMut(&str),
    ) -> Result<Self> {
        if crate::device::lookup_ipv4_netmask(device).is_none() {
            warn(&format!(
                "no IPv4 network is known for device '{}'; \
                 filters will be compiled without a netmask",
                device
            ));
        }

        let mut inactive = Capture::from_device(device)
            .map_err(|e| Error::open_failure(e.to_string()))?
            .promisc(options.promiscuous)
            .snaplen(options.snapshot_length)
            .buffer_size(options.buffer_size)
            // A read timeout of zero or less is undefined behaviour in the
            // library; immediate mode is the defined substitute and ignores
            // the timeout entirely.
            .immediate_mode(options.read_timeout_ms <= 0);

        if options.read_timeout_ms > 0 {
            inactive = inactive.timeout(options.read_timeout_ms);
        }

        if options.monitor {
            inactive = inactive.rfmon(true);
        }

        let active = inactive
            .open()
            .map_err(|e| Error::open_failure(e.to_string()))?;

        // Readiness is signalled externally; dispatch must never block.
        let mut active = active
            .setnonblock()
            .map_err(|e| Error::open_failure(e.to_string()))?;

        if !options.filter.is_empty() {
            active
                .filter(&options.filter, true)
                .map_err(|e| Error::open_failure(e.to_string()))?;
            debug!("applied filter: {}", options.filter);
        }

        debug!(
            device,
            buffer_size = options.buffer_size,
            snapshot_length = options.snapshot_length,
            immediate = options.read_timeout_ms <= 0,
            "live capture handle activated"
        );

        Ok(Self {
            handle: PcapHandle::Live(active),
        })
    }

    /// Open a capture file for offline replay.
    pub fn open_offline(path: &Path, filter: &str) -> Result<Self> {
        let mut capture =
            Capture::from_file(path).map_err(|e| Error::open_failure(e.to_string()))?;

        if !filter.is_empty() {
            capture
                .filter(filter, true)
                .map_err(|e| Error::open_failure(e.to_string()))?;
            debug!("applied filter: {}", filter);
        }

        debug!(path = %path.display(), "offline capture handle opened");

        Ok(Self {
            handle: PcapHandle::Offline(capture),
        })
    }
}

fn frame_of<'a>(packet: &pcap::Packet<'a>) -> Frame<'a> {
    Frame {
        ts_sec: packet.header.ts.tv_sec as i64,
        ts_usec: packet.header.ts.tv_usec as i64,
        captured_len: packet.header.caplen,
        original_len: packet.header.len,
        data: packet.data,
    }
}

impl CaptureSource for PcapSource {
    fn dispatch_one(&mut self, sink: &mut dyn FnMut(&Frame<'_>)) -> Dispatch {
        let next = match &mut self.handle {
            PcapHandle::Live(capture) => capture.next_packet(),
            PcapHandle::Offline(capture) => capture.next_packet(),
        };

        match next {
            Ok(packet) => {
                sink(&frame_of(&packet));
                Dispatch::Delivered
            }
            // In non-blocking mode an expired timeout just means no frame
            // was available right now.
            Err(pcap::Error::TimeoutExpired) => Dispatch::Empty,
            Err(pcap::Error::NoMorePackets) => Dispatch::Exhausted,
            Err(e) => Dispatch::Failed(e.to_string()),
        }
    }

    fn inject(&mut self, data: &[u8]) -> Result<usize> {
        match &mut self.handle {
            PcapHandle::Live(capture) => capture
                .sendpacket(data)
                .map(|_| data.len())
                .map_err(|e| Error::adapter(e.to_string())),
            PcapHandle::Offline(_) => {
                Err(Error::adapter("inject requires a live capture session"))
            }
        }
    }

    fn stats(&mut self) -> Result<SocketStats> {
        match &mut self.handle {
            PcapHandle::Live(capture) => {
                let stats = capture
                    .stats()
                    .map_err(|e| Error::adapter(e.to_string()))?;
                Ok(SocketStats {
                    received: stats.received,
                    dropped_by_kernel: stats.dropped,
                    dropped_by_interface: stats.if_dropped,
                })
            }
            PcapHandle::Offline(_) => Err(Error::adapter(
                "statistics are only available on live capture sessions",
            )),
        }
    }

    fn link_type(&self) -> LinkType {
        let linktype = match &self.handle {
            PcapHandle::Live(capture) => capture.get_datalink(),
            PcapHandle::Offline(capture) => capture.get_datalink(),
        };
        LinkType::from_dlt(linktype.0)
    }

    fn open_dump(&mut self, path: &Path) -> Result<DumpSink> {
        let savefile = match &self.handle {
            PcapHandle::Live(capture) => capture.savefile(path),
            PcapHandle::Offline(capture) => capture.savefile(path),
        }
        .map_err(|e| Error::open_failure(e.to_string()))?;

        Ok(DumpSink::new(Box::new(SavefileWriter::new(savefile))))
    }

    fn readiness(&self) -> Readiness {
        match &self.handle {
            #[cfg(unix)]
            PcapHandle::Live(capture) => Readiness::Descriptor(capture.as_raw_fd()),
            #[cfg(not(unix))]
            PcapHandle::Live(_) => Readiness::WaitObject,
            PcapHandle::Offline(_) => Readiness::WaitObject,
        }
    }
}
