//! Capture session engine
//!
//! This crate bridges libpcap's blocking, callback-driven capture facility to
//! a single-threaded cooperative tokio host. The hard part is not the packets
//! but the session lifecycle: opening a handle with its tuning matrix,
//! pumping frames into caller-owned fixed buffers with no hot-path
//! allocation, invoking the host callback exactly once per delivered frame,
//! and tearing the session down safely even while a pump cycle is in flight.
//!
//! ## Example
//!
//! ```no_run
//! use packetpump_session::{FrameBuffers, LiveOptions, Session};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let buffers = FrameBuffers::new(65535)?;
//! let reader = buffers.clone();
//!
//! let session = Session::new();
//! let link = session.open_live(
//!     "eth0",
//!     LiveOptions {
//!         filter: "tcp".to_string(),
//!         ..Default::default()
//!     },
//!     buffers,
//!     move || {
//!         reader.with_frame(|header, data| {
//!             println!("{} bytes (wire length {})", data.len(), header.original_len);
//!         });
//!     },
//!     None,
//! )?;
//! println!("capturing, link type: {}", link);
//!
//! // Later:
//! session.close();
//! # Ok(())
//! # }
//! ```

mod bridge;
pub mod device;
pub mod dump;
pub mod relay;
pub mod session;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types
pub use device::{find_device, list_devices, DeviceInfo};
pub use dump::DumpSink;
pub use packetpump_core::{
    Error, Frame, FrameHeader, LinkType, Result, SocketStats, FRAME_HEADER_LEN,
};
pub use relay::FrameBuffers;
pub use session::{PacketCallback, Session, SessionState, WarningHandler};
pub use source::{
    CaptureSource, Dispatch, LiveOptions, PcapSource, Readiness, DEFAULT_BUFFER_SIZE,
    DEFAULT_READ_TIMEOUT_MS, DEFAULT_SNAPSHOT_LENGTH,
};
