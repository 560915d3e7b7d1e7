//! Frame descriptors and the fixed output header layout

use crate::error::{Error, Result};

/// Size of the fixed header region: four 32-bit fields.
pub const FRAME_HEADER_LEN: usize = 16;

/// One captured frame as delivered by the capture library.
///
/// The payload is borrowed from the library's own buffer and is only valid
/// for the duration of the delivery callback.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Capture timestamp, seconds part
    pub ts_sec: i64,
    /// Capture timestamp, microseconds part
    pub ts_usec: i64,
    /// Bytes actually captured (bounded by the snapshot length)
    pub captured_len: u32,
    /// Original on-the-wire length of the frame
    pub original_len: u32,
    /// Captured payload bytes
    pub data: &'a [u8],
}

/// The four fixed header fields written to the caller's header region,
/// in fixed order: seconds, microseconds, captured length, original length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub ts_sec: u32,
    pub ts_usec: u32,
    pub captured_len: u32,
    pub original_len: u32,
}

impl FrameHeader {
    /// Build the header fields for a delivered frame.
    ///
    /// Timestamp parts are narrowed to 32 bits, matching the fixed region
    /// layout the host reads.
    pub fn for_frame(frame: &Frame<'_>) -> Self {
        Self {
            ts_sec: frame.ts_sec as u32,
            ts_usec: frame.ts_usec as u32,
            captured_len: frame.captured_len,
            original_len: frame.original_len,
        }
    }

    /// Encode the four fields in their fixed order.
    ///
    /// Fields are in native byte order, as the host reads them back on the
    /// same machine.
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut region = [0u8; FRAME_HEADER_LEN];
        region[0..4].copy_from_slice(&self.ts_sec.to_ne_bytes());
        region[4..8].copy_from_slice(&self.ts_usec.to_ne_bytes());
        region[8..12].copy_from_slice(&self.captured_len.to_ne_bytes());
        region[12..16].copy_from_slice(&self.original_len.to_ne_bytes());
        region
    }

    /// Decode the four fields from a full header region.
    pub fn from_bytes(region: &[u8; FRAME_HEADER_LEN]) -> Self {
        let field = |range: std::ops::Range<usize>| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&region[range]);
            u32::from_ne_bytes(buf)
        };

        Self {
            ts_sec: field(0..4),
            ts_usec: field(4..8),
            captured_len: field(8..12),
            original_len: field(12..16),
        }
    }

    /// Write the four fields into a header region.
    ///
    /// The region must be at least [`FRAME_HEADER_LEN`] bytes; only the first
    /// 16 bytes are touched.
    pub fn write_to(&self, region: &mut [u8]) -> Result<()> {
        if region.len() < FRAME_HEADER_LEN {
            return Err(Error::invalid_argument(format!(
                "header region must be at least {} bytes, got {}",
                FRAME_HEADER_LEN,
                region.len()
            )));
        }

        region[..FRAME_HEADER_LEN].copy_from_slice(&self.to_bytes());
        Ok(())
    }

    /// Read the four fields back from a header region.
    pub fn parse(region: &[u8]) -> Result<Self> {
        if region.len() < FRAME_HEADER_LEN {
            return Err(Error::invalid_argument(format!(
                "header region must be at least {} bytes, got {}",
                FRAME_HEADER_LEN,
                region.len()
            )));
        }

        let mut buf = [0u8; FRAME_HEADER_LEN];
        buf.copy_from_slice(&region[..FRAME_HEADER_LEN]);
        Ok(Self::from_bytes(&buf))
    }

    /// Whether a frame with this header did not fit a data region of the
    /// given capacity. Truncation is silent in the data region itself; the
    /// host derives it from the recorded captured length.
    pub fn is_truncated(&self, data_capacity: usize) -> bool {
        self.captured_len as usize > data_capacity
    }
}

/// Raw socket statistics as reported by the capture library.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SocketStats {
    /// Packets received by the filter
    pub received: u32,
    /// Packets dropped by the kernel for lack of buffer space
    pub dropped_by_kernel: u32,
    /// Packets dropped by the interface or its driver
    pub dropped_by_interface: u32,
}
