//! Frame relay: caller-owned fixed output regions
//!
//! The host supplies a pair of fixed-size regions at open time: a 16-byte
//! header region and a data region sized to the snapshot length. Every pump
//! cycle writes one frame into them and then invokes the host callback, which
//! reads them back through its own clone of the handle. Nothing on this path
//! allocates; a frame larger than the data region is truncated at the
//! capacity boundary and the host derives the truncation from the captured
//! length recorded in the header region.

use std::sync::Arc;

use packetpump_core::{Error, Frame, FrameHeader, Result, FRAME_HEADER_LEN};
use parking_lot::Mutex;

/// Shared handle to the caller-owned output regions.
///
/// Clones are cheap and refer to the same memory; the host keeps one clone
/// for reading inside its packet callback and hands another to the session.
/// The session only writes while a pump cycle is delivering a frame and never
/// resizes or reallocates the regions.
#[derive(Clone)]
pub struct FrameBuffers {
    header: Arc<Mutex<[u8; FRAME_HEADER_LEN]>>,
    data: Arc<Mutex<DataRegion>>,
    capacity: usize,
}

/// The data region plus the number of bytes the last store actually wrote.
///
/// The valid length is tracked separately from the header's captured length:
/// a source may report a captured length larger than the payload it hands
/// over, and the readable slice must never extend past the copied bytes into
/// leftovers from an earlier frame.
struct DataRegion {
    bytes: Box<[u8]>,
    valid: usize,
}

impl FrameBuffers {
    /// Allocate output regions with the given data capacity.
    ///
    /// The capacity normally matches the snapshot length, so only frames
    /// exceeding the snapshot would ever truncate.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::invalid_argument(
                "data region capacity must be greater than zero",
            ));
        }

        Ok(Self {
            header: Arc::new(Mutex::new([0u8; FRAME_HEADER_LEN])),
            data: Arc::new(Mutex::new(DataRegion {
                bytes: vec![0u8; capacity].into_boxed_slice(),
                valid: 0,
            })),
            capacity,
        })
    }

    /// Fixed capacity of the data region in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the header region as written by the last delivery
    pub fn header(&self) -> FrameHeader {
        FrameHeader::from_bytes(&self.header.lock())
    }

    /// Read the last delivered frame: header fields plus the payload slice
    /// the last store actually wrote.
    pub fn with_frame<R>(&self, f: impl FnOnce(&FrameHeader, &[u8]) -> R) -> R {
        let header = FrameHeader::from_bytes(&self.header.lock());
        let data = self.data.lock();
        f(&header, &data.bytes[..data.valid])
    }

    /// Relay one delivered frame into the output regions.
    ///
    /// Writes the four header fields, then copies up to `capacity` payload
    /// bytes. Returns the number of payload bytes copied; truncation is
    /// silent here and observable through the header.
    pub(crate) fn store(&self, frame: &Frame<'_>) -> usize {
        *self.header.lock() = FrameHeader::for_frame(frame).to_bytes();

        let copy_len = frame.data.len().min(self.capacity);
        let mut data = self.data.lock();
        data.bytes[..copy_len].copy_from_slice(&frame.data[..copy_len]);
        data.valid = copy_len;
        copy_len
    }
}
