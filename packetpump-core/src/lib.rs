//! Core types for the packetpump capture session engine
//!
//! This crate holds the shared vocabulary between the session engine and its
//! hosts: the error taxonomy, frame descriptors with the fixed output header
//! layout, link-type classification, and raw socket statistics. It performs
//! no I/O of its own.

pub mod error;
pub mod frame;
pub mod link;

pub use error::{Error, Result};
pub use frame::{Frame, FrameHeader, SocketStats, FRAME_HEADER_LEN};
pub use link::LinkType;
