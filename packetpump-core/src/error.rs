//! Error types for the capture session engine

use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the capture session engine
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed parameters, rejected before the capture library is touched
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The capture library could not create, activate, or filter a handle.
    /// The message is the library's own diagnostic text, unchanged.
    #[error("Failed to open capture: {0}")]
    OpenFailure(String),

    /// An operation requiring an open handle was invoked while closed
    #[error("The session is closed")]
    SessionClosed,

    /// A post-open capture library call failed
    #[error("Capture library error: {0}")]
    Adapter(String),

    /// An inject wrote fewer bytes than requested
    #[error("Partial write: {written} of {requested} bytes injected")]
    PartialWrite { requested: usize, written: usize },

    /// I/O error from readiness or file plumbing
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid-argument error with a custom message
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create an open-failure error carrying the library diagnostic
    pub fn open_failure<S: Into<String>>(msg: S) -> Self {
        Error::OpenFailure(msg.into())
    }

    /// Create an adapter error carrying the library diagnostic
    pub fn adapter<S: Into<String>>(msg: S) -> Self {
        Error::Adapter(msg.into())
    }
}
