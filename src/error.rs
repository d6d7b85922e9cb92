//! Error types and handling.

use thiserror::Error;

/// Link-wide error type
#[derive(Error, Debug)]
pub enum LinkError {
    /// No candidate endpoint could be opened
    #[error("No MCU bridge device found")]
    NoDevice,

    /// Endpoint configuration rejected
    #[error("Config error: {0}")]
    Config(String),

    /// MCU answered the firmware handshake negatively
    #[error("MCU firmware mismatch: expected version {expected:#010x}")]
    FirmwareMismatch { expected: u32 },

    /// Header retry cap exhausted
    #[error("No answer header after {attempts} reads")]
    SyncTimeout { attempts: u32 },

    /// Header arrived partial, or frame layout is invalid
    #[error("Framing error: {0}")]
    Framing(String),

    /// Payload read returned fewer bytes than declared
    #[error("Payload truncated: expected {expected} bytes, got {received}")]
    PayloadTruncated { expected: usize, received: usize },

    /// Byte-stream write failed or was short
    #[error("Write error: {0}")]
    Write(String),

    /// Caller passed an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation attempted on a closed link
    #[error("Link not connected")]
    NotConnected,

    /// A caller panicked while holding the link lock
    #[error("Link lock poisoned")]
    LockPoisoned,

    /// Non-transient read failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for LinkError
pub type Result<T> = std::result::Result<T, LinkError>;

impl LinkError {
    /// Create a framing error with message
    pub fn framing(msg: impl Into<String>) -> Self {
        Self::Framing(msg.into())
    }

    /// Create a config error with message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid argument error with message
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
