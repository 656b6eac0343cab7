//! Error types for linkagg

use thiserror::Error;

/// Result type alias for linkagg operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for linkagg
#[derive(Error, Debug)]
pub enum Error {
    /// Network I/O error
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A received PDU failed structural validation
    #[error("Malformed PDU: {0}")]
    MalformedPdu(String),

    /// A received PDU carried an unsupported protocol version
    #[error("Unsupported protocol version {got} (supported up to {supported})")]
    VersionMismatch { got: u8, supported: u8 },

    /// The underlying frame transport failed or went away
    #[error("Transport error: {0}")]
    Transport(String),

    /// A PDU to be transmitted would exceed the egress MTU
    #[error("PDU of {len} octets exceeds MTU {mtu}")]
    OversizePdu { len: usize, mtu: usize },

    /// Configuration rejected at admission
    #[error("Configuration conflict: {0}")]
    ConfigConflict(String),

    /// Invalid parameter error
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Resource already exists
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// A task inbox or reply channel closed underneath us
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

impl Error {
    /// Create a malformed-PDU error with a custom message
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Error::MalformedPdu(msg.into())
    }

    /// Create a transport error with a custom message
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Error::Transport(msg.into())
    }

    /// Create a configuration-conflict error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::ConfigConflict(msg.into())
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        Error::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
