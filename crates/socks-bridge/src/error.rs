//! Error types for the bridge

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failure to decode a SOCKS5 wire structure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    #[error("Truncated message")]
    Truncated,

    #[error("Unsupported address type: {0}")]
    UnsupportedAddressType(u8),
}

/// Failure to open the outbound TCP connection
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Connection refused by {0}")]
    Refused(String),

    #[error("Connection to {0} timed out")]
    Timeout(String),

    #[error("Failed to resolve {host}: {reason}")]
    ResolutionFailed { host: String, reason: String },

    #[error("{target} unreachable: {source}")]
    Unreachable {
        target: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure on the message channel side of a session
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,

    #[error("Channel write failed: {0}")]
    WriteFailed(String),

    #[error("Channel read failed: {0}")]
    ReadFailed(String),
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("SOCKS5 decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Forwarding error: {0}")]
    Forward(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BridgeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn forward(msg: impl Into<String>) -> Self {
        Self::Forward(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<prometheus::Error> for BridgeError {
    fn from(err: prometheus::Error) -> Self {
        Self::Metrics(err.to_string())
    }
}
