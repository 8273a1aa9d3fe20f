//! Block Link Error Types
//!
//! Codec, registry and session errors. Codec failures never touch the
//! connection state; only [`BlockError::Connection`] does.

use thiserror::Error;

/// Result type for blocklink operations
pub type Result<T> = std::result::Result<T, BlockError>;

/// Transport-level failures reported by a [`crate::BlockTransport`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Could not establish the connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection dropped while in use
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Operation attempted without a connection
    #[error("Not connected")]
    NotConnected,

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Malformed or unexpected telegram
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Device refused the request (unknown block, address out of bounds)
    #[error("Request rejected: {0}")]
    Rejected(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                TransportError::Timeout(err.to_string())
            },
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => TransportError::ConnectionLost(err.to_string()),
            std::io::ErrorKind::ConnectionRefused => {
                TransportError::ConnectionFailed(err.to_string())
            },
            _ => TransportError::Io(err.to_string()),
        }
    }
}

/// Block link errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BlockError {
    /// Access past the end of a block buffer
    #[error("Out of range: {width} byte(s) at offset {offset} exceed buffer of {len} bytes")]
    OutOfRange {
        offset: u32,
        width: usize,
        len: usize,
    },

    /// Value does not fit the primitive's width or sign
    #[error("Value out of domain for {primitive}: {value}")]
    ValueOutOfDomain { primitive: String, value: String },

    /// Operation not supported for this primitive
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Block has never been fetched successfully
    #[error("Block not available: DB{0}")]
    BlockNotAvailable(u16),

    /// Malformed address or address notation
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Any transport failure during connect, poll or write
    #[error("Connection error: {0}")]
    Connection(#[from] TransportError),
}

// Helper methods for creating errors
impl BlockError {
    pub fn out_of_range(offset: u32, width: usize, len: usize) -> Self {
        BlockError::OutOfRange { offset, width, len }
    }

    pub fn value_out_of_domain(primitive: impl ToString, value: impl ToString) -> Self {
        BlockError::ValueOutOfDomain {
            primitive: primitive.to_string(),
            value: value.to_string(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        BlockError::UnsupportedOperation(msg.into())
    }

    pub fn invalid_address(msg: impl Into<String>) -> Self {
        BlockError::InvalidAddress(msg.into())
    }

    /// Check if this error came from the transport
    ///
    /// Callers treat these as "no data this cycle"; everything else is a
    /// caller mistake (bad address, bad value) and is reported as such.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, BlockError::Connection(_))
    }

    /// Check if the caller should surface the target as unavailable
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            BlockError::Connection(_) | BlockError::BlockNotAvailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let err: TransportError =
            std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out").into();
        assert!(matches!(err, TransportError::Timeout(_)));

        let err: TransportError =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset").into();
        assert!(matches!(err, TransportError::ConnectionLost(_)));

        let err: TransportError =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
    }

    #[test]
    fn test_error_classification() {
        let err = BlockError::from(TransportError::NotConnected);
        assert!(err.is_connection_error());
        assert!(err.is_unavailable());

        assert!(!BlockError::out_of_range(10, 4, 12).is_connection_error());
        assert!(BlockError::BlockNotAvailable(40).is_unavailable());
        assert!(!BlockError::unsupported("bool write").is_unavailable());
    }

    #[test]
    fn test_error_display() {
        let err = BlockError::out_of_range(53, 4, 54);
        assert_eq!(
            err.to_string(),
            "Out of range: 4 byte(s) at offset 53 exceed buffer of 54 bytes"
        );
        assert_eq!(
            BlockError::BlockNotAvailable(40).to_string(),
            "Block not available: DB40"
        );
    }
}
