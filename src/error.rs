//! # Error Types
//!
//! Error handling for the game protocol core.
//!
//! Every fallible operation in the crate returns [`Result`], whose error side is
//! [`ProtocolError`]. Errors are grouped into the categories reported by
//! [`ProtocolError::category`]:
//!
//! ## Error Categories
//! - **Framing**: buffer underflow/overflow, bit/byte access-mode violations
//! - **Protocol**: unexpected request codes, version mismatches, malformed login blocks
//! - **Resource**: socket I/O failures, closed connections, exhausted player slots
//! - **Config**: invalid or unreadable configuration
//!
//! Every category is fatal for the session that produced it and is never retried.
//! A partially received packet is *not* an error: the handshake and dispatcher
//! report it as "waiting for more bytes" and keep their resumable state.
//!
//! ## Example Usage
//! ```rust
//! use game_protocol::core::buffer::ByteBuffer;
//! use game_protocol::error::{ErrorCategory, ProtocolError};
//!
//! let mut buffer = ByteBuffer::new(1);
//! buffer.write(7).unwrap();
//! let err = buffer.write(8).unwrap_err();
//! assert!(matches!(err, ProtocolError::OutOfBounds { index: 1, capacity: 1 }));
//! assert_eq!(err.category(), ErrorCategory::Framing);
//! ```

use std::io;
use thiserror::Error;

use crate::core::buffer::AccessMode;
use crate::core::codec::ByteOrder;
use crate::protocol::handshake::{LoginResponse, LoginStage};

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Registry-related error messages
    pub const ERR_REGISTRY_LOCK: &str = "Failed to acquire lock on connection registry";

    /// Login block validation errors
    pub const ERR_RSA_OPCODE: &str = "RSA block opcode must be 10";
    pub const ERR_BLOCK_OVERRUN: &str = "Login block fields overrun the declared block length";
    pub const ERR_STRING_UNTERMINATED: &str = "Login block string is missing its newline terminator";
}

/// Coarse classification of a [`ProtocolError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Buffer bounds and access-mode violations.
    Framing,
    /// Violations of the wire protocol by the remote peer.
    Protocol,
    /// Socket and slot exhaustion failures.
    Resource,
    /// Invalid configuration.
    Config,
}

// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    // ── Framing ──────────────────────────────────────────────────
    #[error("Buffer index out of bounds: index {index}, capacity {capacity}")]
    OutOfBounds { index: usize, capacity: usize },

    #[error("Illegal buffer access mode: expected {expected:?}, buffer is in {actual:?}")]
    IllegalAccessMode {
        expected: AccessMode,
        actual: AccessMode,
    },

    #[error("Byte order {order:?} is not defined for {width}-byte values")]
    UnsupportedByteOrder { width: usize, order: ByteOrder },

    #[error("Invalid bit field width: {0} (valid range: 1-32)")]
    InvalidBitCount(u32),

    #[error("Buffer underflow: needed {needed} bytes, {available} available")]
    BufferUnderflow { needed: usize, available: usize },

    #[error("String contains the reserved terminator byte at offset {0}")]
    StringContainsTerminator(usize),

    #[error("String is missing its newline terminator within {0} unread bytes")]
    UnterminatedString(usize),

    // ── Protocol ─────────────────────────────────────────────────
    #[error("Unexpected packet size: received {received}, expected {expected}")]
    UnexpectedPacketSize { expected: usize, received: usize },

    #[error("Invalid login request type: {0}")]
    InvalidLoginRequest(u8),

    #[error("Invalid login block magic: {0}")]
    InvalidMagic(u8),

    #[error("Unsupported client version: {0}")]
    UnsupportedVersion(u16),

    #[error("Malformed login block: {0}")]
    MalformedHandshake(&'static str),

    #[error("Login rejected: {0:?}")]
    LoginRejected(LoginResponse),

    #[error("Operation requires stage {expected:?}, session is in {actual:?}")]
    UnexpectedStage {
        expected: LoginStage,
        actual: LoginStage,
    },

    // ── Resource ─────────────────────────────────────────────────
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("No free player slot")]
    ServerFull,

    // ── Config ───────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProtocolError::OutOfBounds { .. }
            | ProtocolError::IllegalAccessMode { .. }
            | ProtocolError::UnsupportedByteOrder { .. }
            | ProtocolError::InvalidBitCount(_)
            | ProtocolError::BufferUnderflow { .. }
            | ProtocolError::StringContainsTerminator(_)
            | ProtocolError::UnterminatedString(_) => ErrorCategory::Framing,
            ProtocolError::UnexpectedPacketSize { .. }
            | ProtocolError::InvalidLoginRequest(_)
            | ProtocolError::InvalidMagic(_)
            | ProtocolError::UnsupportedVersion(_)
            | ProtocolError::MalformedHandshake(_)
            | ProtocolError::LoginRejected(_)
            | ProtocolError::UnexpectedStage { .. } => ErrorCategory::Protocol,
            ProtocolError::Io(_) | ProtocolError::ConnectionClosed | ProtocolError::ServerFull => {
                ErrorCategory::Resource
            }
            ProtocolError::ConfigError(_) | ProtocolError::Custom(_) => ErrorCategory::Config,
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_context() {
        let e = ProtocolError::UnexpectedPacketSize {
            expected: 2,
            received: 1,
        };
        assert!(e.to_string().contains("received 1"));
        assert!(e.to_string().contains("expected 2"));

        let e = ProtocolError::UnsupportedVersion(289);
        assert!(e.to_string().contains("289"));

        let e = ProtocolError::InvalidLoginRequest(99);
        assert!(e.to_string().contains("99"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            ProtocolError::InvalidBitCount(33).category(),
            ErrorCategory::Framing
        );
        assert_eq!(
            ProtocolError::UnterminatedString(3).category(),
            ErrorCategory::Framing
        );
        assert_eq!(
            ProtocolError::InvalidMagic(1).category(),
            ErrorCategory::Protocol
        );
        assert_eq!(
            ProtocolError::ConnectionClosed.category(),
            ErrorCategory::Resource
        );
    }

    #[test]
    fn test_from_io() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe broke");
        let e: ProtocolError = io_err.into();
        assert!(matches!(e, ProtocolError::Io(_)));
        assert_eq!(e.category(), ErrorCategory::Resource);
    }
}
