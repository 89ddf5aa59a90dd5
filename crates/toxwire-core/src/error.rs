//! Error types for toxwire core

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building identifiers from untrusted input
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Byte sequence has the wrong size for a fixed-size identifier
    #[error("Invalid {kind} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Identifier being built
        kind: &'static str,
        /// Required size
        expected: usize,
        /// Size that was supplied
        actual: usize,
    },

    /// Input is not valid hexadecimal
    #[error("Hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}
