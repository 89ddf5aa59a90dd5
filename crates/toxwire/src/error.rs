//! Error types for the toxwire session layer

use thiserror::Error;
use toxwire_engine::DispatchError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Session errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The engine could not be allocated
    #[error("Engine initialization failed")]
    Init,

    /// The session has been torn down
    #[error("Bad session: the engine handle has been released")]
    BadSession,

    /// An argument was rejected before reaching the engine
    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] ArgumentError),

    /// The engine reported failure for an operation
    #[error("Operation failed: {0}")]
    OperationFailed(&'static str),

    /// The engine refused a friend request
    #[error("Friend request failed: {0}")]
    FriendAdd(#[from] FriendAddError),

    /// Hex input could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] hex::FromHexError),

    /// A notification could not be routed to its session
    #[error("Notification dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    /// The operation is not allowed from inside a notification handler
    #[error("Operation not permitted from inside a notification handler")]
    InCallback,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Friend request failures reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum FriendAddError {
    /// Attached message is longer than the engine allows
    #[error("message too long")]
    TooLong,
    /// No message attached
    #[error("no message attached")]
    NoMessage,
    /// The address is our own
    #[error("address is our own")]
    OwnKey,
    /// Request already sent, or already a friend
    #[error("request already sent")]
    AlreadySent,
    /// Unspecified engine failure
    #[error("unknown failure")]
    Unknown,
    /// Address checksum does not match
    #[error("bad address checksum")]
    BadChecksum,
    /// Already a friend under a different nospam; the engine stored the new one
    #[error("friend already known, nospam updated")]
    SetNewNospam,
    /// Engine ran out of memory
    #[error("out of memory")]
    NoMem,
}

/// Arguments rejected locally
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    /// Fixed-size field with the wrong size
    #[error("{field} must be {expected} bytes, got {actual}")]
    WrongLength {
        /// Argument name
        field: &'static str,
        /// Required size
        expected: usize,
        /// Supplied size
        actual: usize,
    },

    /// Bounded field over its maximum
    #[error("{field} exceeds {max} bytes (got {actual})")]
    TooLong {
        /// Argument name
        field: &'static str,
        /// Maximum size
        max: usize,
        /// Supplied size
        actual: usize,
    },

    /// Field that must carry data was empty
    #[error("{field} must not be empty")]
    Empty {
        /// Argument name
        field: &'static str,
    },

    /// String contains a NUL byte
    #[error("{field} contains an interior NUL byte")]
    InteriorNul {
        /// Argument name
        field: &'static str,
    },
}

impl From<toxwire_core::Error> for Error {
    fn from(err: toxwire_core::Error) -> Self {
        match err {
            toxwire_core::Error::InvalidLength { kind, expected, actual } => {
                Error::InvalidArgument(ArgumentError::WrongLength {
                    field: kind,
                    expected,
                    actual,
                })
            }
            toxwire_core::Error::Hex(e) => Error::Decode(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_convert() {
        let err: Error = toxwire_core::ClientId::from_slice(&[0u8; 3]).unwrap_err().into();
        assert!(matches!(
            err,
            Error::InvalidArgument(ArgumentError::WrongLength { expected: 32, actual: 3, .. })
        ));

        let err: Error = toxwire_core::ClientId::from_hex("zz").unwrap_err().into();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_error_messages() {
        let err = Error::InvalidArgument(ArgumentError::TooLong {
            field: "name",
            max: 128,
            actual: 200,
        });
        assert_eq!(err.to_string(), "Invalid argument: name exceeds 128 bytes (got 200)");
        assert_eq!(
            Error::FriendAdd(FriendAddError::BadChecksum).to_string(),
            "Friend request failed: bad address checksum"
        );
    }
}
