//! # toxwire-core
//!
//! Identifiers, size limits and the closed enumerations that both the engine
//! boundary and the session layer speak.
//!
//! ## Identifiers
//!
//! - [`ClientId`]: the stable public identifier of a peer
//! - [`FriendAddress`]: client ID + nospam + checksum, used to send requests
//! - [`FriendNumber`] / [`FileNumber`]: engine-assigned handles, never
//!   synthesized by the wrapper

#![warn(missing_docs)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    ClientId, FileControl, FileNumber, FriendAddress, FriendNumber, TransferDirection, UserStatus,
};

/// Size of a client ID (public key) in bytes
pub const CLIENT_ID_SIZE: usize = 32;

/// Size of the nospam value embedded in a friend address
pub const NOSPAM_SIZE: usize = 4;

/// Size of the friend address checksum
pub const CHECKSUM_SIZE: usize = 2;

/// Size of a friend address: client ID + nospam + checksum
pub const FRIEND_ADDRESS_SIZE: usize = CLIENT_ID_SIZE + NOSPAM_SIZE + CHECKSUM_SIZE;

/// Maximum nickname length in bytes
pub const MAX_NAME_LENGTH: usize = 128;

/// Maximum status message length in bytes
pub const MAX_STATUS_MESSAGE_LENGTH: usize = 1007;

/// Maximum length of a single message or action
pub const MAX_MESSAGE_LENGTH: usize = 1368;

/// Maximum length of the message attached to a friend request
pub const MAX_FRIEND_REQUEST_DATA_SIZE: usize = 1016;

/// Maximum file name length for a file transfer
pub const MAX_FILENAME_LENGTH: usize = 255;
