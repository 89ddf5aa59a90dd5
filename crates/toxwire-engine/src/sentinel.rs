//! Failure codes returned across the engine boundary.
//!
//! These values belong to the engine. The session layer interprets them in
//! exactly one place (its error translator); engines produce them.

/// Generic failure for calls returning a signed status, count or handle
pub const FAILURE: i32 = -1;

/// Success for calls returning a signed status
pub const SUCCESS: i32 = 0;

/// Failure for calls returning an unsigned message ID
pub const NO_MESSAGE_ID: u32 = 0;

/// Failure for the unsigned "bytes remaining" query
pub const NO_BYTES_REMAINING: u64 = 0;

/// Failure for the last-online query
pub const NO_LAST_ONLINE: i64 = -1;

/// Friend request message longer than the engine allows
pub const FAERR_TOOLONG: i32 = -1;
/// Friend request without a message
pub const FAERR_NOMESSAGE: i32 = -2;
/// Address is our own
pub const FAERR_OWNKEY: i32 = -3;
/// Request already sent or the peer is already a friend
pub const FAERR_ALREADYSENT: i32 = -4;
/// Unspecified failure
pub const FAERR_UNKNOWN: i32 = -5;
/// Address checksum mismatch
pub const FAERR_BADCHECKSUM: i32 = -6;
/// Friend already known with a different nospam; nospam was updated
pub const FAERR_SETNEWNOSPAM: i32 = -7;
/// Engine could not allocate the friend
pub const FAERR_NOMEM: i32 = -8;

/// Raw user status value the engine reports for unknown friends
pub const USERSTATUS_INVALID: u8 = 3;

/// Boolean true as used by flags crossing the boundary
pub const TRUE: u8 = 1;

/// Boolean false as used by flags crossing the boundary
pub const FALSE: u8 = 0;
