//! Engine sentinel codes to session errors.
//!
//! This is the only module that interprets the engine's failure values. Each
//! function covers one family of call sites; `op` names the engine operation
//! and is carried in [`Error::OperationFailed`].

use chrono::{DateTime, Utc};

use toxwire_core::{FileNumber, FriendNumber, UserStatus};
use toxwire_engine::sentinel::{
    FAERR_ALREADYSENT, FAERR_BADCHECKSUM, FAERR_NOMEM, FAERR_NOMESSAGE, FAERR_OWNKEY,
    FAERR_SETNEWNOSPAM, FAERR_TOOLONG, FAERR_UNKNOWN, NO_BYTES_REMAINING,
    NO_LAST_ONLINE, NO_MESSAGE_ID, SUCCESS, TRUE,
};

use crate::error::{Error, FriendAddError, Result};

/// Mutator returning 0 on success
pub fn status(code: i32, op: &'static str) -> Result<()> {
    if code == SUCCESS {
        Ok(())
    } else {
        Err(Error::OperationFailed(op))
    }
}

/// Count or size query where negative values are failures
pub fn count(code: i32, op: &'static str) -> Result<usize> {
    usize::try_from(code).map_err(|_| Error::OperationFailed(op))
}

/// Message send returning a correlation ID, 0 on failure
pub fn receipt(id: u32, op: &'static str) -> Result<u32> {
    if id == NO_MESSAGE_ID {
        Err(Error::OperationFailed(op))
    } else {
        Ok(id)
    }
}

/// Friend-add result: a friend number or one of the `FAERR_*` codes
pub fn friend_add(code: i32) -> Result<FriendNumber> {
    if code >= 0 {
        return Ok(FriendNumber::from_raw(code));
    }
    let err = match code {
        FAERR_TOOLONG => FriendAddError::TooLong,
        FAERR_NOMESSAGE => FriendAddError::NoMessage,
        FAERR_OWNKEY => FriendAddError::OwnKey,
        FAERR_ALREADYSENT => FriendAddError::AlreadySent,
        FAERR_UNKNOWN => FriendAddError::Unknown,
        FAERR_BADCHECKSUM => FriendAddError::BadChecksum,
        FAERR_SETNEWNOSPAM => FriendAddError::SetNewNospam,
        FAERR_NOMEM => FriendAddError::NoMem,
        _ => return Err(Error::OperationFailed("add_friend")),
    };
    Err(Error::FriendAdd(err))
}

/// Call returning a friend number, -1 on failure
pub fn friend_number(code: i32, op: &'static str) -> Result<FriendNumber> {
    if code < 0 {
        Err(Error::OperationFailed(op))
    } else {
        Ok(FriendNumber::from_raw(code))
    }
}

/// Friend lookup by client ID; an unknown key is not an error
pub fn friend_lookup(code: i32) -> Option<FriendNumber> {
    (code >= 0).then(|| FriendNumber::from_raw(code))
}

/// Call returning a file number, -1 on failure
pub fn file_number(code: i32, op: &'static str) -> Result<FileNumber> {
    u8::try_from(code)
        .map(FileNumber::from_raw)
        .map_err(|_| Error::OperationFailed(op))
}

/// Bytes remaining in a transfer; the engine reports failure as 0
pub fn remaining(bytes: u64, op: &'static str) -> Result<u64> {
    if bytes == NO_BYTES_REMAINING {
        Err(Error::OperationFailed(op))
    } else {
        Ok(bytes)
    }
}

/// Last-online time. `None` when the friend has never been seen.
pub fn last_online(seconds: i64, op: &'static str) -> Result<Option<DateTime<Utc>>> {
    match seconds {
        NO_LAST_ONLINE => Err(Error::OperationFailed(op)),
        s if s < 0 => Err(Error::OperationFailed(op)),
        0 => Ok(None),
        s => DateTime::from_timestamp(s, 0)
            .map(Some)
            .ok_or(Error::OperationFailed(op)),
    }
}

/// Tri-state query: 1 yes, 0 no, negative failure
pub fn tri_state(code: i32, op: &'static str) -> Result<bool> {
    match code {
        c if c < 0 => Err(Error::OperationFailed(op)),
        c => Ok(c == i32::from(TRUE)),
    }
}

/// Boolean query that cannot fail
pub fn flag(value: u8) -> bool {
    value == TRUE
}

/// User status of a friend; the invalid value marks an unknown friend
pub fn user_status(raw: u8, op: &'static str) -> Result<UserStatus> {
    match UserStatus::from_raw(raw) {
        UserStatus::Invalid => Err(Error::OperationFailed(op)),
        status => Ok(status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_friend_add_mapping() {
        let table = [
            (FAERR_TOOLONG, FriendAddError::TooLong),
            (FAERR_NOMESSAGE, FriendAddError::NoMessage),
            (FAERR_OWNKEY, FriendAddError::OwnKey),
            (FAERR_ALREADYSENT, FriendAddError::AlreadySent),
            (FAERR_UNKNOWN, FriendAddError::Unknown),
            (FAERR_BADCHECKSUM, FriendAddError::BadChecksum),
            (FAERR_SETNEWNOSPAM, FriendAddError::SetNewNospam),
            (FAERR_NOMEM, FriendAddError::NoMem),
        ];

        let mut seen = std::collections::HashSet::new();
        for (code, expected) in table {
            assert_eq!(friend_add(code), Err(Error::FriendAdd(expected)));
            assert!(seen.insert(expected), "{expected:?} mapped twice");
        }
        assert_eq!(seen.len(), 8);

        assert_eq!(friend_add(0), Ok(FriendNumber::from_raw(0)));
        assert_eq!(friend_add(41), Ok(FriendNumber::from_raw(41)));
        assert_eq!(friend_add(-42), Err(Error::OperationFailed("add_friend")));
        assert_eq!(friend_add(-99), Err(Error::OperationFailed("add_friend")));
    }

    #[test]
    fn test_negative_counts_fail() {
        assert_eq!(count(-1, "get_name_size"), Err(Error::OperationFailed("get_name_size")));
        assert_eq!(count(0, "get_name_size"), Ok(0));
        assert_eq!(count(12, "get_name_size"), Ok(12));
    }

    #[test]
    fn test_status_and_receipt() {
        assert!(status(0, "set_name").is_ok());
        assert_eq!(status(-1, "set_name"), Err(Error::OperationFailed("set_name")));
        assert_eq!(receipt(0, "send_message"), Err(Error::OperationFailed("send_message")));
        assert_eq!(receipt(7, "send_message"), Ok(7));
    }

    #[test]
    fn test_friend_lookup_unknown_is_none() {
        assert_eq!(friend_lookup(-1), None);
        assert_eq!(friend_lookup(3), Some(FriendNumber::from_raw(3)));
    }

    #[test]
    fn test_file_number_range() {
        assert_eq!(file_number(255, "new_file_sender"), Ok(FileNumber::from_raw(255)));
        assert!(file_number(-1, "new_file_sender").is_err());
        assert!(file_number(256, "new_file_sender").is_err());
    }

    #[test]
    fn test_last_online() {
        assert!(last_online(-1, "get_last_online").is_err());
        assert_eq!(last_online(0, "get_last_online"), Ok(None));
        let seen = last_online(1_400_000_000, "get_last_online").unwrap().unwrap();
        assert_eq!(seen.timestamp(), 1_400_000_000);
    }

    #[test]
    fn test_user_status_invalid_is_failure() {
        assert_eq!(user_status(2, "get_user_status"), Ok(UserStatus::Busy));
        assert!(user_status(3, "get_user_status").is_err());
        assert!(user_status(200, "get_user_status").is_err());
    }

    #[test]
    fn test_tri_state() {
        assert_eq!(tri_state(1, "get_friend_connection_status"), Ok(true));
        assert_eq!(tri_state(0, "get_friend_connection_status"), Ok(false));
        assert_eq!(tri_state(-1, "friend_exists"), Err(Error::OperationFailed("friend_exists")));
    }
}
