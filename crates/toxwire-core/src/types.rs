//! Core types used throughout toxwire

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::{CHECKSUM_SIZE, CLIENT_ID_SIZE, FRIEND_ADDRESS_SIZE, NOSPAM_SIZE};

/// Public identifier of a peer, stable across sessions
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId([u8; CLIENT_ID_SIZE]);

impl ClientId {
    /// Create from raw bytes
    pub const fn from_bytes(bytes: [u8; CLIENT_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly [`CLIENT_ID_SIZE`] bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; CLIENT_ID_SIZE] = bytes.try_into().map_err(|_| Error::InvalidLength {
            kind: "client ID",
            expected: CLIENT_ID_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }

    /// Parse from hexadecimal (either case)
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())?;
        Self::from_slice(&bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; CLIENT_ID_SIZE] {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self)
    }
}

impl FromStr for ClientId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for ClientId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Address handed out to prospective friends.
///
/// Layout: client ID, big-endian nospam, then a two byte checksum computed by
/// folding the first 36 bytes together with XOR.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FriendAddress([u8; FRIEND_ADDRESS_SIZE]);

impl FriendAddress {
    /// Build an address for `client_id` with the given nospam, computing the checksum
    pub fn new(client_id: &ClientId, nospam: u32) -> Self {
        let mut bytes = [0u8; FRIEND_ADDRESS_SIZE];
        bytes[..CLIENT_ID_SIZE].copy_from_slice(client_id.as_bytes());
        bytes[CLIENT_ID_SIZE..CLIENT_ID_SIZE + NOSPAM_SIZE].copy_from_slice(&nospam.to_be_bytes());
        let checksum = Self::compute_checksum(&bytes[..CLIENT_ID_SIZE + NOSPAM_SIZE]);
        bytes[CLIENT_ID_SIZE + NOSPAM_SIZE..].copy_from_slice(&checksum);
        Self(bytes)
    }

    /// Create from raw bytes. The checksum is not verified.
    pub const fn from_bytes(bytes: [u8; FRIEND_ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly [`FRIEND_ADDRESS_SIZE`] bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; FRIEND_ADDRESS_SIZE] =
            bytes.try_into().map_err(|_| Error::InvalidLength {
                kind: "friend address",
                expected: FRIEND_ADDRESS_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(array))
    }

    /// Parse from hexadecimal (either case)
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())?;
        Self::from_slice(&bytes)
    }

    /// Client ID part
    pub fn client_id(&self) -> ClientId {
        let mut id = [0u8; CLIENT_ID_SIZE];
        id.copy_from_slice(&self.0[..CLIENT_ID_SIZE]);
        ClientId(id)
    }

    /// Nospam part
    pub fn nospam(&self) -> u32 {
        let mut nospam = [0u8; NOSPAM_SIZE];
        nospam.copy_from_slice(&self.0[CLIENT_ID_SIZE..CLIENT_ID_SIZE + NOSPAM_SIZE]);
        u32::from_be_bytes(nospam)
    }

    /// Checksum part
    pub fn checksum(&self) -> [u8; CHECKSUM_SIZE] {
        let mut checksum = [0u8; CHECKSUM_SIZE];
        checksum.copy_from_slice(&self.0[CLIENT_ID_SIZE + NOSPAM_SIZE..]);
        checksum
    }

    /// Whether the embedded checksum matches the client ID and nospam
    pub fn checksum_is_valid(&self) -> bool {
        Self::compute_checksum(&self.0[..CLIENT_ID_SIZE + NOSPAM_SIZE]) == self.checksum()
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; FRIEND_ADDRESS_SIZE] {
        &self.0
    }

    fn compute_checksum(data: &[u8]) -> [u8; CHECKSUM_SIZE] {
        let mut checksum = [0u8; CHECKSUM_SIZE];
        for (i, byte) in data.iter().enumerate() {
            checksum[i % CHECKSUM_SIZE] ^= byte;
        }
        checksum
    }
}

impl fmt::Display for FriendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for FriendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FriendAddress({})", self)
    }
}

impl FromStr for FriendAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for FriendAddress {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

macro_rules! hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_serde!(ClientId);
hex_serde!(FriendAddress);

/// Engine-assigned handle for a friendship.
///
/// Only valid while the friendship exists; the engine may hand the same number
/// to a different friend after a deletion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FriendNumber(i32);

impl FriendNumber {
    /// Wrap a value produced by the engine
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Value to hand back to the engine
    pub const fn as_raw(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for FriendNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Engine-assigned file transfer slot, scoped per friend and direction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileNumber(u8);

impl FileNumber {
    /// Wrap a value produced by the engine
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// Value to hand back to the engine
    pub const fn as_raw(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for FileNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Presence of the local user or a friend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Available
    None,
    /// Away
    Away,
    /// Busy
    Busy,
    /// Error sentinel, never a legitimate state
    Invalid,
}

impl UserStatus {
    /// Decode the engine's byte; unknown values become [`UserStatus::Invalid`]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::None,
            1 => Self::Away,
            2 => Self::Busy,
            _ => Self::Invalid,
        }
    }

    /// Byte understood by the engine
    pub const fn as_raw(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Away => 1,
            Self::Busy => 2,
            Self::Invalid => 3,
        }
    }
}

impl Default for UserStatus {
    fn default() -> Self {
        Self::None
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "online",
            Self::Away => "away",
            Self::Busy => "busy",
            Self::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// Transfer-control verb
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileControl {
    /// Receiver accepts the transfer (or a pause is lifted)
    Accept,
    /// Pause the transfer
    Pause,
    /// Cancel the transfer
    Kill,
    /// Sender has sent every chunk
    Finished,
    /// Resume a broken transfer from a given offset
    ResumeBroken,
}

impl FileControl {
    /// Byte understood by the engine
    pub const fn as_raw(&self) -> u8 {
        match self {
            Self::Accept => 0,
            Self::Pause => 1,
            Self::Kill => 2,
            Self::Finished => 3,
            Self::ResumeBroken => 4,
        }
    }
}

impl TryFrom<u8> for FileControl {
    type Error = u8;

    fn try_from(raw: u8) -> std::result::Result<Self, u8> {
        match raw {
            0 => Ok(Self::Accept),
            1 => Ok(Self::Pause),
            2 => Ok(Self::Kill),
            3 => Ok(Self::Finished),
            4 => Ok(Self::ResumeBroken),
            other => Err(other),
        }
    }
}

/// Which side of a transfer a file number refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    /// A file we are sending
    Sending,
    /// A file we are receiving
    Receiving,
}

impl TransferDirection {
    /// Engine flag: 0 targets a file we send, 1 a file we receive
    pub const fn as_flag(&self) -> u8 {
        match self {
            Self::Sending => 0,
            Self::Receiving => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_id() -> ClientId {
        let mut bytes = [0u8; CLIENT_ID_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        ClientId::from_bytes(bytes)
    }

    #[test]
    fn test_address_layout() {
        let id = sample_id();
        let address = FriendAddress::new(&id, 0xDEADBEEF);

        assert_eq!(address.client_id(), id);
        assert_eq!(address.nospam(), 0xDEADBEEF);
        assert!(address.checksum_is_valid());
    }

    #[test]
    fn test_address_checksum_detects_corruption() {
        let address = FriendAddress::new(&sample_id(), 7);
        let mut bytes = *address.as_bytes();
        bytes[3] ^= 0xFF;

        assert!(!FriendAddress::from_bytes(bytes).checksum_is_valid());
    }

    #[test]
    fn test_hex_roundtrip_is_case_insensitive() {
        let address = FriendAddress::new(&sample_id(), 42);
        let upper = address.to_string();
        let lower = upper.to_lowercase();

        assert_eq!(upper.len(), FRIEND_ADDRESS_SIZE * 2);
        assert_eq!(lower.parse::<FriendAddress>().unwrap(), address);
    }

    #[test]
    fn test_client_id_rejects_bad_input() {
        assert!(matches!(ClientId::from_hex("zz"), Err(Error::Hex(_))));
        assert_eq!(
            ClientId::from_hex("ABCD"),
            Err(Error::InvalidLength {
                kind: "client ID",
                expected: CLIENT_ID_SIZE,
                actual: 2
            })
        );
    }

    #[test]
    fn test_client_id_serde_as_hex() {
        let id = sample_id();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));

        let back: ClientId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_user_status_raw_values() {
        assert_eq!(UserStatus::from_raw(0), UserStatus::None);
        assert_eq!(UserStatus::from_raw(2), UserStatus::Busy);
        assert_eq!(UserStatus::from_raw(3), UserStatus::Invalid);
        assert_eq!(UserStatus::from_raw(200), UserStatus::Invalid);
        assert_eq!(UserStatus::Away.as_raw(), 1);
    }

    #[test]
    fn test_file_control_raw_values() {
        assert_eq!(FileControl::try_from(4), Ok(FileControl::ResumeBroken));
        assert_eq!(FileControl::try_from(9), Err(9));
        assert_eq!(FileControl::Kill.as_raw(), 2);
    }

    #[test]
    fn test_transfer_direction_flag() {
        assert_eq!(TransferDirection::Sending.as_flag(), 0);
        assert_eq!(TransferDirection::Receiving.as_flag(), 1);
    }
}
