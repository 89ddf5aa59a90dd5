//! Typed notification payloads.
//!
//! Every byte buffer is copied out of the engine's borrowed slice and cut to
//! the length the engine reported, so handlers may keep payloads after the
//! tick returns.

use thiserror::Error;

use toxwire_core::{
    ClientId, FileControl, FileNumber, FriendNumber, TransferDirection, UserStatus,
};
use toxwire_engine::{NotificationKind, RawNotification};

use crate::marshal::truncate_reported;

/// Someone wants to be our friend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FriendRequest {
    /// Requester's client ID
    pub public_key: ClientId,
    /// Message attached to the request
    pub message: Vec<u8>,
}

/// Message from a friend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FriendMessage {
    /// Sender
    pub friend: FriendNumber,
    /// Message bytes
    pub message: Vec<u8>,
}

/// Action (emote) from a friend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FriendAction {
    /// Sender
    pub friend: FriendNumber,
    /// Action bytes
    pub action: Vec<u8>,
}

/// A friend changed their name
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameChange {
    /// Friend
    pub friend: FriendNumber,
    /// New name
    pub name: Vec<u8>,
}

/// A friend changed their status message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusMessageChange {
    /// Friend
    pub friend: FriendNumber,
    /// New status message
    pub status: Vec<u8>,
}

/// A friend changed their user status
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserStatusChange {
    /// Friend
    pub friend: FriendNumber,
    /// New status
    pub status: UserStatus,
}

/// A friend started or stopped typing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypingChange {
    /// Friend
    pub friend: FriendNumber,
    /// Whether they are typing now
    pub typing: bool,
}

/// A friend received one of our messages
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadReceipt {
    /// Friend
    pub friend: FriendNumber,
    /// ID returned when the message was sent
    pub receipt: u32,
}

/// A friend went online or offline
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionChange {
    /// Friend
    pub friend: FriendNumber,
    /// Whether they are online now
    pub online: bool,
}

/// A friend offers us a file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileSendRequest {
    /// Friend
    pub friend: FriendNumber,
    /// Incoming file slot
    pub file_number: FileNumber,
    /// Announced size in bytes
    pub file_size: u64,
    /// File name
    pub filename: Vec<u8>,
}

/// Transfer-control message from a friend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileControlMessage {
    /// Friend
    pub friend: FriendNumber,
    /// Which of our transfers the message is about
    pub direction: TransferDirection,
    /// File slot
    pub file_number: FileNumber,
    /// Control verb
    pub control: FileControl,
    /// Payload; empty when the engine passed none
    pub data: Vec<u8>,
}

/// A chunk of an incoming file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileChunk {
    /// Friend
    pub friend: FriendNumber,
    /// Incoming file slot
    pub file_number: FileNumber,
    /// Chunk bytes
    pub data: Vec<u8>,
}

/// Any decoded notification
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// See [`FriendRequest`]
    FriendRequest(FriendRequest),
    /// See [`FriendMessage`]
    FriendMessage(FriendMessage),
    /// See [`FriendAction`]
    FriendAction(FriendAction),
    /// See [`NameChange`]
    NameChange(NameChange),
    /// See [`StatusMessageChange`]
    StatusMessage(StatusMessageChange),
    /// See [`UserStatusChange`]
    UserStatus(UserStatusChange),
    /// See [`TypingChange`]
    TypingChange(TypingChange),
    /// See [`ReadReceipt`]
    ReadReceipt(ReadReceipt),
    /// See [`ConnectionChange`]
    ConnectionStatus(ConnectionChange),
    /// See [`FileSendRequest`]
    FileSendRequest(FileSendRequest),
    /// See [`FileControlMessage`]
    FileControl(FileControlMessage),
    /// See [`FileChunk`]
    FileData(FileChunk),
}

/// A notification whose arguments cannot be represented
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedNotification {
    /// Friend request key of the wrong size
    #[error("friend request public key is {0} bytes")]
    PublicKey(usize),

    /// Unknown control verb
    #[error("unknown file control verb {0}")]
    FileControl(u8),

    /// User status outside none, away and busy
    #[error("user status {0} out of range")]
    UserStatus(u8),
}

fn owned(buf: &[u8], reported: u16) -> Vec<u8> {
    truncate_reported(buf, usize::from(reported)).to_vec()
}

/// The control notification flag is 1 for a file we are sending, the reverse
/// of the flag passed to control calls
fn notified_direction(receive_send: u8) -> TransferDirection {
    if receive_send == 1 {
        TransferDirection::Sending
    } else {
        TransferDirection::Receiving
    }
}

impl Event {
    /// Kind of this event
    pub fn kind(&self) -> NotificationKind {
        match self {
            Event::FriendRequest(_) => NotificationKind::FriendRequest,
            Event::FriendMessage(_) => NotificationKind::FriendMessage,
            Event::FriendAction(_) => NotificationKind::FriendAction,
            Event::NameChange(_) => NotificationKind::NameChange,
            Event::StatusMessage(_) => NotificationKind::StatusMessage,
            Event::UserStatus(_) => NotificationKind::UserStatus,
            Event::TypingChange(_) => NotificationKind::TypingChange,
            Event::ReadReceipt(_) => NotificationKind::ReadReceipt,
            Event::ConnectionStatus(_) => NotificationKind::ConnectionStatus,
            Event::FileSendRequest(_) => NotificationKind::FileSendRequest,
            Event::FileControl(_) => NotificationKind::FileControl,
            Event::FileData(_) => NotificationKind::FileData,
        }
    }

    /// Decode the engine's arguments, truncating buffers to their reported length
    pub fn decode(raw: RawNotification<'_>) -> Result<Event, MalformedNotification> {
        let event = match raw {
            RawNotification::FriendRequest { public_key, data, length } => {
                let public_key = ClientId::from_slice(public_key)
                    .map_err(|_| MalformedNotification::PublicKey(public_key.len()))?;
                Event::FriendRequest(FriendRequest {
                    public_key,
                    message: owned(data, length),
                })
            }
            RawNotification::FriendMessage { friend, message, length } => {
                Event::FriendMessage(FriendMessage {
                    friend: FriendNumber::from_raw(friend),
                    message: owned(message, length),
                })
            }
            RawNotification::FriendAction { friend, action, length } => {
                Event::FriendAction(FriendAction {
                    friend: FriendNumber::from_raw(friend),
                    action: owned(action, length),
                })
            }
            RawNotification::NameChange { friend, name, length } => Event::NameChange(NameChange {
                friend: FriendNumber::from_raw(friend),
                name: owned(name, length),
            }),
            RawNotification::StatusMessage { friend, status, length } => {
                Event::StatusMessage(StatusMessageChange {
                    friend: FriendNumber::from_raw(friend),
                    status: owned(status, length),
                })
            }
            RawNotification::UserStatus { friend, status: raw } => {
                let status = match UserStatus::from_raw(raw) {
                    UserStatus::Invalid => return Err(MalformedNotification::UserStatus(raw)),
                    status => status,
                };
                Event::UserStatus(UserStatusChange {
                    friend: FriendNumber::from_raw(friend),
                    status,
                })
            }
            RawNotification::TypingChange { friend, typing } => {
                Event::TypingChange(TypingChange {
                    friend: FriendNumber::from_raw(friend),
                    typing: typing == 1,
                })
            }
            RawNotification::ReadReceipt { friend, receipt } => Event::ReadReceipt(ReadReceipt {
                friend: FriendNumber::from_raw(friend),
                receipt,
            }),
            RawNotification::ConnectionStatus { friend, status } => {
                Event::ConnectionStatus(ConnectionChange {
                    friend: FriendNumber::from_raw(friend),
                    online: status == 1,
                })
            }
            RawNotification::FileSendRequest {
                friend,
                file_number,
                file_size,
                filename,
                length,
            } => Event::FileSendRequest(FileSendRequest {
                friend: FriendNumber::from_raw(friend),
                file_number: FileNumber::from_raw(file_number),
                file_size,
                filename: owned(filename, length),
            }),
            RawNotification::FileControl {
                friend,
                receive_send,
                file_number,
                control,
                data,
                length,
            } => {
                let control =
                    FileControl::try_from(control).map_err(MalformedNotification::FileControl)?;
                Event::FileControl(FileControlMessage {
                    friend: FriendNumber::from_raw(friend),
                    direction: notified_direction(receive_send),
                    file_number: FileNumber::from_raw(file_number),
                    control,
                    data: owned(data, length),
                })
            }
            RawNotification::FileData { friend, file_number, data, length } => {
                Event::FileData(FileChunk {
                    friend: FriendNumber::from_raw(friend),
                    file_number: FileNumber::from_raw(file_number),
                    data: owned(data, length),
                })
            }
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffers_truncated_to_reported_length() {
        let raw = RawNotification::FriendMessage {
            friend: 4,
            message: b"hello, world",
            length: 5,
        };
        assert_eq!(
            Event::decode(raw),
            Ok(Event::FriendMessage(FriendMessage {
                friend: FriendNumber::from_raw(4),
                message: b"hello".to_vec(),
            }))
        );
    }

    #[test]
    fn test_reported_length_past_buffer_is_clamped() {
        let raw = RawNotification::NameChange {
            friend: 0,
            name: b"ab",
            length: 400,
        };
        let Ok(Event::NameChange(change)) = Event::decode(raw) else {
            panic!("expected a name change");
        };
        assert_eq!(change.name, b"ab");
    }

    #[test]
    fn test_file_control_direction_and_empty_payload() {
        let raw = RawNotification::FileControl {
            friend: 1,
            receive_send: 1,
            file_number: 9,
            control: 0,
            data: &[],
            length: 0,
        };
        let event = Event::decode(raw).unwrap();
        assert_eq!(event.kind(), NotificationKind::FileControl);
        let Event::FileControl(msg) = event else {
            panic!("expected a file control message");
        };
        assert_eq!(msg.direction, TransferDirection::Sending);
        assert_eq!(msg.control, FileControl::Accept);
        assert!(msg.data.is_empty());
    }

    #[test]
    fn test_malformed_notifications() {
        let raw = RawNotification::FriendRequest {
            public_key: &[1, 2, 3],
            data: b"hi",
            length: 2,
        };
        assert_eq!(Event::decode(raw), Err(MalformedNotification::PublicKey(3)));

        let raw = RawNotification::FileControl {
            friend: 0,
            receive_send: 0,
            file_number: 0,
            control: 42,
            data: &[],
            length: 0,
        };
        assert_eq!(Event::decode(raw), Err(MalformedNotification::FileControl(42)));
    }

    #[test]
    fn test_out_of_range_user_status_is_malformed() {
        let raw = RawNotification::UserStatus { friend: 2, status: 3 };
        assert_eq!(Event::decode(raw), Err(MalformedNotification::UserStatus(3)));

        let raw = RawNotification::UserStatus { friend: 2, status: 2 };
        assert_eq!(
            Event::decode(raw),
            Ok(Event::UserStatus(UserStatusChange {
                friend: FriendNumber::from_raw(2),
                status: UserStatus::Busy,
            }))
        );
    }

    #[test]
    fn test_notified_direction_is_reverse_of_control_flag() {
        assert_eq!(notified_direction(1), TransferDirection::Sending);
        assert_eq!(notified_direction(0), TransferDirection::Receiving);
        assert_eq!(TransferDirection::Receiving.as_flag(), 1);
    }
}
