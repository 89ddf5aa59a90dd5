//! Notification hooks and the raw arguments they carry

use std::fmt;
use thiserror::Error;

/// The fixed set of asynchronous notifications an engine raises
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NotificationKind {
    /// Someone sent us a friend request
    FriendRequest,
    /// A friend sent a message
    FriendMessage,
    /// A friend sent an action (emote)
    FriendAction,
    /// A friend changed their name
    NameChange,
    /// A friend changed their status message
    StatusMessage,
    /// A friend changed their user status
    UserStatus,
    /// A friend started or stopped typing
    TypingChange,
    /// A friend confirmed receipt of a message
    ReadReceipt,
    /// A friend went online or offline
    ConnectionStatus,
    /// A friend wants to send us a file
    FileSendRequest,
    /// A transfer-control message arrived
    FileControl,
    /// A chunk of file data arrived
    FileData,
}

impl NotificationKind {
    /// Number of notification kinds
    pub const COUNT: usize = 12;

    /// Every kind, in table order
    pub const ALL: [NotificationKind; Self::COUNT] = [
        Self::FriendRequest,
        Self::FriendMessage,
        Self::FriendAction,
        Self::NameChange,
        Self::StatusMessage,
        Self::UserStatus,
        Self::TypingChange,
        Self::ReadReceipt,
        Self::ConnectionStatus,
        Self::FileSendRequest,
        Self::FileControl,
        Self::FileData,
    ];

    /// Position in a per-kind table
    pub const fn index(&self) -> usize {
        match self {
            Self::FriendRequest => 0,
            Self::FriendMessage => 1,
            Self::FriendAction => 2,
            Self::NameChange => 3,
            Self::StatusMessage => 4,
            Self::UserStatus => 5,
            Self::TypingChange => 6,
            Self::ReadReceipt => 7,
            Self::ConnectionStatus => 8,
            Self::FileSendRequest => 9,
            Self::FileControl => 10,
            Self::FileData => 11,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FriendRequest => "friend_request",
            Self::FriendMessage => "friend_message",
            Self::FriendAction => "friend_action",
            Self::NameChange => "name_change",
            Self::StatusMessage => "status_message",
            Self::UserStatus => "user_status",
            Self::TypingChange => "typing_change",
            Self::ReadReceipt => "read_receipt",
            Self::ConnectionStatus => "connection_status",
            Self::FileSendRequest => "file_send_request",
            Self::FileControl => "file_control",
            Self::FileData => "file_data",
        };
        f.write_str(s)
    }
}

/// Opaque user-data value an engine stores with a hook and passes back on every call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextToken(u64);

impl ContextToken {
    /// Wrap a raw token value
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw token value
    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Failure reported by a trampoline back to the engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The context token does not belong to a live session
    #[error("No live session for notification context {0}")]
    UnknownContext(ContextToken),
}

/// Function the engine calls for a notification
pub type Trampoline = fn(ContextToken, RawNotification<'_>) -> Result<(), DispatchError>;

/// A registered notification hook
#[derive(Clone, Copy)]
pub struct Hook {
    /// Function to call
    pub trampoline: Trampoline,
    /// Value passed back as the first argument
    pub context: ContextToken,
}

impl Hook {
    /// Invoke the hook with a notification
    pub fn fire(&self, notification: RawNotification<'_>) -> Result<(), DispatchError> {
        (self.trampoline)(self.context, notification)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook").field("context", &self.context).finish_non_exhaustive()
    }
}

/// Native notification arguments.
///
/// Buffers are borrowed from the engine for the duration of the call only and
/// come with the length the engine reports. The slice may be longer than that
/// length; consumers must truncate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawNotification<'a> {
    /// Friend request from `public_key` with an attached message
    FriendRequest {
        /// Requester's public key
        public_key: &'a [u8],
        /// Attached message
        data: &'a [u8],
        /// Reported message length
        length: u16,
    },
    /// Message from a friend
    FriendMessage {
        /// Friend number
        friend: i32,
        /// Message bytes
        message: &'a [u8],
        /// Reported length
        length: u16,
    },
    /// Action from a friend
    FriendAction {
        /// Friend number
        friend: i32,
        /// Action bytes
        action: &'a [u8],
        /// Reported length
        length: u16,
    },
    /// Friend's new name
    NameChange {
        /// Friend number
        friend: i32,
        /// Name bytes
        name: &'a [u8],
        /// Reported length
        length: u16,
    },
    /// Friend's new status message
    StatusMessage {
        /// Friend number
        friend: i32,
        /// Status message bytes
        status: &'a [u8],
        /// Reported length
        length: u16,
    },
    /// Friend's new user status
    UserStatus {
        /// Friend number
        friend: i32,
        /// Raw user status
        status: u8,
    },
    /// Friend's typing flag changed
    TypingChange {
        /// Friend number
        friend: i32,
        /// 1 when typing
        typing: u8,
    },
    /// Friend received a message we sent
    ReadReceipt {
        /// Friend number
        friend: i32,
        /// Message ID being acknowledged
        receipt: u32,
    },
    /// Friend connection changed
    ConnectionStatus {
        /// Friend number
        friend: i32,
        /// 1 when online
        status: u8,
    },
    /// Friend offers a file
    FileSendRequest {
        /// Friend number
        friend: i32,
        /// File slot
        file_number: u8,
        /// Total size
        file_size: u64,
        /// File name bytes
        filename: &'a [u8],
        /// Reported file name length
        length: u16,
    },
    /// Transfer-control message
    FileControl {
        /// Friend number
        friend: i32,
        /// 1 when the message targets a file we are sending, 0 for one we receive
        receive_send: u8,
        /// File slot
        file_number: u8,
        /// Raw control verb
        control: u8,
        /// Control payload
        data: &'a [u8],
        /// Reported payload length
        length: u16,
    },
    /// File chunk
    FileData {
        /// Friend number
        friend: i32,
        /// File slot
        file_number: u8,
        /// Chunk bytes
        data: &'a [u8],
        /// Reported chunk length
        length: u16,
    },
}

impl RawNotification<'_> {
    /// The kind of this notification
    pub const fn kind(&self) -> NotificationKind {
        match self {
            Self::FriendRequest { .. } => NotificationKind::FriendRequest,
            Self::FriendMessage { .. } => NotificationKind::FriendMessage,
            Self::FriendAction { .. } => NotificationKind::FriendAction,
            Self::NameChange { .. } => NotificationKind::NameChange,
            Self::StatusMessage { .. } => NotificationKind::StatusMessage,
            Self::UserStatus { .. } => NotificationKind::UserStatus,
            Self::TypingChange { .. } => NotificationKind::TypingChange,
            Self::ReadReceipt { .. } => NotificationKind::ReadReceipt,
            Self::ConnectionStatus { .. } => NotificationKind::ConnectionStatus,
            Self::FileSendRequest { .. } => NotificationKind::FileSendRequest,
            Self::FileControl { .. } => NotificationKind::FileControl,
            Self::FileData { .. } => NotificationKind::FileData,
        }
    }
}
