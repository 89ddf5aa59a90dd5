//! Callback dispatch bridge.
//!
//! Engines only carry a [`ContextToken`] with each hook. Every live session
//! owns one token, recorded in a process-wide registry next to a weak
//! reference to the session. The single [`trampoline`] function is armed for
//! every notification kind; it resolves the token, decodes the raw arguments
//! and invokes the handler registered for that kind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::{error, trace, warn};

use toxwire_engine::{ContextToken, DispatchError, Hook, NotificationKind, RawNotification};

use crate::events::{
    ConnectionChange, Event, FileChunk, FileControlMessage, FileSendRequest, FriendAction,
    FriendMessage, FriendRequest, NameChange, ReadReceipt, StatusMessageChange, TypingChange,
    UserStatusChange,
};
use crate::session::{Session, SessionInner};

/// A registered handler for payload type `P`
pub type Handler<P> = Arc<dyn Fn(&Session, &P) + Send + Sync>;

static REGISTRY: Lazy<DashMap<ContextToken, Weak<SessionInner>>> = Lazy::new(DashMap::new);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// One optional handler per notification kind
#[derive(Clone, Default)]
pub(crate) struct HandlerTable {
    pub(crate) friend_request: Option<Handler<FriendRequest>>,
    pub(crate) friend_message: Option<Handler<FriendMessage>>,
    pub(crate) friend_action: Option<Handler<FriendAction>>,
    pub(crate) name_change: Option<Handler<NameChange>>,
    pub(crate) status_message: Option<Handler<StatusMessageChange>>,
    pub(crate) user_status: Option<Handler<UserStatusChange>>,
    pub(crate) typing_change: Option<Handler<TypingChange>>,
    pub(crate) read_receipt: Option<Handler<ReadReceipt>>,
    pub(crate) connection_status: Option<Handler<ConnectionChange>>,
    pub(crate) file_send_request: Option<Handler<FileSendRequest>>,
    pub(crate) file_control: Option<Handler<FileControlMessage>>,
    pub(crate) file_data: Option<Handler<FileChunk>>,
}

impl HandlerTable {
    pub(crate) fn is_registered(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::FriendRequest => self.friend_request.is_some(),
            NotificationKind::FriendMessage => self.friend_message.is_some(),
            NotificationKind::FriendAction => self.friend_action.is_some(),
            NotificationKind::NameChange => self.name_change.is_some(),
            NotificationKind::StatusMessage => self.status_message.is_some(),
            NotificationKind::UserStatus => self.user_status.is_some(),
            NotificationKind::TypingChange => self.typing_change.is_some(),
            NotificationKind::ReadReceipt => self.read_receipt.is_some(),
            NotificationKind::ConnectionStatus => self.connection_status.is_some(),
            NotificationKind::FileSendRequest => self.file_send_request.is_some(),
            NotificationKind::FileControl => self.file_control.is_some(),
            NotificationKind::FileData => self.file_data.is_some(),
        }
    }

    pub(crate) fn clear(&mut self, kind: NotificationKind) {
        match kind {
            NotificationKind::FriendRequest => self.friend_request = None,
            NotificationKind::FriendMessage => self.friend_message = None,
            NotificationKind::FriendAction => self.friend_action = None,
            NotificationKind::NameChange => self.name_change = None,
            NotificationKind::StatusMessage => self.status_message = None,
            NotificationKind::UserStatus => self.user_status = None,
            NotificationKind::TypingChange => self.typing_change = None,
            NotificationKind::ReadReceipt => self.read_receipt = None,
            NotificationKind::ConnectionStatus => self.connection_status = None,
            NotificationKind::FileSendRequest => self.file_send_request = None,
            NotificationKind::FileControl => self.file_control = None,
            NotificationKind::FileData => self.file_data = None,
        }
    }
}

/// Reserve a fresh token
pub(crate) fn next_token() -> ContextToken {
    ContextToken::from_raw(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
}

pub(crate) fn register(token: ContextToken, session: &Arc<SessionInner>) {
    REGISTRY.insert(token, Arc::downgrade(session));
}

pub(crate) fn unregister(token: ContextToken) {
    REGISTRY.remove(&token);
}

fn lookup(token: ContextToken) -> Option<Arc<SessionInner>> {
    let weak = REGISTRY.get(&token).map(|entry| entry.value().clone())?;
    weak.upgrade()
}

/// Hook armed for every kind a session handles
pub(crate) fn hook(token: ContextToken) -> Hook {
    Hook {
        trampoline,
        context: token,
    }
}

/// Entry point for every engine notification
pub(crate) fn trampoline(
    context: ContextToken,
    raw: RawNotification<'_>,
) -> Result<(), DispatchError> {
    let Some(inner) = lookup(context) else {
        error!(%context, kind = %raw.kind(), "Notification for an unknown session context");
        return Err(DispatchError::UnknownContext(context));
    };

    match Event::decode(raw) {
        Ok(event) => dispatch(&Session::from_inner(inner), &event),
        Err(e) => warn!(kind = %raw.kind(), "Dropping malformed notification: {}", e),
    }
    Ok(())
}

fn invoke<P>(session: &Session, handler: &Option<Handler<P>>, payload: &P, kind: NotificationKind) {
    match handler {
        Some(handler) => handler(session, payload),
        None => trace!(%kind, "No handler registered, notification dropped"),
    }
}

/// Run the handler registered for an event, if any.
///
/// The table is snapshotted first so handlers may re-register while running.
pub(crate) fn dispatch(session: &Session, event: &Event) {
    let table = session.handlers().read().clone();
    let kind = event.kind();
    match event {
        Event::FriendRequest(p) => invoke(session, &table.friend_request, p, kind),
        Event::FriendMessage(p) => invoke(session, &table.friend_message, p, kind),
        Event::FriendAction(p) => invoke(session, &table.friend_action, p, kind),
        Event::NameChange(p) => invoke(session, &table.name_change, p, kind),
        Event::StatusMessage(p) => invoke(session, &table.status_message, p, kind),
        Event::UserStatus(p) => invoke(session, &table.user_status, p, kind),
        Event::TypingChange(p) => invoke(session, &table.typing_change, p, kind),
        Event::ReadReceipt(p) => invoke(session, &table.read_receipt, p, kind),
        Event::ConnectionStatus(p) => invoke(session, &table.connection_status, p, kind),
        Event::FileSendRequest(p) => invoke(session, &table.file_send_request, p, kind),
        Event::FileControl(p) => invoke(session, &table.file_control, p, kind),
        Event::FileData(p) => invoke(session, &table.file_data, p, kind),
    }
}
