//! The session object.
//!
//! A [`Session`] owns one engine instance and represents one local identity.
//! All access to the engine, the tick included, goes through a single
//! reentrant lock: the ticking thread holds it while the engine raises
//! notifications, so handlers can call back into the session while every
//! other thread waits for the tick to finish.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{ReentrantMutex, RwLock};
use tracing::{debug, info, instrument};

use toxwire_core::{
    ClientId, FileControl, FileNumber, FriendAddress, FriendNumber, TransferDirection, UserStatus,
    CLIENT_ID_SIZE, FRIEND_ADDRESS_SIZE, MAX_FILENAME_LENGTH, MAX_MESSAGE_LENGTH,
    MAX_NAME_LENGTH, MAX_STATUS_MESSAGE_LENGTH,
};
use toxwire_engine::{ContextToken, Engine, EngineOptions, NotificationKind};

use crate::bridge::{self, HandlerTable};
use crate::error::{Error, Result};
use crate::events::{
    ConnectionChange, FileChunk, FileControlMessage, FileSendRequest, FriendAction,
    FriendMessage, FriendRequest, NameChange, ReadReceipt, StatusMessageChange, TypingChange,
    UserStatusChange,
};
use crate::{marshal, translate};

struct EngineCell {
    engine: RefCell<Option<Box<dyn Engine>>>,
    ticking: Cell<bool>,
}

/// Marks a tick in progress; lowered on drop, unwinding included
struct TickingFlag<'a>(&'a Cell<bool>);

impl<'a> TickingFlag<'a> {
    fn raise(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for TickingFlag<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

pub(crate) struct SessionInner {
    engine: ReentrantMutex<EngineCell>,
    handlers: RwLock<HandlerTable>,
    token: ContextToken,
    options: EngineOptions,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        bridge::unregister(self.token);
        if let Some(engine) = self.engine.get_mut().engine.get_mut().take() {
            engine.kill();
            debug!(token = %self.token, "Session dropped, engine released");
        }
    }
}

/// Handle to one local identity.
///
/// Cloning is cheap and yields another handle to the same session. The engine
/// is released by [`Session::kill`] or when the last handle is dropped.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.inner.token)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session around a freshly constructed engine.
    ///
    /// `create` builds the engine and returns `None` if allocation fails.
    pub fn init<E, F>(options: &EngineOptions, create: F) -> Result<Self>
    where
        E: Engine + 'static,
        F: FnOnce(&EngineOptions) -> Option<E>,
    {
        let engine = create(options).ok_or(Error::Init)?;
        let token = bridge::next_token();
        let inner = Arc::new(SessionInner {
            engine: ReentrantMutex::new(EngineCell {
                engine: RefCell::new(Some(Box::new(engine))),
                ticking: Cell::new(false),
            }),
            handlers: RwLock::new(HandlerTable::default()),
            token,
            options: options.clone(),
        });
        bridge::register(token, &inner);
        info!(%token, ipv6 = options.ipv6_enabled, "Session initialized");
        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<SessionInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn handlers(&self) -> &RwLock<HandlerTable> {
        &self.inner.handlers
    }

    /// Options the engine was created with
    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    /// Run `f` against the engine under the session lock
    pub(crate) fn with_engine<T>(&self, f: impl FnOnce(&dyn Engine) -> Result<T>) -> Result<T> {
        let cell = self.inner.engine.lock();
        let slot = cell.engine.try_borrow().map_err(|_| Error::InCallback)?;
        let engine = slot.as_deref().ok_or(Error::BadSession)?;
        f(engine)
    }

    /// Release the engine. Every later operation fails with [`Error::BadSession`].
    ///
    /// Not allowed from inside a handler.
    pub fn kill(&self) -> Result<()> {
        let cell = self.inner.engine.lock();
        let mut slot = cell.engine.try_borrow_mut().map_err(|_| Error::InCallback)?;
        let engine = slot.take().ok_or(Error::BadSession)?;
        engine.kill();
        drop(slot);
        drop(cell);

        bridge::unregister(self.inner.token);
        *self.inner.handlers.write() = HandlerTable::default();
        info!(token = %self.inner.token, "Session killed");
        Ok(())
    }

    /// Whether the session has been torn down
    pub fn is_killed(&self) -> bool {
        let cell = self.inner.engine.lock();
        let killed = cell.engine.try_borrow().map(|slot| slot.is_none()).unwrap_or(false);
        killed
    }

    /// Advance the engine one iteration.
    ///
    /// Registered handlers run on this thread before `tick` returns. Fails
    /// with [`Error::Dispatch`] if a notification could not be routed and
    /// with [`Error::InCallback`] when called from a handler.
    #[instrument(level = "trace", skip(self), fields(token = %self.inner.token))]
    pub fn tick(&self) -> Result<()> {
        let cell = self.inner.engine.lock();
        if cell.ticking.get() {
            return Err(Error::InCallback);
        }
        let slot = cell.engine.try_borrow().map_err(|_| Error::InCallback)?;
        let engine = slot.as_deref().ok_or(Error::BadSession)?;

        let _ticking = TickingFlag::raise(&cell.ticking);
        let result = engine.advance();
        result.map_err(Error::from)
    }

    // Bootstrap and identity

    /// Join the network through a known node.
    ///
    /// `port` is in host order; `public_key` is the node's key in hex.
    #[instrument(skip(self, public_key))]
    pub fn bootstrap_from_address(&self, address: &str, port: u16, public_key: &str) -> Result<()> {
        self.with_engine(|engine| {
            let address = marshal::c_string("address", address)?;
            let key = hex::decode(public_key.trim())?;
            let key = marshal::exact_len("public key", &key, CLIENT_ID_SIZE)?;
            engine.bootstrap_from_address(address, self.inner.options.ipv6_enabled, port.to_be(), key);
            debug!("Bootstrap requested");
            Ok(())
        })
    }

    /// Whether the engine is connected to the network
    pub fn is_connected(&self) -> Result<bool> {
        self.with_engine(|engine| translate::tri_state(engine.is_connected(), "is_connected"))
    }

    /// Our friend address, to hand out to people who want to add us
    pub fn address(&self) -> Result<FriendAddress> {
        self.with_engine(|engine| {
            let mut buf = [0u8; FRIEND_ADDRESS_SIZE];
            engine.get_address(&mut buf);
            Ok(FriendAddress::from_bytes(buf))
        })
    }

    /// Our client ID
    pub fn client_id(&self) -> Result<ClientId> {
        Ok(self.address()?.client_id())
    }

    // Friends

    /// Send a friend request to `address` with an attached message
    #[instrument(skip_all)]
    pub fn add_friend(&self, address: &[u8], message: &[u8]) -> Result<FriendNumber> {
        self.with_engine(|engine| {
            let address = marshal::exact_len("friend address", address, FRIEND_ADDRESS_SIZE)?;
            let friend = translate::friend_add(engine.add_friend(address, message))?;
            debug!(%friend, "Friend request queued");
            Ok(friend)
        })
    }

    /// Add a friend without sending a request, typically to accept one
    pub fn add_friend_norequest(&self, client_id: &[u8]) -> Result<FriendNumber> {
        self.with_engine(|engine| {
            let client_id = marshal::exact_len("client ID", client_id, CLIENT_ID_SIZE)?;
            translate::friend_number(engine.add_friend_norequest(client_id), "add_friend_norequest")
        })
    }

    /// Friend number for a client ID, `None` if the key is not a friend
    pub fn friend_number(&self, client_id: &[u8]) -> Result<Option<FriendNumber>> {
        self.with_engine(|engine| {
            let client_id = marshal::exact_len("client ID", client_id, CLIENT_ID_SIZE)?;
            Ok(translate::friend_lookup(engine.get_friend_number(client_id)))
        })
    }

    /// Client ID of a friend
    pub fn friend_client_id(&self, friend: FriendNumber) -> Result<ClientId> {
        self.with_engine(|engine| {
            let mut buf = [0u8; CLIENT_ID_SIZE];
            translate::status(engine.get_client_id(friend.as_raw(), &mut buf), "get_client_id")?;
            Ok(ClientId::from_bytes(buf))
        })
    }

    /// Remove a friend; its number may be reused
    pub fn delete_friend(&self, friend: FriendNumber) -> Result<()> {
        self.with_engine(|engine| translate::status(engine.del_friend(friend.as_raw()), "del_friend"))
    }

    /// Whether a friend is online
    pub fn friend_connection_status(&self, friend: FriendNumber) -> Result<bool> {
        self.with_engine(|engine| {
            translate::tri_state(
                engine.get_friend_connection_status(friend.as_raw()),
                "get_friend_connection_status",
            )
        })
    }

    /// Whether a friend number is in use
    pub fn friend_exists(&self, friend: FriendNumber) -> Result<bool> {
        self.with_engine(|engine| {
            translate::tri_state(engine.friend_exists(friend.as_raw()), "friend_exists")
        })
    }

    /// Number of friends
    pub fn count_friendlist(&self) -> Result<u32> {
        self.with_engine(|engine| Ok(engine.count_friendlist()))
    }

    /// Number of friends currently online
    pub fn num_online_friends(&self) -> Result<u32> {
        self.with_engine(|engine| Ok(engine.get_num_online_friends()))
    }

    /// Every friend number in use
    pub fn friend_list(&self) -> Result<Vec<FriendNumber>> {
        self.with_engine(|engine| {
            let mut buf = vec![0i32; engine.count_friendlist() as usize];
            let written = engine.get_friendlist(&mut buf) as usize;
            buf.truncate(written);
            Ok(buf.into_iter().map(FriendNumber::from_raw).collect())
        })
    }

    // Messaging

    fn check_message(field: &'static str, body: &[u8]) -> Result<()> {
        marshal::non_empty(field, body)?;
        marshal::bounded(field, body, MAX_MESSAGE_LENGTH)?;
        Ok(())
    }

    /// Send a message; returns the ID later echoed by a read receipt
    pub fn send_message(&self, friend: FriendNumber, message: &[u8]) -> Result<u32> {
        self.with_engine(|engine| {
            Self::check_message("message", message)?;
            translate::receipt(engine.send_message(friend.as_raw(), message), "send_message")
        })
    }

    /// Send a message under a caller-chosen ID
    pub fn send_message_with_id(&self, friend: FriendNumber, id: u32, message: &[u8]) -> Result<u32> {
        self.with_engine(|engine| {
            Self::check_message("message", message)?;
            translate::receipt(
                engine.send_message_withid(friend.as_raw(), id, message),
                "send_message_withid",
            )
        })
    }

    /// Send an action (emote)
    pub fn send_action(&self, friend: FriendNumber, action: &[u8]) -> Result<u32> {
        self.with_engine(|engine| {
            Self::check_message("action", action)?;
            translate::receipt(engine.send_action(friend.as_raw(), action), "send_action")
        })
    }

    /// Send an action under a caller-chosen ID
    pub fn send_action_with_id(&self, friend: FriendNumber, id: u32, action: &[u8]) -> Result<u32> {
        self.with_engine(|engine| {
            Self::check_message("action", action)?;
            translate::receipt(
                engine.send_action_withid(friend.as_raw(), id, action),
                "send_action_withid",
            )
        })
    }

    // Profile and presence

    /// Set our name
    pub fn set_name(&self, name: &[u8]) -> Result<()> {
        self.with_engine(|engine| {
            marshal::bounded("name", name, MAX_NAME_LENGTH)?;
            translate::status(engine.set_name(name), "set_name")
        })
    }

    /// Our name; empty if never set
    pub fn self_name(&self) -> Result<Vec<u8>> {
        self.with_engine(|engine| {
            marshal::read_bounded(MAX_NAME_LENGTH, |buf| Ok(usize::from(engine.get_self_name(buf))))
        })
    }

    /// A friend's name
    pub fn friend_name(&self, friend: FriendNumber) -> Result<Vec<u8>> {
        self.with_engine(|engine| {
            marshal::read_bounded(MAX_NAME_LENGTH, |buf| {
                translate::count(engine.get_name(friend.as_raw(), buf), "get_name")
            })
        })
    }

    /// Length of a friend's name
    pub fn friend_name_size(&self, friend: FriendNumber) -> Result<usize> {
        self.with_engine(|engine| translate::count(engine.get_name_size(friend.as_raw()), "get_name_size"))
    }

    /// Length of our name
    pub fn self_name_size(&self) -> Result<usize> {
        self.with_engine(|engine| translate::count(engine.get_self_name_size(), "get_self_name_size"))
    }

    /// Set our status message
    pub fn set_status_message(&self, status: &[u8]) -> Result<()> {
        self.with_engine(|engine| {
            marshal::bounded("status message", status, MAX_STATUS_MESSAGE_LENGTH)?;
            translate::status(engine.set_status_message(status), "set_status_message")
        })
    }

    /// Our status message
    pub fn self_status_message(&self) -> Result<Vec<u8>> {
        self.with_engine(|engine| {
            marshal::read_bounded(MAX_STATUS_MESSAGE_LENGTH, |buf| {
                translate::count(engine.get_self_status_message(buf), "get_self_status_message")
            })
        })
    }

    /// A friend's status message
    pub fn friend_status_message(&self, friend: FriendNumber) -> Result<Vec<u8>> {
        self.with_engine(|engine| {
            marshal::read_bounded(MAX_STATUS_MESSAGE_LENGTH, |buf| {
                translate::count(engine.get_status_message(friend.as_raw(), buf), "get_status_message")
            })
        })
    }

    /// Length of a friend's status message
    pub fn friend_status_message_size(&self, friend: FriendNumber) -> Result<usize> {
        self.with_engine(|engine| {
            translate::count(
                engine.get_status_message_size(friend.as_raw()),
                "get_status_message_size",
            )
        })
    }

    /// Length of our status message
    pub fn self_status_message_size(&self) -> Result<usize> {
        self.with_engine(|engine| {
            translate::count(engine.get_self_status_message_size(), "get_self_status_message_size")
        })
    }

    /// Set our user status. [`UserStatus::Invalid`] is rejected.
    pub fn set_user_status(&self, status: UserStatus) -> Result<()> {
        self.with_engine(|engine| {
            if status == UserStatus::Invalid {
                return Err(Error::OperationFailed("set_user_status"));
            }
            translate::status(engine.set_user_status(status.as_raw()), "set_user_status")
        })
    }

    /// Our user status
    pub fn self_user_status(&self) -> Result<UserStatus> {
        self.with_engine(|engine| {
            translate::user_status(engine.get_self_user_status(), "get_self_user_status")
        })
    }

    /// A friend's user status
    pub fn friend_user_status(&self, friend: FriendNumber) -> Result<UserStatus> {
        self.with_engine(|engine| {
            translate::user_status(engine.get_user_status(friend.as_raw()), "get_user_status")
        })
    }

    /// When a friend was last seen online; `None` if never
    pub fn last_online(&self, friend: FriendNumber) -> Result<Option<DateTime<Utc>>> {
        self.with_engine(|engine| {
            translate::last_online(engine.get_last_online(friend.as_raw()), "get_last_online")
        })
    }

    /// Tell a friend whether we are typing
    pub fn set_user_is_typing(&self, friend: FriendNumber, typing: bool) -> Result<()> {
        self.with_engine(|engine| {
            translate::status(
                engine.set_user_is_typing(friend.as_raw(), u8::from(typing)),
                "set_user_is_typing",
            )
        })
    }

    /// Whether a friend is typing
    pub fn is_typing(&self, friend: FriendNumber) -> Result<bool> {
        self.with_engine(|engine| Ok(translate::flag(engine.get_is_typing(friend.as_raw()))))
    }

    /// Whether to acknowledge a friend's messages with read receipts
    pub fn set_sends_receipts(&self, friend: FriendNumber, sends: bool) -> Result<()> {
        self.with_engine(|engine| {
            engine.set_sends_receipts(friend.as_raw(), i32::from(sends));
            Ok(())
        })
    }

    /// Current nospam
    pub fn nospam(&self) -> Result<u32> {
        self.with_engine(|engine| Ok(engine.get_nospam()))
    }

    /// Replace the nospam. Addresses handed out earlier stop working.
    pub fn set_nospam(&self, nospam: u32) -> Result<()> {
        self.with_engine(|engine| {
            engine.set_nospam(nospam);
            Ok(())
        })
    }

    // File transfer

    /// Offer a file to a friend
    pub fn new_file_sender(
        &self,
        friend: FriendNumber,
        file_size: u64,
        filename: &[u8],
    ) -> Result<FileNumber> {
        self.with_engine(|engine| {
            marshal::bounded("file name", filename, MAX_FILENAME_LENGTH)?;
            translate::file_number(
                engine.new_file_sender(friend.as_raw(), file_size, filename),
                "new_file_sender",
            )
        })
    }

    /// Send a transfer-control verb. An absent or empty payload crosses as null.
    pub fn file_send_control(
        &self,
        friend: FriendNumber,
        direction: TransferDirection,
        file_number: FileNumber,
        control: FileControl,
        data: Option<&[u8]>,
    ) -> Result<()> {
        self.with_engine(|engine| {
            let data = marshal::nullable(data);
            if let Some(data) = data {
                marshal::bounded("control payload", data, usize::from(u16::MAX))?;
            }
            translate::status(
                engine.file_send_control(
                    friend.as_raw(),
                    direction.as_flag(),
                    file_number.as_raw(),
                    control.as_raw(),
                    data,
                ),
                "file_send_control",
            )
        })
    }

    /// Send one chunk of a file we are sending
    pub fn file_send_data(&self, friend: FriendNumber, file_number: FileNumber, data: &[u8]) -> Result<()> {
        self.with_engine(|engine| {
            marshal::non_empty("file data", data)?;
            marshal::bounded("file data", data, usize::from(u16::MAX))?;
            translate::status(
                engine.file_send_data(friend.as_raw(), file_number.as_raw(), data),
                "file_send_data",
            )
        })
    }

    /// Largest chunk [`Session::file_send_data`] accepts for a friend
    pub fn file_data_size(&self, friend: FriendNumber) -> Result<usize> {
        self.with_engine(|engine| translate::count(engine.file_data_size(friend.as_raw()), "file_data_size"))
    }

    /// Bytes left in a transfer. A drained or unknown transfer is a failure.
    pub fn file_data_remaining(
        &self,
        friend: FriendNumber,
        file_number: FileNumber,
        direction: TransferDirection,
    ) -> Result<u64> {
        self.with_engine(|engine| {
            translate::remaining(
                engine.file_data_remaining(friend.as_raw(), file_number.as_raw(), direction.as_flag()),
                "file_data_remaining",
            )
        })
    }

    // Handlers

    fn set_handler(&self, kind: NotificationKind, install: impl FnOnce(&mut HandlerTable)) -> Result<()> {
        self.with_engine(|engine| {
            install(&mut self.inner.handlers.write());
            engine.set_hook(kind, Some(bridge::hook(self.inner.token)));
            debug!(%kind, "Handler registered");
            Ok(())
        })
    }

    /// Remove the handler for a kind; its notifications are dropped afterwards
    pub fn remove_handler(&self, kind: NotificationKind) -> Result<()> {
        self.with_engine(|engine| {
            self.inner.handlers.write().clear(kind);
            engine.set_hook(kind, None);
            debug!(%kind, "Handler removed");
            Ok(())
        })
    }

    /// Whether a handler is registered for a kind
    pub fn has_handler(&self, kind: NotificationKind) -> bool {
        self.inner.handlers.read().is_registered(kind)
    }

    /// Handle incoming friend requests
    pub fn on_friend_request<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&Session, &FriendRequest) + Send + Sync + 'static,
    {
        self.set_handler(NotificationKind::FriendRequest, |t| {
            t.friend_request = Some(Arc::new(handler))
        })
    }

    /// Handle messages
    pub fn on_friend_message<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&Session, &FriendMessage) + Send + Sync + 'static,
    {
        self.set_handler(NotificationKind::FriendMessage, |t| {
            t.friend_message = Some(Arc::new(handler))
        })
    }

    /// Handle actions
    pub fn on_friend_action<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&Session, &FriendAction) + Send + Sync + 'static,
    {
        self.set_handler(NotificationKind::FriendAction, |t| {
            t.friend_action = Some(Arc::new(handler))
        })
    }

    /// Handle friend name changes
    pub fn on_name_change<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&Session, &NameChange) + Send + Sync + 'static,
    {
        self.set_handler(NotificationKind::NameChange, |t| t.name_change = Some(Arc::new(handler)))
    }

    /// Handle friend status message changes
    pub fn on_status_message<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&Session, &StatusMessageChange) + Send + Sync + 'static,
    {
        self.set_handler(NotificationKind::StatusMessage, |t| {
            t.status_message = Some(Arc::new(handler))
        })
    }

    /// Handle friend user status changes
    pub fn on_user_status<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&Session, &UserStatusChange) + Send + Sync + 'static,
    {
        self.set_handler(NotificationKind::UserStatus, |t| t.user_status = Some(Arc::new(handler)))
    }

    /// Handle typing changes
    pub fn on_typing_change<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&Session, &TypingChange) + Send + Sync + 'static,
    {
        self.set_handler(NotificationKind::TypingChange, |t| {
            t.typing_change = Some(Arc::new(handler))
        })
    }

    /// Handle read receipts
    pub fn on_read_receipt<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&Session, &ReadReceipt) + Send + Sync + 'static,
    {
        self.set_handler(NotificationKind::ReadReceipt, |t| {
            t.read_receipt = Some(Arc::new(handler))
        })
    }

    /// Handle friends going online or offline
    pub fn on_connection_status<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&Session, &ConnectionChange) + Send + Sync + 'static,
    {
        self.set_handler(NotificationKind::ConnectionStatus, |t| {
            t.connection_status = Some(Arc::new(handler))
        })
    }

    /// Handle incoming file offers
    pub fn on_file_send_request<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&Session, &FileSendRequest) + Send + Sync + 'static,
    {
        self.set_handler(NotificationKind::FileSendRequest, |t| {
            t.file_send_request = Some(Arc::new(handler))
        })
    }

    /// Handle transfer-control messages
    pub fn on_file_control<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&Session, &FileControlMessage) + Send + Sync + 'static,
    {
        self.set_handler(NotificationKind::FileControl, |t| {
            t.file_control = Some(Arc::new(handler))
        })
    }

    /// Handle incoming file chunks
    pub fn on_file_data<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&Session, &FileChunk) + Send + Sync + 'static,
    {
        self.set_handler(NotificationKind::FileData, |t| t.file_data = Some(Arc::new(handler)))
    }
}
