//! In-process engine.
//!
//! Every [`LoopbackEngine`] is a node on a shared [`LoopbackNetwork`]. Nodes
//! exchange packets through per-node inboxes that are drained on
//! [`Engine::advance`], so notifications only ever fire from inside a tick,
//! the same as with a networked engine. Connectivity is simulated: a node is
//! connected once it bootstraps from a relay registered on the network, and
//! two friends are online when both are connected and each has the other on
//! its friend list.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use toxwire_core::{
    ClientId, FileControl, FriendAddress, CLIENT_ID_SIZE,
    MAX_FILENAME_LENGTH, MAX_FRIEND_REQUEST_DATA_SIZE, MAX_MESSAGE_LENGTH, MAX_NAME_LENGTH,
    MAX_STATUS_MESSAGE_LENGTH,
};

use crate::engine::{Engine, EngineOptions};
use crate::hooks::{DispatchError, Hook, NotificationKind, RawNotification};
use crate::sentinel::{
    FAERR_ALREADYSENT, FAERR_BADCHECKSUM, FAERR_NOMEM, FAERR_NOMESSAGE, FAERR_OWNKEY,
    FAERR_SETNEWNOSPAM, FAERR_TOOLONG, FAERR_UNKNOWN, FAILURE, FALSE, NO_BYTES_REMAINING,
    NO_LAST_ONLINE, NO_MESSAGE_ID, SUCCESS, TRUE, USERSTATUS_INVALID,
};

/// Largest file chunk a node accepts
pub const FILE_DATA_SIZE: usize = 1371;

/// Friends a single node can hold
pub const FRIEND_CAPACITY: usize = 256;

const SAVE_MAGIC: u32 = 0x15ed_1b1f;

type Key = [u8; CLIENT_ID_SIZE];

/// Shared medium connecting loopback nodes
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    shared: Arc<NetworkShared>,
}

#[derive(Default)]
struct NetworkShared {
    nodes: RwLock<HashMap<Key, Weak<Node>>>,
    relays: RwLock<Vec<Relay>>,
}

#[derive(Clone, Debug)]
struct Relay {
    address: String,
    port: u16,
    public_key: Key,
}

impl LoopbackNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relay nodes can bootstrap from, returning its public key
    pub fn add_relay(&self, address: impl Into<String>, port: u16) -> ClientId {
        let public_key: Key = rand::random();
        let relay = Relay {
            address: address.into(),
            port,
            public_key,
        };
        debug!("Loopback relay registered at {}:{}", relay.address, relay.port);
        self.shared.relays.write().push(relay);
        ClientId::from_bytes(public_key)
    }

    /// Create a node with a fresh identity. Never fails; the `Option` matches
    /// engine constructors that can.
    pub fn engine(&self, options: &EngineOptions) -> Option<LoopbackEngine> {
        let profile = Profile {
            public_key: rand::random(),
            nospam: rand::random(),
            name: Vec::new(),
            status_message: Vec::new(),
            user_status: 0,
        };
        let key = profile.public_key;
        let node = Arc::new(Node {
            state: Mutex::new(NodeState::new(profile)),
            inbox: Mutex::new(VecDeque::new()),
            hooks: RwLock::new([None; NotificationKind::COUNT]),
        });
        self.register(key, &node);
        trace!("Loopback node created (ipv6: {})", options.ipv6_enabled);

        Some(LoopbackEngine {
            network: self.clone(),
            node,
        })
    }

    /// Number of live nodes
    pub fn node_count(&self) -> usize {
        self.shared
            .nodes
            .read()
            .values()
            .filter(|node| node.strong_count() > 0)
            .count()
    }

    fn register(&self, key: Key, node: &Arc<Node>) {
        self.shared.nodes.write().insert(key, Arc::downgrade(node));
    }

    fn unregister(&self, key: &Key, node: &Arc<Node>) {
        let mut nodes = self.shared.nodes.write();
        let owned = nodes
            .get(key)
            .map(|weak| Weak::ptr_eq(weak, &Arc::downgrade(node)))
            .unwrap_or(false);
        if owned {
            nodes.remove(key);
        }
    }

    fn lookup(&self, key: &Key) -> Option<Arc<Node>> {
        self.shared.nodes.read().get(key).and_then(Weak::upgrade)
    }

    fn relay_known(&self, address: &str, port: u16, public_key: &Key) -> bool {
        self.shared
            .relays
            .read()
            .iter()
            .any(|r| r.address == address && r.port == port && &r.public_key == public_key)
    }

    fn deliver(&self, to: &Key, packet: Packet) -> bool {
        match self.lookup(to) {
            Some(node) => {
                node.inbox.lock().push_back(packet);
                true
            }
            None => false,
        }
    }
}

struct Node {
    state: Mutex<NodeState>,
    inbox: Mutex<VecDeque<Packet>>,
    hooks: RwLock<[Option<Hook>; NotificationKind::COUNT]>,
}

impl Node {
    fn view_for(&self, key: &Key) -> Option<PeerView> {
        let state = self.state.lock();
        if state.killed {
            return None;
        }
        Some(PeerView {
            connected: state.connected,
            friends_with_us: state.find_friend(key).is_some(),
            nospam: state.profile.nospam,
            name: state.profile.name.clone(),
            status_message: state.profile.status_message.clone(),
            user_status: state.profile.user_status,
        })
    }
}

struct PeerView {
    connected: bool,
    friends_with_us: bool,
    nospam: u32,
    name: Vec<u8>,
    status_message: Vec<u8>,
    user_status: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Profile {
    public_key: Key,
    nospam: u32,
    name: Vec<u8>,
    status_message: Vec<u8>,
    user_status: u8,
}

#[derive(Debug)]
struct NodeState {
    profile: Profile,
    friends: Vec<Option<Friend>>,
    connected: bool,
    pending_bootstrap: Option<Relay>,
    next_message_id: u32,
    killed: bool,
}

impl NodeState {
    fn new(profile: Profile) -> Self {
        Self {
            profile,
            friends: Vec::new(),
            connected: false,
            pending_bootstrap: None,
            next_message_id: 1,
            killed: false,
        }
    }

    fn find_friend(&self, key: &Key) -> Option<i32> {
        self.friends
            .iter()
            .position(|slot| slot.as_ref().map_or(false, |f| &f.public_key == key))
            .map(|n| n as i32)
    }

    fn friend(&self, number: i32) -> Option<&Friend> {
        usize::try_from(number)
            .ok()
            .and_then(|n| self.friends.get(n))
            .and_then(Option::as_ref)
    }

    fn friend_mut(&mut self, number: i32) -> Option<&mut Friend> {
        usize::try_from(number)
            .ok()
            .and_then(|n| self.friends.get_mut(n))
            .and_then(Option::as_mut)
    }

    fn online_friend(&self, number: i32) -> Option<&Friend> {
        self.friend(number).filter(|f| f.online)
    }

    fn insert_friend(&mut self, friend: Friend) -> Option<i32> {
        if let Some(n) = self.friends.iter().position(Option::is_none) {
            self.friends[n] = Some(friend);
            return Some(n as i32);
        }
        if self.friends.len() >= FRIEND_CAPACITY {
            return None;
        }
        self.friends.push(Some(friend));
        Some(self.friends.len() as i32 - 1)
    }

    fn take_message_id(&mut self) -> u32 {
        let id = self.next_message_id;
        self.next_message_id = self.next_message_id.wrapping_add(1).max(1);
        id
    }
}

#[derive(Debug)]
struct Friend {
    public_key: Key,
    nospam: u32,
    pending_request: Option<Vec<u8>>,
    online: bool,
    name: Vec<u8>,
    status_message: Vec<u8>,
    user_status: u8,
    typing: bool,
    peer_typing: bool,
    sends_receipts: bool,
    last_online: i64,
    outgoing: HashMap<u8, Transfer>,
    incoming: HashMap<u8, Transfer>,
}

impl Friend {
    fn new(public_key: Key, nospam: u32, pending_request: Option<Vec<u8>>) -> Self {
        Self {
            public_key,
            nospam,
            pending_request,
            online: false,
            name: Vec::new(),
            status_message: Vec::new(),
            user_status: 0,
            typing: false,
            peer_typing: false,
            sends_receipts: true,
            last_online: 0,
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
        }
    }

    fn transfers(&mut self, send_receive: u8) -> &mut HashMap<u8, Transfer> {
        if send_receive == 0 {
            &mut self.outgoing
        } else {
            &mut self.incoming
        }
    }
}

#[derive(Debug)]
struct Transfer {
    remaining: u64,
    accepted: bool,
    paused: bool,
}

impl Transfer {
    fn apply(transfers: &mut HashMap<u8, Transfer>, file_number: u8, control: FileControl) -> bool {
        let Some(transfer) = transfers.get_mut(&file_number) else {
            return false;
        };
        match control {
            FileControl::Accept | FileControl::ResumeBroken => {
                transfer.accepted = true;
                transfer.paused = false;
            }
            FileControl::Pause => transfer.paused = true,
            FileControl::Kill | FileControl::Finished => {
                transfers.remove(&file_number);
            }
        }
        true
    }
}

#[derive(Serialize, Deserialize)]
struct SavedState {
    magic: u32,
    profile: Profile,
    friends: Vec<Option<SavedFriend>>,
}

#[derive(Serialize, Deserialize)]
struct SavedFriend {
    public_key: Key,
    nospam: u32,
    pending_request: Option<Vec<u8>>,
    name: Vec<u8>,
    status_message: Vec<u8>,
    sends_receipts: bool,
    last_online: i64,
}

enum Packet {
    FriendRequest {
        from: Key,
        data: Vec<u8>,
    },
    Message {
        from: Key,
        id: u32,
        body: Vec<u8>,
        action: bool,
    },
    Receipt {
        from: Key,
        id: u32,
    },
    Typing {
        from: Key,
        typing: bool,
    },
    FileOffer {
        from: Key,
        file_number: u8,
        size: u64,
        filename: Vec<u8>,
    },
    FileControl {
        from: Key,
        // true when the target file is one the receiving node is sending
        for_sender: bool,
        file_number: u8,
        control: FileControl,
        data: Vec<u8>,
    },
    FileChunk {
        from: Key,
        file_number: u8,
        data: Vec<u8>,
    },
}

enum Notice {
    FriendRequest { public_key: Key, data: Vec<u8> },
    Message { friend: i32, body: Vec<u8>, action: bool },
    Name { friend: i32, name: Vec<u8> },
    StatusMessage { friend: i32, status: Vec<u8> },
    UserStatus { friend: i32, status: u8 },
    Typing { friend: i32, typing: bool },
    Receipt { friend: i32, id: u32 },
    Connection { friend: i32, online: bool },
    FileOffer { friend: i32, file_number: u8, size: u64, filename: Vec<u8> },
    FileControl { friend: i32, receive_send: u8, file_number: u8, control: u8, data: Vec<u8> },
    FileChunk { friend: i32, file_number: u8, data: Vec<u8> },
}

fn len16(bytes: &[u8]) -> u16 {
    u16::try_from(bytes.len()).unwrap_or(u16::MAX)
}

fn flag(value: bool) -> u8 {
    if value {
        TRUE
    } else {
        FALSE
    }
}

impl Notice {
    fn as_raw(&self) -> RawNotification<'_> {
        match self {
            Notice::FriendRequest { public_key, data } => RawNotification::FriendRequest {
                public_key,
                data,
                length: len16(data),
            },
            Notice::Message { friend, body, action: false } => RawNotification::FriendMessage {
                friend: *friend,
                message: body,
                length: len16(body),
            },
            Notice::Message { friend, body, action: true } => RawNotification::FriendAction {
                friend: *friend,
                action: body,
                length: len16(body),
            },
            Notice::Name { friend, name } => RawNotification::NameChange {
                friend: *friend,
                name,
                length: len16(name),
            },
            Notice::StatusMessage { friend, status } => RawNotification::StatusMessage {
                friend: *friend,
                status,
                length: len16(status),
            },
            Notice::UserStatus { friend, status } => RawNotification::UserStatus {
                friend: *friend,
                status: *status,
            },
            Notice::Typing { friend, typing } => RawNotification::TypingChange {
                friend: *friend,
                typing: flag(*typing),
            },
            Notice::Receipt { friend, id } => RawNotification::ReadReceipt {
                friend: *friend,
                receipt: *id,
            },
            Notice::Connection { friend, online } => RawNotification::ConnectionStatus {
                friend: *friend,
                status: flag(*online),
            },
            Notice::FileOffer { friend, file_number, size, filename } => {
                RawNotification::FileSendRequest {
                    friend: *friend,
                    file_number: *file_number,
                    file_size: *size,
                    filename,
                    length: len16(filename),
                }
            }
            Notice::FileControl { friend, receive_send, file_number, control, data } => {
                RawNotification::FileControl {
                    friend: *friend,
                    receive_send: *receive_send,
                    file_number: *file_number,
                    control: *control,
                    data,
                    length: len16(data),
                }
            }
            Notice::FileChunk { friend, file_number, data } => RawNotification::FileData {
                friend: *friend,
                file_number: *file_number,
                data,
                length: len16(data),
            },
        }
    }
}

/// A node on a [`LoopbackNetwork`]
pub struct LoopbackEngine {
    network: LoopbackNetwork,
    node: Arc<Node>,
}

impl LoopbackEngine {
    /// Our public key
    pub fn client_id(&self) -> ClientId {
        ClientId::from_bytes(self.node.state.lock().profile.public_key)
    }

    /// Connection and profile pass: deliver pending friend requests and
    /// report transitions for every friend.
    fn refresh_friends(&self, notices: &mut Vec<Notice>) {
        let (my_key, friends) = {
            let state = self.node.state.lock();
            let friends: Vec<(i32, Key)> = state
                .friends
                .iter()
                .enumerate()
                .filter_map(|(n, slot)| slot.as_ref().map(|f| (n as i32, f.public_key)))
                .collect();
            (state.profile.public_key, friends)
        };

        let now = chrono::Utc::now().timestamp();
        for (number, key) in friends {
            let view = self.network.lookup(&key).and_then(|peer| peer.view_for(&my_key));

            let mut state = self.node.state.lock();
            let connected = state.connected;
            let Some(friend) = state.friend_mut(number).filter(|f| f.public_key == key) else {
                continue;
            };

            if let Some(view) = &view {
                let reachable = connected && view.connected && view.nospam == friend.nospam;
                if reachable && !view.friends_with_us {
                    if let Some(data) = friend.pending_request.take() {
                        trace!("Delivering friend request to friend {}", number);
                        self.network.deliver(&key, Packet::FriendRequest { from: my_key, data });
                    }
                }
            }

            let online = connected && view.as_ref().map_or(false, |v| v.connected && v.friends_with_us);
            if online != friend.online {
                friend.online = online;
                friend.last_online = now;
                if !online {
                    friend.peer_typing = false;
                }
                notices.push(Notice::Connection { friend: number, online });
            }

            let Some(view) = view.filter(|_| online) else {
                continue;
            };
            friend.pending_request = None;
            friend.last_online = now;
            if view.name != friend.name {
                friend.name = view.name.clone();
                notices.push(Notice::Name { friend: number, name: view.name });
            }
            if view.status_message != friend.status_message {
                friend.status_message = view.status_message.clone();
                notices.push(Notice::StatusMessage { friend: number, status: view.status_message });
            }
            if view.user_status != friend.user_status {
                friend.user_status = view.user_status;
                notices.push(Notice::UserStatus { friend: number, status: view.user_status });
            }
        }
    }

    fn receive(&self, state: &mut NodeState, packet: Packet, notices: &mut Vec<Notice>) {
        let my_key = state.profile.public_key;
        match packet {
            Packet::FriendRequest { from, data } => {
                if state.find_friend(&from).is_none() {
                    notices.push(Notice::FriendRequest { public_key: from, data });
                }
            }
            Packet::Message { from, id, body, action } => {
                let Some(number) = state.find_friend(&from) else { return };
                if state.friend(number).map_or(false, |f| f.sends_receipts) {
                    self.network.deliver(&from, Packet::Receipt { from: my_key, id });
                }
                notices.push(Notice::Message { friend: number, body, action });
            }
            Packet::Receipt { from, id } => {
                if let Some(number) = state.find_friend(&from) {
                    notices.push(Notice::Receipt { friend: number, id });
                }
            }
            Packet::Typing { from, typing } => {
                let Some(number) = state.find_friend(&from) else { return };
                if let Some(friend) = state.friend_mut(number) {
                    friend.peer_typing = typing;
                }
                notices.push(Notice::Typing { friend: number, typing });
            }
            Packet::FileOffer { from, file_number, size, filename } => {
                let Some(number) = state.find_friend(&from) else { return };
                if let Some(friend) = state.friend_mut(number) {
                    friend.incoming.insert(
                        file_number,
                        Transfer {
                            remaining: size,
                            accepted: false,
                            paused: false,
                        },
                    );
                }
                notices.push(Notice::FileOffer { friend: number, file_number, size, filename });
            }
            Packet::FileControl { from, for_sender, file_number, control, data } => {
                let Some(number) = state.find_friend(&from) else { return };
                let Some(friend) = state.friend_mut(number) else { return };
                let local = if for_sender { 0 } else { 1 };
                if !Transfer::apply(friend.transfers(local), file_number, control) {
                    trace!("Control for unknown file {} from friend {}", file_number, number);
                    return;
                }
                notices.push(Notice::FileControl {
                    friend: number,
                    receive_send: flag(for_sender),
                    file_number,
                    control: control.as_raw(),
                    data,
                });
            }
            Packet::FileChunk { from, file_number, data } => {
                let Some(number) = state.find_friend(&from) else { return };
                let Some(friend) = state.friend_mut(number) else { return };
                let Some(transfer) = friend.incoming.get_mut(&file_number) else { return };
                transfer.remaining = transfer.remaining.saturating_sub(data.len() as u64);
                notices.push(Notice::FileChunk { friend: number, file_number, data });
            }
        }
    }

    fn send_to_friend(&self, friend: i32, id: u32, body: &[u8], action: bool) -> u32 {
        if id == NO_MESSAGE_ID || body.is_empty() || body.len() > MAX_MESSAGE_LENGTH {
            return NO_MESSAGE_ID;
        }
        let state = self.node.state.lock();
        let Some(target) = state.online_friend(friend) else {
            return NO_MESSAGE_ID;
        };
        let packet = Packet::Message {
            from: state.profile.public_key,
            id,
            body: body.to_vec(),
            action,
        };
        if self.network.deliver(&target.public_key, packet) {
            id
        } else {
            NO_MESSAGE_ID
        }
    }

    fn saved_state(&self) -> SavedState {
        let state = self.node.state.lock();
        SavedState {
            magic: SAVE_MAGIC,
            profile: state.profile.clone(),
            friends: state
                .friends
                .iter()
                .map(|slot| {
                    slot.as_ref().map(|f| SavedFriend {
                        public_key: f.public_key,
                        nospam: f.nospam,
                        pending_request: f.pending_request.clone(),
                        name: f.name.clone(),
                        status_message: f.status_message.clone(),
                        sends_receipts: f.sends_receipts,
                        last_online: f.last_online,
                    })
                })
                .collect(),
        }
    }
}

fn copy_into(out: &mut [u8], data: &[u8]) -> usize {
    let n = out.len().min(data.len());
    out[..n].copy_from_slice(&data[..n]);
    n
}

impl Engine for LoopbackEngine {
    fn kill(&self) {
        let key = {
            let mut state = self.node.state.lock();
            state.killed = true;
            state.connected = false;
            state.profile.public_key
        };
        self.network.unregister(&key, &self.node);
        *self.node.hooks.write() = [None; NotificationKind::COUNT];
        self.node.inbox.lock().clear();
        debug!("Loopback node killed");
    }

    fn advance(&self) -> std::result::Result<(), DispatchError> {
        {
            let mut state = self.node.state.lock();
            if state.killed {
                return Ok(());
            }
            if let Some(relay) = state.pending_bootstrap.take() {
                if self.network.relay_known(&relay.address, relay.port, &relay.public_key) {
                    if !state.connected {
                        debug!("Loopback node connected via {}:{}", relay.address, relay.port);
                    }
                    state.connected = true;
                }
            }
        }

        let mut notices = Vec::new();
        self.refresh_friends(&mut notices);

        let packets: Vec<Packet> = self.node.inbox.lock().drain(..).collect();
        {
            let mut state = self.node.state.lock();
            for packet in packets {
                self.receive(&mut state, packet, &mut notices);
            }
        }

        let mut first_error = None;
        for notice in &notices {
            let raw = notice.as_raw();
            let hook = self.node.hooks.read()[raw.kind().index()];
            match hook {
                Some(hook) => {
                    if let Err(e) = hook.fire(raw) {
                        first_error.get_or_insert(e);
                    }
                }
                None => trace!("No hook armed for {}", raw.kind()),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn set_hook(&self, kind: NotificationKind, hook: Option<Hook>) {
        self.node.hooks.write()[kind.index()] = hook;
    }

    fn bootstrap_from_address(&self, address: &str, _ipv6_enabled: bool, port: u16, public_key: &[u8]) {
        let Ok(public_key) = Key::try_from(public_key) else {
            return;
        };
        self.node.state.lock().pending_bootstrap = Some(Relay {
            address: address.to_string(),
            port: u16::from_be(port),
            public_key,
        });
    }

    fn is_connected(&self) -> i32 {
        i32::from(self.node.state.lock().connected)
    }

    fn get_address(&self, out: &mut [u8]) {
        let address = {
            let state = self.node.state.lock();
            FriendAddress::new(&ClientId::from_bytes(state.profile.public_key), state.profile.nospam)
        };
        copy_into(out, address.as_bytes());
    }

    fn add_friend(&self, address: &[u8], data: &[u8]) -> i32 {
        let Ok(address) = FriendAddress::from_slice(address) else {
            return FAERR_UNKNOWN;
        };
        if data.len() > MAX_FRIEND_REQUEST_DATA_SIZE {
            return FAERR_TOOLONG;
        }
        if !address.checksum_is_valid() {
            return FAERR_BADCHECKSUM;
        }
        if data.is_empty() {
            return FAERR_NOMESSAGE;
        }

        let key = *address.client_id().as_bytes();
        let mut state = self.node.state.lock();
        if key == state.profile.public_key {
            return FAERR_OWNKEY;
        }
        if let Some(number) = state.find_friend(&key) {
            let Some(friend) = state.friend_mut(number) else {
                return FAERR_UNKNOWN;
            };
            if friend.nospam == address.nospam() {
                return FAERR_ALREADYSENT;
            }
            friend.nospam = address.nospam();
            return FAERR_SETNEWNOSPAM;
        }

        state
            .insert_friend(Friend::new(key, address.nospam(), Some(data.to_vec())))
            .unwrap_or(FAERR_NOMEM)
    }

    fn add_friend_norequest(&self, client_id: &[u8]) -> i32 {
        let Ok(key) = Key::try_from(client_id) else {
            return FAILURE;
        };
        let mut state = self.node.state.lock();
        if key == state.profile.public_key || state.find_friend(&key).is_some() {
            return FAILURE;
        }
        // nospam is unknown without an address; accepting a request needs none
        state.insert_friend(Friend::new(key, 0, None)).unwrap_or(FAILURE)
    }

    fn get_friend_number(&self, client_id: &[u8]) -> i32 {
        let Ok(key) = Key::try_from(client_id) else {
            return FAILURE;
        };
        self.node.state.lock().find_friend(&key).unwrap_or(FAILURE)
    }

    fn get_client_id(&self, friend: i32, out: &mut [u8]) -> i32 {
        match self.node.state.lock().friend(friend) {
            Some(f) => {
                copy_into(out, &f.public_key);
                SUCCESS
            }
            None => FAILURE,
        }
    }

    fn del_friend(&self, friend: i32) -> i32 {
        let mut state = self.node.state.lock();
        if state.friend(friend).is_none() {
            return FAILURE;
        }
        state.friends[friend as usize] = None;
        while matches!(state.friends.last(), Some(None)) {
            state.friends.pop();
        }
        SUCCESS
    }

    fn get_friend_connection_status(&self, friend: i32) -> i32 {
        self.node
            .state
            .lock()
            .friend(friend)
            .map_or(FAILURE, |f| i32::from(f.online))
    }

    fn friend_exists(&self, friend: i32) -> i32 {
        i32::from(self.node.state.lock().friend(friend).is_some())
    }

    fn send_message(&self, friend: i32, message: &[u8]) -> u32 {
        let id = self.node.state.lock().take_message_id();
        self.send_to_friend(friend, id, message, false)
    }

    fn send_message_withid(&self, friend: i32, id: u32, message: &[u8]) -> u32 {
        self.send_to_friend(friend, id, message, false)
    }

    fn send_action(&self, friend: i32, action: &[u8]) -> u32 {
        let id = self.node.state.lock().take_message_id();
        self.send_to_friend(friend, id, action, true)
    }

    fn send_action_withid(&self, friend: i32, id: u32, action: &[u8]) -> u32 {
        self.send_to_friend(friend, id, action, true)
    }

    fn set_name(&self, name: &[u8]) -> i32 {
        if name.is_empty() || name.len() > MAX_NAME_LENGTH {
            return FAILURE;
        }
        self.node.state.lock().profile.name = name.to_vec();
        SUCCESS
    }

    fn get_self_name(&self, out: &mut [u8]) -> u16 {
        copy_into(out, &self.node.state.lock().profile.name) as u16
    }

    fn get_name(&self, friend: i32, out: &mut [u8]) -> i32 {
        match self.node.state.lock().friend(friend) {
            Some(f) => copy_into(out, &f.name) as i32,
            None => FAILURE,
        }
    }

    fn get_name_size(&self, friend: i32) -> i32 {
        self.node
            .state
            .lock()
            .friend(friend)
            .map_or(FAILURE, |f| f.name.len() as i32)
    }

    fn get_self_name_size(&self) -> i32 {
        self.node.state.lock().profile.name.len() as i32
    }

    fn set_status_message(&self, status: &[u8]) -> i32 {
        if status.len() > MAX_STATUS_MESSAGE_LENGTH {
            return FAILURE;
        }
        self.node.state.lock().profile.status_message = status.to_vec();
        SUCCESS
    }

    fn set_user_status(&self, status: u8) -> i32 {
        if status >= USERSTATUS_INVALID {
            return FAILURE;
        }
        self.node.state.lock().profile.user_status = status;
        SUCCESS
    }

    fn get_status_message_size(&self, friend: i32) -> i32 {
        self.node
            .state
            .lock()
            .friend(friend)
            .map_or(FAILURE, |f| f.status_message.len() as i32)
    }

    fn get_self_status_message_size(&self) -> i32 {
        self.node.state.lock().profile.status_message.len() as i32
    }

    fn get_status_message(&self, friend: i32, out: &mut [u8]) -> i32 {
        match self.node.state.lock().friend(friend) {
            Some(f) => copy_into(out, &f.status_message) as i32,
            None => FAILURE,
        }
    }

    fn get_self_status_message(&self, out: &mut [u8]) -> i32 {
        copy_into(out, &self.node.state.lock().profile.status_message) as i32
    }

    fn get_user_status(&self, friend: i32) -> u8 {
        self.node
            .state
            .lock()
            .friend(friend)
            .map_or(USERSTATUS_INVALID, |f| f.user_status)
    }

    fn get_self_user_status(&self) -> u8 {
        self.node.state.lock().profile.user_status
    }

    fn get_last_online(&self, friend: i32) -> i64 {
        self.node
            .state
            .lock()
            .friend(friend)
            .map_or(NO_LAST_ONLINE, |f| f.last_online)
    }

    fn set_user_is_typing(&self, friend: i32, typing: u8) -> i32 {
        let mut state = self.node.state.lock();
        let my_key = state.profile.public_key;
        let Some(target) = state.friend_mut(friend) else {
            return FAILURE;
        };
        let typing = typing != FALSE;
        let changed = target.typing != typing;
        target.typing = typing;
        if changed && target.online {
            self.network
                .deliver(&target.public_key, Packet::Typing { from: my_key, typing });
        }
        SUCCESS
    }

    fn get_is_typing(&self, friend: i32) -> u8 {
        flag(self.node.state.lock().friend(friend).map_or(false, |f| f.peer_typing))
    }

    fn set_sends_receipts(&self, friend: i32, yesno: i32) {
        if let Some(f) = self.node.state.lock().friend_mut(friend) {
            f.sends_receipts = yesno != 0;
        }
    }

    fn count_friendlist(&self) -> u32 {
        self.node.state.lock().friends.iter().flatten().count() as u32
    }

    fn get_num_online_friends(&self) -> u32 {
        self.node
            .state
            .lock()
            .friends
            .iter()
            .flatten()
            .filter(|f| f.online)
            .count() as u32
    }

    fn get_friendlist(&self, out: &mut [i32]) -> u32 {
        let state = self.node.state.lock();
        let numbers = state
            .friends
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(n, _)| n as i32);
        let mut written = 0;
        for (slot, number) in out.iter_mut().zip(numbers) {
            *slot = number;
            written += 1;
        }
        written
    }

    fn get_nospam(&self) -> u32 {
        self.node.state.lock().profile.nospam
    }

    fn set_nospam(&self, nospam: u32) {
        self.node.state.lock().profile.nospam = nospam;
    }

    fn new_file_sender(&self, friend: i32, file_size: u64, filename: &[u8]) -> i32 {
        if filename.len() > MAX_FILENAME_LENGTH {
            return FAILURE;
        }
        let mut state = self.node.state.lock();
        let my_key = state.profile.public_key;
        let Some(target) = state.friend_mut(friend).filter(|f| f.online) else {
            return FAILURE;
        };
        let Some(file_number) = (0..=u8::MAX).find(|n| !target.outgoing.contains_key(n)) else {
            return FAILURE;
        };
        target.outgoing.insert(
            file_number,
            Transfer {
                remaining: file_size,
                accepted: false,
                paused: false,
            },
        );
        let packet = Packet::FileOffer {
            from: my_key,
            file_number,
            size: file_size,
            filename: filename.to_vec(),
        };
        if !self.network.deliver(&target.public_key, packet) {
            target.outgoing.remove(&file_number);
            return FAILURE;
        }
        i32::from(file_number)
    }

    fn file_send_control(
        &self,
        friend: i32,
        send_receive: u8,
        file_number: u8,
        message_id: u8,
        data: Option<&[u8]>,
    ) -> i32 {
        let Ok(control) = FileControl::try_from(message_id) else {
            return FAILURE;
        };
        let mut state = self.node.state.lock();
        let my_key = state.profile.public_key;
        let Some(target) = state.friend_mut(friend).filter(|f| f.online) else {
            return FAILURE;
        };
        if !Transfer::apply(target.transfers(send_receive), file_number, control) {
            return FAILURE;
        }
        let packet = Packet::FileControl {
            from: my_key,
            for_sender: send_receive != 0,
            file_number,
            control,
            data: data.unwrap_or_default().to_vec(),
        };
        self.network.deliver(&target.public_key, packet);
        SUCCESS
    }

    fn file_send_data(&self, friend: i32, file_number: u8, data: &[u8]) -> i32 {
        if data.is_empty() || data.len() > FILE_DATA_SIZE {
            return FAILURE;
        }
        let mut state = self.node.state.lock();
        let my_key = state.profile.public_key;
        let Some(target) = state.friend_mut(friend).filter(|f| f.online) else {
            return FAILURE;
        };
        let key = target.public_key;
        let Some(transfer) = target.outgoing.get_mut(&file_number) else {
            return FAILURE;
        };
        if !transfer.accepted || transfer.paused {
            return FAILURE;
        }
        transfer.remaining = transfer.remaining.saturating_sub(data.len() as u64);
        let packet = Packet::FileChunk {
            from: my_key,
            file_number,
            data: data.to_vec(),
        };
        self.network.deliver(&key, packet);
        SUCCESS
    }

    fn file_data_size(&self, friend: i32) -> i32 {
        match self.node.state.lock().friend(friend) {
            Some(_) => FILE_DATA_SIZE as i32,
            None => FAILURE,
        }
    }

    fn file_data_remaining(&self, friend: i32, file_number: u8, send_receive: u8) -> u64 {
        let mut state = self.node.state.lock();
        state
            .friend_mut(friend)
            .and_then(|f| f.transfers(send_receive).get(&file_number).map(|t| t.remaining))
            .unwrap_or(NO_BYTES_REMAINING)
    }

    fn size(&self) -> u32 {
        bincode::serialized_size(&self.saved_state()).map_or(0, |n| n as u32)
    }

    fn save(&self, out: &mut [u8]) {
        if let Ok(blob) = bincode::serialize(&self.saved_state()) {
            copy_into(out, &blob);
        }
    }

    fn load(&self, data: &[u8]) -> i32 {
        let saved: SavedState = match bincode::deserialize::<SavedState>(data) {
            Ok(saved) if saved.magic == SAVE_MAGIC => saved,
            _ => return FAILURE,
        };
        if saved.friends.len() > FRIEND_CAPACITY {
            return FAILURE;
        }

        let (old_key, new_key) = {
            let mut state = self.node.state.lock();
            let old_key = state.profile.public_key;
            state.profile = saved.profile;
            state.friends = saved
                .friends
                .into_iter()
                .map(|slot| {
                    slot.map(|f| {
                        let mut friend = Friend::new(f.public_key, f.nospam, f.pending_request);
                        friend.name = f.name;
                        friend.status_message = f.status_message;
                        friend.sends_receipts = f.sends_receipts;
                        friend.last_online = f.last_online;
                        friend
                    })
                })
                .collect();
            (old_key, state.profile.public_key)
        };

        if old_key != new_key {
            self.network.unregister(&old_key, &self.node);
            self.network.register(new_key, &self.node);
        }
        debug!("Loopback node state loaded ({} bytes)", data.len());
        SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toxwire_core::FRIEND_ADDRESS_SIZE;

    fn connected_pair(network: &LoopbackNetwork) -> (LoopbackEngine, LoopbackEngine) {
        let relay = network.add_relay("relay.local", 33445);
        let a = network.engine(&EngineOptions::default()).unwrap();
        let b = network.engine(&EngineOptions::default()).unwrap();
        for node in [&a, &b] {
            node.bootstrap_from_address("relay.local", true, 33445u16.to_be(), relay.as_bytes());
            node.advance().unwrap();
        }
        (a, b)
    }

    fn address_of(engine: &LoopbackEngine) -> Vec<u8> {
        let mut out = vec![0u8; FRIEND_ADDRESS_SIZE];
        engine.get_address(&mut out);
        out
    }

    #[test]
    fn test_bootstrap_requires_known_relay() {
        let network = LoopbackNetwork::new();
        let relay = network.add_relay("relay.local", 33445);
        let node = network.engine(&EngineOptions::default()).unwrap();

        node.bootstrap_from_address("relay.local", true, 33445, relay.as_bytes());
        node.advance().unwrap();
        // port was not converted to network byte order
        assert_eq!(node.is_connected(), 0);

        node.bootstrap_from_address("relay.local", true, 33445u16.to_be(), relay.as_bytes());
        node.advance().unwrap();
        assert_eq!(node.is_connected(), 1);
    }

    #[test_log::test]
    fn test_add_friend_codes() {
        let network = LoopbackNetwork::new();
        let (a, b) = connected_pair(&network);
        let b_address = address_of(&b);

        assert_eq!(a.add_friend(&b_address, &[]), FAERR_NOMESSAGE);
        assert_eq!(a.add_friend(&b_address, &[b'x'; MAX_FRIEND_REQUEST_DATA_SIZE + 1]), FAERR_TOOLONG);
        assert_eq!(a.add_friend(&address_of(&a), b"hi"), FAERR_OWNKEY);

        let mut corrupted = b_address.clone();
        corrupted[0] ^= 1;
        assert_eq!(a.add_friend(&corrupted, b"hi"), FAERR_BADCHECKSUM);

        assert_eq!(a.add_friend(&b_address, b"hi"), 0);
        assert_eq!(a.add_friend(&b_address, b"hi"), FAERR_ALREADYSENT);

        b.set_nospam(b.get_nospam().wrapping_add(1));
        assert_eq!(a.add_friend(&address_of(&b), b"hi"), FAERR_SETNEWNOSPAM);
    }

    #[test]
    fn test_friend_numbers_are_reused() {
        let network = LoopbackNetwork::new();
        let node = network.engine(&EngineOptions::default()).unwrap();

        let first = node.add_friend_norequest(&[1u8; CLIENT_ID_SIZE]);
        let second = node.add_friend_norequest(&[2u8; CLIENT_ID_SIZE]);
        assert_eq!((first, second), (0, 1));

        assert_eq!(node.del_friend(first), SUCCESS);
        assert_eq!(node.friend_exists(first), 0);
        assert_eq!(node.add_friend_norequest(&[3u8; CLIENT_ID_SIZE]), first);
        assert_eq!(node.count_friendlist(), 2);
    }

    #[test]
    fn test_friend_capacity_reports_nomem() {
        let network = LoopbackNetwork::new();
        let node = network.engine(&EngineOptions::default()).unwrap();
        for i in 0..FRIEND_CAPACITY {
            let mut key = [0u8; CLIENT_ID_SIZE];
            key[..2].copy_from_slice(&(i as u16).to_be_bytes());
            key[31] = 1;
            assert!(node.add_friend_norequest(&key) >= 0);
        }

        let address = FriendAddress::new(&ClientId::from_bytes([0xEE; CLIENT_ID_SIZE]), 1);
        assert_eq!(node.add_friend(address.as_bytes(), b"hello"), FAERR_NOMEM);
    }

    #[test]
    fn test_save_load_preserves_profile() {
        let network = LoopbackNetwork::new();
        let node = network.engine(&EngineOptions::default()).unwrap();
        node.set_name(b"loopback");
        node.set_status_message(b"testing");
        node.set_user_status(2);
        node.add_friend_norequest(&[7u8; CLIENT_ID_SIZE]);

        let mut blob = vec![0u8; node.size() as usize];
        node.save(&mut blob);

        let other = network.engine(&EngineOptions::default()).unwrap();
        assert_eq!(other.load(&blob), SUCCESS);
        assert_eq!(other.get_nospam(), node.get_nospam());
        assert_eq!(other.get_self_user_status(), 2);
        assert_eq!(other.get_friend_number(&[7u8; CLIENT_ID_SIZE]), 0);

        assert_eq!(other.load(&blob[..blob.len() / 2]), FAILURE);
        assert_eq!(other.load(&[]), FAILURE);
    }

    #[test_log::test]
    fn test_message_requires_online_friend() {
        let network = LoopbackNetwork::new();
        let (a, b) = connected_pair(&network);

        let friend = a.add_friend_norequest(b.client_id().as_bytes());
        assert_eq!(a.send_message(friend, b"early"), NO_MESSAGE_ID);

        b.add_friend_norequest(a.client_id().as_bytes());
        a.advance().unwrap();
        assert_eq!(a.get_friend_connection_status(friend), 1);
        assert_ne!(a.send_message(friend, b"now"), NO_MESSAGE_ID);
        assert_eq!(a.send_message_withid(friend, 77, b"tagged"), 77);
    }

    #[test]
    fn test_killed_node_leaves_network() {
        let network = LoopbackNetwork::new();
        let node = network.engine(&EngineOptions::default()).unwrap();
        assert_eq!(network.node_count(), 1);

        node.kill();
        assert_eq!(network.node_count(), 0);
        assert!(node.advance().is_ok());
    }
}
