//! The engine catalogue

use serde::{Deserialize, Serialize};

use crate::hooks::{DispatchError, Hook, NotificationKind};

/// Options passed to an engine constructor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Use IPv6 sockets (falls back to IPv4 where the engine supports it)
    pub ipv6_enabled: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { ipv6_enabled: true }
    }
}

/// A protocol engine instance.
///
/// Method semantics follow the engine's native API: integers in, sentinel
/// codes out (see [`crate::sentinel`]), output written into caller-sized
/// buffers with the written length returned. Implementations must tolerate
/// calls made from inside a hook while [`Engine::advance`] is running, and
/// must not hold internal locks while invoking hooks.
///
/// `friend` arguments are engine friend numbers; `send_receive` flags are 0
/// for a file we are sending and 1 for a file we are receiving.
pub trait Engine: Send + Sync {
    /// Release every resource held by the engine. No other call follows.
    fn kill(&self);

    /// Run one iteration, raising zero or more notifications through the
    /// registered hooks before returning. Reports the first hook failure.
    fn advance(&self) -> Result<(), DispatchError>;

    /// Arm (`Some`) or disarm (`None`) the hook for a notification kind
    fn set_hook(&self, kind: NotificationKind, hook: Option<Hook>);

    /// Join the network through a known node. `port` is in network byte order.
    fn bootstrap_from_address(&self, address: &str, ipv6_enabled: bool, port: u16, public_key: &[u8]);

    /// 1 when connected to the network
    fn is_connected(&self) -> i32;

    /// Write our friend address into `out` (friend address size)
    fn get_address(&self, out: &mut [u8]);

    /// Send a friend request. Friend number, or a `FAERR_*` code.
    fn add_friend(&self, address: &[u8], data: &[u8]) -> i32;

    /// Add a friend without a request. Friend number or -1.
    fn add_friend_norequest(&self, client_id: &[u8]) -> i32;

    /// Friend number for a client ID, or -1
    fn get_friend_number(&self, client_id: &[u8]) -> i32;

    /// Write a friend's client ID into `out`. 0 on success, -1 on failure.
    fn get_client_id(&self, friend: i32, out: &mut [u8]) -> i32;

    /// Remove a friend. 0 on success, -1 on failure.
    fn del_friend(&self, friend: i32) -> i32;

    /// 1 online, 0 offline, -1 unknown friend
    fn get_friend_connection_status(&self, friend: i32) -> i32;

    /// 1 if the friend number is in use
    fn friend_exists(&self, friend: i32) -> i32;

    /// Message ID, or 0 on failure
    fn send_message(&self, friend: i32, message: &[u8]) -> u32;

    /// `id` on success, 0 on failure
    fn send_message_withid(&self, friend: i32, id: u32, message: &[u8]) -> u32;

    /// Message ID, or 0 on failure
    fn send_action(&self, friend: i32, action: &[u8]) -> u32;

    /// `id` on success, 0 on failure
    fn send_action_withid(&self, friend: i32, id: u32, action: &[u8]) -> u32;

    /// 0 on success, -1 on failure
    fn set_name(&self, name: &[u8]) -> i32;

    /// Write our name into `out`, returning its length
    fn get_self_name(&self, out: &mut [u8]) -> u16;

    /// Write a friend's name into `out`, returning its length or -1
    fn get_name(&self, friend: i32, out: &mut [u8]) -> i32;

    /// Length of a friend's name, or -1
    fn get_name_size(&self, friend: i32) -> i32;

    /// Length of our name, or -1
    fn get_self_name_size(&self) -> i32;

    /// 0 on success, -1 on failure
    fn set_status_message(&self, status: &[u8]) -> i32;

    /// 0 on success, -1 on failure
    fn set_user_status(&self, status: u8) -> i32;

    /// Length of a friend's status message, or -1
    fn get_status_message_size(&self, friend: i32) -> i32;

    /// Length of our status message, or -1
    fn get_self_status_message_size(&self) -> i32;

    /// Write a friend's status message into `out`, returning the length or -1
    fn get_status_message(&self, friend: i32, out: &mut [u8]) -> i32;

    /// Write our status message into `out`, returning the length or -1
    fn get_self_status_message(&self, out: &mut [u8]) -> i32;

    /// A friend's raw user status (invalid sentinel for unknown friends)
    fn get_user_status(&self, friend: i32) -> u8;

    /// Our raw user status
    fn get_self_user_status(&self) -> u8;

    /// Unix time the friend was last seen, 0 if never, -1 for unknown friends
    fn get_last_online(&self, friend: i32) -> i64;

    /// Set our typing flag toward a friend. 0 on success, -1 on failure.
    fn set_user_is_typing(&self, friend: i32, typing: u8) -> i32;

    /// 1 if the friend is typing
    fn get_is_typing(&self, friend: i32) -> u8;

    /// Whether we acknowledge this friend's messages with read receipts
    fn set_sends_receipts(&self, friend: i32, yesno: i32);

    /// Number of friends
    fn count_friendlist(&self) -> u32;

    /// Number of online friends
    fn get_num_online_friends(&self) -> u32;

    /// Write friend numbers into `out`, returning how many were written
    fn get_friendlist(&self, out: &mut [i32]) -> u32;

    /// Current nospam
    fn get_nospam(&self) -> u32;

    /// Replace the nospam, invalidating previously issued addresses
    fn set_nospam(&self, nospam: u32);

    /// Offer a file to a friend. File number or -1.
    fn new_file_sender(&self, friend: i32, file_size: u64, filename: &[u8]) -> i32;

    /// Send a control verb. `data` is `None` for an empty payload. 0 or -1.
    fn file_send_control(
        &self,
        friend: i32,
        send_receive: u8,
        file_number: u8,
        message_id: u8,
        data: Option<&[u8]>,
    ) -> i32;

    /// Send a chunk of a file we are sending. 0 or -1.
    fn file_send_data(&self, friend: i32, file_number: u8, data: &[u8]) -> i32;

    /// Largest chunk accepted by [`Engine::file_send_data`], or -1
    fn file_data_size(&self, friend: i32) -> i32;

    /// Bytes left in a transfer, 0 on failure
    fn file_data_remaining(&self, friend: i32, file_number: u8, send_receive: u8) -> u64;

    /// Size of the persistence blob
    fn size(&self) -> u32;

    /// Write the persistence blob into `out` ([`Engine::size`] bytes)
    fn save(&self, out: &mut [u8]);

    /// Replace engine state from a blob. 0 on success, -1 on failure.
    fn load(&self, data: &[u8]) -> i32;
}
