//! End-to-end session tests over the loopback engine

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use toxwire::events::{ConnectionChange, FileChunk, FileControlMessage, FileSendRequest, FriendMessage};
use toxwire::{
    ArgumentError, EngineOptions, Error, FileControl, FileNumber, FriendAddError, FriendNumber,
    NotificationKind, Session, TransferDirection, UserStatus,
};
use toxwire_engine::loopback::{LoopbackNetwork, FILE_DATA_SIZE};

const RELAY_ADDRESS: &str = "relay.local";
const RELAY_PORT: u16 = 33445;

fn new_session(network: &LoopbackNetwork) -> Session {
    Session::init(&EngineOptions::default(), |o| network.engine(o)).unwrap()
}

fn tick_rounds(sessions: &[&Session], rounds: usize) {
    for _ in 0..rounds {
        for s in sessions {
            s.tick().unwrap();
        }
    }
}

/// Two sessions bootstrapped onto the same network
fn connected() -> (LoopbackNetwork, Session, Session) {
    let network = LoopbackNetwork::new();
    let relay = network.add_relay(RELAY_ADDRESS, RELAY_PORT);
    let a = new_session(&network);
    let b = new_session(&network);
    for s in [&a, &b] {
        s.bootstrap_from_address(RELAY_ADDRESS, RELAY_PORT, &relay.to_string())
            .unwrap();
    }
    tick_rounds(&[&a, &b], 1);
    (network, a, b)
}

struct Friends {
    _network: LoopbackNetwork,
    a: Session,
    b: Session,
    a_to_b: FriendNumber,
    b_to_a: FriendNumber,
}

/// Two sessions that are online friends of each other
fn befriended() -> Friends {
    let (network, a, b) = connected();
    let a_to_b = a.add_friend_norequest(b.client_id().unwrap().as_bytes()).unwrap();
    let b_to_a = b.add_friend_norequest(a.client_id().unwrap().as_bytes()).unwrap();
    tick_rounds(&[&a, &b], 2);
    assert!(a.friend_connection_status(a_to_b).unwrap());
    assert!(b.friend_connection_status(b_to_a).unwrap());
    Friends {
        _network: network,
        a,
        b,
        a_to_b,
        b_to_a,
    }
}

fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&Session, &T) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |_: &Session, event: &T| sink.lock().push(event.clone()))
}

#[test_log::test]
fn test_request_handshake_then_message() {
    let (_network, a, b) = connected();

    b.on_friend_request(|session, request| {
        session.add_friend_norequest(request.public_key.as_bytes()).unwrap();
    })
    .unwrap();
    let (connections, on_connection) = recorder::<ConnectionChange>();
    a.on_connection_status(on_connection).unwrap();

    let address = b.address().unwrap();
    let friend = a.add_friend(address.as_bytes(), b"let's talk").unwrap();

    let mut rounds = 0;
    while !connections.lock().iter().any(|c| c.online) {
        assert!(rounds < 10, "friend never came online");
        tick_rounds(&[&a, &b], 1);
        rounds += 1;
    }

    let change = connections.lock()[0].clone();
    assert_eq!(change.friend, friend);
    assert!(change.online);

    let id = a.send_message(friend, b"hello").unwrap();
    assert_ne!(id, 0);
}

#[test]
fn test_operations_after_kill_fail_with_bad_session() {
    let network = LoopbackNetwork::new();
    let s = new_session(&network);
    s.kill().unwrap();

    let friend = FriendNumber::from_raw(0);
    assert_eq!(s.tick(), Err(Error::BadSession));
    assert_eq!(s.set_name(b"x"), Err(Error::BadSession));
    assert_eq!(s.self_name(), Err(Error::BadSession));
    assert_eq!(s.send_message(friend, b""), Err(Error::BadSession));
    assert_eq!(s.add_friend(&[0u8; 3], b"hi"), Err(Error::BadSession));
    assert_eq!(s.is_connected(), Err(Error::BadSession));
    assert_eq!(s.save(), Err(Error::BadSession));
    assert_eq!(s.load(b"blob"), Err(Error::BadSession));
    assert_eq!(s.file_send_data(friend, FileNumber::from_raw(0), &[]), Err(Error::BadSession));
    assert_eq!(s.bootstrap_from_address("x", 1, "zz"), Err(Error::BadSession));
    assert_eq!(s.remove_handler(NotificationKind::FileData), Err(Error::BadSession));
}

#[test]
fn test_wrong_length_address_fails_locally() {
    let (_network, a, _b) = connected();
    let result = a.add_friend(&[7u8; 37], b"hi");
    assert_eq!(
        result,
        Err(Error::InvalidArgument(ArgumentError::WrongLength {
            field: "friend address",
            expected: 38,
            actual: 37,
        }))
    );
    assert_eq!(a.count_friendlist().unwrap(), 0);
}

#[test]
fn test_friend_add_errors_are_matchable() {
    let (_network, a, b) = connected();
    let own = a.address().unwrap();
    let theirs = b.address().unwrap();

    assert_eq!(
        a.add_friend(own.as_bytes(), b"me"),
        Err(Error::FriendAdd(FriendAddError::OwnKey))
    );
    assert_eq!(
        a.add_friend(theirs.as_bytes(), b""),
        Err(Error::FriendAdd(FriendAddError::NoMessage))
    );

    let mut corrupted = *theirs.as_bytes();
    corrupted[37] ^= 0xFF;
    assert_eq!(
        a.add_friend(&corrupted, b"hi"),
        Err(Error::FriendAdd(FriendAddError::BadChecksum))
    );

    a.add_friend(theirs.as_bytes(), b"hi").unwrap();
    assert_eq!(
        a.add_friend(theirs.as_bytes(), b"hi"),
        Err(Error::FriendAdd(FriendAddError::AlreadySent))
    );
}

#[test]
fn test_message_handler_fires_once_and_can_be_replaced() {
    let f = befriended();

    let first = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&first);
    f.b.on_friend_message(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    let (messages, on_message) = recorder::<FriendMessage>();
    f.b.on_friend_message(on_message).unwrap();

    f.a.send_message(f.a_to_b, b"ping").unwrap();
    tick_rounds(&[&f.b], 1);

    assert_eq!(first.load(Ordering::SeqCst), 0);
    let messages = messages.lock();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].friend, f.b_to_a);
    assert_eq!(messages[0].message, b"ping");
}

#[test]
fn test_removed_handler_drops_events() {
    let f = befriended();
    let (messages, on_message) = recorder::<FriendMessage>();
    f.b.on_friend_message(on_message).unwrap();
    f.b.remove_handler(NotificationKind::FriendMessage).unwrap();

    f.a.send_message(f.a_to_b, b"lost").unwrap();
    tick_rounds(&[&f.b], 1);
    assert!(messages.lock().is_empty());
}

#[test]
fn test_action_with_id_arrives_as_action() {
    let f = befriended();
    let actions = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&actions);
    f.b.on_friend_action(move |_, action| sink.lock().push(action.action.clone()))
        .unwrap();
    let (messages, on_message) = recorder::<FriendMessage>();
    f.b.on_friend_message(on_message).unwrap();

    assert_eq!(f.a.send_action_with_id(f.a_to_b, 900, b"waves").unwrap(), 900);
    tick_rounds(&[&f.b], 1);

    assert_eq!(actions.lock().as_slice(), &[b"waves".to_vec()]);
    assert!(messages.lock().is_empty());
}

#[test]
fn test_read_receipts_echo_message_ids() {
    let f = befriended();
    let receipts = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&receipts);
    f.a.on_read_receipt(move |_, r| sink.lock().push(r.receipt)).unwrap();

    let id = f.a.send_message_with_id(f.a_to_b, 41, b"tracked").unwrap();
    assert_eq!(id, 41);
    tick_rounds(&[&f.b, &f.a], 1);
    assert_eq!(receipts.lock().as_slice(), &[41]);

    f.b.set_sends_receipts(f.b_to_a, false).unwrap();
    f.a.send_message(f.a_to_b, b"quiet").unwrap();
    tick_rounds(&[&f.b, &f.a], 1);
    assert_eq!(receipts.lock().len(), 1);
}

#[test]
fn test_presence_changes_reach_friend() {
    let f = befriended();
    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&names);
    f.a.on_name_change(move |_, change| sink.lock().push((change.friend, change.name.clone())))
        .unwrap();
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&statuses);
    f.a.on_user_status(move |_, change| sink.lock().push(change.status)).unwrap();
    let typing = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&typing);
    f.a.on_typing_change(move |_, change| sink.lock().push(change.typing)).unwrap();

    f.b.set_name(b"bob").unwrap();
    f.b.set_status_message(b"out to lunch").unwrap();
    f.b.set_user_status(UserStatus::Away).unwrap();
    f.b.set_user_is_typing(f.b_to_a, true).unwrap();
    tick_rounds(&[&f.a], 1);

    assert_eq!(names.lock().as_slice(), &[(f.a_to_b, b"bob".to_vec())]);
    assert_eq!(statuses.lock().as_slice(), &[UserStatus::Away]);
    assert_eq!(typing.lock().as_slice(), &[true]);

    assert_eq!(f.a.friend_name(f.a_to_b).unwrap(), b"bob");
    assert_eq!(f.a.friend_name_size(f.a_to_b).unwrap(), 3);
    assert_eq!(f.a.friend_status_message(f.a_to_b).unwrap(), b"out to lunch");
    assert_eq!(f.a.friend_user_status(f.a_to_b).unwrap(), UserStatus::Away);
    assert!(f.a.is_typing(f.a_to_b).unwrap());
    assert!(f.a.last_online(f.a_to_b).unwrap().is_some());
}

#[test]
fn test_friend_enumeration() {
    let f = befriended();
    assert_eq!(f.a.count_friendlist().unwrap(), 1);
    assert_eq!(f.a.num_online_friends().unwrap(), 1);
    assert_eq!(f.a.friend_list().unwrap(), vec![f.a_to_b]);
    assert_eq!(
        f.a.friend_number(f.b.client_id().unwrap().as_bytes()).unwrap(),
        Some(f.a_to_b)
    );
    assert_eq!(f.a.friend_client_id(f.a_to_b).unwrap(), f.b.client_id().unwrap());

    f.a.delete_friend(f.a_to_b).unwrap();
    assert!(!f.a.friend_exists(f.a_to_b).unwrap());
    assert_eq!(f.a.count_friendlist().unwrap(), 0);
    assert!(f.a.delete_friend(f.a_to_b).is_err());
}

#[test]
fn test_file_transfer_with_nil_control_payload() {
    let f = befriended();

    let (offers, on_offer) = recorder::<FileSendRequest>();
    f.b.on_file_send_request(on_offer).unwrap();
    let (chunks, on_chunk) = recorder::<FileChunk>();
    f.b.on_file_data(on_chunk).unwrap();
    let (controls, on_control) = recorder::<FileControlMessage>();
    f.a.on_file_control(on_control).unwrap();

    let file = f.a.new_file_sender(f.a_to_b, 100, b"notes.txt").unwrap();
    tick_rounds(&[&f.b], 1);
    let offer = offers.lock()[0].clone();
    assert_eq!(offer.filename, b"notes.txt");
    assert_eq!(offer.file_size, 100);

    // nil and empty payloads are the same thing
    f.b.file_send_control(f.b_to_a, TransferDirection::Receiving, offer.file_number, FileControl::Accept, None)
        .unwrap();
    f.b.file_send_control(
        f.b_to_a,
        TransferDirection::Receiving,
        offer.file_number,
        FileControl::Accept,
        Some(&[][..]),
    )
    .unwrap();
    tick_rounds(&[&f.a], 1);

    let controls = controls.lock().clone();
    assert_eq!(controls.len(), 2);
    assert_eq!(controls[0], controls[1]);
    assert_eq!(controls[0].direction, TransferDirection::Sending);
    assert_eq!(controls[0].control, FileControl::Accept);
    assert!(controls[0].data.is_empty());

    assert_eq!(f.a.file_data_size(f.a_to_b).unwrap(), FILE_DATA_SIZE);
    assert_eq!(
        f.a.file_data_remaining(f.a_to_b, file, TransferDirection::Sending).unwrap(),
        100
    );
    assert!(matches!(
        f.a.file_send_data(f.a_to_b, file, &[]),
        Err(Error::InvalidArgument(ArgumentError::Empty { .. }))
    ));
    f.a.file_send_data(f.a_to_b, file, &[0xAA; 40]).unwrap();
    assert_eq!(
        f.a.file_data_remaining(f.a_to_b, file, TransferDirection::Sending).unwrap(),
        60
    );

    tick_rounds(&[&f.b], 1);
    let chunks = chunks.lock();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].data, vec![0xAA; 40]);
    assert_eq!(
        f.b.file_data_remaining(f.b_to_a, offer.file_number, TransferDirection::Receiving)
            .unwrap(),
        60
    );
}

#[test]
fn test_save_load_round_trip() {
    let network = LoopbackNetwork::new();
    let original = new_session(&network);
    original.set_name(b"persistent").unwrap();
    original.set_status_message(b"saved").unwrap();
    original.set_user_status(UserStatus::Busy).unwrap();
    original.set_nospam(0xDEAD_BEEF).unwrap();

    let blob = original.save().unwrap();
    assert_eq!(blob.len(), original.save_size().unwrap());

    let restored = new_session(&network);
    restored.load(&blob).unwrap();
    assert_eq!(restored.self_name().unwrap(), b"persistent");
    assert_eq!(restored.self_status_message().unwrap(), b"saved");
    assert_eq!(restored.self_user_status().unwrap(), UserStatus::Busy);
    assert_eq!(restored.nospam().unwrap(), 0xDEAD_BEEF);
    assert_eq!(restored.address().unwrap(), original.address().unwrap());
}

#[test]
fn test_ticker_thread_with_concurrent_operations() {
    let f = befriended();
    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    f.b.on_friend_message(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    let ticker = {
        let b = f.b.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                b.tick().unwrap();
            }
        })
    };

    for i in 0..50u32 {
        f.a.send_message(f.a_to_b, format!("msg {i}").as_bytes()).unwrap();
        f.b.set_status_message(format!("status {i}").as_bytes()).unwrap();
        assert!(f.b.self_status_message().unwrap().starts_with(b"status"));
    }
    ticker.join().unwrap();
    f.b.tick().unwrap();

    assert_eq!(received.load(Ordering::SeqCst), 50);
}

#[test]
fn test_handler_swaps_while_ticking_deliver_each_message_once() {
    let f = befriended();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let register = |session: &Session, counter: &Arc<AtomicUsize>| {
        let counter = Arc::clone(counter);
        session
            .on_friend_message(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    };
    register(&f.b, &first);

    let ticker = {
        let b = f.b.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                b.tick().unwrap();
            }
        })
    };

    for i in 0..50u32 {
        let counter = if i % 2 == 0 { &second } else { &first };
        register(&f.b, counter);
        assert!(f.b.has_handler(NotificationKind::FriendMessage));
        f.a.send_message(f.a_to_b, format!("msg {i}").as_bytes()).unwrap();
    }
    ticker.join().unwrap();
    f.b.tick().unwrap();

    let delivered = first.load(Ordering::SeqCst) + second.load(Ordering::SeqCst);
    assert_eq!(delivered, 50);
}

#[test]
fn test_tick_recovers_after_handler_panic() {
    let f = befriended();
    f.b.on_friend_message(|_, _| panic!("handler failed")).unwrap();
    f.a.send_message(f.a_to_b, b"boom").unwrap();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| f.b.tick()));
    assert!(outcome.is_err());

    assert_eq!(f.b.tick(), Ok(()));
    let (messages, on_message) = recorder::<FriendMessage>();
    f.b.on_friend_message(on_message).unwrap();
    f.a.send_message(f.a_to_b, b"again").unwrap();
    f.b.tick().unwrap();
    assert_eq!(messages.lock().len(), 1);
    assert_eq!(messages.lock()[0].message, b"again");
}

#[test]
fn test_handler_can_reply_through_session() {
    let f = befriended();
    f.b.on_friend_message(|session, msg| {
        if msg.message == b"ping" {
            session.send_message(msg.friend, b"pong").unwrap();
        }
    })
    .unwrap();
    let (replies, on_reply) = recorder::<FriendMessage>();
    f.a.on_friend_message(on_reply).unwrap();

    f.a.send_message(f.a_to_b, b"ping").unwrap();
    tick_rounds(&[&f.b, &f.a], 1);

    assert_eq!(replies.lock()[0].message, b"pong");
}

#[test]
fn test_kill_and_tick_from_handler_are_refused() {
    let f = befriended();
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&outcomes);
    f.b.on_friend_message(move |session, _| {
        sink.lock().push(session.kill());
        sink.lock().push(session.tick());
    })
    .unwrap();

    f.a.send_message(f.a_to_b, b"die").unwrap();
    f.b.tick().unwrap();

    assert_eq!(
        outcomes.lock().as_slice(),
        &[Err::<(), _>(Error::InCallback), Err(Error::InCallback)]
    );
    assert!(!f.b.is_killed());
    f.b.kill().unwrap();
}

#[test]
fn test_handler_may_register_handlers() {
    let f = befriended();
    let late = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&late);
    f.b.on_friend_message(move |session, _| {
        let counter = Arc::clone(&counter);
        session
            .on_friend_action(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    })
    .unwrap();

    f.a.send_message(f.a_to_b, b"arm").unwrap();
    f.b.tick().unwrap();
    assert!(f.b.has_handler(NotificationKind::FriendAction));

    f.a.send_action(f.a_to_b, b"fire").unwrap();
    f.b.tick().unwrap();
    assert_eq!(late.load(Ordering::SeqCst), 1);
}

#[test]
fn test_init_failure_is_reported() {
    let result = Session::init(&EngineOptions::default(), |_| {
        None::<toxwire_engine::loopback::LoopbackEngine>
    });
    assert!(matches!(result, Err(Error::Init)));
}
