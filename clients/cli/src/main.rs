//! toxwire command-line client
//!
//! `toxwire address` creates or reopens a profile and prints its friend
//! address. `toxwire echo` runs two sessions over the in-process loopback
//! network and walks them through a friend handshake, an echoed message and
//! a small file transfer.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use toxwire::events::FileSendRequest;
use toxwire::{
    BootstrapNode, Event, FileControl, FileNumber, FriendNumber, ProfileConfig, Session,
    SessionConfig, TransferDirection,
};
use toxwire_engine::loopback::LoopbackNetwork;

mod config;

use config::CliConfig;

const RELAY_ADDRESS: &str = "relay.loopback";
const RELAY_PORT: u16 = 33445;

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "toxwire")]
#[command(about = "Peer-to-peer messaging sessions over a Tox-style engine")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the friend address of the stored profile, creating it if needed
    Address {
        /// Set the display name before saving
        #[arg(long)]
        name: Option<String>,

        /// Pick a fresh nospam, invalidating previously shared addresses
        #[arg(long)]
        new_nospam: bool,
    },

    /// Run two loopback sessions that befriend each other and echo a message
    Echo {
        /// Message alice sends to bob
        #[arg(short, long, default_value = "hello from alice")]
        message: String,

        /// Size of the file alice sends to bob
        #[arg(long, default_value = "4096")]
        file_size: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config_path = cli.config.unwrap_or_else(CliConfig::default_path);
    let config = CliConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    debug!(path = %config_path.display(), "Config loaded");

    match cli.command {
        Commands::Address { name, new_nospam } => address(&config, name, new_nospam),
        Commands::Echo { message, file_size } => echo(&config, message, file_size).await,
    }
}

/// Open the stored profile, optionally update it, print the address and save
fn address(config: &CliConfig, name: Option<String>, new_nospam: bool) -> anyhow::Result<()> {
    let network = LoopbackNetwork::new();
    let session = Session::init(&config.session.engine, |o| network.engine(o))?;

    let path = config.profile_path();
    if path.exists() {
        let blob = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        session
            .load(&blob)
            .with_context(|| format!("{} is not a profile", path.display()))?;
        info!(path = %path.display(), "Profile loaded");
    } else {
        info!(path = %path.display(), "Creating profile");
    }

    if let Some(name) = name {
        session.set_name(name.as_bytes())?;
    }
    if new_nospam {
        session.set_nospam(rand::random())?;
    }

    let name = session.self_name()?;
    if !name.is_empty() {
        println!("name:    {}", String::from_utf8_lossy(&name));
    }
    println!("address: {}", session.address()?);

    std::fs::create_dir_all(&config.data_dir)?;
    std::fs::write(&path, session.save()?).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Config for one side of the echo demo
fn peer_config(base: &SessionConfig, name: &str, relay: &BootstrapNode) -> SessionConfig {
    SessionConfig {
        profile: ProfileConfig {
            name: Some(name.to_string()),
            status_message: Some(format!("{name} is echoing")),
            ..base.profile.clone()
        },
        bootstrap_nodes: vec![relay.clone()],
        ..base.clone()
    }
}

/// Forward every notification of a session into a channel
fn forward_events(
    session: &Session,
    tag: &'static str,
    tx: &UnboundedSender<(&'static str, Event)>,
) -> toxwire::Result<()> {
    macro_rules! forward {
        ($register:ident, $variant:ident) => {{
            let tx = tx.clone();
            session.$register(move |_, payload| {
                let _ = tx.send((tag, Event::$variant(payload.clone())));
            })?;
        }};
    }
    forward!(on_friend_message, FriendMessage);
    forward!(on_friend_action, FriendAction);
    forward!(on_name_change, NameChange);
    forward!(on_status_message, StatusMessage);
    forward!(on_user_status, UserStatus);
    forward!(on_typing_change, TypingChange);
    forward!(on_read_receipt, ReadReceipt);
    forward!(on_connection_status, ConnectionStatus);
    forward!(on_file_control, FileControl);
    forward!(on_file_data, FileData);
    Ok(())
}

/// Progress of the echo demo
#[derive(Default)]
struct EchoState {
    alice_friend: Option<FriendNumber>,
    online: bool,
    message_sent: bool,
    echoed: bool,
    file: Option<FileNumber>,
    file_sent: bool,
    bytes_received: u64,
}

impl EchoState {
    fn done(&self, file_size: u64) -> bool {
        self.echoed && self.file_sent && self.bytes_received == file_size
    }
}

async fn echo(config: &CliConfig, message: String, file_size: u64) -> anyhow::Result<()> {
    let network = LoopbackNetwork::new();
    let relay_key = network.add_relay(RELAY_ADDRESS, RELAY_PORT);
    let relay = BootstrapNode {
        address: RELAY_ADDRESS.to_string(),
        port: RELAY_PORT,
        public_key: relay_key.to_string(),
    };

    let alice_config = peer_config(&config.session, "alice", &relay);
    let alice = Session::from_config(&alice_config, |o| network.engine(o))?;
    let bob_config = peer_config(&config.session, "bob", &relay);
    let bob = Session::from_config(&bob_config, |o| network.engine(o))?;
    info!(alice = %alice.address()?, bob = %bob.address()?, "Sessions created");

    let (tx, mut rx) = mpsc::unbounded_channel();
    forward_events(&alice, "alice", &tx)?;
    forward_events(&bob, "bob", &tx)?;

    // Bob accepts everyone and echoes everything
    bob.on_friend_request(|session, request| {
        info!(
            from = %request.public_key,
            message = %String::from_utf8_lossy(&request.message),
            "bob: friend request"
        );
        if let Err(e) = session.add_friend_norequest(request.public_key.as_bytes()) {
            warn!("bob could not accept request: {}", e);
        }
    })?;
    bob.on_friend_message(|session, msg| {
        println!("bob   <- {}: {}", msg.friend, String::from_utf8_lossy(&msg.message));
        if let Err(e) = session.send_message(msg.friend, &msg.message) {
            warn!("bob could not echo: {}", e);
        }
    })?;
    bob.on_file_send_request(|session, offer: &FileSendRequest| {
        println!(
            "bob   <- {} offers {} ({} bytes)",
            offer.friend,
            String::from_utf8_lossy(&offer.filename),
            offer.file_size
        );
        let accepted = session.file_send_control(
            offer.friend,
            TransferDirection::Receiving,
            offer.file_number,
            FileControl::Accept,
            None,
        );
        if let Err(e) = accepted {
            warn!("bob could not accept file: {}", e);
        }
    })?;

    let started = Utc::now();
    let mut state = EchoState::default();
    let mut ticker = tokio::time::interval(config.session.tick.interval());
    let deadline = tokio::time::sleep(Duration::from_secs(config.echo_timeout_secs));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => bail!("echo did not complete within {}s", config.echo_timeout_secs),
            _ = ticker.tick() => {}
        }

        alice.tick()?;
        bob.tick()?;
        drain(&mut rx, &mut state);

        step(&alice, &bob, &mut state, message.as_bytes(), file_size)?;
        if state.done(file_size) {
            break;
        }
    }

    println!(
        "done in {} ms: {} bytes transferred, {} friends online",
        (Utc::now() - started).num_milliseconds(),
        state.bytes_received,
        alice.num_online_friends()?
    );
    alice.kill()?;
    bob.kill()?;
    Ok(())
}

/// Print queued events and fold them into the demo state
fn drain(rx: &mut UnboundedReceiver<(&'static str, Event)>, state: &mut EchoState) {
    while let Ok((tag, event)) = rx.try_recv() {
        match event {
            Event::ConnectionStatus(change) => {
                let presence = if change.online { "online" } else { "offline" };
                println!("{tag:<5} .. {} is {}", change.friend, presence);
                if tag == "alice" && change.online {
                    state.online = true;
                }
            }
            Event::FriendMessage(msg) => {
                println!("{tag:<5} <- {}: {}", msg.friend, String::from_utf8_lossy(&msg.message));
                if tag == "alice" {
                    state.echoed = true;
                }
            }
            Event::ReadReceipt(r) => println!("{tag:<5} .. {} read message {}", r.friend, r.receipt),
            Event::FileControl(c) => {
                println!("{tag:<5} .. file {} control {:?} ({:?})", c.file_number, c.control, c.direction);
            }
            Event::FileData(chunk) => {
                state.bytes_received += chunk.data.len() as u64;
                debug!(bytes = chunk.data.len(), total = state.bytes_received, "{tag}: chunk");
            }
            other => println!("{tag:<5} .. {}", other.kind()),
        }
    }
}

/// Advance the demo by one step
fn step(
    alice: &Session,
    bob: &Session,
    state: &mut EchoState,
    message: &[u8],
    file_size: u64,
) -> anyhow::Result<()> {
    let friend = match state.alice_friend {
        Some(friend) => friend,
        None => {
            let friend = alice.add_friend(bob.address()?.as_bytes(), b"echo, please")?;
            println!("alice -> friend request to bob ({})", friend);
            state.alice_friend = Some(friend);
            return Ok(());
        }
    };
    if !state.online {
        return Ok(());
    }

    if !state.message_sent {
        alice.set_user_is_typing(friend, true)?;
        let id = alice.send_message(friend, message)?;
        alice.set_user_is_typing(friend, false)?;
        println!("alice -> {}: {} (id {})", friend, String::from_utf8_lossy(message), id);
        state.message_sent = true;
        return Ok(());
    }

    let file = match state.file {
        Some(file) => file,
        None => {
            let file = alice.new_file_sender(friend, file_size, b"echo.bin")?;
            println!("alice -> offering file {} ({} bytes)", file, file_size);
            state.file = Some(file);
            return Ok(());
        }
    };

    if state.file_sent {
        return Ok(());
    }
    // Chunks are refused until bob's accept has arrived
    let remaining = match alice.file_data_remaining(friend, file, TransferDirection::Sending) {
        Ok(remaining) => remaining,
        Err(_) => {
            state.file_sent = true;
            return Ok(());
        }
    };
    let chunk = alice.file_data_size(friend)?.min(remaining as usize);
    let payload = vec![0x5A; chunk];
    match alice.file_send_data(friend, file, &payload) {
        Ok(()) => {
            if remaining as usize == chunk {
                alice.file_send_control(friend, TransferDirection::Sending, file, FileControl::Finished, None)?;
                println!("alice -> file {} finished", file);
                state.file_sent = true;
            }
        }
        Err(e) => debug!("waiting for accept: {}", e),
    }
    Ok(())
}
