//! # toxwire
//!
//! A session layer over a Tox-style peer-to-peer messaging engine.
//!
//! One [`Session`] is one local identity. Through it a caller manages
//! friends, exchanges messages and presence, transfers files in chunks and
//! receives asynchronous events. Events are raised by the engine only while
//! [`Session::tick`] runs and are delivered synchronously to the handlers
//! registered with the `on_*` methods.
//!
//! ## Example
//!
//! ```
//! use toxwire::{EngineOptions, Session};
//! use toxwire_engine::loopback::LoopbackNetwork;
//!
//! let network = LoopbackNetwork::new();
//! let session = Session::init(&EngineOptions::default(), |o| network.engine(o))?;
//! session.on_friend_message(|_, msg| {
//!     println!("{}: {}", msg.friend, String::from_utf8_lossy(&msg.message));
//! })?;
//! session.tick()?;
//! # Ok::<(), toxwire::Error>(())
//! ```
//!
//! ## Concurrency
//!
//! The tick and every other operation share one reentrant lock. Handlers run
//! on the ticking thread with the lock held and may call any operation except
//! [`Session::kill`] and [`Session::tick`], which fail with
//! [`Error::InCallback`].

#![warn(missing_docs)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod marshal;
pub mod persistence;
pub mod session;
pub mod translate;

pub use bridge::Handler;
pub use config::{BootstrapNode, ProfileConfig, SessionConfig, TickConfig};
pub use error::{ArgumentError, Error, FriendAddError, Result};
pub use events::Event;
pub use session::Session;

pub use toxwire_core::{
    ClientId, FileControl, FileNumber, FriendAddress, FriendNumber, TransferDirection, UserStatus,
};
pub use toxwire_engine::{Engine, EngineOptions, NotificationKind};
