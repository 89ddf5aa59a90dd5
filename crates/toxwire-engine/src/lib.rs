//! # toxwire-engine
//!
//! The boundary between the toxwire session layer and the protocol engine
//! that does the actual cryptography, routing and framing.
//!
//! The [`Engine`] trait mirrors the engine's native catalogue: every call takes
//! raw integers and explicitly sized buffers and reports failure through the
//! sentinel values listed in [`sentinel`]. Asynchronous notifications reach the
//! session layer through [`Hook`]s: a plain function pointer plus an opaque
//! [`ContextToken`] the engine hands back untouched.
//!
//! [`loopback`] provides an in-process engine where every node lives on a
//! shared [`loopback::LoopbackNetwork`].

#![warn(missing_docs)]

pub mod engine;
pub mod hooks;
pub mod loopback;
pub mod sentinel;

pub use engine::{Engine, EngineOptions};
pub use hooks::{ContextToken, DispatchError, Hook, NotificationKind, RawNotification, Trampoline};
