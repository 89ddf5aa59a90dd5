//! Session configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use toxwire_core::{
    ClientId, UserStatus, MAX_NAME_LENGTH, MAX_STATUS_MESSAGE_LENGTH,
};
use toxwire_engine::{Engine, EngineOptions};

use crate::error::{Error, Result};
use crate::session::Session;

/// Everything needed to bring a session up
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Engine options
    pub engine: EngineOptions,
    /// Profile applied after initialization
    pub profile: ProfileConfig,
    /// Nodes to bootstrap from
    pub bootstrap_nodes: Vec<BootstrapNode>,
    /// Tick interval
    pub tick: TickConfig,
}

/// Profile fields
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Display name
    pub name: Option<String>,
    /// Status message
    pub status_message: Option<String>,
    /// User status
    pub user_status: UserStatus,
}

/// A well-known node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapNode {
    /// Host name or IP address
    pub address: String,
    /// UDP port
    pub port: u16,
    /// The node's public key in hex
    pub public_key: String,
}

/// How often a driver should tick the session
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Interval between ticks (milliseconds)
    pub interval_ms: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self { interval_ms: 50 }
    }
}

impl TickConfig {
    /// Interval as a duration
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl SessionConfig {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(name) = &self.profile.name {
            if name.is_empty() {
                return Err("profile.name must not be empty".to_string());
            }
            if name.len() > MAX_NAME_LENGTH {
                return Err(format!("profile.name exceeds {} bytes", MAX_NAME_LENGTH));
            }
        }
        if let Some(status) = &self.profile.status_message {
            if status.len() > MAX_STATUS_MESSAGE_LENGTH {
                return Err(format!(
                    "profile.status_message exceeds {} bytes",
                    MAX_STATUS_MESSAGE_LENGTH
                ));
            }
        }
        if self.profile.user_status == UserStatus::Invalid {
            return Err("profile.user_status must be none, away or busy".to_string());
        }
        for node in &self.bootstrap_nodes {
            if node.address.is_empty() {
                return Err("bootstrap node address must not be empty".to_string());
            }
            if node.port == 0 {
                return Err(format!("bootstrap node {} has port 0", node.address));
            }
            if let Err(e) = ClientId::from_hex(&node.public_key) {
                return Err(format!("bootstrap node {}: {}", node.address, e));
            }
        }
        if self.tick.interval_ms == 0 {
            return Err("tick.interval_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Session {
    /// Initialize a session, apply the configured profile and bootstrap from
    /// every configured node
    pub fn from_config<E, F>(config: &SessionConfig, create: F) -> Result<Self>
    where
        E: Engine + 'static,
        F: FnOnce(&EngineOptions) -> Option<E>,
    {
        config.validate().map_err(Error::Config)?;

        let session = Session::init(&config.engine, create)?;
        if let Some(name) = &config.profile.name {
            session.set_name(name.as_bytes())?;
        }
        if let Some(status) = &config.profile.status_message {
            session.set_status_message(status.as_bytes())?;
        }
        session.set_user_status(config.profile.user_status)?;

        for node in &config.bootstrap_nodes {
            if let Err(e) = session.bootstrap_from_address(&node.address, node.port, &node.public_key) {
                warn!("Skipping bootstrap node {}:{}: {}", node.address, node.port, e);
            }
        }
        info!(
            nodes = config.bootstrap_nodes.len(),
            "Session configured"
        );
        Ok(session)
    }
}
