//! CLI configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use toxwire::SessionConfig;

/// CLI configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Where profiles are kept
    pub data_dir: PathBuf,
    /// Profile file name inside `data_dir`
    pub profile: String,
    /// Seconds the echo demo may run before giving up
    pub echo_timeout_secs: u64,
    /// Session settings
    pub session: SessionConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("toxwire");

        Self {
            data_dir,
            profile: "profile.tox".to_string(),
            echo_timeout_secs: 10,
            session: SessionConfig::default(),
        }
    }
}

impl CliConfig {
    /// Default location of the config file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("toxwire")
            .join("config.toml")
    }

    /// Load config from file or create default
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            let config = Self::default();
            config.save(path)?;
            config
        };
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.profile.is_empty() {
            return Err("profile must not be empty".to_string());
        }
        if self.echo_timeout_secs == 0 {
            return Err("echo_timeout_secs must be greater than 0".to_string());
        }
        self.session.validate()
    }

    /// Full path of the profile blob
    pub fn profile_path(&self) -> PathBuf {
        self.data_dir.join(&self.profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trips_through_toml() {
        let config = CliConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: CliConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.profile, config.profile);
        assert_eq!(back.session.tick.interval_ms, 50);
        assert!(back.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: CliConfig = toml::from_str("profile = \"alt.tox\"\n").unwrap();
        assert_eq!(config.profile, "alt.tox");
        assert_eq!(config.echo_timeout_secs, 10);
        assert!(config.profile_path().ends_with("alt.tox"));
    }

    #[test]
    fn test_invalid_timeout() {
        let config = CliConfig {
            echo_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
