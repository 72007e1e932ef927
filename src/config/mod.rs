//! Configuration module
//!
//! Handles the optional mcom configuration file. All values have working
//! defaults; the file only overrides them, and command-line flags win
//! over the file.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::protocol::{DEFAULT_PORT, MCAST_TTL};
use crate::transport::{McastConfig, RecvErrorPolicy};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Network settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Listen-mode settings
    #[serde(default)]
    pub listen: ListenConfig,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// UDP port for multicast traffic
    #[serde(default = "default_port")]
    pub port: u16,

    /// Multicast TTL (1 = local network segment only)
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Deliver our own datagrams back to this host
    #[serde(default = "default_true")]
    pub loopback: bool,

    /// Outbound interface override (resolved via hostname when unset)
    pub interface: Option<Ipv4Addr>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_ttl() -> u32 {
    MCAST_TTL
}

fn default_true() -> bool {
    true
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            ttl: default_ttl(),
            loopback: default_true(),
            interface: None,
        }
    }
}

/// Listen-mode configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListenConfig {
    /// What a receive or decode error does to the watch loop
    #[serde(default)]
    pub on_error: RecvErrorPolicy,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations, falling back to
    /// defaults when no file exists
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("mcom/config.toml")),
            Some(PathBuf::from("./mcom.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// The multicast settings this configuration describes
    pub fn mcast_config(&self) -> McastConfig {
        McastConfig {
            ttl: self.network.ttl,
            loopback: self.network.loopback,
            interface: self.network.interface,
            on_recv_error: self.listen.on_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.port, DEFAULT_PORT);
        assert_eq!(config.network.ttl, MCAST_TTL);
        assert!(config.network.loopback);
        assert_eq!(config.listen.on_error, RecvErrorPolicy::Fatal);
    }

    #[test]
    fn test_save_and_load() {
        let config = Config {
            network: NetworkConfig {
                port: 24000,
                interface: Some(Ipv4Addr::new(192, 168, 1, 10)),
                ..Default::default()
            },
            ..Default::default()
        };
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.network.port, 24000);
        assert_eq!(
            loaded.network.interface,
            Some(Ipv4Addr::new(192, 168, 1, 10))
        );
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[listen]\non_error = \"skip-and-log\"\n").unwrap();
        assert_eq!(config.listen.on_error, RecvErrorPolicy::SkipAndLog);
        assert_eq!(config.network.port, DEFAULT_PORT);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = Config::load(Path::new("/nonexistent/mcom.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_mcast_config_reflects_file() {
        let config: Config = toml::from_str(
            "[network]\nttl = 4\nloopback = false\n[listen]\non_error = \"skip-and-log\"\n",
        )
        .unwrap();
        let mcast = config.mcast_config();
        assert_eq!(mcast.ttl, 4);
        assert!(!mcast.loopback);
        assert_eq!(mcast.on_recv_error, RecvErrorPolicy::SkipAndLog);
    }
}
