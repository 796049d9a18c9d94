//! Application configuration loaded from `config.toml`.
//!
//! Every section is optional; a missing file yields the defaults below.
//!
//! ```toml
//! [tunnel]
//! name = "tunblock0"
//! address = "10.8.0.1"
//! netmask = "255.255.255.0"
//! mtu = 1500
//! # fd = 42    # use a descriptor handed over by the platform instead
//!
//! [filter]
//! poll_interval_ms = 1000
//!
//! [store]
//! path = "/var/lib/tunblock/blocklist.json"
//! ```

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;
use crate::error::ConfigError;

/// TUN interface settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Interface name requested from the kernel.
    pub name: String,
    /// Local address assigned to the interface.
    pub address: Ipv4Addr,
    /// Netmask for `address`.
    pub netmask: Ipv4Addr,
    /// Interface MTU.
    pub mtu: u16,
    /// Already-open TUN descriptor supplied by the platform (e.g. Android's
    /// `VpnService`). When set, no device is created or configured.
    pub fd: Option<i32>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            name: constants::DEFAULT_TUN_NAME.to_string(),
            address: Ipv4Addr::new(10, 8, 0, 1),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            mtu: constants::DEFAULT_MTU,
            fd: None,
        }
    }
}

impl TunnelConfig {
    /// CIDR prefix length of `netmask`.
    #[must_use]
    pub fn prefix_len(&self) -> u32 {
        u32::from(self.netmask).count_ones()
    }
}

/// Packet-filter engine settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// How long one poll of the tunnel may wait before re-checking for stop.
    pub poll_interval_ms: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: constants::DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl FilterConfig {
    /// Poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Blocklist persistence settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Location of the blocklist document. Defaults to the per-user data dir.
    pub path: Option<PathBuf>,
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `[tunnel]` section.
    pub tunnel: TunnelConfig,
    /// `[filter]` section.
    pub filter: FilterConfig,
    /// `[store]` section.
    pub store: StoreConfig,
}

impl AppConfig {
    /// Loads configuration from `path`, or from the default location when `None`.
    ///
    /// A missing file is not an error and yields [`AppConfig::default`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.is_file() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        Self::parse(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the TOML error if `content` does not describe an [`AppConfig`].
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// `<config_dir>/tunblock`, e.g. `~/.config/tunblock` on Linux.
#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(constants::APP_NAME))
}

/// `<config_dir>/tunblock/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(constants::CONFIG_FILE_NAME))
}

/// `<data_dir>/tunblock/blocklist.json`.
#[must_use]
pub fn default_store_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(constants::APP_NAME).join(constants::STORE_FILE_NAME))
}
