//! Server configuration: loaded from a YAML file, falling back to defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::models::mask::Mask;

/// The example configuration shipped with the server. Its values are the defaults.
pub const EXAMPLE_CONFIG: &str = include_str!("../config/config-example.yml");

/// Errors raised while locating or parsing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Supplied config file ({}) doesn't seem to exist", .0.display())]
    Missing(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("This is an invalid configuration file!")]
    NotAMapping,

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid mask regex {pattern:?}: {source}")]
    InvalidMask {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Passed with `--config`.
    Explicit(PathBuf),
    /// First existing file among the default locations.
    Discovered(PathBuf),
    /// No file found; built-in defaults are in use.
    Defaults { searched: Vec<PathBuf> },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where build notifications arrive as UDP datagrams.
    #[serde(deserialize_with = "udp_listen")]
    pub udp_server: ListenConfig,
    /// Optional HTTP transport; `None` disables it.
    #[serde(alias = "tcp_server", deserialize_with = "http_listen")]
    pub http_server: Option<ListenConfig>,
    /// The indicator device.
    pub tcp_client: TcpClientConfig,
    /// Which builds are tracked.
    pub mask: MaskConfig,
    /// Where last-known statuses are persisted.
    pub store: StoreConfig,
    /// Prometheus scrape endpoint.
    pub metrics: MetricsConfig,
    /// Emit per-event diagnostics.
    pub verbose: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ListenConfig {
    pub address: String,
    pub port: u16,
}

impl ListenConfig {
    fn loopback(port: u16) -> Self {
        Self {
            address: default_address(),
            port,
        }
    }
}

const DEFAULT_UDP_PORT: u16 = 1234;
const DEFAULT_HTTP_PORT: u16 = 2222;

/// A listener section as written. Omitted fields take the section's defaults.
#[derive(Deserialize)]
struct ListenSection {
    address: Option<String>,
    port: Option<u16>,
}

impl ListenSection {
    fn with_default_port(self, port: u16) -> ListenConfig {
        ListenConfig {
            address: self.address.unwrap_or_else(default_address),
            port: self.port.unwrap_or(port),
        }
    }
}

fn udp_listen<'de, D>(deserializer: D) -> Result<ListenConfig, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(ListenSection::deserialize(deserializer)?.with_default_port(DEFAULT_UDP_PORT))
}

fn http_listen<'de, D>(deserializer: D) -> Result<Option<ListenConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let section = Option::<ListenSection>::deserialize(deserializer)?;
    Ok(section.map(|s| s.with_default_port(DEFAULT_HTTP_PORT)))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpClientConfig {
    pub host: String,
    pub port: u16,
    /// Request path sent when every build passes.
    pub pass: String,
    /// Request path sent when any build fails.
    pub fail: String,
    /// Extra attempts after the first one.
    pub attempts: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    pub regex: Option<String>,
    pub policy: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub filename: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub address: Option<SocketAddr>,
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            udp_server: ListenConfig::loopback(DEFAULT_UDP_PORT),
            http_server: Some(ListenConfig::loopback(DEFAULT_HTTP_PORT)),
            tcp_client: TcpClientConfig::default(),
            mask: MaskConfig::default(),
            store: StoreConfig::default(),
            metrics: MetricsConfig::default(),
            verbose: false,
        }
    }
}

impl Default for TcpClientConfig {
    fn default() -> Self {
        Self {
            host: default_address(),
            port: 4567,
            pass: "/pass".to_string(),
            fail: "/fail".to_string(),
            attempts: 2,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            filename: "/tmp/build_result.yml".to_string(),
        }
    }
}

impl Config {
    /// Load the configuration, either from `explicit` or from the first
    /// existing default location.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, ConfigSource), ConfigError> {
        Self::load_from(explicit, &default_locations())
    }

    /// Like [`Config::load`], searching `locations` instead of the defaults.
    pub fn load_from(
        explicit: Option<&Path>,
        locations: &[PathBuf],
    ) -> Result<(Self, ConfigSource), ConfigError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::Missing(path.to_path_buf()));
            }
            let config = Self::from_file(path)?;
            return Ok((config, ConfigSource::Explicit(path.to_path_buf())));
        }

        match locations.iter().find(|p| p.exists()) {
            Some(path) => {
                let config = Self::from_file(path)?;
                Ok((config, ConfigSource::Discovered(path.clone())))
            }
            None => Ok((
                Self::default(),
                ConfigSource::Defaults {
                    searched: locations.to_vec(),
                },
            )),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse a YAML document. The top level must be a mapping; missing keys
    /// take their default values and unknown keys are ignored.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let value: serde_yaml::Value = serde_yaml::from_str(contents)?;
        if !value.is_mapping() {
            return Err(ConfigError::NotAMapping);
        }
        let config: Self = serde_yaml::from_value(value)?;
        config.build_mask()?;
        Ok(config)
    }

    /// Compile the configured mask.
    pub fn build_mask(&self) -> Result<Mask, ConfigError> {
        Mask::from_config(&self.mask).map_err(|source| ConfigError::InvalidMask {
            pattern: self.mask.regex.clone().unwrap_or_default(),
            source,
        })
    }

    /// Store file path, with a leading `~/` expanded to the home directory.
    pub fn store_path(&self) -> PathBuf {
        expand_home(&self.store.filename)
    }
}

/// Locations searched when no `--config` is given, in order.
pub fn default_locations() -> Vec<PathBuf> {
    [
        "~/.config/build_status_server/config.yml",
        "/etc/build_status_server/config.yml",
        "/usr/local/etc/build_status_server/config.yml",
    ]
    .iter()
    .map(|p| expand_home(p))
    .collect()
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
