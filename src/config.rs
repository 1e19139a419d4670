//! Configuration loading and validation.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use pnet::util::MacAddr;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::network::parse_mac;

/// Main configuration for the redwire router.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Network interface to forward on. If None, auto-detect.
    pub interface: Option<String>,

    /// Gateway IP address. If None, read from the routing table.
    pub gateway_ip: Option<Ipv4Addr>,

    /// Gateway MAC address. If None, read from the neighbour table.
    #[serde(default, deserialize_with = "deserialize_mac")]
    pub gateway_mac: Option<MacAddr>,

    /// Poisoning targets, one `mac,ip` per line.
    #[serde(default = "default_target_hosts_file")]
    pub target_hosts_file: PathBuf,

    /// DNS spoofing rules; optional.
    pub dns_hosts_file: Option<PathBuf>,

    /// Firewall block rules; optional.
    pub firewall_rules_file: Option<PathBuf>,

    /// How long one receive call may block, in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Transmission attempts per reinjected frame.
    #[serde(default = "default_max_inject_retries")]
    pub max_inject_retries: u32,

    /// Interval between engine liveness checks, in milliseconds.
    #[serde(default = "default_supervisor_poll_ms")]
    pub supervisor_poll_ms: u64,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Expose `/metrics` over HTTP.
    #[serde(default)]
    pub enabled: bool,

    /// Listen address of the exporter.
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

fn default_target_hosts_file() -> PathBuf {
    PathBuf::from("hosts.txt")
}

const fn default_read_timeout_ms() -> u64 {
    100
}

const fn default_max_inject_retries() -> u32 {
    4
}

const fn default_supervisor_poll_ms() -> u64 {
    30
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9100))
}

fn deserialize_mac<'de, D>(deserializer: D) -> std::result::Result<Option<MacAddr>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|s| parse_mac(&s).map_err(serde::de::Error::custom))
        .transpose()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub const fn supervisor_poll(&self) -> Duration {
        Duration::from_millis(self.supervisor_poll_ms)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Validation("read_timeout_ms must be > 0".into()).into());
        }

        if self.max_inject_retries == 0 {
            return Err(ConfigError::Validation("max_inject_retries must be > 0".into()).into());
        }

        if self.supervisor_poll_ms == 0 {
            return Err(ConfigError::Validation("supervisor_poll_ms must be > 0".into()).into());
        }

        if self.target_hosts_file.as_os_str().is_empty() {
            return Err(
                ConfigError::Validation("target_hosts_file must not be empty".into()).into(),
            );
        }

        if let Some(ip) = self.gateway_ip
            && (ip.is_unspecified() || ip.is_broadcast())
        {
            return Err(ConfigError::Validation(format!("invalid gateway_ip: {ip}")).into());
        }

        Ok(())
    }
}
