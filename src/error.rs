//! Error types for the redwire forwarding engine.

use std::io;

use thiserror::Error;

/// Main error type for redwire operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("malformed frame: {0}")]
    Packet(#[from] PacketError),

    #[error("engine startup failed: {0}")]
    Startup(#[from] StartupError),

    #[error("record file error: {0}")]
    Records(#[from] crate::records::LoadError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("metrics error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("invalid MAC address: {0:?}")]
    InvalidMac(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Network-related errors.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("no suitable network interface found")]
    NoInterface,

    #[error("failed to open datalink channel: {0}")]
    ChannelOpen(String),

    #[error("unsupported channel type")]
    UnsupportedChannel,

    #[error("failed to receive frame: {0}")]
    Receive(String),

    #[error("failed to send packet: {0}")]
    SendFailed(String),

    #[error("capture handle already closed")]
    Closed,

    #[error("failed to resolve gateway: {0}")]
    Gateway(String),
}

/// A captured frame that cannot be interpreted as Ethernet + IPv4.
///
/// Always recoverable: the engine drops the frame and keeps listening.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("empty frame")]
    Empty,

    #[error("frame of {len} bytes is shorter than an Ethernet header")]
    TruncatedEthernet { len: usize },

    #[error("ethertype {ethertype:#06x} is not IPv4")]
    NotIpv4 { ethertype: u16 },

    #[error("IPv4 header length {ihl} is outside 5..=15")]
    InvalidHeaderLength { ihl: u8 },

    #[error("IPv4 header needs {needed} bytes but only {available} captured")]
    TruncatedIpv4 { needed: usize, available: usize },

    #[error("{protocol} header needs {needed} bytes but only {available} captured")]
    TruncatedTransport {
        protocol: &'static str,
        needed: usize,
        available: usize,
    },
}

/// Fatal errors raised before the engine enters its listening loop.
///
/// Each variant carries a distinct numeric code so operators can tell
/// the failing step apart in logs and exit statuses.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("unable to open capture source on {interface:?}: {source}")]
    Open {
        interface: String,
        #[source]
        source: NetworkError,
    },

    #[error("unable to compile boundary filter: {0}")]
    FilterCompile(String),

    #[error("unable to install boundary filter {expression:?}: {source}")]
    FilterInstall {
        expression: String,
        #[source]
        source: NetworkError,
    },

    #[error("unable to start forwarding thread: {0}")]
    Spawn(#[source] io::Error),
}

impl StartupError {
    /// Numeric code reported alongside the error.
    pub const fn code(&self) -> i32 {
        match self {
            Self::Open { .. } => 5,
            Self::FilterCompile(_) => 6,
            Self::FilterInstall { .. } => 7,
            Self::Spawn(_) => 8,
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
