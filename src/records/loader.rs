//! File-based record loader.
//!
//! Record files are read once at startup, before the forwarding thread
//! exists, so plain blocking I/O is used.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{DnsHostsParser, FirewallRulesParser, ParseError, RecordParser, TargetHostsParser};
use crate::registry::{DnsSpoofRegistry, FirewallRuleRegistry, TargetSystemRegistry};

/// Error type for record file loading operations.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// File was not found at the specified path.
    #[error("file not found: {0:?}")]
    NotFound(PathBuf),

    /// Permission denied when accessing the file.
    #[error("permission denied: {0:?}")]
    PermissionDenied(PathBuf),

    /// I/O error while reading the file.
    #[error("I/O error reading {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing the file content.
    #[error("cannot parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

/// Parse every record of `path` with `parser`.
///
/// # Errors
///
/// Returns a [`LoadError`] if:
/// - The file does not exist ([`LoadError::NotFound`])
/// - Permission is denied ([`LoadError::PermissionDenied`])
/// - An I/O error occurs ([`LoadError::Io`])
/// - A line cannot be parsed ([`LoadError::Parse`])
pub fn load<P: RecordParser>(path: &Path, parser: &P) -> Result<Vec<P::Record>, LoadError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => LoadError::NotFound(path.to_path_buf()),
        std::io::ErrorKind::PermissionDenied => LoadError::PermissionDenied(path.to_path_buf()),
        _ => LoadError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    parser
        .parse(&mut BufReader::new(file))
        .map_err(|source| match source {
            ParseError::Io(source) => LoadError::Io {
                path: path.to_path_buf(),
                source,
            },
            source => LoadError::Parse {
                path: path.to_path_buf(),
                source,
            },
        })
}

/// Load target hosts into `registry`, returning how many lines were read.
pub fn load_target_hosts(path: &Path, registry: &TargetSystemRegistry) -> Result<usize, LoadError> {
    let records = load(path, &TargetHostsParser)?;
    for record in &records {
        if !registry.insert(record.mac, record.ip) {
            debug!("Replaced existing entry for {}", record.ip);
        }
    }
    info!("Loaded {} target hosts from {}", records.len(), path.display());
    Ok(records.len())
}

/// Load DNS spoofing rules into `registry`.
pub fn load_dns_hosts(path: &Path, registry: &mut DnsSpoofRegistry) -> Result<usize, LoadError> {
    let records = load(path, &DnsHostsParser)?;
    let count = records.len();
    for record in records {
        record.insert_into(registry);
    }
    info!("Loaded {count} DNS spoofing rules from {}", path.display());
    Ok(count)
}

/// Load firewall block rules into `registry`.
pub fn load_firewall_rules(
    path: &Path,
    registry: &mut FirewallRuleRegistry,
) -> Result<usize, LoadError> {
    let rules = load(path, &FirewallRulesParser)?;
    let count = rules.len();
    for rule in rules {
        registry.insert(
            rule.protocol,
            rule.src_ip,
            rule.dst_ip,
            rule.src_port,
            rule.dst_port,
        );
    }
    info!("Loaded {count} firewall rules from {}", path.display());
    Ok(count)
}
