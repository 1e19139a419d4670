//! Redwire - a transparent IPv4 forwarding engine for poisoned LANs.
//!
//! Once the gateway and the target systems have been convinced that our MAC
//! owns each other's IP, all of their traffic reaches this host. Redwire
//! captures those frames, drops the ones matched by a firewall rule and sends
//! the rest on to their real next hop, so the victims keep working while
//! every flow is logged.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`]: Configuration loading and validation
//! - [`network`]: Frame parsing, boundary filter, capture I/O and forwarding
//! - [`registry`]: Target systems, DNS spoofing rules and firewall rules
//! - [`records`]: Record file parsers feeding the registries
//! - [`engine`]: The forwarding thread and its state machine
//! - [`lifecycle`]: Signal handling, supervision and handle closing
//! - [`error`]: Error types
//!
//! # Testing
//!
//! Capture and injection sit behind traits, so the whole pipeline can be
//! exercised without network access:
//!
//! ```rust
//! use redwire::network::{Protocol, ParsedPacket};
//! use redwire::registry::FirewallRuleRegistry;
//! use std::net::Ipv4Addr;
//!
//! let mut firewall = FirewallRuleRegistry::new();
//! firewall.insert(Some(Protocol::Udp), None, None, None, Some(53));
//! assert!(firewall
//!     .find_match(Protocol::Udp, Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST, Some(1), Some(53))
//!     .is_some());
//! assert!(ParsedPacket::parse(&[]).is_err());
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod network;
pub mod records;
pub mod registry;

pub use config::Config;
pub use error::{Error, Result};
