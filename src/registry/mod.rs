//! Tables the forwarding engine consults on every packet.

pub mod dns;
pub mod firewall;
pub mod systems;

pub use dns::{DnsRecordType, DnsSpoofRegistry, DnsSpoofRule, wildcard_compare};
pub use firewall::{FirewallRule, FirewallRuleRegistry};
pub use systems::{TargetSystem, TargetSystemRegistry};
