//! Firewall block rules.

use std::fmt;
use std::net::Ipv4Addr;

use crate::network::Protocol;

/// A block rule; `None` fields match any value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FirewallRule {
    pub protocol: Option<Protocol>,
    pub src_ip: Option<Ipv4Addr>,
    pub dst_ip: Option<Ipv4Addr>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
}

impl FirewallRule {
    /// Whether every concrete field equals the packet's field.
    ///
    /// A port field never matches a packet without ports.
    pub fn matches(
        &self,
        protocol: Protocol,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        src_port: Option<u16>,
        dst_port: Option<u16>,
    ) -> bool {
        self.protocol.is_none_or(|p| p == protocol)
            && self.src_ip.is_none_or(|ip| ip == src_ip)
            && self.dst_ip.is_none_or(|ip| ip == dst_ip)
            && self.src_port.is_none_or(|port| src_port == Some(port))
            && self.dst_port.is_none_or(|port| dst_port == Some(port))
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn any<T: fmt::Display>(field: Option<T>) -> String {
            field.map_or_else(|| "*".to_string(), |value| value.to_string())
        }

        write!(
            f,
            "{} {}:{} -> {}:{}",
            any(self.protocol),
            any(self.src_ip),
            any(self.src_port),
            any(self.dst_ip),
            any(self.dst_port),
        )
    }
}

/// Ordered collection of block rules.
///
/// Populated before forwarding starts and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct FirewallRuleRegistry {
    rules: Vec<FirewallRule>,
}

impl FirewallRuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        protocol: Option<Protocol>,
        src_ip: Option<Ipv4Addr>,
        dst_ip: Option<Ipv4Addr>,
        src_port: Option<u16>,
        dst_port: Option<u16>,
    ) {
        self.rules.push(FirewallRule {
            protocol,
            src_ip,
            dst_ip,
            src_port,
            dst_port,
        });
    }

    /// First rule, in insertion order, that blocks the given flow.
    pub fn find_match(
        &self,
        protocol: Protocol,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        src_port: Option<u16>,
        dst_port: Option<u16>,
    ) -> Option<&FirewallRule> {
        self.rules
            .iter()
            .find(|rule| rule.matches(protocol, src_ip, dst_ip, src_port, dst_port))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FirewallRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
