//! Link-layer and network-layer address pairs.

use std::fmt;
use std::net::Ipv4Addr;

use pnet::util::MacAddr;

use crate::error::ConfigError;

/// Broadcast MAC address.
pub const BROADCAST_MAC: MacAddr = MacAddr(0xff, 0xff, 0xff, 0xff, 0xff, 0xff);

/// A host's MAC and IPv4 address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkAddress {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
}

impl NetworkAddress {
    pub const fn new(mac: MacAddr, ip: Ipv4Addr) -> Self {
        Self { mac, ip }
    }

    /// Dotted-quad form of the IP address.
    pub fn ip_string(&self) -> String {
        self.ip.to_string()
    }

    /// Colon-separated hex form of the MAC address.
    pub fn mac_string(&self) -> String {
        self.mac.to_string()
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.ip, self.mac)
    }
}

/// Parse a MAC address written with `:` or `-` separators.
///
/// Only the shape is checked: six groups of one or two hex digits.
pub fn parse_mac(input: &str) -> Result<MacAddr, ConfigError> {
    let invalid = || ConfigError::InvalidMac(input.to_string());

    let mut octets = [0u8; 6];
    let mut groups = input.trim().split([':', '-']);
    for octet in &mut octets {
        let group = groups.next().ok_or_else(invalid)?;
        if group.is_empty() || group.len() > 2 {
            return Err(invalid());
        }
        *octet = u8::from_str_radix(group, 16).map_err(|_| invalid())?;
    }
    if groups.next().is_some() {
        return Err(invalid());
    }

    let [a, b, c, d, e, f] = octets;
    Ok(MacAddr::new(a, b, c, d, e, f))
}
