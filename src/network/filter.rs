//! Boundary filter applied to every captured frame.
//!
//! Admits IPv4 frames addressed to our MAC, except traffic from or to our
//! own IP and anything on port 53. Port 53 belongs to the DNS spoofing
//! responder, and our own traffic must never loop back into the engine.

use std::net::Ipv4Addr;

use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::util::MacAddr;

use super::address::BROADCAST_MAC;

/// DNS port, owned by the spoofing responder.
pub const DNS_PORT: u16 = 53;

/// Compiled capture-time predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryFilter {
    local_mac: MacAddr,
    local_ip: Ipv4Addr,
    expression: String,
}

impl BoundaryFilter {
    /// Compile the filter for the given local addresses.
    ///
    /// Fails when the addresses cannot identify a single host: a zero or
    /// broadcast MAC, or an unspecified or broadcast IP.
    pub fn compile(local_mac: MacAddr, local_ip: Ipv4Addr) -> Result<Self, String> {
        if local_mac == MacAddr::zero() || local_mac == BROADCAST_MAC {
            return Err(format!("local MAC {local_mac} does not identify a host"));
        }
        if local_ip.is_unspecified() || local_ip.is_broadcast() {
            return Err(format!("local IP {local_ip} does not identify a host"));
        }

        let expression = format!(
            "ip && ether dst {local_mac} && not src host {local_ip} && not dst host {local_ip} && not port {DNS_PORT}"
        );

        Ok(Self {
            local_mac,
            local_ip,
            expression,
        })
    }

    /// The filter in pcap expression syntax, for logging.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether a frame passes the filter.
    pub fn admits(&self, frame: &[u8]) -> bool {
        let Some(ethernet) = EthernetPacket::new(frame) else {
            return false;
        };
        if ethernet.get_ethertype() != EtherTypes::Ipv4
            || ethernet.get_destination() != self.local_mac
        {
            return false;
        }

        let Some(ipv4) = Ipv4Packet::new(ethernet.payload()) else {
            return false;
        };
        if ipv4.get_source() == self.local_ip || ipv4.get_destination() == self.local_ip {
            return false;
        }

        !touches_dns_port(&ipv4)
    }
}

/// Only the first fragment carries the transport header.
fn touches_dns_port(ipv4: &Ipv4Packet<'_>) -> bool {
    if ipv4.get_fragment_offset() != 0 {
        return false;
    }

    let protocol = ipv4.get_next_level_protocol();
    let ports = if protocol == IpNextHeaderProtocols::Tcp {
        TcpPacket::new(ipv4.payload()).map(|tcp| (tcp.get_source(), tcp.get_destination()))
    } else if protocol == IpNextHeaderProtocols::Udp {
        UdpPacket::new(ipv4.payload()).map(|udp| (udp.get_source(), udp.get_destination()))
    } else {
        None
    };

    ports.is_some_and(|(src, dst)| src == DNS_PORT || dst == DNS_PORT)
}
