//! Local interface and gateway discovery.

use std::net::Ipv4Addr;

use pnet::datalink::NetworkInterface;
use pnet::util::MacAddr;

use super::address::{NetworkAddress, parse_mac};
use crate::error::{NetworkError, Result};

/// Extract our IP and MAC from a network interface.
pub fn get_interface_info(interface: &NetworkInterface) -> Result<NetworkAddress> {
    let mac = interface.mac.ok_or(NetworkError::NoInterface)?;

    let ip = interface
        .ips
        .iter()
        .find_map(|ip| match ip.ip() {
            std::net::IpAddr::V4(v4) => Some(v4),
            std::net::IpAddr::V6(_) => None,
        })
        .ok_or(NetworkError::NoInterface)?;

    Ok(NetworkAddress::new(mac, ip))
}

/// Detect the default gateway IP address.
///
/// This reads the system routing table to find the default gateway.
#[cfg(target_os = "linux")]
pub fn detect_gateway() -> Result<Ipv4Addr> {
    let route = std::fs::read_to_string("/proc/net/route")
        .map_err(|e| NetworkError::Gateway(format!("failed to read routing table: {e}")))?;

    parse_proc_route(&route)
        .ok_or_else(|| NetworkError::Gateway("no default gateway found".into()).into())
}

/// Detect the default gateway IP address (macOS version).
#[cfg(target_os = "macos")]
pub fn detect_gateway() -> Result<Ipv4Addr> {
    use std::process::Command;

    let output = Command::new("netstat")
        .args(["-rn", "-f", "inet"])
        .output()
        .map_err(|e| NetworkError::Gateway(format!("failed to run netstat: {e}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout);

    for line in stdout.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 2 && fields[0] == "default" {
            let gateway: Ipv4Addr = fields[1]
                .parse()
                .map_err(|e| NetworkError::Gateway(format!("invalid gateway IP: {e}")))?;
            return Ok(gateway);
        }
    }

    Err(NetworkError::Gateway("no default gateway found".into()).into())
}

/// Look up a neighbour's MAC address in the kernel ARP cache.
#[cfg(target_os = "linux")]
pub fn resolve_neighbour_mac(ip: Ipv4Addr) -> Result<MacAddr> {
    let table = std::fs::read_to_string("/proc/net/arp")
        .map_err(|e| NetworkError::Gateway(format!("failed to read ARP cache: {e}")))?;

    parse_proc_arp(&table, ip)
        .ok_or_else(|| NetworkError::Gateway(format!("no ARP cache entry for {ip}")).into())
}

/// Look up a neighbour's MAC address in the kernel ARP cache (macOS version).
#[cfg(target_os = "macos")]
pub fn resolve_neighbour_mac(ip: Ipv4Addr) -> Result<MacAddr> {
    use std::process::Command;

    let output = Command::new("arp")
        .args(["-n", &ip.to_string()])
        .output()
        .map_err(|e| NetworkError::Gateway(format!("failed to run arp: {e}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout);

    // "? (192.168.1.1) at 0:11:22:33:44:55 on en0 ifscope [ethernet]"
    stdout
        .split_whitespace()
        .skip_while(|field| *field != "at")
        .nth(1)
        .and_then(|mac| parse_mac(mac).ok())
        .ok_or_else(|| NetworkError::Gateway(format!("no ARP cache entry for {ip}")).into())
}

/// Default route from `/proc/net/route` contents.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_proc_route(route: &str) -> Option<Ipv4Addr> {
    for line in route.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 3 && fields[1] == "00000000" {
            // Gateway is in hex, little-endian
            let gw = u32::from_str_radix(fields[2], 16).ok()?;
            return Some(Ipv4Addr::from(gw.to_be()));
        }
    }
    None
}

/// MAC for `ip` from `/proc/net/arp` contents, skipping incomplete entries.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_proc_arp(table: &str, ip: Ipv4Addr) -> Option<MacAddr> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[0].parse::<Ipv4Addr>().ok()? != ip {
            return None;
        }
        parse_mac(fields[3])
            .ok()
            .filter(|mac| *mac != MacAddr::zero())
    })
}
