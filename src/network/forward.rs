//! Traffic classification and reinjection.
//!
//! Victims believe we are the gateway and the gateway believes we are the
//! victims, so every transit frame lands on our MAC. Each one is checked
//! against the firewall rules, then rewritten at the link layer toward its
//! real next hop and sent back out on the same interface.

use std::fmt;
use std::sync::Arc;

use pnet::packet::ethernet::MutableEthernetPacket;
use pnet::util::MacAddr;
use tracing::{error, info, warn};

use super::address::NetworkAddress;
use super::capture::PacketSender;
use super::packet::ParsedPacket;
use crate::error::{NetworkError, PacketError, Result};
use crate::metrics;
use crate::registry::{FirewallRuleRegistry, TargetSystemRegistry};

/// Number of transmission attempts for one reinjected frame.
pub const MAX_INJECT_RETRIES: u32 = 4;

/// Direction label attached to each forwarding decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Dropped by a firewall rule.
    Block,
    /// Addressed to the gateway itself.
    Gateway,
    /// Addressed to a known target system.
    Inbound,
    /// Anything else, routed through the gateway.
    Outbound,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Block => "BLOCK",
            Self::Gateway => "GW",
            Self::Inbound => "IN",
            Self::Outbound => "OUT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a captured packet should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardTarget {
    Blocked,
    Gateway(MacAddr),
    Client(MacAddr),
    Internet(MacAddr),
}

impl ForwardTarget {
    pub const fn direction(self) -> Direction {
        match self {
            Self::Blocked => Direction::Block,
            Self::Gateway(_) => Direction::Gateway,
            Self::Client(_) => Direction::Inbound,
            Self::Internet(_) => Direction::Outbound,
        }
    }

    /// MAC the frame is rewritten to, `None` when it is dropped.
    pub const fn next_hop(self) -> Option<MacAddr> {
        match self {
            Self::Blocked => None,
            Self::Gateway(mac) | Self::Client(mac) | Self::Internet(mac) => Some(mac),
        }
    }
}

/// Classification state: our addresses and the tables consulted per packet.
#[derive(Debug, Clone)]
pub struct Router {
    local: NetworkAddress,
    gateway: NetworkAddress,
    systems: TargetSystemRegistry,
    firewall: Arc<FirewallRuleRegistry>,
}

impl Router {
    pub const fn new(
        local: NetworkAddress,
        gateway: NetworkAddress,
        systems: TargetSystemRegistry,
        firewall: Arc<FirewallRuleRegistry>,
    ) -> Self {
        Self {
            local,
            gateway,
            systems,
            firewall,
        }
    }

    pub const fn local(&self) -> NetworkAddress {
        self.local
    }

    pub const fn gateway(&self) -> NetworkAddress {
        self.gateway
    }

    /// Decide where a packet goes.
    ///
    /// Precedence: firewall block, then the gateway IP, then a known target
    /// system, and finally the internet via the gateway.
    pub fn resolve_forward_target(&self, packet: &ParsedPacket<'_>) -> ForwardTarget {
        let dest_ip = packet.destination_ip();

        if self
            .firewall
            .find_match(
                packet.protocol(),
                packet.source_ip(),
                dest_ip,
                packet.source_port(),
                packet.destination_port(),
            )
            .is_some()
        {
            return ForwardTarget::Blocked;
        }

        if dest_ip == self.gateway.ip {
            return ForwardTarget::Gateway(self.gateway.mac);
        }

        if let Some(client_mac) = self.systems.mac_for(dest_ip) {
            return ForwardTarget::Client(client_mac);
        }

        ForwardTarget::Internet(self.gateway.mac)
    }
}

/// Point a frame at `destination`, coming from `source`.
///
/// Only the Ethernet addresses change; returns `false` when the frame is
/// too short to hold an Ethernet header.
pub fn rewrite_link_layer(frame: &mut [u8], destination: MacAddr, source: MacAddr) -> bool {
    let Some(mut ethernet) = MutableEthernetPacket::new(frame) else {
        return false;
    };
    ethernet.set_destination(destination);
    ethernet.set_source(source);
    true
}

/// Transmit a frame, trying up to `max_retries` times.
///
/// Stops at the first success and returns the number of attempts used.
/// Fails with the last send error once every attempt has failed.
pub fn send_with_retry<S: PacketSender + ?Sized>(
    sender: &mut S,
    max_retries: u32,
    frame: &[u8],
) -> Result<u32> {
    let mut last_error = None;

    for attempt in 1..=max_retries {
        match sender.send(frame) {
            Ok(()) => return Ok(attempt),
            Err(err) => {
                warn!(attempt, "Reinjection attempt failed: {err}");
                last_error = Some(err);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| NetworkError::SendFailed("no transmission attempted".into()).into()))
}

/// Result of dispatching one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub direction: Direction,
    /// Whether the frame went back out on the wire.
    pub injected: bool,
    /// Log line describing the decision.
    pub line: String,
}

/// Classifies, rewrites and reinjects frames.
#[derive(Debug, Clone)]
pub struct Forwarder {
    router: Router,
    max_retries: u32,
}

impl Forwarder {
    pub const fn new(router: Router, max_retries: u32) -> Self {
        Self {
            router,
            max_retries,
        }
    }

    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// Process one frame in place and reinject it through `sender`.
    ///
    /// Malformed frames come back as an error and have no side effect.
    /// A failed reinjection is logged and reported in the result, never
    /// returned as an error.
    pub fn dispatch<S: PacketSender + ?Sized>(
        &self,
        frame: &mut [u8],
        sender: &mut S,
    ) -> std::result::Result<Dispatch, PacketError> {
        let (target, line) = {
            let packet = ParsedPacket::parse(frame)?;
            let target = self.router.resolve_forward_target(&packet);
            (target, packet.log_line(target.direction()))
        };
        let direction = target.direction();

        info!("{line}");
        metrics::record_decision(direction);

        let Some(next_hop) = target.next_hop() else {
            return Ok(Dispatch {
                direction,
                injected: false,
                line,
            });
        };

        rewrite_link_layer(frame, next_hop, self.router.local.mac);

        let injected = match send_with_retry(sender, self.max_retries, frame) {
            Ok(_) => true,
            Err(err) => {
                error!("Unable to send data ({direction}): {err}");
                metrics::record_inject_failure();
                false
            }
        };

        Ok(Dispatch {
            direction,
            injected,
            line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Protocol;
    use crate::network::capture::tests::MockSender;
    use crate::network::packet::tests::build_frame;
    use pnet::packet::ethernet::EthernetPacket;
    use std::net::Ipv4Addr;

    const LOCAL: NetworkAddress = NetworkAddress::new(
        MacAddr(0x02, 0, 0, 0, 0, 0x64),
        Ipv4Addr::new(10, 0, 0, 100),
    );
    const GATEWAY: NetworkAddress = NetworkAddress::new(
        MacAddr(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01),
        Ipv4Addr::new(10, 0, 0, 1),
    );
    const VICTIM: NetworkAddress = NetworkAddress::new(
        MacAddr(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x02),
        Ipv4Addr::new(10, 0, 0, 50),
    );

    fn router(firewall: FirewallRuleRegistry) -> Router {
        let systems = TargetSystemRegistry::new();
        systems.insert(GATEWAY.mac, GATEWAY.ip);
        systems.insert(VICTIM.mac, VICTIM.ip);
        Router::new(LOCAL, GATEWAY, systems, Arc::new(firewall))
    }

    fn classify(router: &Router, frame: &[u8]) -> ForwardTarget {
        router.resolve_forward_target(&ParsedPacket::parse(frame).unwrap())
    }

    #[test]
    fn should_route_by_destination() {
        let router = router(FirewallRuleRegistry::new());
        let internet = Ipv4Addr::new(8, 8, 8, 8);

        let to_gateway = build_frame(6, VICTIM.ip, GATEWAY.ip, 50000, 80);
        assert_eq!(classify(&router, &to_gateway), ForwardTarget::Gateway(GATEWAY.mac));

        let to_victim = build_frame(6, internet, VICTIM.ip, 443, 50000);
        assert_eq!(classify(&router, &to_victim), ForwardTarget::Client(VICTIM.mac));

        let to_internet = build_frame(6, VICTIM.ip, internet, 50000, 443);
        assert_eq!(classify(&router, &to_internet), ForwardTarget::Internet(GATEWAY.mac));
    }

    #[test]
    fn should_block_before_any_routing_decision() {
        let mut firewall = FirewallRuleRegistry::new();
        firewall.insert(None, None, Some(GATEWAY.ip), None, None);
        let router = router(firewall);

        let to_gateway = build_frame(6, VICTIM.ip, GATEWAY.ip, 50000, 80);
        assert_eq!(classify(&router, &to_gateway), ForwardTarget::Blocked);
        assert_eq!(ForwardTarget::Blocked.direction(), Direction::Block);
    }

    #[test]
    fn should_rewrite_only_link_layer_addresses() {
        let original = build_frame(17, VICTIM.ip, Ipv4Addr::new(1, 1, 1, 1), 1000, 2000);
        let mut frame = original.clone();

        assert!(rewrite_link_layer(&mut frame, GATEWAY.mac, LOCAL.mac));

        let eth = EthernetPacket::new(&frame).unwrap();
        assert_eq!(eth.get_destination(), GATEWAY.mac);
        assert_eq!(eth.get_source(), LOCAL.mac);
        assert_eq!(frame[12..], original[12..]);
        assert!(!rewrite_link_layer(&mut [0u8; 6], GATEWAY.mac, LOCAL.mac));
    }

    #[test]
    fn should_stop_retrying_at_first_success() {
        let mut sender = MockSender::failing(3);

        let attempts = send_with_retry(&mut sender, MAX_INJECT_RETRIES, &[1, 2, 3]).unwrap();

        assert_eq!(attempts, 4);
        assert_eq!(sender.attempt_count(), 4);
        assert_eq!(sender.sent_count(), 1);
    }

    #[test]
    fn should_fail_after_all_attempts_fail() {
        let mut sender = MockSender::failing(10);

        assert!(send_with_retry(&mut sender, MAX_INJECT_RETRIES, &[1]).is_err());
        assert_eq!(sender.attempt_count(), 4);
        assert_eq!(sender.sent_count(), 0);
    }

    #[test]
    fn should_send_once_when_first_attempt_succeeds() {
        let mut sender = MockSender::new();

        assert_eq!(send_with_retry(&mut sender, MAX_INJECT_RETRIES, &[1]).unwrap(), 1);
        assert_eq!(sender.attempt_count(), 1);
    }

    #[test]
    fn should_dispatch_and_inject_rewritten_frame() {
        let mut sender = MockSender::new();
        let forwarder = Forwarder::new(router(FirewallRuleRegistry::new()), MAX_INJECT_RETRIES);
        let mut frame = build_frame(6, Ipv4Addr::new(8, 8, 8, 8), VICTIM.ip, 443, 50000);

        let dispatch = forwarder.dispatch(&mut frame, &mut sender).unwrap();

        assert_eq!(dispatch.direction, Direction::Inbound);
        assert!(dispatch.injected);
        assert!(dispatch.line.ends_with("  IN"));
        assert!(dispatch.line.starts_with("TCP "));
        let sent = sender.last_sent().unwrap();
        let eth = EthernetPacket::new(&sent).unwrap();
        assert_eq!(eth.get_destination(), VICTIM.mac);
        assert_eq!(eth.get_source(), LOCAL.mac);
    }

    #[test]
    fn should_report_failed_injection_without_erroring() {
        let mut sender = MockSender::failing(usize::MAX);
        let forwarder = Forwarder::new(router(FirewallRuleRegistry::new()), MAX_INJECT_RETRIES);
        let mut frame = build_frame(1, VICTIM.ip, Ipv4Addr::new(8, 8, 8, 8), 0, 0);

        let dispatch = forwarder.dispatch(&mut frame, &mut sender).unwrap();

        assert_eq!(dispatch.direction, Direction::Outbound);
        assert!(!dispatch.injected);
        assert_eq!(sender.attempt_count(), 4);
    }

    #[test]
    fn should_leave_malformed_frames_untouched() {
        let mut sender = MockSender::new();
        let forwarder = Forwarder::new(router(FirewallRuleRegistry::new()), MAX_INJECT_RETRIES);
        let mut frame = vec![0xffu8; 20];

        assert!(forwarder.dispatch(&mut frame, &mut sender).is_err());
        assert_eq!(frame, vec![0xffu8; 20]);
        assert_eq!(sender.attempt_count(), 0);
    }

    #[test]
    fn should_block_udp_dns_frames_without_injection() {
        let mut firewall = FirewallRuleRegistry::new();
        firewall.insert(Some(Protocol::Udp), None, None, None, Some(53));
        let mut sender = MockSender::new();
        let forwarder = Forwarder::new(router(firewall), MAX_INJECT_RETRIES);
        let mut frame = build_frame(17, VICTIM.ip, GATEWAY.ip, 40000, 53);

        let dispatch = forwarder.dispatch(&mut frame, &mut sender).unwrap();

        assert_eq!(dispatch.direction, Direction::Block);
        assert!(!dispatch.injected);
        assert_eq!(sender.attempt_count(), 0);
    }
}
