//! Zero-copy header overlays for captured frames.
//!
//! A [`ParsedPacket`] is a chain of pnet views (Ethernet, IPv4 and the
//! transport header) borrowed from the capture buffer. Every header size is
//! checked before a view is built, so a truncated or malformed frame yields a
//! [`PacketError`] instead of an out-of-bounds read.

use std::fmt;
use std::net::Ipv4Addr;

use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::tcp::{TcpFlags, TcpPacket};
use pnet::packet::udp::UdpPacket;

use crate::error::PacketError;

/// Ethernet header size in bytes.
pub const ETHERNET_HEADER_LEN: usize = 14;
/// IPv4 header size in bytes (without options).
pub const MIN_IPV4_HEADER_LEN: usize = 20;
/// TCP header size in bytes (without options).
const TCP_HEADER_LEN: usize = 20;
/// UDP header size in bytes.
const UDP_HEADER_LEN: usize = 8;

const PROTO_ICMP: u8 = 1;
const PROTO_TCP: u8 = 6;
const PROTO_UDP: u8 = 17;

/// Transport protocol carried by an IPv4 packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Unknown,
}

impl Protocol {
    /// Map an IPv4 protocol number.
    pub const fn from_number(number: u8) -> Self {
        match number {
            PROTO_TCP => Self::Tcp,
            PROTO_UDP => Self::Udp,
            PROTO_ICMP => Self::Icmp,
            _ => Self::Unknown,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Icmp => "ICMP",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fixed-width rendering of the TCP flags ACK, SYN, PSH, FIN, RST and URG.
///
/// Each position holds the flag's lowercase letter when set, a space
/// otherwise. Purely descriptive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpFlagString([u8; 6]);

impl TcpFlagString {
    fn from_tcp(tcp: &TcpPacket<'_>) -> Self {
        let flags = tcp.get_flags();
        let pick = |mask, letter| if flags & mask == 0 { b' ' } else { letter };

        Self([
            pick(TcpFlags::ACK, b'a'),
            pick(TcpFlags::SYN, b's'),
            pick(TcpFlags::PSH, b'p'),
            pick(TcpFlags::FIN, b'f'),
            pick(TcpFlags::RST, b'r'),
            pick(TcpFlags::URG, b'u'),
        ])
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for TcpFlagString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.as_str())
    }
}

/// Transport-layer view of a parsed packet.
pub enum Transport<'a> {
    Tcp(TcpPacket<'a>),
    Udp(UdpPacket<'a>),
    Icmp,
    Unknown,
}

/// Overlay views of one captured Ethernet/IPv4 frame.
///
/// Nothing is copied out of the frame; all views share its lifetime.
pub struct ParsedPacket<'a> {
    frame: &'a [u8],
    ethernet: EthernetPacket<'a>,
    ipv4: Ipv4Packet<'a>,
    transport: Transport<'a>,
    protocol: Protocol,
}

impl<'a> ParsedPacket<'a> {
    /// Interpret `frame` as Ethernet → IPv4 → transport.
    pub fn parse(frame: &'a [u8]) -> Result<Self, PacketError> {
        if frame.is_empty() {
            return Err(PacketError::Empty);
        }

        let ethernet = EthernetPacket::new(frame)
            .ok_or(PacketError::TruncatedEthernet { len: frame.len() })?;
        let ethertype = ethernet.get_ethertype();
        if ethertype != EtherTypes::Ipv4 {
            return Err(PacketError::NotIpv4 {
                ethertype: ethertype.0,
            });
        }

        let ip_bytes = &frame[ETHERNET_HEADER_LEN..];
        let ipv4 = Ipv4Packet::new(ip_bytes).ok_or(PacketError::TruncatedIpv4 {
            needed: MIN_IPV4_HEADER_LEN,
            available: ip_bytes.len(),
        })?;

        let ihl = ipv4.get_header_length();
        if !(5..=15).contains(&ihl) {
            return Err(PacketError::InvalidHeaderLength { ihl });
        }
        let ip_header_len = usize::from(ihl) * 4;
        if ip_bytes.len() < ip_header_len {
            return Err(PacketError::TruncatedIpv4 {
                needed: ip_header_len,
                available: ip_bytes.len(),
            });
        }

        let transport_bytes = &ip_bytes[ip_header_len..];
        let protocol = Protocol::from_number(ipv4.get_next_level_protocol().0);
        let transport = match protocol {
            Protocol::Tcp => Transport::Tcp(TcpPacket::new(transport_bytes).ok_or(
                PacketError::TruncatedTransport {
                    protocol: "TCP",
                    needed: TCP_HEADER_LEN,
                    available: transport_bytes.len(),
                },
            )?),
            Protocol::Udp => Transport::Udp(UdpPacket::new(transport_bytes).ok_or(
                PacketError::TruncatedTransport {
                    protocol: "UDP",
                    needed: UDP_HEADER_LEN,
                    available: transport_bytes.len(),
                },
            )?),
            Protocol::Icmp => Transport::Icmp,
            Protocol::Unknown => Transport::Unknown,
        };

        Ok(Self {
            frame,
            ethernet,
            ipv4,
            transport,
            protocol,
        })
    }

    /// The raw frame the views point into.
    pub const fn frame(&self) -> &'a [u8] {
        self.frame
    }

    pub const fn ethernet(&self) -> &EthernetPacket<'a> {
        &self.ethernet
    }

    pub const fn ipv4(&self) -> &Ipv4Packet<'a> {
        &self.ipv4
    }

    pub const fn transport(&self) -> &Transport<'a> {
        &self.transport
    }

    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn source_ip(&self) -> Ipv4Addr {
        self.ipv4.get_source()
    }

    pub fn destination_ip(&self) -> Ipv4Addr {
        self.ipv4.get_destination()
    }

    /// Source port, or `None` for protocols without ports.
    pub fn source_port(&self) -> Option<u16> {
        match &self.transport {
            Transport::Tcp(tcp) => Some(tcp.get_source()),
            Transport::Udp(udp) => Some(udp.get_source()),
            Transport::Icmp | Transport::Unknown => None,
        }
    }

    /// Destination port, or `None` for protocols without ports.
    pub fn destination_port(&self) -> Option<u16> {
        match &self.transport {
            Transport::Tcp(tcp) => Some(tcp.get_destination()),
            Transport::Udp(udp) => Some(udp.get_destination()),
            Transport::Icmp | Transport::Unknown => None,
        }
    }

    /// Transport payload length as advertised by the headers.
    ///
    /// TCP: IPv4 total length minus both header lengths. UDP: the UDP
    /// length field. Zero for everything else.
    pub fn payload_len(&self) -> usize {
        match &self.transport {
            Transport::Tcp(tcp) => {
                let ip_header_len = usize::from(self.ipv4.get_header_length()) * 4;
                let tcp_header_len = usize::from(tcp.get_data_offset()) * 4;
                usize::from(self.ipv4.get_total_length())
                    .saturating_sub(ip_header_len)
                    .saturating_sub(tcp_header_len)
            }
            Transport::Udp(udp) => usize::from(udp.get_length()),
            Transport::Icmp | Transport::Unknown => 0,
        }
    }

    /// TCP flag string, only for TCP packets.
    pub fn tcp_flags(&self) -> Option<TcpFlagString> {
        match &self.transport {
            Transport::Tcp(tcp) => Some(TcpFlagString::from_tcp(tcp)),
            _ => None,
        }
    }

    /// One-line description used when logging a forwarding decision.
    pub fn log_line(&self, direction: impl fmt::Display) -> String {
        let suffix = self
            .tcp_flags()
            .map(|flags| flags.to_string())
            .unwrap_or_default();

        format!(
            "{:<4} {:<15}:{:<5} -> {:<15}:{:<5}  {:>5} bytes  {}  {}",
            self.protocol.label(),
            self.source_ip().to_string(),
            self.source_port().unwrap_or(0),
            self.destination_ip().to_string(),
            self.destination_port().unwrap_or(0),
            self.payload_len(),
            suffix,
            direction,
        )
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use pnet::packet::ethernet::MutableEthernetPacket;
    use pnet::packet::ip::IpNextHeaderProtocol;
    use pnet::packet::ipv4::MutableIpv4Packet;
    use pnet::packet::tcp::MutableTcpPacket;
    use pnet::packet::udp::MutableUdpPacket;
    use pnet::util::MacAddr;

    const PAYLOAD_LEN: usize = 10;

    /// Build an Ethernet/IPv4 frame carrying `protocol` with a 10 byte payload.
    pub fn build_frame(
        protocol: u8,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
    ) -> Vec<u8> {
        let transport_len = match protocol {
            PROTO_TCP => TCP_HEADER_LEN,
            PROTO_UDP => UDP_HEADER_LEN,
            _ => 0,
        };
        let ip_len = MIN_IPV4_HEADER_LEN + transport_len + PAYLOAD_LEN;
        let mut buffer = vec![0u8; ETHERNET_HEADER_LEN + ip_len];

        {
            let mut eth = MutableEthernetPacket::new(&mut buffer).unwrap();
            eth.set_source(MacAddr::new(0x02, 0, 0, 0, 0, 0x32));
            eth.set_destination(MacAddr::new(0x02, 0, 0, 0, 0, 0x64));
            eth.set_ethertype(EtherTypes::Ipv4);
        }

        {
            let mut ipv4 = MutableIpv4Packet::new(&mut buffer[ETHERNET_HEADER_LEN..]).unwrap();
            ipv4.set_version(4);
            ipv4.set_header_length(5);
            ipv4.set_total_length(u16::try_from(ip_len).unwrap());
            ipv4.set_ttl(64);
            ipv4.set_next_level_protocol(IpNextHeaderProtocol(protocol));
            ipv4.set_source(src_ip);
            ipv4.set_destination(dst_ip);
        }

        let transport_start = ETHERNET_HEADER_LEN + MIN_IPV4_HEADER_LEN;
        match protocol {
            PROTO_TCP => {
                let mut tcp = MutableTcpPacket::new(&mut buffer[transport_start..]).unwrap();
                tcp.set_source(src_port);
                tcp.set_destination(dst_port);
                tcp.set_data_offset(5);
                tcp.set_flags(TcpFlags::SYN | TcpFlags::ACK);
            }
            PROTO_UDP => {
                let mut udp = MutableUdpPacket::new(&mut buffer[transport_start..]).unwrap();
                udp.set_source(src_port);
                udp.set_destination(dst_port);
                udp.set_length(u16::try_from(UDP_HEADER_LEN + PAYLOAD_LEN).unwrap());
            }
            _ => {}
        }

        buffer
    }

    fn addrs() -> (Ipv4Addr, Ipv4Addr) {
        (Ipv4Addr::new(10, 0, 0, 50), Ipv4Addr::new(8, 8, 8, 8))
    }

    #[test]
    fn should_reject_frames_shorter_than_ethernet_and_ipv4_headers() {
        let (src, dst) = addrs();
        let frame = build_frame(PROTO_UDP, src, dst, 1000, 2000);

        for len in 0..ETHERNET_HEADER_LEN + MIN_IPV4_HEADER_LEN {
            assert!(
                ParsedPacket::parse(&frame[..len]).is_err(),
                "frame of {len} bytes must not parse"
            );
        }
        assert_eq!(
            ParsedPacket::parse(&[]).err(),
            Some(PacketError::Empty)
        );
    }

    #[test]
    fn should_reject_header_length_outside_valid_range() {
        let (src, dst) = addrs();
        let mut frame = build_frame(PROTO_ICMP, src, dst, 0, 0);
        frame[ETHERNET_HEADER_LEN] = 0x44;

        assert_eq!(
            ParsedPacket::parse(&frame).err(),
            Some(PacketError::InvalidHeaderLength { ihl: 4 })
        );
    }

    #[test]
    fn should_reject_header_length_beyond_captured_bytes() {
        let (src, dst) = addrs();
        let mut frame = build_frame(PROTO_ICMP, src, dst, 0, 0);
        frame[ETHERNET_HEADER_LEN] = 0x4f;

        assert!(matches!(
            ParsedPacket::parse(&frame),
            Err(PacketError::TruncatedIpv4 { needed: 60, .. })
        ));
    }

    #[test]
    fn should_reject_non_ipv4_ethertype() {
        let (src, dst) = addrs();
        let mut frame = build_frame(PROTO_UDP, src, dst, 1, 2);
        frame[12] = 0x86;
        frame[13] = 0xdd;

        assert_eq!(
            ParsedPacket::parse(&frame).err(),
            Some(PacketError::NotIpv4 { ethertype: 0x86dd })
        );
    }

    #[test]
    fn should_reject_truncated_transport_headers() {
        let (src, dst) = addrs();
        let tcp = build_frame(PROTO_TCP, src, dst, 1, 2);
        let cut = ETHERNET_HEADER_LEN + MIN_IPV4_HEADER_LEN + 12;

        assert!(matches!(
            ParsedPacket::parse(&tcp[..cut]),
            Err(PacketError::TruncatedTransport { protocol: "TCP", .. })
        ));

        let udp = build_frame(PROTO_UDP, src, dst, 1, 2);
        let cut = ETHERNET_HEADER_LEN + MIN_IPV4_HEADER_LEN + 4;
        assert!(matches!(
            ParsedPacket::parse(&udp[..cut]),
            Err(PacketError::TruncatedTransport { protocol: "UDP", .. })
        ));
    }

    #[test]
    fn should_parse_tcp_ports_flags_and_payload_length() {
        let (src, dst) = addrs();
        let frame = build_frame(PROTO_TCP, src, dst, 50000, 443);
        let packet = ParsedPacket::parse(&frame).unwrap();

        assert_eq!(packet.protocol(), Protocol::Tcp);
        assert_eq!(packet.source_ip(), src);
        assert_eq!(packet.destination_ip(), dst);
        assert_eq!(packet.source_port(), Some(50000));
        assert_eq!(packet.destination_port(), Some(443));
        assert_eq!(packet.payload_len(), PAYLOAD_LEN);
        assert_eq!(packet.tcp_flags().unwrap().as_str(), "as    ");
        assert_eq!(packet.tcp_flags().unwrap().to_string(), "[as    ]");
    }

    #[test]
    fn should_keep_flag_string_six_characters_wide() {
        let (src, dst) = addrs();
        let all = TcpFlags::ACK
            | TcpFlags::SYN
            | TcpFlags::PSH
            | TcpFlags::FIN
            | TcpFlags::RST
            | TcpFlags::URG;

        for flags in [0, TcpFlags::FIN, TcpFlags::RST | TcpFlags::URG, all] {
            let mut frame = build_frame(PROTO_TCP, src, dst, 1, 2);
            {
                let start = ETHERNET_HEADER_LEN + MIN_IPV4_HEADER_LEN;
                let mut tcp = MutableTcpPacket::new(&mut frame[start..]).unwrap();
                tcp.set_flags(flags);
            }
            let packet = ParsedPacket::parse(&frame).unwrap();
            assert_eq!(packet.tcp_flags().unwrap().as_str().len(), 6);
        }

        let mut frame = build_frame(PROTO_TCP, src, dst, 1, 2);
        {
            let start = ETHERNET_HEADER_LEN + MIN_IPV4_HEADER_LEN;
            let mut tcp = MutableTcpPacket::new(&mut frame[start..]).unwrap();
            tcp.set_flags(all);
        }
        let packet = ParsedPacket::parse(&frame).unwrap();
        assert_eq!(packet.tcp_flags().unwrap().as_str(), "aspfru");
    }

    #[test]
    fn should_take_udp_payload_length_from_length_field() {
        let (src, dst) = addrs();
        let frame = build_frame(PROTO_UDP, src, dst, 5353, 53);
        let packet = ParsedPacket::parse(&frame).unwrap();

        assert_eq!(packet.protocol(), Protocol::Udp);
        assert_eq!(packet.destination_port(), Some(53));
        assert_eq!(packet.payload_len(), UDP_HEADER_LEN + PAYLOAD_LEN);
        assert!(packet.tcp_flags().is_none());
    }

    #[test]
    fn should_parse_icmp_without_ports() {
        let (src, dst) = addrs();
        let frame = build_frame(PROTO_ICMP, src, dst, 0, 0);
        let packet = ParsedPacket::parse(&frame).unwrap();

        assert_eq!(packet.protocol(), Protocol::Icmp);
        assert_eq!(packet.source_port(), None);
        assert_eq!(packet.destination_port(), None);
    }

    #[test]
    fn should_label_other_protocols_unknown_without_transport_fields() {
        let (src, dst) = addrs();
        for number in [0u8, 2, 41, 47, 50, 89, 132, 255] {
            let frame = build_frame(number, src, dst, 0, 0);
            let packet = ParsedPacket::parse(&frame).unwrap();

            assert_eq!(packet.protocol().label(), "Unknown");
            assert!(matches!(packet.transport(), Transport::Unknown));
            assert_eq!(packet.source_port(), None);
            assert_eq!(packet.destination_port(), None);
            assert_eq!(packet.payload_len(), 0);
            assert!(packet.tcp_flags().is_none());
        }
    }

    #[test]
    fn should_not_copy_the_frame() {
        let (src, dst) = addrs();
        let frame = build_frame(PROTO_UDP, src, dst, 1, 2);
        let packet = ParsedPacket::parse(&frame).unwrap();

        assert!(std::ptr::eq(packet.frame(), frame.as_slice()));
    }

    #[test]
    fn should_format_log_line_with_padded_columns() {
        let (src, dst) = addrs();
        let frame = build_frame(PROTO_UDP, src, dst, 5353, 123);
        let packet = ParsedPacket::parse(&frame).unwrap();

        assert_eq!(
            packet.log_line("OUT"),
            "UDP  10.0.0.50      :5353  -> 8.8.8.8        :123       18 bytes    OUT"
        );
    }
}
