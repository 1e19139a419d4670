//! Frame capture, classification and reinjection.

mod address;
pub mod capture;
mod filter;
pub mod forward;
pub mod interface;
pub mod packet;

pub use address::{BROADCAST_MAC, NetworkAddress, parse_mac};
pub use capture::{
    CaptureSource, PacketCapture, PacketSender, PnetCapture, PnetSender, PnetSource, Received,
    find_interface,
};
pub use filter::{BoundaryFilter, DNS_PORT};
pub use forward::{
    Direction, Dispatch, ForwardTarget, Forwarder, MAX_INJECT_RETRIES, Router,
    rewrite_link_layer, send_with_retry,
};
pub use packet::{ParsedPacket, Protocol, TcpFlagString, Transport};
