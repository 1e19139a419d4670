//! Packet capture and injection abstraction.
//!
//! Provides a trait-based abstraction over the raw frame I/O boundary to enable:
//! - Testing without real network interfaces
//! - Different capture backends

use std::io;
use std::time::Duration;

use pnet::datalink::{self, Channel, DataLinkReceiver, DataLinkSender, NetworkInterface};

use super::filter::BoundaryFilter;
use crate::error::{NetworkError, Result};

/// Largest frame the pnet channel reads or writes in one call.
pub const CHANNEL_BUFFER_SIZE: usize = 65536;

/// Outcome of one receive call.
#[derive(Debug, PartialEq, Eq)]
pub enum Received<'a> {
    /// A frame that passed the boundary filter.
    Frame(&'a [u8]),
    /// A frame was read but rejected by the boundary filter.
    Filtered,
    /// The read timeout elapsed without a frame.
    Timeout,
    /// The capture source has no more frames.
    Exhausted,
}

/// Trait for packet capture implementations.
pub trait PacketCapture: Send {
    /// Install the boundary filter applied to every subsequent frame.
    fn install_filter(&mut self, filter: BoundaryFilter) -> Result<()>;

    /// Block until the next frame, a timeout or the end of the capture.
    ///
    /// An error is a hard read failure and ends the capture loop.
    fn next_frame(&mut self) -> Result<Received<'_>>;
}

/// Trait for packet sending implementations.
pub trait PacketSender: Send {
    /// Send a packet.
    fn send(&mut self, packet: &[u8]) -> Result<()>;
}

/// Opens the capture and injection handles for one interface.
pub trait CaptureSource {
    type Capture: PacketCapture + 'static;
    type Sender: PacketSender + 'static;

    /// Name of the interface, for logging.
    fn name(&self) -> &str;

    /// Open both handles; reads give up after `read_timeout`.
    fn open(&self, read_timeout: Duration) -> Result<(Self::Capture, Self::Sender)>;
}

/// Find a suitable network interface.
///
/// Returns the named interface, or else the first interface that is:
/// - Up (active)
/// - Not a loopback interface
/// - Has at least one IP address
pub fn find_interface(name: Option<&str>) -> Result<NetworkInterface> {
    let interfaces = datalink::interfaces();

    if let Some(name) = name {
        interfaces
            .into_iter()
            .find(|iface| iface.name == name)
            .ok_or_else(|| NetworkError::NoInterface.into())
    } else {
        interfaces
            .into_iter()
            .find(|iface| iface.is_up() && !iface.is_loopback() && !iface.ips.is_empty())
            .ok_or_else(|| NetworkError::NoInterface.into())
    }
}

/// pnet datalink channel on a live interface.
pub struct PnetSource {
    interface: NetworkInterface,
}

impl PnetSource {
    pub const fn new(interface: NetworkInterface) -> Self {
        Self { interface }
    }
}

impl CaptureSource for PnetSource {
    type Capture = PnetCapture;
    type Sender = PnetSender;

    fn name(&self) -> &str {
        &self.interface.name
    }

    fn open(&self, read_timeout: Duration) -> Result<(PnetCapture, PnetSender)> {
        let (tx, rx) = match datalink::channel(&self.interface, channel_config(read_timeout)) {
            Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
            Ok(_) => return Err(NetworkError::UnsupportedChannel.into()),
            Err(e) => return Err(NetworkError::ChannelOpen(e.to_string()).into()),
        };

        Ok((PnetCapture { rx, filter: None }, PnetSender { tx }))
    }
}

/// pnet reads frames into a fixed buffer and silently cuts anything longer.
fn channel_config(read_timeout: Duration) -> datalink::Config {
    datalink::Config {
        read_timeout: Some(read_timeout),
        read_buffer_size: CHANNEL_BUFFER_SIZE,
        write_buffer_size: CHANNEL_BUFFER_SIZE,
        promiscuous: true,
        ..datalink::Config::default()
    }
}

/// Production packet capture using pnet.
///
/// pnet exposes no kernel filter, so the boundary filter runs on each
/// frame right after it is read.
pub struct PnetCapture {
    rx: Box<dyn DataLinkReceiver>,
    filter: Option<BoundaryFilter>,
}

impl PacketCapture for PnetCapture {
    fn install_filter(&mut self, filter: BoundaryFilter) -> Result<()> {
        self.filter = Some(filter);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Received<'_>> {
        match self.rx.next() {
            Ok(frame) => {
                if self.filter.as_ref().is_some_and(|f| !f.admits(frame)) {
                    Ok(Received::Filtered)
                } else {
                    Ok(Received::Frame(frame))
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(Received::Timeout)
            }
            Err(e) => Err(NetworkError::Receive(e.to_string()).into()),
        }
    }
}

/// Production packet sender using pnet.
pub struct PnetSender {
    tx: Box<dyn DataLinkSender>,
}

impl PacketSender for PnetSender {
    fn send(&mut self, packet: &[u8]) -> Result<()> {
        self.tx
            .send_to(packet, None)
            .ok_or_else(|| NetworkError::SendFailed("send returned None".into()))?
            .map_err(|e| NetworkError::SendFailed(e.to_string()))?;
        Ok(())
    }
}
