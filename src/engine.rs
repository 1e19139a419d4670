//! The forwarding engine.
//!
//! Startup runs on the caller thread: open the capture source, compile the
//! boundary filter and install it. Only then is the forwarding thread spawned,
//! so every startup failure is reported synchronously with its own code.
//! The thread reads frames in capture order, dispatches each one and closes
//! its handles when it leaves the loop.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Error, NetworkError, StartupError};
use crate::lifecycle::CaptureHandles;
use crate::metrics::{self, DropReason};
use crate::network::{
    BoundaryFilter, CaptureSource, Forwarder, MAX_INJECT_RETRIES, NetworkAddress, PacketCapture,
    PacketSender, Received, Router,
};
use crate::registry::{FirewallRuleRegistry, TargetSystemRegistry};

/// Default bound on how long one receive call may block.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Everything the engine needs to know about the interface it runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanContext {
    pub interface_name: String,
    pub local: NetworkAddress,
    pub gateway: NetworkAddress,
    pub read_timeout: Duration,
    pub max_inject_retries: u32,
}

impl ScanContext {
    pub fn new(
        interface_name: impl Into<String>,
        local: NetworkAddress,
        gateway: NetworkAddress,
    ) -> Self {
        Self {
            interface_name: interface_name.into(),
            local,
            gateway,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_inject_retries: MAX_INJECT_RETRIES,
        }
    }
}

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Opening = 0,
    Filtering = 1,
    Listening = 2,
    Dispatching = 3,
    Closed = 4,
}

impl EngineState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Opening,
            1 => Self::Filtering,
            2 => Self::Listening,
            3 => Self::Dispatching,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Opening => "opening",
            Self::Filtering => "filtering",
            Self::Listening => "listening",
            Self::Dispatching => "dispatching",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct SharedState(AtomicU8);

impl SharedState {
    const fn new(state: EngineState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn set(&self, state: EngineState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn get(&self) -> EngineState {
        EngineState::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Why the forwarding loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineExit {
    /// Shutdown was requested.
    Cancelled,
    /// The capture source ran out of frames.
    Exhausted,
    /// A hard receive error, or a panic on the forwarding thread.
    Failed(String),
}

impl fmt::Display for EngineExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::Exhausted => f.write_str("capture exhausted"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Control handle for a running engine.
#[derive(Debug)]
pub struct EngineHandle {
    interface: String,
    cancel: Arc<AtomicBool>,
    state: Arc<SharedState>,
    thread: JoinHandle<EngineExit>,
}

impl EngineHandle {
    /// Ask the forwarding thread to stop; later calls do nothing.
    pub fn request_shutdown(&self) {
        if !self.cancel.swap(true, Ordering::AcqRel) {
            info!("Stopping forwarding engine on {}", self.interface);
        }
    }

    pub fn shutdown_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }

    pub fn state(&self) -> EngineState {
        self.state.get()
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Block until the forwarding thread has exited.
    pub fn join(self) -> EngineExit {
        self.thread
            .join()
            .unwrap_or_else(|_| EngineExit::Failed("forwarding thread panicked".into()))
    }
}

/// Entry point for starting the engine.
pub struct ForwardingEngine;

impl ForwardingEngine {
    /// Open, filter and spawn the forwarding thread.
    pub fn start<P: CaptureSource>(
        context: ScanContext,
        source: &P,
        systems: TargetSystemRegistry,
        firewall: Arc<FirewallRuleRegistry>,
    ) -> Result<EngineHandle, StartupError> {
        let state = Arc::new(SharedState::new(EngineState::Opening));
        let interface = context.interface_name.clone();

        let (mut capture, sender) =
            source
                .open(context.read_timeout)
                .map_err(|err| StartupError::Open {
                    interface: interface.clone(),
                    source: into_network_error(err),
                })?;
        info!("Opened capture source {} on {interface}", source.name());

        state.set(EngineState::Filtering);
        let filter = BoundaryFilter::compile(context.local.mac, context.local.ip)
            .map_err(StartupError::FilterCompile)?;
        let expression = filter.expression().to_string();
        capture
            .install_filter(filter)
            .map_err(|err| StartupError::FilterInstall {
                expression: expression.clone(),
                source: into_network_error(err),
            })?;
        info!("Boundary filter: {expression}");

        let handles = CaptureHandles::new(interface.clone(), capture, sender);
        let forwarder = Forwarder::new(
            Router::new(context.local, context.gateway, systems, firewall),
            context.max_inject_retries,
        );
        let cancel = Arc::new(AtomicBool::new(false));

        state.set(EngineState::Listening);
        let thread = {
            let cancel = Arc::clone(&cancel);
            let thread_state = Arc::clone(&state);
            thread::Builder::new()
                .name(format!("redwire-{interface}"))
                .spawn(move || run_loop(handles, &forwarder, &cancel, &thread_state))
                .map_err(|err| {
                    state.set(EngineState::Closed);
                    StartupError::Spawn(err)
                })?
        };

        Ok(EngineHandle {
            interface,
            cancel,
            state,
            thread,
        })
    }
}

fn into_network_error(err: Error) -> NetworkError {
    match err {
        Error::Network(err) => err,
        other => NetworkError::ChannelOpen(other.to_string()),
    }
}

fn run_loop<C: PacketCapture, S: PacketSender>(
    mut handles: CaptureHandles<C, S>,
    forwarder: &Forwarder,
    cancel: &AtomicBool,
    state: &SharedState,
) -> EngineExit {
    let mut buffer = Vec::new();

    let exit = loop {
        if cancel.load(Ordering::Acquire) {
            break EngineExit::Cancelled;
        }

        let Some((capture, sender)) = handles.split_mut() else {
            break EngineExit::Failed(NetworkError::Closed.to_string());
        };

        match capture.next_frame() {
            Ok(Received::Frame(frame)) => {
                buffer.clear();
                buffer.extend_from_slice(frame);
            }
            Ok(Received::Filtered) => {
                metrics::record_drop(DropReason::Filtered);
                continue;
            }
            Ok(Received::Timeout) => continue,
            Ok(Received::Exhausted) => break EngineExit::Exhausted,
            Err(err) => {
                warn!("Capture failed: {err}");
                break EngineExit::Failed(err.to_string());
            }
        }

        state.set(EngineState::Dispatching);
        if let Err(err) = forwarder.dispatch(&mut buffer, sender) {
            debug!("Dropping frame: {err}");
            metrics::record_drop(DropReason::Malformed);
        }
        state.set(EngineState::Listening);
    };

    handles.close_all();
    state.set(EngineState::Closed);
    exit
}
