//! Shutdown handling and supervision of the forwarding engine.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::engine::{EngineExit, EngineHandle};
use crate::error::Result;

/// Default interval between engine liveness checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(30);

/// The capture and injection handles owned by the forwarding thread.
///
/// Each handle is closed once; closing again is a no-op. Dropping the value
/// closes whatever is still open.
pub struct CaptureHandles<C, S> {
    interface: String,
    capture: Option<C>,
    sender: Option<S>,
}

impl<C, S> CaptureHandles<C, S> {
    pub fn new(interface: impl Into<String>, capture: C, sender: S) -> Self {
        Self {
            interface: interface.into(),
            capture: Some(capture),
            sender: Some(sender),
        }
    }

    /// Borrow both handles, or `None` once any of them is closed.
    pub fn split_mut(&mut self) -> Option<(&mut C, &mut S)> {
        match (self.capture.as_mut(), self.sender.as_mut()) {
            (Some(capture), Some(sender)) => Some((capture, sender)),
            _ => None,
        }
    }

    pub const fn is_open(&self) -> bool {
        self.capture.is_some() || self.sender.is_some()
    }

    /// Close every handle still open and return how many were closed.
    pub fn close_all(&mut self) -> usize {
        let mut closed = 0;

        if let Some(capture) = self.capture.take() {
            drop(capture);
            info!("Closed capture handle on {}", self.interface);
            closed += 1;
        }

        if let Some(sender) = self.sender.take() {
            drop(sender);
            info!("Closed injection handle on {}", self.interface);
            closed += 1;
        }

        closed
    }
}

impl<C, S> Drop for CaptureHandles<C, S> {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// Wait for a termination signal and return its name.
#[cfg(unix)]
pub async fn wait_for_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            Ok("SIGINT")
        }
        _ = terminate.recv() => Ok("SIGTERM"),
        _ = hangup.recv() => Ok("SIGHUP"),
    }
}

/// Wait for a console control event and return its name.
#[cfg(windows)]
pub async fn wait_for_signal() -> Result<&'static str> {
    use tokio::signal::windows::{ctrl_break, ctrl_c, ctrl_close, ctrl_logoff, ctrl_shutdown};

    let mut interrupt = ctrl_c()?;
    let mut breaks = ctrl_break()?;
    let mut close = ctrl_close()?;
    let mut logoff = ctrl_logoff()?;
    let mut shutdown = ctrl_shutdown()?;

    tokio::select! {
        _ = interrupt.recv() => Ok("CTRL_C"),
        _ = breaks.recv() => Ok("CTRL_BREAK"),
        _ = close.recv() => Ok("CTRL_CLOSE"),
        _ = logoff.recv() => Ok("CTRL_LOGOFF"),
        _ = shutdown.recv() => Ok("CTRL_SHUTDOWN"),
    }
}

/// Wait for a termination signal and return its name.
#[cfg(not(any(unix, windows)))]
pub async fn wait_for_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl-C")
}

/// Resolve once the forwarding thread has stopped.
pub async fn supervise(handle: &EngineHandle, poll_interval: Duration) {
    let mut ticker = tokio::time::interval(poll_interval);
    while handle.is_running() {
        ticker.tick().await;
    }
}

/// Ties signal handling and supervision to one engine.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownController {
    poll_interval: Duration,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl ShutdownController {
    pub const fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Run until a signal arrives or the engine stops on its own.
    ///
    /// On a signal the engine is asked to stop and its thread is awaited,
    /// so every handle is closed by the time this returns.
    pub async fn run(&self, handle: EngineHandle) -> EngineExit {
        self.run_until(handle, wait_for_signal()).await
    }

    /// Like [`run`](Self::run), with `signal` standing in for the OS signals.
    ///
    /// When `signal` fails the engine keeps running under supervision alone.
    pub async fn run_until<F>(&self, handle: EngineHandle, signal: F) -> EngineExit
    where
        F: Future<Output = Result<&'static str>>,
    {
        let received = tokio::select! {
            received = signal => Some(received),
            () = supervise(&handle, self.poll_interval) => None,
        };

        match received {
            Some(Ok(name)) => {
                info!("Received {name}, shutting down");
                handle.request_shutdown();
            }
            Some(Err(err)) => {
                warn!("Signal handling unavailable, relying on supervision: {err}");
            }
            None => {}
        }

        supervise(&handle, self.poll_interval).await;
        if !handle.shutdown_requested() {
            error!("Forwarding engine on {} stopped unexpectedly", handle.interface());
        }

        let exit = handle.join();
        info!("Forwarding engine exited: {exit}");
        exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ForwardingEngine, ScanContext};
    use crate::network::NetworkAddress;
    use crate::network::capture::tests::{MockCapture, MockSender, MockSource};
    use crate::registry::{FirewallRuleRegistry, TargetSystemRegistry};
    use pnet::util::MacAddr;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn start_engine(capture: MockCapture) -> EngineHandle {
        let context = ScanContext::new(
            "mock0",
            NetworkAddress::new(MacAddr(0x02, 0, 0, 0, 0, 0x64), Ipv4Addr::new(10, 0, 0, 100)),
            NetworkAddress::new(MacAddr(0x02, 0, 0, 0, 0, 0x01), Ipv4Addr::new(10, 0, 0, 1)),
        );
        let source = MockSource::new(capture, MockSender::new());
        ForwardingEngine::start(
            context,
            &source,
            TargetSystemRegistry::new(),
            Arc::new(FirewallRuleRegistry::new()),
        )
        .unwrap()
    }

    #[test]
    fn should_close_each_handle_once() {
        let mut handles =
            CaptureHandles::new("mock0", MockCapture::new(Vec::new()), MockSender::new());

        assert!(handles.is_open());
        assert!(handles.split_mut().is_some());
        assert_eq!(handles.close_all(), 2);
        assert_eq!(handles.close_all(), 0);
        assert!(!handles.is_open());
        assert!(handles.split_mut().is_none());
    }

    #[test]
    fn should_use_thirty_millisecond_poll_by_default() {
        assert_eq!(
            ShutdownController::default().poll_interval,
            Duration::from_millis(30)
        );
    }

    #[tokio::test]
    async fn should_return_when_engine_stops_on_its_own() {
        let handle = start_engine(MockCapture::new(Vec::new()));

        let exit = ShutdownController::default().run(handle).await;

        assert_eq!(exit, EngineExit::Exhausted);
    }

    #[tokio::test]
    async fn should_return_on_signal_with_cancelled_engine() {
        let handle = start_engine(MockCapture::idle());

        let exit = ShutdownController::new(Duration::from_millis(5))
            .run_until(handle, async { Result::Ok("SIGTERM") })
            .await;

        assert_eq!(exit, EngineExit::Cancelled);
    }

    #[tokio::test]
    async fn should_keep_engine_running_when_signal_handling_fails() {
        let handle = start_engine(MockCapture::idle_for(50));

        let exit = ShutdownController::new(Duration::from_millis(5))
            .run_until(handle, async {
                Result::Err(std::io::Error::other("no signal driver").into())
            })
            .await;

        assert_eq!(exit, EngineExit::Exhausted);
    }

    #[tokio::test]
    async fn should_wait_until_engine_thread_is_gone() {
        let handle = start_engine(MockCapture::idle());
        assert!(handle.is_running());

        handle.request_shutdown();
        supervise(&handle, Duration::from_millis(5)).await;

        assert!(!handle.is_running());
        assert_eq!(handle.join(), EngineExit::Cancelled);
    }
}
