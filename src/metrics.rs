//! Prometheus metrics.
//!
//! Counters are recorded through the `metrics` facade; without an installed
//! recorder they are no-ops, so tests and disabled setups pay nothing.

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use crate::config::MetricsConfig;
use crate::error::Result;
use crate::network::Direction;

pub const FRAMES_TOTAL: &str = "redwire_frames_total";
pub const FRAMES_DROPPED_TOTAL: &str = "redwire_frames_dropped_total";
pub const INJECT_FAILURES_TOTAL: &str = "redwire_inject_failures_total";

/// Why a captured frame never reached classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Malformed,
    Filtered,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Filtered => "filtered",
        }
    }
}

/// Initialize the metrics system based on configuration.
///
/// When metrics are enabled, this starts an HTTP server that exposes
/// a `/metrics` endpoint for Prometheus to scrape.
pub fn init(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen)
        .install()
        .map_err(crate::error::Error::Metrics)?;

    info!("Metrics exporter listening on {}", config.listen);
    Ok(())
}

pub fn record_decision(direction: Direction) {
    counter!(FRAMES_TOTAL, "direction" => direction.as_str()).increment(1);
}

pub fn record_drop(reason: DropReason) {
    counter!(FRAMES_DROPPED_TOTAL, "reason" => reason.as_str()).increment(1);
}

pub fn record_inject_failure() {
    counter!(INJECT_FAILURES_TOTAL).increment(1);
}
