//! Redwire - Entry point.
//!
//! `redwire` loads the record files, opens the configured interface and
//! forwards poisoned traffic until it receives a termination signal.
//! `redwire check` only loads and lists the registries.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use redwire::config::Config;
use redwire::engine::{EngineExit, ForwardingEngine, ScanContext};
use redwire::error::StartupError;
use redwire::lifecycle::ShutdownController;
use redwire::network::interface::{detect_gateway, get_interface_info, resolve_neighbour_mac};
use redwire::network::{NetworkAddress, PnetSource, find_interface};
use redwire::records::{self, LoadError};
use redwire::registry::{DnsSpoofRegistry, FirewallRuleRegistry, TargetSystemRegistry};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Gateway address from the configuration, or discovered from the OS tables.
fn resolve_gateway(config: &Config) -> Result<NetworkAddress> {
    let ip = if let Some(ip) = config.gateway_ip {
        info!("Using configured gateway IP: {ip}");
        ip
    } else {
        let detected = detect_gateway().context("Failed to detect gateway")?;
        info!("Auto-detected gateway IP: {detected}");
        detected
    };

    let mac = match config.gateway_mac {
        Some(mac) => mac,
        None => resolve_neighbour_mac(ip)
            .with_context(|| format!("Failed to resolve gateway MAC for {ip}"))?,
    };

    Ok(NetworkAddress::new(mac, ip))
}

/// Load the target hosts; a missing file or an empty list aborts startup.
fn load_targets(config: &Config, systems: &TargetSystemRegistry) -> Result<()> {
    let path = &config.target_hosts_file;
    match records::load_target_hosts(path, systems) {
        Ok(0) => bail!("No target hosts defined in {}", path.display()),
        Ok(_) => Ok(()),
        Err(LoadError::NotFound(_)) => bail!("No target hosts file {}", path.display()),
        Err(err) => Err(err).context("Failed to load target hosts"),
    }
}

fn load_dns_rules(path: Option<&Path>) -> Result<DnsSpoofRegistry> {
    let mut registry = DnsSpoofRegistry::new();
    if let Some(path) = path {
        records::load_dns_hosts(path, &mut registry).context("Failed to load DNS hosts")?;
    }
    Ok(registry)
}

fn load_firewall(path: Option<&Path>) -> Result<FirewallRuleRegistry> {
    let mut registry = FirewallRuleRegistry::new();
    if let Some(path) = path {
        records::load_firewall_rules(path, &mut registry)
            .context("Failed to load firewall rules")?;
    }
    Ok(registry)
}

/// Treat a missing record file as empty, keeping every other failure.
fn skip_missing(loaded: Result<usize, LoadError>) -> Result<usize, LoadError> {
    match loaded {
        Err(LoadError::NotFound(path)) => {
            warn!("Skipping missing file {}", path.display());
            Ok(0)
        }
        other => other,
    }
}

/// Load whatever record files exist, for listing.
fn load_for_check(
    config: &Config,
) -> Result<(TargetSystemRegistry, DnsSpoofRegistry, FirewallRuleRegistry)> {
    let systems = TargetSystemRegistry::new();
    skip_missing(records::load_target_hosts(&config.target_hosts_file, &systems))
        .context("Failed to load target hosts")?;

    let mut dns = DnsSpoofRegistry::new();
    if let Some(path) = config.dns_hosts_file.as_deref() {
        skip_missing(records::load_dns_hosts(path, &mut dns)).context("Failed to load DNS hosts")?;
    }

    let mut firewall = FirewallRuleRegistry::new();
    if let Some(path) = config.firewall_rules_file.as_deref() {
        skip_missing(records::load_firewall_rules(path, &mut firewall))
            .context("Failed to load firewall rules")?;
    }

    Ok((systems, dns, firewall))
}

/// List every registry without touching the network.
fn check(config: &Config) -> Result<()> {
    let (systems, dns, firewall) = load_for_check(config)?;

    info!("{} target systems:", systems.len());
    systems.for_each(|system| info!("  {:<15} {}", system.ip_string, system.mac_string));

    info!("{} DNS spoofing rules:", dns.len());
    dns.for_each(|rule| {
        let target = rule.cname_target.as_deref().unwrap_or("-");
        let state = if rule.enabled { "on" } else { "off" };
        info!(
            "  {:<3} {:<5} {:<30} {:<30} {:<15} ttl={}",
            state, rule.record_type, rule.hostname, target, rule.spoofed_ip, rule.ttl
        );
    });

    info!("{} firewall rules:", firewall.len());
    for rule in firewall.iter() {
        info!("  {rule}");
    }

    Ok(())
}

async fn run(config: Config) -> Result<()> {
    match std::env::current_dir() {
        Ok(cwd) => info!("Working directory: {}", cwd.display()),
        Err(err) => warn!("Unable to determine working directory: {err}"),
    }

    redwire::metrics::init(&config.metrics).context("Failed to initialize metrics")?;

    let interface =
        find_interface(config.interface.as_deref()).context("Failed to find network interface")?;
    let local = get_interface_info(&interface).context("Failed to read interface addresses")?;
    info!("Using interface {} ({local})", interface.name);

    let gateway = resolve_gateway(&config)?;
    info!("Gateway: {gateway}");

    // The gateway is always the first known system.
    let systems = TargetSystemRegistry::new();
    systems.insert(gateway.mac, gateway.ip);
    load_targets(&config, &systems)?;

    let dns = load_dns_rules(config.dns_hosts_file.as_deref())?;
    info!("{} DNS spoofing rules loaded", dns.len());
    let firewall = Arc::new(load_firewall(config.firewall_rules_file.as_deref())?);

    let context = ScanContext {
        interface_name: interface.name.clone(),
        local,
        gateway,
        read_timeout: config.read_timeout(),
        max_inject_retries: config.max_inject_retries,
    };
    let source = PnetSource::new(interface);

    let handle = ForwardingEngine::start(context, &source, systems, firewall)
        .context("Failed to start forwarding engine")?;
    info!("Forwarding engine running, press Ctrl-C to stop");

    match ShutdownController::new(config.supervisor_poll()).run(handle).await {
        EngineExit::Failed(reason) => bail!("Forwarding engine failed: {reason}"),
        EngineExit::Cancelled | EngineExit::Exhausted => Ok(()),
    }
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    err.downcast_ref::<StartupError>()
        .and_then(|err| u8::try_from(err.code()).ok())
        .map_or(ExitCode::FAILURE, ExitCode::from)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let result = match Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {config_path}"))
    {
        Ok(config) => match std::env::args().nth(1).as_deref() {
            None | Some("run") => run(config).await,
            Some("check") => check(&config),
            Some(other) => Err(anyhow::anyhow!(
                "Unknown command {other:?}, expected `run` or `check`"
            )),
        },
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            exit_code(&err)
        }
    }
}
