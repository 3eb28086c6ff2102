//! # Node Network Dashboard Main Driver
//!
//! ## Purpose
//! Entry point for the dashboard daemon. Wires the governed API client,
//! the durable mirror, the lookup orchestrator and the polling loops,
//! then runs until interrupted.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration file, command line arguments, environment
//!   variables
//! - **Output**: Running polling loops, or the result of a one-shot
//!   lookup / health check
//!
//! ## Key Features
//! - One-shot lookup and health-check modes for scripting
//! - Structured logging with an optional JSON format
//! - Graceful shutdown on SIGINT with cache statistics on exit

use clap::{Arg, Command};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use nodewatch::{
    api::ApiClient,
    config::Config,
    errors::{DashboardError, Result},
    history::QueryHistory,
    lookup::{FieldState, LookupOrchestrator, SearchOutcome},
    mirror::DurableMirror,
    poller::DashboardPoller,
    SystemClock, Transport,
};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("nodewatch")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Request-governed dashboard client for a distributed node network")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("nodewatch.toml"),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .value_name("URL")
                .help("Override the remote API base URL"),
        )
        .arg(
            Arg::new("lookup")
                .long("lookup")
                .value_name("QUERY")
                .help("Run one lookup (node id or wallet address) and exit"),
        )
        .arg(
            Arg::new("check-health")
                .long("check-health")
                .help("Probe the remote service and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("Run a single heartbeat and overview refresh, then exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("nodewatch.toml");
    let mut config = Config::from_file(config_path)?;

    if let Some(base_url) = matches.get_one::<String>("base-url") {
        config.api.base_url = base_url.clone();
        config.validate()?;
    }

    init_logging(&config)?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting nodewatch");
    info!(config = config_path, base_url = %config.api.base_url, "configuration loaded");

    let clock = Arc::new(SystemClock);
    let client = Arc::new(ApiClient::new(&config, clock.clone())?);

    if matches.get_flag("check-health") {
        return run_health_check(&client).await;
    }

    let db = sled::open(&config.mirror.db_path)?;
    let mirror = DurableMirror::from_db(&db, clock.clone(), config.mirror.enable_compression)?;
    let history = QueryHistory::open(&db, config.search.history_limit)?;

    if let Some(query) = matches.get_one::<String>("lookup") {
        let orchestrator = LookupOrchestrator::new(
            client.clone() as Arc<dyn Transport>,
            clock,
            &config,
            Some(history),
        )?;
        let result = run_lookup(&orchestrator, query).await;
        log_cache_stats(&client);
        return result;
    }

    let poller = DashboardPoller::new(client.clone(), mirror, &config);

    if matches.get_flag("once") {
        let online = poller.heartbeat_tick().await;
        info!(online, "heartbeat probed");
        let overview = poller.refresh_overview().await?;
        println!("{}", serde_json::to_string_pretty(&overview.payload)?);
        log_cache_stats(&client);
        return Ok(());
    }

    if let Some(cached) = poller.cached_overview() {
        info!("mirrored overview available for the first paint");
        println!("{}", serde_json::to_string_pretty(&cached.payload)?);
    }

    tokio::select! {
        _ = poller.run() => {
            warn!("polling loop stopped unexpectedly");
        }
        _ = signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
    }

    log_cache_stats(&client);
    db.flush()?;
    info!("nodewatch shut down");
    Ok(())
}

/// Initialize logging and tracing
fn init_logging(config: &Config) -> Result<()> {
    let log_level: tracing::Level =
        config
            .logging
            .level
            .parse()
            .map_err(|_| DashboardError::Config {
                message: format!("invalid log level: {}", config.logging.level),
            })?;
    let filter = tracing_subscriber::filter::LevelFilter::from_level(log_level);

    let layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true);
    if config.logging.json_format {
        tracing_subscriber::registry()
            .with(layer.json().with_filter(filter))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(layer.with_filter(filter))
            .init();
    }
    Ok(())
}

/// Probe the remote service and report reachability
async fn run_health_check(client: &ApiClient) -> Result<()> {
    info!("probing the remote service...");
    if !client.heartbeat().await {
        return Err(DashboardError::Network {
            details: "remote service did not answer the heartbeat".to_string(),
        });
    }
    info!("remote service is reachable");

    match client.version_info().await {
        Ok(version) => info!(%version, "remote version"),
        Err(e) => warn!(error = %e, "version endpoint unavailable"),
    }
    Ok(())
}

/// Run one lookup and print the settled report
async fn run_lookup(orchestrator: &LookupOrchestrator, query: &str) -> Result<()> {
    match orchestrator.search(query).await? {
        SearchOutcome::Report(report) => {
            info!(
                session = %report.session_id,
                node_id = ?report.node_id,
                address = ?report.address,
                "lookup settled"
            );
            if let Some(remaining) = report.entity_cooldown_seconds {
                warn!(remaining, "node reports an active cooldown");
            }
            for (name, field) in [
                ("status", &report.status),
                ("mining", &report.mining),
                ("cooldown", &report.cooldown),
                ("claim", &report.claim),
                ("log", &report.log),
            ] {
                match field {
                    FieldState::Loaded(value) => {
                        println!("{name}: {}", serde_json::to_string_pretty(value)?)
                    }
                    FieldState::Failed(reason) => println!("{name}: failed ({reason})"),
                    FieldState::Skipped => println!("{name}: skipped, identifier unresolved"),
                    FieldState::Pending => println!("{name}: pending"),
                }
            }
            Ok(())
        }
        SearchOutcome::CoolingDown { remaining_seconds } => {
            warn!(remaining_seconds, "query is cooling down, try again later");
            Ok(())
        }
        SearchOutcome::NodeCoolingDown {
            node_id,
            remaining_seconds,
        } => {
            warn!(%node_id, remaining_seconds, "node reports an active cooldown");
            Ok(())
        }
        SearchOutcome::Superseded => Ok(()),
    }
}

fn log_cache_stats(client: &ApiClient) {
    let (fresh_hits, stale_served, network_calls, rate_limited) = client.cache().stats().snapshot();
    info!(
        fresh_hits,
        stale_served, network_calls, rate_limited, "cache statistics"
    );
}
