// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use zonepool::{
    backend::BackendRegistry,
    cache::open_cache,
    central::{Central, CentralApi},
    config::Config,
    constants::{HEALTH_SERVER_PATH, METRICS_SERVER_PATH, ZONE_EVENT_CHANNEL_CAPACITY},
    context::RequestContext,
    dns::{DnsQuerier, HickoryDnsClient, SoaAnswer, Transport},
    engine::PoolManager,
    metrics,
    model::Domain,
    notifier::LogNotifier,
    periodic::RecoveryLoop,
    pool::{ConfigTopology, PoolTopology},
    storage::{DomainCriteria, MemoryStorage},
};

/// Pool manager for authoritative DNS servers
#[derive(Debug, Parser)]
#[command(name = "zonepool", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the pool manager until SIGINT or SIGTERM
    Run {
        /// Path to the YAML configuration
        #[arg(short, long, default_value = "/etc/zonepool/config.yaml")]
        config: PathBuf,
    },
    /// Check a configuration file and exit
    ValidateConfig {
        /// Path to the YAML configuration
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Ask one nameserver for the SOA serial of a zone
    Probe {
        /// Nameserver address (IP:port)
        #[arg(long)]
        server: SocketAddr,
        /// Zone name with trailing dot
        #[arg(long)]
        zone: String,
        /// Query over TCP instead of UDP
        #[arg(long)]
        tcp: bool,
        /// Query timeout in seconds
        #[arg(long, default_value_t = 5)]
        timeout_secs: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("zonepool-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

fn init_tracing() {
    // Respects RUST_LOG, defaults to INFO
    // RUST_LOG_FORMAT=json switches to JSON lines
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(cli: Cli) -> Result<()> {
    init_tracing();
    debug!("Logging initialized with file and line number tracking");

    match cli.command {
        Command::Run { config } => run(config).await,
        Command::ValidateConfig { config } => validate_config(config),
        Command::Probe {
            server,
            zone,
            tcp,
            timeout_secs,
        } => probe(server, &zone, tcp, timeout_secs).await,
    }
}

fn load_config(path: &PathBuf, registry: &BackendRegistry) -> Result<Config> {
    let config = Config::load(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    config
        .validate(registry)
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(config)
}

fn validate_config(path: PathBuf) -> Result<()> {
    let config = load_config(&path, &BackendRegistry::builtin())?;
    let targets: usize = config.pools.iter().map(|p| p.targets.len()).sum();
    println!(
        "{}: OK ({} pools, {} targets, {} seed zones)",
        path.display(),
        config.pools.len(),
        targets,
        config.zones.len()
    );
    Ok(())
}

async fn probe(server: SocketAddr, zone: &str, tcp: bool, timeout_secs: u64) -> Result<()> {
    let transport = if tcp { Transport::Tcp } else { Transport::Udp };
    let client = HickoryDnsClient::new(transport);
    let answer = client
        .query_soa(server, zone, Duration::from_secs(timeout_secs))
        .await
        .with_context(|| format!("SOA query for {zone} to {server} failed"))?;
    match answer {
        SoaAnswer::Serial(serial) => println!("{zone} {server} serial={serial}"),
        SoaAnswer::Absent => println!("{zone} {server} absent"),
    }
    Ok(())
}

async fn run(path: PathBuf) -> Result<()> {
    info!(config = %path.display(), "Starting zonepool");

    let registry = BackendRegistry::builtin();
    let config = load_config(&path, &registry)?;

    let topology = Arc::new(ConfigTopology::new(config.pools.clone()));
    let storage = Arc::new(MemoryStorage::with_pools(config.pools.clone()));
    let cache = open_cache(&config.cache)
        .await
        .context("failed to open the convergence cache")?;
    let backends = registry
        .build_all(&config.pools, &config.pool_manager.backend_settings())
        .context("failed to build backend drivers")?;
    debug!(drivers = backends.len(), "Backend drivers built");

    let (events_tx, events_rx) = mpsc::channel(ZONE_EVENT_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let central = Arc::new(Central::new(
        storage,
        Arc::clone(&topology) as Arc<dyn PoolTopology>,
        Arc::new(LogNotifier),
        events_tx,
    ));
    let manager = Arc::new(PoolManager::new(
        config.pool_manager.engine_settings(),
        topology,
        backends,
        Arc::new(HickoryDnsClient::new(config.pool_manager.transport)),
        cache,
        Arc::clone(&central) as Arc<dyn CentralApi>,
    ));

    let engine = tokio::spawn(Arc::clone(&manager).run(events_rx, shutdown_rx.clone()));
    let recovery = tokio::spawn(
        RecoveryLoop::new(Arc::clone(&manager), config.pool_manager.periodic_settings())
            .run(shutdown_rx.clone()),
    );
    let metrics_server = config
        .metrics
        .bind_address
        .map(|addr| tokio::spawn(serve_metrics(addr, shutdown_rx.clone())));

    seed_zones(&central, &config).await;

    info!("Pool manager running");
    shutdown_signal().await?;
    info!("Shutdown requested, waiting for in-flight cycles");

    // Receivers may already be gone if a task exited early
    shutdown_tx.send(true).ok();
    if let Err(e) = recovery.await {
        error!(error = %e, "Recovery loop task failed");
    }
    if let Err(e) = engine.await {
        error!(error = %e, "Engine task failed");
    }
    if let Some(server) = metrics_server {
        match server.await {
            Ok(Err(e)) => error!(error = %e, "Metrics server failed"),
            Err(e) => error!(error = %e, "Metrics server task failed"),
            Ok(Ok(())) => {}
        }
    }

    info!("zonepool stopped");
    Ok(())
}

/// Create every configured seed zone that does not exist yet.
async fn seed_zones(central: &Central, config: &Config) -> usize {
    let ctx = RequestContext::admin();
    let mut created = 0;

    for seed in &config.zones {
        let Some(pool_id) = seed.pool_id.or_else(|| config.pools.first().map(|p| p.id)) else {
            warn!(zone = %seed.name, "No pool to seed zone into");
            continue;
        };

        match central
            .find_domains(&ctx, &DomainCriteria::all().with_name(seed.name.as_str()))
            .await
        {
            Ok(existing) if !existing.is_empty() => {
                debug!(zone = %seed.name, "Seed zone already exists");
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                error!(zone = %seed.name, error = %e, "Failed to look up seed zone");
                continue;
            }
        }

        let mut domain = Domain::new(seed.name.as_str(), seed.tenant_id.as_str(), pool_id);
        if let Some(email) = &seed.email {
            domain.email.clone_from(email);
        }
        match central.create_domain(&ctx, domain).await {
            Ok(domain) => {
                info!(zone = %domain.name, serial = domain.serial, "Seed zone created");
                created += 1;
            }
            Err(e) => error!(zone = %seed.name, error = %e, reason = e.reason(), "Failed to create seed zone"),
        }
    }
    created
}

fn router() -> Router {
    Router::new()
        .route(METRICS_SERVER_PATH, get(metrics_handler))
        .route(HEALTH_SERVER_PATH, get(health_handler))
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn serve_metrics(addr: SocketAddr, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {addr}"))?;
    info!(address = %addr, path = METRICS_SERVER_PATH, "Serving metrics");

    axum::serve(listener, router().into_make_service())
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await?;
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received SIGINT");
            }
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }
    Ok(())
}
