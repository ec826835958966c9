//! Proxy configuration agent.
//!
//! Keeps a live configuration snapshot for every connect proxy registered
//! on this agent and streams snapshots to subscribers.
//!
//! # Architecture Overview
//!
//! ```text
//!   services file ──▶ ServicesWatcher ──▶ LocalState ──┐ change signal
//!                              │                       ▼
//!                              └──▶ MemoryCache    Manager::run
//!                                        │             │ ensure / remove
//!                                        ▼             ▼
//!                                   CachedState ──▶ forwarding task
//!                                                      │ broadcast
//!                                                      ▼
//!                                               watchers (--watch)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use proxycfg::config::{load_config, AgentConfig};
use proxycfg::lifecycle::signals::shutdown_signal;
use proxycfg::lifecycle::{Agent, Shutdown};
use proxycfg::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "proxycfg-agent")]
#[command(about = "Keeps sidecar proxy configuration snapshots up to date", long_about = None)]
struct Cli {
    /// Agent configuration file (TOML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Services file, overrides `registry.services_path`.
    #[arg(short, long)]
    services: Option<PathBuf>,

    /// Proxy id to watch. May be repeated.
    #[arg(short, long = "watch")]
    watch: Vec<String>,

    /// Print received snapshots as JSON.
    #[arg(long)]
    json: bool,

    /// Log level override.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AgentConfig::default(),
    };
    if let Some(path) = &cli.services {
        config.registry.services_path = Some(path.display().to_string());
    }
    config.watch.proxies.extend(cli.watch.iter().cloned());
    config.watch.print_json |= cli.json;
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    logging::init(&config.observability);
    tracing::info!("proxycfg-agent v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let agent = Agent::start(&config)?;
    let shutdown = Shutdown::new();

    let manager = agent.manager.clone();
    let run_handle = tokio::spawn(async move { manager.run().await });

    let mut subscribers = Vec::new();
    for proxy_id in config.watch.proxies.clone() {
        let manager = agent.manager.clone();
        let mut stop = shutdown.subscribe();
        let print_json = config.watch.print_json;

        subscribers.push(tokio::spawn(async move {
            let (mut snapshots, cancel) = manager.watch(&proxy_id).await;
            tracing::info!(proxy_id = %proxy_id, "Watching proxy");

            loop {
                tokio::select! {
                    _ = stop.wait() => break,
                    received = snapshots.recv() => match received {
                        Some(snapshot) => {
                            tracing::info!(
                                proxy_id = %snapshot.proxy_id,
                                upstreams = snapshot.proxy.upstreams.len(),
                                complete = snapshot.is_complete(),
                                "Snapshot received"
                            );
                            if print_json {
                                match serde_json::to_string(&*snapshot) {
                                    Ok(line) => println!("{}", line),
                                    Err(e) => tracing::error!(error = %e, "Failed to encode snapshot"),
                                }
                            }
                        }
                        // Manager closed the queue.
                        None => break,
                    },
                }
            }
            cancel.cancel().await;
        }));
    }

    shutdown_signal().await;
    shutdown.trigger();
    agent.manager.close().await;

    for subscriber in subscribers {
        let _ = subscriber.await;
    }
    match run_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Manager exited with error"),
        Err(e) => tracing::error!(error = %e, "Manager task failed"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
