mod hooks;
mod server;

use anyhow::Context;
use clap::Parser;
use hooks::BackendHooks;
use ripcord_cluster::{ClusterContext, HealthCheckScheduler, Memberlist};
use ripcord_common::ClusterConfig;
use ripcord_net::{BackendRegistry, TcpConnector};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ripcordd", version, about = "HA floating-IP failover daemon")]
struct Args {
    /// Path to the cluster configuration file
    #[arg(short, long, default_value = "/etc/ripcord/config.toml")]
    config: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting ripcordd");

    // A broken configuration is fatal: the daemon cannot take part in the
    // cluster without a valid local identity.
    let cluster_config = ClusterConfig::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    let listen_address = cluster_config
        .node_address(&cluster_config.local_hostname)
        .context("no listen address configured for the local node")?
        .to_string();

    let registry = Arc::new(BackendRegistry::from_config(
        &cluster_config.network_backend,
        &cluster_config.health_check_probes,
    )?);
    let hooks = Arc::new(BackendHooks::new(registry.clone(), cluster_config.clone()));
    let probes = registry.probes().to_vec();

    let context = ClusterContext::new(cluster_config, Arc::new(TcpConnector), hooks, probes);
    let memberlist = Arc::new(Memberlist::from_config(context.clone())?);
    info!(
        local = context.local_hostname(),
        members = memberlist.len(),
        "membership configured"
    );

    HealthCheckScheduler::new(context, memberlist.clone()).spawn();

    server::serve(&listen_address, memberlist, registry).await?;
    Ok(())
}
