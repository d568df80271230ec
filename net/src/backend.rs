//! Statically-registered networking and health-check capabilities.
//!
//! The registry enforces the capability model: exactly one networking
//! backend (plumbs floating IPs onto interfaces) and zero-or-more
//! health-check probes (auxiliary liveness checks consulted before a
//! failover), both selected by configuration.

use async_trait::async_trait;
use ripcord_common::{Result, RipcordError};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Brings floating IPs up and down on local interfaces
#[async_trait]
pub trait NetworkBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn bring_up_ips(&self, iface: &str, ips: &[String]) -> Result<()>;

    async fn bring_down_ips(&self, iface: &str, ips: &[String]) -> Result<()>;
}

/// Auxiliary liveness probe against a remote member
#[async_trait]
pub trait HealthCheckProbe: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the member at `address` looks alive
    async fn probe(&self, address: &str) -> bool;
}

/// Holds the selected capabilities. Exactly one networking backend by
/// construction.
pub struct BackendRegistry {
    network: Arc<dyn NetworkBackend>,
    probes: Vec<Arc<dyn HealthCheckProbe>>,
}

impl BackendRegistry {
    pub fn new(network: Arc<dyn NetworkBackend>) -> Self {
        Self {
            network,
            probes: Vec::new(),
        }
    }

    /// Build a registry from configured backend and probe names
    pub fn from_config(network_backend: &str, probe_names: &[String]) -> Result<Self> {
        let network: Arc<dyn NetworkBackend> = match network_backend {
            "iproute" => Arc::new(IprouteBackend),
            "noop" => Arc::new(NoopBackend),
            other => {
                return Err(RipcordError::Config(format!(
                    "unknown network backend: {other}"
                )))
            }
        };

        let mut registry = Self::new(network);
        for name in probe_names {
            match name.as_str() {
                "tcp" => registry.register_probe(Arc::new(TcpProbe)),
                other => {
                    return Err(RipcordError::Config(format!(
                        "unknown health-check probe: {other}"
                    )))
                }
            }
        }

        info!(
            network = registry.network.name(),
            probes = registry.probes.len(),
            "backends registered"
        );
        Ok(registry)
    }

    pub fn register_probe(&mut self, probe: Arc<dyn HealthCheckProbe>) {
        self.probes.push(probe);
    }

    pub fn network(&self) -> Arc<dyn NetworkBackend> {
        self.network.clone()
    }

    pub fn probes(&self) -> &[Arc<dyn HealthCheckProbe>] {
        &self.probes
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("network", &self.network.name())
            .field("probes", &self.probes.len())
            .finish()
    }
}

/// Networking backend shelling out to iproute2 (`ip addr add/del`)
pub struct IprouteBackend;

impl IprouteBackend {
    async fn run_ip(&self, args: &[&str]) -> Result<()> {
        let output = Command::new("ip").args(args).output().await?;
        if !output.status.success() {
            return Err(RipcordError::Backend(format!(
                "ip {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkBackend for IprouteBackend {
    fn name(&self) -> &str {
        "iproute"
    }

    async fn bring_up_ips(&self, iface: &str, ips: &[String]) -> Result<()> {
        for ip in ips {
            info!(ip = %ip, iface = %iface, "bringing up floating IP");
            self.run_ip(&["addr", "add", ip, "dev", iface]).await?;
        }
        Ok(())
    }

    async fn bring_down_ips(&self, iface: &str, ips: &[String]) -> Result<()> {
        for ip in ips {
            info!(ip = %ip, iface = %iface, "taking down floating IP");
            // A missing address is not an error worth failing a demotion for.
            if let Err(e) = self.run_ip(&["addr", "del", ip, "dev", iface]).await {
                warn!(ip = %ip, iface = %iface, error = %e, "failed to remove address");
            }
        }
        Ok(())
    }
}

/// No-op networking backend for tests and dry runs
pub struct NoopBackend;

#[async_trait]
impl NetworkBackend for NoopBackend {
    fn name(&self) -> &str {
        "noop"
    }

    async fn bring_up_ips(&self, iface: &str, ips: &[String]) -> Result<()> {
        debug!(iface = %iface, count = ips.len(), "noop backend: bring up");
        Ok(())
    }

    async fn bring_down_ips(&self, iface: &str, ips: &[String]) -> Result<()> {
        debug!(iface = %iface, count = ips.len(), "noop backend: bring down");
        Ok(())
    }
}

/// Probe that considers a member alive if its daemon port accepts a TCP
/// connection
pub struct TcpProbe;

#[async_trait]
impl HealthCheckProbe for TcpProbe {
    fn name(&self) -> &str {
        "tcp"
    }

    async fn probe(&self, address: &str) -> bool {
        matches!(
            tokio::time::timeout(PROBE_TIMEOUT, tokio::net::TcpStream::connect(address)).await,
            Ok(Ok(_))
        )
    }
}
