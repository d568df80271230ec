use async_trait::async_trait;
use ripcord_common::{ClusterConfig, Result};
use ripcord_net::{Connector, HealthCheckProbe};
use std::sync::Arc;

/// Side effects applied to this host when it gains or loses the active
/// role. The daemon wires these to the configured networking backend;
/// tests substitute a recording implementation.
#[async_trait]
pub trait ActivationHooks: Send + Sync {
    /// Bring up every floating IP group owned by the local node
    async fn activate_local(&self) -> Result<()>;

    /// Take down every floating IP group owned by the local node
    async fn deactivate_local(&self) -> Result<()>;

    async fn bring_up_interface_ips(&self, iface: &str, ips: &[String]) -> Result<()>;

    async fn bring_down_interface_ips(&self, iface: &str, ips: &[String]) -> Result<()>;
}

/// Explicitly constructed dependencies shared by every component of the
/// cluster core. Configuration is read-only here; structural changes go
/// through the [`crate::Memberlist`].
pub struct ClusterContext {
    pub config: ClusterConfig,
    pub connector: Arc<dyn Connector>,
    pub hooks: Arc<dyn ActivationHooks>,
    /// Auxiliary probes consulted before declaring the active member dead
    pub probes: Vec<Arc<dyn HealthCheckProbe>>,
}

impl ClusterContext {
    pub fn new(
        config: ClusterConfig,
        connector: Arc<dyn Connector>,
        hooks: Arc<dyn ActivationHooks>,
        probes: Vec<Arc<dyn HealthCheckProbe>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            connector,
            hooks,
            probes,
        })
    }

    pub fn local_hostname(&self) -> &str {
        &self.config.local_hostname
    }
}
