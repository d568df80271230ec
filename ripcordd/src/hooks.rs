use async_trait::async_trait;
use ripcord_cluster::ActivationHooks;
use ripcord_common::{ClusterConfig, Result};
use ripcord_net::BackendRegistry;
use std::sync::Arc;
use tracing::info;

/// Activation hooks wired to the configured networking backend: gaining
/// the active role brings up every floating IP group assigned to this
/// host, losing it takes them down again.
pub struct BackendHooks {
    registry: Arc<BackendRegistry>,
    config: ClusterConfig,
}

impl BackendHooks {
    pub fn new(registry: Arc<BackendRegistry>, config: ClusterConfig) -> Self {
        Self { registry, config }
    }
}

#[async_trait]
impl ActivationHooks for BackendHooks {
    async fn activate_local(&self) -> Result<()> {
        for (group, iface, ips) in self.config.owned_groups(&self.config.local_hostname) {
            info!(group = %group, iface = %iface, ips = ips.len(), "bringing up floating IP group");
            self.registry.network().bring_up_ips(&iface, &ips).await?;
        }
        Ok(())
    }

    async fn deactivate_local(&self) -> Result<()> {
        for (group, iface, ips) in self.config.owned_groups(&self.config.local_hostname) {
            info!(group = %group, iface = %iface, ips = ips.len(), "taking down floating IP group");
            self.registry.network().bring_down_ips(&iface, &ips).await?;
        }
        Ok(())
    }

    async fn bring_up_interface_ips(&self, iface: &str, ips: &[String]) -> Result<()> {
        self.registry.network().bring_up_ips(iface, ips).await
    }

    async fn bring_down_interface_ips(&self, iface: &str, ips: &[String]) -> Result<()> {
        self.registry.network().bring_down_ips(iface, ips).await
    }
}
