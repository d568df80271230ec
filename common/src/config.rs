use crate::error::{Result, RipcordError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// One configured cluster node. Order within [`ClusterConfig::nodes`] is
/// significant: the failover algorithm selects candidates round-robin in
/// this order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub hostname: String,
    /// `host:port` the node's daemon listens on
    pub address: String,
}

/// Timing parameters for the health-check protocol and failure detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Tick interval of the health-check scheduler
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,

    /// Elapsed time without an acknowledgment from the active member past
    /// which failover triggers
    #[serde(default = "default_failover_threshold_ms")]
    pub failover_threshold_ms: u64,

    /// A staleness warning is logged each time the elapsed time crosses a
    /// new multiple of this interval
    #[serde(default = "default_warning_interval_ms")]
    pub warning_interval_ms: u64,
}

fn default_health_check_interval_ms() -> u64 {
    1_000
}

fn default_failover_threshold_ms() -> u64 {
    30_000
}

fn default_warning_interval_ms() -> u64 {
    4_000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            health_check_interval_ms: default_health_check_interval_ms(),
            failover_threshold_ms: default_failover_threshold_ms(),
            warning_interval_ms: default_warning_interval_ms(),
        }
    }
}

impl TimingConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn failover_threshold(&self) -> Duration {
        Duration::from_millis(self.failover_threshold_ms)
    }

    pub fn warning_interval(&self) -> Duration {
        Duration::from_millis(self.warning_interval_ms)
    }
}

fn default_network_backend() -> String {
    "iproute".to_string()
}

/// Cluster configuration. Read-only from the core's perspective;
/// persistence and reload live outside the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Identity of this process within the membership
    pub local_hostname: String,

    /// Cluster membership in configured order
    pub nodes: Vec<NodeConfig>,

    /// Floating IP groups: group name to the IPs it owns (CIDR notation)
    #[serde(default)]
    pub groups: HashMap<String, Vec<String>>,

    /// Group-to-interface assignment per node: hostname -> group -> iface
    #[serde(default)]
    pub interfaces: HashMap<String, HashMap<String, String>>,

    #[serde(default)]
    pub timing: TimingConfig,

    /// Networking backend used to plumb floating IPs (exactly one)
    #[serde(default = "default_network_backend")]
    pub network_backend: String,

    /// Additional health-check probes consulted before failing over
    #[serde(default)]
    pub health_check_probes: Vec<String>,
}

impl ClusterConfig {
    /// Load and validate configuration from a file, with `RIPCORD__*`
    /// environment variables layered on top.
    pub fn load(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("RIPCORD").separator("__"))
            .build()
            .map_err(|e| RipcordError::Config(e.to_string()))?;

        let cluster_config: ClusterConfig = settings
            .try_deserialize()
            .map_err(|e| RipcordError::Config(e.to_string()))?;

        cluster_config.validate()?;
        Ok(cluster_config)
    }

    /// Validate the configuration. A missing local identity is fatal: the
    /// daemon cannot take part in the cluster without one.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(RipcordError::Config(
                "at least one node must be configured".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.hostname.as_str()) {
                return Err(RipcordError::Config(format!(
                    "duplicate node hostname: {}",
                    node.hostname
                )));
            }
        }

        if !seen.contains(self.local_hostname.as_str()) {
            return Err(RipcordError::UnknownIdentity(self.local_hostname.clone()));
        }

        for (hostname, assignments) in &self.interfaces {
            if !seen.contains(hostname.as_str()) {
                return Err(RipcordError::Config(format!(
                    "interface assignment references unknown node: {hostname}"
                )));
            }
            for group in assignments.keys() {
                if !self.groups.contains_key(group) {
                    return Err(RipcordError::Config(format!(
                        "node {hostname} references unknown group: {group}"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Interface assigned to `group` on `hostname`, if any
    pub fn group_interface(&self, hostname: &str, group: &str) -> Option<&str> {
        self.interfaces
            .get(hostname)?
            .get(group)
            .map(String::as_str)
    }

    /// Listen address of a configured node
    pub fn node_address(&self, hostname: &str) -> Option<&str> {
        self.nodes
            .iter()
            .find(|n| n.hostname == hostname)
            .map(|n| n.address.as_str())
    }

    /// Groups assigned to `hostname`, as (group, iface, ips) triples
    pub fn owned_groups(&self, hostname: &str) -> Vec<(String, String, Vec<String>)> {
        let Some(assignments) = self.interfaces.get(hostname) else {
            return Vec::new();
        };
        assignments
            .iter()
            .filter_map(|(group, iface)| {
                self.groups
                    .get(group)
                    .map(|ips| (group.clone(), iface.clone(), ips.clone()))
            })
            .collect()
    }
}
