//! In-memory transport, activation, and probe doubles for cluster tests.

use crate::context::{ActivationHooks, ClusterContext};
use async_trait::async_trait;
use parking_lot::Mutex;
use ripcord_common::{
    ClusterConfig, MemberStatus, NodeConfig, Result, RipcordError, RpcRequest, RpcResponse,
    TimingConfig,
};
use ripcord_net::{Connector, HealthCheckProbe, Transport};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct MockNetState {
    requests: Vec<(String, RpcRequest)>,
    refuse_connect: HashSet<String>,
    send_failure: HashSet<String>,
    delay: HashMap<String, Duration>,
    close_delay: HashMap<String, Duration>,
    connect_count: HashMap<String, usize>,
    in_flight: HashMap<String, usize>,
    max_in_flight: HashMap<String, usize>,
}

/// Shared fake network: records per-peer traffic and injects failures
pub struct MockNet {
    state: Mutex<MockNetState>,
}

impl MockNet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockNetState::default()),
        })
    }

    pub fn set_refuse_connect(&self, hostname: &str, on: bool) {
        let mut state = self.state.lock();
        if on {
            state.refuse_connect.insert(hostname.to_string());
        } else {
            state.refuse_connect.remove(hostname);
        }
    }

    pub fn set_send_failure(&self, hostname: &str, on: bool) {
        let mut state = self.state.lock();
        if on {
            state.send_failure.insert(hostname.to_string());
        } else {
            state.send_failure.remove(hostname);
        }
    }

    pub fn set_delay(&self, hostname: &str, delay: Duration) {
        self.state.lock().delay.insert(hostname.to_string(), delay);
    }

    pub fn set_close_delay(&self, hostname: &str, delay: Duration) {
        self.state
            .lock()
            .close_delay
            .insert(hostname.to_string(), delay);
    }

    /// Requests successfully delivered to a peer
    pub fn requests_to(&self, hostname: &str) -> Vec<RpcRequest> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|(host, _)| host == hostname)
            .map(|(_, request)| request.clone())
            .collect()
    }

    pub fn connect_count(&self, hostname: &str) -> usize {
        self.state
            .lock()
            .connect_count
            .get(hostname)
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of concurrently in-flight sends observed for a peer
    pub fn max_in_flight(&self, hostname: &str) -> usize {
        self.state
            .lock()
            .max_in_flight
            .get(hostname)
            .copied()
            .unwrap_or(0)
    }
}

pub struct MockConnector {
    net: Arc<MockNet>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _address: &str, identity: &str) -> Result<Box<dyn Transport>> {
        let mut state = self.net.state.lock();
        if state.refuse_connect.contains(identity) {
            return Err(RipcordError::Transport(format!(
                "mock refused connect to {identity}"
            )));
        }
        *state.connect_count.entry(identity.to_string()).or_default() += 1;
        drop(state);

        Ok(Box::new(MockTransport {
            host: identity.to_string(),
            net: self.net.clone(),
            open: true,
        }))
    }
}

pub struct MockTransport {
    host: String,
    net: Arc<MockNet>,
    open: bool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, request: &RpcRequest) -> Result<RpcResponse> {
        let delay = {
            let mut state = self.net.state.lock();
            let current = {
                let in_flight = state.in_flight.entry(self.host.clone()).or_default();
                *in_flight += 1;
                *in_flight
            };
            let max = state.max_in_flight.entry(self.host.clone()).or_default();
            if current > *max {
                *max = current;
            }
            state.delay.get(&self.host).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.net.state.lock();
        if let Some(in_flight) = state.in_flight.get_mut(&self.host) {
            *in_flight -= 1;
        }
        if state.send_failure.contains(&self.host) {
            return Err(RipcordError::Transport(format!(
                "mock send failure to {}",
                self.host
            )));
        }
        state.requests.push((self.host.clone(), request.clone()));
        Ok(RpcResponse::ok_with_status(MemberStatus::Passive))
    }

    async fn close(&mut self) {
        let delay = self.net.state.lock().close_delay.get(&self.host).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Activation hooks that record invocations instead of touching interfaces
pub struct RecordingHooks {
    events: Mutex<Vec<String>>,
}

impl RecordingHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl ActivationHooks for RecordingHooks {
    async fn activate_local(&self) -> Result<()> {
        self.events.lock().push("activate_local".to_string());
        Ok(())
    }

    async fn deactivate_local(&self) -> Result<()> {
        self.events.lock().push("deactivate_local".to_string());
        Ok(())
    }

    async fn bring_up_interface_ips(&self, iface: &str, ips: &[String]) -> Result<()> {
        self.events
            .lock()
            .push(format!("bring_up {iface} {}", ips.join(",")));
        Ok(())
    }

    async fn bring_down_interface_ips(&self, iface: &str, ips: &[String]) -> Result<()> {
        self.events
            .lock()
            .push(format!("bring_down {iface} {}", ips.join(",")));
        Ok(())
    }
}

/// Probe that always reports the target alive
pub struct AlwaysAliveProbe;

#[async_trait]
impl HealthCheckProbe for AlwaysAliveProbe {
    fn name(&self) -> &str {
        "always-alive"
    }

    async fn probe(&self, _address: &str) -> bool {
        true
    }
}

/// Everything a cluster test needs: a context wired to the fake network
/// and recording hooks, with short timings.
pub struct TestHarness {
    pub context: Arc<ClusterContext>,
    pub net: Arc<MockNet>,
    pub hooks: Arc<RecordingHooks>,
}

impl TestHarness {
    pub fn new(local: &str, nodes: &[(&str, &str)]) -> Self {
        let net = MockNet::new();
        let hooks = RecordingHooks::new();

        let config = ClusterConfig {
            local_hostname: local.to_string(),
            nodes: nodes
                .iter()
                .map(|(hostname, address)| NodeConfig {
                    hostname: hostname.to_string(),
                    address: address.to_string(),
                })
                .collect(),
            groups: HashMap::from([("group-1".to_string(), vec!["10.0.0.5/24".to_string()])]),
            interfaces: HashMap::from([(
                "node-a".to_string(),
                HashMap::from([("group-1".to_string(), "eth0".to_string())]),
            )]),
            timing: TimingConfig {
                health_check_interval_ms: 20,
                failover_threshold_ms: 50,
                warning_interval_ms: 25,
            },
            network_backend: "noop".to_string(),
            health_check_probes: Vec::new(),
        };

        let context = ClusterContext::new(
            config,
            Arc::new(MockConnector { net: net.clone() }),
            hooks.clone(),
            Vec::new(),
        );

        Self {
            context,
            net,
            hooks,
        }
    }

    pub fn two_nodes() -> Self {
        Self::new(
            "node-a",
            &[("node-a", "127.0.0.1:7331"), ("node-b", "127.0.0.1:7332")],
        )
    }

    pub fn with_probe(mut self, probe: impl HealthCheckProbe + 'static) -> Self {
        let mut probes = self.context.probes.clone();
        probes.push(Arc::new(probe));
        self.context = ClusterContext::new(
            self.context.config.clone(),
            self.context.connector.clone(),
            self.context.hooks.clone(),
            probes,
        );
        self
    }
}
