use crate::context::ClusterContext;
use crate::memberlist::Memberlist;
use parking_lot::Mutex;
use ripcord_common::{MemberStatus, Result, RipcordError, RpcRequest, RpcResponse};
use ripcord_net::Transport;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Health-related fields of a member, mutated as one unit under a single
/// guard so that status, latency, and last-response never tear.
#[derive(Debug, Clone)]
pub struct MemberHealth {
    pub status: MemberStatus,
    /// Round trip of the most recent health check; advisory only
    pub latency: Option<Duration>,
    /// When the last successful health-check round trip involving this
    /// member completed. `None` means never.
    pub last_response: Option<Instant>,
    /// True while a health-check round for this member is in flight
    pub health_check_busy: bool,
    /// Highest warning-interval multiple already logged by the monitor
    warned_multiple: u32,
}

impl MemberHealth {
    fn new() -> Self {
        Self {
            status: MemberStatus::Unconfigured,
            latency: None,
            last_response: None,
            health_check_busy: false,
            warned_multiple: 0,
        }
    }
}

/// Per-node record: identity, state machine, and the RPC proxy to that
/// node. Owned by the [`Memberlist`]; cross-member operations go through
/// the list, never through direct member-to-member references.
pub struct Member {
    hostname: String,
    address: String,
    context: Arc<ClusterContext>,
    health: Mutex<MemberHealth>,
    /// Lazily established, exclusively owned transport handle
    connection: tokio::sync::Mutex<Option<Box<dyn Transport>>>,
}

impl Member {
    pub fn new(hostname: impl Into<String>, address: impl Into<String>, context: Arc<ClusterContext>) -> Self {
        Self {
            hostname: hostname.into(),
            address: address.into(),
            context,
            health: Mutex::new(MemberHealth::new()),
            connection: tokio::sync::Mutex::new(None),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether this record describes the local process
    pub fn is_local(&self) -> bool {
        self.hostname == self.context.local_hostname()
    }

    pub fn status(&self) -> MemberStatus {
        self.health.lock().status
    }

    /// Consistent snapshot of the health fields
    pub fn health_snapshot(&self) -> MemberHealth {
        self.health.lock().clone()
    }

    /// Apply a status transition if the state machine allows it.
    /// Moving to `Active` also clears latency and last-response as part of
    /// the same composite update.
    pub fn transition_to(&self, next: MemberStatus) -> bool {
        let mut health = self.health.lock();
        if health.status == next {
            return true;
        }
        if !health.status.can_transition_to(next) {
            warn!(
                member = %self.hostname,
                from = %health.status,
                to = %next,
                "illegal status transition rejected"
            );
            return false;
        }
        debug!(member = %self.hostname, from = %health.status, to = %next, "status transition");
        health.status = next;
        if next == MemberStatus::Active {
            health.latency = None;
            health.last_response = None;
            health.warned_multiple = 0;
        }
        true
    }

    /// Record a received acknowledgment now; resets the staleness warnings
    pub fn touch_last_response(&self) {
        let mut health = self.health.lock();
        health.last_response = Some(Instant::now());
        health.warned_multiple = 0;
    }

    /// Acquire the per-member busy guard. Returns false if a round is
    /// already in flight.
    fn try_begin_health_check(&self) -> bool {
        let mut health = self.health.lock();
        if health.health_check_busy {
            return false;
        }
        health.health_check_busy = true;
        true
    }

    fn end_health_check(&self) {
        self.health.lock().health_check_busy = false;
    }

    /// Establish the transport connection if absent or shut down.
    /// Idempotent.
    pub async fn connect(&self) -> Result<()> {
        let mut connection = self.connection.lock().await;
        let needs_connect = match connection.as_ref() {
            Some(transport) => !transport.is_open(),
            None => true,
        };
        if needs_connect {
            let transport = self
                .context
                .connector
                .connect(&self.address, &self.hostname)
                .await?;
            *connection = Some(transport);
            debug!(member = %self.hostname, address = %self.address, "connected");
        }
        Ok(())
    }

    async fn close_connection(&self) {
        if let Some(mut transport) = self.connection.lock().await.take() {
            transport.close().await;
        }
    }

    /// Send one request over the established connection. Fails with
    /// `NotConnected` if [`Member::connect`] has not been called.
    pub async fn send_request(&self, request: &RpcRequest) -> Result<RpcResponse> {
        let mut connection = self.connection.lock().await;
        let transport = connection.as_mut().ok_or(RipcordError::NotConnected)?;
        transport.send(request).await
    }

    /// Send a health check and measure the round trip. Requires an
    /// established connection.
    pub async fn send_health_check(&self) -> Result<RpcResponse> {
        let request = RpcRequest::HealthCheck {
            sender: self.context.local_hostname().to_string(),
        };
        let started = Instant::now();
        let response = self.send_request(&request).await?;
        let round_trip = started.elapsed();

        let mut health = self.health.lock();
        health.latency = Some(round_trip);
        health.last_response = Some(Instant::now());
        health.warned_multiple = 0;
        Ok(response)
    }

    /// One guarded health-check round against this member. Transport
    /// failures are absorbed: the member becomes `Unavailable` and its
    /// connection is closed. The busy guard is cleared on every path.
    pub async fn run_health_check_round(&self) {
        if !self.try_begin_health_check() {
            debug!(member = %self.hostname, "health check already in flight, skipping");
            return;
        }

        let outcome = async {
            self.connect().await?;
            self.send_health_check().await
        }
        .await;

        // The guard stays held until the outcome is fully handled, so a
        // next-tick round cannot connect while a failed round is still
        // tearing its connection down.
        match outcome {
            Ok(_) => {
                if self.status() == MemberStatus::Unavailable {
                    info!(member = %self.hostname, "member responding again");
                    self.transition_to(MemberStatus::Passive);
                }
            }
            Err(e) => {
                warn!(member = %self.hostname, error = %e, "health check failed");
                self.close_connection().await;
                self.transition_to(MemberStatus::Unavailable);
            }
        }
        self.end_health_check();
    }

    /// Make this member the active node. Local members run the activation
    /// side effects; remote members are sent a promote RPC. On any failure
    /// the status is left unchanged and the error is surfaced to the
    /// caller, who decides whether to retry against a different candidate.
    pub async fn make_active(&self) -> Result<()> {
        debug!(member = %self.hostname, "making active");
        if self.is_local() {
            self.context.hooks.activate_local().await?;
        } else {
            self.connect().await?;
            let response = self
                .send_request(&RpcRequest::Promote {
                    member: self.hostname.clone(),
                })
                .await?;
            if !response.success {
                return Err(RipcordError::Transport(response.message));
            }
        }

        if !self.transition_to(MemberStatus::Active) {
            return Err(RipcordError::IllegalTransition {
                member: self.hostname.clone(),
                from: self.status(),
                to: MemberStatus::Active,
            });
        }
        info!(member = %self.hostname, "member is now active");
        Ok(())
    }

    /// Symmetric to [`Member::make_active`]
    pub async fn make_passive(&self) -> Result<()> {
        debug!(member = %self.hostname, "making passive");
        if self.is_local() {
            self.context.hooks.deactivate_local().await?;
        } else {
            self.connect().await?;
            let response = self
                .send_request(&RpcRequest::MakePassive {
                    member: self.hostname.clone(),
                })
                .await?;
            if !response.success {
                return Err(RipcordError::Transport(response.message));
            }
        }

        if !self.transition_to(MemberStatus::Passive) {
            return Err(RipcordError::IllegalTransition {
                member: self.hostname.clone(),
                from: self.status(),
                to: MemberStatus::Passive,
            });
        }
        info!(member = %self.hostname, "member is now passive");
        Ok(())
    }

    /// Bring up a set of IPs belonging to `group` on this member. The
    /// interface comes from the group-to-interface assignment for this
    /// member's hostname.
    pub async fn bring_up_ips(&self, ips: &[String], group: &str) -> Result<()> {
        let iface = self
            .context
            .config
            .group_interface(&self.hostname, group)
            .ok_or_else(|| {
                RipcordError::Config(format!(
                    "no interface assigned to group {group} on {}",
                    self.hostname
                ))
            })?
            .to_string();

        if self.is_local() {
            self.context.hooks.bring_up_interface_ips(&iface, ips).await
        } else {
            self.connect().await?;
            let response = self
                .send_request(&RpcRequest::BringUpIp {
                    iface,
                    ips: ips.to_vec(),
                })
                .await?;
            if !response.success {
                return Err(RipcordError::Transport(response.message));
            }
            Ok(())
        }
    }

    /// Staleness monitor for received health checks, run on the local
    /// member while it is passive. Warns as the silence grows; once the
    /// failure threshold is reached, hands over to the failover algorithm.
    /// Returns true when monitoring should stop (this node became active).
    pub async fn monitor_received_health_checks(&self, list: &Memberlist) -> bool {
        let timing = &self.context.config.timing;

        let elapsed = {
            let mut health = self.health.lock();
            match health.last_response {
                Some(at) => at.elapsed(),
                None => {
                    // First observation: baseline the detector from now.
                    health.last_response = Some(Instant::now());
                    Duration::ZERO
                }
            }
        };

        if elapsed >= timing.failover_threshold() {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = timing.failover_threshold_ms,
                "no acknowledgment from the active member within the failure threshold"
            );
            return list.failover().await;
        }

        let warn_every = timing.warning_interval();
        if !warn_every.is_zero() {
            let multiple = (elapsed.as_millis() / warn_every.as_millis()) as u32;
            let mut health = self.health.lock();
            if multiple >= 1 && multiple > health.warned_multiple {
                health.warned_multiple = multiple;
                drop(health);
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "no health checks received, a failover may be required"
                );
            }
        }

        false
    }
}

impl std::fmt::Debug for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Member")
            .field("hostname", &self.hostname)
            .field("address", &self.address)
            .field("health", &self.health_snapshot())
            .finish()
    }
}
