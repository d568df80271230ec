use crate::context::ClusterContext;
use crate::member::Member;
use parking_lot::RwLock;
use ripcord_common::{MemberStatus, Result, RipcordError, RpcRequest, StatusRow};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Ordered collection of cluster members. Order follows configuration
/// insertion order and drives round-robin candidate selection.
///
/// The list guard protects the membership structure; each member carries
/// its own guard for its health fields. The guard is never held across an
/// RPC: decisions take a snapshot, then the RPCs run unlocked.
pub struct Memberlist {
    context: Arc<ClusterContext>,
    members: RwLock<Vec<Arc<Member>>>,
}

impl Memberlist {
    /// Create an empty memberlist
    pub fn new(context: Arc<ClusterContext>) -> Self {
        Self {
            context,
            members: RwLock::new(Vec::new()),
        }
    }

    /// Populate from the configured node order and mark every member
    /// configured (`Unconfigured → Passive`).
    pub fn from_config(context: Arc<ClusterContext>) -> Result<Self> {
        let list = Self::new(context.clone());
        for node in &context.config.nodes {
            list.add_member(&node.hostname, &node.address);
        }
        // The local identity must resolve or the daemon cannot proceed.
        list.get_local_member()?;
        list.configure();
        Ok(list)
    }

    /// Add a member, keeping insertion order. Adding an existing hostname
    /// returns the existing member unchanged.
    pub fn add_member(&self, hostname: &str, address: &str) -> Arc<Member> {
        let mut members = self.members.write();
        if let Some(existing) = members.iter().find(|m| m.hostname() == hostname) {
            return existing.clone();
        }
        let member = Arc::new(Member::new(hostname, address, self.context.clone()));
        info!(member = %hostname, address = %address, "member added");
        members.push(member.clone());
        member
    }

    /// Remove a member by hostname
    pub fn remove_member(&self, hostname: &str) {
        let mut members = self.members.write();
        members.retain(|m| m.hostname() != hostname);
        info!(member = %hostname, "member removed");
    }

    /// Clear the membership entirely (cluster dismantlement)
    pub fn reset(&self) {
        self.members.write().clear();
        info!("memberlist reset");
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// Snapshot of the membership in configured order
    pub fn members(&self) -> Vec<Arc<Member>> {
        self.members.read().clone()
    }

    /// Flip every `Unconfigured` member to `Passive` once the cluster has
    /// been configured
    pub fn configure(&self) {
        for member in self.members.read().iter() {
            if member.status() == MemberStatus::Unconfigured {
                member.transition_to(MemberStatus::Passive);
            }
        }
    }

    /// The member describing this process
    pub fn get_local_member(&self) -> Result<Arc<Member>> {
        let local_hostname = self.context.local_hostname();
        self.members
            .read()
            .iter()
            .find(|m| m.hostname() == local_hostname)
            .cloned()
            .ok_or_else(|| RipcordError::UnknownIdentity(local_hostname.to_string()))
    }

    /// The member currently observed as active, if any. `None` is a
    /// legitimate transient state right after a failure, before promotion
    /// completes.
    pub fn get_active_member(&self) -> Option<(String, Arc<Member>)> {
        self.members
            .read()
            .iter()
            .find(|m| m.status() == MemberStatus::Active)
            .map(|m| (m.hostname().to_string(), m.clone()))
    }

    pub fn get_member_by_hostname(&self, hostname: &str) -> Result<Arc<Member>> {
        self.members
            .read()
            .iter()
            .find(|m| m.hostname() == hostname)
            .cloned()
            .ok_or_else(|| RipcordError::UnknownMember(hostname.to_string()))
    }

    /// Round-robin candidate selection: scan from the position after the
    /// current active member, wrapping, and return the first `Passive`
    /// member. Only `Passive` members are promotable, so anything else
    /// (including `Unconfigured` late joiners) is skipped.
    pub fn get_next_active_member(&self) -> Result<Arc<Member>> {
        let members = self.members.read();
        if members.is_empty() {
            return Err(RipcordError::NoCandidate);
        }

        let start = members
            .iter()
            .position(|m| m.status() == MemberStatus::Active)
            .map(|i| i + 1)
            .unwrap_or(0);

        for offset in 0..members.len() {
            let member = &members[(start + offset) % members.len()];
            match member.status() {
                MemberStatus::Passive => return Ok(member.clone()),
                _ => continue,
            }
        }
        Err(RipcordError::NoCandidate)
    }

    /// Explicit promotion entry point for the admin surface. Does not
    /// demote the previous active member; that is the caller's call.
    pub async fn promote_member(&self, hostname: &str) -> Result<()> {
        let member = self.get_member_by_hostname(hostname)?;
        member.make_active().await
    }

    /// Send the same request to every member except the local one.
    /// Returns the number of peers that acknowledged.
    pub async fn broadcast(&self, request: RpcRequest) -> usize {
        let local_hostname = self.context.local_hostname().to_string();
        let peers: Vec<Arc<Member>> = self
            .members()
            .into_iter()
            .filter(|m| m.hostname() != local_hostname)
            .collect();

        let mut acknowledged = 0;
        for peer in peers {
            let result = async {
                peer.connect().await?;
                peer.send_request(&request).await
            }
            .await;
            match result {
                Ok(response) if response.success => acknowledged += 1,
                Ok(response) => {
                    warn!(member = %peer.hostname(), action = request.action(), message = %response.message, "broadcast rejected by peer");
                }
                Err(e) => {
                    warn!(member = %peer.hostname(), action = request.action(), error = %e, "broadcast failed");
                }
            }
        }
        acknowledged
    }

    /// Per-member status rows for the admin surface
    pub fn status_report(&self) -> Vec<StatusRow> {
        self.members()
            .iter()
            .map(|member| {
                let health = member.health_snapshot();
                StatusRow {
                    hostname: member.hostname().to_string(),
                    status: health.status,
                    latency_ms: health.latency.map(|d| d.as_millis() as u64),
                    last_response_age_secs: health.last_response.map(|at| at.elapsed().as_secs()),
                }
            })
            .collect()
    }

    /// The failover algorithm: promote the next eligible member after the
    /// active one stopped responding. Quorum-less and round-robin; under a
    /// network partition both sides may promote themselves, and that
    /// split-brain window is accepted. Returns true when the local
    /// staleness monitor should stop (this node became active).
    pub async fn failover(&self) -> bool {
        // The presumed-dead active member may only be slow. If an
        // auxiliary probe still reaches it, defer instead of promoting.
        if let Some((hostname, active)) = self.get_active_member() {
            for probe in &self.context.probes {
                if probe.probe(active.address()).await {
                    info!(member = %hostname, probe = probe.name(), "active member still reachable, deferring failover");
                    if let Ok(local) = self.get_local_member() {
                        local.touch_last_response();
                    }
                    return false;
                }
            }
        }

        info!("starting failover");
        loop {
            let candidate = self.get_next_active_member();
            let candidate = match candidate {
                Ok(candidate) => candidate,
                Err(_) => {
                    // Last resort: promote ourselves so the cluster never
                    // ends up with zero active nodes.
                    let local = match self.get_local_member() {
                        Ok(local) => local,
                        Err(e) => {
                            error!(error = %e, "cannot self-promote without a local member");
                            return true;
                        }
                    };
                    warn!(member = %local.hostname(), "no eligible candidate, self-promoting");
                    if let Err(e) = local.make_active().await {
                        error!(member = %local.hostname(), error = %e, "self-promotion failed");
                    }
                    return true;
                }
            };

            // Best-effort demotion: mark the silent active member
            // unavailable locally. If it was merely slow it will
            // self-correct on a later health-check round.
            if let Some((hostname, previous_active)) = self.get_active_member() {
                if hostname != candidate.hostname() {
                    previous_active.transition_to(MemberStatus::Unavailable);
                }
            }

            match candidate.make_active().await {
                Ok(()) => {
                    info!(member = %candidate.hostname(), "failover promoted new active member");
                    if candidate.is_local() {
                        return true;
                    }
                    // Watch the newly promoted member from a fresh
                    // baseline so the detector does not re-trigger
                    // immediately.
                    if let Ok(local) = self.get_local_member() {
                        local.touch_last_response();
                    }
                    return false;
                }
                Err(e) => {
                    warn!(member = %candidate.hostname(), error = %e, "promotion failed, trying next candidate");
                    candidate.transition_to(MemberStatus::Unavailable);
                }
            }
        }
    }
}

impl std::fmt::Debug for Memberlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memberlist")
            .field("members", &self.members())
            .finish()
    }
}
