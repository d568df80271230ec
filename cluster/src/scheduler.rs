use crate::context::ClusterContext;
use crate::memberlist::Memberlist;
use ripcord_common::MemberStatus;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Periodic driver for the health-check protocol. One loop, two roles per
/// tick: the active node fans out health checks to every peer; a passive
/// node runs the staleness monitor that eventually triggers failover.
pub struct HealthCheckScheduler {
    context: Arc<ClusterContext>,
    memberlist: Arc<Memberlist>,
}

impl HealthCheckScheduler {
    pub fn new(context: Arc<ClusterContext>, memberlist: Arc<Memberlist>) -> Self {
        Self {
            context,
            memberlist,
        }
    }

    /// Run the scheduler on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    pub async fn run(&self) {
        let interval = self.context.config.timing.health_check_interval();
        info!(
            interval_ms = self.context.config.timing.health_check_interval_ms,
            "health-check scheduler started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One scheduler tick
    pub(crate) async fn tick(&self) {
        let local = match self.memberlist.get_local_member() {
            Ok(local) => local,
            Err(e) => {
                error!(error = %e, "scheduler cannot resolve the local member");
                return;
            }
        };

        if local.status() == MemberStatus::Active {
            self.fan_out(local.hostname());
        } else {
            let stop = local.monitor_received_health_checks(&self.memberlist).await;
            if stop {
                debug!("staleness monitor stopped, local node is now active");
            }
        }
    }

    /// Fan out health checks to every other member, one task per member.
    /// A slow round against one member never blocks the others, and the
    /// per-member busy guard keeps rounds against the same member from
    /// overlapping across ticks.
    fn fan_out(&self, local_hostname: &str) {
        for member in self.memberlist.members() {
            if member.hostname() == local_hostname {
                continue;
            }
            tokio::spawn(async move { member.run_health_check_round().await });
        }
    }
}
