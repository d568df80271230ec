use serde::{Deserialize, Serialize};

/// Unique identifier for a member within the cluster
pub type Hostname = String;

/// Observable state of a cluster member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    /// Member exists but the cluster has not been configured yet
    Unconfigured,

    /// Member is on standby, monitoring the active member's liveness
    Passive,

    /// Member currently owns and serves the floating IP groups
    Active,

    /// Member is presumed unreachable based on health-check or connection failure
    Unavailable,
}

impl MemberStatus {
    /// Whether moving from `self` to `next` is a legal state-machine transition.
    ///
    /// Legal moves: `Unconfigured→Passive`, `Passive⇄Active`,
    /// `{Passive,Active}→Unavailable`, `Unavailable→{Passive,Active}`.
    pub fn can_transition_to(self, next: MemberStatus) -> bool {
        use MemberStatus::*;
        matches!(
            (self, next),
            (Unconfigured, Passive)
                | (Passive, Active)
                | (Active, Passive)
                | (Passive, Unavailable)
                | (Active, Unavailable)
                | (Unavailable, Passive)
                | (Unavailable, Active)
        )
    }
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberStatus::Unconfigured => write!(f, "unconfigured"),
            MemberStatus::Passive => write!(f, "passive"),
            MemberStatus::Active => write!(f, "active"),
            MemberStatus::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// RPC request exchanged between members.
///
/// One frame per request; the receiving member replies with a single
/// [`RpcResponse`] frame on the same connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RpcRequest {
    /// Liveness probe from the active member
    HealthCheck { sender: Hostname },

    /// Make the named member the active node
    Promote { member: Hostname },

    /// Demote the named member to standby
    MakePassive { member: Hostname },

    /// Bring up floating IPs on an interface
    BringUpIp { iface: String, ips: Vec<String> },

    /// Take down floating IPs from an interface
    BringDownIp { iface: String, ips: Vec<String> },
}

impl RpcRequest {
    /// Short action name, used for logging
    pub fn action(&self) -> &'static str {
        match self {
            RpcRequest::HealthCheck { .. } => "health_check",
            RpcRequest::Promote { .. } => "promote",
            RpcRequest::MakePassive { .. } => "make_passive",
            RpcRequest::BringUpIp { .. } => "bring_up_ip",
            RpcRequest::BringDownIp { .. } => "bring_down_ip",
        }
    }
}

/// RPC reply. Opaque to the core beyond success/failure and a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MemberStatus>,
}

impl RpcResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: String::new(),
            status: None,
        }
    }

    pub fn ok_with_status(status: MemberStatus) -> Self {
        Self {
            success: true,
            message: String::new(),
            status: Some(status),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            status: None,
        }
    }
}

/// One row of the per-member status report exposed to the admin surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRow {
    pub hostname: Hostname,
    pub status: MemberStatus,
    /// Round-trip time of the most recent health check, if any
    pub latency_ms: Option<u64>,
    /// Seconds since the last successful health-check round trip
    pub last_response_age_secs: Option<u64>,
}
