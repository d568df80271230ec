use crate::types::MemberStatus;
use thiserror::Error;

/// Errors surfaced by the ripcord daemon and its cluster core.
#[derive(Debug, Error)]
pub enum RipcordError {
    #[error("health check attempted with no established connection")]
    NotConnected,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("no eligible member to promote")]
    NoCandidate,

    #[error("member {member} cannot move from {from} to {to}")]
    IllegalTransition {
        member: String,
        from: MemberStatus,
        to: MemberStatus,
    },

    #[error("unknown member: {0}")]
    UnknownMember(String),

    #[error("local hostname '{0}' is not part of the cluster membership")]
    UnknownIdentity(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("network backend failure: {0}")]
    Backend(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type alias for ripcord operations
pub type Result<T> = std::result::Result<T, RipcordError>;
