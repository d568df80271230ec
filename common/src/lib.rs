pub mod error;
pub mod types;
pub mod config;

pub use error::{Result, RipcordError};
pub use types::*;
pub use config::{ClusterConfig, NodeConfig, TimingConfig};
