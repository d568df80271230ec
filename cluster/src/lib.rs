pub mod context;
pub mod member;
pub mod memberlist;
pub mod scheduler;

pub use context::{ActivationHooks, ClusterContext};
pub use member::{Member, MemberHealth};
pub use memberlist::Memberlist;
pub use scheduler::HealthCheckScheduler;

#[cfg(test)]
pub(crate) mod testutil;
