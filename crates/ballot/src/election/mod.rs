mod config;
mod coordinator;
mod state;
mod subscription;

pub use config::ElectionConfig;
pub use coordinator::{ElectionBuilder, ElectionCoordinator};
pub use state::{LeadershipSnapshot, LeadershipState};
pub use subscription::ChildrenSubscription;
