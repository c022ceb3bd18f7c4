//! Watch-driven leader election over a hierarchical coordination service.
//!
//! One process among a group of competing candidates is deterministically
//! and exclusively elected leader; when the leader disappears (crash,
//! partition, clean exit) the next candidate in registration order takes
//! over automatically.
//!
//! The library consumes a [`CoordinationSession`], a live client for a
//! ZooKeeper-class service providing ephemeral session-scoped nodes,
//! sequential naming, and one-shot child watches, and layers the election
//! protocol on top:
//!
//! - each candidate registers one ephemeral, sequentially named candidacy
//!   node under a shared election path;
//! - the candidate owning the smallest sequence suffix is the leader;
//! - every child change (and every session re-establishment) triggers a
//!   re-evaluation, and the transition into leadership invokes a
//!   caller-supplied hook exactly once per tenure.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ballot::{ElectionCoordinator, ElectionPath};
//!
//! let session: Arc<dyn ballot::CoordinationSession> = connect_somehow();
//! let path = ElectionPath::new("/apps/workers/election")?;
//!
//! let coordinator = ElectionCoordinator::builder(session, path)
//!     .on_elected(|| tracing::info!("this process now leads"))
//!     .start()
//!     .await?;
//!
//! if coordinator.is_leading() {
//!     // run leader-only work
//! }
//! ```
//!
//! Bootstrap (connecting the session, keeping the process alive so watches
//! keep firing) stays with the host program.

pub mod election;

pub use ballot_core::{
    CandidateName, CandidateSet, CoordinationSession, CreateMode, ElectionError, ElectionPath,
    Result, SessionState,
};
pub use election::{
    ChildrenSubscription, ElectionBuilder, ElectionConfig, ElectionCoordinator,
    LeadershipSnapshot, LeadershipState,
};
