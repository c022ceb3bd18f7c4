//! Core contracts and data model for ballot leader elections.
//!
//! This crate defines everything the election runtime consumes but does not
//! implement itself: the [`CoordinationSession`] contract a coordination
//! service client must satisfy, the candidate ordering rules, the election
//! path rules, and the shared error taxonomy.
//!
//! The `testing` feature adds an in-memory coordination service
//! ([`testing::MemoryCluster`]) for exercising elections without a live
//! cluster.

pub mod candidate;
pub mod error;
pub mod path;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use candidate::{CandidateName, CandidateSet};
pub use error::{ElectionError, Result};
pub use path::ElectionPath;
pub use session::{CoordinationSession, CreateMode, SessionState};
