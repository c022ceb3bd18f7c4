//! Testing utilities for election consumers.
//!
//! The centerpiece is [`MemoryCluster`], an in-memory stand-in for the
//! coordination service: a hierarchical namespace with ephemeral ownership,
//! sequential naming, one-shot child watches, and per-session state
//! transitions. Fault injection (`expire`, `suspend`, `restore`) drives the
//! session-loss paths that are hard to provoke against a real cluster.
//!
//! # Example
//!
//! ```ignore
//! use ballot_core::testing::MemoryCluster;
//! use ballot_core::{CoordinationSession, CreateMode};
//!
//! #[tokio::test]
//! async fn test_ephemeral_cleanup() {
//!     let cluster = MemoryCluster::new();
//!     let session = cluster.session();
//!     session.create_node("/election", CreateMode::Persistent).await.unwrap();
//!     cluster.expire(&session);
//! }
//! ```

mod memory;

pub use memory::{MemoryCluster, MemorySession};
