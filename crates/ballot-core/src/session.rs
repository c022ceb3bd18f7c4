use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot};

use crate::error::Result;

/// Lifecycle of a session with the coordination service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The session is live and requests flow.
    Connected,
    /// Connectivity is lost but the session has not timed out; ephemeral
    /// nodes owned by the session still exist on the service side.
    Suspended,
    /// The session timed out. Every ephemeral node it owned is gone and
    /// every watch it registered is invalid.
    Expired,
}

impl SessionState {
    /// Whether ephemeral nodes owned by the session still exist.
    pub fn is_alive(&self) -> bool {
        !matches!(self, Self::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Suspended => "suspended",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a node is created in the namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Outlives the creating session.
    Persistent,
    /// Deleted by the service when the creating session ends.
    Ephemeral,
    /// Ephemeral, with a service-assigned monotonic suffix appended to the
    /// requested name to obtain a total order among siblings.
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Ephemeral | Self::EphemeralSequential)
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self, Self::EphemeralSequential)
    }
}

/// Contract the election runtime consumes from a coordination-service
/// client.
///
/// Implementations maintain the live session; the runtime never retries
/// connectivity itself. One session handle may back many elections at once:
/// each election touches only its own subtree.
///
/// Watch semantics are ONE-SHOT, matching the underlying service: a
/// receiver returned by [`watch_children`](Self::watch_children) fires at
/// most once, on the next child change. The election runtime layers a
/// durable re-arming subscription on top.
#[async_trait]
pub trait CoordinationSession: Send + Sync {
    /// Create a node, returning the full path actually created.
    ///
    /// Sequential modes return the requested path with the assigned suffix
    /// appended. A non-sequential create of an existing path must return
    /// [`ElectionError::NodeExists`](crate::ElectionError::NodeExists).
    async fn create_node(&self, path: &str, mode: CreateMode) -> Result<String>;

    /// Delete a node.
    async fn delete_node(&self, path: &str) -> Result<()>;

    /// List the names of the direct children of `path`.
    async fn list_children(&self, path: &str) -> Result<Vec<String>>;

    /// Register a one-shot watch on the children of `path`.
    ///
    /// The receiver resolves when a child is added or removed. A dropped
    /// sender (session teardown) surfaces as a receive error.
    async fn watch_children(&self, path: &str) -> Result<oneshot::Receiver<()>>;

    /// Subscribe to session state transitions.
    fn session_events(&self) -> broadcast::Receiver<SessionState>;

    /// The current session state.
    fn state(&self) -> SessionState;
}
