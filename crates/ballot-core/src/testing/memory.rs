use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot};
use uuid::Uuid;

use crate::error::{ElectionError, Result};
use crate::session::{CoordinationSession, CreateMode, SessionState};

/// A node in the in-memory namespace.
struct NodeEntry {
    /// Owning session for ephemeral nodes; `None` for persistent ones.
    owner: Option<Uuid>,
}

/// The shared hierarchical namespace.
#[derive(Default)]
struct Namespace {
    /// Absolute path -> entry. BTreeMap keeps children scans ordered.
    nodes: BTreeMap<String, NodeEntry>,
    /// Parent path -> pending one-shot child watches.
    watches: HashMap<String, Vec<oneshot::Sender<()>>>,
    /// Requested sequential path -> next suffix.
    counters: HashMap<String, u64>,
}

impl Namespace {
    fn fire_child_watches(&mut self, parent: &str) {
        if let Some(senders) = self.watches.remove(parent) {
            for sender in senders {
                let _ = sender.send(());
            }
        }
    }

    fn create(&mut self, path: &str, mode: CreateMode, owner: Uuid) -> Result<String> {
        let (parent, name) = path
            .rsplit_once('/')
            .ok_or_else(|| ElectionError::Internal(format!("malformed path: {path}")))?;
        if name.is_empty() || !path.starts_with('/') {
            return Err(ElectionError::Internal(format!("malformed path: {path}")));
        }
        if !parent.is_empty() && !self.nodes.contains_key(parent) {
            return Err(ElectionError::NodeNotFound(parent.to_string()));
        }

        let actual = if mode.is_sequential() {
            let counter = self.counters.entry(path.to_string()).or_insert(0);
            let seq = *counter;
            *counter += 1;
            format!("{path}{seq:010}")
        } else {
            if self.nodes.contains_key(path) {
                return Err(ElectionError::NodeExists(path.to_string()));
            }
            path.to_string()
        };

        let owner = mode.is_ephemeral().then_some(owner);
        self.nodes.insert(actual.clone(), NodeEntry { owner });
        self.fire_child_watches(parent);
        Ok(actual)
    }

    fn delete(&mut self, path: &str) -> Result<()> {
        if !self.children(path).unwrap_or_default().is_empty() {
            return Err(ElectionError::Internal(format!("node has children: {path}")));
        }
        if self.nodes.remove(path).is_none() {
            return Err(ElectionError::NodeNotFound(path.to_string()));
        }
        if let Some((parent, _)) = path.rsplit_once('/') {
            self.fire_child_watches(parent);
        }
        Ok(())
    }

    fn children(&self, path: &str) -> Result<Vec<String>> {
        if !self.nodes.contains_key(path) {
            return Err(ElectionError::NodeNotFound(path.to_string()));
        }
        let prefix = format!("{path}/");
        let mut names = Vec::new();
        for key in self.nodes.range(prefix.clone()..) {
            let key = key.0.as_str();
            if !key.starts_with(&prefix) {
                break;
            }
            let rest = &key[prefix.len()..];
            if !rest.is_empty() && !rest.contains('/') {
                names.push(rest.to_string());
            }
        }
        Ok(names)
    }

    /// Remove every ephemeral owned by `session` and notify affected parents.
    fn expire_session(&mut self, session: Uuid) {
        let doomed: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, entry)| entry.owner == Some(session))
            .map(|(path, _)| path.clone())
            .collect();
        let mut parents = HashSet::new();
        for path in doomed {
            self.nodes.remove(&path);
            if let Some((parent, _)) = path.rsplit_once('/') {
                parents.insert(parent.to_string());
            }
        }
        for parent in parents {
            self.fire_child_watches(&parent);
        }
    }
}

/// In-memory stand-in for the coordination service.
///
/// Cloning shares the underlying namespace; open one cluster per test and
/// hand each simulated process its own [`session`](Self::session).
#[derive(Clone, Default)]
pub struct MemoryCluster {
    inner: Arc<Mutex<Namespace>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session against the cluster.
    pub fn session(&self) -> MemorySession {
        let (state_tx, _) = broadcast::channel(16);
        MemorySession {
            inner: Arc::clone(&self.inner),
            shared: Arc::new(SessionShared {
                id: RwLock::new(Uuid::new_v4()),
                state: RwLock::new(SessionState::Connected),
                state_tx,
            }),
        }
    }

    /// Expire a session.
    ///
    /// The state flips to `Expired` first, then the session's ephemeral
    /// nodes are removed and affected child watches fire, then `Expired` is
    /// broadcast. A coordinator woken by either signal already observes the
    /// dead session.
    pub fn expire(&self, session: &MemorySession) {
        let id = session.id();
        session.flip_state(SessionState::Expired);
        let mut ns = self.inner.lock().expect("namespace lock poisoned");
        ns.expire_session(id);
    }

    /// Report a session as suspended: connectivity lost, not yet timed out.
    /// Ephemerals and watches survive.
    pub fn suspend(&self, session: &MemorySession) {
        session.flip_state(SessionState::Suspended);
    }

    /// Re-establish a session under a fresh identity and broadcast
    /// `Connected`. After an expiry the old ephemerals stay gone; the
    /// consumer re-registers from scratch.
    pub fn restore(&self, session: &MemorySession) {
        session.renew_id();
        session.flip_state(SessionState::Connected);
    }

    /// Whether a node exists, for assertions.
    pub fn node_exists(&self, path: &str) -> bool {
        let ns = self.inner.lock().expect("namespace lock poisoned");
        ns.nodes.contains_key(path)
    }

    /// Direct child names of `path`, for assertions.
    pub fn children(&self, path: &str) -> Vec<String> {
        let ns = self.inner.lock().expect("namespace lock poisoned");
        ns.children(path).unwrap_or_default()
    }
}

struct SessionShared {
    id: RwLock<Uuid>,
    state: RwLock<SessionState>,
    state_tx: broadcast::Sender<SessionState>,
}

/// A session handle implementing [`CoordinationSession`] against a
/// [`MemoryCluster`]. Clones share the same session identity.
#[derive(Clone)]
pub struct MemorySession {
    inner: Arc<Mutex<Namespace>>,
    shared: Arc<SessionShared>,
}

impl MemorySession {
    /// The current session identity. Changes on [`MemoryCluster::restore`].
    pub fn id(&self) -> Uuid {
        *self.shared.id.read().expect("session lock poisoned")
    }

    fn renew_id(&self) {
        *self.shared.id.write().expect("session lock poisoned") = Uuid::new_v4();
    }

    fn flip_state(&self, state: SessionState) {
        *self.shared.state.write().expect("session lock poisoned") = state;
        let _ = self.shared.state_tx.send(state);
    }

    fn ensure_alive(&self) -> Result<Uuid> {
        if self.state() == SessionState::Expired {
            return Err(ElectionError::SessionExpired);
        }
        Ok(self.id())
    }
}

#[async_trait]
impl CoordinationSession for MemorySession {
    async fn create_node(&self, path: &str, mode: CreateMode) -> Result<String> {
        let id = self.ensure_alive()?;
        let mut ns = self.inner.lock().expect("namespace lock poisoned");
        ns.create(path, mode, id)
    }

    async fn delete_node(&self, path: &str) -> Result<()> {
        self.ensure_alive()?;
        let mut ns = self.inner.lock().expect("namespace lock poisoned");
        ns.delete(path)
    }

    async fn list_children(&self, path: &str) -> Result<Vec<String>> {
        self.ensure_alive()?;
        let ns = self.inner.lock().expect("namespace lock poisoned");
        ns.children(path)
    }

    async fn watch_children(&self, path: &str) -> Result<oneshot::Receiver<()>> {
        self.ensure_alive()?;
        let (tx, rx) = oneshot::channel();
        let mut ns = self.inner.lock().expect("namespace lock poisoned");
        if !ns.nodes.contains_key(path) {
            return Err(ElectionError::NodeNotFound(path.to_string()));
        }
        ns.watches.entry(path.to_string()).or_default().push(tx);
        Ok(rx)
    }

    fn session_events(&self) -> broadcast::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    fn state(&self) -> SessionState {
        *self.shared.state.read().expect("session lock poisoned")
    }
}
