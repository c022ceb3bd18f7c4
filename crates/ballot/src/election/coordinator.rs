use std::sync::{Arc, RwLock};

use ballot_core::{
    CandidateSet, CoordinationSession, CreateMode, ElectionError, ElectionPath, Result,
    SessionState,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

use super::config::ElectionConfig;
use super::state::{LeadershipCell, LeadershipSnapshot, LeadershipState};
use super::subscription::ChildrenSubscription;

/// Hook invoked when this process transitions into leadership.
pub type ElectedHook = Box<dyn FnMut() + Send + 'static>;
/// Hook invoked when this process loses leadership it previously held.
pub type DemotedHook = Box<dyn FnMut() + Send + 'static>;

/// Builder for [`ElectionCoordinator`].
pub struct ElectionBuilder {
    session: Arc<dyn CoordinationSession>,
    path: ElectionPath,
    config: ElectionConfig,
    on_elected: Option<ElectedHook>,
    on_demoted: Option<DemotedHook>,
}

impl ElectionBuilder {
    /// Set the hook fired on the transition into leadership. Required.
    pub fn on_elected(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_elected = Some(Box::new(hook));
        self
    }

    /// Set the hook fired on the transition out of leadership. Optional;
    /// leadership state updates whether or not a hook is installed.
    pub fn on_demoted(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_demoted = Some(Box::new(hook));
        self
    }

    pub fn config(mut self, config: ElectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Register the candidacy and start the election loop.
    pub async fn start(self) -> Result<ElectionCoordinator> {
        let on_elected = self.on_elected.ok_or(ElectionError::InvalidCallback)?;
        ElectionCoordinator::start_inner(
            self.session,
            self.path,
            self.config,
            on_elected,
            self.on_demoted,
        )
        .await
    }
}

/// One process's participation in a leader election.
///
/// Construction registers exactly one ephemeral, sequentially named
/// candidacy node under the election path and spawns a single event loop
/// that re-evaluates leadership on every children change and session
/// transition. Because all re-evaluation runs on that one loop, no two
/// re-evaluations for the same coordinator ever overlap.
///
/// The on-elected hook runs synchronously inside the loop: a hook that
/// blocks indefinitely delays subsequent re-evaluations, including
/// demotion. Offload long work from the hook if that matters.
///
/// Many coordinators may share one session (one election per role); each
/// touches only its own election path subtree.
pub struct ElectionCoordinator {
    session: Arc<dyn CoordinationSession>,
    path: ElectionPath,
    member: Arc<RwLock<String>>,
    cell: Arc<LeadershipCell>,
    state_tx: watch::Sender<LeadershipSnapshot>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ElectionCoordinator {
    /// Start building an election under `path` on a shared session.
    pub fn builder(session: Arc<dyn CoordinationSession>, path: ElectionPath) -> ElectionBuilder {
        ElectionBuilder {
            session,
            path,
            config: ElectionConfig::default(),
            on_elected: None,
            on_demoted: None,
        }
    }

    /// Shorthand for the common case: default config, on-elected hook only.
    pub async fn start(
        session: Arc<dyn CoordinationSession>,
        path: ElectionPath,
        on_elected: impl FnMut() + Send + 'static,
    ) -> Result<Self> {
        Self::builder(session, path).on_elected(on_elected).start().await
    }

    async fn start_inner(
        session: Arc<dyn CoordinationSession>,
        path: ElectionPath,
        config: ElectionConfig,
        on_elected: ElectedHook,
        on_demoted: Option<DemotedHook>,
    ) -> Result<Self> {
        ensure_path(session.as_ref(), &path).await?;

        let created = session
            .create_node(&path.join(&config.candidate_prefix), CreateMode::EphemeralSequential)
            .await?;
        let member = Arc::new(RwLock::new(member_name(&created)));
        tracing::debug!(path = %path, member = %created, "registered candidacy");

        let subscription =
            ChildrenSubscription::register(Arc::clone(&session), path.clone()).await?;

        let cell = Arc::new(LeadershipCell::new());
        let (state_tx, _) = watch::channel(LeadershipSnapshot::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = ElectionTask {
            session: Arc::clone(&session),
            path: path.clone(),
            config,
            member: Arc::clone(&member),
            registered: true,
            subscription,
            session_rx: session.session_events(),
            shutdown_rx,
            cell: Arc::clone(&cell),
            state_tx: state_tx.clone(),
            on_elected,
            on_demoted,
        };
        let handle = tokio::spawn(task.run());

        Ok(Self {
            session,
            path,
            member,
            cell,
            state_tx,
            shutdown_tx,
            task: Mutex::new(Some(handle)),
        })
    }

    /// Whether this process currently leads.
    ///
    /// Non-blocking and safe to call concurrently with re-evaluation: the
    /// state is read from an atomically published slot. An expired session
    /// reads as not leading immediately, before the event loop has
    /// processed the expiry. The only failure mode is staleness, never an
    /// error.
    pub fn is_leading(&self) -> bool {
        self.session.state().is_alive() && self.cell.load().is_leader()
    }

    /// The most recently published leadership snapshot.
    pub fn snapshot(&self) -> LeadershipSnapshot {
        self.cell.load()
    }

    /// Follow leadership snapshots as the loop publishes them.
    pub fn subscribe(&self) -> watch::Receiver<LeadershipSnapshot> {
        self.state_tx.subscribe()
    }

    /// The name of the current candidacy node under the election path.
    /// Changes when the candidacy is re-registered after a session expiry.
    pub fn member(&self) -> String {
        self.member.read().map(|m| m.clone()).unwrap_or_default()
    }

    /// The election path this coordinator competes under.
    pub fn path(&self) -> &ElectionPath {
        &self.path
    }

    /// Deterministic resignation: delete the candidacy node and stop the
    /// loop, so rivals are notified promptly instead of waiting for the
    /// session to time out. Idempotent.
    pub async fn resign(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for ElectionCoordinator {
    fn drop(&mut self) {
        // Dropping the sender wakes the loop, which resigns on its own.
        // `resign().await` is still the deterministic path.
        let _ = self.shutdown_tx.send(true);
    }
}

/// Last path component of a created node, stored verbatim; leadership
/// comparison never re-derives it by string concatenation.
fn member_name(full_path: &str) -> String {
    full_path
        .rsplit('/')
        .next()
        .unwrap_or(full_path)
        .to_string()
}

/// Idempotently create every segment of the election path.
///
/// `NodeExists` from a racing candidate is success: both racers proceed.
async fn ensure_path(session: &dyn CoordinationSession, path: &ElectionPath) -> Result<()> {
    for ancestor in path.ancestors() {
        match session.create_node(ancestor, CreateMode::Persistent).await {
            Ok(_) => {}
            Err(err) if err.is_node_exists() => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// What woke the event loop.
enum Wake {
    Children(Result<()>),
    Session(std::result::Result<SessionState, RecvError>),
    Shutdown,
}

/// The single serialized election loop. Owns the hooks and is the only
/// writer of the leadership slot.
struct ElectionTask {
    session: Arc<dyn CoordinationSession>,
    path: ElectionPath,
    config: ElectionConfig,
    member: Arc<RwLock<String>>,
    /// Whether the candidacy node and watch belong to the current session
    /// incarnation. Cleared on expiry, restored on re-registration.
    registered: bool,
    subscription: ChildrenSubscription,
    session_rx: broadcast::Receiver<SessionState>,
    shutdown_rx: watch::Receiver<bool>,
    cell: Arc<LeadershipCell>,
    state_tx: watch::Sender<LeadershipSnapshot>,
    on_elected: ElectedHook,
    on_demoted: Option<DemotedHook>,
}

impl ElectionTask {
    async fn run(mut self) {
        // A lone candidate must win without waiting for a sibling change.
        self.reevaluate().await;

        loop {
            // A failed or cancelled re-arm leaves the subscription disarmed
            // while the registration is still live; restore it here.
            if self.registered
                && !self.subscription.is_armed()
                && self.session.state().is_alive()
                && !*self.shutdown_rx.borrow()
            {
                self.recover_watch().await;
            }

            let wake = tokio::select! {
                result = self.subscription.changed(), if self.subscription.is_armed() => {
                    Wake::Children(result)
                }
                event = self.session_rx.recv() => Wake::Session(event),
                _ = self.shutdown_rx.changed() => Wake::Shutdown,
            };

            match wake {
                Wake::Children(Ok(())) => self.reevaluate().await,
                Wake::Children(Err(err)) => {
                    // Left disarmed; the top of the loop retries.
                    tracing::debug!(path = %self.path, error = %err, "children watch lost");
                }
                Wake::Session(Ok(SessionState::Connected)) => {
                    if !self.registered {
                        // A real client emits one Connected per recovery;
                        // a transient failure here must not strand the
                        // coordinator outside the election.
                        self.recover_registration().await;
                    }
                    self.reevaluate().await;
                }
                Wake::Session(Ok(SessionState::Suspended)) => {
                    // Ephemerals survive a suspension; hold state until the
                    // session either recovers or expires.
                    tracing::debug!(path = %self.path, "session suspended");
                }
                Wake::Session(Ok(SessionState::Expired)) => self.demote_on_expiry(),
                Wake::Session(Err(RecvError::Lagged(missed))) => {
                    tracing::warn!(
                        path = %self.path,
                        missed,
                        "session event stream lagged"
                    );
                    // An Expired may be among the missed events.
                    if !self.session.state().is_alive() {
                        self.demote_on_expiry();
                    } else {
                        self.reevaluate().await;
                    }
                }
                Wake::Session(Err(RecvError::Closed)) => {
                    tracing::warn!(path = %self.path, "session event stream closed, stopping election");
                    break;
                }
                Wake::Shutdown => break,
            }
        }

        self.resign().await;
    }

    /// List a fresh candidate snapshot, recompute leadership, publish, and
    /// fire hooks on transitions.
    async fn reevaluate(&mut self) {
        let children = match self.session.list_children(self.path.as_str()).await {
            Ok(children) => children,
            Err(err) => {
                // Eventually-correct contract: keep the previous state, the
                // next notification retries.
                tracing::warn!(path = %self.path, error = %err, "listing candidates failed");
                return;
            }
        };

        let member = self.member_name();
        let set = CandidateSet::from_children(children);
        let state = if set.is_empty() {
            // Own registration not visible yet; leadership stays undecided.
            LeadershipState::Candidate
        } else if !set.contains(&member) {
            tracing::warn!(
                path = %self.path,
                member = %member,
                "own candidacy missing from a non-empty candidate set"
            );
            LeadershipState::Candidate
        } else if set.leader().map(|leader| leader.name() == member).unwrap_or(false) {
            LeadershipState::Leader
        } else {
            LeadershipState::Candidate
        };

        self.publish(state);
    }

    /// Publish a new snapshot and fire hooks if the state transitioned.
    /// The generation advances on every publish, transition or not.
    fn publish(&mut self, state: LeadershipState) {
        let previous = self.cell.load();
        let next = LeadershipSnapshot {
            state,
            generation: previous.generation + 1,
        };
        self.cell.store(next);

        // Hooks run before the snapshot is announced on the watch channel,
        // so an observer that sees the transition knows the hook has fired.
        match (previous.state, state) {
            (LeadershipState::Candidate, LeadershipState::Leader) => {
                tracing::info!(path = %self.path, member = %self.member_name(), "elected leader");
                (self.on_elected)();
            }
            (LeadershipState::Leader, LeadershipState::Candidate) => {
                tracing::info!(path = %self.path, "demoted to candidate");
                if let Some(hook) = self.on_demoted.as_mut() {
                    hook();
                }
            }
            _ => {}
        }

        self.state_tx.send_replace(next);
    }

    /// Forced local demotion on session expiry. The ephemeral candidacy is
    /// already gone and the watch is invalid, so nothing waits for a watch
    /// to fire.
    fn demote_on_expiry(&mut self) {
        self.registered = false;
        self.subscription.disarm();
        self.publish(LeadershipState::Candidate);
        tracing::info!(path = %self.path, "session expired, demoted locally");
    }

    /// Redo the construction-time registration after a session recovery:
    /// the old sequence number is not reusable, so a brand-new candidacy
    /// node is created and the watch re-registered.
    async fn reregister(&mut self) -> Result<()> {
        ensure_path(self.session.as_ref(), &self.path).await?;
        let created = self
            .session
            .create_node(
                &self.path.join(&self.config.candidate_prefix),
                CreateMode::EphemeralSequential,
            )
            .await?;
        if let Ok(mut member) = self.member.write() {
            *member = member_name(&created);
        }
        self.registered = true;
        tracing::info!(path = %self.path, member = %created, "re-registered candidacy after session recovery");

        // The candidacy is in place; a failed watch registration leaves
        // the subscription disarmed and the loop restores it separately.
        // Propagating it would make a retry create a second candidacy.
        if let Err(err) = self.subscription.rearm().await {
            tracing::debug!(path = %self.path, error = %err, "children watch not yet re-armed after recovery");
        }
        Ok(())
    }

    /// Retry re-registration until it sticks, the session dies, or
    /// shutdown is requested.
    async fn recover_registration(&mut self) {
        while self.session.state().is_alive() && !*self.shutdown_rx.borrow() {
            match self.reregister().await {
                Ok(()) => return,
                Err(err) => {
                    tracing::warn!(
                        path = %self.path,
                        error = %err,
                        "re-registration after session recovery failed, backing off"
                    );
                    tokio::time::sleep(self.config.rewatch_backoff).await;
                }
            }
        }
    }

    /// Retry watch registration until it sticks, the session dies, or
    /// shutdown is requested.
    async fn recover_watch(&mut self) {
        while self.session.state().is_alive() && !*self.shutdown_rx.borrow() {
            match self.subscription.rearm().await {
                Ok(()) => {
                    // Changes may have slipped past while unwatched.
                    self.reevaluate().await;
                    return;
                }
                Err(err) => {
                    tracing::warn!(
                        path = %self.path,
                        error = %err,
                        "failed to re-register children watch, backing off"
                    );
                    tokio::time::sleep(self.config.rewatch_backoff).await;
                }
            }
        }
    }

    /// Delete the candidacy node (when it still exists) and publish the
    /// final non-leading state.
    async fn resign(&mut self) {
        self.subscription.disarm();
        if self.registered && self.session.state().is_alive() {
            let node = self.path.join(&self.member_name());
            if let Err(err) = self.session.delete_node(&node).await {
                tracing::warn!(node = %node, error = %err, "failed to delete candidacy node on resign");
            }
        }
        self.registered = false;
        self.publish(LeadershipState::Candidate);
        tracing::debug!(path = %self.path, "resigned from election");
    }

    fn member_name(&self) -> String {
        self.member.read().map(|m| m.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballot_core::testing::MemoryCluster;

    #[tokio::test]
    async fn test_builder_requires_elected_hook() {
        let cluster = MemoryCluster::new();
        let session: Arc<dyn CoordinationSession> = Arc::new(cluster.session());
        let path = ElectionPath::new("/election").unwrap();

        let result = ElectionCoordinator::builder(session, path).start().await;
        assert!(matches!(result, Err(ElectionError::InvalidCallback)));
    }

    #[test]
    fn test_member_name_extraction() {
        assert_eq!(member_name("/election/candidate-0000000004"), "candidate-0000000004");
        assert_eq!(member_name("bare"), "bare");
    }

    #[tokio::test]
    async fn test_ensure_path_tolerates_existing_segments() {
        let cluster = MemoryCluster::new();
        let session = cluster.session();
        let path = ElectionPath::new("/apps/workers/election").unwrap();

        ensure_path(&session, &path).await.unwrap();
        // Second pass hits NodeExists on every segment and still succeeds.
        ensure_path(&session, &path).await.unwrap();
        assert!(cluster.node_exists("/apps/workers/election"));
    }
}
