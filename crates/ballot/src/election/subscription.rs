use std::sync::Arc;

use ballot_core::{CoordinationSession, ElectionError, ElectionPath, Result};
use tokio::sync::oneshot;

/// Durable children subscription layered over the service's one-shot
/// watches.
///
/// [`changed`](Self::changed) waits for the pending watch to fire and
/// re-arms the next watch *before* returning, so a change that lands
/// between the firing and the caller's re-list still raises a
/// notification. A watch dropped by the service side is reported as a
/// (possibly spurious) change; callers re-list and converge.
pub struct ChildrenSubscription {
    session: Arc<dyn CoordinationSession>,
    path: ElectionPath,
    pending: Option<oneshot::Receiver<()>>,
}

impl ChildrenSubscription {
    /// Register the first watch on the children of `path`.
    pub async fn register(
        session: Arc<dyn CoordinationSession>,
        path: ElectionPath,
    ) -> Result<Self> {
        let pending = session.watch_children(path.as_str()).await?;
        Ok(Self {
            session,
            path,
            pending: Some(pending),
        })
    }

    /// Whether a watch is currently armed.
    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the pending watch, e.g. after session expiry invalidated it.
    pub fn disarm(&mut self) {
        self.pending = None;
    }

    /// Register a fresh watch after the previous one was consumed or lost.
    pub async fn rearm(&mut self) -> Result<()> {
        self.pending = Some(self.session.watch_children(self.path.as_str()).await?);
        Ok(())
    }

    /// Wait for the next children change, then re-arm.
    ///
    /// Cancellation-safe while waiting: dropping the future leaves the
    /// pending watch armed. An error means the watch could not be re-armed;
    /// the subscription is left disarmed and the caller decides whether to
    /// retry or wait for a session event.
    pub async fn changed(&mut self) -> Result<()> {
        let fired = match self.pending.as_mut() {
            Some(rx) => rx.await.is_ok(),
            None => {
                return Err(ElectionError::Internal(
                    "children subscription is disarmed".into(),
                ))
            }
        };
        self.pending = None;
        // Re-arm before reporting, so a change racing the caller's re-list
        // still fires the next notification.
        self.rearm().await?;
        if !fired {
            tracing::debug!(path = %self.path, "one-shot watch dropped by the service, treating as a change");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballot_core::testing::MemoryCluster;
    use ballot_core::CreateMode;

    async fn cluster_with_path() -> (MemoryCluster, Arc<dyn CoordinationSession>) {
        let cluster = MemoryCluster::new();
        let session = cluster.session();
        session
            .create_node("/election", CreateMode::Persistent)
            .await
            .unwrap();
        (cluster, Arc::new(session))
    }

    #[tokio::test]
    async fn test_changed_observes_consecutive_changes() {
        let (_cluster, session) = cluster_with_path().await;
        let path = ElectionPath::new("/election").unwrap();
        let mut subscription =
            ChildrenSubscription::register(Arc::clone(&session), path).await.unwrap();

        session
            .create_node("/election/candidate-", CreateMode::EphemeralSequential)
            .await
            .unwrap();
        subscription.changed().await.unwrap();
        assert!(subscription.is_armed());

        // The re-arm happened inside `changed`, so a second change is seen
        // without any explicit re-registration.
        session
            .create_node("/election/candidate-", CreateMode::EphemeralSequential)
            .await
            .unwrap();
        subscription.changed().await.unwrap();
    }

    #[tokio::test]
    async fn test_disarm_and_rearm() {
        let (_cluster, session) = cluster_with_path().await;
        let path = ElectionPath::new("/election").unwrap();
        let mut subscription =
            ChildrenSubscription::register(Arc::clone(&session), path).await.unwrap();

        subscription.disarm();
        assert!(!subscription.is_armed());
        assert!(subscription.changed().await.is_err());

        subscription.rearm().await.unwrap();
        assert!(subscription.is_armed());
    }
}
