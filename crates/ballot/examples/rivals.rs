//! Three rival candidates competing on an in-memory cluster.
//!
//! The leader's session is expired mid-run to show automatic succession,
//! then the process resigns everyone deterministically.
//!
//! ```sh
//! cargo run -p ballot --example rivals
//! ```

use std::sync::Arc;
use std::time::Duration;

use ballot::{CoordinationSession, ElectionCoordinator, ElectionPath};
use ballot_core::testing::MemoryCluster;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cluster = MemoryCluster::new();
    let path = ElectionPath::new("/apps/workers/election")?;

    let mut sessions = Vec::new();
    let mut coordinators = Vec::new();
    for rival in 0..3usize {
        let session = cluster.session();
        let coordinator = ElectionCoordinator::builder(
            Arc::new(session.clone()) as Arc<dyn CoordinationSession>,
            path.clone(),
        )
        .on_elected(move || tracing::info!(rival, "assuming leadership"))
        .on_demoted(move || tracing::info!(rival, "stepping down"))
        .start()
        .await?;
        sessions.push(session);
        coordinators.push(coordinator);
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    for (rival, coordinator) in coordinators.iter().enumerate() {
        tracing::info!(rival, leading = coordinator.is_leading(), member = %coordinator.member(), "standing");
    }

    // Kill the leader's session; the next registration takes over.
    tracing::info!("expiring the leader's session");
    cluster.expire(&sessions[0]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    for (rival, coordinator) in coordinators.iter().enumerate() {
        tracing::info!(rival, leading = coordinator.is_leading(), "standing after expiry");
    }

    for coordinator in &coordinators {
        coordinator.resign().await;
    }
    Ok(())
}
