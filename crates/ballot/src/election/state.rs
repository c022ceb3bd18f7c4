use std::sync::atomic::{AtomicU64, Ordering};

/// Local view of this process's standing in the election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeadershipState {
    /// Registered and waiting; some other candidate leads (or no candidate
    /// set has been observed yet).
    #[default]
    Candidate,
    /// This process owns the minimum sequence suffix.
    Leader,
}

impl LeadershipState {
    pub fn is_leader(&self) -> bool {
        matches!(self, Self::Leader)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::Leader => "leader",
        }
    }
}

impl std::fmt::Display for LeadershipState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One published result of a re-evaluation.
///
/// The generation counts completed re-evaluations for this coordinator,
/// starting at zero before the first; it advances even when the state is
/// unchanged, so observers can tell "stale" from "same".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LeadershipSnapshot {
    pub state: LeadershipState,
    pub generation: u64,
}

impl LeadershipSnapshot {
    pub fn is_leader(&self) -> bool {
        self.state.is_leader()
    }
}

/// Atomically published leadership slot.
///
/// The snapshot packs into one word (bit 0 carries the leader flag, the
/// remaining bits the generation), so concurrent readers never observe a
/// torn state/generation pair.
#[derive(Debug, Default)]
pub(crate) struct LeadershipCell(AtomicU64);

impl LeadershipCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> LeadershipSnapshot {
        let raw = self.0.load(Ordering::SeqCst);
        LeadershipSnapshot {
            state: if raw & 1 == 1 {
                LeadershipState::Leader
            } else {
                LeadershipState::Candidate
            },
            generation: raw >> 1,
        }
    }

    pub fn store(&self, snapshot: LeadershipSnapshot) {
        let flag = u64::from(snapshot.state.is_leader());
        self.0.store(snapshot.generation << 1 | flag, Ordering::SeqCst);
    }
}
