use std::cmp::Ordering;

/// A sibling candidacy node name plus its service-assigned ordering key.
///
/// The sequence is the trailing run of decimal digits in the name, as
/// appended by the coordination service at creation time. It is opaque
/// beyond comparison: smallest sequence means earliest registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateName {
    name: String,
    sequence: Option<u64>,
}

impl CandidateName {
    /// Parse a child name, extracting the trailing sequence suffix if any.
    pub fn parse(name: impl Into<String>) -> Self {
        let name = name.into();
        let digits = name
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .count();
        let sequence = if digits == 0 {
            None
        } else {
            name[name.len() - digits..].parse().ok()
        };
        Self { name, sequence }
    }

    /// The full child name as assigned by the service.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parsed sequence suffix, if the name carries one.
    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }
}

impl Ord for CandidateName {
    fn cmp(&self, other: &Self) -> Ordering {
        // Sequenced names order by suffix; names without a parseable suffix
        // sort after all sequenced names, lexicographically among themselves.
        match (self.sequence, other.sequence) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.name.cmp(&other.name)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.name.cmp(&other.name),
        }
    }
}

impl PartialOrd for CandidateName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for CandidateName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// An ordered snapshot of the sibling candidacy nodes at one observation
/// instant.
///
/// This is a snapshot, not a live structure: the election runtime rebuilds
/// it from a fresh child listing on every notification.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    candidates: Vec<CandidateName>,
}

impl CandidateSet {
    /// Build a snapshot from a child listing, sorted ascending by sequence.
    pub fn from_children(children: Vec<String>) -> Self {
        let mut candidates: Vec<CandidateName> =
            children.into_iter().map(CandidateName::parse).collect();
        candidates.sort();
        Self { candidates }
    }

    /// The minimum-sequence candidate, i.e. the current leader.
    pub fn leader(&self) -> Option<&CandidateName> {
        self.candidates.first()
    }

    /// Whether a child with this exact name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.candidates.iter().any(|c| c.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Candidates in election order, leader first.
    pub fn iter(&self) -> impl Iterator<Item = &CandidateName> {
        self.candidates.iter()
    }
}
