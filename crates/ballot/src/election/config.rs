use std::time::Duration;

/// Election runtime configuration.
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    /// Name prefix for the candidacy node; the coordination service appends
    /// the sequence suffix.
    pub candidate_prefix: String,
    /// Delay between attempts to re-register a lost children watch.
    pub rewatch_backoff: Duration,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            candidate_prefix: "candidate-".to_string(),
            rewatch_backoff: Duration::from_millis(250),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_election_config_default() {
        let config = ElectionConfig::default();
        assert_eq!(config.candidate_prefix, "candidate-");
        assert_eq!(config.rewatch_backoff, Duration::from_millis(250));
    }
}
