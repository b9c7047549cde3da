use std::time::Duration;

/// Matchmaking settings.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Time between two scheduler ticks. Default: 5 seconds.
    pub interval: Duration,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}
