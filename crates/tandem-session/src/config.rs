use std::time::Duration;

/// Tunables for the session layer.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a disconnected participant has to reconnect before the
    /// session is forfeited to the other side.
    ///
    /// Default: 30 seconds.
    pub reconnect_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(30),
        }
    }
}
