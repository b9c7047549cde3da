//! Key and topic names used in the shared store.
//!
//! Nothing else in the workspace spells out a key. If the layout changes,
//! it changes here.

use tandem_protocol::SessionId;

/// Ordered list of identities waiting for a peer. New entries go on the
/// newest end; matchmaking pops from the oldest end.
pub const WAITING_QUEUE: &str = "queue:waiting";

/// Set of identities currently in [`WAITING_QUEUE`].
pub const IN_QUEUE: &str = "queue:inqueue";

/// Set of identities currently seated in a non-concluded session.
pub const IN_SESSION: &str = "session:inprogress";

/// Sorted set of identity → cumulative wins.
pub const LEADERBOARD: &str = "leaderboard:wins";

/// Map of identity → display name.
pub const DISPLAY_NAMES: &str = "identity:displayname";

/// Prefix shared by every session update topic. Subscribing to this
/// prefix receives updates for all sessions.
pub const SESSION_TOPIC_PREFIX: &str = "session-updates:";

/// Key under which a session row is stored.
///
/// Session ids are 32 hex characters, so a row key never collides with
/// [`IN_SESSION`].
pub fn session_key(id: &SessionId) -> String {
    format!("session:{id}")
}

/// Topic on which updates for one session are published.
pub fn session_topic(id: &SessionId) -> String {
    format!("{SESSION_TOPIC_PREFIX}{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_topic_starts_with_prefix() {
        let topic = session_topic(&SessionId::new("abc"));
        assert_eq!(topic, "session-updates:abc");
        assert!(topic.starts_with(SESSION_TOPIC_PREFIX));
    }

    #[test]
    fn test_session_key_format() {
        assert_eq!(session_key(&SessionId::new("0af3")), "session:0af3");
    }
}
