//! Cumulative win counts, keyed by identity, shown by display name.

use tandem_protocol::{Identity, LeaderboardEntry};
use tandem_store::{SharedStore, StoreError, keys};

/// Shown for identities that never registered a display name.
pub const UNKNOWN_PLAYER: &str = "Unknown Player";

/// The shared leaderboard.
///
/// Scores only ever go up: the one mutation is [`record_win`].
///
/// [`record_win`]: Leaderboard::record_win
#[derive(Clone)]
pub struct Leaderboard<S> {
    store: S,
}

impl<S: SharedStore> Leaderboard<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Credits `winner` with one win. Returns the new total.
    pub async fn record_win(&self, winner: &Identity) -> Result<u64, StoreError> {
        let score = self
            .store
            .sorted_incr(keys::LEADERBOARD, winner.as_str(), 1)
            .await?;
        tracing::info!(%winner, score, "win recorded");
        Ok(score)
    }

    /// Remembers the name `identity` wants to be shown as.
    pub async fn set_display_name(
        &self,
        identity: &Identity,
        name: &str,
    ) -> Result<(), StoreError> {
        self.store
            .hash_set(keys::DISPLAY_NAMES, identity.as_str(), name)
            .await
    }

    /// Looks up display names for several identities at once, in order.
    /// Missing names come back as [`UNKNOWN_PLAYER`].
    pub async fn display_names(
        &self,
        identities: &[&Identity],
    ) -> Result<Vec<String>, StoreError> {
        let fields: Vec<String> = identities.iter().map(|i| i.as_str().to_owned()).collect();
        let names = self.store.hash_get_many(keys::DISPLAY_NAMES, &fields).await?;
        Ok(names
            .into_iter()
            .map(|name| name.unwrap_or_else(|| UNKNOWN_PLAYER.to_owned()))
            .collect())
    }

    /// Returns the best `limit` entries, highest score first.
    pub async fn top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let scores = self.store.sorted_top(keys::LEADERBOARD, limit).await?;
        if scores.is_empty() {
            return Ok(Vec::new());
        }

        let fields: Vec<String> = scores.iter().map(|(member, _)| member.clone()).collect();
        let names = self.store.hash_get_many(keys::DISPLAY_NAMES, &fields).await?;

        Ok(scores
            .into_iter()
            .zip(names)
            .map(|((_, score), name)| LeaderboardEntry {
                name: name.unwrap_or_else(|| UNKNOWN_PLAYER.to_owned()),
                score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use tandem_store::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn test_top_empty_board_returns_empty_list() {
        let board = Leaderboard::new(MemoryStore::new());
        assert!(board.top(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_top_orders_by_wins_and_uses_display_names() {
        let board = Leaderboard::new(MemoryStore::new());
        let alice = Identity::new("p1");
        let bob = Identity::new("p2");
        board.set_display_name(&alice, "Alice").await.unwrap();
        board.set_display_name(&bob, "Bob").await.unwrap();

        board.record_win(&bob).await.unwrap();
        board.record_win(&alice).await.unwrap();
        assert_eq!(board.record_win(&alice).await.unwrap(), 2);

        let top = board.top(10).await.unwrap();
        assert_eq!(
            top,
            vec![
                LeaderboardEntry { name: "Alice".into(), score: 2 },
                LeaderboardEntry { name: "Bob".into(), score: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_top_missing_name_falls_back_to_unknown_player() {
        let board = Leaderboard::new(MemoryStore::new());
        board.record_win(&Identity::new("ghost")).await.unwrap();

        let top = board.top(10).await.unwrap();
        assert_eq!(top[0].name, UNKNOWN_PLAYER);
    }

    #[tokio::test]
    async fn test_top_respects_limit() {
        let board = Leaderboard::new(MemoryStore::new());
        for id in ["a", "b", "c"] {
            board.record_win(&Identity::new(id)).await.unwrap();
        }
        assert_eq!(board.top(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_display_names_keeps_order_with_fallback() {
        let board = Leaderboard::new(MemoryStore::new());
        let a = Identity::new("a");
        let b = Identity::new("b");
        board.set_display_name(&b, "Bee").await.unwrap();

        let names = board.display_names(&[&a, &b]).await.unwrap();
        assert_eq!(names, vec![UNKNOWN_PLAYER.to_string(), "Bee".to_string()]);
    }
}
