//! Integration tests for `SessionStore` against the in-memory shared store.
//!
//! These exercise the full move path (validate → apply → conclude →
//! commit) and the disconnect / forfeit / resume transitions, checking
//! both the stored row and what gets published.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tandem_protocol::{
    Identity, JsonCodec, Codec, Outcome, ServerMessage, Session, SessionStatus, Side,
};
use tandem_session::{Board, SessionError, SessionStore, TicTacToe, generate_session_id};
use tandem_store::{MemoryStore, SharedStore, StoreError, Subscription, keys};

// -- Helpers ----------------------------------------------------------

struct Fixture {
    store: MemoryStore,
    sessions: SessionStore<TicTacToe, MemoryStore>,
    session: Session<Board>,
    a: Identity,
    b: Identity,
}

/// Creates and saves an active session between p1 (X) and p2 (O), with
/// both marked in-session the way matchmaking leaves them.
async fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let sessions = SessionStore::<TicTacToe, _>::new(store.clone());
    let a = Identity::new("p1");
    let b = Identity::new("p2");
    let session = Session::new(
        generate_session_id(),
        a.clone(),
        b.clone(),
        "Alice".into(),
        "Bob".into(),
        Board::default(),
    );
    sessions.put(&session).await.unwrap();
    store.set_add(keys::IN_SESSION, "p1").await.unwrap();
    store.set_add(keys::IN_SESSION, "p2").await.unwrap();
    Fixture {
        store,
        sessions,
        session,
        a,
        b,
    }
}

/// A `MemoryStore` whose whole-value writes can be made to fail while
/// every other operation keeps working.
#[derive(Clone, Default)]
struct FlakyWrites {
    inner: MemoryStore,
    refuse_set: Arc<AtomicBool>,
}

impl SharedStore for FlakyWrites {
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        if self.refuse_set.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write refused".into()));
        }
        self.inner.set(key, value).await
    }

    async fn list_push(&self, key: &str, member: &str) -> Result<usize, StoreError> {
        self.inner.list_push(key, member).await
    }

    async fn list_push_oldest(&self, key: &str, member: &str) -> Result<usize, StoreError> {
        self.inner.list_push_oldest(key, member).await
    }

    async fn list_pop_oldest(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.list_pop_oldest(key).await
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        self.inner.list_len(key).await
    }

    async fn list_remove(&self, key: &str, member: &str) -> Result<usize, StoreError> {
        self.inner.list_remove(key, member).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.inner.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.inner.set_remove(key, member).await
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.inner.set_contains(key, member).await
    }

    async fn sorted_incr(&self, key: &str, member: &str, by: u64) -> Result<u64, StoreError> {
        self.inner.sorted_incr(key, member, by).await
    }

    async fn sorted_top(&self, key: &str, limit: usize) -> Result<Vec<(String, u64)>, StoreError> {
        self.inner.sorted_top(key, limit).await
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.inner.hash_set(key, field, value).await
    }

    async fn hash_get_many(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, StoreError> {
        self.inner.hash_get_many(key, fields).await
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<usize, StoreError> {
        self.inner.publish(topic, payload).await
    }

    async fn subscribe(&self, prefix: &str) -> Result<Subscription, StoreError> {
        self.inner.subscribe(prefix).await
    }
}

async fn next_update(sub: &mut Subscription) -> Session<Board> {
    let msg = sub.recv().await.expect("subscription closed");
    match JsonCodec.decode::<ServerMessage<Board>>(&msg.payload).unwrap() {
        ServerMessage::SessionUpdate(session) => session,
        other => panic!("expected session_update, got {other:?}"),
    }
}

// =====================================================================
// apply_move()
// =====================================================================

#[tokio::test]
async fn test_apply_move_valid_move_saves_and_publishes() {
    let f = fixture().await;
    let mut sub = f.store.subscribe(keys::SESSION_TOPIC_PREFIX).await.unwrap();

    let updated = f.sessions.apply_move(&f.a, &f.session.id, 4).await.unwrap();

    assert_eq!(updated.state.cells[4], Some(Side::X));
    assert_eq!(updated.state.turn, Side::O);
    let stored = f.sessions.get(&f.session.id).await.unwrap().unwrap();
    assert_eq!(stored, updated);

    let published = next_update(&mut sub).await;
    assert_eq!(published, updated);
}

#[tokio::test]
async fn test_apply_move_unknown_session_returns_not_found() {
    let f = fixture().await;
    let result = f.sessions.apply_move(&f.a, &generate_session_id(), 0).await;
    assert!(matches!(result, Err(SessionError::NotFound(_))));
}

#[tokio::test]
async fn test_apply_move_outsider_returns_not_participant() {
    let f = fixture().await;
    let result = f
        .sessions
        .apply_move(&Identity::new("p3"), &f.session.id, 0)
        .await;
    assert!(matches!(result, Err(SessionError::NotParticipant { .. })));
}

#[tokio::test]
async fn test_apply_move_out_of_turn_rejected_without_change() {
    let f = fixture().await;
    let result = f.sessions.apply_move(&f.b, &f.session.id, 0).await;
    assert!(matches!(result, Err(SessionError::NotYourTurn(_))));

    let stored = f.sessions.get(&f.session.id).await.unwrap().unwrap();
    assert_eq!(stored, f.session);
}

#[tokio::test]
async fn test_apply_move_occupied_cell_rejected_without_change() {
    let f = fixture().await;
    f.sessions.apply_move(&f.a, &f.session.id, 4).await.unwrap();
    let before = f.sessions.get(&f.session.id).await.unwrap().unwrap();

    let result = f.sessions.apply_move(&f.b, &f.session.id, 4).await;
    assert!(matches!(result, Err(SessionError::IllegalMove(_))));
    assert!(result.unwrap_err().is_rejection());

    let after = f.sessions.get(&f.session.id).await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_apply_move_winning_move_concludes_and_credits_winner() {
    let f = fixture().await;
    // X: 0,1,2  O: 3,4
    for (who, pos) in [(&f.a, 0), (&f.b, 3), (&f.a, 1), (&f.b, 4)] {
        f.sessions.apply_move(who, &f.session.id, pos).await.unwrap();
    }
    let last = f.sessions.apply_move(&f.a, &f.session.id, 2).await.unwrap();

    assert_eq!(
        last.status,
        SessionStatus::Concluded {
            outcome: Outcome::Win { side: Side::X }
        }
    );
    let top = f.sessions.leaderboard().top(10).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].score, 1);
    assert!(!f.store.set_contains(keys::IN_SESSION, "p1").await.unwrap());
    assert!(!f.store.set_contains(keys::IN_SESSION, "p2").await.unwrap());
}

#[tokio::test]
async fn test_apply_move_winning_move_failed_save_credits_nobody() {
    let store = FlakyWrites::default();
    let sessions = SessionStore::<TicTacToe, _>::new(store.clone());
    let (a, b) = (Identity::new("p1"), Identity::new("p2"));
    let session = Session::new(
        generate_session_id(),
        a.clone(),
        b.clone(),
        "Alice".into(),
        "Bob".into(),
        Board::default(),
    );
    sessions.put(&session).await.unwrap();
    for p in ["p1", "p2"] {
        store.set_add(keys::IN_SESSION, p).await.unwrap();
    }
    for (who, pos) in [(&a, 0), (&b, 3), (&a, 1), (&b, 4)] {
        sessions.apply_move(who, &session.id, pos).await.unwrap();
    }

    store.refuse_set.store(true, Ordering::SeqCst);
    let result = sessions.apply_move(&a, &session.id, 2).await;
    assert!(matches!(result, Err(SessionError::Store(_))));

    // Nothing moved: no credit, both still seated, board as before.
    assert!(sessions.leaderboard().top(10).await.unwrap().is_empty());
    for p in ["p1", "p2"] {
        assert!(store.set_contains(keys::IN_SESSION, p).await.unwrap());
    }
    let stored = sessions.get(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Active);
    assert_eq!(stored.state.cells[2], None);

    // The retried move concludes it, crediting the winner once.
    store.refuse_set.store(false, Ordering::SeqCst);
    sessions.apply_move(&a, &session.id, 2).await.unwrap();
    let again = sessions.apply_move(&a, &session.id, 2).await;
    assert!(matches!(again, Err(SessionError::WrongStatus { .. })));
    let top = sessions.leaderboard().top(10).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].score, 1);
}

#[tokio::test]
async fn test_conclude_already_concluded_rejected_without_credit() {
    let f = fixture().await;
    let mut session = f.session.clone();
    let win = Outcome::Win { side: Side::X };

    f.sessions.conclude(&mut session, win).await.unwrap();
    let again = f.sessions.conclude(&mut session, win).await;

    assert!(matches!(again, Err(SessionError::WrongStatus { .. })));
    let top = f.sessions.leaderboard().top(10).await.unwrap();
    assert_eq!(top[0].score, 1);
}

#[tokio::test]
async fn test_apply_move_after_conclusion_rejected() {
    let f = fixture().await;
    for (who, pos) in [(&f.a, 0), (&f.b, 3), (&f.a, 1), (&f.b, 4), (&f.a, 2)] {
        f.sessions.apply_move(who, &f.session.id, pos).await.unwrap();
    }
    let result = f.sessions.apply_move(&f.b, &f.session.id, 8).await;
    assert!(matches!(result, Err(SessionError::WrongStatus { .. })));
}

#[tokio::test]
async fn test_apply_move_store_unreachable_leaves_state_unchanged() {
    let f = fixture().await;
    f.store.set_reachable(false);
    let result = f.sessions.apply_move(&f.a, &f.session.id, 0).await;
    assert!(matches!(result, Err(SessionError::Store(_))));
    assert!(!result.unwrap_err().is_rejection());

    f.store.set_reachable(true);
    let stored = f.sessions.get(&f.session.id).await.unwrap().unwrap();
    assert_eq!(stored, f.session);
}

// =====================================================================
// mark_disconnected() / forfeit() / resume()
// =====================================================================

#[tokio::test]
async fn test_mark_disconnected_active_session_sets_side_and_publishes() {
    let f = fixture().await;
    let mut sub = f.store.subscribe(keys::SESSION_TOPIC_PREFIX).await.unwrap();

    let side = f.sessions.mark_disconnected(&f.b, &f.session.id).await.unwrap();
    assert_eq!(side, Some(Side::O));

    let published = next_update(&mut sub).await;
    assert_eq!(published.status, SessionStatus::Disconnected { side: Side::O });
}

#[tokio::test]
async fn test_mark_disconnected_concluded_session_is_noop() {
    let f = fixture().await;
    let mut session = f.session.clone();
    session.status = SessionStatus::Concluded {
        outcome: Outcome::Draw,
    };
    f.sessions.put(&session).await.unwrap();

    let side = f.sessions.mark_disconnected(&f.a, &f.session.id).await.unwrap();
    assert_eq!(side, None);
}

#[tokio::test]
async fn test_forfeit_still_disconnected_awards_other_side() {
    let f = fixture().await;
    f.sessions.mark_disconnected(&f.a, &f.session.id).await.unwrap();

    let concluded = f
        .sessions
        .forfeit(&f.session.id, Side::X)
        .await
        .unwrap()
        .expect("should forfeit");

    assert_eq!(
        concluded.status,
        SessionStatus::Concluded {
            outcome: Outcome::Forfeit { winner: Side::O }
        }
    );
    let stored = f.sessions.get(&f.session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, concluded.status);
    assert!(!f.store.set_contains(keys::IN_SESSION, "p2").await.unwrap());
}

#[tokio::test]
async fn test_forfeit_after_resume_does_nothing() {
    let f = fixture().await;
    f.sessions.mark_disconnected(&f.a, &f.session.id).await.unwrap();
    f.sessions.resume(&f.a, &f.session.id).await.unwrap();

    let result = f.sessions.forfeit(&f.session.id, Side::X).await.unwrap();
    assert!(result.is_none());
    let stored = f.sessions.get(&f.session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Active);
}

#[tokio::test]
async fn test_resume_by_the_connected_side_rejected() {
    let f = fixture().await;
    f.sessions.mark_disconnected(&f.a, &f.session.id).await.unwrap();

    let result = f.sessions.resume(&f.b, &f.session.id).await;
    assert!(matches!(result, Err(SessionError::WrongStatus { .. })));
}

#[tokio::test]
async fn test_resume_active_session_rejected() {
    let f = fixture().await;
    let result = f.sessions.resume(&f.a, &f.session.id).await;
    assert!(matches!(result, Err(SessionError::WrongStatus { .. })));
}
