//! Session rows in the shared store.
//!
//! A session is stored as one encoded value under `session:{id}`. Every
//! mutation here is read-modify-write on that whole value; the last writer
//! wins. After each write the full session is published on the session's
//! topic as a `session_update` envelope, which is what the fan-out bridges
//! of every process deliver to the participants.

use std::marker::PhantomData;

use rand::Rng;
use tandem_protocol::{
    Codec, Identity, JsonCodec, Outcome, ServerMessage, Session, SessionId, SessionStatus,
    Side,
};
use tandem_store::{SharedStore, keys};

use crate::{Leaderboard, RuleEngine, SessionError};

/// Reads, mutates and publishes sessions played under engine `G`.
pub struct SessionStore<G, S> {
    store: S,
    leaderboard: Leaderboard<S>,
    codec: JsonCodec,
    _engine: PhantomData<fn() -> G>,
}

// Manual impl: `G` itself need not be `Clone`.
impl<G, S: Clone> Clone for SessionStore<G, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            leaderboard: self.leaderboard.clone(),
            codec: self.codec,
            _engine: PhantomData,
        }
    }
}

impl<G: RuleEngine, S: SharedStore> SessionStore<G, S> {
    pub fn new(store: S) -> Self {
        Self {
            leaderboard: Leaderboard::new(store.clone()),
            store,
            codec: JsonCodec,
            _engine: PhantomData,
        }
    }

    /// The leaderboard that concluded sessions credit.
    pub fn leaderboard(&self) -> &Leaderboard<S> {
        &self.leaderboard
    }

    /// Loads a session. `Ok(None)` if no row exists.
    pub async fn get(
        &self,
        id: &SessionId,
    ) -> Result<Option<Session<G::State>>, SessionError> {
        let Some(bytes) = self.store.get(&keys::session_key(id)).await? else {
            return Ok(None);
        };
        Ok(Some(self.codec.decode(&bytes)?))
    }

    /// Writes the whole session, replacing whatever was there.
    pub async fn put(&self, session: &Session<G::State>) -> Result<(), SessionError> {
        let bytes = self.codec.encode(session)?;
        self.store.set(&keys::session_key(&session.id), bytes).await?;
        tracing::debug!(session = %session.id, status = ?session.status, "session saved");
        Ok(())
    }

    /// Publishes the session as a `session_update` on its topic.
    pub async fn publish(&self, session: &Session<G::State>) -> Result<(), SessionError> {
        let bytes = self
            .codec
            .encode(&ServerMessage::SessionUpdate(session.clone()))?;
        let receivers = self
            .store
            .publish(&keys::session_topic(&session.id), bytes)
            .await?;
        tracing::debug!(session = %session.id, receivers, "session update published");
        Ok(())
    }

    /// Saves then publishes.
    pub async fn commit(&self, session: &Session<G::State>) -> Result<(), SessionError> {
        self.put(session).await?;
        self.publish(session).await
    }

    /// Applies `mover`'s move to a session and commits the result.
    ///
    /// Checks, in order: the session exists, `mover` is a participant, the
    /// session is active, it is `mover`'s turn, and the engine accepts the
    /// position. The first failing check is returned and nothing is
    /// written. A move that ends the session is committed through
    /// [`conclude`](Self::conclude).
    pub async fn apply_move(
        &self,
        mover: &Identity,
        id: &SessionId,
        position: usize,
    ) -> Result<Session<G::State>, SessionError> {
        let mut session = self
            .get(id)
            .await?
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        let side = participant_side(&session, mover)?;

        if !session.status.is_active() {
            return Err(SessionError::WrongStatus {
                session: id.clone(),
                status: session.status,
            });
        }
        if G::turn(&session.state) != side {
            return Err(SessionError::NotYourTurn(mover.clone()));
        }
        G::validate_move(&session.state, position, side).map_err(SessionError::IllegalMove)?;

        session.state = G::apply_move(&session.state, position, side);
        tracing::debug!(session = %id, %mover, position, "move applied");

        match G::outcome(&session.state) {
            Some(outcome) => self.conclude(&mut session, outcome).await?,
            None => self.commit(&session).await?,
        }
        Ok(session)
    }

    /// Concludes the session with `outcome` and commits it.
    ///
    /// The concluded row is saved before anything else changes. Only then
    /// are both participants released, so they can queue again, and the
    /// winner credited. The update is published last. If the save fails,
    /// nobody is credited or released and the stored session is untouched.
    ///
    /// A session that is already concluded is rejected with
    /// [`SessionError::WrongStatus`].
    pub async fn conclude(
        &self,
        session: &mut Session<G::State>,
        outcome: Outcome,
    ) -> Result<(), SessionError> {
        if session.status.is_concluded() {
            return Err(SessionError::WrongStatus {
                session: session.id.clone(),
                status: session.status,
            });
        }

        let mut concluded = session.clone();
        concluded.status = SessionStatus::Concluded { outcome };
        self.put(&concluded).await?;
        *session = concluded;

        self.release(session).await?;
        if let Some(side) = outcome.winner() {
            self.leaderboard.record_win(session.identity_on(side)).await?;
        }
        self.publish(session).await?;
        tracing::info!(session = %session.id, ?outcome, "session concluded");
        Ok(())
    }

    /// Removes both participants from the in-session set.
    pub async fn release(&self, session: &Session<G::State>) -> Result<(), SessionError> {
        for identity in [&session.participant_a, &session.participant_b] {
            self.store.set_remove(keys::IN_SESSION, identity.as_str()).await?;
        }
        Ok(())
    }

    /// Records that `identity` dropped out of an active session and
    /// commits the change.
    ///
    /// Returns the side that disconnected, or `None` when the session is
    /// missing, not active, or `identity` is not in it.
    pub async fn mark_disconnected(
        &self,
        identity: &Identity,
        id: &SessionId,
    ) -> Result<Option<Side>, SessionError> {
        let Some(mut session) = self.get(id).await? else {
            return Ok(None);
        };
        let Some(side) = session.side_of(identity) else {
            return Ok(None);
        };
        if !session.status.is_active() {
            return Ok(None);
        }

        session.status = SessionStatus::Disconnected { side };
        self.commit(&session).await?;
        tracing::info!(session = %id, %identity, %side, "participant disconnected");
        Ok(Some(side))
    }

    /// Forfeits the session to the other side if `side` is still the one
    /// marked disconnected. Returns the concluded session, or `None` when
    /// nothing had to be done (reconnected, already over, or gone).
    pub async fn forfeit(
        &self,
        id: &SessionId,
        side: Side,
    ) -> Result<Option<Session<G::State>>, SessionError> {
        let Some(mut session) = self.get(id).await? else {
            return Ok(None);
        };
        if session.status != (SessionStatus::Disconnected { side }) {
            tracing::debug!(session = %id, status = ?session.status, "forfeit skipped");
            return Ok(None);
        }

        let outcome = Outcome::Forfeit {
            winner: side.other(),
        };
        self.conclude(&mut session, outcome).await?;
        Ok(Some(session))
    }

    /// Brings `identity` back into a session it dropped out of.
    ///
    /// Only valid while the session is `Disconnected` on `identity`'s own
    /// side. On success the session is active again and has been saved
    /// (but not published).
    pub async fn resume(
        &self,
        identity: &Identity,
        id: &SessionId,
    ) -> Result<Session<G::State>, SessionError> {
        let mut session = self
            .get(id)
            .await?
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        let side = participant_side(&session, identity)?;

        if session.status != (SessionStatus::Disconnected { side }) {
            return Err(SessionError::WrongStatus {
                session: id.clone(),
                status: session.status,
            });
        }

        session.status = SessionStatus::Active;
        self.put(&session).await?;
        tracing::info!(session = %id, %identity, "participant reconnected");
        Ok(session)
    }
}

fn participant_side<T>(session: &Session<T>, identity: &Identity) -> Result<Side, SessionError> {
    session
        .side_of(identity)
        .ok_or_else(|| SessionError::NotParticipant {
            identity: identity.clone(),
            session: session.id.clone(),
        })
}

/// Generates a fresh session id: 128 random bits as 32 lowercase hex
/// characters.
pub fn generate_session_id() -> SessionId {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    SessionId::new(bytes.iter().map(|b| format!("{b:02x}")).collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_session_id_is_32_hex_chars() {
        let id = generate_session_id();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_generate_session_id_unique() {
        assert_ne!(generate_session_id(), generate_session_id());
    }
}
