//! The shared waiting queue and the scheduler that drains it.
//!
//! Three store structures are involved:
//!
//! ```text
//! queue:waiting       list  FIFO of identities waiting for a peer
//! queue:inqueue       set   same identities, for O(1) duplicate checks
//! session:inprogress  set   identities currently paired
//! ```
//!
//! An identity is in at most one of {waiting queue, in-session set} at any
//! time. `submit` guarantees it on the way in; `tick` moves identities
//! from the first to the second and back again on rollback.
//!
//! While a pair is being formed both identities are off the list but still
//! in `queue:inqueue`, which only loses them once their session is stored.
//! A `withdraw` in that window clears the marker, and rollback does not
//! re-queue an identity whose marker is gone.

use tandem_protocol::{Codec, Identity, JsonCodec, ServerMessage, Session};
use tandem_session::{RuleEngine, SessionStore, generate_session_id};
use tandem_store::{SharedStore, keys};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{MatchConfig, MatchError, Presence};

/// Pairs waiting identities into sessions played under engine `G`.
pub struct Matchmaker<G, S> {
    store: S,
    sessions: SessionStore<G, S>,
    codec: JsonCodec,
    config: MatchConfig,
}

impl<G, S: Clone> Clone for Matchmaker<G, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            sessions: self.sessions.clone(),
            codec: self.codec,
            config: self.config.clone(),
        }
    }
}

impl<G: RuleEngine, S: SharedStore> Matchmaker<G, S> {
    pub fn new(store: S, config: MatchConfig) -> Self {
        Self {
            sessions: SessionStore::new(store.clone()),
            store,
            codec: JsonCodec,
            config,
        }
    }

    /// Puts `identity` on the waiting queue.
    ///
    /// Returns `false` (and changes nothing) if the identity is already
    /// queued or already in a session.
    pub async fn submit(
        &self,
        identity: &Identity,
        display_name: &str,
    ) -> Result<bool, MatchError> {
        let id = identity.as_str();

        if self.store.set_contains(keys::IN_SESSION, id).await? {
            info!(%identity, "match request ignored: already in a session");
            return Ok(false);
        }
        if !self.store.set_add(keys::IN_QUEUE, id).await? {
            debug!(%identity, "match request ignored: already queued");
            return Ok(false);
        }

        let queued = async {
            self.sessions
                .leaderboard()
                .set_display_name(identity, display_name)
                .await?;
            self.store.list_push(keys::WAITING_QUEUE, id).await
        };
        match queued.await {
            Ok(len) => {
                info!(%identity, queue_len = len, "identity queued for a match");
                Ok(true)
            }
            Err(e) => {
                // Undo the claim so a retry is not mistaken for a duplicate.
                let _ = self.store.set_remove(keys::IN_QUEUE, id).await;
                Err(e.into())
            }
        }
    }

    /// Takes `identity` off the waiting queue, if it is there.
    pub async fn withdraw(&self, identity: &Identity) -> Result<(), MatchError> {
        let id = identity.as_str();
        let removed = self.store.list_remove(keys::WAITING_QUEUE, id).await?;
        self.store.set_remove(keys::IN_QUEUE, id).await?;
        if removed > 0 {
            info!(%identity, "identity withdrawn from the queue");
        }
        Ok(())
    }

    /// Runs one matchmaking pass. Returns the number of sessions formed.
    ///
    /// At most `len / 2` pairs are attempted, where `len` is the queue
    /// length when the pass starts. The first pair that cannot be formed
    /// here is put back on the queue and ends the pass.
    pub async fn tick<P: Presence>(&self, presence: &P) -> Result<usize, MatchError> {
        let budget = self.store.list_len(keys::WAITING_QUEUE).await? / 2;
        let mut formed = 0;

        for _ in 0..budget {
            let Some((a, b)) = self.pop_pair().await? else {
                break;
            };

            match self.form_session(&a, &b, presence).await {
                Ok(true) => formed += 1,
                Ok(false) => {
                    debug!(%a, %b, "pair not held locally, returning to queue");
                    self.roll_back(&a, &b).await?;
                    break;
                }
                Err(e) => {
                    warn!(%a, %b, error = %e, "failed to form session, returning pair to queue");
                    self.roll_back(&a, &b).await?;
                    break;
                }
            }
        }

        Ok(formed)
    }

    /// Ticks every `config.interval`, forever.
    pub async fn run<P: Presence>(self, presence: P) {
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval = ?self.config.interval, "matchmaking loop started");

        loop {
            interval.tick().await;
            match self.tick(&presence).await {
                Ok(0) => {}
                Ok(formed) => info!(formed, "matchmaking tick formed sessions"),
                Err(e) => warn!(error = %e, "matchmaking tick failed"),
            }
        }
    }

    /// Pops the two oldest identities. If only one is there, it goes back
    /// to the front of the queue.
    async fn pop_pair(&self) -> Result<Option<(Identity, Identity)>, MatchError> {
        let Some(first) = self.store.list_pop_oldest(keys::WAITING_QUEUE).await? else {
            return Ok(None);
        };
        let second = match self.store.list_pop_oldest(keys::WAITING_QUEUE).await {
            Ok(Some(second)) => second,
            Ok(None) => {
                self.store.list_push_oldest(keys::WAITING_QUEUE, &first).await?;
                return Ok(None);
            }
            Err(e) => {
                let _ = self.store.list_push_oldest(keys::WAITING_QUEUE, &first).await;
                return Err(e.into());
            }
        };
        Ok(Some((Identity::new(first), Identity::new(second))))
    }

    /// Marks the pair in-session and, if both are local, creates, binds and
    /// announces their session. `Ok(false)` means "not ours to form".
    ///
    /// The session is stored before it is bound. A participant whose
    /// connection is gone by then is reported by the presence layer, which
    /// suspends the session on its side.
    async fn form_session<P: Presence>(
        &self,
        a: &Identity,
        b: &Identity,
        presence: &P,
    ) -> Result<bool, MatchError> {
        for identity in [a, b] {
            self.store.set_add(keys::IN_SESSION, identity.as_str()).await?;
        }

        if !(presence.is_local(a).await && presence.is_local(b).await) {
            return Ok(false);
        }

        let names = self.sessions.leaderboard().display_names(&[a, b]).await?;
        let [name_a, name_b]: [String; 2] = names
            .try_into()
            .unwrap_or_else(|_| [String::new(), String::new()]);
        let session = Session::new(
            generate_session_id(),
            a.clone(),
            b.clone(),
            name_a,
            name_b,
            G::init(),
        );
        self.sessions.put(&session).await?;

        for identity in [a, b] {
            if let Err(e) = self.store.set_remove(keys::IN_QUEUE, identity.as_str()).await {
                warn!(%identity, error = %e, "could not clear queue marker of a paired identity");
            }
        }
        for identity in [a, b] {
            if !presence.bind_session(identity, &session.id).await {
                warn!(%identity, session = %session.id, "connection gone before session could be bound");
            }
        }

        let payload = self.codec.encode(&ServerMessage::MatchFound(session.clone()))?;
        presence.deliver(a, payload.clone()).await;
        presence.deliver(b, payload).await;

        info!(session = %session.id, x = %a, o = %b, "session formed");
        Ok(true)
    }

    /// Undoes `form_session`'s bookkeeping: both identities go back to the
    /// newest end of the queue, `a` ahead of `b`, unless they were withdrawn
    /// in the meantime.
    ///
    /// Each identity is pushed first and its queue marker checked after, so
    /// a `withdraw` racing with the push either removes the entry itself or
    /// has already cleared the marker. The in-session mark is dropped last,
    /// which keeps `submit` out until the queue is settled.
    async fn roll_back(&self, a: &Identity, b: &Identity) -> Result<(), MatchError> {
        for identity in [a, b] {
            let id = identity.as_str();
            self.store.list_push(keys::WAITING_QUEUE, id).await?;
            if !self.store.set_contains(keys::IN_QUEUE, id).await? {
                self.store.list_remove(keys::WAITING_QUEUE, id).await?;
                debug!(%identity, "identity withdrawn while being paired, not re-queued");
            }
            self.store.set_remove(keys::IN_SESSION, id).await?;
        }
        Ok(())
    }
}
