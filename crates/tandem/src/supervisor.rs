//! Disconnect supervisor.
//!
//! Consumes [`Eviction`]s from the registry. An evicted identity always
//! leaves the waiting queue. If it was in an active session, the session
//! is marked `Disconnected` on that side and a forfeit timer is armed:
//!
//! ```text
//!   Active ──(eviction)──→ Disconnected{side} ──(grace elapsed)──→ Concluded(Forfeit)
//!     ↑                            │
//!     └────────(reconnect)─────────┘
//! ```
//!
//! Timers are keyed by `(identity, session)`. Arming a key again aborts the
//! previous timer; a successful reconnect aborts it too. A timer that does
//! fire re-reads the session and only forfeits if it is still disconnected
//! on the same side.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tandem_match::Matchmaker;
use tandem_protocol::{Identity, Session, SessionId, Side};
use tandem_session::{RuleEngine, SessionError, SessionStore};
use tandem_store::SharedStore;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::{Eviction, EvictionReason};

type TimerKey = (Identity, SessionId);

pub(crate) struct Supervisor<G, S> {
    sessions: SessionStore<G, S>,
    matchmaker: Matchmaker<G, S>,
    grace: Duration,
    timers: Arc<Mutex<HashMap<TimerKey, JoinHandle<()>>>>,
}

impl<G, S: Clone> Clone for Supervisor<G, S> {
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
            matchmaker: self.matchmaker.clone(),
            grace: self.grace,
            timers: Arc::clone(&self.timers),
        }
    }
}

impl<G: RuleEngine, S: SharedStore> Supervisor<G, S> {
    pub(crate) fn new(
        sessions: SessionStore<G, S>,
        matchmaker: Matchmaker<G, S>,
        grace: Duration,
    ) -> Self {
        Self {
            sessions,
            matchmaker,
            grace,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Handles evictions until the registry goes away.
    pub(crate) async fn run(self, mut evictions: mpsc::UnboundedReceiver<Eviction>) {
        tracing::debug!(grace = ?self.grace, "disconnect supervisor started");
        while let Some(eviction) = evictions.recv().await {
            self.handle_eviction(eviction).await;
        }
        tracing::debug!("disconnect supervisor stopped");
    }

    pub(crate) async fn handle_eviction(&self, eviction: Eviction) {
        let Eviction {
            connection,
            identity,
            session,
            reason,
        } = eviction;
        match reason {
            EvictionReason::Closed => tracing::info!(?connection, %identity, "identity disconnected"),
            EvictionReason::Overflow => tracing::warn!(?connection, %identity, "identity evicted as too slow"),
            EvictionReason::Rebound => tracing::info!(?connection, %identity, "identity released by its connection"),
            EvictionReason::Absent => tracing::warn!(%identity, ?session, "identity left before its session was attached"),
        }

        if let Err(e) = self.matchmaker.withdraw(&identity).await {
            tracing::warn!(%identity, error = %e, "could not withdraw evicted identity from the queue");
        }

        let Some(session) = session else {
            return;
        };
        match self.sessions.mark_disconnected(&identity, &session).await {
            Ok(Some(side)) => self.arm(identity, session, side).await,
            Ok(None) => {
                tracing::debug!(%identity, %session, "no active session to suspend");
            }
            Err(e) => {
                tracing::warn!(%identity, %session, error = %e, "could not mark session disconnected");
            }
        }
    }

    /// Brings `identity` back into `session` and cancels its forfeit timer.
    ///
    /// The caller binds the new connection and publishes the session.
    pub(crate) async fn reconnect(
        &self,
        identity: &Identity,
        session: &SessionId,
    ) -> Result<Session<G::State>, SessionError> {
        let resumed = self.sessions.resume(identity, session).await?;
        let key = (identity.clone(), session.clone());
        if let Some(timer) = self.timers.lock().await.remove(&key) {
            timer.abort();
            tracing::debug!(%identity, %session, "forfeit timer cancelled");
        }
        Ok(resumed)
    }

    /// Number of armed (not yet fired or cancelled) timers.
    #[cfg(test)]
    pub(crate) async fn pending_timers(&self) -> usize {
        self.timers.lock().await.len()
    }

    async fn arm(&self, identity: Identity, session: SessionId, side: Side) {
        let key = (identity.clone(), session.clone());
        let supervisor = self.clone();
        let timer_key = key.clone();

        let timer = tokio::spawn(async move {
            tokio::time::sleep(supervisor.grace).await;
            supervisor.timers.lock().await.remove(&timer_key);
            supervisor.expire(&timer_key.0, &timer_key.1, side).await;
        });

        if let Some(previous) = self.timers.lock().await.insert(key, timer) {
            previous.abort();
            tracing::debug!(%identity, %session, "forfeit timer re-armed");
        }
        tracing::info!(%identity, %session, %side, grace = ?self.grace, "forfeit timer armed");
    }

    async fn expire(&self, identity: &Identity, session: &SessionId, side: Side) {
        match self.sessions.forfeit(session, side).await {
            Ok(Some(concluded)) => {
                tracing::info!(%identity, %session, status = ?concluded.status, "session forfeited");
            }
            Ok(None) => {
                tracing::info!(%identity, %session, "grace elapsed but session no longer waiting, nothing to do");
            }
            Err(e) => {
                tracing::warn!(%identity, %session, error = %e, "forfeit failed");
            }
        }
    }
}
