//! Connection registry: an actor that owns every live connection of this
//! process.
//!
//! All reads and writes go through one task, fed by an mpsc channel, so
//! the map of connections is never touched concurrently. Callers hold a
//! cheap [`RegistryHandle`] and send it commands; commands that need an
//! answer carry a `oneshot` reply channel.
//!
//! Each registered connection owns a bounded outbound queue. Delivery uses
//! `try_send`: a connection whose queue is full is too slow to keep, so it
//! is dropped from the registry (which closes the queue and, in turn, the
//! socket) instead of stalling the actor.
//!
//! When an identity loses its local connection for any reason other than
//! moving to a newer connection, an [`Eviction`] is handed to the
//! disconnect supervisor. That covers a connection closing or falling
//! behind, a connection switching to another identity, and a session being
//! attached to an identity that is no longer connected here.

use std::collections::HashMap;

use tandem_match::Presence;
use tandem_protocol::{Identity, SessionId};
use tandem_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};

use crate::RegistryError;

/// Depth of the registry's command channel.
const COMMAND_BUFFER: usize = 1024;

/// Receiving end of a connection's outbound queue.
pub type Outbound = mpsc::Receiver<Vec<u8>>;

/// Why a bound connection left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// The connection was closed or its reader stopped.
    Closed,
    /// The connection could not keep up with its outbound queue.
    Overflow,
    /// The connection went on as a different identity.
    Rebound,
    /// A session was attached to the identity after its connection was
    /// already gone.
    Absent,
}

/// Notice that an identity lost its connection on this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    /// The connection the identity was bound to. `None` for
    /// [`EvictionReason::Absent`].
    pub connection: Option<ConnectionId>,
    pub identity: Identity,
    /// The session the connection was bound to, if any.
    pub session: Option<SessionId>,
    pub reason: EvictionReason,
}

enum Command {
    Register {
        connection: ConnectionId,
        reply: oneshot::Sender<Result<Outbound, RegistryError>>,
    },
    Unregister {
        connection: ConnectionId,
        reply: oneshot::Sender<()>,
    },
    BindIdentity {
        connection: ConnectionId,
        identity: Identity,
        reply: oneshot::Sender<Result<(), RegistryError>>,
    },
    BindSession {
        identity: Identity,
        session: SessionId,
        reply: oneshot::Sender<bool>,
    },
    DeliverToIdentity {
        identity: Identity,
        payload: Vec<u8>,
        reply: oneshot::Sender<bool>,
    },
    SendToConnection {
        connection: ConnectionId,
        payload: Vec<u8>,
        reply: oneshot::Sender<bool>,
    },
    IdentityOf {
        connection: ConnectionId,
        reply: oneshot::Sender<Option<Identity>>,
    },
    IsLocal {
        identity: Identity,
        reply: oneshot::Sender<bool>,
    },
    Len {
        reply: oneshot::Sender<usize>,
    },
}

/// Handle to the registry actor. Cheap to clone.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<Command>,
}

impl RegistryHandle {
    /// Starts a registry actor.
    ///
    /// `outbound_capacity` bounds each connection's outbound queue.
    /// Evictions are sent on `evictions`. The actor stops once every
    /// handle has been dropped.
    pub fn spawn(
        outbound_capacity: usize,
        evictions: mpsc::UnboundedSender<Eviction>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
        let actor = RegistryActor {
            connections: HashMap::new(),
            identities: HashMap::new(),
            outbound_capacity: outbound_capacity.max(1),
            evictions,
            receiver,
        };
        tokio::spawn(actor.run());
        Self { sender }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RegistryError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| RegistryError::Closed)?;
        reply_rx.await.map_err(|_| RegistryError::Closed)
    }

    /// Adds a connection with no identity. Returns its outbound queue.
    pub async fn register(&self, connection: ConnectionId) -> Result<Outbound, RegistryError> {
        self.request(|reply| Command::Register { connection, reply })
            .await?
    }

    /// Removes a connection and closes its outbound queue. Unknown
    /// connections are ignored.
    pub async fn unregister(&self, connection: ConnectionId) -> Result<(), RegistryError> {
        self.request(|reply| Command::Unregister { connection, reply })
            .await
    }

    /// Binds `identity` to `connection`. Any older local connection bound
    /// to the same identity is closed. If `connection` was bound to another
    /// identity, that identity is evicted.
    pub async fn bind_identity(
        &self,
        connection: ConnectionId,
        identity: Identity,
    ) -> Result<(), RegistryError> {
        self.request(|reply| Command::BindIdentity {
            connection,
            identity,
            reply,
        })
        .await?
    }

    /// Records `session` on the connection bound to `identity`.
    ///
    /// Returns `false` if the identity is not bound here. The identity is
    /// then reported to the supervisor as evicted from `session`, so the
    /// session is suspended instead of left waiting on nobody.
    pub async fn bind_session(
        &self,
        identity: Identity,
        session: SessionId,
    ) -> Result<bool, RegistryError> {
        self.request(|reply| Command::BindSession {
            identity,
            session,
            reply,
        })
        .await
    }

    /// Queues `payload` for the connection bound to `identity`. Returns
    /// whether it was queued.
    pub async fn deliver_to_identity(
        &self,
        identity: Identity,
        payload: Vec<u8>,
    ) -> Result<bool, RegistryError> {
        self.request(|reply| Command::DeliverToIdentity {
            identity,
            payload,
            reply,
        })
        .await
    }

    /// Queues `payload` for `connection`. Returns whether it was queued.
    pub async fn send_to_connection(
        &self,
        connection: ConnectionId,
        payload: Vec<u8>,
    ) -> Result<bool, RegistryError> {
        self.request(|reply| Command::SendToConnection {
            connection,
            payload,
            reply,
        })
        .await
    }

    pub async fn identity_of(
        &self,
        connection: ConnectionId,
    ) -> Result<Option<Identity>, RegistryError> {
        self.request(|reply| Command::IdentityOf { connection, reply })
            .await
    }

    pub async fn is_local(&self, identity: Identity) -> Result<bool, RegistryError> {
        self.request(|reply| Command::IsLocal { identity, reply })
            .await
    }

    /// Number of registered connections.
    pub async fn len(&self) -> Result<usize, RegistryError> {
        self.request(|reply| Command::Len { reply }).await
    }
}

impl Presence for RegistryHandle {
    async fn is_local(&self, identity: &Identity) -> bool {
        RegistryHandle::is_local(self, identity.clone())
            .await
            .unwrap_or(false)
    }

    async fn bind_session(&self, identity: &Identity, session: &SessionId) -> bool {
        RegistryHandle::bind_session(self, identity.clone(), session.clone())
            .await
            .unwrap_or(false)
    }

    async fn deliver(&self, identity: &Identity, payload: Vec<u8>) {
        if let Err(e) = self.deliver_to_identity(identity.clone(), payload).await {
            tracing::warn!(%identity, error = %e, "delivery failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct Entry {
    identity: Option<Identity>,
    session: Option<SessionId>,
    outbound: mpsc::Sender<Vec<u8>>,
}

struct RegistryActor {
    connections: HashMap<ConnectionId, Entry>,
    /// identity → the one connection bound to it.
    identities: HashMap<Identity, ConnectionId>,
    outbound_capacity: usize,
    evictions: mpsc::UnboundedSender<Eviction>,
    receiver: mpsc::Receiver<Command>,
}

impl RegistryActor {
    async fn run(mut self) {
        tracing::debug!("connection registry started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                Command::Register { connection, reply } => {
                    let _ = reply.send(self.register(connection));
                }
                Command::Unregister { connection, reply } => {
                    self.remove(connection, Some(EvictionReason::Closed));
                    let _ = reply.send(());
                }
                Command::BindIdentity {
                    connection,
                    identity,
                    reply,
                } => {
                    let _ = reply.send(self.bind_identity(connection, identity));
                }
                Command::BindSession {
                    identity,
                    session,
                    reply,
                } => {
                    let _ = reply.send(self.bind_session(&identity, session));
                }
                Command::DeliverToIdentity {
                    identity,
                    payload,
                    reply,
                } => {
                    let delivered = match self.identities.get(&identity) {
                        Some(&connection) => self.deliver(connection, payload),
                        None => false,
                    };
                    let _ = reply.send(delivered);
                }
                Command::SendToConnection {
                    connection,
                    payload,
                    reply,
                } => {
                    let _ = reply.send(self.deliver(connection, payload));
                }
                Command::IdentityOf { connection, reply } => {
                    let identity = self
                        .connections
                        .get(&connection)
                        .and_then(|e| e.identity.clone());
                    let _ = reply.send(identity);
                }
                Command::IsLocal { identity, reply } => {
                    let _ = reply.send(self.identities.contains_key(&identity));
                }
                Command::Len { reply } => {
                    let _ = reply.send(self.connections.len());
                }
            }
        }

        tracing::debug!("connection registry stopped");
    }

    fn register(&mut self, connection: ConnectionId) -> Result<Outbound, RegistryError> {
        if self.connections.contains_key(&connection) {
            return Err(RegistryError::AlreadyRegistered(connection));
        }
        let (outbound, receiver) = mpsc::channel(self.outbound_capacity);
        self.connections.insert(
            connection,
            Entry {
                identity: None,
                session: None,
                outbound,
            },
        );
        tracing::debug!(%connection, total = self.connections.len(), "connection registered");
        Ok(receiver)
    }

    fn bind_identity(
        &mut self,
        connection: ConnectionId,
        identity: Identity,
    ) -> Result<(), RegistryError> {
        let Some(entry) = self.connections.get(&connection) else {
            return Err(RegistryError::UnknownConnection(connection));
        };
        if entry.identity.as_ref() == Some(&identity) {
            return Ok(());
        }
        let previous = entry.identity.clone();
        let previous_session = entry.session.clone();

        // This connection switches identity: the old one loses its
        // connection here just as if it had closed.
        if let Some(previous) = previous {
            if self.identities.get(&previous) == Some(&connection) {
                self.identities.remove(&previous);
            }
            tracing::info!(%connection, from = %previous, to = %identity, "connection switched identity");
            self.evict(Eviction {
                connection: Some(connection),
                identity: previous,
                session: previous_session,
                reason: EvictionReason::Rebound,
            });
        }

        // The identity moves here from an older connection, which is closed
        // without an eviction. Its session, if any, moves along.
        let mut inherited = None;
        if let Some(older) = self.identities.insert(identity.clone(), connection) {
            if let Some(old) = self.remove(older, None) {
                inherited = old.session;
            }
            tracing::info!(%identity, from = %older, to = %connection, "identity moved to a new connection");
        }

        if let Some(entry) = self.connections.get_mut(&connection) {
            entry.identity = Some(identity.clone());
            entry.session = inherited;
        }
        tracing::debug!(%connection, %identity, "identity bound");
        Ok(())
    }

    fn bind_session(&mut self, identity: &Identity, session: SessionId) -> bool {
        let entry = self
            .identities
            .get(identity)
            .and_then(|connection| self.connections.get_mut(connection));
        if let Some(entry) = entry {
            tracing::debug!(%identity, %session, "session bound");
            entry.session = Some(session);
            return true;
        }

        tracing::warn!(%identity, %session, "identity not connected here, session handed to the supervisor");
        self.evict(Eviction {
            connection: None,
            identity: identity.clone(),
            session: Some(session),
            reason: EvictionReason::Absent,
        });
        false
    }

    fn deliver(&mut self, connection: ConnectionId, payload: Vec<u8>) -> bool {
        let Some(entry) = self.connections.get(&connection) else {
            return false;
        };
        match entry.outbound.try_send(payload) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(%connection, "outbound queue full, dropping slow connection");
                self.remove(connection, Some(EvictionReason::Overflow));
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(%connection, "outbound queue closed, dropping connection");
                self.remove(connection, Some(EvictionReason::Closed));
                false
            }
        }
    }

    /// Removes a connection. Dropping its entry closes the outbound queue.
    /// With a `reason`, a bound identity is handed to the supervisor.
    fn remove(&mut self, connection: ConnectionId, reason: Option<EvictionReason>) -> Option<Entry> {
        let entry = self.connections.remove(&connection)?;

        if let Some(identity) = &entry.identity {
            if self.identities.get(identity) == Some(&connection) {
                self.identities.remove(identity);
            }
            if let Some(reason) = reason {
                self.evict(Eviction {
                    connection: Some(connection),
                    identity: identity.clone(),
                    session: entry.session.clone(),
                    reason,
                });
            }
        }

        tracing::debug!(%connection, total = self.connections.len(), "connection removed");
        Some(entry)
    }

    fn evict(&self, eviction: Eviction) {
        let identity = eviction.identity.clone();
        if self.evictions.send(eviction).is_err() {
            tracing::warn!(%identity, "disconnect supervisor is gone, eviction dropped");
        }
    }
}
