//! `TandemServer` builder and accept loop.
//!
//! Building a server wires one instance of every per-process component
//! together:
//!
//! ```text
//!                ┌──────────── evictions ───────────┐
//!                │                                  ▼
//! transport → handlers → registry ◄── bridge   supervisor
//!                │          ▲           ▲          │
//!                ▼          │           │          ▼
//!            matchmaker ────┘     shared store ◄───┘
//! ```
//!
//! Several servers (in one process or many) may share one store; they
//! then behave as one horizontally scaled service.

use std::sync::Arc;

use tandem_match::{MatchConfig, Matchmaker};
use tandem_protocol::JsonCodec;
use tandem_session::{RuleEngine, SessionConfig, SessionStore};
use tandem_store::{SharedStore, keys};
use tandem_transport::{Transport, WebSocketTransport};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::handler::handle_connection;
use crate::supervisor::Supervisor;
use crate::{RegistryHandle, TandemError, bridge};

/// Server-wide settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Messages buffered per connection before it is dropped as too slow.
    /// Default: 256.
    pub outbound_capacity: usize,
    /// Entries returned for `get_leaderboard`. Default: 10.
    pub leaderboard_size: usize,
    pub session: SessionConfig,
    pub matchmaking: MatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            leaderboard_size: 10,
            session: SessionConfig::default(),
            matchmaking: MatchConfig::default(),
        }
    }
}

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<G, S> {
    pub(crate) registry: RegistryHandle,
    pub(crate) sessions: SessionStore<G, S>,
    pub(crate) matchmaker: Matchmaker<G, S>,
    pub(crate) supervisor: Supervisor<G, S>,
    pub(crate) codec: JsonCodec,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a Tandem server.
///
/// # Example
///
/// ```rust,no_run
/// use tandem::prelude::*;
///
/// # async fn start() -> Result<(), TandemError> {
/// let server = TandemServer::builder()
///     .bind("0.0.0.0:8080")
///     .build::<TicTacToe, _>(MemoryStore::new())
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct TandemServerBuilder {
    bind_addr: String,
    config: ServerConfig,
}

impl TandemServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            config: ServerConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Connects everything and starts the background tasks.
    ///
    /// Fails if the store does not answer a ping, the address cannot be
    /// bound, or the session update feed cannot be subscribed.
    pub async fn build<G: RuleEngine, S: SharedStore>(
        self,
        store: S,
    ) -> Result<TandemServer<G, S>, TandemError> {
        store.ping().await.inspect_err(|e| {
            tracing::error!(error = %e, "shared store unreachable at startup");
        })?;

        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let feed = store.subscribe(keys::SESSION_TOPIC_PREFIX).await?;

        let (eviction_tx, eviction_rx) = mpsc::unbounded_channel();
        let registry = RegistryHandle::spawn(self.config.outbound_capacity, eviction_tx);
        let sessions = SessionStore::<G, S>::new(store.clone());
        let matchmaker = Matchmaker::<G, S>::new(store, self.config.matchmaking.clone());
        let supervisor = Supervisor::new(
            sessions.clone(),
            matchmaker.clone(),
            self.config.session.reconnect_grace,
        );

        let tasks = vec![
            tokio::spawn(supervisor.clone().run(eviction_rx)),
            tokio::spawn(bridge::run(feed, registry.clone())),
            tokio::spawn(matchmaker.clone().run(registry.clone())),
        ];

        let state = Arc::new(ServerState {
            registry,
            sessions,
            matchmaker,
            supervisor,
            codec: JsonCodec,
            config: self.config,
        });

        tracing::info!(addr = %self.bind_addr, "tandem server built");
        Ok(TandemServer {
            transport,
            state,
            tasks,
        })
    }
}

impl Default for TandemServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A built Tandem server.
///
/// Call [`run()`](Self::run) to start accepting connections. Dropping the
/// server stops its background tasks.
pub struct TandemServer<G, S> {
    transport: WebSocketTransport,
    state: Arc<ServerState<G, S>>,
    tasks: Vec<JoinHandle<()>>,
}

impl TandemServer<(), ()> {
    /// Creates a new builder. The engine and store types are chosen by
    /// [`TandemServerBuilder::build`].
    pub fn builder() -> TandemServerBuilder {
        TandemServerBuilder::new()
    }
}

impl<G: RuleEngine, S: SharedStore> TandemServer<G, S> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop, spawning one handler task per connection.
    /// Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), TandemError> {
        tracing::info!("tandem server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

impl<G, S> Drop for TandemServer<G, S> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
