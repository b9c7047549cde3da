//! Per-connection handler: registration, the write loop, and message
//! dispatch.
//!
//! Each accepted connection gets two Tokio tasks:
//!   1. this handler, which reads client messages and dispatches them
//!   2. a writer, which drains the connection's outbound queue into the
//!      socket and closes the socket once the queue is closed
//!
//! The registry owns the queue's sending half, so removing a connection
//! from the registry (slow consumer, identity moved elsewhere, or this
//! handler unregistering) is what shuts the writer down.

use std::sync::Arc;

use tandem_protocol::{
    ClientMessage, Codec, FindMatchRequest, MoveRequest, ReconnectRequest, ServerMessage,
};
use tandem_session::RuleEngine;
use tandem_store::SharedStore;
use tandem_transport::{Connection, ConnectionId, WebSocketConnection};

use crate::registry::Outbound;
use crate::server::ServerState;
use crate::TandemError;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<G, S>(
    conn: WebSocketConnection,
    state: Arc<ServerState<G, S>>,
) -> Result<(), TandemError>
where
    G: RuleEngine,
    S: SharedStore,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let outbound = state.registry.register(conn_id).await?;
    let writer = tokio::spawn(write_loop(Arc::clone(&conn), outbound));

    let result = read_loop(&conn, &state).await;

    // Unregistering closes the outbound queue, which stops the writer.
    state.registry.unregister(conn_id).await?;
    let _ = writer.await;

    tracing::debug!(%conn_id, "connection handler finished");
    result
}

async fn write_loop(conn: Arc<WebSocketConnection>, mut outbound: Outbound) {
    let conn_id = conn.id();
    while let Some(bytes) = outbound.recv().await {
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(%conn_id, error = %e, "send failed, writer stopping");
            break;
        }
    }
    let _ = conn.close().await;
}

async fn read_loop<G, S>(
    conn: &WebSocketConnection,
    state: &ServerState<G, S>,
) -> Result<(), TandemError>
where
    G: RuleEngine,
    S: SharedStore,
{
    let conn_id = conn.id();

    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(%conn_id, "connection closed");
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                return Ok(());
            }
        };

        let msg: ClientMessage = match state.codec.decode(&data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "malformed message dropped");
                continue;
            }
        };

        dispatch(conn_id, msg, state).await?;
    }
}

/// Routes one decoded message. Only a dead registry is an error here;
/// everything else is logged and the connection carries on.
async fn dispatch<G, S>(
    conn_id: ConnectionId,
    msg: ClientMessage,
    state: &ServerState<G, S>,
) -> Result<(), TandemError>
where
    G: RuleEngine,
    S: SharedStore,
{
    match msg {
        ClientMessage::FindMatch(FindMatchRequest {
            identity,
            display_name,
        }) => {
            state
                .registry
                .bind_identity(conn_id, identity.clone())
                .await?;
            if let Err(e) = state.matchmaker.submit(&identity, &display_name).await {
                tracing::warn!(%conn_id, %identity, error = %e, "find_match failed");
            }
        }

        ClientMessage::Move(MoveRequest {
            session_id,
            position,
        }) => {
            let Some(mover) = state.registry.identity_of(conn_id).await? else {
                tracing::debug!(%conn_id, "move from a connection with no identity dropped");
                return Ok(());
            };
            match state
                .sessions
                .apply_move(&mover, &session_id, position)
                .await
            {
                Ok(_) => {}
                Err(e) if e.is_rejection() => {
                    tracing::debug!(%conn_id, %mover, session = %session_id, reason = %e, "move rejected");
                }
                Err(e) => {
                    tracing::warn!(%conn_id, %mover, session = %session_id, error = %e, "move failed");
                }
            }
        }

        ClientMessage::GetLeaderboard => {
            let entries = match state
                .sessions
                .leaderboard()
                .top(state.config.leaderboard_size)
                .await
            {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(%conn_id, error = %e, "leaderboard unavailable");
                    return Ok(());
                }
            };
            let reply = state
                .codec
                .encode(&ServerMessage::<G::State>::LeaderboardUpdate(entries))?;
            state.registry.send_to_connection(conn_id, reply).await?;
        }

        // Validated before anything is bound, so a rejected reconnect leaves
        // any live connection for the identity alone.
        ClientMessage::Reconnect(ReconnectRequest {
            identity,
            session_id,
        }) => {
            match state.supervisor.reconnect(&identity, &session_id).await {
                Ok(session) => {
                    let bound = state
                        .registry
                        .bind_identity(conn_id, identity.clone())
                        .await;
                    // If the identity did not end up bound here, the
                    // registry hands the session back to the supervisor.
                    let attached = state
                        .registry
                        .bind_session(identity.clone(), session_id.clone())
                        .await?;
                    bound?;
                    if !attached {
                        return Ok(());
                    }
                    if let Err(e) = state.sessions.publish(&session).await {
                        tracing::warn!(%identity, session = %session_id, error = %e, "could not publish reconnect");
                    }
                }
                Err(e) if e.is_rejection() => {
                    tracing::debug!(%identity, session = %session_id, reason = %e, "reconnect rejected");
                }
                Err(e) => {
                    tracing::warn!(%identity, session = %session_id, error = %e, "reconnect failed");
                }
            }
        }
    }

    Ok(())
}
