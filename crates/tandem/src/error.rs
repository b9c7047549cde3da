//! Unified error type for Tandem.

use tandem_match::MatchError;
use tandem_protocol::ProtocolError;
use tandem_session::SessionError;
use tandem_store::StoreError;
use tandem_transport::{ConnectionId, TransportError};

/// Errors from the connection registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The registry actor has stopped.
    #[error("connection registry is not running")]
    Closed,

    /// `register` was called twice for the same connection.
    #[error("{0} is already registered")]
    AlreadyRegistered(ConnectionId),

    /// The connection is not (or no longer) registered.
    #[error("{0} is not registered")]
    UnknownConnection(ConnectionId),
}

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` conversions let `?` lift any sub-crate error.
#[derive(Debug, thiserror::Error)]
pub enum TandemError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The shared store failed (at startup this is fatal).
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
