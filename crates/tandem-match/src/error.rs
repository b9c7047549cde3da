//! Error types for matchmaking.

use tandem_protocol::ProtocolError;
use tandem_session::SessionError;
use tandem_store::StoreError;

/// Errors that abort a submit, withdraw or tick.
///
/// A tick that fails part-way has already rolled its current pair back
/// (as far as the store allows) before returning one of these.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Persisting the new session failed.
    #[error("could not create session: {0}")]
    Session(#[from] SessionError),

    #[error(transparent)]
    Codec(#[from] ProtocolError),
}
