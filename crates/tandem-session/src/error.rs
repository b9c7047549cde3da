//! Error types for the session layer.

use tandem_protocol::{Identity, ProtocolError, SessionId, SessionStatus};
use tandem_store::StoreError;

/// Errors returned while reading, mutating or concluding a session.
///
/// Most variants are *rejections*: the request was well-formed but not
/// allowed right now. Callers drop those silently (the client sees no
/// reply). [`Store`](SessionError::Store) and
/// [`Codec`](SessionError::Codec) are real failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session row exists under this id.
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// The identity is not one of the two participants.
    #[error("{identity} is not a participant of session {session}")]
    NotParticipant {
        identity: Identity,
        session: SessionId,
    },

    /// The session is not in a state that accepts this request.
    #[error("session {session} is {status:?}")]
    WrongStatus {
        session: SessionId,
        status: SessionStatus,
    },

    /// The mover is a participant but it is the other side's turn.
    #[error("not {0}'s turn")]
    NotYourTurn(Identity),

    /// The rule engine refused the move.
    #[error("illegal move: {0}")]
    IllegalMove(String),

    /// The shared store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A session row could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] ProtocolError),
}

impl SessionError {
    /// Returns `true` for rejections that leave no trace: the request was
    /// simply not applicable.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::Codec(_))
    }
}
