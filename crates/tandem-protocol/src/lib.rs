//! Wire protocol for Tandem.
//!
//! This crate defines the "language" that clients and servers speak, and
//! the session model every server process agrees on:
//!
//! - **Envelopes** ([`ClientMessage`], [`ServerMessage`]) — the tagged
//!   `{type, payload}` messages that travel on the wire.
//! - **Model** ([`Session`], [`SessionStatus`], [`Identity`], ...) — the
//!   shape of a paired session as stored in the shared store and as sent
//!   to clients.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those values are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (ClientMessage) → Registry / Matchmaking / Sessions
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientMessage, FindMatchRequest, Identity, LeaderboardEntry,
    MoveRequest, Outcome, ReconnectRequest, RoutedEnvelope, ServerMessage,
    Session, SessionId, SessionRoute, SessionStatus, Side,
};
