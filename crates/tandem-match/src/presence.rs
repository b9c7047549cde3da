//! The `Presence` seam: what the matchmaker needs from local connections.

use std::future::Future;

use tandem_protocol::{Identity, SessionId};

/// The local view of connected identities.
///
/// Implemented by the server's connection registry. Matchmaking only
/// forms a session when both identities are present on *this* process,
/// so it can bind the session to their connections and notify them.
pub trait Presence: Send + Sync + 'static {
    /// Returns `true` if `identity` is bound to a live connection here.
    fn is_local(&self, identity: &Identity) -> impl Future<Output = bool> + Send;

    /// Attaches `session` to the connection bound to `identity`. Returns
    /// `false` if no such connection exists (anymore).
    fn bind_session(
        &self,
        identity: &Identity,
        session: &SessionId,
    ) -> impl Future<Output = bool> + Send;

    /// Best-effort delivery of an encoded message to `identity`.
    fn deliver(&self, identity: &Identity, payload: Vec<u8>) -> impl Future<Output = ()> + Send;
}
