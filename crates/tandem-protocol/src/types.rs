//! Core protocol types for Tandem's wire format and session model.
//!
//! Everything here is serialized: client envelopes arrive as JSON, session
//! rows live as JSON in the shared store, and every state change is
//! published as a JSON [`ServerMessage`] that any process may forward
//! verbatim to its local participants.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A participant's stable identity.
///
/// Supplied by the client (not generated per connection) and stable across
/// reconnects. Tandem treats it as an opaque token: it is never parsed,
/// only compared and used as a key.
///
/// `#[serde(transparent)]` makes `Identity("p1")` serialize as just `"p1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wraps a raw identity string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The unique id of one paired session.
///
/// Minted once by the matchmaking process that forms the pair; every
/// process uses it to address the session row and its update topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps a raw session id string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Sides, outcomes, status
// ---------------------------------------------------------------------------

/// One of the two seats in a session.
///
/// Participant A always plays `X` and moves first; participant B plays `O`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    X,
    O,
}

impl Side {
    /// Returns the opposing side.
    pub fn other(self) -> Self {
        match self {
            Self::X => Self::O,
            Self::O => Self::X,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => f.write_str("X"),
            Self::O => f.write_str("O"),
        }
    }
}

/// How a session ended.
///
/// `Win` and `Draw` come from the rule engine; `Forfeit` is decided by the
/// server when a disconnected participant does not come back in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// `side` completed a winning line.
    Win { side: Side },
    /// The board filled up with no winner.
    Draw,
    /// The other side disconnected and the grace window ran out.
    Forfeit { winner: Side },
}

impl Outcome {
    /// Returns the winning side, if there is one.
    pub fn winner(&self) -> Option<Side> {
        match self {
            Self::Win { side } => Some(*side),
            Self::Forfeit { winner } => Some(*winner),
            Self::Draw => None,
        }
    }
}

/// Lifecycle status of a session.
///
/// ```text
///            disconnect(side)            grace window elapses
///   Active ─────────────────→ Disconnected ─────────────────→ Concluded(Forfeit)
///     │  ↑                        │
///     │  └──── reconnect(side) ───┘
///     │
///     └── terminal move ──→ Concluded(Win | Draw)
/// ```
///
/// `Concluded` is terminal: a concluded session is never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Disconnected { side: Side },
    Concluded { outcome: Outcome },
}

impl SessionStatus {
    /// Returns `true` if moves may be applied.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` once the session has ended.
    pub fn is_concluded(&self) -> bool {
        matches!(self, Self::Concluded { .. })
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One paired interaction between two identities.
///
/// `S` is the rule engine's state (board, turn, ...). The coordination
/// layer never looks inside it; it only stores, forwards, and hands it
/// back to the engine.
///
/// The whole value is replaced on every mutation. There are no partial
/// updates, so writers read-modify-write and the last writer wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session<S> {
    pub id: SessionId,
    pub participant_a: Identity,
    pub participant_b: Identity,
    pub display_name_a: String,
    pub display_name_b: String,
    pub state: S,
    pub status: SessionStatus,
}

impl<S> Session<S> {
    /// Creates a fresh, active session. `participant_a` plays [`Side::X`].
    pub fn new(
        id: SessionId,
        participant_a: Identity,
        participant_b: Identity,
        display_name_a: String,
        display_name_b: String,
        state: S,
    ) -> Self {
        Self {
            id,
            participant_a,
            participant_b,
            display_name_a,
            display_name_b,
            state,
            status: SessionStatus::Active,
        }
    }

    /// Returns which side `identity` plays, or `None` if it is not a
    /// participant.
    pub fn side_of(&self, identity: &Identity) -> Option<Side> {
        if *identity == self.participant_a {
            Some(Side::X)
        } else if *identity == self.participant_b {
            Some(Side::O)
        } else {
            None
        }
    }

    /// Returns the identity seated on `side`.
    pub fn identity_on(&self, side: Side) -> &Identity {
        match side {
            Side::X => &self.participant_a,
            Side::O => &self.participant_b,
        }
    }
}

/// The routing view of a published session.
///
/// The fan-out bridge only needs to know *who* a message is for, so it
/// decodes this much and forwards the original bytes untouched. Unknown
/// fields (board, status, ...) are ignored by serde.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRoute {
    pub id: SessionId,
    pub participant_a: Identity,
    pub participant_b: Identity,
}

/// The routing view of a whole published envelope. The `type` tag is not
/// needed to route, only the session in `payload`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoutedEnvelope {
    pub payload: SessionRoute,
}

// ---------------------------------------------------------------------------
// Leaderboard
// ---------------------------------------------------------------------------

/// One row of the leaderboard as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// The participant's display name ("Unknown Player" if none recorded).
    pub name: String,
    /// Cumulative wins.
    pub score: u64,
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Payload of a `move` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub session_id: SessionId,
    /// Zero-based cell index. Range checks are the rule engine's job.
    pub position: usize,
}

/// Payload of a `find_match` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindMatchRequest {
    pub identity: Identity,
    pub display_name: String,
}

/// Payload of a `reconnect` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectRequest {
    pub identity: Identity,
    pub session_id: SessionId,
}

/// Every message a client may send.
///
/// `#[serde(tag = "type", content = "payload")]` produces "adjacently
/// tagged" JSON:
///
/// ```json
/// { "type": "move", "payload": { "sessionId": "…", "position": 4 } }
/// ```
///
/// An unknown `type` fails to decode. There is no catch-all variant: the
/// handler treats undecodable input as malformed and drops it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    Move(MoveRequest),
    FindMatch(FindMatchRequest),
    GetLeaderboard,
    Reconnect(ReconnectRequest),
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Every message the server sends.
///
/// `session_update` and `match_found` carry the full session;
/// `leaderboard_update` carries the top entries, best first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage<S> {
    SessionUpdate(Session<S>),
    MatchFound(Session<S>),
    LeaderboardUpdate(Vec<LeaderboardEntry>),
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The wire format is consumed by browser clients, so these tests pin
    //! the exact JSON shapes our serde attributes produce.

    use super::*;

    fn sample_session() -> Session<Vec<Option<Side>>> {
        let mut board = vec![None; 9];
        board[4] = Some(Side::X);
        Session::new(
            SessionId::new("abc"),
            Identity::new("p1"),
            Identity::new("p2"),
            "Alice".into(),
            "Bob".into(),
            board,
        )
    }

    // =====================================================================
    // Identity types
    // =====================================================================

    #[test]
    fn test_identity_serializes_as_plain_string() {
        let json = serde_json::to_string(&Identity::new("p1")).unwrap();
        assert_eq!(json, "\"p1\"");
    }

    #[test]
    fn test_session_id_display_is_raw_value() {
        assert_eq!(SessionId::new("s-9").to_string(), "s-9");
    }

    #[test]
    fn test_side_other_flips() {
        assert_eq!(Side::X.other(), Side::O);
        assert_eq!(Side::O.other(), Side::X);
    }

    // =====================================================================
    // Session
    // =====================================================================

    #[test]
    fn test_session_new_is_active() {
        let session = sample_session();
        assert_eq!(session.status, SessionStatus::Active);
    }

    #[test]
    fn test_session_side_of_maps_a_to_x() {
        let session = sample_session();
        assert_eq!(session.side_of(&Identity::new("p1")), Some(Side::X));
        assert_eq!(session.side_of(&Identity::new("p2")), Some(Side::O));
        assert_eq!(session.side_of(&Identity::new("p3")), None);
        assert_eq!(session.identity_on(Side::O), &Identity::new("p2"));
    }

    #[test]
    fn test_session_round_trip_preserves_everything() {
        let mut session = sample_session();
        session.status = SessionStatus::Disconnected { side: Side::O };
        let bytes = serde_json::to_vec(&session).unwrap();
        let decoded: Session<Vec<Option<Side>>> =
            serde_json::from_slice(&bytes).unwrap();
        assert_eq!(session, decoded);
    }

    #[test]
    fn test_session_json_uses_camel_case() {
        let json = serde_json::to_value(sample_session()).unwrap();
        assert_eq!(json["participantA"], "p1");
        assert_eq!(json["displayNameB"], "Bob");
        assert_eq!(json["status"]["kind"], "active");
    }

    #[test]
    fn test_status_concluded_json_format() {
        let status = SessionStatus::Concluded {
            outcome: Outcome::Forfeit { winner: Side::O },
        };
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["kind"], "concluded");
        assert_eq!(json["outcome"]["kind"], "forfeit");
        assert_eq!(json["outcome"]["winner"], "O");
    }

    #[test]
    fn test_outcome_winner() {
        assert_eq!(Outcome::Win { side: Side::X }.winner(), Some(Side::X));
        assert_eq!(Outcome::Forfeit { winner: Side::O }.winner(), Some(Side::O));
        assert_eq!(Outcome::Draw.winner(), None);
    }

    #[test]
    fn test_session_route_ignores_state_fields() {
        let bytes = serde_json::to_vec(&sample_session()).unwrap();
        let route: SessionRoute = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(route.id, SessionId::new("abc"));
        assert_eq!(route.participant_b, Identity::new("p2"));
    }

    #[test]
    fn test_routed_envelope_reads_session_update() {
        let msg = ServerMessage::SessionUpdate(sample_session());
        let bytes = serde_json::to_vec(&msg).unwrap();
        let routed: RoutedEnvelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(routed.payload.participant_a, Identity::new("p1"));
    }

    // =====================================================================
    // ClientMessage
    // =====================================================================

    #[test]
    fn test_client_message_find_match_decodes() {
        let json = r#"{"type":"find_match","payload":{"identity":"p1","displayName":"Alice"}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::FindMatch(FindMatchRequest {
                identity: Identity::new("p1"),
                display_name: "Alice".into(),
            })
        );
    }

    #[test]
    fn test_client_message_reconnect_decodes() {
        let json = r#"{"type":"reconnect","payload":{"identity":"p1","sessionId":"abc"}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Reconnect(ReconnectRequest { ref session_id, .. })
                if *session_id == SessionId::new("abc")
        ));
    }

    #[test]
    fn test_client_message_get_leaderboard_without_payload() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"get_leaderboard"}"#).unwrap();
        assert_eq!(msg, ClientMessage::GetLeaderboard);
    }

    #[test]
    fn test_client_message_unknown_type_is_rejected() {
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type":"fly_to_moon","payload":{}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_client_message_negative_position_is_rejected() {
        let json = r#"{"type":"move","payload":{"sessionId":"abc","position":-1}}"#;
        let result: Result<ClientMessage, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_client_message_missing_payload_field_is_rejected() {
        let json = r#"{"type":"move","payload":{"sessionId":"abc"}}"#;
        let result: Result<ClientMessage, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    // =====================================================================
    // ServerMessage
    // =====================================================================

    #[test]
    fn test_server_message_match_found_json_format() {
        let msg = ServerMessage::MatchFound(sample_session());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "match_found");
        assert_eq!(json["payload"]["id"], "abc");
        assert_eq!(json["payload"]["state"][4], "X");
    }

    #[test]
    fn test_server_message_leaderboard_json_format() {
        let msg: ServerMessage<()> = ServerMessage::LeaderboardUpdate(vec![
            LeaderboardEntry { name: "Alice".into(), score: 3 },
        ]);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "leaderboard_update");
        assert_eq!(json["payload"][0]["name"], "Alice");
        assert_eq!(json["payload"][0]["score"], 3);
    }
}
