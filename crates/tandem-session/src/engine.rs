//! The `RuleEngine` trait: the rules of whatever is played inside a session.
//!
//! The framework owns pairing, persistence, routing and disconnects. The
//! engine only answers questions about a state value: whose turn is it,
//! is this move legal, what does the board look like afterwards, is it
//! over. Every method is a pure function of its arguments.

use std::fmt::Debug;

use serde::{Serialize, de::DeserializeOwned};
use tandem_protocol::{Outcome, Side};

/// The rules of a two-sided, turn-based session.
///
/// `State` is stored verbatim inside the session row, so it must round
/// trip through the codec. A move is a single board position (`usize`);
/// the engine decides what positions mean.
///
/// # Example
///
/// ```rust
/// use tandem_protocol::{Outcome, Side};
/// use tandem_session::RuleEngine;
///
/// /// First to move wins.
/// struct Race;
///
/// impl RuleEngine for Race {
///     type State = Option<Side>;
///
///     fn init() -> Self::State { None }
///     fn turn(_: &Self::State) -> Side { Side::X }
///     fn validate_move(state: &Self::State, _: usize, _: Side) -> Result<(), String> {
///         match state {
///             Some(_) => Err("already won".into()),
///             None => Ok(()),
///         }
///     }
///     fn apply_move(_: &Self::State, _: usize, side: Side) -> Self::State { Some(side) }
///     fn outcome(state: &Self::State) -> Option<Outcome> {
///         state.map(|side| Outcome::Win { side })
///     }
/// }
///
/// let next = Race::apply_move(&Race::init(), 0, Side::X);
/// assert_eq!(Race::outcome(&next), Some(Outcome::Win { side: Side::X }));
/// ```
pub trait RuleEngine: Send + Sync + 'static {
    /// The full state of one session.
    type State: Debug
        + Clone
        + PartialEq
        + Send
        + Sync
        + Serialize
        + DeserializeOwned
        + 'static;

    /// The state a new session starts in.
    fn init() -> Self::State;

    /// The side expected to move next.
    fn turn(state: &Self::State) -> Side;

    /// Checks a move against the rules (range, occupancy, game over).
    ///
    /// Turn order is checked by the caller before this is called.
    fn validate_move(
        state: &Self::State,
        position: usize,
        side: Side,
    ) -> Result<(), String>;

    /// Returns the state after `side` plays `position`.
    ///
    /// Only called after [`validate_move`](Self::validate_move) accepted
    /// the same arguments.
    fn apply_move(state: &Self::State, position: usize, side: Side) -> Self::State;

    /// Returns the outcome if the state is terminal.
    fn outcome(state: &Self::State) -> Option<Outcome>;
}
