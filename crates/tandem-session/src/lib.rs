//! Two-party sessions for Tandem.
//!
//! This crate owns everything that happens *inside* a session once two
//! identities have been paired:
//!
//! 1. **Rules**: the [`RuleEngine`] trait, plus [`TicTacToe`] as the
//!    bundled engine
//! 2. **Persistence**: [`SessionStore`] reads and writes whole session rows
//!    in the shared store and publishes every change on the session's
//!    topic
//! 3. **Standings**: [`Leaderboard`] keeps cumulative win counts and the
//!    display names shown next to them
//!
//! # How it fits in the stack
//!
//! ```text
//! Server / Matchmaking (above)  ← create sessions, route moves
//!     ↕
//! Session Layer (this crate)    ← validates and applies moves, concludes
//!     ↕
//! Store + Protocol (below)      ← shared state, Session<S> model, codec
//! ```

mod config;
mod engine;
mod error;
mod leaderboard;
mod store;
mod tictactoe;

pub use config::SessionConfig;
pub use engine::RuleEngine;
pub use error::SessionError;
pub use leaderboard::{Leaderboard, UNKNOWN_PLAYER};
pub use store::{SessionStore, generate_session_id};
pub use tictactoe::{Board, TicTacToe};
