//! Matchmaking for Tandem.
//!
//! Identities that ask for a match wait in one FIFO queue that lives in the
//! shared store, so every server process feeds the same queue. Each process
//! runs a [`Matchmaker`] loop that periodically pops pairs off the queue and
//! turns them into sessions.
//!
//! A pair is only turned into a session by a process that holds *both*
//! connections locally (checked through the [`Presence`] seam). Otherwise
//! the pair is rolled back onto the queue untouched.
//!
//! # Integration
//!
//! ```ignore
//! let matchmaker = Matchmaker::<TicTacToe, _>::new(store, MatchConfig::default());
//! matchmaker.submit(&identity, "Alice").await?;
//! tokio::spawn(matchmaker.clone().run(registry_handle));
//! ```

mod config;
mod error;
mod matchmaker;
mod presence;

pub use config::MatchConfig;
pub use error::MatchError;
pub use matchmaker::Matchmaker;
pub use presence::Presence;
