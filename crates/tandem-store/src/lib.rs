//! Shared state store for Tandem.
//!
//! Every server process talks to the same store. It is the only place
//! where cross-process state lives: session rows, the waiting queue, the
//! in-queue and in-session sets, the leaderboard, and the session update
//! feed.
//!
//! - [`SharedStore`] — the contract: atomic list/set/sorted-set primitives,
//!   whole-value get/set, and topic-based publish/subscribe.
//! - [`MemoryStore`] — an in-process implementation. Cloning it shares the
//!   same data, so several server instances in one process behave like
//!   several processes on one store.
//! - `RedisStore` (feature `redis`) — the networked implementation that
//!   separate server processes share.
//! - [`keys`] — every key and topic name in one place.

mod error;
pub mod keys;
mod memory;
#[cfg(feature = "redis")]
mod redis_store;
mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use store::{Published, SharedStore, Subscription};
