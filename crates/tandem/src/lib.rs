//! # Tandem
//!
//! Pairs real-time clients into two-party sessions across any number of
//! stateless server processes that share one store.
//!
//! Per process, Tandem runs:
//!
//! - a **connection registry** actor ([`RegistryHandle`]) that owns every
//!   live connection and its bounded outbound queue
//! - a **matchmaking** loop that pairs identities from the shared waiting
//!   queue
//! - a **fan-out bridge** that delivers session updates published anywhere
//!   to participants connected here
//! - a **disconnect supervisor** that suspends a session when a participant
//!   drops and forfeits it if they do not come back within the grace period
//!
//! The rules of what is played live behind [`RuleEngine`](tandem_session::RuleEngine).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tandem::prelude::*;
//!
//! # async fn start() -> Result<(), TandemError> {
//! let server = TandemServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build::<TicTacToe, _>(MemoryStore::new())
//!     .await?;
//! server.run().await
//! # }
//! ```

mod bridge;
mod error;
mod handler;
mod registry;
mod server;
mod supervisor;

pub use error::{RegistryError, TandemError};
pub use registry::{Eviction, EvictionReason, Outbound, RegistryHandle};
pub use server::{ServerConfig, TandemServer, TandemServerBuilder};

pub mod prelude {
    pub use crate::{ServerConfig, TandemError, TandemServer, TandemServerBuilder};
    pub use tandem_match::MatchConfig;
    pub use tandem_protocol::{
        ClientMessage, Codec, Identity, JsonCodec, LeaderboardEntry, Outcome, ServerMessage,
        Session, SessionId, SessionStatus, Side,
    };
    pub use tandem_session::{Board, RuleEngine, SessionConfig, TicTacToe};
    pub use tandem_store::{MemoryStore, SharedStore};
    #[cfg(feature = "redis")]
    pub use tandem_store::RedisStore;
}
