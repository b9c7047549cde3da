//! Error types for the store layer.

/// Errors returned by [`SharedStore`](crate::SharedStore) operations.
///
/// Callers treat every variant the same way: abort the operation, log it,
/// and leave in-memory state untouched.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("shared store unavailable: {0}")]
    Unavailable(String),

    /// The subscription feed was closed by the store.
    #[error("subscription closed")]
    SubscriptionClosed,
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        Self::Unavailable(e.to_string())
    }
}
