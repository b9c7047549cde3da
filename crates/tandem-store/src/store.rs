//! The [`SharedStore`] contract.
//!
//! The method set mirrors what a networked key/value server offers:
//! every method is a single atomic operation on the store side. Callers
//! compose them but never assume two calls happen together.

use std::future::Future;

use tokio::sync::mpsc;

use crate::StoreError;

/// A message received from a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// The exact topic the message was published on.
    pub topic: String,
    /// The raw payload, exactly as published.
    pub payload: Vec<u8>,
}

/// A live subscription to every topic starting with a given prefix.
///
/// Messages arrive in publish order. Dropping the subscription
/// unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<Published>,
}

impl Subscription {
    /// Wraps the receiving end of a feed. Store implementations push
    /// matching messages into the paired sender.
    pub fn new(receiver: mpsc::Receiver<Published>) -> Self {
        Self { receiver }
    }

    /// Waits for the next message. Returns `None` once the feed is closed.
    pub async fn recv(&mut self) -> Option<Published> {
        self.receiver.recv().await
    }
}

/// A key/value store with atomic list, set, sorted-set and hash
/// primitives plus topic-based publish/subscribe, shared by every server
/// process.
///
/// Lists have two ends: the *newest* end (where [`list_push`] appends)
/// and the *oldest* end (where [`list_pop_oldest`] removes). A list used
/// with only those two methods is a FIFO queue.
///
/// Implementations are cheap to clone; clones talk to the same store.
///
/// [`list_push`]: SharedStore::list_push
/// [`list_pop_oldest`]: SharedStore::list_pop_oldest
pub trait SharedStore: Clone + Send + Sync + 'static {
    /// Checks that the store is reachable.
    fn ping(&self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Reads a whole value.
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, StoreError>> + Send;

    /// Replaces a whole value.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Appends `member` on the newest end. Returns the new length.
    fn list_push(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Puts `member` back on the oldest end, ahead of everything else.
    /// Returns the new length.
    fn list_push_oldest(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Atomically removes and returns the oldest member.
    fn list_pop_oldest(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Returns the list length (0 for a missing list).
    fn list_len(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Removes every occurrence of `member`. Returns how many were removed.
    fn list_remove(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Adds `member` to a set. Returns `false` if it was already present.
    fn set_add(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Removes `member` from a set. Returns `false` if it was absent.
    fn set_remove(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Checks set membership.
    fn set_contains(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Increments `member`'s score by `by` (missing members start at 0).
    /// Returns the new score.
    fn sorted_incr(
        &self,
        key: &str,
        member: &str,
        by: u64,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Returns up to `limit` members with the highest scores, best first.
    /// Equal scores are ordered by member, ascending.
    fn sorted_top(
        &self,
        key: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<(String, u64)>, StoreError>> + Send;

    /// Sets one field of a hash.
    fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Reads several fields of a hash at once, in the order given.
    fn hash_get_many(
        &self,
        key: &str,
        fields: &[String],
    ) -> impl Future<Output = Result<Vec<Option<String>>, StoreError>> + Send;

    /// Publishes `payload` on `topic`. Returns the number of live
    /// subscriptions the message was offered to.
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Subscribes to every topic that starts with `prefix`.
    fn subscribe(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Subscription, StoreError>> + Send;
}
