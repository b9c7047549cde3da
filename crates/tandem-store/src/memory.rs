//! In-process [`SharedStore`] implementation.
//!
//! All data sits behind one async mutex, so every method is trivially
//! atomic. Pub/sub uses a single `tokio::sync::broadcast` channel; each
//! subscription gets a small forwarding task that filters by prefix.
//!
//! Cloning a `MemoryStore` shares the underlying data. Tests use this to
//! run two server instances against one store, which is exactly the
//! multi-process topology with the network taken out.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, broadcast, mpsc};

use crate::{Published, SharedStore, StoreError, Subscription};

/// Capacity of the shared pub/sub channel. Subscribers that fall further
/// behind than this skip messages (and log it).
const BROADCAST_CAPACITY: usize = 1024;

/// Per-subscription buffer between the broadcast channel and the consumer.
const SUBSCRIPTION_BUFFER: usize = 256;

#[derive(Default)]
struct Data {
    values: HashMap<String, Vec<u8>>,
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, HashSet<String>>,
    sorted: HashMap<String, HashMap<String, u64>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

struct Inner {
    data: Mutex<Data>,
    feed: broadcast::Sender<Published>,
    reachable: AtomicBool,
}

/// A [`SharedStore`] that lives in process memory.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Creates an empty, reachable store.
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                data: Mutex::new(Data::default()),
                feed,
                reachable: AtomicBool::new(true),
            }),
        }
    }

    /// Makes every operation fail with [`StoreError::Unavailable`] (or
    /// succeed again). Simulates losing the network path to the store.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
        tracing::debug!(reachable, "memory store reachability changed");
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.inner.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store marked unreachable".into()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check()?;
        Ok(self.inner.data.lock().await.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.check()?;
        self.inner
            .data
            .lock()
            .await
            .values
            .insert(key.to_owned(), value);
        Ok(())
    }

    async fn list_push(&self, key: &str, member: &str) -> Result<usize, StoreError> {
        self.check()?;
        let mut data = self.inner.data.lock().await;
        let list = data.lists.entry(key.to_owned()).or_default();
        list.push_back(member.to_owned());
        Ok(list.len())
    }

    async fn list_push_oldest(
        &self,
        key: &str,
        member: &str,
    ) -> Result<usize, StoreError> {
        self.check()?;
        let mut data = self.inner.data.lock().await;
        let list = data.lists.entry(key.to_owned()).or_default();
        list.push_front(member.to_owned());
        Ok(list.len())
    }

    async fn list_pop_oldest(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        let mut data = self.inner.data.lock().await;
        Ok(data.lists.get_mut(key).and_then(VecDeque::pop_front))
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        self.check()?;
        let data = self.inner.data.lock().await;
        Ok(data.lists.get(key).map_or(0, VecDeque::len))
    }

    async fn list_remove(&self, key: &str, member: &str) -> Result<usize, StoreError> {
        self.check()?;
        let mut data = self.inner.data.lock().await;
        let Some(list) = data.lists.get_mut(key) else {
            return Ok(0);
        };
        let before = list.len();
        list.retain(|m| m != member);
        Ok(before - list.len())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.check()?;
        let mut data = self.inner.data.lock().await;
        Ok(data
            .sets
            .entry(key.to_owned())
            .or_default()
            .insert(member.to_owned()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.check()?;
        let mut data = self.inner.data.lock().await;
        Ok(data
            .sets
            .get_mut(key)
            .is_some_and(|set| set.remove(member)))
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.check()?;
        let data = self.inner.data.lock().await;
        Ok(data.sets.get(key).is_some_and(|set| set.contains(member)))
    }

    async fn sorted_incr(
        &self,
        key: &str,
        member: &str,
        by: u64,
    ) -> Result<u64, StoreError> {
        self.check()?;
        let mut data = self.inner.data.lock().await;
        let score = data
            .sorted
            .entry(key.to_owned())
            .or_default()
            .entry(member.to_owned())
            .or_insert(0);
        *score += by;
        Ok(*score)
    }

    async fn sorted_top(
        &self,
        key: &str,
        limit: usize,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        self.check()?;
        let data = self.inner.data.lock().await;
        let Some(scores) = data.sorted.get(key) else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<(String, u64)> = scores
            .iter()
            .map(|(member, score)| (member.clone(), *score))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner
            .data
            .lock()
            .await
            .hashes
            .entry(key.to_owned())
            .or_default()
            .insert(field.to_owned(), value.to_owned());
        Ok(())
    }

    async fn hash_get_many(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, StoreError> {
        self.check()?;
        let data = self.inner.data.lock().await;
        let hash = data.hashes.get(key);
        Ok(fields
            .iter()
            .map(|field| hash.and_then(|h| h.get(field).cloned()))
            .collect())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<usize, StoreError> {
        self.check()?;
        let msg = Published {
            topic: topic.to_owned(),
            payload,
        };
        // `send` only fails when nobody is subscribed.
        Ok(self.inner.feed.send(msg).unwrap_or(0))
    }

    async fn subscribe(&self, prefix: &str) -> Result<Subscription, StoreError> {
        self.check()?;
        // Subscribe before returning so nothing published after this call
        // can be missed.
        let mut feed = self.inner.feed.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let prefix = prefix.to_owned();
        tracing::debug!(%prefix, "subscription opened");

        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(msg) => {
                        if !msg.topic.starts_with(&prefix) {
                            continue;
                        }
                        if tx.send(msg).await.is_err() {
                            break; // subscription dropped
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(%prefix, skipped, "subscription lagged, messages skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!(%prefix, "subscription forwarder stopped");
        });

        Ok(Subscription::new(rx))
    }
}

// =========================================================================
// Tests
// =========================================================================
