//! [`SharedStore`] backed by a Redis server.
//!
//! Every server process points at the same Redis instance. Commands share
//! one multiplexed connection across all clones of the store; each
//! subscription opens its own pub/sub connection and forwards into a
//! [`Subscription`] the same way the in-memory store does.
//!
//! ```text
//! list_push         RPUSH           list_pop_oldest   LPOP
//! list_push_oldest  LPUSH           list_remove       LREM key 0
//! set_add           SADD            set_contains      SISMEMBER
//! sorted_incr       ZINCRBY         hash_get_many     HMGET
//! publish           PUBLISH         subscribe         PSUBSCRIBE prefix*
//! ```

use futures_util::StreamExt;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::mpsc;

use crate::{Published, SharedStore, StoreError, Subscription};

/// Per-subscription buffer between the pub/sub connection and the consumer.
const SUBSCRIPTION_BUFFER: usize = 256;

/// A [`SharedStore`] on a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connects to the server at `url`, e.g. `redis://127.0.0.1:6379/`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        tracing::info!("connected to redis");
        Ok(Self { client, conn })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

impl SharedStore for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let _: String = redis::cmd("PING").query_async(&mut self.conn()).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let value: Option<Vec<u8>> = self.conn().get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let _: () = self.conn().set(key, value).await?;
        Ok(())
    }

    async fn list_push(&self, key: &str, member: &str) -> Result<usize, StoreError> {
        let len: usize = self.conn().rpush(key, member).await?;
        Ok(len)
    }

    async fn list_push_oldest(
        &self,
        key: &str,
        member: &str,
    ) -> Result<usize, StoreError> {
        let len: usize = self.conn().lpush(key, member).await?;
        Ok(len)
    }

    async fn list_pop_oldest(&self, key: &str) -> Result<Option<String>, StoreError> {
        let member: Option<String> = self.conn().lpop(key, None).await?;
        Ok(member)
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        let len: usize = self.conn().llen(key).await?;
        Ok(len)
    }

    async fn list_remove(&self, key: &str, member: &str) -> Result<usize, StoreError> {
        let removed: usize = self.conn().lrem(key, 0, member).await?;
        Ok(removed)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let added: usize = self.conn().sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let removed: usize = self.conn().srem(key, member).await?;
        Ok(removed > 0)
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let present: bool = self.conn().sismember(key, member).await?;
        Ok(present)
    }

    async fn sorted_incr(
        &self,
        key: &str,
        member: &str,
        by: u64,
    ) -> Result<u64, StoreError> {
        let score: f64 = self.conn().zincr(key, member, by).await?;
        Ok(score as u64)
    }

    async fn sorted_top(
        &self,
        key: &str,
        limit: usize,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        // Redis breaks score ties in reverse member order, so the whole set
        // is ranked here.
        let entries: Vec<(String, f64)> =
            self.conn().zrevrange_withscores(key, 0, -1).await?;
        Ok(rank(entries, limit))
    }

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        let _: () = self.conn().hset(key, field, value).await?;
        Ok(())
    }

    async fn hash_get_many(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, StoreError> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async(&mut self.conn())
            .await?;
        Ok(values)
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<usize, StoreError> {
        let receivers: usize = self.conn().publish(topic, payload).await?;
        Ok(receivers)
    }

    async fn subscribe(&self, prefix: &str) -> Result<Subscription, StoreError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.psubscribe(prefix_pattern(prefix)).await?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let prefix = prefix.to_owned();
        tracing::debug!(%prefix, "redis subscription opened");

        tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let published = Published {
                    topic: msg.get_channel_name().to_owned(),
                    payload: msg.get_payload_bytes().to_vec(),
                };
                if tx.send(published).await.is_err() {
                    tracing::debug!(%prefix, "redis subscription dropped");
                    return;
                }
            }
            tracing::warn!(%prefix, "redis pub/sub connection closed");
        });

        Ok(Subscription::new(rx))
    }
}

/// Glob pattern matching every channel that starts with `prefix`.
fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

/// Best first; equal scores by member, ascending.
fn rank(entries: Vec<(String, f64)>, limit: usize) -> Vec<(String, u64)> {
    let mut ranked: Vec<(String, u64)> = entries
        .into_iter()
        .map(|(member, score)| (member, score as u64))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}
