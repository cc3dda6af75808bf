//! Redis pub/sub-backed event channel (optional).
//!
//! Note: Redis pub/sub is not durable (messages can be dropped if subscribers
//! are offline). The protocol tolerates this: a subscriber that misses
//! updates while unsynced bootstraps via full sync, and the sequence-number
//! replay covers the bootstrap window. For durable at-least-once delivery a
//! broker with consumer groups would be used instead.

use std::marker::PhantomData;
use std::thread;

use async_trait::async_trait;
use redis::Commands;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::channel::{ChannelError, EventChannel, Subscription};

/// Redis pub/sub channel for JSON-encoded messages.
#[derive(Debug, Clone)]
pub struct RedisEventChannel<M> {
    client: redis::Client,
    _marker: PhantomData<fn() -> M>,
}

impl<M> RedisEventChannel<M> {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, ChannelError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| ChannelError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            _marker: PhantomData,
        })
    }
}

#[async_trait]
impl<M> EventChannel<M> for RedisEventChannel<M>
where
    M: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn publish(&self, channel: &str, message: M) -> Result<(), ChannelError> {
        let payload = serde_json::to_string(&message)
            .map_err(|e| ChannelError::Serialization(e.to_string()))?;

        let client = self.client.clone();
        let channel = channel.to_string();

        // The redis connection API is blocking; keep it off the async runtime.
        tokio::task::spawn_blocking(move || {
            let mut conn = client
                .get_connection()
                .map_err(|e| ChannelError::Backend(e.to_string()))?;

            let _: i64 = conn
                .publish(&channel, payload)
                .map_err(|e| ChannelError::Backend(e.to_string()))?;

            Ok(())
        })
        .await
        .map_err(|e| ChannelError::Backend(e.to_string()))?
    }

    async fn subscribe(&self, channel: &str) -> Subscription<M> {
        let (tx, rx) = mpsc::unbounded_channel();

        let client = self.client.clone();
        let channel = channel.to_string();

        // Background thread that receives pub/sub messages and forwards them.
        thread::spawn(move || {
            let mut conn = match client.get_connection() {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(error = %e, "redis subscribe connection failed");
                    return;
                }
            };

            let mut pubsub = conn.as_pubsub();
            if pubsub.subscribe(&channel).is_err() {
                return;
            }

            loop {
                let msg = match pubsub.get_message() {
                    Ok(m) => m,
                    Err(_) => return,
                };

                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                let message: M = match serde_json::from_str(&payload) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(channel = %channel, error = %e, "dropping undecodable message");
                        continue;
                    }
                };

                if tx.send(message).is_err() {
                    return;
                }
            }
        });

        Subscription::new(rx)
    }
}
