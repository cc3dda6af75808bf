//! In-memory event channel for tests/dev.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::channel::{ChannelError, EventChannel, Subscription};

/// In-process pub/sub over named channels.
///
/// - No IO
/// - Best-effort fan-out per channel
/// - At-least-once acceptable (subscribers must be idempotent)
#[derive(Debug)]
pub struct InMemoryEventChannel<M> {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<M>>>>,
}

impl<M> InMemoryEventChannel<M> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M> Default for InMemoryEventChannel<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<M> EventChannel<M> for InMemoryEventChannel<M>
where
    M: Clone + Send + Sync + 'static,
{
    async fn publish(&self, channel: &str, message: M) -> Result<(), ChannelError> {
        let mut subs = self
            .subscribers
            .lock()
            .map_err(|_| ChannelError::Backend("subscriber registry poisoned".to_string()))?;

        if let Some(senders) = subs.get_mut(channel) {
            // Drop any dead subscribers while publishing.
            senders.retain(|tx| tx.send(message.clone()).is_ok());
        }

        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Subscription<M> {
        let (tx, rx) = mpsc::unbounded_channel();

        if let Ok(mut subs) = self.subscribers.lock() {
            subs.entry(channel.to_string()).or_default().push(tx);
        }

        Subscription::new(rx)
    }
}
