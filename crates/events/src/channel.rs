//! Event publishing/subscription abstraction (mechanics only).
//!
//! The channel is the **transport layer** between the authority and its
//! subscribers. It makes minimal assumptions:
//!
//! - **Transport-agnostic**: works with in-memory channels, Redis pub/sub,
//!   or a message broker.
//! - **Named channels**: every publish/subscribe targets a channel name, so
//!   one backend can carry updates, sync requests, and sync replies side by
//!   side.
//! - **Broadcast semantics**: each subscriber to a channel gets its own copy
//!   of every message published there.
//! - **At-least-once delivery**: messages may be delivered more than once;
//!   consumers must be idempotent.
//! - **No persistence**: the channel distributes; the permission store is
//!   the source of truth.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

use permsync_core::PermissionError;

/// Channel transport failure.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("channel backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<ChannelError> for PermissionError {
    fn from(err: ChannelError) -> Self {
        PermissionError::channel(err.to_string())
    }
}

/// Error returned by [`Subscription::recv_timeout`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecvTimeoutError {
    #[error("timed out waiting for a message")]
    Timeout,

    #[error("channel closed")]
    Closed,
}

/// A subscription to one named channel.
///
/// Each subscription receives a copy of every message published to its
/// channel after the subscription was created. Subscriptions are owned by a
/// single consumer task.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: UnboundedReceiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: UnboundedReceiver<M>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message. Returns `None` once the channel is closed
    /// and drained.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    /// Wait up to `timeout` for the next message.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        match tokio::time::timeout(timeout, self.receiver.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(RecvTimeoutError::Closed),
            Err(_) => Err(RecvTimeoutError::Timeout),
        }
    }
}

/// Named publish/subscribe channel carrying messages of type `M`.
///
/// Implementations must be safe to share across tasks; publishing from
/// multiple tasks concurrently is allowed. Ordering is preserved per
/// publisher per channel; cross-publisher ordering is not guaranteed, which
/// is why incremental permission events carry authority-assigned sequence
/// numbers.
#[async_trait]
pub trait EventChannel<M>: Send + Sync {
    /// Publish one message to the named channel.
    async fn publish(&self, channel: &str, message: M) -> Result<(), ChannelError>;

    /// Subscribe to the named channel. Messages published before this call
    /// are not delivered.
    async fn subscribe(&self, channel: &str) -> Subscription<M>;
}

#[async_trait]
impl<M, B> EventChannel<M> for Arc<B>
where
    M: Send + 'static,
    B: EventChannel<M> + ?Sized,
{
    async fn publish(&self, channel: &str, message: M) -> Result<(), ChannelError> {
        (**self).publish(channel, message).await
    }

    async fn subscribe(&self, channel: &str) -> Subscription<M> {
        (**self).subscribe(channel).await
    }
}
