//! `permsync-events` — event channel abstraction and wire entities.
//!
//! The replication protocol runs over named publish/subscribe channels. This
//! crate defines the channel contract, the messages that travel over it, and
//! an in-process implementation for tests/dev. A Redis pub/sub implementation
//! is available behind the `redis` feature.

pub mod channel;
pub mod in_memory;
pub mod topics;
pub mod wire;

#[cfg(feature = "redis")]
pub mod redis_pubsub;

pub use channel::{ChannelError, EventChannel, RecvTimeoutError, Subscription};
pub use in_memory::InMemoryEventChannel;
pub use wire::{EventKind, PermissionEvent, SequencedEvent, SnapshotReply, SyncRequest};

#[cfg(feature = "redis")]
pub use redis_pubsub::RedisEventChannel;
