//! Append-only per-message event log.
//!
//! Sequence allocation is split from the append so the normalized event id
//! (which embeds the sequence) can be computed race-free: allocate, stamp,
//! then append. At most one event may exist per (message_id, seq).

mod file;


pub use file::FileEventStore;

use std::time::Duration;

use async_trait::async_trait;

use relay_core::event::Event;
use relay_core::RelayError;

/// Storage contract for the per-message event log.
///
/// Implementations must guarantee: `allocate_seq` is serializable across
/// concurrent callers for the same message (gap-free, starting at 1);
/// `append` rejects a duplicate (message_id, seq) or event id with a
/// permanent error; reads return events ordered by seq ascending.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Atomically reserve the next sequence number for a message.
    async fn allocate_seq(&self, message_id: &str) -> Result<u64, RelayError>;

    /// Append a fully stamped event (`message_id`, `seq`, `id` set).
    async fn append(&self, event: Event) -> Result<(), RelayError>;

    /// Events with `seq > since_seq`, ascending, at most `limit`.
    async fn read_since(
        &self,
        message_id: &str,
        since_seq: u64,
        limit: usize,
    ) -> Result<Vec<Event>, RelayError>;

    /// The full ordered log for a message.
    async fn read_all(&self, message_id: &str) -> Result<Vec<Event>, RelayError>;

    /// Number of persisted events for a message.
    async fn event_count(&self, message_id: &str) -> Result<u64, RelayError>;

    /// Drop logs whose newest event is older than `ttl`. A zero `ttl`
    /// disables pruning. Returns the number of logs removed.
    async fn prune_expired(&self, ttl: Duration) -> Result<usize, RelayError>;
}
