//! Per-client stream watcher.
//!
//! A watcher tails one message's event log by sequence number: catch-up
//! reads first, then a fixed-interval poll. Watchers hold nothing but a
//! cursor — any number of them can follow the same message independently,
//! and killing one has no effect on the run or on other watchers. The
//! returned stream is finite: it ends at the terminal event, on timeout,
//! or when the consumer goes away.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use relay_core::config::StreamConfig;
use relay_core::event::Event;

use crate::event_store::EventStore;
use crate::registry::AgentRegistry;

/// Events fetched per poll round.
const BATCH_LIMIT: usize = 256;
/// Buffered events per watcher; a slow consumer only stalls itself.
const CHANNEL_CAPACITY: usize = 64;

/// Open a finite event stream for `message_id`, starting after `since_seq`.
///
/// The watcher registers itself with the registry for observability and
/// unregisters when its poll task exits, whichever way it ends.
pub fn watch(
    store: Arc<dyn EventStore>,
    registry: Arc<AgentRegistry>,
    message_id: String,
    watcher_id: String,
    since_seq: u64,
    config: &StreamConfig,
) -> ReceiverStream<Event> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let poll_interval = config.poll_interval();
    let max_wait = config.watcher_max_wait();
    // Unknown targets get a short grace window: the task may still be
    // initializing, but we will not hold an idle connection for an hour.
    let grace = max_wait / 60;

    tokio::spawn(async move {
        registry.register_watcher(&message_id, &watcher_id);

        let started = Instant::now();
        let mut cursor = since_seq;
        let mut last_new = Instant::now();
        let mut delivered_any = false;

        'poll: loop {
            let batch = match store.read_since(&message_id, cursor, BATCH_LIMIT).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(message_id = %message_id, error = %e, "watcher read failed");
                    Vec::new()
                }
            };

            for event in batch {
                cursor = event.seq.unwrap_or(cursor);
                let terminal = event.is_terminal();
                delivered_any = true;
                last_new = Instant::now();
                if tx.send(event).await.is_err() {
                    // Consumer dropped the stream: normal disconnect.
                    tracing::debug!(message_id = %message_id, watcher_id = %watcher_id, "watcher consumer gone");
                    break 'poll;
                }
                if terminal {
                    break 'poll;
                }
            }

            if !delivered_any
                && registry.get(&message_id).is_none()
                && started.elapsed() >= grace
                && store.event_count(&message_id).await.unwrap_or(0) == 0
            {
                tracing::info!(message_id = %message_id, "watcher grace expired for unknown message");
                break 'poll;
            }

            if last_new.elapsed() >= max_wait {
                tracing::info!(
                    message_id = %message_id,
                    watcher_id = %watcher_id,
                    "watcher timed out without new events"
                );
                break 'poll;
            }

            tokio::time::sleep(poll_interval).await;
        }

        registry.unregister_watcher(&message_id, &watcher_id);
    });

    ReceiverStream::new(rx)
}
