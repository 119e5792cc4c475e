//! Retrying event writer with a bounded in-memory fallback.
//!
//! One writer per running message. It owns the allocate → normalize →
//! append pipeline: reserve the next seq, stamp `ts` and the normalized id
//! (which embeds the seq), then append. Transient store failures are
//! retried on the configured backoff schedule; after exhaustion the event
//! parks in a bounded fallback queue that is re-drained periodically from
//! the executor's drain loop. Persistence failure never reaches the agent:
//! `write` cannot fail from the caller's point of view.
//!
//! If the process exits while the fallback queue is non-empty those events
//! are lost. That loss is accepted and logged; the terminal event gets one
//! extra immediate attempt in [`RobustWriter::write_terminal`] to make it
//! as durable as practical.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use relay_core::config::WriterConfig;
use relay_core::event::{event_id, Event};

use crate::event_store::EventStore;

/// How often the fallback queue is re-drained while events are parked.
const REDRAIN_INTERVAL: Duration = Duration::from_secs(1);

pub struct RobustWriter {
    store: Arc<dyn EventStore>,
    message_id: String,
    chat_id: String,
    retry_schedule: Vec<Duration>,
    fallback_capacity: usize,
    fallback: Mutex<VecDeque<Event>>,
    last_redrain: Mutex<Instant>,
}

impl RobustWriter {
    pub fn new(
        store: Arc<dyn EventStore>,
        message_id: &str,
        chat_id: &str,
        config: &WriterConfig,
    ) -> Self {
        Self {
            store,
            message_id: message_id.to_string(),
            chat_id: chat_id.to_string(),
            retry_schedule: config.retry_schedule(),
            fallback_capacity: config.fallback_capacity,
            fallback: Mutex::new(VecDeque::new()),
            last_redrain: Mutex::new(Instant::now()),
        }
    }

    /// Persist one event. Never fails from the caller's point of view.
    pub async fn write(&self, event: Event) {
        let event = self.claim(event);
        // While anything is parked, new events must queue behind it so the
        // store sees them in emission order.
        if self.pending() > 0 {
            self.enqueue_fallback(event);
            return;
        }
        if let Err(event) = self.write_with_retries(event).await {
            self.enqueue_fallback(event);
        }
    }

    /// Persist the terminal event: flush the fallback first, then give the
    /// event itself one extra immediate attempt beyond the normal schedule.
    pub async fn write_terminal(&self, event: Event) {
        self.drain_fallback().await;
        let event = self.claim(event);
        if let Err(mut event) = self.write_with_retries(event).await {
            if let Err(e) = self.attempt(&mut event).await {
                tracing::error!(
                    message_id = %self.message_id,
                    error = %e,
                    "failed to persist terminal event"
                );
            }
        }
    }

    /// Re-drain the fallback queue if one is due. Called from the
    /// executor's drain loop on every tick; cheap when the queue is empty.
    pub async fn maybe_redrain(&self) {
        if self.pending() == 0 {
            return;
        }
        {
            let mut last = self.last_redrain.lock().expect("writer lock poisoned");
            if last.elapsed() < REDRAIN_INTERVAL {
                return;
            }
            *last = Instant::now();
        }
        self.drain_fallback().await;
    }

    /// Number of events parked in the fallback queue.
    pub fn pending(&self) -> usize {
        self.fallback.lock().expect("writer lock poisoned").len()
    }

    fn claim(&self, mut event: Event) -> Event {
        event.message_id = Some(self.message_id.clone());
        event.chat_id = Some(self.chat_id.clone());
        event
    }

    /// One allocate/stamp/append pass. The seq sticks to the event across
    /// attempts once allocated; ts and id are restamped per attempt.
    async fn attempt(&self, event: &mut Event) -> Result<(), relay_core::RelayError> {
        let seq = match event.seq {
            Some(seq) => seq,
            None => {
                let seq = self.store.allocate_seq(&self.message_id).await?;
                event.seq = Some(seq);
                seq
            }
        };
        event.ts = Utc::now();
        event.id = event_id(event.ts, seq);
        self.store.append(event.clone()).await
    }

    /// Run the retry schedule. `Err` returns the event for fallback
    /// parking; permanent failures are dropped here with an error log.
    async fn write_with_retries(&self, mut event: Event) -> Result<(), Event> {
        let mut retries = self.retry_schedule.iter();
        loop {
            match self.attempt(&mut event).await {
                Ok(()) => return Ok(()),
                Err(e) if !e.is_transient() => {
                    tracing::error!(
                        message_id = %self.message_id,
                        error = %e,
                        "dropping event with permanent store error"
                    );
                    return Ok(());
                }
                Err(e) => {
                    let Some(delay) = retries.next() else {
                        tracing::warn!(
                            message_id = %self.message_id,
                            error = %e,
                            "retries exhausted, parking event in fallback queue"
                        );
                        return Err(event);
                    };
                    tokio::time::sleep(*delay).await;
                }
            }
        }
    }

    fn enqueue_fallback(&self, event: Event) {
        let mut queue = self.fallback.lock().expect("writer lock poisoned");
        if queue.len() >= self.fallback_capacity {
            queue.pop_front();
            tracing::warn!(
                message_id = %self.message_id,
                capacity = self.fallback_capacity,
                "fallback queue full, dropping oldest event"
            );
        }
        queue.push_back(event);
    }

    /// Attempt to flush parked events in order. Stops at the first event
    /// that still fails transiently, putting it back at the head.
    async fn drain_fallback(&self) {
        loop {
            let Some(mut event) = self
                .fallback
                .lock()
                .expect("writer lock poisoned")
                .pop_front()
            else {
                return;
            };
            match self.attempt(&mut event).await {
                Ok(()) => {}
                Err(e) if !e.is_transient() => {
                    tracing::error!(
                        message_id = %self.message_id,
                        error = %e,
                        "dropping parked event with permanent store error"
                    );
                }
                Err(_) => {
                    self.fallback
                        .lock()
                        .expect("writer lock poisoned")
                        .push_front(event);
                    return;
                }
            }
        }
    }
}
