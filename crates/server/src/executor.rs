//! Agent executor: runs one agent to completion and persists every
//! observable event in order.
//!
//! The executor is a plain awaitable, not a stream. It writes to the event
//! store through the robust writer and owns the emitter's read side; the
//! watchers that serve clients read the store independently. Nothing here
//! knows about HTTP, so a disconnecting observer cannot reach in and
//! cancel work — the only external influence is the registry's abort flag,
//! and even that path writes the terminal event before returning.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use relay_agent::emitter::EventEmitter;
use relay_agent::invocation::{AgentContext, AgentRoutine};
use relay_agent::sanitize::sanitize_error_message;
use relay_core::config::{StreamConfig, WriterConfig};
use relay_core::event::{Event, EventKind};

use crate::event_store::EventStore;
use crate::message_store::MessageStore;
use crate::registry::RunningTask;
use crate::writer::RobustWriter;

/// Emitter poll window inside the drain loop.
const DRAIN_POLL: Duration = Duration::from_millis(10);

pub struct ExecutorParams {
    pub message_id: String,
    pub chat_id: String,
    pub user_content: String,
    pub metadata: serde_json::Value,
    pub stream: StreamConfig,
    pub writer: WriterConfig,
}

/// Run one agent to its terminal event.
///
/// Returns `Err` only when the run ended in a terminal `error` event; the
/// error string is what the registry records. The future itself never
/// panics outward and never skips the terminal event.
pub async fn run_agent(
    params: ExecutorParams,
    routine: Arc<dyn AgentRoutine>,
    store: Arc<dyn EventStore>,
    messages: Arc<RwLock<MessageStore>>,
    task: Arc<RunningTask>,
) -> Result<(), String> {
    let started = Instant::now();
    let message_id = params.message_id.clone();
    let writer = RobustWriter::new(store, &message_id, &params.chat_id, &params.writer);
    let heartbeat = params.stream.heartbeat_interval();

    {
        let store = messages.write().await;
        if let Err(e) = store.set_processing(&message_id) {
            tracing::warn!(message_id = %message_id, error = %e, "failed to mark message processing");
        }
    }

    writer
        .write(Event::start(&message_id, &params.chat_id))
        .await;

    let (emitter, mut rx) = EventEmitter::channel(&message_id, &params.chat_id);
    let ctx = AgentContext {
        message_id: params.message_id,
        chat_id: params.chat_id,
        user_content: params.user_content,
        metadata: params.metadata,
        emitter: emitter.clone(),
    };
    let agent_task = tokio::spawn(EventEmitter::scope(emitter, async move {
        routine.run(ctx).await
    }));

    // Drain loop: forward agent events in emission order, heartbeat when
    // quiet, watch for the abort flag. The heartbeat clock resets on every
    // write so a chatty agent never interleaves synthetic status noise.
    let mut tool_calls: u64 = 0;
    let mut last_write = Instant::now();
    let mut aborted = false;
    loop {
        match rx.drain(DRAIN_POLL).await {
            Some(event) => {
                if event.kind == EventKind::ToolEnd {
                    tool_calls += 1;
                }
                writer.write(event).await;
                last_write = Instant::now();
            }
            None => {
                if rx.is_closed() {
                    break;
                }
            }
        }
        if task.abort_requested() {
            aborted = true;
            break;
        }
        if last_write.elapsed() >= heartbeat {
            let elapsed_s = started.elapsed().as_secs();
            writer
                .write(Event::status_update(format!(
                    "Processing... ({elapsed_s}s elapsed)"
                )))
                .await;
            last_write = Instant::now();
        }
        writer.maybe_redrain().await;
    }

    // Flush whatever the agent managed to emit before we stopped draining.
    while let Some(event) = rx.try_drain() {
        if event.kind == EventKind::ToolEnd {
            tool_calls += 1;
        }
        writer.write(event).await;
    }

    let ms_total = started.elapsed().as_millis() as u64;

    if aborted {
        agent_task.abort();
        writer
            .write_terminal(Event::end("interrupted", ms_total, tool_calls))
            .await;
        let store = messages.write().await;
        if let Err(e) = store.fail(&message_id, "aborted by administrator") {
            tracing::warn!(message_id = %message_id, error = %e, "failed to mark message aborted");
        }
        tracing::warn!(message_id = %message_id, "agent aborted, terminal event written");
        return Ok(());
    }

    match agent_task.await {
        Ok(Ok(outcome)) => {
            let status = if outcome.interrupted {
                "interrupted"
            } else {
                "completed"
            };
            writer
                .write_terminal(Event::end(status, ms_total, tool_calls))
                .await;
            let store = messages.write().await;
            let update = if outcome.interrupted {
                store.interrupt(&message_id, &outcome.response, ms_total)
            } else {
                store.complete(&message_id, &outcome.response, ms_total)
            };
            if let Err(e) = update {
                tracing::warn!(message_id = %message_id, error = %e, "failed to persist final response");
            }
            Ok(())
        }
        Ok(Err(agent_err)) => {
            let reason = sanitize_error_message(&agent_err.to_string());
            writer.write_terminal(Event::error(reason.clone())).await;
            let store = messages.write().await;
            if let Err(e) = store.fail(&message_id, &reason) {
                tracing::warn!(message_id = %message_id, error = %e, "failed to mark message failed");
            }
            tracing::warn!(message_id = %message_id, error = %reason, "agent run failed");
            Err(reason)
        }
        Err(join_err) => {
            let reason = if join_err.is_panic() {
                "agent panicked".to_string()
            } else {
                "agent task cancelled".to_string()
            };
            writer.write_terminal(Event::error(reason.clone())).await;
            let store = messages.write().await;
            if let Err(e) = store.fail(&message_id, &reason) {
                tracing::warn!(message_id = %message_id, error = %e, "failed to mark message failed");
            }
            tracing::error!(message_id = %message_id, error = %reason, "agent task join failed");
            Err(reason)
        }
    }
}
