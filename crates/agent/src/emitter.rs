//! In-process event emitter.
//!
//! The emitter is the write side of an unbounded FIFO queue scoped to one
//! agent run. Agent code (including deeply nested tool wrappers and
//! sub-agent spawners) emits events without touching persistence; the
//! executor owns the read side and drains it into the robust writer.
//!
//! Emitters can be found ambiently via a task-local scope, so
//! instrumentation hooks do not need the emitter threaded through every
//! call: wrap the agent invocation in [`EventEmitter::scope`] and call
//! [`EventEmitter::current`] from anywhere underneath it. Sub-agents run
//! in the same task tree and share the queue through cloned handles.

use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use relay_core::event::{Event, PlanItem};

tokio::task_local! {
    static CURRENT_EMITTER: EventEmitter;
}

/// Write handle for one agent run's event queue. Cheap to clone.
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<Event>,
    message_id: String,
    chat_id: String,
    agent_type: String,
    agent_id: String,
    parent_call_id: Option<String>,
}

impl EventEmitter {
    /// Create the queue for one run. The receiver goes to the executor's
    /// drain loop; the emitter is handed to the agent routine.
    pub fn channel(message_id: &str, chat_id: &str) -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = Self {
            tx,
            message_id: message_id.to_string(),
            chat_id: chat_id.to_string(),
            agent_type: "main".to_string(),
            agent_id: format!("main_{}", &Uuid::new_v4().simple().to_string()[..8]),
            parent_call_id: None,
        };
        (emitter, EventReceiver { rx })
    }

    /// Run `fut` with this emitter installed as the ambient emitter for the
    /// task tree.
    pub async fn scope<F>(emitter: EventEmitter, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        CURRENT_EMITTER.scope(emitter, fut).await
    }

    /// The ambient emitter installed by [`EventEmitter::scope`], if any.
    pub fn current() -> Option<EventEmitter> {
        CURRENT_EMITTER.try_with(|e| e.clone()).ok()
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Derive an emitter for a sub-agent spawned from `parent_call_id`.
    /// Events flow into the same queue, attributed to the sub-agent.
    pub fn fork_subagent(&self, parent_call_id: &str) -> Self {
        let mut forked = self.clone();
        forked.agent_type = "subagent".to_string();
        forked.agent_id = format!("subagent_{}", &Uuid::new_v4().simple().to_string()[..8]);
        forked.parent_call_id = Some(parent_call_id.to_string());
        forked
    }

    /// Enqueue an event, stamping this emitter's agent identity on it when
    /// the event carries none. Never blocks; if the executor has already
    /// shut the queue the event is dropped.
    pub fn emit(&self, mut event: Event) {
        if event.agent_type.is_none() {
            event.agent_type = Some(self.agent_type.clone());
            event.agent_id = Some(self.agent_id.clone());
        }
        if event.parent_call_id.is_none() {
            event.parent_call_id = self.parent_call_id.clone();
        }
        if self.tx.send(event).is_err() {
            tracing::debug!(message_id = %self.message_id, "emitter queue closed, event dropped");
        }
    }

    // ── Typed helpers ─────────────────────────────────────────

    pub fn emit_thinking(&self, text: impl Into<String>) {
        self.emit(Event::thinking(text));
    }

    pub fn emit_plan(&self, items: Vec<PlanItem>) {
        self.emit(Event::plan(items));
    }

    pub fn emit_tool_start(
        &self,
        call_id: &str,
        name: &str,
        args_summary: &str,
        args_display: Option<String>,
    ) {
        self.emit(Event::tool_start(call_id, name, args_summary, args_display));
    }

    pub fn emit_tool_end(
        &self,
        call_id: &str,
        name: &str,
        status: &str,
        ms: u64,
        result_summary: &str,
    ) {
        self.emit(Event::tool_end(call_id, name, status, ms, result_summary));
    }

    pub fn emit_subagent_start(&self, agent_id: &str, parent_call_id: &str, description: &str) {
        self.emit(Event::subagent_start(agent_id, parent_call_id, description));
    }

    pub fn emit_subagent_end(&self, agent_id: &str, parent_call_id: &str, ms: Option<u64>) {
        self.emit(Event::subagent_end(agent_id, parent_call_id, ms));
    }

    pub fn emit_content_start(&self) {
        self.emit(Event::content_start());
    }

    pub fn emit_content(&self, md: impl Into<String>) {
        self.emit(Event::content(md));
    }

    pub fn emit_content_end(&self) {
        self.emit(Event::content_end());
    }

    pub fn emit_status(&self, text: impl Into<String>) {
        self.emit(Event::status_update(text));
    }

    pub fn emit_error(&self, error: impl Into<String>) {
        self.emit(Event::error(error));
    }
}

/// Read side of the queue; held only by the executor.
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventReceiver {
    /// Wait up to `timeout` for the next event. `None` means no event was
    /// available within the window; use [`EventReceiver::is_closed`] to
    /// distinguish an idle queue from a finished run.
    pub async fn drain(&mut self, timeout: Duration) -> Option<Event> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(event) => event,
            Err(_) => None,
        }
    }

    /// Dequeue without waiting.
    pub fn try_drain(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// True once every emitter clone has been dropped and the queue is empty.
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed() && self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::event::EventKind;

    #[tokio::test]
    async fn test_fifo_order_preserved() {
        let (emitter, mut rx) = EventEmitter::channel("m1", "c1");
        for i in 0..50 {
            emitter.emit_content(format!("chunk {i}"));
        }
        for i in 0..50 {
            let ev = rx.drain(Duration::from_millis(10)).await.unwrap();
            assert_eq!(ev.md.as_deref(), Some(format!("chunk {i}").as_str()));
        }
    }

    #[tokio::test]
    async fn test_agent_identity_stamped() {
        let (emitter, mut rx) = EventEmitter::channel("m1", "c1");
        emitter.emit_thinking("considering");
        let ev = rx.drain(Duration::from_millis(10)).await.unwrap();
        assert_eq!(ev.agent_type.as_deref(), Some("main"));
        assert!(ev.agent_id.unwrap().starts_with("main_"));
    }

    #[tokio::test]
    async fn test_subagent_fork_shares_queue() {
        let (emitter, mut rx) = EventEmitter::channel("m1", "c1");
        let sub = emitter.fork_subagent("call_42");
        sub.emit_thinking("delegated work");
        let ev = rx.drain(Duration::from_millis(10)).await.unwrap();
        assert_eq!(ev.agent_type.as_deref(), Some("subagent"));
        assert_eq!(ev.parent_call_id.as_deref(), Some("call_42"));
    }

    #[tokio::test]
    async fn test_ambient_scope() {
        let (emitter, mut rx) = EventEmitter::channel("m1", "c1");
        assert!(EventEmitter::current().is_none());
        EventEmitter::scope(emitter, async {
            // A deeply nested hook finds the emitter without plumbing.
            let found = EventEmitter::current().expect("ambient emitter");
            found.emit_status("from a hook");
        })
        .await;
        let ev = rx.drain(Duration::from_millis(10)).await.unwrap();
        assert_eq!(ev.kind, EventKind::Status);
        assert!(EventEmitter::current().is_none());
    }

    #[tokio::test]
    async fn test_drain_timeout_and_close() {
        let (emitter, mut rx) = EventEmitter::channel("m1", "c1");
        assert!(rx.drain(Duration::from_millis(5)).await.is_none());
        assert!(!rx.is_closed());
        drop(emitter);
        assert!(rx.drain(Duration::from_millis(5)).await.is_none());
        assert!(rx.is_closed());
    }
}
