//! The seam between the streaming core and the reasoning engine.
//!
//! The core invokes an agent through exactly one asynchronous entry point
//! ([`AgentRoutine::run`]) and observes it only through the emitter. The
//! routine never sees watchers, HTTP, or persistence.

use async_trait::async_trait;

use crate::emitter::EventEmitter;

/// Everything a routine gets for one run.
pub struct AgentContext {
    pub message_id: String,
    pub chat_id: String,
    /// Content of the user message that triggered this run.
    pub user_content: String,
    /// Opaque request metadata passed through from message creation.
    pub metadata: serde_json::Value,
    /// Emitter for this run. Also installed ambiently via
    /// [`EventEmitter::scope`] around the invocation.
    pub emitter: EventEmitter,
}

/// What a routine hands back when it returns normally.
#[derive(Debug, Clone, Default)]
pub struct AgentOutcome {
    /// Final assistant response (markdown). Persisted as the assistant
    /// message content.
    pub response: String,
    /// True when the run paused for human input instead of finishing.
    pub interrupted: bool,
}

/// A background agent implementation.
///
/// Implementations emit progress through `ctx.emitter` and return the final
/// response. Errors and panics are converted by the executor into a
/// terminal `error` event; they never escape the run.
#[async_trait]
pub trait AgentRoutine: Send + Sync {
    async fn run(&self, ctx: AgentContext) -> anyhow::Result<AgentOutcome>;

    fn name(&self) -> &'static str {
        "agent"
    }
}
