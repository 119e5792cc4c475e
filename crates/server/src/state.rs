//! Shared application state.

use std::sync::Arc;

use tokio::sync::RwLock;

use relay_agent::invocation::AgentRoutine;
use relay_core::Config;

use crate::event_store::EventStore;
use crate::executor::{run_agent, ExecutorParams};
use crate::message_store::MessageStore;
use crate::registry::{AgentRegistry, RunningTask};

pub struct AppState {
    pub config: Config,
    pub events: Arc<dyn EventStore>,
    pub registry: Arc<AgentRegistry>,
    pub messages: Arc<RwLock<MessageStore>>,
    /// The agent implementation behind the single invocation seam.
    pub routine: Arc<dyn AgentRoutine>,
}

impl AppState {
    /// Register and spawn the background executor for one assistant
    /// message. Returns immediately; idempotent per message id.
    pub fn spawn_agent(
        self: &Arc<Self>,
        message_id: &str,
        chat_id: &str,
        user_content: String,
        metadata: Option<serde_json::Value>,
    ) -> Arc<RunningTask> {
        let state = self.clone();
        let params = ExecutorParams {
            message_id: message_id.to_string(),
            chat_id: chat_id.to_string(),
            user_content,
            metadata: metadata.unwrap_or(serde_json::Value::Null),
            stream: self.config.stream.clone(),
            writer: self.config.writer.clone(),
        };
        self.registry.start(message_id, chat_id, move |task| {
            run_agent(
                params,
                state.routine.clone(),
                state.events.clone(),
                state.messages.clone(),
                task,
            )
        })
    }
}
