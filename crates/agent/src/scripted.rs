//! Built-in agent routines.
//!
//! The real reasoning engine lives behind [`AgentRoutine`] and is not part
//! of this workspace. [`EchoAgent`] gives the server something to run out
//! of the box; [`ScriptedAgent`] replays a deterministic step script and is
//! the workhorse of the executor and streaming tests.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use relay_core::event::PlanItem;

use crate::invocation::{AgentContext, AgentOutcome, AgentRoutine};
use crate::sanitize::{sanitize_tool_args, sanitize_tool_result};

const CONTENT_CHUNK_WORDS: usize = 10;
const CONTENT_CHUNK_DELAY: Duration = Duration::from_millis(20);

/// Stream `text` as progressive content chunks.
async fn stream_content(ctx: &AgentContext, text: &str) {
    ctx.emitter.emit_content_start();
    let words: Vec<&str> = text.split_whitespace().collect();
    for chunk in words.chunks(CONTENT_CHUNK_WORDS) {
        ctx.emitter.emit_content(chunk.join(" "));
        tokio::time::sleep(CONTENT_CHUNK_DELAY).await;
    }
    ctx.emitter.emit_content_end();
}

// ── Echo agent ────────────────────────────────────────────────

/// Minimal routine: acknowledges the user message and echoes it back.
pub struct EchoAgent;

#[async_trait]
impl AgentRoutine for EchoAgent {
    async fn run(&self, ctx: AgentContext) -> anyhow::Result<AgentOutcome> {
        ctx.emitter
            .emit_thinking(format!("Reading message: {}", truncate(&ctx.user_content, 80)));
        let response = format!("You said: {}", ctx.user_content);
        stream_content(&ctx, &response).await;
        Ok(AgentOutcome {
            response,
            interrupted: false,
        })
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{head}...")
    }
}

// ── Scripted agent ────────────────────────────────────────────

/// One step of a scripted run.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Thinking(String),
    Plan(Vec<PlanItem>),
    /// Simulated tool call: emits tool_start, idles for `ms`, emits tool_end.
    /// A `result` starting with "Error:" produces `status = "error"`.
    Tool {
        name: String,
        args: Value,
        result: String,
        ms: u64,
    },
    /// Spawn a sub-agent that thinks and finishes.
    Subagent {
        description: String,
        thinking: String,
        ms: u64,
    },
    /// Final response text, streamed as content chunks.
    Content(String),
    /// Idle without emitting anything (drives heartbeats in tests).
    Quiet(u64),
    /// Pause for human input: emits the interrupt record and returns early.
    Interrupt(String),
    /// Abort the run with an error.
    Fail(String),
}

/// Replays a fixed sequence of steps. Deterministic apart from timing.
pub struct ScriptedAgent {
    steps: Vec<ScriptStep>,
}

impl ScriptedAgent {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self { steps }
    }

    /// A representative run: plan, two tool calls, a sub-agent, content.
    pub fn demo() -> Self {
        Self::new(vec![
            ScriptStep::Thinking("Breaking the request into steps".to_string()),
            ScriptStep::Plan(vec![
                plan_item("1", "Search the corpus", "in_progress"),
                plan_item("2", "Summarize findings", "pending"),
            ]),
            ScriptStep::Tool {
                name: "search_corpus".to_string(),
                args: serde_json::json!({"query": "relevant sections"}),
                result: "Found 3 relevant sections".to_string(),
                ms: 120,
            },
            ScriptStep::Subagent {
                description: "Deep-read the top match".to_string(),
                thinking: "Extracting the key paragraph".to_string(),
                ms: 80,
            },
            ScriptStep::Tool {
                name: "read_file".to_string(),
                args: serde_json::json!({"file_path": "summary.md"}),
                result: "line one\nline two\nline three".to_string(),
                ms: 60,
            },
            ScriptStep::Content(
                "Here is what I found: the corpus contains three relevant sections, \
                 and the strongest match is summarized above."
                    .to_string(),
            ),
        ])
    }
}

fn plan_item(id: &str, text: &str, status: &str) -> PlanItem {
    use relay_core::event::PlanItemStatus;
    PlanItem {
        id: id.to_string(),
        text: text.to_string(),
        status: match status {
            "in_progress" => PlanItemStatus::InProgress,
            "completed" => PlanItemStatus::Completed,
            "cancelled" => PlanItemStatus::Cancelled,
            _ => PlanItemStatus::Pending,
        },
    }
}

#[async_trait]
impl AgentRoutine for ScriptedAgent {
    async fn run(&self, ctx: AgentContext) -> anyhow::Result<AgentOutcome> {
        let mut response = String::new();
        let mut call_seq = 0u64;

        for step in &self.steps {
            match step {
                ScriptStep::Thinking(text) => ctx.emitter.emit_thinking(text.clone()),
                ScriptStep::Plan(items) => ctx.emitter.emit_plan(items.clone()),
                ScriptStep::Tool {
                    name,
                    args,
                    result,
                    ms,
                } => {
                    call_seq += 1;
                    let call_id = format!("call_{call_seq}");
                    ctx.emitter.emit_tool_start(
                        &call_id,
                        name,
                        &sanitize_tool_args(name, args),
                        None,
                    );
                    tokio::time::sleep(Duration::from_millis(*ms)).await;
                    let status = if result.starts_with("Error:") {
                        "error"
                    } else {
                        "ok"
                    };
                    ctx.emitter.emit_tool_end(
                        &call_id,
                        name,
                        status,
                        *ms,
                        &sanitize_tool_result(name, result),
                    );
                }
                ScriptStep::Subagent {
                    description,
                    thinking,
                    ms,
                } => {
                    call_seq += 1;
                    let parent_call_id = format!("call_{call_seq}");
                    let sub = ctx.emitter.fork_subagent(&parent_call_id);
                    sub.emit_subagent_start(sub.agent_id(), &parent_call_id, description);
                    sub.emit_thinking(thinking.clone());
                    tokio::time::sleep(Duration::from_millis(*ms)).await;
                    sub.emit_subagent_end(sub.agent_id(), &parent_call_id, Some(*ms));
                }
                ScriptStep::Content(text) => {
                    stream_content(&ctx, text).await;
                    response = text.clone();
                }
                ScriptStep::Quiet(ms) => tokio::time::sleep(Duration::from_millis(*ms)).await,
                ScriptStep::Interrupt(reason) => {
                    let record = serde_json::json!({
                        "interrupt": true,
                        "reason": reason,
                        "message_id": ctx.message_id,
                    });
                    ctx.emitter
                        .emit(relay_core::event::Event::interrupt("Waiting for input", &record));
                    return Ok(AgentOutcome {
                        response,
                        interrupted: true,
                    });
                }
                ScriptStep::Fail(message) => anyhow::bail!(message.clone()),
            }
        }

        Ok(AgentOutcome {
            response,
            interrupted: false,
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::EventEmitter;
    use relay_core::event::EventKind;

    fn context(emitter: EventEmitter) -> AgentContext {
        AgentContext {
            message_id: "m1".to_string(),
            chat_id: "c1".to_string(),
            user_content: "ping".to_string(),
            metadata: Value::Null,
            emitter,
        }
    }

    async fn collect(mut rx: crate::emitter::EventReceiver) -> Vec<relay_core::event::Event> {
        let mut events = Vec::new();
        while let Some(ev) = rx.try_drain() {
            events.push(ev);
        }
        events
    }

    #[tokio::test]
    async fn test_echo_agent_streams_content() {
        let (emitter, rx) = EventEmitter::channel("m1", "c1");
        let outcome = EchoAgent.run(context(emitter)).await.unwrap();
        assert_eq!(outcome.response, "You said: ping");
        assert!(!outcome.interrupted);

        let events = collect(rx).await;
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds[0], EventKind::Thinking);
        assert!(kinds.contains(&EventKind::ContentStart));
        assert!(kinds.contains(&EventKind::Content));
        assert_eq!(*kinds.last().unwrap(), EventKind::ContentEnd);
    }

    #[tokio::test]
    async fn test_demo_script_event_shape() {
        let (emitter, rx) = EventEmitter::channel("m1", "c1");
        let outcome = ScriptedAgent::demo().run(context(emitter)).await.unwrap();
        assert!(outcome.response.contains("three relevant sections"));

        let events = collect(rx).await;
        let tool_starts: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::ToolStart)
            .collect();
        assert_eq!(tool_starts.len(), 2);
        assert_eq!(
            tool_starts[0].args_summary.as_deref(),
            Some("query='relevant sections'")
        );

        let tool_end = events
            .iter()
            .find(|e| e.kind == EventKind::ToolEnd)
            .unwrap();
        assert_eq!(tool_end.status.as_deref(), Some("ok"));
        assert_eq!(tool_end.result_summary.as_deref(), Some("Found 3 results"));

        let sub_start = events
            .iter()
            .find(|e| e.kind == EventKind::SubagentStart)
            .unwrap();
        assert_eq!(sub_start.agent_type.as_deref(), Some("subagent"));
        assert!(sub_start.parent_call_id.is_some());
    }

    #[tokio::test]
    async fn test_interrupt_step_returns_early() {
        let (emitter, rx) = EventEmitter::channel("m1", "c1");
        let agent = ScriptedAgent::new(vec![
            ScriptStep::Thinking("working".to_string()),
            ScriptStep::Interrupt("needs approval".to_string()),
            ScriptStep::Content("never reached".to_string()),
        ]);
        let outcome = agent.run(context(emitter)).await.unwrap();
        assert!(outcome.interrupted);

        let events = collect(rx).await;
        let status = events.iter().find(|e| e.kind == EventKind::Status).unwrap();
        let record: Value = serde_json::from_str(status.md.as_deref().unwrap()).unwrap();
        assert_eq!(record["interrupt"], true);
        assert!(!events.iter().any(|e| e.kind == EventKind::Content));
    }

    #[tokio::test]
    async fn test_fail_step_errors() {
        let (emitter, _rx) = EventEmitter::channel("m1", "c1");
        let agent = ScriptedAgent::new(vec![ScriptStep::Fail("tool exploded".to_string())]);
        let err = agent.run(context(emitter)).await.unwrap_err();
        assert_eq!(err.to_string(), "tool exploded");
    }
}
