pub mod emitter;
pub mod invocation;
pub mod sanitize;
pub mod scripted;

pub use emitter::{EventEmitter, EventReceiver};
pub use invocation::{AgentContext, AgentOutcome, AgentRoutine};
pub use scripted::{EchoAgent, ScriptStep, ScriptedAgent};
