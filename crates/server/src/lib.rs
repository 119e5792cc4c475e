//! Background agent execution and event-streaming core.
//!
//! Decouples long-running agent work from the clients observing it:
//! the registry owns detached executor tasks, the executor persists every
//! observable step into the append-only event store, and any number of
//! SSE watchers tail the store independently. Clients may disconnect,
//! reconnect with `Last-Event-ID`, or join late without disturbing the run.

pub mod api;
pub mod cli;
pub mod event_store;
pub mod executor;
pub mod message_store;
pub mod registry;
pub mod router;
pub mod startup;
pub mod state;
pub mod watcher;
pub mod writer;
