//! Server startup: shared state initialization and background task
//! spawning.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};

use relay_agent::invocation::AgentRoutine;
use relay_agent::scripted::{EchoAgent, ScriptedAgent};
use relay_core::Config;

use crate::event_store::FileEventStore;
use crate::message_store::MessageStore;
use crate::registry::AgentRegistry;
use crate::state::AppState;

/// How often the registry GC runs.
const GC_INTERVAL: Duration = Duration::from_secs(3600);
/// How often expired event logs are pruned (when a TTL is configured).
const TTL_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Select the built-in agent routine named in config.
fn build_routine(config: &Config) -> Arc<dyn AgentRoutine> {
    match config.agent.routine.as_str() {
        "scripted" => Arc::new(ScriptedAgent::demo()),
        "echo" => Arc::new(EchoAgent),
        other => {
            warn!(routine = %other, "unknown agent routine, falling back to echo");
            Arc::new(EchoAgent)
        }
    }
}

/// Build `AppState` with all persistent stores initialized.
pub fn build_app_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    std::fs::create_dir_all(&config.storage.data_dir)?;

    let events = Arc::new(FileEventStore::new(&config.storage.data_dir)?);
    let messages = MessageStore::new(&config.storage.data_dir)?;
    let routine = build_routine(&config);
    info!(routine = %routine.name(), "agent routine ready");

    Ok(Arc::new(AppState {
        config,
        events,
        registry: Arc::new(AgentRegistry::new()),
        messages: Arc::new(RwLock::new(messages)),
        routine,
    }))
}

/// Spawn the periodic maintenance tasks (registry GC, event-log TTL prune).
pub fn spawn_background_tasks(state: Arc<AppState>) {
    let gc_state = state.clone();
    tokio::spawn(async move {
        let max_age = gc_state.config.registry.gc_max_age();
        let mut interval = tokio::time::interval(GC_INTERVAL);
        interval.tick().await; // skip immediate tick
        loop {
            interval.tick().await;
            gc_state.registry.gc(max_age);
        }
    });

    let ttl_s = state.config.storage.message_events_ttl_s;
    if ttl_s > 0 {
        let prune_state = state;
        tokio::spawn(async move {
            let ttl = Duration::from_secs(ttl_s);
            let mut interval = tokio::time::interval(TTL_PRUNE_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                match prune_state.events.prune_expired(ttl).await {
                    Ok(0) => {}
                    Ok(n) => info!(pruned = n, "expired event logs removed"),
                    Err(e) => warn!(error = %e, "event log pruning failed"),
                }
            }
        });
    }
}
