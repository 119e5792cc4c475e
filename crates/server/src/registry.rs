//! Process-wide registry of running agent tasks.
//!
//! Tasks are spawned detached: the HTTP handler that starts one returns
//! immediately and nothing in the request path holds the join handle, so a
//! client disconnect can never cancel agent work. Completed tasks stay in
//! the registry for a retention window (late joiners can still see their
//! status) and are removed by the periodic GC.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;

/// One running (or recently finished) agent task.
pub struct RunningTask {
    pub message_id: String,
    pub chat_id: String,
    pub started_at: DateTime<Utc>,
    completed: AtomicBool,
    completed_at: RwLock<Option<DateTime<Utc>>>,
    error: RwLock<Option<String>>,
    watchers: Mutex<HashSet<String>>,
    /// Administrative abort signal, observed by the executor's drain loop.
    abort: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RunningTask {
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        *self.completed_at.read().expect("task lock poisoned")
    }

    pub fn error(&self) -> Option<String> {
        self.error.read().expect("task lock poisoned").clone()
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().expect("task lock poisoned").len()
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    fn mark_completed(&self, error: Option<String>) {
        self.completed.store(true, Ordering::SeqCst);
        *self.completed_at.write().expect("task lock poisoned") = Some(Utc::now());
        if error.is_some() {
            *self.error.write().expect("task lock poisoned") = error;
        }
    }
}

/// Serializable view for the active-agents endpoint.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct TaskSummary {
    pub message_id: String,
    pub chat_id: String,
    pub watchers: usize,
    pub completed: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&RunningTask> for TaskSummary {
    fn from(task: &RunningTask) -> Self {
        Self {
            message_id: task.message_id.clone(),
            chat_id: task.chat_id.clone(),
            watchers: task.watcher_count(),
            completed: task.is_completed(),
            started_at: task.started_at,
            error: task.error(),
        }
    }
}

/// Registry of background agent tasks, one per process.
pub struct AgentRegistry {
    tasks: Mutex<HashMap<String, Arc<RunningTask>>>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start a background task for `message_id` if none exists. Idempotent:
    /// a second start for the same message returns the existing task
    /// untouched. `make` receives the task record (for its abort signal)
    /// and produces the executor future, which is spawned detached.
    pub fn start<F, Fut>(&self, message_id: &str, chat_id: &str, make: F) -> Arc<RunningTask>
    where
        F: FnOnce(Arc<RunningTask>) -> Fut,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().expect("registry lock poisoned");
        if let Some(existing) = tasks.get(message_id) {
            tracing::warn!(message_id = %message_id, "agent already running, returning existing task");
            return existing.clone();
        }

        let task = Arc::new(RunningTask {
            message_id: message_id.to_string(),
            chat_id: chat_id.to_string(),
            started_at: Utc::now(),
            completed: AtomicBool::new(false),
            completed_at: RwLock::new(None),
            error: RwLock::new(None),
            watchers: Mutex::new(HashSet::new()),
            abort: AtomicBool::new(false),
            handle: Mutex::new(None),
        });
        tasks.insert(message_id.to_string(), task.clone());
        drop(tasks);

        let fut = make(task.clone());
        let record = task.clone();
        let message_id = message_id.to_string();
        let handle = tokio::spawn(async move {
            let result = fut.await;
            match &result {
                Ok(()) => tracing::info!(message_id = %message_id, "agent task completed"),
                Err(e) => {
                    tracing::warn!(message_id = %message_id, error = %e, "agent task finished with error")
                }
            }
            record.mark_completed(result.err());
        });
        *task.handle.lock().expect("task lock poisoned") = Some(handle);

        tracing::info!(message_id = %task.message_id, chat_id = %task.chat_id, "started background agent");
        task
    }

    pub fn get(&self, message_id: &str) -> Option<Arc<RunningTask>> {
        self.tasks
            .lock()
            .expect("registry lock poisoned")
            .get(message_id)
            .cloned()
    }

    pub fn is_running(&self, message_id: &str) -> bool {
        self.get(message_id).is_some_and(|t| !t.is_completed())
    }

    /// Running (not completed) tasks, optionally filtered by chat.
    pub fn list(&self, chat_id: Option<&str>) -> Vec<TaskSummary> {
        let tasks = self.tasks.lock().expect("registry lock poisoned");
        let mut summaries: Vec<TaskSummary> = tasks
            .values()
            .filter(|t| !t.is_completed())
            .filter(|t| chat_id.map_or(true, |c| t.chat_id == c))
            .map(|t| TaskSummary::from(t.as_ref()))
            .collect();
        summaries.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        summaries
    }

    pub fn active_count(&self) -> usize {
        self.tasks
            .lock()
            .expect("registry lock poisoned")
            .values()
            .filter(|t| !t.is_completed())
            .count()
    }

    pub fn register_watcher(&self, message_id: &str, watcher_id: &str) {
        if let Some(task) = self.get(message_id) {
            task.watchers
                .lock()
                .expect("task lock poisoned")
                .insert(watcher_id.to_string());
            tracing::info!(message_id = %message_id, watcher_id = %watcher_id, "watcher registered");
        }
    }

    pub fn unregister_watcher(&self, message_id: &str, watcher_id: &str) {
        if let Some(task) = self.get(message_id) {
            task.watchers
                .lock()
                .expect("task lock poisoned")
                .remove(watcher_id);
            tracing::info!(message_id = %message_id, watcher_id = %watcher_id, "watcher unregistered");
        }
    }

    /// Administrative abort. The executor notices the flag, drains what is
    /// queued, writes its terminal event, and returns; work stops shortly
    /// after, never before the terminal event.
    pub fn abort(&self, message_id: &str) -> bool {
        match self.get(message_id) {
            Some(task) if !task.is_completed() => {
                task.abort.store(true, Ordering::SeqCst);
                tracing::warn!(message_id = %message_id, "abort requested for running agent");
                true
            }
            _ => false,
        }
    }

    /// Remove completed tasks whose completion is older than `max_age`.
    pub fn gc(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::hours(24));
        let mut tasks = self.tasks.lock().expect("registry lock poisoned");
        let before = tasks.len();
        tasks.retain(|_, task| match task.completed_at() {
            Some(done) if task.is_completed() => done > cutoff,
            _ => true,
        });
        let removed = before - tasks.len();
        if removed > 0 {
            tracing::info!(removed, "garbage-collected completed agent tasks");
        }
        removed
    }

    /// Wait up to `grace` for running tasks to finish, then abort the rest.
    /// Events already persisted stay readable either way.
    pub async fn shutdown(&self, grace: Duration) {
        let deadline = tokio::time::Instant::now() + grace;
        while self.active_count() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let abandoned: Vec<Arc<RunningTask>> = {
            let tasks = self.tasks.lock().expect("registry lock poisoned");
            tasks.values().filter(|t| !t.is_completed()).cloned().collect()
        };
        for task in abandoned {
            tracing::warn!(message_id = %task.message_id, "abandoning agent task at shutdown");
            if let Some(handle) = task.handle.lock().expect("task lock poisoned").take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_task(
    ) -> impl FnOnce(Arc<RunningTask>) -> std::pin::Pin<Box<dyn Future<Output = Result<(), String>> + Send>>
    {
        |_task| Box::pin(async { Ok(()) })
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let registry = AgentRegistry::new();
        let first = registry.start("m1", "c1", |_t| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        });
        let second = registry.start("m1", "c1", quick_task());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.active_count(), 1);
    }

    #[tokio::test]
    async fn test_completion_tracked_without_watchers() {
        let registry = AgentRegistry::new();
        registry.start("m1", "c1", quick_task());

        // The task runs and completes with zero watchers attached.
        for _ in 0..50 {
            if !registry.is_running("m1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let task = registry.get("m1").unwrap();
        assert!(task.is_completed());
        assert!(task.error().is_none());
        assert!(task.completed_at().is_some());
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_error_captured() {
        let registry = AgentRegistry::new();
        registry.start("m1", "c1", |_t| async { Err("agent blew up".to_string()) });

        for _ in 0..50 {
            if !registry.is_running("m1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(registry.get("m1").unwrap().error().as_deref(), Some("agent blew up"));
    }

    #[tokio::test]
    async fn test_watcher_registration() {
        let registry = AgentRegistry::new();
        registry.start("m1", "c1", |_t| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        });

        registry.register_watcher("m1", "w1");
        registry.register_watcher("m1", "w2");
        registry.register_watcher("m1", "w2"); // set semantics
        assert_eq!(registry.get("m1").unwrap().watcher_count(), 2);

        registry.unregister_watcher("m1", "w1");
        assert_eq!(registry.get("m1").unwrap().watcher_count(), 1);

        // Unknown message is a no-op.
        registry.register_watcher("nope", "w9");
    }

    #[tokio::test]
    async fn test_list_filters_by_chat() {
        let registry = AgentRegistry::new();
        let slow = |_t: Arc<RunningTask>| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        };
        registry.start("m1", "chat-a", slow);
        registry.start("m2", "chat-b", slow);
        registry.start("m3", "chat-a", slow);

        assert_eq!(registry.list(None).len(), 3);
        let chat_a = registry.list(Some("chat-a"));
        assert_eq!(chat_a.len(), 2);
        assert!(chat_a.iter().all(|t| t.chat_id == "chat-a"));
        assert!(chat_a.iter().all(|t| !t.completed));
    }

    #[tokio::test]
    async fn test_gc_removes_only_old_completed() {
        let registry = AgentRegistry::new();
        registry.start("done", "c1", quick_task());
        registry.start("running", "c1", |_t| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        });

        for _ in 0..50 {
            if !registry.is_running("done") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Fresh completion survives a generous max_age.
        assert_eq!(registry.gc(Duration::from_secs(3600)), 0);
        assert!(registry.get("done").is_some());

        // Zero max_age collects it; the running task stays.
        assert_eq!(registry.gc(Duration::ZERO), 1);
        assert!(registry.get("done").is_none());
        assert!(registry.get("running").is_some());
    }

    #[tokio::test]
    async fn test_abort_sets_flag_only_for_running() {
        let registry = AgentRegistry::new();
        let task = registry.start("m1", "c1", |t| async move {
            while !t.abort_requested() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Ok(())
        });

        assert!(!task.abort_requested());
        assert!(registry.abort("m1"));
        assert!(task.abort_requested());
        assert!(!registry.abort("unknown"));

        for _ in 0..50 {
            if !registry.is_running("m1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(task.is_completed());
        // Completed tasks can no longer be aborted.
        assert!(!registry.abort("m1"));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_grace() {
        let registry = AgentRegistry::new();
        registry.start("quick", "c1", |_t| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        });

        registry.shutdown(Duration::from_secs(2)).await;
        assert_eq!(registry.active_count(), 0);
        assert!(registry.get("quick").unwrap().is_completed());
    }
}
