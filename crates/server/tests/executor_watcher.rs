//! Executor and watcher behavior against a real file-backed store:
//! contiguous sequencing, terminal events, heartbeats, resume cursors,
//! and watcher independence.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_stream::StreamExt;

use relay_agent::invocation::AgentRoutine;
use relay_agent::scripted::{EchoAgent, ScriptStep, ScriptedAgent};
use relay_core::config::{StreamConfig, WriterConfig};
use relay_core::event::{Event, EventKind};
use relay_server::event_store::{EventStore, FileEventStore};
use relay_server::executor::{run_agent, ExecutorParams};
use relay_server::message_store::MessageStore;
use relay_server::registry::AgentRegistry;
use relay_server::watcher::watch;

struct Fixture {
    store: Arc<dyn EventStore>,
    messages: Arc<RwLock<MessageStore>>,
    registry: Arc<AgentRegistry>,
    stream: StreamConfig,
    writer: WriterConfig,
    _tmp: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    Fixture {
        store: Arc::new(FileEventStore::new(tmp.path()).unwrap()),
        messages: Arc::new(RwLock::new(MessageStore::new(tmp.path()).unwrap())),
        registry: Arc::new(AgentRegistry::new()),
        stream: StreamConfig {
            poll_interval_ms: 25,
            heartbeat_interval_s: 1,
            watcher_max_wait_s: 60,
        },
        writer: WriterConfig {
            retry_schedule_ms: vec![1, 2, 4],
            fallback_capacity: 64,
        },
        _tmp: tmp,
    }
}

impl Fixture {
    fn spawn(&self, message_id: &str, routine: Arc<dyn AgentRoutine>) {
        let params = ExecutorParams {
            message_id: message_id.to_string(),
            chat_id: "chat-1".to_string(),
            user_content: "ping".to_string(),
            metadata: serde_json::Value::Null,
            stream: self.stream.clone(),
            writer: self.writer.clone(),
        };
        let store = self.store.clone();
        let messages = self.messages.clone();
        self.registry.start(message_id, "chat-1", move |task| {
            run_agent(params, routine, store, messages, task)
        });
    }

    async fn wait_done(&self, message_id: &str) {
        for _ in 0..400 {
            if !self.registry.is_running(message_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("agent {message_id} did not finish in time");
    }

    fn watch_from(&self, message_id: &str, watcher_id: &str, since_seq: u64)
        -> tokio_stream::wrappers::ReceiverStream<Event>
    {
        watch(
            self.store.clone(),
            self.registry.clone(),
            message_id.to_string(),
            watcher_id.to_string(),
            since_seq,
            &self.stream,
        )
    }
}

fn assert_contiguous(events: &[Event]) {
    let seqs: Vec<u64> = events.iter().map(|e| e.seq.unwrap()).collect();
    let expected: Vec<u64> = (1..=events.len() as u64).collect();
    assert_eq!(seqs, expected, "event log must be gap-free from seq 1");
}

async fn collect_stream(
    mut stream: tokio_stream::wrappers::ReceiverStream<Event>,
) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(Some(ev)) = tokio::time::timeout(Duration::from_secs(10), stream.next()).await {
        events.push(ev);
    }
    events
}

#[tokio::test]
async fn test_happy_path_log_is_contiguous_with_single_terminal() {
    let fx = fixture();
    fx.spawn("m1", Arc::new(ScriptedAgent::demo()));
    fx.wait_done("m1").await;

    let events = fx.store.read_all("m1").await.unwrap();
    assert_contiguous(&events);

    assert_eq!(events[0].kind, EventKind::Start);
    assert_eq!(events[0].status.as_deref(), Some("processing"));

    // Exactly one terminal event, and it is the highest seq.
    let terminals: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_terminal())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(terminals, vec![events.len() - 1]);

    let end = events.last().unwrap();
    assert_eq!(end.kind, EventKind::End);
    assert_eq!(end.status.as_deref(), Some("completed"));
    assert_eq!(end.tool_calls, Some(2));
    assert!(end.ms_total.unwrap() > 0);

    // The assistant response landed in the message store path too: the
    // registry records a clean completion.
    let task = fx.registry.get("m1").unwrap();
    assert!(task.is_completed());
    assert!(task.error().is_none());
}

#[tokio::test]
async fn test_agent_failure_becomes_terminal_error_event() {
    let fx = fixture();
    let routine = Arc::new(ScriptedAgent::new(vec![
        ScriptStep::Thinking("about to break".to_string()),
        ScriptStep::Fail("tool exploded".to_string()),
    ]));
    fx.spawn("m1", routine);
    fx.wait_done("m1").await;

    let events = fx.store.read_all("m1").await.unwrap();
    assert_contiguous(&events);

    let end = events.last().unwrap();
    assert_eq!(end.kind, EventKind::Error);
    assert_eq!(end.error.as_deref(), Some("tool exploded"));

    let task = fx.registry.get("m1").unwrap();
    assert_eq!(task.error().as_deref(), Some("tool exploded"));
}

#[tokio::test]
async fn test_heartbeat_during_quiet_stretch() {
    let fx = fixture();
    // 2.5s of silence with a 1s heartbeat interval.
    let routine = Arc::new(ScriptedAgent::new(vec![
        ScriptStep::Thinking("starting long tool".to_string()),
        ScriptStep::Quiet(2500),
        ScriptStep::Content("done".to_string()),
    ]));
    fx.spawn("m1", routine);
    fx.wait_done("m1").await;

    let events = fx.store.read_all("m1").await.unwrap();
    assert_contiguous(&events);

    let heartbeats: Vec<&Event> = events
        .iter()
        .filter(|e| {
            e.kind == EventKind::Status
                && e.text.as_deref().is_some_and(|t| t.starts_with("Processing... ("))
        })
        .collect();
    assert!(
        heartbeats.len() >= 2,
        "expected at least two heartbeats, got {}",
        heartbeats.len()
    );
    assert!(heartbeats[0].text.as_deref().unwrap().ends_with("s elapsed)"));
}

#[tokio::test]
async fn test_interrupt_outcome_ends_with_interrupted_status() {
    let fx = fixture();
    let routine = Arc::new(ScriptedAgent::new(vec![
        ScriptStep::Thinking("checking".to_string()),
        ScriptStep::Interrupt("needs human approval".to_string()),
    ]));
    fx.spawn("m1", routine);
    fx.wait_done("m1").await;

    let events = fx.store.read_all("m1").await.unwrap();
    let end = events.last().unwrap();
    assert_eq!(end.kind, EventKind::End);
    assert_eq!(end.status.as_deref(), Some("interrupted"));

    // The interrupt record travels in a status event's md field.
    let interrupt = events
        .iter()
        .find(|e| e.kind == EventKind::Status && e.md.is_some())
        .expect("interrupt status event");
    let record: serde_json::Value =
        serde_json::from_str(interrupt.md.as_deref().unwrap()).unwrap();
    assert_eq!(record["interrupt"], true);
}

#[tokio::test]
async fn test_admin_abort_writes_terminal_first() {
    let fx = fixture();
    let routine = Arc::new(ScriptedAgent::new(vec![
        ScriptStep::Thinking("long run".to_string()),
        ScriptStep::Quiet(30_000),
        ScriptStep::Content("never reached".to_string()),
    ]));
    fx.spawn("m1", routine);

    // Let the run start, then abort it.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(fx.registry.abort("m1"));
    fx.wait_done("m1").await;

    let events = fx.store.read_all("m1").await.unwrap();
    assert_contiguous(&events);
    let end = events.last().unwrap();
    assert_eq!(end.kind, EventKind::End);
    assert_eq!(end.status.as_deref(), Some("interrupted"));
}

#[tokio::test]
async fn test_watcher_catches_up_then_follows_live() {
    let fx = fixture();
    let routine = Arc::new(ScriptedAgent::new(vec![
        ScriptStep::Thinking("phase one".to_string()),
        ScriptStep::Quiet(400),
        ScriptStep::Content("phase two result".to_string()),
    ]));
    fx.spawn("m1", routine);

    // Join after some events already exist.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let observed = collect_stream(fx.watch_from("m1", "w1", 0)).await;

    assert_contiguous(&observed);
    assert_eq!(observed[0].kind, EventKind::Start);
    assert!(observed.last().unwrap().is_terminal());

    // The watcher saw exactly what was persisted.
    let persisted = fx.store.read_all("m1").await.unwrap();
    let observed_ids: Vec<&str> = observed.iter().map(|e| e.id.as_str()).collect();
    let persisted_ids: Vec<&str> = persisted.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(observed_ids, persisted_ids);
}

#[tokio::test]
async fn test_resume_cursor_yields_only_later_events() {
    let fx = fixture();
    fx.spawn("m1", Arc::new(EchoAgent));
    fx.wait_done("m1").await;

    let all = fx.store.read_all("m1").await.unwrap();
    assert!(all.len() > 3);
    let k = 2u64;

    let resumed = collect_stream(fx.watch_from("m1", "w-resume", k)).await;
    let seqs: Vec<u64> = resumed.iter().map(|e| e.seq.unwrap()).collect();
    let expected: Vec<u64> = ((k + 1)..=all.len() as u64).collect();
    assert_eq!(seqs, expected, "resume must deliver seq > k only, no gaps");
}

#[tokio::test]
async fn test_concurrent_watchers_observe_identical_sequences() {
    let fx = fixture();
    fx.spawn("m1", Arc::new(ScriptedAgent::demo()));

    let (a, b) = tokio::join!(
        collect_stream(fx.watch_from("m1", "w-a", 0)),
        collect_stream(fx.watch_from("m1", "w-b", 0)),
    );

    let ids_a: Vec<&str> = a.iter().map(|e| e.id.as_str()).collect();
    let ids_b: Vec<&str> = b.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids_a, ids_b);
    assert_contiguous(&a);
}

#[tokio::test]
async fn test_dropped_watcher_does_not_disturb_run_or_log() {
    let fx = fixture();
    let routine = Arc::new(ScriptedAgent::new(vec![
        ScriptStep::Thinking("working".to_string()),
        ScriptStep::Quiet(500),
        ScriptStep::Content("final answer".to_string()),
    ]));
    fx.spawn("m1", routine);

    // Open a watcher and kill it almost immediately, mid-run.
    let mut doomed = fx.watch_from("m1", "w-doomed", 0);
    let _ = tokio::time::timeout(Duration::from_millis(100), doomed.next()).await;
    drop(doomed);

    fx.wait_done("m1").await;

    let events = fx.store.read_all("m1").await.unwrap();
    assert_contiguous(&events);
    assert_eq!(events.last().unwrap().status.as_deref(), Some("completed"));

    // The watcher unregistered itself; no leak in the registry.
    for _ in 0..40 {
        if fx.registry.get("m1").unwrap().watcher_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(fx.registry.get("m1").unwrap().watcher_count(), 0);
}

#[tokio::test]
async fn test_watcher_on_unknown_message_times_out_after_grace() {
    let fx = fixture();
    // max_wait 60s → grace 1s for a message with no task and no events.
    let started = std::time::Instant::now();
    let events = collect_stream(fx.watch_from("ghost", "w1", 0)).await;
    assert!(events.is_empty());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(900), "ended too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(10), "grace did not apply: {elapsed:?}");
}
