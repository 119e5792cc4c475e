//! File-backed event store.
//!
//! One JSONL file per message under `{data_dir}/message-events/`, plus a
//! sidecar `.seq` file holding the next sequence number so allocation
//! survives restarts. An in-memory index (lazy-loaded per message) enforces
//! the uniqueness constraints before anything touches disk.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use relay_core::event::Event;
use relay_core::RelayError;

use super::EventStore;

struct MessageLog {
    /// Events ordered by seq ascending.
    events: Vec<Event>,
    /// Persisted event ids, for the (message_id, id) uniqueness constraint.
    ids: HashSet<String>,
    next_seq: u64,
}

impl MessageLog {
    fn empty() -> Self {
        Self {
            events: Vec::new(),
            ids: HashSet::new(),
            next_seq: 1,
        }
    }
}

pub struct FileEventStore {
    dir: PathBuf,
    logs: RwLock<HashMap<String, MessageLog>>,
}

impl FileEventStore {
    pub fn new(data_dir: &Path) -> Result<Self, RelayError> {
        let dir = data_dir.join("message-events");
        std::fs::create_dir_all(&dir)?;
        tracing::info!(path = %dir.display(), "event store initialized");
        Ok(Self {
            dir,
            logs: RwLock::new(HashMap::new()),
        })
    }

    fn log_path(&self, message_id: &str) -> PathBuf {
        self.dir.join(format!("{message_id}.jsonl"))
    }

    fn seq_path(&self, message_id: &str) -> PathBuf {
        self.dir.join(format!("{message_id}.seq"))
    }

    /// Load a message's log from disk on first access.
    fn ensure_loaded(&self, message_id: &str) -> Result<(), RelayError> {
        {
            let logs = self.logs.read().expect("event store lock poisoned");
            if logs.contains_key(message_id) {
                return Ok(());
            }
        }

        let mut log = MessageLog::empty();
        let path = self.log_path(message_id);
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<Event>(line) {
                    Ok(event) => {
                        log.ids.insert(event.id.clone());
                        log.events.push(event);
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "skipping corrupt event line"
                        );
                    }
                }
            }
            log.events.sort_by_key(|e| e.seq.unwrap_or(0));
        }

        let seq_path = self.seq_path(message_id);
        log.next_seq = if seq_path.exists() {
            std::fs::read_to_string(&seq_path)?
                .trim()
                .parse()
                .unwrap_or_else(|_| fallback_next_seq(&log))
        } else {
            fallback_next_seq(&log)
        };

        let mut logs = self.logs.write().expect("event store lock poisoned");
        logs.entry(message_id.to_string()).or_insert(log);
        Ok(())
    }
}

fn fallback_next_seq(log: &MessageLog) -> u64 {
    log.events.iter().filter_map(|e| e.seq).max().unwrap_or(0) + 1
}

#[async_trait]
impl EventStore for FileEventStore {
    async fn allocate_seq(&self, message_id: &str) -> Result<u64, RelayError> {
        self.ensure_loaded(message_id)?;
        let mut logs = self.logs.write().expect("event store lock poisoned");
        let log = logs
            .entry(message_id.to_string())
            .or_insert_with(MessageLog::empty);
        let seq = log.next_seq;
        log.next_seq += 1;
        // Persist the counter while still holding the lock so concurrent
        // allocations for the same message stay serializable.
        std::fs::write(self.seq_path(message_id), log.next_seq.to_string())?;
        Ok(seq)
    }

    async fn append(&self, event: Event) -> Result<(), RelayError> {
        let message_id = event
            .message_id
            .clone()
            .ok_or_else(|| RelayError::Storage("append without message_id".into()))?;
        let seq = event
            .seq
            .ok_or_else(|| RelayError::Storage("append without allocated seq".into()))?;

        self.ensure_loaded(&message_id)?;
        let mut logs = self.logs.write().expect("event store lock poisoned");
        let log = logs
            .entry(message_id.clone())
            .or_insert_with(MessageLog::empty);

        if log.events.iter().any(|e| e.seq == Some(seq)) {
            return Err(RelayError::Conflict { message_id, seq });
        }
        if log.ids.contains(&event.id) {
            return Err(RelayError::DuplicateId(event.id));
        }

        let line = serde_json::to_string(&event)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(&message_id))?;
        writeln!(file, "{line}")?;

        log.ids.insert(event.id.clone());
        // Fallback-drained events can arrive after later sequences were
        // appended; keep the in-memory log ordered by seq.
        let pos = log
            .events
            .partition_point(|e| e.seq.unwrap_or(0) < seq);
        log.events.insert(pos, event);
        Ok(())
    }

    async fn read_since(
        &self,
        message_id: &str,
        since_seq: u64,
        limit: usize,
    ) -> Result<Vec<Event>, RelayError> {
        self.ensure_loaded(message_id)?;
        let logs = self.logs.read().expect("event store lock poisoned");
        let Some(log) = logs.get(message_id) else {
            return Ok(Vec::new());
        };
        Ok(log
            .events
            .iter()
            .filter(|e| e.seq.unwrap_or(0) > since_seq)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn read_all(&self, message_id: &str) -> Result<Vec<Event>, RelayError> {
        self.read_since(message_id, 0, usize::MAX).await
    }

    async fn event_count(&self, message_id: &str) -> Result<u64, RelayError> {
        self.ensure_loaded(message_id)?;
        let logs = self.logs.read().expect("event store lock poisoned");
        Ok(logs.get(message_id).map_or(0, |l| l.events.len() as u64))
    }

    async fn prune_expired(&self, ttl: Duration) -> Result<usize, RelayError> {
        if ttl.is_zero() {
            return Ok(0);
        }
        let cutoff = SystemTime::now() - ttl;
        let mut removed = 0;

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "jsonl") {
                continue;
            }
            let expired = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|mtime| mtime < cutoff)
                .unwrap_or(false);
            if !expired {
                continue;
            }

            let Some(message_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let message_id = message_id.to_string();
            std::fs::remove_file(&path)?;
            let seq_path = self.seq_path(&message_id);
            if seq_path.exists() {
                std::fs::remove_file(&seq_path)?;
            }
            self.logs
                .write()
                .expect("event store lock poisoned")
                .remove(&message_id);
            removed += 1;
            tracing::info!(message_id = %message_id, "pruned expired event log");
        }
        Ok(removed)
    }
}
