use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub stream: StreamConfig,
    pub writer: WriterConfig,
    pub registry: RegistryConfig,
    pub agent: AgentConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RELAY_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("RELAY_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
            stream: StreamConfig::from_env_profiled(p),
            writer: WriterConfig::from_env_profiled(p),
            registry: RegistryConfig::from_env_profiled(p),
            agent: AgentConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() {
            "default"
        } else {
            &self.profile
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:    host={}, port={}", self.server.host, self.server.port);
        tracing::info!("  storage:   data_dir={}", self.storage.data_dir.display());
        tracing::info!(
            "  stream:    poll={}ms, heartbeat={}s, max_wait={}s",
            self.stream.poll_interval_ms,
            self.stream.heartbeat_interval_s,
            self.stream.watcher_max_wait_s
        );
        tracing::info!(
            "  writer:    retries={:?}ms, fallback_capacity={}",
            self.writer.retry_schedule_ms,
            self.writer.fallback_capacity
        );
        tracing::info!(
            "  registry:  gc_max_age={}h, events_ttl={}s",
            self.registry.gc_max_age_h,
            self.storage.message_events_ttl_s
        );
        tracing::info!("  agent:     routine={}", self.agent.routine);
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 3001),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Event log TTL in seconds. 0 disables pruning.
    pub message_events_ttl_s: u64,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_dir: PathBuf::from(profiled_env_or(p, "DATA_DIR", "data")),
            message_events_ttl_s: profiled_env_u64(p, "MESSAGE_EVENTS_TTL_S", 0),
        }
    }
}

// ── Streaming ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Watcher poll cadence in milliseconds.
    pub poll_interval_ms: u64,
    /// Executor heartbeat cadence in seconds.
    pub heartbeat_interval_s: u64,
    /// Watcher overall timeout (no new events) in seconds.
    pub watcher_max_wait_s: u64,
}

impl StreamConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            poll_interval_ms: profiled_env_u64(p, "POLL_INTERVAL_MS", 500),
            heartbeat_interval_s: profiled_env_u64(p, "HEARTBEAT_INTERVAL_S", 15),
            watcher_max_wait_s: profiled_env_u64(p, "WATCHER_MAX_WAIT_S", 3600),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_s)
    }

    pub fn watcher_max_wait(&self) -> Duration {
        Duration::from_secs(self.watcher_max_wait_s)
    }
}

// ── Robust writer ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Exponential backoff schedule, one entry per retry.
    pub retry_schedule_ms: Vec<u64>,
    /// Bounded fallback queue capacity.
    pub fallback_capacity: usize,
}

impl WriterConfig {
    fn from_env_profiled(p: &str) -> Self {
        let raw = profiled_env_or(p, "WRITER_RETRY_SCHEDULE_MS", "100,200,400");
        let retry_schedule_ms: Vec<u64> = raw
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        Self {
            retry_schedule_ms: if retry_schedule_ms.is_empty() {
                vec![100, 200, 400]
            } else {
                retry_schedule_ms
            },
            fallback_capacity: profiled_env_usize(p, "WRITER_FALLBACK_CAPACITY", 1024),
        }
    }

    pub fn retry_schedule(&self) -> Vec<Duration> {
        self.retry_schedule_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }
}

// ── Task registry ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Age in hours after which completed tasks are garbage-collected.
    pub gc_max_age_h: u32,
}

impl RegistryConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            gc_max_age_h: profiled_env_u32(p, "REGISTRY_GC_MAX_AGE_H", 24),
        }
    }

    pub fn gc_max_age(&self) -> Duration {
        Duration::from_secs(u64::from(self.gc_max_age_h) * 3600)
    }
}

// ── Agent routine ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Built-in routine selector: "echo" or "scripted".
    pub routine: String,
}

impl AgentConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            routine: profiled_env_or(p, "AGENT_ROUTINE", "echo"),
        }
    }
}
