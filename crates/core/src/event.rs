//! Streaming event model (schema v2).
//!
//! One `Event` describes one observable step of an agent run. Events are
//! flat records with optional type-specific fields so that the wire shape
//! stays stable across schema additions; `seq`, `message_id`, `chat_id`
//! and the normalized `id` are stamped by the persistence layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SCHEMA_VERSION: u32 = 2;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Millisecond-precision ISO-8601 UTC timestamps on the wire.
mod ts_ms {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

// ── Event kinds ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Start,
    Thinking,
    Plan,
    ToolStart,
    ToolEnd,
    SubagentStart,
    SubagentEnd,
    ContentStart,
    Content,
    ContentEnd,
    Status,
    End,
    Error,
}

impl EventKind {
    /// Snake-case name used as the SSE `event:` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Thinking => "thinking",
            Self::Plan => "plan",
            Self::ToolStart => "tool_start",
            Self::ToolEnd => "tool_end",
            Self::SubagentStart => "subagent_start",
            Self::SubagentEnd => "subagent_end",
            Self::ContentStart => "content_start",
            Self::Content => "content",
            Self::ContentEnd => "content_end",
            Self::Status => "status",
            Self::End => "end",
            Self::Error => "error",
        }
    }

    /// `end` and `error` close a message's log; nothing may follow them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End | Self::Error)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Plan items ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanItemStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanItem {
    pub id: String,
    pub text: String,
    pub status: PlanItemStatus,
}

// ── Event record ──────────────────────────────────────────────

/// A single schema-v2 streaming event.
///
/// Emitted by the agent side with `id` empty and `seq` unset; the robust
/// writer allocates `seq`, normalizes `id`, restamps `ts`, and fills
/// `message_id`/`chat_id` before the event reaches the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(default = "default_schema_version")]
    pub v: u32,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub id: String,
    #[serde(with = "ts_ms")]
    pub ts: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    // Agent context (main vs sub-agent attribution)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_call_id: Option<String>,

    // plan
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<PlanItem>>,

    // tool_start / tool_end
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args_display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ms: Option<u64>,

    // subagent_start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subagent_description: Option<String>,

    // thinking / status / content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md: Option<String>,

    // end
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ms_total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<u64>,

    // error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Event {
    fn blank(kind: EventKind) -> Self {
        Self {
            v: SCHEMA_VERSION,
            kind,
            id: String::new(),
            ts: Utc::now(),
            seq: None,
            message_id: None,
            chat_id: None,
            status: None,
            agent_type: None,
            agent_id: None,
            parent_call_id: None,
            items: None,
            call_id: None,
            name: None,
            args_summary: None,
            args_display: None,
            result_summary: None,
            ms: None,
            subagent_description: None,
            text: None,
            md: None,
            ms_total: None,
            tool_calls: None,
            error: None,
        }
    }

    pub fn start(message_id: &str, chat_id: &str) -> Self {
        let mut ev = Self::blank(EventKind::Start);
        ev.message_id = Some(message_id.to_string());
        ev.chat_id = Some(chat_id.to_string());
        ev.status = Some("processing".to_string());
        ev
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        let mut ev = Self::blank(EventKind::Thinking);
        ev.text = Some(text.into());
        ev
    }

    pub fn plan(items: Vec<PlanItem>) -> Self {
        let mut ev = Self::blank(EventKind::Plan);
        ev.items = Some(items);
        ev
    }

    pub fn tool_start(
        call_id: impl Into<String>,
        name: impl Into<String>,
        args_summary: impl Into<String>,
        args_display: Option<String>,
    ) -> Self {
        let mut ev = Self::blank(EventKind::ToolStart);
        let name = name.into();
        ev.call_id = Some(call_id.into());
        ev.args_display = Some(args_display.unwrap_or_else(|| name.clone()));
        ev.name = Some(name);
        ev.args_summary = Some(args_summary.into());
        ev
    }

    pub fn tool_end(
        call_id: impl Into<String>,
        name: impl Into<String>,
        status: impl Into<String>,
        ms: u64,
        result_summary: impl Into<String>,
    ) -> Self {
        let mut ev = Self::blank(EventKind::ToolEnd);
        ev.call_id = Some(call_id.into());
        ev.name = Some(name.into());
        ev.status = Some(status.into());
        ev.ms = Some(ms);
        ev.result_summary = Some(result_summary.into());
        ev
    }

    pub fn subagent_start(
        agent_id: impl Into<String>,
        parent_call_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let mut ev = Self::blank(EventKind::SubagentStart);
        ev.agent_type = Some("subagent".to_string());
        ev.agent_id = Some(agent_id.into());
        ev.parent_call_id = Some(parent_call_id.into());
        ev.subagent_description = Some(description.into());
        ev
    }

    pub fn subagent_end(
        agent_id: impl Into<String>,
        parent_call_id: impl Into<String>,
        ms: Option<u64>,
    ) -> Self {
        let mut ev = Self::blank(EventKind::SubagentEnd);
        ev.agent_type = Some("subagent".to_string());
        ev.agent_id = Some(agent_id.into());
        ev.parent_call_id = Some(parent_call_id.into());
        ev.ms = ms;
        ev
    }

    pub fn content_start() -> Self {
        Self::blank(EventKind::ContentStart)
    }

    pub fn content(md: impl Into<String>) -> Self {
        let mut ev = Self::blank(EventKind::Content);
        ev.md = Some(md.into());
        ev
    }

    pub fn content_end() -> Self {
        Self::blank(EventKind::ContentEnd)
    }

    pub fn status_update(text: impl Into<String>) -> Self {
        let mut ev = Self::blank(EventKind::Status);
        ev.text = Some(text.into());
        ev
    }

    /// Status event whose `md` carries a JSON-encoded interrupt record for
    /// human-in-the-loop pauses.
    pub fn interrupt(text: impl Into<String>, record: &serde_json::Value) -> Self {
        let mut ev = Self::status_update(text);
        ev.md = Some(record.to_string());
        ev
    }

    pub fn end(status: impl Into<String>, ms_total: u64, tool_calls: u64) -> Self {
        let mut ev = Self::blank(EventKind::End);
        ev.status = Some(status.into());
        ev.ms_total = Some(ms_total);
        ev.tool_calls = Some(tool_calls);
        ev
    }

    pub fn error(error: impl Into<String>) -> Self {
        let mut ev = Self::blank(EventKind::Error);
        ev.error = Some(error.into());
        ev
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Attribute this event to a specific agent identity.
    pub fn with_agent(mut self, agent_type: &str, agent_id: &str) -> Self {
        self.agent_type = Some(agent_type.to_string());
        self.agent_id = Some(agent_id.to_string());
        self
    }
}

// ── Event id ──────────────────────────────────────────────────

/// Build the normalized event id: `{unix_ms}_{seq:04}_{random8hex}`.
///
/// Sorts lexicographically within a message for same-width timestamps, and
/// the embedded `seq` lets a resume cursor be recovered from the id alone.
pub fn event_id(ts: DateTime<Utc>, seq: u64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{:04}_{}", ts.timestamp_millis(), seq, &suffix[..8])
}

/// Extract the sequence number embedded in an event id.
///
/// Returns None on any malformed input so callers can fall back to
/// replaying from the beginning.
pub fn seq_from_id(id: &str) -> Option<u64> {
    let mut parts = id.split('_');
    let ts = parts.next()?;
    let seq = parts.next()?;
    if ts.is_empty() || ts.parse::<i64>().is_err() {
        return None;
    }
    seq.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_roundtrip() {
        let ts = Utc::now();
        let id = event_id(ts, 7);
        assert_eq!(seq_from_id(&id), Some(7));
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], ts.timestamp_millis().to_string());
        assert_eq!(parts[1], "0007");
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn test_seq_from_id_wide_seq() {
        let id = event_id(Utc::now(), 123_456);
        assert_eq!(seq_from_id(&id), Some(123_456));
    }

    #[test]
    fn test_seq_from_id_malformed() {
        assert_eq!(seq_from_id("garbage"), None);
        assert_eq!(seq_from_id(""), None);
        assert_eq!(seq_from_id("abc_def_ghi"), None);
        assert_eq!(seq_from_id("_12_deadbeef"), None);
        assert_eq!(seq_from_id("1699999999999"), None);
    }

    #[test]
    fn test_serialization_omits_unset_fields() {
        let ev = Event::content("hello **world**");
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "content");
        assert_eq!(json["md"], "hello **world**");
        assert_eq!(json["v"], 2);
        assert!(json.get("call_id").is_none());
        assert!(json.get("error").is_none());
        assert!(json.get("seq").is_none());
    }

    #[test]
    fn test_ts_millisecond_format() {
        let ev = Event::start("m1", "c1");
        let json = serde_json::to_string(&ev).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();
        // Millisecond precision survives the round trip exactly.
        assert_eq!(
            parsed.ts.timestamp_millis(),
            ev.ts.timestamp_millis()
        );
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let raw_ts = value["ts"].as_str().unwrap();
        assert!(raw_ts.ends_with('Z'));
        // 2026-01-02T03:04:05.678Z — exactly three fractional digits.
        assert_eq!(raw_ts.split('.').nth(1).map(|f| f.len()), Some(4));
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(Event::end("completed", 10, 0).is_terminal());
        assert!(Event::error("boom").is_terminal());
        assert!(!Event::status_update("working").is_terminal());
        assert!(!Event::start("m", "c").is_terminal());
    }

    #[test]
    fn test_plan_item_status_wire_names() {
        let item = PlanItem {
            id: "1".to_string(),
            text: "gather sources".to_string(),
            status: PlanItemStatus::InProgress,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["status"], "in_progress");
    }

    #[test]
    fn test_tool_start_args_display_fallback() {
        let ev = Event::tool_start("call_1", "web_search", "query='rust sse'", None);
        assert_eq!(ev.args_display.as_deref(), Some("web_search"));
    }
}
