//! SSE streaming endpoint: one watcher per connection, resumable via
//! `Last-Event-ID`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::IntoResponse;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use relay_core::event::seq_from_id;

use crate::state::AppState;
use crate::watcher::watch;

use super::{bad_request, internal_error, not_found, ApiError, ErrorResponse};

/// Client retry hint sent in the SSE preamble.
const SSE_RETRY: Duration = Duration::from_millis(3000);

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Event id to resume after; the `Last-Event-ID` header wins over this.
    pub since: Option<String>,
}

/// Resolve the resume cursor. A malformed cursor is not an error: the
/// connection simply replays from the beginning.
fn resolve_cursor(last_event_id: Option<&str>, since: Option<&str>) -> u64 {
    let Some(raw) = last_event_id.or(since) else {
        return 0;
    };
    match seq_from_id(raw) {
        Some(seq) => seq,
        None => {
            tracing::info!(cursor = %raw, "malformed resume cursor, replaying from seq 0");
            0
        }
    }
}

/// Stream agent events for a message as Server-Sent Events.
///
/// Catch-up events come first (everything after the resume cursor), then
/// live events until the terminal `end`/`error` closes the stream. Client
/// disconnects tear down only this watcher; the agent keeps running.
#[utoipa::path(
    get,
    path = "/api/chats/{chat_id}/messages/{message_id}/stream",
    tag = "Streaming",
    params(
        ("chat_id" = String, Path, description = "Chat ID"),
        ("message_id" = String, Path, description = "Assistant message ID"),
        ("since" = Option<String>, Query, description = "Event ID to resume after"),
        ("Last-Event-ID" = Option<String>, Header, description = "SSE resume cursor; wins over ?since")
    ),
    responses(
        (status = 200, description = "SSE stream of agent events", content_type = "text/event-stream"),
        (status = 400, description = "Message does not belong to chat", body = ErrorResponse),
        (status = 404, description = "Message not found", body = ErrorResponse)
    )
)]
pub async fn stream_message(
    State(state): State<Arc<AppState>>,
    Path((chat_id, message_id)): Path<(String, String)>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    {
        let store = state.messages.read().await;
        let (owner_chat, _) = store
            .find_message(&message_id)
            .map_err(|e| internal_error(format!("Failed to look up message: {e}")))?
            .ok_or_else(|| not_found(format!("Message {message_id} not found")))?;
        if owner_chat != chat_id {
            return Err(bad_request("Message does not belong to specified chat"));
        }
    }

    let last_event_id = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let since_seq = resolve_cursor(last_event_id.as_deref(), query.since.as_deref());

    let watcher_id = Uuid::new_v4().to_string();
    tracing::info!(
        message_id = %message_id,
        watcher_id = %watcher_id,
        since_seq,
        "opening SSE stream"
    );

    let events = watch(
        state.events.clone(),
        state.registry.clone(),
        message_id,
        watcher_id,
        since_seq,
        &state.config.stream,
    );

    Ok((
        [("Cache-Control", "no-cache"), ("X-Accel-Buffering", "no")],
        Sse::new(sse_stream(events)),
    ))
}

/// SSE framing: a `retry:` preamble, then `event:`/`id:`/`data:` per event.
fn sse_stream(
    events: impl Stream<Item = relay_core::event::Event>,
) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    stream::once(async { Ok(SseEvent::default().retry(SSE_RETRY)) }).chain(events.map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(SseEvent::default()
            .event(event.kind.as_str())
            .id(event.id.clone())
            .data(data))
    }))
}

#[cfg(test)]
mod tests {
    use super::resolve_cursor;
    use relay_core::event::event_id;

    #[test]
    fn test_header_wins_over_query() {
        let header = event_id(chrono::Utc::now(), 9);
        let query = event_id(chrono::Utc::now(), 4);
        assert_eq!(resolve_cursor(Some(&header), Some(&query)), 9);
        assert_eq!(resolve_cursor(None, Some(&query)), 4);
        assert_eq!(resolve_cursor(None, None), 0);
    }

    #[test]
    fn test_malformed_cursor_resets_to_zero() {
        assert_eq!(resolve_cursor(Some("garbage"), None), 0);
        // A malformed header is not rescued by a valid query param.
        let query = event_id(chrono::Utc::now(), 4);
        assert_eq!(resolve_cursor(Some("garbage"), Some(&query)), 0);
    }
}
