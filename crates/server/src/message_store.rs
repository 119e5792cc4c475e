//! File-based chat and message store — one JSON file per chat.
//!
//! This is the collaborator surface around the streaming core: it owns the
//! user/assistant message pairs whose assistant side each agent run fills
//! in. The event log lives elsewhere; messages only carry final content
//! and a coarse status lifecycle (pending → processing → completed|failed).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Processing,
    Completed,
    /// Paused for human input; resumable into a fresh message.
    Interrupted,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: String,
    pub role: MessageRole,
    pub content: String,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub chat_id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// File-based store — `{data_dir}/chats/{chat_id}.json` plus a single
/// `users.json` map.
pub struct MessageStore {
    dir: PathBuf,
    users_path: PathBuf,
}

impl MessageStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let dir = data_dir.join("chats");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create chat dir: {}", dir.display()))?;
        info!(path = %dir.display(), "message store initialized");
        Ok(Self {
            users_path: data_dir.join("users.json"),
            dir,
        })
    }

    fn chat_path(&self, chat_id: &str) -> PathBuf {
        self.dir.join(format!("{chat_id}.json"))
    }

    fn save(&self, chat: &Chat) -> Result<()> {
        let data = serde_json::to_string_pretty(chat)?;
        std::fs::write(self.chat_path(&chat.chat_id), data)
            .with_context(|| format!("failed to write chat: {}", chat.chat_id))?;
        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────

    pub fn get_or_create_user(&self, user_id: &str) -> Result<UserRecord> {
        let mut users: HashMap<String, UserRecord> = if self.users_path.exists() {
            let data = std::fs::read_to_string(&self.users_path)?;
            serde_json::from_str(&data).unwrap_or_default()
        } else {
            HashMap::new()
        };

        let now = Utc::now();
        let user = users
            .entry(user_id.to_string())
            .or_insert_with(|| UserRecord {
                user_id: user_id.to_string(),
                created_at: now,
                last_active: now,
            });
        user.last_active = now;
        let user = user.clone();

        std::fs::write(&self.users_path, serde_json::to_string_pretty(&users)?)
            .context("failed to write users file")?;
        Ok(user)
    }

    // ── Chats ─────────────────────────────────────────────────

    pub fn create_chat(&self, user_id: &str, title: Option<&str>) -> Result<Chat> {
        let now = Utc::now();
        let default_title = format!("Chat {}", now.format("%Y-%m-%d %H:%M"));
        let chat = Chat {
            chat_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.unwrap_or(&default_title).to_string(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        };
        self.save(&chat)?;
        info!(chat_id = %chat.chat_id, user_id = %user_id, "chat created");
        Ok(chat)
    }

    pub fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>> {
        let path = self.chat_path(chat_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read chat: {chat_id}"))?;
        let chat = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse chat: {chat_id}"))?;
        Ok(Some(chat))
    }

    /// Messages for a chat, oldest first, paginated. `page` is 1-based.
    pub fn list_messages(
        &self,
        chat_id: &str,
        page: usize,
        page_size: usize,
    ) -> Result<Option<(Vec<ChatMessage>, usize)>> {
        let Some(chat) = self.get_chat(chat_id)? else {
            return Ok(None);
        };
        let total = chat.messages.len();
        let start = page.saturating_sub(1) * page_size;
        let items = chat
            .messages
            .into_iter()
            .skip(start)
            .take(page_size)
            .collect();
        Ok(Some((items, total)))
    }

    // ── Messages ──────────────────────────────────────────────

    /// Insert the user message and an empty pending assistant message.
    /// Returns None if the chat does not exist.
    pub fn create_message_pair(
        &self,
        chat_id: &str,
        content: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<Option<(ChatMessage, ChatMessage)>> {
        let Some(mut chat) = self.get_chat(chat_id)? else {
            return Ok(None);
        };

        let now = Utc::now();
        let user_msg = ChatMessage {
            message_id: Uuid::new_v4().to_string(),
            role: MessageRole::User,
            content: content.to_string(),
            status: MessageStatus::Completed,
            created_at: now,
            updated_at: now,
            processing_time_ms: None,
            error: None,
            metadata: metadata.clone(),
        };
        let assistant_msg = ChatMessage {
            message_id: Uuid::new_v4().to_string(),
            role: MessageRole::Assistant,
            content: String::new(),
            status: MessageStatus::Pending,
            created_at: now,
            updated_at: now,
            processing_time_ms: None,
            error: None,
            metadata,
        };

        // Auto-title from the first user message if still the default.
        if chat.messages.is_empty() && chat.title.starts_with("Chat 20") {
            chat.title = content.chars().take(60).collect();
        }

        chat.messages.push(user_msg.clone());
        chat.messages.push(assistant_msg.clone());
        chat.updated_at = now;
        self.save(&chat)?;

        info!(
            chat_id = %chat_id,
            user = %user_msg.message_id,
            assistant = %assistant_msg.message_id,
            "created message pair"
        );
        Ok(Some((user_msg, assistant_msg)))
    }

    /// Locate a message by id across all chats.
    pub fn find_message(&self, message_id: &str) -> Result<Option<(String, ChatMessage)>> {
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let data = match std::fs::read_to_string(&path) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read chat file");
                    continue;
                }
            };
            let Ok(chat) = serde_json::from_str::<Chat>(&data) else {
                tracing::warn!(path = %path.display(), "skipping corrupt chat file");
                continue;
            };
            if let Some(msg) = chat.messages.iter().find(|m| m.message_id == message_id) {
                return Ok(Some((chat.chat_id, msg.clone())));
            }
        }
        Ok(None)
    }

    fn update_message(
        &self,
        message_id: &str,
        apply: impl FnOnce(&mut ChatMessage),
    ) -> Result<bool> {
        let Some((chat_id, _)) = self.find_message(message_id)? else {
            return Ok(false);
        };
        let Some(mut chat) = self.get_chat(&chat_id)? else {
            return Ok(false);
        };
        let Some(msg) = chat
            .messages
            .iter_mut()
            .find(|m| m.message_id == message_id)
        else {
            return Ok(false);
        };
        apply(msg);
        msg.updated_at = Utc::now();
        chat.updated_at = Utc::now();
        self.save(&chat)?;
        Ok(true)
    }

    pub fn set_processing(&self, message_id: &str) -> Result<bool> {
        self.update_message(message_id, |msg| {
            msg.status = MessageStatus::Processing;
        })
    }

    pub fn complete(&self, message_id: &str, content: &str, processing_time_ms: u64) -> Result<bool> {
        self.update_message(message_id, |msg| {
            msg.status = MessageStatus::Completed;
            msg.content = content.to_string();
            msg.processing_time_ms = Some(processing_time_ms);
        })
    }

    pub fn fail(&self, message_id: &str, error: &str) -> Result<bool> {
        self.update_message(message_id, |msg| {
            msg.status = MessageStatus::Failed;
            msg.error = Some(error.to_string());
        })
    }

    /// Park a message that paused for human input, keeping whatever content
    /// the agent produced before the pause.
    pub fn interrupt(
        &self,
        message_id: &str,
        partial_content: &str,
        processing_time_ms: u64,
    ) -> Result<bool> {
        self.update_message(message_id, |msg| {
            msg.status = MessageStatus::Interrupted;
            msg.content = partial_content.to_string();
            msg.processing_time_ms = Some(processing_time_ms);
        })
    }

    /// Link an interrupted message to the message that resumed it.
    pub fn record_resumed(&self, message_id: &str, resumed_into: &str) -> Result<bool> {
        self.update_message(message_id, |msg| {
            let meta = msg
                .metadata
                .get_or_insert_with(|| serde_json::json!({}));
            if let Some(map) = meta.as_object_mut() {
                map.insert(
                    "resumed_into".to_string(),
                    serde_json::Value::String(resumed_into.to_string()),
                );
            }
        })
    }

    /// Append a pre-built assistant message (used by the resume flow).
    pub fn append_assistant_message(
        &self,
        chat_id: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<Option<ChatMessage>> {
        let Some(mut chat) = self.get_chat(chat_id)? else {
            return Ok(None);
        };
        let now = Utc::now();
        let msg = ChatMessage {
            message_id: Uuid::new_v4().to_string(),
            role: MessageRole::Assistant,
            content: String::new(),
            status: MessageStatus::Pending,
            created_at: now,
            updated_at: now,
            processing_time_ms: None,
            error: None,
            metadata,
        };
        chat.messages.push(msg.clone());
        chat.updated_at = now;
        self.save(&chat)?;
        Ok(Some(msg))
    }

    /// The latest user message created at or before `before`. Feeds the
    /// agent when a paused run is resumed.
    pub fn user_content_before(
        &self,
        chat_id: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let Some(chat) = self.get_chat(chat_id)? else {
            return Ok(None);
        };
        Ok(chat
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::User && m.created_at <= before)
            .next_back()
            .map(|m| m.content.clone()))
    }
}
