//! Conversation memory and message persistence.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The person asking.
    User,
    /// The engine answering.
    Assistant,
}

impl Role {
    /// Returns the role name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author.
    pub role: Role,
    /// Text.
    pub content: String,
}

/// Bounded, ordered conversation history for one session.
#[derive(Debug, Clone)]
pub struct Memory {
    messages: Vec<Message>,
    memory_size: usize,
    agent_description: Option<String>,
    last_code: Option<String>,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(10)
    }
}

impl Memory {
    /// Creates an empty memory keeping `memory_size` messages in prompts.
    #[must_use]
    pub fn new(memory_size: usize) -> Self {
        Self {
            messages: Vec::new(),
            memory_size,
            agent_description: None,
            last_code: None,
        }
    }

    /// Sets the agent description shown at the top of prompts.
    #[must_use]
    pub fn with_agent_description(mut self, description: impl Into<String>) -> Self {
        self.agent_description = Some(description.into());
        self
    }

    /// Appends a message.
    pub fn add(&mut self, content: impl Into<String>, is_user: bool) {
        let role = if is_user { Role::User } else { Role::Assistant };
        self.messages.push(Message {
            role,
            content: content.into(),
        });
    }

    /// Number of stored messages.
    #[must_use]
    pub fn count(&self) -> usize {
        self.messages.len()
    }

    /// All stored messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent message.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The most recent user message.
    #[must_use]
    pub fn last_query(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Configured window size.
    #[must_use]
    pub const fn memory_size(&self) -> usize {
        self.memory_size
    }

    /// The agent description.
    #[must_use]
    pub fn agent_description(&self) -> Option<&str> {
        self.agent_description.as_deref()
    }

    /// The last `limit` messages (default: the memory size), oldest first.
    /// A limit of zero means the whole history.
    #[must_use]
    pub fn window(&self, limit: Option<usize>) -> &[Message] {
        let start = match limit.unwrap_or(self.memory_size) {
            0 => 0,
            limit => self.messages.len().saturating_sub(limit),
        };
        &self.messages[start..]
    }

    /// Renders the last `limit` messages as prompt text.
    #[must_use]
    pub fn get_conversation(&self, limit: Option<usize>) -> String {
        self.window(limit)
            .iter()
            .map(|m| match m.role {
                Role::User => format!("### QUERY\n {}", m.content),
                Role::Assistant => format!("### ANSWER\n {}", m.content),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Code that produced the last answer.
    #[must_use]
    pub fn last_code(&self) -> Option<&str> {
        self.last_code.as_deref()
    }

    /// Remembers the code that produced the latest answer.
    pub fn record_code(&mut self, code: impl Into<String>) {
        self.last_code = Some(code.into());
    }

    /// Forgets all messages and code. The agent description is kept.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.last_code = None;
    }

    /// Converts the window to role/content records.
    #[must_use]
    pub fn to_json(&self) -> Vec<serde_json::Value> {
        self.window(None)
            .iter()
            .map(|m| serde_json::json!({"role": m.role.as_str(), "message": m.content}))
            .collect()
    }
}

/// A persisted message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Message ID.
    pub id: Uuid,
    /// Owner.
    pub user_id: String,
    /// Author.
    pub role: Role,
    /// Text.
    pub content: String,
    /// Creation time.
    pub created: DateTime<Utc>,
}

impl StoredMessage {
    /// Creates a message stamped now.
    #[must_use]
    pub fn new(user_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            role,
            content: content.into(),
            created: Utc::now(),
        }
    }
}

/// Long-lived message persistence keyed by user.
pub trait MessageStore: Send + Sync {
    /// Saves a message and returns its ID.
    fn save(&self, message: StoredMessage) -> Uuid;

    /// Lists the most recent `limit` messages of a user, oldest first.
    fn list(&self, user_id: &str, limit: usize) -> Vec<StoredMessage>;

    /// Deletes every message of a user.
    fn clear_user(&self, user_id: &str);
}

/// Process-local [`MessageStore`].
///
/// Each instance owns its data; share one through an `Arc` to give several
/// agents the same history.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    entries: RwLock<HashMap<String, Vec<StoredMessage>>>,
}

impl InMemoryMessageStore {
    /// Creates a new store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for InMemoryMessageStore {
    fn save(&self, message: StoredMessage) -> Uuid {
        let id = message.id;
        self.entries
            .write()
            .entry(message.user_id.clone())
            .or_default()
            .push(message);
        id
    }

    fn list(&self, user_id: &str, limit: usize) -> Vec<StoredMessage> {
        let entries = self.entries.read();
        let Some(messages) = entries.get(user_id) else {
            return Vec::new();
        };
        let start = messages.len().saturating_sub(limit);
        messages[start..].to_vec()
    }

    fn clear_user(&self, user_id: &str) {
        self.entries.write().remove(user_id);
    }
}
