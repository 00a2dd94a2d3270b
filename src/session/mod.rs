//! Conversation sessions and the stores that persist them.

mod memory;
mod sqlite;

pub use memory::InMemorySessionService;
pub use sqlite::SqliteSessionService;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session {0} not found")]
    NotFound(String),
    #[error("Session {0} already exists")]
    AlreadyExists(String),
    #[error("Unsupported session service URI: {0}")]
    UnsupportedUri(String),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to (de)serialize session data: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Failed to prepare session storage: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session store lock poisoned")]
    LockPoisoned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A single message in the format the model API uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self::text("user", text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::text("model", text)
    }

    fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part {
                text: Some(text.into()),
            }],
        }
    }

    /// Text parts joined in order.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub invocation_id: String,
    pub author: String,
    pub content: Content,
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_metadata: Option<Value>,
}

impl Event {
    pub fn new(invocation_id: &str, author: &str, content: Content) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            invocation_id: invocation_id.to_string(),
            author: author.to_string(),
            content,
            timestamp: now_seconds(),
            grounding_metadata: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    pub state: Map<String, Value>,
    pub events: Vec<Event>,
    pub last_update_time: f64,
}

pub(crate) fn now_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[async_trait]
pub trait SessionService: Send + Sync {
    /// Creates a session. A fresh UUID is used when `session_id` is `None`.
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<Map<String, Value>>,
        session_id: Option<String>,
    ) -> Result<Session, SessionError>;

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>, SessionError>;

    /// Sessions for one user, most recently updated first, without their events.
    async fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<Vec<Session>, SessionError>;

    /// Deleting an unknown session is not an error.
    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), SessionError>;

    /// Persists `event` and appends it to `session`.
    async fn append_event(&self, session: &mut Session, event: Event) -> Result<(), SessionError>;
}

/// Picks a session service from a storage URI.
///
/// `sqlite:///<path>` opens (or creates) a SQLite file, `memory://` keeps
/// sessions in process memory.
pub fn session_service_from_uri(uri: &str) -> Result<Arc<dyn SessionService>, SessionError> {
    if let Some(path) = uri.strip_prefix("sqlite:///") {
        if path.is_empty() {
            return Err(SessionError::UnsupportedUri(uri.to_string()));
        }
        return Ok(Arc::new(SqliteSessionService::open(path)?));
    }
    if uri == "memory://" {
        return Ok(Arc::new(InMemorySessionService::new()));
    }
    Err(SessionError::UnsupportedUri(uri.to_string()))
}
