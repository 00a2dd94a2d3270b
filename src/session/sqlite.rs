//! File-backed session store using SQLite.

use super::{now_seconds, Content, Event, Session, SessionError, SessionService};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    app_name TEXT NOT NULL,
    user_id TEXT NOT NULL,
    id TEXT NOT NULL,
    state TEXT NOT NULL,
    create_time REAL NOT NULL,
    update_time REAL NOT NULL,
    PRIMARY KEY (app_name, user_id, id)
);
CREATE TABLE IF NOT EXISTS events (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL,
    app_name TEXT NOT NULL,
    user_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    invocation_id TEXT NOT NULL,
    author TEXT NOT NULL,
    content TEXT NOT NULL,
    grounding_metadata TEXT,
    timestamp REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS events_by_session ON events (app_name, user_id, session_id);
";

#[derive(Clone)]
pub struct SqliteSessionService {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionService {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        info!(path = %path.display(), "Opened SQLite session store");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, SessionError>
    where
        F: FnOnce(&mut Connection) -> Result<T, SessionError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| SessionError::LockPoisoned)?;
            f(&mut guard)
        })
        .await?
    }
}

struct EventRow {
    id: String,
    invocation_id: String,
    author: String,
    content: String,
    grounding_metadata: Option<String>,
    timestamp: f64,
}

impl EventRow {
    fn into_event(self) -> Result<Event, SessionError> {
        let content: Content = serde_json::from_str(&self.content)?;
        let grounding_metadata = self
            .grounding_metadata
            .as_deref()
            .map(serde_json::from_str::<Value>)
            .transpose()?;

        Ok(Event {
            id: self.id,
            invocation_id: self.invocation_id,
            author: self.author,
            content,
            timestamp: self.timestamp,
            grounding_metadata,
        })
    }
}

fn parse_state(raw: &str) -> Result<Map<String, Value>, SessionError> {
    Ok(serde_json::from_str(raw)?)
}

#[async_trait]
impl SessionService for SqliteSessionService {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<Map<String, Value>>,
        session_id: Option<String>,
    ) -> Result<Session, SessionError> {
        let session = Session {
            id: session_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            state: state.unwrap_or_default(),
            events: Vec::new(),
            last_update_time: now_seconds(),
        };
        let state_json = serde_json::to_string(&session.state)?;
        let row = session.clone();

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let exists = tx
                .query_row(
                    "SELECT 1 FROM sessions WHERE app_name = ?1 AND user_id = ?2 AND id = ?3",
                    params![row.app_name, row.user_id, row.id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if exists {
                return Err(SessionError::AlreadyExists(row.id));
            }
            tx.execute(
                "INSERT INTO sessions (app_name, user_id, id, state, create_time, update_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![row.app_name, row.user_id, row.id, state_json, row.last_update_time],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await?;

        Ok(session)
    }

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>, SessionError> {
        let (app_name, user_id, session_id) =
            (app_name.to_string(), user_id.to_string(), session_id.to_string());

        self.with_conn(move |conn| {
            let header = conn
                .query_row(
                    "SELECT state, update_time FROM sessions
                     WHERE app_name = ?1 AND user_id = ?2 AND id = ?3",
                    params![app_name, user_id, session_id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
                )
                .optional()?;
            let Some((state, last_update_time)) = header else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT id, invocation_id, author, content, grounding_metadata, timestamp
                 FROM events WHERE app_name = ?1 AND user_id = ?2 AND session_id = ?3
                 ORDER BY seq",
            )?;
            let rows = stmt
                .query_map(params![app_name, user_id, session_id], |row| {
                    Ok(EventRow {
                        id: row.get(0)?,
                        invocation_id: row.get(1)?,
                        author: row.get(2)?,
                        content: row.get(3)?,
                        grounding_metadata: row.get(4)?,
                        timestamp: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let events = rows
                .into_iter()
                .map(EventRow::into_event)
                .collect::<Result<Vec<_>, _>>()?;

            Ok(Some(Session {
                id: session_id,
                app_name,
                user_id,
                state: parse_state(&state)?,
                events,
                last_update_time,
            }))
        })
        .await
    }

    async fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<Vec<Session>, SessionError> {
        let (app_name, user_id) = (app_name.to_string(), user_id.to_string());

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, state, update_time FROM sessions
                 WHERE app_name = ?1 AND user_id = ?2
                 ORDER BY update_time DESC",
            )?;
            let rows = stmt
                .query_map(params![app_name, user_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(id, state, last_update_time)| -> Result<Session, SessionError> {
                    Ok(Session {
                        id,
                        app_name: app_name.clone(),
                        user_id: user_id.clone(),
                        state: parse_state(&state)?,
                        events: Vec::new(),
                        last_update_time,
                    })
                })
                .collect()
        })
        .await
    }

    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), SessionError> {
        let (app_name, user_id, session_id) =
            (app_name.to_string(), user_id.to_string(), session_id.to_string());

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM events WHERE app_name = ?1 AND user_id = ?2 AND session_id = ?3",
                params![app_name, user_id, session_id],
            )?;
            tx.execute(
                "DELETE FROM sessions WHERE app_name = ?1 AND user_id = ?2 AND id = ?3",
                params![app_name, user_id, session_id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn append_event(&self, session: &mut Session, event: Event) -> Result<(), SessionError> {
        let updated = event.timestamp.max(now_seconds());
        let content = serde_json::to_string(&event.content)?;
        let grounding = event
            .grounding_metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let (app_name, user_id, session_id) = (
            session.app_name.clone(),
            session.user_id.clone(),
            session.id.clone(),
        );
        let row = event.clone();

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let touched = tx.execute(
                "UPDATE sessions SET update_time = ?4
                 WHERE app_name = ?1 AND user_id = ?2 AND id = ?3",
                params![app_name, user_id, session_id, updated],
            )?;
            if touched == 0 {
                return Err(SessionError::NotFound(session_id));
            }
            tx.execute(
                "INSERT INTO events
                 (id, app_name, user_id, session_id, invocation_id, author, content, grounding_metadata, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    row.id,
                    app_name,
                    user_id,
                    session_id,
                    row.invocation_id,
                    row.author,
                    content,
                    grounding,
                    row.timestamp
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await?;

        session.events.push(event);
        session.last_update_time = updated;
        Ok(())
    }
}
