//! In-memory session store (non-persistent).

use super::{now_seconds, Event, Session, SessionError, SessionService};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

type SessionKey = (String, String, String);

#[derive(Clone, Default)]
pub struct InMemorySessionService {
    sessions: Arc<RwLock<HashMap<SessionKey, Session>>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(app_name: &str, user_id: &str, session_id: &str) -> SessionKey {
    (
        app_name.to_string(),
        user_id.to_string(),
        session_id.to_string(),
    )
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<Map<String, Value>>,
        session_id: Option<String>,
    ) -> Result<Session, SessionError> {
        let id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut sessions = self.sessions.write().await;
        let key = key(app_name, user_id, &id);
        if sessions.contains_key(&key) {
            return Err(SessionError::AlreadyExists(id));
        }

        let session = Session {
            id,
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            state: state.unwrap_or_default(),
            events: Vec::new(),
            last_update_time: now_seconds(),
        };
        sessions.insert(key, session.clone());
        Ok(session)
    }

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>, SessionError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&key(app_name, user_id, session_id)).cloned())
    }

    async fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<Vec<Session>, SessionError> {
        let sessions = self.sessions.read().await;
        let mut listed: Vec<Session> = sessions
            .iter()
            .filter(|((app, user, _), _)| app == app_name && user == user_id)
            .map(|(_, session)| Session {
                events: Vec::new(),
                ..session.clone()
            })
            .collect();
        listed.sort_by(|a, b| b.last_update_time.total_cmp(&a.last_update_time));
        Ok(listed)
    }

    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .remove(&key(app_name, user_id, session_id));
        Ok(())
    }

    async fn append_event(&self, session: &mut Session, event: Event) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(&key(&session.app_name, &session.user_id, &session.id))
            .ok_or_else(|| SessionError::NotFound(session.id.clone()))?;

        let updated = event.timestamp.max(now_seconds());
        stored.events.push(event.clone());
        stored.last_update_time = updated;

        session.events.push(event);
        session.last_update_time = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Content;

    #[tokio::test]
    async fn create_append_and_list() {
        let store = InMemorySessionService::new();
        let mut session = store
            .create_session("asrr_agent", "u1", None, Some("s1".to_string()))
            .await
            .unwrap();

        let dup = store
            .create_session("asrr_agent", "u1", None, Some("s1".to_string()))
            .await;
        assert!(matches!(dup, Err(SessionError::AlreadyExists(_))));

        store
            .append_event(&mut session, Event::new("i", "user", Content::user("hello")))
            .await
            .unwrap();

        let loaded = store
            .get_session("asrr_agent", "u1", "s1")
            .await
            .unwrap()
            .expect("session should exist");
        assert_eq!(loaded.events.len(), 1);
        assert_eq!(loaded, session);

        let listed = store.list_sessions("asrr_agent", "u1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].events.is_empty());
        assert!(store.list_sessions("asrr_agent", "u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemorySessionService::new();
        let mut session = store
            .create_session("app", "u", None, None)
            .await
            .unwrap();
        store.delete_session("app", "u", &session.id).await.unwrap();
        store.delete_session("app", "u", &session.id).await.unwrap();

        let result = store
            .append_event(&mut session, Event::new("i", "user", Content::user("x")))
            .await;
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }
}
