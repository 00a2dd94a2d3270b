use crate::agent::LlmAgent;
use crate::gemini::{GeminiClient, GeminiError};
use crate::session::{Content, Event, SessionError, SessionService};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("Model call failed: {0}")]
    Model(#[from] GeminiError),
}

/// Runs conversation turns for one agent against a session store.
#[derive(Clone)]
pub struct Runner {
    agent: Arc<LlmAgent>,
    sessions: Arc<dyn SessionService>,
    model: GeminiClient,
}

impl Runner {
    pub fn new(agent: Arc<LlmAgent>, sessions: Arc<dyn SessionService>, model: GeminiClient) -> Self {
        Self {
            agent,
            sessions,
            model,
        }
    }

    pub fn agent(&self) -> &LlmAgent {
        &self.agent
    }

    /// Records the user's message, asks the model, records the reply and
    /// returns both new events.
    ///
    /// The user event stays in the session when the model call fails.
    pub async fn run(
        &self,
        user_id: &str,
        session_id: &str,
        new_message: Content,
    ) -> Result<Vec<Event>, RunnerError> {
        let mut session = self
            .sessions
            .get_session(&self.agent.name, user_id, session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let invocation_id = format!("e-{}", Uuid::new_v4());
        info!(
            agent = self.agent.name.as_str(),
            session = session_id,
            invocation = invocation_id.as_str(),
            "Starting invocation"
        );

        let user_message = Content {
            role: "user".to_string(),
            ..new_message
        };
        let user_event = Event::new(&invocation_id, "user", user_message);
        self.sessions
            .append_event(&mut session, user_event.clone())
            .await?;

        let history: Vec<Content> = session.events.iter().map(|e| e.content.clone()).collect();
        let generation = match self.model.generate(&self.agent, &history).await {
            Ok(generation) => generation,
            Err(e) => {
                warn!(invocation = invocation_id.as_str(), error = %e, "Model call failed");
                return Err(e.into());
            }
        };

        let mut reply = Event::new(&invocation_id, &self.agent.name, Content::model(generation.text));
        reply.grounding_metadata = generation.grounding_metadata;
        self.sessions.append_event(&mut session, reply.clone()).await?;

        Ok(vec![user_event, reply])
    }
}
