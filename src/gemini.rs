use crate::agent::LlmAgent;
use crate::config::ModelBackendConfig;
use crate::session::Content;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum GeminiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Model response contained no text")]
    EmptyResponse,
    #[error("No Google Cloud project configured for model calls")]
    MissingProject,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: &'a [Content],
    system_instruction: SystemInstruction<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    grounding_metadata: Option<Value>,
}

/// Text reply from the model plus whatever grounding the search tool attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub grounding_metadata: Option<Value>,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    backend: ModelBackendConfig,
}

impl GeminiClient {
    pub fn new(backend: ModelBackendConfig) -> Self {
        Self {
            client: Client::new(),
            backend,
        }
    }

    fn model_url(&self, model: &str) -> Result<String, GeminiError> {
        let project = self
            .backend
            .project
            .as_deref()
            .ok_or(GeminiError::MissingProject)?;
        Ok(format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            self.backend.endpoint.trim_end_matches('/'),
            project,
            self.backend.region,
            model
        ))
    }

    /// Sends the conversation to the agent's model with its instruction and tools attached.
    pub async fn generate(
        &self,
        agent: &LlmAgent,
        contents: &[Content],
    ) -> Result<Generation, GeminiError> {
        let url = self.model_url(&agent.model)?;
        let request = GenerateRequest {
            contents,
            system_instruction: SystemInstruction {
                parts: [TextPart {
                    text: &agent.instruction,
                }],
            },
            tools: agent.tools.iter().map(|tool| tool.declaration()).collect(),
        };

        info!(
            agent = agent.name.as_str(),
            model = agent.model.as_str(),
            messages = contents.len(),
            "Sending request to Gemini"
        );

        let mut builder = self.client.post(&url).json(&request);
        if let Some(token) = &self.backend.access_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GeminiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!("Received response from Gemini");

        let response: GenerateResponse = serde_json::from_str(&body)?;
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or(GeminiError::EmptyResponse)?;
        let text = candidate
            .content
            .map(|c| c.joined_text())
            .filter(|t| !t.is_empty())
            .ok_or(GeminiError::EmptyResponse)?;

        Ok(Generation {
            text,
            grounding_metadata: candidate.grounding_metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::build_root_agent;
    use crate::config::AgentConfig;

    fn backend(project: Option<&str>) -> ModelBackendConfig {
        ModelBackendConfig {
            project: project.map(str::to_string),
            region: "us-central1".to_string(),
            endpoint: "https://us-central1-aiplatform.googleapis.com/".to_string(),
            access_token: None,
        }
    }

    #[test]
    fn model_url_targets_publisher_model() {
        let client = GeminiClient::new(backend(Some("proj")));
        assert_eq!(
            client.model_url("gemini-2.0-flash").unwrap(),
            "https://us-central1-aiplatform.googleapis.com/v1/projects/proj/locations/us-central1/publishers/google/models/gemini-2.0-flash:generateContent"
        );
        assert!(matches!(
            GeminiClient::new(backend(None)).model_url("m"),
            Err(GeminiError::MissingProject)
        ));
    }

    #[test]
    fn request_attaches_instruction_and_search_tool() {
        let agent = build_root_agent(&AgentConfig {
            project_id: "p".to_string(),
            location: "global".to_string(),
            datastore_id: "d".to_string(),
            model: "gemini-2.0-flash".to_string(),
        });
        let contents = vec![Content::user("What is ASRR?")];
        let request = GenerateRequest {
            contents: &contents,
            system_instruction: SystemInstruction {
                parts: [TextPart {
                    text: &agent.instruction,
                }],
            },
            tools: agent.tools.iter().map(|t| t.declaration()).collect(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], agent.instruction);
        assert_eq!(
            value["tools"][0]["retrieval"]["vertexAiSearch"]["datastore"],
            "projects/p/locations/global/collections/default_collection/dataStores/d"
        );
    }
}
