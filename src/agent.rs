use crate::config::{AgentConfig, ConfigError};
use crate::prompts::ASRR_INSTRUCTION;
use crate::search::VertexAiSearchTool;
use serde_json::Value;

pub const ROOT_AGENT_NAME: &str = "asrr_agent";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tool {
    VertexAiSearch(VertexAiSearchTool),
}

impl Tool {
    pub fn name(&self) -> &str {
        match self {
            Tool::VertexAiSearch(tool) => tool.name(),
        }
    }

    pub fn declaration(&self) -> Value {
        match self {
            Tool::VertexAiSearch(tool) => tool.declaration(),
        }
    }
}

/// A model, an instruction and the tools the model may call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmAgent {
    pub name: String,
    pub model: String,
    pub instruction: String,
    pub tools: Vec<Tool>,
}

pub fn build_root_agent(config: &AgentConfig) -> LlmAgent {
    let search = VertexAiSearchTool::new(config.datastore_path());

    LlmAgent {
        name: ROOT_AGENT_NAME.to_string(),
        model: config.model.clone(),
        instruction: ASRR_INSTRUCTION.to_string(),
        tools: vec![Tool::VertexAiSearch(search)],
    }
}

/// Agent definition registered with the loader. Fails when the required
/// environment values are missing.
pub fn root_agent() -> Result<LlmAgent, ConfigError> {
    let config = AgentConfig::from_env()?;
    Ok(build_root_agent(&config))
}
