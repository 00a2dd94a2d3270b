//! Discovers agent definitions under an agents directory.
//!
//! Each sub-directory whose name matches a registered agent is loaded. An
//! optional `.env` file inside it is applied before the agent is built, so
//! per-agent settings can live next to the agent.

use crate::agent::{self, LlmAgent, ROOT_AGENT_NAME};
use crate::config::ConfigError;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

pub type AgentDefinition = fn() -> Result<LlmAgent, ConfigError>;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to read agents directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to load {path}: {source}")]
    DotEnv {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
    #[error("Agent {name} is misconfigured: {source}")]
    Config {
        name: String,
        #[source]
        source: ConfigError,
    },
}

pub struct AgentLoader {
    agents_dir: PathBuf,
    definitions: BTreeMap<String, AgentDefinition>,
}

impl AgentLoader {
    pub fn new(agents_dir: impl Into<PathBuf>) -> Self {
        Self {
            agents_dir: agents_dir.into(),
            definitions: BTreeMap::new(),
        }
    }

    /// Loader with every agent this crate ships.
    pub fn with_builtin_agents(agents_dir: impl Into<PathBuf>) -> Self {
        let mut loader = Self::new(agents_dir);
        loader.register(ROOT_AGENT_NAME, agent::root_agent);
        loader
    }

    pub fn register(&mut self, name: &str, definition: AgentDefinition) {
        self.definitions.insert(name.to_string(), definition);
    }

    /// Names of registered agents that have a directory, sorted.
    pub fn discover(&self) -> Result<Vec<String>, LoaderError> {
        let read_err = |source| LoaderError::ReadDir {
            path: self.agents_dir.clone(),
            source,
        };

        let mut found = Vec::new();
        for entry in std::fs::read_dir(&self.agents_dir).map_err(read_err)? {
            let entry = entry.map_err(read_err)?;
            if !entry.file_type().map_err(read_err)?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if self.definitions.contains_key(&name) {
                found.push(name);
            } else {
                debug!(dir = %entry.path().display(), "Skipping unregistered directory");
            }
        }
        found.sort();
        Ok(found)
    }

    /// Applies the `.env` file of every discovered agent. Variables already
    /// set in the process keep their values.
    pub fn apply_env_files(&self) -> Result<(), LoaderError> {
        for name in self.discover()? {
            let env_file = self.agents_dir.join(&name).join(".env");
            if !env_file.is_file() {
                continue;
            }
            dotenvy::from_path(&env_file).map_err(|source| LoaderError::DotEnv {
                path: env_file.clone(),
                source,
            })?;
            debug!(path = %env_file.display(), "Loaded agent environment");
        }
        Ok(())
    }

    /// Builds every discovered agent. The first misconfigured agent aborts loading.
    pub fn load_all(&self) -> Result<Vec<LlmAgent>, LoaderError> {
        self.apply_env_files()?;

        let mut agents = Vec::new();
        for name in self.discover()? {
            let Some(definition) = self.definitions.get(&name) else {
                continue;
            };
            let agent = definition().map_err(|source| LoaderError::Config {
                name: name.clone(),
                source,
            })?;
            info!(agent = agent.name.as_str(), model = agent.model.as_str(), "Loaded agent");
            agents.push(agent);
        }
        Ok(agents)
    }
}
