//! Environment configuration.
//!
//! Agent variables:
//! - `ASRR_PROJECT_ID` - Required. Google Cloud project that owns the datastore.
//! - `ASRR_DATASTORE_ID` - Required. Vertex AI Search datastore id.
//! - `ASRR_DATASTORE_LOCATION` - Optional. Defaults to `global`.
//! - `ASRR_MODEL` - Optional. Defaults to `gemini-2.0-flash`.
//!
//! Server variables:
//! - `PORT` - Optional. Defaults to `8080`.
//! - `GOOGLE_CLOUD_PROJECT` - Optional. Project billed for model calls, falls back to `ASRR_PROJECT_ID`.
//! - `GOOGLE_CLOUD_LOCATION` - Optional. Model region. Defaults to `us-central1`.
//! - `ASRR_MODEL_ENDPOINT` - Optional. Overrides the regional Vertex AI endpoint.
//! - `GOOGLE_OAUTH_ACCESS_TOKEN` - Optional. Bearer token for model calls.

use std::env;
use thiserror::Error;

pub const DEFAULT_LOCATION: &str = "global";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MODEL_REGION: &str = "us-central1";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Required environment variables {} are not set", .0.join(", "))]
    Missing(Vec<String>),
    #[error("Invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

/// Settings for the ASRR agent definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub project_id: String,
    pub location: String,
    pub datastore_id: String,
    pub model: String,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the agent settings through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let project_id = get("ASRR_PROJECT_ID");
        let datastore_id = get("ASRR_DATASTORE_ID");

        let (project_id, datastore_id) = match (project_id, datastore_id) {
            (Some(project_id), Some(datastore_id)) => (project_id, datastore_id),
            (project_id, datastore_id) => {
                let mut missing = Vec::new();
                if project_id.is_none() {
                    missing.push("ASRR_PROJECT_ID".to_string());
                }
                if datastore_id.is_none() {
                    missing.push("ASRR_DATASTORE_ID".to_string());
                }
                return Err(ConfigError::Missing(missing));
            }
        };

        Ok(Self {
            project_id,
            location: get("ASRR_DATASTORE_LOCATION").unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            datastore_id,
            model: get("ASRR_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    /// Fully-qualified Vertex AI Search datastore resource name.
    pub fn datastore_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/collections/default_collection/dataStores/{}",
            self.project_id, self.location, self.datastore_id
        )
    }
}

/// Settings for the HTTP server and the model backend it calls.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub model_backend: ModelBackendConfig,
}

#[derive(Debug, Clone, Default)]
pub struct ModelBackendConfig {
    pub project: Option<String>,
    pub region: String,
    pub endpoint: String,
    pub access_token: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidValue {
                    name: "PORT".to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                })?,
            None => DEFAULT_PORT,
        };

        let region = get("GOOGLE_CLOUD_LOCATION").unwrap_or_else(|| DEFAULT_MODEL_REGION.to_string());
        let endpoint = get("ASRR_MODEL_ENDPOINT")
            .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com", region));

        Ok(Self {
            port,
            model_backend: ModelBackendConfig {
                project: get("GOOGLE_CLOUD_PROJECT").or_else(|| get("ASRR_PROJECT_ID")),
                region,
                endpoint,
                access_token: get("GOOGLE_OAUTH_ACCESS_TOKEN"),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_required_values_are_reported() {
        let cases: [(&[(&str, &str)], &[&str]); 4] = [
            (&[], &["ASRR_PROJECT_ID", "ASRR_DATASTORE_ID"]),
            (&[("ASRR_PROJECT_ID", "p")], &["ASRR_DATASTORE_ID"]),
            (&[("ASRR_DATASTORE_ID", "d")], &["ASRR_PROJECT_ID"]),
            (
                &[("ASRR_PROJECT_ID", ""), ("ASRR_DATASTORE_ID", "")],
                &["ASRR_PROJECT_ID", "ASRR_DATASTORE_ID"],
            ),
        ];

        for (vars, expected) in cases {
            let err = AgentConfig::from_lookup(lookup(vars)).unwrap_err();
            let expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
            assert_eq!(err, ConfigError::Missing(expected));
        }
    }

    #[test]
    fn optional_values_use_defaults() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("ASRR_PROJECT_ID", "my-project"),
            ("ASRR_DATASTORE_ID", "docs"),
        ]))
        .unwrap();

        assert_eq!(config.location, "global");
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(
            config.datastore_path(),
            "projects/my-project/locations/global/collections/default_collection/dataStores/docs"
        );
    }

    #[test]
    fn datastore_path_uses_all_values() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("ASRR_PROJECT_ID", "p-1"),
            ("ASRR_DATASTORE_ID", "store_2"),
            ("ASRR_DATASTORE_LOCATION", "eu"),
            ("ASRR_MODEL", "gemini-2.5-pro"),
        ]))
        .unwrap();

        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(
            config.datastore_path(),
            "projects/p-1/locations/eu/collections/default_collection/dataStores/store_2"
        );
    }

    #[test]
    fn port_defaults_to_8080() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(
            config.model_backend.endpoint,
            "https://us-central1-aiplatform.googleapis.com"
        );
        assert!(config.model_backend.project.is_none());
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = ServerConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref name, .. } if name == "PORT"));
    }

    #[test]
    fn model_project_falls_back_to_agent_project() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PORT", "9000"),
            ("ASRR_PROJECT_ID", "p"),
            ("GOOGLE_CLOUD_LOCATION", "europe-west1"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.model_backend.project.as_deref(), Some("p"));
        assert_eq!(
            config.model_backend.endpoint,
            "https://europe-west1-aiplatform.googleapis.com"
        );
    }
}
