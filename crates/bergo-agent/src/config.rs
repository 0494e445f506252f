use crate::errors::AgentError;
use bergo_llm::ModelConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration loaded from `bergo.toml`. Malformed TOML or a
/// missing main model is fatal at startup.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub main_model: String,
    #[serde(default)]
    pub berag_model: String,
    #[serde(default)]
    pub berag_extract_model: String,
    #[serde(default)]
    pub line_budget: usize,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub http_proxy: String,
    #[serde(default)]
    pub compact_threshold: f64,
    /// Maximum stored sessions per workspace; 0 means unlimited.
    #[serde(default)]
    pub max_session_count: usize,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|error| {
            AgentError::Configuration(format!(
                "cannot read config {}: {error}",
                path.as_ref().display()
            ))
        })?;
        let mut config: AppConfig = toml::from_str(&raw)
            .map_err(|error| AgentError::Configuration(format!("invalid config: {error}")))?;
        config.set_defaults();
        config.validate()?;
        Ok(config)
    }

    pub fn set_defaults(&mut self) {
        if self.berag_model.is_empty() {
            self.berag_model = self.main_model.clone();
        }
        if self.berag_extract_model.is_empty() {
            self.berag_extract_model = self.main_model.clone();
        }
        if self.line_budget == 0 {
            self.line_budget = 1000;
        }
        if self.language.is_empty() {
            self.language = std::env::var("BERGO_LANG").unwrap_or_else(|_| "english".to_string());
        }
        if self.compact_threshold == 0.0 {
            self.compact_threshold = 0.8;
        }
        if !self.http_proxy.is_empty() {
            for model in &mut self.models {
                if model.http_proxy.is_empty() {
                    model.http_proxy = self.http_proxy.clone();
                }
            }
        }
    }

    fn validate(&self) -> Result<(), AgentError> {
        if self.main_model.is_empty() {
            return Err(AgentError::Configuration(
                "main_model is not configured".to_string(),
            ));
        }
        if self.get_model(&self.main_model).is_none() {
            return Err(AgentError::Configuration(format!(
                "main model {} not found",
                self.main_model
            )));
        }
        Ok(())
    }

    pub fn get_model(&self, identifier: &str) -> Option<&ModelConfig> {
        self.models
            .iter()
            .find(|model| model.identifier == identifier)
    }

    /// Look up a model or fail with a configuration error naming it.
    pub fn require_model(&self, identifier: &str) -> Result<&ModelConfig, AgentError> {
        self.get_model(identifier)
            .ok_or_else(|| AgentError::Configuration(format!("model {identifier} not found")))
    }
}

/// Commented starter config written by `bergo init`.
pub const STARTER_TOML: &str = r#"# Bergo configuration.
#
# main_model selects the entry from [[models]] used for the agent loop;
# berag_model / berag_extract_model default to main_model when omitted.

main_model = "deepseek"
# compact_threshold = 0.8
# line_budget = 1000
# max_session_count = 0
# http_proxy = ""

[[models]]
identifier = "deepseek"
provider = "deepseek"
api_key = ""
model_name = "deepseek-chat"
base_url = "https://api.deepseek.com"
context_window = 64000
prefill = true

[[models]]
identifier = "gpt-4o"
provider = "openai"
api_key = ""
model_name = "gpt-4o"
context_window = 128000
support_vision = true
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_applies_defaults_and_validates_main_model() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("bergo.toml");
        std::fs::write(
            &path,
            r#"
main_model = "m"

[[models]]
identifier = "m"
provider = "openai"
api_key = "sk"
model_name = "gpt"
context_window = 1000
"#,
        )
        .expect("write config");

        let config = AppConfig::load(&path).expect("config loads");
        assert_eq!(config.berag_model, "m");
        assert_eq!(config.berag_extract_model, "m");
        assert_eq!(config.line_budget, 1000);
        assert_eq!(config.compact_threshold, 0.8);
    }

    #[test]
    fn missing_main_model_is_fatal() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("bergo.toml");
        std::fs::write(&path, "main_model = \"ghost\"\n").expect("write config");
        assert!(matches!(
            AppConfig::load(&path),
            Err(AgentError::Configuration(_))
        ));
    }

    #[test]
    fn malformed_toml_is_fatal() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("bergo.toml");
        std::fs::write(&path, "main_model = [broken").expect("write config");
        assert!(matches!(
            AppConfig::load(&path),
            Err(AgentError::Configuration(_))
        ));
    }

    #[test]
    fn proxy_propagates_to_models_without_one() {
        let mut config = AppConfig {
            main_model: "m".to_string(),
            http_proxy: "http://proxy:8080".to_string(),
            models: vec![ModelConfig {
                identifier: "m".to_string(),
                provider: "openai".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        config.set_defaults();
        assert_eq!(config.models[0].http_proxy, "http://proxy:8080");
    }

    #[test]
    fn starter_toml_parses() {
        let config: AppConfig = toml::from_str(STARTER_TOML).expect("starter config parses");
        assert_eq!(config.main_model, "deepseek");
        assert_eq!(config.models.len(), 2);
    }
}
