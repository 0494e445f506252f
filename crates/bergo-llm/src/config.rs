use serde::{Deserialize, Serialize};

/// Configuration of one model entry from `bergo.toml`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub context_window: u64,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default)]
    pub top_p: f64,
    #[serde(default)]
    pub frequency_penalty: f64,
    #[serde(default)]
    pub presence_penalty: f64,
    #[serde(default)]
    pub max_tokens: u64,
    #[serde(default)]
    pub reasoning_tag: String,
    /// Retry a `length` finish once by prefilling the partial answer.
    #[serde(default)]
    pub prefill: bool,
    #[serde(default)]
    pub think: bool,
    /// Minimum seconds between requests to this model identifier.
    #[serde(default)]
    pub rate_limit_interval: u64,
    #[serde(default)]
    pub support_vision: bool,
    /// HTTP proxy URL. Comes from config, never from the environment.
    #[serde(default)]
    pub http_proxy: String,
}

impl ModelConfig {
    /// Overlay the non-zero fields of a user definition onto a built-in
    /// default entry.
    pub fn merge_user_defined(&mut self, user: &ModelConfig) {
        if !user.api_key.is_empty() {
            self.api_key = user.api_key.clone();
        }
        if !user.model_name.is_empty() {
            self.model_name = user.model_name.clone();
        }
        if !user.base_url.is_empty() {
            self.base_url = user.base_url.clone();
        }
        if user.context_window != 0 {
            self.context_window = user.context_window;
        }
        if user.temperature != 0.0 {
            self.temperature = user.temperature;
        }
        if user.top_p != 0.0 {
            self.top_p = user.top_p;
        }
        if user.frequency_penalty != 0.0 {
            self.frequency_penalty = user.frequency_penalty;
        }
        if user.presence_penalty != 0.0 {
            self.presence_penalty = user.presence_penalty;
        }
        if user.max_tokens != 0 {
            self.max_tokens = user.max_tokens;
        }
        if !user.reasoning_tag.is_empty() {
            self.reasoning_tag = user.reasoning_tag.clone();
        }
        if user.prefill {
            self.prefill = true;
        }
        if user.think {
            self.think = true;
        }
        if user.rate_limit_interval != 0 {
            self.rate_limit_interval = user.rate_limit_interval;
        }
        if user.support_vision {
            self.support_vision = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overlays_only_set_fields() {
        let mut base = ModelConfig {
            identifier: "ds".to_string(),
            provider: "openai".to_string(),
            model_name: "deepseek-chat".to_string(),
            base_url: "https://api.deepseek.com".to_string(),
            context_window: 64_000,
            ..Default::default()
        };
        base.merge_user_defined(&ModelConfig {
            api_key: "sk-test".to_string(),
            temperature: 0.3,
            ..Default::default()
        });
        assert_eq!(base.api_key, "sk-test");
        assert_eq!(base.temperature, 0.3);
        assert_eq!(base.model_name, "deepseek-chat");
        assert_eq!(base.context_window, 64_000);
    }
}
