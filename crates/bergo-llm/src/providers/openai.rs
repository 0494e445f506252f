//! OpenAI-compatible chat-completions provider.
//!
//! Covers every upstream that speaks this wire format (OpenAI, DeepSeek,
//! Kimi, OpenRouter, MiniMax, Xiaomi) through `base_url`. The HTTP read runs
//! on a worker task; parsed deltas flow to the consumer over a bounded
//! channel.

use crate::config::ModelConfig;
use crate::errors::LlmError;
use crate::provider::{LlmProvider, DELTA_CHANNEL_CAPACITY};
use crate::streamer::AbortHandle;
use crate::types::{ChatItem, ChatRequest, ResponseDelta, TokenUsage, ToolCall, ToolSchema};
use crate::utils::sse::{parse_line, SseLine, SseScanner};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Default)]
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    model_name: String,
    temperature: f64,
    top_p: f64,
    frequency_penalty: f64,
    presence_penalty: f64,
    max_tokens: u64,
    thinking: bool,
    client: Option<reqwest::Client>,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    prefix: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "is_zero_f64")]
    temperature: f64,
    #[serde(skip_serializing_if = "is_zero_f64")]
    top_p: f64,
    #[serde(skip_serializing_if = "is_zero_f64")]
    frequency_penalty: f64,
    #[serde(skip_serializing_if = "is_zero_f64")]
    presence_penalty: f64,
    #[serde(skip_serializing_if = "is_zero_u64")]
    max_tokens: u64,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSchema]>,
    stream_options: StreamOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingOptions>,
}

fn is_zero_f64(value: &f64) -> bool {
    *value == 0.0
}

fn is_zero_u64(value: &u64) -> bool {
    *value == 0
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Serialize)]
struct ThinkingOptions {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct WireChunk {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    #[serde(default)]
    delta: WireDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    cached_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<WireUsageDetails>,
}

#[derive(Deserialize)]
struct WireUsageDetails {
    #[serde(default)]
    cached_tokens: u64,
}

impl OpenAiProvider {
    fn convert_messages(&self, chat_items: &[ChatItem]) -> Vec<WireMessage> {
        chat_items
            .iter()
            .map(|item| {
                let role = item
                    .role
                    .map(|role| role.to_string())
                    .unwrap_or_else(|| "user".to_string());
                let content = if item.img.is_empty() {
                    serde_json::Value::String(item.message.clone())
                } else {
                    serde_json::json!([
                        { "type": "text", "text": item.message },
                        { "type": "image_url", "image_url": { "url": item.img } }
                    ])
                };
                WireMessage {
                    role,
                    content,
                    reasoning_content: (!item.reasoning_content.is_empty())
                        .then(|| item.reasoning_content.clone()),
                    prefix: item.prefix,
                    tool_calls: (!item.tool_calls.is_empty()).then(|| item.tool_calls.clone()),
                    tool_call_id: (!item.tool_call_id.is_empty())
                        .then(|| item.tool_call_id.clone()),
                }
            })
            .collect()
    }

    fn parse_chunk(data: &str) -> Result<ResponseDelta, LlmError> {
        let chunk: WireChunk =
            serde_json::from_str(data).map_err(|error| LlmError::Parse(error.to_string()))?;

        let mut delta = ResponseDelta::default();
        if let Some(choice) = chunk.choices.into_iter().next() {
            delta.content = choice.delta.content.unwrap_or_default();
            delta.reasoning_content = choice
                .delta
                .reasoning_content
                .filter(|reasoning| !reasoning.is_empty())
                .or(choice.delta.reasoning)
                .unwrap_or_default();
            delta.tool_calls = choice.delta.tool_calls;
            delta.finish_reason = choice.finish_reason.unwrap_or_default();
        }
        if let Some(usage) = chunk.usage {
            if usage.prompt_tokens > 0 {
                let details_cached = usage
                    .prompt_tokens_details
                    .map(|details| details.cached_tokens)
                    .unwrap_or(0);
                delta.usage = Some(TokenUsage {
                    prompt_tokens: usage.prompt_tokens,
                    completion_tokens: usage.completion_tokens,
                    total_tokens: usage.total_tokens,
                    cached_tokens: usage.cached_tokens + details_cached,
                });
            }
        }
        Ok(delta)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn init(&mut self, conf: &ModelConfig) -> Result<(), LlmError> {
        if conf.api_key.is_empty() {
            return Err(LlmError::Configuration("API key is required".to_string()));
        }
        self.api_key = conf.api_key.clone();
        self.model_name = conf.model_name.clone();
        self.base_url = if conf.base_url.is_empty() {
            DEFAULT_BASE_URL.to_string()
        } else {
            conf.base_url.trim_end_matches('/').to_string()
        };
        self.temperature = if conf.temperature == 0.0 {
            0.7
        } else {
            conf.temperature
        };
        self.top_p = if conf.top_p == 0.0 { 1.0 } else { conf.top_p };
        self.frequency_penalty = conf.frequency_penalty;
        self.presence_penalty = conf.presence_penalty;
        self.max_tokens = if conf.max_tokens == 0 {
            4096
        } else {
            conf.max_tokens
        };
        self.thinking = conf.think;

        let mut builder = reqwest::Client::builder();
        if !conf.http_proxy.is_empty() {
            let proxy = reqwest::Proxy::all(&conf.http_proxy)
                .map_err(|error| LlmError::Configuration(format!("invalid proxy URL: {error}")))?;
            builder = builder.proxy(proxy);
        }
        self.client = Some(
            builder
                .build()
                .map_err(|error| LlmError::Configuration(error.to_string()))?,
        );
        Ok(())
    }

    fn stream(
        &self,
        abort: AbortHandle,
        request: ChatRequest,
    ) -> mpsc::Receiver<Result<ResponseDelta, LlmError>> {
        let (tx, rx) = mpsc::channel(DELTA_CHANNEL_CAPACITY);
        let Some(client) = self.client.clone() else {
            // init() was never called; report instead of panicking.
            let _ = tx.try_send(Err(LlmError::Configuration(
                "provider not initialized".to_string(),
            )));
            return rx;
        };

        let messages = self.convert_messages(&request.chat_items);
        let body = serde_json::to_value(WireRequest {
            model: &self.model_name,
            messages,
            temperature: self.temperature,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
            max_tokens: self.max_tokens,
            stream: true,
            tools: (!request.tools.is_empty()).then_some(request.tools.as_slice()),
            stream_options: StreamOptions {
                include_usage: true,
            },
            thinking: self.thinking.then_some(ThinkingOptions { kind: "enabled" }),
        });
        let url = format!("{}/chat/completions", self.base_url);
        let api_key = self.api_key.clone();

        tokio::spawn(async move {
            let body = match body {
                Ok(body) => body,
                Err(error) => {
                    let _ = tx.send(Err(LlmError::Parse(error.to_string()))).await;
                    return;
                }
            };
            let response = client
                .post(&url)
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await;
            let response = match response {
                Ok(response) => response,
                Err(error) => {
                    let _ = tx.send(Err(LlmError::Http(error.to_string()))).await;
                    return;
                }
            };
            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                let _ = tx
                    .send(Err(LlmError::Http(format!(
                        "request failed with status {status}: {text}"
                    ))))
                    .await;
                return;
            }

            let mut scanner = SseScanner::new();
            let mut bytes = response.bytes_stream();
            loop {
                let chunk = tokio::select! {
                    _ = abort.notified() => {
                        let _ = tx.send(Err(LlmError::Interrupted)).await;
                        return;
                    }
                    chunk = bytes.next() => chunk,
                };
                let Some(chunk) = chunk else {
                    return;
                };
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(error) => {
                        let _ = tx.send(Err(LlmError::Http(error.to_string()))).await;
                        return;
                    }
                };
                for line in scanner.push(&String::from_utf8_lossy(&chunk)) {
                    match parse_line(&line) {
                        SseLine::Skip => {}
                        SseLine::Done => return,
                        SseLine::Data(data) => match Self::parse_chunk(&data) {
                            Ok(delta) => {
                                if tx.send(Ok(delta)).await.is_err() {
                                    return;
                                }
                            }
                            Err(error) => {
                                let _ = tx.send(Err(error)).await;
                                return;
                            }
                        },
                    }
                }
            }
        });
        rx
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let Some(client) = self.client.clone() else {
            return Err(LlmError::Configuration(
                "provider not initialized".to_string(),
            ));
        };

        #[derive(Deserialize)]
        struct ModelsResponse {
            #[serde(default)]
            data: Vec<ModelEntry>,
        }
        #[derive(Deserialize)]
        struct ModelEntry {
            id: String,
        }

        let response = client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|error| LlmError::Http(error.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Http(format!(
                "request failed with status {status}: {text}"
            )));
        }
        let models: ModelsResponse = response
            .json()
            .await
            .map_err(|error| LlmError::Parse(error.to_string()))?;
        Ok(models.data.into_iter().map(|entry| entry.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chunk_extracts_delta_fields() {
        let data = r#"{"choices":[{"delta":{"content":"hi","reasoning_content":"thinking"},"finish_reason":null}]}"#;
        let delta = OpenAiProvider::parse_chunk(data).expect("chunk parses");
        assert_eq!(delta.content, "hi");
        assert_eq!(delta.reasoning_content, "thinking");
        assert!(delta.finish_reason.is_empty());
    }

    #[test]
    fn parse_chunk_falls_back_to_reasoning_field() {
        let data = r#"{"choices":[{"delta":{"reasoning":"alt field"}}]}"#;
        let delta = OpenAiProvider::parse_chunk(data).expect("chunk parses");
        assert_eq!(delta.reasoning_content, "alt field");
    }

    #[test]
    fn parse_chunk_sums_cached_token_sources() {
        let data = r#"{"choices":[],"usage":{"prompt_tokens":100,"completion_tokens":10,"total_tokens":110,"cached_tokens":5,"prompt_tokens_details":{"cached_tokens":20}}}"#;
        let delta = OpenAiProvider::parse_chunk(data).expect("chunk parses");
        let usage = delta.usage.expect("usage present");
        assert_eq!(usage.cached_tokens, 25);
        assert_eq!(usage.total_tokens, 110);
    }

    #[test]
    fn parse_chunk_rejects_invalid_json() {
        assert!(matches!(
            OpenAiProvider::parse_chunk("not json"),
            Err(LlmError::Parse(_))
        ));
    }

    #[test]
    fn init_requires_api_key() {
        let mut provider = OpenAiProvider::default();
        let err = provider.init(&ModelConfig::default()).unwrap_err();
        assert!(matches!(err, LlmError::Configuration(_)));
    }
}
