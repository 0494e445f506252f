//! Streaming LLM client for Bergo.
//!
//! One model turn is abstracted as an [`LlmStreamer`]: it issues a streaming
//! chat-completion request through a [`provider::LlmProvider`], merges
//! tool-call deltas, accumulates token usage, and handles prefill retries on
//! `length` finishes. Providers deliver raw deltas over a bounded channel so
//! the consumer never blocks on the HTTP read.

pub mod config;
pub mod errors;
pub mod provider;
pub mod providers;
pub mod rate_limit;
pub mod streamer;
pub mod types;
pub mod utils;

pub use config::ModelConfig;
pub use errors::LlmError;
pub use provider::{provider_for, LlmProvider};
pub use rate_limit::RateLimiter;
pub use streamer::{AbortHandle, ClientFactory, LlmStreamer};
pub use types::{
    finish_reason, inject_system_prompt, ChatItem, ChatRequest, ResponseDelta, Role, TokenUsage,
    ToolCall, ToolFunction, ToolSchema,
};
