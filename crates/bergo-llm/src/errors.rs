use thiserror::Error;

/// Failures of one streaming model turn.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("invalid provider configuration: {0}")]
    Configuration(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("failed to parse provider response: {0}")]
    Parse(String),

    /// The user cancelled the in-flight stream. Transient by design; the
    /// caller returns to the read-eval loop without recording anything.
    #[error("user interrupted")]
    Interrupted,

    #[error("finish reason: {0}")]
    FinishReason(String),

    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),
}

impl LlmError {
    pub fn is_interrupt(&self) -> bool {
        matches!(self, LlmError::Interrupted)
    }
}
