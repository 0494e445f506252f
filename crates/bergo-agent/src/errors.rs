use thiserror::Error;

/// Tool-level failures. These become tool-result strings surfaced to the
/// model; they never abort the task.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("tool {0} not found")]
    UnknownTool(String),
    #[error("json schema validate failed: {0}")]
    Validation(String),
    #[error("{0}")]
    Execution(String),
}

/// Top-level error type for the agent engine. Only interrupts and stream
/// errors break the inner loop; everything else is handled where it occurs.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Session(#[from] bergo_session::SessionError),

    #[error(transparent)]
    Llm(#[from] bergo_llm::LlmError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Unrecoverable tool condition; unwinds the whole task.
    #[error("task interrupted: {0}")]
    TaskInterrupt(String),

    #[error("user interrupted")]
    UserInterrupt,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AgentError {
    pub fn is_user_interrupt(&self) -> bool {
        matches!(self, AgentError::UserInterrupt)
            || matches!(self, AgentError::Llm(error) if error.is_interrupt())
    }
}
