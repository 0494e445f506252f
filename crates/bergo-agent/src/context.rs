use crate::config::AppConfig;
use crate::shell::{InteractiveShell, PlainShell};
use bergo_llm::ClientFactory;
use bergo_session::StorePaths;
use std::sync::Arc;

/// External syntax checker invoked after file edits. The tree-sitter
/// implementation lives outside the engine; the default accepts everything.
pub trait SyntaxValidator: Send + Sync {
    fn supports(&self, filename: &str) -> bool;

    /// `Err` carries the human-readable error report returned to the model.
    fn check(&self, filename: &str, content: &[u8]) -> Result<(), String>;
}

pub struct NoopValidator;

impl SyntaxValidator for NoopValidator {
    fn supports(&self, _filename: &str) -> bool {
        false
    }

    fn check(&self, _filename: &str, _content: &[u8]) -> Result<(), String> {
        Ok(())
    }
}

/// Process-wide collaborators, constructed once at startup and threaded
/// through every component.
pub struct AppContext {
    pub config: AppConfig,
    pub factory: ClientFactory,
    pub paths: StorePaths,
    /// Assembled by the host (skills, localization); the engine only embeds it.
    pub system_prompt: String,
    pub validator: Arc<dyn SyntaxValidator>,
    pub shell: Arc<dyn InteractiveShell>,
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are Bergo, an AI coding agent working inside the \
user's workspace. Use the available tools to inspect and change files, keep the memento file \
current during tasks, and call stop_loop when the task is complete.";

impl AppContext {
    pub fn new(config: AppConfig, paths: StorePaths) -> Self {
        Self {
            config,
            factory: ClientFactory::new(),
            paths,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            validator: Arc::new(NoopValidator),
            shell: Arc::new(PlainShell),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn SyntaxValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_shell(mut self, shell: Arc<dyn InteractiveShell>) -> Self {
        self.shell = shell;
        self
    }
}
