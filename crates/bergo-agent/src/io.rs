//! Engine-visible terminal contract.
//!
//! The real TUI (rendering, completion, selectors) lives outside the engine;
//! the agent only writes structured output to an [`OutputSink`] and reads
//! user decisions through a [`Prompter`].

/// Classification of system messages sent to the sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MsgKind {
    Text,
    Warning,
    /// Raw pass-through (history dumps, rendered tool output).
    Dump,
}

pub trait OutputSink: Send + Sync {
    /// Streamed model output. `reasoning` distinguishes chain-of-thought
    /// deltas from answer content.
    fn on_llm_delta(&self, delta: &str, reasoning: bool);

    fn on_system(&self, msg: &str, kind: MsgKind);

    /// Replace the transient status line (tool intents, sub-task progress).
    fn update_tail(&self, msg: &str);

    /// Finish the in-progress output block and return its rendered form.
    fn stop(&self) -> String;
}

/// Raised by [`Prompter::read_line`] when the user cancels the read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

pub trait Prompter: Send + Sync {
    fn read_line(&self, multiline: bool) -> Result<String, Interrupted>;

    /// Present fixed options; returns the chosen one.
    fn select(&self, prompt: &str, options: &[&str]) -> String;

    fn confirm(&self, prompt: &str) -> bool;
}

/// Approval options for gated tools.
pub const APPROVE_YES: &str = "Yes";
pub const APPROVE_ALWAYS: &str = "Always Yes";
pub const APPROVE_SKIP: &str = "Skip";
