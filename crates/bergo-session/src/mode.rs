use serde::{Deserialize, Serialize};
use std::fmt;

/// Behavioral profile of the agent. The three user-visible modes are switched
/// with slash commands; the sub-agent modes are entered only by spawning a
/// task and never exposed to the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    #[default]
    Agent,
    View,
    Planner,
    Debug,
    Berag,
    BeragExtract,
    Compact,
}

const AGENT_PROMPT: &str = "<mode>\nYou are in Agent mode. Act as a professional software engineer: \
use the available tools to gather information and complete the user's coding task.\n</mode>\n";

const VIEW_PROMPT: &str = "<mode>\nYou are in View mode. You may use tools to gather information \
and answer questions, but you must never edit files.\n</mode>\n";

const PLANNER_PROMPT: &str = "<mode>\nYou are in Planner mode. Think through the request step by \
step, weigh the alternatives, and produce a clear, complete plan. You may use tools to gather \
information, but you must never edit files.\n</mode>\n";

const DEBUG_PROMPT: &str = "<mode>\nDebug mode: a developer is debugging Bergo itself. Output \
exactly what you are instructed to output and call only the tools you are told to call. You do \
not need to maintain the memento file in this mode.\n</mode>\n";

const BERAG_PROMPT: &str = "<mode>\nYou are in Berag mode, a sub-agent forked with the prior \
context visible. Your task is to call tools, as much in parallel as possible, to collect text \
that helps solve the user's problem. When you find a file worth reading, invoke *berag_extract* \
on it (files only, never directories) -- several extracts can run in parallel. Once you have \
enough, call *stop_loop* and return a summary of what you found. For summarization requests, \
lean on the summary rather than code snippets. Information gathering only: never modify \
files.\n</mode>\n";

const BERAG_EXTRACT_PROMPT: &str = "<mode>\nYou are in Berag Extract mode, a sub-agent forked \
with the prior context visible. Read the single file you were given, decide which parts help \
with the user's problem, and submit them with the *extract_result* tool. Do not look at other \
files -- parallel extractors handle those. For summarization requests you may return only a \
summary without code snippets. Information gathering only: never modify files.\n</mode>\n";

const COMPACT_PROMPT: &str = "<mode>\nYou are in Compact mode: the context window has reached \
its configured threshold. Any tool calls from your previous round did not take effect. Update \
the memento file now so that you can recover the task after your context is gone, then call \
*stop_loop* with a short summary.\n</mode>\n";

impl AgentMode {
    /// Prompt fragment embedded in every outgoing query for this mode.
    pub fn prompt(&self) -> &'static str {
        match self {
            AgentMode::Agent => AGENT_PROMPT,
            AgentMode::View => VIEW_PROMPT,
            AgentMode::Planner => PLANNER_PROMPT,
            AgentMode::Debug => DEBUG_PROMPT,
            AgentMode::Berag => BERAG_PROMPT,
            AgentMode::BeragExtract => BERAG_EXTRACT_PROMPT,
            AgentMode::Compact => COMPACT_PROMPT,
        }
    }

    pub fn is_sub_agent(&self) -> bool {
        matches!(
            self,
            AgentMode::Berag | AgentMode::BeragExtract | AgentMode::Compact
        )
    }
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AgentMode::Agent => "agent",
            AgentMode::View => "view",
            AgentMode::Planner => "planner",
            AgentMode::Debug => "debug",
            AgentMode::Berag => "berag",
            AgentMode::BeragExtract => "berag_extract",
            AgentMode::Compact => "compact",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_agent_modes_are_flagged() {
        assert!(!AgentMode::Agent.is_sub_agent());
        assert!(!AgentMode::Planner.is_sub_agent());
        assert!(AgentMode::Berag.is_sub_agent());
        assert!(AgentMode::BeragExtract.is_sub_agent());
        assert!(AgentMode::Compact.is_sub_agent());
    }

    #[test]
    fn prompts_are_wrapped_in_mode_tags() {
        for mode in [
            AgentMode::Agent,
            AgentMode::View,
            AgentMode::Planner,
            AgentMode::Debug,
            AgentMode::Berag,
            AgentMode::BeragExtract,
            AgentMode::Compact,
        ] {
            assert!(mode.prompt().starts_with("<mode>"));
            assert!(mode.prompt().trim_end().ends_with("</mode>"));
        }
    }

    #[test]
    fn serde_uses_snake_case_tags() {
        let json = serde_json::to_string(&AgentMode::BeragExtract).expect("serialize");
        assert_eq!(json, "\"berag_extract\"");
        let mode: AgentMode = serde_json::from_str("\"planner\"").expect("deserialize");
        assert_eq!(mode, AgentMode::Planner);
    }
}
