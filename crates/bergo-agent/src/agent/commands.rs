//! Slash-command dispatcher.
//!
//! Each handler returns whether the line was consumed; consumed lines never
//! reach the model. Unknown `/` commands are reported to the user only.

use super::Agent;
use crate::io::MsgKind;
use bergo_session::timeline::generate_session_id;
use bergo_session::{AgentMode, SessionEntry, Timeline};

const CANCEL: &str = "Cancel";

impl Agent {
    /// Returns `(filtered_input, consumed)`.
    pub(super) fn handle_cmd(&mut self, input: &str) -> (String, bool) {
        if !input.starts_with('/') {
            return (input.to_string(), false);
        }
        let command = input.split_whitespace().next().unwrap_or(input);
        let rest = input.strip_prefix(command).unwrap_or("").trim().to_string();
        match command {
            "/exit" => self.stop = true,
            "/view" => self.switch_mode(AgentMode::View, "VIEW"),
            "/planner" => self.switch_mode(AgentMode::Planner, "PLANNER"),
            "/agent" => self.switch_mode(AgentMode::Agent, "AGENT"),
            "/multiline" => self.multiline = true,
            "/model" => self.switch_model_cmd(&rest),
            "/history" => self.history_cmd(),
            "/revert" => self.revert_cmd(),
            "/sessions" => self.sessions_cmd(),
            "/clear" => self.clear_cmd(),
            "/compact" => self.compact_cmd(),
            other => {
                self.output
                    .on_system(&format!("unknown command: {other}"), MsgKind::Warning);
            }
        }
        (String::new(), true)
    }

    fn switch_mode(&mut self, mode: AgentMode, label: &str) {
        self.mode = mode;
        self.output
            .on_system(&format!("Switch to {label} mode"), MsgKind::Text);
    }

    fn switch_model_cmd(&mut self, identifier: &str) {
        let Some(model_conf) = self.app.config.get_model(identifier) else {
            self.output
                .on_system(&format!("model {identifier} not found"), MsgKind::Warning);
            return;
        };
        self.stats.window_size = model_conf.context_window;
        self.registry = crate::tools::main_registry(model_conf.support_vision);
        self.main_model = identifier.to_string();
        self.output
            .on_system(&format!("switched to {identifier}"), MsgKind::Text);
    }

    fn history_cmd(&mut self) {
        self.output
            .on_system(&self.timeline.history_dump(), MsgKind::Dump);
        let checkpoints = self.timeline.checkpoint_entries();
        if checkpoints.is_empty() {
            return;
        }
        let labels: Vec<String> = checkpoints
            .iter()
            .map(|(hash, message)| format!("Revert {hash} ({message})"))
            .collect();
        let mut options: Vec<&str> = labels.iter().map(String::as_str).collect();
        options.push(CANCEL);
        let choice = self.prompter.select("Checkpoint actions", &options);
        if choice == CANCEL {
            return;
        }
        let Some(position) = labels.iter().position(|label| *label == choice) else {
            return;
        };
        let hash = checkpoints[position].0.clone();
        match self.timeline.revert(&hash) {
            Ok(()) => {
                self.output
                    .on_system(&format!("reverted to {hash}"), MsgKind::Text);
                self.stats.session = self.timeline.last_checkpoint_token_usage();
                self.output
                    .on_system(&self.timeline.history_dump(), MsgKind::Dump);
            }
            Err(error) => {
                self.output
                    .on_system(&format!("revert failed: {error}"), MsgKind::Warning);
            }
        }
    }

    fn revert_cmd(&mut self) {
        if let Err(error) = self.timeline.revert_to_last_checkpoint() {
            self.output
                .on_system(&format!("revert failed: {error}"), MsgKind::Warning);
            return;
        }
        self.stats.session = self.timeline.last_checkpoint_token_usage();
        self.output
            .on_system(&self.timeline.history_dump(), MsgKind::Dump);
    }

    fn sessions_cmd(&mut self) {
        let entries: Vec<SessionEntry> = self
            .session_registry
            .entries()
            .iter()
            .filter(|entry| entry.session_id != self.session_id)
            .cloned()
            .collect();
        if entries.is_empty() {
            self.output
                .on_system("no stored sessions", MsgKind::Text);
            return;
        }
        let labels: Vec<String> = entries
            .iter()
            .map(|entry| format!("{}: {}", entry.session_id, entry.query))
            .collect();
        let mut options: Vec<&str> = labels.iter().map(String::as_str).collect();
        options.push(CANCEL);
        let choice = self.prompter.select("Load session", &options);
        if choice == CANCEL {
            return;
        }
        let Some(position) = labels.iter().position(|label| *label == choice) else {
            return;
        };
        let session_id = entries[position].session_id.clone();
        self.load_session(&session_id);
    }

    fn clear_cmd(&mut self) {
        self.session_id = generate_session_id();
        self.timeline = Timeline::new(&self.session_id, self.app.paths.clone());
        self.stats.session = Default::default();
        self.stats.total = Default::default();
        self.output
            .on_system(&format!("new session: {}", self.session_id), MsgKind::Text);
    }

    fn compact_cmd(&mut self) {
        self.timeline.add_compact(None);
        self.stats.reset_session();
        self.output
            .on_system("Manual compact completed successfully", MsgKind::Text);
    }
}
