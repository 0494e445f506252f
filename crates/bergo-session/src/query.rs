use crate::attachment::{Attachment, AttachmentKind};
use crate::mode::AgentMode;
use serde::{Deserialize, Serialize};

/// The turn envelope the user sends to the model. `build` produces the
/// textual block with a fixed structure: interrupt notice, compact notice,
/// mode prompt, `<user_input>`, `<attachments>`, memento reminder.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub user_input: String,
    #[serde(default)]
    pub mode: AgentMode,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub is_interrupted: bool,
    #[serde(default)]
    pub memento_update_remind: bool,
    #[serde(default)]
    pub is_compact: bool,
}

impl Query {
    pub fn new(user_input: impl Into<String>, mode: AgentMode) -> Self {
        Self {
            user_input: user_input.into(),
            mode,
            ..Default::default()
        }
    }

    pub fn set_compact(&mut self) {
        self.is_compact = true;
    }

    pub fn set_interrupted(&mut self) {
        self.is_interrupted = true;
    }

    pub fn set_memento_update_remind(&mut self) {
        self.memento_update_remind = true;
    }

    pub fn set_attachments(&mut self, attachments: Vec<Attachment>) {
        self.attachments = attachments;
    }

    /// Data URL of the first image attachment, if any.
    pub fn image_data_url(&self) -> Option<String> {
        self.attachments
            .iter()
            .filter(|attachment| attachment.kind == AttachmentKind::Image)
            .find_map(|attachment| attachment.image_data_url().ok())
    }

    pub fn build(&self) -> String {
        let mut out = String::new();
        if self.is_interrupted {
            out.push_str(
                "The user interrupted the previous run, or a fatal error occurred. Restart the \
                 task according to the instruction below.\n",
            );
        }
        if self.is_compact {
            out.push_str(
                "**The user compacted the context; your previous context is gone. Read the \
                 memento file to recover the situation before following the instruction \
                 below.**\n",
            );
        }
        out.push_str(self.mode.prompt());
        out.push('\n');
        out.push_str(&format!("<user_input>{}</user_input>", self.user_input));
        out.push('\n');
        if !self.attachments.is_empty() {
            out.push_str("<attachments>\n");
            for attachment in &self.attachments {
                out.push_str(&attachment.render());
            }
            out.push_str("</attachments>\n");
        }
        if self.memento_update_remind {
            out.push_str(
                "<memento_update_remind>You did not update the memento file during the last \
                 task round. Remember to keep it current so task progress and key information \
                 survive a context reset.</memento_update_remind>\n",
            );
        }
        out
    }
}
