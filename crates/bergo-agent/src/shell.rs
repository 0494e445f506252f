//! Shell command execution.
//!
//! Task mode runs without a TTY under a hard 3-minute timeout; interactive
//! mode goes through the [`InteractiveShell`] collaborator so the PTY layer
//! (raw-mode stdin, resize, ANSI post-processing) stays outside the engine.

use crate::errors::AgentError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

/// Tool output above this many lines is refused and reported to the model.
pub const MAX_OUTPUT_LINES: usize = 5000;

const TASK_TIMEOUT: Duration = Duration::from_secs(180);

#[cfg(not(windows))]
fn shell_command(command: &str) -> Command {
    let shell = if which("bash") { "bash" } else { "sh" };
    let mut cmd = Command::new(shell);
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("powershell");
    cmd.arg("-Command").arg(command);
    cmd
}

#[cfg(not(windows))]
fn which(binary: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join(binary).is_file())
        })
        .unwrap_or(false)
}

/// Run a command without a TTY. Errors and timeouts are reported inline in
/// the returned text, the way the model expects tool results.
pub async fn run_task_command(command: &str) -> String {
    let mut cmd = shell_command(command);
    cmd.kill_on_drop(true);
    match tokio::time::timeout(TASK_TIMEOUT, cmd.output()).await {
        Err(_) => "command did not return within 3 minutes; timed out and killed".to_string(),
        Ok(Err(error)) => format!("cmd error: {error}"),
        Ok(Ok(output)) => {
            let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            if output.status.success() {
                combined.trim().to_string()
            } else {
                format!("cmd error: {}, output: {}", output.status, combined.trim())
            }
        }
    }
}

/// Interactive command execution with output mirrored to the user. The PTY
/// implementation is an external collaborator; [`PlainShell`] captures
/// output without one.
#[async_trait]
pub trait InteractiveShell: Send + Sync {
    async fn run(&self, command: &str) -> Result<String, AgentError>;
}

pub struct PlainShell;

#[async_trait]
impl InteractiveShell for PlainShell {
    async fn run(&self, command: &str) -> Result<String, AgentError> {
        let output = shell_command(command)
            .output()
            .await
            .map_err(|error| AgentError::Io(error))?;
        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined.trim().to_string())
    }
}

/// Count output lines against [`MAX_OUTPUT_LINES`].
pub fn over_line_limit(output: &str) -> bool {
    output.matches('\n').count() > MAX_OUTPUT_LINES
}
