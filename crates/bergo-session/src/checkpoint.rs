//! Workspace snapshots via a shadow git repository.
//!
//! The shadow repository lives outside the workspace but has `core.worktree`
//! pointing at it, so commits snapshot the workspace without touching its own
//! version control. Nested `.git` directories would otherwise be treated as
//! submodules, so every operation renames them away for its duration.

use crate::errors::SessionError;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const DISABLED_GIT_NAME: &str = ".git_bergo_disabled";

#[derive(Clone, Debug)]
pub struct Checkpoint {
    workspace_path: PathBuf,
    shadow_repo_path: PathBuf,
}

impl Checkpoint {
    pub fn new(workspace_path: impl Into<PathBuf>, shadow_repo_path: impl Into<PathBuf>) -> Self {
        Self {
            workspace_path: workspace_path.into(),
            shadow_repo_path: shadow_repo_path.into(),
        }
    }

    /// Create the shadow repository if it does not exist yet. Idempotent.
    pub fn init_shadow_repo(&self) -> Result<(), SessionError> {
        if !self.workspace_path.exists() {
            return Err(SessionError::Git(format!(
                "workspace path {} does not exist",
                self.workspace_path.display()
            )));
        }
        if self.shadow_repo_path.exists() {
            return Ok(());
        }
        fs::create_dir_all(&self.shadow_repo_path)?;
        self.run_git(&["init"])?;
        let worktree = self.workspace_path.to_string_lossy().to_string();
        self.run_git(&["config", "core.worktree", &worktree])?;
        // Snapshot commits are synthetic; do not depend on the user's git
        // identity or signing setup.
        self.run_git(&["config", "user.name", "bergo"])?;
        self.run_git(&["config", "user.email", "bergo@localhost"])?;
        self.run_git(&["config", "commit.gpgsign", "false"])?;
        Ok(())
    }

    /// Snapshot the workspace. Always commits, even with no changes, so every
    /// user turn gets a checkpoint to revert to.
    pub fn save(&self, message: &str) -> Result<String, SessionError> {
        let _guard = DotGitGuard::acquire(&self.workspace_path);
        self.run_git(&["add", "."])?;
        self.run_git(&["commit", "--allow-empty", "-m", message])?;
        let hash = self.run_git(&["rev-parse", "HEAD"])?;
        Ok(hash.trim().to_string())
    }

    /// Restore the workspace to a snapshot. An unknown hash surfaces the git
    /// error and leaves the workspace untouched.
    pub fn revert(&self, hash: &str) -> Result<(), SessionError> {
        let _guard = DotGitGuard::acquire(&self.workspace_path);
        self.run_git(&["reset", "--hard", hash])?;
        self.run_git(&["clean", "-fd"])?;
        Ok(())
    }

    /// Whether the workspace differs from the last snapshot.
    pub fn has_change(&self) -> Result<bool, SessionError> {
        let _guard = DotGitGuard::acquire(&self.workspace_path);
        let status = self.run_git(&["status", "--porcelain"])?;
        Ok(!status.trim().is_empty())
    }

    fn run_git(&self, args: &[&str]) -> Result<String, SessionError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.shadow_repo_path)
            .output()
            .map_err(|error| SessionError::Git(format!("failed to run git: {error}")))?;
        if !output.status.success() {
            return Err(SessionError::Git(format!(
                "git {} failed: {}{}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Scoped rename of nested `.git` directories. The workspace's own top-level
/// `.git` stays in place; everything deeper is renamed on acquisition and
/// restored on drop.
struct DotGitGuard {
    workspace: PathBuf,
}

impl DotGitGuard {
    fn acquire(workspace: &Path) -> Self {
        rename_nested(workspace, workspace, ".git", DISABLED_GIT_NAME);
        Self {
            workspace: workspace.to_path_buf(),
        }
    }
}

impl Drop for DotGitGuard {
    fn drop(&mut self) {
        rename_nested(&self.workspace, &self.workspace, DISABLED_GIT_NAME, ".git");
    }
}

fn rename_nested(root: &Path, dir: &Path, from: &str, to: &str) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if name == from {
            // The workspace's own repository is left alone.
            if from == ".git" && path.parent() == Some(root) {
                continue;
            }
            let _ = fs::rename(&path, path.with_file_name(to));
            continue;
        }
        if name == ".git" || name == DISABLED_GIT_NAME {
            continue;
        }
        rename_nested(root, &path, from, to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent dirs");
        }
        fs::write(path, content).expect("write file");
    }

    fn checkpoint_in(tmp: &Path) -> (PathBuf, Checkpoint) {
        let workspace = tmp.join("workspace");
        fs::create_dir_all(&workspace).expect("workspace");
        let checkpoint = Checkpoint::new(&workspace, tmp.join("shadow"));
        checkpoint.init_shadow_repo().expect("init");
        (workspace, checkpoint)
    }

    #[test]
    fn save_then_revert_restores_workspace() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (workspace, checkpoint) = checkpoint_in(tmp.path());
        write(&workspace.join("a.txt"), "one\n");
        let hash = checkpoint.save("auto save").expect("save");
        assert!(!hash.is_empty());

        write(&workspace.join("a.txt"), "two\n");
        write(&workspace.join("b.txt"), "new\n");
        checkpoint.revert(&hash).expect("revert");

        assert_eq!(fs::read_to_string(workspace.join("a.txt")).expect("a"), "one\n");
        assert!(!workspace.join("b.txt").exists());
    }

    #[test]
    fn save_is_allowed_with_no_changes() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (_workspace, checkpoint) = checkpoint_in(tmp.path());
        let first = checkpoint.save("auto save").expect("first");
        let second = checkpoint.save("auto save").expect("second");
        assert_ne!(first, second);
    }

    #[test]
    fn revert_unknown_hash_is_an_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (workspace, checkpoint) = checkpoint_in(tmp.path());
        write(&workspace.join("a.txt"), "one\n");
        checkpoint.save("auto save").expect("save");
        let result = checkpoint.revert("0000000000000000000000000000000000000000");
        assert!(matches!(result, Err(SessionError::Git(_))));
        assert_eq!(fs::read_to_string(workspace.join("a.txt")).expect("a"), "one\n");
    }

    #[test]
    fn has_change_tracks_workspace_state() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (workspace, checkpoint) = checkpoint_in(tmp.path());
        write(&workspace.join("a.txt"), "one\n");
        assert!(checkpoint.has_change().expect("dirty before save"));
        checkpoint.save("auto save").expect("save");
        assert!(!checkpoint.has_change().expect("clean after save"));
    }

    #[test]
    fn nested_git_dirs_are_restored_after_save() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (workspace, checkpoint) = checkpoint_in(tmp.path());
        let nested = workspace.join("vendor/dep/.git");
        fs::create_dir_all(&nested).expect("nested git");
        write(&nested.join("HEAD"), "ref: refs/heads/main\n");

        checkpoint.save("auto save").expect("save");
        assert!(nested.exists());
        assert!(!workspace.join("vendor/dep").join(DISABLED_GIT_NAME).exists());
    }
}
