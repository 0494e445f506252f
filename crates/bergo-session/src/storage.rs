use crate::errors::SessionError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Resolved storage locations for one workspace.
///
/// Everything Bergo persists lives under the home directory:
/// `~/.bergo/<sha256(abs workspace path)>/` holds the per-workspace timeline
/// files, session index, and memento mirrors; `~/.bergo/<session_id>/` holds
/// each session's shadow repository.
#[derive(Clone, Debug)]
pub struct StorePaths {
    home: PathBuf,
    workspace: PathBuf,
    store: PathBuf,
}

fn home_dir() -> Result<PathBuf, SessionError> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .ok_or(SessionError::NoHomeDirectory)
}

impl StorePaths {
    /// Resolve storage for a workspace using the real home directory.
    pub fn new(workspace: impl AsRef<Path>) -> Result<Self, SessionError> {
        Self::rooted(home_dir()?.join(".bergo"), workspace)
    }

    /// Resolve storage under an explicit root. Tests point this at a tempdir.
    pub fn rooted(home: impl Into<PathBuf>, workspace: impl AsRef<Path>) -> Result<Self, SessionError> {
        let home = home.into();
        let workspace = workspace
            .as_ref()
            .canonicalize()
            .unwrap_or_else(|_| workspace.as_ref().to_path_buf());
        let digest = Sha256::digest(workspace.to_string_lossy().as_bytes());
        let store = home.join(hex_string(&digest));
        std::fs::create_dir_all(&store)?;
        Ok(Self {
            home,
            workspace,
            store,
        })
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Per-workspace storage directory (workspace-hash dir).
    pub fn store_dir(&self) -> &Path {
        &self.store
    }

    pub fn timeline_file(&self, session_id: &str) -> PathBuf {
        self.store.join(format!("{session_id}.timeline.json"))
    }

    pub fn sessions_file(&self) -> PathBuf {
        self.store.join("sessions.json")
    }

    pub fn memento_mirror(&self, session_id: &str) -> PathBuf {
        self.store.join(format!("{session_id}.bergo.memento"))
    }

    pub fn memento_workspace_copy(&self) -> PathBuf {
        self.workspace.join(".bergo.memento")
    }

    pub fn shadow_repo(&self, session_id: &str) -> PathBuf {
        self.home.join(session_id)
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
