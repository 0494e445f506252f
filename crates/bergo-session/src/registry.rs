//! Cross-session index persisted as `sessions.json` in the workspace store.

use crate::storage::StorePaths;
use crate::timeline::now_unix;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub session_id: String,
    pub query: String,
    pub ts: i64,
}

pub struct SessionRegistry {
    paths: StorePaths,
    entries: Vec<SessionEntry>,
}

impl SessionRegistry {
    pub fn load(paths: StorePaths) -> Self {
        let entries = std::fs::read(paths.sessions_file())
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .unwrap_or_default();
        Self { paths, entries }
    }

    pub fn entries(&self) -> &[SessionEntry] {
        &self.entries
    }

    /// Record a session under its first query. Later calls for the same id
    /// are no-ops.
    pub fn add(&mut self, session_id: &str, query: &str) {
        if self.entries.iter().any(|entry| entry.session_id == session_id) {
            return;
        }
        self.entries.push(SessionEntry {
            session_id: session_id.to_string(),
            query: query.to_string(),
            ts: now_unix(),
        });
        self.store();
    }

    pub fn delete(&mut self, session_id: &str) {
        self.entries.retain(|entry| entry.session_id != session_id);
        self.delete_session_data(session_id);
        self.store();
    }

    /// Replace the whole list; sessions dropped from it lose their stored
    /// data.
    pub fn replace_all(&mut self, entries: Vec<SessionEntry>) {
        let kept: HashSet<String> = entries
            .iter()
            .map(|entry| entry.session_id.clone())
            .collect();
        let dropped: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !kept.contains(&entry.session_id))
            .map(|entry| entry.session_id.clone())
            .collect();
        for session_id in dropped {
            self.delete_session_data(&session_id);
        }
        self.entries = entries;
        self.store();
    }

    /// Drop oldest sessions (by timestamp) until at most `max` remain.
    /// `max == 0` means unlimited.
    pub fn evict_to(&mut self, max: usize) {
        if max == 0 || self.entries.len() <= max {
            return;
        }
        self.entries.sort_by_key(|entry| entry.ts);
        while self.entries.len() > max {
            let entry = self.entries.remove(0);
            self.delete_session_data(&entry.session_id);
        }
        self.store();
    }

    /// Remove a session's timeline file, memento mirror, and shadow repo.
    fn delete_session_data(&self, session_id: &str) {
        let _ = std::fs::remove_file(self.paths.timeline_file(session_id));
        let _ = std::fs::remove_file(self.paths.memento_mirror(session_id));
        let _ = std::fs::remove_dir_all(self.paths.shadow_repo(session_id));
    }

    fn store(&self) {
        let raw = match serde_json::to_vec_pretty(&self.entries) {
            Ok(raw) => raw,
            Err(error) => {
                tracing::warn!("failed to serialize session index: {error}");
                return;
            }
        };
        if let Err(error) = std::fs::write(self.paths.sessions_file(), raw) {
            tracing::warn!("failed to write session index: {error}");
        }
    }
}
