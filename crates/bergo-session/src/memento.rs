//! The agent's self-maintained task note.
//!
//! While a task runs, the memento lives at `./.bergo.memento` inside the
//! workspace so the checkpoint repository tracks it; between tasks it is
//! mirrored to session storage and removed from the workspace. A workspace
//! copy still present at startup means the previous run exited abnormally.

use crate::storage::StorePaths;
use sha2::{Digest, Sha256};
use std::fs;

/// Copy the session's memento into the workspace, creating an empty mirror
/// on first use.
pub fn materialize(paths: &StorePaths, session_id: &str) -> std::io::Result<()> {
    let mirror = paths.memento_mirror(session_id);
    if !mirror.exists() {
        fs::write(&mirror, b"")?;
    }
    let content = fs::read(&mirror)?;
    fs::write(paths.memento_workspace_copy(), content)
}

/// Copy the workspace memento back to session storage and remove it from the
/// workspace.
pub fn stash(paths: &StorePaths, session_id: &str) -> std::io::Result<()> {
    let workspace_copy = paths.memento_workspace_copy();
    let content = fs::read(&workspace_copy)?;
    fs::write(paths.memento_mirror(session_id), content)?;
    fs::remove_file(workspace_copy)
}

/// Best-effort stash used on revert and abnormal-exit cleanup.
pub fn stash_if_present(paths: &StorePaths, session_id: &str) {
    if workspace_copy_exists(paths) {
        if let Err(error) = stash(paths, session_id) {
            tracing::warn!("failed to stash memento: {error}");
        }
    }
}

/// A workspace copy at startup signals an abnormal exit.
pub fn workspace_copy_exists(paths: &StorePaths) -> bool {
    paths.memento_workspace_copy().exists()
}

/// Content hash of the live memento, used to detect whether the model
/// updated it during a task round.
pub fn content_hash(paths: &StorePaths) -> String {
    let Ok(content) = fs::read(paths.memento_workspace_copy()) else {
        return String::new();
    };
    let digest = Sha256::digest(&content);
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

pub fn is_changed(paths: &StorePaths, initial_hash: &str) -> bool {
    content_hash(paths) != initial_hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(tmp: &std::path::Path) -> StorePaths {
        let workspace = tmp.join("workspace");
        std::fs::create_dir_all(&workspace).expect("workspace");
        StorePaths::rooted(tmp.join("home"), workspace).expect("paths")
    }

    #[test]
    fn materialize_then_stash_round_trips_content() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = paths(tmp.path());

        materialize(&store, "s1").expect("materialize");
        assert!(workspace_copy_exists(&store));

        fs::write(store.memento_workspace_copy(), "## todo\n- step 1\n").expect("edit");
        stash(&store, "s1").expect("stash");
        assert!(!workspace_copy_exists(&store));

        materialize(&store, "s1").expect("rematerialize");
        let content = fs::read_to_string(store.memento_workspace_copy()).expect("read");
        assert_eq!(content, "## todo\n- step 1\n");
    }

    #[test]
    fn change_detection_uses_content_hash() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = paths(tmp.path());
        materialize(&store, "s1").expect("materialize");
        let initial = content_hash(&store);
        assert!(!is_changed(&store, &initial));
        fs::write(store.memento_workspace_copy(), "updated").expect("edit");
        assert!(is_changed(&store, &initial));
    }

    #[test]
    fn sessions_have_independent_mirrors() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = paths(tmp.path());
        materialize(&store, "a").expect("a");
        fs::write(store.memento_workspace_copy(), "session a").expect("edit");
        stash(&store, "a").expect("stash a");

        materialize(&store, "b").expect("b");
        let content = fs::read_to_string(store.memento_workspace_copy()).expect("read");
        assert_eq!(content, "");
    }
}
