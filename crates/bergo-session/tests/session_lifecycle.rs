//! Cross-module lifecycle: timeline, checkpoints, memento, and the session
//! registry working against real files and a real shadow repository.

use bergo_llm::TokenUsage;
use bergo_session::memento;
use bergo_session::timeline::LlmResponseItem;
use bergo_session::{AgentMode, Query, SessionRegistry, StorePaths, Timeline, TimelinePayload};
use std::path::Path;

fn store_paths(tmp: &Path) -> StorePaths {
    let workspace = tmp.join("workspace");
    std::fs::create_dir_all(&workspace).expect("workspace");
    StorePaths::rooted(tmp.join("home"), workspace).expect("paths")
}

#[test]
fn full_turn_survives_reload() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let paths = store_paths(tmp.path());
    std::fs::write(paths.workspace().join("main.rs"), "fn main() {}\n").expect("seed");

    let mut timeline = Timeline::new("s1", paths.clone());
    timeline.init_checkpoint().expect("checkpoint init");
    timeline.add_user_input(Query::new("add a test", AgentMode::Agent));
    let hash = timeline
        .checkpoint_save("auto save", TokenUsage::default())
        .expect("save");
    timeline.set_task_epoch();
    timeline.add_llm_response(LlmResponseItem {
        content: "on it".to_string(),
        ..Default::default()
    });
    timeline.add_tool_call_result("c1", "read_file", "1|fn main() {}", "read main.rs");

    let reloaded = Timeline::load("s1", paths.clone());
    assert_eq!(reloaded.items, timeline.items);
    assert!(reloaded.is_checkpoint_init);
    assert_eq!(reloaded.items[1].git_hash, hash);
}

#[test]
fn revert_restores_files_and_stashes_memento() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let paths = store_paths(tmp.path());
    std::fs::write(paths.workspace().join("lib.rs"), "v1\n").expect("seed");

    let mut timeline = Timeline::new("s1", paths.clone());
    timeline.init_checkpoint().expect("checkpoint init");
    timeline.add_user_input(Query::new("change it", AgentMode::Agent));

    // The live memento is materialized before the checkpoint, so the
    // snapshot tracks it and a revert rolls it back too.
    memento::materialize(&paths, "s1").expect("materialize");
    std::fs::write(paths.memento_workspace_copy(), "before save").expect("memento seed");
    let hash = timeline
        .checkpoint_save("auto save", TokenUsage::default())
        .expect("save");

    std::fs::write(paths.workspace().join("lib.rs"), "v2\n").expect("mutate");
    std::fs::write(paths.memento_workspace_copy(), "in progress").expect("memento edit");

    timeline.revert(&hash).expect("revert");
    assert_eq!(
        std::fs::read_to_string(paths.workspace().join("lib.rs")).expect("lib"),
        "v1\n"
    );
    assert!(!memento::workspace_copy_exists(&paths));
    assert_eq!(
        std::fs::read_to_string(paths.memento_mirror("s1")).expect("mirror"),
        "before save"
    );
    assert_eq!(timeline.items.len(), 1);
    assert!(matches!(
        timeline.items[0].payload,
        TimelinePayload::UserInput(_)
    ));
}

#[test]
fn registry_eviction_deletes_session_storage() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let paths = store_paths(tmp.path());

    // Two sessions with real timeline files and shadow repositories.
    for (session_id, ts_query) in [("a", "older"), ("b", "newer")] {
        let mut timeline = Timeline::new(session_id, paths.clone());
        timeline.init_checkpoint().expect("checkpoint init");
        timeline.add_user_input(Query::new(ts_query, AgentMode::Agent));
    }
    let mut registry = SessionRegistry::load(paths.clone());
    registry.add("a", "older");
    registry.add("b", "newer");
    assert!(paths.timeline_file("a").exists());
    assert!(paths.shadow_repo("a").exists());

    registry.evict_to(1);

    assert_eq!(registry.entries().len(), 1);
    assert_eq!(registry.entries()[0].session_id, "b");
    assert!(!paths.timeline_file("a").exists());
    assert!(!paths.shadow_repo("a").exists());
    assert!(paths.timeline_file("b").exists());
}
