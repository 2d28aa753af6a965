use std::collections::BTreeMap;
use std::fs;

use serde_json::Value;
use tempfile::TempDir;
use threadspace_common::types::{TodoItem, TodoStatus, WorkspacePatch};
use threadspace_common::value::{HostKind, Node, SafeSerializer, SerializerOptions};
use threadspace_state::storage::FileStorage;
use threadspace_state::store::{
    LoadSource, PersistOutcome, WorkspaceStore, ACTIVE_WORKSPACE_KEY, WORKSPACES_KEY,
};

fn open_store(dir: &TempDir) -> WorkspaceStore<FileStorage> {
    let storage = FileStorage::open(dir.path().join("state")).expect("storage should open");
    WorkspaceStore::open(storage, SafeSerializer::default())
}

#[test]
fn state_survives_reopen() {
    let dir = TempDir::new().expect("tempdir should be created");

    let (kept, closed) = {
        let mut store = open_store(&dir);
        let first = store.workspaces()[0].id.clone();
        let research = store.create_workspace(Some("Research"));
        store.update_workspace(&research, WorkspacePatch::default().thread_id(Some("thread-7".into())));
        store.update_workspace_todos(
            &research,
            vec![TodoItem::new("t1", "collect sources", TodoStatus::InProgress)],
        );
        store.update_workspace_files(
            &research,
            BTreeMap::from([("sources.md".to_string(), "- a\n- b".to_string())]),
            Default::default(),
        );
        let scratch = store.create_workspace(None);
        store.select_workspace(&research);
        store.close_workspace(&scratch);
        assert_eq!(store.last_persist(), Some(PersistOutcome::Full));
        (vec![first, research], scratch)
    };

    let store = open_store(&dir);
    let ids: Vec<_> = store.workspaces().iter().map(|workspace| workspace.id.clone()).collect();
    assert_eq!(ids, kept);
    assert!(!store.contains(&closed));
    assert_eq!(store.active_id(), Some(&kept[1]));

    let research = store.workspace(&kept[1]).expect("research workspace");
    assert_eq!(research.title, "Research");
    assert_eq!(research.thread_id.as_deref(), Some("thread-7"));
    assert_eq!(research.todos[0].status, TodoStatus::InProgress);
    assert_eq!(research.files.get("sources.md").map(String::as_str), Some("- a\n- b"));
}

#[test]
fn records_are_plain_files_under_the_state_dir() {
    let dir = TempDir::new().expect("tempdir should be created");
    let store = open_store(&dir);
    let active = store.active_id().cloned().expect("active workspace");

    let workspaces_path = store.storage().record_path(WORKSPACES_KEY);
    let parsed: Value =
        serde_json::from_str(&fs::read_to_string(&workspaces_path).expect("workspaces record"))
            .expect("record should be json");
    assert_eq!(parsed[0]["title"], "Workspace 1");
    assert_eq!(parsed[0]["isActive"], true);

    let active_raw =
        fs::read_to_string(store.storage().record_path(ACTIVE_WORKSPACE_KEY)).expect("active record");
    assert_eq!(active_raw, active.as_str());
}

#[test]
fn corrupted_file_recovers_to_default_workspace() {
    let dir = TempDir::new().expect("tempdir should be created");
    let path = {
        let store = open_store(&dir);
        store.storage().record_path(WORKSPACES_KEY)
    };
    fs::write(&path, "[{\"id\": \"a\", \"title\":").expect("write corrupted record");

    let mut store = open_store(&dir);
    assert_eq!(store.len(), 1);
    assert_eq!(store.workspaces()[0].title, "Workspace 1");

    let report = store.load();
    assert_eq!(report.source, LoadSource::Restored);
    assert!(!report.synthesized);
}

#[test]
fn unserializable_metadata_degrades_to_minimal_record() {
    let dir = TempDir::new().expect("tempdir should be created");
    let storage = FileStorage::open(dir.path().join("state")).expect("storage should open");
    let serializer = SafeSerializer::new(SerializerOptions { max_depth: 8, ..Default::default() });
    let mut store = WorkspaceStore::open(storage, serializer);
    let id = store.active_id().cloned().expect("active workspace");

    let mut deep = Node::Null;
    for _ in 0..16 {
        deep = Node::array(vec![deep]);
    }
    store.update_workspace_files(
        &id,
        BTreeMap::from([("draft.md".to_string(), "text".to_string())]),
        Default::default(),
    );
    store.update_workspace(&id, WorkspacePatch::default().metadata(BTreeMap::from([("deep".to_string(), deep)])));
    assert_eq!(store.last_persist(), Some(PersistOutcome::Minimal));

    let reopened = open_store(&dir);
    let workspace = reopened.workspace(&id).expect("workspace survives");
    assert_eq!(workspace.title, "Workspace 1");
    assert!(workspace.files.is_empty());
}

#[test]
fn host_handles_in_metadata_are_dropped_on_disk() {
    let dir = TempDir::new().expect("tempdir should be created");
    let mut store = open_store(&dir);
    let id = store.active_id().cloned().expect("active workspace");

    let session = Node::plain_object([
        ("step", Node::Number(2.0)),
        ("inflight", Node::host(HostKind::PendingComputation, "Promise")),
    ]);
    session.set("parent", session.clone());
    store.update_workspace(
        &id,
        WorkspacePatch::default().metadata(BTreeMap::from([("session".to_string(), session)])),
    );
    assert_eq!(store.last_persist(), Some(PersistOutcome::Full));

    let reopened = open_store(&dir);
    let metadata = &reopened.workspace(&id).expect("workspace").metadata;
    assert_eq!(
        metadata.get("session"),
        Some(&Node::plain_object([("step", Node::Number(2.0)), ("parent", Node::Null)]))
    );
}
