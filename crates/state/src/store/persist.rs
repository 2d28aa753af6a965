// Persisted form of the workspace collection.
//
// Every workspace goes through the serializer's cleaning clone before the
// whole array is serialized. When that fails the collection degrades to a
// minimal projection (identity, naming, thread binding) with empty todos and
// files, so a bad attachment never costs the user their workspaces.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use threadspace_common::types::{TodoItem, Workspace, WorkspaceId};
use threadspace_common::value::{Node, ObjectNode, SafeSerializer};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Encoded {
    pub text: String,
    pub minimal: bool,
}

/// Fallback record: only what is needed to keep workspaces identifiable.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MinimalRecord<'a> {
    id: &'a WorkspaceId,
    title: &'a str,
    thread_id: Option<&'a str>,
    is_active: bool,
    created_at: String,
    todos: Vec<TodoItem>,
    files: BTreeMap<String, String>,
}

pub(crate) fn encode_workspaces(
    workspaces: &[Workspace],
    active: Option<&WorkspaceId>,
    serializer: &SafeSerializer,
) -> Result<Encoded, serde_json::Error> {
    match encode_full(workspaces, active, serializer) {
        Some(text) => Ok(Encoded { text, minimal: false }),
        None => {
            warn!(count = workspaces.len(), "full workspace serialization failed, persisting minimal fields");
            encode_minimal(workspaces, active).map(|text| Encoded { text, minimal: true })
        }
    }
}

fn encode_full(
    workspaces: &[Workspace],
    active: Option<&WorkspaceId>,
    serializer: &SafeSerializer,
) -> Option<String> {
    let mut cleaned = Vec::with_capacity(workspaces.len());
    for workspace in workspaces {
        let is_active = active == Some(&workspace.id);
        let node = match serializer.try_deep_clone(&workspace_node(workspace, is_active)) {
            Ok(node @ Node::Object(_)) => node,
            Ok(_) => Node::object(ObjectNode::plain()),
            Err(error) => {
                debug!(workspace = %workspace.id, %error, "workspace failed the cleaning clone");
                return None;
            }
        };
        reassert_required_fields(&node, workspace, is_active);
        cleaned.push(node);
    }
    serializer.serialize(&Node::array(cleaned), None)
}

fn encode_minimal(
    workspaces: &[Workspace],
    active: Option<&WorkspaceId>,
) -> Result<String, serde_json::Error> {
    let records: Vec<MinimalRecord<'_>> = workspaces
        .iter()
        .map(|workspace| MinimalRecord {
            id: &workspace.id,
            title: &workspace.title,
            thread_id: workspace.thread_id.as_deref(),
            is_active: active == Some(&workspace.id),
            created_at: iso(&workspace.created_at),
            todos: Vec::new(),
            files: BTreeMap::new(),
        })
        .collect();
    serde_json::to_string(&records)
}

fn workspace_node(workspace: &Workspace, is_active: bool) -> Node {
    let mut object = ObjectNode::plain();
    object.insert("id", Node::from(workspace.id.as_str()));
    object.insert("title", Node::from(workspace.title.as_str()));
    object.insert("threadId", Node::from(workspace.thread_id.as_deref()));
    object.insert("isActive", Node::Bool(is_active));
    object.insert("createdAt", Node::Date(workspace.created_at));
    object.insert("todos", Node::array(workspace.todos.iter().map(todo_node).collect()));
    object.insert(
        "files",
        Node::plain_object(
            workspace.files.iter().map(|(name, content)| (name.clone(), Node::from(content.as_str()))),
        ),
    );
    if !workspace.metadata.is_empty() {
        object.insert(
            "metadata",
            Node::plain_object(
                workspace.metadata.iter().map(|(key, value)| (key.clone(), value.clone())),
            ),
        );
    }
    Node::object(object)
}

fn todo_node(todo: &TodoItem) -> Node {
    let mut object = ObjectNode::plain();
    object.insert("id", Node::from(todo.id.as_str()));
    object.insert("content", Node::from(todo.content.as_str()));
    object.insert("status", Node::from(todo.status.as_str()));
    if let Some(created_at) = todo.created_at {
        object.insert("createdAt", Node::Date(created_at));
    }
    if let Some(updated_at) = todo.updated_at {
        object.insert("updatedAt", Node::Date(updated_at));
    }
    Node::object(object)
}

/// The typed fields are authoritative; the clone only decides what survives
/// of the free-form parts.
fn reassert_required_fields(node: &Node, workspace: &Workspace, is_active: bool) {
    let Node::Object(object) = node else {
        return;
    };
    let mut object = object.borrow_mut();
    object.insert("id", Node::from(workspace.id.as_str()));
    object.insert("title", Node::from(workspace.title.as_str()));
    object.insert("threadId", Node::from(workspace.thread_id.as_deref()));
    object.insert("isActive", Node::Bool(is_active));
    object.insert("createdAt", Node::from(iso(&workspace.created_at)));
    if !matches!(object.get("todos"), Some(Node::Array(_))) {
        object.insert("todos", Node::array(Vec::new()));
    }
    if !matches!(object.get("files"), Some(Node::Object(_))) {
        object.insert("files", Node::object(ObjectNode::plain()));
    }
}

fn iso(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
