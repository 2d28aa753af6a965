// Core domain types shared across all threadspace crates.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Node;

/// Opaque workspace identifier.
///
/// New ids are UUID v4 strings, but persisted ids are accepted verbatim so
/// records written by older clients keep their identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for WorkspaceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for WorkspaceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// A single todo reported by the backend. Vector order is display order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TodoItem {
    pub fn new(id: impl Into<String>, content: impl Into<String>, status: TodoStatus) -> Self {
        Self { id: id.into(), content: content.into(), status, created_at: None, updated_at: None }
    }
}

/// An independently scoped conversational context.
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub title: String,
    /// Backend conversation this workspace is bound to, once one has started.
    pub thread_id: Option<String>,
    pub todos: Vec<TodoItem>,
    pub files: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    /// Attachments from the session layer. May hold values that are not
    /// plain data; persistence runs them through `SafeSerializer`.
    pub metadata: BTreeMap<String, Node>,
}

impl Workspace {
    pub fn new(title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: WorkspaceId::generate(),
            title: title.into(),
            thread_id: None,
            todos: Vec::new(),
            files: BTreeMap::new(),
            created_at: now,
            metadata: BTreeMap::new(),
        }
    }

    /// Shallow-merge the set fields of `patch` into this workspace.
    pub fn apply(&mut self, patch: WorkspacePatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(thread_id) = patch.thread_id {
            self.thread_id = thread_id;
        }
        if let Some(todos) = patch.todos {
            self.todos = todos;
        }
        if let Some(files) = patch.files {
            self.files = files;
        }
        if let Some(metadata) = patch.metadata {
            self.metadata = metadata;
        }
    }
}

/// Partial update for `WorkspaceStore::update_workspace`.
///
/// `id` and `created_at` are immutable and therefore absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkspacePatch {
    pub title: Option<String>,
    /// `Some(None)` clears the thread binding.
    pub thread_id: Option<Option<String>>,
    pub todos: Option<Vec<TodoItem>>,
    pub files: Option<BTreeMap<String, String>>,
    pub metadata: Option<BTreeMap<String, Node>>,
}

impl WorkspacePatch {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn thread_id(mut self, thread_id: Option<String>) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn todos(mut self, todos: Vec<TodoItem>) -> Self {
        self.todos = Some(todos);
        self
    }

    pub fn files(mut self, files: BTreeMap<String, String>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn metadata(mut self, metadata: BTreeMap<String, Node>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
