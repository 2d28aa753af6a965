// Lenient decoding of the persisted `workspaces` record.
//
// Entries without an id or title are dropped; every other field is coerced
// to its declared type with a safe default. Only a record that fails to parse
// (or is not an array) counts as corrupted.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use threadspace_common::types::{TodoItem, TodoStatus, Workspace, WorkspaceId};
use threadspace_common::value::Node;
use tracing::debug;

#[derive(Debug)]
pub(crate) enum Decoded {
    Corrupted(String),
    Records { workspaces: Vec<Workspace>, dropped: usize },
}

pub(crate) fn decode_workspaces(raw: &str, now: DateTime<Utc>) -> Decoded {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(parsed) => parsed,
        Err(error) => return Decoded::Corrupted(error.to_string()),
    };
    let Value::Array(entries) = parsed else {
        return Decoded::Corrupted("workspaces record is not an array".into());
    };

    let mut seen = HashSet::new();
    let mut workspaces = Vec::with_capacity(entries.len());
    let mut dropped = 0usize;
    for (index, entry) in entries.iter().enumerate() {
        match decode_workspace(entry, now) {
            Some(workspace) if seen.insert(workspace.id.clone()) => workspaces.push(workspace),
            Some(workspace) => {
                debug!(index, workspace = %workspace.id, "dropping duplicate workspace id");
                dropped += 1;
            }
            None => {
                debug!(index, "dropping malformed workspace entry");
                dropped += 1;
            }
        }
    }

    Decoded::Records { workspaces, dropped }
}

/// The `active-workspace` record is a bare id. A JSON-quoted id is accepted.
pub(crate) fn decode_active_id(raw: &str) -> Option<WorkspaceId> {
    let trimmed = raw.trim();
    let id = if trimmed.starts_with('"') {
        serde_json::from_str::<String>(trimmed).ok()?
    } else {
        trimmed.to_string()
    };
    (!id.is_empty()).then(|| WorkspaceId::from(id))
}

fn decode_workspace(value: &Value, now: DateTime<Utc>) -> Option<Workspace> {
    let record = value.as_object()?;
    let id = identifier(record.get("id"))?;
    let title = match record.get("title")? {
        Value::String(title) => title.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => return None,
    };

    let thread_id = match record.get("threadId") {
        Some(Value::String(thread)) if !thread.is_empty() => Some(thread.clone()),
        _ => None,
    };

    let todos = match record.get("todos") {
        Some(Value::Array(items)) => items.iter().filter_map(decode_todo).collect(),
        _ => Vec::new(),
    };

    let files = match record.get("files") {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(name, content)| {
                content.as_str().map(|content| (name.clone(), content.to_string()))
            })
            .collect(),
        _ => BTreeMap::new(),
    };

    let metadata = match record.get("metadata") {
        Some(Value::Object(map)) => {
            map.iter().map(|(key, item)| (key.clone(), Node::from_json(item))).collect()
        }
        _ => BTreeMap::new(),
    };

    Some(Workspace {
        id: WorkspaceId::from(id),
        title,
        thread_id,
        todos,
        files,
        created_at: timestamp(record.get("createdAt")).unwrap_or(now),
        metadata,
    })
}

fn decode_todo(value: &Value) -> Option<TodoItem> {
    let record = value.as_object()?;
    let content = match record.get("content")? {
        Value::String(content) => content.clone(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    let status = record
        .get("status")
        .and_then(Value::as_str)
        .and_then(TodoStatus::parse)
        .unwrap_or_default();

    Some(TodoItem {
        id: identifier(record.get("id"))?,
        content,
        status,
        created_at: timestamp(record.get("createdAt")),
        updated_at: timestamp(record.get("updatedAt")),
    })
}

fn identifier(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// ISO-8601 strings or epoch milliseconds.
fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc)),
        Value::Number(number) => number
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}
