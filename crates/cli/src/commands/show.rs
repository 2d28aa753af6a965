// `threadspace show`: print one workspace with its todos, files and
// attached metadata.

use std::collections::BTreeMap;

use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use threadspace_common::types::TodoItem;

use super::{resolve_workspace, StateContext, WorkspaceEntry};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Workspace id or unique prefix. Defaults to the active workspace.
    pub id: Option<String>,

    /// Include file contents in human output.
    #[arg(long)]
    contents: bool,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowResult {
    #[serde(flatten)]
    pub summary: WorkspaceEntry,
    #[serde(rename = "todoItems")]
    pub todo_items: Vec<TodoItem>,
    #[serde(rename = "fileContents")]
    pub file_contents: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

pub fn run(args: ShowArgs, ctx: &StateContext) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let contents = args.contents;
    match show(ctx, args.id.as_deref()) {
        Ok(result) => {
            output::print_output(format, &result, |r| format_human(r, contents))?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

fn show(ctx: &StateContext, raw: Option<&str>) -> anyhow::Result<ShowResult> {
    let store = ctx.open_store()?;
    let id = match raw {
        Some(raw) => resolve_workspace(&store, raw)?,
        None => store.active_id().cloned().ok_or_else(|| anyhow::anyhow!("no active workspace"))?,
    };
    let workspace = store.workspace(&id).ok_or_else(|| anyhow::anyhow!("workspace `{id}` vanished"))?;

    // Metadata goes through the same cleaning projection as persistence.
    let mut metadata = BTreeMap::new();
    for (key, node) in &workspace.metadata {
        if let Some(value) = store.serializer().project(node)? {
            metadata.insert(key.clone(), value);
        }
    }

    Ok(ShowResult {
        summary: WorkspaceEntry::new(workspace, store.active_id() == Some(&id)),
        todo_items: workspace.todos.clone(),
        file_contents: workspace.files.clone(),
        metadata,
    })
}

fn format_human(result: &ShowResult, contents: bool) -> String {
    let s = &result.summary;
    let mut lines = vec![format!("{}{} ({})", if s.active { "* " } else { "" }, s.title, s.id)];
    lines.push(format!("  created: {}", s.created_at));
    lines.push(format!("  thread:  {}", s.thread_id.as_deref().unwrap_or("-")));

    if result.todo_items.is_empty() {
        lines.push("  no todos".into());
    } else {
        lines.push(format!("  {} todo(s)", result.todo_items.len()));
        for todo in &result.todo_items {
            lines.push(format!("    [{}] {}", todo.status.as_str(), todo.content));
        }
    }

    if result.file_contents.is_empty() {
        lines.push("  no files".into());
    } else {
        lines.push(format!("  {} file(s)", result.file_contents.len()));
        for (name, body) in &result.file_contents {
            lines.push(format!("    {name} ({} bytes)", body.len()));
            if contents {
                lines.extend(body.lines().map(|line| format!("      {line}")));
            }
        }
    }

    if !result.metadata.is_empty() {
        let keys: Vec<&str> = result.metadata.keys().map(String::as_str).collect();
        lines.push(format!("  metadata: {}", keys.join(", ")));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support;
    use tempfile::TempDir;
    use threadspace_common::types::{TodoStatus, WorkspacePatch};
    use threadspace_common::value::{HostKind, Node};
    use threadspace_state::store::FileMerge;

    fn populated(dir: &TempDir) -> (crate::commands::StateContext, String) {
        let ctx = test_support::context(dir);
        let mut store = ctx.open_store().unwrap();
        let id = store.active_id().cloned().unwrap();
        store.update_workspace_todos(&id, vec![TodoItem::new("t1", "outline", TodoStatus::InProgress)]);
        store.update_workspace_files(
            &id,
            BTreeMap::from([("notes.md".to_string(), "line one\nline two".to_string())]),
            FileMerge::Merge,
        );
        let meta = Node::plain_object([
            ("step", Node::Number(1.0)),
            ("socket", Node::host(HostKind::FrameworkInternal, "FiberNode")),
        ]);
        store.update_workspace(&id, WorkspacePatch::default().metadata(BTreeMap::from([("run".to_string(), meta)])));
        (ctx, id.to_string())
    }

    #[test]
    fn show_defaults_to_active_workspace() {
        let dir = TempDir::new().unwrap();
        let (ctx, id) = populated(&dir);

        let result = show(&ctx, None).unwrap();
        assert_eq!(result.summary.id, id);
        assert!(result.summary.active);
        assert_eq!(result.todo_items.len(), 1);
        assert_eq!(result.file_contents.len(), 1);
        assert_eq!(result.metadata.get("run"), Some(&serde_json::json!({"step": 1})));
    }

    #[test]
    fn human_format_lists_todos_and_files() {
        let dir = TempDir::new().unwrap();
        let (ctx, _) = populated(&dir);
        let result = show(&ctx, None).unwrap();

        let brief = format_human(&result, false);
        assert!(brief.contains("[in_progress] outline"));
        assert!(brief.contains("notes.md (17 bytes)"));
        assert!(brief.contains("metadata: run"));
        assert!(!brief.contains("line two"));

        let full = format_human(&result, true);
        assert!(full.contains("      line two"));
    }

    #[test]
    fn json_output_flattens_summary() {
        let dir = TempDir::new().unwrap();
        let (ctx, id) = populated(&dir);
        let result = show(&ctx, Some(&id)).unwrap();

        let mut buf = Vec::new();
        output::write_output(&mut buf, OutputFormat::Json, &result, |r| format_human(r, false)).unwrap();
        let parsed: Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed["id"], id.as_str());
        assert_eq!(parsed["todos"], 1);
        assert_eq!(parsed["todoItems"][0]["status"], "in_progress");
        assert_eq!(parsed["fileContents"]["notes.md"], "line one\nline two");
    }
}
