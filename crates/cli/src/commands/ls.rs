// `threadspace ls`: list workspaces.

use clap::Args;
use serde::{Deserialize, Serialize};

use super::{StateContext, WorkspaceEntry};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct LsArgs {
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LsResult {
    #[serde(default)]
    pub workspaces: Vec<WorkspaceEntry>,
}

pub fn run(args: LsArgs, ctx: &StateContext) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    match list(ctx) {
        Ok(result) => {
            output::print_output(format, &result, format_human)?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

fn list(ctx: &StateContext) -> anyhow::Result<LsResult> {
    let store = ctx.open_store()?;
    let active = store.active_id();
    let workspaces = store
        .workspaces()
        .iter()
        .map(|workspace| WorkspaceEntry::new(workspace, active == Some(&workspace.id)))
        .collect();
    Ok(LsResult { workspaces })
}

fn format_human(result: &LsResult) -> String {
    let mut lines = Vec::new();
    lines.push(format!("{} workspace(s)", result.workspaces.len()));
    for w in &result.workspaces {
        let marker = if w.active { "*" } else { " " };
        let thread = w.thread_id.as_deref().map(|t| format!(" [thread {t}]")).unwrap_or_default();
        lines.push(format!(
            "{marker} {} ({}) {} todo(s), {} file(s){thread}",
            w.title, w.id, w.todos, w.files
        ));
    }
    lines.join("\n")
}
