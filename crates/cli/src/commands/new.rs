// `threadspace new`: create a workspace and make it active.

use clap::Args;
use serde::{Deserialize, Serialize};

use super::{ensure_persisted, StateContext, WorkspaceEntry};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct NewArgs {
    /// Workspace title. Defaults to the next free "Workspace N".
    #[arg(long)]
    title: Option<String>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewResult {
    pub workspace: WorkspaceEntry,
}

pub fn run(args: NewArgs, ctx: &StateContext) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    match create(ctx, args.title.as_deref()) {
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

fn create(ctx: &StateContext, title: Option<&str>) -> anyhow::Result<NewResult> {
    let mut store = ctx.open_store()?;
    let id = store.create_workspace(title);
    ensure_persisted(&store)?;

    let workspace = store
        .workspace(&id)
        .ok_or_else(|| anyhow::anyhow!("created workspace `{id}` is missing"))?;
    Ok(NewResult { workspace: WorkspaceEntry::new(workspace, true) })
}

fn format_human(result: &NewResult) -> String {
    format!("Created {} ({}) and made it active", result.workspace.title, result.workspace.id)
}
