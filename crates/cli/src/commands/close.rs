// `threadspace close`: close a workspace.

use clap::Args;
use serde::{Deserialize, Serialize};

use super::{ensure_persisted, resolve_workspace, StateContext};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct CloseArgs {
    /// Workspace id, or a unique prefix of one.
    pub id: String,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseResult {
    pub closed: String,
    pub active: String,
    pub remaining: usize,
}

pub fn run(args: CloseArgs, ctx: &StateContext) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    match close(ctx, &args.id) {
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

fn close(ctx: &StateContext, raw: &str) -> anyhow::Result<CloseResult> {
    let mut store = ctx.open_store()?;
    let id = resolve_workspace(&store, raw)?;
    store.close_workspace(&id);
    ensure_persisted(&store)?;

    let active = store
        .active_id()
        .map(ToString::to_string)
        .ok_or_else(|| anyhow::anyhow!("no active workspace after close"))?;
    Ok(CloseResult { closed: id.to_string(), active, remaining: store.len() })
}

fn format_human(result: &CloseResult) -> String {
    format!(
        "Closed {}. Active workspace: {} ({} remaining)",
        result.closed, result.active, result.remaining
    )
}
