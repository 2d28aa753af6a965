// `threadspace select`: make a workspace active.

use clap::Args;
use serde::{Deserialize, Serialize};

use super::{ensure_persisted, resolve_workspace, StateContext};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct SelectArgs {
    /// Workspace id, or a unique prefix of one.
    pub id: String,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectResult {
    pub active: String,
    pub title: String,
}

pub fn run(args: SelectArgs, ctx: &StateContext) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    match select(ctx, &args.id) {
        Ok(result) => {
            output::print_output(format, &result, |r| format!("Active workspace: {} ({})", r.title, r.active))?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

fn select(ctx: &StateContext, raw: &str) -> anyhow::Result<SelectResult> {
    let mut store = ctx.open_store()?;
    let id = resolve_workspace(&store, raw)?;
    store.select_workspace(&id);
    ensure_persisted(&store)?;

    let title = store.workspace(&id).map(|workspace| workspace.title.clone()).unwrap_or_default();
    Ok(SelectResult { active: id.to_string(), title })
}
