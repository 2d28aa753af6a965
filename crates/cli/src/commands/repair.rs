// `threadspace repair`: reload persisted state, drop what cannot be read and
// write the normalized result back.

use clap::Args;
use serde::Serialize;
use threadspace_state::store::{LoadReport, LoadSource, PersistOutcome};

use super::StateContext;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct RepairArgs {
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairResult {
    #[serde(flatten)]
    pub load: LoadReport,
    pub persisted: PersistOutcome,
}

pub fn run(args: RepairArgs, ctx: &StateContext) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    match repair(ctx) {
        Ok(result) => {
            if result.persisted == PersistOutcome::Minimal {
                output::print_warning(
                    format,
                    "MINIMAL_PERSIST",
                    "workspace content could not be serialized; only ids, titles and threads were kept",
                );
            }
            output::print_output(format, &result, format_human)?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

fn repair(ctx: &StateContext) -> anyhow::Result<RepairResult> {
    let mut store = ctx.open_store()?;
    let load = store
        .last_load()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("store opened without loading"))?;
    let persisted = store.persist();
    if persisted == PersistOutcome::Failed {
        anyhow::bail!("failed to write repaired state; see log output for the cause");
    }
    Ok(RepairResult { load, persisted })
}

fn format_human(result: &RepairResult) -> String {
    let load = &result.load;
    let mut lines = vec![match load.source {
        LoadSource::Restored if load.dropped == 0 => "State is healthy.".to_string(),
        LoadSource::Restored => format!("Dropped {} unreadable workspace record(s).", load.dropped),
        LoadSource::Fresh => "No persisted state found; created a default workspace.".to_string(),
        LoadSource::RecoveredFromCorruption => {
            "Persisted state was corrupted and has been reset to a default workspace.".to_string()
        }
        LoadSource::Unreadable => "Persisted state could not be read and was left untouched.".to_string(),
    }];
    lines.push(format!("  workspaces: {}", load.workspaces));
    lines.push(format!("  active:     {}", load.active));
    lines.join("\n")
}
