// CLI subcommand dispatch.

use std::path::PathBuf;

use anyhow::Context;
use chrono::SecondsFormat;
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use threadspace_common::types::{Workspace, WorkspaceId};
use threadspace_state::config::StateConfig;
use threadspace_state::storage::FileStorage;
use threadspace_state::store::{LoadSource, PersistOutcome, WorkspaceStore};
use tracing::debug;

use crate::exit_code::WorkspaceNotFound;

pub mod close;
pub mod ls;
pub mod new;
pub mod repair;
pub mod select;
pub mod show;

#[derive(Subcommand)]
pub enum Command {
    /// List workspaces
    Ls(ls::LsArgs),
    /// Create a workspace and make it active
    New(new::NewArgs),
    /// Make a workspace active
    Select(select::SelectArgs),
    /// Close a workspace
    Close(close::CloseArgs),
    /// Show one workspace in full
    Show(show::ShowArgs),
    /// Reload persisted state, repair it and write it back
    Repair(repair::RepairArgs),
}

pub fn run(cmd: Command, ctx: &StateContext) -> anyhow::Result<()> {
    match cmd {
        Command::Ls(args) => ls::run(args, ctx),
        Command::New(args) => new::run(args, ctx),
        Command::Select(args) => select::run(args, ctx),
        Command::Close(args) => close::run(args, ctx),
        Command::Show(args) => show::run(args, ctx),
        Command::Repair(args) => repair::run(args, ctx),
    }
}

/// Resolved configuration shared by every subcommand.
pub struct StateContext {
    config: StateConfig,
    data_dir: Option<PathBuf>,
}

impl StateContext {
    pub fn new(config: StateConfig, data_dir: Option<PathBuf>) -> Self {
        Self { config, data_dir }
    }

    /// `--data-dir`, then `[storage] dir`, then `~/.threadspace/state/`.
    pub fn storage_dir(&self) -> anyhow::Result<PathBuf> {
        self.data_dir
            .clone()
            .or_else(|| self.config.storage_dir())
            .context("could not determine home directory; pass --data-dir")
    }

    pub fn open_store(&self) -> anyhow::Result<WorkspaceStore<FileStorage>> {
        let dir = self.storage_dir()?;
        debug!(dir = %dir.display(), "opening workspace store");
        let storage = FileStorage::open(&dir)?;
        let store = WorkspaceStore::open(storage, self.config.serializer());
        // Any later write would replace the record we failed to read.
        if store.last_load().is_some_and(|report| report.source == LoadSource::Unreadable) {
            anyhow::bail!(
                "workspace state in {} could not be read; refusing to overwrite it",
                dir.display()
            );
        }
        Ok(store)
    }
}

/// Summary row for one workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceEntry {
    pub id: String,
    pub title: String,
    pub thread_id: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub todos: usize,
    pub files: usize,
}

impl WorkspaceEntry {
    pub fn new(workspace: &Workspace, active: bool) -> Self {
        Self {
            id: workspace.id.to_string(),
            title: workspace.title.clone(),
            thread_id: workspace.thread_id.clone(),
            active,
            created_at: workspace.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            todos: workspace.todos.len(),
            files: workspace.files.len(),
        }
    }
}

/// Exact id, or a prefix matching exactly one workspace.
pub fn resolve_workspace<S>(store: &WorkspaceStore<S>, raw: &str) -> anyhow::Result<WorkspaceId>
where
    S: threadspace_state::storage::KeyValueStorage,
{
    let exact = WorkspaceId::from(raw);
    if store.contains(&exact) {
        return Ok(exact);
    }

    let mut matches = store.workspaces().iter().filter(|workspace| {
        !raw.is_empty() && workspace.id.as_str().starts_with(raw)
    });
    match (matches.next(), matches.next()) {
        (Some(workspace), None) => Ok(workspace.id.clone()),
        (Some(_), Some(_)) => anyhow::bail!("workspace id prefix `{raw}` is ambiguous"),
        (None, _) => Err(WorkspaceNotFound { id: raw.to_string() }.into()),
    }
}

/// Mutations never fail in the store itself; surface a failed write here.
pub fn ensure_persisted<S>(store: &WorkspaceStore<S>) -> anyhow::Result<()>
where
    S: threadspace_state::storage::KeyValueStorage,
{
    match store.last_persist() {
        Some(PersistOutcome::Failed) => {
            anyhow::bail!("failed to write workspace state; see log output for the cause")
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    pub fn context(dir: &TempDir) -> StateContext {
        StateContext::new(StateConfig::default(), Some(dir.path().join("state")))
    }
}
