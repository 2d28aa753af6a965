// Workspace store: the workspace collection, the active pointer, durable
// persistence and self-repair.
//
// Invariants once `open` returns:
// - at least one workspace exists
// - the active id is set and references a present workspace
// - ids are unique
// Every mutation persists immediately and notifies listeners. Updates that
// name an unknown id are no-ops; late events for closed workspaces rely on it.

mod load;
pub mod naming;
mod persist;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::rc::Rc;

use chrono::Utc;
use serde::Serialize;
use threadspace_common::types::{TodoItem, Workspace, WorkspaceId, WorkspacePatch};
use threadspace_common::value::SafeSerializer;
use tracing::{debug, info, warn};

use crate::storage::{KeyValueStorage, StorageError};
use load::{decode_active_id, decode_workspaces, Decoded};
use naming::next_default_title;
use persist::encode_workspaces;

/// Storage key holding the JSON array of workspace records.
pub const WORKSPACES_KEY: &str = "workspaces";
/// Storage key holding the bare id of the active workspace.
pub const ACTIVE_WORKSPACE_KEY: &str = "active-workspace";

/// Store handle shared between UI actions and the session bridge on one
/// thread. Borrows must never be held across an `.await`.
pub type SharedStore<S> = Rc<RefCell<WorkspaceStore<S>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    /// A persisted record was found and parsed.
    Restored,
    /// Nothing was persisted yet.
    Fresh,
    /// The persisted record did not parse and was discarded.
    RecoveredFromCorruption,
    /// The persisted record could not be read. It is left untouched and the
    /// in-memory default is not written back.
    Unreadable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub source: LoadSource,
    pub workspaces: usize,
    /// Malformed or duplicate entries filtered out of the record.
    pub dropped: usize,
    /// A default workspace had to be created.
    pub synthesized: bool,
    pub active: WorkspaceId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistOutcome {
    Full,
    /// Content could not be serialized; only identity and naming were written.
    Minimal,
    /// Nothing was written. The in-memory state is unaffected.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileMerge {
    /// Union into the existing map; incoming names overwrite.
    #[default]
    Merge,
    /// Replace the map wholesale. Unsafe with concurrent producers.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Loaded,
    Created(WorkspaceId),
    Selected(WorkspaceId),
    Closed { id: WorkspaceId, active: WorkspaceId },
    Updated(WorkspaceId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&StoreEvent)>;

pub struct WorkspaceStore<S> {
    storage: S,
    serializer: SafeSerializer,
    workspaces: Vec<Workspace>,
    active_id: Option<WorkspaceId>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    last_persist: Option<PersistOutcome>,
    last_load: Option<LoadReport>,
}

impl<S: KeyValueStorage> WorkspaceStore<S> {
    /// Open the store over `storage`, loading (and repairing) persisted state.
    pub fn open(storage: S, serializer: SafeSerializer) -> Self {
        let mut store = Self {
            storage,
            serializer,
            workspaces: Vec::new(),
            active_id: None,
            listeners: Vec::new(),
            next_listener: 0,
            last_persist: None,
            last_load: None,
        };
        store.load();
        store
    }

    pub fn shared(self) -> SharedStore<S> {
        Rc::new(RefCell::new(self))
    }

    /// Replace in-memory state with the persisted state.
    ///
    /// Never fails: unreadable or corrupted records degrade to a single
    /// default workspace. Repaired state is written back immediately, except
    /// when the record could not be read at all.
    pub fn load(&mut self) -> LoadReport {
        let now = Utc::now();
        let decoded = match self.storage.get(WORKSPACES_KEY) {
            Ok(None) => Ok(None),
            Ok(Some(raw)) => Ok(Some(decode_workspaces(&raw, now))),
            Err(StorageError::Io { source, .. }) if source.kind() == io::ErrorKind::InvalidData => {
                Ok(Some(Decoded::Corrupted(source.to_string())))
            }
            Err(error) => Err(error),
        };

        let (source, mut workspaces, dropped) = match decoded {
            Ok(None) => (LoadSource::Fresh, Vec::new(), 0),
            Ok(Some(Decoded::Records { workspaces, dropped })) => {
                (LoadSource::Restored, workspaces, dropped)
            }
            Ok(Some(Decoded::Corrupted(reason))) => {
                warn!(%reason, "discarding corrupted workspaces record");
                if let Err(error) = self.storage.remove(WORKSPACES_KEY) {
                    warn!(%error, "failed to remove corrupted workspaces record");
                }
                (LoadSource::RecoveredFromCorruption, Vec::new(), 0)
            }
            Err(error) => {
                warn!(%error, "failed to read persisted workspaces; keeping the record as is");
                (LoadSource::Unreadable, Vec::new(), 0)
            }
        };

        let synthesized = workspaces.is_empty();
        if synthesized {
            workspaces.push(Workspace::new(next_default_title(Vec::<&str>::new()), now));
        }

        let stored_active = self
            .storage
            .get(ACTIVE_WORKSPACE_KEY)
            .unwrap_or_else(|error| {
                warn!(%error, "failed to read active workspace");
                None
            })
            .and_then(|raw| decode_active_id(&raw));
        let restored_active = stored_active
            .as_ref()
            .filter(|id| workspaces.iter().any(|workspace| &workspace.id == *id))
            .cloned();
        let active = restored_active.clone().unwrap_or_else(|| workspaces[0].id.clone());

        self.workspaces = workspaces;
        self.active_id = Some(active.clone());

        let report = LoadReport {
            source,
            workspaces: self.workspaces.len(),
            dropped,
            synthesized,
            active,
        };
        info!(
            source = ?report.source,
            workspaces = report.workspaces,
            dropped = report.dropped,
            active = %report.active,
            "workspaces loaded"
        );

        let repaired = synthesized || dropped > 0 || restored_active.is_none();
        if repaired && source != LoadSource::Unreadable {
            self.persist();
        }
        self.last_load = Some(report.clone());
        self.notify(&StoreEvent::Loaded);
        report
    }

    /// Write the collection and the active id. Failures are logged, never
    /// raised; the outcome is also kept in `last_persist`.
    pub fn persist(&mut self) -> PersistOutcome {
        let outcome = self.write_state();
        self.last_persist = Some(outcome);
        outcome
    }

    fn write_state(&mut self) -> PersistOutcome {
        let encoded =
            match encode_workspaces(&self.workspaces, self.active_id.as_ref(), &self.serializer) {
                Ok(encoded) => encoded,
                Err(error) => {
                    warn!(%error, "failed to encode workspaces");
                    return PersistOutcome::Failed;
                }
            };

        if let Err(error) = self.storage.set(WORKSPACES_KEY, &encoded.text) {
            warn!(%error, "failed to persist workspaces");
            return PersistOutcome::Failed;
        }
        if let Some(active) = &self.active_id {
            if let Err(error) = self.storage.set(ACTIVE_WORKSPACE_KEY, active.as_str()) {
                warn!(%error, "failed to persist active workspace");
                return PersistOutcome::Failed;
            }
        }

        if encoded.minimal {
            PersistOutcome::Minimal
        } else {
            PersistOutcome::Full
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn workspaces(&self) -> &[Workspace] {
        &self.workspaces
    }

    pub fn workspace(&self, id: &WorkspaceId) -> Option<&Workspace> {
        self.workspaces.iter().find(|workspace| &workspace.id == id)
    }

    pub fn contains(&self, id: &WorkspaceId) -> bool {
        self.workspace(id).is_some()
    }

    pub fn active_id(&self) -> Option<&WorkspaceId> {
        self.active_id.as_ref()
    }

    pub fn active_workspace(&self) -> Option<&Workspace> {
        self.active_id.as_ref().and_then(|id| self.workspace(id))
    }

    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    pub fn last_persist(&self) -> Option<PersistOutcome> {
        self.last_persist
    }

    /// Report of the most recent `load`, including the one run by `open`.
    pub fn last_load(&self) -> Option<&LoadReport> {
        self.last_load.as_ref()
    }

    pub fn serializer(&self) -> &SafeSerializer {
        &self.serializer
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Create a workspace and make it active. A missing or blank title gets
    /// the next default "Workspace <N>".
    pub fn create_workspace(&mut self, title: Option<&str>) -> WorkspaceId {
        let title = match title.map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => next_default_title(self.workspaces.iter().map(|workspace| workspace.title.as_str())),
        };
        let workspace = Workspace::new(title, Utc::now());
        let id = workspace.id.clone();
        debug!(workspace = %id, title = %workspace.title, "workspace created");

        self.workspaces.push(workspace);
        self.active_id = Some(id.clone());
        self.persist();
        self.notify(&StoreEvent::Created(id.clone()));
        self.notify(&StoreEvent::Selected(id.clone()));
        id
    }

    /// Make `id` active. Unknown ids are ignored and return `false`.
    pub fn select_workspace(&mut self, id: &WorkspaceId) -> bool {
        if !self.contains(id) {
            debug!(workspace = %id, "ignoring selection of unknown workspace");
            return false;
        }
        self.active_id = Some(id.clone());
        self.persist();
        self.notify(&StoreEvent::Selected(id.clone()));
        true
    }

    /// Remove `id`. If it was active, the first remaining workspace becomes
    /// active; closing the last workspace replaces it with a fresh default
    /// one in the same call.
    pub fn close_workspace(&mut self, id: &WorkspaceId) -> bool {
        let Some(index) = self.workspaces.iter().position(|workspace| &workspace.id == id) else {
            debug!(workspace = %id, "ignoring close of unknown workspace");
            return false;
        };
        self.workspaces.remove(index);

        if self.workspaces.is_empty() {
            self.workspaces.push(Workspace::new(next_default_title(Vec::<&str>::new()), Utc::now()));
        }
        let active_survives =
            self.active_id.as_ref().is_some_and(|active| active != id && self.contains(active));
        let active = match (&self.active_id, active_survives) {
            (Some(active), true) => active.clone(),
            _ => self.workspaces[0].id.clone(),
        };
        self.active_id = Some(active.clone());
        debug!(workspace = %id, active = %active, "workspace closed");

        self.persist();
        self.notify(&StoreEvent::Closed { id: id.clone(), active });
        true
    }

    /// Shallow-merge `patch` into workspace `id`. Unknown ids are a no-op.
    pub fn update_workspace(&mut self, id: &WorkspaceId, patch: WorkspacePatch) -> bool {
        let Some(workspace) = self.workspace_mut(id) else {
            debug!(workspace = %id, "ignoring update for unknown workspace");
            return false;
        };
        workspace.apply(patch);
        self.persist();
        self.notify(&StoreEvent::Updated(id.clone()));
        true
    }

    pub fn update_workspace_todos(&mut self, id: &WorkspaceId, todos: Vec<TodoItem>) -> bool {
        self.update_workspace(id, WorkspacePatch::default().todos(todos))
    }

    /// Update the file map of `id`; see `FileMerge` for the two modes.
    pub fn update_workspace_files(
        &mut self,
        id: &WorkspaceId,
        files: BTreeMap<String, String>,
        mode: FileMerge,
    ) -> bool {
        let Some(workspace) = self.workspace_mut(id) else {
            debug!(workspace = %id, "ignoring file update for unknown workspace");
            return false;
        };
        match mode {
            FileMerge::Merge => workspace.files.extend(files),
            FileMerge::Replace => workspace.files = files,
        }
        self.persist();
        self.notify(&StoreEvent::Updated(id.clone()));
        true
    }

    /// Detach `id` from its backend thread and clear conversation state.
    pub fn start_fresh_conversation(&mut self, id: &WorkspaceId) -> bool {
        self.update_workspace(
            id,
            WorkspacePatch::default().thread_id(None).todos(Vec::new()).files(BTreeMap::new()),
        )
    }

    // ── Notification ────────────────────────────────────────────────

    /// Register a change listener. Listeners run synchronously after each
    /// mutation has been persisted and must not call back into the store.
    pub fn subscribe(&mut self, listener: impl FnMut(&StoreEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    fn notify(&mut self, event: &StoreEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    fn workspace_mut(&mut self, id: &WorkspaceId) -> Option<&mut Workspace> {
        self.workspaces.iter_mut().find(|workspace| &workspace.id == id)
    }
}
