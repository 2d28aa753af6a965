// Session bridge: routes backend todo/file events into the workspace that
// was active when their stream began.
//
// The backend is an external collaborator. Each stream is started with an
// explicit operation id; the bridge captures the target workspace in the
// tracker at that moment and resolves it again when an event arrives. The
// store is borrowed only for the synchronous apply step, so a UI action
// (e.g. switching workspaces) can interleave between two events.

use std::cell::RefCell;
use std::collections::BTreeMap;

use threadspace_common::types::{TodoItem, WorkspaceId, WorkspacePatch};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::storage::KeyValueStorage;
use crate::store::{FileMerge, SharedStore, WorkspaceStore};
use crate::tracker::{AsyncOperationTracker, OperationId};

/// Events emitted by the backend for a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    TodosChanged { operation_id: Option<OperationId>, todos: Vec<TodoItem> },
    FilesChanged { operation_id: Option<OperationId>, files: BTreeMap<String, String> },
    StreamEnded { operation_id: OperationId },
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Applied(WorkspaceId),
    /// The target workspace was closed while the stream was in flight.
    WorkspaceGone(WorkspaceId),
    /// No target could be resolved for the event.
    Unroutable,
    Ended,
}

/// Handle returned when a stream starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTicket {
    pub operation_id: OperationId,
    pub workspace_id: WorkspaceId,
}

pub struct SessionBridge<S> {
    store: SharedStore<S>,
    tracker: RefCell<AsyncOperationTracker>,
}

impl<S: KeyValueStorage> SessionBridge<S> {
    pub fn new(store: SharedStore<S>) -> Self {
        Self { store, tracker: RefCell::new(AsyncOperationTracker::new()) }
    }

    pub fn store(&self) -> &SharedStore<S> {
        &self.store
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.borrow().in_flight()
    }

    /// Start a stream against the currently active workspace.
    pub fn begin_stream(&self, operation_id: OperationId, thread_id: Option<&str>) -> Option<StreamTicket> {
        let workspace_id = self.store.borrow().active_id().cloned()?;
        Some(self.begin_stream_for(operation_id, workspace_id, thread_id))
    }

    /// Start a stream against an explicit workspace token. A `thread_id` is
    /// bound to the workspace if it has none yet.
    pub fn begin_stream_for(
        &self,
        operation_id: OperationId,
        workspace_id: WorkspaceId,
        thread_id: Option<&str>,
    ) -> StreamTicket {
        if let Some(thread_id) = thread_id {
            let mut store = self.store.borrow_mut();
            let unbound = store
                .workspace(&workspace_id)
                .is_some_and(|workspace| workspace.thread_id.is_none());
            if unbound {
                store.update_workspace(
                    &workspace_id,
                    WorkspacePatch::default().thread_id(Some(thread_id.to_string())),
                );
            }
        }

        let mut tracker = self.tracker.borrow_mut();
        let workspace_id = tracker.start_operation(operation_id.clone(), workspace_id);
        tracker.set_current_workspace(Some(workspace_id.clone()));
        info!(operation = %operation_id, workspace = %workspace_id, "stream started");
        StreamTicket { operation_id, workspace_id }
    }

    pub fn on_todos(&self, operation_id: &OperationId, todos: Vec<TodoItem>) -> Delivery {
        self.deliver(Some(operation_id), |store, target| store.update_workspace_todos(target, todos))
    }

    /// File updates always merge: several producers may target a workspace.
    pub fn on_files(&self, operation_id: &OperationId, files: BTreeMap<String, String>) -> Delivery {
        self.deliver(Some(operation_id), |store, target| {
            store.update_workspace_files(target, files, FileMerge::Merge)
        })
    }

    pub fn apply(&self, event: BackendEvent) -> Delivery {
        match event {
            BackendEvent::TodosChanged { operation_id, todos } => self
                .deliver(operation_id.as_ref(), |store, target| {
                    store.update_workspace_todos(target, todos)
                }),
            BackendEvent::FilesChanged { operation_id, files } => {
                self.deliver(operation_id.as_ref(), |store, target| {
                    store.update_workspace_files(target, files, FileMerge::Merge)
                })
            }
            BackendEvent::StreamEnded { operation_id } => {
                self.finish(&operation_id);
                Delivery::Ended
            }
        }
    }

    /// End a stream. Closing its workspace earlier does not end it.
    pub fn finish(&self, operation_id: &OperationId) -> bool {
        let ended = self.tracker.borrow_mut().end_operation(operation_id);
        if ended {
            info!(operation = %operation_id, "stream finished");
        }
        ended
    }

    /// Drain `events` until every sender is dropped. Returns the number of
    /// events that were applied to a workspace.
    pub async fn pump(&self, events: &mut mpsc::Receiver<BackendEvent>) -> usize {
        let mut applied = 0usize;
        while let Some(event) = events.recv().await {
            if matches!(self.apply(event), Delivery::Applied(_)) {
                applied += 1;
            }
        }
        applied
    }

    fn deliver(
        &self,
        operation_id: Option<&OperationId>,
        write: impl FnOnce(&mut WorkspaceStore<S>, &WorkspaceId) -> bool,
    ) -> Delivery {
        let Some(target) = self.tracker.borrow().resolve(operation_id) else {
            debug!(operation = ?operation_id.map(OperationId::as_str), "dropping unroutable event");
            return Delivery::Unroutable;
        };

        let mut store = self.store.borrow_mut();
        if write(&mut store, &target) {
            Delivery::Applied(target)
        } else {
            debug!(workspace = %target, "event arrived for a closed workspace");
            Delivery::WorkspaceGone(target)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use threadspace_common::types::TodoStatus;
    use threadspace_common::value::SafeSerializer;

    fn bridge() -> SessionBridge<MemoryStorage> {
        SessionBridge::new(WorkspaceStore::open(MemoryStorage::new(), SafeSerializer::default()).shared())
    }

    fn files(name: &str, content: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(name.to_string(), content.to_string())])
    }

    #[test]
    fn begin_stream_binds_thread_once() {
        let bridge = bridge();
        let ticket = bridge.begin_stream("op-1".into(), Some("thread-1")).expect("active workspace");
        bridge.begin_stream("op-2".into(), Some("thread-2"));

        let store = bridge.store().borrow();
        let workspace = store.workspace(&ticket.workspace_id).unwrap();
        assert_eq!(workspace.thread_id.as_deref(), Some("thread-1"));
        assert_eq!(bridge.in_flight(), 2);
    }

    #[test]
    fn events_follow_the_stream_not_the_selection() {
        let bridge = bridge();
        let a = bridge.store().borrow().active_id().cloned().unwrap();
        let ticket = bridge.begin_stream("op-a".into(), None).unwrap();
        let b = bridge.store().borrow_mut().create_workspace(None);

        let delivery = bridge.on_files(&ticket.operation_id, files("report.md", "x"));
        assert_eq!(delivery, Delivery::Applied(a.clone()));

        let store = bridge.store().borrow();
        assert_eq!(store.workspace(&a).unwrap().files, files("report.md", "x"));
        assert!(store.workspace(&b).unwrap().files.is_empty());
    }

    #[test]
    fn late_event_for_closed_workspace_is_a_no_op() {
        let bridge = bridge();
        let ticket = bridge.begin_stream("op-1".into(), None).unwrap();
        bridge.store().borrow_mut().create_workspace(None);
        bridge.store().borrow_mut().close_workspace(&ticket.workspace_id);
        let before = bridge.store().borrow().workspaces().to_vec();

        let delivery = bridge.on_todos(
            &ticket.operation_id,
            vec![TodoItem::new("t1", "late", TodoStatus::Pending)],
        );
        assert_eq!(delivery, Delivery::WorkspaceGone(ticket.workspace_id.clone()));
        assert_eq!(bridge.store().borrow().workspaces(), before.as_slice());
        assert_eq!(bridge.in_flight(), 1, "closing does not cancel the operation");
    }

    #[test]
    fn events_for_unknown_operations_are_unroutable() {
        let bridge = bridge();
        assert_eq!(bridge.on_files(&"nope".into(), files("a", "1")), Delivery::Unroutable);
    }

    #[test]
    fn untagged_events_use_single_in_flight_stream() {
        let bridge = bridge();
        let ticket = bridge.begin_stream("op-1".into(), None).unwrap();

        let delivery = bridge.apply(BackendEvent::FilesChanged {
            operation_id: None,
            files: files("a.txt", "1"),
        });
        assert_eq!(delivery, Delivery::Applied(ticket.workspace_id));

        bridge.begin_stream("op-2".into(), None);
        let delivery = bridge.apply(BackendEvent::FilesChanged {
            operation_id: None,
            files: files("b.txt", "2"),
        });
        assert_eq!(delivery, Delivery::Unroutable);
    }

    #[test]
    fn untagged_event_after_newer_stream_ends_goes_to_older_stream() {
        let bridge = bridge();
        let a = bridge.begin_stream("op-a".into(), None).unwrap().workspace_id;
        let b = bridge.store().borrow_mut().create_workspace(None);
        bridge.begin_stream_for("op-b".into(), b.clone(), None);
        assert!(bridge.finish(&"op-b".into()));

        let delivery = bridge.apply(BackendEvent::FilesChanged {
            operation_id: None,
            files: files("report.md", "x"),
        });
        assert_eq!(delivery, Delivery::Applied(a.clone()));

        let store = bridge.store().borrow();
        assert_eq!(store.workspace(&a).unwrap().files, files("report.md", "x"));
        assert!(store.workspace(&b).unwrap().files.is_empty());
    }

    #[test]
    fn untagged_event_with_nothing_in_flight_is_unroutable() {
        let bridge = bridge();
        let ticket = bridge.begin_stream("op-1".into(), None).unwrap();
        bridge.finish(&ticket.operation_id);

        let delivery = bridge.apply(BackendEvent::TodosChanged {
            operation_id: None,
            todos: vec![TodoItem::new("t1", "stale", TodoStatus::Pending)],
        });
        assert_eq!(delivery, Delivery::Unroutable);
    }

    #[test]
    fn stream_ended_event_finishes_operation() {
        let bridge = bridge();
        let ticket = bridge.begin_stream("op-1".into(), None).unwrap();
        assert_eq!(
            bridge.apply(BackendEvent::StreamEnded { operation_id: ticket.operation_id.clone() }),
            Delivery::Ended
        );
        assert_eq!(bridge.in_flight(), 0);
        assert!(!bridge.finish(&ticket.operation_id));
    }
}
