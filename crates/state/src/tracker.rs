// Ownership registry for in-flight asynchronous operations.
//
// An operation records the workspace that was active when it started. Its
// completion handlers resolve the target from here, never from whatever
// workspace is active when the callback fires.

use std::collections::HashMap;
use std::fmt;

use threadspace_common::types::WorkspaceId;
use tracing::{debug, warn};

/// Caller-chosen token identifying one asynchronous unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Default)]
pub struct AsyncOperationTracker {
    operations: HashMap<OperationId, WorkspaceId>,
    current: Option<WorkspaceId>,
}

impl AsyncOperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `operation_id` with `workspace_id`, replacing any earlier
    /// association. Returns the workspace id for call-site chaining.
    pub fn start_operation(&mut self, operation_id: OperationId, workspace_id: WorkspaceId) -> WorkspaceId {
        debug!(operation = %operation_id, workspace = %workspace_id, "operation started");
        self.operations.insert(operation_id, workspace_id.clone());
        workspace_id
    }

    pub fn get_operation_workspace(&self, operation_id: &OperationId) -> Option<&WorkspaceId> {
        self.operations.get(operation_id)
    }

    /// Forget `operation_id`. Idempotent; returns whether it was tracked.
    ///
    /// If the single-slot pointer named the ended operation's workspace and no
    /// other operation still targets it, the pointer moves to the sole
    /// remaining operation, or is cleared.
    pub fn end_operation(&mut self, operation_id: &OperationId) -> bool {
        let Some(workspace_id) = self.operations.remove(operation_id) else {
            return false;
        };
        debug!(operation = %operation_id, workspace = %workspace_id, "operation ended");

        let still_targeted = self.operations.values().any(|target| *target == workspace_id);
        if self.current.as_ref() == Some(&workspace_id) && !still_targeted {
            self.current = self.sole_operation_workspace().cloned();
        }
        true
    }

    /// Single-slot fallback target for events that carry no operation id.
    pub fn set_current_workspace(&mut self, workspace_id: Option<WorkspaceId>) {
        self.current = workspace_id;
    }

    pub fn current_workspace(&self) -> Option<&WorkspaceId> {
        self.current.as_ref()
    }

    pub fn in_flight(&self) -> usize {
        self.operations.len()
    }

    fn sole_operation_workspace(&self) -> Option<&WorkspaceId> {
        let mut targets = self.operations.values();
        match (targets.next(), targets.next()) {
            (Some(workspace_id), None) => Some(workspace_id),
            _ => None,
        }
    }

    /// Target workspace for an event.
    ///
    /// With an operation id only the registry is consulted. Without one: the
    /// workspace of the only operation in flight, or the single-slot pointer
    /// when nothing is in flight. Overlapping operations cannot be told apart,
    /// so untagged events are refused while several are in flight.
    pub fn resolve(&self, operation_id: Option<&OperationId>) -> Option<WorkspaceId> {
        match operation_id {
            Some(operation_id) => self.get_operation_workspace(operation_id).cloned(),
            None if self.operations.is_empty() => self.current.clone(),
            None if self.operations.len() == 1 => self.sole_operation_workspace().cloned(),
            None => {
                warn!(
                    in_flight = self.operations.len(),
                    "refusing to route untagged event while several operations are in flight"
                );
                None
            }
        }
    }
}
