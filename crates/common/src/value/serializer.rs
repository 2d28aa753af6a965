// Cycle-safe JSON projection of arbitrary value trees.
//
// Walks depth-first and tracks the composites on the current path; a
// composite seen again on the same path is a cycle and is replaced instead of
// recursed into. Values that cannot or should not be persisted are dropped:
// functions, symbols, `undefined`, tagged host handles, objects whose class
// name matches the deny-list, and non-plain objects under `params` or
// `searchParams`. The class-name deny-list is a heuristic and only backs up
// the `Host` tagging done by producers.

use std::collections::{BTreeMap, HashSet};

use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use super::{ErrorNode, Node, ObjectNode};

/// Marker written by `serialize` where a cycle was cut.
pub const CIRCULAR_SENTINEL: &str = "[Circular Reference]";

/// Default nesting bound for a single walk.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Widest indent honoured by `serialize`, as in `JSON.stringify`.
const MAX_INDENT: usize = 10;

/// Class-name fragments that identify framework internals and platform
/// wrappers when a producer failed to tag them as `Node::Host`.
pub const DEFAULT_DENIED_CLASS_FRAGMENTS: &[&str] = &[
    "Promise",
    "Thenable",
    "Proxy",
    "Request",
    "Response",
    "Headers",
    "AbortSignal",
    "ReactElement",
    "FiberNode",
];

/// Keys whose value is dropped unless it is plain data.
const PARAMS_KEYS: &[&str] = &["params", "searchParams"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SerializeError {
    #[error("value contains a circular reference")]
    CircularReference,

    #[error("value nesting exceeds the limit of {limit}")]
    DepthExceeded { limit: usize },

    #[error("composite value is mutably borrowed elsewhere")]
    Borrowed,

    #[error("value is a host handle `{0}`")]
    HostHandle(String),

    #[error("json encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializerOptions {
    pub max_depth: usize,
    pub denied_class_fragments: Vec<String>,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            denied_class_fragments: DEFAULT_DENIED_CLASS_FRAGMENTS
                .iter()
                .map(|fragment| (*fragment).to_string())
                .collect(),
        }
    }
}

impl SerializerOptions {
    /// Defaults plus additional deny-list fragments.
    pub fn with_extra_denied<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut options = Self::default();
        for fragment in fragments {
            let fragment = fragment.into();
            if !fragment.is_empty() && !options.denied_class_fragments.contains(&fragment) {
                options.denied_class_fragments.push(fragment);
            }
        }
        options
    }
}

/// Never-throwing serializer for persistence.
#[derive(Debug, Clone, Default)]
pub struct SafeSerializer {
    options: SerializerOptions,
}

/// What the walk does when it re-enters a composite on the current path.
#[derive(Debug, Clone, Copy)]
enum CycleMode {
    Sentinel,
    Null,
    Reject,
}

/// Path-scoped walk state.
struct Walk {
    on_path: HashSet<usize>,
    cycles: CycleMode,
}

impl Walk {
    fn new(cycles: CycleMode) -> Self {
        Self { on_path: HashSet::new(), cycles }
    }
}

impl SafeSerializer {
    pub fn new(options: SerializerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SerializerOptions {
        &self.options
    }

    /// JSON text for `value`, or `None` when the value has no JSON form or
    /// the walk failed. Never panics and always terminates.
    ///
    /// `indent` follows `JSON.stringify`: `None` or `Some(0)` is compact.
    pub fn serialize(&self, value: &Node, indent: Option<usize>) -> Option<String> {
        let projected = match self.project(value) {
            Ok(Some(projected)) => projected,
            Ok(None) => return None,
            Err(error) => {
                debug!(%error, "safe serialization failed");
                return None;
            }
        };

        match encode(&projected, indent.unwrap_or(0)) {
            Ok(text) => Some(text),
            Err(error) => {
                debug!(%error, "safe serialization failed");
                None
            }
        }
    }

    /// JSON projection of `value`; `Ok(None)` means the value is omitted.
    pub fn project(&self, value: &Node) -> Result<Option<Value>, SerializeError> {
        self.project_node(value, &mut Walk::new(CycleMode::Sentinel), 0)
    }

    /// Structural clone with the same omission rules as `serialize`.
    ///
    /// Cycles resolve to `Node::Null` at the point of re-entry. Dates and
    /// errors are normalized exactly as `serialize` writes them. A failed
    /// walk yields `Node::Undefined`; use `try_deep_clone` to observe the
    /// failure.
    pub fn deep_clone_serializable(&self, value: &Node) -> Node {
        match self.try_deep_clone(value) {
            Ok(cloned) => cloned,
            Err(error) => {
                debug!(%error, "safe clone failed");
                Node::Undefined
            }
        }
    }

    pub fn try_deep_clone(&self, value: &Node) -> Result<Node, SerializeError> {
        let mut walk = Walk::new(CycleMode::Null);
        match value {
            // Top-level primitives pass through even when they would be
            // omitted inside a composite.
            Node::Undefined => Ok(Node::Undefined),
            Node::Function(_) | Node::Symbol(_) | Node::Host(_) => Ok(Node::Undefined),
            _ => Ok(self.clone_node(value, &mut walk, 0)?.unwrap_or(Node::Undefined)),
        }
    }

    /// Whether the unguarded path (no cycle cutting, no host filtering)
    /// would succeed on `value`.
    pub fn is_serializable(&self, value: &Node) -> bool {
        let mut walk = Walk::new(CycleMode::Reject);
        self.probe(value, &mut walk, 0).is_ok()
    }

    fn is_denied_class(&self, class_name: &str) -> bool {
        self.options
            .denied_class_fragments
            .iter()
            .any(|fragment| class_name.contains(fragment.as_str()))
    }

    /// Whether the object entry `key: value` is dropped before descending.
    fn skips_entry(&self, key: &str, value: &Node) -> Result<bool, SerializeError> {
        if !PARAMS_KEYS.contains(&key) {
            return Ok(false);
        }
        match value {
            Node::Host(_) => Ok(true),
            Node::Object(object) => {
                let object = object.try_borrow().map_err(|_| SerializeError::Borrowed)?;
                Ok(!object.is_plain())
            }
            _ => Ok(false),
        }
    }

    fn check_depth(&self, depth: usize) -> Result<(), SerializeError> {
        if depth > self.options.max_depth {
            return Err(SerializeError::DepthExceeded { limit: self.options.max_depth });
        }
        Ok(())
    }

    fn project_node(
        &self,
        node: &Node,
        walk: &mut Walk,
        depth: usize,
    ) -> Result<Option<Value>, SerializeError> {
        self.check_depth(depth)?;

        let projected = match node {
            Node::Undefined | Node::Function(_) | Node::Symbol(_) | Node::Host(_) => None,
            Node::Null => Some(Value::Null),
            Node::Bool(flag) => Some(Value::Bool(*flag)),
            Node::Number(number) => Some(json_number(*number)),
            Node::String(text) => Some(Value::String(text.clone())),
            Node::Date(at) => Some(Value::String(iso_timestamp(at))),
            Node::Error(error) => Some(error_record(error)),
            Node::Array(items) => {
                let Some(key) = self.enter(node, walk)? else {
                    return Ok(self.cycle_value(walk));
                };
                let items = items.try_borrow().map_err(|_| SerializeError::Borrowed);
                let result = items.and_then(|items| {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items.iter() {
                        out.push(self.project_node(item, walk, depth + 1)?.unwrap_or(Value::Null));
                    }
                    Ok(Value::Array(out))
                });
                walk.on_path.remove(&key);
                Some(result?)
            }
            Node::Object(object) => {
                let Some(key) = self.enter(node, walk)? else {
                    return Ok(self.cycle_value(walk));
                };
                let object = object.try_borrow().map_err(|_| SerializeError::Borrowed);
                let result = object.and_then(|object| {
                    if self.object_is_denied(&object) {
                        return Ok(None);
                    }
                    let mut out = Map::new();
                    for (entry_key, entry_value) in &object.entries {
                        if self.skips_entry(entry_key, entry_value)? {
                            continue;
                        }
                        if let Some(projected) = self.project_node(entry_value, walk, depth + 1)? {
                            out.insert(entry_key.clone(), projected);
                        }
                    }
                    Ok(Some(Value::Object(out)))
                });
                walk.on_path.remove(&key);
                result?
            }
        };

        Ok(projected)
    }

    fn clone_node(
        &self,
        node: &Node,
        walk: &mut Walk,
        depth: usize,
    ) -> Result<Option<Node>, SerializeError> {
        self.check_depth(depth)?;

        let cloned = match node {
            Node::Undefined | Node::Function(_) | Node::Symbol(_) | Node::Host(_) => None,
            Node::Null => Some(Node::Null),
            Node::Bool(flag) => Some(Node::Bool(*flag)),
            Node::Number(number) if number.is_finite() => Some(Node::Number(*number)),
            Node::Number(_) => Some(Node::Null),
            Node::String(text) => Some(Node::String(text.clone())),
            Node::Date(at) => Some(Node::String(iso_timestamp(at))),
            Node::Error(error) => Some(Node::from_json(&error_record(error))),
            Node::Array(items) => {
                let Some(key) = self.enter(node, walk)? else {
                    return Ok(Some(Node::Null));
                };
                let items = items.try_borrow().map_err(|_| SerializeError::Borrowed);
                let result = items.and_then(|items| {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items.iter() {
                        out.push(self.clone_node(item, walk, depth + 1)?.unwrap_or(Node::Null));
                    }
                    Ok(Node::array(out))
                });
                walk.on_path.remove(&key);
                Some(result?)
            }
            Node::Object(object) => {
                let Some(key) = self.enter(node, walk)? else {
                    return Ok(Some(Node::Null));
                };
                let object = object.try_borrow().map_err(|_| SerializeError::Borrowed);
                let result = object.and_then(|object| {
                    if self.object_is_denied(&object) {
                        return Ok(None);
                    }
                    let mut entries = BTreeMap::new();
                    for (entry_key, entry_value) in &object.entries {
                        if self.skips_entry(entry_key, entry_value)? {
                            continue;
                        }
                        if let Some(cloned) = self.clone_node(entry_value, walk, depth + 1)? {
                            entries.insert(entry_key.clone(), cloned);
                        }
                    }
                    Ok(Some(Node::object(ObjectNode { class_name: None, entries })))
                });
                walk.on_path.remove(&key);
                result?
            }
        };

        Ok(cloned)
    }

    fn probe(&self, node: &Node, walk: &mut Walk, depth: usize) -> Result<(), SerializeError> {
        self.check_depth(depth)?;

        match node {
            Node::Host(handle) => Err(SerializeError::HostHandle(handle.class_name.clone())),
            Node::Array(items) => {
                let key = self.enter(node, walk)?.ok_or(SerializeError::CircularReference)?;
                let items = items.try_borrow().map_err(|_| SerializeError::Borrowed)?;
                for item in items.iter() {
                    self.probe(item, walk, depth + 1)?;
                }
                walk.on_path.remove(&key);
                Ok(())
            }
            Node::Object(object) => {
                let key = self.enter(node, walk)?.ok_or(SerializeError::CircularReference)?;
                let object = object.try_borrow().map_err(|_| SerializeError::Borrowed)?;
                for entry in object.entries.values() {
                    self.probe(entry, walk, depth + 1)?;
                }
                walk.on_path.remove(&key);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Marks `node` as on the current path. `Ok(None)` means it already was.
    fn enter(&self, node: &Node, walk: &mut Walk) -> Result<Option<usize>, SerializeError> {
        let Some(key) = node.identity() else {
            return Ok(None);
        };
        if !walk.on_path.insert(key) {
            return match walk.cycles {
                CycleMode::Reject => Err(SerializeError::CircularReference),
                CycleMode::Sentinel | CycleMode::Null => Ok(None),
            };
        }
        Ok(Some(key))
    }

    fn cycle_value(&self, walk: &Walk) -> Option<Value> {
        match walk.cycles {
            CycleMode::Sentinel => Some(Value::String(CIRCULAR_SENTINEL.to_string())),
            CycleMode::Null | CycleMode::Reject => Some(Value::Null),
        }
    }

    fn object_is_denied(&self, object: &ObjectNode) -> bool {
        object.class_name.as_deref().is_some_and(|class_name| self.is_denied_class(class_name))
    }
}

fn iso_timestamp(at: &chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Largest integer an `f64` holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Integral values are written without a fraction (`1`, not `1.0`).
/// Non-finite values become `null`.
fn json_number(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() <= MAX_SAFE_INTEGER {
        return Value::from(number as i64);
    }
    serde_json::Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null)
}

fn error_record(error: &ErrorNode) -> Value {
    let mut record = Map::new();
    record.insert("name".into(), Value::String(error.name.clone()));
    record.insert("message".into(), Value::String(error.message.clone()));
    if let Some(stack) = &error.stack {
        record.insert("stack".into(), Value::String(stack.clone()));
    }
    Value::Object(record)
}

fn encode(value: &Value, indent: usize) -> Result<String, SerializeError> {
    let indent = indent.min(MAX_INDENT);
    if indent == 0 {
        return serde_json::to_string(value).map_err(|error| SerializeError::Encode(error.to_string()));
    }

    let pad = " ".repeat(indent);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(pad.as_bytes());
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|error| SerializeError::Encode(error.to_string()))?;
    String::from_utf8(out).map_err(|error| SerializeError::Encode(error.to_string()))
}
