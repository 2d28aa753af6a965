// Dynamic value model: arbitrary in-memory state handed to persistence,
// including cyclic graphs and platform handles that are not plain data.

pub mod serializer;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::{DateTime, Utc};

pub use serializer::{
    SafeSerializer, SerializeError, SerializerOptions, CIRCULAR_SENTINEL, DEFAULT_MAX_DEPTH,
};

/// Shared, mutable composite. Sharing is what makes cycles representable.
pub type Shared<T> = Rc<RefCell<T>>;

/// One value in an arbitrary state tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    Error(ErrorNode),
    /// Callable value; never serialized. Holds a descriptive name only.
    Function(String),
    Symbol(String),
    /// Platform or framework handle, tagged by the producer.
    Host(HostHandle),
    Array(Shared<Vec<Node>>),
    Object(Shared<ObjectNode>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNode {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    /// Promise-like value whose result is not available yet.
    PendingComputation,
    EnvironmentProxy,
    Request,
    Response,
    FrameworkInternal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostHandle {
    pub kind: HostKind,
    pub class_name: String,
}

/// Keyed composite. `class_name` is `None` for plain data objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectNode {
    pub class_name: Option<String>,
    pub entries: BTreeMap<String, Node>,
}

impl ObjectNode {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn with_class(class_name: impl Into<String>) -> Self {
        Self { class_name: Some(class_name.into()), entries: BTreeMap::new() }
    }

    /// Plain data: no class, or the base `Object` class.
    pub fn is_plain(&self) -> bool {
        matches!(self.class_name.as_deref(), None | Some("Object"))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Node) -> Option<Node> {
        self.entries.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries.get(key)
    }
}

impl Node {
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn array(items: Vec<Node>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(object: ObjectNode) -> Self {
        Self::Object(Rc::new(RefCell::new(object)))
    }

    /// Plain object built from `(key, value)` pairs.
    pub fn plain_object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Node)>,
    {
        let mut object = ObjectNode::plain();
        for (key, value) in entries {
            object.insert(key, value);
        }
        Self::object(object)
    }

    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(ErrorNode { name: name.into(), message: message.into(), stack: None })
    }

    pub fn host(kind: HostKind, class_name: impl Into<String>) -> Self {
        Self::Host(HostHandle { kind, class_name: class_name.into() })
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Object(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Identity of a composite, used for path-scoped cycle detection.
    pub(crate) fn identity(&self) -> Option<usize> {
        match self {
            Self::Array(items) => Some(Rc::as_ptr(items) as *const () as usize),
            Self::Object(object) => Some(Rc::as_ptr(object) as *const () as usize),
            _ => None,
        }
    }

    /// Append `value` to an array node. Returns `false` for non-arrays.
    pub fn push(&self, value: Node) -> bool {
        match self {
            Self::Array(items) => {
                items.borrow_mut().push(value);
                true
            }
            _ => false,
        }
    }

    /// Set `key` on an object node. Returns `false` for non-objects.
    pub fn set(&self, key: impl Into<String>, value: Node) -> bool {
        match self {
            Self::Object(object) => {
                object.borrow_mut().insert(key, value);
                true
            }
            _ => false,
        }
    }

    /// Lift parsed JSON into the value model.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(flag) => Self::Bool(*flag),
            serde_json::Value::Number(number) => {
                number.as_f64().map(Self::Number).unwrap_or(Self::Null)
            }
            serde_json::Value::String(text) => Self::String(text.clone()),
            serde_json::Value::Array(items) => {
                Self::array(items.iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                Self::plain_object(map.iter().map(|(key, item)| (key.clone(), Self::from_json(item))))
            }
        }
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<DateTime<Utc>> for Node {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_builds_plain_composites() {
        let node = Node::from_json(&json!({"a": [1, "two", null], "b": {"c": true}}));
        let Node::Object(object) = &node else { panic!("expected object") };
        let object = object.borrow();
        assert!(object.is_plain());
        assert_eq!(
            object.get("a"),
            Some(&Node::array(vec![Node::Number(1.0), Node::string("two"), Node::Null]))
        );
        assert_eq!(object.get("b"), Some(&Node::plain_object([("c", Node::Bool(true))])));
    }

    #[test]
    fn identity_is_shared_between_clones_of_a_composite() {
        let array = Node::array(Vec::new());
        let alias = array.clone();
        assert_eq!(array.identity(), alias.identity());
        assert_ne!(array.identity(), Node::array(Vec::new()).identity());
        assert_eq!(Node::Null.identity(), None);
    }

    #[test]
    fn object_class_name_controls_plainness() {
        assert!(ObjectNode::plain().is_plain());
        assert!(ObjectNode::with_class("Object").is_plain());
        assert!(!ObjectNode::with_class("URLSearchParams").is_plain());
    }

    #[test]
    fn set_and_push_only_apply_to_matching_composites() {
        let object = Node::plain_object(Vec::<(String, Node)>::new());
        assert!(object.set("k", Node::Bool(true)));
        assert!(!object.push(Node::Null));

        let array = Node::array(Vec::new());
        assert!(array.push(Node::Null));
        assert!(!array.set("k", Node::Null));
    }

    #[test]
    fn optional_values_convert_to_null() {
        assert_eq!(Node::from(None::<&str>), Node::Null);
        assert_eq!(Node::from(Some("x")), Node::string("x"));
    }
}
