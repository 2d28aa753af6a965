use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use threadspace_common::value::{ErrorNode, HostKind, Node, ObjectNode, SafeSerializer};

fn leaf() -> impl Strategy<Value = Node> {
    prop_oneof![
        Just(Node::Undefined),
        Just(Node::Null),
        any::<bool>().prop_map(Node::Bool),
        (-1_000_000i32..1_000_000).prop_map(|n| Node::Number(f64::from(n))),
        "[a-zA-Z0-9 _.-]{0,12}".prop_map(Node::String),
        (0i64..4_000_000_000_000).prop_map(|millis| {
            Node::Date(Utc.timestamp_millis_opt(millis).single().expect("millis in range"))
        }),
        ("[A-Za-z]{1,10}", "[a-z ]{0,16}", proptest::option::of("[a-z() ]{0,16}")).prop_map(
            |(name, message, stack)| Node::Error(ErrorNode { name, message, stack })
        ),
        Just(Node::Function("handler".into())),
        Just(Node::Symbol("marker".into())),
        Just(Node::host(HostKind::PendingComputation, "Promise")),
    ]
}

fn class_name() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        3 => Just(None),
        1 => Just(Some("Object".to_string())),
        1 => Just(Some("SessionState".to_string())),
        1 => Just(Some("ReactElement".to_string())),
        1 => Just(Some("URLSearchParams".to_string())),
    ]
}

fn key() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[a-z]{1,6}",
        1 => Just("params".to_string()),
        1 => Just("searchParams".to_string()),
    ]
}

fn node() -> impl Strategy<Value = Node> {
    leaf().prop_recursive(4, 48, 5, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..5).prop_map(Node::array),
            (class_name(), proptest::collection::btree_map(key(), inner, 0..5)).prop_map(
                |(class_name, entries)| Node::object(ObjectNode { class_name, entries })
            ),
        ]
    })
}

fn root() -> impl Strategy<Value = Node> {
    proptest::collection::btree_map(key(), node(), 0..6)
        .prop_map(|entries| Node::object(ObjectNode { class_name: None, entries }))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn cleaning_projection_is_idempotent(value in root()) {
        let serializer = SafeSerializer::default();
        let text = serializer.serialize(&value, None).expect("acyclic value should serialize");
        let parsed: serde_json::Value = serde_json::from_str(&text).expect("output should parse");

        let reparsed = serializer.deep_clone_serializable(&Node::from_json(&parsed));
        let direct = serializer.deep_clone_serializable(&value);
        prop_assert_eq!(reparsed, direct);
    }

    #[test]
    fn cyclic_values_always_serialize(value in root(), indent in 0usize..4) {
        value.set("loop", value.clone());
        let nested = Node::plain_object([("back", value.clone())]);
        value.set("nested", nested);

        let serializer = SafeSerializer::default();
        let text = serializer.serialize(&value, Some(indent));
        prop_assert!(text.is_some());
        prop_assert!(serde_json::from_str::<serde_json::Value>(&text.unwrap()).is_ok());
        prop_assert!(!serializer.is_serializable(&value));
    }
}
