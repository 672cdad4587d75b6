use serde_yaml::Value;

use crate::handler::{HandlerError, SharedPluginRegistry};
use crate::sequence;
use crate::sequence::parse::{parse_nodes, Condition, IfBlock, Node};

fn parse_yaml(yaml: &str) -> Vec<Node> {
    let elements: Vec<Value> = serde_yaml::from_str(yaml).unwrap();
    parse_nodes("test", &elements).unwrap()
}

// Serialize a node tree back into the raw config shape
fn to_values(nodes: &[Node]) -> Vec<Value> {
    nodes
        .iter()
        .map(|node| match node {
            Node::Plugin(tag) => Value::String(tag.clone()),
            Node::If(block) => {
                let mut map = serde_yaml::Mapping::new();
                let conditions: Vec<Value> = block
                    .conditions
                    .iter()
                    .map(|c| {
                        let tag = if c.negated {
                            format!("!{}", c.tag)
                        } else {
                            c.tag.clone()
                        };
                        Value::String(tag)
                    })
                    .collect();
                map.insert(Value::from("if"), Value::Sequence(conditions));
                map.insert(Value::from("exec"), Value::Sequence(to_values(&block.body)));
                if let Some(goto) = &block.goto {
                    map.insert(Value::from("goto"), Value::String(goto.clone()));
                }
                Value::Mapping(map)
            }
        })
        .collect()
}

#[test]
fn test_parse_plain_tags() {
    let nodes = parse_yaml("- a\n- b\n");
    assert_eq!(
        nodes,
        vec![Node::Plugin("a".to_string()), Node::Plugin("b".to_string())]
    );
}

#[test]
fn test_parse_if_block() {
    let nodes = parse_yaml(
        "- first\n- if: [matcher_a, \"!matcher_b\"]\n  exec:\n    - inner\n  goto: other\n",
    );

    assert_eq!(
        nodes,
        vec![
            Node::Plugin("first".to_string()),
            Node::If(IfBlock {
                conditions: vec![
                    Condition { tag: "matcher_a".to_string(), negated: false },
                    Condition { tag: "matcher_b".to_string(), negated: true },
                ],
                body: vec![Node::Plugin("inner".to_string())],
                goto: Some("other".to_string()),
            }),
        ]
    );
}

#[test]
fn test_parse_nested_if_blocks() {
    let nodes = parse_yaml(
        "- if: [outer]\n  exec:\n    - if: [inner]\n      exec: [leaf]\n",
    );

    match &nodes[0] {
        Node::If(outer) => match &outer.body[0] {
            Node::If(inner) => {
                assert_eq!(inner.conditions[0].tag, "inner");
                assert_eq!(inner.body, vec![Node::Plugin("leaf".to_string())]);
            }
            other => panic!("expected nested if-block, got {other:?}"),
        },
        other => panic!("expected if-block, got {other:?}"),
    }
}

#[test]
fn test_parse_skips_empty_condition_tags() {
    let nodes = parse_yaml("- if: [\"\", real]\n  exec: [x]\n");
    match &nodes[0] {
        Node::If(block) => {
            assert_eq!(block.conditions.len(), 1);
            assert_eq!(block.conditions[0].tag, "real");
        }
        other => panic!("expected if-block, got {other:?}"),
    }
}

#[test]
fn test_parse_rejects_unexpected_shape_with_position() {
    let elements: Vec<Value> = serde_yaml::from_str("- a\n- 42\n").unwrap();
    let err = parse_nodes("test", &elements).unwrap_err();
    match err {
        HandlerError::InvalidArgs { message, .. } => {
            assert!(message.contains("position 1"), "message: {message}");
            assert!(message.contains("number"), "message: {message}");
        }
        other => panic!("expected InvalidArgs, got {other}"),
    }
}

#[test]
fn test_parse_roundtrip_is_structurally_stable() {
    let nodes = parse_yaml(
        "- a\n- if: [m, \"!n\"]\n  exec:\n    - b\n    - if: [o]\n      exec: [c]\n  goto: d\n- e\n",
    );
    let reparsed = parse_nodes("test", &to_values(&nodes)).unwrap();
    assert_eq!(nodes, reparsed);
}

#[tokio::test]
async fn test_init_rejects_empty_exec() {
    let registry = SharedPluginRegistry::new();
    let args = serde_yaml::from_str("exec: []\n").unwrap();
    let err = sequence::init("seq", args, &registry).unwrap_err();
    assert!(
        matches!(&err, HandlerError::InvalidArgs { tag, .. } if tag == "seq"),
        "unexpected error: {err}"
    );
}
