//! Parser turning the declarative exec tree into typed nodes.
//!
//! An element is either a plugin tag (string) or an if-block (mapping);
//! anything else fails with the offending position. Bodies recurse. Cycles
//! through `goto` are not detectable here and are bounded at runtime
//! instead.

use serde::Deserialize;
use serde_yaml::Value;

use crate::handler::error::{HandlerError, Result};

/// One step of a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Invoke the named executable.
    Plugin(String),
    /// Conditional sub-sequence with an optional jump.
    If(IfBlock),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfBlock {
    pub conditions: Vec<Condition>,
    pub body: Vec<Node>,
    pub goto: Option<String>,
}

/// A matcher tag with its negation marker already split off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub tag: String,
    pub negated: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IfBlockConfig {
    #[serde(rename = "if")]
    conditions: Vec<String>,
    exec: Vec<Value>,
    goto: Option<String>,
}

/// Parse a raw exec list. `tag` is the owning sequence, used to attribute
/// failures.
pub fn parse_nodes(tag: &str, elements: &[Value]) -> Result<Vec<Node>> {
    let mut out = Vec::with_capacity(elements.len());
    for (position, element) in elements.iter().enumerate() {
        match element {
            Value::String(plugin_tag) => out.push(Node::Plugin(plugin_tag.clone())),
            Value::Mapping(_) => {
                let cfg: IfBlockConfig =
                    crate::handler::weak::from_value(element.clone()).map_err(|e| {
                        HandlerError::invalid_args(
                            tag,
                            format!("bad if-block at position {position}: {e}"),
                        )
                    })?;
                out.push(Node::If(parse_if_block(tag, cfg)?));
            }
            other => {
                return Err(HandlerError::invalid_args(
                    tag,
                    format!(
                        "unexpected element at position {position}: \
                         expected plugin tag or if-block, got {}",
                        shape_name(other)
                    ),
                ));
            }
        }
    }
    Ok(out)
}

fn parse_if_block(tag: &str, cfg: IfBlockConfig) -> Result<IfBlock> {
    let conditions = cfg
        .conditions
        .iter()
        .filter(|t| !t.is_empty())
        .map(|t| match t.strip_prefix('!') {
            Some(rest) => Condition { tag: rest.to_string(), negated: true },
            None => Condition { tag: t.clone(), negated: false },
        })
        .collect();

    let body = parse_nodes(tag, &cfg.exec)?;

    Ok(IfBlock { conditions, body, goto: cfg.goto })
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
