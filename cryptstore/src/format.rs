//! Payload formats: how caller bytes become a document and back.

use crate::error::{ProxyError, ProxyResult};
use crate::tree::{Branch, Document, Leaf, Node};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the single leaf holding a binary payload.
pub const DATA_KEY: &str = "data";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// Opaque bytes stored in one `data` leaf.
    #[default]
    Binary,
    /// A JSON object whose structure becomes the document tree.
    Json,
}

impl PayloadFormat {
    pub fn parse(&self, payload: &[u8]) -> ProxyResult<Document> {
        match self {
            PayloadFormat::Binary => {
                if payload.is_empty() {
                    return Ok(Document::default());
                }
                Ok(Document::new(vec![vec![(
                    DATA_KEY.to_string(),
                    Node::Leaf(Leaf::Bytes(payload.to_vec())),
                )]]))
            }
            PayloadFormat::Json => {
                let value: Value = serde_json::from_slice(payload)
                    .map_err(|e| ProxyError::MalformedInput(format!("invalid JSON: {e}")))?;
                match value {
                    Value::Object(map) if map.is_empty() => Ok(Document::default()),
                    Value::Object(map) => Ok(Document::new(vec![branch_from_map(map)])),
                    other => Err(ProxyError::MalformedInput(format!(
                        "expected a JSON object, got {}",
                        kind_of(&other)
                    ))),
                }
            }
        }
    }

    pub fn emit(&self, document: &Document) -> ProxyResult<Vec<u8>> {
        let first = document
            .branches
            .first()
            .ok_or_else(|| ProxyError::Decode("document has no branches".to_string()))?;

        match self {
            PayloadFormat::Binary => match first.iter().find(|(k, _)| k == DATA_KEY) {
                Some((_, Node::Leaf(Leaf::Bytes(bytes)))) => Ok(bytes.clone()),
                Some((_, Node::Leaf(Leaf::String(text)))) => Ok(text.clone().into_bytes()),
                _ => Err(ProxyError::Decode(format!(
                    "binary document has no {DATA_KEY:?} leaf"
                ))),
            },
            PayloadFormat::Json => serde_json::to_vec(&map_from_branch(first))
                .map_err(|e| ProxyError::Encode(e.to_string())),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn branch_from_map(map: Map<String, Value>) -> Branch {
    map.into_iter().map(|(k, v)| (k, node_from_value(v))).collect()
}

fn node_from_value(value: Value) -> Node {
    match value {
        Value::Null => Node::Leaf(Leaf::Null),
        Value::Bool(b) => Node::Leaf(Leaf::Bool(b)),
        Value::Number(n) => Node::Leaf(Leaf::Number(n)),
        Value::String(s) => Node::Leaf(Leaf::String(s)),
        Value::Array(items) => Node::List(items.into_iter().map(node_from_value).collect()),
        Value::Object(map) => Node::Map(branch_from_map(map)),
    }
}

fn map_from_branch(branch: &Branch) -> Value {
    Value::Object(
        branch
            .iter()
            .map(|(k, node)| (k.clone(), value_from_node(node)))
            .collect(),
    )
}

fn value_from_node(node: &Node) -> Value {
    match node {
        Node::Leaf(Leaf::Null) => Value::Null,
        Node::Leaf(Leaf::Bool(b)) => Value::Bool(*b),
        Node::Leaf(Leaf::Number(n)) => Value::Number(n.clone()),
        Node::Leaf(Leaf::String(s)) => Value::String(s.clone()),
        Node::Leaf(Leaf::Bytes(b)) => Value::String(String::from_utf8_lossy(b).into_owned()),
        Node::List(items) => Value::Array(items.iter().map(value_from_node).collect()),
        Node::Map(entries) => map_from_branch(entries),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn binary_payload_is_one_data_leaf() {
        let doc = PayloadFormat::Binary.parse(b"\x00cert\xff").unwrap();
        assert_eq!(doc.branches.len(), 1);
        assert_eq!(PayloadFormat::Binary.emit(&doc).unwrap(), b"\x00cert\xff");
    }

    #[test]
    fn empty_binary_payload_has_no_branches() {
        assert!(PayloadFormat::Binary.parse(b"").unwrap().is_empty());
    }

    #[test]
    fn json_object_round_trips() {
        let input = json!({
            "domain": "example.com",
            "sans": ["a.example.com", "b.example.com"],
            "meta": { "renewals": 3, "staging": false, "note": null, "ratio": 0.25 }
        });
        let doc = PayloadFormat::Json.parse(&serde_json::to_vec(&input).unwrap()).unwrap();
        let output: Value = serde_json::from_slice(&PayloadFormat::Json.emit(&doc).unwrap()).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn json_rejects_non_objects_and_garbage() {
        for payload in [&b"[1,2]"[..], &b"\"text\""[..], &b"42"[..], &b"{not json"[..]] {
            assert!(matches!(
                PayloadFormat::Json.parse(payload),
                Err(ProxyError::MalformedInput(_))
            ));
        }
    }

    #[test]
    fn empty_json_object_has_no_branches() {
        assert!(PayloadFormat::Json.parse(b"{}").unwrap().is_empty());
    }

    #[test]
    fn format_names() {
        assert_eq!(serde_json::to_value(PayloadFormat::Json).unwrap(), json!("json"));
        assert_eq!(PayloadFormat::default(), PayloadFormat::Binary);
    }
}
