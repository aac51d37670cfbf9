//! Plaintext document trees.
//!
//! A [`Document`] is a list of branches; each branch is an ordered map of
//! keys to nodes. Leaves carry typed scalar values. A document only exists
//! in this plaintext form in memory, between parsing and sealing on the
//! write path and between unsealing and emitting on the read path.

use serde_json::Number;

#[derive(Clone, Debug, PartialEq)]
pub enum Leaf {
    Bytes(Vec<u8>),
    String(String),
    Number(Number),
    Bool(bool),
    Null,
}

impl Leaf {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Leaf::Bytes(_) => "bytes",
            Leaf::String(_) => "str",
            Leaf::Number(_) => "num",
            Leaf::Bool(_) => "bool",
            Leaf::Null => "null",
        }
    }

    /// The bytes that get encrypted for this leaf.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Leaf::Bytes(b) => b.clone(),
            Leaf::String(s) => s.as_bytes().to_vec(),
            Leaf::Number(n) => n.to_string().into_bytes(),
            Leaf::Bool(b) => b.to_string().into_bytes(),
            Leaf::Null => Vec::new(),
        }
    }

    /// Rebuilds a leaf from its type tag and decrypted bytes.
    pub fn from_parts(tag: &str, bytes: Vec<u8>) -> Result<Self, String> {
        match tag {
            "bytes" => Ok(Leaf::Bytes(bytes)),
            "str" => String::from_utf8(bytes)
                .map(Leaf::String)
                .map_err(|_| "str leaf is not valid UTF-8".to_string()),
            "num" => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| serde_json::from_str::<Number>(s).ok())
                .map(Leaf::Number)
                .ok_or_else(|| "num leaf is not a number".to_string()),
            "bool" => match bytes.as_slice() {
                b"true" => Ok(Leaf::Bool(true)),
                b"false" => Ok(Leaf::Bool(false)),
                _ => Err("bool leaf is not a boolean".to_string()),
            },
            "null" if bytes.is_empty() => Ok(Leaf::Null),
            "null" => Err("null leaf carries data".to_string()),
            other => Err(format!("unknown leaf type {other:?}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Leaf(Leaf),
    Map(Branch),
    List(Vec<Node>),
}

/// Ordered key/node pairs.
pub type Branch = Vec<(String, Node)>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    pub branches: Vec<Branch>,
}

impl Document {
    pub fn new(branches: Vec<Branch>) -> Self {
        Self { branches }
    }

    /// True when there is no branch with at least one entry.
    pub fn is_empty(&self) -> bool {
        self.branches.iter().all(Vec::is_empty)
    }

    /// Every leaf with its location, in traversal order.
    pub fn leaves(&self) -> Vec<(String, &Leaf)> {
        let mut out = Vec::new();
        for (index, branch) in self.branches.iter().enumerate() {
            let root = index.to_string();
            for (key, node) in branch {
                collect(node, &child_location(&root, key), &mut out);
            }
        }
        out
    }
}

fn collect<'a>(node: &'a Node, location: &str, out: &mut Vec<(String, &'a Leaf)>) {
    match node {
        Node::Leaf(leaf) => out.push((location.to_string(), leaf)),
        Node::Map(entries) => {
            for (key, child) in entries {
                collect(child, &child_location(location, key), out);
            }
        }
        Node::List(items) => {
            for (i, child) in items.iter().enumerate() {
                collect(child, &child_location(location, &i.to_string()), out);
            }
        }
    }
}

/// Appends one path segment, escaped as in a JSON pointer (`~0`, `~1`), so
/// distinct paths never share a location string.
pub fn child_location(parent: &str, segment: &str) -> String {
    let escaped = segment.replace('~', "~0").replace('/', "~1");
    format!("{parent}/{escaped}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(s: &str) -> Node {
        Node::Leaf(Leaf::String(s.to_string()))
    }

    #[test]
    fn empty_branches_make_an_empty_document() {
        assert!(Document::default().is_empty());
        assert!(Document::new(vec![Vec::new()]).is_empty());
        assert!(!Document::new(vec![vec![("k".into(), leaf("v"))]]).is_empty());
    }

    #[test]
    fn leaves_are_located_by_escaped_path() {
        let doc = Document::new(vec![vec![
            ("a/b".into(), leaf("1")),
            (
                "a".into(),
                Node::Map(vec![("b".into(), Node::List(vec![leaf("2")]))]),
            ),
        ]]);
        let locations: Vec<_> = doc.leaves().into_iter().map(|(l, _)| l).collect();
        assert_eq!(locations, vec!["0/a~1b", "0/a/b/0"]);
    }

    #[test]
    fn leaf_parts_round_trip() {
        for leaf in [
            Leaf::Bytes(vec![0, 159, 146, 150]),
            Leaf::String("ünïcode".into()),
            Leaf::Number(Number::from_f64(1.5).unwrap()),
            Leaf::Number((-7).into()),
            Leaf::Bool(false),
            Leaf::Null,
        ] {
            assert_eq!(Leaf::from_parts(leaf.type_tag(), leaf.to_bytes()).unwrap(), leaf);
        }
    }

    #[test]
    fn bad_leaf_parts_are_rejected() {
        assert!(Leaf::from_parts("str", vec![0xff]).is_err());
        assert!(Leaf::from_parts("bool", b"yes".to_vec()).is_err());
        assert!(Leaf::from_parts("date", Vec::new()).is_err());
    }
}
