//! Minimal JSON document model for historian messages.
//!
//! Every line received from the historian is parsed into a [`Node`] tree.
//! The tree is owned strictly top-down: containers own their children and
//! nothing points back up. Dictionaries keep their entries in wire order and
//! do not deduplicate keys; lookups return the first match.
//!
//! Lookups never fail loudly. A missing key, a lookup on something that is
//! not a dictionary and a value of the wrong type all come back as `None`,
//! and callers are expected to treat those cases the same way:
//!
//! ```ignore
//! use cyberblades_ui::jsondom;
//!
//! let doc = jsondom::parse(r#"{"status":{"connection":{"connected_to_beatsaber":true}}}"#)?;
//! let ready = doc
//!     .lookup(&["status", "connection"])
//!     .and_then(|conn| conn.get_bool("connected_to_beatsaber"))
//!     .unwrap_or(false);
//! ```

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use thiserror::Error;

/// Marker used to recognise the NUL rejection inside serde_json's error text.
const EMBEDDED_NUL: &str = "strings containing NUL are not supported";

/// A single value in a parsed document.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Node>),
    /// Ordered key/value entries. Duplicate keys are kept as received.
    Dict(Vec<(String, Node)>),
}

/// Errors from [`parse`]. Parsing fails as a unit, never with a partial tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The input was empty or whitespace only.
    #[error("empty document")]
    Empty,

    /// A string or key contained a NUL character.
    #[error("document contains a string with an embedded NUL character")]
    EmbeddedNul,

    /// Malformed JSON (or nesting deeper than the parser accepts).
    #[error("malformed document: {0}")]
    Syntax(String),
}

/// Errors from indexed array access.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("index {index} out of range for array of length {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("indexed access on a {0} node")]
    NotAnArray(&'static str),
}

/// Parse one line of text into a document tree.
pub fn parse(text: &str) -> Result<Node, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    serde_json::from_str::<Node>(text).map_err(|err| {
        let message = err.to_string();
        if message.starts_with(EMBEDDED_NUL) {
            ParseError::EmbeddedNul
        } else {
            ParseError::Syntax(message)
        }
    })
}

impl Node {
    /// Short type name, used in log lines and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "boolean",
            Node::Int(_) => "integer",
            Node::Float(_) => "float",
            Node::Str(_) => "string",
            Node::Array(_) => "array",
            Node::Dict(_) => "dict",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    pub fn is_dict(&self) -> bool {
        matches!(self, Node::Dict(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Floats, and integers widened to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::Float(value) => Some(*value),
            Node::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Node]> {
        match self {
            Node::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Look up `key` in a dict node. First match wins.
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Dict(entries) => entries
                .iter()
                .find(|(entry_key, _)| entry_key == key)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Follow a chain of dict keys, e.g. `["status", "connection"]`.
    pub fn lookup(&self, path: &[&str]) -> Option<&Node> {
        path.iter().try_fold(self, |node, key| node.get(key))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Node::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Node::as_i64)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Node::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Node::as_bool)
    }

    /// The child under `key` if it is itself a dict.
    pub fn get_dict(&self, key: &str) -> Option<&Node> {
        self.get(key).filter(|node| node.is_dict())
    }

    /// The child under `key` if it is an array.
    pub fn get_array(&self, key: &str) -> Option<&Node> {
        self.get(key).filter(|node| matches!(node, Node::Array(_)))
    }

    /// Number of elements of an array or entries of a dict; zero otherwise.
    pub fn len(&self) -> usize {
        match self {
            Node::Array(items) => items.len(),
            Node::Dict(entries) => entries.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `index` of an array node.
    pub fn item(&self, index: usize) -> Result<&Node, IndexError> {
        match self {
            Node::Array(items) => items.get(index).ok_or(IndexError::OutOfRange {
                index,
                len: items.len(),
            }),
            other => Err(IndexError::NotAnArray(other.kind())),
        }
    }
}

struct NodeVisitor;

impl NodeVisitor {
    fn string<E: de::Error>(value: String) -> Result<Node, E> {
        if value.contains('\0') {
            return Err(E::custom(EMBEDDED_NUL));
        }
        Ok(Node::Str(value))
    }
}

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON value")
    }

    fn visit_unit<E>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_none<E>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_bool<E>(self, value: bool) -> Result<Node, E> {
        Ok(Node::Bool(value))
    }

    fn visit_i64<E>(self, value: i64) -> Result<Node, E> {
        Ok(Node::Int(value))
    }

    fn visit_u64<E>(self, value: u64) -> Result<Node, E> {
        // Values past i64::MAX do not fit the integer variant.
        Ok(i64::try_from(value)
            .map(Node::Int)
            .unwrap_or(Node::Float(value as f64)))
    }

    fn visit_f64<E>(self, value: f64) -> Result<Node, E> {
        Ok(Node::Float(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Node, E> {
        Self::string(value.to_owned())
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<Node, E> {
        Self::string(value)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Node, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Node>()? {
            items.push(item);
        }
        Ok(Node::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Node, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(key) = map.next_key::<String>()? {
            if key.contains('\0') {
                return Err(de::Error::custom(EMBEDDED_NUL));
            }
            let value = map.next_value::<Node>()?;
            entries.push((key, value));
        }
        Ok(Node::Dict(entries))
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(NodeVisitor)
    }
}

impl Serialize for Node {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Node::Null => serializer.serialize_unit(),
            Node::Bool(value) => serializer.serialize_bool(*value),
            Node::Int(value) => serializer.serialize_i64(*value),
            Node::Float(value) => serializer.serialize_f64(*value),
            Node::Str(value) => serializer.serialize_str(value),
            Node::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Node::Dict(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

/// Compact single-line JSON, suitable for logging.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{ "foo": "bar", "blah": 12345, "muh": { "x": null, "y": null, "z": 123.456, "yes": true, "no": false, "array": [ null, 123, "foo", [ 3,2,1 ], true, false ] } }"#;

    #[test]
    fn test_parse_nested_document() {
        let doc = parse(SAMPLE).unwrap();

        assert_eq!(doc.get_str("foo"), Some("bar"));
        assert_eq!(doc.get_int("blah"), Some(12345));

        let muh = doc.get_dict("muh").unwrap();
        assert!(muh.get("x").unwrap().is_null());
        assert_eq!(muh.get_float("z"), Some(123.456));
        assert_eq!(muh.get_bool("yes"), Some(true));
        assert_eq!(muh.get_bool("no"), Some(false));

        let array = muh.get_array("array").unwrap();
        assert_eq!(array.len(), 6);
        assert_eq!(array.item(1).unwrap().as_i64(), Some(123));
        assert_eq!(array.item(2).unwrap().as_str(), Some("foo"));
        assert_eq!(
            array.item(3).unwrap(),
            &Node::Array(vec![Node::Int(3), Node::Int(2), Node::Int(1)])
        );
    }

    #[test]
    fn test_dict_preserves_order_and_duplicates() {
        let doc = parse(r#"{"b":1,"a":2,"b":3}"#).unwrap();
        assert_eq!(
            doc,
            Node::Dict(vec![
                ("b".to_string(), Node::Int(1)),
                ("a".to_string(), Node::Int(2)),
                ("b".to_string(), Node::Int(3)),
            ])
        );
        // First match by linear scan
        assert_eq!(doc.get_int("b"), Some(1));
    }

    #[test]
    fn test_scalar_roots() {
        assert_eq!(parse("null").unwrap(), Node::Null);
        assert_eq!(parse("true").unwrap(), Node::Bool(true));
        assert_eq!(parse("-17").unwrap(), Node::Int(-17));
        assert_eq!(parse("2.5").unwrap(), Node::Float(2.5));
        assert_eq!(parse(r#""hi""#).unwrap(), Node::Str("hi".to_string()));
    }

    #[test]
    fn test_huge_unsigned_becomes_float() {
        let doc = parse("18446744073709551615").unwrap();
        assert!(matches!(doc, Node::Float(_)));
    }

    #[test]
    fn test_embedded_nul_rejected() {
        assert_eq!(parse(r#"{"name":"a\u0000b"}"#), Err(ParseError::EmbeddedNul));
        assert_eq!(parse(r#"{"na\u0000me":1}"#), Err(ParseError::EmbeddedNul));
        assert_eq!(
            parse(r#"{"ok":[1,2,{"deep":"x\u0000"}]}"#),
            Err(ParseError::EmbeddedNul)
        );
    }

    #[test]
    fn test_malformed_input_rejected() {
        for text in [
            r#"{"a":1"#,
            r#"{"a":}"#,
            r#"[1,2"#,
            r#"{"a":1} trailing"#,
            "{'a':1}",
            "nope",
        ] {
            let result = parse(text);
            assert!(
                matches!(result, Err(ParseError::Syntax(_))),
                "expected syntax error for {:?}, got {:?}",
                text,
                result
            );
        }
    }

    #[test]
    fn test_empty_input_rejected() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("  \t"), Err(ParseError::Empty));
    }

    #[test]
    fn test_typed_accessors_absent_or_wrong_type() {
        let doc = parse(r#"{"n":1,"s":"x","d":{},"a":[]}"#).unwrap();

        assert_eq!(doc.get_str("n"), None);
        assert_eq!(doc.get_int("s"), None);
        assert_eq!(doc.get_bool("n"), None);
        assert!(doc.get_dict("a").is_none());
        assert!(doc.get_array("d").is_none());
        assert!(doc.get("missing").is_none());

        // Integers widen to floats
        assert_eq!(doc.get_float("n"), Some(1.0));

        // Lookups on non-dicts are simply absent
        assert!(Node::Int(4).get("n").is_none());
        assert!(doc.get_array("a").unwrap().get("x").is_none());
    }

    #[test]
    fn test_lookup_path() {
        let doc = parse(
            r#"{"msgtype":"status","status":{"connection":{"connected_to_beatsaber":true}}}"#,
        )
        .unwrap();

        let flag = doc
            .lookup(&["status", "connection", "connected_to_beatsaber"])
            .and_then(Node::as_bool);
        assert_eq!(flag, Some(true));
        assert!(doc.lookup(&["status", "game"]).is_none());
        assert_eq!(doc.lookup(&[]), Some(&doc));
    }

    #[test]
    fn test_item_out_of_range() {
        let doc = parse("[1,2]").unwrap();
        assert_eq!(
            doc.item(2),
            Err(IndexError::OutOfRange { index: 2, len: 2 })
        );
        assert_eq!(
            Node::Str("x".into()).item(0),
            Err(IndexError::NotAnArray("string"))
        );
    }

    #[test]
    fn test_display_is_compact_json() {
        let doc = parse(r#"{ "a" : [1, 2.5, "x", null], "a": false }"#).unwrap();
        assert_eq!(doc.to_string(), r#"{"a":[1,2.5,"x",null],"a":false}"#);
        assert_eq!(parse(&doc.to_string()).unwrap(), doc);
    }
}
