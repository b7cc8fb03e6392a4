//! Typed read access over an untyped manifest tree.
//!
//! Every lookup answers with an explicit [`FieldError`] instead of a silent
//! default, so extractors decide per field whether absence is fatal,
//! skippable or defaulted.

use pkg_types::Error;
use pkg_types::workload::OpaqueMap;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("{0} is missing")]
    Missing(String),
    #[error("{path} is not a {expected}")]
    WrongType { path: String, expected: &'static str },
}

impl FieldError {
    pub fn is_missing(&self) -> bool {
        matches!(self, FieldError::Missing(_))
    }
}

/// Where a document came from: the stream or file name and its position in it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Origin {
    pub name: String,
    pub index: Option<usize>,
}

impl Origin {
    pub fn new(name: impl Into<String>, index: Option<usize>) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}#{}", self.name, index),
            None => f.write_str(&self.name),
        }
    }
}

fn join(path: &[&str]) -> String {
    path.join(".")
}

// ─── Node ──────────────────────────────────────────────────────

/// Borrowed view of one value inside a document.
#[derive(Debug, Clone, Copy)]
pub struct Node<'a> {
    value: &'a Value,
}

impl<'a> Node<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        self.value.as_str()
    }

    pub fn is_mapping(&self) -> bool {
        self.value.is_mapping()
    }

    /// Walk `path` through nested mappings. An explicit `null` counts as missing.
    pub fn get(&self, path: &[&str]) -> Result<Node<'a>, FieldError> {
        let mut current = self.value;
        for (depth, key) in path.iter().enumerate() {
            let mapping = current.as_mapping().ok_or_else(|| FieldError::WrongType {
                path: join(&path[..depth]),
                expected: "mapping",
            })?;
            current = match mapping.get(*key) {
                Some(Value::Null) | None => return Err(FieldError::Missing(join(&path[..=depth]))),
                Some(v) => v,
            };
        }
        Ok(Node { value: current })
    }

    pub fn str(&self, path: &[&str]) -> Result<&'a str, FieldError> {
        self.get(path)?.as_str().ok_or_else(|| FieldError::WrongType {
            path: join(path),
            expected: "string",
        })
    }

    pub fn bool(&self, path: &[&str]) -> Result<bool, FieldError> {
        self.get(path)?.value.as_bool().ok_or_else(|| FieldError::WrongType {
            path: join(path),
            expected: "boolean",
        })
    }

    pub fn mapping(&self, path: &[&str]) -> Result<Node<'a>, FieldError> {
        let node = self.get(path)?;
        if node.is_mapping() {
            Ok(node)
        } else {
            Err(FieldError::WrongType {
                path: join(path),
                expected: "mapping",
            })
        }
    }

    pub fn sequence(&self, path: &[&str]) -> Result<Vec<Node<'a>>, FieldError> {
        let seq = self.get(path)?.value.as_sequence().ok_or_else(|| FieldError::WrongType {
            path: join(path),
            expected: "sequence",
        })?;
        Ok(seq.iter().map(Node::new).collect())
    }

    /// String entries of a sequence; anything else in it is skipped.
    pub fn string_list(&self, path: &[&str]) -> Result<Vec<String>, FieldError> {
        Ok(self
            .sequence(path)?
            .into_iter()
            .filter_map(|n| n.as_str().map(str::to_string))
            .collect())
    }

    /// String-to-string entries of a mapping; non-string keys or values are dropped.
    pub fn string_map(&self, path: &[&str]) -> Result<BTreeMap<String, String>, FieldError> {
        let node = self.mapping(path)?;
        let mut out = BTreeMap::new();
        if let Some(mapping) = node.value.as_mapping() {
            for (k, v) in mapping {
                if let (Some(k), Some(v)) = (k.as_str(), v.as_str()) {
                    out.insert(k.to_string(), v.to_string());
                }
            }
        }
        Ok(out)
    }

    /// This value as a JSON object, if it is a mapping with string keys.
    pub fn to_json_map(&self) -> Option<OpaqueMap> {
        match serde_json::to_value(self.value).ok()? {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

// ─── Document ──────────────────────────────────────────────────

/// One manifest: its parsed tree, its raw text and where it came from.
#[derive(Debug, Clone)]
pub struct Document {
    value: Value,
    raw: String,
    origin: Origin,
}

impl Document {
    /// Wrap a parsed mapping. Callers guarantee `kind` is present; see the normalizer.
    pub fn new(mapping: Mapping, raw: String, origin: Origin) -> Self {
        Self {
            value: Value::Mapping(mapping),
            raw,
            origin,
        }
    }

    pub fn root(&self) -> Node<'_> {
        Node::new(&self.value)
    }

    /// Source text of the document; re-serialized YAML for a `List` item.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn kind(&self) -> Option<&str> {
        self.root().str(&["kind"]).ok()
    }

    /// `metadata.name`.
    pub fn name(&self) -> Result<&str, FieldError> {
        self.root().str(&["metadata", "name"])
    }

    /// `metadata.namespace`, if declared.
    pub fn namespace(&self) -> Option<&str> {
        self.root()
            .str(&["metadata", "namespace"])
            .ok()
            .filter(|ns| !ns.is_empty())
    }

    /// `metadata.labels`, empty when absent or malformed.
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.root()
            .string_map(&["metadata", "labels"])
            .unwrap_or_default()
    }

    /// `metadata.annotations`, empty when absent or malformed.
    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.root()
            .string_map(&["metadata", "annotations"])
            .unwrap_or_default()
    }

    /// A `ValidationFailed` error naming this document.
    pub fn invalid(&self, reason: impl ToString) -> Error {
        Error::validation(&self.origin.to_string(), reason)
    }
}
