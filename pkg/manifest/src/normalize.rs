//! Multi-document stream → [`Document`] list.

use pkg_constants::kinds;
use pkg_types::config::ExtractOptions;
use pkg_types::{Error, Result};
use serde_yaml::{Mapping, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::document::{Document, Origin};
use crate::tolerate;

/// Comment Helm writes above every rendered template.
const HELM_SOURCE_PREFIX: &str = "# Source: ";

/// A named byte blob as handed over by an aggregator or a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawManifest {
    pub name: String,
    pub content: Vec<u8>,
}

impl RawManifest {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Documents that survived normalization plus what was skipped on the way.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub documents: Vec<Document>,
    pub warnings: Vec<String>,
}

impl Normalized {
    pub fn extend(&mut self, other: Normalized) {
        self.documents.extend(other.documents);
        self.warnings.extend(other.warnings);
    }
}

/// Splits byte streams into documents under a strict or lenient policy.
#[derive(Debug, Clone)]
pub struct Normalizer {
    options: ExtractOptions,
    cancel: CancellationToken,
}

impl Normalizer {
    pub fn new(options: ExtractOptions) -> Self {
        Self {
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Normalize several blobs in order.
    pub fn parse_all(&self, manifests: &[RawManifest]) -> Result<Normalized> {
        let mut out = Normalized::default();
        for manifest in manifests {
            out.extend(self.parse(&manifest.name, &manifest.content)?);
        }
        Ok(out)
    }

    /// Normalize one stream of `---`-separated documents.
    pub fn parse(&self, name: &str, content: &[u8]) -> Result<Normalized> {
        let mut out = Normalized::default();
        let text = match std::str::from_utf8(content) {
            Ok(text) => text,
            Err(e) => {
                tolerate(&self.options, Error::invalid_format(name, e), &mut out.warnings)?;
                return Ok(out);
            }
        };

        for (index, chunk) in split_documents(text).into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if is_blank(chunk) {
                continue;
            }
            let origin = Origin::new(source_comment(chunk).unwrap_or(name), Some(index));
            match serde_yaml::from_str::<Value>(chunk) {
                Ok(Value::Null) => {}
                Ok(Value::Mapping(mapping)) if mapping.is_empty() => {}
                Ok(Value::Mapping(mapping)) => {
                    self.accept(mapping, chunk.to_string(), origin, &mut out)?
                }
                Ok(_) => tolerate(
                    &self.options,
                    Error::invalid_format(&origin.to_string(), "top level is not a mapping"),
                    &mut out.warnings,
                )?,
                Err(e) => tolerate(
                    &self.options,
                    Error::invalid_format(&origin.to_string(), e),
                    &mut out.warnings,
                )?,
            }
        }

        debug!(
            "Normalized {}: {} documents, {} warnings",
            name,
            out.documents.len(),
            out.warnings.len()
        );
        Ok(out)
    }

    fn accept(&self, mapping: Mapping, raw: String, origin: Origin, out: &mut Normalized) -> Result<()> {
        let kind = match mapping.get("kind").and_then(Value::as_str) {
            Some(kind) => kind.to_string(),
            None => {
                return tolerate(
                    &self.options,
                    Error::validation(&origin.to_string(), "kind is missing"),
                    &mut out.warnings,
                );
            }
        };

        if is_list_kind(&kind)
            && let Some(Value::Sequence(items)) = mapping.get("items")
        {
            for (i, item) in items.iter().enumerate() {
                let item_origin = Origin::new(format!("{}/items[{}]", origin, i), None);
                match item {
                    // Items have no source slice of their own; their raw text is re-serialized.
                    Value::Mapping(m) => match serde_yaml::to_string(item) {
                        Ok(raw) => self.accept(m.clone(), raw, item_origin, out)?,
                        Err(e) => tolerate(
                            &self.options,
                            Error::invalid_format(&item_origin.to_string(), e),
                            &mut out.warnings,
                        )?,
                    },
                    _ => tolerate(
                        &self.options,
                        Error::invalid_format(&item_origin.to_string(), "list item is not a mapping"),
                        &mut out.warnings,
                    )?,
                }
            }
            return Ok(());
        }

        out.documents.push(Document::new(mapping, raw, origin));
        Ok(())
    }
}

fn is_list_kind(kind: &str) -> bool {
    kind == kinds::LIST || (kind.len() > kinds::LIST_SUFFIX.len() && kind.ends_with(kinds::LIST_SUFFIX))
}

/// Split at `---` document markers (and `...` end markers) that start a line.
///
/// Chunks are slices of `text`, so line endings and inline content after a
/// `---` marker are kept byte-for-byte.
pub fn split_documents(text: &str) -> Vec<&str> {
    let mut docs = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed.starts_with("--- ") {
            docs.push(&text[start..line_start]);
            let rest = line[3..].trim_start();
            start = if rest.is_empty() || rest.starts_with('#') {
                offset
            } else {
                offset - rest.len()
            };
        } else if trimmed == "..." {
            docs.push(&text[start..line_start]);
            start = offset;
        }
    }
    docs.push(&text[start..]);
    docs
}

/// Only whitespace, comments and `%` directives.
fn is_blank(chunk: &str) -> bool {
    chunk
        .lines()
        .map(str::trim)
        .all(|l| l.is_empty() || l.starts_with('#') || l.starts_with('%'))
}

fn source_comment(chunk: &str) -> Option<&str> {
    chunk
        .lines()
        .find_map(|l| l.trim().strip_prefix(HELM_SOURCE_PREFIX))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = "\
apiVersion: v1
kind: ServiceAccount
metadata:
  name: sa1
---
# only a comment
---
apiVersion: rbac.authorization.k8s.io/v1
kind: Role
metadata:
  name: pod-reader
  namespace: ns1
";

    fn lenient() -> Normalizer {
        Normalizer::new(ExtractOptions::default())
    }

    fn strict() -> Normalizer {
        Normalizer::new(ExtractOptions::strict())
    }

    #[test]
    fn splits_and_skips_empty_documents() {
        let out = lenient().parse("stream.yaml", STREAM.as_bytes()).unwrap();
        let kinds: Vec<_> = out.documents.iter().map(|d| d.kind().unwrap()).collect();
        assert_eq!(kinds, vec!["ServiceAccount", "Role"]);
        assert!(out.warnings.is_empty());
        assert_eq!(out.documents[1].origin().to_string(), "stream.yaml#2");
        assert!(out.documents[1].raw().contains("pod-reader"));
    }

    #[test]
    fn indented_separator_is_content() {
        let text = "kind: ConfigMap\nmetadata:\n  name: c\ndata:\n  body: |\n    ---\n    nested\n";
        let docs = split_documents(text);
        assert_eq!(docs.len(), 1);
        let out = lenient().parse("cm.yaml", text.as_bytes()).unwrap();
        assert_eq!(out.documents.len(), 1);
    }

    #[test]
    fn lenient_mode_warns_and_continues() {
        let text = "kind: Role\nmetadata: [unclosed\n---\nmetadata:\n  name: nokind\n---\nkind: Pod\nmetadata:\n  name: p\n";
        let out = lenient().parse("bad.yaml", text.as_bytes()).unwrap();
        assert_eq!(out.documents.len(), 1);
        assert_eq!(out.documents[0].kind(), Some("Pod"));
        assert_eq!(out.warnings.len(), 2);
        assert!(out.warnings[1].contains("kind is missing"));
    }

    #[test]
    fn strict_mode_fails_on_first_problem() {
        let text = "kind: Pod\nmetadata:\n  name: p\n---\nmetadata:\n  name: nokind\n";
        let err = strict().parse("bad.yaml", text.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::ValidationFailed { .. }));

        let err = strict().parse("bad.yaml", b"- just\n- a list\n").unwrap_err();
        assert!(matches!(err, Error::InvalidFormat { .. }));
    }

    #[test]
    fn non_utf8_input_is_invalid_format() {
        let out = lenient().parse("bin.yaml", &[0xff, 0xfe, 0x00]).unwrap();
        assert!(out.documents.is_empty());
        assert_eq!(out.warnings.len(), 1);
        assert!(strict().parse("bin.yaml", &[0xff, 0xfe]).is_err());
    }

    #[test]
    fn list_documents_are_expanded() {
        let text = "\
apiVersion: v1
kind: List
items:
  - kind: ServiceAccount
    metadata:
      name: a
  - kind: ServiceAccount
    metadata:
      name: b
";
        let out = lenient().parse("list.yaml", text.as_bytes()).unwrap();
        let names: Vec<_> = out.documents.iter().map(|d| d.name().unwrap()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(out.documents[1].origin().name, "list.yaml#0/items[1]");
    }

    #[test]
    fn helm_source_comment_names_the_document() {
        let text = "---\n# Source: app/templates/sa.yaml\nkind: ServiceAccount\nmetadata:\n  name: app\n";
        let out = lenient().parse("helm", text.as_bytes()).unwrap();
        assert_eq!(out.documents[0].origin().name, "app/templates/sa.yaml");
    }

    #[test]
    fn cancelled_parse_returns_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = lenient()
            .with_cancellation(cancel)
            .parse("stream.yaml", STREAM.as_bytes())
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn empty_mapping_is_not_a_document() {
        let text = "kind: Pod\nmetadata: {name: p}\n---\n{}\n";
        let out = lenient().parse("empty.yaml", text.as_bytes()).unwrap();
        assert_eq!(out.documents.len(), 1);
        assert!(out.warnings.is_empty());

        let out = strict().parse("empty.yaml", text.as_bytes()).unwrap();
        assert_eq!(out.documents.len(), 1);
        assert!(strict().parse("only.yaml", b"{}\n").unwrap().documents.is_empty());
    }

    #[test]
    fn raw_text_is_byte_exact() {
        let text = "kind: Role\r\nmetadata:\r\n  name: r\r\n---\r\nkind: Pod\r\nmetadata:\r\n  name: p\r\n";
        let out = strict().parse("crlf.yaml", text.as_bytes()).unwrap();
        assert_eq!(out.documents.len(), 2);
        assert_eq!(out.documents[0].raw(), "kind: Role\r\nmetadata:\r\n  name: r\r\n");
        assert_eq!(out.documents[1].raw(), "kind: Pod\r\nmetadata:\r\n  name: p\r\n");
        assert_eq!(out.documents[1].name(), Ok("p"));

        let docs = split_documents("--- kind: Pod\n...\n");
        assert_eq!(docs, vec!["", "kind: Pod\n", ""]);
    }

    #[test]
    fn directives_before_the_first_marker_are_skipped() {
        let text = "%YAML 1.2\n---\nkind: Pod\nmetadata: {name: p}\n";
        let out = strict().parse("directive.yaml", text.as_bytes()).unwrap();
        assert_eq!(out.documents.len(), 1);
        assert!(out.warnings.is_empty());
        assert_eq!(out.documents[0].origin().to_string(), "directive.yaml#1");

        let out = lenient().parse("directive.yaml", text.as_bytes()).unwrap();
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn parse_all_keeps_order() {
        let manifests = vec![
            RawManifest::new("b.yaml", "kind: Role\nmetadata:\n  name: b\n"),
            RawManifest::new("a.yaml", "kind: Role\nmetadata:\n  name: a\n"),
        ];
        let out = lenient().parse_all(&manifests).unwrap();
        let names: Vec<_> = out.documents.iter().map(|d| d.name().unwrap()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
