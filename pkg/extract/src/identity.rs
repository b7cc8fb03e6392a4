use pkg_constants::kinds;
use pkg_manifest::{Document, Node, tolerate};
use pkg_types::config::ExtractOptions;
use pkg_types::identity::{Identity, IdentityKey};
use pkg_types::Result;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{checkpoint, ensure_input};

#[derive(Debug, Clone, Default)]
pub struct IdentityExtraction {
    /// One entry per (name, namespace), ordered by namespace then name.
    pub identities: Vec<Identity>,
    pub warnings: Vec<String>,
}

/// Extracts ServiceAccount identities.
pub struct IdentityExtractor {
    options: ExtractOptions,
    cancel: CancellationToken,
}

impl IdentityExtractor {
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

    pub fn extract(&self, documents: &[Document]) -> Result<IdentityExtraction> {
        ensure_input(documents)?;
        let mut warnings = Vec::new();
        let mut by_key: BTreeMap<(String, String), Identity> = BTreeMap::new();

        for doc in documents {
            checkpoint(&self.cancel)?;
            if doc.kind() != Some(kinds::SERVICE_ACCOUNT) {
                continue;
            }
            match self.read(doc) {
                Ok(identity) => {
                    let IdentityKey { name, namespace } = identity.key();
                    if by_key.insert((namespace, name), identity).is_some() {
                        debug!("ServiceAccount redeclared in {}, keeping the later one", doc.origin());
                    }
                }
                Err(e) => tolerate(&self.options, e, &mut warnings)?,
            }
        }

        info!("Extracted {} service accounts", by_key.len());
        Ok(IdentityExtraction {
            identities: by_key.into_values().collect(),
            warnings,
        })
    }

    fn read(&self, doc: &Document) -> Result<Identity> {
        let name = doc.name().map_err(|e| doc.invalid(e))?;
        let namespace = doc
            .namespace()
            .or(self.options.default_namespace.as_deref())
            .ok_or_else(|| doc.invalid("metadata.namespace is missing"))?;
        let root = doc.root();

        let (labels, annotations) = if self.options.include_metadata {
            (doc.labels(), doc.annotations())
        } else {
            Default::default()
        };

        Ok(Identity {
            name: name.to_string(),
            namespace: namespace.to_string(),
            automount_token: root.bool(&["automountServiceAccountToken"]).unwrap_or(false),
            secrets: reference_names(root, "secrets"),
            image_pull_secrets: reference_names(root, "imagePullSecrets"),
            labels,
            annotations,
        })
    }
}

/// `<key>[].name`, skipping entries without a string name.
fn reference_names(root: Node<'_>, key: &str) -> Vec<String> {
    root.sequence(&[key])
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| entry.str(&["name"]).ok())
        .map(str::to_string)
        .collect()
}
