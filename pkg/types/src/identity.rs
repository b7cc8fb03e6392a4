use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A ServiceAccount as declared in a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub name: String,
    pub namespace: String,
    /// `automountServiceAccountToken`; false unless explicitly `true`.
    #[serde(default)]
    pub automount_token: bool,
    /// Names from `secrets[].name`, in declaration order.
    #[serde(default)]
    pub secrets: Vec<String>,
    /// Names from `imagePullSecrets[].name`, in declaration order.
    #[serde(default)]
    pub image_pull_secrets: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// (name, namespace) key under which identities are deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    pub name: String,
    pub namespace: String,
}

impl Identity {
    pub fn key(&self) -> IdentityKey {
        IdentityKey {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
