use serde::{Deserialize, Serialize};

/// Options threaded explicitly into the normalizer, the dispatcher and every extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractOptions {
    /// Abort the whole call on the first malformed document instead of
    /// skipping it with a warning.
    #[serde(default)]
    pub strict: bool,
    /// Copy labels and annotations onto identities and workloads.
    #[serde(default = "default_include_metadata")]
    pub include_metadata: bool,
    /// Namespace applied to documents that omit `metadata.namespace`.
    #[serde(default)]
    pub default_namespace: Option<String>,
    /// Follow symlinks while walking a directory source.
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_metadata() -> bool {
    true
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            strict: false,
            include_metadata: true,
            default_namespace: None,
            follow_symlinks: false,
        }
    }
}

impl ExtractOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = Some(namespace.into());
        self
    }
}

/// Helm renderer settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelmConfig {
    #[serde(default)]
    pub binary: Option<String>,
    #[serde(default, alias = "release-name")]
    pub release_name: Option<String>,
    /// Extra values files passed as `--values`.
    #[serde(default)]
    pub values: Vec<String>,
}

/// Kustomize renderer settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KustomizeConfig {
    #[serde(default)]
    pub binary: Option<String>,
}

/// CLI configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// strict: true
/// include-metadata: false
/// namespace: team-a
/// follow-symlinks: true
/// helm:
///   binary: /usr/local/bin/helm
///   release-name: audit
///   values: [values-prod.yaml]
/// kustomize:
///   binary: kustomize
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub strict: Option<bool>,
    #[serde(default, alias = "include-metadata")]
    pub include_metadata: Option<bool>,
    #[serde(default, alias = "namespace", alias = "default-namespace")]
    pub default_namespace: Option<String>,
    #[serde(default, alias = "follow-symlinks")]
    pub follow_symlinks: Option<bool>,
    #[serde(default)]
    pub helm: HelmConfig,
    #[serde(default)]
    pub kustomize: KustomizeConfig,
}

impl ConfigFile {
    /// Options from this file, falling back to the built-in defaults.
    pub fn extract_options(&self) -> ExtractOptions {
        let defaults = ExtractOptions::default();
        ExtractOptions {
            strict: self.strict.unwrap_or(defaults.strict),
            include_metadata: self.include_metadata.unwrap_or(defaults.include_metadata),
            default_namespace: self.default_namespace.clone(),
            follow_symlinks: self.follow_symlinks.unwrap_or(defaults.follow_symlinks),
        }
    }
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}
