use async_trait::async_trait;
use pkg_constants::paths::{DEFAULT_HELM_BINARY, DEFAULT_HELM_RELEASE, DEFAULT_KUSTOMIZE_BINARY};
use pkg_manifest::RawManifest;
use pkg_types::config::{HelmConfig, KustomizeConfig};
use pkg_types::{Error, Result};
use tokio::process::Command;
use tracing::{debug, info};

use crate::files::{StagedFiles, materialise};

/// External engine that turns a staged source tree into rendered manifests.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Human-readable name of this renderer.
    fn name(&self) -> &str;

    /// Render the staged tree of `source`. Paths in `files` are relative to the source root.
    async fn render(&self, source: &str, files: &StagedFiles) -> Result<Vec<RawManifest>>;
}

// --- Helm ---

/// Runs `helm template` against a temporary copy of the chart.
#[derive(Debug, Clone)]
pub struct HelmRenderer {
    binary: String,
    release: String,
    values: Vec<String>,
}

impl Default for HelmRenderer {
    fn default() -> Self {
        Self {
            binary: DEFAULT_HELM_BINARY.to_string(),
            release: DEFAULT_HELM_RELEASE.to_string(),
            values: Vec::new(),
        }
    }
}

impl From<&HelmConfig> for HelmRenderer {
    fn from(config: &HelmConfig) -> Self {
        let defaults = Self::default();
        Self {
            binary: config.binary.clone().unwrap_or(defaults.binary),
            release: config.release_name.clone().unwrap_or(defaults.release),
            values: config.values.clone(),
        }
    }
}

impl HelmRenderer {
    fn command(&self, chart: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("template").arg(&self.release).arg(chart);
        for values in &self.values {
            cmd.arg("--values").arg(values);
        }
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Renderer for HelmRenderer {
    fn name(&self) -> &str {
        "helm"
    }

    async fn render(&self, source: &str, files: &StagedFiles) -> Result<Vec<RawManifest>> {
        let dir = stage(files).await?;
        info!("[helm] rendering {} as release {}", source, self.release);
        let output = run(self.command(dir.path()), "helm template").await?;
        Ok(vec![RawManifest::new(source, output)])
    }
}

// --- Kustomize ---

/// Runs `kustomize build` against a temporary copy of the overlay.
#[derive(Debug, Clone)]
pub struct KustomizeRenderer {
    binary: String,
}

impl Default for KustomizeRenderer {
    fn default() -> Self {
        Self {
            binary: DEFAULT_KUSTOMIZE_BINARY.to_string(),
        }
    }
}

impl From<&KustomizeConfig> for KustomizeRenderer {
    fn from(config: &KustomizeConfig) -> Self {
        Self {
            binary: config
                .binary
                .clone()
                .unwrap_or_else(|| DEFAULT_KUSTOMIZE_BINARY.to_string()),
        }
    }
}

#[async_trait]
impl Renderer for KustomizeRenderer {
    fn name(&self) -> &str {
        "kustomize"
    }

    async fn render(&self, source: &str, files: &StagedFiles) -> Result<Vec<RawManifest>> {
        let dir = stage(files).await?;
        info!("[kustomize] building {}", source);
        let mut cmd = Command::new(&self.binary);
        cmd.arg("build").arg(dir.path()).kill_on_drop(true);
        let output = run(cmd, "kustomize build").await?;
        Ok(vec![RawManifest::new(source, output)])
    }
}

/// Materialise `files` into a fresh temporary directory, removed on drop.
async fn stage(files: &StagedFiles) -> Result<tempfile::TempDir> {
    let dir = tempfile::tempdir().map_err(|e| Error::io(&std::env::temp_dir(), e))?;
    materialise(files, dir.path()).await?;
    debug!("Materialised {} files under {}", files.len(), dir.path().display());
    Ok(dir)
}

/// Run `cmd` to completion and return its stdout.
async fn run(mut cmd: Command, what: &str) -> Result<String> {
    let output = cmd
        .output()
        .await
        .map_err(|e| Error::Extraction(format!("failed to run {}: {}", what, e)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Extraction(format!("{} failed: {}", what, stderr.trim())));
    }
    String::from_utf8(output.stdout)
        .map_err(|e| Error::Extraction(format!("{} produced non-UTF-8 output: {}", what, e)))
}
