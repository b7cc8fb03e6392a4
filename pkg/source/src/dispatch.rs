use pkg_manifest::{Normalized, Normalizer, RawManifest};
use pkg_types::config::{ConfigFile, ExtractOptions};
use pkg_types::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::detect::{SourceFormat, detect_format};
use crate::files::{Collect, FileMap};
use crate::render::{HelmRenderer, KustomizeRenderer, Renderer};

/// Where manifests come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Directory(PathBuf),
    /// Bytes already fetched from `url`; always plain documents.
    Remote { url: String, content: Vec<u8> },
    Bytes { name: String, content: Vec<u8> },
}

impl Source {
    /// `File` or `Directory` depending on what `path` is on disk.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let meta = std::fs::metadata(&path).map_err(|e| Error::io(&path, e))?;
        Ok(if meta.is_dir() {
            Source::Directory(path)
        } else {
            Source::File(path)
        })
    }
}

/// Turns a [`Source`] into normalized documents.
pub struct Dispatcher {
    options: ExtractOptions,
    cancel: CancellationToken,
    helm: Arc<dyn Renderer>,
    kustomize: Arc<dyn Renderer>,
}

impl Dispatcher {
    pub fn new(options: ExtractOptions) -> Self {
        Self {
            options,
            cancel: CancellationToken::new(),
            helm: Arc::new(HelmRenderer::default()),
            kustomize: Arc::new(KustomizeRenderer::default()),
        }
    }

    /// Options and renderer settings from a config file.
    pub fn from_config(config: &ConfigFile, options: ExtractOptions) -> Self {
        Self::new(options)
            .with_helm(Arc::new(HelmRenderer::from(&config.helm)))
            .with_kustomize(Arc::new(KustomizeRenderer::from(&config.kustomize)))
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_helm(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.helm = renderer;
        self
    }

    pub fn with_kustomize(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.kustomize = renderer;
        self
    }

    pub async fn dispatch(&self, source: &Source) -> Result<Normalized> {
        match source {
            Source::File(path) => {
                let content = tokio::fs::read(path).await.map_err(|e| Error::io(path, e))?;
                self.normalizer().parse(&path.display().to_string(), &content)
            }
            Source::Remote { url, content } => self.normalizer().parse(url, content),
            Source::Bytes { name, content } => self.normalizer().parse(name, content),
            Source::Directory(root) => {
                let format = detect_format(root)?;
                info!("Dispatching {} as {}", root.display(), format);
                match format {
                    SourceFormat::PlainDocuments => self.aggregate(root).await,
                    SourceFormat::Helm => self.render(root, self.helm.as_ref()).await,
                    SourceFormat::Kustomize => self.render(root, self.kustomize.as_ref()).await,
                }
            }
        }
    }

    fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.options.clone()).with_cancellation(self.cancel.clone())
    }

    /// Plain directory: every `.yaml`/`.yml` file, in path order.
    async fn aggregate(&self, root: &Path) -> Result<Normalized> {
        let files = FileMap::collect(
            root,
            Collect::Manifests,
            self.options.follow_symlinks,
            &self.cancel,
        )
        .await?;

        let staged = files.read().await;
        if staged.is_empty() {
            return Err(Error::NoDocuments(root.to_path_buf()));
        }
        let manifests: Vec<RawManifest> = staged
            .iter()
            .map(|(path, content)| RawManifest::new(path.display().to_string(), content.clone()))
            .collect();
        drop(staged);

        self.normalizer().parse_all(&manifests)
    }

    /// Stage the whole tree and hand it to `renderer` under the read lock.
    async fn render(&self, root: &Path, renderer: &dyn Renderer) -> Result<Normalized> {
        let files =
            FileMap::collect(root, Collect::All, self.options.follow_symlinks, &self.cancel).await?;
        let source = root.display().to_string();

        let rendered = {
            let staged = files.read().await;
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                rendered = renderer.render(&source, &staged) => rendered?,
            }
        };
        info!("[{}] rendered {} blobs from {}", renderer.name(), rendered.len(), source);

        self.normalizer().parse_all(&rendered)
    }
}
