use pkg_constants::paths::MANIFEST_EXTENSIONS;
use pkg_types::{Error, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Relative path → file content, sorted by path.
pub type StagedFiles = BTreeMap<PathBuf, Vec<u8>>;

/// Which files a walk keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collect {
    /// `.yaml` / `.yml` only.
    Manifests,
    /// Everything, e.g. chart templates and helpers for a renderer.
    All,
}

impl Collect {
    fn matches(&self, path: &Path) -> bool {
        match self {
            Collect::All => true,
            Collect::Manifests => path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| MANIFEST_EXTENSIONS.iter().any(|m| m.eq_ignore_ascii_case(ext))),
        }
    }
}

/// In-memory copy of a source directory.
///
/// Discovery takes the write lock once per file; readers hold the read lock
/// for as long as they work on the snapshot.
#[derive(Debug, Clone, Default)]
pub struct FileMap {
    inner: Arc<RwLock<StagedFiles>>,
}

impl FileMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, path: PathBuf, content: Vec<u8>) {
        self.inner.write().await.insert(path, content);
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, StagedFiles> {
        self.inner.read().await
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Walk `root` recursively and stage every file `filter` keeps.
    ///
    /// With `follow_symlinks`, each directory and file is visited once per
    /// canonical path, so symlink loops terminate. The walk itself runs on
    /// the blocking pool.
    pub async fn collect(
        root: &Path,
        filter: Collect,
        follow_symlinks: bool,
        cancel: &CancellationToken,
    ) -> Result<FileMap> {
        let paths = {
            let root = root.to_path_buf();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || walk(&root, filter, follow_symlinks, &cancel))
                .await
                .map_err(|e| Error::Extraction(format!("directory walk failed: {}", e)))??
        };

        let map = FileMap::new();
        for (path, relative) in paths {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let content = tokio::fs::read(&path).await.map_err(|e| Error::io(&path, e))?;
            map.insert(relative, content).await;
        }

        info!("Staged {} files from {}", map.len().await, root.display());
        Ok(map)
    }
}

/// Files under `root` that `filter` keeps, as (path, path relative to `root`).
fn walk(
    root: &Path,
    filter: Collect,
    follow_symlinks: bool,
    cancel: &CancellationToken,
) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let walker = WalkDir::new(root)
        .follow_links(follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| !follow_symlinks || first_visit(&mut seen, entry.path()));

    let mut paths = Vec::new();
    for entry in walker {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.loop_ancestor().is_some() => {
                debug!("Skipping symlink loop: {}", e);
                continue;
            }
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                return Err(Error::io(&path, e.into()));
            }
        };
        if !entry.file_type().is_file() || !filter.matches(entry.path()) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .ok()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(entry.path())
            .to_path_buf();
        paths.push((entry.into_path(), relative));
    }
    Ok(paths)
}

fn first_visit(seen: &mut HashSet<PathBuf>, path: &Path) -> bool {
    match std::fs::canonicalize(path) {
        Ok(canonical) => seen.insert(canonical),
        // Let the walker report it.
        Err(_) => true,
    }
}

/// Write a snapshot under `dir`, creating parent directories as needed.
pub async fn materialise(files: &StagedFiles, dir: &Path) -> Result<()> {
    for (relative, content) in files {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(parent, e))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| Error::io(&path, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("rbac/nested")).unwrap();
        fs::write(dir.path().join("b.yaml"), "kind: Role\n").unwrap();
        fs::write(dir.path().join("a.YML"), "kind: Pod\n").unwrap();
        fs::write(dir.path().join("README.md"), "# docs\n").unwrap();
        fs::write(dir.path().join("rbac/nested/binding.yml"), "kind: RoleBinding\n").unwrap();
        dir
    }

    fn keys(files: &StagedFiles) -> Vec<String> {
        files.keys().map(|p| p.display().to_string()).collect()
    }

    #[tokio::test]
    async fn collects_manifests_recursively() {
        let dir = tree();
        let map = FileMap::collect(dir.path(), Collect::Manifests, false, &CancellationToken::new())
            .await
            .unwrap();
        let staged = map.read().await;
        assert_eq!(keys(&staged), vec!["a.YML", "b.yaml", "rbac/nested/binding.yml"]);
        assert_eq!(staged[Path::new("b.yaml")], b"kind: Role\n");
    }

    #[tokio::test]
    async fn collects_everything_for_renderers() {
        let dir = tree();
        let map = FileMap::collect(dir.path(), Collect::All, false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(map.len().await, 4);
    }

    #[tokio::test]
    async fn cancelled_walk_stages_nothing() {
        let dir = tree();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = FileMap::collect(dir.path(), Collect::Manifests, false, &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_are_optional_and_loops_terminate() {
        let dir = tree();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("linked.yaml"), "kind: ClusterRole\n").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("external")).unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("rbac/loop")).unwrap();

        let cancel = CancellationToken::new();
        let map = FileMap::collect(dir.path(), Collect::Manifests, false, &cancel).await.unwrap();
        assert_eq!(map.len().await, 3);

        let map = FileMap::collect(dir.path(), Collect::Manifests, true, &cancel).await.unwrap();
        let staged = map.read().await;
        assert_eq!(
            keys(&staged),
            vec!["a.YML", "b.yaml", "external/linked.yaml", "rbac/nested/binding.yml"]
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn walk_runs_off_the_async_thread() {
        let dir = tree();
        let map = FileMap::collect(dir.path(), Collect::Manifests, false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(map.len().await, 3);

        let paths = walk(dir.path(), Collect::Manifests, false, &CancellationToken::new()).unwrap();
        assert_eq!(paths[0], (dir.path().join("a.YML"), PathBuf::from("a.YML")));
    }

    #[tokio::test]
    async fn materialise_recreates_the_tree() {
        let mut files = StagedFiles::new();
        files.insert(PathBuf::from("templates/sa.yaml"), b"kind: ServiceAccount\n".to_vec());
        files.insert(PathBuf::from("Chart.yaml"), b"name: app\n".to_vec());

        let dir = tempfile::tempdir().unwrap();
        materialise(&files, dir.path()).await.unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("templates/sa.yaml")).unwrap(),
            "kind: ServiceAccount\n"
        );
        assert!(dir.path().join("Chart.yaml").is_file());
    }
}
