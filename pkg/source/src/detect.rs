use pkg_constants::paths::{HELM_MARKERS, KUSTOMIZE_MARKERS};
use pkg_types::{Error, Result};
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// How a source root has to be turned into documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    PlainDocuments,
    Helm,
    Kustomize,
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFormat::PlainDocuments => write!(f, "plain"),
            SourceFormat::Helm => write!(f, "helm"),
            SourceFormat::Kustomize => write!(f, "kustomize"),
        }
    }
}

/// Detect the format of `root` from marker files directly under it.
///
/// Helm markers win over Kustomize markers. A path that is not a directory is
/// plain documents. "Not found" means absent; any other I/O error is fatal.
pub fn detect_format(root: &Path) -> Result<SourceFormat> {
    let meta = std::fs::metadata(root).map_err(|e| Error::io(root, e))?;
    if !meta.is_dir() {
        return Ok(SourceFormat::PlainDocuments);
    }

    let candidates = [
        (HELM_MARKERS, SourceFormat::Helm),
        (KUSTOMIZE_MARKERS, SourceFormat::Kustomize),
    ];
    for (markers, format) in candidates {
        for marker in markers {
            if is_marker(&root.join(marker))? {
                debug!("Found {} in {}, treating as {}", marker, root.display(), format);
                return Ok(format);
            }
        }
    }
    Ok(SourceFormat::PlainDocuments)
}

fn is_marker(path: &Path) -> Result<bool> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(!meta.is_dir()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_to_plain() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sa.yaml"), "kind: ServiceAccount\n").unwrap();
        assert_eq!(detect_format(dir.path()).unwrap(), SourceFormat::PlainDocuments);
    }

    #[test]
    fn helm_wins_over_kustomize() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("kustomization.yaml"), "resources: []\n").unwrap();
        assert_eq!(detect_format(dir.path()).unwrap(), SourceFormat::Kustomize);

        fs::write(dir.path().join("Chart.yml"), "name: app\n").unwrap();
        assert_eq!(detect_format(dir.path()).unwrap(), SourceFormat::Helm);
    }

    #[test]
    fn marker_directory_does_not_count() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("Chart.yaml")).unwrap();
        fs::write(dir.path().join("kustomization.yml"), "resources: []\n").unwrap();
        assert_eq!(detect_format(dir.path()).unwrap(), SourceFormat::Kustomize);
    }

    #[test]
    fn nested_markers_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("charts")).unwrap();
        fs::write(dir.path().join("charts/Chart.yaml"), "name: sub\n").unwrap();
        assert_eq!(detect_format(dir.path()).unwrap(), SourceFormat::PlainDocuments);
    }

    #[test]
    fn single_file_is_plain() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("all.yaml");
        fs::write(&file, "kind: Role\n").unwrap();
        assert_eq!(detect_format(&file).unwrap(), SourceFormat::PlainDocuments);
    }

    #[test]
    fn missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = detect_format(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
