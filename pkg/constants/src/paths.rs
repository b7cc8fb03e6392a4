//! Filesystem path and file-name constants.

// ─── Config ───────────────────────────────────────────────────────────────

/// Default config file path for the CLI.
pub const DEFAULT_CONFIG: &str = "/etc/rbacgraph/config.yaml";

// ─── Source markers ───────────────────────────────────────────────────────

/// Files whose presence at a source root marks a Helm chart, in priority order.
pub const HELM_MARKERS: &[&str] = &["Chart.yaml", "Chart.yml"];

/// Files whose presence at a source root marks a Kustomize overlay, in priority order.
pub const KUSTOMIZE_MARKERS: &[&str] = &["kustomization.yaml", "kustomization.yml"];

/// Extensions collected when aggregating a plain document directory.
pub const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml"];

// ─── Renderers ────────────────────────────────────────────────────────────

/// Default Helm binary looked up in `$PATH`.
pub const DEFAULT_HELM_BINARY: &str = "helm";

/// Default Kustomize binary looked up in `$PATH`.
pub const DEFAULT_KUSTOMIZE_BINARY: &str = "kustomize";

/// Release name passed to `helm template` when none is configured.
pub const DEFAULT_HELM_RELEASE: &str = "rbacgraph";
