//! Kubernetes `kind` values the extractors recognize.

// ─── Identity ─────────────────────────────────────────────────────────────

pub const SERVICE_ACCOUNT: &str = "ServiceAccount";

// ─── Workloads ────────────────────────────────────────────────────────────

pub const POD: &str = "Pod";
pub const DEPLOYMENT: &str = "Deployment";
pub const STATEFUL_SET: &str = "StatefulSet";
pub const DAEMON_SET: &str = "DaemonSet";
pub const JOB: &str = "Job";
pub const CRON_JOB: &str = "CronJob";

// ─── RBAC ─────────────────────────────────────────────────────────────────

pub const ROLE: &str = "Role";
pub const CLUSTER_ROLE: &str = "ClusterRole";
pub const ROLE_BINDING: &str = "RoleBinding";
pub const CLUSTER_ROLE_BINDING: &str = "ClusterRoleBinding";

// ─── Lists ──────────────────────────────────────────────────────────────

/// Generic list wrapper emitted by `kubectl get -o yaml`.
pub const LIST: &str = "List";

/// Suffix of typed list kinds (`RoleList`, `PodList`, ...).
pub const LIST_SUFFIX: &str = "List";
