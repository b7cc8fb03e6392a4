//! Scope sentinels used by the RBAC correlator.

/// Namespace assumed for namespaced RBAC objects that declare none.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Namespace recorded for cluster-scoped objects (ClusterRole, ClusterRoleBinding).
pub const CLUSTER_SCOPE: &str = "*";

/// Resource-name key meaning "every instance of the resource".
pub const ALL_INSTANCES: &str = "";

/// RBAC wildcard accepted in any rule dimension.
pub const WILDCARD: &str = "*";
