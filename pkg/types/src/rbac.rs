use pkg_constants::{kinds, rbac::ALL_INSTANCES, rbac::CLUSTER_SCOPE, rbac::WILDCARD};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};

// --- Policy rules ---

/// A rule as declared under `rules:` in a Role or ClusterRole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    /// API groups this rule applies to (e.g., "" for core, "*" for all)
    pub api_groups: Vec<String>,
    /// Resource types (e.g., "pods", "services", "*" for all)
    pub resources: Vec<String>,
    /// Named instances; empty means every instance.
    pub resource_names: Vec<String>,
    /// Allowed verbs (e.g., "get", "list", "create", "update", "delete", "*" for all)
    pub verbs: Vec<String>,
}

// --- Permission index ---

/// One granted (apiGroup, resource, resourceName, verb) tuple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Permission {
    pub api_group: String,
    pub resource: String,
    /// `""` grants every instance of the resource.
    pub resource_name: String,
    pub verb: String,
}

/// `apiGroup → resource → resourceName → verbs`.
pub type GroupedPermissions =
    BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeSet<String>>>>;

/// Aggregated permissions of one or more rules.
///
/// Stored as a flat tuple set; the nested view is built on demand by
/// [`PermissionIndex::grouped`] and is also the serialized form.
/// Entries are only ever added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionIndex {
    entries: BTreeSet<Permission>,
}

impl PermissionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a single tuple. Returns `false` if it was already present.
    pub fn insert(&mut self, permission: Permission) -> bool {
        self.entries.insert(permission)
    }

    /// Add the Cartesian product `apiGroups × resources × (resourceNames | {""}) × verbs`.
    ///
    /// A rule with no resources or no verbs grants nothing. Returns the number
    /// of tuples that were new to the index.
    pub fn add_rule(&mut self, rule: &PolicyRule) -> usize {
        if rule.resources.is_empty() || rule.verbs.is_empty() {
            return 0;
        }
        let all_instances = [ALL_INSTANCES.to_string()];
        let names: &[String] = if rule.resource_names.is_empty() {
            &all_instances
        } else {
            &rule.resource_names
        };

        let mut added = 0;
        for api_group in &rule.api_groups {
            for resource in &rule.resources {
                for resource_name in names {
                    for verb in &rule.verbs {
                        let fresh = self.insert(Permission {
                            api_group: api_group.clone(),
                            resource: resource.clone(),
                            resource_name: resource_name.clone(),
                            verb: verb.clone(),
                        });
                        if fresh {
                            added += 1;
                        }
                    }
                }
            }
        }
        added
    }

    /// Set union with another index.
    pub fn merge(&mut self, other: &PermissionIndex) {
        self.entries.extend(other.entries.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn grouped(&self) -> GroupedPermissions {
        let mut grouped = GroupedPermissions::new();
        for p in &self.entries {
            grouped
                .entry(p.api_group.clone())
                .or_default()
                .entry(p.resource.clone())
                .or_default()
                .entry(p.resource_name.clone())
                .or_default()
                .insert(p.verb.clone());
        }
        grouped
    }

    /// Whether some entry grants `verb` on the given resource instance.
    ///
    /// `*` in an entry matches anything in that dimension. An entry with the
    /// `""` resource name matches any instance; querying with `""` asks for
    /// access to every instance and only matches such entries.
    pub fn allows(&self, api_group: &str, resource: &str, resource_name: &str, verb: &str) -> bool {
        let matches = |granted: &str, wanted: &str| granted == WILDCARD || granted == wanted;
        self.entries.iter().any(|p| {
            matches(&p.api_group, api_group)
                && matches(&p.resource, resource)
                && (p.resource_name == ALL_INSTANCES || p.resource_name == resource_name)
                && matches(&p.verb, verb)
        })
    }
}

impl Serialize for PermissionIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.grouped().serialize(serializer)
    }
}

// --- Role ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RoleType {
    Role,
    ClusterRole,
}

impl RoleType {
    pub fn from_kind(kind: &str) -> Result<Self> {
        match kind {
            kinds::ROLE => Ok(RoleType::Role),
            kinds::CLUSTER_ROLE => Ok(RoleType::ClusterRole),
            other => Err(Error::UnsupportedType(other.to_string())),
        }
    }

    pub fn is_cluster_scoped(&self) -> bool {
        matches!(self, RoleType::ClusterRole)
    }
}

impl std::fmt::Display for RoleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoleType::Role => write!(f, "{}", kinds::ROLE),
            RoleType::ClusterRole => write!(f, "{}", kinds::CLUSTER_ROLE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RbacRole {
    #[serde(rename = "type")]
    pub role_type: RoleType,
    pub name: String,
    /// `"*"` for ClusterRoles.
    pub namespace: String,
    pub permissions: PermissionIndex,
}

impl RbacRole {
    /// Identity used for deduplication in a subject's role list.
    pub fn same_role(&self, other: &RbacRole) -> bool {
        self.name == other.name && self.role_type == other.role_type
    }
}

// --- Subject ---

/// A ServiceAccount named by a binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingSubject {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

// --- RoleBinding ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum BindingType {
    RoleBinding,
    ClusterRoleBinding,
}

impl BindingType {
    pub fn from_kind(kind: &str) -> Result<Self> {
        match kind {
            kinds::ROLE_BINDING => Ok(BindingType::RoleBinding),
            kinds::CLUSTER_ROLE_BINDING => Ok(BindingType::ClusterRoleBinding),
            other => Err(Error::UnsupportedType(other.to_string())),
        }
    }

    pub fn is_cluster_scoped(&self) -> bool {
        matches!(self, BindingType::ClusterRoleBinding)
    }
}

impl std::fmt::Display for BindingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingType::RoleBinding => write!(f, "{}", kinds::ROLE_BINDING),
            BindingType::ClusterRoleBinding => write!(f, "{}", kinds::CLUSTER_ROLE_BINDING),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RbacBinding {
    #[serde(rename = "type")]
    pub binding_type: BindingType,
    pub name: String,
    /// `"*"` for ClusterRoleBindings.
    pub namespace: String,
    /// ServiceAccount subjects only.
    pub subjects: Vec<BindingSubject>,
    /// Name of the referenced Role or ClusterRole.
    pub role_ref: String,
}

// --- Correlation output ---

/// (subject name, subject namespace).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SubjectKey {
    pub name: String,
    pub namespace: String,
}

impl SubjectKey {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }
}

impl std::fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Roles a single ServiceAccount can exercise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceAccountRbac {
    pub roles: Vec<RbacRole>,
}

impl ServiceAccountRbac {
    /// Append `role` unless a role with the same (name, type) is already present.
    pub fn add_role(&mut self, role: &RbacRole) -> bool {
        if self.roles.iter().any(|r| r.same_role(role)) {
            return false;
        }
        self.roles.push(role.clone());
        true
    }

    /// Union of the permissions of every bound role.
    pub fn effective_permissions(&self) -> PermissionIndex {
        let mut merged = PermissionIndex::new();
        for role in &self.roles {
            merged.merge(&role.permissions);
        }
        merged
    }
}

/// Everything the RBAC extractor produces for one document set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RbacResult {
    pub roles: Vec<RbacRole>,
    pub bindings: Vec<RbacBinding>,
    #[serde(serialize_with = "serialize_subject_map")]
    pub subject_map: BTreeMap<SubjectKey, ServiceAccountRbac>,
}

impl RbacResult {
    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn subject(&self, name: &str, namespace: &str) -> Option<&ServiceAccountRbac> {
        self.subject_map.get(&SubjectKey::new(name, namespace))
    }
}

#[derive(Serialize)]
struct SubjectEntry<'a> {
    name: &'a str,
    namespace: &'a str,
    roles: &'a [RbacRole],
}

/// JSON objects need string keys, so the map is written as a list of entries.
fn serialize_subject_map<S: Serializer>(
    map: &BTreeMap<SubjectKey, ServiceAccountRbac>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(map.iter().map(|(key, rbac)| SubjectEntry {
        name: &key.name,
        namespace: &key.namespace,
        roles: &rbac.roles,
    }))
}

/// Namespace recorded for an RBAC object: the declared one, else `"*"` for
/// cluster-scoped kinds and `fallback` for namespaced ones.
///
/// ClusterRoles are always `"*"` and do not go through here.
pub fn scoped_namespace(cluster_scoped: bool, declared: Option<&str>, fallback: &str) -> String {
    match declared {
        Some(namespace) => namespace.to_string(),
        None if cluster_scoped => CLUSTER_SCOPE.to_string(),
        None => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn rule(groups: &[&str], resources: &[&str], names: &[&str], verbs: &[&str]) -> PolicyRule {
        PolicyRule {
            api_groups: strings(groups),
            resources: strings(resources),
            resource_names: strings(names),
            verbs: strings(verbs),
        }
    }

    fn role(role_type: RoleType, name: &str) -> RbacRole {
        RbacRole {
            role_type,
            name: name.to_string(),
            namespace: "ns1".to_string(),
            permissions: PermissionIndex::new(),
        }
    }

    #[test]
    fn empty_resources_or_verbs_grant_nothing() {
        let mut index = PermissionIndex::new();
        assert_eq!(index.add_rule(&rule(&[""], &[], &["a"], &["get"])), 0);
        assert_eq!(index.add_rule(&rule(&["apps"], &["deployments"], &[], &[])), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn cartesian_product_with_sentinel() {
        let mut index = PermissionIndex::new();
        let added = index.add_rule(&rule(&["", "apps"], &["pods", "deployments"], &[], &["get", "list"]));
        assert_eq!(added, 8);

        let grouped = index.grouped();
        let verbs = &grouped[""]["pods"][""];
        assert_eq!(verbs.iter().map(String::as_str).collect::<Vec<_>>(), vec!["get", "list"]);
        assert!(grouped["apps"]["deployments"].contains_key(""));
    }

    #[test]
    fn resource_names_replace_sentinel() {
        let mut index = PermissionIndex::new();
        index.add_rule(&rule(&[""], &["secrets"], &["tls", "db"], &["get"]));
        let grouped = index.grouped();
        let names: Vec<_> = grouped[""]["secrets"].keys().map(String::as_str).collect();
        assert_eq!(names, vec!["db", "tls"]);
    }

    #[test]
    fn merge_is_a_union() {
        let mut a = PermissionIndex::new();
        a.add_rule(&rule(&[""], &["pods"], &[], &["get"]));
        let mut b = PermissionIndex::new();
        b.add_rule(&rule(&[""], &["pods"], &[], &["get", "watch"]));

        a.merge(&b);
        assert_eq!(a.len(), 2);
        a.merge(&b);
        assert_eq!(a.len(), 2);
        assert!(a.allows("", "pods", "", "watch"));
    }

    #[test]
    fn allows_honors_wildcards_and_names() {
        let mut index = PermissionIndex::new();
        index.add_rule(&rule(&["*"], &["*"], &[], &["get"]));
        index.add_rule(&rule(&[""], &["secrets"], &["tls"], &["delete"]));

        assert!(index.allows("apps", "deployments", "web", "get"));
        assert!(index.allows("", "secrets", "tls", "delete"));
        assert!(!index.allows("", "secrets", "db", "delete"));
        assert!(!index.allows("", "secrets", "", "delete"));
        assert!(!index.allows("", "pods", "", "create"));
    }

    #[test]
    fn serializes_as_nested_view() {
        let mut index = PermissionIndex::new();
        index.add_rule(&rule(&[""], &["pods"], &[], &["list", "get"]));
        let json = serde_json::to_value(&index).unwrap();
        assert_eq!(json, serde_json::json!({"": {"pods": {"": ["get", "list"]}}}));
    }

    #[test]
    fn add_role_dedups_on_name_and_type() {
        let mut sa = ServiceAccountRbac::default();
        assert!(sa.add_role(&role(RoleType::Role, "reader")));
        assert!(!sa.add_role(&role(RoleType::Role, "reader")));
        assert!(sa.add_role(&role(RoleType::ClusterRole, "reader")));
        assert_eq!(sa.roles.len(), 2);
    }

    #[test]
    fn subject_map_serializes_as_entries() {
        let mut result = RbacResult::default();
        result
            .subject_map
            .entry(SubjectKey::new("sa1", "ns1"))
            .or_default()
            .add_role(&role(RoleType::Role, "reader"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["subjectMap"][0]["name"], "sa1");
        assert_eq!(json["subjectMap"][0]["roles"][0]["type"], "Role");
    }

    #[test]
    fn scope_namespace() {
        assert_eq!(scoped_namespace(true, Some("ns1"), "default"), "ns1");
        assert_eq!(scoped_namespace(true, None, "default"), "*");
        assert_eq!(scoped_namespace(false, Some("ns1"), "default"), "ns1");
        assert_eq!(scoped_namespace(false, None, "default"), "default");
    }
}
