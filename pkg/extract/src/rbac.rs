//! Role/binding extraction and ServiceAccount correlation.
//!
//! Phase 1 walks the documents once, building a [`PermissionIndex`] per
//! Role/ClusterRole and collecting ServiceAccount subjects per binding.
//! Phase 2 ([`correlate`]) resolves every binding against two lookup tables
//! and accumulates the resolved roles per subject.
//!
//! Scoping:
//! - a RoleBinding only resolves a Role of the same name in its own namespace;
//! - a ClusterRoleBinding only resolves ClusterRoles;
//! - a subject is always keyed by its own namespace, even when bound by a
//!   ClusterRoleBinding. Only the ClusterRole itself carries `"*"`.

use pkg_constants::kinds;
use pkg_constants::rbac::{CLUSTER_SCOPE, DEFAULT_NAMESPACE};
use pkg_manifest::{Document, Node, tolerate};
use pkg_types::config::ExtractOptions;
use pkg_types::rbac::{
    BindingSubject, BindingType, PermissionIndex, PolicyRule, RbacBinding, RbacResult, RbacRole,
    RoleType, ServiceAccountRbac, SubjectKey, scoped_namespace,
};
use pkg_types::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{checkpoint, ensure_input};

#[derive(Debug, Clone, Default)]
pub struct RbacExtraction {
    pub result: RbacResult,
    pub warnings: Vec<String>,
}

/// A document recognized in phase 1.
enum RbacObject {
    Role(RbacRole),
    Binding(RbacBinding),
}

pub struct RbacExtractor {
    options: ExtractOptions,
    cancel: CancellationToken,
}

impl RbacExtractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self {
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn extract(&self, documents: &[Document]) -> Result<RbacExtraction> {
        ensure_input(documents)?;
        let mut warnings = Vec::new();
        let mut roles: Vec<RbacRole> = Vec::new();
        let mut bindings: Vec<RbacBinding> = Vec::new();

        for doc in documents {
            checkpoint(&self.cancel)?;
            match self.read(doc, &mut warnings) {
                Ok(Some(RbacObject::Role(role))) => add_role(&mut roles, role),
                Ok(Some(RbacObject::Binding(binding))) => bindings.push(binding),
                Ok(None) => {}
                Err(e) => tolerate(&self.options, e, &mut warnings)?,
            }
        }

        checkpoint(&self.cancel)?;
        let subject_map = correlate(&roles, &bindings);

        info!(
            "RBAC: {} roles, {} bindings, {} service accounts with roles",
            roles.len(),
            bindings.len(),
            subject_map.len()
        );
        Ok(RbacExtraction {
            result: RbacResult {
                roles,
                bindings,
                subject_map,
            },
            warnings,
        })
    }

    fn fallback_namespace(&self) -> &str {
        self.options
            .default_namespace
            .as_deref()
            .unwrap_or(DEFAULT_NAMESPACE)
    }

    fn read(&self, doc: &Document, warnings: &mut Vec<String>) -> Result<Option<RbacObject>> {
        let kind = doc.kind().ok_or_else(|| doc.invalid("kind is missing"))?;
        doc.root().mapping(&["metadata"]).map_err(|e| doc.invalid(e))?;
        if let Ok(role_type) = RoleType::from_kind(kind) {
            return self
                .read_role(doc, role_type, warnings)
                .map(|r| Some(RbacObject::Role(r)));
        }
        match BindingType::from_kind(kind) {
            Ok(binding_type) => self
                .read_binding(doc, binding_type, warnings)
                .map(|b| Some(RbacObject::Binding(b))),
            Err(Error::UnsupportedType(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_role(
        &self,
        doc: &Document,
        role_type: RoleType,
        warnings: &mut Vec<String>,
    ) -> Result<RbacRole> {
        let name = doc.name().map_err(|e| doc.invalid(e))?;
        let namespace = match role_type {
            RoleType::ClusterRole => CLUSTER_SCOPE.to_string(),
            RoleType::Role => scoped_namespace(false, doc.namespace(), self.fallback_namespace()),
        };

        let rules = match doc.root().sequence(&["rules"]) {
            Ok(rules) => rules,
            // Aggregated ClusterRoles are declared without rules.
            Err(e) if e.is_missing() => Vec::new(),
            Err(e) => return Err(doc.invalid(e)),
        };

        let mut permissions = PermissionIndex::new();
        for (i, node) in rules.into_iter().enumerate() {
            match read_rule(node) {
                Some(rule) => {
                    permissions.add_rule(&rule);
                }
                None => {
                    let msg = format!(
                        "{}: skipping malformed rule #{} of {} {}",
                        doc.origin(),
                        i,
                        role_type,
                        name
                    );
                    warn!("{}", msg);
                    warnings.push(msg);
                }
            }
        }

        debug!(
            "RBAC: indexed {} {}/{} ({} permissions)",
            role_type,
            namespace,
            name,
            permissions.len()
        );
        Ok(RbacRole {
            role_type,
            name: name.to_string(),
            namespace,
            permissions,
        })
    }

    fn read_binding(
        &self,
        doc: &Document,
        binding_type: BindingType,
        warnings: &mut Vec<String>,
    ) -> Result<RbacBinding> {
        let name = doc.name().map_err(|e| doc.invalid(e))?;
        let role_ref = doc
            .root()
            .str(&["roleRef", "name"])
            .map_err(|e| doc.invalid(e))?;
        let namespace = scoped_namespace(
            binding_type.is_cluster_scoped(),
            doc.namespace(),
            self.fallback_namespace(),
        );

        // Subjects without a namespace belong to the binding's namespace
        // (RoleBinding) or to the fallback namespace (ClusterRoleBinding).
        let subject_fallback = if binding_type.is_cluster_scoped() {
            self.fallback_namespace()
        } else {
            namespace.as_str()
        };

        let mut subjects = Vec::new();
        let entries = match doc.root().sequence(&["subjects"]) {
            Ok(entries) => entries,
            Err(e) if e.is_missing() => Vec::new(),
            Err(e) => {
                let msg = format!(
                    "{}: ignoring subjects of {} {}: {}",
                    doc.origin(),
                    binding_type,
                    name,
                    e
                );
                warn!("{}", msg);
                warnings.push(msg);
                Vec::new()
            }
        };
        for (i, node) in entries.into_iter().enumerate() {
            if node.str(&["kind"]).ok() != Some(kinds::SERVICE_ACCOUNT) {
                continue;
            }
            match node.str(&["name"]) {
                Ok(subject_name) => subjects.push(BindingSubject {
                    kind: kinds::SERVICE_ACCOUNT.to_string(),
                    name: subject_name.to_string(),
                    namespace: node
                        .str(&["namespace"])
                        .ok()
                        .filter(|ns| !ns.is_empty())
                        .unwrap_or(subject_fallback)
                        .to_string(),
                }),
                Err(e) => {
                    let msg = format!(
                        "{}: skipping subject #{} of {} {}: {}",
                        doc.origin(),
                        i,
                        binding_type,
                        name,
                        e
                    );
                    warn!("{}", msg);
                    warnings.push(msg);
                }
            }
        }

        Ok(RbacBinding {
            binding_type,
            name: name.to_string(),
            namespace,
            subjects,
            role_ref: role_ref.to_string(),
        })
    }
}

/// A rule entry; `None` if it is not a mapping.
fn read_rule(node: Node<'_>) -> Option<PolicyRule> {
    if !node.is_mapping() {
        return None;
    }
    let list = |key: &str| node.string_list(&[key]).unwrap_or_default();
    Some(PolicyRule {
        api_groups: list("apiGroups"),
        resources: list("resources"),
        resource_names: list("resourceNames"),
        verbs: list("verbs"),
    })
}

/// Merge a redeclared role into the existing entry; permissions only grow.
fn add_role(roles: &mut Vec<RbacRole>, role: RbacRole) {
    let existing = roles
        .iter_mut()
        .find(|r| r.same_role(&role) && r.namespace == role.namespace);
    match existing {
        Some(existing) => {
            debug!(
                "RBAC: merging redeclared {} {}/{}",
                role.role_type, role.namespace, role.name
            );
            existing.permissions.merge(&role.permissions);
        }
        None => roles.push(role),
    }
}

/// Resolve every binding and accumulate the bound roles per ServiceAccount.
///
/// Unresolved `roleRef`s leave no trace in the result. Feeding the same
/// binding more than once never duplicates a (name, type) pair.
pub fn correlate(
    roles: &[RbacRole],
    bindings: &[RbacBinding],
) -> BTreeMap<SubjectKey, ServiceAccountRbac> {
    let mut roles_by_name_and_namespace: HashMap<&str, HashMap<&str, &RbacRole>> = HashMap::new();
    let mut cluster_roles_by_name: HashMap<&str, &RbacRole> = HashMap::new();
    for role in roles {
        match role.role_type {
            RoleType::ClusterRole => {
                cluster_roles_by_name.insert(&role.name, role);
            }
            RoleType::Role => {
                roles_by_name_and_namespace
                    .entry(&role.name)
                    .or_default()
                    .insert(&role.namespace, role);
            }
        }
    }

    let mut subject_map: BTreeMap<SubjectKey, ServiceAccountRbac> = BTreeMap::new();
    for binding in bindings {
        let resolved = match binding.binding_type {
            BindingType::ClusterRoleBinding => cluster_roles_by_name.get(binding.role_ref.as_str()),
            BindingType::RoleBinding => roles_by_name_and_namespace
                .get(binding.role_ref.as_str())
                .and_then(|by_ns| by_ns.get(binding.namespace.as_str())),
        };
        let Some(role) = resolved else {
            debug!(
                "RBAC: {} {}/{} references unknown role {}",
                binding.binding_type, binding.namespace, binding.name, binding.role_ref
            );
            continue;
        };

        for subject in &binding.subjects {
            subject_map
                .entry(SubjectKey::new(&subject.name, &subject.namespace))
                .or_default()
                .add_role(role);
        }
    }
    subject_map
}
