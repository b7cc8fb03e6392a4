use chrono::{DateTime, Utc};
use pkg_extract::Extraction;
use pkg_types::rbac::PermissionIndex;
use serde::Serialize;
use std::fmt::Write;

/// JSON report written by `scan --output json`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report<'a> {
    pub source: &'a str,
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extraction: &'a Extraction,
}

impl<'a> Report<'a> {
    pub fn new(source: &'a str, extraction: &'a Extraction) -> Self {
        Self {
            source,
            generated_at: Utc::now(),
            extraction,
        }
    }
}

/// Subject → role → permission view.
pub fn table(extraction: &Extraction) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<40} {:<20} {:<32} {}",
        "SERVICE ACCOUNT", "TYPE", "ROLE", "PERMISSIONS"
    );
    for (subject, rbac) in &extraction.rbac.subject_map {
        for role in &rbac.roles {
            let _ = writeln!(
                out,
                "{:<40} {:<20} {:<32} {}",
                subject.to_string(),
                role.role_type.to_string(),
                role.name,
                permissions(&role.permissions)
            );
        }
    }
    if extraction.rbac.subject_map.is_empty() {
        let _ = writeln!(out, "(no service account resolved a role)");
    }

    let s = &extraction.summary;
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} service accounts, {} workloads, {} roles, {} bindings, {} warnings",
        s.count,
        s.workload_count,
        s.role_count,
        s.binding_count,
        extraction.warnings.len()
    );
    out
}

/// `group/resource[/name]:verb,verb` entries joined by spaces; core group has no prefix.
fn permissions(index: &PermissionIndex) -> String {
    let mut parts = Vec::new();
    for (group, resources) in index.grouped() {
        for (resource, names) in resources {
            for (name, verbs) in names {
                let mut target = if group.is_empty() {
                    resource.clone()
                } else {
                    format!("{}/{}", group, resource)
                };
                if !name.is_empty() {
                    target = format!("{}/{}", target, name);
                }
                let verbs: Vec<_> = verbs.into_iter().collect();
                parts.push(format!("{}:{}", target, verbs.join(",")));
            }
        }
    }
    if parts.is_empty() {
        return "-".to_string();
    }
    parts.join(" ")
}
