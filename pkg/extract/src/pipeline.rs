use pkg_manifest::Document;
use pkg_types::config::ExtractOptions;
use pkg_types::identity::Identity;
use pkg_types::rbac::RbacResult;
use pkg_types::workload::{Workload, WorkloadGroups};
use pkg_types::Result;
use serde::{Serialize, Serializer};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{IdentityExtractor, RbacExtractor, WorkloadExtractor};

/// Quick diagnostic counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Identities (ServiceAccounts).
    pub count: usize,
    pub workload_count: usize,
    pub role_count: usize,
    pub binding_count: usize,
    /// ServiceAccounts that resolved at least one role.
    pub subject_count: usize,
}

/// Output of all three extractors over one document set.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub identities: Vec<Identity>,
    #[serde(serialize_with = "serialize_workload_groups")]
    pub workloads: WorkloadGroups,
    pub rbac: RbacResult,
    pub warnings: Vec<String>,
    pub summary: Summary,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkloadGroupEntry<'a> {
    service_account: &'a str,
    namespace: &'a str,
    workloads: &'a [Workload],
}

fn serialize_workload_groups<S: Serializer>(
    groups: &WorkloadGroups,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(groups.iter().map(|(key, workloads)| WorkloadGroupEntry {
        service_account: &key.service_account,
        namespace: &key.namespace,
        workloads,
    }))
}

/// Runs the identity, workload and RBAC extractors with one set of options.
pub struct Pipeline {
    options: ExtractOptions,
    cancel: CancellationToken,
}

impl Pipeline {
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

    /// All-or-nothing: any extractor error discards the other results.
    pub fn run(&self, documents: &[Document]) -> Result<Extraction> {
        let identities = IdentityExtractor::new(self.options.clone())
            .with_cancellation(self.cancel.clone())
            .extract(documents)?;
        let workloads = WorkloadExtractor::new(self.options.clone())
            .with_cancellation(self.cancel.clone())
            .extract(documents)?;
        let rbac = RbacExtractor::new(self.options.clone())
            .with_cancellation(self.cancel.clone())
            .extract(documents)?;

        let summary = Summary {
            count: identities.identities.len(),
            workload_count: workloads.count(),
            role_count: rbac.result.role_count(),
            binding_count: rbac.result.binding_count(),
            subject_count: rbac.result.subject_map.len(),
        };
        info!(
            "Extraction complete: {} identities, {} workloads, {} roles, {} bindings",
            summary.count, summary.workload_count, summary.role_count, summary.binding_count
        );

        let mut warnings = identities.warnings;
        warnings.extend(workloads.warnings);
        warnings.extend(rbac.warnings);

        Ok(Extraction {
            identities: identities.identities,
            workloads: workloads.workloads,
            rbac: rbac.result,
            warnings,
            summary,
        })
    }
}
