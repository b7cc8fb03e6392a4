use pkg_constants::kinds;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Opaque JSON object copied verbatim from a manifest (securityContext, resources).
pub type OpaqueMap = serde_json::Map<String, serde_json::Value>;

// --- Workload type ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WorkloadType {
    Pod,
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
}

impl WorkloadType {
    pub fn from_kind(kind: &str) -> Result<Self> {
        match kind {
            kinds::POD => Ok(WorkloadType::Pod),
            kinds::DEPLOYMENT => Ok(WorkloadType::Deployment),
            kinds::STATEFUL_SET => Ok(WorkloadType::StatefulSet),
            kinds::DAEMON_SET => Ok(WorkloadType::DaemonSet),
            kinds::JOB => Ok(WorkloadType::Job),
            kinds::CRON_JOB => Ok(WorkloadType::CronJob),
            other => Err(Error::UnsupportedType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadType::Pod => kinds::POD,
            WorkloadType::Deployment => kinds::DEPLOYMENT,
            WorkloadType::StatefulSet => kinds::STATEFUL_SET,
            WorkloadType::DaemonSet => kinds::DAEMON_SET,
            WorkloadType::Job => kinds::JOB,
            WorkloadType::CronJob => kinds::CRON_JOB,
        }
    }

    /// Path from the document root to the pod spec of this shape.
    pub fn pod_spec_path(&self) -> &'static [&'static str] {
        match self {
            WorkloadType::Pod => &["spec"],
            WorkloadType::Deployment
            | WorkloadType::StatefulSet
            | WorkloadType::DaemonSet
            | WorkloadType::Job => &["spec", "template", "spec"],
            WorkloadType::CronJob => &["spec", "jobTemplate", "spec", "template", "spec"],
        }
    }
}

impl std::fmt::Display for WorkloadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Container ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub security_context: OpaqueMap,
    #[serde(default)]
    pub resources: OpaqueMap,
}

// --- Workload ---

/// One Pod or one controller's pod template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    #[serde(rename = "type")]
    pub workload_type: WorkloadType,
    pub name: String,
    pub namespace: String,
    /// Declared `serviceAccountName`; empty means the namespace's implicit default.
    #[serde(default)]
    pub service_account: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Pod-level securityContext.
    #[serde(default)]
    pub security_context: OpaqueMap,
    #[serde(default)]
    pub containers: Vec<Container>,
}

/// Grouping key for workloads: (serviceAccount, namespace).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadKey {
    pub service_account: String,
    pub namespace: String,
}

impl WorkloadKey {
    pub fn new(service_account: &str, namespace: &str) -> Self {
        Self {
            service_account: service_account.to_string(),
            namespace: namespace.to_string(),
        }
    }

    /// True when the workloads in this group run as the namespace's implicit default identity.
    pub fn uses_implicit_default(&self) -> bool {
        self.service_account.is_empty()
    }
}

impl Workload {
    pub fn key(&self) -> WorkloadKey {
        WorkloadKey::new(&self.service_account, &self.namespace)
    }
}

pub type WorkloadGroups = BTreeMap<WorkloadKey, Vec<Workload>>;
