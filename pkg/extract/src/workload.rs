use pkg_constants::rbac::DEFAULT_NAMESPACE;
use pkg_manifest::{Document, Node, tolerate};
use pkg_types::config::ExtractOptions;
use pkg_types::workload::{Container, Workload, WorkloadGroups, WorkloadKey, WorkloadType};
use pkg_types::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{checkpoint, ensure_input};

#[derive(Debug, Clone, Default)]
pub struct WorkloadExtraction {
    /// Workloads grouped by (serviceAccount, namespace), document order within a group.
    pub workloads: WorkloadGroups,
    pub warnings: Vec<String>,
}

impl WorkloadExtraction {
    pub fn count(&self) -> usize {
        self.workloads.values().map(Vec::len).sum()
    }

    /// Workloads running as `service_account` in `namespace`; `""` selects the implicit default.
    pub fn running_as(&self, service_account: &str, namespace: &str) -> &[Workload] {
        self.workloads
            .get(&WorkloadKey::new(service_account, namespace))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Extracts Pods and the pod templates of workload controllers.
pub struct WorkloadExtractor {
    options: ExtractOptions,
    cancel: CancellationToken,
}

impl WorkloadExtractor {
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

    pub fn extract(&self, documents: &[Document]) -> Result<WorkloadExtraction> {
        ensure_input(documents)?;
        let mut out = WorkloadExtraction::default();

        for doc in documents {
            checkpoint(&self.cancel)?;
            let Some(kind) = doc.kind() else {
                tolerate(&self.options, doc.invalid("kind is missing"), &mut out.warnings)?;
                continue;
            };
            let workload_type = match WorkloadType::from_kind(kind) {
                Ok(t) => t,
                Err(Error::UnsupportedType(_)) => continue,
                Err(e) => return Err(e),
            };
            match self.read(doc, workload_type, &mut out.warnings) {
                Ok(Some(workload)) => out.workloads.entry(workload.key()).or_default().push(workload),
                Ok(None) => {}
                Err(e) => tolerate(&self.options, e, &mut out.warnings)?,
            }
        }

        info!(
            "Extracted {} workloads across {} service accounts",
            out.count(),
            out.workloads.len()
        );
        Ok(out)
    }

    /// `Ok(None)` when the pod template is structurally absent.
    fn read(
        &self,
        doc: &Document,
        workload_type: WorkloadType,
        warnings: &mut Vec<String>,
    ) -> Result<Option<Workload>> {
        let name = doc.name().map_err(|e| doc.invalid(e))?;
        let pod_spec = match doc.root().mapping(workload_type.pod_spec_path()) {
            Ok(spec) => spec,
            Err(e) => {
                debug!("Dropping {} {}: {}", workload_type, name, e);
                return Ok(None);
            }
        };

        let namespace = doc
            .namespace()
            .or(self.options.default_namespace.as_deref())
            .unwrap_or(DEFAULT_NAMESPACE);

        // serviceAccount is the deprecated alias of serviceAccountName.
        let service_account = pod_spec
            .str(&["serviceAccountName"])
            .or_else(|_| pod_spec.str(&["serviceAccount"]))
            .unwrap_or_default();

        let mut containers = Vec::new();
        let entries = match pod_spec.sequence(&["containers"]) {
            Ok(entries) => entries,
            Err(e) if e.is_missing() => Vec::new(),
            Err(e) => {
                let msg = format!(
                    "{}: ignoring containers of {} {}: {}",
                    doc.origin(),
                    workload_type,
                    name,
                    e
                );
                warn!("{}", msg);
                warnings.push(msg);
                Vec::new()
            }
        };
        for (i, node) in entries.into_iter().enumerate() {
            match read_container(node) {
                Some(container) => containers.push(container),
                None => {
                    let msg = format!(
                        "{}: skipping malformed container #{} of {} {}",
                        doc.origin(),
                        i,
                        workload_type,
                        name
                    );
                    warn!("{}", msg);
                    warnings.push(msg);
                }
            }
        }

        let (labels, annotations) = if self.options.include_metadata {
            (doc.labels(), doc.annotations())
        } else {
            Default::default()
        };

        Ok(Some(Workload {
            workload_type,
            name: name.to_string(),
            namespace: namespace.to_string(),
            service_account: service_account.to_string(),
            labels,
            annotations,
            security_context: opaque(pod_spec, "securityContext"),
            containers,
        }))
    }
}

fn read_container(node: Node<'_>) -> Option<Container> {
    if !node.is_mapping() {
        return None;
    }
    let name = node.str(&["name"]).ok()?;
    Some(Container {
        name: name.to_string(),
        image: node.str(&["image"]).unwrap_or_default().to_string(),
        security_context: opaque(node, "securityContext"),
        resources: opaque(node, "resources"),
    })
}

fn opaque(node: Node<'_>, key: &str) -> pkg_types::workload::OpaqueMap {
    node.get(&[key])
        .ok()
        .and_then(|n| n.to_json_map())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::docs;

    fn lenient() -> WorkloadExtractor {
        WorkloadExtractor::new(ExtractOptions::default())
    }

    const ALL_SHAPES: &str = "\
kind: Pod
metadata: {name: bare, namespace: ns1}
spec:
  serviceAccountName: runner
  securityContext:
    runAsNonRoot: true
  containers:
    - name: app
      image: nginx:1.27
      securityContext:
        privileged: true
      resources:
        limits:
          cpu: 500m
---
kind: Deployment
metadata: {name: web, namespace: ns1}
spec:
  template:
    spec:
      serviceAccountName: runner
      containers:
        - name: web
          image: web:1
---
kind: StatefulSet
metadata: {name: db, namespace: ns1}
spec:
  template:
    spec:
      serviceAccountName: db
      containers: [{name: pg, image: postgres}]
---
kind: DaemonSet
metadata: {name: agent, namespace: kube-system}
spec:
  template:
    spec:
      serviceAccount: node-agent
      containers: [{name: agent, image: agent}]
---
kind: Job
metadata: {name: migrate, namespace: ns1}
spec:
  template:
    spec:
      serviceAccountName: db
      containers: [{name: migrate, image: migrate}]
---
kind: CronJob
metadata: {name: backup, namespace: ns1}
spec:
  schedule: \"0 * * * *\"
  jobTemplate:
    spec:
      template:
        spec:
          serviceAccountName: db
          containers: [{name: backup, image: backup}]
";

    #[test]
    fn reads_every_shape() {
        let out = lenient().extract(&docs(ALL_SHAPES)).unwrap();
        assert_eq!(out.count(), 6);

        let runner = out.running_as("runner", "ns1");
        assert_eq!(runner.len(), 2);
        assert_eq!(runner[0].workload_type, WorkloadType::Pod);
        assert_eq!(runner[1].workload_type, WorkloadType::Deployment);

        let db: Vec<_> = out.running_as("db", "ns1").iter().map(|w| w.name.as_str()).collect();
        assert_eq!(db, vec!["db", "migrate", "backup"]);

        let agent = out.running_as("node-agent", "kube-system");
        assert_eq!(agent[0].workload_type, WorkloadType::DaemonSet);
    }

    #[test]
    fn copies_security_context_and_resources() {
        let out = lenient().extract(&docs(ALL_SHAPES)).unwrap();
        let pod = &out.running_as("runner", "ns1")[0];
        assert_eq!(pod.security_context["runAsNonRoot"], serde_json::json!(true));
        let app = &pod.containers[0];
        assert_eq!(app.image, "nginx:1.27");
        assert_eq!(app.security_context["privileged"], serde_json::json!(true));
        assert_eq!(app.resources["limits"]["cpu"], serde_json::json!("500m"));
    }

    #[test]
    fn missing_service_account_groups_under_empty_key() {
        let input = docs(
            "kind: Deployment\nmetadata: {name: web, namespace: ns1}\nspec:\n  template:\n    spec:\n      containers: [{name: web, image: web}]\n",
        );
        let out = lenient().extract(&input).unwrap();
        assert_eq!(out.running_as("", "ns1").len(), 1);
        assert!(out.running_as("default", "ns1").is_empty());
        let key = out.workloads.keys().next().unwrap();
        assert!(key.uses_implicit_default());
    }

    #[test]
    fn unresolvable_template_is_dropped() {
        let input = docs(
            "kind: Deployment\nmetadata: {name: broken, namespace: ns1}\nspec:\n  replicas: 2\n---\nkind: CronJob\nmetadata: {name: cj, namespace: ns1}\nspec:\n  jobTemplate: {}\n",
        );
        let out = lenient().extract(&input).unwrap();
        assert_eq!(out.count(), 0);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn malformed_containers_are_skipped() {
        let input = docs(
            "kind: Pod\nmetadata: {name: p, namespace: ns1}\nspec:\n  containers:\n    - name: ok\n      image: a\n    - image: nameless\n    - just-a-string\n",
        );
        let out = WorkloadExtractor::new(ExtractOptions::strict()).extract(&input).unwrap();
        let pod = &out.running_as("", "ns1")[0];
        assert_eq!(pod.containers.len(), 1);
        assert_eq!(pod.containers[0].name, "ok");
        assert_eq!(out.warnings.len(), 2);
    }

    #[test]
    fn containers_of_the_wrong_shape_are_reported() {
        let input = docs("kind: Pod\nmetadata: {name: p, namespace: ns1}\nspec:\n  containers: {name: web}\n");
        let out = WorkloadExtractor::new(ExtractOptions::strict()).extract(&input).unwrap();
        assert!(out.running_as("", "ns1")[0].containers.is_empty());
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("ignoring containers"));
    }

    #[test]
    fn namespace_falls_back() {
        let input = docs("kind: Pod\nmetadata: {name: p}\nspec:\n  containers: []\n");
        let out = lenient().extract(&input).unwrap();
        assert_eq!(out.running_as("", "default").len(), 1);

        let out = WorkloadExtractor::new(ExtractOptions::default().with_default_namespace("team-a"))
            .extract(&input)
            .unwrap();
        assert_eq!(out.running_as("", "team-a").len(), 1);
    }

    #[test]
    fn missing_name_respects_mode() {
        let input = docs("kind: Pod\nmetadata: {namespace: ns1}\nspec:\n  containers: []\n");
        let out = lenient().extract(&input).unwrap();
        assert_eq!(out.count(), 0);
        assert_eq!(out.warnings.len(), 1);
        assert!(WorkloadExtractor::new(ExtractOptions::strict()).extract(&input).is_err());
    }
}
