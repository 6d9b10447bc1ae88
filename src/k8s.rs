use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{Event, Namespace, Pod};
use k8s_openapi::jiff::Timestamp;
use kube::api::{ListParams, LogParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, ResourceExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::time::Duration;
use tracing::{debug, warn};

use crate::error::QueryError;
use crate::exec::{self, ExecTarget};
use crate::format;
use crate::model::{LogWindow, NamespaceScope, PodRef, PodSnapshot};

#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    kubeconfig_path: Option<PathBuf>,
    context: String,
    cluster: String,
    default_namespace: String,
    log_window: LogWindow,
    exec_timeout: Duration,
}

impl KubeGateway {
    pub async fn new(
        kubeconfig_path: Option<PathBuf>,
        log_window: LogWindow,
        exec_timeout: Duration,
    ) -> Result<Self> {
        let kubeconfig = match kubeconfig_path.as_deref() {
            Some(path) => Some(
                Kubeconfig::read_from(path)
                    .with_context(|| format!("failed to read kubeconfig {}", path.display()))?,
            ),
            None => Kubeconfig::read().ok(),
        };

        let config = match kubeconfig.clone() {
            Some(kubeconfig) => {
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .context("failed to infer Kubernetes configuration")?
            }
            None => Config::infer()
                .await
                .context("failed to infer Kubernetes configuration")?,
        };

        let cluster = config.cluster_url.to_string();
        let default_namespace = config.default_namespace.clone();
        let client = Client::try_from(config).context("failed to initialize Kubernetes client")?;
        let context = kubeconfig
            .and_then(|kubeconfig| kubeconfig.current_context)
            .unwrap_or_else(|| "in-cluster".to_string());
        debug!("connected context={context} cluster={cluster}");

        Ok(Self {
            client,
            kubeconfig_path,
            context,
            cluster,
            default_namespace,
            log_window,
            exec_timeout,
        })
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    pub fn kubeconfig_path(&self) -> Option<&Path> {
        self.kubeconfig_path.as_deref()
    }

    pub async fn list_namespaces(&self) -> Result<Vec<String>, QueryError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let list = namespaces.list(&ListParams::default()).await?;
        Ok(list.into_iter().map(|namespace| namespace.name_any()).collect())
    }

    pub async fn list_pods(&self, scope: &NamespaceScope) -> Result<Vec<PodRef>, QueryError> {
        let pods: Api<Pod> = match scope {
            NamespaceScope::All => Api::all(self.client.clone()),
            NamespaceScope::Named(namespace) => Api::namespaced(self.client.clone(), namespace),
        };
        let list = pods.list(&ListParams::default()).await?;
        debug!("listed {} pods in scope={scope}", list.items.len());
        Ok(pod_refs(&list.items))
    }

    /// Full-cluster scan; only for callers that hold a pod name without its
    /// namespace. Returns an empty string when no pod matches.
    pub async fn pod_namespace(&self, name: &str) -> Result<String, QueryError> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods.list(&ListParams::default()).await?;
        Ok(namespace_for_pod(&list.items, name))
    }

    async fn get_pod(&self, pod: &PodRef) -> Result<Pod, QueryError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &pod.namespace);
        Ok(pods.get(&pod.name).await?)
    }

    pub async fn pod_snapshot(&self, pod: &PodRef) -> Result<PodSnapshot, QueryError> {
        let fetched = self.get_pod(pod).await?;
        Ok(snapshot_from_pod(&fetched, Timestamp::now()))
    }

    pub async fn pod_labels(&self, pod: &PodRef) -> Result<String, QueryError> {
        let fetched = self.get_pod(pod).await?;
        Ok(format::map_lines(fetched.labels()))
    }

    pub async fn pod_annotations(&self, pod: &PodRef) -> Result<String, QueryError> {
        let fetched = self.get_pod(pod).await?;
        Ok(format::map_lines(fetched.annotations()))
    }

    pub async fn pod_events(&self, pod: &PodRef) -> Result<Vec<String>, QueryError> {
        let events: Api<Event> = Api::namespaced(self.client.clone(), &pod.namespace);
        let params = ListParams::default().fields(&event_field_selector(&pod.name));
        let list = events.list(&params).await?;
        Ok(list.iter().map(format::event_line).collect())
    }

    pub async fn pod_volumes(&self, pod: &PodRef) -> Result<String, QueryError> {
        let fetched = self.get_pod(pod).await?;
        format::volume_block(&fetched)
    }

    pub async fn pod_describe(&self, pod: &PodRef) -> Result<String, QueryError> {
        let fetched = self.get_pod(pod).await?;
        Ok(format::describe_block(&fetched))
    }

    pub async fn pod_logs(&self, pod: &PodRef, container: &str) -> Result<String, QueryError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &pod.namespace);
        let params = log_params(container, self.log_window);
        let logs = pods.logs(&pod.name, &params).await.inspect_err(|error| {
            warn!("log request failed for {pod}:{container}: {error}");
        })?;
        Ok(logs)
    }

    pub async fn pod_yaml(&self, pod: &PodRef) -> Result<String, QueryError> {
        let fetched = self.get_pod(pod).await?;
        yaml_manifest(fetched)
    }

    /// Runs `sh -c <command>` in the container; failures are folded into the
    /// returned text.
    pub async fn exec_in_container(&self, pod: &PodRef, container: &str, command: &str) -> String {
        let target = ExecTarget {
            pod: pod.clone(),
            container: container.to_string(),
        };
        let output = exec::run_in_container(
            self.client.clone(),
            target,
            command.to_string(),
            self.exec_timeout,
        )
        .await;
        format::strip_ansi(&output)
    }
}

/// Rereads the kubeconfig and returns its current context name.
pub fn current_context(kubeconfig_path: Option<&Path>) -> Result<String, QueryError> {
    let kubeconfig = match kubeconfig_path {
        Some(path) => Kubeconfig::read_from(path)?,
        None => Kubeconfig::read()?,
    };
    Ok(kubeconfig.current_context.unwrap_or_default())
}

pub fn pod_refs(pods: &[Pod]) -> Vec<PodRef> {
    pods.iter()
        .map(|pod| PodRef::new(pod.name_any(), pod.namespace().unwrap_or_default()))
        .collect()
}

/// Later pods win when the same name exists in several namespaces.
pub fn namespace_for_pod(pods: &[Pod], name: &str) -> String {
    let by_name = pods
        .iter()
        .map(|pod| (pod.name_any(), pod.namespace().unwrap_or_default()))
        .collect::<HashMap<_, _>>();
    by_name.get(name).cloned().unwrap_or_default()
}

pub fn snapshot_from_pod(pod: &Pod, now: Timestamp) -> PodSnapshot {
    let spec = pod.spec.as_ref();
    PodSnapshot {
        name: pod.name_any(),
        namespace: pod.namespace().unwrap_or_default(),
        phase: pod
            .status
            .as_ref()
            .and_then(|status| status.phase.clone())
            .unwrap_or_default(),
        age: format::pod_age(pod.metadata.creation_timestamp.as_ref(), now),
        node: spec
            .and_then(|spec| spec.node_name.clone())
            .unwrap_or_default(),
        containers: spec
            .map(|spec| {
                spec.containers
                    .iter()
                    .map(|container| container.name.clone())
                    .collect()
            })
            .unwrap_or_default(),
        labels: pod.labels().clone(),
        annotations: pod.annotations().clone(),
    }
}

/// Serializes the pod without server-managed noise.
pub fn yaml_manifest(mut pod: Pod) -> Result<String, QueryError> {
    pod.metadata.managed_fields = None;
    pod.metadata.generate_name = None;
    pod.status = None;
    Ok(serde_yaml::to_string(&pod)?)
}

fn event_field_selector(pod_name: &str) -> String {
    format!("involvedObject.name={pod_name},involvedObject.kind=Pod")
}

fn log_params(container: &str, window: LogWindow) -> LogParams {
    let mut params = LogParams {
        container: Some(container.to_string()),
        ..LogParams::default()
    };
    match window {
        LogWindow::TailLines(lines) => params.tail_lines = Some(lines),
        LogWindow::SinceSeconds(seconds) => params.since_seconds = Some(seconds),
    }
    params
}

#[cfg(test)]
mod tests {
    use super::{
        event_field_selector, log_params, namespace_for_pod, pod_refs, snapshot_from_pod,
        yaml_manifest,
    };
    use crate::model::{LogWindow, PodRef};
    use k8s_openapi::api::core::v1::Pod;
    use serde_json::json;

    fn pod(name: &str, namespace: &str) -> Pod {
        serde_json::from_value(json!({
            "metadata": { "name": name, "namespace": namespace }
        }))
        .unwrap()
    }

    #[test]
    fn pod_names_keep_list_order() {
        let pods = vec![pod("a", "default"), pod("b", "default")];
        let names = pod_refs(&pods)
            .into_iter()
            .map(|pod| pod.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            pod_refs(&pods),
            vec![PodRef::new("a", "default"), PodRef::new("b", "default")]
        );
    }

    #[test]
    fn namespace_lookup_finds_owning_namespace() {
        let pods = vec![pod("a", "default"), pod("b", "kube-system")];
        assert_eq!(namespace_for_pod(&pods, "a"), "default");
        assert_eq!(namespace_for_pod(&pods, "missing"), "");
        assert_eq!(namespace_for_pod(&[], "a"), "");
    }

    #[test]
    fn namespace_lookup_is_last_write_wins() {
        let pods = vec![pod("a", "default"), pod("a", "staging")];
        assert_eq!(namespace_for_pod(&pods, "a"), "staging");
    }

    #[test]
    fn snapshot_copies_display_fields() {
        let fetched: Pod = serde_json::from_value(json!({
            "metadata": {
                "name": "web-0",
                "namespace": "default",
                "creationTimestamp": "2024-03-01T10:00:00Z",
                "labels": { "app": "web" },
                "annotations": { "note": "x" }
            },
            "spec": {
                "nodeName": "node-a",
                "containers": [{ "name": "app" }, { "name": "sidecar" }]
            },
            "status": { "phase": "Running" }
        }))
        .unwrap();
        let now = "2024-03-03T12:00:00Z".parse().unwrap();

        let snapshot = snapshot_from_pod(&fetched, now);
        assert_eq!(snapshot.phase, "Running");
        assert_eq!(snapshot.age, "2d");
        assert_eq!(snapshot.node, "node-a");
        assert_eq!(snapshot.containers, vec!["app", "sidecar"]);
        assert_eq!(snapshot.labels.get("app").map(String::as_str), Some("web"));
        assert_eq!(snapshot.annotations.len(), 1);
    }

    #[test]
    fn yaml_manifest_strips_server_fields() {
        let fetched: Pod = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "web-0",
                "namespace": "default",
                "generateName": "web-",
                "managedFields": [{ "manager": "kubectl", "operation": "Update" }]
            },
            "spec": { "containers": [{ "name": "app", "image": "nginx" }] },
            "status": { "phase": "Running" }
        }))
        .unwrap();

        let yaml = yaml_manifest(fetched).unwrap();
        assert!(yaml.contains("kind: Pod"));
        assert!(yaml.contains("name: web-0"));
        assert!(yaml.contains("image: nginx"));
        assert!(!yaml.contains("generateName"));
        assert!(!yaml.contains("managedFields"));
        assert!(!yaml.contains("status:"));
        assert!(!yaml.contains("phase"));
    }

    #[test]
    fn event_selector_scopes_to_pod_kind() {
        assert_eq!(
            event_field_selector("web-0"),
            "involvedObject.name=web-0,involvedObject.kind=Pod"
        );
    }

    #[test]
    fn log_params_follow_window() {
        let lines = log_params("app", LogWindow::TailLines(1_000));
        assert_eq!(lines.container.as_deref(), Some("app"));
        assert_eq!(lines.tail_lines, Some(1_000));
        assert_eq!(lines.since_seconds, None);

        let window = log_params("app", LogWindow::SinceSeconds(3_600));
        assert_eq!(window.tail_lines, None);
        assert_eq!(window.since_seconds, Some(3_600));
    }
}
