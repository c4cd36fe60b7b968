// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kubernetes backend.
//!
//! Each instance is a one-replica Deployment plus a NodePort Service, both
//! named after the instance id. The endpoint is formed from a worker node's
//! address and the node port the cluster allocated for the service.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{BackendError, InstanceBackend, cli};
use crate::error::Result;
use crate::events::{InstanceStatusChangeEvent, ListenerSet, StatusListener};
use crate::model::{
    ClusterArguments, EndpointFormat, InstanceDescriptor, InstanceStatus, StatusResult,
};

/// Default namespace for instance resources.
pub const DEFAULT_NAMESPACE: &str = "mdt-instance";
/// Default endpoint template; `%s` is the node address, `%d` the node port.
pub const DEFAULT_ENDPOINT_FORMAT: &str = "https://%s:%d/api/v3.0";
/// Port the service listens on inside the pod.
pub const CONTAINER_PORT: u16 = 443;
/// Name of the service port carrying the instance's API.
pub const SERVICE_PORT_NAME: &str = "service-port";
/// Label marking every resource this backend creates.
pub const LABEL_TYPE: &str = "mdt-type";
/// Value of [`LABEL_TYPE`].
pub const LABEL_TYPE_INSTANCE: &str = "instance";
/// Label carrying the instance id.
pub const LABEL_INSTANCE_ID: &str = "mdt-instance-id";

const CONTROL_PLANE_TAINTS: &[&str] = &[
    "node-role.kubernetes.io/control-plane",
    "node-role.kubernetes.io/master",
];

/// Kind of a namespaced resource this backend manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// `apps/v1` Deployment.
    Deployment,
    /// `v1` Service.
    Service,
}

impl ResourceKind {
    /// Resource name as kubectl spells it.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Deployment => "deployment",
            ResourceKind::Service => "service",
        }
    }
}

/// A cluster node as seen by worker selection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeInfo {
    /// Node name.
    pub name: String,
    /// Taint keys.
    pub taints: Vec<String>,
    /// `(type, address)` pairs in the order the node reports them.
    pub addresses: Vec<(String, String)>,
}

impl NodeInfo {
    /// Whether the node schedules ordinary workloads.
    pub fn is_worker(&self) -> bool {
        !self
            .taints
            .iter()
            .any(|t| CONTROL_PLANE_TAINTS.contains(&t.as_str()))
    }

    /// Host name if reported, otherwise the last address.
    pub fn address(&self) -> Option<&str> {
        self.addresses
            .iter()
            .find(|(kind, _)| kind == "Hostname")
            .or_else(|| self.addresses.last())
            .map(|(_, addr)| addr.as_str())
    }
}

/// Cluster API used by [`KubernetesBackend`].
///
/// Deletes are idempotent: deleting a missing resource succeeds.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Create a resource from its manifest.
    async fn create(&self, manifest: &Value) -> std::result::Result<(), BackendError>;
    /// Delete a resource by name.
    async fn delete(&self, kind: ResourceKind, name: &str)
    -> std::result::Result<(), BackendError>;
    /// Delete every deployment and service matching `selector`.
    async fn delete_labelled(&self, selector: &str) -> std::result::Result<(), BackendError>;
    /// Node port allocated for the named port of a service.
    async fn service_node_port(
        &self,
        service: &str,
        port_name: &str,
    ) -> std::result::Result<Option<u16>, BackendError>;
    /// Phases of the pods matching `selector`.
    async fn pod_phases(&self, selector: &str) -> std::result::Result<Vec<String>, BackendError>;
    /// All cluster nodes.
    async fn nodes(&self) -> std::result::Result<Vec<NodeInfo>, BackendError>;
}

/// Deployment manifest for an instance.
pub fn deployment_manifest(namespace: &str, id: &str, image: &str) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": id,
            "namespace": namespace,
            "labels": { LABEL_TYPE: LABEL_TYPE_INSTANCE, LABEL_INSTANCE_ID: id },
        },
        "spec": {
            "replicas": 1,
            "selector": {
                "matchLabels": { LABEL_TYPE: LABEL_TYPE_INSTANCE, LABEL_INSTANCE_ID: id },
            },
            "template": {
                "metadata": {
                    "labels": { LABEL_TYPE: LABEL_TYPE_INSTANCE, LABEL_INSTANCE_ID: id },
                },
                "spec": {
                    "containers": [{
                        "name": format!("container-{id}"),
                        "image": image,
                        "ports": [{ "containerPort": CONTAINER_PORT }],
                    }],
                },
            },
        },
    })
}

/// NodePort service manifest for an instance.
pub fn service_manifest(namespace: &str, id: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": id,
            "namespace": namespace,
            "labels": { LABEL_TYPE: LABEL_TYPE_INSTANCE, LABEL_INSTANCE_ID: id },
        },
        "spec": {
            "type": "NodePort",
            "selector": { LABEL_INSTANCE_ID: id },
            "ports": [{
                "name": SERVICE_PORT_NAME,
                "protocol": "TCP",
                "port": CONTAINER_PORT,
                "targetPort": CONTAINER_PORT,
            }],
        },
    })
}

/// Map a pod phase onto an instance status.
pub fn phase_status(phase: &str) -> InstanceStatus {
    match phase {
        "Pending" => InstanceStatus::Starting,
        "Running" => InstanceStatus::Running,
        "Succeeded" => InstanceStatus::Stopped,
        _ => InstanceStatus::Failed,
    }
}

fn instance_selector(id: &str) -> String {
    format!("{LABEL_INSTANCE_ID}={id}")
}

const NOT_FOUND_MARKERS: &[&str] = &["(NotFound)"];

/// [`ClusterApi`] driving `kubectl`.
#[derive(Debug, Clone)]
pub struct KubectlCli {
    namespace: String,
}

impl KubectlCli {
    /// Operate in `namespace` using the ambient kubeconfig.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    async fn kubectl(
        &self,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> std::result::Result<String, BackendError> {
        let mut full = vec!["--namespace".to_string(), self.namespace.clone()];
        full.extend(args.iter().map(|a| a.to_string()));
        cli::run("kubectl", &full, stdin, NOT_FOUND_MARKERS).await
    }
}

#[derive(Deserialize)]
struct List<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Deserialize)]
struct ServiceDoc {
    spec: ServiceSpec,
}

#[derive(Deserialize)]
struct ServiceSpec {
    #[serde(default)]
    ports: Vec<ServicePort>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServicePort {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    node_port: Option<u16>,
}

#[derive(Deserialize)]
struct PodDoc {
    #[serde(default)]
    status: Option<PodStatus>,
}

#[derive(Deserialize)]
struct PodStatus {
    #[serde(default)]
    phase: Option<String>,
}

#[derive(Deserialize)]
struct NodeDoc {
    metadata: NodeMeta,
    #[serde(default)]
    spec: Option<NodeSpec>,
    #[serde(default)]
    status: Option<NodeStatus>,
}

#[derive(Deserialize)]
struct NodeMeta {
    name: String,
}

#[derive(Deserialize)]
struct NodeSpec {
    #[serde(default)]
    taints: Vec<NodeTaint>,
}

#[derive(Deserialize)]
struct NodeTaint {
    key: String,
}

#[derive(Deserialize)]
struct NodeStatus {
    #[serde(default)]
    addresses: Vec<NodeAddress>,
}

#[derive(Deserialize)]
struct NodeAddress {
    #[serde(rename = "type")]
    kind: String,
    address: String,
}

/// Parse `kubectl get service -o json` output.
pub fn parse_node_port(json: &str, port_name: &str) -> std::result::Result<Option<u16>, BackendError> {
    let doc: ServiceDoc = serde_json::from_str(json)?;
    Ok(doc
        .spec
        .ports
        .into_iter()
        .find(|p| p.name.as_deref() == Some(port_name))
        .and_then(|p| p.node_port))
}

/// Parse `kubectl get pods -o json` output into pod phases.
pub fn parse_pod_phases(json: &str) -> std::result::Result<Vec<String>, BackendError> {
    let list: List<PodDoc> = serde_json::from_str(json)?;
    Ok(list
        .items
        .into_iter()
        .map(|pod| {
            pod.status
                .and_then(|s| s.phase)
                .unwrap_or_else(|| "Unknown".to_string())
        })
        .collect())
}

/// Parse `kubectl get nodes -o json` output.
pub fn parse_nodes(json: &str) -> std::result::Result<Vec<NodeInfo>, BackendError> {
    let list: List<NodeDoc> = serde_json::from_str(json)?;
    Ok(list
        .items
        .into_iter()
        .map(|node| NodeInfo {
            name: node.metadata.name,
            taints: node
                .spec
                .map(|s| s.taints.into_iter().map(|t| t.key).collect())
                .unwrap_or_default(),
            addresses: node
                .status
                .map(|s| {
                    s.addresses
                        .into_iter()
                        .map(|a| (a.kind, a.address))
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect())
}

#[async_trait]
impl ClusterApi for KubectlCli {
    async fn create(&self, manifest: &Value) -> std::result::Result<(), BackendError> {
        let body = serde_json::to_vec(manifest)?;
        self.kubectl(&["create", "--filename", "-"], Some(&body))
            .await?;
        Ok(())
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> std::result::Result<(), BackendError> {
        self.kubectl(&["delete", kind.as_str(), name, "--ignore-not-found"], None)
            .await?;
        Ok(())
    }

    async fn delete_labelled(&self, selector: &str) -> std::result::Result<(), BackendError> {
        self.kubectl(
            &[
                "delete",
                "deployment,service",
                "--selector",
                selector,
                "--ignore-not-found",
            ],
            None,
        )
        .await?;
        Ok(())
    }

    async fn service_node_port(
        &self,
        service: &str,
        port_name: &str,
    ) -> std::result::Result<Option<u16>, BackendError> {
        match self
            .kubectl(&["get", "service", service, "--output", "json"], None)
            .await
        {
            Ok(out) => parse_node_port(&out, port_name),
            Err(BackendError::ResourceNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn pod_phases(&self, selector: &str) -> std::result::Result<Vec<String>, BackendError> {
        let out = self
            .kubectl(&["get", "pods", "--selector", selector, "--output", "json"], None)
            .await?;
        parse_pod_phases(&out)
    }

    async fn nodes(&self) -> std::result::Result<Vec<NodeInfo>, BackendError> {
        let out = self.kubectl(&["get", "nodes", "--output", "json"], None).await?;
        parse_nodes(&out)
    }
}

/// Backend running each instance as a Deployment/Service pair.
pub struct KubernetesBackend {
    api: Arc<dyn ClusterApi>,
    namespace: String,
    endpoint_format: EndpointFormat,
    listeners: ListenerSet,
    next_worker: AtomicUsize,
    /// Worker host chosen for each started instance.
    hosts: Mutex<HashMap<String, String>>,
}

impl KubernetesBackend {
    /// Create a backend. `endpoint_format` takes a `%s` host and a `%d` port.
    pub fn new(
        api: Arc<dyn ClusterApi>,
        namespace: impl Into<String>,
        endpoint_format: EndpointFormat,
    ) -> Self {
        Self {
            api,
            namespace: namespace.into(),
            endpoint_format,
            listeners: ListenerSet::new(),
            next_worker: AtomicUsize::new(0),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Namespace the backend creates resources in.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Pick a worker node address, rotating over the eligible workers.
    async fn select_worker_host(&self) -> Result<String> {
        let nodes = self.api.nodes().await?;
        let hosts: Vec<&str> = nodes
            .iter()
            .filter(|n| n.is_worker())
            .filter_map(NodeInfo::address)
            .collect();
        if hosts.is_empty() {
            return Err(BackendError::Protocol("no schedulable worker node".into()).into());
        }
        let index = self.next_worker.fetch_add(1, Ordering::Relaxed) % hosts.len();
        Ok(hosts[index].to_string())
    }

    async fn host_for(&self, id: &str) -> Result<String> {
        let cached = self.hosts.lock().get(id).cloned();
        match cached {
            Some(host) => Ok(host),
            None => {
                let host = self.select_worker_host().await?;
                self.hosts.lock().insert(id.to_string(), host.clone());
                Ok(host)
            }
        }
    }

    async fn endpoint(&self, id: &str) -> Result<Option<String>> {
        let Some(port) = self.api.service_node_port(id, SERVICE_PORT_NAME).await? else {
            return Ok(None);
        };
        let host = self.host_for(id).await?;
        Ok(Some(self.endpoint_format.render_for_host(&host, port)))
    }

    /// Create the service for an already created deployment and resolve its endpoint.
    async fn expose(&self, id: &str) -> Result<String> {
        self.api.create(&service_manifest(&self.namespace, id)).await?;
        self.endpoint(id).await?.ok_or_else(|| {
            BackendError::Protocol(format!("service {id} has no node port for {SERVICE_PORT_NAME}"))
                .into()
        })
    }

    async fn delete_resources(&self, id: &str) {
        for kind in [ResourceKind::Service, ResourceKind::Deployment] {
            if let Err(e) = self.api.delete(kind, id).await {
                warn!(instance_id = %id, kind = kind.as_str(), error = %e, "Failed to delete cluster resource");
            }
        }
        self.hosts.lock().remove(id);
    }
}

#[async_trait]
impl InstanceBackend for KubernetesBackend {
    fn backend_type(&self) -> &'static str {
        "kubernetes"
    }

    fn add_listener(&self, listener: Arc<dyn StatusListener>) {
        self.listeners.add(listener);
    }

    async fn initialize(&self, descriptor: InstanceDescriptor) -> Result<InstanceDescriptor> {
        // resources are created on start
        let _: ClusterArguments = descriptor.arguments()?;
        Ok(descriptor)
    }

    async fn start(&self, descriptor: &InstanceDescriptor) -> Result<StatusResult> {
        let id = descriptor.id.as_str();
        let args: ClusterArguments = descriptor.arguments()?;

        let current = self.status_result(descriptor).await?;
        if current.status.is_active() {
            debug!(instance_id = %id, status = %current.status, "Start ignored, already active");
            return Ok(current);
        }

        self.listeners
            .notify(&InstanceStatusChangeEvent::new(id, InstanceStatus::Starting));

        // only resources created by this call are rolled back
        if let Err(e) = self
            .api
            .create(&deployment_manifest(&self.namespace, id, &args.image_id))
            .await
        {
            warn!(instance_id = %id, error = %e, "Failed to create deployment");
            self.listeners
                .notify(&InstanceStatusChangeEvent::new(id, InstanceStatus::Stopped));
            return Err(e.into());
        }

        match self.expose(id).await {
            Ok(endpoint) => {
                info!(instance_id = %id, namespace = %self.namespace, endpoint = %endpoint, "Deployment created");
                let result = StatusResult::running(id, endpoint);
                self.listeners.notify(&(&result).into());
                Ok(result)
            }
            Err(e) => {
                warn!(instance_id = %id, error = %e, "Failed to deploy instance, rolling back");
                self.delete_resources(id).await;
                self.listeners
                    .notify(&InstanceStatusChangeEvent::new(id, InstanceStatus::Stopped));
                Err(e)
            }
        }
    }

    async fn stop(&self, descriptor: &InstanceDescriptor) -> Result<StatusResult> {
        let id = descriptor.id.as_str();
        self.listeners
            .notify(&InstanceStatusChangeEvent::new(id, InstanceStatus::Stopping));
        self.delete_resources(id).await;
        info!(instance_id = %id, "Deployment deleted");
        self.listeners
            .notify(&InstanceStatusChangeEvent::new(id, InstanceStatus::Stopped));
        Ok(StatusResult::new(id, InstanceStatus::Stopped))
    }

    async fn status(&self, descriptor: &InstanceDescriptor) -> Result<InstanceStatus> {
        let phases = self
            .api
            .pod_phases(&instance_selector(&descriptor.id))
            .await?;
        Ok(phases
            .first()
            .map(|p| phase_status(p))
            .unwrap_or(InstanceStatus::Stopped))
    }

    async fn service_endpoint(&self, descriptor: &InstanceDescriptor) -> Result<Option<String>> {
        if self.status(descriptor).await? != InstanceStatus::Running {
            return Ok(None);
        }
        self.endpoint(&descriptor.id).await
    }

    async fn status_result(&self, descriptor: &InstanceDescriptor) -> Result<StatusResult> {
        let status = self.status(descriptor).await?;
        let endpoint = if status == InstanceStatus::Running {
            self.endpoint(&descriptor.id).await?
        } else {
            None
        };
        Ok(StatusResult::with_endpoint(&descriptor.id, status, endpoint))
    }

    async fn destroy(&self, descriptor: &InstanceDescriptor) -> Result<()> {
        debug!(instance_id = %descriptor.id, "Destroying cluster resources");
        self.delete_resources(&descriptor.id).await;
        Ok(())
    }

    async fn purge(&self) -> Result<()> {
        self.api
            .delete_labelled(&format!("{LABEL_TYPE}={LABEL_TYPE_INSTANCE}"))
            .await?;
        self.hosts.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[derive(Default)]
    struct FakeCluster {
        resources: Mutex<Vec<(ResourceKind, String)>>,
        phases: Mutex<HashMap<String, String>>,
        nodes: Vec<NodeInfo>,
        fail_service: bool,
        reject_duplicates: bool,
    }

    impl FakeCluster {
        fn with_nodes() -> Self {
            Self {
                nodes: vec![
                    NodeInfo {
                        name: "cp".into(),
                        taints: vec!["node-role.kubernetes.io/control-plane".into()],
                        addresses: vec![("Hostname".into(), "cp.local".into())],
                    },
                    NodeInfo {
                        name: "w1".into(),
                        taints: vec![],
                        addresses: vec![
                            ("InternalIP".into(), "10.0.0.2".into()),
                            ("Hostname".into(), "w1.local".into()),
                        ],
                    },
                    NodeInfo {
                        name: "w2".into(),
                        taints: vec![],
                        addresses: vec![("InternalIP".into(), "10.0.0.3".into())],
                    },
                ],
                ..Default::default()
            }
        }

        fn has(&self, kind: ResourceKind, name: &str) -> bool {
            self.resources
                .lock()
                .iter()
                .any(|(k, n)| *k == kind && n == name)
        }
    }

    #[async_trait]
    impl ClusterApi for FakeCluster {
        async fn create(&self, manifest: &Value) -> std::result::Result<(), BackendError> {
            let kind = match manifest["kind"].as_str() {
                Some("Deployment") => ResourceKind::Deployment,
                Some("Service") if self.fail_service => {
                    return Err(BackendError::Command {
                        program: "kubectl".into(),
                        status: "exit status: 1".into(),
                        stderr: "provided port is already allocated".into(),
                    });
                }
                _ => ResourceKind::Service,
            };
            let name = manifest["metadata"]["name"].as_str().unwrap_or_default();
            if self.reject_duplicates && self.has(kind, name) {
                return Err(BackendError::Command {
                    program: "kubectl".into(),
                    status: "exit status: 1".into(),
                    stderr: format!("{} \"{name}\" already exists (AlreadyExists)", kind.as_str()),
                });
            }
            self.resources.lock().push((kind, name.to_string()));
            if kind == ResourceKind::Deployment {
                self.phases.lock().insert(name.to_string(), "Pending".into());
            }
            Ok(())
        }

        async fn delete(
            &self,
            kind: ResourceKind,
            name: &str,
        ) -> std::result::Result<(), BackendError> {
            self.resources
                .lock()
                .retain(|(k, n)| !(*k == kind && n == name));
            if kind == ResourceKind::Deployment {
                self.phases.lock().remove(name);
            }
            Ok(())
        }

        async fn delete_labelled(&self, _selector: &str) -> std::result::Result<(), BackendError> {
            self.resources.lock().clear();
            self.phases.lock().clear();
            Ok(())
        }

        async fn service_node_port(
            &self,
            service: &str,
            _port_name: &str,
        ) -> std::result::Result<Option<u16>, BackendError> {
            Ok(self
                .has(ResourceKind::Service, service)
                .then_some(30443))
        }

        async fn pod_phases(
            &self,
            selector: &str,
        ) -> std::result::Result<Vec<String>, BackendError> {
            let id = selector.trim_start_matches("mdt-instance-id=");
            Ok(self.phases.lock().get(id).cloned().into_iter().collect())
        }

        async fn nodes(&self) -> std::result::Result<Vec<NodeInfo>, BackendError> {
            Ok(self.nodes.clone())
        }
    }

    fn descriptor() -> InstanceDescriptor {
        InstanceDescriptor {
            id: "vacuum".into(),
            aas_id: "urn:aas:vacuum".into(),
            aas_id_short: None,
            submodels: vec![],
            arguments: json!({"imageId": "mdt/fa3st:latest"}),
        }
    }

    fn backend(api: Arc<FakeCluster>) -> KubernetesBackend {
        KubernetesBackend::new(
            api,
            DEFAULT_NAMESPACE,
            EndpointFormat::new(DEFAULT_ENDPOINT_FORMAT),
        )
    }

    #[test]
    fn test_manifests() {
        let deployment = deployment_manifest("ns", "vacuum", "img:1");
        assert_eq!(deployment["spec"]["replicas"], 1);
        assert_eq!(
            deployment["spec"]["template"]["spec"]["containers"][0]["name"],
            "container-vacuum"
        );
        assert_eq!(
            deployment["spec"]["selector"]["matchLabels"][LABEL_INSTANCE_ID],
            "vacuum"
        );

        let service = service_manifest("ns", "vacuum");
        assert_eq!(service["spec"]["type"], "NodePort");
        assert_eq!(service["spec"]["ports"][0]["name"], SERVICE_PORT_NAME);
        assert_eq!(service["spec"]["ports"][0]["port"], 443);
    }

    #[test]
    fn test_phase_mapping() {
        assert_eq!(phase_status("Pending"), InstanceStatus::Starting);
        assert_eq!(phase_status("Running"), InstanceStatus::Running);
        assert_eq!(phase_status("Succeeded"), InstanceStatus::Stopped);
        assert_eq!(phase_status("Failed"), InstanceStatus::Failed);
        assert_eq!(phase_status("Unknown"), InstanceStatus::Failed);
    }

    #[test]
    fn test_parse_kubectl_output() {
        let service = r#"{"spec": {"ports": [{"name": "service-port", "port": 443, "nodePort": 31000}]}}"#;
        assert_eq!(parse_node_port(service, SERVICE_PORT_NAME).unwrap(), Some(31000));
        assert_eq!(parse_node_port(service, "other").unwrap(), None);

        let pods = r#"{"items": [{"status": {"phase": "Running"}}, {"status": {}}]}"#;
        assert_eq!(parse_pod_phases(pods).unwrap(), vec!["Running", "Unknown"]);

        let nodes = r#"{"items": [{
            "metadata": {"name": "w1"},
            "spec": {"taints": [{"key": "node-role.kubernetes.io/master", "effect": "NoSchedule"}]},
            "status": {"addresses": [{"type": "InternalIP", "address": "10.0.0.2"}]}
        }]}"#;
        let nodes = parse_nodes(nodes).unwrap();
        assert!(!nodes[0].is_worker());
        assert_eq!(nodes[0].address(), Some("10.0.0.2"));
    }

    #[test]
    fn test_node_address_prefers_hostname() {
        let node = NodeInfo {
            name: "w".into(),
            taints: vec![],
            addresses: vec![
                ("Hostname".into(), "w.local".into()),
                ("InternalIP".into(), "10.0.0.9".into()),
            ],
        };
        assert_eq!(node.address(), Some("w.local"));
        assert_eq!(NodeInfo::default().address(), None);
    }

    #[tokio::test]
    async fn test_start_status_stop() {
        let api = Arc::new(FakeCluster::with_nodes());
        let backend = backend(api.clone());
        let desc = backend.initialize(descriptor()).await.unwrap();

        assert_eq!(backend.status(&desc).await.unwrap(), InstanceStatus::Stopped);

        let started = backend.start(&desc).await.unwrap();
        assert_eq!(started.status, InstanceStatus::Running);
        assert_eq!(
            started.service_endpoint.as_deref(),
            Some("https://w1.local:30443/api/v3.0")
        );
        assert!(api.has(ResourceKind::Deployment, "vacuum"));
        assert!(api.has(ResourceKind::Service, "vacuum"));

        // pod still pending
        assert_eq!(backend.status(&desc).await.unwrap(), InstanceStatus::Starting);
        assert_eq!(backend.service_endpoint(&desc).await.unwrap(), None);

        api.phases.lock().insert("vacuum".into(), "Running".into());
        let result = backend.status_result(&desc).await.unwrap();
        assert_eq!(result, started);

        let stopped = backend.stop(&desc).await.unwrap();
        assert_eq!(stopped.status, InstanceStatus::Stopped);
        assert!(api.resources.lock().is_empty());
        assert_eq!(backend.status(&desc).await.unwrap(), InstanceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_while_active() {
        let api = Arc::new(FakeCluster {
            reject_duplicates: true,
            ..FakeCluster::with_nodes()
        });
        let backend = backend(api.clone());
        let desc = descriptor();

        let started = backend.start(&desc).await.unwrap();
        assert_eq!(started.status, InstanceStatus::Running);

        // pod pending: the second start reports the current state
        let again = backend.start(&desc).await.unwrap();
        assert_eq!(again.status, InstanceStatus::Starting);
        assert_eq!(again.service_endpoint, None);

        api.phases.lock().insert("vacuum".into(), "Running".into());
        let again = backend.start(&desc).await.unwrap();
        assert_eq!(again, started);

        assert!(api.has(ResourceKind::Deployment, "vacuum"));
        assert!(api.has(ResourceKind::Service, "vacuum"));
        assert_eq!(api.resources.lock().len(), 2);
        assert_eq!(backend.status(&desc).await.unwrap(), InstanceStatus::Running);
    }

    #[tokio::test]
    async fn test_rejected_deployment_is_not_rolled_back() {
        let api = Arc::new(FakeCluster {
            reject_duplicates: true,
            ..FakeCluster::with_nodes()
        });
        // a deployment left behind without pods
        api.resources
            .lock()
            .push((ResourceKind::Deployment, "vacuum".into()));
        let backend = backend(api.clone());

        let err = backend.start(&descriptor()).await.unwrap_err();
        assert!(matches!(err, Error::Backend(BackendError::Command { .. })));
        assert!(api.has(ResourceKind::Deployment, "vacuum"));
    }

    #[tokio::test]
    async fn test_start_failure_rolls_back() {
        let api = Arc::new(FakeCluster {
            fail_service: true,
            ..FakeCluster::with_nodes()
        });
        let backend = backend(api.clone());

        let err = backend.start(&descriptor()).await.unwrap_err();
        assert!(matches!(err, Error::Backend(BackendError::Command { .. })));
        assert!(api.resources.lock().is_empty());
    }

    #[tokio::test]
    async fn test_no_worker_rolls_back() {
        let api = Arc::new(FakeCluster::default());
        let backend = backend(api.clone());

        let err = backend.start(&descriptor()).await.unwrap_err();
        assert!(matches!(err, Error::Backend(BackendError::Protocol(_))));
        assert!(api.resources.lock().is_empty());
    }

    #[tokio::test]
    async fn test_worker_rotation() {
        let backend = backend(Arc::new(FakeCluster::with_nodes()));
        let first = backend.select_worker_host().await.unwrap();
        let second = backend.select_worker_host().await.unwrap();
        let third = backend.select_worker_host().await.unwrap();
        assert_eq!(first, "w1.local");
        assert_eq!(second, "10.0.0.3");
        assert_eq!(third, first);
    }
}
