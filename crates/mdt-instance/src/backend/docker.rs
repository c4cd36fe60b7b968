// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Docker container backend.
//!
//! One container per instance, named after the instance id. The service's
//! port 443 is published on a random host port; readiness is whatever the
//! daemon reports for the container.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{BackendError, InstanceBackend, cli, copy_if_not_same};
use crate::error::{Error, Result};
use crate::events::{InstanceStatusChangeEvent, ListenerSet, StatusListener};
use crate::model::{
    ContainerArguments, EndpointFormat, InstanceDescriptor, InstanceStatus, StatusResult,
};

/// Port the service listens on inside the container.
pub const CONTAINER_PORT: u16 = 443;
/// Label carrying the instance id; also used to find leftover containers.
pub const LABEL_INSTANCE_ID: &str = "mdt-id";
/// Label carrying the shell id.
pub const LABEL_AAS_ID: &str = "mdt-aas-id";
/// Label carrying the shell short id.
pub const LABEL_AAS_ID_SHORT: &str = "mdt-aas-id-short";
/// Grace period before `docker stop` kills the container.
pub const STOP_GRACE: Duration = Duration::from_secs(30);

/// A bind mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    /// Path on the docker host.
    pub host: PathBuf,
    /// Path inside the container.
    pub container: String,
    /// Mount read-only.
    pub read_only: bool,
}

/// Everything needed to create a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Bind mounts.
    pub binds: Vec<BindMount>,
    /// Container port published to a random host port on all interfaces.
    pub published_port: u16,
    /// Container labels.
    pub labels: BTreeMap<String, String>,
}

/// The parts of a container inspect the backend cares about.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerState {
    /// Whether the container is running.
    pub running: bool,
    /// Daemon-reported error, empty when none.
    pub error: String,
    /// Host port bound to the published container port.
    pub host_port: Option<u16>,
}

impl ContainerState {
    /// Map the inspect result onto an instance status.
    pub fn status(&self) -> InstanceStatus {
        if self.running {
            InstanceStatus::Running
        } else if !self.error.is_empty() {
            InstanceStatus::Failed
        } else {
            InstanceStatus::Stopped
        }
    }
}

/// Container-management API used by [`DockerBackend`].
///
/// Operations on a missing container fail with
/// [`BackendError::ResourceNotFound`]; `inspect` returns `None` instead.
#[async_trait]
pub trait ContainerApi: Send + Sync {
    /// Create (but do not start) a container, returning its id.
    async fn create(&self, spec: &ContainerSpec) -> std::result::Result<String, BackendError>;
    /// Start a container.
    async fn start(&self, container: &str) -> std::result::Result<(), BackendError>;
    /// Inspect a container.
    async fn inspect(
        &self,
        container: &str,
    ) -> std::result::Result<Option<ContainerState>, BackendError>;
    /// Stop a container, killing it after `grace`.
    async fn stop(&self, container: &str, grace: Duration)
    -> std::result::Result<(), BackendError>;
    /// Force-remove a container.
    async fn remove(&self, container: &str) -> std::result::Result<(), BackendError>;
    /// Ids of all containers (running or not) carrying `label`.
    async fn list_labelled(&self, label: &str) -> std::result::Result<Vec<String>, BackendError>;
}

const NOT_FOUND_MARKERS: &[&str] = &["No such container", "No such object"];

/// [`ContainerApi`] driving the `docker` CLI.
#[derive(Debug, Clone, Default)]
pub struct DockerCli {
    host: Option<String>,
}

impl DockerCli {
    /// Talk to the default daemon, or to `host` (passed as `--host`).
    pub fn new(host: Option<String>) -> Self {
        Self { host }
    }

    fn args<I, S>(&self, rest: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = Vec::new();
        if let Some(host) = &self.host {
            args.push("--host".to_string());
            args.push(host.clone());
        }
        args.extend(rest.into_iter().map(Into::into));
        args
    }

    async fn docker(&self, args: Vec<String>) -> std::result::Result<String, BackendError> {
        cli::run("docker", &args, None, NOT_FOUND_MARKERS).await
    }
}

/// Arguments of `docker create` for `spec`.
pub fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "--publish".to_string(),
        format!("0.0.0.0::{}/tcp", spec.published_port),
    ];
    for bind in &spec.binds {
        args.push("--volume".to_string());
        let mode = if bind.read_only { ":ro" } else { "" };
        args.push(format!("{}:{}{mode}", bind.host.display(), bind.container));
    }
    for (key, value) in &spec.labels {
        args.push("--label".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(spec.image.clone());
    args
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectDoc {
    state: InspectState,
    #[serde(default)]
    network_settings: Option<InspectNetwork>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    running: bool,
    #[serde(default)]
    error: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectNetwork {
    #[serde(default)]
    ports: Option<BTreeMap<String, Option<Vec<InspectBinding>>>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectBinding {
    host_port: String,
}

/// Parse `docker inspect` output for a container.
pub fn parse_inspect(
    json: &str,
    container_port: u16,
) -> std::result::Result<Option<ContainerState>, BackendError> {
    let docs: Vec<InspectDoc> = serde_json::from_str(json)?;
    let Some(doc) = docs.into_iter().next() else {
        return Ok(None);
    };
    let key = format!("{container_port}/tcp");
    let host_port = doc
        .network_settings
        .and_then(|n| n.ports)
        .and_then(|mut ports| ports.remove(&key).flatten())
        .and_then(|bindings| bindings.into_iter().next())
        .and_then(|b| b.host_port.parse().ok());
    Ok(Some(ContainerState {
        running: doc.state.running,
        error: doc.state.error,
        host_port,
    }))
}

#[async_trait]
impl ContainerApi for DockerCli {
    async fn create(&self, spec: &ContainerSpec) -> std::result::Result<String, BackendError> {
        let out = self.docker(self.args(create_args(spec))).await?;
        let id = out.trim().to_string();
        if id.is_empty() {
            return Err(BackendError::Protocol("docker create printed no id".into()));
        }
        Ok(id)
    }

    async fn start(&self, container: &str) -> std::result::Result<(), BackendError> {
        self.docker(self.args(["start", container])).await?;
        Ok(())
    }

    async fn inspect(
        &self,
        container: &str,
    ) -> std::result::Result<Option<ContainerState>, BackendError> {
        match self
            .docker(self.args(["inspect", "--type", "container", container]))
            .await
        {
            Ok(out) => parse_inspect(&out, CONTAINER_PORT),
            Err(BackendError::ResourceNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn stop(
        &self,
        container: &str,
        grace: Duration,
    ) -> std::result::Result<(), BackendError> {
        let secs = grace.as_secs().to_string();
        self.docker(self.args(["stop", "--time", secs.as_str(), container]))
            .await?;
        Ok(())
    }

    async fn remove(&self, container: &str) -> std::result::Result<(), BackendError> {
        self.docker(self.args(["rm", "--force", container])).await?;
        Ok(())
    }

    async fn list_labelled(&self, label: &str) -> std::result::Result<Vec<String>, BackendError> {
        let filter = format!("label={label}");
        let out = self
            .docker(self.args(["ps", "--all", "--quiet", "--filter", filter.as_str()]))
            .await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Backend running each instance as a Docker container.
pub struct DockerBackend {
    api: Arc<dyn ContainerApi>,
    workspace: PathBuf,
    mount_prefix: Option<PathBuf>,
    endpoint_format: EndpointFormat,
    listeners: ListenerSet,
}

impl DockerBackend {
    /// Create a backend.
    ///
    /// `mount_prefix` replaces the workspace root in bind-mount host paths,
    /// for daemons that see the workspace under a different path.
    pub fn new(
        api: Arc<dyn ContainerApi>,
        workspace: impl Into<PathBuf>,
        mount_prefix: Option<PathBuf>,
        endpoint_format: EndpointFormat,
    ) -> Self {
        Self {
            api,
            workspace: workspace.into(),
            mount_prefix,
            endpoint_format,
            listeners: ListenerSet::new(),
        }
    }

    fn host_path(&self, id: &str, file: &str, local: &Path) -> PathBuf {
        match &self.mount_prefix {
            Some(prefix) => prefix.join(id).join(file),
            None => local.to_path_buf(),
        }
    }

    fn container_of(descriptor: &InstanceDescriptor) -> Result<String> {
        let args: ContainerArguments = descriptor.arguments()?;
        Ok(args.container_id.unwrap_or_else(|| descriptor.id.clone()))
    }

    fn endpoint_of(&self, state: &ContainerState) -> Option<String> {
        state
            .running
            .then_some(state.host_port)
            .flatten()
            .map(|port| self.endpoint_format.render(port))
    }
}

#[async_trait]
impl InstanceBackend for DockerBackend {
    fn backend_type(&self) -> &'static str {
        "docker"
    }

    fn add_listener(&self, listener: Arc<dyn StatusListener>) {
        self.listeners.add(listener);
    }

    async fn initialize(&self, mut descriptor: InstanceDescriptor) -> Result<InstanceDescriptor> {
        let mut args: ContainerArguments = descriptor.arguments()?;
        let dir = self.workspace.join(&descriptor.id);
        tokio::fs::create_dir_all(&dir).await?;

        let model = copy_if_not_same(&args.model_file, &dir.join("model.json")).await?;
        let mut binds = vec![BindMount {
            host: self.host_path(&descriptor.id, "model.json", &model),
            container: "/model.json".to_string(),
            read_only: true,
        }];
        args.model_file = model;

        if let Some(conf) = &args.config_file {
            let conf = copy_if_not_same(conf, &dir.join("conf.json")).await?;
            binds.push(BindMount {
                host: self.host_path(&descriptor.id, "conf.json", &conf),
                container: "/conf.json".to_string(),
                read_only: true,
            });
            args.config_file = Some(conf);
        }

        let labels = BTreeMap::from([
            (LABEL_INSTANCE_ID.to_string(), descriptor.id.clone()),
            (LABEL_AAS_ID.to_string(), descriptor.aas_id.clone()),
            (
                LABEL_AAS_ID_SHORT.to_string(),
                descriptor.aas_id_short.clone().unwrap_or_default(),
            ),
        ]);
        let spec = ContainerSpec {
            name: descriptor.id.clone(),
            image: args.image_id.clone(),
            binds,
            published_port: CONTAINER_PORT,
            labels,
        };

        let container_id = self.api.create(&spec).await?;
        info!(instance_id = %descriptor.id, container_id = %container_id, image = %args.image_id, "Container created");
        args.container_id = Some(container_id);
        descriptor.set_arguments(&args)?;
        Ok(descriptor)
    }

    async fn start(&self, descriptor: &InstanceDescriptor) -> Result<StatusResult> {
        let id = descriptor.id.as_str();
        let container = Self::container_of(descriptor)?;
        self.listeners
            .notify(&InstanceStatusChangeEvent::new(id, InstanceStatus::Starting));

        let started = async {
            self.api.start(&container).await?;
            self.api.inspect(&container).await
        }
        .await;

        let state = match started {
            Ok(Some(state)) => state,
            Ok(None) => {
                self.listeners
                    .notify(&InstanceStatusChangeEvent::new(id, InstanceStatus::Stopped));
                return Err(Error::NotFound(format!("container {container}")));
            }
            Err(e) => {
                warn!(instance_id = %id, error = %e, "Failed to start container");
                self.listeners
                    .notify(&InstanceStatusChangeEvent::new(id, InstanceStatus::Stopped));
                return Err(e.into());
            }
        };

        let result = match self.endpoint_of(&state) {
            Some(endpoint) => StatusResult::running(id, endpoint),
            None if state.running => {
                warn!(instance_id = %id, container_id = %container, "Started container publishes no host port, stopping it");
                if let Err(e) = self.api.stop(&container, STOP_GRACE).await {
                    warn!(instance_id = %id, error = %e, "Failed to stop unreachable container");
                }
                self.listeners
                    .notify(&InstanceStatusChangeEvent::new(id, InstanceStatus::Stopped));
                return Err(BackendError::Protocol(format!(
                    "container {container} has no host port for {CONTAINER_PORT}/tcp"
                ))
                .into());
            }
            None => StatusResult::new(id, state.status()),
        };
        info!(instance_id = %id, status = %result.status, endpoint = ?result.service_endpoint, "Container started");
        self.listeners.notify(&(&result).into());
        Ok(result)
    }

    async fn stop(&self, descriptor: &InstanceDescriptor) -> Result<StatusResult> {
        let id = descriptor.id.as_str();
        let container = Self::container_of(descriptor)?;
        self.listeners
            .notify(&InstanceStatusChangeEvent::new(id, InstanceStatus::Stopping));

        match self.api.stop(&container, STOP_GRACE).await {
            Ok(()) | Err(BackendError::ResourceNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        info!(instance_id = %id, "Container stopped");
        self.listeners
            .notify(&InstanceStatusChangeEvent::new(id, InstanceStatus::Stopped));
        Ok(StatusResult::new(id, InstanceStatus::Stopped))
    }

    async fn status(&self, descriptor: &InstanceDescriptor) -> Result<InstanceStatus> {
        let container = Self::container_of(descriptor)?;
        Ok(self
            .api
            .inspect(&container)
            .await?
            .map(|s| s.status())
            .unwrap_or(InstanceStatus::Stopped))
    }

    async fn service_endpoint(&self, descriptor: &InstanceDescriptor) -> Result<Option<String>> {
        let container = Self::container_of(descriptor)?;
        Ok(self
            .api
            .inspect(&container)
            .await?
            .and_then(|s| self.endpoint_of(&s)))
    }

    async fn status_result(&self, descriptor: &InstanceDescriptor) -> Result<StatusResult> {
        let container = Self::container_of(descriptor)?;
        Ok(match self.api.inspect(&container).await? {
            Some(state) => {
                StatusResult::with_endpoint(&descriptor.id, state.status(), self.endpoint_of(&state))
            }
            None => StatusResult::new(&descriptor.id, InstanceStatus::Stopped),
        })
    }

    async fn destroy(&self, descriptor: &InstanceDescriptor) -> Result<()> {
        let container = Self::container_of(descriptor)?;
        match self.api.remove(&container).await {
            Ok(()) => {
                debug!(instance_id = %descriptor.id, container = %container, "Container removed");
                Ok(())
            }
            Err(BackendError::ResourceNotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn purge(&self) -> Result<()> {
        for container in self.api.list_labelled(LABEL_INSTANCE_ID).await? {
            match self.api.remove(&container).await {
                Ok(()) | Err(BackendError::ResourceNotFound(_)) => {
                    debug!(container = %container, "Removed leftover container");
                }
                Err(e) => warn!(container = %container, error = %e, "Failed to remove leftover container"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelListener;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FakeDocker {
        containers: Mutex<HashMap<String, (ContainerSpec, ContainerState)>>,
        fail_start: bool,
        unpublished: bool,
    }

    #[async_trait]
    impl ContainerApi for FakeDocker {
        async fn create(&self, spec: &ContainerSpec) -> std::result::Result<String, BackendError> {
            let id = format!("cid-{}", spec.name);
            self.containers
                .lock()
                .insert(id.clone(), (spec.clone(), ContainerState::default()));
            Ok(id)
        }

        async fn start(&self, container: &str) -> std::result::Result<(), BackendError> {
            if self.fail_start {
                return Err(BackendError::Command {
                    program: "docker".into(),
                    status: "exit status: 1".into(),
                    stderr: "port is already allocated".into(),
                });
            }
            let mut all = self.containers.lock();
            let (_, state) = all
                .get_mut(container)
                .ok_or_else(|| BackendError::ResourceNotFound(container.into()))?;
            state.running = true;
            state.host_port = (!self.unpublished).then_some(32768);
            Ok(())
        }

        async fn inspect(
            &self,
            container: &str,
        ) -> std::result::Result<Option<ContainerState>, BackendError> {
            Ok(self.containers.lock().get(container).map(|(_, s)| s.clone()))
        }

        async fn stop(
            &self,
            container: &str,
            _grace: Duration,
        ) -> std::result::Result<(), BackendError> {
            let mut all = self.containers.lock();
            let (_, state) = all
                .get_mut(container)
                .ok_or_else(|| BackendError::ResourceNotFound(container.into()))?;
            state.running = false;
            state.host_port = None;
            Ok(())
        }

        async fn remove(&self, container: &str) -> std::result::Result<(), BackendError> {
            self.containers
                .lock()
                .remove(container)
                .map(|_| ())
                .ok_or_else(|| BackendError::ResourceNotFound(container.into()))
        }

        async fn list_labelled(
            &self,
            label: &str,
        ) -> std::result::Result<Vec<String>, BackendError> {
            Ok(self
                .containers
                .lock()
                .iter()
                .filter(|(_, (spec, _))| spec.labels.contains_key(label))
                .map(|(id, _)| id.clone())
                .collect())
        }
    }

    fn descriptor(dir: &TempDir) -> InstanceDescriptor {
        let model = dir.path().join("src-model.json");
        std::fs::write(&model, "{}").unwrap();
        InstanceDescriptor {
            id: "vacuum".into(),
            aas_id: "urn:aas:vacuum".into(),
            aas_id_short: Some("Vacuum".into()),
            submodels: vec![],
            arguments: json!({"imageId": "mdt/fa3st:latest", "modelFile": model}),
        }
    }

    fn backend(api: Arc<FakeDocker>, dir: &TempDir) -> DockerBackend {
        DockerBackend::new(
            api,
            dir.path().join("instances"),
            None,
            EndpointFormat::new("https://docker-host:%d/api/v3.0"),
        )
    }

    #[test]
    fn test_create_args() {
        let spec = ContainerSpec {
            name: "vacuum".into(),
            image: "mdt/fa3st:1".into(),
            binds: vec![BindMount {
                host: PathBuf::from("/ws/vacuum/model.json"),
                container: "/model.json".into(),
                read_only: true,
            }],
            published_port: 443,
            labels: BTreeMap::from([("mdt-id".to_string(), "vacuum".to_string())]),
        };
        let args = create_args(&spec);
        assert_eq!(args[0], "create");
        assert!(args.contains(&"0.0.0.0::443/tcp".to_string()));
        assert!(args.contains(&"/ws/vacuum/model.json:/model.json:ro".to_string()));
        assert!(args.contains(&"mdt-id=vacuum".to_string()));
        assert_eq!(args.last().unwrap(), "mdt/fa3st:1");
    }

    #[test]
    fn test_parse_inspect() {
        let json = r#"[{
            "State": {"Running": true, "Error": ""},
            "NetworkSettings": {"Ports": {"443/tcp": [{"HostIp": "0.0.0.0", "HostPort": "49153"}]}}
        }]"#;
        let state = parse_inspect(json, 443).unwrap().unwrap();
        assert!(state.running);
        assert_eq!(state.host_port, Some(49153));
        assert_eq!(state.status(), InstanceStatus::Running);

        let exited = r#"[{"State": {"Running": false, "Error": "oom"}, "NetworkSettings": {"Ports": {"443/tcp": null}}}]"#;
        let state = parse_inspect(exited, 443).unwrap().unwrap();
        assert_eq!(state.host_port, None);
        assert_eq!(state.status(), InstanceStatus::Failed);

        assert_eq!(parse_inspect("[]", 443).unwrap(), None);
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(FakeDocker::default());
        let backend = backend(api.clone(), &dir);

        let desc = backend.initialize(descriptor(&dir)).await.unwrap();
        let args: ContainerArguments = desc.arguments().unwrap();
        assert_eq!(args.container_id.as_deref(), Some("cid-vacuum"));
        assert!(args.model_file.ends_with("instances/vacuum/model.json"));
        {
            let all = api.containers.lock();
            let (spec, _) = &all["cid-vacuum"];
            assert_eq!(spec.labels[LABEL_AAS_ID], "urn:aas:vacuum");
            assert_eq!(spec.binds[0].container, "/model.json");
            assert!(spec.binds[0].read_only);
        }
        assert_eq!(backend.status(&desc).await.unwrap(), InstanceStatus::Stopped);

        let started = backend.start(&desc).await.unwrap();
        assert_eq!(started.status, InstanceStatus::Running);
        assert_eq!(
            started.service_endpoint.as_deref(),
            Some("https://docker-host:32768/api/v3.0")
        );
        assert_eq!(backend.status_result(&desc).await.unwrap(), started);

        let stopped = backend.stop(&desc).await.unwrap();
        assert_eq!(stopped.status, InstanceStatus::Stopped);
        assert_eq!(backend.service_endpoint(&desc).await.unwrap(), None);

        backend.destroy(&desc).await.unwrap();
        // already gone is fine
        backend.destroy(&desc).await.unwrap();
        assert_eq!(backend.status(&desc).await.unwrap(), InstanceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_start_failure_raises_backend_error() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(FakeDocker {
            fail_start: true,
            ..Default::default()
        });
        let backend = backend(api, &dir);
        let desc = backend.initialize(descriptor(&dir)).await.unwrap();

        let err = backend.start(&desc).await.unwrap_err();
        assert!(matches!(err, Error::Backend(BackendError::Command { .. })));
    }

    #[tokio::test]
    async fn test_start_without_host_port_stops_container() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(FakeDocker {
            unpublished: true,
            ..Default::default()
        });
        let backend = backend(api.clone(), &dir);
        let (tx, mut rx) = mpsc::unbounded_channel();
        backend.add_listener(Arc::new(ChannelListener::new(tx)));
        let desc = backend.initialize(descriptor(&dir)).await.unwrap();

        let err = backend.start(&desc).await.unwrap_err();
        assert!(matches!(err, Error::Backend(BackendError::Protocol(_))));
        assert!(!api.containers.lock()["cid-vacuum"].1.running);
        assert_eq!(backend.status(&desc).await.unwrap(), InstanceStatus::Stopped);

        let statuses: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.status)
            .collect();
        assert_eq!(
            statuses,
            vec![InstanceStatus::Starting, InstanceStatus::Stopped]
        );
    }

    #[tokio::test]
    async fn test_purge_removes_labelled_containers() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(FakeDocker::default());
        let backend = backend(api.clone(), &dir);
        backend.initialize(descriptor(&dir)).await.unwrap();
        api.create(&ContainerSpec {
            name: "unrelated".into(),
            image: "busybox".into(),
            binds: vec![],
            published_port: 80,
            labels: BTreeMap::new(),
        })
        .await
        .unwrap();

        backend.purge().await.unwrap();
        let all = api.containers.lock();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("cid-unrelated"));
    }
}
