// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance lifecycle orchestration.
//!
//! [`InstanceManager`] owns the workspace, the descriptor store, the two
//! registries and one backend. Structural changes (`add`, `remove`,
//! `remove_all`) take the manager lock exclusively; lookups and per-instance
//! operations take it shared, so an instance cannot be removed while it is
//! being started or stopped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mdt_registry::{Descriptor, Registry, ShellRegistry, SubmodelRegistry};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::backend::InstanceBackend;
use crate::environment::{AasEnvironment, AssetAdministrationShell};
use crate::error::{Error, Result};
use crate::events::{InstanceStatusChangeEvent, ListenerSet, StatusListener};
use crate::model::{InstanceDescriptor, InstanceStatus, StatusResult};
use crate::store::DescriptorStore;

struct ManagerInner {
    lock: RwLock<()>,
    store: Arc<dyn DescriptorStore>,
    shells: Arc<ShellRegistry>,
    submodels: Arc<SubmodelRegistry>,
    backend: Arc<dyn InstanceBackend>,
    workspace: PathBuf,
    listeners: Arc<ListenerSet>,
}

/// Coordinates instance lifecycles across the store, the registries and a backend.
#[derive(Clone)]
pub struct InstanceManager {
    inner: Arc<ManagerInner>,
}

impl InstanceManager {
    /// Create a manager. Backend transitions are forwarded to the manager's listeners.
    pub fn new(
        workspace: impl Into<PathBuf>,
        store: Arc<dyn DescriptorStore>,
        shells: Arc<ShellRegistry>,
        submodels: Arc<SubmodelRegistry>,
        backend: Arc<dyn InstanceBackend>,
    ) -> Self {
        let listeners = Arc::new(ListenerSet::new());
        backend.add_listener(listeners.clone());
        Self {
            inner: Arc::new(ManagerInner {
                lock: RwLock::new(()),
                store,
                shells,
                submodels,
                backend,
                workspace: workspace.into(),
                listeners,
            }),
        }
    }

    /// Register a listener for status changes of every instance.
    pub fn add_listener(&self, listener: Arc<dyn StatusListener>) {
        self.inner.listeners.add(listener);
    }

    /// Workspace root; each instance owns the subdirectory named by its id.
    pub fn workspace(&self) -> &Path {
        &self.inner.workspace
    }

    /// The execution backend.
    pub fn backend(&self) -> &Arc<dyn InstanceBackend> {
        &self.inner.backend
    }

    /// The descriptor store.
    pub fn store(&self) -> &Arc<dyn DescriptorStore> {
        &self.inner.store
    }

    /// The shell registry.
    pub fn shell_registry(&self) -> &Arc<ShellRegistry> {
        &self.inner.shells
    }

    /// The submodel registry.
    pub fn submodel_registry(&self) -> &Arc<SubmodelRegistry> {
        &self.inner.submodels
    }

    fn instance_dir(&self, id: &str) -> PathBuf {
        self.inner.workspace.join(id)
    }

    fn handle(&self, descriptor: InstanceDescriptor) -> Instance {
        Instance {
            manager: self.clone(),
            descriptor,
        }
    }

    /// Add an instance backed by the single shell of `environment`.
    ///
    /// The environment is validated before anything is registered. If
    /// persisting or initializing fails, registrations are rolled back and
    /// the original error is returned.
    pub async fn add(
        &self,
        id: &str,
        environment: &AasEnvironment,
        arguments: Value,
    ) -> Result<Instance> {
        let shell = environment.validate()?;
        let _guard = self.inner.lock.write().await;

        match self.inner.store.get(id).await {
            Ok(_) => return Err(Error::AlreadyExists(format!("instance {id}"))),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        match self.inner.store.get_by_aas_id(&shell.id).await {
            Ok(existing) => {
                return Err(Error::AlreadyExists(format!(
                    "aas {} (instance {})",
                    shell.id, existing.id
                )));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let mut registered = Registered::default();
        if let Err(e) = self.register(environment, shell, &mut registered).await {
            self.unregister(&registered).await;
            return Err(e);
        }

        let descriptor = InstanceDescriptor {
            id: id.to_string(),
            aas_id: shell.id.clone(),
            aas_id_short: shell.id_short.clone(),
            submodels: environment.instance_submodels(),
            arguments,
        };

        let descriptor = match self.persist_and_initialize(descriptor).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(instance_id = %id, error = %e, "Failed to add instance, rolling back");
                self.unregister(&registered).await;
                return Err(e);
            }
        };

        info!(
            instance_id = %id,
            aas_id = %descriptor.aas_id,
            submodels = descriptor.submodels.len(),
            backend = self.inner.backend.backend_type(),
            "Instance added"
        );
        self.inner
            .listeners
            .notify(&InstanceStatusChangeEvent::new(id, InstanceStatus::Added));
        Ok(self.handle(descriptor))
    }

    /// Read the environment from `path` and [`add`](Self::add) it.
    pub async fn add_from_file(
        &self,
        id: &str,
        path: impl AsRef<Path>,
        arguments: Value,
    ) -> Result<Instance> {
        let environment = AasEnvironment::from_file(path).await?;
        self.add(id, &environment, arguments).await
    }

    async fn register(
        &self,
        environment: &AasEnvironment,
        shell: &AssetAdministrationShell,
        registered: &mut Registered,
    ) -> Result<()> {
        for submodel in environment.submodel_descriptors() {
            let submodel = self.inner.submodels.add(submodel).await?;
            registered.submodels.push(submodel.id().to_string());
        }
        let shell = self
            .inner
            .shells
            .add(AasEnvironment::shell_descriptor(shell))
            .await?;
        registered.shell = Some(shell.id().to_string());
        Ok(())
    }

    async fn persist_and_initialize(
        &self,
        descriptor: InstanceDescriptor,
    ) -> Result<InstanceDescriptor> {
        self.inner.store.add(&descriptor).await?;
        let id = descriptor.id.clone();
        let initialized = match self.inner.backend.initialize(descriptor).await {
            Ok(initialized) => initialized,
            Err(e) => {
                self.discard_descriptor(&id).await;
                return Err(e);
            }
        };

        if let Err(e) = self.inner.store.update(&initialized).await {
            if let Err(cleanup) = self.inner.backend.destroy(&initialized).await {
                warn!(instance_id = %id, error = %cleanup, "Failed to destroy backend resources during rollback");
            }
            self.discard_descriptor(&id).await;
            return Err(e);
        }
        Ok(initialized)
    }

    async fn discard_descriptor(&self, id: &str) {
        if let Err(e) = self.inner.store.remove(id).await {
            warn!(instance_id = %id, error = %e, "Failed to remove descriptor during rollback");
        }
        self.remove_instance_dir(id).await;
    }

    async fn unregister(&self, registered: &Registered) {
        if let Some(shell) = &registered.shell
            && let Err(e) = self.inner.shells.remove(shell).await
        {
            warn!(aas_id = %shell, error = %e, "Failed to unregister shell descriptor");
        }
        for submodel in &registered.submodels {
            if let Err(e) = self.inner.submodels.remove(submodel).await {
                warn!(submodel_id = %submodel, error = %e, "Failed to unregister submodel descriptor");
            }
        }
    }

    async fn remove_instance_dir(&self, id: &str) {
        let dir = self.instance_dir(id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!(instance_id = %id, dir = %dir.display(), "Workspace directory deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(instance_id = %id, dir = %dir.display(), error = %e, "Failed to delete workspace directory")
            }
        }
    }

    /// Instance by id.
    pub async fn get(&self, id: &str) -> Result<Instance> {
        let _guard = self.inner.lock.read().await;
        let descriptor = self.inner.store.get(id).await?;
        Ok(self.handle(descriptor))
    }

    /// Instance by shell id.
    pub async fn get_by_aas_id(&self, aas_id: &str) -> Result<Instance> {
        let _guard = self.inner.lock.read().await;
        let descriptor = self.inner.store.get_by_aas_id(aas_id).await?;
        Ok(self.handle(descriptor))
    }

    /// Every instance.
    pub async fn list_all(&self) -> Result<Vec<Instance>> {
        let _guard = self.inner.lock.read().await;
        let descriptors = self.inner.store.get_all().await?;
        Ok(descriptors.into_iter().map(|d| self.handle(d)).collect())
    }

    /// Instances whose shell has the given short id.
    pub async fn list_by_id_short(&self, aas_id_short: &str) -> Result<Vec<Instance>> {
        let _guard = self.inner.lock.read().await;
        let descriptors = self.inner.store.get_all_by_id_short(aas_id_short).await?;
        Ok(descriptors.into_iter().map(|d| self.handle(d)).collect())
    }

    /// Instances currently in `status`.
    pub async fn list_by_status(&self, status: InstanceStatus) -> Result<Vec<Instance>> {
        let _guard = self.inner.lock.read().await;
        let mut matching = Vec::new();
        for descriptor in self.inner.store.get_all().await? {
            if self.inner.backend.status(&descriptor).await? == status {
                matching.push(self.handle(descriptor));
            }
        }
        Ok(matching)
    }

    /// Remove a stopped instance.
    ///
    /// Fails with [`Error::InvalidState`] while the instance is starting or
    /// running. Only a failure to delete the stored descriptor is reported;
    /// the other cleanup steps are best-effort.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.inner.lock.write().await;
        let descriptor = self.inner.store.get(id).await?;
        self.remove_locked(&descriptor).await
    }

    async fn remove_locked(&self, descriptor: &InstanceDescriptor) -> Result<()> {
        let id = descriptor.id.as_str();
        let status = self.inner.backend.status(descriptor).await?;
        if status.is_active() {
            return Err(Error::InvalidState(format!(
                "cannot remove instance {id} while {status}"
            )));
        }

        self.unregister(&Registered::of(descriptor)).await;
        self.inner.store.remove(id).await?;
        if let Err(e) = self.inner.backend.destroy(descriptor).await {
            warn!(instance_id = %id, error = %e, "Failed to release backend resources");
        }
        self.remove_instance_dir(id).await;

        info!(instance_id = %id, "Instance removed");
        self.inner
            .listeners
            .notify(&InstanceStatusChangeEvent::new(id, InstanceStatus::Removed));
        Ok(())
    }

    /// Remove every instance and sweep leftovers of earlier partial failures.
    ///
    /// Afterwards the registries and the workspace are empty and the backend
    /// holds no resources, even for instances that could not be removed
    /// cleanly.
    pub async fn remove_all(&self) -> Result<()> {
        let _guard = self.inner.lock.write().await;

        for descriptor in self.inner.store.get_all().await? {
            if let Err(e) = self.remove_locked(&descriptor).await {
                warn!(instance_id = %descriptor.id, error = %e, "Failed to remove instance, forcing");
                match self.inner.store.remove(&descriptor.id).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            }
        }

        for submodel in self.inner.submodels.get_all().await? {
            if let Err(e) = self.inner.submodels.remove(submodel.id()).await {
                warn!(submodel_id = %submodel.id(), error = %e, "Failed to remove dangling submodel descriptor");
            }
        }
        for shell in self.inner.shells.get_all().await? {
            if let Err(e) = self.inner.shells.remove(shell.id()).await {
                warn!(aas_id = %shell.id(), error = %e, "Failed to remove dangling shell descriptor");
            }
        }

        if let Err(e) = self.inner.backend.purge().await {
            warn!(error = %e, "Failed to purge backend resources");
        }
        self.sweep_workspace().await?;

        info!("All instances removed");
        Ok(())
    }

    async fn sweep_workspace(&self) -> Result<()> {
        let mut entries = match tokio::fs::read_dir(&self.inner.workspace).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                let path = entry.path();
                if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                    warn!(dir = %path.display(), error = %e, "Failed to delete dangling directory");
                } else {
                    debug!(dir = %path.display(), "Deleted dangling directory");
                }
            }
        }
        Ok(())
    }
}

/// Registry entries created for one instance.
#[derive(Default)]
struct Registered {
    shell: Option<String>,
    submodels: Vec<String>,
}

impl Registered {
    fn of(descriptor: &InstanceDescriptor) -> Self {
        Self {
            shell: Some(descriptor.aas_id.clone()),
            submodels: descriptor.submodel_ids().map(str::to_string).collect(),
        }
    }
}

/// Handle on one managed instance.
#[derive(Clone)]
pub struct Instance {
    manager: InstanceManager,
    descriptor: InstanceDescriptor,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.descriptor.id)
            .field("aas_id", &self.descriptor.aas_id)
            .finish()
    }
}

impl Instance {
    /// Instance id.
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// Shell id.
    pub fn aas_id(&self) -> &str {
        &self.descriptor.aas_id
    }

    /// Shell short id.
    pub fn aas_id_short(&self) -> Option<&str> {
        self.descriptor.aas_id_short.as_deref()
    }

    /// Stored descriptor as of when this handle was obtained.
    pub fn descriptor(&self) -> &InstanceDescriptor {
        &self.descriptor
    }

    /// Start the instance. Returns once the backend accepted the start,
    /// which for asynchronous backends is still `Starting`.
    pub async fn start(&self) -> Result<StatusResult> {
        let _guard = self.manager.inner.lock.read().await;
        info!(instance_id = %self.id(), "Starting instance");
        self.manager.inner.backend.start(&self.descriptor).await
    }

    /// Stop the instance.
    pub async fn stop(&self) -> Result<StatusResult> {
        let _guard = self.manager.inner.lock.read().await;
        info!(instance_id = %self.id(), "Stopping instance");
        self.manager.inner.backend.stop(&self.descriptor).await
    }

    /// Current status.
    pub async fn status(&self) -> Result<InstanceStatus> {
        self.manager.inner.backend.status(&self.descriptor).await
    }

    /// Status and endpoint together.
    pub async fn status_result(&self) -> Result<StatusResult> {
        self.manager.inner.backend.status_result(&self.descriptor).await
    }

    /// Endpoint of the running service, if running.
    pub async fn service_endpoint(&self) -> Result<Option<String>> {
        self.manager
            .inner
            .backend
            .service_endpoint(&self.descriptor)
            .await
    }

    /// Wait until the instance is no longer starting or stopping.
    pub async fn wait_while_starting(&self, timeout: Duration) -> Result<StatusResult> {
        self.manager
            .inner
            .backend
            .wait_while_transient(&self.descriptor, timeout)
            .await
    }
}
