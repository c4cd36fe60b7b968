// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for mdt-instance.
//!
//! [`ManagerRuntime`] wires an [`InstanceManager`] to the registry endpoint
//! synchronizer and a broadcast channel of status events, so the manager can
//! run inside an existing tokio application.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mdt_instance::backend::process::{ProcessBackend, SupervisorConfig};
//! use mdt_instance::runtime::ManagerRuntime;
//! use mdt_instance::store::FileDescriptorStore;
//! use mdt_registry::{InMemoryRegistry, ShellDescriptor, SubmodelDescriptor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(FileDescriptorStore::open(".mdt/instances").await?);
//!     let backend = Arc::new(ProcessBackend::new(".mdt/instances", SupervisorConfig::default()));
//!
//!     let runtime = ManagerRuntime::builder()
//!         .workspace(".mdt/instances")
//!         .store(store)
//!         .shell_registry(Arc::new(InMemoryRegistry::<ShellDescriptor>::new()))
//!         .submodel_registry(Arc::new(InMemoryRegistry::<SubmodelDescriptor>::new()))
//!         .backend(backend)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     let mut events = runtime.subscribe();
//!     // ... add and start instances through runtime.manager() ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use mdt_registry::{ShellRegistry, SubmodelRegistry};
use tokio::sync::{Notify, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::backend::InstanceBackend;
use crate::events::{BroadcastListener, ChannelListener, InstanceStatusChangeEvent};
use crate::manager::InstanceManager;
use crate::store::DescriptorStore;
use crate::sync::EndpointSynchronizer;

/// Builder for creating a [`ManagerRuntime`].
pub struct ManagerRuntimeBuilder {
    workspace: PathBuf,
    store: Option<Arc<dyn DescriptorStore>>,
    shells: Option<Arc<ShellRegistry>>,
    submodels: Option<Arc<SubmodelRegistry>>,
    backend: Option<Arc<dyn InstanceBackend>>,
    event_capacity: usize,
}

impl Default for ManagerRuntimeBuilder {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from(".mdt/instances"),
            store: None,
            shells: None,
            submodels: None,
            backend: None,
            event_capacity: 256,
        }
    }
}

impl ManagerRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the workspace root.
    ///
    /// Default: `.mdt/instances`
    pub fn workspace(mut self, path: impl Into<PathBuf>) -> Self {
        self.workspace = path.into();
        self
    }

    /// Set the descriptor store (required).
    pub fn store(mut self, store: Arc<dyn DescriptorStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the shell registry (required).
    pub fn shell_registry(mut self, registry: Arc<ShellRegistry>) -> Self {
        self.shells = Some(registry);
        self
    }

    /// Set the submodel registry (required).
    pub fn submodel_registry(mut self, registry: Arc<SubmodelRegistry>) -> Self {
        self.submodels = Some(registry);
        self
    }

    /// Set the execution backend (required).
    pub fn backend(mut self, backend: Arc<dyn InstanceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set how many events a lagging subscriber may fall behind.
    ///
    /// Default: 256
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<ManagerRuntimeConfig> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("store is required"))?;
        let shells = self
            .shells
            .ok_or_else(|| anyhow::anyhow!("shell_registry is required"))?;
        let submodels = self
            .submodels
            .ok_or_else(|| anyhow::anyhow!("submodel_registry is required"))?;
        let backend = self
            .backend
            .ok_or_else(|| anyhow::anyhow!("backend is required"))?;

        Ok(ManagerRuntimeConfig {
            workspace: self.workspace,
            store,
            shells,
            submodels,
            backend,
            event_capacity: self.event_capacity,
        })
    }
}

/// Configuration for a [`ManagerRuntime`].
pub struct ManagerRuntimeConfig {
    workspace: PathBuf,
    store: Arc<dyn DescriptorStore>,
    shells: Arc<ShellRegistry>,
    submodels: Arc<SubmodelRegistry>,
    backend: Arc<dyn InstanceBackend>,
    event_capacity: usize,
}

impl ManagerRuntimeConfig {
    /// Start the runtime, spawning the endpoint synchronizer.
    pub async fn start(self) -> Result<ManagerRuntime> {
        tokio::fs::create_dir_all(&self.workspace).await?;

        let manager = InstanceManager::new(
            self.workspace.clone(),
            self.store.clone(),
            self.shells.clone(),
            self.submodels.clone(),
            self.backend.clone(),
        );

        let (sync_tx, sync_rx) = mpsc::unbounded_channel();
        manager.add_listener(Arc::new(ChannelListener::new(sync_tx)));
        let synchronizer = EndpointSynchronizer::new(self.store, self.shells, self.submodels);
        let sync_shutdown = synchronizer.shutdown_handle();
        let sync_handle = tokio::spawn(synchronizer.run(sync_rx));

        let (events, _) = broadcast::channel(self.event_capacity);
        manager.add_listener(Arc::new(BroadcastListener::new(events.clone())));

        info!(
            workspace = %self.workspace.display(),
            backend = self.backend.backend_type(),
            "ManagerRuntime started"
        );

        Ok(ManagerRuntime {
            manager,
            events,
            sync_handle,
            sync_shutdown,
        })
    }
}

/// A running instance manager that can be embedded in an application.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct ManagerRuntime {
    manager: InstanceManager,
    events: broadcast::Sender<InstanceStatusChangeEvent>,
    sync_handle: JoinHandle<()>,
    sync_shutdown: Arc<Notify>,
}

impl ManagerRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> ManagerRuntimeBuilder {
        ManagerRuntimeBuilder::new()
    }

    /// The instance manager.
    pub fn manager(&self) -> &InstanceManager {
        &self.manager
    }

    /// Subscribe to status-change events of every instance.
    pub fn subscribe(&self) -> broadcast::Receiver<InstanceStatusChangeEvent> {
        self.events.subscribe()
    }

    /// Check if the runtime is still running.
    pub fn is_running(&self) -> bool {
        !self.sync_handle.is_finished()
    }

    /// Gracefully shut down the runtime.
    ///
    /// Stops live instances through the backend, lets the synchronizer apply
    /// the resulting transitions, then stops it.
    pub async fn shutdown(self) -> Result<()> {
        info!("ManagerRuntime shutting down...");

        self.manager.backend().shutdown().await;
        self.sync_shutdown.notify_one();

        match self.sync_handle.await {
            Ok(()) => {
                info!("ManagerRuntime shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("Endpoint synchronizer task panicked: {}", e);
                Err(anyhow::anyhow!("synchronizer task panicked: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::model::InstanceStatus;
    use crate::store::FileDescriptorStore;
    use mdt_registry::{InMemoryRegistry, ShellDescriptor, SubmodelDescriptor};

    #[test]
    fn test_build_requires_components() {
        let err = ManagerRuntime::builder().build().err().unwrap();
        assert!(err.to_string().contains("store is required"));
    }

    #[tokio::test]
    async fn test_start_subscribe_shutdown() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(FileDescriptorStore::open(dir.path()).await.unwrap());
        let runtime = ManagerRuntime::builder()
            .workspace(dir.path())
            .store(store)
            .shell_registry(Arc::new(InMemoryRegistry::<ShellDescriptor>::new()))
            .submodel_registry(Arc::new(InMemoryRegistry::<SubmodelDescriptor>::new()))
            .backend(Arc::new(MockBackend::new()))
            .build()
            .unwrap()
            .start()
            .await
            .unwrap();
        assert!(runtime.is_running());

        let mut events = runtime.subscribe();
        let env = crate::environment::AasEnvironment::from_json(
            r#"{"assetAdministrationShells": [{"id": "urn:aas:a"}]}"#,
        )
        .unwrap();
        runtime
            .manager()
            .add("a", &env, serde_json::json!({}))
            .await
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.id, "a");
        assert_eq!(event.status, InstanceStatus::Added);

        runtime.shutdown().await.unwrap();
    }
}
