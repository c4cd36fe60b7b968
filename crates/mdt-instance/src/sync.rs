// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Registry endpoint synchronization.
//!
//! Keeps the endpoints of an instance's shell and submodel descriptors in step
//! with its runtime status: set on `Running`, cleared on `Stopped`/`Failed`.
//! Backends publish transitions synchronously, so the registry writes happen
//! on a separate task fed through a channel.

use std::sync::Arc;

use mdt_registry::{Descriptor, Registry, ShellRegistry, SubmodelRegistry, encode_id};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::events::InstanceStatusChangeEvent;
use crate::model::{InstanceDescriptor, InstanceStatus};
use crate::store::DescriptorStore;

/// Shell endpoint under a service endpoint.
pub fn shell_endpoint(service_endpoint: &str, aas_id: &str) -> String {
    format!("{service_endpoint}/shells/{}", encode_id(aas_id))
}

/// Submodel endpoint under a service endpoint.
pub fn submodel_endpoint(service_endpoint: &str, submodel_id: &str) -> String {
    format!("{service_endpoint}/submodels/{}", encode_id(submodel_id))
}

/// Applies status changes to the registries.
pub struct EndpointSynchronizer {
    store: Arc<dyn DescriptorStore>,
    shells: Arc<ShellRegistry>,
    submodels: Arc<SubmodelRegistry>,
    shutdown: Arc<Notify>,
}

impl EndpointSynchronizer {
    /// Create a synchronizer.
    pub fn new(
        store: Arc<dyn DescriptorStore>,
        shells: Arc<ShellRegistry>,
        submodels: Arc<SubmodelRegistry>,
    ) -> Self {
        Self {
            store,
            shells,
            submodels,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Apply one event. Events for unknown instances are ignored.
    pub async fn apply(&self, event: &InstanceStatusChangeEvent) -> Result<()> {
        let endpoint = match (event.status, &event.service_endpoint) {
            (InstanceStatus::Running, Some(endpoint)) => Some(endpoint.as_str()),
            (InstanceStatus::Stopped | InstanceStatus::Failed, _) => None,
            _ => return Ok(()),
        };

        let descriptor = match self.store.get(&event.id).await {
            Ok(descriptor) => descriptor,
            Err(e) if e.is_not_found() => {
                debug!(instance_id = %event.id, "Status change for unknown instance");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.set_endpoints(&descriptor, endpoint).await
    }

    /// Point every descriptor of `instance` at `endpoint`, or clear them.
    pub async fn set_endpoints(
        &self,
        instance: &InstanceDescriptor,
        endpoint: Option<&str>,
    ) -> Result<()> {
        match self.shells.get_by_id(&instance.aas_id).await {
            Ok(mut shell) => {
                shell.set_endpoint(endpoint.map(|ep| shell_endpoint(ep, &instance.aas_id)));
                self.shells.update(shell).await?;
            }
            Err(e) if e.is_not_found() => {
                warn!(instance_id = %instance.id, aas_id = %instance.aas_id, "Shell descriptor missing")
            }
            Err(e) => return Err(e.into()),
        }

        for submodel_id in instance.submodel_ids() {
            match self.submodels.get_by_id(submodel_id).await {
                Ok(mut submodel) => {
                    submodel.set_endpoint(endpoint.map(|ep| submodel_endpoint(ep, submodel_id)));
                    self.submodels.update(submodel).await?;
                }
                Err(e) if e.is_not_found() => {
                    warn!(instance_id = %instance.id, submodel_id, "Submodel descriptor missing")
                }
                Err(e) => return Err(e.into()),
            }
        }

        match endpoint {
            Some(endpoint) => {
                info!(instance_id = %instance.id, endpoint, "Registry endpoints updated")
            }
            None => info!(instance_id = %instance.id, "Registry endpoints cleared"),
        }
        Ok(())
    }

    /// Handle that stops [`run`](Self::run) once queued events are applied.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Apply events until the channel closes or shutdown is signalled.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<InstanceStatusChangeEvent>) {
        info!("Endpoint synchronizer started");
        loop {
            tokio::select! {
                biased;

                event = rx.recv() => {
                    let Some(event) = event else { break };
                    if let Err(e) = self.apply(&event).await {
                        warn!(
                            instance_id = %event.id,
                            status = %event.status,
                            error = %e,
                            "Failed to synchronize registry endpoints"
                        );
                    }
                }

                _ = self.shutdown.notified() => {
                    info!("Endpoint synchronizer received shutdown signal");
                    break;
                }
            }
        }
        debug!("Endpoint synchronizer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InstanceSubmodel;
    use crate::store::FileDescriptorStore;
    use mdt_registry::{InMemoryRegistry, ShellDescriptor, SubmodelDescriptor};
    use serde_json::json;
    use tempfile::TempDir;

    type Fixture = (
        EndpointSynchronizer,
        Arc<InMemoryRegistry<ShellDescriptor>>,
        Arc<InMemoryRegistry<SubmodelDescriptor>>,
    );

    async fn fixture(dir: &TempDir) -> Fixture {
        let store = Arc::new(FileDescriptorStore::open(dir.path()).await.unwrap());
        store
            .add(&InstanceDescriptor {
                id: "vacuum".into(),
                aas_id: "urn:aas:vacuum".into(),
                aas_id_short: Some("Vacuum".into()),
                submodels: vec![InstanceSubmodel {
                    submodel_id: "urn:sm:data".into(),
                    submodel_id_short: Some("Data".into()),
                }],
                arguments: json!({}),
            })
            .await
            .unwrap();

        let shells = Arc::new(InMemoryRegistry::<ShellDescriptor>::new());
        shells
            .add(ShellDescriptor::new("urn:aas:vacuum", Some("Vacuum".into())))
            .await
            .unwrap();
        let submodels = Arc::new(InMemoryRegistry::<SubmodelDescriptor>::new());
        submodels
            .add(SubmodelDescriptor::new("urn:sm:data", Some("Data".into())))
            .await
            .unwrap();

        let sync = EndpointSynchronizer::new(store, shells.clone(), submodels.clone());
        (sync, shells, submodels)
    }

    #[tokio::test]
    async fn test_running_sets_and_stopped_clears() {
        let dir = TempDir::new().unwrap();
        let (sync, shells, submodels) = fixture(&dir).await;

        sync.apply(&InstanceStatusChangeEvent::running(
            "vacuum",
            "https://localhost:8443/api/v3.0",
        ))
        .await
        .unwrap();

        let shell = shells.get_by_id("urn:aas:vacuum").await.unwrap();
        assert_eq!(
            shell.endpoint(),
            Some(shell_endpoint("https://localhost:8443/api/v3.0", "urn:aas:vacuum").as_str())
        );
        let submodel = submodels.get_by_id("urn:sm:data").await.unwrap();
        assert!(
            submodel
                .endpoint()
                .unwrap()
                .starts_with("https://localhost:8443/api/v3.0/submodels/")
        );

        sync.apply(&InstanceStatusChangeEvent::new("vacuum", InstanceStatus::Failed))
            .await
            .unwrap();
        assert_eq!(shells.get_by_id("urn:aas:vacuum").await.unwrap().endpoint(), None);
        assert_eq!(submodels.get_by_id("urn:sm:data").await.unwrap().endpoint(), None);
    }

    #[tokio::test]
    async fn test_ignores_transient_and_unknown() {
        let dir = TempDir::new().unwrap();
        let (sync, shells, _) = fixture(&dir).await;

        sync.apply(&InstanceStatusChangeEvent::new("vacuum", InstanceStatus::Starting))
            .await
            .unwrap();
        sync.apply(&InstanceStatusChangeEvent::running("ghost", "https://x:1"))
            .await
            .unwrap();
        assert_eq!(shells.get_by_id("urn:aas:vacuum").await.unwrap().endpoint(), None);
    }

    #[tokio::test]
    async fn test_run_drains_then_stops() {
        let dir = TempDir::new().unwrap();
        let (sync, shells, _) = fixture(&dir).await;
        let shutdown = sync.shutdown_handle();
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(InstanceStatusChangeEvent::running("vacuum", "https://h:1"))
            .unwrap();
        shutdown.notify_one();
        sync.run(rx).await;

        assert!(
            shells
                .get_by_id("urn:aas:vacuum")
                .await
                .unwrap()
                .endpoint()
                .is_some()
        );
    }
}
