// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! MDT Instance Manager
//!
//! Runs the instance manager with the backend, descriptor store and file
//! registries selected by `MDT_*` environment variables, logging every
//! status change until interrupted.

use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use mdt_instance::backend::InstanceBackend;
use mdt_instance::backend::docker::{DockerBackend, DockerCli};
use mdt_instance::backend::kubernetes::{KubectlCli, KubernetesBackend};
use mdt_instance::backend::process::{
    DEFAULT_SENTINELS, ProcessBackend, StopPolicy, SupervisorConfig,
};
use mdt_instance::config::{BackendKind, Config};
use mdt_instance::runtime::ManagerRuntime;
use mdt_instance::store::{DescriptorStore, FileDescriptorStore, SqliteDescriptorStore};
use mdt_registry::{FileRegistry, ShellDescriptor, SubmodelDescriptor};

fn build_backend(config: &Config) -> Arc<dyn InstanceBackend> {
    match config.backend {
        BackendKind::Process => {
            let stop_policy = match &config.stop_sentinel {
                Some(sentinel) => StopPolicy::AwaitSentinel {
                    sentinel: sentinel.clone(),
                    timeout: config.stop_timeout,
                },
                None => StopPolicy::Signal,
            };
            let supervisor = SupervisorConfig {
                launcher: config.launcher.clone(),
                sentinels: DEFAULT_SENTINELS.iter().map(|s| s.to_string()).collect(),
                sample_interval: config.sample_interval,
                start_timeout: config.start_timeout,
                endpoint_format: config.endpoint_format.clone(),
                stop_policy,
            };
            Arc::new(ProcessBackend::new(&config.workspace_dir, supervisor))
        }
        BackendKind::Docker => Arc::new(DockerBackend::new(
            Arc::new(DockerCli::new(config.docker_host.clone())),
            &config.workspace_dir,
            config.docker_mount_prefix.clone(),
            config.endpoint_format.clone(),
        )),
        BackendKind::Kubernetes => Arc::new(KubernetesBackend::new(
            Arc::new(KubectlCli::new(&config.k8s_namespace)),
            &config.k8s_namespace,
            config.k8s_endpoint_format.clone(),
        )),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mdt_instance=info,mdt_registry=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        backend = ?config.backend,
        workspace = %config.workspace_dir.display(),
        registry = %config.registry_dir.display(),
        "Starting MDT Instance Manager"
    );

    tokio::fs::create_dir_all(&config.workspace_dir).await?;

    let store: Arc<dyn DescriptorStore> = match &config.descriptor_db {
        Some(url) => Arc::new(SqliteDescriptorStore::connect(url).await?),
        None => Arc::new(FileDescriptorStore::open(&config.workspace_dir).await?),
    };
    info!(store_type = store.store_type(), "Descriptor store ready");

    let shells = Arc::new(
        FileRegistry::<ShellDescriptor>::open(
            config.registry_dir.join("shells"),
            config.registry_cache_size,
        )
        .await?,
    );
    let submodels = Arc::new(
        FileRegistry::<SubmodelDescriptor>::open(
            config.registry_dir.join("submodels"),
            config.registry_cache_size,
        )
        .await?,
    );

    let backend = build_backend(&config);
    info!(backend_type = backend.backend_type(), "Backend initialized");

    let runtime = ManagerRuntime::builder()
        .workspace(&config.workspace_dir)
        .store(store)
        .shell_registry(shells)
        .submodel_registry(submodels)
        .backend(backend)
        .build()?
        .start()
        .await?;

    let instances = runtime.manager().list_all().await?;
    info!(instances = instances.len(), "MDT Instance Manager ready");

    // Log every status change as JSON
    let mut events = runtime.subscribe();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(event = %event.to_json_event(), "Status changed"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event log lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;
    event_log.abort();

    info!("MDT Instance Manager shut down");

    Ok(())
}
