// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local-process backend.
//!
//! Each instance runs as `{launcher} {jar} -m {model} -c {config}` inside its
//! workspace directory. Readiness is inferred by [`ProcessSupervisor`] from
//! the process's stdout.

mod supervisor;
mod tail;

pub use supervisor::{
    DEFAULT_SENTINELS, DEFAULT_STOP_SENTINEL, LaunchSpec, ProcessSnapshot, ProcessSupervisor,
    StopPolicy, SupervisorConfig,
};
pub use tail::{LogTailer, SentinelFinder, SentinelMatch, TailError};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{InstanceBackend, copy_if_not_same};
use crate::error::Result;
use crate::events::StatusListener;
use crate::model::{InstanceDescriptor, InstanceStatus, JarArguments, StatusResult};

/// File name of the runnable inside an instance directory.
pub const RUNNABLE_FILE: &str = "fa3st-repository.jar";
/// File name of the model inside an instance directory.
pub const MODEL_FILE: &str = "model.json";
/// File name of the service configuration inside an instance directory.
pub const CONFIG_FILE: &str = "conf.json";

/// Backend running each instance as a supervised child process.
pub struct ProcessBackend {
    workspace: PathBuf,
    supervisor: ProcessSupervisor,
    shutdown_grace: Duration,
}

impl ProcessBackend {
    /// Create a backend over `workspace`.
    pub fn new(workspace: impl Into<PathBuf>, config: SupervisorConfig) -> Self {
        Self {
            workspace: workspace.into(),
            supervisor: ProcessSupervisor::new(config),
            shutdown_grace: Duration::from_secs(10),
        }
    }

    /// Time `shutdown` waits for processes to exit before killing them.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// The underlying supervisor.
    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    fn instance_dir(&self, id: &str) -> PathBuf {
        self.workspace.join(id)
    }
}

#[async_trait]
impl InstanceBackend for ProcessBackend {
    fn backend_type(&self) -> &'static str {
        "process"
    }

    fn add_listener(&self, listener: Arc<dyn StatusListener>) {
        self.supervisor.add_listener(listener);
    }

    async fn initialize(&self, mut descriptor: InstanceDescriptor) -> Result<InstanceDescriptor> {
        let args: JarArguments = descriptor.arguments()?;
        let dir = self.instance_dir(&descriptor.id);
        tokio::fs::create_dir_all(&dir).await?;

        let args = JarArguments {
            jar_file: copy_if_not_same(&args.jar_file, &dir.join(RUNNABLE_FILE)).await?,
            model_file: copy_if_not_same(&args.model_file, &dir.join(MODEL_FILE)).await?,
            config_file: copy_if_not_same(&args.config_file, &dir.join(CONFIG_FILE)).await?,
        };
        debug!(instance_id = %descriptor.id, dir = %dir.display(), "Instance artifacts copied");
        descriptor.set_arguments(&args)?;
        Ok(descriptor)
    }

    async fn start(&self, descriptor: &InstanceDescriptor) -> Result<StatusResult> {
        let args: JarArguments = descriptor.arguments()?;
        let spec = LaunchSpec {
            instance_id: descriptor.id.clone(),
            working_dir: self.instance_dir(&descriptor.id),
            jar_file: args.jar_file,
            model_file: args.model_file,
            config_file: args.config_file,
        };
        self.supervisor.start(spec).await
    }

    async fn stop(&self, descriptor: &InstanceDescriptor) -> Result<StatusResult> {
        self.supervisor.stop(&descriptor.id).await
    }

    async fn status(&self, descriptor: &InstanceDescriptor) -> Result<InstanceStatus> {
        Ok(self.supervisor.status(&descriptor.id))
    }

    async fn service_endpoint(&self, descriptor: &InstanceDescriptor) -> Result<Option<String>> {
        Ok(self.supervisor.service_endpoint(&descriptor.id))
    }

    async fn status_result(&self, descriptor: &InstanceDescriptor) -> Result<StatusResult> {
        Ok(self.supervisor.status_result(&descriptor.id))
    }

    async fn wait_while_transient(
        &self,
        descriptor: &InstanceDescriptor,
        timeout: Duration,
    ) -> Result<StatusResult> {
        self.supervisor
            .wait_while_transient(&descriptor.id, timeout)
            .await
    }

    async fn destroy(&self, descriptor: &InstanceDescriptor) -> Result<()> {
        // a record can only remain here while stopping or failed
        self.supervisor.kill(&descriptor.id);
        Ok(())
    }

    async fn purge(&self) -> Result<()> {
        self.supervisor.kill_all();
        Ok(())
    }

    async fn shutdown(&self) {
        info!(grace_secs = self.shutdown_grace.as_secs(), "Stopping supervised processes");
        self.supervisor.shutdown(self.shutdown_grace).await;
    }
}
