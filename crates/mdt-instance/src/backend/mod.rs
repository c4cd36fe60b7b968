// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Execution backends.
//!
//! Every backend satisfies the same lifecycle contract, [`InstanceBackend`],
//! and differs only in how it infers readiness:
//!
//! | Backend | Readiness signal |
//! |---------|------------------|
//! | [`ProcessBackend`](process::ProcessBackend) | sentinel text in the process log |
//! | [`DockerBackend`](docker::DockerBackend) | container inspect |
//! | [`KubernetesBackend`](kubernetes::KubernetesBackend) | pod phase |
//! | [`MockBackend`](mock::MockBackend) | driven by tests |

mod cli;
pub mod docker;
pub mod kubernetes;
pub mod mock;
pub mod process;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::events::StatusListener;
use crate::model::{InstanceDescriptor, InstanceStatus, StatusResult};

const TRANSIENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors raised by a backend when an operation cannot even be attempted.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// The child process could not be spawned.
    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    /// An external control-plane command failed.
    #[error("{program} exited with {status}: {stderr}")]
    Command {
        /// Program that was run (`docker`, `kubectl`).
        program: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The control plane answered with something unusable.
    #[error("Unexpected response: {0}")]
    Protocol(String),

    /// The instance's remote resource does not exist.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Lifecycle contract shared by all execution backends.
///
/// Backends report runtime transitions to the listeners registered with
/// [`add_listener`](InstanceBackend::add_listener). Status queries never fail
/// for an instance that simply is not running; they report `Stopped`.
#[async_trait]
pub trait InstanceBackend: Send + Sync {
    /// Backend type identifier (e.g., "process", "docker", "kubernetes").
    fn backend_type(&self) -> &'static str;

    /// Register a status-change listener.
    fn add_listener(&self, listener: Arc<dyn StatusListener>);

    /// Prepare a freshly added instance (copy artifacts, create remote resources).
    ///
    /// Returns the descriptor with any rewritten arguments; the caller persists it.
    async fn initialize(&self, descriptor: InstanceDescriptor) -> Result<InstanceDescriptor>;

    /// Start the instance. Returns without waiting for readiness where readiness is asynchronous.
    async fn start(&self, descriptor: &InstanceDescriptor) -> Result<StatusResult>;

    /// Stop the instance.
    async fn stop(&self, descriptor: &InstanceDescriptor) -> Result<StatusResult>;

    /// Current status.
    async fn status(&self, descriptor: &InstanceDescriptor) -> Result<InstanceStatus>;

    /// Endpoint of the running service.
    async fn service_endpoint(&self, descriptor: &InstanceDescriptor) -> Result<Option<String>>;

    /// Status and endpoint together.
    async fn status_result(&self, descriptor: &InstanceDescriptor) -> Result<StatusResult> {
        let status = self.status(descriptor).await?;
        let endpoint = if status == InstanceStatus::Running {
            self.service_endpoint(descriptor).await?
        } else {
            None
        };
        Ok(StatusResult::with_endpoint(&descriptor.id, status, endpoint))
    }

    /// Block until the status leaves `Starting`/`Stopping` or `timeout` elapses.
    ///
    /// The default polls [`status_result`](InstanceBackend::status_result).
    async fn wait_while_transient(
        &self,
        descriptor: &InstanceDescriptor,
        timeout: Duration,
    ) -> Result<StatusResult> {
        let deadline = Instant::now() + timeout;
        loop {
            let current = self.status_result(descriptor).await?;
            if !current.status.is_transient() {
                return Ok(current);
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "instance {} still {} after {timeout:?}",
                    descriptor.id, current.status
                )));
            }
            tokio::time::sleep(TRANSIENT_POLL_INTERVAL).await;
        }
    }

    /// Release everything the backend holds for the instance.
    async fn destroy(&self, descriptor: &InstanceDescriptor) -> Result<()>;

    /// Remove leftovers not tied to any known descriptor.
    async fn purge(&self) -> Result<()> {
        Ok(())
    }

    /// Stop everything still running, for shutdown.
    async fn shutdown(&self) {}
}

/// Copy `src` to `dest` unless both already name the same file.
pub(crate) async fn copy_if_not_same(src: &Path, dest: &Path) -> Result<PathBuf> {
    let src_abs = tokio::fs::canonicalize(src).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(format!("file {}", src.display()))
        } else {
            Error::Io(e)
        }
    })?;
    let same = match tokio::fs::canonicalize(dest).await {
        Ok(dest_abs) => dest_abs == src_abs,
        Err(_) => false,
    };
    if !same {
        tokio::fs::copy(&src_abs, dest).await?;
    }
    Ok(tokio::fs::canonicalize(dest).await?)
}
