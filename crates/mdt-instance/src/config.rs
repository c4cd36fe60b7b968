// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for mdt-instance.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::model::EndpointFormat;

/// Execution backend selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Local OS process launched from a packaged runnable.
    Process,
    /// Docker container.
    Docker,
    /// Kubernetes Deployment/Service pair.
    Kubernetes,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "process" | "jar" => Ok(BackendKind::Process),
            "docker" => Ok(BackendKind::Docker),
            "kubernetes" | "k8s" => Ok(BackendKind::Kubernetes),
            other => Err(ConfigError::Invalid(
                "MDT_BACKEND",
                format!("unknown backend '{other}'"),
            )),
        }
    }
}

/// Instance manager configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Active execution backend
    pub backend: BackendKind,
    /// Root directory holding one subdirectory per instance
    pub workspace_dir: PathBuf,
    /// Root directory of the file-backed shell/submodel registries
    pub registry_dir: PathBuf,
    /// Number of parsed descriptors cached per registry
    pub registry_cache_size: usize,
    /// SQLite URL for the descriptor store (file store when unset)
    pub descriptor_db: Option<String>,
    /// Template for service endpoints, `%d` is replaced with the port
    pub endpoint_format: EndpointFormat,
    /// Program and leading arguments used to launch the packaged runnable
    pub launcher: Vec<String>,
    /// Log tail sample interval
    pub sample_interval: Duration,
    /// Readiness watcher timeout
    pub start_timeout: Duration,
    /// Graceful-shutdown sentinel (disabled when unset)
    pub stop_sentinel: Option<String>,
    /// Graceful-shutdown sentinel timeout
    pub stop_timeout: Duration,
    /// Docker daemon address passed as `--host`
    pub docker_host: Option<String>,
    /// Host-side directory prefix used for container bind mounts
    pub docker_mount_prefix: Option<PathBuf>,
    /// Kubernetes namespace for instance resources
    pub k8s_namespace: String,
    /// Template for cluster endpoints, `%s` is the node address and `%d` the node port
    pub k8s_endpoint_format: EndpointFormat,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = env_or("MDT_BACKEND", "process").parse()?;

        let workspace_dir = PathBuf::from(env_or("MDT_WORKSPACE_DIR", ".mdt/instances"));
        let registry_dir = PathBuf::from(env_or("MDT_REGISTRY_DIR", ".mdt/registry"));
        let registry_cache_size = parse_var("MDT_REGISTRY_CACHE_SIZE", 64usize)?;

        let descriptor_db = std::env::var("MDT_DESCRIPTOR_DB").ok();

        let endpoint_format = EndpointFormat::new(env_or(
            "MDT_ENDPOINT_FORMAT",
            "https://localhost:%d/api/v3.0",
        ));
        if !endpoint_format.as_str().contains("%d") {
            return Err(ConfigError::Invalid(
                "MDT_ENDPOINT_FORMAT",
                "missing %d placeholder".to_string(),
            ));
        }

        let launcher: Vec<String> = env_or("MDT_LAUNCHER", "java -jar")
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if launcher.is_empty() {
            return Err(ConfigError::Invalid(
                "MDT_LAUNCHER",
                "empty launcher".to_string(),
            ));
        }

        let sample_interval = Duration::from_millis(parse_var("MDT_SAMPLE_INTERVAL_MS", 500u64)?);
        let start_timeout = Duration::from_secs(parse_var("MDT_START_TIMEOUT_SECS", 60u64)?);
        let stop_sentinel = std::env::var("MDT_STOP_SENTINEL")
            .ok()
            .filter(|s| !s.is_empty());
        let stop_timeout = Duration::from_secs(parse_var("MDT_STOP_TIMEOUT_SECS", 30u64)?);

        let docker_host = std::env::var("MDT_DOCKER_HOST").ok();
        let docker_mount_prefix = std::env::var("MDT_DOCKER_MOUNT_PREFIX")
            .ok()
            .map(PathBuf::from);

        let k8s_namespace = env_or("MDT_K8S_NAMESPACE", "mdt-instance");
        let k8s_endpoint_format = EndpointFormat::new(env_or(
            "MDT_K8S_ENDPOINT_FORMAT",
            "https://%s:%d/api/v3.0",
        ));

        Ok(Self {
            backend,
            workspace_dir,
            registry_dir,
            registry_cache_size,
            descriptor_db,
            endpoint_format,
            launcher,
            sample_interval,
            start_timeout,
            stop_sentinel,
            stop_timeout,
            docker_host,
            docker_mount_prefix,
            k8s_namespace,
            k8s_endpoint_format,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid(name, e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable holds an unusable value.
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
