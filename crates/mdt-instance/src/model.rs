// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance data model: descriptors, runtime status and backend arguments.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Runtime status of an instance.
///
/// Never persisted. Derived live from the backend, except the transient
/// `Starting`/`Stopping` states which the process supervisor holds in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// Registered but never started.
    Added,
    /// Launched, readiness not yet observed.
    Starting,
    /// Serving requests.
    Running,
    /// Terminate requested, exit not yet observed.
    Stopping,
    /// Not running.
    Stopped,
    /// Exited abnormally or never became ready.
    Failed,
    /// Deleted from the manager.
    Removed,
}

impl InstanceStatus {
    /// `Starting` or `Running`: the instance holds live resources and cannot be removed.
    pub fn is_active(self) -> bool {
        matches!(self, InstanceStatus::Starting | InstanceStatus::Running)
    }

    /// `Starting` or `Stopping`.
    pub fn is_transient(self) -> bool {
        matches!(self, InstanceStatus::Starting | InstanceStatus::Stopping)
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::Added => "ADDED",
            InstanceStatus::Starting => "STARTING",
            InstanceStatus::Running => "RUNNING",
            InstanceStatus::Stopping => "STOPPING",
            InstanceStatus::Stopped => "STOPPED",
            InstanceStatus::Failed => "FAILED",
            InstanceStatus::Removed => "REMOVED",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "ADDED" => InstanceStatus::Added,
            "STARTING" => InstanceStatus::Starting,
            "RUNNING" => InstanceStatus::Running,
            "STOPPING" => InstanceStatus::Stopping,
            "STOPPED" => InstanceStatus::Stopped,
            "FAILED" => InstanceStatus::Failed,
            "REMOVED" => InstanceStatus::Removed,
            other => return Err(Error::InvalidState(format!("unknown status '{other}'"))),
        })
    }
}

/// Uniform result of start/stop/status queries across all backends.
///
/// `service_endpoint` is only ever set when `status` is `Running`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResult {
    /// Instance id.
    pub instance_id: String,
    /// Current status.
    pub status: InstanceStatus,
    /// Endpoint of the running service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_endpoint: Option<String>,
}

impl StatusResult {
    /// Result without an endpoint. Use [`StatusResult::running`] for `Running`.
    pub fn new(instance_id: impl Into<String>, status: InstanceStatus) -> Self {
        Self {
            instance_id: instance_id.into(),
            status,
            service_endpoint: None,
        }
    }

    /// `Running` result with its endpoint.
    pub fn running(instance_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            status: InstanceStatus::Running,
            service_endpoint: Some(endpoint.into()),
        }
    }

    /// Build from a status and an optional endpoint, dropping the endpoint
    /// unless the status is `Running`.
    pub fn with_endpoint(
        instance_id: impl Into<String>,
        status: InstanceStatus,
        endpoint: Option<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            status,
            service_endpoint: endpoint.filter(|_| status == InstanceStatus::Running),
        }
    }
}

/// A submodel carried by an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSubmodel {
    /// Submodel id.
    pub submodel_id: String,
    /// Submodel short id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submodel_id_short: Option<String>,
}

/// Persisted identity and configuration of one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDescriptor {
    /// Caller-assigned unique id.
    pub id: String,
    /// Id of the shell the instance serves (unique).
    pub aas_id: String,
    /// Short id of the shell (not unique).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aas_id_short: Option<String>,
    /// Submodels of the shell.
    #[serde(default)]
    pub submodels: Vec<InstanceSubmodel>,
    /// Backend-specific arguments.
    #[serde(default)]
    pub arguments: Value,
}

impl InstanceDescriptor {
    /// Decode the backend-specific arguments.
    pub fn arguments<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.arguments.clone()).map_err(|e| {
            Error::InvalidState(format!("invalid arguments for instance {}: {e}", self.id))
        })
    }

    /// Replace the backend-specific arguments.
    pub fn set_arguments<T: Serialize>(&mut self, arguments: &T) -> Result<()> {
        self.arguments = serde_json::to_value(arguments)?;
        Ok(())
    }

    /// Submodel ids, in declaration order.
    pub fn submodel_ids(&self) -> impl Iterator<Item = &str> {
        self.submodels.iter().map(|sm| sm.submodel_id.as_str())
    }
}

/// Arguments of the local-process backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JarArguments {
    /// Packaged runnable.
    pub jar_file: PathBuf,
    /// AAS model file passed with `-m`.
    pub model_file: PathBuf,
    /// Service configuration passed with `-c`.
    pub config_file: PathBuf,
}

/// Arguments of the container backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerArguments {
    /// Image to create the container from.
    pub image_id: String,
    /// AAS model file mounted at `/model.json`.
    pub model_file: PathBuf,
    /// Service configuration mounted at `/conf.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Container id assigned at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
}

/// Arguments of the cluster backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterArguments {
    /// Image of the deployment's container.
    pub image_id: String,
}

/// `printf`-style service endpoint template.
///
/// `%d` is replaced with the port and `%s` (when present) with a host name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointFormat(String);

impl EndpointFormat {
    /// Wrap a template string.
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// The raw template.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Substitute the port.
    pub fn render(&self, port: u16) -> String {
        self.0.replacen("%d", &port.to_string(), 1)
    }

    /// Substitute host and port.
    pub fn render_for_host(&self, host: &str, port: u16) -> String {
        self.0
            .replacen("%s", host, 1)
            .replacen("%d", &port.to_string(), 1)
    }
}

impl Default for EndpointFormat {
    fn default() -> Self {
        Self::new("https://localhost:%d/api/v3.0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_value(InstanceStatus::Running).unwrap(),
            json!("RUNNING")
        );
        assert_eq!(
            "stopping".parse::<InstanceStatus>().unwrap(),
            InstanceStatus::Stopping
        );
        assert!("bogus".parse::<InstanceStatus>().is_err());
    }

    #[test]
    fn test_with_endpoint_drops_endpoint_unless_running() {
        let stopped = StatusResult::with_endpoint(
            "a",
            InstanceStatus::Stopped,
            Some("https://h:1/api".into()),
        );
        assert_eq!(stopped.service_endpoint, None);

        let running = StatusResult::with_endpoint(
            "a",
            InstanceStatus::Running,
            Some("https://h:1/api".into()),
        );
        assert_eq!(running.service_endpoint.as_deref(), Some("https://h:1/api"));
    }

    #[test]
    fn test_endpoint_format() {
        let fmt = EndpointFormat::new("https://10.0.0.5:%d/api/v3.0");
        assert_eq!(fmt.render(8443), "https://10.0.0.5:8443/api/v3.0");

        let cluster = EndpointFormat::new("https://%s:%d/api/v3.0");
        assert_eq!(
            cluster.render_for_host("worker-1", 30443),
            "https://worker-1:30443/api/v3.0"
        );
    }

    #[test]
    fn test_descriptor_arguments_roundtrip() {
        let mut desc = InstanceDescriptor {
            id: "vacuum".into(),
            aas_id: "urn:aas:vacuum".into(),
            aas_id_short: None,
            submodels: vec![],
            arguments: json!({
                "jarFile": "/opt/fa3st.jar",
                "modelFile": "model.json",
                "configFile": "conf.json"
            }),
        };
        let args: JarArguments = desc.arguments().unwrap();
        assert_eq!(args.jar_file, PathBuf::from("/opt/fa3st.jar"));

        let container: Result<ContainerArguments> = desc.arguments();
        assert!(matches!(container, Err(Error::InvalidState(_))));

        desc.set_arguments(&ClusterArguments {
            image_id: "mdt/fa3st:1".into(),
        })
        .unwrap();
        assert_eq!(desc.arguments["imageId"], "mdt/fa3st:1");
    }
}
