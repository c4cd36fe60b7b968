// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for mdt-instance integration tests.
//!
//! Instances are shell scripts launched with `sh`, standing in for the
//! packaged service: they print the readiness sentinel, idle, and answer
//! SIGTERM with the shutdown sentinel.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;

use mdt_instance::backend::process::{
    DEFAULT_SENTINELS, LaunchSpec, ProcessBackend, StopPolicy, SupervisorConfig,
};
use mdt_instance::environment::AasEnvironment;
use mdt_instance::events::{ChannelListener, InstanceStatusChangeEvent};
use mdt_instance::model::{EndpointFormat, InstanceStatus};
use mdt_instance::runtime::ManagerRuntime;
use mdt_instance::store::FileDescriptorStore;
use mdt_registry::{InMemoryRegistry, ShellDescriptor, SubmodelDescriptor};

/// Port announced by the scripts.
pub const PORT: u16 = 8443;

/// Endpoint the scripts' port renders to.
pub const ENDPOINT: &str = "https://localhost:8443/api/v3.0";

/// Becomes ready after a short delay and exits cleanly on SIGTERM.
pub const READY_SCRIPT: &str = r#"trap 'echo "Goodbye!"; exit 0' TERM
sleep 0.3
echo "HTTP endpoint available on port 8443"
while true; do sleep 0.1; done
"#;

/// Announces readiness only once it has been asked to terminate.
///
/// Prints [`BOOTING_LINE`] once the handler is installed.
pub const LATE_READY_SCRIPT: &str = r#"trap 'echo "HTTP endpoint available on port 8443"; echo "Goodbye!"; exit 0' TERM
echo "booting"
while true; do sleep 0.1; done
"#;

/// Line printed by [`LATE_READY_SCRIPT`] after installing its TERM handler.
pub const BOOTING_LINE: &str = "booting";

/// Reports a startup failure and keeps running.
pub const ERROR_SCRIPT: &str = r#"echo "ERROR cannot bind port"
while true; do sleep 0.1; done
"#;

/// Never announces anything.
pub const SILENT_SCRIPT: &str = r#"while true; do sleep 0.1; done
"#;

/// Ready, but ignores SIGTERM.
pub const STUBBORN_SCRIPT: &str = r#"trap '' TERM
echo "HTTP endpoint available on port 8443"
while true; do sleep 0.1; done
"#;

/// Default time tests wait for a transition.
pub const WAIT: Duration = Duration::from_secs(10);

/// Write `body` as `name` under `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("Failed to write script");
    path
}

/// Supervisor settings tuned for fast tests.
pub fn supervisor_config(start_timeout: Duration) -> SupervisorConfig {
    SupervisorConfig {
        launcher: vec!["sh".to_string()],
        sentinels: DEFAULT_SENTINELS.iter().map(|s| s.to_string()).collect(),
        sample_interval: Duration::from_millis(50),
        start_timeout,
        endpoint_format: EndpointFormat::new("https://localhost:%d/api/v3.0"),
        stop_policy: StopPolicy::Signal,
    }
}

/// Launch spec for `script`, working in `{dir}/{id}`.
pub fn launch_spec(dir: &Path, id: &str, script: &Path) -> LaunchSpec {
    LaunchSpec {
        instance_id: id.to_string(),
        working_dir: dir.join(id),
        jar_file: script.to_path_buf(),
        model_file: PathBuf::from("model.json"),
        config_file: PathBuf::from("conf.json"),
    }
}

/// Listener forwarding every event to a channel.
pub fn event_channel() -> (
    Arc<ChannelListener>,
    mpsc::UnboundedReceiver<InstanceStatusChangeEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelListener::new(tx)), rx)
}

/// Receive events until one for `id` has `status`, returning everything seen for `id`.
pub async fn await_event(
    rx: &mut mpsc::UnboundedReceiver<InstanceStatusChangeEvent>,
    id: &str,
    status: InstanceStatus,
) -> Vec<InstanceStatusChangeEvent> {
    let mut seen = Vec::new();
    let deadline = Instant::now() + WAIT;
    loop {
        let event = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .unwrap_or_else(|_| panic!("no {status} event for {id}; saw {seen:?}"))
            .expect("event channel closed");
        if event.id != id {
            continue;
        }
        let done = event.status == status;
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Whether the stdout log of `id` under `dir` contains `needle`.
pub fn log_contains(dir: &Path, id: &str, needle: &str) -> bool {
    std::fs::read_to_string(dir.join(id).join("logs").join(format!("{id}_stdout")))
        .is_ok_and(|log| log.contains(needle))
}

/// Poll `check` until it holds or the default wait elapses.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Environment with one shell and the given submodels.
pub fn environment(aas_id: &str, submodel_ids: &[&str]) -> AasEnvironment {
    let refs: Vec<Value> = submodel_ids
        .iter()
        .map(|id| json!({"type": "ModelReference", "keys": [{"type": "Submodel", "value": id}]}))
        .collect();
    let submodels: Vec<Value> = submodel_ids.iter().map(|id| json!({"id": id})).collect();
    serde_json::from_value(json!({
        "assetAdministrationShells": [{"id": aas_id, "idShort": "Twin", "submodels": refs}],
        "submodels": submodels,
    }))
    .expect("Failed to build environment")
}

/// A runtime over the process backend, with in-memory registries.
pub struct TestContext {
    pub runtime: ManagerRuntime,
    pub backend: Arc<ProcessBackend>,
    pub shells: Arc<InMemoryRegistry<ShellDescriptor>>,
    pub submodels: Arc<InMemoryRegistry<SubmodelDescriptor>>,
    pub workspace: PathBuf,
    pub sources: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl TestContext {
    /// Create a context whose instances run [`READY_SCRIPT`].
    pub async fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let workspace = temp_dir.path().join("instances");
        let sources = temp_dir.path().join("sources");
        std::fs::create_dir_all(&sources).expect("Failed to create sources dir");
        write_script(&sources, "service.sh", READY_SCRIPT);
        std::fs::write(sources.join("model.json"), "{}").expect("Failed to write model");
        std::fs::write(sources.join("conf.json"), "{}").expect("Failed to write config");

        let store = Arc::new(
            FileDescriptorStore::open(&workspace)
                .await
                .expect("Failed to open store"),
        );
        let backend = Arc::new(
            ProcessBackend::new(&workspace, supervisor_config(WAIT))
                .with_shutdown_grace(Duration::from_secs(2)),
        );
        let shells = Arc::new(InMemoryRegistry::<ShellDescriptor>::new());
        let submodels = Arc::new(InMemoryRegistry::<SubmodelDescriptor>::new());

        let runtime = ManagerRuntime::builder()
            .workspace(&workspace)
            .store(store)
            .shell_registry(shells.clone())
            .submodel_registry(submodels.clone())
            .backend(backend.clone())
            .build()
            .expect("Failed to build runtime")
            .start()
            .await
            .expect("Failed to start runtime");

        Self {
            runtime,
            backend,
            shells,
            submodels,
            workspace,
            sources,
            _temp_dir: temp_dir,
        }
    }

    /// Backend arguments pointing at the source artifacts.
    pub fn arguments(&self) -> Value {
        json!({
            "jarFile": self.sources.join("service.sh"),
            "modelFile": self.sources.join("model.json"),
            "configFile": self.sources.join("conf.json"),
        })
    }
}
