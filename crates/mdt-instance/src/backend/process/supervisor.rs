// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process supervisor: one child OS process per instance id.
//!
//! # State machine
//!
//! ```text
//!  (absent) ──start──▶ STARTING ──sentinel[0]──▶ RUNNING ──stop──▶ STOPPING
//!                         │  └──stop──▶ STOPPING        │             │
//!                         │                             │ unexpected  │ exit
//!           sentinel[1],  ▼                             ▼ exit        ▼
//!           timeout ──▶ FAILED ◀─────────────────────────┘          STOPPED
//! ```
//!
//! Records are evicted once the exit waiter observes termination, which turns
//! later status queries back into an implicit `STOPPED`.
//!
//! Every record carries a generation number. The readiness watcher, the exit
//! waiter and the graceful-stop watcher only apply a transition when the
//! record still carries the generation they were started for and is in the
//! state they expect. A `stop` issued while `STARTING` therefore can never be
//! undone by a success sentinel that arrives later.
//!
//! All table reads and writes happen under one mutex. Every transition is
//! published to listeners while the mutex is held, so listeners observe
//! transitions in order, and wakes every task blocked in
//! [`ProcessSupervisor::wait_while_transient`].

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::tail::{LogTailer, SentinelFinder, TailError, current_len};
use crate::backend::BackendError;
use crate::error::{Error, Result};
use crate::events::{InstanceStatusChangeEvent, ListenerSet, StatusListener};
use crate::model::{EndpointFormat, InstanceStatus, StatusResult};

/// Default readiness sentinels: success first, failure second.
pub const DEFAULT_SENTINELS: [&str; 2] = ["HTTP endpoint available on port", "ERROR"];

/// Default graceful-shutdown sentinel.
pub const DEFAULT_STOP_SENTINEL: &str = "Goodbye!";

/// How `stop` completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopPolicy {
    /// Send the terminate signal and let the exit waiter finish the transition.
    Signal,
    /// Additionally tail the log for a shutdown sentinel; kill the process if
    /// it does not appear within `timeout`.
    AwaitSentinel {
        /// Line substring announcing a clean shutdown.
        sentinel: String,
        /// Time allowed before a forced kill.
        timeout: Duration,
    },
}

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Program and leading arguments, e.g. `["java", "-jar"]`.
    pub launcher: Vec<String>,
    /// Readiness sentinels; index 0 reports the port, index 1 reports failure.
    pub sentinels: Vec<String>,
    /// Log sample interval.
    pub sample_interval: Duration,
    /// Time allowed for a sentinel to appear.
    pub start_timeout: Duration,
    /// Endpoint template, `%d` is the port.
    pub endpoint_format: EndpointFormat,
    /// Stop completion protocol.
    pub stop_policy: StopPolicy,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            launcher: vec!["java".to_string(), "-jar".to_string()],
            sentinels: DEFAULT_SENTINELS.iter().map(|s| s.to_string()).collect(),
            sample_interval: Duration::from_millis(500),
            start_timeout: Duration::from_secs(60),
            endpoint_format: EndpointFormat::default(),
            stop_policy: StopPolicy::Signal,
        }
    }
}

/// What to launch for one instance.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Instance id.
    pub instance_id: String,
    /// Working directory; logs go to `{working_dir}/logs/`.
    pub working_dir: PathBuf,
    /// Packaged runnable.
    pub jar_file: PathBuf,
    /// Model file passed with `-m`.
    pub model_file: PathBuf,
    /// Configuration file passed with `-c`.
    pub config_file: PathBuf,
}

impl LaunchSpec {
    /// Path of the redirected stdout.
    pub fn stdout_path(&self) -> PathBuf {
        self.working_dir
            .join("logs")
            .join(format!("{}_stdout", self.instance_id))
    }

    /// Path of the redirected stderr.
    pub fn stderr_path(&self) -> PathBuf {
        self.working_dir
            .join("logs")
            .join(format!("{}_stderr", self.instance_id))
    }
}

/// Point-in-time view of a process record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    /// Instance id.
    pub instance_id: String,
    /// Record status.
    pub status: InstanceStatus,
    /// OS process id, once spawned.
    pub pid: Option<u32>,
    /// Port reported by the readiness sentinel.
    pub port: Option<u16>,
    /// Redirected stdout.
    pub log_file: PathBuf,
    /// When `start` created the record.
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
struct ProcessRecord {
    generation: u64,
    status: InstanceStatus,
    pid: Option<u32>,
    port: Option<u16>,
    log_file: PathBuf,
    started_at: DateTime<Utc>,
}

struct Shared {
    config: SupervisorConfig,
    finder: SentinelFinder,
    table: Mutex<HashMap<String, ProcessRecord>>,
    changed: Notify,
    listeners: ListenerSet,
    generations: AtomicU64,
}

impl Shared {
    fn result_of(&self, id: &str, record: Option<&ProcessRecord>) -> StatusResult {
        match record {
            Some(rec) => StatusResult::with_endpoint(
                id,
                rec.status,
                rec.port.map(|p| self.config.endpoint_format.render(p)),
            ),
            None => StatusResult::new(id, InstanceStatus::Stopped),
        }
    }

    /// Publish a transition. Must be called with the table locked.
    fn publish(&self, id: &str, status: InstanceStatus, endpoint: Option<String>) {
        let event = match endpoint {
            Some(ep) => InstanceStatusChangeEvent::running(id, ep),
            None => InstanceStatusChangeEvent::new(id, status),
        };
        self.listeners.notify(&event);
        self.changed.notify_waiters();
    }

    /// Apply `f` to the record if it still has `generation`.
    fn with_generation<T>(
        &self,
        id: &str,
        generation: u64,
        f: impl FnOnce(&mut HashMap<String, ProcessRecord>) -> T,
    ) -> Option<T> {
        let mut table = self.table.lock();
        let current = table.get(id).is_some_and(|rec| rec.generation == generation);
        current.then(|| f(&mut table))
    }

    fn on_spawned(&self, id: &str, generation: u64, pid: Option<u32>) -> bool {
        self.with_generation(id, generation, |table| {
            let Some(rec) = table.get_mut(id) else {
                return false;
            };
            rec.pid = pid;
            // stop() raced the spawn: it could not signal a process it had no pid for
            rec.status == InstanceStatus::Stopping
        })
        .unwrap_or(false)
    }

    fn on_ready(&self, id: &str, generation: u64, port: u16) {
        let applied = self.with_generation(id, generation, |table| {
            let rec = table.get_mut(id)?;
            if rec.status != InstanceStatus::Starting {
                return None;
            }
            rec.status = InstanceStatus::Running;
            rec.port = Some(port);
            let endpoint = self.config.endpoint_format.render(port);
            self.publish(id, InstanceStatus::Running, Some(endpoint.clone()));
            Some(endpoint)
        });
        match applied.flatten() {
            Some(endpoint) => info!(instance_id = %id, port, endpoint = %endpoint, "Instance running"),
            None => debug!(instance_id = %id, generation, "Ignoring stale readiness sentinel"),
        }
    }

    /// Mark a still-starting record failed. Returns the pid to kill.
    fn on_start_failed(&self, id: &str, generation: u64, reason: &str) -> Option<u32> {
        self.with_generation(id, generation, |table| {
            let rec = table.get_mut(id)?;
            if rec.status != InstanceStatus::Starting {
                return None;
            }
            rec.status = InstanceStatus::Failed;
            rec.port = None;
            warn!(instance_id = %id, reason, "Instance failed to start");
            self.publish(id, InstanceStatus::Failed, None);
            rec.pid
        })
        .flatten()
    }

    fn on_exit(&self, id: &str, generation: u64, exit: std::io::Result<ExitStatus>) {
        self.with_generation(id, generation, |table| {
            let Some(rec) = table.get_mut(id) else {
                return;
            };
            let next = match (&exit, rec.status) {
                (Err(_), _) => InstanceStatus::Failed,
                (Ok(_), InstanceStatus::Stopping) => InstanceStatus::Stopped,
                (Ok(_), InstanceStatus::Failed) => InstanceStatus::Failed,
                (Ok(st), _) if st.success() => InstanceStatus::Stopped,
                (Ok(_), _) => InstanceStatus::Failed,
            };
            let changed = rec.status != next;
            rec.status = next;
            rec.port = None;

            match &exit {
                Ok(st) => info!(instance_id = %id, exit_status = %st, status = %next, "Instance process exited"),
                Err(e) => error!(instance_id = %id, error = %e, "Failed to wait for instance process"),
            }

            if changed {
                self.publish(id, next, None);
            }
            // the process is gone: evict so the id reads as implicitly STOPPED
            if exit.is_ok() {
                table.remove(id);
                self.changed.notify_waiters();
            }
        });
    }
}

/// Thread-safe table of supervised processes.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<Shared>,
}

impl ProcessSupervisor {
    /// Create a supervisor.
    pub fn new(config: SupervisorConfig) -> Self {
        let finder = SentinelFinder::new(config.sentinels.clone());
        Self {
            inner: Arc::new(Shared {
                config,
                finder,
                table: Mutex::new(HashMap::new()),
                changed: Notify::new(),
                listeners: ListenerSet::new(),
                generations: AtomicU64::new(1),
            }),
        }
    }

    /// Supervisor configuration.
    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    /// Register a status-change listener.
    pub fn add_listener(&self, listener: Arc<dyn StatusListener>) {
        self.inner.listeners.add(listener);
    }

    /// Launch the instance unless it is already starting or running.
    ///
    /// Returns immediately with `STARTING`; readiness is reported later
    /// through listeners and [`status`](Self::status).
    pub async fn start(&self, spec: LaunchSpec) -> Result<StatusResult> {
        let id = spec.instance_id.clone();
        let log_file = spec.stdout_path();

        let generation = {
            let mut table = self.inner.table.lock();
            if let Some(rec) = table.get(&id) {
                if rec.status.is_active() {
                    debug!(instance_id = %id, status = %rec.status, "Start ignored, already active");
                    return Ok(self.inner.result_of(&id, Some(rec)));
                }
                if rec.status == InstanceStatus::Stopping {
                    return Err(Error::InvalidState(format!(
                        "instance {id} is still stopping"
                    )));
                }
            }
            let generation = self.inner.generations.fetch_add(1, Ordering::SeqCst);
            table.insert(
                id.clone(),
                ProcessRecord {
                    generation,
                    status: InstanceStatus::Starting,
                    pid: None,
                    port: None,
                    log_file: log_file.clone(),
                    started_at: Utc::now(),
                },
            );
            self.inner.publish(&id, InstanceStatus::Starting, None);
            generation
        };

        let (child, offset) = match self.spawn(&spec).await {
            Ok(spawned) => spawned,
            Err(e) => {
                error!(instance_id = %id, error = %e, "Failed to launch instance");
                self.inner.with_generation(&id, generation, |table| {
                    table.remove(&id);
                    self.inner.publish(&id, InstanceStatus::Failed, None);
                });
                return Err(e.into());
            }
        };

        let pid = child.id();
        info!(instance_id = %id, pid = ?pid, generation, "Instance process spawned");
        if self.inner.on_spawned(&id, generation, pid)
            && let Some(pid) = pid
        {
            send_signal(&id, pid, Signal::SIGTERM);
        }

        self.spawn_exit_waiter(id.clone(), generation, child);
        self.spawn_readiness_watcher(id.clone(), generation, log_file, offset);

        let table = self.inner.table.lock();
        Ok(self.inner.result_of(&id, table.get(&id)))
    }

    async fn spawn(&self, spec: &LaunchSpec) -> std::result::Result<(Child, u64), BackendError> {
        let stdout_path = spec.stdout_path();
        if let Some(dir) = stdout_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        // tail from whatever is already in the file
        let offset = current_len(&stdout_path).await?;
        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&stdout_path)?;
        let stderr = OpenOptions::new()
            .create(true)
            .append(true)
            .open(spec.stderr_path())?;

        let (program, leading) = self
            .inner
            .config
            .launcher
            .split_first()
            .ok_or_else(|| BackendError::Spawn("empty launcher".to_string()))?;

        let child = Command::new(program)
            .args(leading)
            .arg(&spec.jar_file)
            .arg("-m")
            .arg(&spec.model_file)
            .arg("-c")
            .arg(&spec.config_file)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| BackendError::Spawn(format!("{program}: {e}")))?;

        Ok((child, offset))
    }

    fn spawn_exit_waiter(&self, id: String, generation: u64, mut child: Child) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let exit = child.wait().await;
            inner.on_exit(&id, generation, exit);
        });
    }

    fn spawn_readiness_watcher(&self, id: String, generation: u64, log_file: PathBuf, offset: u64) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut tailer = LogTailer::new(log_file, offset);
            let still_starting = || {
                inner
                    .table
                    .lock()
                    .get(&id)
                    .is_some_and(|r| r.generation == generation && r.status == InstanceStatus::Starting)
            };
            let outcome = tailer
                .await_sentinel(
                    &inner.finder,
                    inner.config.sample_interval,
                    inner.config.start_timeout,
                    still_starting,
                )
                .await;

            let failure = match outcome {
                Ok(found) if found.index == 0 => match found.trailing_port() {
                    Some(port) => {
                        inner.on_ready(&id, generation, port);
                        return;
                    }
                    None => format!("unparsable port in '{}'", found.line),
                },
                Ok(found) => format!("failure sentinel: {}", found.line),
                Err(TailError::Interrupted) => "watcher interrupted".to_string(),
                Err(e) => e.to_string(),
            };
            if let Some(pid) = inner.on_start_failed(&id, generation, &failure) {
                send_signal(&id, pid, Signal::SIGKILL);
            }
        });
    }

    /// Request termination of a starting or running instance.
    ///
    /// Moves the record to `STOPPING` and signals the process; the exit
    /// waiter completes the transition to `STOPPED`. Any other state is
    /// returned unchanged.
    pub async fn stop(&self, id: &str) -> Result<StatusResult> {
        let (pid, generation, log_file) = {
            let mut table = self.inner.table.lock();
            let Some(rec) = table.get_mut(id) else {
                return Ok(StatusResult::new(id, InstanceStatus::Stopped));
            };
            if !rec.status.is_active() {
                let rec = &*rec;
                return Ok(self.inner.result_of(id, Some(rec)));
            }
            rec.status = InstanceStatus::Stopping;
            rec.port = None;
            let snapshot = (rec.pid, rec.generation, rec.log_file.clone());
            self.inner.publish(id, InstanceStatus::Stopping, None);
            snapshot
        };

        info!(instance_id = %id, pid = ?pid, "Stopping instance");

        if let StopPolicy::AwaitSentinel { sentinel, timeout } = &self.inner.config.stop_policy {
            let offset = current_len(&log_file).await.unwrap_or(0);
            self.spawn_stop_watcher(
                id.to_string(),
                generation,
                LogTailer::new(log_file, offset),
                sentinel.clone(),
                *timeout,
            );
        }
        if let Some(pid) = pid {
            send_signal(id, pid, Signal::SIGTERM);
        }

        Ok(StatusResult::new(id, InstanceStatus::Stopping))
    }

    fn spawn_stop_watcher(
        &self,
        id: String,
        generation: u64,
        mut tailer: LogTailer,
        sentinel: String,
        timeout: Duration,
    ) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let finder = SentinelFinder::new([sentinel]);
            let still_stopping = || {
                inner
                    .table
                    .lock()
                    .get(&id)
                    .is_some_and(|r| r.generation == generation && r.status == InstanceStatus::Stopping)
            };
            match tailer
                .await_sentinel(&finder, inner.config.sample_interval, timeout, still_stopping)
                .await
            {
                Ok(_) => debug!(instance_id = %id, "Shutdown sentinel observed"),
                Err(TailError::Interrupted) => {}
                Err(e) => {
                    let pid = inner
                        .with_generation(&id, generation, |table| {
                            table
                                .get(&id)
                                .filter(|r| r.status == InstanceStatus::Stopping)
                                .and_then(|r| r.pid)
                        })
                        .flatten();
                    if let Some(pid) = pid {
                        warn!(instance_id = %id, error = %e, "Graceful shutdown not confirmed, killing");
                        send_signal(&id, pid, Signal::SIGKILL);
                    }
                }
            }
        });
    }

    /// Current status; ids without a record are `STOPPED`.
    pub fn status(&self, id: &str) -> InstanceStatus {
        self.inner
            .table
            .lock()
            .get(id)
            .map(|r| r.status)
            .unwrap_or(InstanceStatus::Stopped)
    }

    /// Current status with endpoint.
    pub fn status_result(&self, id: &str) -> StatusResult {
        let table = self.inner.table.lock();
        self.inner.result_of(id, table.get(id))
    }

    /// Endpoint of a running instance.
    pub fn service_endpoint(&self, id: &str) -> Option<String> {
        self.status_result(id).service_endpoint
    }

    /// Status of every record in the table, ordered by id.
    pub fn all_statuses(&self) -> Vec<StatusResult> {
        let table = self.inner.table.lock();
        let mut all: Vec<_> = table
            .iter()
            .map(|(id, rec)| self.inner.result_of(id, Some(rec)))
            .collect();
        all.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        all
    }

    /// Point-in-time copy of a record.
    pub fn snapshot(&self, id: &str) -> Option<ProcessSnapshot> {
        self.inner.table.lock().get(id).map(|rec| ProcessSnapshot {
            instance_id: id.to_string(),
            status: rec.status,
            pid: rec.pid,
            port: rec.port,
            log_file: rec.log_file.clone(),
            started_at: rec.started_at,
        })
    }

    /// Block until the status leaves `STARTING`/`STOPPING` or `timeout` elapses.
    pub async fn wait_while_transient(&self, id: &str, timeout: Duration) -> Result<StatusResult> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.inner.changed.notified();
            tokio::pin!(notified);
            // register before checking so a transition in between is not missed
            notified.as_mut().enable();

            let current = self.status_result(id);
            if !current.status.is_transient() {
                return Ok(current);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(Error::Timeout(format!(
                    "instance {id} still {} after {timeout:?}",
                    current.status
                )));
            }
        }
    }

    /// Forcibly kill one instance's process, if any.
    pub fn kill(&self, id: &str) {
        let pid = self.inner.table.lock().get(id).and_then(|r| r.pid);
        if let Some(pid) = pid {
            send_signal(id, pid, Signal::SIGKILL);
        }
    }

    /// Forcibly kill every tracked process.
    pub fn kill_all(&self) {
        let pids: Vec<(String, u32)> = self
            .inner
            .table
            .lock()
            .iter()
            .filter_map(|(id, r)| r.pid.map(|pid| (id.clone(), pid)))
            .collect();
        for (id, pid) in pids {
            send_signal(&id, pid, Signal::SIGKILL);
        }
    }

    /// Stop every active instance, waiting up to `grace` before killing stragglers.
    pub async fn shutdown(&self, grace: Duration) {
        let ids: Vec<String> = self.inner.table.lock().keys().cloned().collect();
        for id in &ids {
            if let Err(e) = self.stop(id).await {
                warn!(instance_id = %id, error = %e, "Failed to stop instance during shutdown");
            }
        }
        for id in &ids {
            if self.wait_while_transient(id, grace).await.is_err() {
                self.kill(id);
            }
        }
    }
}

fn send_signal(id: &str, pid: u32, sig: Signal) {
    let Ok(raw) = i32::try_from(pid) else {
        warn!(instance_id = %id, pid, "PID out of range, cannot signal");
        return;
    };
    match signal::kill(Pid::from_raw(raw), sig) {
        Ok(()) => debug!(instance_id = %id, pid, signal = sig.as_str(), "Signal sent"),
        Err(nix::errno::Errno::ESRCH) => {
            debug!(instance_id = %id, pid, "Process already gone");
        }
        Err(e) => warn!(instance_id = %id, pid, error = %e, "Failed to signal process"),
    }
}
