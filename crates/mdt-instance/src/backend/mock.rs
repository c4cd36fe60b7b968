// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock backend for testing.
//!
//! A simple backend implementation that simulates instance lifecycles
//! without actually running containers or processes.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{BackendError, InstanceBackend};
use crate::error::Result;
use crate::events::{InstanceStatusChangeEvent, ListenerSet, StatusListener};
use crate::model::{EndpointFormat, InstanceDescriptor, InstanceStatus, StatusResult};

/// Port every mock instance reports once running.
pub const MOCK_PORT: u16 = 8443;

/// Mock instance state.
#[derive(Debug, Clone, Default)]
struct MockInstance {
    status: Option<InstanceStatus>,
    /// Bumped on every start so a late completion cannot revive a stopped instance.
    generation: u64,
    starts: usize,
}

#[derive(Default)]
struct MockState {
    instances: HashMap<String, MockInstance>,
    initialized: HashSet<String>,
    destroyed: Vec<String>,
    purged: bool,
}

struct Shared {
    state: Mutex<MockState>,
    listeners: ListenerSet,
}

impl Shared {
    fn publish(&self, id: &str, status: InstanceStatus, endpoint: Option<String>) {
        let event = match endpoint {
            Some(endpoint) if status == InstanceStatus::Running => {
                InstanceStatusChangeEvent::running(id, endpoint)
            }
            _ => InstanceStatusChangeEvent::new(id, status),
        };
        self.listeners.notify(&event);
    }
}

/// Mock backend for testing.
pub struct MockBackend {
    shared: Arc<Shared>,
    /// Delay before a started instance becomes running (in milliseconds)
    pub startup_delay_ms: u64,
    /// If true, start fails
    pub fail_by_default: bool,
    /// If true, started instances stay `Starting` until [`complete_start`](Self::complete_start).
    pub never_complete: bool,
    /// If true, initialize fails
    pub fail_initialize: bool,
    /// If true, destroy fails
    pub fail_destroy: bool,
    /// Template for the endpoint of running instances
    pub endpoint_format: EndpointFormat,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(MockState::default()),
                listeners: ListenerSet::new(),
            }),
            startup_delay_ms: 0,
            fail_by_default: false,
            never_complete: false,
            fail_initialize: false,
            fail_destroy: false,
            endpoint_format: EndpointFormat::default(),
        }
    }

    /// Create a mock backend whose starts fail.
    pub fn failing() -> Self {
        Self {
            fail_by_default: true,
            ..Self::new()
        }
    }

    /// Create a mock backend where started instances never become running on their own.
    pub fn never_completing() -> Self {
        Self {
            never_complete: true,
            ..Self::new()
        }
    }

    /// Create a mock backend whose `initialize` fails.
    pub fn failing_initialize() -> Self {
        Self {
            fail_initialize: true,
            ..Self::new()
        }
    }

    /// Create a mock backend whose `destroy` fails after recording the call.
    pub fn failing_destroy() -> Self {
        Self {
            fail_destroy: true,
            ..Self::new()
        }
    }

    /// Move a starting instance to running.
    pub async fn complete_start(&self, instance_id: &str) {
        let endpoint = self.endpoint_format.render(MOCK_PORT);
        let mut state = self.shared.state.lock().await;
        if let Some(instance) = state.instances.get_mut(instance_id)
            && instance.status == Some(InstanceStatus::Starting)
        {
            instance.status = Some(InstanceStatus::Running);
            self.shared
                .publish(instance_id, InstanceStatus::Running, Some(endpoint));
        }
    }

    /// Simulate an out-of-band crash of an instance.
    pub async fn fail_instance(&self, instance_id: &str) {
        let mut state = self.shared.state.lock().await;
        if let Some(instance) = state.instances.get_mut(instance_id)
            && instance.status.is_some_and(InstanceStatus::is_active)
        {
            instance.status = Some(InstanceStatus::Failed);
            self.shared.publish(instance_id, InstanceStatus::Failed, None);
        }
    }

    /// Number of times `start` actually launched the instance.
    pub async fn start_count(&self, instance_id: &str) -> usize {
        let state = self.shared.state.lock().await;
        state.instances.get(instance_id).map_or(0, |i| i.starts)
    }

    /// Whether `initialize` ran for the instance.
    pub async fn is_initialized(&self, instance_id: &str) -> bool {
        self.shared.state.lock().await.initialized.contains(instance_id)
    }

    /// Ids passed to `destroy`, in call order.
    pub async fn destroyed(&self) -> Vec<String> {
        self.shared.state.lock().await.destroyed.clone()
    }

    /// Whether `purge` ran.
    pub async fn purged(&self) -> bool {
        self.shared.state.lock().await.purged
    }

    fn result(&self, id: &str, status: InstanceStatus) -> StatusResult {
        if status == InstanceStatus::Running {
            StatusResult::running(id, self.endpoint_format.render(MOCK_PORT))
        } else {
            StatusResult::new(id, status)
        }
    }
}

#[async_trait]
impl InstanceBackend for MockBackend {
    fn backend_type(&self) -> &'static str {
        "mock"
    }

    fn add_listener(&self, listener: Arc<dyn StatusListener>) {
        self.shared.listeners.add(listener);
    }

    async fn initialize(&self, descriptor: InstanceDescriptor) -> Result<InstanceDescriptor> {
        if self.fail_initialize {
            return Err(BackendError::Spawn("Mock initialize failure".to_string()).into());
        }
        let mut state = self.shared.state.lock().await;
        state.initialized.insert(descriptor.id.clone());
        Ok(descriptor)
    }

    async fn start(&self, descriptor: &InstanceDescriptor) -> Result<StatusResult> {
        let id = descriptor.id.clone();
        let generation = {
            let mut state = self.shared.state.lock().await;
            let instance = state.instances.entry(id.clone()).or_default();
            if let Some(status) = instance.status
                && status.is_active()
            {
                return Ok(self.result(&id, status));
            }
            if self.fail_by_default {
                instance.status = Some(InstanceStatus::Failed);
                self.shared.publish(&id, InstanceStatus::Failed, None);
                return Err(BackendError::Spawn("Mock failure".to_string()).into());
            }
            instance.generation += 1;
            instance.starts += 1;
            instance.status = Some(InstanceStatus::Starting);
            self.shared.publish(&id, InstanceStatus::Starting, None);
            instance.generation
        };

        if self.never_complete {
            return Ok(StatusResult::new(&id, InstanceStatus::Starting));
        }

        let endpoint = self.endpoint_format.render(MOCK_PORT);
        if self.startup_delay_ms == 0 {
            let mut state = self.shared.state.lock().await;
            if let Some(instance) = state.instances.get_mut(&id)
                && instance.generation == generation
                && instance.status == Some(InstanceStatus::Starting)
            {
                instance.status = Some(InstanceStatus::Running);
                self.shared
                    .publish(&id, InstanceStatus::Running, Some(endpoint.clone()));
                return Ok(StatusResult::running(&id, endpoint));
            }
            return Ok(StatusResult::new(&id, InstanceStatus::Starting));
        }

        // Simulate asynchronous readiness
        let shared = self.shared.clone();
        let delay = self.startup_delay_ms;
        let instance_id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            let mut state = shared.state.lock().await;
            if let Some(instance) = state.instances.get_mut(&instance_id)
                && instance.generation == generation
                && instance.status == Some(InstanceStatus::Starting)
            {
                instance.status = Some(InstanceStatus::Running);
                shared.publish(&instance_id, InstanceStatus::Running, Some(endpoint));
            }
        });

        Ok(StatusResult::new(&id, InstanceStatus::Starting))
    }

    async fn stop(&self, descriptor: &InstanceDescriptor) -> Result<StatusResult> {
        let id = descriptor.id.as_str();
        let mut state = self.shared.state.lock().await;
        if let Some(instance) = state.instances.get_mut(id)
            && instance.status.is_some_and(InstanceStatus::is_active)
        {
            self.shared.publish(id, InstanceStatus::Stopping, None);
            instance.status = Some(InstanceStatus::Stopped);
            self.shared.publish(id, InstanceStatus::Stopped, None);
        }
        Ok(StatusResult::new(id, InstanceStatus::Stopped))
    }

    async fn status(&self, descriptor: &InstanceDescriptor) -> Result<InstanceStatus> {
        let state = self.shared.state.lock().await;
        Ok(state
            .instances
            .get(&descriptor.id)
            .and_then(|i| i.status)
            .unwrap_or(InstanceStatus::Stopped))
    }

    async fn service_endpoint(&self, descriptor: &InstanceDescriptor) -> Result<Option<String>> {
        let status = self.status(descriptor).await?;
        Ok(self.result(&descriptor.id, status).service_endpoint)
    }

    async fn destroy(&self, descriptor: &InstanceDescriptor) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        state.destroyed.push(descriptor.id.clone());
        if self.fail_destroy {
            return Err(BackendError::Spawn("Mock destroy failure".to_string()).into());
        }
        state.instances.remove(&descriptor.id);
        state.initialized.remove(&descriptor.id);
        Ok(())
    }

    async fn purge(&self) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        state.instances.clear();
        state.initialized.clear();
        state.purged = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelListener;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn test_descriptor() -> InstanceDescriptor {
        InstanceDescriptor {
            id: "test-instance".to_string(),
            aas_id: "urn:aas:test".to_string(),
            aas_id_short: None,
            submodels: vec![],
            arguments: json!({}),
        }
    }

    #[tokio::test]
    async fn test_mock_backend_start_stop() {
        let backend = MockBackend::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        backend.add_listener(Arc::new(ChannelListener::new(tx)));
        let desc = test_descriptor();

        let result = backend.start(&desc).await.unwrap();
        assert_eq!(result.status, InstanceStatus::Running);
        assert!(result.service_endpoint.is_some());

        let stopped = backend.stop(&desc).await.unwrap();
        assert_eq!(stopped.status, InstanceStatus::Stopped);

        let statuses: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                InstanceStatus::Starting,
                InstanceStatus::Running,
                InstanceStatus::Stopping,
                InstanceStatus::Stopped,
            ]
        );
    }

    #[tokio::test]
    async fn test_mock_backend_failing() {
        let backend = MockBackend::failing();
        let desc = test_descriptor();

        assert!(backend.start(&desc).await.is_err());
        assert_eq!(backend.status(&desc).await.unwrap(), InstanceStatus::Failed);
        assert_eq!(backend.service_endpoint(&desc).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mock_backend_delayed_start() {
        let backend = MockBackend {
            startup_delay_ms: 50,
            ..MockBackend::new()
        };
        let desc = test_descriptor();

        let result = backend.start(&desc).await.unwrap();
        assert_eq!(result.status, InstanceStatus::Starting);

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert_eq!(backend.status(&desc).await.unwrap(), InstanceStatus::Running);
    }

    #[tokio::test]
    async fn test_mock_backend_stop_during_start_wins() {
        let backend = MockBackend {
            startup_delay_ms: 50,
            ..MockBackend::new()
        };
        let desc = test_descriptor();

        backend.start(&desc).await.unwrap();
        backend.stop(&desc).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert_eq!(backend.status(&desc).await.unwrap(), InstanceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_mock_backend_never_completing() {
        let backend = MockBackend::never_completing();
        let desc = test_descriptor();

        backend.start(&desc).await.unwrap();
        // Second start is a no-op
        let again = backend.start(&desc).await.unwrap();
        assert_eq!(again.status, InstanceStatus::Starting);
        assert_eq!(backend.start_count(&desc.id).await, 1);

        backend.complete_start(&desc.id).await;
        assert_eq!(backend.status(&desc).await.unwrap(), InstanceStatus::Running);
    }
}
