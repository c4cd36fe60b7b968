// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Status-change notification.
//!
//! Backends and the orchestrator report every status transition to a set of
//! [`StatusListener`]s. Listeners are called synchronously, in transition
//! order, and must not block or call back into the component that notified
//! them. A panicking listener is logged and skipped; it never affects the
//! notifier or the remaining listeners.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use tracing::{trace, warn};

use crate::model::{InstanceStatus, StatusResult};

/// Event type name used in the external JSON envelope.
pub const STATUS_CHANGE_EVENT_TYPE: &str = "InstanceStatusChangeEvent";

/// A status transition of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatusChangeEvent {
    /// Instance id.
    pub id: String,
    /// New status.
    pub status: InstanceStatus,
    /// Endpoint, present only for `Running`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_endpoint: Option<String>,
}

impl InstanceStatusChangeEvent {
    /// Event for a status without an endpoint.
    pub fn new(id: impl Into<String>, status: InstanceStatus) -> Self {
        Self {
            id: id.into(),
            status,
            service_endpoint: None,
        }
    }

    /// `Running` event.
    pub fn running(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: InstanceStatus::Running,
            service_endpoint: Some(endpoint.into()),
        }
    }

    /// `{"type": ..., "event": {...}}` envelope for external publishing.
    pub fn to_json_event(&self) -> Value {
        json!({
            "type": STATUS_CHANGE_EVENT_TYPE,
            "event": self,
        })
    }
}

impl From<&StatusResult> for InstanceStatusChangeEvent {
    fn from(result: &StatusResult) -> Self {
        Self {
            id: result.instance_id.clone(),
            status: result.status,
            service_endpoint: result.service_endpoint.clone(),
        }
    }
}

/// Receiver of status transitions.
pub trait StatusListener: Send + Sync {
    /// Called once per transition.
    fn on_status_change(&self, event: &InstanceStatusChangeEvent);
}

/// Fan-out over any number of listeners.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn StatusListener>>>,
}

impl ListenerSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn add(&self, listener: Arc<dyn StatusListener>) {
        self.listeners.write().push(listener);
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Deliver an event to every listener.
    pub fn notify(&self, event: &InstanceStatusChangeEvent) {
        trace!(instance_id = %event.id, status = %event.status, "Notifying listeners");
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            let delivered = catch_unwind(AssertUnwindSafe(|| listener.on_status_change(event)));
            if delivered.is_err() {
                warn!(
                    instance_id = %event.id,
                    status = %event.status,
                    "Status listener panicked"
                );
            }
        }
    }
}

impl StatusListener for ListenerSet {
    fn on_status_change(&self, event: &InstanceStatusChangeEvent) {
        self.notify(event);
    }
}

/// Forwards events into an unbounded channel.
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<InstanceStatusChangeEvent>,
}

impl ChannelListener {
    /// Wrap a channel sender.
    pub fn new(tx: mpsc::UnboundedSender<InstanceStatusChangeEvent>) -> Self {
        Self { tx }
    }
}

impl StatusListener for ChannelListener {
    fn on_status_change(&self, event: &InstanceStatusChangeEvent) {
        if self.tx.send(event.clone()).is_err() {
            trace!(instance_id = %event.id, "Event channel closed, dropping event");
        }
    }
}

/// Publishes events to a broadcast channel for external subscribers.
pub struct BroadcastListener {
    tx: broadcast::Sender<InstanceStatusChangeEvent>,
}

impl BroadcastListener {
    /// Wrap a broadcast sender.
    pub fn new(tx: broadcast::Sender<InstanceStatusChangeEvent>) -> Self {
        Self { tx }
    }
}

impl StatusListener for BroadcastListener {
    fn on_status_change(&self, event: &InstanceStatusChangeEvent) {
        // no subscribers is not an error
        let _ = self.tx.send(event.clone());
    }
}
