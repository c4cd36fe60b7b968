// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! MDT Instance - Digital Twin Instance Lifecycle Management
//!
//! This crate manages the lifecycle of digital twin instances: services
//! derived from an Asset Administration Shell (AAS) environment. Each instance
//! runs on one of three interchangeable backends and is kept discoverable
//! through the shell and submodel registries.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         InstanceManager                             │
//! │        add / get / list / remove / remove_all  (RwLock guarded)     │
//! └──────┬──────────────────┬───────────────────────┬───────────────────┘
//!        │                  │                       │
//!        ▼                  ▼                       ▼
//! ┌─────────────┐   ┌───────────────┐      ┌──────────────────────────┐
//! │ Descriptor  │   │  Shell / SM   │      │    InstanceBackend       │
//! │   Store     │   │  Registries   │      │ process | docker | k8s   │
//! └─────────────┘   └───────▲───────┘      └────────────┬─────────────┘
//!                           │                           │ status events
//!                           │                           ▼
//!                   ┌───────┴──────────┐       ┌──────────────────┐
//!                   │    Endpoint      │◄──────│   ListenerSet    │──► broadcast
//!                   │  Synchronizer    │       └──────────────────┘
//!                   └──────────────────┘
//! ```
//!
//! # Backends
//!
//! | Backend | Readiness signal |
//! |---------|------------------|
//! | Process | sentinel line in the service's stdout log |
//! | Docker | container inspect |
//! | Kubernetes | pod phase |
//!
//! # Instance Status State Machine
//!
//! ```text
//!   (absent) ──start──► STARTING ──sentinel──► RUNNING
//!                          │                     │
//!                   error/timeout          stop  │  unexpected exit
//!                          ▼                     ▼        │
//!                        FAILED              STOPPING     ▼
//!                                                │      FAILED
//!                                           exit ▼
//!                                             STOPPED
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MDT_BACKEND` | `process` | `process`, `docker` or `kubernetes` |
//! | `MDT_WORKSPACE_DIR` | `.mdt/instances` | Instance workspace root |
//! | `MDT_REGISTRY_DIR` | `.mdt/registry` | Root of the file registries |
//! | `MDT_REGISTRY_CACHE_SIZE` | `64` | Descriptor cache capacity per registry |
//! | `MDT_DESCRIPTOR_DB` | - | SQLite URL; unset keeps descriptors in the workspace |
//! | `MDT_ENDPOINT_FORMAT` | `https://localhost:%d/api/v3.0` | Service endpoint template |
//! | `MDT_LAUNCHER` | `java -jar` | Launcher for the process backend |
//! | `MDT_SAMPLE_INTERVAL_MS` | `500` | Log sampling interval |
//! | `MDT_START_TIMEOUT_SECS` | `60` | Readiness timeout |
//! | `MDT_STOP_SENTINEL` | - | Wait for this line on stop, killing on timeout |
//! | `MDT_STOP_TIMEOUT_SECS` | `30` | Stop sentinel timeout |
//! | `MDT_DOCKER_HOST` | - | Docker daemon address |
//! | `MDT_DOCKER_MOUNT_PREFIX` | - | Host-side path of the workspace for bind mounts |
//! | `MDT_K8S_NAMESPACE` | `mdt-instance` | Namespace for deployments and services |
//! | `MDT_K8S_ENDPOINT_FORMAT` | `https://%s:%d/api/v3.0` | Node address + node port template |
//!
//! # Modules
//!
//! - [`backend`]: The lifecycle contract and its process, Docker and Kubernetes variants
//! - [`config`]: Configuration from environment variables
//! - [`environment`]: AAS environment parsing and validation
//! - [`error`]: Error types
//! - [`events`]: Status-change events and listeners
//! - [`manager`]: The instance lifecycle orchestrator
//! - [`model`]: Descriptors, statuses and backend arguments
//! - [`runtime`]: Embeddable runtime
//! - [`store`]: Instance descriptor persistence
//! - [`sync`]: Registry endpoint synchronization

#![deny(missing_docs)]

/// Execution backends.
pub mod backend;

/// Configuration loaded from environment variables.
pub mod config;

/// AAS environment loading and validation.
pub mod environment;

/// Error types for instance management.
pub mod error;

/// Status-change events and listeners.
pub mod events;

/// Instance lifecycle orchestration.
pub mod manager;

/// Instance descriptors, statuses and backend arguments.
pub mod model;

/// Embeddable runtime for mdt-instance.
pub mod runtime;

/// Instance descriptor persistence (file and SQLite).
pub mod store;

/// Registry endpoint synchronization.
pub mod sync;

pub use config::Config;
pub use error::{Error, Result};
pub use manager::{Instance, InstanceManager};
pub use model::{InstanceDescriptor, InstanceStatus, StatusResult};
