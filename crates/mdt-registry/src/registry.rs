// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Registry trait definitions.

use async_trait::async_trait;

use crate::descriptor::{Descriptor, ShellDescriptor, SubmodelDescriptor};
use crate::error::Result;

/// A directory of descriptors keyed by identifier.
///
/// Implementations must reject duplicate identifiers on `add` with
/// [`RegistryError::AlreadyExists`](crate::RegistryError::AlreadyExists) and
/// unknown identifiers on `get_by_id`/`update`/`remove` with
/// [`RegistryError::NotFound`](crate::RegistryError::NotFound).
#[async_trait]
pub trait Registry<D: Descriptor>: Send + Sync {
    /// Registry type identifier (e.g., "memory", "file").
    fn registry_type(&self) -> &'static str;

    /// Look up a descriptor by identifier.
    async fn get_by_id(&self, id: &str) -> Result<D>;

    /// All registered descriptors.
    async fn get_all(&self) -> Result<Vec<D>>;

    /// All descriptors whose short id equals `id_short`.
    async fn get_all_by_id_short(&self, id_short: &str) -> Result<Vec<D>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|d| d.id_short() == Some(id_short))
            .collect())
    }

    /// Register a new descriptor.
    async fn add(&self, descriptor: D) -> Result<D>;

    /// Replace an existing descriptor.
    async fn update(&self, descriptor: D) -> Result<D>;

    /// Remove a descriptor.
    async fn remove(&self, id: &str) -> Result<()>;
}

/// Registry of shell descriptors.
pub type ShellRegistry = dyn Registry<ShellDescriptor>;

/// Registry of submodel descriptors.
pub type SubmodelRegistry = dyn Registry<SubmodelDescriptor>;
