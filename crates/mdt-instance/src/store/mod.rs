// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable instance descriptor storage.
//!
//! | Store | Description |
//! |-------|-------------|
//! | [`FileDescriptorStore`] | `descriptor.json` inside each instance directory |
//! | [`SqliteDescriptorStore`] | SQLite tables via sqlx |

mod file;
mod sqlite;

pub use file::FileDescriptorStore;
pub use sqlite::SqliteDescriptorStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::InstanceDescriptor;

/// Persistence of [`InstanceDescriptor`]s.
///
/// `add` fails with `AlreadyExists` on a duplicate id or AAS id; lookups,
/// `update` and `remove` fail with `NotFound` for unknown ids.
#[async_trait]
pub trait DescriptorStore: Send + Sync {
    /// Store type identifier (e.g., "file", "sqlite").
    fn store_type(&self) -> &'static str;

    /// Persist a new descriptor.
    async fn add(&self, descriptor: &InstanceDescriptor) -> Result<()>;

    /// Replace an existing descriptor.
    async fn update(&self, descriptor: &InstanceDescriptor) -> Result<()>;

    /// Delete a descriptor.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Look up by instance id.
    async fn get(&self, id: &str) -> Result<InstanceDescriptor>;

    /// Look up by shell id.
    async fn get_by_aas_id(&self, aas_id: &str) -> Result<InstanceDescriptor>;

    /// Look up the instance carrying a submodel.
    async fn get_by_submodel_id(&self, submodel_id: &str) -> Result<InstanceDescriptor>;

    /// All descriptors, ordered by id.
    async fn get_all(&self) -> Result<Vec<InstanceDescriptor>>;

    /// All descriptors whose shell short id equals `aas_id_short`.
    async fn get_all_by_id_short(&self, aas_id_short: &str) -> Result<Vec<InstanceDescriptor>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|d| d.aas_id_short.as_deref() == Some(aas_id_short))
            .collect())
    }
}
