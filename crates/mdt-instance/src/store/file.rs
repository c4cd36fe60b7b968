// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Descriptor store keeping `descriptor.json` in each instance directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::DescriptorStore;
use crate::error::{Error, Result};
use crate::model::InstanceDescriptor;

/// Name of the descriptor document inside an instance directory.
pub const DESCRIPTOR_FILE: &str = "descriptor.json";

/// File-based descriptor store rooted at the instance workspace.
///
/// Directories without a readable descriptor are ignored by lookups and
/// listings; the orchestrator's cleanup sweep deletes them.
pub struct FileDescriptorStore {
    workspace: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileDescriptorStore {
    /// Create a store over `workspace`, creating the directory if needed.
    pub async fn open(workspace: impl Into<PathBuf>) -> Result<Self> {
        let workspace = workspace.into();
        tokio::fs::create_dir_all(&workspace).await?;
        Ok(Self {
            workspace,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Root directory of the store.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    fn descriptor_path(&self, id: &str) -> PathBuf {
        self.workspace.join(id).join(DESCRIPTOR_FILE)
    }

    async fn read(&self, id: &str) -> Result<Option<InstanceDescriptor>> {
        match tokio::fs::read(self.descriptor_path(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, descriptor: &InstanceDescriptor) -> Result<()> {
        let path = self.descriptor_path(&descriptor.id);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(descriptor)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn find(
        &self,
        pred: impl Fn(&InstanceDescriptor) -> bool + Send,
    ) -> Result<Option<InstanceDescriptor>> {
        Ok(self.get_all().await?.into_iter().find(|d| pred(d)))
    }
}

#[async_trait]
impl DescriptorStore for FileDescriptorStore {
    fn store_type(&self) -> &'static str {
        "file"
    }

    async fn add(&self, descriptor: &InstanceDescriptor) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.read(&descriptor.id).await?.is_some() {
            return Err(Error::AlreadyExists(format!("instance {}", descriptor.id)));
        }
        if let Some(other) = self.find(|d| d.aas_id == descriptor.aas_id).await? {
            return Err(Error::AlreadyExists(format!(
                "aas {} (instance {})",
                descriptor.aas_id, other.id
            )));
        }
        self.write(descriptor).await?;
        debug!(instance_id = %descriptor.id, "Descriptor stored");
        Ok(())
    }

    async fn update(&self, descriptor: &InstanceDescriptor) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.read(&descriptor.id).await?.is_none() {
            return Err(Error::NotFound(format!("instance {}", descriptor.id)));
        }
        self.write(descriptor).await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.descriptor_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::NotFound(format!("instance {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: &str) -> Result<InstanceDescriptor> {
        self.read(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("instance {id}")))
    }

    async fn get_by_aas_id(&self, aas_id: &str) -> Result<InstanceDescriptor> {
        self.find(|d| d.aas_id == aas_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("instance for aas {aas_id}")))
    }

    async fn get_by_submodel_id(&self, submodel_id: &str) -> Result<InstanceDescriptor> {
        self.find(|d| d.submodel_ids().any(|id| id == submodel_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("instance for submodel {submodel_id}")))
    }

    async fn get_all(&self) -> Result<Vec<InstanceDescriptor>> {
        let mut found = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.workspace).await?;
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match self.read(&id).await {
                Ok(Some(descriptor)) => found.push(descriptor),
                Ok(None) => {}
                Err(e) => warn!(instance_id = %id, error = %e, "Skipping unreadable descriptor"),
            }
        }
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }
}
