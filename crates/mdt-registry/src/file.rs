// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! File-backed registry.
//!
//! Each descriptor is stored as `{root}/{encode_id(id)}.json`. Parsed
//! descriptors are kept in an [`LruCache`] keyed by identifier so repeated
//! lookups do not touch the disk. Writes go through the file first and then
//! refresh the cache.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::LruCache;
use crate::descriptor::{Descriptor, encode_id};
use crate::error::{RegistryError, Result};
use crate::registry::Registry;

/// Default number of descriptors kept parsed in memory.
pub const DEFAULT_CACHE_SIZE: usize = 64;

/// Registry persisting one JSON document per descriptor.
pub struct FileRegistry<D> {
    root: PathBuf,
    cache: Mutex<LruCache<String, D>>,
    // serializes add/update/remove so existence checks and writes are atomic
    write_lock: tokio::sync::Mutex<()>,
}

impl<D: Descriptor> FileRegistry<D> {
    /// Open (and create if missing) a registry rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>, cache_size: usize) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), kind = D::KIND, cache_size, "Opened file registry");
        Ok(Self {
            root,
            cache: Mutex::new(LruCache::new(cache_size)),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Directory holding the descriptor documents.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.json", encode_id(id)))
    }

    async fn read_file(&self, path: &Path) -> Result<Option<D>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, descriptor: &D) -> Result<()> {
        let path = self.path_of(descriptor.id());
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(descriptor)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    fn not_found(id: &str) -> RegistryError {
        RegistryError::NotFound {
            kind: D::KIND,
            id: id.to_string(),
        }
    }
}

#[async_trait]
impl<D: Descriptor> Registry<D> for FileRegistry<D> {
    fn registry_type(&self) -> &'static str {
        "file"
    }

    async fn get_by_id(&self, id: &str) -> Result<D> {
        let cached = self.cache.lock().get(id);
        if let Some(hit) = cached {
            return Ok(hit);
        }
        let descriptor = self
            .read_file(&self.path_of(id))
            .await?
            .ok_or_else(|| Self::not_found(id))?;
        self.cache.lock().put(id.to_string(), descriptor.clone());
        Ok(descriptor)
    }

    async fn get_all(&self) -> Result<Vec<D>> {
        let mut found = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_file(&path).await {
                Ok(Some(descriptor)) => {
                    self.cache
                        .lock()
                        .put(descriptor.id().to_string(), descriptor.clone());
                    found.push(descriptor);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable descriptor");
                }
            }
        }
        found.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(found)
    }

    async fn add(&self, descriptor: D) -> Result<D> {
        let _guard = self.write_lock.lock().await;
        if tokio::fs::try_exists(self.path_of(descriptor.id())).await? {
            return Err(RegistryError::AlreadyExists {
                kind: D::KIND,
                id: descriptor.id().to_string(),
            });
        }
        self.write_file(&descriptor).await?;
        self.cache
            .lock()
            .put(descriptor.id().to_string(), descriptor.clone());
        debug!(id = descriptor.id(), kind = D::KIND, "Descriptor added");
        Ok(descriptor)
    }

    async fn update(&self, descriptor: D) -> Result<D> {
        let _guard = self.write_lock.lock().await;
        if !tokio::fs::try_exists(self.path_of(descriptor.id())).await? {
            return Err(Self::not_found(descriptor.id()));
        }
        self.write_file(&descriptor).await?;
        self.cache
            .lock()
            .put(descriptor.id().to_string(), descriptor.clone());
        Ok(descriptor)
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.cache.lock().invalidate(id);
        match tokio::fs::remove_file(self.path_of(id)).await {
            Ok(()) => {
                debug!(id, kind = D::KIND, "Descriptor removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Self::not_found(id)),
            Err(e) => Err(e.into()),
        }
    }
}
