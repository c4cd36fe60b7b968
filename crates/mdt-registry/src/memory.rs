// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory registry.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::descriptor::Descriptor;
use crate::error::{RegistryError, Result};
use crate::registry::Registry;

/// Registry backed by a process-local ordered map.
pub struct InMemoryRegistry<D> {
    entries: RwLock<BTreeMap<String, D>>,
}

impl<D> Default for InMemoryRegistry<D> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<D: Descriptor> InMemoryRegistry<D> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl<D: Descriptor> Registry<D> for InMemoryRegistry<D> {
    fn registry_type(&self) -> &'static str {
        "memory"
    }

    async fn get_by_id(&self, id: &str) -> Result<D> {
        self.entries
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                kind: D::KIND,
                id: id.to_string(),
            })
    }

    async fn get_all(&self) -> Result<Vec<D>> {
        Ok(self.entries.read().values().cloned().collect())
    }

    async fn add(&self, descriptor: D) -> Result<D> {
        let mut entries = self.entries.write();
        if entries.contains_key(descriptor.id()) {
            return Err(RegistryError::AlreadyExists {
                kind: D::KIND,
                id: descriptor.id().to_string(),
            });
        }
        entries.insert(descriptor.id().to_string(), descriptor.clone());
        Ok(descriptor)
    }

    async fn update(&self, descriptor: D) -> Result<D> {
        let mut entries = self.entries.write();
        match entries.get_mut(descriptor.id()) {
            Some(slot) => {
                *slot = descriptor.clone();
                Ok(descriptor)
            }
            None => Err(RegistryError::NotFound {
                kind: D::KIND,
                id: descriptor.id().to_string(),
            }),
        }
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.entries
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound {
                kind: D::KIND,
                id: id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SubmodelDescriptor;

    #[tokio::test]
    async fn test_add_get_remove() {
        let registry = InMemoryRegistry::<SubmodelDescriptor>::new();
        registry
            .add(SubmodelDescriptor::new("urn:sm:1", Some("Data".into())))
            .await
            .unwrap();

        let found = registry.get_by_id("urn:sm:1").await.unwrap();
        assert_eq!(found.id_short.as_deref(), Some("Data"));

        registry.remove("urn:sm:1").await.unwrap();
        assert!(registry.is_empty());
        assert!(registry.get_by_id("urn:sm:1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_add_rejected() {
        let registry = InMemoryRegistry::<SubmodelDescriptor>::new();
        registry
            .add(SubmodelDescriptor::new("urn:sm:1", None))
            .await
            .unwrap();
        let err = registry
            .add(SubmodelDescriptor::new("urn:sm:1", None))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let registry = InMemoryRegistry::<SubmodelDescriptor>::new();
        let err = registry
            .update(SubmodelDescriptor::new("urn:sm:missing", None))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_all_by_id_short() {
        let registry = InMemoryRegistry::<SubmodelDescriptor>::new();
        for (id, short) in [("a", "Data"), ("b", "Data"), ("c", "Info")] {
            registry
                .add(SubmodelDescriptor::new(id, Some(short.into())))
                .await
                .unwrap();
        }
        let data = registry.get_all_by_id_short("Data").await.unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(registry.get_all().await.unwrap().len(), 3);
    }
}
