// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for mdt-registry.

use thiserror::Error;

/// Registry errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// No descriptor is registered under the identifier.
    #[error("{kind} descriptor not found: {id}")]
    NotFound {
        /// Descriptor kind ("shell" or "submodel").
        kind: &'static str,
        /// Requested identifier.
        id: String,
    },

    /// A descriptor with the same identifier is already registered.
    #[error("{kind} descriptor already exists: {id}")]
    AlreadyExists {
        /// Descriptor kind ("shell" or "submodel").
        kind: &'static str,
        /// Conflicting identifier.
        id: String,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    /// Returns true if this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound { .. })
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
