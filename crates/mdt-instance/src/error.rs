// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for mdt-instance.

use mdt_registry::RegistryError;
use thiserror::Error;

/// Instance manager errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Unknown instance, descriptor or registry entry.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate instance id, AAS id or submodel id.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Operation conflicts with the current state (or the environment is malformed).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The execution backend failed.
    #[error("Backend failure: {0}")]
    Backend(#[from] crate::backend::BackendError),

    /// A readiness or shutdown sentinel was not observed in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Registry operation failed for a reason other than identity.
    #[error("Registry error: {0}")]
    Registry(#[source] RegistryError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound { kind, id } => Error::NotFound(format!("{kind} {id}")),
            RegistryError::AlreadyExists { kind, id } => {
                Error::AlreadyExists(format!("{kind} {id}"))
            }
            other => Error::Registry(other),
        }
    }
}

/// Result type using the instance manager [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
