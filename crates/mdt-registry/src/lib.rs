// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! MDT Registry - shell and submodel descriptor directories
//!
//! Registries map an Asset Administration Shell (or submodel) identifier to a
//! descriptor carrying the service endpoints of the instance currently serving
//! it. The instance manager keeps these endpoints in step with the runtime
//! status of each instance.
//!
//! Two implementations are provided:
//!
//! | Registry | Description |
//! |----------|-------------|
//! | [`InMemoryRegistry`] | Process-local map, used in tests and embedded setups |
//! | [`FileRegistry`] | One JSON document per descriptor, reads served through an LRU cache |
//!
//! An empty endpoint list means "no live service".

#![deny(missing_docs)]

pub mod cache;
pub mod descriptor;
pub mod error;
pub mod file;
pub mod memory;
pub mod registry;

pub use descriptor::{Descriptor, Endpoint, ShellDescriptor, SubmodelDescriptor, encode_id};
pub use error::{RegistryError, Result};
pub use file::FileRegistry;
pub use memory::InMemoryRegistry;
pub use registry::{Registry, ShellRegistry, SubmodelRegistry};
