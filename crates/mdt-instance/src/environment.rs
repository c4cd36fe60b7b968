// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! AAS environment loading and validation.
//!
//! Only the parts of the AAS JSON serialization the manager needs are modelled:
//! shell/submodel identity and the shell's submodel references. Everything else
//! in the document is ignored.

use std::collections::HashSet;
use std::path::Path;

use mdt_registry::{ShellDescriptor, SubmodelDescriptor};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::InstanceSubmodel;

/// One key of a model reference.
#[derive(Debug, Clone, Deserialize)]
pub struct Key {
    /// Key type, e.g. `Submodel`.
    #[serde(rename = "type", default)]
    pub key_type: String,
    /// Referenced identifier.
    pub value: String,
}

/// A model reference.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Reference {
    /// Reference keys; the first one names the referenced element.
    #[serde(default)]
    pub keys: Vec<Key>,
}

impl Reference {
    fn first_value(&self) -> Option<&str> {
        self.keys.first().map(|k| k.value.as_str())
    }
}

/// Asset information of a shell.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetInformation {
    /// Global asset id.
    #[serde(default)]
    pub global_asset_id: Option<String>,
}

/// An Asset Administration Shell.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAdministrationShell {
    /// Shell id.
    pub id: String,
    /// Shell short id.
    #[serde(default)]
    pub id_short: Option<String>,
    /// Asset information.
    #[serde(default)]
    pub asset_information: AssetInformation,
    /// References to the shell's submodels.
    #[serde(default)]
    pub submodels: Vec<Reference>,
}

/// A submodel.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submodel {
    /// Submodel id.
    pub id: String,
    /// Submodel short id.
    #[serde(default)]
    pub id_short: Option<String>,
    /// Semantic id.
    #[serde(default)]
    pub semantic_id: Option<Reference>,
}

/// An AAS environment: shells plus submodels.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AasEnvironment {
    /// Shells in the environment.
    #[serde(default)]
    pub asset_administration_shells: Vec<AssetAdministrationShell>,
    /// Submodels in the environment.
    #[serde(default)]
    pub submodels: Vec<Submodel>,
}

impl AasEnvironment {
    /// Parse an environment from its JSON serialization.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse an environment file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("environment file {}", path.display()))
            } else {
                Error::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Check that the environment can back exactly one instance.
    ///
    /// Requires a single shell, unique submodel ids, and every submodel the
    /// shell references to be present. Returns the shell.
    pub fn validate(&self) -> Result<&AssetAdministrationShell> {
        let shell = match self.asset_administration_shells.as_slice() {
            [shell] => shell,
            shells => {
                return Err(Error::InvalidState(format!(
                    "environment must contain exactly one shell, found {}",
                    shells.len()
                )));
            }
        };

        let mut ids = HashSet::new();
        for sm in &self.submodels {
            if !ids.insert(sm.id.as_str()) {
                return Err(Error::InvalidState(format!(
                    "duplicate submodel id in environment: {}",
                    sm.id
                )));
            }
        }

        for reference in &shell.submodels {
            match reference.first_value() {
                Some(id) if ids.contains(id) => {}
                Some(id) => {
                    return Err(Error::InvalidState(format!(
                        "shell {} references missing submodel {id}",
                        shell.id
                    )));
                }
                None => {
                    return Err(Error::InvalidState(format!(
                        "shell {} has an empty submodel reference",
                        shell.id
                    )));
                }
            }
        }

        Ok(shell)
    }

    /// Registry descriptor for the shell, without endpoints.
    pub fn shell_descriptor(shell: &AssetAdministrationShell) -> ShellDescriptor {
        let mut desc = ShellDescriptor::new(shell.id.clone(), shell.id_short.clone());
        desc.global_asset_id = shell.asset_information.global_asset_id.clone();
        desc.submodel_ids = shell
            .submodels
            .iter()
            .filter_map(|r| r.first_value().map(str::to_string))
            .collect();
        desc
    }

    /// Registry descriptors for every submodel, without endpoints.
    pub fn submodel_descriptors(&self) -> Vec<SubmodelDescriptor> {
        self.submodels
            .iter()
            .map(|sm| {
                let mut desc = SubmodelDescriptor::new(sm.id.clone(), sm.id_short.clone());
                desc.semantic_id = sm
                    .semantic_id
                    .as_ref()
                    .and_then(|r| r.first_value().map(str::to_string));
                desc
            })
            .collect()
    }

    /// Submodel entries recorded in the instance descriptor.
    pub fn instance_submodels(&self) -> Vec<InstanceSubmodel> {
        self.submodels
            .iter()
            .map(|sm| InstanceSubmodel {
                submodel_id: sm.id.clone(),
                submodel_id_short: sm.id_short.clone(),
            })
            .collect()
    }
}
