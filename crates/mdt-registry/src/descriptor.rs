// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shell and submodel descriptors.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Interface name advertised for shell endpoints.
pub const SHELL_INTERFACE: &str = "AAS-3.0";

/// Interface name advertised for submodel endpoints.
pub const SUBMODEL_INTERFACE: &str = "SUBMODEL-3.0";

/// Encode an identifier the way it appears in endpoint paths and file names.
///
/// AAS identifiers are usually URNs or URLs, so they are base64url encoded
/// without padding.
pub fn encode_id(id: &str) -> String {
    URL_SAFE_NO_PAD.encode(id.as_bytes())
}

/// A service endpoint of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Interface name, e.g. `AAS-3.0`.
    pub interface: String,
    /// Absolute URL of the service.
    pub href: String,
}

/// Common view over registry descriptors.
pub trait Descriptor: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Human-readable kind, used in error messages.
    const KIND: &'static str;

    /// Unique identifier.
    fn id(&self) -> &str;

    /// Short identifier (not unique).
    fn id_short(&self) -> Option<&str>;

    /// Current endpoints.
    fn endpoints(&self) -> &[Endpoint];

    /// Replace the endpoint list. `None` or an empty href clears it.
    fn set_endpoint(&mut self, href: Option<String>);

    /// The advertised service URL, if any.
    fn endpoint(&self) -> Option<&str> {
        self.endpoints()
            .first()
            .map(|ep| ep.href.as_str())
            .filter(|href| !href.is_empty())
    }
}

/// Descriptor of an Asset Administration Shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellDescriptor {
    /// Shell identifier.
    pub id: String,
    /// Shell short identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_short: Option<String>,
    /// Global asset id of the asset the shell represents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_asset_id: Option<String>,
    /// Identifiers of the submodels the shell references.
    #[serde(default)]
    pub submodel_ids: Vec<String>,
    /// Service endpoints.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl ShellDescriptor {
    /// Create a descriptor without endpoints.
    pub fn new(id: impl Into<String>, id_short: Option<String>) -> Self {
        Self {
            id: id.into(),
            id_short,
            global_asset_id: None,
            submodel_ids: Vec::new(),
            endpoints: Vec::new(),
        }
    }
}

impl Descriptor for ShellDescriptor {
    const KIND: &'static str = "shell";

    fn id(&self) -> &str {
        &self.id
    }

    fn id_short(&self) -> Option<&str> {
        self.id_short.as_deref()
    }

    fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    fn set_endpoint(&mut self, href: Option<String>) {
        self.endpoints = endpoint_list(SHELL_INTERFACE, href);
    }
}

/// Descriptor of a submodel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmodelDescriptor {
    /// Submodel identifier.
    pub id: String,
    /// Submodel short identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_short: Option<String>,
    /// Semantic id of the submodel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_id: Option<String>,
    /// Service endpoints.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl SubmodelDescriptor {
    /// Create a descriptor without endpoints.
    pub fn new(id: impl Into<String>, id_short: Option<String>) -> Self {
        Self {
            id: id.into(),
            id_short,
            semantic_id: None,
            endpoints: Vec::new(),
        }
    }
}

impl Descriptor for SubmodelDescriptor {
    const KIND: &'static str = "submodel";

    fn id(&self) -> &str {
        &self.id
    }

    fn id_short(&self) -> Option<&str> {
        self.id_short.as_deref()
    }

    fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    fn set_endpoint(&mut self, href: Option<String>) {
        self.endpoints = endpoint_list(SUBMODEL_INTERFACE, href);
    }
}

fn endpoint_list(interface: &str, href: Option<String>) -> Vec<Endpoint> {
    match href {
        Some(href) if !href.is_empty() => vec![Endpoint {
            interface: interface.to_string(),
            href,
        }],
        _ => Vec::new(),
    }
}
