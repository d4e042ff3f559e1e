//! Address + interface export for consuming applications.
//!
//! Read-only with respect to the network: everything comes from the persisted
//! registry and the build artifacts.

use std::path::Path;

use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::artifact::ArtifactStore;
use crate::error::OrchestrationError;
use crate::plan::SystemPlan;
use crate::registry::AddressRegistry;
use crate::types::{Address, ModuleKey};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedComponent {
    pub module_key: ModuleKey,
    pub address: Address,
    pub abi: Value,
    pub abi_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressExport {
    pub network: String,
    pub chain_id: u64,
    /// Keyed by component name, or by module key when two groups share a name
    pub components: IndexMap<String, ExportedComponent>,
}

/// Content hash of an ABI, stable across key order.
pub fn abi_hash(abi: &Value) -> String {
    // serde_json objects are sorted maps, so serialization is canonical
    let bytes = serde_json::to_vec(abi).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

impl AddressExport {
    /// Build the export for every recorded component, in registry order.
    pub fn build(
        network: &str,
        chain_id: u64,
        registry: &AddressRegistry,
        plan: Option<&SystemPlan>,
        artifacts: &ArtifactStore,
    ) -> Result<Self, OrchestrationError> {
        let mut components = IndexMap::new();
        for (key, address) in registry.iter() {
            let artifact_name = plan
                .and_then(|p| p.component(key))
                .map(|c| c.artifact.as_str())
                .unwrap_or_else(|| key.name());
            let artifact = artifacts.load(artifact_name)?;
            let entry = ExportedComponent {
                module_key: key.clone(),
                address: address.clone(),
                abi_hash: abi_hash(&artifact.abi),
                abi: artifact.abi,
            };

            let name = if components.contains_key(key.name()) {
                key.as_str().to_string()
            } else {
                key.name().to_string()
            };
            components.insert(name, entry);
        }

        Ok(Self {
            network: network.to_string(),
            chain_id,
            components,
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), OrchestrationError> {
        let mut bytes = serde_json::to_vec_pretty(self)
            .context("Failed to serialize export")
            .map_err(OrchestrationError::storage)?;
        bytes.push(b'\n');
        crate::fs::write_atomic(path, &bytes)
            .with_context(|| format!("Failed to write export: {}", path.display()))
            .map_err(OrchestrationError::storage)
    }
}
