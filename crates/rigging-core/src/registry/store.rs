//! Registry persistence
//!
//! The registry is a JSON object of `"<Group>#<Name>"` to address, written
//! atomically (tmp + rename) so a crash mid-write never leaves a torn file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;

use super::AddressRegistry;
use crate::error::OrchestrationError;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// No prior deployment recorded for this network
    #[error("No address registry found at {}", .0.display())]
    NotFound(PathBuf),
    #[error("Address registry at {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("Address registry I/O failed: {0:#}")]
    Io(anyhow::Error),
}

impl From<RegistryError> for OrchestrationError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(_) => OrchestrationError::Configuration(err.to_string()),
            RegistryError::Corrupt { .. } | RegistryError::Io(_) => {
                OrchestrationError::Storage(err.to_string())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the persisted registry.
    ///
    /// Fails with [`RegistryError::NotFound`] when nothing has been deployed
    /// to this network yet.
    pub fn load(&self) -> Result<AddressRegistry, RegistryError> {
        if !self.path.exists() {
            return Err(RegistryError::NotFound(self.path.clone()));
        }
        let bytes = fs::read(&self.path)
            .with_context(|| format!("Failed to read registry: {}", self.path.display()))
            .map_err(RegistryError::Io)?;
        serde_json::from_slice(&bytes).map_err(|e| RegistryError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// Load the registry, starting empty when none exists.
    pub fn load_or_empty(&self) -> Result<AddressRegistry, RegistryError> {
        match self.load() {
            Err(RegistryError::NotFound(_)) => Ok(AddressRegistry::new()),
            other => other,
        }
    }

    /// Persist the full mapping atomically.
    pub fn persist(&self, registry: &AddressRegistry) -> Result<(), RegistryError> {
        self.write_atomic(registry).map_err(RegistryError::Io)
    }

    fn write_atomic(&self, registry: &AddressRegistry) -> anyhow::Result<()> {
        // Serialize first so a failure never leaves a tmp file behind
        let bytes = serde_json::to_vec_pretty(registry).context("Failed to serialize registry")?;
        crate::fs::write_atomic(&self.path, &bytes)
            .with_context(|| format!("Failed to persist registry: {}", self.path.display()))
    }
}
