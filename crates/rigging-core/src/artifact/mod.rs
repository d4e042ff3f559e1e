//! Build artifacts for deployable components.
//!
//! Artifacts live at `<dir>/<name>.json` as `{ "bytecode": "0x..", "abi": [...] }`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OrchestrationError;
use crate::types::ComponentDescriptor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(skip)]
    pub name: String,
    pub bytecode: String,
    #[serde(default = "empty_abi")]
    pub abi: Value,
}

fn empty_abi() -> Value {
    Value::Array(Vec::new())
}

impl Artifact {
    fn validate(&self) -> anyhow::Result<()> {
        let hex = self
            .bytecode
            .strip_prefix("0x")
            .ok_or_else(|| anyhow::anyhow!("bytecode must start with 0x"))?;
        if hex.is_empty() {
            anyhow::bail!("bytecode is empty");
        }
        if hex.len() % 2 != 0 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            anyhow::bail!("bytecode is not valid hex");
        }
        if !self.abi.is_array() {
            anyhow::bail!("abi must be a JSON array");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    pub fn load(&self, name: &str) -> Result<Artifact, OrchestrationError> {
        self.read(name)
            .map_err(|e| OrchestrationError::Configuration(format!("{e:#}")))
    }

    fn read(&self, name: &str) -> anyhow::Result<Artifact> {
        let path = self.path_for(name);
        if !path.exists() {
            anyhow::bail!("Missing artifact for '{}': {}", name, path.display());
        }
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read artifact: {}", path.display()))?;
        let mut artifact: Artifact = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse artifact: {}", path.display()))?;
        artifact.name = name.to_string();
        artifact
            .validate()
            .with_context(|| format!("Invalid artifact: {}", path.display()))?;
        Ok(artifact)
    }

    /// Load the artifact of every component, keyed by artifact name.
    pub fn load_for(
        &self,
        components: &[ComponentDescriptor],
    ) -> Result<HashMap<String, Artifact>, OrchestrationError> {
        let mut artifacts = HashMap::new();
        for component in components {
            if artifacts.contains_key(&component.artifact) {
                continue;
            }
            let artifact = self.load(&component.artifact)?;
            artifacts.insert(component.artifact.clone(), artifact);
        }
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_artifact_is_configuration_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path().to_path_buf());
        let err = store.load("Identity").unwrap_err();
        assert!(matches!(err, OrchestrationError::Configuration(_)));
        assert!(err.to_string().contains("Identity"));
    }

    #[test]
    fn loads_bytecode_and_abi() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("Identity.json"),
            r#"{ "bytecode": "0x6080", "abi": [{ "name": "setTasksAddress" }] }"#,
        )
        .unwrap();
        let artifact = ArtifactStore::new(temp.path().to_path_buf())
            .load("Identity")
            .unwrap();
        assert_eq!(artifact.name, "Identity");
        assert_eq!(artifact.bytecode, "0x6080");
        assert_eq!(artifact.abi.as_array().unwrap().len(), 1);
    }

    #[test]
    fn rejects_malformed_bytecode() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("Bad.json"), r#"{ "bytecode": "6080" }"#).unwrap();
        let err = ArtifactStore::new(temp.path().to_path_buf())
            .load("Bad")
            .unwrap_err();
        assert!(err.to_string().contains("0x"));
    }
}
