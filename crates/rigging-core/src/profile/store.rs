//! Profile resolution: built-ins overlaid with rigging.toml.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context;

use super::schema::{NetworkProfile, RigConfig};
use crate::error::OrchestrationError;

#[derive(Debug, Clone)]
pub struct ProfileSet {
    profiles: BTreeMap<String, NetworkProfile>,
}

impl ProfileSet {
    pub fn builtin() -> Self {
        let profiles = NetworkProfile::builtins()
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        Self { profiles }
    }

    /// Load built-ins and apply `path` if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, OrchestrationError> {
        let mut set = Self::builtin();
        let Some(path) = path else {
            return Ok(set);
        };
        if !path.exists() {
            tracing::debug!(
                path = %path.display(),
                "No rigging.toml found, using built-in profiles"
            );
            return Ok(set);
        }
        let config = parse_rig_toml(path)
            .map_err(|e| OrchestrationError::Configuration(format!("{e:#}")))?;
        set.apply(&config)?;
        Ok(set)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, OrchestrationError> {
        let config: RigConfig = toml::from_str(content)
            .map_err(|e| OrchestrationError::configuration(format!("Invalid rigging.toml: {e}")))?;
        let mut set = Self::builtin();
        set.apply(&config)?;
        Ok(set)
    }

    fn apply(&mut self, config: &RigConfig) -> Result<(), OrchestrationError> {
        let mut applied = BTreeSet::new();
        for name in config.profiles.keys() {
            self.apply_one(name, config, &mut applied, &mut Vec::new())?;
        }
        Ok(())
    }

    /// Apply `name`'s override after the override of its base, if any.
    fn apply_one(
        &mut self,
        name: &str,
        config: &RigConfig,
        applied: &mut BTreeSet<String>,
        chain: &mut Vec<String>,
    ) -> Result<(), OrchestrationError> {
        if applied.contains(name) {
            return Ok(());
        }
        let Some(ov) = config.profiles.get(name) else {
            return Ok(());
        };
        if chain.iter().any(|n| n == name) {
            chain.push(name.to_string());
            return Err(OrchestrationError::configuration(format!(
                "Profile inheritance cycle: {}",
                chain.join(" -> ")
            )));
        }
        chain.push(name.to_string());

        let base_name = match &ov.base {
            Some(base) => base.clone(),
            None if self.profiles.contains_key(name) => name.to_string(),
            None => "local".to_string(),
        };
        if base_name != name {
            self.apply_one(&base_name, config, applied, chain)?;
        }
        let base = self.profiles.get(&base_name).cloned().ok_or_else(|| {
            OrchestrationError::configuration(format!(
                "Profile '{}' extends unknown profile '{}'",
                name, base_name
            ))
        })?;
        self.profiles.insert(name.to_string(), base.merged(name, ov));

        chain.pop();
        applied.insert(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<NetworkProfile, OrchestrationError> {
        self.profiles.get(name).cloned().ok_or_else(|| {
            let known: Vec<&str> = self.profiles.keys().map(|k| k.as_str()).collect();
            OrchestrationError::configuration(format!(
                "Unknown network '{}'. Available: {}",
                name,
                known.join(", ")
            ))
        })
    }

    /// Resolve a profile, optionally overriding its chain id.
    pub fn resolve(
        &self,
        name: &str,
        chain_id: Option<u64>,
    ) -> Result<NetworkProfile, OrchestrationError> {
        let mut profile = self.get(name)?;
        if let Some(chain_id) = chain_id {
            profile.chain_id = chain_id;
        }
        Ok(profile)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(|k| k.as_str())
    }
}

fn parse_rig_toml(path: &Path) -> anyhow::Result<RigConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}
