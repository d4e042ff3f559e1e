//! State directory layout
//!
//! Each network identity gets its own directory so registries of different
//! networks never mix:
//! - Unix: `$XDG_STATE_HOME/rigging/<network>-<chainId>/`
//! - Windows: `%LOCALAPPDATA%\rigging\<network>-<chainId>\`

use std::path::{Path, PathBuf};

use crate::error::OrchestrationError;

const REGISTRY_FILE: &str = "addresses.json";
const JOURNAL_FILE: &str = "journal.ndjson";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
    network: String,
    chain_id: u64,
}

impl StateLayout {
    pub fn new(root: PathBuf, network: impl Into<String>, chain_id: u64) -> Self {
        Self {
            root,
            network: network.into(),
            chain_id,
        }
    }

    /// Default state root for all networks.
    pub fn default_root() -> Result<PathBuf, OrchestrationError> {
        let base = if cfg!(unix) {
            dirs::state_dir().or_else(dirs::data_local_dir)
        } else {
            dirs::data_local_dir()
        };
        base.map(|b| b.join("rigging"))
            .ok_or_else(|| OrchestrationError::configuration("Cannot determine state directory"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn network_dir(&self) -> PathBuf {
        self.root.join(format!("{}-{}", self.network, self.chain_id))
    }

    pub fn registry_path(&self) -> PathBuf {
        self.network_dir().join(REGISTRY_FILE)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.network_dir().join(JOURNAL_FILE)
    }
}
