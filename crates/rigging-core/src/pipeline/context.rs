//! Everything one pipeline invocation needs, resolved up front.

use std::path::PathBuf;

use crate::artifact::ArtifactStore;
use crate::journal::DeploymentJournal;
use crate::plan::SystemPlan;
use crate::profile::{NetworkProfile, StateLayout};
use crate::registry::RegistryStore;

/// Dependency-injection context for a pipeline run.
///
/// Frontends build this once from their options and hand it to
/// [`super::ConfigurationPipeline`]; tests build it over a temp directory.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    profile: NetworkProfile,
    layout: StateLayout,
    plan: SystemPlan,
    artifacts: ArtifactStore,
}

impl PipelineContext {
    pub fn new(
        profile: NetworkProfile,
        state_root: PathBuf,
        plan: SystemPlan,
        artifacts_dir: PathBuf,
    ) -> Self {
        let layout = StateLayout::new(state_root, profile.name.clone(), profile.chain_id);
        Self {
            profile,
            layout,
            plan,
            artifacts: ArtifactStore::new(artifacts_dir),
        }
    }

    pub fn profile(&self) -> &NetworkProfile {
        &self.profile
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn plan(&self) -> &SystemPlan {
        &self.plan
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn registry_store(&self) -> RegistryStore {
        RegistryStore::new(self.layout.registry_path())
    }

    /// Journal handle tagged with a fresh run id.
    pub fn open_journal(&self) -> DeploymentJournal {
        DeploymentJournal::open(self.layout.journal_path())
    }
}
