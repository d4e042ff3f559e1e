//! Top-level driver: load, reconcile, deploy, wire, grant.
//!
//! ```text
//! Start -> Loading -> Reconciled -> [Deploying] -> Wiring -> Granting -> Done
//!             \            \              \            \          \
//!              +------------+--------------+------------+----------+-> Failed
//! ```
//!
//! There is no transition out of `Failed`; recovery is a new invocation,
//! which reconciles whatever the failed one left behind.

pub mod context;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::artifact::Artifact;
use crate::deployer::{BatchDeployer, DeployedComponent, DeploymentReport};
use crate::error::{OrchestrationError, PhaseError};
use crate::executor::{ExecutorSettings, TransactionExecutor, TransactionRecord};
use crate::journal::{DeploymentJournal, JournalEvent, RunId};
use crate::network::ComponentNetwork;
use crate::reconcile::{DiscardSummary, NonceReconciler, ReconcileAction, Reconciliation};
use crate::registry::{AddressRegistry, RegistryStore};
use crate::roles::RoleGrantEngine;
use crate::types::{Address, ModuleKey};
use crate::wiring::DependencyWiringEngine;

pub use context::PipelineContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    /// Deploy missing components, then wire and grant
    Deploy,
    /// Wire and grant against an existing deployment
    ConfigureOnly,
}

impl PipelineMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineMode::Deploy => "deploy",
            PipelineMode::ConfigureOnly => "configure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Start,
    Loading,
    Reconciled,
    Deploying,
    Wiring,
    Granting,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineState::Start => "start",
            PipelineState::Loading => "loading",
            PipelineState::Reconciled => "reconciled",
            PipelineState::Deploying => "deploying",
            PipelineState::Wiring => "wiring",
            PipelineState::Granting => "granting",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Discard the state of an interrupted previous run instead of refusing
    pub allow_discard: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub network: String,
    pub chain_id: u64,
    pub mode: PipelineMode,
    pub run: RunId,
    pub state: PipelineState,
    /// Phase that failed, when `state` is `Failed`
    pub failed_phase: Option<PipelineState>,
    pub error: Option<String>,
    pub discarded: Option<DiscardSummary>,
    /// Confirmed deployments recorded from the journal before this run
    pub restored: Vec<(ModuleKey, Address)>,
    pub deployment: Option<DeploymentReport>,
    pub wiring: Vec<TransactionRecord>,
    pub grants: Vec<TransactionRecord>,
    pub registry_entries: usize,
}

impl PipelineReport {
    fn new(context: &PipelineContext, mode: PipelineMode, run: RunId) -> Self {
        Self {
            network: context.profile().name.clone(),
            chain_id: context.profile().chain_id,
            mode,
            run,
            state: PipelineState::Start,
            failed_phase: None,
            error: None,
            discarded: None,
            restored: Vec::new(),
            deployment: None,
            wiring: Vec::new(),
            grants: Vec::new(),
            registry_entries: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Done
    }
}

/// A pipeline run that ended in `Failed`.
#[derive(Debug, Error)]
#[error("{phase} failed: {error}")]
pub struct PipelineFailure {
    pub phase: PipelineState,
    #[source]
    pub error: OrchestrationError,
    pub report: Box<PipelineReport>,
}

pub struct ConfigurationPipeline {
    context: PipelineContext,
    network: Arc<dyn ComponentNetwork>,
    options: PipelineOptions,
}

/// State built during `Loading` and carried through the later phases.
struct Loaded {
    store: RegistryStore,
    registry: AddressRegistry,
    artifacts: HashMap<String, Artifact>,
    executor: TransactionExecutor,
}

impl ConfigurationPipeline {
    pub fn new(
        context: PipelineContext,
        network: Arc<dyn ComponentNetwork>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            context,
            network,
            options,
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Read-only look at the journal tail, without opening a run.
    pub fn inspect(&self) -> Result<Reconciliation, OrchestrationError> {
        let snapshot = self.context.open_journal().snapshot()?;
        Ok(NonceReconciler::reconcile(&snapshot))
    }

    pub async fn run(&self, mode: PipelineMode) -> Result<PipelineReport, PipelineFailure> {
        let journal = self.context.open_journal();
        let mut report = PipelineReport::new(&self.context, mode, journal.run().clone());
        tracing::info!(
            network = %report.network,
            chain_id = report.chain_id,
            run = %report.run,
            mode = mode.as_str(),
            "Starting pipeline"
        );

        self.enter(&mut report, PipelineState::Loading);
        let mut loaded = match self.load(mode, journal) {
            Ok(loaded) => loaded,
            Err(error) => return Err(fail(report, error)),
        };

        self.enter(&mut report, PipelineState::Reconciled);
        if let Err(error) = self.reconcile(&mut loaded, &mut report) {
            return Err(fail(report, error));
        }

        let started = JournalEvent::RunStarted {
            network: report.network.clone(),
            chain_id: report.chain_id,
            mode: mode.as_str().to_string(),
        };
        if let Err(error) = loaded.executor.journal().append(started) {
            return Err(fail(report, error));
        }

        if mode == PipelineMode::Deploy {
            self.enter(&mut report, PipelineState::Deploying);
            let plan = self.context.plan();
            let outcome = BatchDeployer::new(
                &mut loaded.executor,
                &loaded.store,
                &loaded.artifacts,
                self.context.profile(),
            )
            .deploy(&plan.components, &mut loaded.registry)
            .await;
            report.registry_entries = loaded.registry.len();
            match outcome {
                Ok(deployment) => report.deployment = Some(deployment),
                Err(PhaseError { completed, error }) => {
                    report.deployment = Some(partial_deployment(completed));
                    return Err(fail(report, error));
                }
            }
        }

        self.enter(&mut report, PipelineState::Wiring);
        let plan = self.context.plan();
        report.registry_entries = loaded.registry.len();
        if let Err(error) = DependencyWiringEngine::preflight(&plan.wiring, &loaded.registry) {
            return Err(fail(report, error));
        }
        if let Err(error) = RoleGrantEngine::preflight(&plan.grants, &loaded.registry) {
            report.state = PipelineState::Granting;
            return Err(fail(report, error));
        }
        match DependencyWiringEngine::new(&mut loaded.executor)
            .wire(&plan.wiring, &loaded.registry)
            .await
        {
            Ok(records) => report.wiring = records,
            Err(PhaseError { completed, error }) => {
                report.wiring = completed;
                return Err(fail(report, error));
            }
        }

        self.enter(&mut report, PipelineState::Granting);
        match RoleGrantEngine::new(&mut loaded.executor)
            .grant(&plan.grants, &loaded.registry)
            .await
        {
            Ok(records) => report.grants = records,
            Err(PhaseError { completed, error }) => {
                report.grants = completed;
                return Err(fail(report, error));
            }
        }

        if let Err(error) = loaded.executor.journal().append(JournalEvent::RunCompleted) {
            return Err(fail(report, error));
        }
        self.enter(&mut report, PipelineState::Done);
        tracing::info!(
            run = %report.run,
            deployed = report.deployment.as_ref().map_or(0, |d| d.deployed.len()),
            wired = report.wiring.len(),
            granted = report.grants.len(),
            "Pipeline complete"
        );
        Ok(report)
    }

    fn enter(&self, report: &mut PipelineReport, state: PipelineState) {
        tracing::debug!(from = %report.state, to = %state, "Pipeline transition");
        report.state = state;
    }

    fn load(
        &self,
        mode: PipelineMode,
        journal: DeploymentJournal,
    ) -> Result<Loaded, OrchestrationError> {
        let store = self.context.registry_store();
        let registry = match mode {
            PipelineMode::Deploy => store.load_or_empty()?,
            PipelineMode::ConfigureOnly => store.load()?,
        };
        tracing::debug!(
            path = %store.path().display(),
            entries = registry.len(),
            "Loaded registry"
        );

        let artifacts = match mode {
            PipelineMode::Deploy => {
                let components = &self.context.plan().components;
                self.context.artifacts().load_for(components)?
            }
            PipelineMode::ConfigureOnly => HashMap::new(),
        };

        let settings = ExecutorSettings::from_profile(self.context.profile())?;
        let executor = TransactionExecutor::new(Arc::clone(&self.network), journal, settings);

        Ok(Loaded {
            store,
            registry,
            artifacts,
            executor,
        })
    }

    fn reconcile(
        &self,
        loaded: &mut Loaded,
        report: &mut PipelineReport,
    ) -> Result<(), OrchestrationError> {
        let journal = loaded.executor.journal();
        let reconciliation = NonceReconciler::reconcile(&journal.snapshot()?);
        if !reconciliation.clean {
            if let ReconcileAction::DiscardPartialState {
                run,
                open_operation,
                recorded,
            } = &reconciliation.action
            {
                tracing::warn!(
                    run = run.as_ref().map(|r| r.as_str()).unwrap_or("unknown"),
                    open = open_operation.as_deref().unwrap_or("torn journal line"),
                    entries = recorded.len(),
                    "Previous run ended with an operation in flight"
                );
            }
            if !self.options.allow_discard {
                return Err(OrchestrationError::configuration(
                    "Previous run was interrupted with an operation in flight; \
                     its state must be discarded before continuing",
                ));
            }

            report.discarded = NonceReconciler::discard(
                &reconciliation,
                journal,
                &mut loaded.registry,
                &loaded.store,
            )?;
        }

        report.restored = NonceReconciler::restore(
            &journal.snapshot()?,
            journal,
            &mut loaded.registry,
            &loaded.store,
        )?;
        Ok(())
    }
}

fn fail(mut report: PipelineReport, error: OrchestrationError) -> PipelineFailure {
    let phase = report.state;
    tracing::error!(phase = %phase, kind = error.kind().as_str(), "Pipeline failed: {}", error);
    report.failed_phase = Some(phase);
    report.error = Some(error.to_string());
    report.state = PipelineState::Failed;
    PipelineFailure {
        phase,
        error,
        report: Box::new(report),
    }
}

fn partial_deployment(records: Vec<TransactionRecord>) -> DeploymentReport {
    let deployed = records
        .iter()
        .filter_map(|r| {
            r.created().map(|address| DeployedComponent {
                module_key: r.target().clone(),
                address: address.clone(),
            })
        })
        .collect();
    DeploymentReport {
        deployed,
        records,
        ..DeploymentReport::default()
    }
}
