//! Rigging Core Library
//!
//! Deploys a graph of interdependent networked components, records their
//! addresses, wires their cross-component dependencies and grants roles,
//! resuming safely after partial runs.

pub mod artifact;
pub mod bulk;
pub mod deployer;
pub mod error;
pub mod executor;
pub mod export;
pub mod fs;
pub mod journal;
pub mod network;
pub mod pipeline;
pub mod plan;
pub mod profile;
pub mod reconcile;
pub mod registry;
pub mod roles;
pub mod types;
pub mod wiring;

/// Re-exports of commonly used types
pub mod prelude {
    // Identity and plan data
    pub use crate::types::{Address, ComponentDescriptor, DependencyEdge, ModuleKey, RoleGrantEdge};

    // Errors
    pub use crate::error::{ErrorKind, OrchestrationError, PhaseError};

    // Configuration
    pub use crate::plan::SystemPlan;
    pub use crate::profile::{NetworkProfile, ProfileSet, RetryPolicy, StateLayout};

    // State
    pub use crate::journal::{DeploymentJournal, JournalEntry, JournalEvent, RunId};
    pub use crate::registry::{AddressRegistry, RegistryStore};

    // Execution
    pub use crate::executor::{TransactionExecutor, TransactionRecord, TransactionStatus};
    pub use crate::network::{ComponentNetwork, Operation, RpcNetwork, TxStatus};

    // Phases
    pub use crate::deployer::BatchDeployer;
    pub use crate::pipeline::{ConfigurationPipeline, PipelineMode, PipelineReport, PipelineState};
    pub use crate::reconcile::{NonceReconciler, ReconcileAction, Reconciliation};
    pub use crate::roles::RoleGrantEngine;
    pub use crate::wiring::DependencyWiringEngine;
}
