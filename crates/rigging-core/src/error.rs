//! Error taxonomy shared by every phase of a pipeline run.

use thiserror::Error;

use crate::executor::TransactionRecord;
use crate::types::{Address, ModuleKey, ParseError};

/// Stable classification of an [`OrchestrationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    DependencyResolution,
    SequenceConflict,
    NetworkFailure,
    RemoteRejection,
    RegistryConflict,
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::DependencyResolution => "dependency-resolution",
            ErrorKind::SequenceConflict => "sequence-conflict",
            ErrorKind::NetworkFailure => "network-failure",
            ErrorKind::RemoteRejection => "remote-rejection",
            ErrorKind::RegistryConflict => "registry-conflict",
            ErrorKind::Storage => "storage",
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Missing registry, plan, profile or artifact. Fatal before any submission.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An edge references a component with no recorded address.
    #[error("cannot resolve {edge}: component '{missing}' has no recorded address")]
    DependencyResolution { edge: String, missing: ModuleKey },

    /// Submission rejected because its sequence number conflicts with the network.
    #[error("sequence conflict: {0}")]
    SequenceConflict(String),

    /// Confirmation timeout or unreachable node.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The target component's own logic rejected the operation.
    #[error("remote rejection: {0}")]
    RemoteRejection(String),

    /// A second, different address was offered for an already recorded key.
    #[error("registry already records {existing} for '{key}', refusing {attempted}")]
    RegistryConflict {
        key: ModuleKey,
        existing: Address,
        attempted: Address,
    },

    /// Reading or writing registry/journal state failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A classified failure of one submitted operation.
    #[error("{description} on {target} failed: {cause}")]
    Operation {
        description: String,
        target: ModuleKey,
        #[source]
        cause: Box<OrchestrationError>,
    },
}

impl OrchestrationError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn storage(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::DependencyResolution { .. } => ErrorKind::DependencyResolution,
            Self::SequenceConflict(_) => ErrorKind::SequenceConflict,
            Self::NetworkFailure(_) => ErrorKind::NetworkFailure,
            Self::RemoteRejection(_) => ErrorKind::RemoteRejection,
            Self::RegistryConflict { .. } => ErrorKind::RegistryConflict,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Operation { cause, .. } => cause.kind(),
        }
    }

    /// Whether a caller with a retry budget may try the operation again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::SequenceConflict | ErrorKind::NetworkFailure
        )
    }
}

impl From<ParseError> for OrchestrationError {
    fn from(err: ParseError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Failure of a wiring or grant phase, with the records that completed before it.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PhaseError {
    pub completed: Vec<TransactionRecord>,
    #[source]
    pub error: OrchestrationError,
}

impl PhaseError {
    pub fn new(completed: Vec<TransactionRecord>, error: OrchestrationError) -> Self {
        Self { completed, error }
    }
}
