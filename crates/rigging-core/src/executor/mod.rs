//! Transaction executor: the only component allowed to submit operations.
//!
//! Each submission is prepared with the sender's next sequence number,
//! journaled, sent, polled until the network confirms or rejects it, and
//! followed by the profile's inter-operation delay. `submit` takes
//! `&mut self`, so one executor can never have two operations in flight.

pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::error::{ErrorKind, OrchestrationError};
use crate::journal::{DeploymentJournal, JournalEvent};
use crate::network::{ComponentNetwork, Envelope, Operation, TxHash, TxStatus};
use crate::profile::NetworkProfile;
use crate::types::{Address, ModuleKey};

pub use retry::{RetryDecision, RetryPolicy};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Outcome of one submitted operation. Immutable once terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    description: String,
    target: ModuleKey,
    status: TransactionStatus,
    submitted_at: DateTime<Utc>,
    sequence: Option<u64>,
    confirmation_hash: Option<TxHash>,
    created: Option<Address>,
    failure: Option<String>,
}

impl TransactionRecord {
    fn pending(description: &str, target: &ModuleKey) -> Self {
        Self {
            description: description.to_string(),
            target: target.clone(),
            status: TransactionStatus::Pending,
            submitted_at: Utc::now(),
            sequence: None,
            confirmation_hash: None,
            created: None,
            failure: None,
        }
    }

    fn confirm(&mut self, created: Option<Address>) {
        if self.is_terminal() {
            return;
        }
        self.status = TransactionStatus::Confirmed;
        self.created = created;
    }

    fn fail(&mut self, reason: String) {
        if self.is_terminal() {
            return;
        }
        self.status = TransactionStatus::Failed;
        self.failure = Some(reason);
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn target(&self) -> &ModuleKey {
        &self.target
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub fn confirmation_hash(&self) -> Option<&TxHash> {
        self.confirmation_hash.as_ref()
    }

    /// Address of the component a confirmed deployment created.
    pub fn created(&self) -> Option<&Address> {
        self.created.as_ref()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status != TransactionStatus::Pending
    }
}

/// A failed submission, carrying its terminal record and classified cause.
#[derive(Debug, Error)]
#[error("{} on {} failed: {cause}", .record.description(), .record.target())]
pub struct ExecutionError {
    pub record: TransactionRecord,
    #[source]
    pub cause: OrchestrationError,
}

impl ExecutionError {
    pub fn kind(&self) -> ErrorKind {
        self.cause.kind()
    }
}

impl From<ExecutionError> for OrchestrationError {
    fn from(err: ExecutionError) -> Self {
        OrchestrationError::Operation {
            description: err.record.description,
            target: err.record.target,
            cause: Box::new(err.cause),
        }
    }
}

/// Identity and pacing used by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub sender: Address,
    pub chain_id: u64,
    pub operation_delay: Duration,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
}

impl ExecutorSettings {
    pub fn from_profile(profile: &NetworkProfile) -> Result<Self, OrchestrationError> {
        let sender = profile.sender.clone().ok_or_else(|| {
            OrchestrationError::configuration(format!(
                "Profile '{}' has no sender; set [profiles.{}].sender in rigging.toml",
                profile.name, profile.name
            ))
        })?;
        Ok(Self {
            sender,
            chain_id: profile.chain_id,
            operation_delay: profile.operation_delay,
            confirmation_timeout: profile.confirmation_timeout,
            poll_interval: profile.poll_interval,
        })
    }
}

pub struct TransactionExecutor {
    network: Arc<dyn ComponentNetwork>,
    journal: DeploymentJournal,
    settings: ExecutorSettings,
    next_sequence: Option<u64>,
}

impl TransactionExecutor {
    pub fn new(
        network: Arc<dyn ComponentNetwork>,
        journal: DeploymentJournal,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            network,
            journal,
            settings,
            next_sequence: None,
        }
    }

    pub fn journal(&self) -> &DeploymentJournal {
        &self.journal
    }

    pub fn network(&self) -> &Arc<dyn ComponentNetwork> {
        &self.network
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Refetch the sender's sequence number from the network.
    pub async fn resync_sequence(&mut self) -> Result<u64, OrchestrationError> {
        let observed = self.network.account_sequence(&self.settings.sender).await?;
        if let Some(expected) = self.next_sequence
            && expected != observed
        {
            tracing::warn!(
                expected,
                observed,
                sender = %self.settings.sender,
                "Sequence number out of sync"
            );
        }
        self.next_sequence = Some(observed);
        Ok(observed)
    }

    /// Journal a registry write made on behalf of the current run.
    pub fn note_recorded(
        &self,
        key: &ModuleKey,
        address: &Address,
    ) -> Result<(), OrchestrationError> {
        self.journal.append(JournalEvent::Recorded {
            module_key: key.clone(),
            address: address.clone(),
        })
    }

    /// Submit one operation against `target` and wait for its outcome.
    pub async fn submit(
        &mut self,
        description: &str,
        target: &ModuleKey,
        operation: Operation,
    ) -> Result<TransactionRecord, ExecutionError> {
        let mut record = TransactionRecord::pending(description, target);
        tracing::info!(component = %target, "attempting {}", description);

        let result = self.execute(&mut record, operation).await;

        if !self.settings.operation_delay.is_zero() {
            tokio::time::sleep(self.settings.operation_delay).await;
        }

        match result {
            Ok(()) => {
                tracing::info!(
                    component = %target,
                    hash = record.confirmation_hash().map(|h| h.as_str()).unwrap_or_default(),
                    "confirmed {}",
                    description
                );
                Ok(record)
            }
            Err(cause) => {
                record.fail(cause.to_string());
                tracing::error!(
                    component = %target,
                    kind = cause.kind().as_str(),
                    "failed {}: {}",
                    description,
                    cause
                );
                let failed = JournalEvent::Failed {
                    description: description.to_string(),
                    target: target.clone(),
                    reason: cause.to_string(),
                };
                if let Err(journal_err) = self.journal.append(failed) {
                    tracing::error!(
                        "Could not journal failure of {}: {}",
                        description,
                        journal_err
                    );
                }
                Err(ExecutionError { record, cause })
            }
        }
    }

    async fn execute(
        &mut self,
        record: &mut TransactionRecord,
        operation: Operation,
    ) -> Result<(), OrchestrationError> {
        let sequence = match self.next_sequence {
            Some(sequence) => sequence,
            None => self.resync_sequence().await?,
        };
        record.sequence = Some(sequence);
        let is_deploy = operation.is_deploy();

        self.journal.append(JournalEvent::Prepared {
            description: record.description.clone(),
            target: record.target.clone(),
            sequence,
        })?;

        let envelope = Envelope {
            sender: self.settings.sender.clone(),
            chain_id: self.settings.chain_id,
            sequence,
            operation,
        };
        let hash = match self.network.submit(&envelope).await {
            Ok(hash) => hash,
            Err(err) => {
                // The network's view of our sequence is unknown now
                self.next_sequence = None;
                return Err(err);
            }
        };
        self.next_sequence = Some(sequence + 1);
        record.confirmation_hash = Some(hash.clone());
        tracing::debug!(sequence, %hash, "sent {}", record.description);

        self.journal.append(JournalEvent::Sent {
            description: record.description.clone(),
            target: record.target.clone(),
            sequence,
            hash: hash.to_string(),
        })?;

        let timeout = self.settings.confirmation_timeout;
        let outcome = tokio::time::timeout(timeout, self.await_confirmation(&hash)).await;
        let Ok(status) = outcome else {
            self.next_sequence = None;
            return Err(OrchestrationError::NetworkFailure(format!(
                "no confirmation for {} within {:?}",
                hash, timeout
            )));
        };
        let status = status?;

        match status {
            TxStatus::Success { created } => {
                if is_deploy && created.is_none() {
                    return Err(OrchestrationError::RemoteRejection(format!(
                        "deployment {hash} confirmed without a component address"
                    )));
                }
                record.confirm(created);
                self.journal.append(JournalEvent::Confirmed {
                    description: record.description.clone(),
                    target: record.target.clone(),
                    hash: hash.to_string(),
                    created: record.created().cloned(),
                })?;
                Ok(())
            }
            TxStatus::Failed { reason } => Err(OrchestrationError::RemoteRejection(reason)),
            TxStatus::Pending => Err(OrchestrationError::NetworkFailure(format!(
                "{hash} still pending"
            ))),
        }
    }

    async fn await_confirmation(&self, hash: &TxHash) -> Result<TxStatus, OrchestrationError> {
        let interval = self.settings.poll_interval.max(MIN_POLL_INTERVAL);
        loop {
            match self.network.status(hash).await {
                Ok(TxStatus::Pending) => {}
                Ok(status) => return Ok(status),
                Err(err) if err.kind() == ErrorKind::NetworkFailure => {
                    tracing::debug!(%hash, "status poll failed, retrying: {}", err);
                }
                Err(err) => return Err(err),
            }
            tokio::time::sleep(interval).await;
        }
    }
}
