//! Deployment journal: append-only record of submission attempts.
//!
//! Events are written as each step is attempted. A journal whose last event
//! is `prepared` or `sent` belongs to a run that never learned the outcome
//! of its last operation.

pub mod store;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Address, ModuleKey};

pub use store::{DeploymentJournal, JournalSnapshot};

/// Identifier of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn generate() -> Self {
        Self(format!(
            "{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S%3fZ"),
            std::process::id()
        ))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEvent {
    RunStarted {
        network: String,
        chain_id: u64,
        mode: String,
    },
    Prepared {
        description: String,
        target: ModuleKey,
        sequence: u64,
    },
    Sent {
        description: String,
        target: ModuleKey,
        sequence: u64,
        hash: String,
    },
    Confirmed {
        description: String,
        target: ModuleKey,
        hash: String,
        /// Address created by a confirmed deployment
        #[serde(default, skip_serializing_if = "Option::is_none")]
        created: Option<Address>,
    },
    Failed {
        description: String,
        target: ModuleKey,
        reason: String,
    },
    /// A registry entry was written by this run.
    Recorded {
        module_key: ModuleKey,
        address: Address,
    },
    RunCompleted,
    RunDiscarded {
        discarded_run: RunId,
        removed: Vec<ModuleKey>,
    },
}

impl JournalEvent {
    /// Whether the event closes out everything submitted before it.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JournalEvent::Prepared { .. } | JournalEvent::Sent { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            JournalEvent::RunStarted { .. } => "run_started",
            JournalEvent::Prepared { .. } => "prepared",
            JournalEvent::Sent { .. } => "sent",
            JournalEvent::Confirmed { .. } => "confirmed",
            JournalEvent::Failed { .. } => "failed",
            JournalEvent::Recorded { .. } => "recorded",
            JournalEvent::RunCompleted => "run_completed",
            JournalEvent::RunDiscarded { .. } => "run_discarded",
        }
    }
}

/// One line of the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub run: RunId,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: JournalEvent,
}
