//! Retry policy applied uniformly by callers of the executor.
//!
//! The executor never retries on its own; call sites that own a retry
//! decision (the batch deployer, bulk operations) ask the policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, OrchestrationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries allowed per operation after the first attempt
    pub max_retries: u32,
    /// Wait before retrying after a network failure
    #[serde(rename = "network_backoff_ms", with = "crate::profile::schema::millis")]
    pub network_backoff: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Abort,
    /// Refetch the sender's sequence number, then resubmit
    ResyncAndRetry,
    /// Wait, refetch the sequence number, then resubmit
    WaitAndRetry(Duration),
}

impl RetryPolicy {
    /// Never retry; used on low-contention networks where failures point at
    /// configuration rather than transient conditions.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            network_backoff: Duration::ZERO,
        }
    }

    /// One retry after a sequence conflict or network failure.
    pub fn once(network_backoff: Duration) -> Self {
        Self {
            max_retries: 1,
            network_backoff,
        }
    }

    /// Decide what to do after `error` on attempt number `retries_done + 1`.
    pub fn decide(&self, error: &OrchestrationError, retries_done: u32) -> RetryDecision {
        if retries_done >= self.max_retries {
            return RetryDecision::Abort;
        }
        match error.kind() {
            ErrorKind::SequenceConflict => RetryDecision::ResyncAndRetry,
            ErrorKind::NetworkFailure => RetryDecision::WaitAndRetry(self.network_backoff),
            _ => RetryDecision::Abort,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}
