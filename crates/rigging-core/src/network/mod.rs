//! Network seam between the executor and the components it drives.
//!
//! Everything that talks to the network goes through [`ComponentNetwork`];
//! the executor is its only caller for state-changing operations.

pub mod rpc;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OrchestrationError;
use crate::types::Address;

pub use rpc::RpcNetwork;

/// Hash identifying a submitted operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A state-changing operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Create a new component from build artifact bytecode.
    Deploy {
        artifact: String,
        bytecode: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Invoke `function` on an existing component.
    Call {
        target: Address,
        function: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl Operation {
    pub fn call(target: Address, function: impl Into<String>, args: Vec<String>) -> Self {
        Operation::Call {
            target,
            function: function.into(),
            args,
        }
    }

    pub fn is_deploy(&self) -> bool {
        matches!(self, Operation::Deploy { .. })
    }
}

/// An operation bound to a sender and sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub sender: Address,
    pub chain_id: u64,
    pub sequence: u64,
    pub operation: Operation,
}

/// Network-observed state of a submitted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Success {
        /// Address of the component created by a deployment
        #[serde(default)]
        created: Option<Address>,
    },
    Failed {
        reason: String,
    },
}

#[async_trait]
pub trait ComponentNetwork: Send + Sync {
    /// Next sequence number the network expects from `account`.
    async fn account_sequence(&self, account: &Address) -> Result<u64, OrchestrationError>;

    /// Submit an operation; returns once the network accepted it for ordering.
    async fn submit(&self, envelope: &Envelope) -> Result<TxHash, OrchestrationError>;

    async fn status(&self, hash: &TxHash) -> Result<TxStatus, OrchestrationError>;

    /// Read-only call against a deployed component.
    async fn query(
        &self,
        target: &Address,
        function: &str,
        args: &[String],
    ) -> Result<Value, OrchestrationError>;
}
