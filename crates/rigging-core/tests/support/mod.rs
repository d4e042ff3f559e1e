//! Scripted in-memory network and fixtures shared by integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rigging_core::executor::ExecutorSettings;
use rigging_core::network::{ComponentNetwork, Envelope, Operation, TxHash, TxStatus};
use rigging_core::prelude::*;
use serde_json::Value;
use tokio::time::Instant;

pub const SENDER: &str = "0x00000000000000000000000000000000000000ee";

pub fn sender() -> Address {
    Address::parse(SENDER).unwrap()
}

pub fn key(s: &str) -> ModuleKey {
    ModuleKey::parse(s).unwrap()
}

pub fn addr(byte: u8) -> Address {
    Address::parse(&format!("0x{:040x}", byte)).unwrap()
}

/// Failure to inject into the next submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    SequenceConflict,
    Unreachable,
    Rejected,
    /// Accept the submission but never confirm it
    NeverConfirm,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub envelope: Envelope,
    pub at: Instant,
}

impl Submission {
    pub fn function(&self) -> Option<&str> {
        match &self.envelope.operation {
            Operation::Call { function, .. } => Some(function),
            Operation::Deploy { .. } => None,
        }
    }

    pub fn artifact(&self) -> Option<&str> {
        match &self.envelope.operation {
            Operation::Deploy { artifact, .. } => Some(artifact),
            Operation::Call { .. } => None,
        }
    }
}

#[derive(Default)]
struct State {
    sequence: u64,
    next_address: u8,
    submissions: Vec<Submission>,
    faults: VecDeque<Fault>,
    scheduled: HashMap<usize, Fault>,
    attempts: usize,
    rejected_functions: HashMap<String, String>,
    /// Fixed answers for read-only queries, by function name
    query_answers: HashMap<String, Value>,
    statuses: HashMap<TxHash, TxStatus>,
    /// (component, grant operation, account)
    grants: HashSet<(Address, String, String)>,
    sequence_fetches: usize,
}

/// A network that confirms everything immediately unless told otherwise.
#[derive(Clone)]
pub struct ScriptedNetwork {
    state: Arc<Mutex<State>>,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        let state = State {
            next_address: 0xc0,
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn shared(&self) -> Arc<dyn ComponentNetwork> {
        Arc::new(self.clone())
    }

    /// Queue a fault for the next submission; faults are consumed in order.
    pub fn fail_next(&self, fault: Fault) {
        self.state.lock().unwrap().faults.push_back(fault);
    }

    /// Inject `fault` into the `attempt`-th submission (1-based).
    pub fn fail_attempt(&self, attempt: usize, fault: Fault) {
        self.state.lock().unwrap().scheduled.insert(attempt, fault);
    }

    /// Make every call to `function` revert.
    pub fn reject_function(&self, function: &str, reason: &str) {
        self.state
            .lock()
            .unwrap()
            .rejected_functions
            .insert(function.to_string(), reason.to_string());
    }

    /// Answer every query of `function` with `value`.
    pub fn answer_query(&self, function: &str, value: Value) {
        self.state
            .lock()
            .unwrap()
            .query_answers
            .insert(function.to_string(), value);
    }

    /// Simulate operations sent by the same identity from elsewhere.
    pub fn advance_sequence(&self, by: u64) {
        self.state.lock().unwrap().sequence += by;
    }

    pub fn grant_directly(&self, component: &Address, role: &str, account: &Address) {
        self.state.lock().unwrap().grants.insert((
            component.clone(),
            rigging_core::types::grant_operation(role),
            account.to_string(),
        ));
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn functions(&self) -> Vec<String> {
        self.submissions()
            .iter()
            .filter_map(|s| s.function().map(str::to_string))
            .collect()
    }

    pub fn deployed_artifacts(&self) -> Vec<String> {
        self.submissions()
            .iter()
            .filter_map(|s| s.artifact().map(str::to_string))
            .collect()
    }

    pub fn sequence_fetches(&self) -> usize {
        self.state.lock().unwrap().sequence_fetches
    }

    pub fn grant_count(&self) -> usize {
        self.state.lock().unwrap().grants.len()
    }
}

#[async_trait]
impl ComponentNetwork for ScriptedNetwork {
    async fn account_sequence(&self, _account: &Address) -> Result<u64, OrchestrationError> {
        let mut state = self.state.lock().unwrap();
        state.sequence_fetches += 1;
        Ok(state.sequence)
    }

    async fn submit(&self, envelope: &Envelope) -> Result<TxHash, OrchestrationError> {
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;
        let attempt = state.attempts;
        let fault = match state.scheduled.remove(&attempt) {
            Some(fault) => Some(fault),
            None => state.faults.pop_front(),
        };
        match fault {
            Some(Fault::SequenceConflict) => {
                return Err(OrchestrationError::SequenceConflict("nonce too low".into()));
            }
            Some(Fault::Unreachable) => {
                return Err(OrchestrationError::NetworkFailure("connection refused".into()));
            }
            _ => {}
        }
        if envelope.sequence != state.sequence {
            return Err(OrchestrationError::SequenceConflict(format!(
                "expected nonce {}, got {}",
                state.sequence, envelope.sequence
            )));
        }
        state.sequence += 1;

        let hash = TxHash::new(format!("0x{:064x}", state.submissions.len() + 1));
        state.submissions.push(Submission {
            envelope: envelope.clone(),
            at: Instant::now(),
        });

        let status = match (fault, &envelope.operation) {
            (Some(Fault::NeverConfirm), _) => TxStatus::Pending,
            (Some(Fault::Rejected), _) => TxStatus::Failed {
                reason: "execution reverted".into(),
            },
            (_, Operation::Deploy { .. }) => {
                let created = addr(state.next_address);
                state.next_address += 1;
                TxStatus::Success {
                    created: Some(created),
                }
            }
            (_, Operation::Call { target, function, args }) => {
                match state.rejected_functions.get(function) {
                    Some(reason) => TxStatus::Failed {
                        reason: reason.clone(),
                    },
                    None => {
                        if function.starts_with("grant") {
                            let account = args.first().cloned().unwrap_or_default();
                            state
                                .grants
                                .insert((target.clone(), function.clone(), account));
                        }
                        TxStatus::Success { created: None }
                    }
                }
            }
        };
        state.statuses.insert(hash.clone(), status);
        Ok(hash)
    }

    async fn status(&self, hash: &TxHash) -> Result<TxStatus, OrchestrationError> {
        let state = self.state.lock().unwrap();
        state
            .statuses
            .get(hash)
            .cloned()
            .ok_or_else(|| OrchestrationError::RemoteRejection(format!("unknown hash {hash}")))
    }

    async fn query(
        &self,
        target: &Address,
        function: &str,
        args: &[String],
    ) -> Result<Value, OrchestrationError> {
        let state = self.state.lock().unwrap();
        if let Some(value) = state.query_answers.get(function) {
            return Ok(value.clone());
        }
        let Some(role) = function
            .strip_prefix("has")
            .and_then(|f| f.strip_suffix("Role"))
        else {
            return Ok(Value::Null);
        };
        let account = args.first().cloned().unwrap_or_default();
        let granted = state
            .grants
            .contains(&(target.clone(), format!("grant{role}Role"), account));
        Ok(Value::Bool(granted))
    }
}

/// Local profile with a sender, fast polling and the given pacing.
pub fn profile(batch_size: Option<usize>, settle: Duration) -> NetworkProfile {
    NetworkProfile {
        sender: Some(sender()),
        poll_interval: Duration::from_millis(10),
        confirmation_timeout: Duration::from_secs(5),
        batch_size,
        settle_delay: settle,
        ..NetworkProfile::local()
    }
}

pub fn executor(
    network: &ScriptedNetwork,
    state_dir: &Path,
    profile: &NetworkProfile,
) -> TransactionExecutor {
    let journal = DeploymentJournal::open(state_dir.join("journal.ndjson"));
    let settings = ExecutorSettings::from_profile(profile).unwrap();
    TransactionExecutor::new(network.shared(), journal, settings)
}

/// Write a minimal artifact for each name into `dir`.
pub fn write_artifacts(dir: &Path, names: &[&str]) {
    std::fs::create_dir_all(dir).unwrap();
    for name in names {
        let body = format!(
            r#"{{ "bytecode": "0x6080", "abi": [{{ "name": "set{name}Address", "type": "function" }}] }}"#
        );
        std::fs::write(dir.join(format!("{name}.json")), body).unwrap();
    }
}

pub fn component(s: &str) -> ComponentDescriptor {
    ComponentDescriptor::new(key(s))
}
