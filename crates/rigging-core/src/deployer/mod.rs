//! Batch deployment of components that have no recorded address yet.
//!
//! Components are deployed in the order given, split into batches of at most
//! `batch_size`. Deployments inside a batch go through the executor one at a
//! time; a settle delay separates batches. Every confirmed deployment is
//! persisted and then journaled before the next one is submitted.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::artifact::Artifact;
use crate::error::{OrchestrationError, PhaseError};
use crate::executor::{RetryDecision, RetryPolicy, TransactionExecutor, TransactionRecord};
use crate::network::Operation;
use crate::profile::NetworkProfile;
use crate::registry::{AddressRegistry, RegistryStore};
use crate::types::{Address, ComponentDescriptor, ModuleKey};

/// Split `components` into batches of at most `batch_size` (unbounded when `None`).
pub fn plan_batches<T>(components: &[T], batch_size: Option<usize>) -> Vec<&[T]> {
    if components.is_empty() {
        return Vec::new();
    }
    match batch_size {
        Some(size) if size > 0 => components.chunks(size).collect(),
        _ => vec![components],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployedComponent {
    pub module_key: ModuleKey,
    pub address: Address,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeploymentReport {
    /// Size of each batch, in submission order
    pub batches: Vec<usize>,
    pub deployed: Vec<DeployedComponent>,
    /// Components that already had an address
    pub skipped: Vec<ModuleKey>,
    pub records: Vec<TransactionRecord>,
    /// Every component handled, with the address it ended up with
    pub components: Vec<ComponentDescriptor>,
}

pub struct BatchDeployer<'a> {
    executor: &'a mut TransactionExecutor,
    store: &'a RegistryStore,
    artifacts: &'a HashMap<String, Artifact>,
    retry: RetryPolicy,
    batch_size: Option<usize>,
    settle_delay: Duration,
}

impl<'a> BatchDeployer<'a> {
    pub fn new(
        executor: &'a mut TransactionExecutor,
        store: &'a RegistryStore,
        artifacts: &'a HashMap<String, Artifact>,
        profile: &NetworkProfile,
    ) -> Self {
        Self {
            executor,
            store,
            artifacts,
            retry: profile.effective_retry(),
            batch_size: profile.batch_size,
            settle_delay: profile.settle_delay,
        }
    }

    pub fn with_batch_size(mut self, batch_size: Option<usize>) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Deploy every component of `components` missing from `registry`.
    ///
    /// `components` must already be in deployment order.
    pub async fn deploy(
        &mut self,
        components: &[ComponentDescriptor],
        registry: &mut AddressRegistry,
    ) -> Result<DeploymentReport, PhaseError> {
        let mut report = DeploymentReport::default();
        let mut resolved: Vec<ComponentDescriptor> = components
            .iter()
            .cloned()
            .map(|mut component| {
                component.address = registry.get(&component.module_key).cloned();
                component
            })
            .collect();

        let mut pending = Vec::new();
        for (index, component) in resolved.iter().enumerate() {
            if component.is_deployed() {
                tracing::debug!(module = %component.module_key, "Already deployed, skipping");
                report.skipped.push(component.module_key.clone());
            } else {
                pending.push(index);
            }
        }

        let batches = plan_batches(&pending, self.batch_size);
        let total = batches.len();
        for (number, batch) in batches.into_iter().enumerate() {
            if number > 0 && !self.settle_delay.is_zero() {
                tracing::debug!(delay = ?self.settle_delay, "Settling before next batch");
                tokio::time::sleep(self.settle_delay).await;
            }
            tracing::info!(batch = number + 1, of = total, size = batch.len(), "Deploying batch");
            report.batches.push(batch.len());

            for &index in batch {
                let component = &mut resolved[index];
                match self.deploy_one(component, registry).await {
                    Ok((record, address)) => {
                        component.address = Some(address.clone());
                        report.deployed.push(DeployedComponent {
                            module_key: component.module_key.clone(),
                            address,
                        });
                        report.records.push(record);
                    }
                    Err(error) => return Err(PhaseError::new(report.records, error)),
                }
            }
        }

        report.components = resolved;
        Ok(report)
    }

    async fn deploy_one(
        &mut self,
        component: &ComponentDescriptor,
        registry: &mut AddressRegistry,
    ) -> Result<(TransactionRecord, Address), OrchestrationError> {
        let artifact = self.artifacts.get(&component.artifact).ok_or_else(|| {
            OrchestrationError::configuration(format!(
                "No artifact '{}' loaded for {}",
                component.artifact, component.module_key
            ))
        })?;
        let description = format!("deploy {}", component.name);
        let key = &component.module_key;

        let mut retries = 0;
        let record = loop {
            let operation = Operation::Deploy {
                artifact: artifact.name.clone(),
                bytecode: artifact.bytecode.clone(),
                args: Vec::new(),
            };
            let err = match self.executor.submit(&description, key, operation).await {
                Ok(record) => break record,
                Err(err) => err,
            };
            match self.retry.decide(&err.cause, retries) {
                RetryDecision::Abort => return Err(err.into()),
                RetryDecision::ResyncAndRetry => {
                    tracing::warn!(
                        module = %key,
                        "Retrying {} after resync: {}",
                        description,
                        err.cause
                    );
                }
                RetryDecision::WaitAndRetry(wait) => {
                    tracing::warn!(
                        module = %key,
                        wait = ?wait,
                        "Retrying {} after network failure: {}",
                        description,
                        err.cause
                    );
                    tokio::time::sleep(wait).await;
                }
            }
            self.executor.resync_sequence().await?;
            retries += 1;
        };

        let address = record.created().cloned().ok_or_else(|| {
            OrchestrationError::RemoteRejection(format!("{description} reported no address"))
        })?;
        registry.put(key.clone(), address.clone())?;
        self.store.persist(registry)?;
        self.executor.note_recorded(key, &address)?;
        tracing::info!(module = %key, %address, "Recorded address");

        Ok((record, address))
    }
}
