//! Dependency wiring: tell each component the addresses it depends on.
//!
//! Edges run in declared order. Each edge is re-issued on every run; the
//! setter overwrites, so a repeated run is wasteful but never wrong.

use crate::error::{OrchestrationError, PhaseError};
use crate::executor::{TransactionExecutor, TransactionRecord};
use crate::network::Operation;
use crate::registry::AddressRegistry;
use crate::types::{Address, DependencyEdge, ModuleKey};

/// Look up the recorded address of one endpoint of `edge`.
pub(crate) fn resolve(
    registry: &AddressRegistry,
    key: &ModuleKey,
    edge: impl FnOnce() -> String,
) -> Result<Address, OrchestrationError> {
    registry
        .get(key)
        .cloned()
        .ok_or_else(|| OrchestrationError::DependencyResolution {
            edge: edge(),
            missing: key.clone(),
        })
}

pub struct DependencyWiringEngine<'a> {
    executor: &'a mut TransactionExecutor,
}

impl<'a> DependencyWiringEngine<'a> {
    pub fn new(executor: &'a mut TransactionExecutor) -> Self {
        Self { executor }
    }

    /// Check that every edge endpoint has an address, without submitting anything.
    pub fn preflight(
        edges: &[DependencyEdge],
        registry: &AddressRegistry,
    ) -> Result<(), OrchestrationError> {
        for edge in edges {
            resolve(registry, &edge.source, || edge.describe())?;
            resolve(registry, &edge.target, || edge.describe())?;
        }
        Ok(())
    }

    pub async fn wire(
        &mut self,
        edges: &[DependencyEdge],
        registry: &AddressRegistry,
    ) -> Result<Vec<TransactionRecord>, PhaseError> {
        let mut records = Vec::with_capacity(edges.len());
        for edge in edges {
            match self.wire_one(edge, registry).await {
                Ok(record) => records.push(record),
                Err(error) => return Err(PhaseError::new(records, error)),
            }
        }
        Ok(records)
    }

    async fn wire_one(
        &mut self,
        edge: &DependencyEdge,
        registry: &AddressRegistry,
    ) -> Result<TransactionRecord, OrchestrationError> {
        let source = resolve(registry, &edge.source, || edge.describe())?;
        let target = resolve(registry, &edge.target, || edge.describe())?;
        let operation = Operation::call(source, edge.setter.clone(), vec![target.to_string()]);
        let record = self
            .executor
            .submit(&edge.describe(), &edge.source, operation)
            .await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preflight_names_the_missing_component() {
        let mut registry = AddressRegistry::new();
        registry
            .put(
                ModuleKey::parse("Core#A").unwrap(),
                Address::parse("0x00000000000000000000000000000000000000a1").unwrap(),
            )
            .unwrap();
        let edges = [DependencyEdge::conventional(
            ModuleKey::parse("Core#A").unwrap(),
            ModuleKey::parse("Core#B").unwrap(),
        )];
        let err = DependencyWiringEngine::preflight(&edges, &registry).unwrap_err();
        match err {
            OrchestrationError::DependencyResolution { missing, edge } => {
                assert_eq!(missing.as_str(), "Core#B");
                assert!(edge.contains("setBAddress"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
