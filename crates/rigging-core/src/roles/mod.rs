//! Role grants across components.
//!
//! Same discipline as wiring: declared order, one executor submission per
//! edge. Granting a held role is a no-op at the component, so the whole
//! phase can be repeated safely.

use crate::error::{OrchestrationError, PhaseError};
use crate::executor::{TransactionExecutor, TransactionRecord};
use crate::network::Operation;
use crate::registry::AddressRegistry;
use crate::types::RoleGrantEdge;
use crate::wiring::resolve;

pub struct RoleGrantEngine<'a> {
    executor: &'a mut TransactionExecutor,
}

impl<'a> RoleGrantEngine<'a> {
    pub fn new(executor: &'a mut TransactionExecutor) -> Self {
        Self { executor }
    }

    pub fn preflight(
        edges: &[RoleGrantEdge],
        registry: &AddressRegistry,
    ) -> Result<(), OrchestrationError> {
        for edge in edges {
            resolve(registry, &edge.granting, || edge.describe())?;
            resolve(registry, &edge.grantee, || edge.describe())?;
        }
        Ok(())
    }

    pub async fn grant(
        &mut self,
        edges: &[RoleGrantEdge],
        registry: &AddressRegistry,
    ) -> Result<Vec<TransactionRecord>, PhaseError> {
        let mut records = Vec::with_capacity(edges.len());
        for edge in edges {
            match self.grant_one(edge, registry).await {
                Ok(record) => records.push(record),
                Err(error) => return Err(PhaseError::new(records, error)),
            }
        }
        Ok(records)
    }

    async fn grant_one(
        &mut self,
        edge: &RoleGrantEdge,
        registry: &AddressRegistry,
    ) -> Result<TransactionRecord, OrchestrationError> {
        let granting = resolve(registry, &edge.granting, || edge.describe())?;
        let grantee = resolve(registry, &edge.grantee, || edge.describe())?;
        let args = vec![grantee.to_string()];
        let operation = Operation::call(granting, edge.operation.clone(), args);
        let record = self
            .executor
            .submit(&edge.describe(), &edge.granting, operation)
            .await?;
        Ok(record)
    }
}
