//! CSV-driven bulk operations against one deployed component.
//!
//! Two file shapes are supported:
//! - role grants: `address,<role>,<role>...` where `true`/`1`/`yes` requests a grant
//! - adjustments: `address,<attribute>...` with signed integer deltas
//!
//! Invalid rows are reported and skipped. Every remaining change is one
//! executor submission, in file order.

pub mod csv;

use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use thiserror::Error;

use crate::error::OrchestrationError;
use crate::executor::{TransactionExecutor, TransactionRecord};
use crate::network::Operation;
use crate::registry::AddressRegistry;
use crate::types::{Address, ModuleKey, capitalize, grant_operation, has_role_query};
use self::csv::{CsvRow, CsvTable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowIssue {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrantRequest {
    pub line: usize,
    pub address: Address,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentRequest {
    pub line: usize,
    pub address: Address,
    /// Attribute and signed delta; zero deltas are never included
    pub changes: Vec<(String, i64)>,
}

/// Validated rows of a bulk file plus the rows that were rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkInput<T> {
    pub requests: Vec<T>,
    pub invalid: Vec<RowIssue>,
}

pub fn read_csv(path: &Path) -> Result<CsvTable, OrchestrationError> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read CSV file: {}", path.display()))
        .map_err(|e| OrchestrationError::Configuration(format!("{e:#}")))?;
    CsvTable::parse(&content)
}

fn check_address_header(table: &CsvTable) -> Result<(), OrchestrationError> {
    match table.headers.first() {
        Some(first) if first.eq_ignore_ascii_case("address") && table.headers.len() > 1 => Ok(()),
        _ => Err(OrchestrationError::configuration(
            "CSV header must be 'address' followed by at least one column",
        )),
    }
}

fn row_address(table: &CsvTable, row: &CsvRow) -> Result<Address, String> {
    if row.cells.len() != table.headers.len() {
        return Err(format!(
            "expected {} cells, found {}",
            table.headers.len(),
            row.cells.len()
        ));
    }
    let address = Address::parse(&row.cells[0]).map_err(|e| e.to_string())?;
    if address.is_zero() {
        return Err("zero address".to_string());
    }
    Ok(address)
}

fn parse_flag(cell: &str) -> Option<bool> {
    match cell.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Some(true),
        "" | "false" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

pub fn role_requests(
    table: &CsvTable,
) -> Result<BulkInput<RoleGrantRequest>, OrchestrationError> {
    check_address_header(table)?;
    let mut input = BulkInput {
        requests: Vec::new(),
        invalid: Vec::new(),
    };
    for row in &table.rows {
        match role_row(table, row) {
            Ok(request) => input.requests.push(request),
            Err(reason) => input.invalid.push(RowIssue {
                line: row.line,
                reason,
            }),
        }
    }
    Ok(input)
}

fn role_row(table: &CsvTable, row: &CsvRow) -> Result<RoleGrantRequest, String> {
    let address = row_address(table, row)?;
    let mut roles = Vec::new();
    for (role, cell) in table.headers[1..].iter().zip(&row.cells[1..]) {
        match parse_flag(cell) {
            Some(true) => roles.push(role.clone()),
            Some(false) => {}
            None => return Err(format!("'{cell}' is not a yes/no value for {role}")),
        }
    }
    if roles.is_empty() {
        return Err("no role requested".to_string());
    }
    Ok(RoleGrantRequest {
        line: row.line,
        address,
        roles,
    })
}

pub fn adjustment_requests(
    table: &CsvTable,
) -> Result<BulkInput<AdjustmentRequest>, OrchestrationError> {
    check_address_header(table)?;
    let mut input = BulkInput {
        requests: Vec::new(),
        invalid: Vec::new(),
    };
    for row in &table.rows {
        match adjustment_row(table, row) {
            Ok(request) => input.requests.push(request),
            Err(reason) => input.invalid.push(RowIssue {
                line: row.line,
                reason,
            }),
        }
    }
    Ok(input)
}

fn adjustment_row(table: &CsvTable, row: &CsvRow) -> Result<AdjustmentRequest, String> {
    let address = row_address(table, row)?;
    let mut changes = Vec::new();
    for (attribute, cell) in table.headers[1..].iter().zip(&row.cells[1..]) {
        if cell.is_empty() {
            continue;
        }
        let delta: i64 = cell
            .parse()
            .map_err(|_| format!("'{cell}' is not an integer for {attribute}"))?;
        if delta != 0 {
            changes.push((attribute.clone(), delta));
        }
    }
    if changes.is_empty() {
        return Err("no change requested".to_string());
    }
    Ok(AdjustmentRequest {
        line: row.line,
        address,
        changes,
    })
}

/// Operation for one attribute change: `increase<Attr>` or `decrease<Attr>`.
pub fn adjustment_operation(
    target: Address,
    attribute: &str,
    delta: i64,
    account: &Address,
) -> Operation {
    let capitalized = capitalize(attribute);
    let function = if delta > 0 {
        format!("increase{capitalized}")
    } else {
        format!("decrease{capitalized}")
    };
    Operation::call(
        target,
        function,
        vec![account.to_string(), delta.unsigned_abs().to_string()],
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedChange {
    pub line: usize,
    pub address: Address,
    pub change: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReport {
    pub applied: Vec<TransactionRecord>,
    pub skipped: Vec<SkippedChange>,
    pub invalid: Vec<RowIssue>,
}

/// A bulk run stopped by a failed submission; `report` holds what was done.
#[derive(Debug, Error)]
#[error("bulk operation stopped at line {line}: {error}")]
pub struct BulkFailure {
    pub line: usize,
    #[source]
    pub error: OrchestrationError,
    pub report: Box<BulkReport>,
}

pub struct BulkRunner<'a> {
    executor: &'a mut TransactionExecutor,
    component: ModuleKey,
    target: Address,
}

impl<'a> BulkRunner<'a> {
    /// Runner against `component`, whose address must be recorded.
    pub fn new(
        executor: &'a mut TransactionExecutor,
        registry: &AddressRegistry,
        component: ModuleKey,
    ) -> Result<Self, OrchestrationError> {
        let target = registry.get(&component).cloned().ok_or_else(|| {
            OrchestrationError::DependencyResolution {
                edge: format!("bulk operations on {component}"),
                missing: component.clone(),
            }
        })?;
        Ok(Self {
            executor,
            component,
            target,
        })
    }

    pub async fn grant_roles(
        &mut self,
        input: BulkInput<RoleGrantRequest>,
    ) -> Result<BulkReport, BulkFailure> {
        let mut report = BulkReport {
            invalid: input.invalid,
            ..BulkReport::default()
        };
        for request in &input.requests {
            for role in &request.roles {
                let line = request.line;
                match self.holds_role(role, &request.address).await {
                    Ok(true) => {
                        tracing::info!(
                            line,
                            address = %request.address,
                            role = %role,
                            "Role already held"
                        );
                        report.skipped.push(SkippedChange {
                            line,
                            address: request.address.clone(),
                            change: format!("grant {role}"),
                            reason: "already held".to_string(),
                        });
                        continue;
                    }
                    Ok(false) => {}
                    Err(error) => return Err(stop(line, error, report)),
                }

                let description = format!("grant {} role to {}", role, request.address);
                let operation = Operation::call(
                    self.target.clone(),
                    grant_operation(role),
                    vec![request.address.to_string()],
                );
                match self.executor.submit(&description, &self.component, operation).await {
                    Ok(record) => report.applied.push(record),
                    Err(err) => return Err(stop(line, err.into(), report)),
                }
            }
        }
        Ok(report)
    }

    pub async fn adjust(
        &mut self,
        input: BulkInput<AdjustmentRequest>,
    ) -> Result<BulkReport, BulkFailure> {
        let mut report = BulkReport {
            invalid: input.invalid,
            ..BulkReport::default()
        };
        for request in &input.requests {
            for (attribute, delta) in &request.changes {
                let description =
                    format!("adjust {} of {} by {:+}", attribute, request.address, delta);
                let operation =
                    adjustment_operation(self.target.clone(), attribute, *delta, &request.address);
                match self.executor.submit(&description, &self.component, operation).await {
                    Ok(record) => report.applied.push(record),
                    Err(err) => return Err(stop(request.line, err.into(), report)),
                }
            }
        }
        Ok(report)
    }

    async fn holds_role(&self, role: &str, account: &Address) -> Result<bool, OrchestrationError> {
        let value = self
            .executor
            .network()
            .query(&self.target, &has_role_query(role), &[account.to_string()])
            .await?;
        value.as_bool().ok_or_else(|| {
            OrchestrationError::RemoteRejection(format!(
                "{} returned {} instead of a boolean",
                has_role_query(role),
                value
            ))
        })
    }
}

fn stop(line: usize, error: OrchestrationError, report: BulkReport) -> BulkFailure {
    tracing::error!(line, "Bulk operation failed: {}", error);
    BulkFailure {
        line,
        error,
        report: Box::new(report),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "0x00000000000000000000000000000000000000a1";

    #[test]
    fn role_rows_are_validated() {
        let table = CsvTable::parse(&format!(
            "address,admin,reviewer\n{ALICE},yes,\nnot-an-address,yes,yes\n{ALICE},no,0\n{ALICE},maybe,yes\n"
        ))
        .unwrap();
        let input = role_requests(&table).unwrap();
        assert_eq!(input.requests.len(), 1);
        assert_eq!(input.requests[0].roles, ["admin"]);
        let lines: Vec<usize> = input.invalid.iter().map(|i| i.line).collect();
        assert_eq!(lines, [3, 4, 5]);
        assert!(input.invalid[1].reason.contains("no role"));
    }

    #[test]
    fn adjustments_skip_zero_and_empty_cells() {
        let table =
            CsvTable::parse(&format!("address,reputation,karma\n{ALICE},-5,0\n{ALICE},,\n"))
                .unwrap();
        let input = adjustment_requests(&table).unwrap();
        assert_eq!(input.requests[0].changes, [("reputation".to_string(), -5)]);
        assert_eq!(input.invalid.len(), 1);
    }

    #[test]
    fn header_must_start_with_address() {
        let table = CsvTable::parse("wallet,admin\n").unwrap();
        assert!(role_requests(&table).is_err());
    }

    #[test]
    fn adjustment_direction_picks_the_operation() {
        let account = Address::parse(ALICE).unwrap();
        let target = Address::parse("0x00000000000000000000000000000000000000c1").unwrap();
        match adjustment_operation(target, "reputation", -7, &account) {
            Operation::Call { function, args, .. } => {
                assert_eq!(function, "decreaseReputation");
                assert_eq!(args[1], "7");
            }
            other => panic!("unexpected operation: {other:?}"),
        }
    }
}
