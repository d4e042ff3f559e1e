//! Table and JSON rendering of command results.

use std::path::Path;

use anyhow::Result;
use console::style;

use rigging_core::bulk::BulkReport;
use rigging_core::export::AddressExport;
use rigging_core::prelude::*;

use crate::OutputFormat;

pub(crate) fn print_pipeline(report: &PipelineReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => print_pipeline_table(report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Quiet => {
            if let Some(error) = &report.error {
                eprintln!("{} {}", style("✗").red(), error);
            }
        }
    }
    Ok(())
}

fn print_pipeline_table(report: &PipelineReport) {
    println!(
        "{} {} on {} (chain {}), run {}",
        style("Rigging").bold(),
        report.mode.as_str(),
        style(&report.network).cyan(),
        report.chain_id,
        report.run
    );

    if let Some(discarded) = &report.discarded {
        println!(
            "  {} Discarded interrupted run {}",
            style("⚠").yellow(),
            discarded.run.as_ref().map_or("(unknown)", |r| r.as_str())
        );
        for (key, address) in &discarded.removed {
            println!("    - {:<32} {}", key.as_str(), address);
        }
    }

    for (key, address) in &report.restored {
        println!(
            "  {} Recovered {} at {} from the journal",
            style("↺").cyan(),
            key.as_str(),
            address
        );
    }

    if let Some(deployment) = &report.deployment {
        println!();
        println!("{}", style("Deployment").bold());
        if deployment.deployed.is_empty() {
            println!("  • Nothing to deploy ({} already recorded)", deployment.skipped.len());
        }
        for component in &deployment.deployed {
            println!(
                "  {} {:<32} {}",
                style("✓").green(),
                component.module_key.as_str(),
                component.address
            );
        }
        if deployment.batches.len() > 1 {
            let sizes: Vec<String> = deployment.batches.iter().map(|b| b.to_string()).collect();
            println!("  Batches: {}", sizes.join(" + "));
        }
    }

    print_records("Wiring", &report.wiring);
    print_records("Roles", &report.grants);

    println!();
    match (&report.failed_phase, &report.error) {
        (Some(phase), Some(error)) => {
            println!("{} Failed while {}: {}", style("✗").red().bold(), phase, error);
        }
        _ => println!(
            "{} Done. {} component(s) recorded.",
            style("✓").green().bold(),
            report.registry_entries
        ),
    }
}

fn print_records(title: &str, records: &[TransactionRecord]) {
    if records.is_empty() {
        return;
    }
    println!();
    println!("{}", style(title).bold());
    for record in records {
        match record.status() {
            TransactionStatus::Confirmed => {
                println!("  {} {}", style("✓").green(), record.description())
            }
            TransactionStatus::Failed => println!(
                "  {} {}: {}",
                style("✗").red(),
                record.description(),
                record.failure().unwrap_or("failed")
            ),
            TransactionStatus::Pending => {
                println!("  {} {} (pending)", style("…").yellow(), record.description())
            }
        }
    }
}

pub(crate) fn print_export(export: &AddressExport, out: &Path, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!(
                "✓ Exported {} component(s) for {} to {}",
                export.components.len(),
                export.network,
                out.display()
            );
            for (name, component) in &export.components {
                println!("  {:<24} {}", name, component.address);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "path": out.display().to_string(),
                "network": export.network,
                "chainId": export.chain_id,
                "components": export.components.keys().collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Quiet => {}
    }
    Ok(())
}

pub(crate) struct StatusView<'a> {
    pub layout: &'a StateLayout,
    pub registry: &'a AddressRegistry,
    pub registry_exists: bool,
    pub journal_entries: usize,
    pub torn_tail: bool,
    pub reconciliation: &'a Reconciliation,
    pub format: OutputFormat,
}

pub(crate) fn print_status(view: &StatusView<'_>) -> Result<()> {
    match view.format {
        OutputFormat::Table => print_status_table(view),
        OutputFormat::Json => {
            let output = serde_json::json!({
                "network": view.layout.network(),
                "chainId": view.layout.chain_id(),
                "stateDir": view.layout.network_dir().display().to_string(),
                "addresses": view.registry,
                "journal": {
                    "entries": view.journal_entries,
                    "tornTail": view.torn_tail,
                    "reconciliation": view.reconciliation,
                },
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Quiet => {
            if !view.reconciliation.clean {
                eprintln!("Previous run was interrupted; the next run must discard its state");
            }
        }
    }
    Ok(())
}

fn print_status_table(view: &StatusView<'_>) {
    println!(
        "{} {} (chain {})",
        style("Network").bold(),
        style(view.layout.network()).cyan(),
        view.layout.chain_id()
    );
    println!("  State: {}", view.layout.network_dir().display());

    println!();
    if !view.registry_exists {
        println!("No deployment recorded yet.");
        println!("Deploy with: rigging deploy --network {}", view.layout.network());
    } else if view.registry.is_empty() {
        println!("Registry is empty.");
    } else {
        println!("{:<32} Address", "Component");
        println!("{}", "-".repeat(76));
        for (key, address) in view.registry.iter() {
            println!("{:<32} {}", key.as_str(), address);
        }
    }

    println!();
    match &view.reconciliation.action {
        ReconcileAction::None => println!(
            "{} Journal clean ({} entries)",
            style("✓").green(),
            view.journal_entries
        ),
        ReconcileAction::DiscardPartialState {
            run,
            open_operation,
            recorded,
        } => {
            println!(
                "{} Run {} was interrupted during '{}'",
                style("⚠").yellow(),
                run.as_ref().map_or("(unknown)", |r| r.as_str()),
                open_operation.as_deref().unwrap_or("a torn journal write")
            );
            println!(
                "  {} recorded address(es) will be discarded on the next run",
                recorded.len()
            );
        }
    }
}

pub(crate) fn print_bulk(report: &BulkReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            for record in &report.applied {
                println!("{} {}", style("✓").green(), record.description());
            }
            for skipped in &report.skipped {
                println!(
                    "• line {}: {} for {} ({})",
                    skipped.line, skipped.change, skipped.address, skipped.reason
                );
            }
            for issue in &report.invalid {
                println!("{} line {}: {}", style("⚠").yellow(), issue.line, issue.reason);
            }
            println!(
                "{} applied, {} skipped, {} invalid row(s)",
                report.applied.len(),
                report.skipped.len(),
                report.invalid.len()
            );
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Quiet => {
            for issue in &report.invalid {
                eprintln!("line {}: {}", issue.line, issue.reason);
            }
        }
    }
    Ok(())
}
