//! End-to-end tests for the configuration pipeline.

mod support;

use std::path::Path;
use std::time::Duration;

use rigging_core::journal::JournalEvent;
use rigging_core::pipeline::{PipelineContext, PipelineOptions};
use rigging_core::prelude::*;
use support::{ScriptedNetwork, addr, key};
use tempfile::TempDir;

const SYSTEM_PLAN: &str = r#"
[[component]]
group = "Core"
name = "Tasks"
depends_on = ["Core#Identity"]

[[component]]
group = "Core"
name = "Identity"

[[wire]]
source = "Core#Tasks"
target = "Core#Identity"

[[grant]]
source = "Core#Identity"
role = "admin"
grantee = "Core#Tasks"
"#;

const FOUR_COMPONENTS: &str = r#"
[[component]]
group = "Core"
name = "A"

[[component]]
group = "Core"
name = "B"

[[component]]
group = "Core"
name = "C"

[[component]]
group = "Core"
name = "D"
"#;

fn context(root: &Path, plan: &str, artifacts: &[&str]) -> PipelineContext {
    let artifact_dir = root.join("artifacts");
    support::write_artifacts(&artifact_dir, artifacts);
    PipelineContext::new(
        support::profile(None, Duration::ZERO),
        root.join("state"),
        SystemPlan::from_toml_str(plan).unwrap(),
        artifact_dir,
    )
}

fn pipeline(context: PipelineContext, network: &ScriptedNetwork) -> ConfigurationPipeline {
    ConfigurationPipeline::new(context, network.shared(), PipelineOptions::default())
}

fn discarding(context: PipelineContext, network: &ScriptedNetwork) -> ConfigurationPipeline {
    let options = PipelineOptions {
        allow_discard: true,
    };
    ConfigurationPipeline::new(context, network.shared(), options)
}

/// Journal a finished run that recorded `keys`.
fn journal_completed_run(context: &PipelineContext, run: &str, keys: &[&str]) {
    let journal = DeploymentJournal::with_run(context.layout().journal_path(), RunId::new(run));
    let mut registry = context.registry_store().load_or_empty().unwrap();
    for (i, k) in keys.iter().enumerate() {
        let address = addr(0x50 + i as u8);
        journal
            .append(JournalEvent::Confirmed {
                description: format!("deploy {k}"),
                target: key(k),
                hash: format!("0x{i}"),
                created: Some(address.clone()),
            })
            .unwrap();
        journal
            .append(JournalEvent::Recorded {
                module_key: key(k),
                address: address.clone(),
            })
            .unwrap();
        registry.put(key(k), address).unwrap();
    }
    journal.append(JournalEvent::RunCompleted).unwrap();
    context.registry_store().persist(&registry).unwrap();
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test(start_paused = true)]
async fn deploy_runs_every_phase_in_order() {
    let temp = TempDir::new().unwrap();
    let network = ScriptedNetwork::new();
    let ctx = context(temp.path(), SYSTEM_PLAN, &["Identity", "Tasks"]);
    let journal_path = ctx.layout().journal_path();

    let report = pipeline(ctx, &network).run(PipelineMode::Deploy).await.unwrap();

    assert!(report.succeeded());
    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(network.deployed_artifacts(), ["Identity", "Tasks"]);
    assert_eq!(network.functions(), ["setIdentityAddress", "grantAdminRole"]);
    assert_eq!(report.deployment.as_ref().unwrap().deployed.len(), 2);
    assert_eq!(report.wiring.len(), 1);
    assert_eq!(report.grants.len(), 1);
    assert_eq!(report.registry_entries, 2);

    let snapshot = DeploymentJournal::open(journal_path).snapshot().unwrap();
    assert!(matches!(
        snapshot.entries.first().unwrap().event,
        JournalEvent::RunStarted { .. }
    ));
    assert_eq!(snapshot.last().unwrap().event, JournalEvent::RunCompleted);
}

#[tokio::test(start_paused = true)]
async fn second_deploy_only_rewires_and_regrants() {
    let temp = TempDir::new().unwrap();
    let network = ScriptedNetwork::new();
    let ctx = context(temp.path(), SYSTEM_PLAN, &["Identity", "Tasks"]);

    pipeline(ctx.clone(), &network).run(PipelineMode::Deploy).await.unwrap();
    let report = pipeline(ctx, &network).run(PipelineMode::Deploy).await.unwrap();

    assert_eq!(report.deployment.unwrap().skipped.len(), 2);
    assert_eq!(network.deployed_artifacts().len(), 2);
    assert_eq!(network.functions().len(), 4);
}

// ============================================================================
// Loading failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn configure_requires_an_existing_registry() {
    let temp = TempDir::new().unwrap();
    let network = ScriptedNetwork::new();
    let ctx = context(temp.path(), SYSTEM_PLAN, &[]);

    let failure = pipeline(ctx, &network)
        .run(PipelineMode::ConfigureOnly)
        .await
        .unwrap_err();

    assert_eq!(failure.phase, PipelineState::Loading);
    assert_eq!(failure.error.kind(), ErrorKind::Configuration);
    assert_eq!(failure.report.state, PipelineState::Failed);
    assert!(network.submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn missing_artifact_aborts_before_any_submission() {
    let temp = TempDir::new().unwrap();
    let network = ScriptedNetwork::new();
    let ctx = context(temp.path(), SYSTEM_PLAN, &["Identity"]);

    let failure = pipeline(ctx, &network).run(PipelineMode::Deploy).await.unwrap_err();

    assert_eq!(failure.phase, PipelineState::Loading);
    assert!(failure.error.to_string().contains("Tasks"));
    assert!(network.submissions().is_empty());
}

// ============================================================================
// Wiring and grant failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn failed_wiring_leaves_the_registry_file_untouched() {
    let temp = TempDir::new().unwrap();
    let network = ScriptedNetwork::new();
    network.reject_function("setBAddress", "caller is not the owner");
    let plan = r#"
[[component]]
group = "Core"
name = "A"

[[component]]
group = "Core"
name = "B"

[[wire]]
source = "Core#A"
setter = "setBAddress"
target = "Core#B"
"#;
    let ctx = context(temp.path(), plan, &[]);
    journal_completed_run(&ctx, "r1", &["Core#A", "Core#B"]);
    let registry_path = ctx.layout().registry_path();
    let before = std::fs::read(&registry_path).unwrap();

    let failure = pipeline(ctx, &network)
        .run(PipelineMode::ConfigureOnly)
        .await
        .unwrap_err();

    assert_eq!(failure.phase, PipelineState::Wiring);
    assert_eq!(failure.error.kind(), ErrorKind::RemoteRejection);
    assert_eq!(network.functions(), ["setBAddress"]);
    assert_eq!(std::fs::read(&registry_path).unwrap(), before);
}

#[tokio::test(start_paused = true)]
async fn grant_to_unrecorded_component_aborts_before_any_submission() {
    let temp = TempDir::new().unwrap();
    let network = ScriptedNetwork::new();
    let plan = r#"
[[component]]
group = "Core"
name = "Identity"

[[component]]
group = "Core"
name = "Ghost"

[[grant]]
source = "Core#Identity"
role = "admin"
grantee = "Core#Ghost"
"#;
    let ctx = context(temp.path(), plan, &[]);
    journal_completed_run(&ctx, "r1", &["Core#Identity"]);

    let failure = pipeline(ctx, &network)
        .run(PipelineMode::ConfigureOnly)
        .await
        .unwrap_err();

    assert_eq!(failure.error.kind(), ErrorKind::DependencyResolution);
    assert_eq!(failure.phase, PipelineState::Granting);
    assert!(network.submissions().is_empty());
}

// ============================================================================
// Resuming after an interrupted run
// ============================================================================

#[tokio::test(start_paused = true)]
async fn interrupted_deployment_is_redeployed_before_continuing() {
    let temp = TempDir::new().unwrap();
    let network = ScriptedNetwork::new();
    let ctx = context(temp.path(), FOUR_COMPONENTS, &["A", "B", "C", "D"]);
    journal_completed_run(&ctx, "r1", &["Core#A", "Core#B"]);

    // Run r2 sent C's deployment and never saw the outcome
    let crashed = DeploymentJournal::with_run(ctx.layout().journal_path(), RunId::new("r2"));
    crashed
        .append(JournalEvent::Prepared {
            description: "deploy C".into(),
            target: key("Core#C"),
            sequence: 2,
        })
        .unwrap();
    crashed
        .append(JournalEvent::Sent {
            description: "deploy C".into(),
            target: key("Core#C"),
            sequence: 2,
            hash: "0xc".into(),
        })
        .unwrap();

    let report = discarding(ctx.clone(), &network)
        .run(PipelineMode::Deploy)
        .await
        .unwrap();

    let discarded = report.discarded.unwrap();
    assert_eq!(discarded.run, Some(RunId::new("r2")));
    assert!(discarded.removed.is_empty());
    assert_eq!(network.deployed_artifacts(), ["C", "D"]);

    let registry = ctx.registry_store().load().unwrap();
    let keys: Vec<&str> = registry.keys().map(|k| k.as_str()).collect();
    assert_eq!(keys, ["Core#A", "Core#B", "Core#C", "Core#D"]);
}

#[tokio::test(start_paused = true)]
async fn entries_recorded_by_the_interrupted_run_are_discarded() {
    let temp = TempDir::new().unwrap();
    let network = ScriptedNetwork::new();
    let ctx = context(temp.path(), FOUR_COMPONENTS, &["A", "B", "C", "D"]);
    journal_completed_run(&ctx, "r1", &["Core#A"]);

    // Run r2 recorded B, then crashed with C in flight
    let crashed = DeploymentJournal::with_run(ctx.layout().journal_path(), RunId::new("r2"));
    let mut registry = ctx.registry_store().load().unwrap();
    registry.put(key("Core#B"), addr(0x99)).unwrap();
    ctx.registry_store().persist(&registry).unwrap();
    crashed
        .append(JournalEvent::Recorded {
            module_key: key("Core#B"),
            address: addr(0x99),
        })
        .unwrap();
    crashed
        .append(JournalEvent::Sent {
            description: "deploy C".into(),
            target: key("Core#C"),
            sequence: 2,
            hash: "0xc".into(),
        })
        .unwrap();

    let report = discarding(ctx.clone(), &network)
        .run(PipelineMode::Deploy)
        .await
        .unwrap();

    let removed: Vec<ModuleKey> = report
        .discarded
        .unwrap()
        .removed
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(removed, [key("Core#B")]);
    assert_eq!(network.deployed_artifacts(), ["B", "C", "D"]);
    let registry = ctx.registry_store().load().unwrap();
    assert_ne!(registry.get(&key("Core#B")), Some(&addr(0x99)));
    assert_eq!(registry.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn deployment_confirmed_before_a_crash_is_recorded_not_redeployed() {
    let temp = TempDir::new().unwrap();
    let network = ScriptedNetwork::new();
    let ctx = context(temp.path(), FOUR_COMPONENTS, &["A", "B", "C", "D"]);

    // Run r1 saw A confirmed and stopped before the registry was written
    let crashed = DeploymentJournal::with_run(ctx.layout().journal_path(), RunId::new("r1"));
    crashed
        .append(JournalEvent::RunStarted {
            network: "local".into(),
            chain_id: 31337,
            mode: "deploy".into(),
        })
        .unwrap();
    crashed
        .append(JournalEvent::Confirmed {
            description: "deploy A".into(),
            target: key("Core#A"),
            hash: "0xa".into(),
            created: Some(addr(0x77)),
        })
        .unwrap();
    assert!(!ctx.registry_store().exists());

    let runner = pipeline(ctx.clone(), &network);
    assert!(runner.inspect().unwrap().clean);
    let report = runner.run(PipelineMode::Deploy).await.unwrap();

    assert_eq!(report.restored, [(key("Core#A"), addr(0x77))]);
    assert!(report.discarded.is_none());
    assert_eq!(network.deployed_artifacts(), ["B", "C", "D"]);
    let registry = ctx.registry_store().load().unwrap();
    assert_eq!(registry.get(&key("Core#A")), Some(&addr(0x77)));
    assert_eq!(registry.len(), 4);

    // Once recorded it is never restored again
    let again = pipeline(ctx, &network).run(PipelineMode::Deploy).await.unwrap();
    assert!(again.restored.is_empty());
    assert_eq!(network.deployed_artifacts().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn interrupted_run_is_not_discarded_without_permission() {
    let temp = TempDir::new().unwrap();
    let network = ScriptedNetwork::new();
    let ctx = context(temp.path(), FOUR_COMPONENTS, &["A", "B", "C", "D"]);
    let crashed = DeploymentJournal::with_run(ctx.layout().journal_path(), RunId::new("r2"));
    crashed
        .append(JournalEvent::Prepared {
            description: "deploy A".into(),
            target: key("Core#A"),
            sequence: 0,
        })
        .unwrap();

    let runner = pipeline(ctx, &network);
    assert!(!runner.inspect().unwrap().clean);
    let failure = runner.run(PipelineMode::Deploy).await.unwrap_err();

    assert_eq!(failure.phase, PipelineState::Reconciled);
    assert!(network.submissions().is_empty());
    // Nothing was changed, so the journal still reports the open operation
    assert!(!runner.inspect().unwrap().clean);
}

#[tokio::test(start_paused = true)]
async fn discarded_run_leaves_a_clean_journal() {
    let temp = TempDir::new().unwrap();
    let network = ScriptedNetwork::new();
    let ctx = context(temp.path(), FOUR_COMPONENTS, &["A", "B", "C", "D"]);
    let crashed = DeploymentJournal::with_run(ctx.layout().journal_path(), RunId::new("r2"));
    crashed
        .append(JournalEvent::Prepared {
            description: "deploy A".into(),
            target: key("Core#A"),
            sequence: 0,
        })
        .unwrap();

    let runner = discarding(ctx, &network);
    runner.run(PipelineMode::Deploy).await.unwrap();

    let reconciliation = runner.inspect().unwrap();
    assert!(reconciliation.clean);
    assert_eq!(reconciliation.action, ReconcileAction::None);
}
