//! Rigging - deploy and wire interdependent networked components
//!
//! Usage:
//!   rigging deploy                 # Deploy missing components, wire, grant
//!   rigging configure              # Wire and grant an existing deployment
//!   rigging export --out app.json  # Addresses + interfaces for consumers
//!   rigging status                 # Registry entries and journal health
//!   rigging bulk grant-roles ...   # CSV-driven role grants

mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rigging_core::artifact::ArtifactStore;
use rigging_core::bulk::{self, BulkRunner};
use rigging_core::executor::ExecutorSettings;
use rigging_core::export::AddressExport;
use rigging_core::pipeline::{PipelineContext, PipelineOptions};
use rigging_core::prelude::*;

#[derive(Parser)]
#[command(name = "rigging")]
#[command(about = "Deploy and wire interdependent networked components", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct GlobalArgs {
    /// Network profile (local, devnet, testnet, mainnet or one from rigging.toml)
    #[arg(long, short = 'n', global = true, default_value = "local")]
    network: String,

    /// Override the profile's chain id
    #[arg(long, global = true)]
    chain_id: Option<u64>,

    /// Profile overrides file
    #[arg(long, global = true, default_value = "rigging.toml")]
    config: PathBuf,

    /// State directory (defaults to the platform state dir)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Deployment plan
    #[arg(long, global = true, default_value = "rigging-plan.toml")]
    plan: PathBuf,

    /// Directory holding `<artifact>.json` build artifacts
    #[arg(long, global = true, default_value = "artifacts")]
    artifacts: PathBuf,

    /// Output format
    #[arg(short = 'o', long, global = true, default_value = "table")]
    format: OutputFormat,

    /// Skip confirmation prompts (for CI/CD)
    #[arg(short = 'y', long, global = true)]
    yes: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy missing components, then wire dependencies and grant roles
    Deploy,

    /// Wire dependencies and grant roles on an already deployed system
    Configure,

    /// Write recorded addresses and interfaces for a consuming application
    Export {
        /// Output file
        #[arg(long, default_value = "rigging-addresses.json")]
        out: PathBuf,
    },

    /// Show recorded addresses and whether the last run finished cleanly
    Status,

    /// CSV-driven bulk operations against one component
    Bulk(BulkArgs),
}

#[derive(Args)]
struct BulkArgs {
    #[command(subcommand)]
    command: BulkSubcommand,
}

#[derive(Subcommand)]
enum BulkSubcommand {
    /// Grant roles listed as `address,<role>...` columns
    GrantRoles {
        /// CSV file
        csv: PathBuf,

        /// Component to call: `<Group>#<Name>` or a component name from the plan
        #[arg(long, short)]
        component: String,
    },

    /// Apply signed attribute deltas listed as `address,<attribute>...` columns
    Adjust {
        /// CSV file
        csv: PathBuf,

        /// Component to call: `<Group>#<Name>` or a component name from the plan
        #[arg(long, short)]
        component: String,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub(crate) enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
    /// Only errors
    Quiet,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rigging=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_cli(cli))
}

async fn run_cli(cli: Cli) -> Result<()> {
    let global = cli.global;
    match cli.command {
        Commands::Deploy => run_pipeline(&global, PipelineMode::Deploy).await,
        Commands::Configure => run_pipeline(&global, PipelineMode::ConfigureOnly).await,
        Commands::Export { out } => run_export(&global, &out),
        Commands::Status => run_status(&global),
        Commands::Bulk(args) => run_bulk(&global, args.command).await,
    }
}

fn load_profile(global: &GlobalArgs) -> Result<NetworkProfile> {
    let profiles = ProfileSet::load(Some(global.config.as_path()))?;
    Ok(profiles.resolve(&global.network, global.chain_id)?)
}

fn state_root(global: &GlobalArgs) -> Result<PathBuf> {
    match &global.state_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(StateLayout::default_root()?),
    }
}

fn state_layout(global: &GlobalArgs, profile: &NetworkProfile) -> Result<StateLayout> {
    Ok(StateLayout::new(
        state_root(global)?,
        profile.name.clone(),
        profile.chain_id,
    ))
}

fn connect(profile: &NetworkProfile) -> Result<Arc<dyn ComponentNetwork>> {
    let gateway = profile.gateway.clone().ok_or_else(|| {
        OrchestrationError::configuration(format!(
            "Profile '{}' has no gateway; set [profiles.{}].gateway in rigging.toml",
            profile.name, profile.name
        ))
    })?;
    tracing::debug!(network = %profile.name, %gateway, "Connecting to gateway");
    Ok(Arc::new(RpcNetwork::new(gateway)?))
}

/// Ask before discarding an interrupted run. `--yes` answers for the user.
fn confirm_discard(reconciliation: &Reconciliation, yes: bool) -> Result<bool> {
    let ReconcileAction::DiscardPartialState {
        run,
        open_operation,
        recorded,
    } = &reconciliation.action
    else {
        return Ok(true);
    };

    eprintln!(
        "{} Previous run {} stopped with '{}' in flight",
        style("⚠").yellow(),
        run.as_ref().map_or("(unknown)", |r| r.as_str()),
        open_operation.as_deref().unwrap_or("a torn journal line"),
    );
    if !recorded.is_empty() {
        eprintln!("  Its {} recorded address(es) will be discarded and redone:", recorded.len());
        for key in recorded {
            eprintln!("    {}", key);
        }
    }

    if yes {
        return Ok(true);
    }
    if !console::Term::stderr().is_term() {
        anyhow::bail!("Refusing to discard without confirmation; rerun with --yes");
    }
    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Discard the interrupted run and continue?")
        .default(false)
        .interact()?;
    Ok(confirmed)
}

async fn run_pipeline(global: &GlobalArgs, mode: PipelineMode) -> Result<()> {
    let profile = load_profile(global)?;
    let network = connect(&profile)?;
    let plan = SystemPlan::load(&global.plan)?;
    let root = state_root(global)?;
    let context = PipelineContext::new(profile, root, plan, global.artifacts.clone());

    let probe = ConfigurationPipeline::new(
        context.clone(),
        Arc::clone(&network),
        PipelineOptions::default(),
    );
    let reconciliation = probe.inspect()?;
    let allow_discard = !reconciliation.clean && confirm_discard(&reconciliation, global.yes)?;
    if !reconciliation.clean && !allow_discard {
        println!("Cancelled; nothing was submitted.");
        return Ok(());
    }

    let pipeline = ConfigurationPipeline::new(context, network, PipelineOptions { allow_discard });
    match pipeline.run(mode).await {
        Ok(report) => output::print_pipeline(&report, global.format),
        Err(failure) => {
            output::print_pipeline(&failure.report, global.format)?;
            Err(failure.into())
        }
    }
}

fn run_export(global: &GlobalArgs, out: &Path) -> Result<()> {
    let profile = load_profile(global)?;
    let layout = state_layout(global, &profile)?;
    let registry = RegistryStore::new(layout.registry_path()).load()?;

    // Without a plan, artifacts are looked up by component name
    let plan = if global.plan.exists() {
        Some(SystemPlan::load(&global.plan)?)
    } else {
        None
    };
    let artifacts = ArtifactStore::new(global.artifacts.clone());

    let export = AddressExport::build(
        &profile.name,
        profile.chain_id,
        &registry,
        plan.as_ref(),
        &artifacts,
    )?;
    export.write(out)?;
    output::print_export(&export, out, global.format)
}

fn run_status(global: &GlobalArgs) -> Result<()> {
    let profile = load_profile(global)?;
    let layout = state_layout(global, &profile)?;
    let store = RegistryStore::new(layout.registry_path());
    let registry = store.load_or_empty()?;
    let snapshot = DeploymentJournal::open(layout.journal_path()).snapshot()?;
    let reconciliation = NonceReconciler::reconcile(&snapshot);

    output::print_status(&output::StatusView {
        layout: &layout,
        registry: &registry,
        registry_exists: store.exists(),
        journal_entries: snapshot.entries.len(),
        torn_tail: snapshot.torn_tail,
        reconciliation: &reconciliation,
        format: global.format,
    })?;

    if !reconciliation.clean && matches!(global.format, OutputFormat::Quiet) {
        std::process::exit(1);
    }
    Ok(())
}

/// Resolve `Group#Name`, or a bare component name through the plan.
fn resolve_component(name: &str, plan_path: &Path) -> Result<ModuleKey> {
    if name.contains('#') {
        return Ok(ModuleKey::parse(name)?);
    }
    let plan = SystemPlan::load(plan_path)?;
    plan.component_named(name)
        .map(|c| c.module_key.clone())
        .ok_or_else(|| anyhow::anyhow!("No component named '{}' in {}", name, plan_path.display()))
}

async fn run_bulk(global: &GlobalArgs, command: BulkSubcommand) -> Result<()> {
    let (csv, component, mode) = match &command {
        BulkSubcommand::GrantRoles { csv, component } => (csv, component, "bulk-grant-roles"),
        BulkSubcommand::Adjust { csv, component } => (csv, component, "bulk-adjust"),
    };
    let component = resolve_component(component, &global.plan)?;
    let table = bulk::read_csv(csv)?;

    let profile = load_profile(global)?;
    let network = connect(&profile)?;
    let layout = state_layout(global, &profile)?;
    let store = RegistryStore::new(layout.registry_path());
    let mut registry = store.load()?;

    let journal = DeploymentJournal::open(layout.journal_path());
    let reconciliation = NonceReconciler::reconcile(&journal.snapshot()?);
    if !reconciliation.clean {
        if !confirm_discard(&reconciliation, global.yes)? {
            println!("Cancelled; nothing was submitted.");
            return Ok(());
        }
        NonceReconciler::discard(&reconciliation, &journal, &mut registry, &store)?;
    }
    NonceReconciler::restore(&journal.snapshot()?, &journal, &mut registry, &store)?;

    journal.append(JournalEvent::RunStarted {
        network: profile.name.clone(),
        chain_id: profile.chain_id,
        mode: mode.to_string(),
    })?;
    let settings = ExecutorSettings::from_profile(&profile)?;
    let mut executor = TransactionExecutor::new(network, journal, settings);

    let mut runner = BulkRunner::new(&mut executor, &registry, component)?;
    let outcome = match command {
        BulkSubcommand::GrantRoles { .. } => runner.grant_roles(bulk::role_requests(&table)?).await,
        BulkSubcommand::Adjust { .. } => runner.adjust(bulk::adjustment_requests(&table)?).await,
    };

    match outcome {
        Ok(report) => {
            executor.journal().append(JournalEvent::RunCompleted)?;
            output::print_bulk(&report, global.format)
        }
        Err(failure) => {
            output::print_bulk(&failure.report, global.format)?;
            Err(failure.into())
        }
    }
}
