//! Phaseflow - phase-gated workflow client.
//!
//! Shows where a client project stands in its phase chain and drives
//! transitions against the workflow API.

#![allow(clippy::single_match_else)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use phaseflow::core::{Config, FileSessionStore, SessionStore};
use phaseflow::workflow::{
    evaluate, unmet_criteria, PhaseId, PhaseKind, PhaseSnapshot, UiUxSnapshot,
    WorkflowCoordinator, WorkflowError,
};

/// Phase-gated workflow client for client projects
#[derive(Parser)]
#[command(name = "phaseflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the default lookup
    #[arg(short, long, global = true, env = "PHASEFLOW_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the phase table for a project
    Status {
        /// Project ID
        project: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Complete the active phase and move to the next one
    ///
    /// The active phase's completion criteria are checked first, from a
    /// snapshot file or, for a UI/UX phase, from the API's deliverables.
    Advance {
        /// Project ID
        project: String,

        /// Snapshot JSON file for the active phase
        snapshot: Option<PathBuf>,

        /// Evaluate a UI/UX phase from the deliverables the API reports
        #[arg(long, conflicts_with = "snapshot")]
        fetch: bool,

        /// Skip the completion check
        #[arg(long, conflicts_with_all = ["snapshot", "fetch"])]
        force: bool,
    },

    /// Move back to the previous phase
    Back {
        /// Project ID
        project: String,
    },

    /// Jump to a phase
    Goto {
        /// Project ID
        project: String,

        /// Phase ID
        phase: String,
    },

    /// Check a phase's completion criteria
    Check {
        /// Phase type (ui-ux, development, testing), or a phase ID with --fetch
        phase: String,

        /// Snapshot JSON file
        snapshot: Option<PathBuf>,

        /// Evaluate a UI/UX phase from the deliverables of this project
        #[arg(long, conflicts_with = "snapshot")]
        fetch: Option<String>,
    },

    /// Show a phase's details and deliverables
    Phase {
        /// Project ID
        project: String,

        /// Phase ID
        phase: String,
    },

    /// Phase approvals
    Approval {
        #[command(subcommand)]
        operation: ApprovalOperation,
    },

    /// List the configured phases
    Phases,

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ApprovalOperation {
    /// Ask reviewers to approve a phase
    Request {
        /// Project ID
        project: String,

        /// Phase ID
        phase: String,

        /// Note for reviewers
        #[arg(short, long)]
        comment: Option<String>,
    },

    /// Approve a phase
    Approve {
        /// Project ID
        project: String,

        /// Phase ID
        phase: String,

        /// Approval note
        #[arg(short, long)]
        comment: Option<String>,
    },

    /// Reject a phase
    Reject {
        /// Project ID
        project: String,

        /// Phase ID
        phase: String,

        /// Why the phase is rejected
        #[arg(short, long)]
        reason: Option<String>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Commands::Status { project, json } => cmd_status(config_path, &project, json),
        Commands::Advance { project, snapshot, fetch, force } => {
            cmd_advance(config_path, &project, snapshot.as_deref(), fetch, force)
        }
        Commands::Back { project } => cmd_back(config_path, &project),
        Commands::Goto { project, phase } => cmd_goto(config_path, &project, &phase),
        Commands::Check { phase, snapshot, fetch } => {
            cmd_check(config_path, &phase, snapshot.as_deref(), fetch.as_deref())
        }
        Commands::Phase { project, phase } => cmd_phase(config_path, &project, &phase),
        Commands::Approval { operation } => cmd_approval(config_path, operation),
        Commands::Phases => cmd_phases(config_path),
        Commands::Config { path } => cmd_config(config_path, path),
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
    };

    // The relay already printed the banner for this one
    if result.as_ref().is_err_and(|e| e.is::<AlreadyReported>()) {
        std::process::exit(1);
    }
    result
}

/// An error the notification relay has already shown.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct AlreadyReported(WorkflowError);

/// Convert a coordinator error, marking the ones the relay reports.
fn reported(error: WorkflowError) -> anyhow::Error {
    match error {
        e @ WorkflowError::Transition { .. } => AlreadyReported(e).into(),
        e => e.into(),
    }
}

/// Load the configuration, honouring `--config`.
fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load_with(path).context("Failed to load configuration")
}

fn session_store(config: &Config) -> Option<FileSessionStore> {
    if !config.session.remember_phase {
        return None;
    }
    config.session_path().map(FileSessionStore::new)
}

/// Build a coordinator for `project` without loading its status.
fn coordinator(config: &Config, project: &str) -> Result<WorkflowCoordinator> {
    let chain = config.phase_chain()?;
    let gateway = Arc::new(config.gateway()?);
    Ok(WorkflowCoordinator::new(project, chain, gateway, config.relay())
        .with_options(config.coordinator_options()))
}

/// Build a coordinator and load the project's workflow status.
///
/// The phase remembered from the last run is requested when session memory
/// is on.
async fn open(config: &Config, project: &str) -> Result<WorkflowCoordinator> {
    let coordinator = coordinator(config, project)?;

    let remembered = session_store(config).and_then(|store| match store.load(project) {
        Ok(phase) => phase,
        Err(e) => {
            tracing::warn!(project, error = %e, "Ignoring unreadable session");
            None
        }
    });

    match coordinator.initialize_at(remembered.as_ref()).await {
        Ok(_) => Ok(coordinator),
        Err(e @ WorkflowError::Load { .. }) => Err(anyhow::anyhow!(
            "{}\nCould not load the workflow for '{}'. Check that the API at {} is reachable and retry.",
            e.user_message(&e.to_string()),
            project,
            config.api.base_url
        )),
        Err(e) => Err(e.into()),
    }
}

/// Remember the active phase for the next run.
fn remember(config: &Config, coordinator: &WorkflowCoordinator) {
    let (Some(store), Some(state)) = (session_store(config), coordinator.state()) else {
        return;
    };
    if let Err(e) = store.save(coordinator.project_id(), &state.active_phase_id) {
        tracing::warn!(project = coordinator.project_id(), error = %e, "Failed to save session");
    }
}

fn print_phase_table(coordinator: &WorkflowCoordinator) {
    println!("Project: {}", coordinator.project_id());
    println!();
    for (i, row) in coordinator.accessible_phases().iter().enumerate() {
        let marker = if row.active { ">" } else { " " };
        let status = if row.completed {
            "completed"
        } else if row.accessible {
            "open"
        } else {
            "locked"
        };
        println!("{} {}. {:<16} {:<24} {}", marker, i + 1, row.phase.id, row.phase.label, status);
    }
    if coordinator.is_finished() {
        println!();
        println!("All phases are complete.");
    }
}

/// Handle the status command.
fn cmd_status(config_path: Option<&Path>, project: &str, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let coordinator = open(&config, project).await?;
        remember(&config, &coordinator);

        if json {
            let state = coordinator.state();
            let output = serde_json::json!({
                "state": state,
                "finished": coordinator.is_finished(),
                "phases": coordinator.accessible_phases(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_phase_table(&coordinator);
        }
        Ok(())
    })
}

/// Handle the advance command.
///
/// Nothing is written to the API unless the active phase meets its
/// completion criteria or `--force` is given.
fn cmd_advance(
    config_path: Option<&Path>,
    project: &str,
    snapshot: Option<&Path>,
    fetch: bool,
    force: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let coordinator = open(&config, project).await?;
        if coordinator.is_finished() {
            println!("All phases are complete.");
            return Ok(());
        }

        let active = coordinator
            .state()
            .and_then(|s| coordinator.chain().get(&s.active_phase_id).cloned())
            .ok_or_else(|| WorkflowError::NotInitialized(project.to_string()))?;

        if force {
            tracing::info!(project, phase = %active.id, "Completion check skipped");
        } else {
            let snapshot = match (snapshot, fetch) {
                (Some(path), _) => read_snapshot(path, active.kind.slug())?,
                (None, true) if active.kind == PhaseKind::UiUx => {
                    let deliverables = coordinator.phase_deliverables(&active.id).await?;
                    PhaseSnapshot::UiUx(UiUxSnapshot { deliverables })
                }
                (None, true) => {
                    anyhow::bail!("--fetch only supports UI/UX phases; '{}' is {}", active.id, active.kind)
                }
                (None, false) => anyhow::bail!(
                    "{} has completion criteria. Provide a snapshot file, --fetch for a UI/UX phase, or --force",
                    active.label
                ),
            };

            if !print_verdict(&snapshot) {
                anyhow::bail!("{} is not ready to advance", active.label);
            }
        }

        let result = coordinator.advance().await;
        coordinator.flush_notifications().await;
        result.map_err(reported)?;
        remember(&config, &coordinator);
        Ok(())
    })
}

/// Handle the back command.
fn cmd_back(config_path: Option<&Path>, project: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let coordinator = open(&config, project).await?;
        let result = coordinator.retreat().await;
        coordinator.flush_notifications().await;
        result.map_err(reported)?;
        remember(&config, &coordinator);
        Ok(())
    })
}

/// Handle the goto command.
///
/// A locked phase is not an error here: the view moves to the first
/// incomplete phase, as it would when browsing.
fn cmd_goto(config_path: Option<&Path>, project: &str, phase: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let coordinator = open(&config, project).await?;
        let result = coordinator.go_to(&PhaseId::new(phase)).await;
        coordinator.flush_notifications().await;
        match result {
            Ok(_) | Err(WorkflowError::AccessDenied { .. }) => {}
            Err(e) => return Err(reported(e)),
        }
        remember(&config, &coordinator);
        print_phase_table(&coordinator);
        Ok(())
    })
}

/// Handle the check command.
fn cmd_check(
    config_path: Option<&Path>,
    phase: &str,
    snapshot: Option<&Path>,
    fetch: Option<&str>,
) -> Result<()> {
    let snapshot = match (snapshot, fetch) {
        (Some(path), _) => read_snapshot(path, phase)?,
        (None, Some(project)) => fetch_snapshot(config_path, project, phase)?,
        (None, None) => anyhow::bail!("Provide a snapshot file or --fetch <project>"),
    };

    if print_verdict(&snapshot) {
        return Ok(());
    }
    anyhow::bail!("{} unmet criteria", unmet_criteria(&snapshot).len())
}

/// Read a snapshot file for a phase type.
fn read_snapshot(path: &Path, phase_type: &str) -> Result<PhaseSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;
    Ok(PhaseSnapshot::from_json(phase_type, &value)?)
}

/// Print whether a snapshot is ready, listing unmet criteria. Returns the verdict.
fn print_verdict(snapshot: &PhaseSnapshot) -> bool {
    let label = snapshot.kind().label();
    if evaluate(snapshot) {
        println!("✓ {label} phase is ready to advance");
        return true;
    }

    println!("✗ {label} phase is not ready");
    for item in unmet_criteria(snapshot) {
        println!("  - {item}");
    }
    false
}

/// Build a UI/UX snapshot from the deliverables the backend reports.
fn fetch_snapshot(config_path: Option<&Path>, project: &str, phase: &str) -> Result<PhaseSnapshot> {
    let config = load_config(config_path)?;
    let coordinator = coordinator(&config, project)?;
    let phase_id = PhaseId::new(phase);

    let kind = coordinator
        .chain()
        .get(&phase_id)
        .map(|p| p.kind)
        .ok_or_else(|| WorkflowError::PhaseNotFound(phase.to_string()))?;
    if kind != PhaseKind::UiUx {
        anyhow::bail!("--fetch only supports UI/UX phases; '{phase}' is {kind}");
    }

    let rt = tokio::runtime::Runtime::new()?;
    let deliverables = rt.block_on(coordinator.phase_deliverables(&phase_id))?;
    Ok(PhaseSnapshot::UiUx(UiUxSnapshot { deliverables }))
}

/// Handle the phase command.
fn cmd_phase(config_path: Option<&Path>, project: &str, phase: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let coordinator = coordinator(&config, project)?;
    let phase_id = PhaseId::new(phase);
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let details = coordinator.phase_details(&phase_id).await?;
        let deliverables = coordinator.phase_deliverables(&phase_id).await?;

        let label = details
            .label
            .clone()
            .or_else(|| coordinator.chain().get(&phase_id).map(|p| p.label.clone()))
            .unwrap_or_else(|| phase.to_string());
        println!("{label} ({phase})");
        if let Some(status) = &details.status {
            println!("  Status:    {status}");
        }
        if let Some(started) = &details.started_at {
            println!("  Started:   {started}");
        }
        if let Some(completed) = &details.completed_at {
            println!("  Completed: {completed}");
        }

        println!();
        if deliverables.is_empty() {
            println!("No deliverables.");
        } else {
            println!("Deliverables:");
            for d in &deliverables {
                println!("  - {:<32} {}", d.name, d.status);
            }
        }
        Ok(())
    })
}

/// Handle approval commands.
fn cmd_approval(config_path: Option<&Path>, operation: ApprovalOperation) -> Result<()> {
    let config = load_config(config_path)?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let (coordinator, result) = match operation {
            ApprovalOperation::Request { project, phase, comment } => {
                let coordinator = coordinator(&config, &project)?;
                let result =
                    coordinator.request_approval(&PhaseId::new(phase), comment.as_deref()).await;
                (coordinator, result)
            }
            ApprovalOperation::Approve { project, phase, comment } => {
                let coordinator = coordinator(&config, &project)?;
                let result =
                    coordinator.approve_phase(&PhaseId::new(phase), comment.as_deref()).await;
                (coordinator, result)
            }
            ApprovalOperation::Reject { project, phase, reason } => {
                let coordinator = coordinator(&config, &project)?;
                let result = coordinator.reject_phase(&PhaseId::new(phase), reason.as_deref()).await;
                (coordinator, result)
            }
        };
        coordinator.flush_notifications().await;
        result.map_err(reported)
    })
}

/// Handle the phases command.
fn cmd_phases(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let chain = config.phase_chain()?;

    for phase in chain.phases() {
        let next = phase.next_phase_id.as_ref().map_or("(end)", |id| id.as_str());
        println!(
            "{}. {:<16} {:<24} {:<12} -> {}",
            phase.order + 1,
            phase.id,
            phase.label,
            phase.kind,
            next
        );
    }
    Ok(())
}

/// Handle the config command.
fn cmd_config(config_path: Option<&Path>, show_path: bool) -> Result<()> {
    if show_path {
        let path = config_path
            .map(Path::to_path_buf)
            .or_else(Config::locate)
            .or_else(|| Config::config_dir().map(|d| d.join("config.toml")));
        if let Some(path) = path {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let config = load_config(config_path)?;
    println!("{}", config.to_toml()?);

    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "phaseflow", &mut io::stdout());
}
