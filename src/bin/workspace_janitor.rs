use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use workspace_janitor::api::{ManageApi, ManageClient, RestClient};
use workspace_janitor::credentials::{
    EnvTokenSource, FileTokenSource, PromptTokenSource, StaticTokenSource, TokenSource,
    TokenSourceChain, prompt_line,
};
use workspace_janitor::reconcile::{OutputFormat, ReconciliationManager, load_targets, render};
use workspace_janitor::sweep::{
    SandboxSelection, SandboxSweep, default_cutoff, delete_orphaned_workspaces, delete_sandboxes,
    parse_terminable_status, terminate_jobs,
};
use workspace_janitor::{
    JanitorConfig, JanitorError, PlatformApis, ProjectSession, SINGLE_PROJECT_TOKEN_ENV,
};

#[derive(Parser)]
#[command(
    name = "workspace-janitor",
    version,
    about = "Reconcile and clean up workspaces, sandboxes and jobs of platform projects"
)]
struct Cli {
    /// Config file (TOML, YAML or JSON); JANITOR_* variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Debug logging for the janitor
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Summary format: text or json
    #[arg(long, global = true, default_value = "text")]
    output: OutputFormat,
    /// Two-column CSV of projectId,token
    #[arg(long, global = true)]
    tokens_file: Option<PathBuf>,
    /// Storage token; for multi-project runs it is used for every project
    #[arg(long, global = true)]
    token: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete the workspaces listed in a projectId,workspaceSchema CSV
    MassDelete {
        stack_suffix: String,
        source_file: PathBuf,
        /// Actually delete; without it the run is a dry run
        #[arg(short, long)]
        force: bool,
        /// Give up waiting for deletion jobs after this many seconds
        #[arg(long)]
        poll_timeout: Option<u64>,
    },
    /// Delete workspaces of one component created before a date
    DeleteOrphanedWorkspaces {
        stack_suffix: String,
        component: String,
        /// RFC 3339 timestamp or YYYY-MM-DD; defaults to one month ago
        #[arg(long)]
        until: Option<String>,
        #[arg(short, long)]
        force: bool,
        /// Drop the orphans through the manage API command, which also clears
        /// workspaces whose backend drop fails; needs --manage-token
        #[arg(short, long)]
        ignore_backend_errors: bool,
        /// Super-admin manage token for --ignore-backend-errors
        #[arg(short, long)]
        manage_token: Option<String>,
    },
    /// Delete sandboxes whose creating token no longer exists
    DeleteOwnerlessWorkspaces {
        stack_suffix: String,
        #[arg(long)]
        include_shared: bool,
        #[arg(short, long)]
        force: bool,
    },
    /// Delete every sandbox of a project
    DeleteProjectSandboxes {
        stack_suffix: String,
        #[arg(long)]
        include_shared: bool,
        #[arg(short, long)]
        force: bool,
    },
    /// Terminate jobs in created, waiting or processing status
    TerminateJobs { stack_suffix: String, status: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("warn,workspace_janitor={}", level))),
        )
        .init();

    match &cli.command {
        Commands::MassDelete {
            stack_suffix,
            source_file,
            force,
            poll_timeout,
        } => {
            let mut config = load_config(&cli, stack_suffix)?;
            if poll_timeout.is_some() {
                config.poll_timeout_secs = *poll_timeout;
            }
            let targets = load_targets(source_file, &config.workspace_prefix)?;
            if !force {
                info!("This is just a dry-run, nothing will be actually deleted");
            }

            let apis = PlatformApis::http(&config)?;
            let manager = ReconciliationManager::new(apis, config, token_source(&cli)?);
            let report = manager.run(&targets, *force).await?;

            println!("{}", render(&report, cli.output)?);
            if report.has_timeouts() {
                bail!("deletion jobs did not finish in time, see the summary above");
            }
        }
        Commands::DeleteOrphanedWorkspaces {
            stack_suffix,
            component,
            until,
            force,
            ignore_backend_errors,
            manage_token,
        } => {
            let config = load_config(&cli, stack_suffix)?;
            let until = match until {
                Some(raw) => parse_until(raw)?,
                None => default_cutoff(Utc::now())?,
            };
            let manage = match (*ignore_backend_errors, manage_token) {
                (false, _) => None,
                (true, Some(token)) => Some(ManageClient::new(
                    RestClient::new(config.timeout_secs, config.max_retries)?,
                    config.endpoints()?.connection,
                    token.clone(),
                )),
                (true, None) => {
                    return Err(JanitorError::Validation(
                        "Manage token must be supplied for ignore-backend-errors".into(),
                    )
                    .into());
                }
            };
            let (apis, session) = single_project(&cli, &config).await?;
            let stats = delete_orphaned_workspaces(
                &apis,
                &session,
                component,
                until,
                *force,
                manage.as_ref().map(|m| m as &dyn ManageApi),
            )
            .await?;
            print_stats(&stats, cli.output)?;
        }
        Commands::DeleteOwnerlessWorkspaces {
            stack_suffix,
            include_shared,
            force,
        } => {
            sweep_sandboxes(&cli, stack_suffix, SandboxSelection::Ownerless, *include_shared, *force)
                .await?;
        }
        Commands::DeleteProjectSandboxes {
            stack_suffix,
            include_shared,
            force,
        } => {
            sweep_sandboxes(&cli, stack_suffix, SandboxSelection::All, *include_shared, *force)
                .await?;
        }
        Commands::TerminateJobs { stack_suffix, status } => {
            let status = parse_terminable_status(status)?;
            let config = load_config(&cli, stack_suffix)?;
            let (apis, session) = single_project(&cli, &config).await?;
            let stats = terminate_jobs(&apis, &session, status).await?;
            print_stats(&stats, cli.output)?;
        }
    }

    Ok(())
}

async fn sweep_sandboxes(
    cli: &Cli,
    stack_suffix: &str,
    selection: SandboxSelection,
    include_shared: bool,
    force: bool,
) -> anyhow::Result<()> {
    let config = load_config(cli, stack_suffix)?;
    let (apis, session) = single_project(cli, &config).await?;
    let sweep = SandboxSweep {
        selection,
        include_shared,
        force,
    };
    let stats = delete_sandboxes(&apis, &session, &config, sweep).await?;
    print_stats(&stats, cli.output)
}

fn load_config(cli: &Cli, stack_suffix: &str) -> anyhow::Result<JanitorConfig> {
    let config = JanitorConfig::load(cli.config.as_deref())?.with_stack_suffix(stack_suffix);
    config.validate()?;
    Ok(config)
}

fn token_source(cli: &Cli) -> anyhow::Result<Arc<dyn TokenSource>> {
    let mut sources: Vec<Arc<dyn TokenSource>> = Vec::new();
    if let Some(path) = &cli.tokens_file {
        let file = FileTokenSource::from_path(path)
            .with_context(|| format!("reading tokens file {}", path.display()))?;
        sources.push(Arc::new(file));
    }
    if let Some(token) = &cli.token {
        sources.push(Arc::new(StaticTokenSource::new(token.clone())));
    }
    sources.push(Arc::new(EnvTokenSource));
    sources.push(Arc::new(PromptTokenSource::new()));
    Ok(Arc::new(TokenSourceChain::new(sources)))
}

/// Opens a session for the project that owns the supplied token.
async fn single_project(
    cli: &Cli,
    config: &JanitorConfig,
) -> anyhow::Result<(PlatformApis, ProjectSession)> {
    let token = match cli.token.clone().or_else(|| std::env::var(SINGLE_PROJECT_TOKEN_ENV).ok()) {
        Some(token) => token,
        None => {
            prompt_line(format!(
                "Paste storage token for stack \"{}\" to continue.",
                config.stack_suffix
            ))
            .await?
        }
    };
    if token.trim().is_empty() {
        return Err(JanitorError::Authentication("empty storage token".into()).into());
    }

    let apis = PlatformApis::http(config)?;
    let endpoints = config.endpoints()?;
    let lookup = ProjectSession::new("", token.clone(), endpoints.clone());
    let owner = apis
        .storage
        .verify_token(&lookup)
        .await
        .map_err(|e| {
            JanitorError::Authentication(format!(
                "token {} failed verification: {}",
                lookup.fingerprint(),
                e
            ))
        })?
        .owner;

    info!(
        "Token {} belongs to project {} ({})",
        lookup.fingerprint(),
        owner.id,
        owner.name.as_deref().unwrap_or("unnamed")
    );
    Ok((apis, ProjectSession::new(owner.id, token, endpoints)))
}

fn parse_until(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
        .ok_or_else(|| JanitorError::Validation(format!("Invalid date format: {}", raw)).into())
}

fn print_stats<T: Serialize + std::fmt::Display>(stats: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => println!("{}", stats),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(stats)?),
    }
    Ok(())
}
