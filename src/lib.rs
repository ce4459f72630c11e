pub mod api;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod poll;
pub mod push;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use api::{PackageApi, PackageState};
use client::RestClient;
use credentials::{
    resolve_credential, resolve_settings, ApiContext, CredentialPrompt, Env, Overrides,
    TerminalPrompt,
};
use error::Error;
use poll::PollOptions;
use push::{push_all, PushOptions, TaskOutcome, UploadTask};

#[derive(Parser)]
#[clap(
    name = "cloudsmith",
    version,
    about = "Push packages to a Cloudsmith-compatible package-hosting service and watch them synchronise"
)]
pub struct Cli {
    /// Path to the profiles config file (default: platform config dir)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Profile section to read from the config file
    #[clap(long, global = true, default_value = "default")]
    pub profile: String,

    /// API key, overriding environment and profile
    #[clap(long, global = true)]
    pub api_key: Option<String>,

    /// API host, overriding environment and profile
    #[clap(long, global = true)]
    pub api_host: Option<String>,

    /// Output format for command results
    #[clap(long, global = true, value_enum, default_value = "pretty")]
    pub output: OutputMode,

    /// Never prompt for credentials interactively
    #[clap(long, global = true)]
    pub no_prompt: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    Pretty,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Verify credentials and connectivity, printing the service endpoint
    Check,

    /// Upload one or more package files to OWNER/REPO
    Push {
        /// Target repository as OWNER/REPO
        repository: String,

        /// Package files to upload
        #[clap(required = true)]
        files: Vec<PathBuf>,

        /// Target distribution (release channel), e.g. ubuntu/focal
        #[clap(long, short = 'd')]
        distribution: Option<String>,

        /// Upper bound on concurrent uploads
        #[clap(long, default_value_t = 4)]
        workers: usize,

        /// Submission attempts per file before giving up
        #[clap(long, default_value_t = 3)]
        max_attempts: u32,

        /// Seconds to wait for each package to finish processing
        #[clap(long, default_value_t = 300)]
        sync_timeout: u64,

        /// Return as soon as uploads are accepted, without waiting
        #[clap(long)]
        no_wait: bool,
    },

    /// List repositories and distributions
    #[clap(subcommand)]
    List(ListTarget),
}

#[derive(Subcommand)]
pub enum ListTarget {
    /// List repositories, optionally restricted to one namespace
    Repos { owner: Option<String> },

    /// List distributions, optionally restricted to one package format
    Distros { package_format: Option<String> },
}

/// Async CLI entrypoint, shared by `main()` and integration tests. Returns
/// the process exit code for handled failures; unexpected ones propagate as
/// errors and exit 1.
pub async fn run(cli: Cli) -> Result<i32> {
    info!("cloudsmith-cli starting");

    let profile = config::load_profile(cli.config.as_deref(), &cli.profile)?;
    let env = Env::capture();
    let overrides = Overrides {
        api_key: cli.api_key.clone(),
        api_host: cli.api_host.clone(),
    };
    let had_api_key = overrides.api_key.is_some()
        || env.api_key.is_some()
        || profile.as_ref().map_or(false, |p| p.api_key.is_some());

    let settings = resolve_settings(&overrides, &env, profile.as_ref());
    let terminal_prompt = TerminalPrompt;
    let prompt: Option<&dyn CredentialPrompt> = if cli.no_prompt {
        None
    } else {
        Some(&terminal_prompt)
    };
    let credential = resolve_credential(&overrides, &env, profile.as_ref(), prompt)?;

    let ctx = ApiContext {
        settings,
        credential,
    };
    let client = RestClient::new(&ctx)?;

    match cli.command {
        Commands::Check => check_command(&client, &ctx, cli.output, had_api_key).await,
        Commands::Push {
            repository,
            files,
            distribution,
            workers,
            max_attempts,
            sync_timeout,
            no_wait,
        } => {
            let options = PushOptions {
                workers,
                max_attempts,
                wait: !no_wait,
                poll: PollOptions {
                    timeout: Duration::from_secs(sync_timeout),
                    ..PollOptions::default()
                },
            };
            let tasks = files
                .into_iter()
                .map(|path| UploadTask {
                    path,
                    repository: repository.clone(),
                    distribution: distribution.clone().unwrap_or_default(),
                })
                .collect();
            push_command(&client, tasks, &options, cli.output, had_api_key).await
        }
        Commands::List(target) => list_command(&client, target, cli.output).await,
    }
}

async fn check_command(
    api: &dyn PackageApi,
    ctx: &ApiContext,
    output: OutputMode,
    had_api_key: bool,
) -> Result<i32> {
    let identity = match api.check_identity().await {
        Ok(identity) => identity,
        Err(e) => {
            eprintln!("[ERROR] check failed ({}): {e}", e.kind());
            if let Some(hint) = e.hint(had_api_key) {
                eprintln!("Hint: {hint}");
            }
            return Ok(e.exit_code());
        }
    };

    if output == OutputMode::Json {
        let report = json!({
            "endpoint": ctx.settings.host,
            "identity": identity,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Endpoint: {}", ctx.settings.host);
        let who = identity
            .name
            .clone()
            .or_else(|| identity.slug.clone())
            .unwrap_or_else(|| "(unknown)".to_string());
        if identity.authenticated {
            println!("Authenticated as {who}");
        } else {
            println!("Not authenticated");
        }
    }

    if identity.authenticated {
        Ok(0)
    } else {
        Ok(Error::Auth {
            status: 401,
            detail: None,
        }
        .exit_code())
    }
}

async fn push_command(
    api: &dyn PackageApi,
    tasks: Vec<UploadTask>,
    options: &PushOptions,
    output: OutputMode,
    had_api_key: bool,
) -> Result<i32> {
    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_on_signal.cancel();
        }
    });

    let outcomes = push_all(api, tasks, options, &cancel).await;

    if output == OutputMode::Json {
        let results: Vec<_> = outcomes
            .iter()
            .map(|outcome| match &outcome.result {
                Ok(result) => json!({
                    "file": outcome.task.path,
                    "slug": result.slug,
                    "state": result.state,
                }),
                Err(e) => json!({
                    "file": outcome.task.path,
                    "error": e.kind(),
                    "message": e.to_string(),
                }),
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "results": results }))?
        );
        return Ok(worst_exit_code(&outcomes));
    }

    for outcome in &outcomes {
        let file = outcome.task.path.display();
        match &outcome.result {
            Ok(result) if result.state == PackageState::Failed => {
                eprintln!("{file}: processing failed remotely ({})", result.slug);
            }
            Ok(result) => {
                println!("{file}: {} ({})", result.state, result.slug);
            }
            Err(e) => {
                eprintln!("{file}: {} error: {e}", e.kind());
                if let Some(hint) = e.hint(had_api_key) {
                    eprintln!("Hint: {hint}");
                }
            }
        }
    }

    Ok(worst_exit_code(&outcomes))
}

/// The final exit code reflects the worst failure class encountered across
/// all tasks; remote processing failures without a local error class count
/// as unexpected (1).
fn worst_exit_code(outcomes: &[TaskOutcome]) -> i32 {
    outcomes
        .iter()
        .map(|outcome| match &outcome.result {
            Ok(result) if result.state == PackageState::Failed => 1,
            Ok(_) => 0,
            Err(e) => e.exit_code(),
        })
        .max()
        .unwrap_or(0)
}

async fn list_command(api: &dyn PackageApi, target: ListTarget, output: OutputMode) -> Result<i32> {
    match target {
        ListTarget::Repos { owner } => {
            let repos = api.list_repos(owner).await?;
            if output == OutputMode::Json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "results": repos }))?
                );
                return Ok(0);
            }
            for repo in &repos {
                let kind = repo.repository_type.as_deref().unwrap_or("-");
                println!(
                    "{:<32} {:<12} {}/{}",
                    repo.name, kind, repo.namespace, repo.slug
                );
            }
            let plural = if repos.len() == 1 { "y" } else { "ies" };
            println!("{} repositor{plural} visible", repos.len());
        }
        ListTarget::Distros { package_format } => {
            let distros = api.list_distros(package_format).await?;
            if output == OutputMode::Json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "results": distros }))?
                );
                return Ok(0);
            }
            let mut releases = 0usize;
            for distro in &distros {
                for version in &distro.versions {
                    println!(
                        "{:<24} {:<16} {:<8} {}/{}",
                        distro.name, version.name, distro.format, distro.slug, version.slug
                    );
                    releases += 1;
                }
            }
            let plural = if releases == 1 { "" } else { "s" };
            println!("{releases} distribution release{plural}");
        }
    }
    Ok(0)
}
