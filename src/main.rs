//! Arnold CLI
//!
//! Runs a maintenance task across every opted-in repository.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use arnold::settings::DEFAULT_SETTINGS_FILE;
use arnold::{
    default_required_secrets, BatchDriver, ExternalStageRunner, GhCliHost, GitCli,
    RemoteSinkConfig, RunOptions, SecretError, SecretStore, Settings, TaskKeyword, Telemetry,
};

/// Exit status used when the run is interrupted.
const INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "arnold", version, about = "Run maintenance tasks across repositories")]
struct Cli {
    /// The task to run: a stage name or `all`.
    task: TaskKeyword,

    /// Skip cloning repositories.
    #[arg(short = 'c', long)]
    skip_clone: bool,

    /// Run only on the given repository.
    #[arg(short, long)]
    repo: Option<String>,

    /// Settings file (defaults to ./arnold.toml when present).
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Dropped after `run` returns on every path, flushing the remote sink.
    let telemetry = Telemetry::init(RemoteSinkConfig::from_env());
    let code = run(cli);
    drop(telemetry);
    code
}

fn run(cli: Cli) -> ExitCode {
    let settings = match &cli.settings {
        Some(path) => Settings::load(path, true),
        None => Settings::load(&PathBuf::from(DEFAULT_SETTINGS_FILE), false),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, "uncaught error");
            return ExitCode::FAILURE;
        }
    };

    let secrets = match SecretStore::from_env()
        .with_secrets_file(&settings.secrets_file)
        .load(&default_required_secrets())
    {
        Ok(secrets) => secrets,
        Err(SecretError::Missing(missing)) => {
            for secret in &missing {
                tracing::error!(secret = %secret.name, purpose = %secret.purpose, "required secret missing");
            }
            tracing::error!(count = missing.len(), "missing required secrets, aborting before any repository");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to load secrets");
            return ExitCode::FAILURE;
        }
    };

    let token = match secrets.require("GITHUB_TOKEN") {
        Ok(token) => token.to_string(),
        Err(e) => {
            tracing::error!(error = %e, "uncaught error");
            return ExitCode::FAILURE;
        }
    };

    let options = RunOptions::new(cli.task)
        .with_skip_clone(cli.skip_clone)
        .with_repo(cli.repo);
    let host = GhCliHost::new(token);
    let vcs = GitCli::new();
    let runner = ExternalStageRunner::from_settings(&settings);
    let driver = BatchDriver::new(&host, &vcs, &runner, &settings, &secrets, &options);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(task = %options.task, "starting batch");
    runtime.block_on(async {
        tokio::select! {
            result = driver.run() => match result {
                Ok(_) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!(error = %e, "uncaught error");
                    ExitCode::FAILURE
                }
            },
            _ = tokio::signal::ctrl_c() => ExitCode::from(INTERRUPTED),
        }
    })
}
