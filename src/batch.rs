//! Batch driver.
//!
//! Iterates the resolved repository set one repository at a time. Every
//! per-repository failure is turned into a [`RepoOutcome`] at the repository
//! boundary, so one bad repository never stops the batch.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{load_config, ConfigStatus};
use crate::error::Result;
use crate::host::{Repository, RepositoryHost};
use crate::lifecycle::{RepoLifecycle, Vcs};
use crate::project::{Project, ProjectOrchestrator, RunOptions};
use crate::runner::StageRunner;
use crate::secrets::SecretSet;
use crate::settings::Settings;
use crate::task::Stage;
use crate::timing::{format_elapsed, Checkpoint};

const SEPARATOR_WIDTH: usize = 60;

/// Why a repository was skipped without running any stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The repository has no config document.
    NoConfig,
    /// The config document is empty or null.
    EmptyConfig,
    /// The config document failed to decode or parse.
    InvalidConfig(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoConfig => write!(f, "no config"),
            SkipReason::EmptyConfig => write!(f, "empty config"),
            SkipReason::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

/// Result of processing one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoOutcome {
    /// Every eligible stage completed.
    Succeeded { stages: Vec<Stage> },
    /// No project was created for the repository.
    Skipped(SkipReason),
    /// Processing stopped on an error.
    Failed {
        reason: String,
        /// Stages that completed before the failure.
        completed: Vec<Stage>,
    },
}

impl RepoOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, RepoOutcome::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RepoOutcome::Skipped(_))
    }
}

/// Outcomes of a batch run, in processing order.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    /// `(full name, outcome)` for every repository attempted.
    pub outcomes: Vec<(String, RepoOutcome)>,
    /// Wall-clock time of the whole batch.
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, RepoOutcome::Succeeded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(RepoOutcome::is_skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(RepoOutcome::is_failed)
    }

    /// Returns the outcome recorded for `full_name`.
    pub fn outcome(&self, full_name: &str) -> Option<&RepoOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == full_name)
            .map(|(_, outcome)| outcome)
    }

    fn count(&self, predicate: impl Fn(&RepoOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| predicate(o)).count()
    }

    /// Logs one line per repository and the totals.
    pub fn log(&self) {
        for (name, outcome) in &self.outcomes {
            match outcome {
                RepoOutcome::Succeeded { stages } => {
                    tracing::info!(repo = %name, stages = stages.len(), "succeeded")
                }
                RepoOutcome::Skipped(reason) => {
                    tracing::info!(repo = %name, reason = %reason, "skipped")
                }
                RepoOutcome::Failed { reason, .. } => {
                    tracing::warn!(repo = %name, reason = %reason, "failed")
                }
            }
        }
        tracing::info!(
            attempted = self.attempted(),
            succeeded = self.succeeded(),
            skipped = self.skipped(),
            failed = self.failed(),
            elapsed = %format_elapsed(self.elapsed),
            "batch complete"
        );
    }
}

/// Drives one batch run over the repository set.
pub struct BatchDriver<'a> {
    host: &'a dyn RepositoryHost,
    vcs: &'a dyn Vcs,
    runner: &'a dyn StageRunner,
    settings: &'a Settings,
    secrets: &'a SecretSet,
    options: &'a RunOptions,
}

impl<'a> BatchDriver<'a> {
    pub fn new(
        host: &'a dyn RepositoryHost,
        vcs: &'a dyn Vcs,
        runner: &'a dyn StageRunner,
        settings: &'a Settings,
        secrets: &'a SecretSet,
        options: &'a RunOptions,
    ) -> Self {
        Self {
            host,
            vcs,
            runner,
            settings,
            secrets,
            options,
        }
    }

    /// Returns the repositories this run covers, in platform order.
    pub async fn resolve_repositories(&self) -> Result<Vec<Repository>> {
        match &self.options.repo {
            Some(name) => {
                let repo = self.host.repository(&self.settings.owner, name).await?;
                Ok(vec![repo])
            }
            None => self.host.list_repositories(&self.settings.owner).await,
        }
    }

    /// Runs the batch.
    ///
    /// Errors are returned only when the repository set itself cannot be
    /// resolved or the projects directory cannot be created.
    pub async fn run(&self) -> Result<BatchSummary> {
        let checkpoint = Checkpoint::start();
        if self.options.skip_clone {
            tracing::info!("skip cloning repositories turned on");
        }

        let projects_dir = self.prepare_projects_dir().await?;
        let repos = self.resolve_repositories().await?;
        tracing::info!(count = repos.len(), owner = %self.settings.owner, "resolved repositories");

        let mut summary = BatchSummary::default();
        for repo in &repos {
            tracing::info!(
                "{}\n{}\n{}",
                "=".repeat(SEPARATOR_WIDTH),
                repo.full_name,
                "-".repeat(SEPARATOR_WIDTH)
            );
            let outcome = self.process(repo, &projects_dir).await;
            summary.outcomes.push((repo.full_name.clone(), outcome));
        }

        summary.elapsed = checkpoint.elapsed();
        summary.log();
        Ok(summary)
    }

    async fn prepare_projects_dir(&self) -> Result<PathBuf> {
        let dir = &self.settings.projects_dir;
        tokio::fs::create_dir_all(dir).await?;
        Ok(tokio::fs::canonicalize(dir).await?)
    }

    /// Processes one repository, containing every failure.
    pub async fn process(&self, repo: &Repository, projects_dir: &Path) -> RepoOutcome {
        match self.try_process(repo, projects_dir).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(repo = %repo.full_name, error = %e, "repository failed");
                RepoOutcome::Failed {
                    reason: e.to_string(),
                    completed: Vec::new(),
                }
            }
        }
    }

    async fn try_process(&self, repo: &Repository, projects_dir: &Path) -> Result<RepoOutcome> {
        let status = load_config(self.host, repo, &self.settings.config_file).await?;
        let config = match status {
            ConfigStatus::Missing => {
                tracing::info!(repo = %repo.full_name, "config file for Arnold not detected");
                return Ok(RepoOutcome::Skipped(SkipReason::NoConfig));
            }
            ConfigStatus::Empty => {
                tracing::info!(repo = %repo.full_name, "config file for Arnold is empty");
                return Ok(RepoOutcome::Skipped(SkipReason::EmptyConfig));
            }
            ConfigStatus::Invalid(msg) => {
                tracing::error!(repo = %repo.full_name, error = %msg, "config file for Arnold is invalid");
                return Ok(RepoOutcome::Skipped(SkipReason::InvalidConfig(msg)));
            }
            ConfigStatus::Loaded(config) => {
                tracing::info!(repo = %repo.full_name, "config file for Arnold detected");
                config
            }
        };

        let mut project = Project::new(
            repo,
            config,
            self.secrets,
            self.options,
            repo.working_dir(projects_dir),
            &self.settings.bot_login,
        );

        RepoLifecycle::new(self.vcs, &self.settings.identity, self.options.skip_clone)
            .prepare(repo, project.working_dir())
            .await?;
        project.lap("repository preparation");

        let report = ProjectOrchestrator::new(self.runner)
            .run(&mut project)
            .await;
        let completed = report.completed();

        Ok(match report.failure {
            None => RepoOutcome::Succeeded { stages: completed },
            Some(e) => RepoOutcome::Failed {
                reason: e.to_string(),
                completed,
            },
        })
    }
}
