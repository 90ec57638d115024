//! Arnold - automated maintenance across an organization's repositories
//!
//! This library reads a per-repository config document, clones each opted-in
//! repository, and runs the enabled maintenance stages (link checking and
//! translation synchronization) in a fixed order, isolating failures so one
//! repository never stops the rest of the batch.

pub mod batch;
pub mod config;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod project;
pub mod runner;
pub mod secrets;
pub mod settings;
pub mod task;
pub mod telemetry;
pub mod timing;

pub use batch::{BatchDriver, BatchSummary, RepoOutcome, SkipReason};
pub use config::{load_config, parse_config, ConfigStatus, ProjectConfig, Translation, TranslationSettings};
pub use error::{Error, Result};
pub use host::{FileContents, GhCliHost, Repository, RepositoryHost};
pub use lifecycle::{GitCli, RepoLifecycle, Vcs};
pub use project::{
    eligible_stages, PipelineReport, Project, ProjectOrchestrator, RunOptions, StageTiming,
};
pub use runner::{ExternalStageRunner, StageRunner};
pub use secrets::{default_required_secrets, RequiredSecret, SecretError, SecretSet, SecretStore};
pub use settings::{CommitIdentity, Settings};
pub use task::{Stage, TaskKeyword, ALL_TASKS_KEYWORD};
pub use telemetry::{RemoteSinkConfig, Telemetry};
