//! Error types for the arnold orchestrator.

use std::path::PathBuf;
use thiserror::Error;

use crate::secrets::SecretError;
use crate::task::Stage;

/// Top-level error type for repository processing.
///
/// Every variant except [`Error::Secret`] raised during startup is local to
/// one repository and is contained by the batch driver.
#[derive(Error, Debug)]
pub enum Error {
    /// Cloning the repository failed.
    #[error("failed to clone {repo}: {reason}")]
    Clone { repo: String, reason: String },

    /// Removing a stale working directory failed.
    #[error("failed to remove working directory {path}: {reason}")]
    Cleanup { path: PathBuf, reason: String },

    /// A pipeline stage reported failure.
    #[error("stage {stage} failed: {reason}")]
    Stage { stage: Stage, reason: String },

    /// Git operation failed.
    #[error("git operation failed: {0}")]
    Git(String),

    /// GitHub API operation failed.
    #[error("GitHub operation failed: {0}")]
    GitHub(String),

    /// A secret could not be resolved.
    #[error(transparent)]
    Secret(#[from] SecretError),

    /// Orchestrator settings could not be loaded.
    #[error("settings error: {0}")]
    Settings(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;
