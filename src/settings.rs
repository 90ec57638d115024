//! Orchestrator settings.
//!
//! Settings are read from an optional TOML file (`arnold.toml` by default).
//! Every key is optional; defaults describe the UCCSER deployment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::task::Stage;

/// Default settings file name, looked up in the current directory.
pub const DEFAULT_SETTINGS_FILE: &str = "arnold.toml";

/// Name and email attached to commits made by pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitIdentity {
    #[serde(default = "default_identity_name")]
    pub name: String,
    #[serde(default = "default_identity_email")]
    pub email: String,
}

fn default_identity_name() -> String {
    "UCCSER Bot".to_string()
}

fn default_identity_email() -> String {
    "33709036+uccser-bot@users.noreply.github.com".to_string()
}

impl Default for CommitIdentity {
    fn default() -> Self {
        Self {
            name: default_identity_name(),
            email: default_identity_email(),
        }
    }
}

/// Top-level orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Account whose repositories are processed.
    #[serde(default = "default_owner")]
    pub owner: String,
    /// Login of the bot account, passed to stages.
    #[serde(default = "default_bot_login")]
    pub bot_login: String,
    /// Directory that holds one working directory per repository.
    #[serde(default = "default_projects_dir")]
    pub projects_dir: PathBuf,
    /// Per-repository config file name, read from the default branch.
    #[serde(default = "default_config_file")]
    pub config_file: String,
    /// Local secrets file consulted after the environment.
    #[serde(default = "default_secrets_file")]
    pub secrets_file: PathBuf,
    /// Commit identity configured before each pipeline.
    #[serde(default)]
    pub identity: CommitIdentity,
    /// Command overrides keyed by stage name.
    #[serde(default)]
    pub stages: BTreeMap<String, Vec<String>>,
}

fn default_owner() -> String {
    "uccser".to_string()
}

fn default_bot_login() -> String {
    "uccser-bot".to_string()
}

fn default_projects_dir() -> PathBuf {
    PathBuf::from("projects")
}

fn default_config_file() -> String {
    ".arnold.yaml".to_string()
}

fn default_secrets_file() -> PathBuf {
    PathBuf::from("secrets.yaml")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            bot_login: default_bot_login(),
            projects_dir: default_projects_dir(),
            config_file: default_config_file(),
            secrets_file: default_secrets_file(),
            identity: CommitIdentity::default(),
            stages: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Loads settings from `path`.
    ///
    /// When `must_exist` is false a missing file yields the defaults.
    pub fn load(path: &Path, must_exist: bool) -> Result<Self> {
        if !path.exists() {
            if must_exist {
                return Err(Error::Settings(format!(
                    "settings file '{}' does not exist",
                    path.display()
                )));
            }
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Settings(msg) => Error::Settings(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Parses and validates settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| Error::Settings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks that stage overrides name real stages and are non-empty.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        for (name, command) in &self.stages {
            if name.parse::<Stage>().is_err() {
                errors.push(format!("unknown stage '{}' in [stages]", name));
            } else if command.is_empty() {
                errors.push(format!("empty command for stage '{}'", name));
            }
        }
        if self.owner.trim().is_empty() {
            errors.push("owner must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Settings(errors.join("; ")))
        }
    }

    /// Returns the command vector used to run `stage`.
    ///
    /// Defaults to a single executable named `arnold-<stage>`.
    pub fn stage_command(&self, stage: Stage) -> Vec<String> {
        self.stages
            .get(stage.name())
            .cloned()
            .unwrap_or_else(|| vec![format!("arnold-{}", stage.name())])
    }
}
