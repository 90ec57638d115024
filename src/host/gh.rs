//! GitHub CLI host.

use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

use super::{FileContents, Repository, RepositoryHost};

/// Host that talks to GitHub through `gh api`.
pub struct GhCliHost {
    /// Path to the gh CLI binary.
    cli_path: String,
    /// Token exported as `GH_TOKEN` for every call.
    token: String,
}

impl GhCliHost {
    /// Creates a host using the default `gh` command.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            cli_path: "gh".to_string(),
            token: token.into(),
        }
    }

    /// Creates a host with a custom CLI path.
    pub fn with_cli_path(cli_path: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
            token: token.into(),
        }
    }

    async fn api(&self, args: &[&str]) -> Result<Output> {
        tracing::debug!(args = ?args, "calling gh api");

        Command::new(&self.cli_path)
            .arg("api")
            .args(args)
            .env("GH_TOKEN", &self.token)
            .output()
            .await
            .map_err(|e| Error::GitHub(format!("failed to run {}: {}", self.cli_path, e)))
    }
}

/// Returns true if gh reported a 404 for the request.
fn is_not_found(stderr: &str) -> bool {
    stderr.contains("HTTP 404") || stderr.contains("Not Found")
}

/// Parses newline-delimited repository objects produced by `--jq '.[]'`.
fn parse_repository_lines(stdout: &str) -> Result<Vec<Repository>> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| Error::GitHub(format!("unexpected repository record: {}", e)))
        })
        .collect()
}

/// Parses a content-read response; directories are not files.
fn parse_file_contents(stdout: &str, path: &str) -> Result<FileContents> {
    let value: serde_json::Value = serde_json::from_str(stdout)
        .map_err(|e| Error::GitHub(format!("unexpected contents response: {}", e)))?;

    if value.is_array() {
        return Err(Error::GitHub(format!("'{}' is a directory", path)));
    }

    serde_json::from_value(value)
        .map_err(|e| Error::GitHub(format!("unexpected contents response: {}", e)))
}

#[async_trait]
impl RepositoryHost for GhCliHost {
    async fn list_repositories(&self, owner: &str) -> Result<Vec<Repository>> {
        let endpoint = format!("users/{}/repos?per_page=100", owner);
        let output = self
            .api(&["--paginate", endpoint.as_str(), "--jq", ".[]"])
            .await?;

        if !output.status.success() {
            return Err(Error::GitHub(format!(
                "failed to list repositories for {}: {}",
                owner,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        parse_repository_lines(&String::from_utf8_lossy(&output.stdout))
    }

    async fn repository(&self, owner: &str, name: &str) -> Result<Repository> {
        let endpoint = format!("repos/{}/{}", owner, name);
        let output = self.api(&[endpoint.as_str()]).await?;

        if !output.status.success() {
            return Err(Error::GitHub(format!(
                "failed to look up {}/{}: {}",
                owner,
                name,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::GitHub(format!("unexpected repository response: {}", e)))
    }

    async fn read_file(&self, repo: &Repository, path: &str) -> Result<Option<FileContents>> {
        let endpoint = format!("repos/{}/contents/{}", repo.full_name, path);
        let output = self.api(&[endpoint.as_str()]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_not_found(&stderr) {
                return Ok(None);
            }
            return Err(Error::GitHub(format!(
                "failed to read {} from {}: {}",
                path, repo.full_name, stderr
            )));
        }

        parse_file_contents(&String::from_utf8_lossy(&output.stdout), path).map(Some)
    }
}
