//! Hosting-platform access.
//!
//! This module provides the [`RepositoryHost`] trait the batch driver reads
//! repositories and config files through, and the [`GhCliHost`]
//! implementation backed by the GitHub CLI.

mod gh;

pub use gh::GhCliHost;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A repository as reported by the hosting platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Short repository name, also the working directory name.
    pub name: String,
    /// `owner/name`.
    pub full_name: String,
    /// URL passed to `git clone`.
    #[serde(rename = "ssh_url")]
    pub clone_url: String,
}

impl Repository {
    pub fn new(owner: &str, name: &str, clone_url: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            full_name: format!("{}/{}", owner, name),
            clone_url: clone_url.into(),
        }
    }

    /// Returns the working directory this repository is cloned into.
    pub fn working_dir(&self, projects_dir: &Path) -> PathBuf {
        projects_dir.join(&self.name)
    }
}

/// Raw file contents as returned by the content-read API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContents {
    /// Encoded content.
    pub content: String,
    /// Encoding of `content`, normally `base64`.
    pub encoding: String,
}

/// Read-only access to an account's repositories.
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Lists every repository visible for `owner`, in platform order.
    async fn list_repositories(&self, owner: &str) -> Result<Vec<Repository>>;

    /// Looks up a single repository by name.
    async fn repository(&self, owner: &str, name: &str) -> Result<Repository>;

    /// Reads a file from the repository's default branch.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    async fn read_file(&self, repo: &Repository, path: &str) -> Result<Option<FileContents>>;
}
