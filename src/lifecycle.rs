//! Repository working-copy lifecycle.
//!
//! Every pipeline starts from a fresh clone: an existing working directory
//! is deleted before cloning so no state leaks between runs. Commit identity
//! is configured afterwards so stages that commit are attributed to the bot.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::host::Repository;
use crate::settings::CommitIdentity;

/// Version-control operations the lifecycle needs.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Clones `repo` into `destination`, which must not exist.
    async fn clone_repo(&self, repo: &Repository, destination: &Path) -> Result<()>;

    /// Sets the global commit identity.
    async fn set_identity(&self, identity: &CommitIdentity) -> Result<()>;
}

/// [`Vcs`] implementation that shells out to `git`.
pub struct GitCli {
    /// Path to the git binary.
    git_path: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    /// Creates a client using the default `git` command.
    pub fn new() -> Self {
        Self {
            git_path: "git".to_string(),
        }
    }

    /// Creates a client with a custom git path.
    pub fn with_git_path(git_path: impl Into<String>) -> Self {
        Self {
            git_path: git_path.into(),
        }
    }

    async fn config_global(&self, key: &str, value: &str) -> Result<()> {
        let output = Command::new(&self.git_path)
            .args(["config", "--global", key, value])
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::Git(format!(
                "failed to set {}: {}",
                key,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn clone_repo(&self, repo: &Repository, destination: &Path) -> Result<()> {
        let output = Command::new(&self.git_path)
            .arg("clone")
            .arg(&repo.clone_url)
            .arg(destination)
            .output()
            .await
            .map_err(|e| Error::Clone {
                repo: repo.full_name.clone(),
                reason: format!("failed to run {}: {}", self.git_path, e),
            })?;

        if !output.status.success() {
            return Err(Error::Clone {
                repo: repo.full_name.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }

    async fn set_identity(&self, identity: &CommitIdentity) -> Result<()> {
        self.config_global("user.name", &identity.name).await?;
        self.config_global("user.email", &identity.email).await
    }
}

/// Prepares a repository's working directory before its pipeline runs.
pub struct RepoLifecycle<'a> {
    vcs: &'a dyn Vcs,
    identity: &'a CommitIdentity,
    skip_clone: bool,
}

impl<'a> RepoLifecycle<'a> {
    pub fn new(vcs: &'a dyn Vcs, identity: &'a CommitIdentity, skip_clone: bool) -> Self {
        Self {
            vcs,
            identity,
            skip_clone,
        }
    }

    /// Clones the repository (unless skipped) and sets commit identity.
    ///
    /// Identity setup runs even when cloning is skipped.
    pub async fn prepare(&self, repo: &Repository, working_dir: &Path) -> Result<()> {
        self.fresh_clone(repo, working_dir).await?;
        self.vcs.set_identity(self.identity).await
    }

    /// Clones the repository, deleting any existing working directory.
    pub async fn fresh_clone(&self, repo: &Repository, working_dir: &Path) -> Result<()> {
        if self.skip_clone {
            tracing::debug!(repo = %repo.full_name, "skipping clone");
            return Ok(());
        }

        if working_dir.exists() {
            tracing::info!(
                path = %working_dir.display(),
                "existing repository detected, deleting existing directory"
            );
            tokio::fs::remove_dir_all(working_dir)
                .await
                .map_err(|e| Error::Cleanup {
                    path: working_dir.to_path_buf(),
                    reason: e.to_string(),
                })?;
        }

        tracing::info!(repo = %repo.full_name, path = %working_dir.display(), "cloning repository");
        self.vcs.clone_repo(repo, working_dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingVcs {
        calls: Mutex<Vec<String>>,
        fail_clone: bool,
    }

    impl RecordingVcs {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Vcs for RecordingVcs {
        async fn clone_repo(&self, repo: &Repository, destination: &Path) -> Result<()> {
            self.calls.lock().unwrap().push(format!("clone {}", repo.name));
            if self.fail_clone {
                return Err(Error::Clone {
                    repo: repo.full_name.clone(),
                    reason: "permission denied".to_string(),
                });
            }
            std::fs::create_dir_all(destination)?;
            Ok(())
        }

        async fn set_identity(&self, identity: &CommitIdentity) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("identity {}", identity.email));
            Ok(())
        }
    }

    fn repo() -> Repository {
        Repository::new("uccser", "cs-unplugged", "git@github.com:uccser/cs-unplugged.git")
    }

    #[test]
    fn prepare_clones_then_sets_identity() {
        let vcs = RecordingVcs::default();
        let identity = CommitIdentity::default();
        let projects = TempDir::new().unwrap();
        let working_dir = repo().working_dir(projects.path());

        let lifecycle = RepoLifecycle::new(&vcs, &identity, false);
        tokio_test::block_on(lifecycle.prepare(&repo(), &working_dir)).unwrap();

        assert_eq!(
            vcs.calls(),
            vec![
                "clone cs-unplugged".to_string(),
                format!("identity {}", identity.email)
            ]
        );
    }

    #[test]
    fn clone_removes_stale_working_directory() {
        let vcs = RecordingVcs::default();
        let identity = CommitIdentity::default();
        let projects = TempDir::new().unwrap();
        let working_dir = repo().working_dir(projects.path());
        std::fs::create_dir_all(working_dir.join("nested")).unwrap();
        std::fs::write(working_dir.join("nested/stale.txt"), "old").unwrap();

        let lifecycle = RepoLifecycle::new(&vcs, &identity, false);
        tokio_test::block_on(lifecycle.fresh_clone(&repo(), &working_dir)).unwrap();

        assert!(working_dir.exists());
        assert!(!working_dir.join("nested/stale.txt").exists());
    }

    #[test]
    fn skip_clone_keeps_directory_but_still_sets_identity() {
        let vcs = RecordingVcs::default();
        let identity = CommitIdentity::default();
        let projects = TempDir::new().unwrap();
        let working_dir = repo().working_dir(projects.path());
        std::fs::create_dir_all(&working_dir).unwrap();
        std::fs::write(working_dir.join("local.txt"), "keep me").unwrap();

        let lifecycle = RepoLifecycle::new(&vcs, &identity, true);
        tokio_test::block_on(lifecycle.prepare(&repo(), &working_dir)).unwrap();

        assert!(working_dir.join("local.txt").exists());
        assert_eq!(vcs.calls(), vec![format!("identity {}", identity.email)]);
    }

    #[test]
    fn clone_failure_skips_identity() {
        let vcs = RecordingVcs {
            fail_clone: true,
            ..Default::default()
        };
        let identity = CommitIdentity::default();
        let projects = TempDir::new().unwrap();
        let working_dir = repo().working_dir(projects.path());

        let lifecycle = RepoLifecycle::new(&vcs, &identity, false);
        let result = tokio_test::block_on(lifecycle.prepare(&repo(), &working_dir));

        assert!(matches!(result, Err(Error::Clone { .. })));
        assert_eq!(vcs.calls(), vec!["clone cs-unplugged".to_string()]);
    }

    /// Helper to create a temp git repo usable as a clone source.
    fn create_temp_git_repo() -> TempDir {
        let temp_dir = TempDir::new().expect("failed to create temp dir");

        for args in [
            vec!["init"],
            vec!["config", "user.email", "test@test.com"],
            vec!["config", "user.name", "Test User"],
        ] {
            StdCommand::new("git")
                .args(&args)
                .current_dir(temp_dir.path())
                .output()
                .expect("failed to run git");
        }

        std::fs::write(temp_dir.path().join(".arnold.yaml"), "translation: true\n")
            .expect("failed to write config");

        StdCommand::new("git")
            .args(["add", "."])
            .current_dir(temp_dir.path())
            .output()
            .expect("failed to add files");
        StdCommand::new("git")
            .args(["commit", "-m", "Initial commit"])
            .current_dir(temp_dir.path())
            .output()
            .expect("failed to create initial commit");

        temp_dir
    }

    #[tokio::test]
    async fn git_cli_clones_local_repository() {
        let source = create_temp_git_repo();
        let projects = TempDir::new().unwrap();
        let repo = Repository::new("local", "source", source.path().to_string_lossy());
        let destination = repo.working_dir(projects.path());

        GitCli::new()
            .clone_repo(&repo, &destination)
            .await
            .expect("clone should succeed");

        assert!(destination.join(".arnold.yaml").exists());
    }

    #[tokio::test]
    async fn git_cli_reports_clone_failure() {
        let projects = TempDir::new().unwrap();
        let repo = Repository::new("local", "missing", "/nonexistent/repository/path");

        let result = GitCli::new()
            .clone_repo(&repo, &repo.working_dir(projects.path()))
            .await;

        assert!(matches!(result, Err(Error::Clone { repo, .. }) if repo == "local/missing"));
    }
}
