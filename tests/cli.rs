//! Process-level checks of the `arnold` binary.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Writes a `gh` stand-in that records any invocation.
fn fake_gh(bin: &Path, marker: &Path) {
    let script = bin.join("gh");
    std::fs::write(
        &script,
        format!("#!/bin/sh\necho \"$@\" >> {}\nexit 0\n", marker.display()),
    )
    .unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}

fn arnold(dir: &Path, bin: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_arnold"))
        .args(args)
        .current_dir(dir)
        .env_clear()
        .env("PATH", bin)
        .output()
        .expect("failed to run arnold")
}

#[test]
fn missing_token_aborts_before_contacting_github() {
    let work = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();
    let marker = work.path().join("gh-called");
    fake_gh(bin.path(), &marker);

    let output = arnold(work.path(), bin.path(), &["all"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("GITHUB_TOKEN"), "stderr: {stderr}");
    assert!(!marker.exists());
    assert!(!work.path().join("projects").exists());
}

#[test]
fn blank_token_in_secrets_file_counts_as_missing() {
    let work = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();
    let marker = work.path().join("gh-called");
    fake_gh(bin.path(), &marker);
    std::fs::write(work.path().join("secrets.yaml"), "GITHUB_TOKEN: \"\"\n").unwrap();

    let output = arnold(work.path(), bin.path(), &["link-checker"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(!marker.exists());
}

#[test]
fn unknown_task_is_rejected_by_argument_parsing() {
    let work = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();

    let output = arnold(work.path(), bin.path(), &["deploy"]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("all"), "stderr: {stderr}");
}

#[test]
fn missing_explicit_settings_file_fails() {
    let work = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();

    let output = arnold(
        work.path(),
        bin.path(),
        &["all", "--settings", "does-not-exist.toml"],
    );

    assert_eq!(output.status.code(), Some(1));
}
