//! External command stage runner.

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::project::Project;
use crate::settings::Settings;
use crate::task::Stage;

use super::StageRunner;

/// Number of stderr lines kept for the failure message.
const STDERR_TAIL_LINES: usize = 20;

/// Runner that executes one configured command per stage.
pub struct ExternalStageRunner {
    commands: BTreeMap<Stage, Vec<String>>,
}

impl ExternalStageRunner {
    /// Creates a runner using the stage commands from `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let commands = Stage::ALL
            .into_iter()
            .map(|stage| (stage, settings.stage_command(stage)))
            .collect();
        Self { commands }
    }

    /// Overrides the command for one stage.
    pub fn with_command(mut self, stage: Stage, command: Vec<String>) -> Self {
        self.commands.insert(stage, command);
        self
    }

    /// Builds the environment exported to a stage command.
    fn build_env(&self, stage: Stage, project: &Project<'_>) -> Vec<(String, String)> {
        let repo = project.repository();
        let mut env = vec![
            ("ARNOLD_STAGE".to_string(), stage.name().to_string()),
            ("ARNOLD_REPO".to_string(), repo.full_name.clone()),
            ("ARNOLD_REPO_NAME".to_string(), repo.name.clone()),
            ("ARNOLD_BOT_LOGIN".to_string(), project.bot_login().to_string()),
        ];

        if let Some(token) = project.secrets().get("GITHUB_TOKEN") {
            env.push(("GITHUB_TOKEN".to_string(), token.to_string()));
        }

        if stage.is_translation() {
            if let Some(key) = project.translation_api_key() {
                env.push(("CROWDIN_API_KEY".to_string(), key.to_string()));
            }
            if let Some(identifier) = project
                .config()
                .translation_settings()
                .and_then(|s| s.project_identifier.as_ref())
            {
                env.push(("CROWDIN_PROJECT_IDENTIFIER".to_string(), identifier.clone()));
            }
        }

        env
    }
}

#[async_trait]
impl StageRunner for ExternalStageRunner {
    async fn run(&self, stage: Stage, project: &Project<'_>) -> Result<()> {
        let command = self.commands.get(&stage).ok_or_else(|| Error::Stage {
            stage,
            reason: "no command configured".to_string(),
        })?;
        let (program, args) = command.split_first().ok_or_else(|| Error::Stage {
            stage,
            reason: "empty command".to_string(),
        })?;

        tracing::info!(
            stage = %stage,
            program = %program,
            working_dir = %project.working_dir().display(),
            "running stage"
        );

        let mut child = Command::new(program)
            .args(args)
            .current_dir(project.working_dir())
            .envs(self.build_env(stage, project))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Stage {
                stage,
                reason: format!("failed to spawn {}: {}", program, e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| Error::Stage {
            stage,
            reason: "stdout was not captured".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| Error::Stage {
            stage,
            reason: "stderr was not captured".to_string(),
        })?;

        let mut stdout_reader = Some(BufReader::new(stdout));
        let mut stderr_reader = Some(BufReader::new(stderr));
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        // Both pipes are drained until EOF; a reader is dropped on a read
        // error so the child sees a closed pipe instead of blocking.
        while stdout_reader.is_some() || stderr_reader.is_some() {
            tokio::select! {
                read = next_line(&mut stdout_reader, &mut stdout_buf), if stdout_reader.is_some() => match read {
                    Ok(Some(line)) => {
                        tracing::info!(stage = %stage, "{}", project.redact(&line));
                    }
                    Ok(None) => stdout_reader = None,
                    Err(e) => {
                        tracing::warn!(stage = %stage, error = %e, "failed to read stage stdout");
                        stdout_reader = None;
                    }
                },
                read = next_line(&mut stderr_reader, &mut stderr_buf), if stderr_reader.is_some() => match read {
                    Ok(Some(line)) => {
                        let line = project.redact(&line);
                        tracing::warn!(stage = %stage, "{}", line);
                        if stderr_tail.len() == STDERR_TAIL_LINES {
                            stderr_tail.pop_front();
                        }
                        stderr_tail.push_back(line);
                    }
                    Ok(None) => stderr_reader = None,
                    Err(e) => {
                        tracing::warn!(stage = %stage, error = %e, "failed to read stage stderr");
                        stderr_reader = None;
                    }
                },
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            let tail: Vec<String> = stderr_tail.into_iter().collect();
            return Err(Error::Stage {
                stage,
                reason: format!("{} exited with {}: {}", program, status, tail.join("\n")),
            });
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "external"
    }
}

/// Reads one line from `reader`, decoding invalid UTF-8 lossily.
///
/// Returns `None` at EOF. Partial reads stay in `buf` across cancellation,
/// so this is safe to race in `tokio::select!`.
async fn next_line<R>(reader: &mut Option<R>, buf: &mut Vec<u8>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let Some(reader) = reader.as_mut() else {
        return std::future::pending().await;
    };
    let read = reader.read_until(b'\n', buf).await?;
    if read == 0 && buf.is_empty() {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(['\n', '\r'])
        .to_string();
    buf.clear();
    Ok(Some(line))
}
