//! Per-repository project and its stage pipeline.
//!
//! A [`Project`] is created only for a repository whose config loaded
//! successfully. [`ProjectOrchestrator`] runs the project's enabled stages in
//! [`Stage::ALL`] order and stops at the first failing stage; later
//! repositories are unaffected.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::ProjectConfig;
use crate::error::{Error, Result};
use crate::host::Repository;
use crate::runner::StageRunner;
use crate::secrets::{SecretError, SecretSet, TRANSLATION_KEY_PREFIX};
use crate::task::{Stage, TaskKeyword};
use crate::timing::{format_elapsed, Checkpoint};

/// Options given for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Task keyword selecting stages.
    pub task: TaskKeyword,
    /// Reuse existing working directories instead of recloning.
    pub skip_clone: bool,
    /// Restrict the run to this repository name.
    pub repo: Option<String>,
}

impl RunOptions {
    pub fn new(task: TaskKeyword) -> Self {
        Self {
            task,
            skip_clone: false,
            repo: None,
        }
    }

    pub fn with_skip_clone(mut self, skip_clone: bool) -> Self {
        self.skip_clone = skip_clone;
        self
    }

    pub fn with_repo(mut self, repo: Option<String>) -> Self {
        self.repo = repo;
        self
    }
}

/// The unit of work for one repository.
pub struct Project<'a> {
    repo: &'a Repository,
    config: ProjectConfig,
    secrets: &'a SecretSet,
    options: &'a RunOptions,
    working_dir: PathBuf,
    bot_login: &'a str,
    checkpoint: Checkpoint,
    /// Resolved translation key as `(secret name, value)`.
    translation_key: Option<(String, String)>,
}

impl<'a> Project<'a> {
    pub fn new(
        repo: &'a Repository,
        config: ProjectConfig,
        secrets: &'a SecretSet,
        options: &'a RunOptions,
        working_dir: PathBuf,
        bot_login: &'a str,
    ) -> Self {
        Self {
            repo,
            config,
            secrets,
            options,
            working_dir,
            bot_login,
            checkpoint: Checkpoint::start(),
            translation_key: None,
        }
    }

    pub fn repository(&self) -> &Repository {
        self.repo
    }

    pub fn name(&self) -> &str {
        &self.repo.name
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn secrets(&self) -> &SecretSet {
        self.secrets
    }

    pub fn options(&self) -> &RunOptions {
        self.options
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn bot_login(&self) -> &str {
        self.bot_login
    }

    /// Translation-service API key, once resolved.
    pub fn translation_api_key(&self) -> Option<&str> {
        self.translation_key.as_ref().map(|(_, value)| value.as_str())
    }

    /// Redacts loaded secrets and the resolved translation key from `text`.
    pub fn redact(&self, text: &str) -> String {
        let redacted = self.secrets.redact(text);
        match &self.translation_key {
            Some((name, value)) if !value.is_empty() => {
                redacted.replace(value.as_str(), &format!("[REDACTED:{}]", name))
            }
            _ => redacted,
        }
    }

    /// Logs time since the last checkpoint and resets it.
    pub fn lap(&mut self, what: &str) -> Duration {
        let elapsed = self.checkpoint.lap();
        tracing::info!(
            repo = %self.repo.full_name,
            elapsed = %format_elapsed(elapsed),
            "{} finished",
            what
        );
        elapsed
    }

    /// Secret names tried, in order, for the translation-service key.
    pub fn translation_key_candidates(&self) -> Vec<String> {
        if let Some(name) = self
            .config
            .translation_settings()
            .and_then(|s| s.api_key_secret.clone())
        {
            return vec![name];
        }
        vec![
            translation_secret_name(&self.repo.name),
            TRANSLATION_KEY_PREFIX.to_string(),
        ]
    }

    /// Resolves the translation-service key.
    ///
    /// Names missing from the loaded set are looked up in the startup
    /// environment snapshot.
    pub fn resolve_translation_key(&mut self) -> Result<()> {
        let candidates = self.translation_key_candidates();
        let found = candidates.iter().find_map(|name| {
            self.secrets
                .lookup(name)
                .map(|value| (name.clone(), value.to_string()))
        });
        match found {
            Some(key) => {
                self.translation_key = Some(key);
                Ok(())
            }
            None => Err(Error::Secret(SecretError::NotFound(candidates.join(" or ")))),
        }
    }
}

/// Per-repository secret name for the translation-service key.
///
/// `cs-field-guide` maps to `CROWDIN_API_KEY_CS_FIELD_GUIDE`.
pub fn translation_secret_name(repo_name: &str) -> String {
    let suffix: String = repo_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}", TRANSLATION_KEY_PREFIX, suffix)
}

/// Returns the stages that will be attempted, in pipeline order.
///
/// A stage is eligible when its config flag is set and the task keyword
/// selects it.
pub fn eligible_stages(config: &ProjectConfig, task: TaskKeyword) -> Vec<Stage> {
    Stage::ALL
        .into_iter()
        .filter(|stage| {
            let enabled = if stage.is_translation() {
                config.translation_enabled()
            } else {
                config.link_checker_enabled()
            };
            enabled && task.selects(*stage)
        })
        .collect()
}

/// Timing of one attempted stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed: Duration,
    pub succeeded: bool,
}

/// What happened when a project's pipeline ran.
#[derive(Debug)]
pub struct PipelineReport {
    /// Attempted stages in order, including a failed final stage.
    pub stages: Vec<StageTiming>,
    /// The error that stopped the pipeline, if any.
    pub failure: Option<Error>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Returns the stages that completed successfully.
    pub fn completed(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|t| t.succeeded)
            .map(|t| t.stage)
            .collect()
    }
}

/// Runs a project's eligible stages through a [`StageRunner`].
pub struct ProjectOrchestrator<'r> {
    runner: &'r dyn StageRunner,
}

impl<'r> ProjectOrchestrator<'r> {
    pub fn new(runner: &'r dyn StageRunner) -> Self {
        Self { runner }
    }

    /// Runs the pipeline for `project`.
    ///
    /// Elapsed time is logged after every attempted stage, whether it
    /// succeeded or failed. The first failure stops the pipeline.
    pub async fn run(&self, project: &mut Project<'_>) -> PipelineReport {
        let stages = eligible_stages(project.config(), project.options().task);
        let mut report = PipelineReport {
            stages: Vec::with_capacity(stages.len()),
            failure: None,
        };

        if stages.is_empty() {
            tracing::info!(repo = %project.repository().full_name, "no stages selected");
            return report;
        }

        if stages.iter().any(Stage::is_translation) {
            if let Err(e) = project.resolve_translation_key() {
                report.failure = Some(e);
                return report;
            }
        }

        for stage in stages {
            tracing::info!(
                repo = %project.repository().full_name,
                runner = %self.runner.name(),
                stage = %stage,
                "starting stage"
            );
            let result = self.runner.run(stage, project).await;
            let elapsed = project.lap(stage.name());

            match result {
                Ok(()) => report.stages.push(StageTiming {
                    stage,
                    elapsed,
                    succeeded: true,
                }),
                Err(e) => {
                    tracing::error!(
                        repo = %project.repository().full_name,
                        stage = %stage,
                        error = %e,
                        "stage failed, skipping remaining stages"
                    );
                    report.stages.push(StageTiming {
                        stage,
                        elapsed,
                        succeeded: false,
                    });
                    report.failure = Some(e);
                    break;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::config::{Translation, TranslationSettings};

    struct ScriptedRunner {
        calls: Mutex<Vec<Stage>>,
        fail_on: Option<Stage>,
    }

    impl ScriptedRunner {
        fn new(fail_on: Option<Stage>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on,
            }
        }

        fn calls(&self) -> Vec<Stage> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StageRunner for ScriptedRunner {
        async fn run(&self, stage: Stage, _project: &Project<'_>) -> Result<()> {
            self.calls.lock().unwrap().push(stage);
            if self.fail_on == Some(stage) {
                return Err(Error::Stage {
                    stage,
                    reason: "exit status 1".to_string(),
                });
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn config(link_checker: bool, translation: bool) -> ProjectConfig {
        ProjectConfig {
            broken_link_checker: Some(link_checker),
            translation: Some(Translation::Flag(translation)),
        }
    }

    fn secrets_with(pairs: &[(&str, &str)]) -> SecretSet {
        SecretSet::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        )
    }

    fn run_pipeline(
        config: ProjectConfig,
        task: TaskKeyword,
        runner: &ScriptedRunner,
        secrets: &SecretSet,
    ) -> PipelineReport {
        let repo = Repository::new("uccser", "cs-field-guide", "unused");
        let options = RunOptions::new(task);
        let mut project = Project::new(
            &repo,
            config,
            secrets,
            &options,
            PathBuf::from("projects/cs-field-guide"),
            "uccser-bot",
        );
        let orchestrator = ProjectOrchestrator::new(runner);
        tokio_test::block_on(orchestrator.run(&mut project))
    }

    #[test]
    fn all_stages_run_in_fixed_order() {
        let runner = ScriptedRunner::new(None);
        let secrets = secrets_with(&[("CROWDIN_API_KEY", "k")]);

        let report = run_pipeline(config(true, true), TaskKeyword::All, &runner, &secrets);

        assert!(report.is_success());
        assert_eq!(runner.calls(), Stage::ALL.to_vec());
        assert_eq!(report.completed(), Stage::ALL.to_vec());
    }

    #[test]
    fn translation_disabled_runs_only_link_checker() {
        let runner = ScriptedRunner::new(None);
        let secrets = SecretSet::default();

        let report = run_pipeline(config(true, false), TaskKeyword::All, &runner, &secrets);

        assert!(report.is_success());
        assert_eq!(runner.calls(), vec![Stage::LinkChecker]);
    }

    #[test]
    fn named_task_runs_only_that_stage() {
        let runner = ScriptedRunner::new(None);
        let secrets = secrets_with(&[("CROWDIN_API_KEY", "k")]);

        run_pipeline(
            config(true, true),
            TaskKeyword::Only(Stage::BuildProject),
            &runner,
            &secrets,
        );

        assert_eq!(runner.calls(), vec![Stage::BuildProject]);
    }

    #[test]
    fn named_task_for_disabled_feature_runs_nothing() {
        let runner = ScriptedRunner::new(None);
        let secrets = SecretSet::default();

        let report = run_pipeline(
            config(true, false),
            TaskKeyword::Only(Stage::BuildProject),
            &runner,
            &secrets,
        );

        assert!(report.is_success());
        assert!(report.stages.is_empty());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn stage_failure_stops_remaining_stages() {
        let runner = ScriptedRunner::new(Some(Stage::PushSourceFiles));
        let secrets = secrets_with(&[("CROWDIN_API_KEY", "k")]);

        let report = run_pipeline(config(true, true), TaskKeyword::All, &runner, &secrets);

        assert_eq!(
            runner.calls(),
            vec![
                Stage::LinkChecker,
                Stage::UpdateSourceMessageFiles,
                Stage::PushSourceFiles
            ]
        );
        assert!(matches!(
            report.failure,
            Some(Error::Stage { stage: Stage::PushSourceFiles, .. })
        ));
        assert_eq!(
            report.completed(),
            vec![Stage::LinkChecker, Stage::UpdateSourceMessageFiles]
        );
    }

    #[test]
    fn failed_stage_still_records_elapsed_time() {
        let runner = ScriptedRunner::new(Some(Stage::LinkChecker));
        let secrets = SecretSet::default();

        let report = run_pipeline(config(true, false), TaskKeyword::All, &runner, &secrets);

        assert_eq!(report.stages.len(), 1);
        assert_eq!(report.stages[0].stage, Stage::LinkChecker);
        assert!(!report.stages[0].succeeded);
    }

    #[test]
    fn missing_translation_key_fails_before_any_stage() {
        let runner = ScriptedRunner::new(None);
        let secrets = SecretSet::default();

        let report = run_pipeline(config(true, true), TaskKeyword::All, &runner, &secrets);

        assert!(runner.calls().is_empty());
        assert!(matches!(
            report.failure,
            Some(Error::Secret(SecretError::NotFound(_)))
        ));
    }

    #[test]
    fn link_checker_task_does_not_need_translation_key() {
        let runner = ScriptedRunner::new(None);
        let secrets = SecretSet::default();

        let report = run_pipeline(
            config(true, true),
            TaskKeyword::Only(Stage::LinkChecker),
            &runner,
            &secrets,
        );

        assert!(report.is_success());
        assert_eq!(runner.calls(), vec![Stage::LinkChecker]);
    }

    #[test]
    fn per_repository_translation_key_takes_precedence() {
        let repo = Repository::new("uccser", "cs-field-guide", "unused");
        let secrets = secrets_with(&[
            ("CROWDIN_API_KEY", "shared"),
            ("CROWDIN_API_KEY_CS_FIELD_GUIDE", "specific"),
        ]);
        let options = RunOptions::new(TaskKeyword::All);
        let mut project = Project::new(
            &repo,
            config(false, true),
            &secrets,
            &options,
            PathBuf::from("projects/cs-field-guide"),
            "uccser-bot",
        );

        project.resolve_translation_key().unwrap();

        assert_eq!(project.translation_api_key(), Some("specific"));
    }

    #[test]
    fn configured_secret_name_is_the_only_candidate() {
        let repo = Repository::new("uccser", "cs-field-guide", "unused");
        let secrets = secrets_with(&[("CROWDIN_API_KEY", "shared")]);
        let options = RunOptions::new(TaskKeyword::All);
        let config = ProjectConfig {
            broken_link_checker: None,
            translation: Some(Translation::Settings(TranslationSettings {
                enabled: true,
                project_identifier: None,
                api_key_secret: Some("CROWDIN_CUSTOM".to_string()),
            })),
        };
        let mut project = Project::new(
            &repo,
            config,
            &secrets,
            &options,
            PathBuf::from("projects/cs-field-guide"),
            "uccser-bot",
        );

        assert_eq!(project.translation_key_candidates(), vec!["CROWDIN_CUSTOM"]);
        assert!(project.resolve_translation_key().is_err());
    }

    #[test]
    fn configured_secret_resolves_from_environment() {
        let repo = Repository::new("uccser", "cs-field-guide", "unused");
        let env = HashMap::from([
            ("GITHUB_TOKEN".to_string(), "ghp_token".to_string()),
            ("MY_TRANSLATION_TOKEN".to_string(), "custom-key".to_string()),
        ]);
        let secrets = crate::secrets::SecretStore::with_env(env)
            .load(&crate::secrets::default_required_secrets())
            .unwrap();
        let options = RunOptions::new(TaskKeyword::All);
        let config = ProjectConfig {
            broken_link_checker: None,
            translation: Some(Translation::Settings(TranslationSettings {
                enabled: true,
                project_identifier: None,
                api_key_secret: Some("MY_TRANSLATION_TOKEN".to_string()),
            })),
        };
        let mut project = Project::new(
            &repo,
            config,
            &secrets,
            &options,
            PathBuf::from("projects/cs-field-guide"),
            "uccser-bot",
        );

        project.resolve_translation_key().unwrap();

        assert_eq!(project.translation_api_key(), Some("custom-key"));
        assert_eq!(
            project.redact("uploading with custom-key"),
            "uploading with [REDACTED:MY_TRANSLATION_TOKEN]"
        );
    }

    #[test]
    fn translation_secret_name_is_upper_snake_case() {
        assert_eq!(
            translation_secret_name("cs-field-guide"),
            "CROWDIN_API_KEY_CS_FIELD_GUIDE"
        );
        assert_eq!(
            translation_secret_name("dthm4kaiako"),
            "CROWDIN_API_KEY_DTHM4KAIAKO"
        );
    }

    #[test]
    fn eligible_stages_respects_flags_and_keyword() {
        assert_eq!(
            eligible_stages(&config(false, true), TaskKeyword::All),
            vec![
                Stage::UpdateSourceMessageFiles,
                Stage::PushSourceFiles,
                Stage::BuildProject,
                Stage::PullTranslations
            ]
        );
        assert!(eligible_stages(&ProjectConfig::default(), TaskKeyword::All).is_empty());
        assert!(
            eligible_stages(&config(false, true), TaskKeyword::Only(Stage::LinkChecker))
                .is_empty()
        );
    }
}
