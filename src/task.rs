//! Pipeline stages and task keyword selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Keyword that selects every eligible stage.
pub const ALL_TASKS_KEYWORD: &str = "all";

/// One step of a repository pipeline.
///
/// Variants are declared in execution order; [`Stage::ALL`] is the only
/// order the orchestrator ever runs them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Check the repository for broken links.
    LinkChecker,
    /// Regenerate source message files for translation.
    UpdateSourceMessageFiles,
    /// Upload source files to the translation service.
    PushSourceFiles,
    /// Ask the translation service to build the project.
    BuildProject,
    /// Download completed translations.
    PullTranslations,
}

impl Stage {
    /// Every stage, in pipeline order.
    pub const ALL: [Stage; 5] = [
        Stage::LinkChecker,
        Stage::UpdateSourceMessageFiles,
        Stage::PushSourceFiles,
        Stage::BuildProject,
        Stage::PullTranslations,
    ];

    /// Returns the stage name as used on the command line and in settings.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::LinkChecker => "link-checker",
            Stage::UpdateSourceMessageFiles => "update-source-message-files",
            Stage::PushSourceFiles => "push-source-files",
            Stage::BuildProject => "build-project",
            Stage::PullTranslations => "pull-translations",
        }
    }

    /// Returns true for stages gated by the `translation` config flag.
    pub fn is_translation(&self) -> bool {
        !matches!(self, Stage::LinkChecker)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| format!("unknown stage '{}'", s))
    }
}

/// The task requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKeyword {
    /// Run every stage the repository config enables.
    All,
    /// Run only the named stage.
    Only(Stage),
}

impl TaskKeyword {
    /// Returns true if `stage` should be attempted under this keyword.
    pub fn selects(&self, stage: Stage) -> bool {
        match self {
            TaskKeyword::All => true,
            TaskKeyword::Only(only) => *only == stage,
        }
    }

    /// Returns every accepted keyword, for usage messages.
    pub fn valid_keywords() -> Vec<&'static str> {
        std::iter::once(ALL_TASKS_KEYWORD)
            .chain(Stage::ALL.iter().map(Stage::name))
            .collect()
    }
}

impl fmt::Display for TaskKeyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKeyword::All => f.write_str(ALL_TASKS_KEYWORD),
            TaskKeyword::Only(stage) => stage.fmt(f),
        }
    }
}

impl FromStr for TaskKeyword {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ALL_TASKS_KEYWORD {
            return Ok(TaskKeyword::All);
        }
        s.parse::<Stage>().map(TaskKeyword::Only).map_err(|_| {
            format!(
                "unknown task '{}', expected one of: {}",
                s,
                TaskKeyword::valid_keywords().join(", ")
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_declared_in_pipeline_order() {
        let names: Vec<_> = Stage::ALL.iter().map(Stage::name).collect();
        assert_eq!(
            names,
            vec![
                "link-checker",
                "update-source-message-files",
                "push-source-files",
                "build-project",
                "pull-translations",
            ]
        );

        let mut sorted = Stage::ALL;
        sorted.sort();
        assert_eq!(sorted, Stage::ALL);
    }

    #[test]
    fn wildcard_selects_every_stage() {
        for stage in Stage::ALL {
            assert!(TaskKeyword::All.selects(stage));
        }
    }

    #[test]
    fn named_keyword_selects_only_its_stage() {
        let keyword = TaskKeyword::Only(Stage::BuildProject);

        let selected: Vec<_> = Stage::ALL
            .into_iter()
            .filter(|stage| keyword.selects(*stage))
            .collect();

        assert_eq!(selected, vec![Stage::BuildProject]);
    }

    #[test]
    fn keyword_parses_exact_names() {
        assert_eq!("all".parse::<TaskKeyword>(), Ok(TaskKeyword::All));
        assert_eq!(
            "pull-translations".parse::<TaskKeyword>(),
            Ok(TaskKeyword::Only(Stage::PullTranslations))
        );
    }

    #[test]
    fn keyword_rejects_unknown_or_inexact_names() {
        assert!("ALL".parse::<TaskKeyword>().is_err());
        assert!("link_checker".parse::<TaskKeyword>().is_err());

        let err = "deploy".parse::<TaskKeyword>().unwrap_err();
        assert!(err.contains("deploy"));
        assert!(err.contains("build-project"));
    }

    #[test]
    fn only_link_checker_is_not_a_translation_stage() {
        let translation: Vec<_> = Stage::ALL
            .into_iter()
            .filter(Stage::is_translation)
            .collect();
        assert_eq!(translation.len(), 4);
        assert!(!Stage::LinkChecker.is_translation());
    }

    #[test]
    fn stage_display_matches_name() {
        assert_eq!(Stage::PushSourceFiles.to_string(), "push-source-files");
        assert_eq!(TaskKeyword::All.to_string(), "all");
    }
}
