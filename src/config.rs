//! Per-repository project configuration.
//!
//! Each repository opts in to maintenance by committing a YAML document
//! (`.arnold.yaml`) to its default branch. Only two keys are recognized;
//! everything else in the document is ignored.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::host::{FileContents, Repository, RepositoryHost};

/// Typed contents of a repository's config document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Whether the link checker runs. Defaults to false.
    #[serde(default, rename = "broken-link-checker")]
    pub broken_link_checker: Option<bool>,
    /// Translation flag or settings. Defaults to disabled.
    #[serde(default)]
    pub translation: Option<Translation>,
}

/// The `translation` key: a plain flag or a settings object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Translation {
    Flag(bool),
    Settings(TranslationSettings),
}

/// Translation-service settings carried by the object form of `translation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TranslationSettings {
    /// Allows an object to switch translation off without deleting it.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Translation-service project identifier.
    #[serde(default)]
    pub project_identifier: Option<String>,
    /// Name of the secret holding the translation-service API key.
    #[serde(default)]
    pub api_key_secret: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl ProjectConfig {
    /// Returns true if the link checker is enabled.
    pub fn link_checker_enabled(&self) -> bool {
        self.broken_link_checker.unwrap_or(false)
    }

    /// Returns true if translation stages are enabled.
    pub fn translation_enabled(&self) -> bool {
        match &self.translation {
            Some(Translation::Flag(enabled)) => *enabled,
            Some(Translation::Settings(settings)) => settings.enabled,
            None => false,
        }
    }

    /// Returns translation settings when given in object form.
    pub fn translation_settings(&self) -> Option<&TranslationSettings> {
        match &self.translation {
            Some(Translation::Settings(settings)) => Some(settings),
            _ => None,
        }
    }
}

/// Result of looking up a repository's config document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigStatus {
    /// The repository has no config document; it has opted out.
    Missing,
    /// The document exists but is empty or null.
    Empty,
    /// The document could not be decoded or parsed.
    Invalid(String),
    /// The document parsed successfully.
    Loaded(ProjectConfig),
}

/// Parses a config document from YAML text.
pub fn parse_config(text: &str) -> ConfigStatus {
    if text.trim().is_empty() {
        return ConfigStatus::Empty;
    }
    let value: serde_yaml::Value = match serde_yaml::from_str(text) {
        Ok(value) => value,
        Err(e) => return ConfigStatus::Invalid(format!("YAML file invalid: {}", e)),
    };

    match value {
        serde_yaml::Value::Null => ConfigStatus::Empty,
        serde_yaml::Value::Mapping(ref mapping) if mapping.is_empty() => ConfigStatus::Empty,
        serde_yaml::Value::Mapping(_) => match serde_yaml::from_value(value) {
            Ok(config) => ConfigStatus::Loaded(config),
            Err(e) => ConfigStatus::Invalid(format!("unexpected config value: {}", e)),
        },
        other => ConfigStatus::Invalid(format!(
            "expected a mapping at the top level, found {}",
            describe(&other)
        )),
    }
}

fn describe(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "a boolean",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a sequence",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}

/// Decodes the raw contents returned by the host and parses them.
pub fn decode_config(contents: &FileContents) -> ConfigStatus {
    let bytes = match contents.encoding.as_str() {
        "base64" => {
            let compact: String = contents
                .content
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            match STANDARD.decode(compact) {
                Ok(bytes) => bytes,
                Err(e) => return ConfigStatus::Invalid(format!("invalid base64 content: {}", e)),
            }
        }
        other => {
            return ConfigStatus::Invalid(format!("unsupported content encoding '{}'", other))
        }
    };

    match String::from_utf8(bytes) {
        Ok(text) => parse_config(&text),
        Err(e) => ConfigStatus::Invalid(format!("config is not UTF-8: {}", e)),
    }
}

/// Fetches and parses `file_name` from the repository's default branch.
///
/// Host failures other than "not found" are returned as errors.
pub async fn load_config(
    host: &dyn RepositoryHost,
    repo: &Repository,
    file_name: &str,
) -> Result<ConfigStatus> {
    match host.read_file(repo, file_name).await? {
        None => Ok(ConfigStatus::Missing),
        Some(contents) => Ok(decode_config(&contents)),
    }
}
