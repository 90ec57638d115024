//! Secret loading and validation.
//!
//! Secrets are resolved once at startup from the process environment and an
//! optional local secrets file. Required secrets are validated together so a
//! single run reports everything that is missing.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable prefix for translation-service API keys.
pub const TRANSLATION_KEY_PREFIX: &str = "CROWDIN_API_KEY";

/// A secret that must be present before any repository is processed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequiredSecret {
    /// Name of the secret (environment variable or secrets file key).
    pub name: String,
    /// Human-readable description of what the secret is used for.
    pub purpose: String,
}

impl RequiredSecret {
    pub fn new(name: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            purpose: purpose.into(),
        }
    }
}

impl fmt::Display for RequiredSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.purpose)
    }
}

/// Secrets every run needs.
pub fn default_required_secrets() -> Vec<RequiredSecret> {
    vec![RequiredSecret::new(
        "GITHUB_TOKEN",
        "OAuth token to use for GitHub API requests",
    )]
}

/// Resolves secrets from the environment and an optional secrets file.
pub struct SecretStore {
    /// Snapshot of the environment taken at construction.
    env: HashMap<String, String>,
    /// Optional YAML file of `name: value` pairs.
    secrets_file: Option<PathBuf>,
}

impl SecretStore {
    /// Creates a store backed by the current process environment.
    pub fn from_env() -> Self {
        Self::with_env(std::env::vars().collect())
    }

    /// Creates a store backed by the given environment snapshot.
    pub fn with_env(env: HashMap<String, String>) -> Self {
        Self {
            env,
            secrets_file: None,
        }
    }

    /// Sets the secrets file consulted after the environment.
    ///
    /// A file that does not exist is treated as empty.
    pub fn with_secrets_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.secrets_file = Some(path.into());
        self
    }

    /// Loads all secrets and validates that every required one is present.
    ///
    /// Returns [`SecretError::Missing`] listing every absent secret.
    pub fn load(&self, required: &[RequiredSecret]) -> Result<SecretSet, SecretError> {
        let mut values = match &self.secrets_file {
            Some(path) => read_secrets_file(path)?,
            None => HashMap::new(),
        };

        for (name, value) in &self.env {
            if name.starts_with(TRANSLATION_KEY_PREFIX) {
                values.insert(name.clone(), value.clone());
            }
        }
        for secret in required {
            if let Some(value) = self.env.get(&secret.name) {
                values.insert(secret.name.clone(), value.clone());
            }
        }

        let missing: Vec<RequiredSecret> = required
            .iter()
            .filter(|secret| {
                values
                    .get(&secret.name)
                    .map_or(true, |value| value.trim().is_empty())
            })
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(SecretError::Missing(missing));
        }

        values.retain(|_, value| !value.trim().is_empty());
        Ok(SecretSet::new(values).with_environment(self.env.clone()))
    }
}

fn read_secrets_file(path: &Path) -> Result<HashMap<String, String>, SecretError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        SecretError::Unreadable(format!("cannot read '{}': {}", path.display(), e))
    })?;

    if content.trim().is_empty() {
        return Ok(HashMap::new());
    }

    let parsed: Option<HashMap<String, String>> = serde_yaml::from_str(&content).map_err(|e| {
        SecretError::Unreadable(format!("cannot parse '{}': {}", path.display(), e))
    })?;

    Ok(parsed.unwrap_or_default())
}

/// Immutable set of resolved secrets.
#[derive(Clone, Default)]
pub struct SecretSet {
    /// Resolved secrets (name -> value).
    values: HashMap<String, String>,
    /// Values sorted by length descending so longer secrets are redacted first.
    redaction_order: Vec<(String, String)>,
    /// Environment snapshot for secrets named only by a project's config.
    environment: HashMap<String, String>,
}

impl SecretSet {
    /// Creates a secret set from resolved values.
    pub fn new(values: HashMap<String, String>) -> Self {
        let mut redaction_order: Vec<(String, String)> = values
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        redaction_order.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(&b.0)));

        Self {
            values,
            redaction_order,
            environment: HashMap::new(),
        }
    }

    /// Attaches the environment consulted by [`SecretSet::lookup`].
    pub fn with_environment(mut self, environment: HashMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    /// Returns the value of a secret, if loaded.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Returns a loaded secret, falling back to the environment snapshot.
    ///
    /// Blank environment values count as absent.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).or_else(|| {
            self.environment
                .get(name)
                .map(String::as_str)
                .filter(|value| !value.trim().is_empty())
        })
    }

    /// Returns the value of a secret or [`SecretError::NotFound`].
    pub fn require(&self, name: &str) -> Result<&str, SecretError> {
        self.get(name)
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }

    /// Returns true if a secret with this name is loaded.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Returns the number of loaded secrets.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no secrets are loaded.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Redacts all known secret values from a string.
    ///
    /// Secret values are replaced with `[REDACTED:<name>]`.
    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();

        for (name, value) in &self.redaction_order {
            result = result.replace(value, &format!("[REDACTED:{}]", name));
        }

        result
    }
}

impl fmt::Debug for SecretSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.values.keys().collect();
        names.sort();
        f.debug_struct("SecretSet").field("names", &names).finish()
    }
}

/// Error type for secret operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    /// One or more required secrets were absent at startup.
    Missing(Vec<RequiredSecret>),
    /// A secret needed by a project was not loaded.
    NotFound(String),
    /// The secrets file exists but could not be read or parsed.
    Unreadable(String),
}

impl fmt::Display for SecretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretError::Missing(missing) => {
                let list: Vec<String> = missing.iter().map(ToString::to_string).collect();
                write!(f, "missing required secrets: {}", list.join(", "))
            }
            SecretError::NotFound(name) => write!(f, "secret not found: {}", name),
            SecretError::Unreadable(msg) => write!(f, "secrets file unreadable: {}", msg),
        }
    }
}

impl std::error::Error for SecretError {}
