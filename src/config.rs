//! Repository configuration (`.github/build-numbers.toml`).
//!
//! Everything here has a default, so the file is optional. Action inputs
//! (CLI flags / `INPUT_*` variables) override the file through
//! [`Overrides`].

use std::fmt;
use std::path::{Path, PathBuf};

use build_numbers_git::BranchName;
use serde::Deserialize;

use crate::protocol::{Identity, Settings};
use crate::store::DEFAULT_FILE_NAME;
use crate::workspace::WorkspaceSpec;

/// Config file location, relative to the repository root.
pub const DEFAULT_CONFIG_PATH: &str = ".github/build-numbers.toml";

/// Default storage branch.
pub const DEFAULT_BRANCH: &str = "build-numbers";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level build-numbers configuration.
///
/// Missing fields use defaults. Missing file → all defaults (no error).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildNumbersConfig {
    /// Remote and committer identity.
    #[serde(default)]
    pub git: GitConfig,

    /// Where the counters are stored.
    #[serde(default)]
    pub store: StoreConfig,

    /// Push-race and worktree behaviour.
    #[serde(default)]
    pub sync: SyncConfig,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Remote and committer identity.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitConfig {
    /// Remote to fetch from and push to (default: `"origin"`).
    #[serde(default = "default_remote")]
    pub remote: String,

    /// `user.name` for counter commits.
    #[serde(default = "default_user_name")]
    pub user_name: String,

    /// `user.email` for counter commits.
    #[serde(default = "default_user_email")]
    pub user_email: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            user_name: default_user_name(),
            user_email: default_user_email(),
        }
    }
}

fn default_remote() -> String {
    "origin".to_owned()
}

fn default_user_name() -> String {
    "GitHub Action".to_owned()
}

fn default_user_email() -> String {
    "action@github.com".to_owned()
}

/// Storage branch and document.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Storage branch (default: `"build-numbers"`).
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Counter document at the branch root (default: `"build_numbers.json"`).
    #[serde(default = "default_file_name")]
    pub file_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            branch: default_branch(),
            file_name: default_file_name(),
        }
    }
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_owned()
}

fn default_file_name() -> String {
    DEFAULT_FILE_NAME.to_owned()
}

/// Push-race and worktree behaviour.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Rebuild-and-retry attempts after a rejected push (default: 0).
    #[serde(default)]
    pub push_retries: u32,

    /// Parent directory for per-invocation worktrees (default: temp dir).
    #[serde(default)]
    pub workspace_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// Values supplied by the invoking environment that beat the file.
///
/// Empty strings count as "not supplied": GitHub passes unset inputs as
/// empty `INPUT_*` variables.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overrides {
    /// `branch` input.
    pub branch: Option<String>,
    /// `--remote`.
    pub remote: Option<String>,
    /// `--push-retries`.
    pub push_retries: Option<u32>,
}

/// Parse a GitHub Actions boolean input.
///
/// Accepts exactly the YAML 1.2 core-schema spellings GitHub accepts
/// (`true`, `True`, `TRUE`, `false`, `False`, `FALSE`). An empty value means
/// the input was not supplied and yields the default, `true`.
///
/// # Errors
/// Returns a message naming the accepted spellings for anything else.
pub fn parse_action_bool(value: &str) -> Result<bool, String> {
    match value.trim() {
        "" | "true" | "True" | "TRUE" => Ok(true),
        "false" | "False" | "FALSE" => Ok(false),
        other => Err(format!(
            "{other:?} is not a boolean; use one of true | True | TRUE | false | False | FALSE"
        )),
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading or applying a configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl BuildNumbersConfig {
    /// Load configuration from a TOML file.
    ///
    /// - If the file does not exist, returns all defaults (not an error).
    /// - If the file exists but contains invalid TOML or unknown fields,
    ///   returns a [`ConfigError`] with line-level detail.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError::invalid(message)
        })
    }

    /// Combine the file with `overrides` into validated protocol settings.
    ///
    /// # Errors
    /// Returns `ConfigError` if the branch name, remote or file name is
    /// unusable.
    pub fn resolve(&self, overrides: &Overrides) -> Result<Settings, ConfigError> {
        let branch = non_empty(overrides.branch.as_ref()).unwrap_or(&self.store.branch);
        let branch = BranchName::new(branch).map_err(|e| ConfigError::invalid(e.to_string()))?;

        let remote = non_empty(overrides.remote.as_ref()).unwrap_or(&self.git.remote);
        if remote.trim().is_empty() {
            return Err(ConfigError::invalid("git.remote must not be empty"));
        }

        validate_file_name(&self.store.file_name)?;

        Ok(Settings {
            workspace: WorkspaceSpec {
                branch,
                remote: remote.to_owned(),
                file_name: self.store.file_name.clone(),
                parent_dir: self.sync.workspace_dir.clone(),
            },
            identity: Identity {
                name: self.git.user_name.clone(),
                email: self.git.user_email.clone(),
            },
            push_retries: overrides.push_retries.unwrap_or(self.sync.push_retries),
        })
    }
}

/// The document must sit at the branch root under a plain name.
fn validate_file_name(name: &str) -> Result<(), ConfigError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name == ".git"
        || name.contains('/')
        || name.contains('\\');
    if bad {
        return Err(ConfigError::invalid(format!(
            "store.file_name {name:?} must be a plain file name"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
