//! Configuration management.
//!
//! This module resolves on-disk locations, loads the optional JSON config
//! file and applies environment overrides.
//!
//! # Layout
//!
//! Everything lives under `~/.crowd-desk/`:
//! - **Database**: `data/tickets.db` (or `test/tickets.db` in test mode)
//! - **Client cache**: `cache/tickets.json`
//! - **Config**: `config.json`

use crate::error::{Error, Result};
use crate::model::Section;
use crate::sheets::GoogleSheetsBackend;
use crate::storage::DEFAULT_DELETER;
use crate::sync::MergePolicy;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Poll interval used when the config does not set one.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// Spreadsheet connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SheetsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,
    /// Tab name overrides per section.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tabs: BTreeMap<Section, String>,
}

/// Who may submit tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Creators {
    /// Allowed in every section.
    pub all: Vec<String>,
    /// Additionally allowed in one section.
    pub per_section: BTreeMap<Section, Vec<String>>,
}

impl Default for Creators {
    fn default() -> Self {
        Self {
            all: vec![DEFAULT_DELETER.to_string()],
            per_section: BTreeMap::from([(
                Section::TimeTable,
                vec![DEFAULT_DELETER.to_string(), "Mai".to_string()],
            )]),
        }
    }
}

/// Contents of `config.json`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub sheets: SheetsConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleter: Option<String>,
    pub creators: Creators,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
    pub merge_policy: MergePolicy,
}

impl Config {
    /// Apply `CROWD_*` overrides looked up through `var`.
    #[must_use]
    pub fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| var(name).filter(|v| !v.trim().is_empty());
        if let Some(id) = var("CROWD_SHEET_ID") {
            self.sheets.spreadsheet_id = Some(id);
        }
        if let Some(token) = var("CROWD_SHEET_TOKEN") {
            self.sheets.access_token = Some(token);
        }
        if let Some(endpoint) = var("CROWD_SHEET_ENDPOINT") {
            self.sheets.endpoint = Some(endpoint);
        }
        if let Some(deleter) = var("CROWD_DELETER") {
            self.deleter = Some(deleter);
        }
        self
    }

    /// The identity allowed to delete tickets.
    #[must_use]
    pub fn deleter(&self) -> &str {
        self.deleter
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(DEFAULT_DELETER)
    }

    /// Interval between periodic sync cycles (at least one second).
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(
            self.poll_interval_secs
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
                .max(1),
        )
    }

    #[must_use]
    pub fn permissions(&self) -> Permissions {
        Permissions {
            deleter: self.deleter().to_string(),
            creators: self.creators.clone(),
        }
    }

    /// Build the spreadsheet backend. Missing credentials are not an error
    /// here; the backend reports `Unavailable` on use.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn sheet_backend(&self) -> Result<GoogleSheetsBackend> {
        Ok(GoogleSheetsBackend::new(
            self.sheets.spreadsheet_id.clone(),
            self.sheets.access_token.clone(),
            self.sheets.endpoint.clone(),
        )?
        .with_app_secret(self.sheets.app_secret.clone()))
    }
}

/// Create and delete permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permissions {
    pub deleter: String,
    pub creators: Creators,
}

impl Default for Permissions {
    fn default() -> Self {
        Config::default().permissions()
    }
}

impl Permissions {
    #[must_use]
    pub fn can_create(&self, section: Section, actor: &str) -> bool {
        self.creators.all.iter().any(|c| c == actor)
            || self
                .creators
                .per_section
                .get(&section)
                .is_some_and(|names| names.iter().any(|c| c == actor))
    }

    #[must_use]
    pub fn can_delete(&self, actor: &str) -> bool {
        actor == self.deleter
    }

    /// # Errors
    ///
    /// Returns `Forbidden` if `actor` may not create tickets in `section`.
    pub fn check_create(&self, section: Section, actor: &str) -> Result<()> {
        if self.can_create(section, actor) {
            Ok(())
        } else {
            Err(Error::Forbidden {
                actor: actor.to_string(),
                action: format!("create tickets in {section}"),
            })
        }
    }

    /// # Errors
    ///
    /// Returns `Forbidden` unless `actor` is the configured deleter.
    pub fn check_delete(&self, actor: &str) -> Result<()> {
        if self.can_delete(actor) {
            Ok(())
        } else {
            Err(Error::Forbidden {
                actor: actor.to_string(),
                action: "delete tickets".to_string(),
            })
        }
    }
}

/// Get the global Crowd Desk directory, `~/.crowd-desk/`.
#[must_use]
pub fn global_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".crowd-desk"))
}

fn is_truthy(value: &str) -> bool {
    !value.is_empty() && value != "0" && value.to_lowercase() != "false"
}

/// Check if test mode is enabled (`CROWD_TEST_DB=1`).
#[must_use]
pub fn is_test_mode() -> bool {
    std::env::var("CROWD_TEST_DB").is_ok_and(|v| is_truthy(&v))
}

/// Get the test database path.
#[must_use]
pub fn test_db_path() -> Option<PathBuf> {
    global_dir().map(|dir| dir.join("test").join("tickets.db"))
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
}

/// Resolve the database path.
///
/// Priority:
/// 1. `explicit_path` from the `--db` flag
/// 2. `CROWD_TEST_DB` → test database
/// 3. `CROWD_DB` environment variable
/// 4. `~/.crowd-desk/data/tickets.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }
    if is_test_mode() {
        return test_db_path();
    }
    env_path("CROWD_DB").or_else(|| global_dir().map(|dir| dir.join("data").join("tickets.db")))
}

/// Resolve the client cache path: `--cache`, then `CROWD_CACHE`, then
/// `~/.crowd-desk/cache/tickets.json`.
#[must_use]
pub fn resolve_cache_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }
    env_path("CROWD_CACHE")
        .or_else(|| global_dir().map(|dir| dir.join("cache").join("tickets.json")))
}

/// Get the config file path.
fn config_path() -> Result<PathBuf> {
    global_dir()
        .map(|dir| dir.join("config.json"))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))
}

/// Load a config file; a missing file yields the defaults.
///
/// # Errors
///
/// Returns `Config` if the file exists but cannot be read or parsed.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// Load `~/.crowd-desk/config.json` with environment overrides applied.
///
/// # Errors
///
/// Returns `Config` if the file cannot be read or parsed.
pub fn load_config() -> Result<Config> {
    Ok(load_config_from(&config_path()?)?.with_env(|name| std::env::var(name).ok()))
}

/// Write a config file, creating its directory.
///
/// # Errors
///
/// Returns `Config` if the file cannot be written.
pub fn save_config_to(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

    fs::write(path, content)
        .map_err(|e| Error::Config(format!("Failed to write config file: {e}")))
}

/// Write the default config file unless one exists.
///
/// Returns the path and whether a file was created.
///
/// # Errors
///
/// Returns `Config` if the file cannot be written.
pub fn init_config() -> Result<(PathBuf, bool)> {
    let path = config_path()?;
    if path.exists() {
        return Ok((path, false));
    }
    save_config_to(&path, &Config::default())?;
    Ok((path, true))
}

/// Get the default actor name.
///
/// Priority:
/// 1. `CROWD_ACTOR` environment variable
/// 2. Git user name
/// 3. System username
/// 4. "operator"
#[must_use]
pub fn default_actor() -> String {
    if let Ok(actor) = std::env::var("CROWD_ACTOR") {
        if !actor.trim().is_empty() {
            return actor;
        }
    }

    if let Ok(output) = std::process::Command::new("git")
        .args(["config", "user.name"])
        .output()
    {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
    }

    if let Ok(user) = std::env::var("USER") {
        if !user.is_empty() {
            return user;
        }
    }

    "operator".to_string()
}

/// Resolve the acting user: the `--actor` flag, else [`default_actor`].
#[must_use]
pub fn resolve_actor(explicit: Option<&str>) -> String {
    explicit
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map_or_else(default_actor, str::to_string)
}
