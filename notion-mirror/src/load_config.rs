//! `load_config` module: loads the YAML run configuration and injects secrets from the environment.
//!
//! This module is the only place where untrusted YAML is parsed and mapped onto the
//! strongly-typed options of `notion-mirror-core`.
//!
//! # Responsibilities
//! - Parse the user-supplied YAML file into [`CliConfig`]
//! - Read `NOTION_API_KEY` and `GITHUB_TOKEN` from the environment (a `.env` file is
//!   loaded by `main` beforehand)
//! - Reject incomplete configurations before any network call is made
//! - Produce the core [`SyncOptions`] for a run
//!
//! # Errors
//! All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{bail, Result};
use notion_mirror_core::config::{Categorization, CommitMode, SyncOptions, SyncScope, DEFAULT_CONCURRENCY};
use notion_mirror_core::retry::RetryPolicy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const NOTION_API_KEY_ENV: &str = "NOTION_API_KEY";
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Debug, Deserialize)]
pub struct SourceSection {
    /// Notion database ids to mirror.
    #[serde(default)]
    pub containers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DestinationSection {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_root")]
    pub root: String,
    /// Falls back to the repository's default branch.
    #[serde(default)]
    pub branch: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SyncSection {
    #[serde(default)]
    pub scope: SyncScope,
    #[serde(default)]
    pub commit_mode: CommitMode,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub categorization: Categorization,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            scope: SyncScope::default(),
            commit_mode: CommitMode::default(),
            dry_run: false,
            concurrency: DEFAULT_CONCURRENCY,
            categorization: Categorization::default(),
        }
    }
}

/// Credentials, never read from the YAML file.
pub struct Secrets {
    pub notion_api_key: String,
    pub github_token: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("notion_api_key", &"<redacted>")
            .field("github_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug)]
pub struct CliConfig {
    pub source: SourceSection,
    pub destination: DestinationSection,
    pub sync: SyncSection,
    pub ledger_path: PathBuf,
    pub secrets: Secrets,
}

impl CliConfig {
    /// Core options for a run; `force_dry_run` comes from `--dry-run`.
    pub fn sync_options(&self, force_dry_run: bool) -> SyncOptions {
        SyncOptions {
            containers: self.source.containers.clone(),
            root: self.destination.root.clone(),
            scope: self.sync.scope,
            commit_mode: self.sync.commit_mode,
            dry_run: self.sync.dry_run || force_dry_run,
            concurrency: self.sync.concurrency.max(1),
            categorization: self.sync.categorization.clone(),
            ledger_path: self.ledger_path.clone(),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_root() -> String {
    "notes".to_string()
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("file_mapping.json")
}

fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => {
            error!(variable = name, "Required environment variable missing");
            bail!("{name} must be set in the environment or .env file")
        }
    }
}

/// Loads a static YAML config file (no secrets) and injects required env vars for secrets.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    #[derive(Debug, Deserialize)]
    struct RawConfig {
        #[serde(default = "empty_source")]
        source: SourceSection,
        destination: DestinationSection,
        #[serde(default)]
        sync: SyncSection,
        #[serde(default = "default_ledger_path")]
        ledger_path: PathBuf,
    }

    fn empty_source() -> SourceSection {
        SourceSection {
            containers: Vec::new(),
        }
    }

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if raw.destination.owner.trim().is_empty() || raw.destination.repo.trim().is_empty() {
        error!(config_path = ?path_ref, "destination.owner and destination.repo are required");
        bail!("destination.owner and destination.repo must be set");
    }
    if raw.sync.scope.includes_containers() && raw.source.containers.is_empty() {
        error!(config_path = ?path_ref, scope = ?raw.sync.scope, "No containers configured");
        bail!("source.containers must list at least one database id for scope {:?}", raw.sync.scope);
    }

    let secrets = Secrets {
        notion_api_key: require_env(NOTION_API_KEY_ENV)?,
        github_token: require_env(GITHUB_TOKEN_ENV)?,
    };
    info!(
        containers = raw.source.containers.len(),
        owner = %raw.destination.owner,
        repo = %raw.destination.repo,
        "Configuration loaded"
    );

    Ok(CliConfig {
        source: raw.source,
        destination: raw.destination,
        sync: raw.sync,
        ledger_path: raw.ledger_path,
        secrets,
    })
}
