use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::retry::RetryPolicy;

/// Default width of the fetch/process pool.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Property names tried, in order, when none are configured.
pub const DEFAULT_CATEGORY_PROPERTIES: &[&str] = &[
    "Status", "Category", "Type", "状态", "分类", "类型", "Stage", "阶段",
];

/// Which parts of the workspace a run mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncScope {
    /// Only documents inside the configured containers.
    Containers,
    /// Only standalone documents (not inside a configured container).
    Documents,
    #[default]
    All,
}

impl SyncScope {
    pub fn includes_containers(self) -> bool {
        matches!(self, SyncScope::Containers | SyncScope::All)
    }

    pub fn includes_documents(self) -> bool {
        matches!(self, SyncScope::Documents | SyncScope::All)
    }
}

/// How the candidate set is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// One revision for the whole run, per-file writes if that fails.
    #[default]
    Atomic,
    /// Per-file writes only.
    PerFile,
}

/// Category sub-folder selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Categorization {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Property names in priority order; the first one present wins.
    #[serde(default = "default_category_properties")]
    pub properties: Vec<String>,
}

impl Default for Categorization {
    fn default() -> Self {
        Self {
            enabled: true,
            properties: default_category_properties(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_category_properties() -> Vec<String> {
    DEFAULT_CATEGORY_PROPERTIES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Everything a single run needs to know, already validated.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Container ids to mirror.
    pub containers: Vec<String>,
    /// Destination folder all files are placed under (e.g. `notes`).
    pub root: String,
    pub scope: SyncScope,
    pub commit_mode: CommitMode,
    pub dry_run: bool,
    pub concurrency: usize,
    pub categorization: Categorization,
    pub ledger_path: PathBuf,
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            containers: Vec::new(),
            root: "notes".to_string(),
            scope: SyncScope::default(),
            commit_mode: CommitMode::default(),
            dry_run: false,
            concurrency: DEFAULT_CONCURRENCY,
            categorization: Categorization::default(),
            ledger_path: PathBuf::from("file_mapping.json"),
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncOptions {
    pub fn trace_loaded(&self) {
        info!(
            containers = self.containers.len(),
            root = %self.root,
            scope = ?self.scope,
            commit_mode = ?self.commit_mode,
            dry_run = self.dry_run,
            categorization = self.categorization.enabled,
            "Loaded sync options"
        );
        if self.categorization.enabled {
            info!(
                properties = %self.categorization.properties.join(", "),
                "Category properties"
            );
        }
        debug!(options = ?self, "Sync options (full debug)");
    }
}
