//! Location ledger: document id -> last published file path.
//!
//! Persisted as a flat JSON object (`{"<id>": "notes/Db/Done/Title.md"}`),
//! keys sorted, non-ASCII written verbatim. The whole file is rewritten on
//! every save via `<path>.tmp` + rename. Entries are never pruned.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::error::{io_err, LedgerError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: BTreeMap<String, String>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`. A missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let entries: BTreeMap<String, String> =
            serde_json::from_str(&contents).map_err(|source| LedgerError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self { entries })
    }

    /// Load, falling back to an empty ledger on error. The error is handed
    /// back so the caller can report it.
    pub fn load_or_empty(path: &Path) -> (Self, Option<LedgerError>) {
        match Self::load(path) {
            Ok(ledger) => {
                info!(path = %path.display(), entries = ledger.len(), "[LEDGER] Loaded location ledger");
                (ledger, None)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "[LEDGER] Unreadable ledger, starting from empty");
                (Self::new(), Some(e))
            }
        }
    }

    /// Overwrite `path` with the full ledger.
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let json = serde_json::to_string_pretty(&self.entries).map_err(|source| LedgerError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let tmp = tmp_path(path);
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
        Ok(())
    }

    pub fn get(&self, document_id: &str) -> Option<&str> {
        self.entries.get(document_id).map(String::as_str)
    }

    /// Insert or replace; returns the previous path if it changed.
    pub fn upsert(&mut self, document_id: &str, file_path: &str) -> Option<String> {
        match self
            .entries
            .insert(document_id.to_string(), file_path.to_string())
        {
            Some(old) if old != file_path => Some(old),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids tracked here but absent from `seen`.
    pub fn unseen<'a>(&'a self, seen: &HashSet<String>) -> Vec<&'a str> {
        self.entries
            .keys()
            .filter(|id| !seen.contains(*id))
            .map(String::as_str)
            .collect()
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
