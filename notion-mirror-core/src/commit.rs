//! Batch commit builder.
//!
//! The destination has no multi-file transaction, so an atomic publish is
//! assembled from its object-graph calls: read head, one blob per file, one
//! tree over the head's tree, one commit, then a non-forced ref update. A
//! failure at any of those stages leaves the branch untouched and the
//! builder falls back to guarded per-file writes.

use std::collections::HashSet;
use std::fmt;

use tracing::{error, info, warn};

use crate::config::CommitMode;
use crate::contract::{DestinationStore, PutFile, TreeEntry};
use crate::error::StoreError;
use crate::retry::{with_retry, RetryPolicy};

/// Regular, non-executable file.
pub const FILE_MODE: &str = "100644";

/// One file the run wants published.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitCandidate {
    pub document_id: String,
    /// Full destination path.
    pub path: String,
    pub folder: String,
    pub filename: String,
    pub content: Vec<u8>,
    /// SHA-256 of `content`.
    pub digest: String,
    /// Nothing was published at `path` when the change was detected.
    pub is_new: bool,
    /// Revision observed at detection time.
    pub prior_revision: Option<String>,
}

impl CommitCandidate {
    fn published_file(&self) -> PublishedFile {
        PublishedFile {
            document_id: self.document_id.clone(),
            path: self.path.clone(),
        }
    }

    fn display_name(&self) -> String {
        if self.folder.is_empty() {
            format!("{}.md", self.filename)
        } else {
            format!("{}/{}.md", self.folder, self.filename)
        }
    }
}

/// A destination file now holding its document's desired content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedFile {
    pub document_id: String,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStage {
    ReadHead,
    CreateBlob,
    CreateTree,
    CreateCommit,
    UpdateRef,
}

impl fmt::Display for CommitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommitStage::ReadHead => "read_head",
            CommitStage::CreateBlob => "create_blob",
            CommitStage::CreateTree => "create_tree",
            CommitStage::CreateCommit => "create_commit",
            CommitStage::UpdateRef => "update_ref",
        };
        f.write_str(name)
    }
}

/// Why the atomic publish was abandoned.
#[derive(Debug)]
pub struct AtomicFailure {
    pub stage: CommitStage,
    pub error: StoreError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtomicCommit {
    pub commit_id: String,
    pub published: Vec<PublishedFile>,
}

#[derive(Debug)]
pub struct FileFailure {
    pub path: String,
    pub error: StoreError,
}

#[derive(Debug)]
pub enum CommitOutcome {
    /// No candidates.
    Nothing,
    Atomic {
        commit_id: String,
        published: Vec<PublishedFile>,
    },
    PerFile {
        published: Vec<PublishedFile>,
        /// Remote already held the desired bytes.
        already_current: Vec<PublishedFile>,
        /// Remote changed since detection; skipped.
        conflicts: Vec<String>,
        failures: Vec<FileFailure>,
        /// Set when this is a fallback from a failed atomic publish.
        atomic_failure: Option<AtomicFailure>,
    },
}

impl CommitOutcome {
    pub fn published(&self) -> usize {
        match self {
            CommitOutcome::Nothing => 0,
            CommitOutcome::Atomic { published, .. } => published.len(),
            CommitOutcome::PerFile { published, .. } => published.len(),
        }
    }

    /// Documents whose desired content is now live at the destination.
    /// A candidate dropped by [`dedupe`] is never among them.
    pub fn live_documents(&self) -> HashSet<&str> {
        match self {
            CommitOutcome::Nothing => HashSet::new(),
            CommitOutcome::Atomic { published, .. } => {
                published.iter().map(|f| f.document_id.as_str()).collect()
            }
            CommitOutcome::PerFile {
                published,
                already_current,
                ..
            } => published
                .iter()
                .chain(already_current.iter())
                .map(|f| f.document_id.as_str())
                .collect(),
        }
    }
}

/// Drop later candidates whose path was already taken.
pub fn dedupe(candidates: Vec<CommitCandidate>) -> Vec<CommitCandidate> {
    let mut seen: HashSet<String> = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| {
            if seen.insert(c.path.clone()) {
                true
            } else {
                warn!(path = %c.path, document_id = %c.document_id, "[COMMIT] Duplicate destination path, keeping the first document");
                false
            }
        })
        .collect()
}

/// Commit message summarizing additions and updates.
pub fn commit_message(candidates: &[CommitCandidate]) -> String {
    let mut message = format!("Notion同步 - 批量更新 {} 个文件", candidates.len());
    let (added, updated): (Vec<&CommitCandidate>, Vec<&CommitCandidate>) =
        candidates.iter().partition(|c| c.is_new);
    if !added.is_empty() {
        message.push_str(&format!("\n\n新增 {} 个文件:", added.len()));
        for c in &added {
            message.push_str(&format!("\n  + {}", c.display_name()));
        }
    }
    if !updated.is_empty() {
        message.push_str(&format!("\n\n更新 {} 个文件:", updated.len()));
        for c in &updated {
            message.push_str(&format!("\n  ~ {}", c.display_name()));
        }
    }
    message
}

fn at(stage: CommitStage) -> impl FnOnce(StoreError) -> AtomicFailure {
    move |error| AtomicFailure { stage, error }
}

/// Publish every candidate as one revision.
pub async fn commit_atomic<D>(
    store: &D,
    candidates: &[CommitCandidate],
    retry: &RetryPolicy,
) -> Result<AtomicCommit, AtomicFailure>
where
    D: DestinationStore + ?Sized,
{
    let head = with_retry(retry, "read_head", || store.read_head())
        .await
        .map_err(at(CommitStage::ReadHead))?;
    info!(head = %head.commit_id, "[COMMIT] Building revision on branch head");

    let mut entries = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let blob_id = with_retry(retry, "create_blob", || {
            store.create_blob(candidate.content.clone())
        })
        .await
        .map_err(at(CommitStage::CreateBlob))?;
        entries.push(TreeEntry {
            path: candidate.path.clone(),
            mode: FILE_MODE.to_string(),
            blob_id,
        });
    }

    let tree_id = with_retry(retry, "create_tree", || {
        store.create_tree(head.tree_id.clone(), entries.clone())
    })
    .await
    .map_err(at(CommitStage::CreateTree))?;

    let message = commit_message(candidates);
    let commit_id = with_retry(retry, "create_commit", || {
        store.create_commit(message.clone(), tree_id.clone(), vec![head.commit_id.clone()])
    })
    .await
    .map_err(at(CommitStage::CreateCommit))?;

    with_retry(retry, "update_ref", || store.update_ref(commit_id.clone()))
        .await
        .map_err(at(CommitStage::UpdateRef))?;

    info!(commit = %commit_id, files = candidates.len(), "[COMMIT] Atomic commit published");
    Ok(AtomicCommit {
        commit_id,
        published: candidates.iter().map(CommitCandidate::published_file).collect(),
    })
}

/// Guarded per-file writes. A file that changed remotely since detection is
/// skipped rather than overwritten.
pub async fn commit_per_file<D>(
    store: &D,
    candidates: &[CommitCandidate],
    retry: &RetryPolicy,
    atomic_failure: Option<AtomicFailure>,
) -> CommitOutcome
where
    D: DestinationStore + ?Sized,
{
    let mut published = Vec::new();
    let mut already_current = Vec::new();
    let mut conflicts = Vec::new();
    let mut failures = Vec::new();

    for candidate in candidates {
        let path = &candidate.path;
        let remote = match with_retry(retry, "get_file", || store.get_file(path)).await {
            Ok(remote) => remote,
            Err(error) => {
                error!(path = %path, error = %error, "[COMMIT][ERROR] Could not re-read file");
                failures.push(FileFailure {
                    path: path.clone(),
                    error,
                });
                continue;
            }
        };

        let observed = remote.as_ref().map(|r| r.revision.as_str());
        if let Some(remote) = &remote {
            if remote.content == candidate.content {
                info!(path = %path, "[COMMIT] Already current, skipping");
                already_current.push(candidate.published_file());
                continue;
            }
        }
        if observed != candidate.prior_revision.as_deref() {
            warn!(
                path = %path,
                expected = ?candidate.prior_revision,
                found = ?observed,
                "[COMMIT] File changed since detection, skipping"
            );
            conflicts.push(path.clone());
            continue;
        }

        let request = PutFile {
            path: path.clone(),
            content: candidate.content.clone(),
            message: format!("更新笔记: {}", candidate.display_name()),
            prior_revision: candidate.prior_revision.clone(),
        };
        match with_retry(retry, "put_file", || store.put_file(request.clone())).await {
            Ok(()) => {
                info!(path = %path, "[COMMIT] Wrote file");
                published.push(candidate.published_file());
            }
            Err(StoreError::Conflict(reason)) => {
                warn!(path = %path, reason = %reason, "[COMMIT] Write rejected as stale, skipping");
                conflicts.push(path.clone());
            }
            Err(error) => {
                error!(path = %path, error = %error, "[COMMIT][ERROR] Write failed");
                failures.push(FileFailure {
                    path: path.clone(),
                    error,
                });
            }
        }
    }

    info!(
        published = published.len(),
        already_current = already_current.len(),
        conflicts = conflicts.len(),
        failures = failures.len(),
        "[COMMIT] Per-file publish finished"
    );
    CommitOutcome::PerFile {
        published,
        already_current,
        conflicts,
        failures,
        atomic_failure,
    }
}

/// Publish `candidates` according to `mode`, falling back to per-file
/// writes when the atomic path fails.
pub async fn publish<D>(
    store: &D,
    candidates: Vec<CommitCandidate>,
    mode: CommitMode,
    retry: &RetryPolicy,
) -> CommitOutcome
where
    D: DestinationStore + ?Sized,
{
    let candidates = dedupe(candidates);
    if candidates.is_empty() {
        info!("[COMMIT] Nothing to publish");
        return CommitOutcome::Nothing;
    }

    match mode {
        CommitMode::PerFile => commit_per_file(store, &candidates, retry, None).await,
        CommitMode::Atomic => match commit_atomic(store, &candidates, retry).await {
            Ok(AtomicCommit {
                commit_id,
                published,
            }) => CommitOutcome::Atomic {
                commit_id,
                published,
            },
            Err(failure) => {
                error!(
                    stage = %failure.stage,
                    error = %failure.error,
                    "[COMMIT][ERROR] Atomic commit failed, falling back to per-file writes"
                );
                commit_per_file(store, &candidates, retry, Some(failure)).await
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(path: &str, is_new: bool) -> CommitCandidate {
        let (folder, file) = path.rsplit_once('/').unwrap_or(("", path));
        CommitCandidate {
            document_id: path.to_string(),
            path: format!("notes/{path}.md"),
            folder: folder.to_string(),
            filename: file.to_string(),
            content: b"x".to_vec(),
            digest: crate::change::content_digest(b"x"),
            is_new,
            prior_revision: if is_new { None } else { Some("r".into()) },
        }
    }

    #[test]
    fn message_lists_added_and_updated() {
        let msg = commit_message(&[candidate("Db/A", true), candidate("Db/Done/B", false)]);
        assert_eq!(
            msg,
            "Notion同步 - 批量更新 2 个文件\n\n新增 1 个文件:\n  + Db/A.md\n\n更新 1 个文件:\n  ~ Db/Done/B.md"
        );
    }

    #[test]
    fn dedupe_keeps_first() {
        let mut second = candidate("Db/A", true);
        second.document_id = "other".into();
        let kept = dedupe(vec![candidate("Db/A", true), second, candidate("Db/B", true)]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].document_id, "Db/A");
    }

    #[tokio::test]
    async fn deduped_document_is_not_live() {
        let mut store = crate::contract::MockDestinationStore::new();
        store.expect_get_file().returning(|_| Ok(None));
        store.expect_put_file().times(1).returning(|_| Ok(()));
        let mut second = candidate("Db/A", true);
        second.document_id = "other".into();

        let outcome = publish(
            &store,
            vec![candidate("Db/A", true), second],
            CommitMode::PerFile,
            &RetryPolicy::none(),
        )
        .await;

        let live = outcome.live_documents();
        assert!(live.contains("Db/A"));
        assert!(!live.contains("other"));
    }

    #[tokio::test]
    async fn empty_set_publishes_nothing() {
        let store = crate::contract::MockDestinationStore::new();
        let outcome = publish(&store, vec![], CommitMode::Atomic, &RetryPolicy::none()).await;
        assert!(matches!(outcome, CommitOutcome::Nothing));
        assert_eq!(outcome.published(), 0);
    }
}
