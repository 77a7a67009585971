//! High-level pipeline: enumerate → process → publish → repair moves → persist.
//!
//! This module is the coordinator of a single run. It:
//!   - Enumerates the configured containers and, depending on scope, the
//!     standalone documents of the workspace
//!   - Hands every document to the fetch/process pool ([`crate::pool`])
//!   - Publishes the resulting candidates through the batch commit builder
//!     ([`crate::commit`])
//!   - Deletes the old location of every document whose path moved and
//!     whose new file is live
//!   - Persists the location ledger
//!
//! # Error Handling
//! Per-document, per-container and per-file failures are logged and
//! collected in [`SyncReport`]. Only a failure to persist the ledger aborts
//! the run ([`SyncError`]), since the next run would otherwise lose track of
//! where documents were published.
//!
//! # Dry Run
//! Candidates and move intents are computed as usual; nothing is published,
//! deleted, or written to the ledger.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, error, info, warn};

use crate::commit::{publish, CommitCandidate, CommitOutcome};
use crate::config::SyncOptions;
use crate::contract::{ContentSource, DestinationStore, Document, ParentRef};
use crate::error::{LedgerError, SourceError, SyncError};
use crate::ledger::Ledger;
use crate::pool::{
    short_id, FailedDocument, MoveIntent, MoveOutcome, MoveRepair, Placement, Processed, SyncRun,
    WorkItem,
};

/// A listing that could not be read (a container query or the workspace search).
#[derive(Debug)]
pub struct ListingFailure {
    pub target: String,
    pub error: SourceError,
}

#[derive(Debug)]
pub struct SyncReport {
    pub dry_run: bool,
    /// Documents handed to the pool.
    pub documents: usize,
    /// Documents whose content differed from the destination.
    pub candidates: usize,
    pub commit: CommitOutcome,
    pub failed_documents: Vec<FailedDocument>,
    pub failed_listings: Vec<ListingFailure>,
    /// Move repairs performed this run.
    pub moves: Vec<MoveRepair>,
    /// Moves detected but not carried out (dry run, or the new file is not live yet).
    pub deferred_moves: Vec<MoveIntent>,
    /// Set when the ledger could not be read and the run started from empty.
    pub ledger_warning: Option<LedgerError>,
    /// Ledger entries for documents not seen this run. Left in place.
    pub untracked: usize,
    /// Folder (relative to the root) → documents placed there.
    pub folders: BTreeMap<String, usize>,
}

impl SyncReport {
    pub fn published(&self) -> usize {
        self.commit.published()
    }

    pub fn trace_summary(&self) {
        info!(
            dry_run = self.dry_run,
            documents = self.documents,
            candidates = self.candidates,
            published = self.published(),
            failed_documents = self.failed_documents.len(),
            failed_listings = self.failed_listings.len(),
            moves = self.moves.len(),
            deferred_moves = self.deferred_moves.len(),
            untracked = self.untracked,
            folders = self.folders.len(),
            "[SYNC] Run summary"
        );
        for (folder, count) in &self.folders {
            debug!(folder = %folder, documents = count, "[SYNC] Folder");
        }
    }
}

/// A document is standalone when it is not inside a configured container and
/// hangs off the workspace root or off a document outside those containers.
pub fn is_standalone(document: &Document, container_documents: &HashSet<String>) -> bool {
    if container_documents.contains(&document.id) {
        return false;
    }
    match &document.parent {
        ParentRef::Workspace => true,
        ParentRef::Document(parent) => !container_documents.contains(parent),
        _ => false,
    }
}

/// Run one full synchronisation.
pub async fn synchronise<S, D>(
    source: &S,
    store: &D,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError>
where
    S: ContentSource + ?Sized,
    D: DestinationStore + ?Sized,
{
    info!(dry_run = options.dry_run, scope = ?options.scope, "[SYNC] Starting synchronisation");

    let run = SyncRun::new(source, store, options);
    let (mut ledger, ledger_warning) = Ledger::load_or_empty(&options.ledger_path);

    let mut items: Vec<WorkItem> = Vec::new();
    let mut container_documents: HashSet<String> = HashSet::new();
    let mut failed_listings: Vec<ListingFailure> = Vec::new();

    // Step 1: containers. Enumerated in every scope; standalone filtering
    // needs their document ids.
    for container_id in &options.containers {
        let (name, parent) = match run.container(container_id).await {
            Ok(container) => {
                let parent = match &container.parent {
                    ParentRef::Document(id) => run.document_title(id).await,
                    ParentRef::Container(id) => run.container_name(id).await,
                    _ => None,
                };
                let name = match container.name.trim() {
                    "" => format!("数据库_{}", short_id(container_id)),
                    n => n.to_string(),
                };
                (name, parent)
            }
            Err(e) => {
                warn!(container_id = %container_id, error = %e, "[SYNC] Could not read container, using fallback name");
                (format!("数据库_{}", short_id(container_id)), None)
            }
        };

        let documents = match run.container_documents(container_id).await {
            Ok(documents) => documents,
            Err(error) => {
                error!(container_id = %container_id, error = %error, "[SYNC][ERROR] Could not list container");
                failed_listings.push(ListingFailure {
                    target: container_id.clone(),
                    error,
                });
                continue;
            }
        };
        info!(container = %name, documents = documents.len(), "[SYNC] Listed container");

        for document in documents {
            if !container_documents.insert(document.id.clone()) {
                continue;
            }
            if options.scope.includes_containers() {
                items.push(WorkItem {
                    document,
                    placement: Placement::Container {
                        name: name.clone(),
                        parent: parent.clone(),
                    },
                });
            }
        }
    }

    // Step 2: standalone documents.
    if options.scope.includes_documents() {
        match run.all_documents().await {
            Ok(all) => {
                let mut queued: HashSet<String> = HashSet::new();
                let total = all.len();
                for document in all {
                    if !is_standalone(&document, &container_documents) || !queued.insert(document.id.clone()) {
                        continue;
                    }
                    let parent = match &document.parent {
                        ParentRef::Document(id) => run.document_title(id).await,
                        _ => None,
                    };
                    items.push(WorkItem {
                        document,
                        placement: Placement::Standalone { parent },
                    });
                }
                info!(searched = total, standalone = queued.len(), "[SYNC] Found standalone documents");
            }
            Err(error) => {
                error!(error = %error, "[SYNC][ERROR] Could not search workspace documents");
                failed_listings.push(ListingFailure {
                    target: "search".to_string(),
                    error,
                });
            }
        }
    }

    // Step 3: fetch and process.
    let seen: HashSet<String> = items.iter().map(|i| i.document.id.clone()).collect();
    let documents = items.len();
    let mut output = run.process_documents(items, &ledger).await;

    let mut folders: BTreeMap<String, usize> = BTreeMap::new();
    for processed in &output.processed {
        *folders.entry(processed.folder.clone()).or_insert(0) += 1;
    }

    // The first document in input order to resolve to a path owns it. Later
    // claimants are not published and keep their ledger entry and old file.
    let mut owners: HashMap<String, String> = HashMap::new();
    for processed in &output.processed {
        owners
            .entry(processed.path.clone())
            .or_insert_with(|| processed.document_id.clone());
    }
    let owns_path = |p: &Processed| owners.get(&p.path) == Some(&p.document_id);

    let mut candidates: Vec<CommitCandidate> = Vec::new();
    let mut candidate_count = 0;
    for processed in output.processed.iter_mut() {
        let Some(candidate) = processed.candidate.take() else {
            continue;
        };
        candidate_count += 1;
        if owns_path(&*processed) {
            candidates.push(candidate);
        } else {
            warn!(
                document_id = %processed.document_id,
                path = %processed.path,
                owner = ?owners.get(&processed.path),
                "[SYNC] Destination path taken by an earlier document, not publishing"
            );
        }
    }
    let pending: HashSet<String> = candidates.iter().map(|c| c.document_id.clone()).collect();

    // Step 4: publish.
    let commit = if options.dry_run {
        info!(candidates = candidate_count, "[SYNC] Dry run, not publishing");
        CommitOutcome::Nothing
    } else {
        publish(store, candidates, options.commit_mode, &options.retry).await
    };

    // Step 5: ledger updates and move repair, only for documents whose file is live.
    let live = commit.live_documents();
    let claimed: HashSet<String> = output.processed.iter().map(|p| p.path.clone()).collect();
    let mut moves_to_repair = Vec::new();
    let mut deferred_moves = Vec::new();

    for processed in &output.processed {
        let is_live = owns_path(processed)
            && (!pending.contains(&processed.document_id)
                || live.contains(processed.document_id.as_str()));
        let intent = processed.previous_path.as_ref().map(|from| MoveIntent {
            document_id: processed.document_id.clone(),
            from: from.clone(),
            to: processed.path.clone(),
        });
        if options.dry_run || !is_live {
            if !is_live && !options.dry_run {
                debug!(document_id = %processed.document_id, path = %processed.path, "[SYNC] Not published, ledger entry kept");
            }
            deferred_moves.extend(intent);
            continue;
        }
        ledger.upsert(&processed.document_id, &processed.path);
        moves_to_repair.extend(intent);
    }

    let moves = run.repair_moves(moves_to_repair, &claimed).await;
    for repair in &moves {
        if let MoveOutcome::Failed(e) = &repair.outcome {
            warn!(document_id = %repair.intent.document_id, from = %repair.intent.from, error = %e, "[SYNC] Old location left behind");
        }
    }

    // Step 6: untracked entries are reported, never pruned.
    let untracked = ledger.unseen(&seen).len();
    if untracked > 0 {
        info!(untracked, "[SYNC] Ledger entries not seen this run (left in place)");
    }

    // Step 7: persist.
    if options.dry_run {
        info!("[SYNC] Dry run, ledger not saved");
    } else {
        if let Err(e) = ledger.save(&options.ledger_path) {
            error!(path = %options.ledger_path.display(), error = %e, "[SYNC][ERROR] Failed to save ledger");
            return Err(e.into());
        }
        info!(path = %options.ledger_path.display(), entries = ledger.len(), "[SYNC] Saved ledger");
    }

    let report = SyncReport {
        dry_run: options.dry_run,
        documents,
        candidates: candidate_count,
        commit,
        failed_documents: output.failed,
        failed_listings,
        moves,
        deferred_moves,
        ledger_warning,
        untracked,
        folders,
    };
    report.trace_summary();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, parent: ParentRef) -> Document {
        Document {
            id: id.into(),
            parent,
            title: id.into(),
            properties: vec![],
            created_time: None,
            last_edited_time: None,
        }
    }

    #[test]
    fn standalone_filtering() {
        let in_containers: HashSet<String> = ["c1".to_string()].into_iter().collect();
        assert!(is_standalone(&doc("w", ParentRef::Workspace), &in_containers));
        assert!(is_standalone(&doc("sub", ParentRef::Document("w".into())), &in_containers));
        assert!(!is_standalone(&doc("c1", ParentRef::Workspace), &in_containers));
        assert!(!is_standalone(&doc("child", ParentRef::Document("c1".into())), &in_containers));
        assert!(!is_standalone(&doc("row", ParentRef::Container("db".into())), &in_containers));
    }
}
