//! Fetch/process pool.
//!
//! [`SyncRun`] is the per-run context: the two service handles, the options
//! and a [`TitleCache`] that lives exactly as long as the run. Workers run
//! through a `buffered` stream, so at most `width` documents are in flight
//! and results come back in input order.
//!
//! Workers only read the [`Ledger`]. They report the path they resolved and,
//! when it differs from the ledger entry, the path the document used to live
//! at. The coordinator applies ledger updates and deletes old locations once
//! the whole batch is known.

use std::collections::HashSet;
use std::future::Future;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::attributes::extract;
use crate::cache::TitleCache;
use crate::change::{content_digest, needs_write};
use crate::commit::CommitCandidate;
use crate::config::SyncOptions;
use crate::contract::{
    Block, Container, ContentSource, DeleteFile, DestinationStore, Document, Page,
};
use crate::error::{DocumentError, SourceError, StoreError};
use crate::ledger::Ledger;
use crate::path::{resolve, sanitize_filename};
use crate::render::{render_document, SourceInfo};
use crate::retry::{with_retry, RetryPolicy};

/// Fixed filename for standalone documents; their folder already carries the title.
pub const STANDALONE_FILENAME: &str = "content";

/// Where a document is placed, decided before it enters the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Inside a configured container.
    Container { name: String, parent: Option<String> },
    /// A standalone document, foldered under its own title.
    Standalone { parent: Option<String> },
}

#[derive(Debug, Clone)]
pub struct WorkItem {
    pub document: Document,
    pub placement: Placement,
}

/// A document the pool turned into a resolved location.
#[derive(Debug, Clone)]
pub struct Processed {
    pub document_id: String,
    pub title: String,
    /// Folder relative to the destination root.
    pub folder: String,
    /// Full destination path.
    pub path: String,
    /// `None` when the published file is already current.
    pub candidate: Option<CommitCandidate>,
    /// Ledger path this document lived at, when it differs from `path`.
    pub previous_path: Option<String>,
}

#[derive(Debug)]
pub struct FailedDocument {
    pub document_id: String,
    pub title: String,
    pub error: DocumentError,
}

#[derive(Debug, Default)]
pub struct PoolOutput {
    pub processed: Vec<Processed>,
    pub failed: Vec<FailedDocument>,
}

/// A path change to clean up after publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveIntent {
    pub document_id: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug)]
pub enum MoveOutcome {
    Deleted,
    /// Nothing was published at the old path any more.
    AlreadyGone,
    /// Another document resolved to the old path this run; left in place.
    Claimed,
    Failed(StoreError),
}

#[derive(Debug)]
pub struct MoveRepair {
    pub intent: MoveIntent,
    pub outcome: MoveOutcome,
}

/// Title used for rendering and naming; falls back to `页面_<id>`.
pub fn display_title(document: &Document) -> String {
    let title = document.title.trim();
    if title.is_empty() {
        format!("页面_{}", document.id)
    } else {
        title.to_string()
    }
}

/// First eight characters of an id, used in fallback names.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Follow `next_cursor` until the listing is exhausted.
pub async fn collect_pages<T, F, Fut>(
    retry: &RetryPolicy,
    operation: &str,
    mut fetch: F,
) -> Result<Vec<T>, SourceError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, SourceError>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    let mut visited: HashSet<String> = HashSet::new();
    loop {
        let page = with_retry(retry, operation, || fetch(cursor.clone())).await?;
        items.extend(page.results);
        match page.next_cursor {
            Some(next) if visited.insert(next.clone()) => cursor = Some(next),
            Some(next) => {
                warn!(operation, cursor = %next, "[POOL] Source repeated a cursor, stopping pagination");
                break;
            }
            None => break,
        }
    }
    Ok(items)
}

pub struct SyncRun<'a, S: ?Sized, D: ?Sized> {
    pub source: &'a S,
    pub store: &'a D,
    pub options: &'a SyncOptions,
    pub titles: TitleCache,
}

impl<'a, S, D> SyncRun<'a, S, D>
where
    S: ContentSource + ?Sized,
    D: DestinationStore + ?Sized,
{
    pub fn new(source: &'a S, store: &'a D, options: &'a SyncOptions) -> Self {
        Self {
            source,
            store,
            options,
            titles: TitleCache::default(),
        }
    }

    /// Pool width for `items` units of work.
    pub fn width(&self, items: usize) -> usize {
        self.options.concurrency.min(items).max(1)
    }

    pub async fn container(&self, container_id: &str) -> Result<Container, SourceError> {
        with_retry(&self.options.retry, "get_container", || {
            self.source.get_container(container_id)
        })
        .await
    }

    pub async fn container_documents(&self, container_id: &str) -> Result<Vec<Document>, SourceError> {
        collect_pages(&self.options.retry, "query_container", |cursor| {
            self.source.query_container(container_id, cursor)
        })
        .await
    }

    pub async fn all_documents(&self) -> Result<Vec<Document>, SourceError> {
        collect_pages(&self.options.retry, "search_documents", |cursor| {
            self.source.search_documents(cursor)
        })
        .await
    }

    pub async fn blocks(&self, document_id: &str) -> Result<Vec<Block>, SourceError> {
        collect_pages(&self.options.retry, "get_blocks", |cursor| {
            self.source.get_blocks(document_id, cursor)
        })
        .await
    }

    /// Title of a parent document, through the run's cache. Lookup failures
    /// degrade to `None` so placement falls back to the unnested layout.
    pub async fn document_title(&self, document_id: &str) -> Option<String> {
        if let Some(title) = self.titles.get(document_id) {
            return Some(title);
        }
        let fetched = with_retry(&self.options.retry, "get_document", || {
            self.source.get_document(document_id)
        })
        .await;
        match fetched {
            Ok(doc) if !doc.title.trim().is_empty() => {
                let title = doc.title.trim().to_string();
                self.titles.insert(document_id, &title);
                Some(title)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(document_id, error = %e, "[POOL] Could not resolve parent title");
                None
            }
        }
    }

    /// Name of a parent container, through the same cache.
    pub async fn container_name(&self, container_id: &str) -> Option<String> {
        if let Some(name) = self.titles.get(container_id) {
            return Some(name);
        }
        match self.container(container_id).await {
            Ok(c) if !c.name.trim().is_empty() => {
                self.titles.insert(container_id, c.name.trim());
                Some(c.name.trim().to_string())
            }
            Ok(_) => None,
            Err(e) => {
                warn!(container_id, error = %e, "[POOL] Could not resolve parent container");
                None
            }
        }
    }

    /// Process every item with bounded concurrency. One document failing
    /// never affects the others.
    pub async fn process_documents(&self, items: Vec<WorkItem>, ledger: &Ledger) -> PoolOutput {
        let width = self.width(items.len());
        info!(documents = items.len(), width, "[POOL] Processing documents");

        let results: Vec<Result<Processed, FailedDocument>> = stream::iter(items)
            .map(|item| self.process_one(item, ledger))
            .buffered(width)
            .collect()
            .await;

        let mut output = PoolOutput::default();
        for result in results {
            match result {
                Ok(processed) => output.processed.push(processed),
                Err(failed) => output.failed.push(failed),
            }
        }
        info!(
            processed = output.processed.len(),
            candidates = output.processed.iter().filter(|p| p.candidate.is_some()).count(),
            failed = output.failed.len(),
            "[POOL] Pool drained"
        );
        output
    }

    async fn process_one(&self, item: WorkItem, ledger: &Ledger) -> Result<Processed, FailedDocument> {
        let WorkItem { document, placement } = item;
        match self.build(&document, &placement, ledger).await {
            Ok(processed) => Ok(processed),
            Err(error) => {
                error!(document_id = %document.id, title = %document.title, error = %error, "[POOL][ERROR] Document failed");
                Err(FailedDocument {
                    document_id: document.id,
                    title: document.title,
                    error,
                })
            }
        }
    }

    async fn build(
        &self,
        document: &Document,
        placement: &Placement,
        ledger: &Ledger,
    ) -> Result<Processed, DocumentError> {
        let blocks = self.blocks(&document.id).await?;
        let attributes = extract(&document.properties);
        let categorization = &self.options.categorization;

        let (title, destination, filename, source_info) = match placement {
            Placement::Container { name, parent } => {
                let title = display_title(document);
                let destination = resolve(name, parent.as_deref(), &attributes, categorization);
                let filename = sanitize_filename(&title);
                (title, destination, filename, SourceInfo::Container(name.clone()))
            }
            Placement::Standalone { parent } => {
                let title = match document.title.trim() {
                    "" => format!("页面_{}", short_id(&document.id)),
                    t => t.to_string(),
                };
                let destination = resolve(&title, parent.as_deref(), &attributes, categorization);
                (
                    title.clone(),
                    destination,
                    STANDALONE_FILENAME.to_string(),
                    SourceInfo::Standalone(title),
                )
            }
        };

        let folder = destination.folder();
        let path = destination.file_path(&self.options.root, &filename);
        let content = render_document(document, &title, &source_info, &blocks);

        let existing = with_retry(&self.options.retry, "get_file", || {
            self.store.get_file(&path)
        })
        .await?;

        let candidate = if needs_write(content.as_bytes(), existing.as_ref().map(|f| f.content.as_slice())) {
            let content = content.into_bytes();
            Some(CommitCandidate {
                document_id: document.id.clone(),
                path: path.clone(),
                folder: folder.clone(),
                filename,
                digest: content_digest(&content),
                content,
                is_new: existing.is_none(),
                prior_revision: existing.map(|f| f.revision),
            })
        } else {
            debug!(document_id = %document.id, path = %path, "[POOL] Already current");
            None
        };

        let previous_path = ledger
            .get(&document.id)
            .filter(|old| *old != path)
            .map(str::to_string);

        Ok(Processed {
            document_id: document.id.clone(),
            title,
            folder,
            path,
            candidate,
            previous_path,
        })
    }

    /// Delete old locations of moved documents. Paths in `claimed` belong to
    /// some document this run and are left alone.
    pub async fn repair_moves(&self, moves: Vec<MoveIntent>, claimed: &HashSet<String>) -> Vec<MoveRepair> {
        if moves.is_empty() {
            return Vec::new();
        }
        let width = self.width(moves.len());
        info!(moves = moves.len(), width, "[POOL] Repairing moved documents");
        stream::iter(moves)
            .map(|intent| async move {
                let outcome = if claimed.contains(&intent.from) {
                    info!(document_id = %intent.document_id, from = %intent.from, "[POOL] Old path reused this run, not deleting");
                    MoveOutcome::Claimed
                } else {
                    self.delete_old(&intent).await
                };
                MoveRepair { intent, outcome }
            })
            .buffered(width)
            .collect()
            .await
    }

    async fn delete_old(&self, intent: &MoveIntent) -> MoveOutcome {
        let retry = &self.options.retry;
        let remote = match with_retry(retry, "get_file", || self.store.get_file(&intent.from)).await {
            Ok(Some(remote)) => remote,
            Ok(None) => {
                info!(document_id = %intent.document_id, from = %intent.from, "[POOL] Old file already gone");
                return MoveOutcome::AlreadyGone;
            }
            Err(e) => {
                warn!(document_id = %intent.document_id, from = %intent.from, error = %e, "[POOL] Could not read old file");
                return MoveOutcome::Failed(e);
            }
        };
        let request = DeleteFile {
            path: intent.from.clone(),
            revision: remote.revision,
            message: format!("清理旧位置文件: {}", intent.from),
        };
        match with_retry(retry, "delete_file", || self.store.delete_file(request.clone())).await {
            Ok(()) => {
                info!(document_id = %intent.document_id, from = %intent.from, to = %intent.to, "[POOL] Deleted old location");
                MoveOutcome::Deleted
            }
            Err(StoreError::NotFound(_)) => MoveOutcome::AlreadyGone,
            Err(e) => {
                warn!(document_id = %intent.document_id, from = %intent.from, error = %e, "[POOL] Failed to delete old location");
                MoveOutcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_handles_short_and_long_ids() {
        assert_eq!(short_id("abcdef0123456789"), "abcdef01");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn display_title_falls_back_to_id() {
        let doc = Document {
            id: "p-1".into(),
            parent: crate::contract::ParentRef::Workspace,
            title: "  ".into(),
            properties: vec![],
            created_time: None,
            last_edited_time: None,
        };
        assert_eq!(display_title(&doc), "页面_p-1");
    }

    #[tokio::test]
    async fn collect_pages_follows_cursors() {
        let pages = vec![
            Page {
                results: vec![1, 2],
                next_cursor: Some("c1".to_string()),
            },
            Page {
                results: vec![3],
                next_cursor: None,
            },
        ];
        let seen = std::sync::Mutex::new(Vec::new());
        let items = collect_pages(&RetryPolicy::none(), "test", |cursor| {
            seen.lock().unwrap().push(cursor.clone());
            let idx = if cursor.is_none() { 0 } else { 1 };
            let page = pages[idx].clone();
            async move { Ok::<_, SourceError>(page) }
        })
        .await
        .unwrap();
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(*seen.lock().unwrap(), vec![None, Some("c1".to_string())]);
    }

    #[tokio::test]
    async fn collect_pages_stops_on_cursor_cycle() {
        // start -> a -> b -> a
        let calls = std::sync::Mutex::new(Vec::new());
        let items = collect_pages(&RetryPolicy::none(), "test", |cursor| {
            calls.lock().unwrap().push(cursor.clone());
            let (result, next) = match cursor.as_deref() {
                None => (0, "a"),
                Some("a") => (1, "b"),
                _ => (2, "a"),
            };
            async move {
                Ok::<_, SourceError>(Page {
                    results: vec![result],
                    next_cursor: Some(next.to_string()),
                })
            }
        })
        .await
        .unwrap();
        assert_eq!(items, vec![0, 1, 2]);
        assert_eq!(calls.lock().unwrap().len(), 3);
    }
}
