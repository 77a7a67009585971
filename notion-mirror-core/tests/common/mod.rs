//! In-memory source and destination used by the multi-run scenarios.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use notion_mirror_core::contract::{
    Block, BranchHead, Container, ContentSource, DeleteFile, DestinationStore, Document, Page,
    ParentRef, PropertyValue, PutFile, RawProperty, RemoteFile, TreeEntry,
};
use notion_mirror_core::error::{SourceError, StoreError};

pub fn document(id: &str, title: &str, status: &str) -> Document {
    Document {
        id: id.to_string(),
        parent: ParentRef::Container("db".to_string()),
        title: title.to_string(),
        properties: vec![RawProperty {
            name: "Status".to_string(),
            value: PropertyValue::Status(Some(status.to_string())),
        }],
        created_time: Some("2024-03-10T10:00:00.000Z".to_string()),
        last_edited_time: None,
    }
}

#[derive(Default)]
pub struct FakeSource {
    pub containers: Mutex<HashMap<String, (Container, Vec<Document>)>>,
    pub standalone: Mutex<Vec<Document>>,
    pub blocks: Mutex<HashMap<String, Vec<Block>>>,
    /// Documents whose body fetch fails.
    pub broken: Mutex<HashSet<String>>,
}

impl FakeSource {
    pub fn with_container(id: &str, name: &str, documents: Vec<Document>) -> Self {
        let source = FakeSource::default();
        let container = Container {
            id: id.to_string(),
            name: name.to_string(),
            parent: ParentRef::Workspace,
        };
        source
            .containers
            .lock()
            .unwrap()
            .insert(id.to_string(), (container, documents));
        source
    }

    pub fn set_documents(&self, container_id: &str, documents: Vec<Document>) {
        let mut containers = self.containers.lock().unwrap();
        if let Some(entry) = containers.get_mut(container_id) {
            entry.1 = documents;
        }
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn get_container(&self, container_id: &str) -> Result<Container, SourceError> {
        self.containers
            .lock()
            .unwrap()
            .get(container_id)
            .map(|(c, _)| c.clone())
            .ok_or_else(|| SourceError::NotFound(container_id.to_string()))
    }

    async fn query_container(
        &self,
        container_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<Document>, SourceError> {
        let docs = self
            .containers
            .lock()
            .unwrap()
            .get(container_id)
            .map(|(_, d)| d.clone())
            .ok_or_else(|| SourceError::NotFound(container_id.to_string()))?;
        // Two documents per page to exercise pagination.
        let start: usize = cursor.as_deref().map(|c| c.parse().unwrap()).unwrap_or(0);
        let end = (start + 2).min(docs.len());
        Ok(Page {
            results: docs[start..end].to_vec(),
            next_cursor: (end < docs.len()).then(|| end.to_string()),
        })
    }

    async fn search_documents(&self, _cursor: Option<String>) -> Result<Page<Document>, SourceError> {
        let mut all: Vec<Document> = self.standalone.lock().unwrap().clone();
        for (_, docs) in self.containers.lock().unwrap().values() {
            all.extend(docs.iter().cloned());
        }
        Ok(Page {
            results: all,
            next_cursor: None,
        })
    }

    async fn get_document(&self, document_id: &str) -> Result<Document, SourceError> {
        self.standalone
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == document_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(document_id.to_string()))
    }

    async fn get_blocks(
        &self,
        document_id: &str,
        _cursor: Option<String>,
    ) -> Result<Page<Block>, SourceError> {
        if self.broken.lock().unwrap().contains(document_id) {
            return Err(SourceError::Transient("connection reset".to_string()));
        }
        Ok(Page {
            results: self
                .blocks
                .lock()
                .unwrap()
                .get(document_id)
                .cloned()
                .unwrap_or_else(|| vec![Block::Paragraph(format!("body of {document_id}"))]),
            next_cursor: None,
        })
    }
}

#[derive(Default)]
struct StoreState {
    /// path -> (content, revision)
    files: BTreeMap<String, (Vec<u8>, String)>,
    blobs: HashMap<String, Vec<u8>>,
    trees: HashMap<String, Vec<TreeEntry>>,
    commits: HashMap<String, String>,
    head: u64,
    next_id: u64,
}

/// A branch with a flat file map. Commits apply their tree delta when the
/// ref is updated.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
    pub puts: Mutex<Vec<String>>,
    pub deletes: Mutex<Vec<String>>,
    pub ref_updates: Mutex<u32>,
}

impl FakeStore {
    pub fn files(&self) -> BTreeMap<String, Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .files
            .iter()
            .map(|(p, (c, _))| (p.clone(), c.clone()))
            .collect()
    }

    pub fn seed(&self, path: &str, content: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let revision = format!("rev-{}", state.next_id);
        state.files.insert(path.to_string(), (content.to_vec(), revision));
    }

    fn next(state: &mut StoreState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{prefix}-{}", state.next_id)
    }
}

#[async_trait]
impl DestinationStore for FakeStore {
    async fn get_file(&self, path: &str) -> Result<Option<RemoteFile>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .files
            .get(path)
            .map(|(content, revision)| RemoteFile {
                content: content.clone(),
                revision: revision.clone(),
            }))
    }

    async fn put_file(&self, request: PutFile) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let current = state.files.get(&request.path).map(|(_, r)| r.clone());
        if current != request.prior_revision {
            return Err(StoreError::Conflict(request.path));
        }
        let revision = FakeStore::next(&mut state, "rev");
        state
            .files
            .insert(request.path.clone(), (request.content, revision));
        self.puts.lock().unwrap().push(request.path);
        Ok(())
    }

    async fn delete_file(&self, request: DeleteFile) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        match state.files.get(&request.path) {
            Some((_, revision)) if *revision == request.revision => {
                state.files.remove(&request.path);
                self.deletes.lock().unwrap().push(request.path);
                Ok(())
            }
            Some(_) => Err(StoreError::Conflict(request.path)),
            None => Err(StoreError::NotFound(request.path)),
        }
    }

    async fn read_head(&self) -> Result<BranchHead, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(BranchHead {
            commit_id: format!("commit-{}", state.head),
            tree_id: format!("tree-{}", state.head),
        })
    }

    async fn create_blob(&self, content: Vec<u8>) -> Result<String, StoreError> {
        let mut state = self.state.lock().unwrap();
        let id = FakeStore::next(&mut state, "blob");
        state.blobs.insert(id.clone(), content);
        Ok(id)
    }

    async fn create_tree(
        &self,
        _base_tree: String,
        entries: Vec<TreeEntry>,
    ) -> Result<String, StoreError> {
        let mut state = self.state.lock().unwrap();
        let id = FakeStore::next(&mut state, "tree");
        state.trees.insert(id.clone(), entries);
        Ok(id)
    }

    async fn create_commit(
        &self,
        _message: String,
        tree_id: String,
        _parents: Vec<String>,
    ) -> Result<String, StoreError> {
        let mut state = self.state.lock().unwrap();
        let id = FakeStore::next(&mut state, "commit");
        state.commits.insert(id.clone(), tree_id);
        Ok(id)
    }

    async fn update_ref(&self, commit_id: String) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let tree_id = state
            .commits
            .get(&commit_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(commit_id.clone()))?;
        let entries = state.trees.get(&tree_id).cloned().unwrap_or_default();
        for entry in entries {
            let content = state.blobs.get(&entry.blob_id).cloned().unwrap_or_default();
            let revision = FakeStore::next(&mut state, "rev");
            state.files.insert(entry.path, (content, revision));
        }
        state.head += 1;
        *self.ref_updates.lock().unwrap() += 1;
        Ok(())
    }
}
