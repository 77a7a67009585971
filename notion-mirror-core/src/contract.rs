//! # contract: interfaces to the source content service and the destination store
//!
//! This module defines the two seams of the engine:
//! - [`ContentSource`]: the paginated document service we mirror *from* (Notion).
//! - [`DestinationStore`]: the version-controlled repository we mirror *into* (GitHub).
//!
//! Both traits are async and annotated for `mockall`, so tests can script
//! either side deterministically. Real clients live in the CLI crate.
//!
//! The plain data types below are what the engine reasons about; transport
//! clients are responsible for mapping their wire formats onto them.

use async_trait::async_trait;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{SourceError, StoreError};

/// Where a container or document hangs in the source hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    Workspace,
    Container(String),
    Document(String),
    /// Parent kinds we do not model (blocks, etc).
    Other,
}

/// A structured collection of documents sharing a property schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub parent: ParentRef,
}

/// Result of a formula property, by declared result type.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    String(Option<String>),
    Number(Option<f64>),
    Boolean(bool),
    Date(Option<String>),
}

/// Result of a rollup property, by declared result type.
#[derive(Debug, Clone, PartialEq)]
pub enum RollupValue {
    Number(Option<f64>),
    Date(Option<String>),
    Array(Vec<PropertyValue>),
}

/// A raw, typed property value as delivered by the source.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Title(Vec<String>),
    RichText(Vec<String>),
    Select(Option<String>),
    MultiSelect(Vec<String>),
    Status(Option<String>),
    Number(Option<f64>),
    Checkbox(bool),
    /// Start of the date range.
    Date(Option<String>),
    Formula(FormulaValue),
    Rollup(RollupValue),
    CreatedTime(String),
    LastEditedTime(String),
    /// Any property type we do not extract; carries the type name.
    Unsupported(String),
}

impl PropertyValue {
    /// Type name as the source reports it.
    pub fn kind(&self) -> &str {
        match self {
            PropertyValue::Title(_) => "title",
            PropertyValue::RichText(_) => "rich_text",
            PropertyValue::Select(_) => "select",
            PropertyValue::MultiSelect(_) => "multi_select",
            PropertyValue::Status(_) => "status",
            PropertyValue::Number(_) => "number",
            PropertyValue::Checkbox(_) => "checkbox",
            PropertyValue::Date(_) => "date",
            PropertyValue::Formula(_) => "formula",
            PropertyValue::Rollup(_) => "rollup",
            PropertyValue::CreatedTime(_) => "created_time",
            PropertyValue::LastEditedTime(_) => "last_edited_time",
            PropertyValue::Unsupported(kind) => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawProperty {
    pub name: String,
    pub value: PropertyValue,
}

/// A single content item: typed properties plus an ordered body fetched
/// separately via [`ContentSource::get_blocks`].
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub parent: ParentRef,
    /// Plain title; empty when the document has none.
    pub title: String,
    pub properties: Vec<RawProperty>,
    pub created_time: Option<String>,
    pub last_edited_time: Option<String>,
}

/// One content block of a document body.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(String),
    Heading1(String),
    Heading2(String),
    Heading3(String),
    BulletedListItem(String),
    NumberedListItem(String),
    Code { language: String, text: String },
    Quote(String),
    Callout { emoji: Option<String>, text: String },
    /// Block types that render to nothing.
    Unsupported(String),
}

/// One page of a paginated listing. `next_cursor` is opaque and must be
/// followed until it is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub next_cursor: Option<String>,
}

/// Trait for reading containers and documents from the source content service.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch a container's metadata (display name, parent).
    async fn get_container(&self, container_id: &str) -> Result<Container, SourceError>;

    /// Fetch one page of documents inside a container.
    async fn query_container(
        &self,
        container_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<Document>, SourceError>;

    /// Fetch one page of every document visible to the integration.
    async fn search_documents(&self, cursor: Option<String>)
        -> Result<Page<Document>, SourceError>;

    /// Fetch a single document (used to resolve parent titles).
    async fn get_document(&self, document_id: &str) -> Result<Document, SourceError>;

    /// Fetch one page of a document's top-level content blocks.
    async fn get_blocks(
        &self,
        document_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<Block>, SourceError>;
}

/// A file as currently published in the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    pub content: Vec<u8>,
    /// Opaque revision marker required to overwrite or delete the file.
    pub revision: String,
}

/// Request to create or overwrite one file through the simple file API.
#[derive(Debug, Clone, PartialEq)]
pub struct PutFile {
    pub path: String,
    pub content: Vec<u8>,
    pub message: String,
    /// Marker of the version being replaced; `None` creates a new file.
    pub prior_revision: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteFile {
    pub path: String,
    pub revision: String,
    pub message: String,
}

/// Current head of the destination branch and the tree it points to.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchHead {
    pub commit_id: String,
    pub tree_id: String,
}

/// One path -> content-object entry of a new tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    pub blob_id: String,
}

/// Trait for the destination repository: a simple per-file API plus the
/// low-level object-graph API used for atomic multi-file commits.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Read a file by path. `Ok(None)` when it does not exist.
    async fn get_file(&self, path: &str) -> Result<Option<RemoteFile>, StoreError>;

    /// Write one file. A stale `prior_revision` yields [`StoreError::Conflict`].
    async fn put_file(&self, request: PutFile) -> Result<(), StoreError>;

    /// Delete one file guarded by its current revision.
    async fn delete_file(&self, request: DeleteFile) -> Result<(), StoreError>;

    /// Read the branch head commit and its tree.
    async fn read_head(&self) -> Result<BranchHead, StoreError>;

    /// Store a content object; returns its id.
    async fn create_blob(&self, content: Vec<u8>) -> Result<String, StoreError>;

    /// Create a tree as a delta over `base_tree`; returns its id.
    async fn create_tree(
        &self,
        base_tree: String,
        entries: Vec<TreeEntry>,
    ) -> Result<String, StoreError>;

    /// Create a revision on top of `parents`; returns its id.
    async fn create_commit(
        &self,
        message: String,
        tree_id: String,
        parents: Vec<String>,
    ) -> Result<String, StoreError>;

    /// Advance the branch to `commit_id` (fast-forward only). A concurrent
    /// writer yields [`StoreError::Conflict`].
    async fn update_ref(&self, commit_id: String) -> Result<(), StoreError>;
}
