//! Document store traits
//!
//! These are the primitives a repository needs from a document database:
//! lookup by id, upsert by id, removal, equality queries, and index
//! management. Connection handling and the wire protocol belong to the
//! implementation.

use async_trait::async_trait;

use crate::document::{Document, Query};
use crate::error::StoreError;

/// A single-field index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub field: String,
    pub ascending: bool,
    /// Set for TTL indexes: documents are removed this many seconds after
    /// the date stored in `field`
    pub expire_after_seconds: Option<u64>,
}

impl IndexDefinition {
    /// Ascending index named after its field
    pub fn ascending<S: Into<String>>(field: S) -> Self {
        let field = field.into();
        Self {
            name: field.clone(),
            field,
            ascending: true,
            expire_after_seconds: None,
        }
    }

    pub fn named<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Turn this into a TTL index
    pub fn expire_after(mut self, seconds: u64) -> Self {
        self.expire_after_seconds = Some(seconds);
        self
    }

    /// Same key and options, ignoring the name
    pub fn same_key(&self, other: &IndexDefinition) -> bool {
        self.field == other.field && self.ascending == other.ascending
    }
}

/// Index administration on a collection
pub trait IndexOperations: Send + Sync + 'static {
    /// Indexes currently defined on the collection
    fn index_info(&self, collection: &str) -> Result<Vec<IndexDefinition>, StoreError>;

    /// Create an index.
    ///
    /// Re-creating an identical index is a no-op. A conflicting index under
    /// the same name or key fails with [`StoreError::IndexAlreadyExists`].
    fn create_index(&self, collection: &str, index: &IndexDefinition) -> Result<(), StoreError>;
}

/// Blocking document store
pub trait DocumentStore: IndexOperations {
    /// Get a document by id
    fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Insert or replace a document by its `_id`
    fn save(&self, collection: &str, document: Document) -> Result<(), StoreError>;

    /// Remove a document by id, returning whether one existed
    fn remove_by_id(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    /// Remove every matching document, returning how many were removed
    fn remove(&self, collection: &str, query: &Query) -> Result<u64, StoreError>;

    /// All matching documents
    fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;
}

/// Non-blocking document store
///
/// Reactive handles do not manage indexes; repositories that need them are
/// given a separate [`IndexOperations`] handle.
#[async_trait]
pub trait ReactiveDocumentStore: Send + Sync + 'static {
    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn save(&self, collection: &str, document: Document) -> Result<(), StoreError>;

    async fn remove_by_id(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    async fn remove(&self, collection: &str, query: &Query) -> Result<u64, StoreError>;

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;
}
