//! In-memory document store
//!
//! This is primarily for development and testing. It follows the index
//! semantics of a document database closely enough for the repositories to
//! be exercised end to end, including a TTL monitor that physically removes
//! expired documents.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::{DocumentStore, IndexDefinition, IndexOperations, ReactiveDocumentStore};
use crate::document::{as_date, document_id, lookup, Document, Query};
use crate::error::StoreError;

/// Name of the implicit identity index
const ID_INDEX_NAME: &str = "_id_";

struct Collection {
    documents: HashMap<String, Document>,
    indexes: Vec<IndexDefinition>,
}

impl Default for Collection {
    fn default() -> Self {
        Self {
            documents: HashMap::new(),
            indexes: vec![IndexDefinition::ascending("_id").named(ID_INDEX_NAME)],
        }
    }
}

impl Collection {
    fn purge_expired(&mut self) -> usize {
        let now = Utc::now();
        let ttl_indexes: Vec<(String, u64)> = self
            .indexes
            .iter()
            .filter_map(|index| Some((index.field.clone(), index.expire_after_seconds?)))
            .collect();
        if ttl_indexes.is_empty() {
            return 0;
        }

        let before = self.documents.len();
        self.documents.retain(|_, document| {
            !ttl_indexes.iter().any(|(field, after)| {
                lookup(document, field)
                    .and_then(as_date)
                    .and_then(|date| {
                        let after = i64::try_from(*after).ok().and_then(Duration::try_seconds)?;
                        date.checked_add_signed(after)
                    })
                    .is_some_and(|deadline| deadline < now)
            })
        });
        before - self.documents.len()
    }
}

/// In-memory document store
///
/// Warning: This store is not suitable for production use because:
/// - Documents are lost on server restart
/// - Documents are not shared across multiple server instances
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl MemoryDocumentStore {
    /// Create a new memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove documents whose TTL index date has passed.
    ///
    /// Returns the number of documents removed.
    pub fn purge_expired(&self) -> usize {
        self.collections
            .write()
            .values_mut()
            .map(Collection::purge_expired)
            .sum()
    }

    /// Run [`purge_expired`](Self::purge_expired) periodically on the
    /// current tokio runtime
    pub fn spawn_ttl_monitor(&self, period: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let removed = store.purge_expired();
                if removed > 0 {
                    tracing::debug!("TTL monitor removed {} expired documents", removed);
                }
            }
        })
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, |c| c.documents.len())
    }

    /// Ids of all documents in a collection
    pub fn ids(&self, collection: &str) -> Vec<String> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.documents.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every collection
    pub fn clear(&self) {
        self.collections.write().clear();
    }
}

impl IndexOperations for MemoryDocumentStore {
    fn index_info(&self, collection: &str) -> Result<Vec<IndexDefinition>, StoreError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_else(|| Collection::default().indexes))
    }

    fn create_index(&self, collection: &str, index: &IndexDefinition) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let collection = collections.entry(collection.to_string()).or_default();

        for existing in &collection.indexes {
            let same_name = existing.name == index.name;
            let same_key = existing.same_key(index);
            if !same_name && !same_key {
                continue;
            }
            if same_name && existing == index {
                return Ok(());
            }
            return Err(StoreError::IndexAlreadyExists(format!(
                "index {} conflicts with existing index {}",
                index.name, existing.name
            )));
        }

        collection.indexes.push(index.clone());
        Ok(())
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|c| c.documents.get(id).cloned()))
    }

    fn save(&self, collection: &str, document: Document) -> Result<(), StoreError> {
        let id = document_id(&document)
            .ok_or_else(|| StoreError::Backend("document has no string _id".to_string()))?
            .to_string();
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .documents
            .insert(id, document);
        Ok(())
    }

    fn remove_by_id(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        Ok(self
            .collections
            .write()
            .get_mut(collection)
            .is_some_and(|c| c.documents.remove(id).is_some()))
    }

    fn remove(&self, collection: &str, query: &Query) -> Result<u64, StoreError> {
        let mut collections = self.collections.write();
        let Some(collection) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = collection.documents.len();
        collection.documents.retain(|_, document| !query.matches(document));
        Ok((before - collection.documents.len()) as u64)
    }

    fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|c| {
                c.documents
                    .values()
                    .filter(|document| query.matches(document))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ReactiveDocumentStore for MemoryDocumentStore {
    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        DocumentStore::find_by_id(self, collection, id)
    }

    async fn save(&self, collection: &str, document: Document) -> Result<(), StoreError> {
        DocumentStore::save(self, collection, document)
    }

    async fn remove_by_id(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        DocumentStore::remove_by_id(self, collection, id)
    }

    async fn remove(&self, collection: &str, query: &Query) -> Result<u64, StoreError> {
        DocumentStore::remove(self, collection, query)
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        DocumentStore::find(self, collection, query)
    }
}
