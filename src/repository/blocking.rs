//! Blocking session repository over a [`DocumentStore`]

use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;

use super::SessionRepository;
use crate::config::SessionConfig;
use crate::converter::SessionConverter;
use crate::document::{Document, Query};
use crate::error::Result;
use crate::event::{publish, SessionEvent, SessionEventPublisher};
use crate::id::SessionIdGenerator;
use crate::session::Session;
use crate::store::DocumentStore;

/// Session repository backed by a blocking document store
///
/// Saving a rotated session removes the old record and then upserts the new
/// one. The two writes are not atomic: if the upsert fails, the old record
/// is already gone and the session has no record until the save is retried.
///
/// # Example
///
/// ```rust
/// use mongo_session_store::{DocumentSessionRepository, MemoryDocumentStore, SessionRepository};
///
/// let repository = DocumentSessionRepository::new(MemoryDocumentStore::new());
/// repository.ensure_indexes().unwrap();
///
/// let mut session = repository.create_session();
/// session.set("user", "alice");
/// repository.save(&mut session).unwrap();
///
/// let found = repository.find_by_id(session.id()).unwrap().unwrap();
/// assert_eq!(found.get::<String>("user").as_deref(), Some("alice"));
/// ```
pub struct DocumentSessionRepository<S: DocumentStore> {
    store: Arc<S>,
    default_max_inactive_interval: Duration,
    collection_name: String,
    converter: Arc<dyn SessionConverter>,
    id_generator: Arc<dyn SessionIdGenerator>,
    event_publisher: Option<Arc<dyn SessionEventPublisher>>,
}

impl<S: DocumentStore> DocumentSessionRepository<S> {
    /// Create a repository with the default configuration
    pub fn new(store: S) -> Self {
        Self::with_config(Arc::new(store), &SessionConfig::default())
    }

    /// Create a repository from a shared store and a configuration
    pub fn with_config(store: Arc<S>, config: &SessionConfig) -> Self {
        Self {
            store,
            default_max_inactive_interval: config.max_inactive_interval(),
            collection_name: config.collection_name().to_string(),
            converter: config.converter(),
            id_generator: config.id_generator(),
            event_publisher: None,
        }
    }

    /// Build with a default max inactive interval (negative: never expire)
    ///
    /// Applies to sessions this repository creates. Stored documents without
    /// an interval take theirs from the converter, so configure that fallback
    /// through [`SessionConfig`] or the converter's own
    /// `with_default_max_inactive_interval`.
    pub fn with_default_max_inactive_interval(mut self, interval: Duration) -> Self {
        self.default_max_inactive_interval = interval;
        self
    }

    /// Build with a collection name (empty keeps the current one)
    pub fn with_collection_name<N: Into<String>>(mut self, name: N) -> Self {
        self.set_collection_name(name);
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn SessionConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_id_generator(mut self, id_generator: Arc<dyn SessionIdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }

    pub fn with_event_publisher(mut self, publisher: Arc<dyn SessionEventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// See [`with_default_max_inactive_interval`](Self::with_default_max_inactive_interval)
    pub fn set_default_max_inactive_interval(&mut self, interval: Duration) {
        self.default_max_inactive_interval = interval;
    }

    pub fn set_collection_name<N: Into<String>>(&mut self, name: N) {
        let name = name.into();
        if !name.is_empty() {
            self.collection_name = name;
        }
    }

    pub fn set_converter(&mut self, converter: Arc<dyn SessionConverter>) {
        self.converter = converter;
    }

    pub fn set_id_generator(&mut self, id_generator: Arc<dyn SessionIdGenerator>) {
        self.id_generator = id_generator;
    }

    pub fn set_event_publisher(&mut self, publisher: Arc<dyn SessionEventPublisher>) {
        self.event_publisher = Some(publisher);
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn default_max_inactive_interval(&self) -> Duration {
        self.default_max_inactive_interval
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Make sure the collection's indexes exist. Call once at startup.
    pub fn ensure_indexes(&self) -> Result<()> {
        self.converter
            .ensure_indexes(self.store.as_ref(), &self.collection_name)
    }

    fn to_session(&self, document: Document) -> Option<Session> {
        let mut session = self.converter.to_session(document)?;
        session.set_id_generator(Arc::clone(&self.id_generator));
        Some(session)
    }

    fn delete_document(&self, id: &str, session: Option<Session>) -> Result<()> {
        self.store.remove_by_id(&self.collection_name, id)?;
        publish(
            self.event_publisher.as_ref(),
            SessionEvent::Deleted {
                id: id.to_string(),
                session,
            },
        );
        Ok(())
    }
}

impl<S: DocumentStore> SessionRepository for DocumentSessionRepository<S> {
    fn create_session(&self) -> Session {
        let session = Session::new(
            Arc::clone(&self.id_generator),
            self.default_max_inactive_interval,
        );
        publish(
            self.event_publisher.as_ref(),
            SessionEvent::Created(session.clone()),
        );
        session
    }

    fn save(&self, session: &mut Session) -> Result<()> {
        let document = self.converter.to_document(session)?;

        if session.has_changed_session_id() {
            if let Some(original_id) = session.original_id() {
                self.store
                    .remove(&self.collection_name, &Query::by_id(original_id))?;
            }
        }
        self.store.save(&self.collection_name, document)?;
        session.mark_persisted();
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Session>> {
        let Some(document) = self.store.find_by_id(&self.collection_name, id)? else {
            return Ok(None);
        };

        match self.to_session(document) {
            Some(session) if !session.is_expired() => Ok(Some(session)),
            Some(session) => {
                tracing::debug!("Session {} expired, deleting", id);
                self.delete_document(id, Some(session))?;
                Ok(None)
            }
            None => {
                self.delete_document(id, None)?;
                Ok(None)
            }
        }
    }

    fn delete_by_id(&self, id: &str) -> Result<()> {
        match self.store.find_by_id(&self.collection_name, id)? {
            Some(document) => self.delete_document(id, self.to_session(document)),
            None => Ok(()),
        }
    }

    fn find_by_index_name_and_index_value(
        &self,
        index_name: &str,
        index_value: &str,
    ) -> Result<HashMap<String, Session>> {
        let Some(query) = self.converter.query_for_index(index_name, index_value) else {
            return Ok(HashMap::new());
        };

        Ok(self
            .store
            .find(&self.collection_name, &query)?
            .into_iter()
            .filter_map(|document| self.to_session(document))
            .map(|session| (session.id().to_string(), session))
            .collect())
    }
}
