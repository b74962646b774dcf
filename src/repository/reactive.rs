//! Non-blocking session repository over a [`ReactiveDocumentStore`]

use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use super::ReactiveSessionRepository;
use crate::config::SessionConfig;
use crate::converter::SessionConverter;
use crate::document::{Document, Query};
use crate::error::Result;
use crate::event::{publish, SessionEvent, SessionEventPublisher};
use crate::id::SessionIdGenerator;
use crate::session::Session;
use crate::store::{IndexOperations, ReactiveDocumentStore};

/// Session repository backed by a non-blocking document store
///
/// Suspension points are id generation (run on the blocking pool of the
/// configured runtime handle, or of the current runtime) and every store
/// call. Operations on different ids need no coordination; concurrent
/// writes to the same id are last-write-wins in the store.
///
/// Reactive stores do not manage indexes. Supply a blocking
/// [`IndexOperations`] handle with [`with_index_operations`] to have the
/// TTL index created once, before the first store call; without one, index
/// provisioning is skipped.
///
/// [`with_index_operations`]: Self::with_index_operations
pub struct ReactiveDocumentSessionRepository<S: ReactiveDocumentStore> {
    store: Arc<S>,
    default_max_inactive_interval: Duration,
    collection_name: String,
    converter: Arc<dyn SessionConverter>,
    id_generator: Arc<dyn SessionIdGenerator>,
    event_publisher: Option<Arc<dyn SessionEventPublisher>>,
    index_operations: Option<Arc<dyn IndexOperations>>,
    executor: Option<Handle>,
    indexes_ready: OnceCell<()>,
}

impl<S: ReactiveDocumentStore> ReactiveDocumentSessionRepository<S> {
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
            index_operations: None,
            executor: None,
            indexes_ready: OnceCell::new(),
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

    /// Blocking handle used only to provision indexes
    pub fn with_index_operations(mut self, indexes: Arc<dyn IndexOperations>) -> Self {
        self.index_operations = Some(indexes);
        self
    }

    /// Runtime whose blocking pool runs id generation and index provisioning
    pub fn with_executor(mut self, handle: Handle) -> Self {
        self.executor = Some(handle);
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

    /// Provision indexes once; later calls return immediately
    pub async fn ensure_indexes(&self) -> Result<()> {
        self.indexes_ready
            .get_or_try_init(|| self.provision_indexes())
            .await
            .map(|_| ())
    }

    async fn provision_indexes(&self) -> Result<()> {
        let Some(indexes) = self.index_operations.clone() else {
            tracing::debug!(
                "No blocking index handle for collection {}, skipping index provisioning",
                self.collection_name
            );
            return Ok(());
        };
        let converter = Arc::clone(&self.converter);
        let collection = self.collection_name.clone();
        self.spawn_blocking(move || converter.ensure_indexes(indexes.as_ref(), &collection))
            .await?
    }

    fn spawn_blocking<F, R>(&self, task: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        match &self.executor {
            Some(handle) => handle.spawn_blocking(task),
            None => tokio::task::spawn_blocking(task),
        }
    }

    fn to_session(&self, document: Document) -> Option<Session> {
        let mut session = self.converter.to_session(document)?;
        session.set_id_generator(Arc::clone(&self.id_generator));
        Some(session)
    }

    async fn delete_document(&self, id: &str, session: Option<Session>) -> Result<()> {
        self.store.remove_by_id(&self.collection_name, id).await?;
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

#[async_trait]
impl<S: ReactiveDocumentStore> ReactiveSessionRepository for ReactiveDocumentSessionRepository<S> {
    async fn create_session(&self) -> Result<Session> {
        let generator = Arc::clone(&self.id_generator);
        let id = self.spawn_blocking(move || generator.generate()).await?;

        let mut session = Session::with_id(id, self.default_max_inactive_interval);
        session.set_id_generator(Arc::clone(&self.id_generator));
        publish(
            self.event_publisher.as_ref(),
            SessionEvent::Created(session.clone()),
        );
        Ok(session)
    }

    async fn save(&self, session: &mut Session) -> Result<()> {
        self.ensure_indexes().await?;
        let document = self.converter.to_document(session)?;

        if session.has_changed_session_id() {
            if let Some(original_id) = session.original_id() {
                self.store
                    .remove(&self.collection_name, &Query::by_id(original_id))
                    .await?;
            }
        }
        self.store.save(&self.collection_name, document).await?;
        session.mark_persisted();
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Session>> {
        self.ensure_indexes().await?;
        let Some(document) = self.store.find_by_id(&self.collection_name, id).await? else {
            return Ok(None);
        };

        match self.to_session(document) {
            Some(session) if !session.is_expired() => Ok(Some(session)),
            Some(session) => {
                tracing::debug!("Session {} expired, deleting", id);
                self.delete_document(id, Some(session)).await?;
                Ok(None)
            }
            None => {
                self.delete_document(id, None).await?;
                Ok(None)
            }
        }
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        self.ensure_indexes().await?;
        match self.store.find_by_id(&self.collection_name, id).await? {
            Some(document) => self.delete_document(id, self.to_session(document)).await,
            None => Ok(()),
        }
    }

    async fn find_by_index_name_and_index_value(
        &self,
        index_name: &str,
        index_value: &str,
    ) -> Result<HashMap<String, Session>> {
        self.ensure_indexes().await?;
        let Some(query) = self.converter.query_for_index(index_name, index_value) else {
            return Ok(HashMap::new());
        };

        Ok(self
            .store
            .find(&self.collection_name, &query)
            .await?
            .into_iter()
            .filter_map(|document| self.to_session(document))
            .map(|session| (session.id().to_string(), session))
            .collect())
    }
}
