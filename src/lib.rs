//! # mongo-session-store
//!
//! Session repositories that persist web sessions in a document database.
//!
//! Each session is stored as one document keyed by its id. The principal
//! name and the expiry instant are promoted to top-level fields so the
//! database's own indexes can serve principal lookups and physically remove
//! expired sessions through a TTL index.
//!
//! ## Features
//!
//! - **Blocking and async repositories** with the same contract: create,
//!   save (including id rotation), find, delete, and lookup by index
//! - **Expiry-aware reads**: expired or unreadable records are deleted and
//!   reported as absent
//! - **Pluggable converters and index resolvers**: principal name by default,
//!   custom attribute indexes on demand
//! - **Typed attributes** with an allow-list for embedded objects such as a
//!   security context
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::Duration;
//! use mongo_session_store::{
//!     DocumentSessionRepository, MemoryDocumentStore, SessionRepository,
//!     PRINCIPAL_NAME_INDEX_NAME,
//! };
//!
//! let repository = DocumentSessionRepository::new(MemoryDocumentStore::new())
//!     .with_default_max_inactive_interval(Duration::hours(1));
//! repository.ensure_indexes().unwrap();
//!
//! let mut session = repository.create_session();
//! session.set(PRINCIPAL_NAME_INDEX_NAME, "alice");
//! repository.save(&mut session).unwrap();
//!
//! let sessions = repository.find_by_principal_name("alice").unwrap();
//! assert!(sessions.contains_key(session.id()));
//! ```

pub mod attribute;
pub mod config;
pub mod converter;
pub mod document;
pub mod error;
pub mod event;
pub mod id;
pub mod index;
pub mod repository;
pub mod session;
pub mod store;

pub use attribute::{
    escape_key, unescape_key, AttributeValue, Authentication, EmbeddedType, SecurityContext,
    TypedValue,
};
pub use config::{SessionConfig, DEFAULT_COLLECTION_NAME};
pub use converter::{FieldSessionConverter, SerdeSessionConverter, SessionConverter};
pub use document::{Document, Query};
pub use error::{Result, SessionError, StoreError};
pub use event::{BroadcastEventPublisher, SessionEvent, SessionEventPublisher};
pub use id::{SessionIdGenerator, UuidSessionIdGenerator};
pub use index::{
    AttributeIndexResolver, DelegatingIndexResolver, IndexResolver, PrincipalNameIndexResolver,
    PRINCIPAL_NAME_INDEX_NAME, SECURITY_CONTEXT_ATTRIBUTE,
};
pub use repository::{
    DocumentSessionRepository, ReactiveDocumentSessionRepository, ReactiveSessionRepository,
    SessionRepository,
};
pub use session::Session;
pub use store::{
    DocumentStore, IndexDefinition, IndexOperations, MemoryDocumentStore, ReactiveDocumentStore,
};
