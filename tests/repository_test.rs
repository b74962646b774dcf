//! Integration tests for the blocking session repository.

use chrono::{Duration, Utc};
use mongo_session_store::document::{as_date, date_value, Document, Query};
use mongo_session_store::event::PublishError;
use mongo_session_store::{
    Authentication, DocumentSessionRepository, DocumentStore, FieldSessionConverter,
    IndexDefinition, IndexOperations, MemoryDocumentStore, SecurityContext,
    SerdeSessionConverter, Session, SessionConfig, SessionConverter, SessionError, SessionEvent,
    SessionEventPublisher, SessionIdGenerator, SessionRepository, StoreError,
    PRINCIPAL_NAME_INDEX_NAME, SECURITY_CONTEXT_ATTRIBUTE,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const COLLECTION: &str = "sessions";

#[derive(Debug, Default)]
struct SequentialIds(AtomicUsize);

impl SessionIdGenerator for SequentialIds {
    fn generate(&self) -> String {
        format!("session-{}", self.0.fetch_add(1, Ordering::SeqCst))
    }
}

/// Store whose every call fails as if the database were down
struct UnavailableStore;

impl IndexOperations for UnavailableStore {
    fn index_info(&self, _: &str) -> Result<Vec<IndexDefinition>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn create_index(&self, _: &str, _: &IndexDefinition) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

impl DocumentStore for UnavailableStore {
    fn find_by_id(&self, _: &str, _: &str) -> Result<Option<Document>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn save(&self, _: &str, _: Document) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn remove_by_id(&self, _: &str, _: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn remove(&self, _: &str, _: &Query) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn find(&self, _: &str, _: &Query) -> Result<Vec<Document>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

type Events = Arc<Mutex<Vec<SessionEvent>>>;

fn recorder() -> (Arc<dyn SessionEventPublisher>, Events) {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let publisher = move |event: &SessionEvent| -> Result<(), PublishError> {
        sink.lock().push(event.clone());
        Ok(())
    };
    (Arc::new(publisher), events)
}

fn setup() -> (
    MemoryDocumentStore,
    DocumentSessionRepository<MemoryDocumentStore>,
    Events,
) {
    let store = MemoryDocumentStore::new();
    let (publisher, events) = recorder();
    let repository = DocumentSessionRepository::new(store.clone())
        .with_id_generator(Arc::new(SequentialIds::default()))
        .with_event_publisher(publisher);
    repository.ensure_indexes().unwrap();
    (store, repository, events)
}

fn raw(store: &MemoryDocumentStore, id: &str) -> Option<Document> {
    DocumentStore::find_by_id(store, COLLECTION, id).unwrap()
}

#[test]
fn test_create_session_is_lazy() {
    let (store, repository, events) = setup();

    let session = repository.create_session();

    assert_eq!(session.id(), "session-0");
    assert_eq!(session.max_inactive_interval(), Duration::minutes(30));
    assert_eq!(store.count(COLLECTION), 0);
    assert_eq!(events.lock().as_slice(), &[SessionEvent::Created(session)]);
}

#[test]
fn test_save_and_find() {
    let (store, repository, _) = setup();

    let mut session = repository.create_session();
    session.set("username", "alice");
    repository.save(&mut session).unwrap();

    assert_eq!(store.count(COLLECTION), 1);
    let found = repository.find_by_id(session.id()).unwrap().unwrap();
    assert_eq!(found, session);
    assert_eq!(found.get::<String>("username").as_deref(), Some("alice"));
}

#[test]
fn test_find_missing_session() {
    let (_, repository, events) = setup();
    assert!(repository.find_by_id("nope").unwrap().is_none());
    assert!(events.lock().is_empty());
}

#[test]
fn test_expire_at_tracks_default_interval() {
    let (store, repository, _) = setup();

    let mut session = repository.create_session();
    let accessed = session.last_accessed_time();
    assert_eq!(session.expire_at(), Some(accessed + Duration::minutes(30)));

    repository.save(&mut session).unwrap();
    let stored = raw(&store, session.id()).unwrap();
    assert_eq!(
        as_date(&stored["expireAt"]),
        Some(accessed + Duration::minutes(30))
    );
}

#[test]
fn test_never_expiring_session_is_not_reaped() {
    let (store, repository, _) = setup();
    let repository = repository.with_default_max_inactive_interval(Duration::seconds(-1));

    let mut session = repository.create_session();
    session.set_last_accessed_time(Utc::now() - Duration::days(3650));
    repository.save(&mut session).unwrap();

    assert!(repository.find_by_id(session.id()).unwrap().is_some());
    assert_eq!(store.purge_expired(), 0);
    assert_eq!(store.count(COLLECTION), 1);
}

#[test]
fn test_expired_session_is_reaped_on_read() {
    let (store, repository, events) = setup();

    let mut session = repository.create_session();
    session.set_last_accessed_time(Utc::now() - Duration::hours(2));
    repository.save(&mut session).unwrap();
    assert!(raw(&store, session.id()).is_some());

    assert!(repository.find_by_id(session.id()).unwrap().is_none());
    assert!(raw(&store, session.id()).is_none());

    let events = events.lock();
    match events.last() {
        Some(SessionEvent::Deleted { id, session: Some(deleted) }) => {
            assert_eq!(id, session.id());
            assert_eq!(deleted.id(), session.id());
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_stored_expire_at_in_the_past_is_reaped() {
    let (store, repository, _) = setup();

    let mut session = repository.create_session();
    repository.save(&mut session).unwrap();

    let mut document = raw(&store, session.id()).unwrap();
    document.insert(
        "expireAt".to_string(),
        date_value(Utc::now() - Duration::seconds(1)),
    );
    DocumentStore::save(&store, COLLECTION, document).unwrap();

    assert!(repository.find_by_id(session.id()).unwrap().is_none());
    assert_eq!(store.count(COLLECTION), 0);
}

#[test]
fn test_corrupt_document_reads_as_absent_and_is_removed() {
    let (store, repository, events) = setup();

    let corrupt = json!({ "_id": "broken", "creationTime": "yesterday" });
    DocumentStore::save(&store, COLLECTION, corrupt.as_object().cloned().unwrap()).unwrap();

    assert!(repository.find_by_id("broken").unwrap().is_none());
    assert!(raw(&store, "broken").is_none());
    assert_eq!(
        events.lock().last(),
        Some(&SessionEvent::Deleted {
            id: "broken".into(),
            session: None
        })
    );
}

#[test]
fn test_rotation_moves_the_record() {
    let (store, repository, _) = setup();

    let mut session = repository.create_session();
    session.set("cart", "cart-1");
    repository.save(&mut session).unwrap();
    let original_id = session.id().to_string();

    let new_id = session.change_session_id().to_string();
    assert_ne!(new_id, original_id);
    repository.save(&mut session).unwrap();

    assert!(raw(&store, &original_id).is_none());
    assert_eq!(store.ids(COLLECTION), vec![new_id.clone()]);
    assert_eq!(session.original_id(), None);

    let found = repository.find_by_id(&new_id).unwrap().unwrap();
    assert_eq!(found.get::<String>("cart").as_deref(), Some("cart-1"));
    assert!(repository.find_by_id(&original_id).unwrap().is_none());
}

#[test]
fn test_rotation_before_first_save() {
    let (store, repository, _) = setup();

    let mut session = repository.create_session();
    session.change_session_id();
    repository.save(&mut session).unwrap();

    assert_eq!(store.ids(COLLECTION), vec![session.id().to_string()]);
}

#[test]
fn test_find_by_custom_index() {
    let (_, repository, _) = setup();

    let mut with_cart = repository.create_session();
    with_cart.set("cartId", "cart-X");
    repository.save(&mut with_cart).unwrap();

    let mut other = repository.create_session();
    other.set("cartId", "cart-Y");
    repository.save(&mut other).unwrap();

    let found = repository
        .find_by_index_name_and_index_value("cartId", "cart-X")
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[with_cart.id()], with_cart);
}

#[test]
fn test_find_by_dotted_index_name() {
    let (_, repository, _) = setup();

    let mut session = repository.create_session();
    session.set("shop.cart.id", "cart-X");
    repository.save(&mut session).unwrap();

    let found = repository
        .find_by_index_name_and_index_value("shop.cart.id", "cart-X")
        .unwrap();
    assert!(found.contains_key(session.id()));
}

#[test]
fn test_find_by_principal_name() {
    let (_, repository, _) = setup();

    let mut alice = repository.create_session();
    alice.set(
        SECURITY_CONTEXT_ATTRIBUTE,
        SecurityContext::new(Authentication::authenticated("alice", ["ROLE_USER"])),
    );
    repository.save(&mut alice).unwrap();

    let mut alice_again = repository.create_session();
    alice_again.set(PRINCIPAL_NAME_INDEX_NAME, "alice");
    repository.save(&mut alice_again).unwrap();

    let mut bob = repository.create_session();
    bob.set(PRINCIPAL_NAME_INDEX_NAME, "bob");
    repository.save(&mut bob).unwrap();

    let found = repository.find_by_principal_name("alice").unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.contains_key(alice.id()));
    assert!(found.contains_key(alice_again.id()));

    let same = repository
        .find_by_index_name_and_index_value(PRINCIPAL_NAME_INDEX_NAME, "alice")
        .unwrap();
    assert_eq!(same, found);
}

#[test]
fn test_unsupported_index_is_empty() {
    let (_, repository, _) = setup();

    let mut session = repository.create_session();
    session.set("cartId", "cart-X");
    repository.save(&mut session).unwrap();

    assert!(repository
        .find_by_index_name_and_index_value("not-an-index", "x")
        .unwrap()
        .is_empty());
    assert!(repository
        .find_by_index_name_and_index_value("", "x")
        .unwrap()
        .is_empty());
}

#[test]
fn test_index_lookup_skips_unreadable_documents() {
    let (store, repository, _) = setup();

    let mut session = repository.create_session();
    session.set(PRINCIPAL_NAME_INDEX_NAME, "alice");
    repository.save(&mut session).unwrap();

    let corrupt = json!({ "_id": "broken", "principal": "alice" });
    DocumentStore::save(&store, COLLECTION, corrupt.as_object().cloned().unwrap()).unwrap();

    let found = repository.find_by_principal_name("alice").unwrap();
    assert_eq!(found.len(), 1);
    assert!(found.contains_key(session.id()));
}

#[test]
fn test_ensure_indexes_twice() {
    let (store, repository, _) = setup();
    repository.ensure_indexes().unwrap();

    let ttl: Vec<_> = store
        .index_info(COLLECTION)
        .unwrap()
        .into_iter()
        .filter(|index| index.field == "expireAt")
        .collect();
    assert_eq!(ttl.len(), 1);
    assert_eq!(ttl[0].name, "expireAt");
    assert_eq!(ttl[0].expire_after_seconds, Some(0));
}

#[test]
fn test_ttl_index_removes_expired_documents() {
    let (store, repository, _) = setup();

    let mut expired = repository.create_session();
    expired.set_last_accessed_time(Utc::now() - Duration::hours(1));
    repository.save(&mut expired).unwrap();

    let mut live = repository.create_session();
    repository.save(&mut live).unwrap();

    assert_eq!(store.purge_expired(), 1);
    assert_eq!(store.ids(COLLECTION), vec![live.id().to_string()]);
}

#[test]
fn test_delete_by_id() {
    let (store, repository, events) = setup();

    let mut session = repository.create_session();
    repository.save(&mut session).unwrap();

    repository.delete_by_id(session.id()).unwrap();
    assert_eq!(store.count(COLLECTION), 0);
    assert_eq!(
        events.lock().last(),
        Some(&SessionEvent::Deleted {
            id: session.id().to_string(),
            session: Some(session.clone()),
        })
    );

    let before = events.lock().len();
    repository.delete_by_id(session.id()).unwrap();
    assert_eq!(events.lock().len(), before);
}

#[test]
fn test_failing_publisher_does_not_abort_operations() {
    let store = MemoryDocumentStore::new();
    let failing = |_: &SessionEvent| -> Result<(), PublishError> { Err("bus is down".into()) };
    let repository =
        DocumentSessionRepository::new(store.clone()).with_event_publisher(Arc::new(failing));

    let mut session = repository.create_session();
    repository.save(&mut session).unwrap();
    repository.delete_by_id(session.id()).unwrap();
    assert_eq!(store.count(COLLECTION), 0);
}

#[test]
fn test_unstorable_attribute_fails_save() {
    let (store, repository, _) = setup();

    let mut session = repository.create_session();
    session.set("ratio", f64::NAN);

    assert!(matches!(
        repository.save(&mut session),
        Err(SessionError::Conversion { .. })
    ));
    assert_eq!(store.count(COLLECTION), 0);
}

#[test]
fn test_store_errors_propagate() {
    let repository = DocumentSessionRepository::new(UnavailableStore);

    assert!(matches!(
        repository.ensure_indexes(),
        Err(SessionError::Store(StoreError::Unavailable(_)))
    ));
    assert!(matches!(
        repository.find_by_id("x"),
        Err(SessionError::Store(StoreError::Unavailable(_)))
    ));
    let mut session = repository.create_session();
    assert!(repository.save(&mut session).is_err());
    assert!(repository.delete_by_id("x").is_err());
    assert!(repository
        .find_by_index_name_and_index_value("cartId", "x")
        .is_err());
}

#[test]
fn test_configured_repository() {
    let store = Arc::new(MemoryDocumentStore::new());
    let config = SessionConfig::new()
        .with_collection_name("web_sessions")
        .with_max_inactive_interval(Duration::minutes(5))
        .with_converter(Arc::new(SerdeSessionConverter::new()))
        .with_id_generator(Arc::new(SequentialIds::default()));
    let repository = DocumentSessionRepository::with_config(Arc::clone(&store), &config);

    assert_eq!(repository.collection_name(), "web_sessions");
    let mut session = repository.create_session();
    assert_eq!(session.max_inactive_interval(), Duration::minutes(5));
    repository.save(&mut session).unwrap();

    assert_eq!(store.count("web_sessions"), 1);
    assert_eq!(store.count(COLLECTION), 0);
    assert_eq!(repository.find_by_id("session-0").unwrap(), Some(session));
}

#[test]
fn test_empty_collection_name_keeps_default() {
    let repository = DocumentSessionRepository::new(MemoryDocumentStore::new())
        .with_collection_name("");
    assert_eq!(repository.collection_name(), "sessions");
}

#[test]
fn test_loaded_session_rotates_with_repository_generator() {
    let (_, repository, _) = setup();

    let mut session = repository.create_session();
    repository.save(&mut session).unwrap();

    let mut loaded = repository.find_by_id(session.id()).unwrap().unwrap();
    loaded.change_session_id();
    assert!(loaded.id().starts_with("session-"));
    assert_eq!(loaded.original_id(), Some(session.id()));
}

#[test]
fn test_save_escapes_dotted_attribute_keys() {
    let (store, repository, _) = setup();
    let mut session = Session::with_id("manual", Duration::minutes(1));
    session.set("a.b", 1);
    repository.save(&mut session).unwrap();

    let document = raw(&store, "manual").unwrap();
    assert_eq!(document["_id"], json!("manual"));
    assert_eq!(document["intervalSeconds"], json!(60));
    assert!(Query::where_eq("attrs.a\u{F607}b", 1).matches(&document));
}

/// A stored copy of a fresh session with some fields overwritten
fn stored_with(id: &str, overrides: serde_json::Value) -> Document {
    let session = Session::with_id(id, Duration::minutes(30));
    let mut document = FieldSessionConverter::new().to_document(&session).unwrap();
    document.extend(overrides.as_object().cloned().unwrap());
    document
}

#[test]
fn test_out_of_range_interval_is_removed() {
    let (store, repository, events) = setup();
    let stored = stored_with("huge", json!({ "intervalSeconds": i64::MAX }));
    DocumentStore::save(&store, COLLECTION, stored).unwrap();

    assert!(repository.find_by_id("huge").unwrap().is_none());
    assert!(raw(&store, "huge").is_none());
    assert_eq!(
        events.lock().last(),
        Some(&SessionEvent::Deleted {
            id: "huge".into(),
            session: None
        })
    );
}

#[test]
fn test_non_string_type_tag_is_removed() {
    let (store, repository, _) = setup();
    let stored = stored_with("tagged", json!({ "attrs": { "m": { "@class": 5 } } }));
    DocumentStore::save(&store, COLLECTION, stored).unwrap();

    assert!(repository.find_by_id("tagged").unwrap().is_none());
    assert!(raw(&store, "tagged").is_none());
}

#[test]
fn test_out_of_range_configured_interval_never_expires() {
    let config: SessionConfig =
        serde_json::from_value(json!({ "max_inactive_interval_secs": i64::MAX })).unwrap();
    let repository =
        DocumentSessionRepository::with_config(Arc::new(MemoryDocumentStore::new()), &config);
    assert_eq!(repository.default_max_inactive_interval(), Duration::seconds(-1));

    let mut session = repository.create_session();
    assert_eq!(session.expire_at(), None);
    repository.save(&mut session).unwrap();
    assert!(repository.find_by_id(session.id()).unwrap().is_some());
}

#[test]
fn test_missing_interval_falls_back_to_converter_default() {
    let store = Arc::new(MemoryDocumentStore::new());
    let mut stored = stored_with("legacy", json!({}));
    stored.remove("intervalSeconds");
    DocumentStore::save(store.as_ref(), COLLECTION, stored).unwrap();

    // The repository setter only shapes new sessions.
    let repository =
        DocumentSessionRepository::with_config(Arc::clone(&store), &SessionConfig::new())
            .with_default_max_inactive_interval(Duration::minutes(5));
    let loaded = repository.find_by_id("legacy").unwrap().unwrap();
    assert_eq!(loaded.max_inactive_interval(), Duration::minutes(30));
    assert_eq!(repository.create_session().max_inactive_interval(), Duration::minutes(5));

    let config = SessionConfig::new().with_max_inactive_interval(Duration::minutes(5));
    let repository = DocumentSessionRepository::with_config(Arc::clone(&store), &config);
    let loaded = repository.find_by_id("legacy").unwrap().unwrap();
    assert_eq!(loaded.max_inactive_interval(), Duration::minutes(5));
}
