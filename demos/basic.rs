//! Basic example using the in-memory document store
//!
//! Run with `RUST_LOG=debug cargo run --example basic` to see index
//! provisioning and expiry in the logs.

use chrono::{Duration, Utc};
use mongo_session_store::{
    AttributeIndexResolver, Authentication, BroadcastEventPublisher, DelegatingIndexResolver,
    DocumentSessionRepository, MemoryDocumentStore, ReactiveDocumentSessionRepository,
    ReactiveSessionRepository, SecurityContext, SessionConfig, SessionEvent, SessionRepository,
    SECURITY_CONTEXT_ATTRIBUTE,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let store = Arc::new(MemoryDocumentStore::new());
    let monitor = store.spawn_ttl_monitor(std::time::Duration::from_secs(60));

    let resolver = DelegatingIndexResolver::default().with(AttributeIndexResolver::new("cartId"));
    let config = SessionConfig::new()
        .with_collection_name("demo_sessions")
        .with_max_inactive_interval(Duration::minutes(15))
        .with_index_resolver(Arc::new(resolver));

    let events = BroadcastEventPublisher::new(64);
    let mut subscriber = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = subscriber.recv().await {
            match event {
                SessionEvent::Created(session) => println!("created  {}", session.id()),
                SessionEvent::Deleted { id, .. } => println!("deleted  {}", id),
            }
        }
    });

    // Blocking repository
    let repository = DocumentSessionRepository::with_config(Arc::clone(&store), &config)
        .with_event_publisher(Arc::new(events.clone()));
    repository.ensure_indexes()?;

    let mut session = repository.create_session();
    session.set("views", 1);
    session.set("cartId", "cart-42");
    session.set(
        SECURITY_CONTEXT_ATTRIBUTE,
        SecurityContext::new(Authentication::authenticated("alice", ["ROLE_USER"])),
    );
    repository.save(&mut session)?;
    println!("saved    {} (expires {:?})", session.id(), session.expire_at());

    // Log-in style id rotation keeps the attributes under a new id
    let old_id = session.id().to_string();
    session.change_session_id();
    repository.save(&mut session)?;
    println!("rotated  {} -> {}", old_id, session.id());

    for (id, found) in repository.find_by_principal_name("alice")? {
        println!(
            "principal alice owns {} ({} views)",
            id,
            found.get::<i64>("views").unwrap_or_default()
        );
    }

    // An idle session reads as absent and is removed
    let mut idle = repository.create_session();
    idle.set_last_accessed_time(Utc::now() - Duration::hours(1));
    repository.save(&mut idle)?;
    assert!(repository.find_by_id(idle.id())?.is_none());

    // Non-blocking repository over the same store
    let reactive = ReactiveDocumentSessionRepository::with_config(Arc::clone(&store), &config)
        .with_index_operations(store.clone())
        .with_event_publisher(Arc::new(events));

    let mut basket = reactive.create_session().await?;
    basket.set("cartId", "cart-42");
    reactive.save(&mut basket).await?;

    let carts = reactive
        .find_by_index_name_and_index_value("cartId", "cart-42")
        .await?;
    println!("cart-42 is in {} session(s)", carts.len());

    reactive.delete_by_id(basket.id()).await?;
    repository.delete_by_id(session.id())?;

    monitor.abort();
    Ok(())
}
