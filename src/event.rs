//! Session lifecycle notifications
//!
//! Publishing is best effort: a failing publisher is logged and never
//! aborts the repository operation that raised the event.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::session::Session;

/// Error returned by a publisher
pub type PublishError = Box<dyn StdError + Send + Sync>;

/// A session lifecycle event
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A session was created (not yet persisted)
    Created(Session),
    /// A stored session was deleted; the payload is absent when the stored
    /// document could not be read back as a session
    Deleted { id: String, session: Option<Session> },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::Created(session) => session.id(),
            SessionEvent::Deleted { id, .. } => id,
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Created(session) => write!(f, "SessionCreated({})", session.id()),
            SessionEvent::Deleted { id, .. } => write!(f, "SessionDeleted({})", id),
        }
    }
}

/// Receiver of session lifecycle events
pub trait SessionEventPublisher: Send + Sync + 'static {
    fn publish(&self, event: &SessionEvent) -> Result<(), PublishError>;
}

impl<F> SessionEventPublisher for F
where
    F: Fn(&SessionEvent) -> Result<(), PublishError> + Send + Sync + 'static,
{
    fn publish(&self, event: &SessionEvent) -> Result<(), PublishError> {
        self(event)
    }
}

/// Fans events out to any number of `tokio` broadcast subscribers
#[derive(Debug, Clone)]
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<SessionEvent>,
}

impl BroadcastEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl SessionEventPublisher for BroadcastEventPublisher {
    fn publish(&self, event: &SessionEvent) -> Result<(), PublishError> {
        self.sender
            .send(event.clone())
            .map(|_| ())
            .map_err(|_| "no active subscribers".into())
    }
}

/// Deliver an event, logging instead of failing
pub(crate) fn publish(publisher: Option<&Arc<dyn SessionEventPublisher>>, event: SessionEvent) {
    match publisher {
        None => tracing::debug!("No event publisher set, dropping {}", event),
        Some(publisher) => {
            if let Err(e) = publisher.publish(&event) {
                tracing::error!("Error publishing {}: {}", event, e);
            }
        }
    }
}
