//! Session repository traits

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::index::PRINCIPAL_NAME_INDEX_NAME;
use crate::session::Session;

/// Blocking session repository
///
/// Every operation runs on the calling thread.
pub trait SessionRepository: Send + Sync {
    /// Create a new, not yet persisted session
    fn create_session(&self) -> Session;

    /// Persist a session.
    ///
    /// A session whose id was rotated is first removed under its original
    /// id, then stored under the new one.
    fn save(&self, session: &mut Session) -> Result<()>;

    /// Load a live session; expired or unreadable records are deleted and
    /// reported as absent
    fn find_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Delete a session if it exists
    fn delete_by_id(&self, id: &str) -> Result<()>;

    /// Sessions whose index `index_name` equals `index_value`, keyed by id
    fn find_by_index_name_and_index_value(
        &self,
        index_name: &str,
        index_value: &str,
    ) -> Result<HashMap<String, Session>>;

    /// Sessions belonging to a principal, keyed by id
    fn find_by_principal_name(&self, principal_name: &str) -> Result<HashMap<String, Session>> {
        self.find_by_index_name_and_index_value(PRINCIPAL_NAME_INDEX_NAME, principal_name)
    }
}

/// Non-blocking session repository with the same contract as
/// [`SessionRepository`]
#[async_trait]
pub trait ReactiveSessionRepository: Send + Sync {
    async fn create_session(&self) -> Result<Session>;

    async fn save(&self, session: &mut Session) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn delete_by_id(&self, id: &str) -> Result<()>;

    async fn find_by_index_name_and_index_value(
        &self,
        index_name: &str,
        index_value: &str,
    ) -> Result<HashMap<String, Session>>;

    async fn find_by_principal_name(
        &self,
        principal_name: &str,
    ) -> Result<HashMap<String, Session>> {
        self.find_by_index_name_and_index_value(PRINCIPAL_NAME_INDEX_NAME, principal_name)
            .await
    }
}
