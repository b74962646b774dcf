//! Session entity persisted by the repositories

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

use crate::attribute::AttributeValue;
use crate::id::{default_generator, SessionIdGenerator};

/// Default max inactive interval (30 minutes)
pub const DEFAULT_MAX_INACTIVE_INTERVAL_SECS: i64 = 1800;

/// Current time at the store's date resolution (milliseconds)
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// A user session
///
/// Sessions are created by a repository, mutated by the request layer and
/// handed back to the repository for saving. The `expire_at` instant is
/// derived from the last access time and the max inactive interval; a
/// negative interval means the session never expires.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    original_id: Option<String>,
    creation_time: DateTime<Utc>,
    last_accessed_time: DateTime<Utc>,
    max_inactive_interval: Duration,
    attributes: HashMap<String, AttributeValue>,
    expire_at: Option<DateTime<Utc>>,
    id_generator: Arc<dyn SessionIdGenerator>,
}

impl Session {
    /// Create a new session with a generated id
    pub fn new(id_generator: Arc<dyn SessionIdGenerator>, max_inactive_interval: Duration) -> Self {
        let id = id_generator.generate();
        let mut session = Self::with_id(id, max_inactive_interval);
        session.id_generator = id_generator;
        session
    }

    /// Create a new session with the given id
    pub fn with_id<S: Into<String>>(id: S, max_inactive_interval: Duration) -> Self {
        let created = now();
        Self::restore(id, created, created, max_inactive_interval, HashMap::new())
    }

    /// Rebuild a session from stored state
    pub fn restore<S: Into<String>>(
        id: S,
        creation_time: DateTime<Utc>,
        last_accessed_time: DateTime<Utc>,
        max_inactive_interval: Duration,
        attributes: HashMap<String, AttributeValue>,
    ) -> Self {
        let mut session = Self {
            id: id.into(),
            original_id: None,
            creation_time: creation_time.trunc_subsecs(3),
            last_accessed_time: last_accessed_time.trunc_subsecs(3),
            max_inactive_interval,
            attributes,
            expire_at: None,
            id_generator: default_generator(),
        };
        session.recompute_expire_at();
        session
    }

    /// Get the session ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id this session was loaded or created under, if it was rotated since
    pub fn original_id(&self) -> Option<&str> {
        self.original_id.as_deref()
    }

    /// Whether the id changed since the session was last persisted
    pub fn has_changed_session_id(&self) -> bool {
        matches!(&self.original_id, Some(original) if *original != self.id)
    }

    /// Replace the session id, keeping all other state
    pub fn change_session_id(&mut self) -> &str {
        let new_id = self.id_generator.generate();
        let old_id = std::mem::replace(&mut self.id, new_id);
        if self.original_id.is_none() {
            self.original_id = Some(old_id);
        }
        &self.id
    }

    /// Forget the rotation marker once the session is stored under its id
    pub fn mark_persisted(&mut self) {
        self.original_id = None;
    }

    /// Use a different id generator for future rotations
    pub fn set_id_generator(&mut self, id_generator: Arc<dyn SessionIdGenerator>) {
        self.id_generator = id_generator;
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    pub fn last_accessed_time(&self) -> DateTime<Utc> {
        self.last_accessed_time
    }

    pub fn set_last_accessed_time(&mut self, time: DateTime<Utc>) {
        self.last_accessed_time = time.trunc_subsecs(3);
        self.recompute_expire_at();
    }

    /// Record an access now
    pub fn touch(&mut self) {
        self.set_last_accessed_time(now());
    }

    pub fn max_inactive_interval(&self) -> Duration {
        self.max_inactive_interval
    }

    /// Set the inactivity timeout; negative means never expire
    pub fn set_max_inactive_interval(&mut self, interval: Duration) {
        self.max_inactive_interval = interval;
        self.recompute_expire_at();
    }

    /// Instant after which the session is expired; `None` if it never expires
    pub fn expire_at(&self) -> Option<DateTime<Utc>> {
        self.expire_at
    }

    /// Override the expiry instant with a stored value
    pub fn set_expire_at(&mut self, expire_at: Option<DateTime<Utc>>) {
        self.expire_at = expire_at.map(|at| at.trunc_subsecs(3));
    }

    fn recompute_expire_at(&mut self) {
        self.expire_at = if self.max_inactive_interval < Duration::zero() {
            None
        } else {
            self.last_accessed_time
                .checked_add_signed(self.max_inactive_interval)
        };
    }

    /// Check if the session is expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expire_at {
            Some(exp) => exp < now,
            None => false,
        }
    }

    /// Get a raw attribute value
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Get a value from the session
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.attributes.get(key)?.encode().ok()?;
        serde_json::from_value(value).ok()
    }

    /// Set a value in the session; setting `Null` removes the attribute
    pub fn set<K: Into<String>, V: Into<AttributeValue>>(&mut self, key: K, value: V) {
        let key = key.into();
        match value.into() {
            AttributeValue::Null => {
                self.attributes.remove(&key);
            }
            value => {
                self.attributes.insert(key, value);
            }
        }
    }

    /// Remove a value from the session
    pub fn remove(&mut self, key: &str) -> Option<AttributeValue> {
        self.attributes.remove(key)
    }

    /// Check if a key exists in the session
    pub fn contains(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn attributes(&self) -> &HashMap<String, AttributeValue> {
        &self.attributes
    }

    /// Clear all session data
    pub fn clear(&mut self) {
        self.attributes.clear();
    }

    /// Check if the session is empty (no user data)
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.original_id == other.original_id
            && self.creation_time == other.creation_time
            && self.last_accessed_time == other.last_accessed_time
            && self.max_inactive_interval == other.max_inactive_interval
            && self.attributes == other.attributes
            && self.expire_at == other.expire_at
    }
}
