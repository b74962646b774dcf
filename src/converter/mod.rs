//! Conversion between sessions and stored documents
//!
//! Both converters write the same document shape:
//!
//! ```text
//! { _id, creationTime, lastAccessedTime, intervalSeconds,
//!   attrs: { <escaped name>: <value>, ... },
//!   principal, expireAt }
//! ```
//!
//! `principal` and `expireAt` are top-level so the store's own indexes can
//! serve principal lookups and TTL expiry.

mod fields;
mod tree;

pub use fields::FieldSessionConverter;
pub use tree::SerdeSessionConverter;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::attribute::{escape_key, unescape_key, AttributeValue, DecodeError, TypeAllowList};
use crate::document::{as_date, Document, Query};
use crate::error::{Result, SessionError};
use crate::index::{DelegatingIndexResolver, IndexResolver, PRINCIPAL_NAME_INDEX_NAME};
use crate::session::{Session, DEFAULT_MAX_INACTIVE_INTERVAL_SECS};
use crate::store::{IndexDefinition, IndexOperations};

pub const EXPIRE_AT_FIELD_NAME: &str = "expireAt";
pub const PRINCIPAL_FIELD_NAME: &str = "principal";
pub const ATTRIBUTES_FIELD_NAME: &str = "attrs";
pub const CREATION_TIME_FIELD_NAME: &str = "creationTime";
pub const LAST_ACCESSED_TIME_FIELD_NAME: &str = "lastAccessedTime";
pub const INTERVAL_FIELD_NAME: &str = "intervalSeconds";

/// Bookkeeping field some writers leave behind; never part of a session
pub(crate) const ORIGINAL_ID_FIELD_NAME: &str = "originalSessionId";

/// Maps sessions to and from their stored form
pub trait SessionConverter: Send + Sync + 'static {
    /// Serialize a session.
    ///
    /// Fails with [`SessionError::Conversion`] when an attribute cannot be
    /// stored.
    fn to_document(&self, session: &Session) -> Result<Document>;

    /// Deserialize a stored document.
    ///
    /// Returns `None` (after logging) when the document cannot be read back;
    /// callers treat this as "not found".
    fn to_session(&self, document: Document) -> Option<Session>;

    /// Equality query for an index, or `None` if the index is unsupported
    fn query_for_index(&self, index_name: &str, index_value: &str) -> Option<Query> {
        query_for_index(index_name, index_value)
    }

    /// Make sure the TTL index on `expireAt` exists
    fn ensure_indexes(&self, indexes: &dyn IndexOperations, collection: &str) -> Result<()> {
        ensure_ttl_index(indexes, collection)
    }
}

/// Settings and helpers shared by the converters
#[derive(Clone)]
pub(crate) struct ConverterCore {
    index_resolver: Arc<dyn IndexResolver>,
    allowed_types: TypeAllowList,
    default_max_inactive_interval: Duration,
}

impl Default for ConverterCore {
    fn default() -> Self {
        Self {
            index_resolver: Arc::new(DelegatingIndexResolver::default()),
            allowed_types: TypeAllowList::default(),
            default_max_inactive_interval: Duration::seconds(DEFAULT_MAX_INACTIVE_INTERVAL_SECS),
        }
    }
}

impl ConverterCore {
    pub(crate) fn set_index_resolver(&mut self, resolver: Arc<dyn IndexResolver>) {
        self.index_resolver = resolver;
    }

    pub(crate) fn allow_type(&mut self, tag: String) {
        self.allowed_types.allow(tag);
    }

    pub(crate) fn set_default_max_inactive_interval(&mut self, interval: Duration) {
        self.default_max_inactive_interval = interval;
    }

    pub(crate) fn default_interval_seconds(&self) -> i64 {
        self.default_max_inactive_interval.num_seconds()
    }

    /// Principal name as resolved by the configured resolver
    pub(crate) fn extract_principal(&self, session: &Session) -> Option<String> {
        self.index_resolver
            .resolve_indexes_for(session)
            .remove(PRINCIPAL_NAME_INDEX_NAME)
    }

    pub(crate) fn encode_attributes(&self, session: &Session) -> Result<Map<String, Value>> {
        let mut attrs = Map::new();
        for (name, value) in session.attributes() {
            let encoded = value.encode().map_err(|e| {
                SessionError::conversion(session.id(), format!("attribute `{}`: {}", name, e))
            })?;
            attrs.insert(escape_key(name), encoded);
        }
        Ok(attrs)
    }

    pub(crate) fn decode_attributes(
        &self,
        attrs: &Map<String, Value>,
    ) -> std::result::Result<HashMap<String, AttributeValue>, DecodeError> {
        attrs
            .iter()
            .map(|(name, value)| {
                Ok((
                    unescape_key(name),
                    AttributeValue::decode(value, &self.allowed_types)?,
                ))
            })
            .collect()
    }

    /// Detach the fields that are not part of the session's own structure
    pub(crate) fn take_expire_at(&self, document: &mut Document) -> Option<DateTime<Utc>> {
        document.remove(ORIGINAL_ID_FIELD_NAME);
        document.remove(EXPIRE_AT_FIELD_NAME).as_ref().and_then(as_date)
    }
}

/// Equality query for `index_name`.
///
/// The principal name index targets the `principal` field; any other index
/// targets the attribute of the same name.
pub fn query_for_index(index_name: &str, index_value: &str) -> Option<Query> {
    if index_name == PRINCIPAL_NAME_INDEX_NAME {
        return Some(Query::where_eq(PRINCIPAL_FIELD_NAME, index_value));
    }
    if index_name.is_empty() || index_name.starts_with('$') {
        return None;
    }
    Some(Query::where_eq(
        format!("{}.{}", ATTRIBUTES_FIELD_NAME, escape_key(index_name)),
        index_value,
    ))
}

/// Ensure a zero-offset TTL index on `expireAt`, so that removal time is
/// controlled by the stored value alone
pub fn ensure_ttl_index(indexes: &dyn IndexOperations, collection: &str) -> Result<()> {
    if indexes
        .index_info(collection)?
        .iter()
        .any(|info| info.name == EXPIRE_AT_FIELD_NAME)
    {
        tracing::debug!("TTL index on field {} already exists", EXPIRE_AT_FIELD_NAME);
        return Ok(());
    }

    tracing::info!("Creating TTL index on field {}", EXPIRE_AT_FIELD_NAME);

    let index = IndexDefinition::ascending(EXPIRE_AT_FIELD_NAME)
        .named(EXPIRE_AT_FIELD_NAME)
        .expire_after(0);
    match indexes.create_index(collection, &index) {
        Ok(()) => Ok(()),
        Err(e) if e.is_index_conflict() => {
            tracing::debug!(
                "TTL index on field {} already exists (caught during creation): {}",
                EXPIRE_AT_FIELD_NAME,
                e
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Log a decoding failure and turn it into "no session"
pub(crate) fn log_decode_failure(
    result: std::result::Result<Session, DecodeError>,
) -> Option<Session> {
    match result {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::error!("Error during session deserialization: {}", e);
            None
        }
    }
}
