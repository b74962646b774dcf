//! Serde-derived session converter
//!
//! The session is mapped onto a serde struct whose identity field is renamed
//! to `_id`, then round-tripped through a `serde_json::Value` tree.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::{
    log_decode_failure, ConverterCore, SessionConverter, EXPIRE_AT_FIELD_NAME, INTERVAL_FIELD_NAME,
};
use crate::attribute::DecodeError;
use crate::document::{date_value, Document};
use crate::error::{Result, SessionError};
use crate::index::IndexResolver;
use crate::session::Session;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSession {
    #[serde(rename = "_id")]
    id: String,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    creation_time: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    last_accessed_time: DateTime<Utc>,

    #[serde(default)]
    interval_seconds: Option<i64>,

    #[serde(default)]
    attrs: Map<String, Value>,

    /// Always recomputed from the index resolver on write, ignored on read
    #[serde(default)]
    principal: Option<String>,
}

/// Converter built on serde derive
#[derive(Clone, Default)]
pub struct SerdeSessionConverter {
    core: ConverterCore,
}

impl SerdeSessionConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom index resolver for principal extraction
    pub fn with_index_resolver(mut self, resolver: Arc<dyn IndexResolver>) -> Self {
        self.core.set_index_resolver(resolver);
        self
    }

    /// Accept an embedded type tag when reading attributes
    pub fn allow_type<S: Into<String>>(mut self, tag: S) -> Self {
        self.core.allow_type(tag.into());
        self
    }

    /// Interval used for documents that do not record one
    pub fn with_default_max_inactive_interval(mut self, interval: Duration) -> Self {
        self.core.set_default_max_inactive_interval(interval);
        self
    }

    fn decode(&self, mut document: Document) -> std::result::Result<Session, DecodeError> {
        let expire_at = self.core.take_expire_at(&mut document);
        let stored: StoredSession = serde_json::from_value(Value::Object(document))?;

        let interval = stored
            .interval_seconds
            .unwrap_or_else(|| self.core.default_interval_seconds());
        let mut session = Session::restore(
            stored.id,
            stored.creation_time,
            stored.last_accessed_time,
            Duration::try_seconds(interval).ok_or(DecodeError::MissingField(INTERVAL_FIELD_NAME))?,
            self.core.decode_attributes(&stored.attrs)?,
        );
        if expire_at.is_some() {
            session.set_expire_at(expire_at);
        }
        Ok(session)
    }
}

impl SessionConverter for SerdeSessionConverter {
    fn to_document(&self, session: &Session) -> Result<Document> {
        let stored = StoredSession {
            id: session.id().to_string(),
            creation_time: session.creation_time(),
            last_accessed_time: session.last_accessed_time(),
            interval_seconds: Some(session.max_inactive_interval().num_seconds()),
            attrs: self.core.encode_attributes(session)?,
            principal: self.core.extract_principal(session),
        };

        let mut document = match serde_json::to_value(stored)? {
            Value::Object(document) => document,
            other => {
                return Err(SessionError::conversion(
                    session.id(),
                    format!("expected an object, got {}", other),
                ))
            }
        };
        document.insert(
            EXPIRE_AT_FIELD_NAME.to_string(),
            session.expire_at().map_or(Value::Null, date_value),
        );
        Ok(document)
    }

    fn to_session(&self, document: Document) -> Option<Session> {
        log_decode_failure(self.decode(document))
    }
}
