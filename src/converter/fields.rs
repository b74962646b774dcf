//! Field-by-field session converter

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;

use super::{
    log_decode_failure, ConverterCore, SessionConverter, ATTRIBUTES_FIELD_NAME,
    CREATION_TIME_FIELD_NAME, EXPIRE_AT_FIELD_NAME, INTERVAL_FIELD_NAME,
    LAST_ACCESSED_TIME_FIELD_NAME, PRINCIPAL_FIELD_NAME,
};
use crate::attribute::DecodeError;
use crate::document::{date_value, Document, ID_FIELD};
use crate::error::Result;
use crate::index::IndexResolver;
use crate::session::Session;

/// Writes each session field explicitly.
///
/// This is the default converter.
#[derive(Clone, Default)]
pub struct FieldSessionConverter {
    core: ConverterCore,
}

impl FieldSessionConverter {
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

        let id = document
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingField(ID_FIELD))?;
        let creation_time = millis_field(&document, CREATION_TIME_FIELD_NAME)?;
        let last_accessed_time = millis_field(&document, LAST_ACCESSED_TIME_FIELD_NAME)?;
        let interval_seconds = match document.get(INTERVAL_FIELD_NAME) {
            None | Some(Value::Null) => self.core.default_interval_seconds(),
            Some(value) => value
                .as_i64()
                .ok_or(DecodeError::MissingField(INTERVAL_FIELD_NAME))?,
        };
        let attributes = match document.get(ATTRIBUTES_FIELD_NAME) {
            None | Some(Value::Null) => Default::default(),
            Some(Value::Object(attrs)) => self.core.decode_attributes(attrs)?,
            Some(_) => return Err(DecodeError::MissingField(ATTRIBUTES_FIELD_NAME)),
        };

        let mut session = Session::restore(
            id,
            creation_time,
            last_accessed_time,
            Duration::try_seconds(interval_seconds)
                .ok_or(DecodeError::MissingField(INTERVAL_FIELD_NAME))?,
            attributes,
        );
        if expire_at.is_some() {
            session.set_expire_at(expire_at);
        }
        Ok(session)
    }
}

fn millis_field(
    document: &Document,
    field: &'static str,
) -> std::result::Result<DateTime<Utc>, DecodeError> {
    document
        .get(field)
        .and_then(Value::as_i64)
        .and_then(DateTime::from_timestamp_millis)
        .ok_or(DecodeError::MissingField(field))
}

impl SessionConverter for FieldSessionConverter {
    fn to_document(&self, session: &Session) -> Result<Document> {
        let mut document = Document::new();
        document.insert(ID_FIELD.to_string(), session.id().into());
        document.insert(
            CREATION_TIME_FIELD_NAME.to_string(),
            session.creation_time().timestamp_millis().into(),
        );
        document.insert(
            LAST_ACCESSED_TIME_FIELD_NAME.to_string(),
            session.last_accessed_time().timestamp_millis().into(),
        );
        document.insert(
            INTERVAL_FIELD_NAME.to_string(),
            session.max_inactive_interval().num_seconds().into(),
        );
        document.insert(
            ATTRIBUTES_FIELD_NAME.to_string(),
            Value::Object(self.core.encode_attributes(session)?),
        );
        document.insert(
            PRINCIPAL_FIELD_NAME.to_string(),
            self.core.extract_principal(session).into(),
        );
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
