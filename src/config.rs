//! Session repository configuration
//!
//! Values resolve in this order: a value set directly on a repository
//! (`with_*` / `set_*`) wins over a value carried by [`SessionConfig`],
//! which wins over the built-in default.

use chrono::Duration;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

use crate::converter::{FieldSessionConverter, SessionConverter};
use crate::id::{default_generator, SessionIdGenerator};
use crate::index::IndexResolver;
use crate::session::DEFAULT_MAX_INACTIVE_INTERVAL_SECS;

/// Default collection for storing sessions
pub const DEFAULT_COLLECTION_NAME: &str = "sessions";

/// Configuration for the session repositories
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Max inactive interval in seconds for new sessions (default: 1800).
    /// Negative values mean sessions never expire.
    pub max_inactive_interval_secs: i64,

    /// Collection holding the sessions (default: "sessions").
    /// An empty name falls back to the default.
    pub collection_name: String,

    /// Custom converter (default: [`FieldSessionConverter`])
    #[serde(skip)]
    pub converter: Option<Arc<dyn SessionConverter>>,

    /// Custom index resolver, applied to the default converter only
    #[serde(skip)]
    pub index_resolver: Option<Arc<dyn IndexResolver>>,

    /// Custom id generator (default: UUID v4)
    #[serde(skip)]
    pub id_generator: Option<Arc<dyn SessionIdGenerator>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_inactive_interval_secs: DEFAULT_MAX_INACTIVE_INTERVAL_SECS,
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            converter: None,
            index_resolver: None,
            id_generator: None,
        }
    }
}

impl SessionConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the max inactive interval in seconds
    pub fn with_max_inactive_interval_secs(mut self, secs: i64) -> Self {
        self.max_inactive_interval_secs = secs;
        self
    }

    /// Set the max inactive interval from a Duration
    pub fn with_max_inactive_interval(mut self, interval: Duration) -> Self {
        self.max_inactive_interval_secs = interval.num_seconds();
        self
    }

    /// Set the collection name (empty keeps the default)
    pub fn with_collection_name<S: Into<String>>(mut self, name: S) -> Self {
        self.collection_name = name.into();
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn SessionConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn with_index_resolver(mut self, resolver: Arc<dyn IndexResolver>) -> Self {
        self.index_resolver = Some(resolver);
        self
    }

    pub fn with_id_generator(mut self, generator: Arc<dyn SessionIdGenerator>) -> Self {
        self.id_generator = Some(generator);
        self
    }

    /// Get max inactive interval as Duration.
    ///
    /// A value too large to represent is treated as "never expire".
    pub fn max_inactive_interval(&self) -> Duration {
        Duration::try_seconds(self.max_inactive_interval_secs).unwrap_or_else(|| {
            tracing::warn!(
                "max_inactive_interval_secs {} is out of range, sessions will never expire",
                self.max_inactive_interval_secs
            );
            Duration::seconds(-1)
        })
    }

    /// Effective collection name
    pub fn collection_name(&self) -> &str {
        if self.collection_name.is_empty() {
            DEFAULT_COLLECTION_NAME
        } else {
            &self.collection_name
        }
    }

    /// Effective converter
    pub fn converter(&self) -> Arc<dyn SessionConverter> {
        if let Some(converter) = &self.converter {
            if self.index_resolver.is_some() {
                tracing::warn!("Custom converter configured; ignoring custom index resolver");
            }
            return Arc::clone(converter);
        }

        let mut converter = FieldSessionConverter::new()
            .with_default_max_inactive_interval(self.max_inactive_interval());
        if let Some(resolver) = &self.index_resolver {
            converter = converter.with_index_resolver(Arc::clone(resolver));
        }
        Arc::new(converter)
    }

    /// Effective id generator
    pub fn id_generator(&self) -> Arc<dyn SessionIdGenerator> {
        self.id_generator.clone().unwrap_or_else(default_generator)
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("max_inactive_interval_secs", &self.max_inactive_interval_secs)
            .field("collection_name", &self.collection_name)
            .field("custom_converter", &self.converter.is_some())
            .field("custom_index_resolver", &self.index_resolver.is_some())
            .field("id_generator", &self.id_generator)
            .finish()
    }
}
