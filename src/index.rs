//! Secondary index resolution
//!
//! An [`IndexResolver`] maps a session to the named index values stored
//! alongside it. The principal name index is promoted to the top-level
//! `principal` field of the stored document; other indexes are queried
//! through the attribute of the same name.

use std::collections::HashMap;
use std::sync::Arc;

use crate::session::Session;

/// Name of the principal name index
pub const PRINCIPAL_NAME_INDEX_NAME: &str = "PRINCIPAL_NAME_INDEX_NAME";

/// Attribute holding the [`SecurityContext`](crate::SecurityContext)
pub const SECURITY_CONTEXT_ATTRIBUTE: &str = "SECURITY_CONTEXT";

/// Resolves index values for a session
pub trait IndexResolver: Send + Sync + 'static {
    fn resolve_indexes_for(&self, session: &Session) -> HashMap<String, String>;
}

/// Resolves the principal name.
///
/// A string attribute named [`PRINCIPAL_NAME_INDEX_NAME`] takes precedence
/// over the principal of the security context attribute.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrincipalNameIndexResolver;

impl PrincipalNameIndexResolver {
    pub fn resolve_principal(session: &Session) -> Option<String> {
        if let Some(name) = session
            .attribute(PRINCIPAL_NAME_INDEX_NAME)
            .and_then(|v| v.as_str())
        {
            return Some(name.to_string());
        }
        session
            .attribute(SECURITY_CONTEXT_ATTRIBUTE)
            .and_then(|v| v.as_security_context())
            .and_then(|context| context.principal_name())
            .map(str::to_string)
    }
}

impl IndexResolver for PrincipalNameIndexResolver {
    fn resolve_indexes_for(&self, session: &Session) -> HashMap<String, String> {
        Self::resolve_principal(session)
            .map(|name| HashMap::from([(PRINCIPAL_NAME_INDEX_NAME.to_string(), name)]))
            .unwrap_or_default()
    }
}

/// Indexes a single string attribute under its own name
#[derive(Debug, Clone)]
pub struct AttributeIndexResolver {
    attribute: String,
}

impl AttributeIndexResolver {
    pub fn new<S: Into<String>>(attribute: S) -> Self {
        Self {
            attribute: attribute.into(),
        }
    }
}

impl IndexResolver for AttributeIndexResolver {
    fn resolve_indexes_for(&self, session: &Session) -> HashMap<String, String> {
        session
            .attribute(&self.attribute)
            .and_then(|v| v.as_str())
            .map(|value| HashMap::from([(self.attribute.clone(), value.to_string())]))
            .unwrap_or_default()
    }
}

/// Combines several resolvers; the first to resolve an index name wins
#[derive(Clone)]
pub struct DelegatingIndexResolver {
    delegates: Vec<Arc<dyn IndexResolver>>,
}

impl DelegatingIndexResolver {
    pub fn new<I>(delegates: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn IndexResolver>>,
    {
        Self {
            delegates: delegates.into_iter().collect(),
        }
    }

    /// Append another resolver
    pub fn with<R: IndexResolver>(mut self, resolver: R) -> Self {
        self.delegates.push(Arc::new(resolver));
        self
    }
}

impl Default for DelegatingIndexResolver {
    fn default() -> Self {
        Self::new([Arc::new(PrincipalNameIndexResolver) as Arc<dyn IndexResolver>])
    }
}

impl IndexResolver for DelegatingIndexResolver {
    fn resolve_indexes_for(&self, session: &Session) -> HashMap<String, String> {
        let mut indexes = HashMap::new();
        for delegate in &self.delegates {
            for (name, value) in delegate.resolve_indexes_for(session) {
                indexes.entry(name).or_insert(value);
            }
        }
        indexes
    }
}

impl std::fmt::Debug for DelegatingIndexResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegatingIndexResolver")
            .field("delegates", &self.delegates.len())
            .finish()
    }
}
