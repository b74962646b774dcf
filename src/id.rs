//! Session id generation

use std::fmt::Debug;
use std::sync::Arc;
use uuid::Uuid;

/// Source of fresh session ids
pub trait SessionIdGenerator: Debug + Send + Sync + 'static {
    /// Generate a new, globally unique session id
    fn generate(&self) -> String;
}

/// UUID v4 session ids
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidSessionIdGenerator;

impl SessionIdGenerator for UuidSessionIdGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Shared default generator
pub fn default_generator() -> Arc<dyn SessionIdGenerator> {
    Arc::new(UuidSessionIdGenerator)
}
