//! Session repositories

mod blocking;
mod reactive;
mod traits;

pub use blocking::DocumentSessionRepository;
pub use reactive::ReactiveDocumentSessionRepository;
pub use traits::{ReactiveSessionRepository, SessionRepository};
