//! Document store implementations

mod memory;
mod traits;

pub use memory::MemoryDocumentStore;
pub use traits::{DocumentStore, IndexDefinition, IndexOperations, ReactiveDocumentStore};
