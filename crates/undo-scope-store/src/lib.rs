/// Document-store contract for causally-versioned, mergeable documents.
///
/// Defines the frontier and identity types the undo engine works with, the
/// `DocumentStore` trait it drives, and `memory::MemoryDoc`, a small
/// in-memory causal store implementing that trait.
pub mod document;
pub mod frontier;
pub mod memory;

pub use document::{ChangeReport, DocumentId, DocumentStore, PatchSink};
pub use frontier::{ChangeHash, Frontier};
pub use memory::{Draft, MemoryDoc, Patch, Scalar, Value, View};
