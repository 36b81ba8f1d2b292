/// Scoped, transactional undo/redo for causally-versioned documents.
///
/// Provides a `ChangeRecorder` that turns tracked edits on one document into
/// reversible changes on per-scope stacks, and an `UndoRedoManager` that
/// groups edits across several documents into one undoable transaction.
/// Undo and redo stay correct when the document was edited elsewhere in the
/// meantime: reversals are anchored at the recorded frontier and merged with
/// whatever happened since.
pub mod change;
pub mod config;
pub mod error;
pub mod manager;
pub mod recorder;
pub mod scope;

pub use change::{Change, ChangeOptions, Outcome, PatchInfo, Revision, TransactionOptions};
pub use config::{HistoryConfig, UnresolvedPolicy};
pub use error::{HistoryError, Result};
pub use manager::{ManagerChange, Registrant, TransactionSummary, UndoRedoManager};
pub use recorder::ChangeRecorder;
pub use scope::Scope;
