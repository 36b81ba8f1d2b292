/// The document-store contract consumed by the undo/redo engine.
///
/// A store owns a causally-versioned document. It applies mutations and
/// reports the resulting patches, anchors mutations at historical frontiers,
/// and computes diffs and inverses over its patch representation. The undo
/// engine never inspects patches itself; it only hands them back to the store.
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::frontier::Frontier;

/// Stable identity of a document, independent of its content or history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Generates a fresh random identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocumentId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let id = Uuid::parse_str(s).with_context(|| format!("Invalid document id: {s}"))?;
        Ok(Self(id))
    }
}

/// Outcome of a mutation applied at the current frontier.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeReport<P> {
    /// Forward patches, replayable in order against the `before` state.
    pub patches: Vec<P>,
    /// Frontier observed immediately before the mutation.
    pub before: Frontier,
    /// Frontier immediately after the mutation.
    pub after: Frontier,
}

impl<P> ChangeReport<P> {
    /// Whether the mutation changed anything.
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

/// Something a single patch can be applied to in place.
///
/// Implemented by a store's draft type so that recorded patches can be
/// replayed from inside a mutator.
pub trait PatchSink<P> {
    fn apply_patch(&mut self, patch: &P) -> Result<()>;
}

/// A handle to one causally-versioned document.
///
/// Handles are expected to be cheap to clone and to share the underlying
/// document, so that application code can keep editing through its own
/// handle while a recorder holds another.
pub trait DocumentStore {
    /// Replayable structural edit emitted by this store.
    type Patch: Clone + fmt::Debug;
    /// Mutable view handed to mutators for the duration of one change.
    type Draft: PatchSink<Self::Patch>;

    fn document_id(&self) -> DocumentId;

    /// Applies `mutator` at the current frontier.
    ///
    /// A mutator error aborts the change; nothing is committed.
    fn change<F>(&self, mutator: F) -> Result<ChangeReport<Self::Patch>>
    where
        F: FnOnce(&mut Self::Draft) -> Result<()>;

    /// Applies `mutator` to the document as it was at `heads` and integrates
    /// the result causally with everything that happened since.
    ///
    /// Returns the frontier of the new change, or `None` when `heads` can no
    /// longer be resolved against the stored history.
    fn change_at<F>(&self, heads: &Frontier, mutator: F) -> Result<Option<Frontier>>
    where
        F: FnOnce(&mut Self::Draft) -> Result<()>;

    /// The current causal frontier.
    fn heads(&self) -> Frontier;

    /// Patches transforming the state at `from` into the state at `to`.
    fn diff(&self, from: &Frontier, to: &Frontier) -> Result<Vec<Self::Patch>>;

    /// Patches undoing `patches`, which were applied to the state at `before`.
    fn inverse(&self, patches: &[Self::Patch], before: &Frontier) -> Result<Vec<Self::Patch>>;
}
