/// Reference in-memory causal document store.
///
/// A `MemoryDoc` is a shared handle over a history graph of content-addressed
/// change nodes. Any frontier in that graph can be materialized, so mutations
/// can be anchored in the past and merged causally with everything that
/// happened since, which is what historical undo needs. Clones of a handle
/// share one document; `fork` creates an independent replica with the same
/// history, and `merge` pulls a replica's changes back in.
///
/// The model is small: a root map of scalars, texts and lists.
/// Concurrent map writes resolve last-writer-wins by op id; texts and lists
/// are RGA sequences, so concurrent splices interleave instead of clobbering.
mod draft;
mod op;
mod state;
mod value;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use crate::document::{ChangeReport, DocumentId, DocumentStore};
use crate::frontier::{ChangeHash, Frontier};
use op::ChangeNode;
use state::DocState;

pub use draft::Draft;
pub use value::{apply_to_view, diff_views, inverse_patches, Patch, Scalar, Value, View};

struct Inner {
    id: DocumentId,
    actor: Uuid,
    next_seq: u64,
    max_op: u64,
    changes: HashMap<ChangeHash, ChangeNode>,
    heads: Frontier,
    /// State at `heads`, rebuilt after every commit or merge.
    current: DocState,
}

impl Inner {
    fn new(id: DocumentId) -> Self {
        Self {
            id,
            actor: Uuid::new_v4(),
            next_seq: 1,
            max_op: 0,
            changes: HashMap::new(),
            heads: Frontier::root(),
            current: DocState::default(),
        }
    }

    fn resolvable(&self, heads: &Frontier) -> bool {
        heads.iter().all(|h| self.changes.contains_key(h))
    }

    /// Replays the causal closure of `heads`.
    ///
    /// `start_op` exceeds every op a node depends on, so sorting by it yields
    /// a topological order; the hash breaks ties deterministically.
    fn materialize(&self, heads: &Frontier) -> Result<DocState> {
        let mut seen: HashSet<ChangeHash> = HashSet::new();
        let mut stack: Vec<ChangeHash> = heads.iter().copied().collect();
        let mut nodes: Vec<(u64, ChangeHash, &ChangeNode)> = Vec::new();
        while let Some(hash) = stack.pop() {
            if !seen.insert(hash) {
                continue;
            }
            let node = self
                .changes
                .get(&hash)
                .with_context(|| format!("Unknown change {hash}"))?;
            stack.extend(node.deps.iter().copied());
            nodes.push((node.start_op, hash, node));
        }
        nodes.sort_by_key(|(start_op, hash, _)| (*start_op, *hash));

        let mut state = DocState::default();
        for (_, hash, node) in nodes {
            for op in &node.ops {
                state
                    .apply(op)
                    .with_context(|| format!("Failed to replay change {hash}"))?;
            }
        }
        Ok(state)
    }

    fn recompute_heads(&mut self) {
        let referenced: HashSet<&ChangeHash> = self
            .changes
            .values()
            .flat_map(|node| node.deps.iter())
            .collect();
        self.heads = self
            .changes
            .keys()
            .filter(|h| !referenced.contains(h))
            .copied()
            .collect();
    }

    fn refresh(&mut self) -> Result<()> {
        self.current = self
            .materialize(&self.heads)
            .context("Failed to materialize current state")?;
        Ok(())
    }
}

/// Shared handle to one in-memory document.
///
/// Single-threaded: clones share state through `Rc<RefCell<_>>`. Mutators may
/// read through the handle but must not mutate it re-entrantly.
#[derive(Clone)]
pub struct MemoryDoc {
    inner: Rc<RefCell<Inner>>,
}

impl std::fmt::Debug for MemoryDoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("MemoryDoc")
            .field("id", &inner.id)
            .field("changes", &inner.changes.len())
            .field("heads", &inner.heads)
            .finish()
    }
}

impl Default for MemoryDoc {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDoc {
    /// Creates an empty document with a fresh identity.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner::new(DocumentId::new()))),
        }
    }

    /// Creates a document whose first change puts the given entries.
    pub fn with_values<I, K>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let doc = Self::new();
        let entries: Vec<(String, Value)> =
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        doc.change(|d| {
            for (key, value) in entries {
                d.put(&key, value)?;
            }
            Ok(())
        })
        .context("Failed to write initial document content")?;
        Ok(doc)
    }

    pub fn id(&self) -> DocumentId {
        self.inner.borrow().id
    }

    /// The current materialized content.
    pub fn snapshot(&self) -> View {
        self.inner.borrow().current.view()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.borrow().current.value(key)
    }

    /// Content as of an arbitrary frontier.
    pub fn snapshot_at(&self, heads: &Frontier) -> Result<View> {
        Ok(self.inner.borrow().materialize(heads)?.view())
    }

    pub fn change_count(&self) -> usize {
        self.inner.borrow().changes.len()
    }

    pub fn contains_change(&self, hash: &ChangeHash) -> bool {
        self.inner.borrow().changes.contains_key(hash)
    }

    /// Creates an independent replica: same history, new identity and actor.
    pub fn fork(&self) -> Self {
        let src = self.inner.borrow();
        let mut inner = Inner::new(DocumentId::new());
        inner.max_op = src.max_op;
        inner.changes = src.changes.clone();
        inner.heads = src.heads.clone();
        inner.current = src.current.clone();
        Self {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    /// Imports every change `other` has that this document lacks.
    ///
    /// Returns the number of imported change nodes.
    pub fn merge(&self, other: &MemoryDoc) -> Result<usize> {
        if Rc::ptr_eq(&self.inner, &other.inner) {
            return Ok(0);
        }
        let missing: Vec<(ChangeHash, ChangeNode)> = {
            let theirs = other.inner.borrow();
            let ours = self.inner.borrow();
            theirs
                .changes
                .iter()
                .filter(|(h, _)| !ours.changes.contains_key(*h))
                .map(|(h, node)| (*h, node.clone()))
                .collect()
        };
        if missing.is_empty() {
            return Ok(0);
        }

        let mut inner = self.inner.borrow_mut();
        let imported = missing.len();
        for (hash, node) in missing {
            inner.max_op = inner.max_op.max(node.max_op());
            inner.changes.insert(hash, node);
        }
        inner.recompute_heads();
        inner.refresh()?;
        tracing::debug!(doc = %inner.id, imported, heads = %inner.heads, "Merged changes");
        Ok(imported)
    }

    /// Runs `mutator` on a draft of the state at `deps` and commits the result
    /// as a new node depending on `deps`. Returns `None` if nothing changed.
    fn commit<F>(&self, deps: &Frontier, mutator: F) -> Result<Option<(ChangeHash, Vec<Patch>)>>
    where
        F: FnOnce(&mut Draft) -> Result<()>,
    {
        let (base, actor, start_op) = {
            let inner = self.inner.borrow();
            let base = if *deps == inner.heads {
                inner.current.clone()
            } else {
                inner.materialize(deps)?
            };
            (base, inner.actor, inner.max_op + 1)
        };

        // The handle is not borrowed while user code runs.
        let mut draft = Draft::new(base, actor, start_op);
        mutator(&mut draft)?;
        let (ops, patches, state) = draft.finish();
        if ops.is_empty() {
            return Ok(None);
        }

        let mut inner = self.inner.borrow_mut();
        if inner.max_op >= start_op {
            bail!("Document was modified while a change was in progress");
        }
        // A change on top of the current heads leaves the draft state current.
        let on_tip = *deps == inner.heads;
        let node = ChangeNode {
            actor,
            seq: inner.next_seq,
            start_op,
            deps: deps.clone(),
            ops,
        };
        let hash = node.hash()?;
        inner.next_seq += 1;
        inner.max_op = node.max_op();
        inner.changes.insert(hash, node);
        for dep in deps {
            inner.heads.remove(dep);
        }
        inner.heads.insert(hash);
        if on_tip {
            inner.current = state;
        } else {
            inner.refresh()?;
        }
        tracing::debug!(doc = %inner.id, change = %hash, patches = patches.len(), "Committed change");
        Ok(Some((hash, patches)))
    }
}

impl DocumentStore for MemoryDoc {
    type Patch = Patch;
    type Draft = Draft;

    fn document_id(&self) -> DocumentId {
        self.id()
    }

    fn change<F>(&self, mutator: F) -> Result<ChangeReport<Patch>>
    where
        F: FnOnce(&mut Draft) -> Result<()>,
    {
        let before = self.heads();
        let patches = match self.commit(&before, mutator)? {
            Some((_, patches)) => patches,
            None => Vec::new(),
        };
        Ok(ChangeReport {
            patches,
            before,
            after: self.heads(),
        })
    }

    fn change_at<F>(&self, heads: &Frontier, mutator: F) -> Result<Option<Frontier>>
    where
        F: FnOnce(&mut Draft) -> Result<()>,
    {
        if !self.inner.borrow().resolvable(heads) {
            return Ok(None);
        }
        let frontier = match self.commit(heads, mutator)? {
            Some((hash, _)) => Frontier::single(hash),
            None => heads.clone(),
        };
        Ok(Some(frontier))
    }

    fn heads(&self) -> Frontier {
        self.inner.borrow().heads.clone()
    }

    fn diff(&self, from: &Frontier, to: &Frontier) -> Result<Vec<Patch>> {
        let inner = self.inner.borrow();
        let a = inner.materialize(from).context("Failed to resolve diff source")?;
        let b = inner.materialize(to).context("Failed to resolve diff target")?;
        Ok(diff_views(&a.view(), &b.view()))
    }

    fn inverse(&self, patches: &[Patch], before: &Frontier) -> Result<Vec<Patch>> {
        let view = self.snapshot_at(before).context("Failed to resolve inverse base")?;
        inverse_patches(view, patches)
    }
}
