/// Per-document change recorder with scoped undo/redo stacks.
///
/// A recorder wraps one document handle. Tracked changes go through it and
/// become reversible `Change` records on the stack pair of their scope.
/// Edits made through other handles to the same document are not tracked,
/// but undo and redo tolerate them: before reversing, the recorder compares
/// the recorded frontier with the document's current one and either replays
/// at the tip or amends history at the recorded frontier.
use std::mem;

use anyhow::Context;
use undo_scope_store::{DocumentId, DocumentStore, Frontier, PatchSink};

use crate::change::{Change, ChangeOptions, Outcome, PatchInfo, Revision};
use crate::config::{HistoryConfig, UnresolvedPolicy};
use crate::error::{HistoryError, Result};
use crate::scope::{Scope, ScopedStacks, Side};

/// A mutator queued while a transaction is open.
type Mutator<S> = Box<dyn FnOnce(&mut <S as DocumentStore>::Draft) -> anyhow::Result<()>>;

enum TransactionState<S: DocumentStore> {
    Idle,
    /// Mutators collected since `start_transaction`, in call order.
    Open(Vec<Mutator<S>>),
}

/// Tracks reversible changes for a single document.
pub struct ChangeRecorder<S: DocumentStore> {
    /// Handle to the tracked document; other handles may share it.
    handle: S,
    /// Undo and redo stacks per scope.
    stacks: ScopedStacks<Change<S::Patch>>,
    /// Whether a transaction is open, and what it has queued.
    state: TransactionState<S>,
    /// Depth cap and undo/redo policies.
    config: HistoryConfig,
}

impl<S: DocumentStore> std::fmt::Debug for ChangeRecorder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queued = match &self.state {
            TransactionState::Idle => None,
            TransactionState::Open(queue) => Some(queue.len()),
        };
        f.debug_struct("ChangeRecorder")
            .field("document_id", &self.handle.document_id())
            .field("scopes", &self.stacks.scopes().count())
            .field("queued", &queued)
            .finish()
    }
}

impl<S: DocumentStore> ChangeRecorder<S> {
    /// Wraps `handle` with default configuration.
    pub fn new(handle: S) -> Self {
        Self::with_config(handle, HistoryConfig::default())
    }

    /// Wraps `handle`, capping every scope at `config.max_undo_depth`.
    pub fn with_config(handle: S, config: HistoryConfig) -> Self {
        Self {
            handle,
            stacks: ScopedStacks::new(config.max_undo_depth),
            state: TransactionState::Idle,
            config,
        }
    }

    /// The wrapped document handle.
    pub fn handle(&self) -> &S {
        &self.handle
    }

    /// Identity of the tracked document.
    pub fn document_id(&self) -> DocumentId {
        self.handle.document_id()
    }

    /// The configuration this recorder was created with.
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Whether `start_transaction` was called without a matching end or cancel.
    pub fn in_transaction(&self) -> bool {
        matches!(self.state, TransactionState::Open(_))
    }

    /// Applies a tracked change.
    ///
    /// Returns `true` if the document changed and a `Change` was pushed onto
    /// the scope's undo stack (clearing its redo stack). Inside a transaction
    /// the mutator is queued instead and `false` is returned; the options of
    /// `end_transaction` apply to the combined change.
    pub fn change<F>(&mut self, mutator: F, options: impl Into<ChangeOptions<S::Patch>>) -> Result<bool>
    where
        F: FnOnce(&mut S::Draft) -> anyhow::Result<()> + 'static,
    {
        if let TransactionState::Open(queue) = &mut self.state {
            queue.push(Box::new(mutator));
            return Ok(false);
        }
        self.commit(mutator, options.into())
    }

    fn commit<F>(&mut self, mutator: F, mut options: ChangeOptions<S::Patch>) -> Result<bool>
    where
        F: FnOnce(&mut S::Draft) -> anyhow::Result<()>,
    {
        let report = self
            .handle
            .change(mutator)
            .context("Failed to apply tracked change")?;
        if report.is_empty() {
            return Ok(false);
        }

        let info = PatchInfo {
            before: report.before.clone(),
            after: report.after.clone(),
        };
        options.notify(&report.patches, &info);

        let inverse = self
            .handle
            .inverse(&report.patches, &report.before)
            .context("Failed to invert tracked change")?;

        tracing::debug!(
            doc = %self.handle.document_id(),
            scope = %options.scope,
            patches = report.patches.len(),
            "Recorded change"
        );

        let change = Change {
            undo: Revision {
                heads: report.after,
                patches: inverse,
            },
            redo: Revision {
                heads: report.before,
                patches: report.patches,
            },
            description: options.description,
        };
        self.stacks.record(&options.scope, change);
        Ok(true)
    }

    /// Opens a transaction. Fails without side effects if one is already open.
    pub fn start_transaction(&mut self) -> Result<()> {
        if self.in_transaction() {
            return Err(HistoryError::AlreadyInTransaction);
        }
        self.state = TransactionState::Open(Vec::new());
        Ok(())
    }

    /// Closes the transaction, applying every queued mutator as one change.
    ///
    /// The recorder is idle afterwards even if applying fails.
    pub fn end_transaction(&mut self, options: impl Into<ChangeOptions<S::Patch>>) -> Result<bool> {
        let queue = match mem::replace(&mut self.state, TransactionState::Idle) {
            TransactionState::Open(queue) if !queue.is_empty() => queue,
            _ => return Ok(false),
        };
        self.commit(
            move |draft: &mut S::Draft| -> anyhow::Result<()> {
                for mutator in queue {
                    mutator(draft)?;
                }
                Ok(())
            },
            options.into(),
        )
    }

    /// Closes the transaction without touching the document.
    ///
    /// Returns the number of discarded mutators.
    pub fn cancel_transaction(&mut self) -> usize {
        match mem::replace(&mut self.state, TransactionState::Idle) {
            TransactionState::Open(queue) => queue.len(),
            TransactionState::Idle => 0,
        }
    }

    /// Runs `body` inside a transaction.
    ///
    /// A description returned by `body` takes precedence over the one in
    /// `options`. If `body` fails the queued mutators are discarded.
    pub fn transaction<B>(&mut self, body: B, options: impl Into<ChangeOptions<S::Patch>>) -> Result<bool>
    where
        B: FnOnce(&mut Self) -> Result<Option<String>>,
    {
        let mut options = options.into();
        self.start_transaction()?;
        match body(self) {
            Ok(description) => {
                if description.is_some() {
                    options.description = description;
                }
                self.end_transaction(options)
            }
            Err(e) => {
                self.cancel_transaction();
                Err(e)
            }
        }
    }

    /// Reverts the most recent change of `scope`.
    ///
    /// Returns `None` if the undo stack is empty.
    pub fn undo(&mut self, scope: impl Into<Scope>) -> Result<Option<Outcome>> {
        self.step(&scope.into(), Side::Undo)
    }

    /// Reapplies the most recently undone change of `scope`.
    ///
    /// Returns `None` if the redo stack is empty.
    pub fn redo(&mut self, scope: impl Into<Scope>) -> Result<Option<Outcome>> {
        self.step(&scope.into(), Side::Redo)
    }

    /// Pops from `side`, replays that side's patches and moves the change to
    /// the opposite stack.
    fn step(&mut self, scope: &Scope, side: Side) -> Result<Option<Outcome>> {
        let Some(mut change) = self.stacks.get_mut(scope).pop(side) else {
            return Ok(None);
        };

        match self.reverse(scope, side, &mut change) {
            Ok(Outcome::Unresolved) if self.config.unresolved_policy == UnresolvedPolicy::Discard => {
                tracing::warn!(doc = %self.handle.document_id(), %scope, "Discarded unresolvable {side}");
                Ok(Some(Outcome::Unresolved))
            }
            Ok(outcome) => {
                let max_depth = self.config.max_undo_depth;
                self.stacks
                    .get_mut(scope)
                    .push(side.opposite(), change, max_depth);
                Ok(Some(outcome))
            }
            Err(e) => {
                // Put it back so the stacks still describe the document.
                self.stacks.get_mut(scope).push(side, change, 0);
                Err(e)
            }
        }
    }

    fn reverse(&mut self, scope: &Scope, side: Side, change: &mut Change<S::Patch>) -> Result<Outcome> {
        let other = side.opposite();
        let current = self.handle.heads();
        let anchor = change.side(side).heads.clone();
        // Where the change's opposite side pointed before this step; the next
        // entry on `side` is adjacent to this change iff it still points there.
        let previous = change.side(other).heads.clone();
        let patches = &change.side(side).patches;
        let replay = |draft: &mut S::Draft| -> anyhow::Result<()> {
            for patch in patches {
                draft.apply_patch(patch)?;
            }
            Ok(())
        };

        let (outcome, new_heads) = if current == anchor {
            let report = self
                .handle
                .change(replay)
                .with_context(|| format!("Failed to replay {side} at current frontier"))?;
            tracing::debug!(doc = %self.handle.document_id(), %scope, "Fast-path {side}");
            (Outcome::FastPath, report.after)
        } else {
            let amended = self
                .handle
                .change_at(&anchor, replay)
                .with_context(|| format!("Failed to replay {side} at historical frontier"))?;
            match amended {
                Some(heads) => {
                    tracing::debug!(
                        doc = %self.handle.document_id(),
                        %scope,
                        anchor = %anchor,
                        current = %current,
                        "Amended history for {side}"
                    );
                    if self.config.recompute_patches_on_amend {
                        // The reversal is already committed; on failure the
                        // recorded patches stay.
                        match self.recompute(&anchor, &heads) {
                            Ok(patches) => change.side_mut(other).patches = patches,
                            Err(e) => tracing::warn!(
                                doc = %self.handle.document_id(),
                                %scope,
                                "Keeping recorded {other} patches: {e:#}"
                            ),
                        }
                    }
                    (Outcome::Amended, heads)
                }
                None => {
                    tracing::warn!(
                        doc = %self.handle.document_id(),
                        %scope,
                        anchor = %anchor,
                        "Cannot resolve frontier for {side}"
                    );
                    return Ok(Outcome::Unresolved);
                }
            }
        };

        if let Some(next) = self.stacks.get_mut(scope).top_mut(side) {
            if next.side(side).heads == previous {
                next.side_mut(side).heads = new_heads.clone();
            }
        }
        change.side_mut(other).heads = new_heads;
        Ok(outcome)
    }

    /// Patches taking the state at `heads` back to the state at `anchor`.
    fn recompute(&self, anchor: &Frontier, heads: &Frontier) -> anyhow::Result<Vec<S::Patch>> {
        let forward = self
            .handle
            .diff(anchor, heads)
            .context("Failed to diff amended frontier")?;
        self.handle
            .inverse(&forward, anchor)
            .context("Failed to invert amended diff")
    }

    /// Whether `scope` has a change to undo.
    pub fn can_undo(&self, scope: impl Into<Scope>) -> bool {
        !self.stacks.undos(&scope.into()).is_empty()
    }

    /// Whether `scope` has a change to redo.
    pub fn can_redo(&self, scope: impl Into<Scope>) -> bool {
        !self.stacks.redos(&scope.into()).is_empty()
    }

    /// Descriptions of the undo stack, oldest first.
    pub fn undos(&self, scope: impl Into<Scope>) -> Vec<Option<&str>> {
        self.stacks
            .undos(&scope.into())
            .iter()
            .map(Change::description)
            .collect()
    }

    /// Descriptions of the redo stack, oldest first.
    pub fn redos(&self, scope: impl Into<Scope>) -> Vec<Option<&str>> {
        self.stacks
            .redos(&scope.into())
            .iter()
            .map(Change::description)
            .collect()
    }

    /// The undo stack of `scope`, with the next change to undo last.
    pub fn undo_stack(&self, scope: impl Into<Scope>) -> &[Change<S::Patch>] {
        self.stacks.undos(&scope.into())
    }

    /// The redo stack of `scope`, with the next change to redo last.
    pub fn redo_stack(&self, scope: impl Into<Scope>) -> &[Change<S::Patch>] {
        self.stacks.redos(&scope.into())
    }

    /// Drops both stacks of `scope`. The document is not touched.
    pub fn clear(&mut self, scope: impl Into<Scope>) {
        self.stacks.clear(&scope.into());
    }
}

impl<S: DocumentStore> From<S> for ChangeRecorder<S> {
    fn from(handle: S) -> Self {
        Self::new(handle)
    }
}
