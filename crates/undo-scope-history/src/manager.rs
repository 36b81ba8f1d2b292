/// Cross-document undo/redo on top of per-document recorders.
///
/// The manager owns one `ChangeRecorder` per registered document and keeps
/// its own scoped stacks of `ManagerChange` entries. A manager transaction
/// opens a transaction on every recorder, lets the body edit any of them, and
/// records which documents actually changed. Undo and redo fan out to those
/// participants only.
///
/// There is no cross-document atomicity: each participant is reversed on its
/// own, and a failure on one is logged without stopping the others.
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use undo_scope_store::{DocumentId, DocumentStore};

use crate::change::TransactionOptions;
use crate::config::HistoryConfig;
use crate::error::{HistoryError, Result};
use crate::recorder::ChangeRecorder;
use crate::scope::{Scope, ScopedStacks, Side};

/// A committed manager transaction: which documents it touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerChange {
    /// Optional label shown in undo/redo listings.
    pub description: Option<String>,
    /// Participating documents, in registration order.
    pub participants: Vec<DocumentId>,
}

impl ManagerChange {
    /// The label, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Result of a manager transaction, undo or redo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSummary {
    /// Scope whose manager stacks hold the transaction.
    pub scope: Scope,
    /// Label of the transaction.
    pub description: Option<String>,
    /// Documents that took part, in registration order.
    pub participants: Vec<DocumentId>,
}

impl TransactionSummary {
    fn new(scope: &Scope, change: &ManagerChange) -> Self {
        Self {
            scope: scope.clone(),
            description: change.description.clone(),
            participants: change.participants.clone(),
        }
    }
}

/// Registry of recorders plus manager-level scoped stacks.
pub struct UndoRedoManager<S: DocumentStore> {
    /// Document ids in registration order.
    order: Vec<DocumentId>,
    /// One recorder per registered document.
    recorders: HashMap<DocumentId, ChangeRecorder<S>>,
    /// Manager-level undo and redo stacks per scope.
    stacks: ScopedStacks<ManagerChange>,
    /// Applied to the manager stacks and to handles wrapped on registration.
    config: HistoryConfig,
}

impl<S: DocumentStore> std::fmt::Debug for UndoRedoManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoRedoManager")
            .field("documents", &self.order)
            .field("scopes", &self.stacks.scopes().count())
            .finish()
    }
}

impl<S: DocumentStore> Default for UndoRedoManager<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: DocumentStore> UndoRedoManager<S> {
    /// Creates an empty manager with default configuration.
    pub fn new() -> Self {
        Self::with_config(HistoryConfig::default())
    }

    /// Creates a manager whose stacks and newly wrapped handles use `config`.
    pub fn with_config(config: HistoryConfig) -> Self {
        Self {
            order: Vec::new(),
            recorders: HashMap::new(),
            stacks: ScopedStacks::new(config.max_undo_depth),
            config,
        }
    }

    /// The configuration this manager was created with.
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Registers a document handle or an existing recorder.
    ///
    /// Raw handles are wrapped in a recorder using the manager's config.
    /// Registration is keyed by document identity: adding a document that is
    /// already registered returns the recorder already on file and drops the
    /// argument.
    pub fn add_handle(&mut self, handle: impl Into<Registrant<S>>) -> &mut ChangeRecorder<S> {
        let registrant = handle.into();
        let id = match &registrant {
            Registrant::Handle(handle) => handle.document_id(),
            Registrant::Recorder(recorder) => recorder.document_id(),
        };
        match self.recorders.entry(id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                tracing::debug!(doc = %id, "Registered document");
                self.order.push(id);
                let recorder = match registrant {
                    Registrant::Handle(handle) => {
                        ChangeRecorder::with_config(handle, self.config.clone())
                    }
                    Registrant::Recorder(recorder) => recorder,
                };
                entry.insert(recorder)
            }
        }
    }

    /// The recorder registered for `id`.
    pub fn recorder(&self, id: &DocumentId) -> Option<&ChangeRecorder<S>> {
        self.recorders.get(id)
    }

    /// Mutable access to the recorder registered for `id`.
    pub fn recorder_mut(&mut self, id: &DocumentId) -> Option<&mut ChangeRecorder<S>> {
        self.recorders.get_mut(id)
    }

    /// Registered documents, in registration order.
    pub fn document_ids(&self) -> &[DocumentId] {
        &self.order
    }

    /// Whether any registered recorder has a transaction open.
    pub fn in_transaction(&self) -> bool {
        self.recorders.values().any(ChangeRecorder::in_transaction)
    }

    /// Opens a transaction on every recorder.
    ///
    /// If any recorder already has one open, nothing is started.
    pub fn start_transaction(&mut self) -> Result<()> {
        if self.in_transaction() {
            return Err(HistoryError::AlreadyInTransaction);
        }
        for recorder in self.recorders.values_mut() {
            recorder.start_transaction()?;
        }
        Ok(())
    }

    /// Closes the transaction on every recorder and records the documents
    /// that changed as one `ManagerChange`.
    ///
    /// Returns `None` if no document changed. Every recorder is closed even if
    /// one fails; the first failure is returned after the successful
    /// participants have been recorded.
    pub fn end_transaction(
        &mut self,
        options: impl Into<TransactionOptions>,
    ) -> Result<Option<TransactionSummary>> {
        let options = options.into();
        let mut participants = Vec::new();
        let mut first_error = None;

        for id in &self.order {
            let Some(recorder) = self.recorders.get_mut(id) else {
                continue;
            };
            match recorder.end_transaction(options.clone()) {
                Ok(true) => participants.push(*id),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(doc = %id, scope = %options.scope, "Failed to end transaction: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        let summary = if participants.is_empty() {
            None
        } else {
            let change = ManagerChange {
                description: options.description,
                participants,
            };
            let summary = TransactionSummary::new(&options.scope, &change);
            tracing::debug!(
                scope = %options.scope,
                participants = change.participants.len(),
                "Recorded transaction"
            );
            self.stacks.record(&options.scope, change);
            Some(summary)
        };

        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Discards the open transaction on every recorder.
    pub fn cancel_transaction(&mut self) {
        for recorder in self.recorders.values_mut() {
            recorder.cancel_transaction();
        }
    }

    /// Runs `body` inside a manager transaction.
    ///
    /// `body` edits documents through `recorder_mut` and may return a
    /// description that overrides the one in `options`. If it fails, every
    /// queued edit is discarded and the error is returned.
    pub fn transaction<B>(
        &mut self,
        body: B,
        options: impl Into<TransactionOptions>,
    ) -> Result<Option<TransactionSummary>>
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

    /// Undoes the most recent transaction of `scope` on each participant.
    pub fn undo(&mut self, scope: impl Into<Scope>) -> Option<TransactionSummary> {
        self.step(&scope.into(), Side::Undo)
    }

    /// Redoes the most recently undone transaction of `scope`.
    pub fn redo(&mut self, scope: impl Into<Scope>) -> Option<TransactionSummary> {
        self.step(&scope.into(), Side::Redo)
    }

    fn step(&mut self, scope: &Scope, side: Side) -> Option<TransactionSummary> {
        let change = self.stacks.get_mut(scope).pop(side)?;

        for id in &change.participants {
            let Some(recorder) = self.recorders.get_mut(id) else {
                tracing::warn!(doc = %id, %scope, "Participant no longer registered, skipping {side}");
                continue;
            };
            let result = match side {
                Side::Undo => recorder.undo(scope),
                Side::Redo => recorder.redo(scope),
            };
            match result {
                Ok(Some(_)) => {}
                Ok(None) => tracing::debug!(doc = %id, %scope, "Nothing to {side}"),
                Err(e) => tracing::warn!(doc = %id, %scope, "Participant {side} failed: {e}"),
            }
        }

        let summary = TransactionSummary::new(scope, &change);
        let max_depth = self.config.max_undo_depth;
        self.stacks
            .get_mut(scope)
            .push(side.opposite(), change, max_depth);
        Some(summary)
    }

    /// Whether `scope` has a transaction to undo.
    pub fn can_undo(&self, scope: impl Into<Scope>) -> bool {
        !self.stacks.undos(&scope.into()).is_empty()
    }

    /// Whether `scope` has a transaction to redo.
    pub fn can_redo(&self, scope: impl Into<Scope>) -> bool {
        !self.stacks.redos(&scope.into()).is_empty()
    }

    /// Descriptions of the manager undo stack, oldest first.
    pub fn undos(&self, scope: impl Into<Scope>) -> Vec<Option<&str>> {
        self.stacks
            .undos(&scope.into())
            .iter()
            .map(ManagerChange::description)
            .collect()
    }

    /// Descriptions of the manager redo stack, oldest first.
    pub fn redos(&self, scope: impl Into<Scope>) -> Vec<Option<&str>> {
        self.stacks
            .redos(&scope.into())
            .iter()
            .map(ManagerChange::description)
            .collect()
    }

    /// Participant sets of the manager undo stack, oldest first.
    pub fn undo_participants(&self, scope: impl Into<Scope>) -> Vec<&[DocumentId]> {
        self.stacks
            .undos(&scope.into())
            .iter()
            .map(|change| change.participants.as_slice())
            .collect()
    }

    /// Participant sets of the manager redo stack, oldest first.
    pub fn redo_participants(&self, scope: impl Into<Scope>) -> Vec<&[DocumentId]> {
        self.stacks
            .redos(&scope.into())
            .iter()
            .map(|change| change.participants.as_slice())
            .collect()
    }

    /// Drops the manager stacks of `scope`. Recorder stacks are kept.
    pub fn clear(&mut self, scope: impl Into<Scope>) {
        self.stacks.clear(&scope.into());
    }
}

/// Anything `add_handle` accepts: a raw document handle or a recorder.
pub enum Registrant<S: DocumentStore> {
    Handle(S),
    Recorder(ChangeRecorder<S>),
}

impl<S: DocumentStore> From<S> for Registrant<S> {
    fn from(handle: S) -> Self {
        Registrant::Handle(handle)
    }
}

impl<S: DocumentStore> From<ChangeRecorder<S>> for Registrant<S> {
    fn from(recorder: ChangeRecorder<S>) -> Self {
        Registrant::Recorder(recorder)
    }
}
