/// Core types for reversible changes and the options that create them.
use std::fmt;

use undo_scope_store::Frontier;

use crate::scope::{Scope, Side};

/// One direction of a reversible change: the patches to replay and the
/// frontier they were computed against.
#[derive(Debug, Clone, PartialEq)]
pub struct Revision<P> {
    pub heads: Frontier,
    pub patches: Vec<P>,
}

/// A reversible unit of edits on one document.
///
/// `undo.heads` is the frontier the undo patches apply to (the state right
/// after the edit was last made current) and `redo.heads` the frontier the
/// redo patches apply to. Only the `heads` fields change after creation;
/// they are rewritten as undo and redo move the document forward.
#[derive(Debug, Clone, PartialEq)]
pub struct Change<P> {
    pub undo: Revision<P>,
    pub redo: Revision<P>,
    pub description: Option<String>,
}

impl<P> Change<P> {
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub(crate) fn side(&self, side: Side) -> &Revision<P> {
        match side {
            Side::Undo => &self.undo,
            Side::Redo => &self.redo,
        }
    }

    pub(crate) fn side_mut(&mut self, side: Side) -> &mut Revision<P> {
        match side {
            Side::Undo => &mut self.undo,
            Side::Redo => &mut self.redo,
        }
    }
}

/// Frontiers surrounding a committed change, passed to patch observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchInfo {
    pub before: Frontier,
    pub after: Frontier,
}

type Observer<P> = Box<dyn FnMut(&[P], &PatchInfo)>;

/// Options for a tracked change or a recorder-level transaction.
///
/// A plain string converts into options carrying only a description.
pub struct ChangeOptions<P> {
    pub scope: Scope,
    pub description: Option<String>,
    observer: Option<Observer<P>>,
}

impl<P> Default for ChangeOptions<P> {
    fn default() -> Self {
        Self {
            scope: Scope::Default,
            description: None,
            observer: None,
        }
    }
}

impl<P> fmt::Debug for ChangeOptions<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeOptions")
            .field("scope", &self.scope)
            .field("description", &self.description)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl<P> ChangeOptions<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope(mut self, scope: impl Into<Scope>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Registers a callback invoked with the forward patches of the commit.
    pub fn with_observer(mut self, observer: impl FnMut(&[P], &PatchInfo) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub(crate) fn notify(&mut self, patches: &[P], info: &PatchInfo) {
        if let Some(observer) = self.observer.as_mut() {
            observer(patches, info);
        }
    }
}

impl<P> From<&str> for ChangeOptions<P> {
    fn from(description: &str) -> Self {
        Self::default().with_description(description)
    }
}

impl<P> From<String> for ChangeOptions<P> {
    fn from(description: String) -> Self {
        Self::default().with_description(description)
    }
}

impl<P> From<TransactionOptions> for ChangeOptions<P> {
    fn from(options: TransactionOptions) -> Self {
        Self {
            scope: options.scope,
            description: options.description,
            observer: None,
        }
    }
}

/// Options for a manager-level transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    pub scope: Scope,
    pub description: Option<String>,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope(mut self, scope: impl Into<Scope>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl From<&str> for TransactionOptions {
    fn from(description: &str) -> Self {
        Self::default().with_description(description)
    }
}

impl From<String> for TransactionOptions {
    fn from(description: String) -> Self {
        Self::default().with_description(description)
    }
}

/// How a recorder-level undo or redo was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing happened since the change was last made current; the patches
    /// were replayed at the current frontier.
    FastPath,
    /// The document moved on; the patches were applied at the recorded
    /// frontier and merged with the concurrent branches.
    Amended,
    /// The recorded frontier could not be resolved; the document is unchanged.
    Unresolved,
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn test_string_converts_to_description() {
        let options: ChangeOptions<()> = "rename".into();
        assert_eq!(options.description.as_deref(), Some("rename"));
        assert!(options.scope.is_default());
    }

    #[test]
    fn test_builder() {
        let options: ChangeOptions<()> = ChangeOptions::new()
            .with_scope("Form")
            .with_description("edit");
        assert_eq!(options.scope, Scope::from("Form"));
        assert_eq!(options.description.as_deref(), Some("edit"));
    }

    #[test]
    fn test_observer_is_notified() {
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        let mut options: ChangeOptions<u8> =
            ChangeOptions::new().with_observer(move |patches, _| seen.set(patches.len()));
        let info = PatchInfo {
            before: Frontier::root(),
            after: Frontier::root(),
        };
        options.notify(&[1, 2, 3], &info);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_transaction_options_drop_into_change_options() {
        let tx = TransactionOptions::new()
            .with_scope("Modal")
            .with_description("both");
        let options: ChangeOptions<()> = tx.into();
        assert_eq!(options.scope, Scope::from("Modal"));
        assert_eq!(options.description.as_deref(), Some("both"));
    }

    #[test]
    fn test_change_sides() {
        let mut change: Change<u8> = Change {
            undo: Revision {
                heads: Frontier::root(),
                patches: vec![1],
            },
            redo: Revision {
                heads: Frontier::root(),
                patches: vec![2],
            },
            description: None,
        };
        assert_eq!(change.side(Side::Undo).patches, vec![1]);
        change.side_mut(Side::Redo).patches.push(3);
        assert_eq!(change.redo.patches, vec![2, 3]);
        assert_eq!(change.description(), None);
    }
}
