/// Scopes and the per-scope undo/redo stack bookkeeping shared by recorders
/// and the manager.
use std::collections::HashMap;
use std::fmt;

/// Namespace for an independent pair of undo/redo stacks.
///
/// The default scope is a distinct variant, so no user-chosen name can
/// alias it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Scope {
    #[default]
    Default,
    Named(String),
}

impl Scope {
    pub fn named(name: impl Into<String>) -> Self {
        Scope::Named(name.into())
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Scope::Default)
    }
}

impl From<&str> for Scope {
    fn from(name: &str) -> Self {
        Scope::Named(name.to_string())
    }
}

impl From<String> for Scope {
    fn from(name: String) -> Self {
        Scope::Named(name)
    }
}

impl From<&Scope> for Scope {
    fn from(scope: &Scope) -> Self {
        scope.clone()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Default => f.write_str("<default>"),
            Scope::Named(name) => f.write_str(name),
        }
    }
}

/// LIFO undo and redo sequences for one scope. The top is the last element.
#[derive(Debug, Clone)]
pub(crate) struct StackPair<T> {
    undos: Vec<T>,
    redos: Vec<T>,
}

impl<T> Default for StackPair<T> {
    fn default() -> Self {
        Self {
            undos: Vec::new(),
            redos: Vec::new(),
        }
    }
}

impl<T> StackPair<T> {
    pub fn undos(&self) -> &[T] {
        &self.undos
    }

    pub fn redos(&self) -> &[T] {
        &self.redos
    }

    pub(crate) fn stack_mut(&mut self, side: Side) -> &mut Vec<T> {
        match side {
            Side::Undo => &mut self.undos,
            Side::Redo => &mut self.redos,
        }
    }

    /// Pushes onto `side`, evicting the oldest entries beyond `max_depth`
    /// (0 = unbounded).
    pub(crate) fn push(&mut self, side: Side, item: T, max_depth: usize) {
        let stack = self.stack_mut(side);
        stack.push(item);
        if max_depth > 0 && stack.len() > max_depth {
            let excess = stack.len() - max_depth;
            stack.drain(..excess);
        }
    }

    pub(crate) fn pop(&mut self, side: Side) -> Option<T> {
        self.stack_mut(side).pop()
    }

    /// The entry that will be popped next from `side`.
    pub(crate) fn top_mut(&mut self, side: Side) -> Option<&mut T> {
        self.stack_mut(side).last_mut()
    }
}

/// Which stack of a pair an operation works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Undo,
    Redo,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Undo => Side::Redo,
            Side::Redo => Side::Undo,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Undo => "undo",
            Side::Redo => "redo",
        })
    }
}

/// Stack pairs keyed by scope, created on first write.
///
/// Reads of a scope that was never written answer as empty without
/// allocating a pair for it.
#[derive(Debug, Clone)]
pub(crate) struct ScopedStacks<T> {
    stacks: HashMap<Scope, StackPair<T>>,
    max_depth: usize,
}

impl<T> ScopedStacks<T> {
    pub fn new(max_depth: usize) -> Self {
        Self {
            stacks: HashMap::new(),
            max_depth,
        }
    }

    pub fn get(&self, scope: &Scope) -> Option<&StackPair<T>> {
        self.stacks.get(scope)
    }

    pub fn get_mut(&mut self, scope: &Scope) -> &mut StackPair<T> {
        self.stacks.entry(scope.clone()).or_default()
    }

    pub fn undos(&self, scope: &Scope) -> &[T] {
        self.get(scope).map(StackPair::undos).unwrap_or(&[])
    }

    pub fn redos(&self, scope: &Scope) -> &[T] {
        self.get(scope).map(StackPair::redos).unwrap_or(&[])
    }

    /// Records a freshly committed entry: pushes it as the newest undo and
    /// invalidates the scope's redo history.
    pub fn record(&mut self, scope: &Scope, item: T) {
        let max_depth = self.max_depth;
        let pair = self.get_mut(scope);
        pair.push(Side::Undo, item, max_depth);
        pair.redos.clear();
    }

    pub fn clear(&mut self, scope: &Scope) {
        self.stacks.remove(scope);
    }

    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.stacks.keys()
    }
}
