// Integration tests for the undo/redo engine.
//
// These drive recorders and the manager against the in-memory causal store,
// including untracked edits, replicas and stores that lose history.

use std::cell::RefCell;
use std::rc::Rc;

use undo_scope_history::{
    ChangeOptions, ChangeRecorder, HistoryConfig, HistoryError, Outcome, Scope,
    TransactionOptions, UndoRedoManager, UnresolvedPolicy,
};
use undo_scope_store::{
    ChangeReport, DocumentId, DocumentStore, Draft, Frontier, MemoryDoc, Patch, Value,
};

const JOLLY: &str = "The jolly farmer enjoyed harvesting his ripe crop.";
const ELATED: &str = "The elated farmer enjoyed harvesting his ripe crop.";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn farmer() -> MemoryDoc {
    MemoryDoc::with_values([
        ("text", Value::text(JOLLY)),
        ("name", Value::text("John")),
        ("age", Value::from(30)),
    ])
    .unwrap()
}

fn text(doc: &MemoryDoc) -> String {
    doc.get("text")
        .and_then(|v| v.as_text().map(str::to_string))
        .unwrap()
}

fn append_weekend(doc: &MemoryDoc) {
    let current = text(doc);
    let extended = format!("{} at the weekend.", current.trim_end_matches('.'));
    doc.change(|d| d.update_text("text", &extended)).unwrap();
}

// ── Basic round trip ───────────────────────────────────────────────────

#[test]
fn test_rename_undo_redo() {
    init_tracing();
    let doc = MemoryDoc::with_values([("name", Value::text("John"))]).unwrap();
    let mut rec = ChangeRecorder::new(doc.clone());

    rec.change(|d| d.update_text("name", "Jane"), ChangeOptions::new())
        .unwrap();
    assert_eq!(doc.get("name"), Some(Value::text("Jane")));

    rec.undo(Scope::Default).unwrap();
    assert_eq!(doc.get("name"), Some(Value::text("John")));

    rec.redo(Scope::Default).unwrap();
    assert_eq!(doc.get("name"), Some(Value::text("Jane")));
}

#[test]
fn test_observer_sees_forward_patches() {
    let doc = farmer();
    let seen: Rc<RefCell<Vec<Patch>>> = Rc::default();
    let sink = Rc::clone(&seen);
    let before = doc.heads();
    let mut rec = ChangeRecorder::new(doc.clone());

    rec.change(
        |d| d.put("age", 31),
        ChangeOptions::new().with_observer(move |patches: &[Patch], info| {
            assert_ne!(info.before, info.after);
            sink.borrow_mut().extend_from_slice(patches);
        }),
    )
    .unwrap();

    assert_eq!(
        *seen.borrow(),
        vec![Patch::Put {
            key: "age".to_string(),
            value: Value::from(31)
        }]
    );
    assert_eq!(rec.undo_stack(Scope::Default)[0].redo.heads, before);
}

// ── Untracked edits ────────────────────────────────────────────────────

#[test]
fn test_undo_preserves_untracked_suffix() {
    init_tracing();
    let doc = farmer();
    let mut rec = ChangeRecorder::new(doc.clone());

    rec.change(|d| d.update_text("text", ELATED), "elated").unwrap();
    append_weekend(&doc);
    assert_eq!(
        text(&doc),
        "The elated farmer enjoyed harvesting his ripe crop at the weekend."
    );

    assert_eq!(rec.undo(Scope::Default).unwrap(), Some(Outcome::Amended));
    assert_eq!(doc.heads().len(), 2);
    assert_eq!(
        text(&doc),
        "The jolly farmer enjoyed harvesting his ripe crop at the weekend."
    );
}

#[test]
fn test_redo_after_amended_undo_reanchors() {
    let doc = farmer();
    let mut rec = ChangeRecorder::new(doc.clone());

    rec.change(|d| d.update_text("text", ELATED), "elated").unwrap();
    append_weekend(&doc);
    rec.undo(Scope::Default).unwrap();

    // The redo entry now points at the reversal, not the current frontier.
    let redo_heads = rec.redo_stack(Scope::Default)[0].redo.heads.clone();
    assert_eq!(redo_heads.len(), 1);
    assert_ne!(redo_heads, doc.heads());

    assert_eq!(rec.redo(Scope::Default).unwrap(), Some(Outcome::Amended));
    assert_eq!(
        text(&doc),
        "The elated farmer enjoyed harvesting his ripe crop at the weekend."
    );
    assert_eq!(doc.heads().len(), 2);

    rec.undo(Scope::Default).unwrap();
    assert_eq!(
        text(&doc),
        "The jolly farmer enjoyed harvesting his ripe crop at the weekend."
    );
}

#[test]
fn test_edits_from_a_merged_replica_survive_undo() {
    let doc = farmer();
    let replica = doc.fork();
    let mut rec = ChangeRecorder::new(doc.clone());

    rec.change(|d| d.put("age", 31), "birthday").unwrap();
    replica.change(|d| d.update_text("name", "Johnny")).unwrap();
    doc.merge(&replica).unwrap();

    assert_eq!(rec.undo(Scope::Default).unwrap(), Some(Outcome::Amended));
    assert_eq!(doc.get("age"), Some(Value::from(30)));
    assert_eq!(doc.get("name"), Some(Value::text("Johnny")));
}

#[test]
fn test_consecutive_steps_stay_on_fast_path() {
    let doc = farmer();
    let mut rec = ChangeRecorder::new(doc.clone());
    rec.change(|d| d.put("age", 31), "one").unwrap();
    rec.change(|d| d.update_text("name", "Jane"), "two").unwrap();

    for _ in 0..2 {
        assert_eq!(rec.undo(Scope::Default).unwrap(), Some(Outcome::FastPath));
    }
    for _ in 0..2 {
        assert_eq!(rec.redo(Scope::Default).unwrap(), Some(Outcome::FastPath));
    }
    assert_eq!(doc.get("age"), Some(Value::from(31)));
    assert_eq!(doc.get("name"), Some(Value::text("Jane")));
    assert_eq!(doc.heads().len(), 1);
}

#[test]
fn test_recompute_patches_on_amend() {
    let config = HistoryConfig {
        recompute_patches_on_amend: true,
        ..HistoryConfig::default()
    };
    let doc = farmer();
    let mut rec = ChangeRecorder::with_config(doc.clone(), config);

    rec.change(|d| d.update_text("text", ELATED), "elated").unwrap();
    let anchor = doc.heads();
    append_weekend(&doc);
    rec.undo(Scope::Default).unwrap();

    let change = &rec.redo_stack(Scope::Default)[0];
    let forward = doc.diff(&anchor, &change.redo.heads).unwrap();
    let expected = doc.inverse(&forward, &anchor).unwrap();
    assert_eq!(change.redo.patches, expected);

    rec.redo(Scope::Default).unwrap();
    assert_eq!(
        text(&doc),
        "The elated farmer enjoyed harvesting his ripe crop at the weekend."
    );
}

#[test]
fn test_amended_chain_rewrites_adjacent_entries() {
    let doc = farmer();
    let mut rec = ChangeRecorder::new(doc.clone());
    rec.change(|d| d.update_text("text", ELATED), "elated").unwrap();
    rec.change(|d| d.put("age", 31), "birthday").unwrap();
    doc.change(|d| d.splice_text("text", 0, 0, "Oh! ")).unwrap();

    assert_eq!(rec.undo(Scope::Default).unwrap(), Some(Outcome::Amended));
    // The remaining undo entry follows the reversal it sits on.
    assert_eq!(
        rec.undo_stack(Scope::Default)[0].undo.heads,
        rec.redo_stack(Scope::Default)[0].redo.heads
    );

    assert_eq!(rec.undo(Scope::Default).unwrap(), Some(Outcome::Amended));
    assert_eq!(
        text(&doc),
        "Oh! The jolly farmer enjoyed harvesting his ripe crop."
    );
    assert_eq!(doc.get("age"), Some(Value::from(30)));

    assert_eq!(rec.redo(Scope::Default).unwrap(), Some(Outcome::Amended));
    assert_eq!(
        rec.redo_stack(Scope::Default)[0].redo.heads,
        rec.undo_stack(Scope::Default)[0].undo.heads
    );

    assert_eq!(rec.redo(Scope::Default).unwrap(), Some(Outcome::Amended));
    assert_eq!(
        text(&doc),
        "Oh! The elated farmer enjoyed harvesting his ripe crop."
    );
    assert_eq!(doc.get("age"), Some(Value::from(31)));
    assert_eq!(doc.heads().len(), 2);
}

// ── Scopes ─────────────────────────────────────────────────────────────

#[test]
fn test_scope_isolation() {
    let doc = farmer();
    let mut rec = ChangeRecorder::new(doc.clone());
    let modal = ChangeOptions::new().with_scope("Modal");
    rec.change(|d| d.put("age", 31), modal).unwrap();
    rec.change(
        |d| d.update_text("text", ELATED),
        ChangeOptions::new().with_scope("Modal"),
    )
    .unwrap();
    rec.change(
        |d| d.update_text("name", "Jane"),
        ChangeOptions::new().with_scope("Form"),
    )
    .unwrap();

    assert_eq!(rec.undos("Modal").len(), 2);
    assert_eq!(rec.undos("Form").len(), 1);

    rec.undo("Modal").unwrap();
    assert_eq!(rec.undos("Modal").len(), 1);
    assert_eq!(rec.undos("Form").len(), 1);
    assert_eq!(text(&doc), JOLLY);
    assert_eq!(doc.get("name"), Some(Value::text("Jane")));
    assert!(!rec.can_undo(Scope::Default));
}

#[test]
fn test_new_change_invalidates_redo_in_its_scope_only() {
    let doc = farmer();
    let mut rec = ChangeRecorder::new(doc.clone());
    rec.change(|d| d.put("age", 31), ChangeOptions::new().with_scope("A"))
        .unwrap();
    rec.change(
        |d| d.update_text("name", "Jane"),
        ChangeOptions::new().with_scope("B"),
    )
    .unwrap();
    rec.undo("A").unwrap();
    rec.undo("B").unwrap();

    rec.change(|d| d.put("age", 40), ChangeOptions::new().with_scope("A"))
        .unwrap();
    assert!(!rec.can_redo("A"));
    assert!(rec.can_redo("B"));
}

// ── Transactions ───────────────────────────────────────────────────────

#[test]
fn test_nested_transaction_is_rejected() {
    let doc = farmer();
    let mut rec = ChangeRecorder::new(doc.clone());
    let result = rec.transaction(
        |r| {
            r.change(|d| d.put("age", 31), ChangeOptions::new())?;
            r.start_transaction()?;
            Ok(None)
        },
        ChangeOptions::new(),
    );
    assert!(matches!(result, Err(HistoryError::AlreadyInTransaction)));
    assert!(!rec.in_transaction());
    assert!(!rec.can_undo(Scope::Default));
    assert_eq!(doc.get("age"), Some(Value::from(30)));
}

#[test]
fn test_transaction_groups_edits_and_takes_body_description() {
    let doc = farmer();
    let mut rec = ChangeRecorder::new(doc.clone());
    let committed = rec
        .transaction(
            |r| {
                r.change(|d| d.put("age", 31), "ignored")?;
                r.change(|d| d.update_text("name", "Jane"), "ignored")?;
                Ok(Some("profile update".to_string()))
            },
            "fallback",
        )
        .unwrap();

    assert!(committed);
    assert_eq!(rec.undos(Scope::Default), vec![Some("profile update")]);

    rec.undo(Scope::Default).unwrap();
    assert_eq!(doc.get("age"), Some(Value::from(30)));
    assert_eq!(doc.get("name"), Some(Value::text("John")));
}

#[test]
fn test_transaction_without_changes_is_noop() {
    let doc = farmer();
    let heads = doc.heads();
    let mut rec = ChangeRecorder::new(doc.clone());
    let committed = rec
        .transaction(
            |r| {
                r.change(|d| d.update_text("name", "John"), ChangeOptions::new())?;
                Ok(None)
            },
            "noop",
        )
        .unwrap();
    assert!(!committed);
    assert_eq!(doc.heads(), heads);
    assert!(!rec.can_undo(Scope::Default));
}

// ── Manager ────────────────────────────────────────────────────────────

#[test]
fn test_manager_partial_participation() {
    init_tracing();
    let a = farmer();
    let b = farmer();
    let c = farmer();
    let mut manager: UndoRedoManager<MemoryDoc> = UndoRedoManager::new();
    for doc in [&a, &b, &c] {
        manager.add_handle(doc.clone());
    }
    let (ida, idc) = (a.id(), c.id());

    let summary = manager
        .transaction(
            |m| {
                edit(m, &ida, 41)?;
                edit(m, &idc, 42)?;
                Ok(None)
            },
            TransactionOptions::new()
                .with_scope("Form")
                .with_description("ages"),
        )
        .unwrap()
        .expect("committed");

    assert_eq!(summary.participants, vec![ida, idc]);
    assert_eq!(summary.scope, Scope::from("Form"));
    assert_eq!(manager.undo_participants("Form"), vec![&[ida, idc][..]]);
    assert!(!manager.recorder(&b.id()).unwrap().can_undo("Form"));

    manager.undo("Form").expect("undone");
    for doc in [&a, &b, &c] {
        assert_eq!(doc.get("age"), Some(Value::from(30)));
    }
    assert!(manager.can_redo("Form"));
    assert!(!manager.can_undo("Form"));
}

#[test]
fn test_manager_undo_tolerates_untracked_edits() {
    let a = farmer();
    let b = farmer();
    let mut manager: UndoRedoManager<MemoryDoc> = UndoRedoManager::new();
    manager.add_handle(a.clone());
    manager.add_handle(b.clone());
    let (ida, idb) = (a.id(), b.id());

    manager
        .transaction(
            |m| {
                edit(m, &ida, 50)?;
                edit(m, &idb, 60)?;
                Ok(Some("both".to_string()))
            },
            TransactionOptions::new(),
        )
        .unwrap();
    b.change(|d| d.update_text("name", "Bob")).unwrap();

    manager.undo(Scope::Default).expect("undone");
    assert_eq!(a.get("age"), Some(Value::from(30)));
    assert_eq!(b.get("age"), Some(Value::from(30)));
    assert_eq!(b.get("name"), Some(Value::text("Bob")));
    assert_eq!(a.heads().len(), 1);
    assert_eq!(b.heads().len(), 2);
}

#[test]
fn test_manager_transaction_redo_invalidation() {
    let a = farmer();
    let mut manager: UndoRedoManager<MemoryDoc> = UndoRedoManager::new();
    manager.add_handle(a.clone());
    let id = a.id();

    manager
        .transaction(|m| edit(m, &id, 31).map(|_| None), "first")
        .unwrap();
    manager.undo(Scope::Default);
    assert_eq!(manager.redos(Scope::Default), vec![Some("first")]);

    manager
        .transaction(|m| edit(m, &id, 32).map(|_| None), "second")
        .unwrap();
    assert!(!manager.can_redo(Scope::Default));
    assert_eq!(manager.undos(Scope::Default), vec![Some("second")]);
}

fn edit(
    manager: &mut UndoRedoManager<MemoryDoc>,
    id: &DocumentId,
    age: i64,
) -> undo_scope_history::Result<bool> {
    manager
        .recorder_mut(id)
        .expect("registered")
        .change(move |d| d.put("age", age), ChangeOptions::new())
}

// ── Unresolvable frontiers ─────────────────────────────────────────────

/// A store that has lost all history: historical changes never resolve.
struct Pruned(MemoryDoc);

impl DocumentStore for Pruned {
    type Patch = Patch;
    type Draft = Draft;

    fn document_id(&self) -> DocumentId {
        self.0.document_id()
    }

    fn change<F>(&self, mutator: F) -> anyhow::Result<ChangeReport<Patch>>
    where
        F: FnOnce(&mut Draft) -> anyhow::Result<()>,
    {
        self.0.change(mutator)
    }

    fn change_at<F>(&self, _heads: &Frontier, _mutator: F) -> anyhow::Result<Option<Frontier>>
    where
        F: FnOnce(&mut Draft) -> anyhow::Result<()>,
    {
        Ok(None)
    }

    fn heads(&self) -> Frontier {
        self.0.heads()
    }

    fn diff(&self, from: &Frontier, to: &Frontier) -> anyhow::Result<Vec<Patch>> {
        self.0.diff(from, to)
    }

    fn inverse(&self, patches: &[Patch], before: &Frontier) -> anyhow::Result<Vec<Patch>> {
        self.0.inverse(patches, before)
    }
}

fn pruned_recorder(policy: UnresolvedPolicy) -> (MemoryDoc, ChangeRecorder<Pruned>) {
    let doc = farmer();
    let config = HistoryConfig {
        unresolved_policy: policy,
        ..HistoryConfig::default()
    };
    let mut rec = ChangeRecorder::with_config(Pruned(doc.clone()), config);
    rec.change(|d| d.put("age", 31), "birthday").unwrap();
    doc.change(|d| d.update_text("name", "Jane")).unwrap();
    (doc, rec)
}

#[test]
fn test_unresolvable_frontier_retains_change() {
    let (doc, mut rec) = pruned_recorder(UnresolvedPolicy::Retain);
    let heads = doc.heads();
    let recorded = rec.undo_stack(Scope::Default)[0].clone();

    assert_eq!(rec.undo(Scope::Default).unwrap(), Some(Outcome::Unresolved));
    assert_eq!(doc.heads(), heads);
    assert_eq!(doc.get("age"), Some(Value::from(31)));
    assert!(!rec.can_undo(Scope::Default));
    assert_eq!(rec.redo_stack(Scope::Default), &[recorded]);
}

#[test]
fn test_unresolvable_frontier_discards_change() {
    let (doc, mut rec) = pruned_recorder(UnresolvedPolicy::Discard);
    assert_eq!(rec.undo(Scope::Default).unwrap(), Some(Outcome::Unresolved));
    assert_eq!(doc.get("age"), Some(Value::from(31)));
    assert!(!rec.can_undo(Scope::Default));
    assert!(!rec.can_redo(Scope::Default));
}

#[test]
fn test_fast_path_does_not_need_history() {
    let doc = farmer();
    let mut rec = ChangeRecorder::new(Pruned(doc.clone()));
    rec.change(|d| d.put("age", 31), "birthday").unwrap();
    assert_eq!(rec.undo(Scope::Default).unwrap(), Some(Outcome::FastPath));
    assert_eq!(doc.get("age"), Some(Value::from(30)));
}

/// A store whose diffs always fail.
struct NoDiff(MemoryDoc);

impl DocumentStore for NoDiff {
    type Patch = Patch;
    type Draft = Draft;

    fn document_id(&self) -> DocumentId {
        self.0.document_id()
    }

    fn change<F>(&self, mutator: F) -> anyhow::Result<ChangeReport<Patch>>
    where
        F: FnOnce(&mut Draft) -> anyhow::Result<()>,
    {
        self.0.change(mutator)
    }

    fn change_at<F>(&self, heads: &Frontier, mutator: F) -> anyhow::Result<Option<Frontier>>
    where
        F: FnOnce(&mut Draft) -> anyhow::Result<()>,
    {
        self.0.change_at(heads, mutator)
    }

    fn heads(&self) -> Frontier {
        self.0.heads()
    }

    fn diff(&self, _from: &Frontier, _to: &Frontier) -> anyhow::Result<Vec<Patch>> {
        anyhow::bail!("diff unavailable")
    }

    fn inverse(&self, patches: &[Patch], before: &Frontier) -> anyhow::Result<Vec<Patch>> {
        self.0.inverse(patches, before)
    }
}

#[test]
fn test_failed_recompute_keeps_stacks_in_step_with_document() {
    let doc = farmer();
    let config = HistoryConfig {
        recompute_patches_on_amend: true,
        ..HistoryConfig::default()
    };
    let mut rec = ChangeRecorder::with_config(NoDiff(doc.clone()), config);
    rec.change(|d| d.put("age", 31), "birthday").unwrap();
    let recorded = rec.undo_stack(Scope::Default)[0].redo.patches.clone();
    doc.change(|d| d.update_text("name", "Jane")).unwrap();

    assert_eq!(rec.undo(Scope::Default).unwrap(), Some(Outcome::Amended));
    assert_eq!(doc.get("age"), Some(Value::from(30)));
    assert!(!rec.can_undo(Scope::Default));
    assert_eq!(rec.redo_stack(Scope::Default)[0].redo.patches, recorded);

    assert_eq!(rec.redo(Scope::Default).unwrap(), Some(Outcome::Amended));
    assert_eq!(doc.get("age"), Some(Value::from(31)));
    assert_eq!(doc.get("name"), Some(Value::text("Jane")));
}
