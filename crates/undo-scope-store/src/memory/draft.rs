/// Mutable view handed to mutators; turns index-based patches into CRDT ops.
use anyhow::{bail, Result};
use uuid::Uuid;

use super::op::{ElemRef, ElemValue, NewValue, Op, OpId, OpKind};
use super::state::DocState;
use super::value::{text_splice, Patch, Scalar, Value, View};
use crate::document::PatchSink;

/// An in-progress change against a materialized state.
///
/// Every edit is recorded twice: as id-based ops (what gets committed to the
/// history graph) and as the index-based patch that produced them (what the
/// store reports back to the caller).
#[derive(Debug)]
pub struct Draft {
    state: DocState,
    actor: Uuid,
    next_counter: u64,
    ops: Vec<Op>,
    patches: Vec<Patch>,
}

impl Draft {
    pub(crate) fn new(state: DocState, actor: Uuid, start_op: u64) -> Self {
        Self {
            state,
            actor,
            next_counter: start_op,
            ops: Vec::new(),
            patches: Vec::new(),
        }
    }

    /// Consumes the draft, returning its ops, its patches and the state they
    /// produced.
    pub(crate) fn finish(self) -> (Vec<Op>, Vec<Patch>, DocState) {
        (self.ops, self.patches, self.state)
    }

    /// Reads a value as it stands within this draft.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.value(key)
    }

    pub fn view(&self) -> View {
        self.state.view()
    }

    pub fn put(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.apply_patch(&Patch::Put {
            key: key.to_string(),
            value: value.into(),
        })
    }

    pub fn delete(&mut self, key: &str) -> Result<()> {
        self.apply_patch(&Patch::Delete {
            key: key.to_string(),
        })
    }

    pub fn splice_text(&mut self, key: &str, index: usize, delete: usize, insert: &str) -> Result<()> {
        self.apply_patch(&Patch::SpliceText {
            key: key.to_string(),
            index,
            delete,
            insert: insert.to_string(),
        })
    }

    /// Replaces the text under `key` with `new_text` using a single minimal splice,
    /// so that concurrent edits to untouched regions survive a merge.
    pub fn update_text(&mut self, key: &str, new_text: &str) -> Result<()> {
        let current = match self.state.value(key) {
            Some(Value::Text(s)) => s,
            Some(_) => bail!("Key {key:?} does not hold text"),
            None => return self.put(key, Value::text(new_text)),
        };
        match text_splice(key, &current, new_text) {
            Some(patch) => self.apply_patch(&patch),
            None => Ok(()),
        }
    }

    pub fn insert(&mut self, key: &str, index: usize, value: impl Into<Scalar>) -> Result<()> {
        self.apply_patch(&Patch::ListInsert {
            key: key.to_string(),
            index,
            values: vec![value.into()],
        })
    }

    pub fn push(&mut self, key: &str, value: impl Into<Scalar>) -> Result<()> {
        let obj = self.state.list_obj(key)?;
        let len = self.state.visible_ids(obj)?.len();
        self.insert(key, len, value)
    }

    pub fn remove(&mut self, key: &str, index: usize) -> Result<()> {
        self.apply_patch(&Patch::ListDelete {
            key: key.to_string(),
            index,
            count: 1,
        })
    }

    fn push_op(&mut self, kind: OpKind) -> Result<OpId> {
        let op = Op {
            id: OpId {
                counter: self.next_counter,
                actor: self.actor,
            },
            kind,
        };
        self.state.apply(&op)?;
        self.next_counter += 1;
        let id = op.id;
        self.ops.push(op);
        Ok(id)
    }

    fn insert_run<I>(&mut self, obj: OpId, mut after: ElemRef, values: I) -> Result<()>
    where
        I: IntoIterator<Item = ElemValue>,
    {
        for value in values {
            let id = self.push_op(OpKind::SeqInsert { obj, after, value })?;
            after = ElemRef::Elem(id);
        }
        Ok(())
    }

    /// Deletes `count` visible elements starting at `index` and returns the
    /// anchor for inserting at `index` afterwards.
    fn delete_run(&mut self, key: &str, obj: OpId, index: usize, count: usize) -> Result<ElemRef> {
        let ids = self.state.visible_ids(obj)?;
        if index.checked_add(count).map_or(true, |end| end > ids.len()) {
            bail!(
                "Range {index}+{count} out of bounds for {key:?} (len {})",
                ids.len()
            );
        }
        for elem in &ids[index..index + count] {
            self.push_op(OpKind::SeqDelete { obj, elem: *elem })?;
        }
        Ok(match index {
            0 => ElemRef::Head,
            i => ElemRef::Elem(ids[i - 1]),
        })
    }

    fn translate(&mut self, patch: &Patch) -> Result<()> {
        match patch {
            Patch::Put { key, value } => {
                let pred = self.state.live_ops(key);
                let new_value = match value {
                    Value::Scalar(s) => NewValue::Scalar(s.clone()),
                    Value::Text(_) => NewValue::MakeText,
                    Value::List(_) => NewValue::MakeList,
                };
                let obj = self.push_op(OpKind::MapSet {
                    key: key.clone(),
                    value: new_value,
                    pred,
                })?;
                match value {
                    Value::Scalar(_) => {}
                    Value::Text(s) => {
                        self.insert_run(obj, ElemRef::Head, s.chars().map(ElemValue::Char))?
                    }
                    Value::List(items) => self.insert_run(
                        obj,
                        ElemRef::Head,
                        items.iter().cloned().map(ElemValue::Scalar),
                    )?,
                }
            }
            Patch::Delete { key } => {
                let pred = self.state.live_ops(key);
                if pred.is_empty() {
                    bail!("Cannot delete missing key {key:?}");
                }
                self.push_op(OpKind::MapDelete {
                    key: key.clone(),
                    pred,
                })?;
            }
            Patch::SpliceText {
                key,
                index,
                delete,
                insert,
            } => {
                let obj = self.state.text_obj(key)?;
                let after = self.delete_run(key, obj, *index, *delete)?;
                self.insert_run(obj, after, insert.chars().map(ElemValue::Char))?;
            }
            Patch::ListInsert { key, index, values } => {
                let obj = self.state.list_obj(key)?;
                let after = self.delete_run(key, obj, *index, 0)?;
                self.insert_run(obj, after, values.iter().cloned().map(ElemValue::Scalar))?;
            }
            Patch::ListDelete { key, index, count } => {
                let obj = self.state.list_obj(key)?;
                self.delete_run(key, obj, *index, *count)?;
            }
        }
        Ok(())
    }
}

impl PatchSink<Patch> for Draft {
    fn apply_patch(&mut self, patch: &Patch) -> Result<()> {
        let before = self.ops.len();
        self.translate(patch)?;
        // Splices that touch nothing are not reported.
        if self.ops.len() > before {
            self.patches.push(patch.clone());
        }
        Ok(())
    }
}
