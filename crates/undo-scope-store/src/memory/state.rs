/// Materialized CRDT state: a last-writer-wins root map plus RGA sequences.
use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Context, Result};

use super::op::{ElemRef, ElemValue, NewValue, Op, OpId, OpKind};
use super::value::{Scalar, Value, View};

#[derive(Debug, Clone)]
struct Elem {
    id: OpId,
    value: ElemValue,
    deleted: bool,
}

/// What a surviving map write points at.
#[derive(Debug, Clone)]
enum Slot {
    Scalar(Scalar),
    Text(OpId),
    List(OpId),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct DocState {
    /// Surviving (possibly conflicting) writes per key.
    map: BTreeMap<String, Vec<(OpId, Slot)>>,
    /// Sequence objects keyed by the id of the op that created them.
    seqs: HashMap<OpId, Vec<Elem>>,
}

impl DocState {
    pub fn apply(&mut self, op: &Op) -> Result<()> {
        match &op.kind {
            OpKind::MapSet { key, value, pred } => {
                let slot = match value {
                    NewValue::Scalar(s) => Slot::Scalar(s.clone()),
                    NewValue::MakeText => {
                        self.seqs.insert(op.id, Vec::new());
                        Slot::Text(op.id)
                    }
                    NewValue::MakeList => {
                        self.seqs.insert(op.id, Vec::new());
                        Slot::List(op.id)
                    }
                };
                let entries = self.map.entry(key.clone()).or_default();
                entries.retain(|(id, _)| !pred.contains(id));
                entries.push((op.id, slot));
            }
            OpKind::MapDelete { key, pred } => {
                if let Some(entries) = self.map.get_mut(key) {
                    entries.retain(|(id, _)| !pred.contains(id));
                    if entries.is_empty() {
                        self.map.remove(key);
                    }
                }
            }
            OpKind::SeqInsert { obj, after, value } => {
                let seq = self
                    .seqs
                    .get_mut(obj)
                    .with_context(|| format!("Insert into unknown object {obj:?}"))?;
                let mut pos = match after {
                    ElemRef::Head => 0,
                    ElemRef::Elem(anchor) => {
                        seq.iter()
                            .position(|e| e.id == *anchor)
                            .with_context(|| format!("Unknown insert anchor {anchor:?}"))?
                            + 1
                    }
                };
                // Concurrent inserts at the same anchor: greater ids go first.
                while pos < seq.len() && seq[pos].id > op.id {
                    pos += 1;
                }
                seq.insert(
                    pos,
                    Elem {
                        id: op.id,
                        value: value.clone(),
                        deleted: false,
                    },
                );
            }
            OpKind::SeqDelete { obj, elem } => {
                let seq = self
                    .seqs
                    .get_mut(obj)
                    .with_context(|| format!("Delete from unknown object {obj:?}"))?;
                let target = seq
                    .iter_mut()
                    .find(|e| e.id == *elem)
                    .with_context(|| format!("Delete of unknown element {elem:?}"))?;
                target.deleted = true;
            }
        }
        Ok(())
    }

    fn winner(&self, key: &str) -> Option<&Slot> {
        self.map
            .get(key)?
            .iter()
            .max_by_key(|(id, _)| *id)
            .map(|(_, slot)| slot)
    }

    /// Ids of every surviving write under `key`; a new write supersedes all of them.
    pub fn live_ops(&self, key: &str) -> Vec<OpId> {
        self.map
            .get(key)
            .map(|entries| entries.iter().map(|(id, _)| *id).collect())
            .unwrap_or_default()
    }

    pub fn text_obj(&self, key: &str) -> Result<OpId> {
        match self.winner(key) {
            Some(Slot::Text(obj)) => Ok(*obj),
            Some(_) => bail!("Key {key:?} does not hold text"),
            None => bail!("Key {key:?} not found"),
        }
    }

    pub fn list_obj(&self, key: &str) -> Result<OpId> {
        match self.winner(key) {
            Some(Slot::List(obj)) => Ok(*obj),
            Some(_) => bail!("Key {key:?} does not hold a list"),
            None => bail!("Key {key:?} not found"),
        }
    }

    /// Ids of the visible elements of a sequence, in document order.
    pub fn visible_ids(&self, obj: OpId) -> Result<Vec<OpId>> {
        let seq = self
            .seqs
            .get(&obj)
            .with_context(|| format!("Unknown object {obj:?}"))?;
        Ok(seq.iter().filter(|e| !e.deleted).map(|e| e.id).collect())
    }

    fn visible(&self, obj: OpId) -> impl Iterator<Item = &ElemValue> {
        self.seqs
            .get(&obj)
            .into_iter()
            .flatten()
            .filter(|e| !e.deleted)
            .map(|e| &e.value)
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        let value = match self.winner(key)? {
            Slot::Scalar(s) => Value::Scalar(s.clone()),
            Slot::Text(obj) => Value::Text(
                self.visible(*obj)
                    .filter_map(|v| match v {
                        ElemValue::Char(c) => Some(*c),
                        ElemValue::Scalar(_) => None,
                    })
                    .collect(),
            ),
            Slot::List(obj) => Value::List(
                self.visible(*obj)
                    .filter_map(|v| match v {
                        ElemValue::Scalar(s) => Some(s.clone()),
                        ElemValue::Char(_) => None,
                    })
                    .collect(),
            ),
        };
        Some(value)
    }

    pub fn view(&self) -> View {
        self.map
            .keys()
            .filter_map(|key| self.value(key).map(|v| (key.clone(), v)))
            .collect()
    }
}
