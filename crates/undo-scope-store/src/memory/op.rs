/// Change nodes and the id-based operations they carry.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::value::Scalar;
use crate::frontier::{ChangeHash, Frontier};

/// Lamport-style operation id. Ordering is by counter, then actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub(crate) struct OpId {
    pub counter: u64,
    pub actor: Uuid,
}

/// Anchor of a sequence insert: the list head or an existing element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum ElemRef {
    Head,
    Elem(OpId),
}

/// Value written by a map set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum NewValue {
    Scalar(Scalar),
    /// Creates an empty text object whose id is the set op's id.
    MakeText,
    /// Creates an empty list object whose id is the set op's id.
    MakeList,
}

/// Content of a sequence element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum ElemValue {
    Char(char),
    Scalar(Scalar),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum OpKind {
    MapSet {
        key: String,
        value: NewValue,
        /// Set ops for `key` this write supersedes.
        pred: Vec<OpId>,
    },
    MapDelete {
        key: String,
        pred: Vec<OpId>,
    },
    SeqInsert {
        obj: OpId,
        after: ElemRef,
        value: ElemValue,
    },
    SeqDelete {
        obj: OpId,
        elem: OpId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Op {
    pub id: OpId,
    pub kind: OpKind,
}

/// One node of the causal history graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ChangeNode {
    pub actor: Uuid,
    pub seq: u64,
    /// Counter of the first op; greater than every op the node depends on.
    pub start_op: u64,
    pub deps: Frontier,
    pub ops: Vec<Op>,
}

impl ChangeNode {
    /// Content address over the canonical JSON encoding of the node.
    pub fn hash(&self) -> Result<ChangeHash> {
        let bytes = serde_json::to_vec(self).context("Failed to encode change node")?;
        let digest = Sha256::digest(&bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Ok(ChangeHash(out))
    }

    /// Counter of the last op, or the one before `start_op` for an empty node.
    pub fn max_op(&self) -> u64 {
        self.start_op + self.ops.len() as u64 - 1
    }
}
