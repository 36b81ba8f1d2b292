/// Causal frontier types: change hashes and the set of history tips.
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Content address of a single change node (SHA-256 digest).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChangeHash(pub [u8; 32]);

impl fmt::Display for ChangeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ChangeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps frontier dumps readable in logs.
        write!(f, "ChangeHash({})", &hex::encode(self.0)[..12])
    }
}

impl FromStr for ChangeHash {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).with_context(|| format!("Invalid change hash: {s}"))?;
        if bytes.len() != 32 {
            bail!("Change hash must be 32 bytes, got {}", bytes.len());
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

/// The set of tips of a document's causal history.
///
/// Two frontiers are equal iff they contain the same hashes, regardless of the
/// order in which they were observed. An empty frontier names the start of
/// history; more than one member means unmerged concurrent branches exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frontier(BTreeSet<ChangeHash>);

impl Frontier {
    /// The frontier of an empty document.
    pub fn root() -> Self {
        Self::default()
    }

    /// A frontier holding exactly one tip.
    pub fn single(hash: ChangeHash) -> Self {
        Self(BTreeSet::from([hash]))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the history has diverged into concurrent branches.
    pub fn is_forked(&self) -> bool {
        self.0.len() > 1
    }

    pub fn contains(&self, hash: &ChangeHash) -> bool {
        self.0.contains(hash)
    }

    pub fn insert(&mut self, hash: ChangeHash) -> bool {
        self.0.insert(hash)
    }

    pub fn remove(&mut self, hash: &ChangeHash) -> bool {
        self.0.remove(hash)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeHash> {
        self.0.iter()
    }
}

impl FromIterator<ChangeHash> for Frontier {
    fn from_iter<I: IntoIterator<Item = ChangeHash>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Frontier {
    type Item = &'a ChangeHash;
    type IntoIter = std::collections::btree_set::Iter<'a, ChangeHash>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Frontier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, hash) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", &hash.to_string()[..12])?;
        }
        f.write_str("]")
    }
}
