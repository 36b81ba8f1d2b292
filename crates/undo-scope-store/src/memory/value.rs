/// Plain document values and the index-based patch vocabulary.
///
/// Patches here operate on a materialized view (a root map of values). They
/// are what the store reports to callers and what callers hand back for
/// replay; the CRDT internals never leak through them.
use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// A leaf value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(v.into())
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Str(v)
    }
}

/// A value stored under a root key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Scalar(Scalar),
    /// Collaborative text; concurrent splices interleave per character.
    Text(String),
    /// Collaborative list of scalars.
    List(Vec<Scalar>),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Scalar]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Scalar(Scalar::Int(v)) => Some(*v),
            _ => None,
        }
    }
}

impl From<Scalar> for Value {
    fn from(v: Scalar) -> Self {
        Value::Scalar(v)
    }
}

macro_rules! scalar_into_value {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Scalar(v.into())
                }
            }
        )*
    };
}

scalar_into_value!(bool, i32, i64, f64, &str, String);

/// Materialized document content.
pub type View = BTreeMap<String, Value>;

/// A replayable structural edit against the root map.
///
/// Indices count characters for text and elements for lists, and are
/// interpreted against the state left by the preceding patch in a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Patch {
    /// Set `key`, replacing any previous value (a fresh text/list object).
    Put { key: String, value: Value },
    Delete { key: String },
    SpliceText {
        key: String,
        index: usize,
        delete: usize,
        insert: String,
    },
    ListInsert {
        key: String,
        index: usize,
        values: Vec<Scalar>,
    },
    ListDelete {
        key: String,
        index: usize,
        count: usize,
    },
}

impl Patch {
    /// The root key this patch touches.
    pub fn key(&self) -> &str {
        match self {
            Patch::Put { key, .. }
            | Patch::Delete { key }
            | Patch::SpliceText { key, .. }
            | Patch::ListInsert { key, .. }
            | Patch::ListDelete { key, .. } => key,
        }
    }
}

fn text_mut<'a>(view: &'a mut View, key: &str) -> Result<&'a mut String> {
    match view.get_mut(key) {
        Some(Value::Text(s)) => Ok(s),
        Some(_) => bail!("Key {key:?} does not hold text"),
        None => bail!("Key {key:?} not found"),
    }
}

fn list_mut<'a>(view: &'a mut View, key: &str) -> Result<&'a mut Vec<Scalar>> {
    match view.get_mut(key) {
        Some(Value::List(items)) => Ok(items),
        Some(_) => bail!("Key {key:?} does not hold a list"),
        None => bail!("Key {key:?} not found"),
    }
}

fn check_range(key: &str, index: usize, count: usize, len: usize) -> Result<()> {
    if index.checked_add(count).map_or(true, |end| end > len) {
        bail!("Range {index}+{count} out of bounds for {key:?} (len {len})");
    }
    Ok(())
}

/// Applies one patch to a plain view.
pub fn apply_to_view(view: &mut View, patch: &Patch) -> Result<()> {
    match patch {
        Patch::Put { key, value } => {
            view.insert(key.clone(), value.clone());
        }
        Patch::Delete { key } => {
            if view.remove(key).is_none() {
                bail!("Cannot delete missing key {key:?}");
            }
        }
        Patch::SpliceText {
            key,
            index,
            delete,
            insert,
        } => {
            let text = text_mut(view, key)?;
            let mut chars: Vec<char> = text.chars().collect();
            check_range(key, *index, *delete, chars.len())?;
            chars.splice(*index..*index + *delete, insert.chars());
            *text = chars.into_iter().collect();
        }
        Patch::ListInsert { key, index, values } => {
            let items = list_mut(view, key)?;
            check_range(key, *index, 0, items.len())?;
            items.splice(*index..*index, values.iter().cloned());
        }
        Patch::ListDelete { key, index, count } => {
            let items = list_mut(view, key)?;
            check_range(key, *index, *count, items.len())?;
            items.drain(*index..*index + *count);
        }
    }
    Ok(())
}

/// Computes the patch undoing `patch` relative to `view` (the state it applies to).
fn invert(view: &View, patch: &Patch) -> Result<Patch> {
    let inverse = match patch {
        Patch::Put { key, .. } => match view.get(key) {
            Some(prev) => Patch::Put {
                key: key.clone(),
                value: prev.clone(),
            },
            None => Patch::Delete { key: key.clone() },
        },
        Patch::Delete { key } => {
            let prev = view
                .get(key)
                .with_context(|| format!("Cannot invert delete of missing key {key:?}"))?;
            Patch::Put {
                key: key.clone(),
                value: prev.clone(),
            }
        }
        Patch::SpliceText {
            key,
            index,
            delete,
            insert,
        } => {
            let removed: String = match view.get(key) {
                Some(Value::Text(s)) => s.chars().skip(*index).take(*delete).collect(),
                _ => bail!("Cannot invert text splice on {key:?}"),
            };
            Patch::SpliceText {
                key: key.clone(),
                index: *index,
                delete: insert.chars().count(),
                insert: removed,
            }
        }
        Patch::ListInsert { key, index, values } => Patch::ListDelete {
            key: key.clone(),
            index: *index,
            count: values.len(),
        },
        Patch::ListDelete { key, index, count } => {
            let removed = match view.get(key) {
                Some(Value::List(items)) => items
                    .iter()
                    .skip(*index)
                    .take(*count)
                    .cloned()
                    .collect(),
                _ => bail!("Cannot invert list delete on {key:?}"),
            };
            Patch::ListInsert {
                key: key.clone(),
                index: *index,
                values: removed,
            }
        }
    };
    Ok(inverse)
}

/// Computes the patch list undoing `patches`, given the view they were applied to.
pub fn inverse_patches(mut view: View, patches: &[Patch]) -> Result<Vec<Patch>> {
    let mut inverses = Vec::with_capacity(patches.len());
    for patch in patches {
        inverses.push(invert(&view, patch)?);
        apply_to_view(&mut view, patch)?;
    }
    inverses.reverse();
    Ok(inverses)
}

/// Length of the common prefix and (non-overlapping) common suffix of two slices.
pub(crate) fn common_affixes<T: PartialEq>(a: &[T], b: &[T]) -> (usize, usize) {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let max_suffix = a.len().min(b.len()) - prefix;
    let suffix = a
        .iter()
        .rev()
        .zip(b.iter().rev())
        .take(max_suffix)
        .take_while(|(x, y)| x == y)
        .count();
    (prefix, suffix)
}

/// The single splice turning text `from` into text `to`, if they differ.
pub(crate) fn text_splice(key: &str, from: &str, to: &str) -> Option<Patch> {
    if from == to {
        return None;
    }
    let a: Vec<char> = from.chars().collect();
    let b: Vec<char> = to.chars().collect();
    let (prefix, suffix) = common_affixes(&a, &b);
    Some(Patch::SpliceText {
        key: key.to_string(),
        index: prefix,
        delete: a.len() - prefix - suffix,
        insert: b[prefix..b.len() - suffix].iter().collect(),
    })
}

fn list_splice(key: &str, from: &[Scalar], to: &[Scalar]) -> Vec<Patch> {
    let (prefix, suffix) = common_affixes(from, to);
    let mut patches = Vec::new();
    let removed = from.len() - prefix - suffix;
    if removed > 0 {
        patches.push(Patch::ListDelete {
            key: key.to_string(),
            index: prefix,
            count: removed,
        });
    }
    let inserted = &to[prefix..to.len() - suffix];
    if !inserted.is_empty() {
        patches.push(Patch::ListInsert {
            key: key.to_string(),
            index: prefix,
            values: inserted.to_vec(),
        });
    }
    patches
}

/// Patches transforming `from` into `to`.
pub fn diff_views(from: &View, to: &View) -> Vec<Patch> {
    let mut patches = Vec::new();
    for key in from.keys().filter(|k| !to.contains_key(*k)) {
        patches.push(Patch::Delete { key: key.clone() });
    }
    for (key, target) in to {
        match (from.get(key), target) {
            (Some(current), _) if current == target => {}
            (Some(Value::Text(a)), Value::Text(b)) => patches.extend(text_splice(key, a, b)),
            (Some(Value::List(a)), Value::List(b)) => patches.extend(list_splice(key, a, b)),
            _ => patches.push(Patch::Put {
                key: key.clone(),
                value: target.clone(),
            }),
        }
    }
    patches
}
