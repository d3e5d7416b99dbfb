//! Multi-key index
//!
//! A persistent index from composite keys to row ids. Level `i` of the
//! tree is an [`OrderedMap`] keyed by the value of column `i`; each entry
//! is one of
//!
//! - `Single`: terminal, one row id (duplicates disallowed or ignored),
//! - `Partial`: terminal, a set of row ids sharing the key,
//! - `Compound`: a nested index over the remaining columns.
//!
//! Each level has its own [`TreeInfo`]: sort direction plus what to do
//! with duplicate and null keys. Updates copy only the path to the
//! affected entry, so all unchanged subtrees are shared with the previous
//! index value.

use std::cmp::Ordering;
use std::sync::Arc;

use thiserror::Error;

use super::ordered_map::{MapCursor, OrderedMap};
use crate::value::Value;

/// Policy for duplicate or null keys at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeBehaviour {
    /// Leave the index unchanged.
    Ignore,
    Allow,
    /// Fail the add.
    Disallow,
}

/// Per-level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeInfo {
    pub on_duplicate: TreeBehaviour,
    pub on_null: TreeBehaviour,
    pub ascending: bool,
}

impl TreeInfo {
    pub fn new(on_duplicate: TreeBehaviour, on_null: TreeBehaviour, ascending: bool) -> Self {
        Self {
            on_duplicate,
            on_null,
            ascending,
        }
    }

    /// Ascending level that allows both duplicates and nulls.
    pub fn ordering(ascending: bool) -> Self {
        Self::new(TreeBehaviour::Allow, TreeBehaviour::Allow, ascending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("duplicate key")]
    Duplicate,
    #[error("null key")]
    Null,
}

/// A key component carrying its column's sort direction.
#[derive(Debug, Clone)]
struct Directed {
    value: Value,
    ascending: bool,
}

impl Ord for Directed {
    fn cmp(&self, other: &Self) -> Ordering {
        let c = self.value.cmp(&other.value);
        if self.ascending {
            c
        } else {
            c.reverse()
        }
    }
}

impl PartialOrd for Directed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Directed {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Directed {}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Single(i64),
    Partial(OrderedMap<i64, ()>),
    Compound(MultiKeyIndex),
}

// ── Index ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MultiKeyIndex {
    info: Arc<[TreeInfo]>,
    outer: OrderedMap<Directed, Slot>,
    count: usize,
}

impl PartialEq for MultiKeyIndex {
    fn eq(&self, other: &Self) -> bool {
        self.info == other.info && self.count == other.count && self.outer == other.outer
    }
}

impl MultiKeyIndex {
    /// An empty index with one level per entry of `info`.
    pub fn new(info: Vec<TreeInfo>) -> Self {
        assert!(!info.is_empty(), "an index needs at least one column");
        Self {
            info: Arc::from(info),
            outer: OrderedMap::new(),
            count: 0,
        }
    }

    fn nested(&self) -> Self {
        Self {
            info: Arc::from(&self.info[1..]),
            outer: OrderedMap::new(),
            count: 0,
        }
    }

    fn directed(&self, value: Value) -> Directed {
        Directed {
            value,
            ascending: self.info[0].ascending,
        }
    }

    /// Number of (key, row) entries.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of key columns.
    pub fn depth(&self) -> usize {
        self.info.len()
    }

    /// Number of distinct values at the outermost level.
    pub fn distinct_heads(&self) -> usize {
        self.outer.len()
    }

    pub fn add(&self, key: &[Value], row: i64) -> Result<Self, KeyError> {
        let head = key.first().cloned().unwrap_or_default();
        let info = self.info[0];
        if head.is_null() {
            match info.on_null {
                TreeBehaviour::Disallow => return Err(KeyError::Null),
                TreeBehaviour::Ignore => return Ok(self.clone()),
                TreeBehaviour::Allow => {}
            }
        }
        let k = self.directed(head);
        let existing = self.outer.get(&k);
        let slot = if self.info.len() > 1 {
            let inner = match existing {
                Some(Slot::Compound(t)) => t.clone(),
                _ => self.nested(),
            };
            let rest = if key.is_empty() { key } else { &key[1..] };
            let added = inner.add(rest, row)?;
            if added.count == inner.count {
                return Ok(self.clone());
            }
            Slot::Compound(added)
        } else {
            match (existing, info.on_duplicate) {
                (Some(_), TreeBehaviour::Disallow) => return Err(KeyError::Duplicate),
                (Some(_), TreeBehaviour::Ignore) => return Ok(self.clone()),
                (Some(Slot::Partial(set)), TreeBehaviour::Allow) => {
                    if set.contains_key(&row) {
                        return Ok(self.clone());
                    }
                    Slot::Partial(set.insert(row, ()))
                }
                (Some(Slot::Single(r)), TreeBehaviour::Allow) => {
                    if *r == row {
                        return Ok(self.clone());
                    }
                    Slot::Partial(OrderedMap::new().insert(*r, ()).insert(row, ()))
                }
                (None, TreeBehaviour::Allow) => Slot::Partial(OrderedMap::new().insert(row, ())),
                _ => Slot::Single(row),
            }
        };
        Ok(Self {
            info: self.info.clone(),
            outer: self.outer.insert(k, slot),
            count: self.count + 1,
        })
    }

    /// Remove one (key, row) entry; unchanged if it is not present.
    pub fn remove(&self, key: &[Value], row: i64) -> Self {
        let k = self.directed(key.first().cloned().unwrap_or_default());
        let Some(slot) = self.outer.get(&k) else {
            return self.clone();
        };
        let replacement = match slot {
            Slot::Single(r) if *r == row => None,
            Slot::Single(_) => return self.clone(),
            Slot::Partial(set) => {
                if !set.contains_key(&row) {
                    return self.clone();
                }
                let set = set.remove(&row);
                (!set.is_empty()).then_some(Slot::Partial(set))
            }
            Slot::Compound(inner) => {
                let rest = if key.is_empty() { key } else { &key[1..] };
                let removed = inner.remove(rest, row);
                if removed.count == inner.count {
                    return self.clone();
                }
                (!removed.is_empty()).then_some(Slot::Compound(removed))
            }
        };
        let outer = match replacement {
            Some(s) => self.outer.insert(k, s),
            None => self.outer.remove(&k),
        };
        Self {
            info: self.info.clone(),
            outer,
            count: self.count - 1,
        }
    }

    /// Whether any entry has `key` as its prefix.
    pub fn contains(&self, key: &[Value]) -> bool {
        self.position_at(key).is_some()
    }

    /// First row id stored under the (partial) key.
    pub fn lookup(&self, key: &[Value]) -> Option<i64> {
        self.position_at(key).map(|c| c.value())
    }

    pub fn first(&self) -> Option<MultiCursor> {
        MultiCursor::enter(self.outer.first()?, true, false)
    }

    pub fn last(&self) -> Option<MultiCursor> {
        MultiCursor::enter(self.outer.last()?, false, false)
    }

    /// Cursor over exactly the entries whose key starts with `prefix`;
    /// iterating it stops at the end of that run.
    pub fn position_at(&self, prefix: &[Value]) -> Option<MultiCursor> {
        let Some(head) = prefix.first() else {
            return self.first();
        };
        let oc = self.outer.position_at(&self.directed(head.clone()))?;
        match oc.value() {
            Slot::Compound(t) if prefix.len() > 1 => {
                let inner = t.position_at(&prefix[1..])?;
                Some(MultiCursor {
                    outer: oc,
                    inner: Some(Box::new(inner)),
                    partial: None,
                    filtered: true,
                    changed: true,
                })
            }
            _ => MultiCursor::enter(oc, true, true),
        }
    }

    /// Unrestricted cursor at the first entry whose key prefix is `>=
    /// prefix` (forward) or the last one `<= prefix` (backward), in index
    /// order.
    pub fn seek(&self, prefix: &[Value], forward: bool) -> Option<MultiCursor> {
        let Some(head) = prefix.first() else {
            return if forward { self.first() } else { self.last() };
        };
        let k = self.directed(head.clone());
        let oc = if forward {
            self.outer.seek_ge(&k)?
        } else {
            self.outer.seek_le(&k)?
        };
        if *oc.key() == k && prefix.len() > 1 {
            if let Slot::Compound(t) = oc.value() {
                if let Some(inner) = t.seek(&prefix[1..], forward) {
                    return Some(MultiCursor {
                        outer: oc,
                        inner: Some(Box::new(inner)),
                        partial: None,
                        filtered: false,
                        changed: true,
                    });
                }
                let moved = if forward { oc.next() } else { oc.previous() }?;
                return MultiCursor::enter(moved, forward, false);
            }
        }
        MultiCursor::enter(oc, forward, false)
    }

    /// Row ids in index order.
    pub fn rows(&self) -> Vec<i64> {
        let mut out = Vec::with_capacity(self.count);
        let mut c = self.first();
        while let Some(cur) = c {
            out.push(cur.value());
            c = cur.next();
        }
        out
    }
}

// ── Cursor ───────────────────────────────────────────────────────────

/// Immutable cursor over a [`MultiKeyIndex`].
#[derive(Clone)]
pub struct MultiCursor {
    outer: MapCursor<Directed, Slot>,
    inner: Option<Box<MultiCursor>>,
    partial: Option<MapCursor<i64, ()>>,
    /// Restricted to the current outer key (see `position_at`).
    filtered: bool,
    /// The outer position moved to reach this cursor.
    changed: bool,
}

impl MultiCursor {
    fn enter(outer: MapCursor<Directed, Slot>, forward: bool, filtered: bool) -> Option<Self> {
        let (inner, partial) = match outer.value() {
            Slot::Single(_) => (None, None),
            Slot::Partial(set) => {
                let p = if forward { set.first() } else { set.last() };
                (None, Some(p?))
            }
            Slot::Compound(t) => {
                let i = if forward { t.first() } else { t.last() };
                (Some(Box::new(i?)), None)
            }
        };
        Some(Self {
            outer,
            inner,
            partial,
            filtered,
            changed: true,
        })
    }

    /// Row id at the current position.
    pub fn value(&self) -> i64 {
        match (&self.inner, &self.partial, self.outer.value()) {
            (Some(inner), _, _) => inner.value(),
            (_, Some(p), _) => *p.key(),
            (_, _, Slot::Single(r)) => *r,
            _ => unreachable!("cursor on a multi-row slot without an inner or partial cursor"),
        }
    }

    /// Full key at the current position.
    pub fn key(&self) -> Vec<Value> {
        let mut key = vec![self.outer.key().value.clone()];
        if let Some(inner) = &self.inner {
            key.extend(inner.key());
        }
        key
    }

    pub fn next(&self) -> Option<Self> {
        self.step(true)
    }

    pub fn previous(&self) -> Option<Self> {
        self.step(false)
    }

    fn step(&self, forward: bool) -> Option<Self> {
        if let Some(inner) = &self.inner {
            if let Some(moved) = inner.step(forward) {
                return Some(Self {
                    inner: Some(Box::new(moved)),
                    changed: false,
                    ..self.clone()
                });
            }
        }
        if let Some(p) = &self.partial {
            let moved = if forward { p.next() } else { p.previous() };
            if let Some(moved) = moved {
                return Some(Self {
                    partial: Some(moved),
                    changed: false,
                    ..self.clone()
                });
            }
        }
        if self.filtered {
            return None;
        }
        let outer = if forward {
            self.outer.next()
        } else {
            self.outer.previous()
        }?;
        Self::enter(outer, forward, false)
    }

    /// Whether the key prefix of length `depth` has entries after this one.
    pub fn has_more(&self, depth: usize) -> bool {
        match (&self.inner, &self.partial) {
            (Some(inner), _) if depth > 1 => inner.has_more(depth - 1),
            (Some(inner), _) => inner.next().is_some(),
            (None, Some(p)) => p.next().is_some(),
            _ => false,
        }
    }

    /// Whether reaching this cursor changed the key prefix of length `depth`.
    pub fn changed(&self, depth: usize) -> bool {
        if self.changed {
            return true;
        }
        match &self.inner {
            Some(inner) if depth > 1 => inner.changed(depth - 1),
            _ => false,
        }
    }

    /// Rewind everything below the key prefix of length `depth` to the
    /// first entry of its run, so a run of ties can be replayed.
    pub fn reset_to_ties_start(&self, depth: usize) -> Self {
        let mut out = Self {
            changed: false,
            ..self.clone()
        };
        match (self.outer.value(), &self.inner) {
            (Slot::Compound(_), Some(inner)) if depth > 1 => {
                out.inner = Some(Box::new(inner.reset_to_ties_start(depth - 1)));
            }
            (Slot::Compound(t), _) => {
                out.inner = t.first().map(Box::new);
            }
            (Slot::Partial(set), _) => {
                out.partial = set.first();
            }
            (Slot::Single(_), _) => {}
        }
        out
    }
}
