//! Persistent ordered map
//!
//! An immutable height-balanced binary tree. `insert` and `remove`
//! rebuild only the path from the root to the affected node and return a
//! new map; every other subtree is shared by reference with the map they
//! were called on. Old and new maps stay valid and can be used from any
//! thread.
//!
//! Nodes carry subtree sizes, so cursors know their ordinal position and
//! `len` is O(1).

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

type Link<K, V> = Option<Arc<Node<K, V>>>;

pub(crate) struct Node<K, V> {
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
    height: u8,
    size: usize,
}

fn height<K, V>(link: &Link<K, V>) -> u8 {
    link.as_ref().map_or(0, |n| n.height)
}

fn size<K, V>(link: &Link<K, V>) -> usize {
    link.as_ref().map_or(0, |n| n.size)
}

fn make<K, V>(key: K, value: V, left: Link<K, V>, right: Link<K, V>) -> Arc<Node<K, V>> {
    Arc::new(Node {
        height: height(&left).max(height(&right)) + 1,
        size: size(&left) + size(&right) + 1,
        key,
        value,
        left,
        right,
    })
}

/// Rebuild a node whose children differ in height by at most two.
fn balance<K: Clone, V: Clone>(
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
) -> Arc<Node<K, V>> {
    let (hl, hr) = (height(&left), height(&right));
    if hl > hr + 1 {
        if let Some(l) = left.as_ref() {
            if height(&l.left) >= height(&l.right) {
                return make(
                    l.key.clone(),
                    l.value.clone(),
                    l.left.clone(),
                    Some(make(key, value, l.right.clone(), right)),
                );
            }
            if let Some(lr) = l.right.as_ref() {
                return make(
                    lr.key.clone(),
                    lr.value.clone(),
                    Some(make(l.key.clone(), l.value.clone(), l.left.clone(), lr.left.clone())),
                    Some(make(key, value, lr.right.clone(), right)),
                );
            }
        }
    } else if hr > hl + 1 {
        if let Some(r) = right.as_ref() {
            if height(&r.right) >= height(&r.left) {
                return make(
                    r.key.clone(),
                    r.value.clone(),
                    Some(make(key, value, left, r.left.clone())),
                    r.right.clone(),
                );
            }
            if let Some(rl) = r.left.as_ref() {
                return make(
                    rl.key.clone(),
                    rl.value.clone(),
                    Some(make(key, value, left, rl.left.clone())),
                    Some(make(r.key.clone(), r.value.clone(), rl.right.clone(), r.right.clone())),
                );
            }
        }
    }
    make(key, value, left, right)
}

fn insert_at<K: Ord + Clone, V: Clone>(link: &Link<K, V>, key: K, value: V) -> Arc<Node<K, V>> {
    match link {
        None => make(key, value, None, None),
        Some(n) => match key.cmp(&n.key) {
            Ordering::Less => balance(
                n.key.clone(),
                n.value.clone(),
                Some(insert_at(&n.left, key, value)),
                n.right.clone(),
            ),
            Ordering::Greater => balance(
                n.key.clone(),
                n.value.clone(),
                n.left.clone(),
                Some(insert_at(&n.right, key, value)),
            ),
            Ordering::Equal => make(key, value, n.left.clone(), n.right.clone()),
        },
    }
}

fn remove_min<K: Clone, V: Clone>(n: &Arc<Node<K, V>>) -> (K, V, Link<K, V>) {
    match &n.left {
        None => (n.key.clone(), n.value.clone(), n.right.clone()),
        Some(l) => {
            let (k, v, rest) = remove_min(l);
            (k, v, Some(balance(n.key.clone(), n.value.clone(), rest, n.right.clone())))
        }
    }
}

/// `None` when the key is absent, so the caller can keep the old root.
fn remove_at<K: Ord + Clone, V: Clone>(link: &Link<K, V>, key: &K) -> Option<Link<K, V>> {
    let n = link.as_ref()?;
    match key.cmp(&n.key) {
        Ordering::Less => {
            let left = remove_at(&n.left, key)?;
            Some(Some(balance(n.key.clone(), n.value.clone(), left, n.right.clone())))
        }
        Ordering::Greater => {
            let right = remove_at(&n.right, key)?;
            Some(Some(balance(n.key.clone(), n.value.clone(), n.left.clone(), right)))
        }
        Ordering::Equal => Some(match (&n.left, &n.right) {
            (None, r) => r.clone(),
            (l, None) => l.clone(),
            (l, Some(r)) => {
                let (k, v, rest) = remove_min(r);
                Some(balance(k, v, l.clone(), rest))
            }
        }),
    }
}

// ── Map ──────────────────────────────────────────────────────────────

pub struct OrderedMap<K, V> {
    root: Link<K, V>,
}

impl<K, V> Clone for OrderedMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
        }
    }
}

impl<K, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self { root: None }
    }
}

impl<K: Ord + Clone, V: Clone> OrderedMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        size(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let mut link = &self.root;
        while let Some(n) = link {
            match key.cmp(&n.key) {
                Ordering::Less => link = &n.left,
                Ordering::Greater => link = &n.right,
                Ordering::Equal => return Some(&n.value),
            }
        }
        None
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// New map with `key` bound to `value`, replacing any previous binding.
    pub fn insert(&self, key: K, value: V) -> Self {
        Self {
            root: Some(insert_at(&self.root, key, value)),
        }
    }

    /// New map without `key`; a clone of `self` if the key is absent.
    pub fn remove(&self, key: &K) -> Self {
        match remove_at(&self.root, key) {
            Some(root) => Self { root },
            None => self.clone(),
        }
    }

    pub fn first(&self) -> Option<MapCursor<K, V>> {
        let mut stack = Vec::new();
        let mut link = self.root.clone();
        while let Some(n) = link {
            link = n.left.clone();
            stack.push(n);
        }
        (!stack.is_empty()).then_some(MapCursor { stack, position: 0 })
    }

    pub fn last(&self) -> Option<MapCursor<K, V>> {
        let mut stack = Vec::new();
        let mut link = self.root.clone();
        while let Some(n) = link {
            link = n.right.clone();
            stack.push(n);
        }
        if stack.is_empty() {
            return None;
        }
        Some(MapCursor {
            stack,
            position: self.len() - 1,
        })
    }

    /// Cursor at the first key `>= key`.
    pub fn seek_ge(&self, key: &K) -> Option<MapCursor<K, V>> {
        let mut stack = Vec::new();
        let mut best = 0;
        let mut below = 0;
        let mut link = self.root.clone();
        while let Some(n) = link {
            let go_left = n.key >= *key;
            if !go_left {
                below += size(&n.left) + 1;
            }
            link = if go_left { n.left.clone() } else { n.right.clone() };
            stack.push(n);
            if go_left {
                best = stack.len();
            }
        }
        if best == 0 {
            return None;
        }
        stack.truncate(best);
        Some(MapCursor {
            stack,
            position: below,
        })
    }

    /// Cursor at the last key `<= key`.
    pub fn seek_le(&self, key: &K) -> Option<MapCursor<K, V>> {
        let mut stack = Vec::new();
        let mut best = 0;
        let mut upto = 0;
        let mut link = self.root.clone();
        while let Some(n) = link {
            let go_right = n.key <= *key;
            if go_right {
                upto += size(&n.left) + 1;
            }
            link = if go_right { n.right.clone() } else { n.left.clone() };
            stack.push(n);
            if go_right {
                best = stack.len();
            }
        }
        if best == 0 {
            return None;
        }
        stack.truncate(best);
        Some(MapCursor {
            stack,
            position: upto - 1,
        })
    }

    /// Cursor at exactly `key`.
    pub fn position_at(&self, key: &K) -> Option<MapCursor<K, V>> {
        self.seek_ge(key).filter(|c| c.key() == key)
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut it = Iter { stack: Vec::new() };
        it.descend(self.root.as_deref());
        it
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    /// True if both maps hold the very same root node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn root_children(&self) -> (Option<Arc<Node<K, V>>>, Option<Arc<Node<K, V>>>) {
        match &self.root {
            Some(n) => (n.left.clone(), n.right.clone()),
            None => (None, None),
        }
    }

    #[cfg(test)]
    pub(crate) fn height(&self) -> u8 {
        height(&self.root)
    }
}

impl<K: Ord + Clone, V: Clone> FromIterator<(K, V)> for OrderedMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(OrderedMap::new(), |m, (k, v)| m.insert(k, v))
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq> PartialEq for OrderedMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: Ord + Clone + fmt::Debug, V: Clone + fmt::Debug> fmt::Debug for OrderedMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

pub struct Iter<'a, K, V> {
    stack: Vec<&'a Node<K, V>>,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn descend(&mut self, mut node: Option<&'a Node<K, V>>) {
        while let Some(n) = node {
            self.stack.push(n);
            node = n.left.as_deref();
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.stack.pop()?;
        self.descend(n.right.as_deref());
        Some((&n.key, &n.value))
    }
}

// ── Cursor ───────────────────────────────────────────────────────────

/// Immutable position in an [`OrderedMap`]. Moving returns a new cursor;
/// the map it came from is kept alive by the cursor.
pub struct MapCursor<K, V> {
    /// Root-to-current path; the current node is last.
    stack: Vec<Arc<Node<K, V>>>,
    position: usize,
}

impl<K, V> Clone for MapCursor<K, V> {
    fn clone(&self) -> Self {
        Self {
            stack: self.stack.clone(),
            position: self.position,
        }
    }
}

impl<K, V> MapCursor<K, V> {
    fn current(&self) -> &Node<K, V> {
        // stack is never empty for a live cursor
        &self.stack[self.stack.len() - 1]
    }

    pub fn key(&self) -> &K {
        &self.current().key
    }

    pub fn value(&self) -> &V {
        &self.current().value
    }

    /// Zero-based ordinal of the current entry.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn next(&self) -> Option<Self> {
        let mut stack = self.stack.clone();
        let top = stack.last()?;
        if let Some(r) = top.right.clone() {
            let mut link = Some(r);
            while let Some(n) = link {
                link = n.left.clone();
                stack.push(n);
            }
        } else {
            loop {
                let child = stack.pop()?;
                let parent = stack.last()?;
                if parent
                    .left
                    .as_ref()
                    .is_some_and(|l| Arc::ptr_eq(l, &child))
                {
                    break;
                }
            }
        }
        Some(Self {
            stack,
            position: self.position + 1,
        })
    }

    pub fn previous(&self) -> Option<Self> {
        let mut stack = self.stack.clone();
        let top = stack.last()?;
        if let Some(l) = top.left.clone() {
            let mut link = Some(l);
            while let Some(n) = link {
                link = n.right.clone();
                stack.push(n);
            }
        } else {
            loop {
                let child = stack.pop()?;
                let parent = stack.last()?;
                if parent
                    .right
                    .as_ref()
                    .is_some_and(|r| Arc::ptr_eq(r, &child))
                {
                    break;
                }
            }
        }
        Some(Self {
            stack,
            position: self.position.checked_sub(1)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_of(keys: &[i64]) -> OrderedMap<i64, i64> {
        keys.iter().map(|&k| (k, k * 10)).collect()
    }

    // ========================================================================
    // Insert / remove
    // ========================================================================

    #[test]
    fn test_insert_keeps_original() {
        let a = map_of(&[1, 2, 3]);
        let b = a.insert(4, 40);

        assert_eq!(a.len(), 3);
        assert_eq!(b.len(), 4);
        assert!(a.get(&4).is_none());
        assert_eq!(b.get(&4), Some(&40));
    }

    #[test]
    fn test_insert_replaces_value() {
        let a = map_of(&[1, 2]);
        let b = a.insert(2, 99);
        assert_eq!(b.len(), 2);
        assert_eq!(b.get(&2), Some(&99));
        assert_eq!(a.get(&2), Some(&20));
    }

    #[test]
    fn test_remove_absent_shares_root() {
        let a = map_of(&[5, 1, 9]);
        let b = a.remove(&4);
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn test_remove_every_key() {
        let keys: Vec<i64> = (0..200).map(|i| (i * 37) % 200).collect();
        let mut m = map_of(&keys);
        for k in 0..200 {
            m = m.remove(&k);
            assert!(!m.contains_key(&k));
            assert_eq!(m.len(), 199 - k as usize);
        }
        assert!(m.is_empty());
    }

    #[test]
    fn test_stays_balanced() {
        let m = map_of(&(0..1024).collect::<Vec<_>>());
        // AVL height bound: 1.44 * log2(n + 2)
        assert!(m.height() <= 15, "height {}", m.height());
    }

    #[test]
    fn test_untouched_subtree_is_shared() {
        let a = map_of(&(0..64).collect::<Vec<_>>());
        let b = a.insert(-1, 0);
        let (_, a_right) = a.root_children();
        let (_, b_right) = b.root_children();
        assert!(Arc::ptr_eq(&a_right.unwrap(), &b_right.unwrap()));
    }

    // ========================================================================
    // Cursors
    // ========================================================================

    #[test]
    fn test_cursor_walks_in_order() {
        let m = map_of(&[8, 3, 5, 1, 9, 7]);
        let mut keys = Vec::new();
        let mut c = m.first();
        while let Some(cur) = c {
            keys.push((*cur.key(), cur.position()));
            c = cur.next();
        }
        assert_eq!(keys, vec![(1, 0), (3, 1), (5, 2), (7, 3), (8, 4), (9, 5)]);
    }

    #[test]
    fn test_cursor_walks_backwards() {
        let m = map_of(&[4, 2, 6]);
        let mut keys = Vec::new();
        let mut c = m.last();
        while let Some(cur) = c {
            keys.push(*cur.key());
            c = cur.previous();
        }
        assert_eq!(keys, vec![6, 4, 2]);
    }

    #[test]
    fn test_seek_bounds() {
        let m = map_of(&[10, 20, 30, 40]);

        let ge = m.seek_ge(&25).unwrap();
        assert_eq!((*ge.key(), ge.position()), (30, 2));
        assert_eq!(*m.seek_ge(&20).unwrap().key(), 20);
        assert!(m.seek_ge(&41).is_none());

        let le = m.seek_le(&25).unwrap();
        assert_eq!((*le.key(), le.position()), (20, 1));
        assert!(m.seek_le(&9).is_none());

        assert!(m.position_at(&25).is_none());
        assert_eq!(m.position_at(&40).unwrap().position(), 3);
    }

    #[test]
    fn test_cursor_outlives_map() {
        let c = {
            let m = map_of(&[1, 2]);
            m.first().unwrap()
        };
        assert_eq!(*c.next().unwrap().value(), 20);
    }

    #[test]
    fn test_value_equality_ignores_shape() {
        let a = map_of(&[1, 2, 3, 4, 5]);
        let b = map_of(&[5, 4, 3, 2, 1]);
        assert_eq!(a, b);
        assert_ne!(a, b.remove(&3));
    }
}
