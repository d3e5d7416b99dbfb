//! Index scans
//!
//! Walks one index of a table from a start key: a prefix of equality
//! values, optionally followed by a range bound on the next column. The
//! full search predicate is still applied to every row the index yields.

use std::sync::Arc;

use crate::collections::{MultiCursor, MultiKeyIndex};
use crate::error::Result;
use crate::query::{BinaryOp, Context, Expr};
use crate::transaction::Transaction;
use crate::uid::Uid;
use crate::value::Value;

use super::{table, Bookmark, Kind, RowSet, State};

pub(crate) struct IndexScan {
    pub(super) table: Uid,
    pub(super) index: Uid,
    /// Values for the leading index columns.
    pub(super) prefix: Vec<Value>,
    /// Bound on the column after the prefix.
    pub(super) range: Option<(BinaryOp, Value)>,
    pub(super) predicate: Expr,
}

impl IndexScan {
    /// Lss and Leq walk the index backwards from their bound.
    fn forward(&self) -> bool {
        !matches!(self.range, Some((BinaryOp::Lss | BinaryOp::Leq, _)))
    }

    fn start(&self, tree: &MultiKeyIndex) -> Option<MultiCursor> {
        match &self.range {
            None if self.prefix.is_empty() => tree.first(),
            None => tree.position_at(&self.prefix),
            Some((_, bound)) => {
                let mut key = self.prefix.clone();
                key.push(bound.clone());
                tree.seek(&key, self.forward())
            }
        }
    }

    pub(super) fn step(&self, c: &MultiCursor) -> Option<MultiCursor> {
        if self.forward() {
            c.next()
        } else {
            c.previous()
        }
    }

    /// The walk has left the run of keys starting with the prefix.
    fn exhausted(&self, key: &[Value]) -> bool {
        key.len() < self.prefix.len() || key[..self.prefix.len()] != self.prefix[..]
    }

    /// Strict bounds skip keys equal to the bound.
    fn skips(&self, key: &[Value]) -> bool {
        match &self.range {
            Some((BinaryOp::Gtr | BinaryOp::Lss, bound)) => key.get(self.prefix.len()) == Some(bound),
            _ => false,
        }
    }
}

pub(super) fn build(tr: Transaction, scan: IndexScan, cx: &Context) -> Result<Arc<RowSet>> {
    let db = tr.db();
    let index = db.index(scan.index)?;
    let columns = table::columns_of(db.table(scan.table)?);
    // a unique full-key probe depends on one row only
    let single = (scan.range.is_none()
        && index.is_unique()
        && scan.prefix.len() == index.columns.len())
    .then(|| index.rows.lookup(&scan.prefix))
    .flatten()
    .map(Uid::new);
    let tr = tr.with_read(single.unwrap_or(scan.table));
    Ok(RowSet::new(tr, columns, cx.clone(), Kind::Index(scan)))
}

pub(super) fn first(rs: &Arc<RowSet>, scan: &IndexScan) -> Result<Option<Bookmark>> {
    let start = scan.start(&rs.tr.db().index(scan.index)?.rows);
    settle(rs, scan, start, 0)
}

/// Bookmark at the first qualifying entry from `cursor` on.
pub(super) fn settle(
    rs: &Arc<RowSet>,
    scan: &IndexScan,
    mut cursor: Option<MultiCursor>,
    position: usize,
) -> Result<Option<Bookmark>> {
    let db = rs.tr.db();
    while let Some(c) = cursor {
        let key = c.key();
        if scan.exhausted(&key) {
            return Ok(None);
        }
        let next = scan.step(&c);
        if !scan.skips(&key) {
            let defpos = Uid::new(c.value());
            let row = table::row_of(&rs.columns, db.row(scan.table, defpos)?);
            let b = Bookmark::new(rs, position, row, Some((scan.table, defpos)), State::Index(c));
            if scan.predicate.matches(&rs.tr, &b.cx)? {
                return Ok(Some(b));
            }
        }
        cursor = next;
    }
    Ok(None)
}
