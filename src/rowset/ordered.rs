//! Ordered row sets
//!
//! Materializes the source and indexes each row under its sort key. Ties
//! keep source order.

use std::sync::Arc;

use crate::collections::{MultiCursor, MultiKeyIndex, TreeInfo};
use crate::error::{DbError, Result};
use crate::query::OrderItem;

use super::{Bookmark, Entries, Entry, Kind, RowSet, State};

pub(crate) struct Ordered {
    pub(super) source: Arc<RowSet>,
    pub(super) index: MultiKeyIndex,
    entries: Entries,
}

pub(super) fn build(source: Arc<RowSet>, order: Vec<OrderItem>) -> Result<Arc<RowSet>> {
    if order.is_empty() {
        return Ok(source);
    }
    let mut index = MultiKeyIndex::new(order.iter().map(|o| TreeInfo::ordering(o.ascending)).collect());
    let mut entries = Vec::new();
    super::for_each(&source, |b| {
        let key = order
            .iter()
            .map(|o| o.expr.eval(&source.tr, &b.cx))
            .collect::<Result<Vec<_>>>()?;
        index = index
            .add(&key, entries.len() as i64)
            .map_err(|e| DbError::InvalidOperation(format!("sort key: {}", e)))?;
        entries.push(Entry {
            row: b.row.clone(),
            cx: b.cx.clone(),
            record: b.record,
        });
        Ok(())
    })?;
    Ok(RowSet::new(
        source.tr.clone(),
        Arc::clone(&source.columns),
        source.cx.clone(),
        Kind::Ordered(Ordered {
            index,
            entries: entries.into(),
            source,
        }),
    ))
}

pub(super) fn at(
    rs: &Arc<RowSet>,
    o: &Ordered,
    cursor: Option<MultiCursor>,
    position: usize,
) -> Result<Option<Bookmark>> {
    let Some(c) = cursor else {
        return Ok(None);
    };
    let entry = o
        .entries
        .get(c.value() as usize)
        .ok_or_else(|| DbError::InvalidOperation(format!("no ordered entry {}", c.value())))?;
    Ok(Some(Bookmark {
        rs: Arc::clone(rs),
        position,
        row: entry.row.clone(),
        cx: entry.cx.clone(),
        record: entry.record,
        state: State::Ordered(c),
    }))
}

/// `b` moved back to the first entry sharing its key prefix of length
/// `depth`.
pub(super) fn rewind(b: &Bookmark, depth: usize) -> Result<Option<Bookmark>> {
    let rs = &b.rs;
    match (&rs.kind, b.mb()) {
        (Kind::Ordered(o), Some(c)) => at(rs, o, Some(c.reset_to_ties_start(depth)), b.position),
        _ => Err(DbError::InvalidOperation("rewind outside an ordered row set".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::table_with;
    use super::super::{build, rows};
    use crate::query::{Context, Expr, OrderItem, Query};

    fn order(items: Vec<OrderItem>) -> Vec<String> {
        let (tr, t, _, _) = table_with("t", &[(2, "b"), (1, "z"), (3, "a"), (1, "y")]);
        let q = Query::table(t).order_by(items);
        let rs = build(tr, &q, &Context::new()).unwrap();
        assert_eq!(rs.kind_name(), "Ordered");
        rows(&rs).unwrap().iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn test_ascending_keeps_ties_in_source_order() {
        assert_eq!(
            order(vec![OrderItem::asc(Expr::name("k"))]),
            vec!["(1,'z')", "(1,'y')", "(2,'b')", "(3,'a')"]
        );
    }

    #[test]
    fn test_mixed_directions() {
        assert_eq!(
            order(vec![OrderItem::asc(Expr::name("k")), OrderItem::desc(Expr::name("v"))]),
            vec!["(1,'z')", "(1,'y')", "(2,'b')", "(3,'a')"]
        );
        assert_eq!(
            order(vec![OrderItem::desc(Expr::name("k")), OrderItem::asc(Expr::name("v"))]),
            vec!["(3,'a')", "(2,'b')", "(1,'y')", "(1,'z')"]
        );
    }
}
