//! Full table scans, in row defpos order.

use std::sync::Arc;

use crate::catalog::{Record, Table};
use crate::collections::MapCursor;
use crate::error::Result;
use crate::query::{Context, Row, RowColumn};
use crate::transaction::Transaction;
use crate::uid::Uid;

use super::{Bookmark, Kind, RowSet, State};

/// Output columns of a table, named `table.column`.
pub(super) fn columns_of(table: &Table) -> Arc<[RowColumn]> {
    table
        .ordered_columns()
        .map(|c| RowColumn::new(c.uid, &format!("{}.{}", table.name, c.name)))
        .collect::<Vec<_>>()
        .into()
}

pub(super) fn row_of(columns: &Arc<[RowColumn]>, record: &Record) -> Row {
    let values = columns.iter().map(|c| record.field(c.uid)).collect();
    Row::new(Arc::clone(columns), values)
}

pub(super) fn build(tr: Transaction, uid: Uid, cx: &Context) -> Result<Arc<RowSet>> {
    let columns = columns_of(tr.db().table(uid)?);
    let tr = tr.with_read(uid);
    Ok(RowSet::new(tr, columns, cx.clone(), Kind::Table(uid)))
}

pub(super) fn first(rs: &Arc<RowSet>, uid: Uid) -> Result<Option<Bookmark>> {
    let cursor = rs.tr.db().table(uid)?.rows.first();
    settle(rs, uid, cursor, 0)
}

pub(super) fn settle(
    rs: &Arc<RowSet>,
    uid: Uid,
    cursor: Option<MapCursor<Uid, Uid>>,
    position: usize,
) -> Result<Option<Bookmark>> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };
    let record = rs.tr.db().record(*cursor.value())?;
    let row = row_of(&rs.columns, record);
    let defpos = *cursor.key();
    Ok(Some(Bookmark::new(
        rs,
        position,
        row,
        Some((uid, defpos)),
        State::Scan(cursor),
    )))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::table_with;
    use super::super::{build, first, rows};
    use crate::query::{Context, Query};
    use crate::value::Value;

    #[test]
    fn test_scan_yields_rows_in_insertion_order() {
        let (tr, t, _, _) = table_with("t", &[(3, "c"), (1, "a"), (2, "b")]);
        let rs = build(tr, &Query::table(t), &Context::new()).unwrap();
        let keys: Vec<Value> = rows(&rs).unwrap().iter().map(|r| r.values()[0].clone()).collect();
        assert_eq!(keys, vec![Value::int(3), Value::int(1), Value::int(2)]);
    }

    #[test]
    fn test_columns_are_qualified_by_table() {
        let (tr, t, k, _) = table_with("people", &[(1, "a")]);
        let rs = build(tr, &Query::table(t), &Context::new()).unwrap();
        assert_eq!(&*rs.columns()[0].name, "people.k");
        let b = first(&rs).unwrap().unwrap();
        assert_eq!(b.get("k"), Some(&Value::int(1)));
        assert_eq!(b.record().map(|(table, _)| table), Some(t));
        assert_eq!(b.cx().column(k), Some(&Value::int(1)));
    }

    #[test]
    fn test_empty_table_has_no_first() {
        let (tr, t, _, _) = table_with("t", &[]);
        let rs = build(tr, &Query::table(t), &Context::new()).unwrap();
        assert!(first(&rs).unwrap().is_none());
    }
}
