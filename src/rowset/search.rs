//! Searches
//!
//! A search over a base table looks for an index that can deliver the
//! qualifying rows directly: the index whose leading columns are pinned
//! by the most `column = constant` conjuncts, preferring one that can
//! also use a range bound on the next column. Without a usable index,
//! or over anything but a base table, the source is filtered row by row.

use std::sync::Arc;

use crate::error::Result;
use crate::query::{BinaryOp, Context, Expr, Query, UnaryOp};
use crate::transaction::Transaction;
use crate::uid::Uid;
use crate::value::Value;

use super::index::{self, IndexScan};
use super::{table, Bookmark, Kind, RowSet, State};

pub(super) fn build(
    tr: Transaction,
    source: &Query,
    predicate: &Expr,
    cx: &Context,
) -> Result<Arc<RowSet>> {
    if let Query::Table(uid) = source {
        if !uid.is_system() && tr.db().table(*uid).is_ok() {
            if let Some(scan) = choose_index(&tr, *uid, predicate, cx)? {
                return index::build(tr, scan, cx);
            }
        }
    }
    let source = super::build(tr, source, cx)?;
    Ok(RowSet::new(
        source.tr.clone(),
        Arc::clone(&source.columns),
        cx.clone(),
        Kind::Filter {
            source,
            predicate: predicate.clone(),
        },
    ))
}

/// First bookmark from `source` on whose row satisfies the predicate.
pub(super) fn filter(
    rs: &Arc<RowSet>,
    mut source: Option<Bookmark>,
    predicate: &Expr,
    position: usize,
) -> Result<Option<Bookmark>> {
    while let Some(b) = source {
        if predicate.matches(&rs.tr, &b.cx)? {
            return Ok(Some(Bookmark {
                rs: Arc::clone(rs),
                position,
                row: b.row.clone(),
                cx: b.cx.clone(),
                record: b.record,
                state: State::Source(Box::new(b)),
            }));
        }
        source = b.next()?;
    }
    Ok(None)
}

/// Expressions that don't depend on the row.
fn is_constant(e: &Expr) -> bool {
    match e {
        Expr::Literal(_) | Expr::Arg(_) => true,
        Expr::Unary(UnaryOp::Minus, inner) => is_constant(inner),
        _ => false,
    }
}

/// `(column, op, value)` for each conjunct comparing a column of the
/// table with a constant, normalized so the column is on the left.
fn comparisons(
    tr: &Transaction,
    table: Uid,
    predicate: &Expr,
    cx: &Context,
) -> Result<Vec<(Uid, BinaryOp, Value)>> {
    let columns = table::columns_of(tr.db().table(table)?);
    let mut out = Vec::new();
    for conjunct in predicate.conjuncts() {
        let Expr::Binary(l, op, r) = conjunct else {
            continue;
        };
        if !op.is_comparison() || *op == BinaryOp::NotEql {
            continue;
        }
        let (column, op, constant) = match (l.column_uid(&columns), r.column_uid(&columns)) {
            (Some(c), None) if is_constant(r) => (c, *op, r),
            (None, Some(c)) if is_constant(l) => (c, op.reverse(), l),
            _ => continue,
        };
        let value = constant.eval(tr, cx)?;
        if !value.is_null() {
            out.push((column, op, value));
        }
    }
    Ok(out)
}

fn choose_index(
    tr: &Transaction,
    table: Uid,
    predicate: &Expr,
    cx: &Context,
) -> Result<Option<IndexScan>> {
    let terms = comparisons(tr, table, predicate, cx)?;
    if terms.is_empty() {
        return Ok(None);
    }
    let db = tr.db();
    let t = db.table(table)?;
    let mut best: Option<((usize, bool), IndexScan)> = None;
    for index in db.indexes_of(t) {
        let mut prefix = Vec::new();
        for column in index.columns.iter() {
            match terms
                .iter()
                .find(|(c, op, _)| c == column && *op == BinaryOp::Eql)
            {
                Some((_, _, v)) => prefix.push(v.clone()),
                None => break,
            }
        }
        let range = index.columns.get(prefix.len()).and_then(|column| {
            terms
                .iter()
                .find(|(c, op, _)| {
                    c == column
                        && matches!(op, BinaryOp::Lss | BinaryOp::Leq | BinaryOp::Gtr | BinaryOp::Geq)
                })
                .map(|(_, op, v)| (*op, v.clone()))
        });
        if prefix.is_empty() && range.is_none() {
            continue;
        }
        let score = (prefix.len(), range.is_some());
        if best.as_ref().map_or(true, |(s, _)| score > *s) {
            best = Some((
                score,
                IndexScan {
                    table,
                    index: index.uid,
                    prefix,
                    range,
                    predicate: predicate.clone(),
                },
            ));
        }
    }
    Ok(best.map(|(_, scan)| scan))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::table_with;
    use super::super::{build, first, rows};
    use super::*;

    fn keys(rs: &Arc<RowSet>) -> Vec<i64> {
        rows(rs)
            .unwrap()
            .iter()
            .filter_map(|r| r.values()[0].as_i64())
            .collect()
    }

    fn gt(column: Uid, op: BinaryOp, v: i64) -> Expr {
        Expr::binary(Expr::Column(column), op, Expr::lit(v))
    }

    #[test]
    fn test_without_index_filters_the_scan() {
        let (tr, t, k, _) = table_with("t", &[(1, "a"), (2, "b"), (3, "c")]);
        let rs = build(tr, &Query::table(t).search(gt(k, BinaryOp::Geq, 2)), &Context::new()).unwrap();
        assert_eq!(rs.kind_name(), "Search");
        assert_eq!(keys(&rs), vec![2, 3]);
    }

    #[test]
    fn test_equality_uses_primary_key() {
        let (tr, t, k, _) = table_with("t", &[(1, "a"), (2, "b"), (3, "c")]);
        let (tr, pk) = tr.create_index(t, true, vec![k], Uid::NONE).unwrap();
        let rs = build(tr, &Query::table(t).search(gt(k, BinaryOp::Eql, 2)), &Context::new()).unwrap();
        assert_eq!(rs.index(), Some(pk));
        assert_eq!(keys(&rs), vec![2]);
        // a unique probe reads just the one row
        assert!(!rs.tr().read_set().contains_key(&t));
        assert_eq!(rs.tr().read_set().len(), 1);
    }

    #[test]
    fn test_literal_on_the_left_is_reversed() {
        let (tr, t, k, _) = table_with("t", &[(1, "a"), (2, "b"), (3, "c")]);
        let (tr, pk) = tr.create_index(t, true, vec![k], Uid::NONE).unwrap();
        // 2 < k
        let p = Expr::binary(Expr::lit(2), BinaryOp::Lss, Expr::Column(k));
        let rs = build(tr, &Query::table(t).search(p), &Context::new()).unwrap();
        assert_eq!(rs.index(), Some(pk));
        assert_eq!(keys(&rs), vec![3]);
    }

    #[test]
    fn test_range_bounds() {
        let rows_in: Vec<(i64, &str)> = (1..=6).map(|i| (i, "x")).collect();
        let (tr, t, k, _) = table_with("t", &rows_in);
        let (tr, _) = tr.create_index(t, true, vec![k], Uid::NONE).unwrap();
        let run = |op, v| {
            let rs = build(tr.clone(), &Query::table(t).search(gt(k, op, v)), &Context::new()).unwrap();
            assert!(rs.index().is_some());
            keys(&rs)
        };
        assert_eq!(run(BinaryOp::Gtr, 4), vec![5, 6]);
        assert_eq!(run(BinaryOp::Geq, 4), vec![4, 5, 6]);
        // backward bounds walk down from the bound
        assert_eq!(run(BinaryOp::Lss, 3), vec![2, 1]);
        assert_eq!(run(BinaryOp::Leq, 3), vec![3, 2, 1]);
        assert_eq!(run(BinaryOp::Gtr, 6), Vec::<i64>::new());
    }

    #[test]
    fn test_residual_conjuncts_still_apply() {
        let (tr, t, k, v) = table_with("t", &[(1, "a"), (2, "b"), (3, "a")]);
        let (tr, _) = tr.create_index(t, true, vec![k], Uid::NONE).unwrap();
        let p = gt(k, BinaryOp::Geq, 2).and(Expr::eql(Expr::Column(v), Expr::lit("a")));
        let rs = build(tr, &Query::table(t).search(p), &Context::new()).unwrap();
        assert!(rs.index().is_some());
        assert_eq!(keys(&rs), vec![3]);
    }

    #[test]
    fn test_missing_key_reads_the_table() {
        let (tr, t, k, _) = table_with("t", &[(1, "a")]);
        let (tr, _) = tr.create_index(t, true, vec![k], Uid::NONE).unwrap();
        let rs = build(tr, &Query::table(t).search(gt(k, BinaryOp::Eql, 9)), &Context::new()).unwrap();
        assert!(first(&rs).unwrap().is_none());
        assert!(rs.tr().read_set().contains_key(&t));
    }

    #[test]
    fn test_argument_as_constant() {
        let (tr, t, k, _) = table_with("t", &[(1, "a"), (2, "b")]);
        let (tr, pk) = tr.create_index(t, true, vec![k], Uid::NONE).unwrap();
        let p = Expr::eql(Expr::Column(k), Expr::Arg(0));
        let cx = Context::with_args(vec![Value::int(1)]);
        let rs = build(tr, &Query::table(t).search(p), &cx).unwrap();
        assert_eq!(rs.index(), Some(pk));
        assert_eq!(keys(&rs), vec![1]);
    }
}
