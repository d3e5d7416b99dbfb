//! Joins
//!
//! Equi-joins are sort-merge joins: both sides are ordered on their join
//! expressions and walked together. A run of equal keys on the right is
//! replayed once for every matching left row by rewinding the right
//! cursor to the start of its ties. Keys containing a null never match.
//!
//! Cross joins, and joins without join expressions, are nested loops.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::Result;
use crate::query::{Context, Expr, JoinKind, OrderItem, Query, Row, RowColumn};
use crate::transaction::Transaction;
use crate::value::Value;

use super::{ordered, Bookmark, Kind, RowSet, State};

pub(crate) struct Join {
    kind: JoinKind,
    pub(super) left: Arc<RowSet>,
    pub(super) right: Arc<RowSet>,
    /// Number of join expressions.
    depth: usize,
}

#[derive(Clone)]
pub(crate) struct JoinState {
    left: Option<Bookmark>,
    right: Option<Bookmark>,
    left_matched: bool,
    right_matched: bool,
    emitted: Emitted,
}

/// What the current bookmark of the join was built from.
#[derive(Clone, Copy)]
enum Emitted {
    Both,
    Left,
    Right,
}

pub(super) fn build(
    tr: Transaction,
    kind: JoinKind,
    left: &Query,
    right: &Query,
    on: &[(Expr, Expr)],
    cx: &Context,
) -> Result<Arc<RowSet>> {
    let left = super::build(tr, left, cx)?;
    let right = super::build(left.tr.clone(), right, cx)?;
    let columns: Arc<[RowColumn]> = left
        .columns
        .iter()
        .chain(right.columns.iter())
        .cloned()
        .collect::<Vec<_>>()
        .into();
    let tr = right.tr.clone();

    if kind == JoinKind::Cross || on.is_empty() {
        let join = Join {
            kind: JoinKind::Cross,
            left,
            right,
            depth: 0,
        };
        return Ok(RowSet::new(tr, columns, cx.clone(), Kind::Join(join)));
    }

    // each pair is (left side, right side), whichever way it was written
    let (left_keys, right_keys): (Vec<OrderItem>, Vec<OrderItem>) = on
        .iter()
        .map(|(a, b)| {
            if !a.resolves_in(&left.columns) && a.resolves_in(&right.columns) {
                (OrderItem::asc(b.clone()), OrderItem::asc(a.clone()))
            } else {
                (OrderItem::asc(a.clone()), OrderItem::asc(b.clone()))
            }
        })
        .unzip();
    let join = Join {
        kind,
        left: ordered::build(left, left_keys)?,
        right: ordered::build(right, right_keys)?,
        depth: on.len(),
    };
    Ok(RowSet::new(tr, columns, cx.clone(), Kind::Join(join)))
}

pub(super) fn first(rs: &Arc<RowSet>, j: &Join) -> Result<Option<Bookmark>> {
    let left = super::first(&j.left)?;
    let right = super::first(&j.right)?;
    if j.kind == JoinKind::Cross {
        return nested(rs, j, left, right, 0);
    }
    let state = JoinState {
        left,
        right,
        left_matched: false,
        right_matched: false,
        emitted: Emitted::Both,
    };
    merge(rs, j, state, 0)
}

pub(super) fn next(
    rs: &Arc<RowSet>,
    j: &Join,
    s: &JoinState,
    position: usize,
) -> Result<Option<Bookmark>> {
    if j.kind == JoinKind::Cross {
        let right = advance(&s.right)?;
        return nested(rs, j, s.left.clone(), right, position);
    }
    let mut s = s.clone();
    match s.emitted {
        Emitted::Left => {
            s.left = advance(&s.left)?;
            s.left_matched = false;
        }
        Emitted::Right => {
            s.right = advance(&s.right)?;
            s.right_matched = false;
        }
        Emitted::Both => {
            let more_right = has_more(&s.right, j.depth);
            let more_left = has_more(&s.left, j.depth);
            if more_right {
                s.right = advance(&s.right)?;
                s.right_matched = false;
            } else if more_left {
                // replay the right ties for the next left tie
                s.left = advance(&s.left)?;
                s.left_matched = false;
                s.right = match &s.right {
                    Some(r) => ordered::rewind(r, j.depth)?,
                    None => None,
                };
            } else {
                s.left = advance(&s.left)?;
                s.right = advance(&s.right)?;
                s.left_matched = false;
                s.right_matched = false;
            }
        }
    }
    merge(rs, j, s, position)
}

fn advance(b: &Option<Bookmark>) -> Result<Option<Bookmark>> {
    match b {
        Some(b) => b.next(),
        None => Ok(None),
    }
}

fn has_more(b: &Option<Bookmark>, depth: usize) -> bool {
    b.as_ref()
        .and_then(Bookmark::mb)
        .is_some_and(|c| c.has_more(depth))
}

fn key(b: &Bookmark) -> Vec<Value> {
    b.mb().map(|c| c.key()).unwrap_or_default()
}

/// Equal keys that contain a null sort as Less so they never match.
fn compare(left: &[Value], right: &[Value]) -> Ordering {
    match left.cmp(right) {
        Ordering::Equal if left.iter().any(Value::is_null) => Ordering::Less,
        o => o,
    }
}

/// First emission from `s` on.
fn merge(
    rs: &Arc<RowSet>,
    j: &Join,
    mut s: JoinState,
    position: usize,
) -> Result<Option<Bookmark>> {
    loop {
        let order = match (&s.left, &s.right) {
            (None, None) => return Ok(None),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(l), Some(r)) => compare(&key(l), &key(r)),
        };
        match order {
            Ordering::Equal => {
                s.left_matched = true;
                s.right_matched = true;
                s.emitted = Emitted::Both;
                return Ok(Some(emit(rs, j, s, position)));
            }
            Ordering::Less => {
                if j.kind.keeps_left() && !s.left_matched {
                    s.emitted = Emitted::Left;
                    return Ok(Some(emit(rs, j, s, position)));
                }
                s.left = advance(&s.left)?;
                s.left_matched = false;
            }
            Ordering::Greater => {
                if j.kind.keeps_right() && !s.right_matched {
                    s.emitted = Emitted::Right;
                    return Ok(Some(emit(rs, j, s, position)));
                }
                s.right = advance(&s.right)?;
                s.right_matched = false;
            }
        }
    }
}

/// Next pair of a nested loop from `(left, right)` on.
fn nested(
    rs: &Arc<RowSet>,
    j: &Join,
    mut left: Option<Bookmark>,
    mut right: Option<Bookmark>,
    position: usize,
) -> Result<Option<Bookmark>> {
    loop {
        let Some(l) = left else {
            return Ok(None);
        };
        if right.is_some() {
            let state = JoinState {
                left: Some(l),
                right,
                left_matched: true,
                right_matched: true,
                emitted: Emitted::Both,
            };
            return Ok(Some(emit(rs, j, state, position)));
        }
        left = l.next()?;
        right = super::first(&j.right)?;
        if right.is_none() {
            return Ok(None);
        }
    }
}

fn emit(rs: &Arc<RowSet>, j: &Join, s: JoinState, position: usize) -> Bookmark {
    let side = |b: &Option<Bookmark>, rs: &Arc<RowSet>, include: bool| match b {
        Some(b) if include => b.row.clone(),
        _ => Row::nulls(Arc::clone(&rs.columns)),
    };
    let (with_left, with_right) = match s.emitted {
        Emitted::Both => (true, true),
        Emitted::Left => (true, false),
        Emitted::Right => (false, true),
    };
    let left = side(&s.left, &j.left, with_left);
    let right = side(&s.right, &j.right, with_right);
    let row = Row::concat(Arc::clone(&rs.columns), &left, &right);
    Bookmark::new(rs, position, row, None, State::Join(Box::new(s)))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{add_table, table_with};
    use super::super::{build, rows};
    use super::*;

    fn joined(kind: JoinKind, left: &[(i64, &str)], right: &[(i64, &str)]) -> Vec<String> {
        let (tr, a, ak, _) = table_with("a", left);
        let (tr, b, bk, _) = add_table(tr, "b", right);
        let q = Query::table(a).join(kind, Query::table(b), vec![(Expr::Column(ak), Expr::Column(bk))]);
        let rs = build(tr, &q, &Context::new()).unwrap();
        rows(&rs).unwrap().iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn test_inner_join_replays_ties() {
        let got = joined(
            JoinKind::Inner,
            &[(1, "a"), (1, "b"), (2, "c")],
            &[(1, "p"), (2, "q"), (2, "r")],
        );
        assert_eq!(
            got,
            vec!["(1,'a',1,'p')", "(1,'b',1,'p')", "(2,'c',2,'q')", "(2,'c',2,'r')"]
        );
    }

    #[test]
    fn test_ties_on_both_sides_give_the_product() {
        let got = joined(JoinKind::Inner, &[(1, "a"), (1, "b")], &[(1, "p"), (1, "q")]);
        assert_eq!(
            got,
            vec!["(1,'a',1,'p')", "(1,'a',1,'q')", "(1,'b',1,'p')", "(1,'b',1,'q')"]
        );
    }

    #[test]
    fn test_outer_joins_pad_with_nulls() {
        let left = [(1, "a"), (3, "c")];
        let right = [(2, "q"), (3, "r")];
        assert_eq!(
            joined(JoinKind::Left, &left, &right),
            vec!["(1,'a',null,null)", "(3,'c',3,'r')"]
        );
        assert_eq!(
            joined(JoinKind::Right, &left, &right),
            vec!["(null,null,2,'q')", "(3,'c',3,'r')"]
        );
        assert_eq!(
            joined(JoinKind::Full, &left, &right),
            vec!["(1,'a',null,null)", "(null,null,2,'q')", "(3,'c',3,'r')"]
        );
    }

    #[test]
    fn test_null_keys_never_match() {
        let (tr, a, ak, av) = table_with("a", &[(1, "x")]);
        let (tr, b, bk, bv) = add_table(tr, "b", &[(2, "y")]);
        let tr = tr.insert(a, vec![(ak, Value::int(5))]).unwrap().0;
        let tr = tr.insert(b, vec![(bk, Value::int(6))]).unwrap().0;
        let q = Query::table(a).join(
            JoinKind::Full,
            Query::table(b),
            vec![(Expr::Column(av), Expr::Column(bv))],
        );
        let rs = build(tr, &q, &Context::new()).unwrap();
        // the rows with a null v stay unmatched on both sides
        let got: Vec<String> = rows(&rs).unwrap().iter().map(|r| r.to_string()).collect();
        assert_eq!(
            got,
            vec![
                "(5,null,null,null)",
                "(null,null,6,null)",
                "(1,'x',null,null)",
                "(null,null,2,'y')"
            ]
        );
    }

    #[test]
    fn test_join_pairs_written_backwards() {
        let (tr, a, ak, _) = table_with("a", &[(1, "a"), (2, "b")]);
        let (tr, b, bk, _) = add_table(tr, "b", &[(2, "q")]);
        let q = Query::table(a).join(
            JoinKind::Inner,
            Query::table(b),
            vec![(Expr::Column(bk), Expr::Column(ak))],
        );
        let rs = build(tr, &q, &Context::new()).unwrap();
        let got: Vec<String> = rows(&rs).unwrap().iter().map(|r| r.to_string()).collect();
        assert_eq!(got, vec!["(2,'b',2,'q')"]);
    }

    #[test]
    fn test_cross_join_is_the_product() {
        let got = joined(JoinKind::Cross, &[(1, "a"), (2, "b")], &[(7, "x"), (8, "y")]);
        assert_eq!(
            got,
            vec!["(1,'a',7,'x')", "(1,'a',8,'y')", "(2,'b',7,'x')", "(2,'b',8,'y')"]
        );
        assert!(joined(JoinKind::Cross, &[(1, "a")], &[]).is_empty());
    }

    #[test]
    fn test_join_reads_both_tables() {
        let (tr, a, ak, _) = table_with("a", &[(1, "a")]);
        let (tr, b, bk, _) = add_table(tr, "b", &[(1, "p")]);
        let q = Query::table(a).join(JoinKind::Inner, Query::table(b), vec![(Expr::Column(ak), Expr::Column(bk))]);
        let rs = build(tr, &q, &Context::new()).unwrap();
        assert!(rs.tr().read_set().contains_key(&a));
        assert!(rs.tr().read_set().contains_key(&b));
    }
}
