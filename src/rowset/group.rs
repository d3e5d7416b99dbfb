//! Grouping and aggregation
//!
//! Groups are found with a [`MultiKeyIndex`] over the grouping values
//! and emitted in key order. Each group keeps the first row that formed
//! it plus one accumulator per aggregate slot. With no grouping
//! expressions the whole input is a single group, which is emitted even
//! when the input is empty.

use std::sync::Arc;

use crate::collections::{MultiKeyIndex, TreeBehaviour, TreeInfo};
use crate::error::{DbError, Result};
use crate::query::{AggregateFn, Context, Expr, Row};
use crate::transaction::Transaction;
use crate::value::Value;

use super::{Entry, Kind, RowSet};

/// Running state of one aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Count(i64),
    Sum(Value),
    Max(Value),
    Min(Value),
}

impl Accumulator {
    /// Seeded with the first row's argument.
    pub fn start(func: AggregateFn, v: Value) -> Self {
        match func {
            AggregateFn::Count => Accumulator::Count(i64::from(!v.is_null())),
            AggregateFn::Sum => Accumulator::Sum(v),
            AggregateFn::Max => Accumulator::Max(v),
            AggregateFn::Min => Accumulator::Min(v),
        }
    }

    /// Fold in one more argument. Nulls are skipped.
    pub fn add_in(&mut self, v: Value) -> Result<()> {
        if v.is_null() {
            return Ok(());
        }
        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::Sum(acc) => {
                *acc = if acc.is_null() { v } else { acc.add(&v)? };
            }
            Accumulator::Max(acc) => {
                if acc.is_null() || v > *acc {
                    *acc = v;
                }
            }
            Accumulator::Min(acc) => {
                if acc.is_null() || v < *acc {
                    *acc = v;
                }
            }
        }
        Ok(())
    }

    pub fn value(&self) -> Value {
        match self {
            Accumulator::Count(n) => Value::int(*n),
            Accumulator::Sum(v) | Accumulator::Max(v) | Accumulator::Min(v) => v.clone(),
        }
    }

    /// The aggregate over no rows at all.
    pub fn empty(func: AggregateFn) -> Value {
        match func {
            AggregateFn::Count => Value::int(0),
            _ => Value::Null,
        }
    }
}

struct Group {
    row: Row,
    cx: Context,
    accumulators: Vec<Accumulator>,
}

/// Outer levels allow duplicates, the last is unique; null is a group
/// value like any other.
fn tree_info(levels: usize) -> Vec<TreeInfo> {
    (0..levels)
        .map(|i| {
            let on_duplicate = if i + 1 < levels {
                TreeBehaviour::Allow
            } else {
                TreeBehaviour::Disallow
            };
            TreeInfo::new(on_duplicate, TreeBehaviour::Allow, true)
        })
        .collect()
}

/// Group `source` by `groups`, computing `slots`. Groups failing
/// `having` are dropped. Empty `groups` gives a single group.
pub(super) fn build(
    source: Arc<RowSet>,
    groups: &[Expr],
    having: Option<&Expr>,
    slots: &[(AggregateFn, Expr)],
    cx: &Context,
) -> Result<Arc<RowSet>> {
    let tr = &source.tr;
    let mut index = (!groups.is_empty()).then(|| MultiKeyIndex::new(tree_info(groups.len())));
    let mut found: Vec<Group> = Vec::new();

    super::for_each(&source, |b| {
        let args = slots
            .iter()
            .map(|(_, e)| e.eval(tr, &b.cx))
            .collect::<Result<Vec<_>>>()?;
        let existing = match index.as_mut() {
            Some(ix) => {
                let key = groups
                    .iter()
                    .map(|g| g.eval(tr, &b.cx))
                    .collect::<Result<Vec<_>>>()?;
                let hit = ix.lookup(&key);
                if hit.is_none() {
                    *ix = ix
                        .add(&key, found.len() as i64)
                        .map_err(|e| DbError::InvalidOperation(format!("group key: {}", e)))?;
                }
                hit.map(|i| i as usize)
            }
            None => (!found.is_empty()).then_some(0),
        };
        match existing.and_then(|i| found.get_mut(i)) {
            Some(group) => {
                for (acc, v) in group.accumulators.iter_mut().zip(args) {
                    acc.add_in(v)?;
                }
            }
            None => found.push(Group {
                row: b.row.clone(),
                cx: b.cx.clone(),
                accumulators: slots
                    .iter()
                    .zip(args)
                    .map(|((func, _), v)| Accumulator::start(*func, v))
                    .collect(),
            }),
        }
        Ok(())
    })?;

    let order: Vec<usize> = match &index {
        Some(ix) => ix.rows().into_iter().map(|i| i as usize).collect(),
        None => (0..found.len()).collect(),
    };
    let mut entries = Vec::with_capacity(order.len());
    for i in order {
        let g = &found[i];
        let values = g.accumulators.iter().map(Accumulator::value).collect();
        push_group(&mut entries, tr, g.row.clone(), g.cx.with_aggregates(values), having)?;
    }
    if groups.is_empty() && found.is_empty() {
        let row = Row::nulls(Arc::clone(&source.columns));
        let values = slots.iter().map(|(func, _)| Accumulator::empty(*func)).collect();
        let gcx = cx.with_row(row.clone()).with_aggregates(values);
        push_group(&mut entries, tr, row, gcx, having)?;
    }

    let kind = if groups.is_empty() {
        Kind::Eval(entries.into())
    } else {
        Kind::Group(entries.into())
    };
    Ok(RowSet::new(
        source.tr.clone(),
        Arc::clone(&source.columns),
        cx.clone(),
        kind,
    ))
}

fn push_group(
    entries: &mut Vec<Entry>,
    tr: &Transaction,
    row: Row,
    cx: Context,
    having: Option<&Expr>,
) -> Result<()> {
    if let Some(h) = having {
        if !h.matches(tr, &cx)? {
            return Ok(());
        }
    }
    entries.push(Entry {
        row,
        cx,
        record: None,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::table_with;
    use super::super::{build, rows};
    use super::*;
    use crate::query::{BinaryOp, Query};

    #[test]
    fn test_accumulators_skip_nulls() {
        let mut count = Accumulator::start(AggregateFn::Count, Value::Null);
        count.add_in(Value::int(4)).unwrap();
        count.add_in(Value::Null).unwrap();
        assert_eq!(count.value(), Value::int(1));

        let mut sum = Accumulator::start(AggregateFn::Sum, Value::Null);
        sum.add_in(Value::int(4)).unwrap();
        sum.add_in(Value::int(6)).unwrap();
        assert_eq!(sum.value(), Value::int(10));

        let mut max = Accumulator::start(AggregateFn::Max, Value::int(3));
        max.add_in(Value::int(9)).unwrap();
        max.add_in(Value::int(1)).unwrap();
        assert_eq!(max.value(), Value::int(9));

        let mut min = Accumulator::start(AggregateFn::Min, Value::int(3));
        min.add_in(Value::int(9)).unwrap();
        assert_eq!(min.value(), Value::int(3));
    }

    #[test]
    fn test_group_sum_in_key_order() {
        let (tr, t, k, _) = table_with("t", &[(2, "x"), (1, "x"), (1, "y"), (2, "y"), (1, "z")]);
        let (tr, n) = tr
            .add_column(t, "n", crate::value::DataType::Integer, Vec::new())
            .unwrap();
        // n := k * 10 for every row
        let rs = build(tr, &Query::table(t), &Context::new()).unwrap();
        let mut tr = rs.tr().clone();
        super::super::for_each(&rs, |b| {
            tr = b
                .update(&tr, &[(n, Expr::binary(Expr::Column(k), BinaryOp::Times, Expr::lit(10)))])?;
            Ok(())
        })
        .unwrap();

        let q = Query::table(t).group(vec![Expr::Column(k)], None).select(vec![
            ("k", Expr::Column(k)),
            ("total", Expr::aggregate(AggregateFn::Sum, Expr::Column(n))),
            ("rows", Expr::count_all()),
        ]);
        let rs = build(tr, &q, &Context::new()).unwrap();
        let got: Vec<String> = rows(&rs).unwrap().iter().map(|r| r.to_string()).collect();
        assert_eq!(got, vec!["(1,30,3)", "(2,40,2)"]);
    }

    #[test]
    fn test_having_filters_groups() {
        let (tr, t, k, _) = table_with("t", &[(1, "a"), (1, "b"), (2, "c")]);
        let having = Expr::binary(Expr::count_all(), BinaryOp::Gtr, Expr::lit(1));
        let q = Query::table(t)
            .group(vec![Expr::Column(k)], Some(having))
            .select(vec![("k", Expr::Column(k)), ("c", Expr::count_all())]);
        let rs = build(tr, &q, &Context::new()).unwrap();
        let got: Vec<String> = rows(&rs).unwrap().iter().map(|r| r.to_string()).collect();
        assert_eq!(got, vec!["(1,2)"]);
    }

    #[test]
    fn test_whole_table_aggregates_over_empty_input() {
        let (tr, t, k, _) = table_with("t", &[]);
        let q = Query::table(t).select(vec![
            ("c", Expr::count_all()),
            ("s", Expr::aggregate(AggregateFn::Sum, Expr::Column(k))),
        ]);
        let rs = build(tr, &q, &Context::new()).unwrap();
        let got = rows(&rs).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].values(), &[Value::int(0), Value::Null]);
    }

    #[test]
    fn test_whole_table_max() {
        let (tr, t, k, _) = table_with("t", &[(4, "a"), (9, "b"), (2, "c")]);
        let q = Query::table(t).select(vec![("m", Expr::aggregate(AggregateFn::Max, Expr::Column(k)))]);
        let rs = build(tr, &q, &Context::new()).unwrap();
        assert_eq!(rs.sources()[0].kind_name(), "Eval");
        assert_eq!(rows(&rs).unwrap()[0].values(), &[Value::int(9)]);
    }

    #[test]
    fn test_null_forms_its_own_group() {
        let (tr, t, k, v) = table_with("t", &[(1, "a"), (2, "a")]);
        let tr = tr.insert(t, vec![(k, Value::int(3))]).unwrap().0;
        let q = Query::table(t)
            .group(vec![Expr::Column(v)], None)
            .select(vec![("v", Expr::Column(v)), ("c", Expr::count_all())]);
        let rs = build(tr, &q, &Context::new()).unwrap();
        let got: Vec<String> = rows(&rs).unwrap().iter().map(|r| r.to_string()).collect();
        assert_eq!(got, vec!["(null,1)", "('a',2)"]);
    }
}
