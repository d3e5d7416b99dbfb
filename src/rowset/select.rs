//! Select: projection, plus the aggregation, duplicate elimination and
//! ordering a select asks for.
//!
//! The pieces stack as source, then grouping (or a whole-input
//! aggregation when the display has aggregates but there are no
//! groups), then projection, then distinct, then ordering.

use std::sync::Arc;

use crate::error::Result;
use crate::query::{Context, Expr, OrderItem, Query, Row, RowColumn, Select};
use crate::transaction::Transaction;
use crate::uid::Uid;

use super::{distinct, group, ordered, Bookmark, Kind, RowSet, State};

pub(super) fn build(tr: Transaction, select: &Select, cx: &Context) -> Result<Arc<RowSet>> {
    let mut slots = Vec::new();
    let display: Vec<(Arc<str>, Expr)> = select
        .display
        .iter()
        .map(|(name, e)| (name.clone(), e.number_aggregates(&mut slots)))
        .collect();
    let order: Vec<OrderItem> = select
        .order
        .iter()
        .map(|o| OrderItem {
            expr: o.expr.number_aggregates(&mut slots),
            ascending: o.ascending,
        })
        .collect();

    let source = match &select.source {
        Query::Group {
            source,
            groups,
            having,
        } => {
            let having = having.as_ref().map(|h| h.number_aggregates(&mut slots));
            let source = super::build(tr, source, cx)?;
            group::build(source, groups, having.as_ref(), &slots, cx)?
        }
        q => {
            let source = super::build(tr, q, cx)?;
            if slots.is_empty() {
                source
            } else {
                group::build(source, &[], None, &slots, cx)?
            }
        }
    };

    let mut rs = if display.is_empty() {
        source
    } else {
        projection(source, display, cx)
    };
    if select.distinct {
        rs = distinct::build(rs)?;
    }
    ordered::build(rs, order)
}

/// Plain column references keep the source column's uid so the row can
/// still be traced to its table; computed columns get alias uids.
fn projection(source: Arc<RowSet>, display: Vec<(Arc<str>, Expr)>, cx: &Context) -> Arc<RowSet> {
    let mut alias = Uid::FIRST_ALIAS;
    let columns: Arc<[RowColumn]> = display
        .iter()
        .map(|(name, e)| {
            let uid = e.column_uid(&source.columns).unwrap_or_else(|| {
                let uid = alias;
                alias = alias.prev();
                uid
            });
            RowColumn::new(uid, name)
        })
        .collect::<Vec<_>>()
        .into();
    let display = display.into_iter().map(|(_, e)| e).collect();
    RowSet::new(
        source.tr.clone(),
        columns,
        cx.clone(),
        Kind::Select { source, display },
    )
}

pub(super) fn project(
    rs: &Arc<RowSet>,
    source: Option<Bookmark>,
    display: &[Expr],
    position: usize,
) -> Result<Option<Bookmark>> {
    let Some(b) = source else {
        return Ok(None);
    };
    let values = display
        .iter()
        .map(|e| e.eval(&rs.tr, &b.cx))
        .collect::<Result<Vec<_>>>()?;
    let row = Row::new(Arc::clone(&rs.columns), values);
    Ok(Some(Bookmark {
        rs: Arc::clone(rs),
        position,
        cx: b.cx.with_row(row.clone()),
        row,
        record: b.record,
        state: State::Source(Box::new(b)),
    }))
}
