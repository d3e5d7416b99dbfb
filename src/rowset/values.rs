//! Literal row lists.

use std::sync::Arc;

use crate::error::{DbError, Result};
use crate::query::{Context, Expr, Row, RowColumn};
use crate::transaction::Transaction;
use crate::uid::Uid;

use super::{Entry, Kind, RowSet};

pub(super) fn build(
    tr: Transaction,
    names: &[Arc<str>],
    rows: &[Vec<Expr>],
    cx: &Context,
) -> Result<Arc<RowSet>> {
    let columns: Arc<[RowColumn]> = names
        .iter()
        .enumerate()
        .map(|(i, name)| RowColumn::new(Uid::new(Uid::FIRST_ALIAS.raw() - i as i64), name))
        .collect::<Vec<_>>()
        .into();
    let mut entries = Vec::with_capacity(rows.len());
    for exprs in rows {
        if exprs.len() != columns.len() {
            return Err(DbError::InvalidOperation(format!(
                "row has {} values for {} columns",
                exprs.len(),
                columns.len()
            )));
        }
        let values = exprs
            .iter()
            .map(|e| e.eval(&tr, cx))
            .collect::<Result<Vec<_>>>()?;
        let row = Row::new(Arc::clone(&columns), values);
        entries.push(Entry {
            cx: cx.with_row(row.clone()),
            row,
            record: None,
        });
    }
    Ok(RowSet::new(tr, columns, cx.clone(), Kind::Values(entries.into())))
}
