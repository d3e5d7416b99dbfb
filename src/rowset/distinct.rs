//! Duplicate elimination. The first occurrence of each row wins and
//! source order is kept.

use std::sync::Arc;

use crate::collections::OrderedMap;
use crate::error::Result;
use crate::value::Value;

use super::{Entry, Kind, RowSet};

pub(super) fn build(source: Arc<RowSet>) -> Result<Arc<RowSet>> {
    let mut seen: OrderedMap<Vec<Value>, ()> = OrderedMap::new();
    let mut entries = Vec::new();
    super::for_each(&source, |b| {
        let key = b.row.values().to_vec();
        if !seen.contains_key(&key) {
            seen = seen.insert(key, ());
            entries.push(Entry {
                row: b.row.clone(),
                cx: b.cx.clone(),
                record: None,
            });
        }
        Ok(())
    })?;
    Ok(RowSet::new(
        source.tr.clone(),
        Arc::clone(&source.columns),
        source.cx.clone(),
        Kind::Distinct(entries.into()),
    ))
}

#[cfg(test)]
mod tests {
    use super::super::{build, rows};
    use crate::database_manager::SharedDatabase;
    use crate::query::{Context, Expr, Query};
    use crate::value::Value;

    #[test]
    fn test_first_occurrence_wins() {
        let tr = SharedDatabase::in_memory("distinct").begin(false);
        let q = Query::Values {
            columns: vec!["a".into(), "b".into()],
            rows: [(2, "x"), (1, "y"), (2, "x"), (1, "z"), (1, "y")]
                .iter()
                .map(|(a, b)| vec![Expr::lit(*a), Expr::lit(*b)])
                .collect(),
        }
        .distinct();
        let rs = build(tr, &q, &Context::new()).unwrap();
        assert_eq!(rs.kind_name(), "Distinct");
        let got: Vec<Vec<Value>> = rows(&rs).unwrap().iter().map(|r| r.values().to_vec()).collect();
        assert_eq!(
            got,
            vec![
                vec![Value::int(2), Value::str("x")],
                vec![Value::int(1), Value::str("y")],
                vec![Value::int(1), Value::str("z")],
            ]
        );
    }
}
