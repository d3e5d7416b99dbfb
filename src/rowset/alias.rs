//! Alias: the source's rows with every column renamed `alias.column`.

use std::sync::Arc;

use crate::error::Result;
use crate::query::{Row, RowColumn};

use super::{Bookmark, Kind, RowSet, State};

pub(super) fn build(source: Arc<RowSet>, alias: &str) -> Arc<RowSet> {
    let columns: Arc<[RowColumn]> = source
        .columns
        .iter()
        .map(|c| {
            let bare = c.name.rsplit_once('.').map_or(&*c.name, |(_, bare)| bare);
            RowColumn::new(c.uid, &format!("{}.{}", alias, bare))
        })
        .collect::<Vec<_>>()
        .into();
    RowSet::new(
        source.tr.clone(),
        columns,
        source.cx.clone(),
        Kind::Alias(source),
    )
}

pub(super) fn rename(
    rs: &Arc<RowSet>,
    source: Option<Bookmark>,
    position: usize,
) -> Result<Option<Bookmark>> {
    let Some(b) = source else {
        return Ok(None);
    };
    let row = Row::new(Arc::clone(&rs.columns), b.row.values().to_vec());
    Ok(Some(Bookmark {
        rs: Arc::clone(rs),
        position,
        cx: b.cx.with_row(row.clone()),
        row,
        record: b.record,
        state: State::Source(Box::new(b)),
    }))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::table_with;
    use super::super::{build, first};
    use crate::query::{Context, Expr, JoinKind, Query};
    use crate::value::Value;

    #[test]
    fn test_alias_renames_columns() {
        let (tr, t, _, _) = table_with("people", &[(1, "a")]);
        let rs = build(tr, &Query::table(t).alias("p"), &Context::new()).unwrap();
        let names: Vec<&str> = rs.columns().iter().map(|c| &*c.name).collect();
        assert_eq!(names, vec!["p.k", "p.v"]);
        let b = first(&rs).unwrap().unwrap();
        assert_eq!(b.get("p.k"), Some(&Value::int(1)));
        assert_eq!(b.get("v"), Some(&Value::str("a")));
    }

    #[test]
    fn test_self_join_through_aliases() {
        let (tr, t, _, _) = table_with("t", &[(1, "a"), (2, "b")]);
        let q = Query::table(t).alias("x").join(
            JoinKind::Inner,
            Query::table(t).alias("y"),
            vec![(Expr::name("x.k"), Expr::name("y.k"))],
        );
        let rs = build(tr, &q, &Context::new()).unwrap();
        let b = first(&rs).unwrap().unwrap();
        assert_eq!(b.get("x.v"), Some(&Value::str("a")));
        assert_eq!(b.get("y.v"), Some(&Value::str("a")));
        assert_eq!(b.next().unwrap().unwrap().get("y.k"), Some(&Value::int(2)));
    }
}
