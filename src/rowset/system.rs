//! System table rows, computed from the snapshot (or for `_Log`, from
//! the committed log up to where the transaction started).

use std::sync::Arc;

use crate::catalog::{Column, ColumnConstraint, SystemTable};
use crate::error::Result;
use crate::query::{Context, Row};
use crate::transaction::Transaction;
use crate::uid::Uid;
use crate::value::Value;

use super::{table, Entry, Kind, RowSet};

pub(super) fn build(tr: Transaction, sys: SystemTable, cx: &Context) -> Result<Arc<RowSet>> {
    let tr = tr.with_read(sys.uid());
    let db = tr.db();
    let columns = table::columns_of(db.table(sys.uid())?);
    let name_of = |uid: Uid| {
        db.role()
            .name_of(uid)
            .map_or_else(|| uid.to_string(), str::to_string)
    };

    let rows: Vec<Vec<Value>> = match sys {
        SystemTable::Log => tr
            .shared()
            .log_objects(tr.start_position())?
            .iter()
            .map(|o| {
                vec![
                    Value::from(o.uid().to_string()),
                    Value::str(o.kind_name()),
                    Value::from(o.describe(db.role())),
                ]
            })
            .collect(),
        SystemTable::Tables => db
            .tables()
            .map(|t| {
                vec![
                    Value::str(&t.name),
                    Value::int(t.columns.len() as i64),
                    Value::int(t.rows.len() as i64),
                    Value::int(t.indexes.len() as i64),
                    Value::from(t.uid.to_string()),
                ]
            })
            .collect(),
        SystemTable::Columns => db
            .tables()
            .flat_map(|t| {
                t.ordered_columns().map(|c| {
                    vec![
                        Value::str(&t.name),
                        Value::str(&c.name),
                        Value::str(c.data_type.name()),
                        Value::from(constraints(c)),
                        Value::from(c.uid.to_string()),
                    ]
                })
            })
            .collect(),
        SystemTable::Indexes => db
            .tables()
            .flat_map(|t| db.indexes_of(t))
            .map(|ix| {
                let cols: Vec<String> = ix.columns.iter().map(|c| name_of(*c)).collect();
                let references = if ix.is_foreign() {
                    Value::from(name_of(ix.references))
                } else {
                    Value::Null
                };
                vec![
                    Value::from(name_of(ix.table)),
                    Value::str(ix.kind_name()),
                    Value::from(cols.join(",")),
                    references,
                ]
            })
            .collect(),
    };

    let entries: Vec<Entry> = rows
        .into_iter()
        .map(|values| {
            let row = Row::new(Arc::clone(&columns), values);
            Entry {
                cx: cx.with_row(row.clone()),
                row,
                record: None,
            }
        })
        .collect();
    Ok(RowSet::new(tr, columns, cx.clone(), Kind::System(entries.into())))
}

fn constraints(c: &Column) -> String {
    c.constraints
        .iter()
        .map(|k| match k {
            ColumnConstraint::NotNull => "NOT NULL".to_string(),
            ColumnConstraint::Default(v) => format!("DEFAULT {}", v),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::super::test_support::table_with;
    use super::super::{build, rows};
    use crate::catalog::SystemTable;
    use crate::database_manager::SharedDatabase;
    use crate::query::{Context, Query};
    use crate::uid::Uid;
    use crate::value::Value;

    fn system(tr: crate::transaction::Transaction, sys: SystemTable) -> Vec<Vec<Value>> {
        let rs = build(tr, &Query::table(sys.uid()), &Context::new()).unwrap();
        rows(&rs).unwrap().iter().map(|r| r.values().to_vec()).collect()
    }

    #[test]
    fn test_tables_and_columns() {
        let (tr, t, k, _) = table_with("people", &[(1, "a"), (2, "b")]);
        let (tr, _) = tr.create_index(t, true, vec![k], Uid::NONE).unwrap();

        let tables = system(tr.clone(), SystemTable::Tables);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0][0], Value::str("people"));
        assert_eq!(&tables[0][1..4], &[Value::int(2), Value::int(2), Value::int(1)]);

        let columns = system(tr.clone(), SystemTable::Columns);
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0][1], Value::str("k"));
        assert_eq!(columns[0][2], Value::str("INTEGER"));
        assert_eq!(columns[0][3], Value::str("NOT NULL"));

        let indexes = system(tr, SystemTable::Indexes);
        assert_eq!(
            indexes,
            vec![vec![
                Value::str("people"),
                Value::str("PRIMARY KEY"),
                Value::str("k"),
                Value::Null
            ]]
        );
    }

    #[test]
    fn test_log_lists_committed_objects_only() {
        let shared = SharedDatabase::in_memory("syslog");
        let (tr, _) = shared.begin(false).create_table("a").unwrap();
        tr.commit().unwrap();

        let (tr, _) = shared.begin(false).create_table("b").unwrap();
        let log = system(tr, SystemTable::Log);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0][1], Value::str("Table"));
        assert_eq!(log[0][2], Value::str("a"));
    }
}
