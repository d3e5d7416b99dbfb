//! Statements
//!
//! The name-resolving layer over [`Transaction`] and the row sets.
//! Statements refer to tables and columns by name; [`Statement::obey`]
//! resolves the names against the transaction's snapshot and returns the
//! transaction that results, plus the rows for a select.

use std::sync::Arc;

use crate::catalog::ColumnConstraint;
use crate::error::{DbError, Result};
use crate::rowset::{self, RowSet};
use crate::transaction::Transaction;
use crate::uid::Uid;
use crate::value::{DataType, Value};

use super::{Context, Expr, Query};

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub constraints: Vec<ColumnConstraint>,
}

impl ColumnDef {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            constraints: Vec::new(),
        }
    }

    pub fn not_null(mut self) -> Self {
        self.constraints.push(ColumnConstraint::NotNull);
        self
    }

    pub fn default_value(mut self, v: impl Into<Value>) -> Self {
        self.constraints.push(ColumnConstraint::Default(v.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexKind {
    Primary,
    Unique,
    /// Foreign key into the named table's primary key.
    References(String),
}

#[derive(Debug, Clone)]
pub enum InsertSource {
    Values(Vec<Vec<Expr>>),
    Query(Query),
}

#[derive(Debug, Clone)]
pub enum DropTarget {
    Table(String),
    Column { table: String, column: String },
    Index(Uid),
    View(String),
}

#[derive(Debug, Clone)]
pub enum Statement {
    CreateTable {
        name: String,
        columns: Vec<ColumnDef>,
        primary_key: Vec<String>,
    },
    CreateColumn {
        table: String,
        column: ColumnDef,
    },
    CreateIndex {
        table: String,
        columns: Vec<String>,
        kind: IndexKind,
    },
    /// `columns: None` means every column in table order.
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        source: InsertSource,
    },
    UpdateSearch {
        table: String,
        assignments: Vec<(String, Expr)>,
        predicate: Option<Expr>,
    },
    DeleteSearch {
        table: String,
        predicate: Option<Expr>,
    },
    /// Rename a table or view, or with `column` rename and optionally
    /// retype one of its columns.
    Alter {
        table: String,
        column: Option<String>,
        name: String,
        data_type: Option<DataType>,
    },
    Drop {
        target: DropTarget,
    },
    CreateView {
        name: String,
        definition: Query,
    },
    Select(Query),
}

/// Result of obeying a statement.
#[derive(Debug)]
pub struct Outcome {
    pub tr: Transaction,
    pub rows: Option<Arc<RowSet>>,
}

impl Outcome {
    fn done(tr: Transaction) -> Self {
        Self { tr, rows: None }
    }
}

impl Statement {
    pub fn is_write(&self) -> bool {
        !matches!(self, Statement::Select(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Statement::CreateTable { .. } => "CREATE TABLE",
            Statement::CreateColumn { .. } => "CREATE COLUMN",
            Statement::CreateIndex { .. } => "CREATE INDEX",
            Statement::Insert { .. } => "INSERT",
            Statement::UpdateSearch { .. } => "UPDATE",
            Statement::DeleteSearch { .. } => "DELETE",
            Statement::Alter { .. } => "ALTER",
            Statement::Drop { .. } => "DROP",
            Statement::CreateView { .. } => "CREATE VIEW",
            Statement::Select(_) => "SELECT",
        }
    }

    pub fn obey(&self, tr: &Transaction) -> Result<Outcome> {
        self.obey_in(tr, &Context::new())
    }

    /// Obey with `cx` supplying statement arguments.
    pub fn obey_in(&self, tr: &Transaction, cx: &Context) -> Result<Outcome> {
        match self {
            Statement::CreateTable {
                name,
                columns,
                primary_key,
            } => {
                let (mut tr, t) = tr.create_table(name)?;
                for c in columns {
                    tr = tr.add_column(t, &c.name, c.data_type, c.constraints.clone())?.0;
                }
                if !primary_key.is_empty() {
                    let key = resolve_columns(&tr, t, primary_key)?;
                    tr = tr.create_index(t, true, key, Uid::NONE)?.0;
                }
                Ok(Outcome::done(tr))
            }
            Statement::CreateColumn { table, column } => {
                let t = tr.db().lookup_table(table)?.uid;
                let (tr, _) =
                    tr.add_column(t, &column.name, column.data_type, column.constraints.clone())?;
                Ok(Outcome::done(tr))
            }
            Statement::CreateIndex {
                table,
                columns,
                kind,
            } => {
                let t = tr.db().lookup_table(table)?.uid;
                let key = resolve_columns(tr, t, columns)?;
                let references = match kind {
                    IndexKind::References(target) => tr.db().lookup_table(target)?.uid,
                    _ => Uid::NONE,
                };
                let primary = *kind == IndexKind::Primary;
                Ok(Outcome::done(tr.create_index(t, primary, key, references)?.0))
            }
            Statement::Insert {
                table,
                columns,
                source,
            } => insert(tr, table, columns.as_deref(), source, cx),
            Statement::UpdateSearch {
                table,
                assignments,
                predicate,
            } => {
                let t = tr.db().lookup_table(table)?;
                let assignments = assignments
                    .iter()
                    .map(|(name, e)| Ok((tr.db().lookup_column(t, name)?, e.clone())))
                    .collect::<Result<Vec<_>>>()?;
                let rs = rowset::build(tr.clone(), &target(t.uid, predicate), cx)?;
                let mut tr = rs.tr().clone();
                rowset::for_each(&rs, |b| {
                    tr = b.update(&tr, &assignments)?;
                    Ok(())
                })?;
                Ok(Outcome::done(tr))
            }
            Statement::DeleteSearch { table, predicate } => {
                let t = tr.db().lookup_table(table)?.uid;
                let rs = rowset::build(tr.clone(), &target(t, predicate), cx)?;
                let mut tr = rs.tr().clone();
                rowset::for_each(&rs, |b| {
                    tr = b.delete(&tr)?;
                    Ok(())
                })?;
                Ok(Outcome::done(tr))
            }
            Statement::Alter {
                table,
                column,
                name,
                data_type,
            } => {
                let db = tr.db();
                let defpos = db.lookup(table)?;
                let column = match column {
                    Some(c) => Some(db.lookup_column(db.table(defpos)?, c)?),
                    None => None,
                };
                Ok(Outcome::done(tr.alter(defpos, column, name, *data_type)?))
            }
            Statement::Drop { target } => {
                let db = tr.db();
                let (drpos, parent) = match target {
                    DropTarget::Table(name) => (db.lookup_table(name)?.uid, Uid::NONE),
                    DropTarget::Column { table, column } => {
                        let t = db.lookup_table(table)?;
                        (db.lookup_column(t, column)?, t.uid)
                    }
                    DropTarget::Index(uid) => (db.index(*uid)?.uid, Uid::NONE),
                    DropTarget::View(name) => {
                        let uid = db.lookup(name)?;
                        if db.view(uid).is_none() {
                            return Err(DbError::InvalidOperation(format!("{} is not a view", name)));
                        }
                        (uid, Uid::NONE)
                    }
                };
                Ok(Outcome::done(tr.drop(drpos, parent)?))
            }
            Statement::CreateView { name, definition } => {
                // check the definition builds before storing it
                rowset::build(tr.clone(), definition, cx)?;
                let (tr, _) = tr.create_view(name, definition.clone())?;
                Ok(Outcome::done(tr))
            }
            Statement::Select(q) => {
                let rs = rowset::build(tr.clone(), q, cx)?;
                Ok(Outcome {
                    tr: rs.tr().clone(),
                    rows: Some(rs),
                })
            }
        }
    }
}

fn resolve_columns(tr: &Transaction, table: Uid, names: &[String]) -> Result<Vec<Uid>> {
    let db = tr.db();
    let t = db.table(table)?;
    names.iter().map(|n| db.lookup_column(t, n)).collect()
}

fn target(table: Uid, predicate: &Option<Expr>) -> Query {
    match predicate {
        Some(p) => Query::table(table).search(p.clone()),
        None => Query::table(table),
    }
}

fn insert(
    tr: &Transaction,
    table: &str,
    columns: Option<&[String]>,
    source: &InsertSource,
    cx: &Context,
) -> Result<Outcome> {
    let t = tr.db().lookup_table(table)?;
    let t_uid = t.uid;
    let targets: Vec<Uid> = match columns {
        Some(names) => resolve_columns(tr, t_uid, names)?,
        None => t.ordered_columns().map(|c| c.uid).collect(),
    };
    let (mut tr, rows) = match source {
        InsertSource::Values(rows) => {
            let tr = rowset::read_subqueries(tr.clone(), rows.iter().flatten(), cx);
            let rows = rows
                .iter()
                .map(|r| r.iter().map(|e| e.eval(&tr, cx)).collect::<Result<Vec<_>>>())
                .collect::<Result<Vec<_>>>()?;
            (tr, rows)
        }
        InsertSource::Query(q) => {
            let rs = rowset::build(tr.clone(), q, cx)?;
            let rows = rowset::rows(&rs)?
                .iter()
                .map(|r| r.values().to_vec())
                .collect();
            (rs.tr().clone(), rows)
        }
    };
    for values in rows {
        if values.len() != targets.len() {
            return Err(DbError::InvalidOperation(format!(
                "{} values for {} columns",
                values.len(),
                targets.len()
            )));
        }
        tr = tr.insert(t_uid, targets.iter().copied().zip(values).collect())?.0;
    }
    Ok(Outcome::done(tr))
}
