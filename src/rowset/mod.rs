//! Lazy row sets
//!
//! [`build`] turns a [`Query`] into a tree of [`RowSet`]s over one
//! transaction snapshot. Rows come out one [`Bookmark`] at a time. A
//! bookmark is an immutable position: advancing returns a new bookmark
//! and leaves the old one usable, so several traversals of one row set
//! can run side by side.
//!
//! Only ordering, grouping, duplicate elimination and the system tables
//! materialize their input; every other kind walks its source on demand.
//!
//! Building a row set records what it reads in the transaction it
//! carries ([`RowSet::tr`]), which is what commit-time read conflict
//! detection works from.

mod alias;
mod distinct;
mod group;
mod index;
mod join;
mod ordered;
mod search;
mod select;
mod system;
mod table;
mod values;

use std::fmt;
use std::sync::Arc;

use crate::catalog::SystemTable;
use crate::collections::{MapCursor, MultiCursor};
use crate::error::{DbError, Result};
use crate::query::{Context, Expr, Query, Row, RowColumn};
use crate::transaction::Transaction;
use crate::uid::Uid;
use crate::value::Value;

pub use group::Accumulator;

pub struct RowSet {
    tr: Transaction,
    columns: Arc<[RowColumn]>,
    cx: Context,
    kind: Kind,
}

pub(crate) enum Kind {
    Table(Uid),
    Index(index::IndexScan),
    Filter {
        source: Arc<RowSet>,
        predicate: Expr,
    },
    Select {
        source: Arc<RowSet>,
        display: Vec<Expr>,
    },
    Alias(Arc<RowSet>),
    Ordered(ordered::Ordered),
    Join(join::Join),
    Group(Entries),
    Eval(Entries),
    Distinct(Entries),
    Values(Entries),
    System(Entries),
}

/// One materialized row with the context it was produced in.
#[derive(Clone)]
pub(crate) struct Entry {
    row: Row,
    cx: Context,
    record: Option<(Uid, Uid)>,
}

pub(crate) type Entries = Arc<[Entry]>;

impl Kind {
    fn entries(&self) -> Option<&Entries> {
        match self {
            Kind::Group(e) | Kind::Eval(e) | Kind::Distinct(e) | Kind::Values(e) | Kind::System(e) => {
                Some(e)
            }
            _ => None,
        }
    }
}

impl RowSet {
    fn new(tr: Transaction, columns: Arc<[RowColumn]>, cx: Context, kind: Kind) -> Arc<Self> {
        Arc::new(Self {
            tr,
            columns,
            cx,
            kind,
        })
    }

    /// The transaction this row set reads from, with its reads recorded.
    pub fn tr(&self) -> &Transaction {
        &self.tr
    }

    pub fn columns(&self) -> &Arc<[RowColumn]> {
        &self.columns
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            Kind::Table(_) => "Table",
            Kind::Index(_) => "Index",
            Kind::Filter { .. } => "Search",
            Kind::Select { .. } => "Select",
            Kind::Alias(_) => "Alias",
            Kind::Ordered(_) => "Ordered",
            Kind::Join(_) => "Join",
            Kind::Group(_) => "Group",
            Kind::Eval(_) => "Eval",
            Kind::Distinct(_) => "Distinct",
            Kind::Values(_) => "Values",
            Kind::System(_) => "System",
        }
    }

    /// The index an index scan walks.
    pub fn index(&self) -> Option<Uid> {
        match &self.kind {
            Kind::Index(scan) => Some(scan.index),
            _ => None,
        }
    }

    /// Direct source row sets.
    pub fn sources(&self) -> Vec<&Arc<RowSet>> {
        match &self.kind {
            Kind::Filter { source, .. } | Kind::Select { source, .. } | Kind::Alias(source) => {
                vec![source]
            }
            Kind::Ordered(o) => vec![&o.source],
            Kind::Join(j) => vec![&j.left, &j.right],
            _ => Vec::new(),
        }
    }
}

impl fmt::Debug for RowSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.columns.iter().map(|c| &*c.name).collect();
        f.debug_struct("RowSet")
            .field("kind", &self.kind_name())
            .field("columns", &names)
            .finish()
    }
}

// ── Building ─────────────────────────────────────────────────────────

/// Build the row set for `query`. `cx` supplies arguments and, for
/// correlated sub-queries, the outer rows.
pub fn build(tr: Transaction, query: &Query, cx: &Context) -> Result<Arc<RowSet>> {
    let tr = read_subqueries(tr, query.expressions(), cx);
    match query {
        Query::Table(uid) => {
            if let Some(sys) = SystemTable::from_uid(*uid) {
                return system::build(tr, sys, cx);
            }
            let definition = tr.db().view(*uid).map(|v| Arc::clone(&v.definition));
            match definition {
                Some(definition) => build(tr, &definition, cx),
                None => table::build(tr, *uid, cx),
            }
        }
        Query::Alias { source, alias } => Ok(alias::build(build(tr, source, cx)?, alias)),
        Query::Search { source, predicate } => search::build(tr, source, predicate, cx),
        Query::Join {
            kind,
            left,
            right,
            on,
        } => join::build(tr, *kind, left, right, on, cx),
        Query::Group {
            source,
            groups,
            having,
        } => {
            let mut slots = Vec::new();
            let having = having.as_ref().map(|h| h.number_aggregates(&mut slots));
            let source = build(tr, source, cx)?;
            group::build(source, groups, having.as_ref(), &slots, cx)
        }
        Query::Select(select) => select::build(tr, select, cx),
        Query::Values { columns, rows } => values::build(tr, columns, rows, cx),
    }
}

/// Record in `tr` what the `IN (subquery)` lists among `exprs` read.
/// A correlated sub-query that can't be built without its outer row
/// counts as reading every table it names.
pub(crate) fn read_subqueries<'a>(
    mut tr: Transaction,
    exprs: impl IntoIterator<Item = &'a Expr>,
    cx: &Context,
) -> Transaction {
    for query in exprs.into_iter().flat_map(Expr::subqueries) {
        tr = match build(tr.clone(), query, cx) {
            Ok(rs) => rs.tr.clone(),
            Err(_) => read_tables(tr, query),
        };
    }
    tr
}

fn read_tables(mut tr: Transaction, query: &Query) -> Transaction {
    if let Query::Table(uid) = query {
        let definition = tr.db().view(*uid).map(|v| Arc::clone(&v.definition));
        tr = tr.with_read(*uid);
        if let Some(definition) = definition {
            tr = read_tables(tr, &definition);
        }
    }
    for input in query.inputs() {
        tr = read_tables(tr, input);
    }
    for sub in query.expressions().into_iter().flat_map(Expr::subqueries) {
        tr = read_tables(tr, sub);
    }
    tr
}

// ── Traversal ────────────────────────────────────────────────────────

/// Bookmark at the first row, or `None` for an empty row set.
pub fn first(rs: &Arc<RowSet>) -> Result<Option<Bookmark>> {
    match &rs.kind {
        Kind::Table(uid) => table::first(rs, *uid),
        Kind::Index(scan) => index::first(rs, scan),
        Kind::Filter { source, predicate } => search::filter(rs, first(source)?, predicate, 0),
        Kind::Select { source, display } => select::project(rs, first(source)?, display, 0),
        Kind::Alias(source) => alias::rename(rs, first(source)?, 0),
        Kind::Ordered(o) => ordered::at(rs, o, o.index.first(), 0),
        Kind::Join(j) => join::first(rs, j),
        Kind::Group(e) | Kind::Eval(e) | Kind::Distinct(e) | Kind::Values(e) | Kind::System(e) => {
            Ok(entry_at(rs, e, 0))
        }
    }
}

/// Call `f` on every bookmark in order.
pub fn for_each(rs: &Arc<RowSet>, mut f: impl FnMut(&Bookmark) -> Result<()>) -> Result<()> {
    let mut bm = first(rs)?;
    while let Some(b) = bm {
        f(&b)?;
        bm = b.next()?;
    }
    Ok(())
}

/// All rows, in order.
pub fn rows(rs: &Arc<RowSet>) -> Result<Vec<Row>> {
    let mut out = Vec::new();
    for_each(rs, |b| {
        out.push(b.row.clone());
        Ok(())
    })?;
    Ok(out)
}

fn entry_at(rs: &Arc<RowSet>, entries: &Entries, i: usize) -> Option<Bookmark> {
    entries.get(i).map(|e| Bookmark {
        rs: Arc::clone(rs),
        position: i,
        row: e.row.clone(),
        cx: e.cx.clone(),
        record: e.record,
        state: State::Entry(i),
    })
}

/// Immutable position in a row set.
#[derive(Clone)]
pub struct Bookmark {
    rs: Arc<RowSet>,
    position: usize,
    row: Row,
    cx: Context,
    /// `(table, defpos)` of the table row behind this one, if any.
    record: Option<(Uid, Uid)>,
    state: State,
}

#[derive(Clone)]
enum State {
    Scan(MapCursor<Uid, Uid>),
    Index(MultiCursor),
    Ordered(MultiCursor),
    Entry(usize),
    Source(Box<Bookmark>),
    Join(Box<join::JoinState>),
}

impl Bookmark {
    /// Bookmark whose context is its row set's context plus `row`.
    fn new(
        rs: &Arc<RowSet>,
        position: usize,
        row: Row,
        record: Option<(Uid, Uid)>,
        state: State,
    ) -> Self {
        Self {
            cx: rs.cx.with_row(row.clone()),
            rs: Arc::clone(rs),
            position,
            row,
            record,
            state,
        }
    }

    pub fn next(&self) -> Result<Option<Bookmark>> {
        let rs = &self.rs;
        let position = self.position + 1;
        match (&rs.kind, &self.state) {
            (Kind::Table(uid), State::Scan(c)) => table::settle(rs, *uid, c.next(), position),
            (Kind::Index(scan), State::Index(c)) => {
                index::settle(rs, scan, scan.step(c), position)
            }
            (Kind::Filter { predicate, .. }, State::Source(b)) => {
                search::filter(rs, b.next()?, predicate, position)
            }
            (Kind::Select { display, .. }, State::Source(b)) => {
                select::project(rs, b.next()?, display, position)
            }
            (Kind::Alias(_), State::Source(b)) => alias::rename(rs, b.next()?, position),
            (Kind::Ordered(o), State::Ordered(c)) => ordered::at(rs, o, c.next(), position),
            (Kind::Join(j), State::Join(s)) => join::next(rs, j, s, position),
            (kind, State::Entry(i)) => match kind.entries() {
                Some(e) => Ok(entry_at(rs, e, i + 1)),
                None => Err(stray()),
            },
            _ => Err(stray()),
        }
    }

    /// Zero-based position in the row set.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn row(&self) -> &Row {
        &self.row
    }

    pub fn cx(&self) -> &Context {
        &self.cx
    }

    pub fn rowset(&self) -> &Arc<RowSet> {
        &self.rs
    }

    /// Column value by display name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.row.by_name(name)
    }

    /// `(table, defpos)` when this row maps onto exactly one table row.
    pub fn record(&self) -> Option<(Uid, Uid)> {
        self.record
    }

    /// Index cursor of an index scan or ordered row set.
    pub fn mb(&self) -> Option<&MultiCursor> {
        match &self.state {
            State::Index(c) | State::Ordered(c) => Some(c),
            _ => None,
        }
    }

    /// Update the table row behind this bookmark. Assignment values are
    /// evaluated against this row.
    pub fn update(&self, tr: &Transaction, assignments: &[(Uid, Expr)]) -> Result<Transaction> {
        let (table, defpos) = self.record.ok_or(DbError::NotUpdatable)?;
        let tr = read_subqueries(tr.clone(), assignments.iter().map(|(_, e)| e), &self.cx);
        let changes = assignments
            .iter()
            .map(|(column, e)| Ok((*column, e.eval(&tr, &self.cx)?)))
            .collect::<Result<Vec<_>>>()?;
        tr.update(table, defpos, changes)
    }

    pub fn delete(&self, tr: &Transaction) -> Result<Transaction> {
        let (table, defpos) = self.record.ok_or(DbError::NotUpdatable)?;
        tr.delete(table, defpos)
    }
}

impl fmt::Debug for Bookmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bookmark")
            .field("position", &self.position)
            .field("row", &self.row.to_string())
            .finish()
    }
}

fn stray() -> DbError {
    DbError::InvalidOperation("bookmark state does not match its row set".to_string())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::catalog::ColumnConstraint;
    use crate::database_manager::SharedDatabase;
    use crate::transaction::Transaction;
    use crate::uid::Uid;
    use crate::value::{DataType, Value};

    /// Fresh transaction with table `name(k INTEGER, v STRING)` holding
    /// `rows`, plus the uids of table, k and v.
    pub fn table_with(name: &str, rows: &[(i64, &str)]) -> (Transaction, Uid, Uid, Uid) {
        let shared: Arc<SharedDatabase> = SharedDatabase::in_memory("rowset");
        let tr = shared.begin(false);
        add_table(tr, name, rows)
    }

    pub fn add_table(tr: Transaction, name: &str, rows: &[(i64, &str)]) -> (Transaction, Uid, Uid, Uid) {
        let (tr, t) = tr.create_table(name).unwrap();
        let (tr, k) = tr
            .add_column(t, "k", DataType::Integer, vec![ColumnConstraint::NotNull])
            .unwrap();
        let (mut tr, v) = tr.add_column(t, "v", DataType::String, Vec::new()).unwrap();
        for (key, val) in rows {
            tr = tr
                .insert(t, vec![(k, Value::int(*key)), (v, Value::str(val))])
                .unwrap()
                .0;
        }
        (tr, t, k, v)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{add_table, table_with};
    use super::*;
    use crate::query::{BinaryOp, InList, OrderItem};

    fn in_query(e: Expr, q: Query) -> Expr {
        Expr::In {
            expr: Box::new(e),
            list: InList::Query(Box::new(q)),
        }
    }

    #[test]
    fn test_subquery_reads_are_recorded() {
        let (tr, a, _, _) = table_with("a", &[(1, "x"), (2, "y")]);
        let (tr, b, _, bv) = add_table(tr, "b", &[(1, "x")]);
        let sub = Query::table(b).select(vec![("v", Expr::Column(bv))]);
        let q = Query::table(a).search(in_query(Expr::name("a.v"), sub));
        let rs = build(tr, &q, &Context::new()).unwrap();
        assert!(rs.tr().read_set().contains_key(&a));
        assert!(rs.tr().read_set().contains_key(&b));
        assert_eq!(rows(&rs).unwrap().len(), 1);
    }

    #[test]
    fn test_correlated_subquery_reads_its_tables() {
        let (tr, a, _, _) = table_with("a", &[(1, "x"), (2, "y")]);
        let (tr, b, _, bv) = add_table(tr, "b", &[(1, "x"), (2, "z")]);
        // needs the outer row, so it can't be built up front
        let sub = Query::table(b)
            .search(Expr::eql(Expr::name("b.k"), Expr::name("a.k")))
            .select(vec![("v", Expr::Column(bv))])
            .order_by(vec![OrderItem::asc(Expr::name("a.k"))]);
        let q = Query::table(a).search(in_query(Expr::name("a.v"), sub));
        let rs = build(tr, &q, &Context::new()).unwrap();
        assert!(rs.tr().read_set().contains_key(&b));
        let keys: Vec<Value> = rows(&rs).unwrap().iter().map(|r| r.values()[0].clone()).collect();
        assert_eq!(keys, vec![Value::int(1)]);
    }

    #[test]
    fn test_bookmarks_are_immutable_positions() {
        let (tr, t, _, _) = table_with("t", &[(1, "a"), (2, "b"), (3, "c")]);
        let rs = build(tr, &Query::table(t), &Context::new()).unwrap();
        let b0 = first(&rs).unwrap().unwrap();
        let b1 = b0.next().unwrap().unwrap();
        let again = b0.next().unwrap().unwrap();
        assert_eq!(b0.get("k"), Some(&Value::int(1)));
        assert_eq!(b1.row(), again.row());
        assert_eq!(b1.position(), 1);
    }

    #[test]
    fn test_table_scan_records_table_read() {
        let (tr, t, _, _) = table_with("t", &[(1, "a")]);
        let rs = build(tr, &Query::table(t), &Context::new()).unwrap();
        assert!(rs.tr().read_set().contains_key(&t));
        assert_eq!(rs.kind_name(), "Table");
    }

    #[test]
    fn test_update_through_bookmark() {
        let (tr, t, _, v) = table_with("t", &[(1, "a"), (2, "b")]);
        let rs = build(tr, &Query::table(t), &Context::new()).unwrap();
        let b = first(&rs).unwrap().unwrap();
        let tr = b.update(rs.tr(), &[(v, Expr::lit("z"))]).unwrap();
        let after = build(tr, &Query::table(t), &Context::new()).unwrap();
        let got: Vec<String> = rows(&after).unwrap().iter().map(|r| r.to_string()).collect();
        assert_eq!(got, vec!["(1,'z')", "(2,'b')"]);

        // the row set built before the update still sees the old rows
        assert_eq!(rows(&rs).unwrap()[0].get(1), Some(&Value::str("a")));
    }

    #[test]
    fn test_delete_through_bookmark() {
        let (tr, t, _, _) = table_with("t", &[(1, "a"), (2, "b")]);
        let rs = build(tr, &Query::table(t), &Context::new()).unwrap();
        let second = first(&rs).unwrap().unwrap().next().unwrap().unwrap();
        let tr = second.delete(rs.tr()).unwrap();
        let after = build(tr, &Query::table(t), &Context::new()).unwrap();
        assert_eq!(rows(&after).unwrap().len(), 1);
    }

    #[test]
    fn test_computed_rows_are_not_updatable() {
        let (tr, t, k, _) = table_with("t", &[(1, "a")]);
        let q = Query::table(t).order_by(vec![OrderItem::asc(Expr::Column(k))]);
        let q = q.distinct();
        let rs = build(tr, &q, &Context::new()).unwrap();
        let b = first(&rs).unwrap().unwrap();
        assert!(matches!(b.delete(rs.tr()), Err(DbError::NotUpdatable)));
    }

    #[test]
    fn test_view_expands_to_its_definition() {
        let (tr, t, k, _) = table_with("t", &[(1, "a"), (5, "b")]);
        let def = Query::table(t).search(Expr::binary(Expr::Column(k), BinaryOp::Gtr, Expr::lit(2)));
        let (tr, view) = tr.create_view("big", def).unwrap();
        let rs = build(tr, &Query::table(view), &Context::new()).unwrap();
        let got = rows(&rs).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].get(0), Some(&Value::int(5)));
    }
}
