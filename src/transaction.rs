//! Transactions
//!
//! A [`Transaction`] is a working snapshot layered over the committed
//! database it started from. Every operation installs its object into
//! the working snapshot straight away (so structural errors surface at
//! once and later queries in the same transaction see the change) and
//! returns a new transaction value; the one it was called on is left
//! as it was.
//!
//! New objects get uids from the transaction-local range. They are
//! translated to log offsets when [`Transaction::commit`] hands the
//! pending objects to the owning [`SharedDatabase`].

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::catalog::{
    Alter, Column, ColumnConstraint, DbObject, Delete, Drop, Index, Record, Table, View,
};
use crate::collections::OrderedMap;
use crate::database::Database;
use crate::database_manager::SharedDatabase;
use crate::error::{DbError, Result};
use crate::query::Query;
use crate::uid::Uid;
use crate::value::{DataType, Value};

#[derive(Clone)]
pub struct Transaction {
    db: Database,
    /// Log length when the transaction began.
    start: u64,
    next_uid: Uid,
    read_set: OrderedMap<Uid, ()>,
    pending: OrderedMap<Uid, DbObject>,
    auto_commit: bool,
    shared: Arc<SharedDatabase>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("database", &self.db.name())
            .field("start", &self.start)
            .field("next_uid", &self.next_uid)
            .field("pending", &self.pending.len())
            .field("reads", &self.read_set.len())
            .field("auto_commit", &self.auto_commit)
            .finish()
    }
}

impl Transaction {
    pub(crate) fn new(shared: Arc<SharedDatabase>, db: Database, auto_commit: bool) -> Self {
        Self {
            start: db.position(),
            db,
            next_uid: Uid::FIRST_TRANSACTION,
            read_set: OrderedMap::new(),
            pending: OrderedMap::new(),
            auto_commit,
            shared,
        }
    }

    /// The working snapshot, pending objects included.
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn start_position(&self) -> u64 {
        self.start
    }

    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    pub fn shared(&self) -> &Arc<SharedDatabase> {
        &self.shared
    }

    /// Pending objects in creation order.
    pub fn pending(&self) -> impl Iterator<Item = &DbObject> + '_ {
        self.pending.values()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn read_set(&self) -> &OrderedMap<Uid, ()> {
        &self.read_set
    }

    /// Note that a query depended on `uid`.
    pub fn with_read(&self, uid: Uid) -> Self {
        if self.read_set.contains_key(&uid) {
            return self.clone();
        }
        Self {
            read_set: self.read_set.insert(uid, ()),
            ..self.clone()
        }
    }

    /// Uid the next new object will get.
    pub fn next_uid(&self) -> Uid {
        self.next_uid
    }

    fn install(&self, obj: DbObject) -> Result<Self> {
        debug_assert_eq!(obj.uid(), self.next_uid);
        let db = self.db.install(&obj)?;
        Ok(Self {
            db,
            next_uid: self.next_uid.next(),
            pending: self.pending.insert(obj.uid(), obj),
            ..self.clone()
        })
    }

    fn user_table(&self, uid: Uid) -> Result<&Table> {
        let table = self.db.table(uid)?;
        if uid.is_system() {
            return Err(DbError::InvalidOperation(format!(
                "system table {} is read-only",
                table.name
            )));
        }
        Ok(table)
    }

    // ── Schema ───────────────────────────────────────────────────────

    pub fn create_table(&self, name: &str) -> Result<(Self, Uid)> {
        let uid = self.next_uid;
        let tr = self.install(DbObject::Table(Table::new(uid, name)))?;
        Ok((tr, uid))
    }

    pub fn add_column(
        &self,
        table: Uid,
        name: &str,
        data_type: DataType,
        constraints: Vec<ColumnConstraint>,
    ) -> Result<(Self, Uid)> {
        self.user_table(table)?;
        let uid = self.next_uid;
        let tr = self.install(DbObject::Column(Column {
            uid,
            table,
            name: Arc::from(name),
            data_type,
            constraints,
        }))?;
        Ok((tr, uid))
    }

    /// `references` is the referenced table for a foreign key, else
    /// [`Uid::NONE`].
    pub fn create_index(
        &self,
        table: Uid,
        primary: bool,
        columns: Vec<Uid>,
        references: Uid,
    ) -> Result<(Self, Uid)> {
        self.user_table(table)?;
        if columns.is_empty() {
            return Err(DbError::InvalidOperation("index without columns".into()));
        }
        let uid = self.next_uid;
        let tr = self.install(DbObject::Index(Index::new(
            uid, table, primary, columns, references,
        )))?;
        Ok((tr, uid))
    }

    /// Rename a table or view (`column == None`), or rename and/or
    /// retype a column of table `defpos`.
    pub fn alter(
        &self,
        defpos: Uid,
        column: Option<Uid>,
        name: &str,
        data_type: Option<DataType>,
    ) -> Result<Self> {
        if defpos.is_system() {
            return Err(DbError::InvalidOperation("system objects cannot be altered".into()));
        }
        self.install(DbObject::Alter(Alter {
            uid: self.next_uid,
            defpos,
            column,
            name: Arc::from(name),
            data_type,
        }))
    }

    /// Drop a table, index or view, or with a `parent` table a column.
    pub fn drop(&self, drpos: Uid, parent: Uid) -> Result<Self> {
        if drpos.is_system() || parent.is_system() {
            return Err(DbError::InvalidOperation("system objects cannot be dropped".into()));
        }
        let detail = match self.db.role().name_of(drpos) {
            Some(name) => name.to_string(),
            None => match self.db.object(drpos) {
                Some(DbObject::Index(ix)) => format!("{} {}", ix.kind_name(), ix.uid),
                _ => drpos.to_string(),
            },
        };
        self.install(DbObject::Drop(Drop {
            uid: self.next_uid,
            drpos,
            parent,
            detail: Arc::from(detail),
        }))
    }

    pub fn create_view(&self, name: &str, definition: Query) -> Result<(Self, Uid)> {
        let uid = self.next_uid;
        let tr = self.install(DbObject::View(View {
            uid,
            name: Arc::from(name),
            definition: Arc::new(definition),
        }))?;
        Ok((tr, uid))
    }

    // ── Rows ─────────────────────────────────────────────────────────

    /// Insert a row. Columns not supplied take their default (or null);
    /// every value is coerced to its column's type.
    pub fn insert(&self, table: Uid, values: Vec<(Uid, Value)>) -> Result<(Self, Uid)> {
        let t = self.user_table(table)?;
        if let Some((c, _)) = values.iter().find(|(c, _)| !t.columns.contains_key(c)) {
            return Err(DbError::UnknownColumn(c.to_string()));
        }
        let mut fields = OrderedMap::new();
        for column in t.ordered_columns() {
            let supplied = values
                .iter()
                .find(|(c, _)| *c == column.uid)
                .map(|(_, v)| v.clone());
            let value = column.admit(supplied)?;
            if !value.is_null() {
                fields = fields.insert(column.uid, value);
            }
        }
        let uid = self.next_uid;
        let tr = self.install(DbObject::Record(Record::new(uid, table, fields)))?;
        Ok((tr, uid))
    }

    /// Write a new version of row `defpos`. A null value clears the
    /// field.
    pub fn update(&self, table: Uid, defpos: Uid, changes: Vec<(Uid, Value)>) -> Result<Self> {
        let t = self.user_table(table)?;
        let old = self.db.row(table, defpos)?;
        let mut fields = old.fields.clone();
        for (c, v) in changes {
            let column = t
                .columns
                .get(&c)
                .ok_or_else(|| DbError::UnknownColumn(c.to_string()))?;
            let value = column.admit(Some(v))?;
            fields = if value.is_null() {
                fields.remove(&c)
            } else {
                fields.insert(c, value)
            };
        }
        self.install(DbObject::Update(Record::update(
            self.next_uid,
            defpos,
            table,
            fields,
        )))
    }

    pub fn delete(&self, table: Uid, defpos: Uid) -> Result<Self> {
        self.user_table(table)?;
        self.install(DbObject::Delete(Delete {
            uid: self.next_uid,
            table,
            delpos: defpos,
        }))
    }

    /// Look up an object, noting the read.
    pub fn read(&self, uid: Uid) -> Result<(Self, DbObject)> {
        let obj = self
            .db
            .object(uid)
            .cloned()
            .ok_or(DbError::UnknownObject(uid))?;
        Ok((self.with_read(uid), obj))
    }

    // ── Completion ───────────────────────────────────────────────────

    /// Validate against everything committed since this transaction
    /// began, then append the pending objects to the log.
    pub fn commit(self) -> Result<Database> {
        let shared = Arc::clone(&self.shared);
        shared.commit(&self)
    }

    /// Discard the transaction. The committed database never saw it.
    pub fn rollback(self) {
        debug!(
            database = self.db.name(),
            pending = self.pending.len(),
            "rollback"
        );
        self.shared.note_rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tr() -> Transaction {
        SharedDatabase::in_memory("tx").begin(false)
    }

    fn people() -> (Transaction, Uid, Uid, Uid) {
        let (tr, t) = tr().create_table("people").unwrap();
        let (tr, id) = tr.add_column(t, "id", DataType::Integer, vec![]).unwrap();
        let (tr, name) = tr
            .add_column(
                t,
                "name",
                DataType::String,
                vec![ColumnConstraint::Default(Value::str("anon"))],
            )
            .unwrap();
        let (tr, _) = tr.create_index(t, true, vec![id], Uid::NONE).unwrap();
        (tr, t, id, name)
    }

    #[test]
    fn test_operations_leave_the_receiver_untouched() {
        let base = tr();
        let (after, t) = base.create_table("t").unwrap();
        assert!(base.db().table(t).is_err());
        assert!(after.db().table(t).is_ok());
        assert_eq!(base.pending_count(), 0);
        assert_eq!(after.pending_count(), 1);
        assert_eq!(t, Uid::FIRST_TRANSACTION);
        assert_eq!(after.next_uid(), Uid::FIRST_TRANSACTION.next());
    }

    #[test]
    fn test_insert_applies_defaults_and_coercion() {
        let (tr, t, id, name) = people();
        let (tr, row) = tr.insert(t, vec![(id, Value::int(1))]).unwrap();
        let rec = tr.db().row(t, row).unwrap();
        assert_eq!(rec.field(name), Value::str("anon"));
        assert_eq!(rec.defpos, row);

        let err = tr.insert(t, vec![(id, Value::str("x"))]).unwrap_err();
        assert!(matches!(err, DbError::TypeMismatch { .. }));
    }

    #[test]
    fn test_duplicate_key_fails_immediately() {
        let (tr, t, id, _) = people();
        let (tr, _) = tr.insert(t, vec![(id, Value::int(1))]).unwrap();
        let err = tr.insert(t, vec![(id, Value::int(1))]).unwrap_err();
        assert!(err.is_structural());
        assert_eq!(tr.db().table(t).unwrap().rows.len(), 1);
    }

    #[test]
    fn test_update_merges_and_null_clears() {
        let (tr, t, id, name) = people();
        let (tr, row) = tr
            .insert(t, vec![(id, Value::int(1)), (name, Value::str("ann"))])
            .unwrap();
        let tr = tr.update(t, row, vec![(id, Value::int(2))]).unwrap();
        let rec = tr.db().row(t, row).unwrap();
        assert_eq!(rec.field(id), Value::int(2));
        assert_eq!(rec.field(name), Value::str("ann"));
        assert!(rec.is_update());

        let tr = tr.update(t, row, vec![(name, Value::Null)]).unwrap();
        assert_eq!(tr.db().row(t, row).unwrap().field(name), Value::Null);
    }

    #[test]
    fn test_delete_then_row_is_gone() {
        let (tr, t, id, _) = people();
        let (tr, row) = tr.insert(t, vec![(id, Value::int(1))]).unwrap();
        let tr = tr.delete(t, row).unwrap();
        assert!(tr.db().row(t, row).is_err());
        assert!(matches!(tr.delete(t, row), Err(DbError::UnknownObject(_))));
    }

    #[test]
    fn test_unknown_column_rejected() {
        let (tr, t, _, _) = people();
        let err = tr.insert(t, vec![(Uid::new(12345), Value::int(1))]).unwrap_err();
        assert!(matches!(err, DbError::UnknownColumn(_)));
    }

    #[test]
    fn test_system_tables_are_read_only() {
        let tr = tr();
        let log = crate::catalog::SystemTable::Log.uid();
        assert!(matches!(
            tr.insert(log, vec![]),
            Err(DbError::InvalidOperation(_))
        ));
        assert!(tr.drop(log, Uid::NONE).is_err());
    }

    #[test]
    fn test_read_set_records_reads_once() {
        let (tr, t, _, _) = people();
        let (tr, obj) = tr.read(t).unwrap();
        assert!(matches!(obj, DbObject::Table(_)));
        let tr = tr.with_read(t);
        assert_eq!(tr.read_set().len(), 1);
    }

    #[test]
    fn test_drop_detail_is_the_name() {
        let (tr, t, _, name) = people();
        let tr = tr.drop(name, t).unwrap();
        match tr.pending().last() {
            Some(DbObject::Drop(d)) => assert_eq!(&*d.detail, "name"),
            other => panic!("last pending {:?}", other),
        }
    }
}
