//! Database snapshots
//!
//! A [`Database`] is an immutable value: the object map, the name
//! namespace and the log position it reflects. [`Database::install`]
//! applies one object and returns the next snapshot, enforcing every
//! structural rule (keys, nulls, references) on the way. A failed
//! install leaves the original snapshot untouched.

use std::sync::Arc;

use tracing::debug;

use crate::catalog::{
    Alter, Column, DbObject, Delete, Drop, Index, Record, Role, SystemTable, Table, View,
};
use crate::collections::OrderedMap;
use crate::error::{DbError, Result};
use crate::uid::Uid;
use crate::value::{format_key, Value};

#[derive(Debug, Clone)]
pub struct Database {
    name: Arc<str>,
    objects: OrderedMap<Uid, DbObject>,
    role: Role,
    /// Referenced table -> foreign key indexes pointing at it.
    dependents: OrderedMap<Uid, OrderedMap<Uid, ()>>,
    position: u64,
}

impl Database {
    /// Empty snapshot holding only the system tables.
    pub fn new(name: &str, position: u64) -> Self {
        let mut db = Self {
            name: Arc::from(name),
            objects: OrderedMap::new(),
            role: Role::default(),
            dependents: OrderedMap::new(),
            position,
        };
        for sys in SystemTable::ALL {
            let (table, columns) = sys.definition();
            let mut table = table;
            let mut role = db
                .role
                .with_global(sys.name(), table.uid)
                .unwrap_or_else(|_| db.role.clone());
            let mut objects = db.objects.clone();
            for c in columns {
                role = role.with_column(table.uid, &c.name, c.uid);
                table = table.with_column(c.clone()).unwrap_or(table);
                objects = objects.insert(c.uid, DbObject::Column(c));
            }
            db.objects = objects.insert(table.uid, DbObject::Table(table));
            db.role = role;
        }
        db
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Log length this snapshot reflects.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn with_position(&self, position: u64) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn object(&self, uid: Uid) -> Option<&DbObject> {
        self.objects.get(&uid)
    }

    pub fn objects(&self) -> impl Iterator<Item = (&Uid, &DbObject)> + '_ {
        self.objects.iter()
    }

    pub fn table(&self, uid: Uid) -> Result<&Table> {
        match self.objects.get(&uid) {
            Some(DbObject::Table(t)) => Ok(t),
            _ => Err(DbError::UnknownObject(uid)),
        }
    }

    pub fn column(&self, uid: Uid) -> Result<&Column> {
        match self.objects.get(&uid) {
            Some(DbObject::Column(c)) => Ok(c),
            _ => Err(DbError::UnknownObject(uid)),
        }
    }

    pub fn index(&self, uid: Uid) -> Result<&Index> {
        match self.objects.get(&uid) {
            Some(DbObject::Index(i)) => Ok(i),
            _ => Err(DbError::UnknownObject(uid)),
        }
    }

    pub fn view(&self, uid: Uid) -> Option<&View> {
        match self.objects.get(&uid) {
            Some(DbObject::View(v)) => Some(v),
            _ => None,
        }
    }

    /// A specific version of a row.
    pub fn record(&self, uid: Uid) -> Result<&Record> {
        match self.objects.get(&uid) {
            Some(DbObject::Record(r) | DbObject::Update(r)) => Ok(r),
            _ => Err(DbError::UnknownObject(uid)),
        }
    }

    /// Latest version of the row `defpos` of `table`.
    pub fn row(&self, table: Uid, defpos: Uid) -> Result<&Record> {
        let version = self
            .table(table)?
            .rows
            .get(&defpos)
            .ok_or(DbError::UnknownObject(defpos))?;
        self.record(*version)
    }

    /// User tables, in uid order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> + '_ {
        self.objects.values().filter_map(|o| match o {
            DbObject::Table(t) if !t.uid.is_system() => Some(t),
            _ => None,
        })
    }

    pub fn indexes_of<'a>(&'a self, table: &'a Table) -> impl Iterator<Item = &'a Index> + 'a {
        table.indexes.keys().filter_map(|i| self.index(*i).ok())
    }

    pub fn primary_index(&self, table: Uid) -> Option<&Index> {
        let t = self.table(table).ok()?;
        self.indexes_of(t).find(|i| i.primary)
    }

    /// Resolve a table or view name.
    pub fn lookup(&self, name: &str) -> Result<Uid> {
        self.role
            .lookup(name)
            .ok_or_else(|| DbError::UnknownName(name.to_string()))
    }

    pub fn lookup_table(&self, name: &str) -> Result<&Table> {
        let uid = self
            .role
            .lookup(name)
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))?;
        self.table(uid)
            .map_err(|_| DbError::UnknownTable(name.to_string()))
    }

    pub fn lookup_column(&self, table: &Table, name: &str) -> Result<Uid> {
        self.role
            .column(table.uid, name)
            .ok_or_else(|| DbError::UnknownColumn(format!("{}.{}", table.name, name)))
    }

    // ── Install ──────────────────────────────────────────────────────

    /// The snapshot with `obj` applied.
    pub fn install(&self, obj: &DbObject) -> Result<Database> {
        let db = match obj {
            DbObject::Table(t) => self.install_table(t)?,
            DbObject::Column(c) => self.install_column(c)?,
            DbObject::Record(r) => self.install_record(r)?,
            DbObject::Update(r) => self.install_update(r)?,
            DbObject::Delete(d) => self.install_delete(d)?,
            DbObject::Alter(a) => self.install_alter(a)?,
            DbObject::Drop(d) => self.install_drop(d)?,
            DbObject::Index(i) => self.install_index(i)?,
            DbObject::View(v) => self.install_view(v)?,
        };
        debug!(uid = %obj.uid(), kind = obj.kind_name(), "installed");
        Ok(db)
    }

    fn with_objects(&self, objects: OrderedMap<Uid, DbObject>) -> Self {
        Self {
            objects,
            ..self.clone()
        }
    }

    fn install_table(&self, t: &Table) -> Result<Self> {
        let role = self.role.with_global(&t.name, t.uid)?;
        Ok(Self {
            objects: self.objects.insert(t.uid, DbObject::Table(t.clone())),
            role,
            ..self.clone()
        })
    }

    fn install_column(&self, c: &Column) -> Result<Self> {
        let table = self.table(c.table)?.with_column(c.clone())?;
        Ok(Self {
            objects: self
                .objects
                .insert(c.uid, DbObject::Column(c.clone()))
                .insert(table.uid, DbObject::Table(table)),
            role: self.role.with_column(c.table, &c.name, c.uid),
            ..self.clone()
        })
    }

    /// A foreign key value must be present in the referenced primary
    /// index. Keys with a null component are not checked.
    fn check_reference(&self, index: &Index, key: &[Value]) -> Result<()> {
        if !index.is_foreign() || key.iter().any(Value::is_null) {
            return Ok(());
        }
        let found = self
            .primary_index(index.references)
            .is_some_and(|pk| pk.rows.contains(key));
        if found {
            Ok(())
        } else {
            Err(DbError::ReferentialInsert {
                table: index.references,
                key: format_key(key),
            })
        }
    }

    /// A primary key value may not go away while a foreign key still
    /// refers to it.
    fn check_dependents(&self, table: Uid, key: &[Value]) -> Result<()> {
        let Some(fks) = self.dependents.get(&table) else {
            return Ok(());
        };
        for fk in fks.keys() {
            if self.index(*fk).is_ok_and(|ix| ix.rows.contains(key)) {
                return Err(DbError::ReferentialDelete(table));
            }
        }
        Ok(())
    }

    fn install_record(&self, r: &Record) -> Result<Self> {
        let table = self.table(r.table)?;
        let mut objects = self.objects.clone();
        for index in self.indexes_of(table) {
            let key = index.key_of(r);
            self.check_reference(index, &key)?;
            let index = index.with_entry(&key, r.defpos)?;
            objects = objects.insert(index.uid, DbObject::Index(index));
        }
        let table = table.with_row(r.defpos, r.uid);
        objects = objects
            .insert(table.uid, DbObject::Table(table))
            .insert(r.uid, DbObject::Record(r.clone()));
        Ok(self.with_objects(objects))
    }

    fn install_update(&self, r: &Record) -> Result<Self> {
        let table = self.table(r.table)?;
        let old = self.row(r.table, r.defpos)?;
        let mut objects = self.objects.clone();
        for index in self.indexes_of(table) {
            let old_key = index.key_of(old);
            let new_key = index.key_of(r);
            if old_key == new_key {
                continue;
            }
            if index.primary {
                self.check_dependents(table.uid, &old_key)?;
            }
            self.check_reference(index, &new_key)?;
            let index = index
                .without_entry(&old_key, r.defpos)
                .with_entry(&new_key, r.defpos)?;
            objects = objects.insert(index.uid, DbObject::Index(index));
        }
        let table = table.with_row(r.defpos, r.uid);
        objects = objects
            .remove(&old.uid)
            .insert(table.uid, DbObject::Table(table))
            .insert(r.uid, DbObject::Update(r.clone()));
        Ok(self.with_objects(objects))
    }

    fn install_delete(&self, d: &Delete) -> Result<Self> {
        let table = self.table(d.table)?;
        let old = self.row(d.table, d.delpos)?;
        let mut objects = self.objects.clone();
        for index in self.indexes_of(table) {
            let key = index.key_of(old);
            if index.primary {
                self.check_dependents(table.uid, &key)?;
            }
            let index = index.without_entry(&key, d.delpos);
            objects = objects.insert(index.uid, DbObject::Index(index));
        }
        let table = table.without_row(d.delpos);
        objects = objects
            .remove(&old.uid)
            .insert(table.uid, DbObject::Table(table));
        Ok(self.with_objects(objects))
    }

    fn install_alter(&self, a: &Alter) -> Result<Self> {
        let Some(col) = a.column else {
            let role = self.role.renamed_global(a.defpos, &a.name)?;
            let objects = match self.objects.get(&a.defpos) {
                Some(DbObject::Table(t)) => self
                    .objects
                    .insert(t.uid, DbObject::Table(t.renamed(&a.name))),
                Some(DbObject::View(v)) => self.objects.insert(
                    v.uid,
                    DbObject::View(View {
                        name: a.name.clone(),
                        ..v.clone()
                    }),
                ),
                _ => return Err(DbError::UnknownObject(a.defpos)),
            };
            return Ok(Self {
                objects,
                role,
                ..self.clone()
            });
        };
        let table = self.table(a.defpos)?;
        let old = self.column(col)?;
        let altered = Column {
            name: a.name.clone(),
            data_type: a.data_type.unwrap_or(old.data_type),
            ..old.clone()
        };
        if altered.data_type != old.data_type {
            for version in table.rows.values() {
                self.record(*version)?.field(col).coerce(altered.data_type)?;
            }
        }
        let table = table.with_altered_column(altered.clone())?;
        Ok(Self {
            objects: self
                .objects
                .insert(col, DbObject::Column(altered))
                .insert(table.uid, DbObject::Table(table)),
            role: self.role.renamed_column(a.defpos, col, &a.name),
            ..self.clone()
        })
    }

    fn install_drop(&self, d: &Drop) -> Result<Self> {
        if d.parent != Uid::NONE {
            return self.drop_column(d.parent, d.drpos);
        }
        match self.objects.get(&d.drpos) {
            Some(DbObject::Table(t)) => self.drop_table(t),
            Some(DbObject::Index(i)) => self.drop_index(i),
            Some(DbObject::View(v)) => Ok(Self {
                objects: self.objects.remove(&v.uid),
                role: self.role.without_global(v.uid),
                ..self.clone()
            }),
            _ => Err(DbError::UnknownObject(d.drpos)),
        }
    }

    fn drop_column(&self, table: Uid, column: Uid) -> Result<Self> {
        let t = self.table(table)?;
        self.column(column)?;
        if let Some(ix) = self.indexes_of(t).find(|i| i.columns.contains(&column)) {
            return Err(DbError::InvalidOperation(format!(
                "column {} is used by index {}",
                self.role.qualified(table, column),
                ix.uid
            )));
        }
        let t = t.without_column(column);
        Ok(Self {
            objects: self
                .objects
                .remove(&column)
                .insert(t.uid, DbObject::Table(t)),
            role: self.role.without_column(table, column),
            ..self.clone()
        })
    }

    fn drop_table(&self, t: &Table) -> Result<Self> {
        let referenced_from_elsewhere = self.dependents.get(&t.uid).is_some_and(|fks| {
            fks.keys()
                .any(|fk| self.index(*fk).is_ok_and(|ix| ix.table != t.uid))
        });
        if referenced_from_elsewhere {
            return Err(DbError::ReferentialDelete(t.uid));
        }
        let mut db = self.clone();
        for ix in t.indexes.keys() {
            if let Ok(index) = self.index(*ix) {
                db = db.forget_index(index);
            }
        }
        let mut objects = db.objects.remove(&t.uid);
        for c in t.columns.keys() {
            objects = objects.remove(c);
        }
        for version in t.rows.values() {
            objects = objects.remove(version);
        }
        Ok(Self {
            objects,
            role: db.role.without_global(t.uid),
            dependents: db.dependents.remove(&t.uid),
            ..db
        })
    }

    fn drop_index(&self, index: &Index) -> Result<Self> {
        let table = self.table(index.table)?.without_index(index.uid);
        let db = self.forget_index(index);
        Ok(Self {
            objects: db.objects.insert(table.uid, DbObject::Table(table)),
            ..db
        })
    }

    fn forget_index(&self, index: &Index) -> Self {
        let dependents = if index.is_foreign() {
            match self.dependents.get(&index.references) {
                Some(fks) => self
                    .dependents
                    .insert(index.references, fks.remove(&index.uid)),
                None => self.dependents.clone(),
            }
        } else {
            self.dependents.clone()
        };
        Self {
            objects: self.objects.remove(&index.uid),
            dependents,
            ..self.clone()
        }
    }

    fn install_index(&self, i: &Index) -> Result<Self> {
        let table = self.table(i.table)?;
        for c in i.columns.iter() {
            if !table.columns.contains_key(c) {
                return Err(DbError::UnknownObject(*c));
            }
        }
        if i.primary && self.indexes_of(table).any(|x| x.primary) {
            return Err(DbError::InvalidOperation(format!(
                "table {} already has a primary key",
                table.name
            )));
        }
        if i.is_foreign() && self.primary_index(i.references).is_none() {
            return Err(DbError::InvalidOperation(format!(
                "referenced table {} has no primary key",
                i.references
            )));
        }
        let mut index = Index::new(i.uid, i.table, i.primary, i.columns.to_vec(), i.references);
        for (defpos, version) in table.rows.iter() {
            let key = index.key_of(self.record(*version)?);
            self.check_reference(&index, &key)?;
            index = index.with_entry(&key, *defpos)?;
        }
        let dependents = if index.is_foreign() {
            let fks = self
                .dependents
                .get(&index.references)
                .cloned()
                .unwrap_or_default();
            self.dependents
                .insert(index.references, fks.insert(index.uid, ()))
        } else {
            self.dependents.clone()
        };
        let table = table.with_index(index.uid);
        Ok(Self {
            objects: self
                .objects
                .insert(index.uid, DbObject::Index(index))
                .insert(table.uid, DbObject::Table(table)),
            dependents,
            ..self.clone()
        })
    }

    fn install_view(&self, v: &View) -> Result<Self> {
        let role = self.role.with_global(&v.name, v.uid)?;
        Ok(Self {
            objects: self.objects.insert(v.uid, DbObject::View(v.clone())),
            role,
            ..self.clone()
        })
    }
}
