//! Database objects
//!
//! Everything the log can hold is a [`DbObject`]. Objects are immutable
//! values; the database snapshot maps uids to them and "changing" one
//! means installing a new value under the same uid.
//!
//! Besides the data itself an object answers two questions at commit
//! time:
//!
//! - [`DbObject::check`]: does this committed object invalidate
//!   something the committing transaction read?
//! - [`DbObject::conflicts`]: does this committed object clash with one
//!   of the committing transaction's own pending objects?
//!
//! The conflict rules are pairwise and deliberately narrow. A pair not
//! listed never conflicts at this stage; clashes such as two inserts of
//! the same primary key surface as structural errors when the pending
//! object is installed on top of the newer snapshot.

pub mod record;
pub mod role;
pub mod schema;
pub mod system;
pub mod table;

use crate::collections::OrderedMap;
use crate::uid::Uid;
use crate::value::format_key;

pub use record::{Delete, Record};
pub use role::Role;
pub use schema::{Alter, Drop, View};
pub use system::SystemTable;
pub use table::{Column, ColumnConstraint, Index, Table};

/// Log tags of the persistent object kinds.
pub mod tags {
    pub const TABLE: u8 = 9;
    pub const COLUMN: u8 = 10;
    pub const RECORD: u8 = 11;
    pub const UPDATE: u8 = 12;
    pub const DELETE: u8 = 13;
    pub const ALTER: u8 = 14;
    pub const DROP: u8 = 15;
    pub const VIEW: u8 = 16;
    pub const INDEX: u8 = 17;
}

#[derive(Debug, Clone)]
pub enum DbObject {
    Table(Table),
    Column(Column),
    Record(Record),
    Update(Record),
    Delete(Delete),
    Alter(Alter),
    Drop(Drop),
    Index(Index),
    View(View),
}

impl DbObject {
    pub fn uid(&self) -> Uid {
        match self {
            DbObject::Table(t) => t.uid,
            DbObject::Column(c) => c.uid,
            DbObject::Record(r) | DbObject::Update(r) => r.uid,
            DbObject::Delete(d) => d.uid,
            DbObject::Alter(a) => a.uid,
            DbObject::Drop(d) => d.uid,
            DbObject::Index(i) => i.uid,
            DbObject::View(v) => v.uid,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            DbObject::Table(_) => tags::TABLE,
            DbObject::Column(_) => tags::COLUMN,
            DbObject::Record(_) => tags::RECORD,
            DbObject::Update(_) => tags::UPDATE,
            DbObject::Delete(_) => tags::DELETE,
            DbObject::Alter(_) => tags::ALTER,
            DbObject::Drop(_) => tags::DROP,
            DbObject::Index(_) => tags::INDEX,
            DbObject::View(_) => tags::VIEW,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            DbObject::Table(_) => "Table",
            DbObject::Column(_) => "Column",
            DbObject::Record(_) => "Record",
            DbObject::Update(_) => "Update",
            DbObject::Delete(_) => "Delete",
            DbObject::Alter(_) => "Alter",
            DbObject::Drop(_) => "Drop",
            DbObject::Index(_) => "Index",
            DbObject::View(_) => "View",
        }
    }

    /// Whether this committed object touches anything in `read_set`.
    pub fn check(&self, read_set: &OrderedMap<Uid, ()>) -> bool {
        match self {
            DbObject::Record(r) | DbObject::Update(r) => {
                read_set.contains_key(&r.defpos) || read_set.contains_key(&r.table)
            }
            DbObject::Delete(d) => {
                read_set.contains_key(&d.delpos) || read_set.contains_key(&d.table)
            }
            _ => false,
        }
    }

    /// Whether this committed object clashes with the pending object
    /// `other` of a transaction that started before it was committed.
    pub fn conflicts(&self, other: &DbObject) -> bool {
        use DbObject as O;
        match (self, other) {
            (O::Table(a), O::Table(b)) => a.name == b.name,
            (O::View(a), O::View(b)) => a.name == b.name,
            (O::Column(a), O::Column(b)) => a.table == b.table && a.name == b.name,
            (O::Column(c), O::Drop(d)) => d.drpos == c.table,
            (O::Alter(a), O::Alter(b)) => a.defpos == b.defpos,
            (O::Alter(a), O::Drop(d)) => d.drpos == a.defpos || a.column == Some(d.drpos),
            (O::Drop(a), O::Drop(b)) => {
                (a.drpos == b.drpos && a.parent == b.parent)
                    || b.drpos == a.parent
                    || b.parent == a.drpos
            }
            (O::Drop(d), O::Column(c)) => c.table == d.drpos || c.uid == d.drpos,
            (O::Drop(d), O::Alter(a)) => a.defpos == d.drpos || a.column == Some(d.drpos),
            (O::Update(a), O::Update(b)) => a.defpos == b.defpos,
            (O::Record(r) | O::Update(r), O::Delete(d)) => d.delpos == r.defpos,
            (O::Delete(d), O::Update(r) | O::Record(r)) => r.defpos == d.delpos,
            _ => false,
        }
    }

    /// The same object with every uid it mentions passed through `map`.
    pub fn fix(&self, map: &UidMap) -> DbObject {
        let f = |u: Uid| map.fix(u);
        match self {
            DbObject::Table(t) => DbObject::Table(Table {
                uid: f(t.uid),
                ..t.clone()
            }),
            DbObject::Column(c) => DbObject::Column(Column {
                uid: f(c.uid),
                table: f(c.table),
                ..c.clone()
            }),
            DbObject::Record(r) => DbObject::Record(fix_record(r, map)),
            DbObject::Update(r) => DbObject::Update(fix_record(r, map)),
            DbObject::Delete(d) => DbObject::Delete(Delete {
                uid: f(d.uid),
                table: f(d.table),
                delpos: f(d.delpos),
            }),
            DbObject::Alter(a) => DbObject::Alter(Alter {
                uid: f(a.uid),
                defpos: f(a.defpos),
                column: a.column.map(f),
                ..a.clone()
            }),
            DbObject::Drop(d) => DbObject::Drop(Drop {
                uid: f(d.uid),
                drpos: f(d.drpos),
                parent: f(d.parent),
                detail: d.detail.clone(),
            }),
            DbObject::Index(i) => DbObject::Index(Index::new(
                f(i.uid),
                f(i.table),
                i.primary,
                i.columns.iter().map(|c| f(*c)).collect(),
                f(i.references),
            )),
            DbObject::View(v) => DbObject::View(View {
                uid: f(v.uid),
                name: v.name.clone(),
                definition: std::sync::Arc::new(v.definition.map_uids(&f)),
            }),
        }
    }

    /// One-line description for the `_Log` system table.
    pub fn describe(&self, role: &Role) -> String {
        let name = |u: Uid| role.name_of(u).map_or_else(|| u.to_string(), str::to_string);
        match self {
            DbObject::Table(t) => t.name.to_string(),
            DbObject::Column(c) => format!("{}.{} {}", name(c.table), c.name, c.data_type),
            DbObject::Record(r) => format!("{}{}", name(r.table), describe_fields(r, &name)),
            DbObject::Update(r) => format!(
                "{} [{}]{}",
                name(r.table),
                r.defpos,
                describe_fields(r, &name)
            ),
            DbObject::Delete(d) => format!("{} [{}]", name(d.table), d.delpos),
            DbObject::Alter(a) => {
                let target = match a.column {
                    Some(c) => format!("{}.{}", name(a.defpos), name(c)),
                    None => name(a.defpos),
                };
                match a.data_type {
                    Some(dt) => format!("{} to {} {}", target, a.name, dt),
                    None => format!("{} to {}", target, a.name),
                }
            }
            DbObject::Drop(d) if d.parent == Uid::NONE => d.detail.to_string(),
            DbObject::Drop(d) => format!("{}.{}", name(d.parent), d.detail),
            DbObject::Index(i) => {
                let cols: Vec<String> = i.columns.iter().map(|c| name(*c)).collect();
                let mut s = format!("{} {} ({})", i.kind_name(), name(i.table), cols.join(","));
                if i.is_foreign() {
                    s.push_str(&format!(" REFERENCES {}", name(i.references)));
                }
                s
            }
            DbObject::View(v) => v.name.to_string(),
        }
    }
}

fn fix_record(r: &Record, map: &UidMap) -> Record {
    Record {
        uid: map.fix(r.uid),
        defpos: map.fix(r.defpos),
        table: map.fix(r.table),
        fields: r
            .fields
            .iter()
            .map(|(c, v)| (map.fix(*c), v.clone()))
            .collect(),
    }
}

fn describe_fields(r: &Record, name: &impl Fn(Uid) -> String) -> String {
    let cols: Vec<String> = r.fields.keys().map(|c| name(*c)).collect();
    let vals: Vec<_> = r.fields.values().cloned().collect();
    format!("({}) {}", cols.join(","), format_key(&vals))
}

/// Translation from transaction-local uids to the committed uids their
/// objects were written at.
#[derive(Debug, Clone, Default)]
pub struct UidMap(OrderedMap<Uid, Uid>);

impl UidMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(&self, from: Uid, to: Uid) -> Self {
        UidMap(self.0.insert(from, to))
    }

    /// The committed uid for `uid`, or `uid` itself if it was not
    /// renumbered.
    pub fn fix(&self, uid: Uid) -> Uid {
        self.0.get(&uid).copied().unwrap_or(uid)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::value::{DataType, Value};

    fn u(n: i64) -> Uid {
        Uid::new(n)
    }

    fn column(uid: i64, table: i64, name: &str) -> DbObject {
        DbObject::Column(Column {
            uid: u(uid),
            table: u(table),
            name: Arc::from(name),
            data_type: DataType::Integer,
            constraints: Vec::new(),
        })
    }

    fn drop(drpos: i64, parent: i64) -> DbObject {
        DbObject::Drop(Drop {
            uid: u(900),
            drpos: u(drpos),
            parent: u(parent),
            detail: Arc::from("x"),
        })
    }

    fn record(uid: i64, defpos: i64, table: i64) -> Record {
        Record::update(u(uid), u(defpos), u(table), OrderedMap::new())
    }

    fn alter(defpos: i64, column: Option<i64>) -> DbObject {
        DbObject::Alter(Alter {
            uid: u(800),
            defpos: u(defpos),
            column: column.map(u),
            name: Arc::from("n"),
            data_type: None,
        })
    }

    #[test]
    fn test_tables_conflict_on_name() {
        let a = DbObject::Table(Table::new(u(10), "t"));
        let b = DbObject::Table(Table::new(u(11), "t"));
        let c = DbObject::Table(Table::new(u(12), "s"));
        assert!(a.conflicts(&b));
        assert!(!a.conflicts(&c));
    }

    #[test]
    fn test_views_conflict_on_name() {
        let view = |uid: i64, name: &str| {
            DbObject::View(View {
                uid: u(uid),
                name: Arc::from(name),
                definition: Arc::new(crate::query::Query::table(u(10))),
            })
        };
        assert!(view(20, "v").conflicts(&view(21, "v")));
        assert!(!view(20, "v").conflicts(&view(21, "w")));
        assert!(!view(20, "t").conflicts(&DbObject::Table(Table::new(u(21), "t"))));
    }

    #[test]
    fn test_column_rules() {
        assert!(column(20, 10, "a").conflicts(&column(21, 10, "a")));
        assert!(!column(20, 10, "a").conflicts(&column(21, 11, "a")));
        assert!(column(20, 10, "a").conflicts(&drop(10, 0)));
        assert!(drop(10, 0).conflicts(&column(21, 10, "b")));
        assert!(drop(20, 10).conflicts(&column(20, 10, "b")));
    }

    #[test]
    fn test_alter_and_drop_rules() {
        assert!(alter(10, None).conflicts(&alter(10, Some(20))));
        assert!(alter(10, Some(20)).conflicts(&drop(20, 10)));
        // only the dropped object itself matters, not its parent
        assert!(!drop(20, 10).conflicts(&alter(10, Some(21))));
        assert!(drop(20, 10).conflicts(&alter(11, Some(20))));
        assert!(!drop(20, 10).conflicts(&alter(11, Some(21))));

        assert!(drop(20, 10).conflicts(&drop(20, 10)));
        assert!(drop(10, 0).conflicts(&drop(20, 10)));
        assert!(drop(20, 10).conflicts(&drop(10, 0)));
        assert!(!drop(20, 10).conflicts(&drop(21, 10)));
    }

    #[test]
    fn test_row_rules() {
        let upd = DbObject::Update(record(50, 30, 10));
        let other = DbObject::Update(record(51, 30, 10));
        let elsewhere = DbObject::Update(record(52, 31, 10));
        let del = DbObject::Delete(Delete {
            uid: u(53),
            table: u(10),
            delpos: u(30),
        });
        assert!(upd.conflicts(&other));
        assert!(!upd.conflicts(&elsewhere));
        assert!(upd.conflicts(&del));
        assert!(del.conflicts(&other));
        assert!(DbObject::Record(record(30, 30, 10)).conflicts(&del));
        // two inserts never clash here; the primary index catches them
        assert!(!DbObject::Record(record(30, 30, 10)).conflicts(&DbObject::Record(record(31, 31, 10))));
    }

    #[test]
    fn test_read_set_check() {
        let reads: OrderedMap<Uid, ()> = [(u(30), ())].into_iter().collect();
        assert!(DbObject::Update(record(50, 30, 10)).check(&reads));
        assert!(!DbObject::Update(record(50, 31, 10)).check(&reads));

        let table_read: OrderedMap<Uid, ()> = [(u(10), ())].into_iter().collect();
        assert!(DbObject::Record(record(60, 60, 10)).check(&table_read));
        assert!(!DbObject::Table(Table::new(u(10), "t")).check(&table_read));
    }

    #[test]
    fn test_fix_rewrites_local_references() {
        let local_table = Uid::FIRST_TRANSACTION;
        let local_col = Uid::FIRST_TRANSACTION.next();
        let map = UidMap::new().with(local_table, u(4)).with(local_col, u(20));
        let rec = Record::new(
            Uid::FIRST_TRANSACTION.next().next(),
            local_table,
            [(local_col, Value::int(7))].into_iter().collect(),
        );
        let map = map.with(rec.uid, u(40));
        let DbObject::Record(fixed) = DbObject::Record(rec).fix(&map) else {
            panic!("kind changed");
        };
        assert_eq!(fixed.uid, u(40));
        assert_eq!(fixed.defpos, u(40));
        assert_eq!(fixed.table, u(4));
        assert_eq!(fixed.field(u(20)), Value::int(7));
        assert_eq!(map.fix(u(99)), u(99));
    }
}
