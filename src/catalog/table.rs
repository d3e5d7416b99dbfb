//! Tables, columns and indexes

use std::sync::Arc;

use crate::collections::{KeyError, MultiKeyIndex, OrderedMap, TreeBehaviour, TreeInfo};
use crate::error::{DbError, Result};
use crate::uid::Uid;
use crate::value::{format_key, DataType, Value};

use super::record::Record;

// ── Columns ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnConstraint {
    NotNull,
    Default(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub uid: Uid,
    pub table: Uid,
    pub name: Arc<str>,
    pub data_type: DataType,
    pub constraints: Vec<ColumnConstraint>,
}

impl Column {
    pub fn not_null(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c, ColumnConstraint::NotNull))
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.constraints.iter().find_map(|c| match c {
            ColumnConstraint::Default(v) => Some(v),
            _ => None,
        })
    }

    /// Apply the default, coerce to the column type and enforce NOT NULL.
    pub fn admit(&self, supplied: Option<Value>) -> Result<Value> {
        let value = match supplied {
            Some(v) => v,
            None => self.default_value().cloned().unwrap_or_default(),
        };
        let value = value.coerce(self.data_type)?;
        if value.is_null() && self.not_null() {
            return Err(DbError::NotNull(self.name.to_string()));
        }
        Ok(value)
    }
}

// ── Tables ───────────────────────────────────────────────────────────

/// A table value. Adding columns, rows or indexes yields a new table.
#[derive(Debug, Clone)]
pub struct Table {
    pub uid: Uid,
    pub name: Arc<str>,
    pub columns: OrderedMap<Uid, Column>,
    /// Column uids in display order.
    pub display: Arc<[Uid]>,
    /// Row defpos -> uid of the latest version of the row.
    pub rows: OrderedMap<Uid, Uid>,
    pub indexes: OrderedMap<Uid, ()>,
}

impl Table {
    pub fn new(uid: Uid, name: &str) -> Self {
        Self {
            uid,
            name: Arc::from(name),
            columns: OrderedMap::new(),
            display: Arc::from(Vec::<Uid>::new()),
            rows: OrderedMap::new(),
            indexes: OrderedMap::new(),
        }
    }

    pub fn column_named(&self, name: &str) -> Option<&Column> {
        self.display
            .iter()
            .filter_map(|uid| self.columns.get(uid))
            .find(|c| &*c.name == name)
    }

    pub fn ordered_columns(&self) -> impl Iterator<Item = &Column> + '_ {
        self.display.iter().filter_map(|uid| self.columns.get(uid))
    }

    pub fn with_column(&self, column: Column) -> Result<Self> {
        if self.column_named(&column.name).is_some() {
            return Err(DbError::DuplicateColumn {
                table: self.uid,
                name: column.name.to_string(),
            });
        }
        let mut display = self.display.to_vec();
        if !display.contains(&column.uid) {
            display.push(column.uid);
        }
        Ok(Self {
            columns: self.columns.insert(column.uid, column),
            display: Arc::from(display),
            ..self.clone()
        })
    }

    /// Replace an existing column definition (rename or retype).
    pub fn with_altered_column(&self, column: Column) -> Result<Self> {
        if let Some(other) = self.column_named(&column.name) {
            if other.uid != column.uid {
                return Err(DbError::DuplicateColumn {
                    table: self.uid,
                    name: column.name.to_string(),
                });
            }
        }
        Ok(Self {
            columns: self.columns.insert(column.uid, column),
            ..self.clone()
        })
    }

    pub fn without_column(&self, column: Uid) -> Self {
        let display: Vec<Uid> = self.display.iter().copied().filter(|c| *c != column).collect();
        Self {
            columns: self.columns.remove(&column),
            display: Arc::from(display),
            ..self.clone()
        }
    }

    pub fn with_row(&self, defpos: Uid, version: Uid) -> Self {
        Self {
            rows: self.rows.insert(defpos, version),
            ..self.clone()
        }
    }

    pub fn without_row(&self, defpos: Uid) -> Self {
        Self {
            rows: self.rows.remove(&defpos),
            ..self.clone()
        }
    }

    pub fn with_index(&self, index: Uid) -> Self {
        Self {
            indexes: self.indexes.insert(index, ()),
            ..self.clone()
        }
    }

    pub fn without_index(&self, index: Uid) -> Self {
        Self {
            indexes: self.indexes.remove(&index),
            ..self.clone()
        }
    }

    pub fn renamed(&self, name: &str) -> Self {
        Self {
            name: Arc::from(name),
            ..self.clone()
        }
    }
}

// ── Indexes ──────────────────────────────────────────────────────────

/// Primary, unique or foreign-key index over one or more table columns.
/// Row ids in the tree are row defpos values, which survive updates.
#[derive(Debug, Clone)]
pub struct Index {
    pub uid: Uid,
    pub table: Uid,
    pub primary: bool,
    pub columns: Arc<[Uid]>,
    /// Referenced table for a foreign key, [`Uid::NONE`] otherwise.
    pub references: Uid,
    pub rows: MultiKeyIndex,
}

impl Index {
    pub fn new(uid: Uid, table: Uid, primary: bool, columns: Vec<Uid>, references: Uid) -> Self {
        let rows = MultiKeyIndex::new(Self::tree_info(columns.len(), primary, references));
        Self {
            uid,
            table,
            primary,
            columns: Arc::from(columns),
            references,
            rows,
        }
    }

    /// Every level but the last allows duplicates; the last one is unique
    /// unless this is a foreign key. Primary keys reject nulls, other
    /// indexes just leave null keys out.
    fn tree_info(levels: usize, primary: bool, references: Uid) -> Vec<TreeInfo> {
        let foreign = references != Uid::NONE;
        let on_null = if primary {
            TreeBehaviour::Disallow
        } else {
            TreeBehaviour::Ignore
        };
        (0..levels)
            .map(|i| {
                let on_duplicate = if i + 1 < levels || foreign {
                    TreeBehaviour::Allow
                } else {
                    TreeBehaviour::Disallow
                };
                TreeInfo::new(on_duplicate, on_null, true)
            })
            .collect()
    }

    pub fn is_foreign(&self) -> bool {
        self.references != Uid::NONE
    }

    pub fn is_unique(&self) -> bool {
        !self.is_foreign()
    }

    pub fn kind_name(&self) -> &'static str {
        if self.primary {
            "PRIMARY KEY"
        } else if self.is_foreign() {
            "FOREIGN KEY"
        } else {
            "UNIQUE"
        }
    }

    /// The index key of a record.
    pub fn key_of(&self, record: &Record) -> Vec<Value> {
        self.columns.iter().map(|c| record.field(*c)).collect()
    }

    pub fn with_entry(&self, key: &[Value], row: Uid) -> Result<Self> {
        let rows = self.rows.add(key, row.raw()).map_err(|e| match e {
            KeyError::Duplicate => DbError::DuplicateKey {
                index: self.uid,
                key: format_key(key),
            },
            KeyError::Null => DbError::NullKey(self.uid),
        })?;
        Ok(Self {
            rows,
            ..self.clone()
        })
    }

    pub fn without_entry(&self, key: &[Value], row: Uid) -> Self {
        Self {
            rows: self.rows.remove(key, row.raw()),
            ..self.clone()
        }
    }
}
