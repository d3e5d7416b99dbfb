//! Name namespace
//!
//! Maps uids to display names and back: one global namespace for
//! tables, views and system tables, plus one per table for its columns.
//! Names are only needed to resolve identifiers and print results;
//! evaluation works on uids throughout.

use std::sync::Arc;

use crate::collections::OrderedMap;
use crate::error::{DbError, Result};
use crate::uid::Uid;

#[derive(Debug, Clone, Default)]
pub struct Role {
    names: OrderedMap<Uid, Arc<str>>,
    globals: OrderedMap<Arc<str>, Uid>,
    columns: OrderedMap<Uid, OrderedMap<Arc<str>, Uid>>,
}

impl Role {
    pub fn name_of(&self, uid: Uid) -> Option<&str> {
        self.names.get(&uid).map(|n| &**n)
    }

    pub fn lookup(&self, name: &str) -> Option<Uid> {
        self.globals.get(&Arc::from(name)).copied()
    }

    pub fn column(&self, table: Uid, name: &str) -> Option<Uid> {
        self.columns.get(&table)?.get(&Arc::from(name)).copied()
    }

    /// Table-qualified display name of a column, e.g. `orders.id`.
    pub fn qualified(&self, table: Uid, column: Uid) -> String {
        format!(
            "{}.{}",
            self.name_of(table).unwrap_or("?"),
            self.name_of(column).unwrap_or("?")
        )
    }

    pub fn with_global(&self, name: &str, uid: Uid) -> Result<Self> {
        if self.lookup(name).is_some() {
            return Err(DbError::DuplicateName(name.to_string()));
        }
        let name: Arc<str> = Arc::from(name);
        Ok(Self {
            names: self.names.insert(uid, name.clone()),
            globals: self.globals.insert(name, uid),
            columns: self.columns.clone(),
        })
    }

    pub fn without_global(&self, uid: Uid) -> Self {
        let globals = match self.names.get(&uid) {
            Some(name) => self.globals.remove(name),
            None => self.globals.clone(),
        };
        Self {
            names: self.names.remove(&uid),
            globals,
            columns: self.columns.remove(&uid),
        }
    }

    pub fn renamed_global(&self, uid: Uid, name: &str) -> Result<Self> {
        if self.lookup(name).is_some_and(|other| other != uid) {
            return Err(DbError::DuplicateName(name.to_string()));
        }
        let cleared = Self {
            names: self.names.remove(&uid),
            globals: match self.names.get(&uid) {
                Some(old) => self.globals.remove(old),
                None => self.globals.clone(),
            },
            columns: self.columns.clone(),
        };
        cleared.with_global(name, uid)
    }

    pub fn with_column(&self, table: Uid, name: &str, uid: Uid) -> Self {
        let name: Arc<str> = Arc::from(name);
        let cols = self.columns.get(&table).cloned().unwrap_or_default();
        Self {
            names: self.names.insert(uid, name.clone()),
            globals: self.globals.clone(),
            columns: self.columns.insert(table, cols.insert(name, uid)),
        }
    }

    pub fn without_column(&self, table: Uid, uid: Uid) -> Self {
        let cols = match (self.columns.get(&table), self.names.get(&uid)) {
            (Some(cols), Some(name)) => cols.remove(name),
            (Some(cols), None) => cols.clone(),
            (None, _) => OrderedMap::new(),
        };
        Self {
            names: self.names.remove(&uid),
            globals: self.globals.clone(),
            columns: self.columns.insert(table, cols),
        }
    }

    pub fn renamed_column(&self, table: Uid, uid: Uid, name: &str) -> Self {
        self.without_column(table, uid).with_column(table, name, uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_names_are_unique() {
        let role = Role::default().with_global("t", Uid::new(4)).unwrap();
        assert_eq!(role.lookup("t"), Some(Uid::new(4)));
        assert_eq!(role.name_of(Uid::new(4)), Some("t"));
        assert!(matches!(
            role.with_global("t", Uid::new(9)),
            Err(DbError::DuplicateName(_))
        ));
    }

    #[test]
    fn test_rename_table_frees_old_name() {
        let role = Role::default()
            .with_global("old", Uid::new(4))
            .unwrap()
            .renamed_global(Uid::new(4), "new")
            .unwrap();
        assert_eq!(role.lookup("old"), None);
        assert_eq!(role.lookup("new"), Some(Uid::new(4)));
    }

    #[test]
    fn test_column_namespace_per_table() {
        let role = Role::default()
            .with_global("a", Uid::new(1))
            .unwrap()
            .with_global("b", Uid::new(2))
            .unwrap()
            .with_column(Uid::new(1), "k", Uid::new(10))
            .with_column(Uid::new(2), "k", Uid::new(20));
        assert_eq!(role.column(Uid::new(1), "k"), Some(Uid::new(10)));
        assert_eq!(role.column(Uid::new(2), "k"), Some(Uid::new(20)));
        assert_eq!(role.qualified(Uid::new(2), Uid::new(20)), "b.k");

        let role = role.renamed_column(Uid::new(2), Uid::new(20), "key");
        assert_eq!(role.column(Uid::new(2), "k"), None);
        assert_eq!(role.column(Uid::new(2), "key"), Some(Uid::new(20)));
    }
}
