//! Rows produced by row sets

use std::fmt;
use std::sync::Arc;

use crate::uid::Uid;
use crate::value::Value;

/// Output column of a row set. Columns read straight from a table keep
/// the table column's uid; computed columns get uids from the alias
/// range.
#[derive(Debug, Clone, PartialEq)]
pub struct RowColumn {
    pub uid: Uid,
    pub name: Arc<str>,
}

impl RowColumn {
    pub fn new(uid: Uid, name: &str) -> Self {
        Self {
            uid,
            name: Arc::from(name),
        }
    }

    /// Whether a reference by `name` selects this column: exact match,
    /// or an unqualified name matching the part after `alias.`.
    pub fn answers_to(&self, name: &str) -> bool {
        if &*self.name == name {
            return true;
        }
        !name.contains('.')
            && self
                .name
                .rsplit_once('.')
                .is_some_and(|(_, bare)| bare == name)
    }
}

#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[RowColumn]>,
    values: Arc<[Value]>,
}

impl Row {
    pub fn new(columns: Arc<[RowColumn]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self {
            columns,
            values: Arc::from(values),
        }
    }

    /// All-null row, used for the missing side of an outer join.
    pub fn nulls(columns: Arc<[RowColumn]>) -> Self {
        let values = vec![Value::Null; columns.len()];
        Self::new(columns, values)
    }

    pub fn columns(&self) -> &Arc<[RowColumn]> {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Value> {
        self.values.get(i)
    }

    pub fn by_uid(&self, uid: Uid) -> Option<&Value> {
        let i = self.columns.iter().position(|c| c.uid == uid)?;
        self.values.get(i)
    }

    pub fn by_name(&self, name: &str) -> Option<&Value> {
        let i = self
            .columns
            .iter()
            .position(|c| &*c.name == name)
            .or_else(|| self.columns.iter().position(|c| c.answers_to(name)))?;
        self.values.get(i)
    }

    /// Left row followed by right row, under the given combined columns.
    pub fn concat(columns: Arc<[RowColumn]>, left: &Row, right: &Row) -> Self {
        let values = left.values.iter().chain(right.values.iter()).cloned().collect();
        Self::new(columns, values)
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", v)?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Arc<[RowColumn]> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| RowColumn::new(Uid::new(10 + i as i64), n))
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_lookup_by_uid_and_name() {
        let row = Row::new(cols(&["a", "b.c"]), vec![Value::int(1), Value::str("x")]);
        assert_eq!(row.by_uid(Uid::new(10)), Some(&Value::int(1)));
        assert_eq!(row.by_name("b.c"), Some(&Value::str("x")));
        assert_eq!(row.by_name("c"), Some(&Value::str("x")));
        assert_eq!(row.by_name("d.c"), None);
        assert_eq!(row.to_string(), "(1,'x')");
    }

    #[test]
    fn test_exact_name_wins_over_suffix() {
        let row = Row::new(cols(&["t.k", "k"]), vec![Value::int(1), Value::int(2)]);
        assert_eq!(row.by_name("k"), Some(&Value::int(2)));
    }
}
