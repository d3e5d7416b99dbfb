//! Evaluation context
//!
//! A persistent chain of scopes. Bookmarks push the current row on top
//! of their row set's context, so a column reference is resolved in the
//! innermost row that has it and falls back outward (correlated
//! sub-queries see the outer row this way). Pushing never affects the
//! context it was called on.

use std::sync::Arc;

use crate::uid::Uid;
use crate::value::Value;

use super::row::Row;

#[derive(Debug, Clone)]
pub enum Scope {
    Row(Row),
    /// Finished aggregate values, indexed by slot.
    Aggregates(Arc<[Value]>),
    /// Positional statement arguments.
    Args(Arc<[Value]>),
}

#[derive(Debug)]
struct Frame {
    scope: Scope,
    parent: Option<Arc<Frame>>,
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    top: Option<Arc<Frame>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_args(args: Vec<Value>) -> Self {
        Self::new().push(Scope::Args(Arc::from(args)))
    }

    pub fn push(&self, scope: Scope) -> Self {
        Self {
            top: Some(Arc::new(Frame {
                scope,
                parent: self.top.clone(),
            })),
        }
    }

    pub fn with_row(&self, row: Row) -> Self {
        self.push(Scope::Row(row))
    }

    pub fn with_aggregates(&self, values: Vec<Value>) -> Self {
        self.push(Scope::Aggregates(Arc::from(values)))
    }

    fn scopes(&self) -> impl Iterator<Item = &Scope> + '_ {
        std::iter::successors(self.top.as_deref(), |f| f.parent.as_deref()).map(|f| &f.scope)
    }

    /// Innermost row.
    pub fn row(&self) -> Option<&Row> {
        self.scopes().find_map(|s| match s {
            Scope::Row(r) => Some(r),
            _ => None,
        })
    }

    pub fn column(&self, uid: Uid) -> Option<&Value> {
        self.scopes().find_map(|s| match s {
            Scope::Row(r) => r.by_uid(uid),
            _ => None,
        })
    }

    pub fn name(&self, name: &str) -> Option<&Value> {
        self.scopes().find_map(|s| match s {
            Scope::Row(r) => r.by_name(name),
            _ => None,
        })
    }

    pub fn aggregate(&self, slot: usize) -> Option<&Value> {
        self.scopes().find_map(|s| match s {
            Scope::Aggregates(a) => a.get(slot),
            _ => None,
        })
    }

    pub fn arg(&self, i: usize) -> Option<&Value> {
        self.scopes().find_map(|s| match s {
            Scope::Args(a) => a.get(i),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::row::RowColumn;

    #[test]
    fn test_inner_scope_shadows_outer() {
        let cols: Arc<[RowColumn]> = vec![RowColumn::new(Uid::new(5), "a")].into();
        let outer = Context::with_args(vec![Value::int(42)])
            .with_row(Row::new(cols.clone(), vec![Value::int(1)]));
        let inner = outer.with_row(Row::new(cols, vec![Value::int(2)]));

        assert_eq!(inner.column(Uid::new(5)), Some(&Value::int(2)));
        assert_eq!(outer.column(Uid::new(5)), Some(&Value::int(1)));
        assert_eq!(inner.name("a"), Some(&Value::int(2)));
        assert_eq!(inner.arg(0), Some(&Value::int(42)));
        assert_eq!(inner.aggregate(0), None);
    }
}
