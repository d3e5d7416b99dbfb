//! Query trees
//!
//! A [`Query`] says what rows to produce; [`crate::rowset::build`] turns
//! it into a lazy row set against a transaction. Tables, views and
//! columns are referenced by uid, so a query tree stays valid across
//! renames. [`Statement`] is the layer above that resolves display
//! names.

pub mod context;
pub mod expr;
pub mod row;
pub mod statement;

use std::sync::Arc;

use crate::uid::Uid;

pub use context::{Context, Scope};
pub use expr::{AggregateFn, BinaryOp, Expr, InList, UnaryOp};
pub use row::{Row, RowColumn};
pub use statement::{ColumnDef, DropTarget, IndexKind, InsertSource, Outcome, Statement};

/// Join flavours. The discriminants are the wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner = 1,
    Cross = 4,
    Left = 8,
    Right = 16,
    Full = 24,
}

impl JoinKind {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(JoinKind::Inner),
            4 => Some(JoinKind::Cross),
            8 => Some(JoinKind::Left),
            16 => Some(JoinKind::Right),
            24 => Some(JoinKind::Full),
            _ => None,
        }
    }

    /// Unmatched left rows are emitted padded with nulls.
    pub fn keeps_left(self) -> bool {
        self.code() & JoinKind::Left.code() != 0
    }

    /// Unmatched right rows are emitted padded with nulls.
    pub fn keeps_right(self) -> bool {
        self.code() & JoinKind::Right.code() != 0
    }
}

#[derive(Debug, Clone)]
pub struct OrderItem {
    pub expr: Expr,
    pub ascending: bool,
}

impl OrderItem {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            ascending: true,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            ascending: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Select {
    pub source: Query,
    /// Output columns; empty means all source columns.
    pub display: Vec<(Arc<str>, Expr)>,
    pub distinct: bool,
    pub order: Vec<OrderItem>,
}

#[derive(Debug, Clone)]
pub enum Query {
    /// A table or view, by uid.
    Table(Uid),
    Alias {
        source: Box<Query>,
        alias: Arc<str>,
    },
    Search {
        source: Box<Query>,
        predicate: Expr,
    },
    /// `on` pairs a left-side expression with a right-side one.
    Join {
        kind: JoinKind,
        left: Box<Query>,
        right: Box<Query>,
        on: Vec<(Expr, Expr)>,
    },
    Group {
        source: Box<Query>,
        groups: Vec<Expr>,
        having: Option<Expr>,
    },
    Select(Box<Select>),
    Values {
        columns: Vec<Arc<str>>,
        rows: Vec<Vec<Expr>>,
    },
}

impl Query {
    pub fn table(uid: Uid) -> Self {
        Query::Table(uid)
    }

    pub fn alias(self, alias: &str) -> Self {
        Query::Alias {
            source: Box::new(self),
            alias: Arc::from(alias),
        }
    }

    pub fn search(self, predicate: Expr) -> Self {
        Query::Search {
            source: Box::new(self),
            predicate,
        }
    }

    pub fn join(self, kind: JoinKind, right: Query, on: Vec<(Expr, Expr)>) -> Self {
        Query::Join {
            kind,
            left: Box::new(self),
            right: Box::new(right),
            on,
        }
    }

    pub fn group(self, groups: Vec<Expr>, having: Option<Expr>) -> Self {
        Query::Group {
            source: Box::new(self),
            groups,
            having,
        }
    }

    /// `SELECT display FROM self`.
    pub fn select(self, display: Vec<(&str, Expr)>) -> Self {
        Query::Select(Box::new(Select {
            source: self,
            display: display
                .into_iter()
                .map(|(n, e)| (Arc::from(n), e))
                .collect(),
            distinct: false,
            order: Vec::new(),
        }))
    }

    /// Add `ORDER BY`, wrapping in a select of all columns if needed.
    pub fn order_by(self, order: Vec<OrderItem>) -> Self {
        match self {
            Query::Select(mut s) => {
                s.order = order;
                Query::Select(s)
            }
            other => Query::Select(Box::new(Select {
                source: other,
                display: Vec::new(),
                distinct: false,
                order,
            })),
        }
    }

    pub fn distinct(self) -> Self {
        match self {
            Query::Select(mut s) => {
                s.distinct = true;
                Query::Select(s)
            }
            other => Query::Select(Box::new(Select {
                source: other,
                display: Vec::new(),
                distinct: true,
                order: Vec::new(),
            })),
        }
    }

    pub fn map_uids(&self, f: &impl Fn(Uid) -> Uid) -> Query {
        match self {
            Query::Table(uid) => Query::Table(f(*uid)),
            Query::Alias { source, alias } => Query::Alias {
                source: Box::new(source.map_uids(f)),
                alias: alias.clone(),
            },
            Query::Search { source, predicate } => Query::Search {
                source: Box::new(source.map_uids(f)),
                predicate: predicate.map_uids(f),
            },
            Query::Join {
                kind,
                left,
                right,
                on,
            } => Query::Join {
                kind: *kind,
                left: Box::new(left.map_uids(f)),
                right: Box::new(right.map_uids(f)),
                on: on
                    .iter()
                    .map(|(l, r)| (l.map_uids(f), r.map_uids(f)))
                    .collect(),
            },
            Query::Group {
                source,
                groups,
                having,
            } => Query::Group {
                source: Box::new(source.map_uids(f)),
                groups: groups.iter().map(|g| g.map_uids(f)).collect(),
                having: having.as_ref().map(|h| h.map_uids(f)),
            },
            Query::Select(s) => Query::Select(Box::new(Select {
                source: s.source.map_uids(f),
                display: s
                    .display
                    .iter()
                    .map(|(n, e)| (n.clone(), e.map_uids(f)))
                    .collect(),
                distinct: s.distinct,
                order: s
                    .order
                    .iter()
                    .map(|o| OrderItem {
                        expr: o.expr.map_uids(f),
                        ascending: o.ascending,
                    })
                    .collect(),
            })),
            Query::Values { columns, rows } => Query::Values {
                columns: columns.clone(),
                rows: rows
                    .iter()
                    .map(|r| r.iter().map(|e| e.map_uids(f)).collect())
                    .collect(),
            },
        }
    }

    /// Queries this node reads from directly.
    pub fn inputs(&self) -> Vec<&Query> {
        match self {
            Query::Table(_) | Query::Values { .. } => Vec::new(),
            Query::Alias { source, .. }
            | Query::Search { source, .. }
            | Query::Group { source, .. } => vec![&**source],
            Query::Join { left, right, .. } => vec![&**left, &**right],
            Query::Select(s) => vec![&s.source],
        }
    }

    /// Expressions held by this node itself, not by its inputs.
    pub fn expressions(&self) -> Vec<&Expr> {
        match self {
            Query::Table(_) | Query::Alias { .. } => Vec::new(),
            Query::Search { predicate, .. } => vec![predicate],
            Query::Join { on, .. } => on.iter().flat_map(|(l, r)| [l, r]).collect(),
            Query::Group { groups, having, .. } => groups.iter().chain(having.as_ref()).collect(),
            Query::Select(s) => s
                .display
                .iter()
                .map(|(_, e)| e)
                .chain(s.order.iter().map(|o| &o.expr))
                .collect(),
            Query::Values { rows, .. } => rows.iter().flatten().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_kind_flags() {
        assert!(JoinKind::Full.keeps_left() && JoinKind::Full.keeps_right());
        assert!(JoinKind::Left.keeps_left() && !JoinKind::Left.keeps_right());
        assert!(!JoinKind::Inner.keeps_left() && !JoinKind::Cross.keeps_right());
    }

    #[test]
    fn test_map_uids_reaches_nested_references() {
        let q = Query::table(Uid::new(1))
            .search(Expr::eql(Expr::Column(Uid::new(2)), Expr::lit(3)))
            .select(vec![("x", Expr::Column(Uid::new(2)))]);
        let mapped = q.map_uids(&|u| Uid::new(u.raw() * 10));
        let Query::Select(s) = mapped else {
            panic!("not a select");
        };
        assert!(matches!(s.display[0].1, Expr::Column(u) if u == Uid::new(20)));
        let Query::Search { source, .. } = &s.source else {
            panic!("not a search");
        };
        assert!(matches!(**source, Query::Table(u) if u == Uid::new(10)));
    }
}
