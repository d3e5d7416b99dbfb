//! Scalar expressions
//!
//! Comparisons and logic follow SQL three-valued semantics: a
//! comparison with a null operand is null, `AND`/`OR` treat null as
//! unknown, and a row passes a filter only when the filter is true.

use std::cmp::Ordering;

use crate::error::{DbError, Result};
use crate::rowset;
use crate::transaction::Transaction;
use crate::uid::Uid;
use crate::value::Value;

use super::context::Context;
use super::Query;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Plus,
    Minus,
    Times,
    Divide,
    Eql,
    NotEql,
    Lss,
    Leq,
    Gtr,
    Geq,
    And,
    Or,
}

impl BinaryOp {
    const ALL: [BinaryOp; 12] = [
        BinaryOp::Plus,
        BinaryOp::Minus,
        BinaryOp::Times,
        BinaryOp::Divide,
        BinaryOp::Eql,
        BinaryOp::NotEql,
        BinaryOp::Lss,
        BinaryOp::Leq,
        BinaryOp::Gtr,
        BinaryOp::Geq,
        BinaryOp::And,
        BinaryOp::Or,
    ];

    /// Wire code, 1-based.
    pub fn code(self) -> u8 {
        Self::ALL.iter().position(|o| *o == self).map_or(0, |i| i as u8 + 1)
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get((code as usize).checked_sub(1)?).copied()
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eql
                | BinaryOp::NotEql
                | BinaryOp::Lss
                | BinaryOp::Leq
                | BinaryOp::Gtr
                | BinaryOp::Geq
        )
    }

    /// The operator that holds with the operands swapped: `1 < a` is
    /// `a > 1`.
    pub fn reverse(self) -> Self {
        match self {
            BinaryOp::Lss => BinaryOp::Gtr,
            BinaryOp::Leq => BinaryOp::Geq,
            BinaryOp::Gtr => BinaryOp::Lss,
            BinaryOp::Geq => BinaryOp::Leq,
            other => other,
        }
    }

    pub(crate) fn holds(self, ord: Ordering) -> bool {
        match self {
            BinaryOp::Eql => ord == Ordering::Equal,
            BinaryOp::NotEql => ord != Ordering::Equal,
            BinaryOp::Lss => ord == Ordering::Less,
            BinaryOp::Leq => ord != Ordering::Greater,
            BinaryOp::Gtr => ord == Ordering::Greater,
            BinaryOp::Geq => ord != Ordering::Less,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Not,
}

impl UnaryOp {
    /// Wire codes continue after the binary ones.
    pub fn code(self) -> u8 {
        match self {
            UnaryOp::Minus => 20,
            UnaryOp::Not => 21,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            20 => Some(UnaryOp::Minus),
            21 => Some(UnaryOp::Not),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Max,
    Min,
}

impl AggregateFn {
    pub fn code(self) -> u8 {
        match self {
            AggregateFn::Count => 1,
            AggregateFn::Sum => 2,
            AggregateFn::Max => 3,
            AggregateFn::Min => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(AggregateFn::Count),
            2 => Some(AggregateFn::Sum),
            3 => Some(AggregateFn::Max),
            4 => Some(AggregateFn::Min),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Max => "MAX",
            AggregateFn::Min => "MIN",
        }
    }
}

#[derive(Debug, Clone)]
pub enum InList {
    Values(Vec<Expr>),
    Query(Box<Query>),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Column(Uid),
    /// Column reference by display name, resolved through the context.
    Name(std::sync::Arc<str>),
    Arg(usize),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    /// `slot` is assigned when the enclosing select is built.
    Aggregate {
        func: AggregateFn,
        arg: Box<Expr>,
        slot: usize,
    },
    IsNull(Box<Expr>),
    In {
        expr: Box<Expr>,
        list: InList,
    },
}

impl Expr {
    pub fn lit(v: impl Into<Value>) -> Self {
        Expr::Literal(v.into())
    }

    pub fn name(name: &str) -> Self {
        Expr::Name(std::sync::Arc::from(name))
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary(Box::new(left), op, Box::new(right))
    }

    pub fn eql(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Eql, right)
    }

    pub fn and(self, other: Expr) -> Self {
        Self::binary(self, BinaryOp::And, other)
    }

    pub fn aggregate(func: AggregateFn, arg: Expr) -> Self {
        Expr::Aggregate {
            func,
            arg: Box::new(arg),
            slot: 0,
        }
    }

    /// `COUNT(*)`
    pub fn count_all() -> Self {
        Self::aggregate(AggregateFn::Count, Expr::lit(1))
    }

    pub fn eval(&self, tr: &Transaction, cx: &Context) -> Result<Value> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Column(uid) => cx
                .column(*uid)
                .cloned()
                .ok_or_else(|| DbError::UnknownColumn(uid.to_string())),
            Expr::Name(n) => cx
                .name(n)
                .cloned()
                .ok_or_else(|| DbError::UnknownName(n.to_string())),
            Expr::Arg(i) => cx
                .arg(*i)
                .cloned()
                .ok_or_else(|| DbError::InvalidOperation(format!("no argument {}", i))),
            Expr::Binary(l, BinaryOp::And, r) => {
                let a = l.eval(tr, cx)?.truth()?;
                if a == Some(false) {
                    return Ok(Value::Boolean(false));
                }
                Ok(match (a, r.eval(tr, cx)?.truth()?) {
                    (_, Some(false)) => Value::Boolean(false),
                    (Some(true), Some(true)) => Value::Boolean(true),
                    _ => Value::Null,
                })
            }
            Expr::Binary(l, BinaryOp::Or, r) => {
                let a = l.eval(tr, cx)?.truth()?;
                if a == Some(true) {
                    return Ok(Value::Boolean(true));
                }
                Ok(match (a, r.eval(tr, cx)?.truth()?) {
                    (_, Some(true)) => Value::Boolean(true),
                    (Some(false), Some(false)) => Value::Boolean(false),
                    _ => Value::Null,
                })
            }
            Expr::Binary(l, op, r) => {
                let a = l.eval(tr, cx)?;
                let b = r.eval(tr, cx)?;
                match op {
                    BinaryOp::Plus => a.add(&b),
                    BinaryOp::Minus => a.sub(&b),
                    BinaryOp::Times => a.mul(&b),
                    BinaryOp::Divide => a.div(&b),
                    _ if a.is_null() || b.is_null() => Ok(Value::Null),
                    cmp => Ok(Value::Boolean(cmp.holds(a.cmp(&b)))),
                }
            }
            Expr::Unary(UnaryOp::Minus, e) => e.eval(tr, cx)?.neg(),
            Expr::Unary(UnaryOp::Not, e) => Ok(match e.eval(tr, cx)?.truth()? {
                Some(b) => Value::Boolean(!b),
                None => Value::Null,
            }),
            Expr::Aggregate { func, slot, .. } => cx.aggregate(*slot).cloned().ok_or_else(|| {
                DbError::InvalidOperation(format!("{} outside of an aggregation", func.name()))
            }),
            Expr::IsNull(e) => Ok(Value::Boolean(e.eval(tr, cx)?.is_null())),
            Expr::In { expr, list } => {
                let v = expr.eval(tr, cx)?;
                if v.is_null() {
                    return Ok(Value::Null);
                }
                let mut saw_null = false;
                let mut probe = |w: &Value| {
                    if w.is_null() {
                        saw_null = true;
                        false
                    } else {
                        *w == v
                    }
                };
                match list {
                    InList::Values(items) => {
                        for item in items {
                            if probe(&item.eval(tr, cx)?) {
                                return Ok(Value::Boolean(true));
                            }
                        }
                    }
                    InList::Query(q) => {
                        let rs = rowset::build(tr.clone(), q, cx)?;
                        let mut bm = rowset::first(&rs)?;
                        while let Some(b) = bm {
                            if probe(b.row().get(0).unwrap_or(&Value::Null)) {
                                return Ok(Value::Boolean(true));
                            }
                            bm = b.next()?;
                        }
                    }
                }
                Ok(if saw_null {
                    Value::Null
                } else {
                    Value::Boolean(false)
                })
            }
        }
    }

    /// True only when the expression evaluates to true.
    pub fn matches(&self, tr: &Transaction, cx: &Context) -> Result<bool> {
        Ok(self.eval(tr, cx)?.truth()? == Some(true))
    }

    /// Top-level `AND` operands.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::Binary(l, BinaryOp::And, r) => {
                let mut out = l.conjuncts();
                out.extend(r.conjuncts());
                out
            }
            other => vec![other],
        }
    }

    pub fn has_aggregates(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Binary(l, _, r) => l.has_aggregates() || r.has_aggregates(),
            Expr::Unary(_, e) | Expr::IsNull(e) => e.has_aggregates(),
            Expr::In { expr, list } => {
                expr.has_aggregates()
                    || matches!(list, InList::Values(items) if items.iter().any(Expr::has_aggregates))
            }
            _ => false,
        }
    }

    /// Queries of the `IN (subquery)` lists inside this expression,
    /// outermost first.
    pub fn subqueries(&self) -> Vec<&Query> {
        match self {
            Expr::Binary(l, _, r) => {
                let mut out = l.subqueries();
                out.extend(r.subqueries());
                out
            }
            Expr::Unary(_, e) | Expr::IsNull(e) => e.subqueries(),
            Expr::Aggregate { arg, .. } => arg.subqueries(),
            Expr::In { expr, list } => {
                let mut out = expr.subqueries();
                match list {
                    InList::Values(items) => out.extend(items.iter().flat_map(Expr::subqueries)),
                    InList::Query(q) => out.push(&**q),
                }
                out
            }
            Expr::Literal(_) | Expr::Column(_) | Expr::Name(_) | Expr::Arg(_) => Vec::new(),
        }
    }

    /// Give every aggregate a slot, collecting `(function, argument)` per
    /// slot into `slots`.
    pub fn number_aggregates(&self, slots: &mut Vec<(AggregateFn, Expr)>) -> Expr {
        match self {
            Expr::Aggregate { func, arg, .. } => {
                slots.push((*func, (**arg).clone()));
                Expr::Aggregate {
                    func: *func,
                    arg: arg.clone(),
                    slot: slots.len() - 1,
                }
            }
            Expr::Binary(l, op, r) => Expr::Binary(
                Box::new(l.number_aggregates(slots)),
                *op,
                Box::new(r.number_aggregates(slots)),
            ),
            Expr::Unary(op, e) => Expr::Unary(*op, Box::new(e.number_aggregates(slots))),
            Expr::IsNull(e) => Expr::IsNull(Box::new(e.number_aggregates(slots))),
            Expr::In { expr, list } => Expr::In {
                expr: Box::new(expr.number_aggregates(slots)),
                list: match list {
                    InList::Values(items) => {
                        InList::Values(items.iter().map(|e| e.number_aggregates(slots)).collect())
                    }
                    InList::Query(q) => InList::Query(q.clone()),
                },
            },
            other => other.clone(),
        }
    }

    pub fn map_uids(&self, f: &impl Fn(Uid) -> Uid) -> Expr {
        match self {
            Expr::Column(uid) => Expr::Column(f(*uid)),
            Expr::Binary(l, op, r) => {
                Expr::Binary(Box::new(l.map_uids(f)), *op, Box::new(r.map_uids(f)))
            }
            Expr::Unary(op, e) => Expr::Unary(*op, Box::new(e.map_uids(f))),
            Expr::Aggregate { func, arg, slot } => Expr::Aggregate {
                func: *func,
                arg: Box::new(arg.map_uids(f)),
                slot: *slot,
            },
            Expr::IsNull(e) => Expr::IsNull(Box::new(e.map_uids(f))),
            Expr::In { expr, list } => Expr::In {
                expr: Box::new(expr.map_uids(f)),
                list: match list {
                    InList::Values(items) => {
                        InList::Values(items.iter().map(|e| e.map_uids(f)).collect())
                    }
                    InList::Query(q) => InList::Query(Box::new(q.map_uids(f))),
                },
            },
            other => other.clone(),
        }
    }

    /// The column this expression names directly, resolved against
    /// `columns` when given by name.
    pub fn column_uid(&self, columns: &[super::RowColumn]) -> Option<Uid> {
        match self {
            Expr::Column(uid) => columns.iter().any(|c| c.uid == *uid).then_some(*uid),
            Expr::Name(n) => columns
                .iter()
                .find(|c| *c.name == **n)
                .or_else(|| columns.iter().find(|c| c.answers_to(n)))
                .map(|c| c.uid),
            _ => None,
        }
    }

    /// Whether every column this expression mentions resolves in
    /// `columns`.
    pub fn resolves_in(&self, columns: &[super::RowColumn]) -> bool {
        match self {
            Expr::Column(_) | Expr::Name(_) => self.column_uid(columns).is_some(),
            Expr::Binary(l, _, r) => l.resolves_in(columns) && r.resolves_in(columns),
            Expr::Unary(_, e) | Expr::IsNull(e) => e.resolves_in(columns),
            Expr::Aggregate { arg, .. } => arg.resolves_in(columns),
            Expr::In { expr, list } => {
                expr.resolves_in(columns)
                    && match list {
                        InList::Values(items) => items.iter().all(|e| e.resolves_in(columns)),
                        InList::Query(_) => true,
                    }
            }
            Expr::Literal(_) | Expr::Arg(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_manager::SharedDatabase;

    fn tr() -> Transaction {
        SharedDatabase::in_memory("expr").begin(false)
    }

    fn eval(e: &Expr) -> Value {
        e.eval(&tr(), &Context::new()).unwrap()
    }

    #[test]
    fn test_three_valued_logic() {
        let null = Expr::lit(Value::Null);
        let t = Expr::lit(true);
        let f = Expr::lit(false);
        assert_eq!(eval(&null.clone().and(f.clone())), Value::Boolean(false));
        assert!(eval(&null.clone().and(t.clone())).is_null());
        assert_eq!(
            eval(&Expr::binary(null.clone(), BinaryOp::Or, t)),
            Value::Boolean(true)
        );
        assert!(eval(&Expr::binary(null.clone(), BinaryOp::Or, f)).is_null());
        assert!(eval(&Expr::eql(null, Expr::lit(1))).is_null());
    }

    #[test]
    fn test_in_list_with_null() {
        let list = |items: Vec<Expr>| Expr::In {
            expr: Box::new(Expr::lit(2)),
            list: InList::Values(items),
        };
        assert_eq!(
            eval(&list(vec![Expr::lit(1), Expr::lit(2)])),
            Value::Boolean(true)
        );
        assert!(eval(&list(vec![Expr::lit(1), Expr::lit(Value::Null)])).is_null());
        assert_eq!(eval(&list(vec![Expr::lit(3)])), Value::Boolean(false));
    }

    #[test]
    fn test_reverse_comparison() {
        assert_eq!(BinaryOp::Lss.reverse(), BinaryOp::Gtr);
        assert_eq!(BinaryOp::Eql.reverse(), BinaryOp::Eql);
        for op in BinaryOp::ALL {
            assert_eq!(BinaryOp::from_code(op.code()), Some(op));
        }
    }

    #[test]
    fn test_number_aggregates_assigns_slots() {
        let e = Expr::binary(
            Expr::aggregate(AggregateFn::Sum, Expr::name("v")),
            BinaryOp::Divide,
            Expr::count_all(),
        );
        let mut slots = Vec::new();
        let numbered = e.number_aggregates(&mut slots);
        assert_eq!(slots.len(), 2);
        let cx = Context::new().with_aggregates(vec![Value::int(10), Value::int(4)]);
        assert_eq!(numbered.eval(&tr(), &cx).unwrap(), Value::int(2));
    }

    #[test]
    fn test_conjuncts_flatten() {
        let e = Expr::lit(1).and(Expr::lit(2)).and(Expr::lit(3));
        assert_eq!(e.conjuncts().len(), 3);
    }
}
