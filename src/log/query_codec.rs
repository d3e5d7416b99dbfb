//! Query and expression encoding
//!
//! Query trees only reach the log inside view definitions. Each node is
//! a tag byte followed by its parts; literals are written as plain
//! values, whose tags never collide with the node tags below.

use std::sync::Arc;

use crate::error::{DbError, Result};
use crate::query::{
    AggregateFn, BinaryOp, Expr, InList, JoinKind, OrderItem, Query, Select, UnaryOp,
};

use super::codec::{Reader, Writer};

/// Node tags.
pub mod query_tags {
    pub const ROW: u8 = 8;
    pub const SEARCH: u8 = 18;
    pub const SELECT: u8 = 28;
    pub const EXPRESSION: u8 = 35;
    pub const FUNCTION: u8 = 36;
    pub const VALUES: u8 = 37;
    pub const ORDER: u8 = 38;
    pub const IN_PREDICATE: u8 = 40;
    pub const GROUP_QUERY: u8 = 42;
    pub const JOIN: u8 = 43;
    pub const ALIAS: u8 = 44;
    pub const SELECTOR: u8 = 45;
    pub const ARG: u8 = 46;
    pub const NAME: u8 = 49;
    pub const QUERY: u8 = 51;
}

use query_tags::*;

/// Function code of `IS NULL`; aggregates use their own codes.
const FUNCTION_IS_NULL: u8 = 5;

const IN_LIST: u8 = 0;
const IN_QUERY: u8 = 1;

impl Writer {
    pub fn put_query(&mut self, q: &Query) -> Result<()> {
        match q {
            Query::Table(uid) => {
                self.put_byte(QUERY);
                self.put_uid(*uid);
            }
            Query::Alias { source, alias } => {
                self.put_byte(ALIAS);
                self.put_string(alias);
                self.put_query(source)?;
            }
            Query::Search { source, predicate } => {
                self.put_byte(SEARCH);
                self.put_query(source)?;
                self.put_expr(predicate)?;
            }
            Query::Join {
                kind,
                left,
                right,
                on,
            } => {
                self.put_byte(JOIN);
                self.put_byte(kind.code());
                self.put_query(left)?;
                self.put_query(right)?;
                self.put_int(on.len() as i64);
                for (l, r) in on {
                    self.put_expr(l)?;
                    self.put_expr(r)?;
                }
            }
            Query::Group {
                source,
                groups,
                having,
            } => {
                self.put_byte(GROUP_QUERY);
                self.put_query(source)?;
                self.put_exprs(groups)?;
                match having {
                    Some(h) => {
                        self.put_byte(1);
                        self.put_expr(h)?;
                    }
                    None => self.put_byte(0),
                }
            }
            Query::Select(s) => {
                self.put_byte(SELECT);
                self.put_query(&s.source)?;
                self.put_byte(u8::from(s.distinct));
                self.put_int(s.display.len() as i64);
                for (name, e) in &s.display {
                    self.put_string(name);
                    self.put_expr(e)?;
                }
                self.put_int(s.order.len() as i64);
                for o in &s.order {
                    self.put_byte(ORDER);
                    self.put_expr(&o.expr)?;
                    self.put_byte(u8::from(o.ascending));
                }
            }
            Query::Values { columns, rows } => {
                self.put_byte(VALUES);
                self.put_int(columns.len() as i64);
                for c in columns {
                    self.put_string(c);
                }
                self.put_int(rows.len() as i64);
                for row in rows {
                    self.put_byte(ROW);
                    self.put_exprs(row)?;
                }
            }
        }
        Ok(())
    }

    fn put_exprs(&mut self, exprs: &[Expr]) -> Result<()> {
        self.put_int(exprs.len() as i64);
        for e in exprs {
            self.put_expr(e)?;
        }
        Ok(())
    }

    pub fn put_expr(&mut self, e: &Expr) -> Result<()> {
        match e {
            Expr::Literal(v) => self.put_value(v)?,
            Expr::Column(uid) => {
                self.put_byte(SELECTOR);
                self.put_uid(*uid);
            }
            Expr::Name(n) => {
                self.put_byte(NAME);
                self.put_string(n);
            }
            Expr::Arg(i) => {
                self.put_byte(ARG);
                self.put_int(*i as i64);
            }
            Expr::Binary(l, op, r) => {
                self.put_byte(EXPRESSION);
                self.put_byte(op.code());
                self.put_expr(l)?;
                self.put_expr(r)?;
            }
            Expr::Unary(op, e) => {
                self.put_byte(EXPRESSION);
                self.put_byte(op.code());
                self.put_expr(e)?;
            }
            // the slot is reassigned when the select is built
            Expr::Aggregate { func, arg, .. } => {
                self.put_byte(FUNCTION);
                self.put_byte(func.code());
                self.put_expr(arg)?;
            }
            Expr::IsNull(e) => {
                self.put_byte(FUNCTION);
                self.put_byte(FUNCTION_IS_NULL);
                self.put_expr(e)?;
            }
            Expr::In { expr, list } => {
                self.put_byte(IN_PREDICATE);
                self.put_expr(expr)?;
                match list {
                    InList::Values(items) => {
                        self.put_byte(IN_LIST);
                        self.put_exprs(items)?;
                    }
                    InList::Query(q) => {
                        self.put_byte(IN_QUERY);
                        self.put_query(q)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Reader<'_> {
    pub fn get_query(&mut self) -> Result<Query> {
        let at = self.offset();
        let tag = self.get_byte()?;
        let q = match tag {
            QUERY => Query::Table(self.get_uid()?),
            ALIAS => {
                let alias = self.get_string()?;
                Query::Alias {
                    alias,
                    source: Box::new(self.get_query()?),
                }
            }
            SEARCH => Query::Search {
                source: Box::new(self.get_query()?),
                predicate: self.get_expr()?,
            },
            JOIN => {
                let code_at = self.offset();
                let code = self.get_byte()?;
                let kind = JoinKind::from_code(code)
                    .ok_or_else(|| DbError::malformed(code_at, format!("join kind {}", code)))?;
                let left = Box::new(self.get_query()?);
                let right = Box::new(self.get_query()?);
                let n = self.get_count()?;
                let mut on = Vec::with_capacity(n);
                for _ in 0..n {
                    on.push((self.get_expr()?, self.get_expr()?));
                }
                Query::Join {
                    kind,
                    left,
                    right,
                    on,
                }
            }
            GROUP_QUERY => {
                let source = Box::new(self.get_query()?);
                let groups = self.get_exprs()?;
                let having = match self.get_byte()? {
                    0 => None,
                    _ => Some(self.get_expr()?),
                };
                Query::Group {
                    source,
                    groups,
                    having,
                }
            }
            SELECT => {
                let source = self.get_query()?;
                let distinct = self.get_byte()? != 0;
                let n = self.get_count()?;
                let mut display = Vec::with_capacity(n);
                for _ in 0..n {
                    let name = self.get_string()?;
                    display.push((name, self.get_expr()?));
                }
                let n = self.get_count()?;
                let mut order = Vec::with_capacity(n);
                for _ in 0..n {
                    self.expect_tag(ORDER)?;
                    let expr = self.get_expr()?;
                    let ascending = self.get_byte()? != 0;
                    order.push(OrderItem { expr, ascending });
                }
                Query::Select(Box::new(Select {
                    source,
                    display,
                    distinct,
                    order,
                }))
            }
            VALUES => {
                let n = self.get_count()?;
                let mut columns: Vec<Arc<str>> = Vec::with_capacity(n);
                for _ in 0..n {
                    columns.push(self.get_string()?);
                }
                let n = self.get_count()?;
                let mut rows = Vec::with_capacity(n);
                for _ in 0..n {
                    self.expect_tag(ROW)?;
                    rows.push(self.get_exprs()?);
                }
                Query::Values { columns, rows }
            }
            tag => return Err(DbError::UnknownTag { tag, offset: at }),
        };
        Ok(q)
    }

    fn expect_tag(&mut self, expected: u8) -> Result<()> {
        let at = self.offset();
        match self.get_byte()? {
            t if t == expected => Ok(()),
            tag => Err(DbError::UnknownTag { tag, offset: at }),
        }
    }

    fn get_exprs(&mut self) -> Result<Vec<Expr>> {
        let n = self.get_count()?;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.get_expr()?);
        }
        Ok(out)
    }

    pub fn get_expr(&mut self) -> Result<Expr> {
        let at = self.offset();
        let tag = self.get_byte()?;
        let e = match tag {
            SELECTOR => Expr::Column(self.get_uid()?),
            NAME => Expr::Name(self.get_string()?),
            ARG => Expr::Arg(self.get_count()?),
            EXPRESSION => {
                let code_at = self.offset();
                let code = self.get_byte()?;
                if let Some(op) = BinaryOp::from_code(code) {
                    let l = self.get_expr()?;
                    let r = self.get_expr()?;
                    Expr::binary(l, op, r)
                } else if let Some(op) = UnaryOp::from_code(code) {
                    Expr::Unary(op, Box::new(self.get_expr()?))
                } else {
                    return Err(DbError::malformed(code_at, format!("operator {}", code)));
                }
            }
            FUNCTION => {
                let code_at = self.offset();
                match self.get_byte()? {
                    FUNCTION_IS_NULL => Expr::IsNull(Box::new(self.get_expr()?)),
                    code => {
                        let func = AggregateFn::from_code(code).ok_or_else(|| {
                            DbError::malformed(code_at, format!("function {}", code))
                        })?;
                        Expr::aggregate(func, self.get_expr()?)
                    }
                }
            }
            IN_PREDICATE => {
                let expr = Box::new(self.get_expr()?);
                let kind_at = self.offset();
                let list = match self.get_byte()? {
                    IN_LIST => InList::Values(self.get_exprs()?),
                    IN_QUERY => InList::Query(Box::new(self.get_query()?)),
                    tag => return Err(DbError::UnknownTag { tag, offset: kind_at }),
                };
                Expr::In { expr, list }
            }
            tag => Expr::Literal(self.value_with_tag(tag, at)?),
        };
        Ok(e)
    }
}
