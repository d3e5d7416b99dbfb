//! Value model
//!
//! Scalar values stored in records, carried in rows and compared by
//! indexes. Integers are arbitrary precision ([`BigInt`]) and numerics
//! are exact scaled decimals ([`BigDecimal`]), so index keys compare
//! exactly whatever their magnitude.
//!
//! Values have a total order used by every index:
//! `Null < Boolean < numbers < strings`, with integers and numerics
//! compared by numeric value.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::error::{DbError, Result};

/// Scale used for the quotient when either division operand is numeric.
const DIVISION_SCALE: i64 = 16;

// ── Data types ───────────────────────────────────────────────────────

/// Declared type of a column. The discriminants are the log tags of
/// the corresponding value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Integer = 2,
    Numeric = 3,
    String = 4,
    Boolean = 7,
}

impl DataType {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            2 => Some(DataType::Integer),
            3 => Some(DataType::Numeric),
            4 => Some(DataType::String),
            7 => Some(DataType::Boolean),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Integer => "INTEGER",
            DataType::Numeric => "NUMERIC",
            DataType::String => "STRING",
            DataType::Boolean => "BOOLEAN",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Values ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(BigInt),
    Numeric(BigDecimal),
    Str(Arc<str>),
}

impl Value {
    pub fn int(n: i64) -> Self {
        Value::Integer(BigInt::from(n))
    }

    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    /// Parse a numeric literal. Surrounding whitespace and `_` digit
    /// separators are accepted; anything with a point or exponent is a
    /// numeric, everything else an integer.
    pub fn parse_number(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let cleaned: Cow<'_, str> = if trimmed.contains('_') {
            Cow::Owned(trimmed.replace('_', ""))
        } else {
            Cow::Borrowed(trimmed)
        };
        let invalid = || DbError::InvalidOperation(format!("invalid number '{}'", text));
        if cleaned.is_empty() {
            return Err(invalid());
        }
        if cleaned.contains(['.', 'e', 'E']) {
            BigDecimal::from_str(&cleaned)
                .map(Value::Numeric)
                .map_err(|_| invalid())
        } else {
            BigInt::from_str(&cleaned)
                .map(Value::Integer)
                .map_err(|_| invalid())
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Boolean(_) => "BOOLEAN",
            Value::Integer(_) => "INTEGER",
            Value::Numeric(_) => "NUMERIC",
            Value::Str(_) => "STRING",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => i.to_i64(),
            Value::Numeric(d) if d.is_integer() => d.to_i64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Three-valued truth: `None` for Null, an error for non-booleans.
    pub fn truth(&self) -> Result<Option<bool>> {
        match self {
            Value::Null => Ok(None),
            Value::Boolean(b) => Ok(Some(*b)),
            other => Err(DbError::TypeMismatch {
                expected: "BOOLEAN".to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Convert to the declared column type.
    pub fn coerce(self, to: DataType) -> Result<Value> {
        let mismatch = |v: &Value| DbError::TypeMismatch {
            expected: to.name().to_string(),
            found: v.type_name().to_string(),
        };
        match (to, self) {
            (_, Value::Null) => Ok(Value::Null),
            (DataType::Integer, v @ Value::Integer(_)) => Ok(v),
            (DataType::Integer, Value::Numeric(d)) if d.is_integer() => {
                let (digits, _) = d.with_scale(0).into_bigint_and_exponent();
                Ok(Value::Integer(digits))
            }
            (DataType::Numeric, v @ Value::Numeric(_)) => Ok(v),
            (DataType::Numeric, Value::Integer(i)) => Ok(Value::Numeric(BigDecimal::new(i, 0))),
            (DataType::String, v @ Value::Str(_)) => Ok(v),
            (DataType::Boolean, v @ Value::Boolean(_)) => Ok(v),
            (_, v) => Err(mismatch(&v)),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Numeric(_) => 2,
            Value::Str(_) => 3,
        }
    }

    // ── Arithmetic ───────────────────────────────────────────────────

    pub fn add(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(Arc::from(format!("{}{}", a, b)))),
            _ => numeric_op(self, other, "+", |a, b| Ok(a + b), |a, b| Ok(a + b)),
        }
    }

    pub fn sub(&self, other: &Value) -> Result<Value> {
        numeric_op(self, other, "-", |a, b| Ok(a - b), |a, b| Ok(a - b))
    }

    pub fn mul(&self, other: &Value) -> Result<Value> {
        numeric_op(self, other, "*", |a, b| Ok(a * b), |a, b| Ok(a * b))
    }

    /// Integer division truncates toward zero; numeric division keeps
    /// sixteen fractional digits.
    pub fn div(&self, other: &Value) -> Result<Value> {
        numeric_op(
            self,
            other,
            "/",
            |a, b| {
                if b.is_zero() {
                    Err(DbError::DivisionByZero)
                } else {
                    Ok(a / b)
                }
            },
            |a, b| {
                if b.is_zero() {
                    Err(DbError::DivisionByZero)
                } else {
                    Ok((a / b).with_scale(DIVISION_SCALE).normalized())
                }
            },
        )
    }

    pub fn neg(&self) -> Result<Value> {
        match self {
            Value::Null => Ok(Value::Null),
            Value::Integer(i) => Ok(Value::Integer(-i)),
            Value::Numeric(d) => Ok(Value::Numeric(-d.clone())),
            other => Err(DbError::InvalidOperation(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        }
    }
}

fn to_decimal(v: &Value) -> Option<BigDecimal> {
    match v {
        Value::Integer(i) => Some(BigDecimal::new(i.clone(), 0)),
        Value::Numeric(d) => Some(d.clone()),
        _ => None,
    }
}

fn numeric_op(
    a: &Value,
    b: &Value,
    op: &str,
    int_op: impl Fn(&BigInt, &BigInt) -> Result<BigInt>,
    dec_op: impl Fn(&BigDecimal, &BigDecimal) -> Result<BigDecimal>,
) -> Result<Value> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Integer(x), Value::Integer(y)) => int_op(x, y).map(Value::Integer),
        _ => match (to_decimal(a), to_decimal(b)) {
            (Some(x), Some(y)) => dec_op(&x, &y).map(Value::Numeric),
            _ => Err(DbError::InvalidOperation(format!(
                "{} {} {}",
                a.type_name(),
                op,
                b.type_name()
            ))),
        },
    }
}

// ── Ordering ─────────────────────────────────────────────────────────

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Numeric(a), Value::Numeric(b)) => a.cmp(b),
            (Value::Integer(a), Value::Numeric(b)) => BigDecimal::new(a.clone(), 0).cmp(b),
            (Value::Numeric(a), Value::Integer(b)) => a.cmp(&BigDecimal::new(b.clone(), 0)),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

// ── Conversions and display ──────────────────────────────────────────

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(BigInt::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<BigInt> for Value {
    fn from(i: BigInt) -> Self {
        Value::Integer(i)
    }
}

impl From<BigDecimal> for Value {
    fn from(d: BigDecimal) -> Self {
        Value::Numeric(d)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Numeric(d) => write!(f, "{}", d),
            Value::Str(s) => write!(f, "'{}'", s),
        }
    }
}

/// Formats a composite key as `(v1,v2,...)`.
pub fn format_key(values: &[Value]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("({})", parts.join(","))
}
