//! Object encoding
//!
//! Every object starts with its one-byte tag. Integers (uids included)
//! are a length byte followed by the two's complement big-endian bytes
//! of the value, strings are a length integer followed by UTF-8. The
//! object's own uid is not written: it is the offset of its tag byte.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::catalog::{
    tags, Alter, Column, ColumnConstraint, DbObject, Delete, Drop, Index, Record, Table, View,
};
use crate::collections::OrderedMap;
use crate::error::{DbError, Result};
use crate::uid::Uid;
use crate::value::{DataType, Value};

/// Value tags; they coincide with the [`DataType`] discriminants.
pub mod value_tags {
    pub const NULL: u8 = 0;
    pub const INTEGER: u8 = 2;
    pub const NUMERIC: u8 = 3;
    pub const STRING: u8 = 4;
    pub const BOOLEAN: u8 = 7;
}

const CONSTRAINT_NOT_NULL: u8 = 0;
const CONSTRAINT_DEFAULT: u8 = 1;

// ── Writer ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_byte(&mut self, b: u8) {
        self.buf.push(b);
    }

    pub fn put_integer(&mut self, n: &BigInt) -> Result<()> {
        let bytes = n.to_signed_bytes_be();
        let len = u8::try_from(bytes.len()).map_err(|_| {
            DbError::InvalidOperation(format!("integer of {} bytes is too large", bytes.len()))
        })?;
        self.buf.push(len);
        self.buf.extend_from_slice(&bytes);
        Ok(())
    }

    pub fn put_int(&mut self, n: i64) {
        let bytes = BigInt::from(n).to_signed_bytes_be();
        // at most nine bytes, so the length fits
        self.buf.push(bytes.len() as u8);
        self.buf.extend_from_slice(&bytes);
    }

    pub fn put_uid(&mut self, uid: Uid) {
        self.put_int(uid.raw());
    }

    pub fn put_string(&mut self, s: &str) {
        self.put_int(s.len() as i64);
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn put_value(&mut self, v: &Value) -> Result<()> {
        match v {
            Value::Null => self.put_byte(value_tags::NULL),
            Value::Integer(i) => {
                self.put_byte(value_tags::INTEGER);
                self.put_integer(i)?;
            }
            Value::Numeric(d) => {
                self.put_byte(value_tags::NUMERIC);
                let (mantissa, scale) = d.as_bigint_and_exponent();
                self.put_integer(&mantissa)?;
                self.put_int(scale);
            }
            Value::Str(s) => {
                self.put_byte(value_tags::STRING);
                self.put_string(s);
            }
            Value::Boolean(b) => {
                self.put_byte(value_tags::BOOLEAN);
                self.put_byte(u8::from(*b));
            }
        }
        Ok(())
    }

    fn put_fields(&mut self, r: &Record) -> Result<()> {
        self.put_uid(r.table);
        self.put_int(r.fields.len() as i64);
        for (col, value) in r.fields.iter() {
            self.put_uid(*col);
            self.put_value(value)?;
        }
        Ok(())
    }

    /// Encode a persistent object, tag first.
    pub fn put_object(&mut self, obj: &DbObject) -> Result<()> {
        self.put_byte(obj.tag());
        match obj {
            DbObject::Table(t) => self.put_string(&t.name),
            DbObject::Column(c) => {
                self.put_string(&c.name);
                self.put_byte(c.data_type.tag());
                self.put_uid(c.table);
                self.put_int(c.constraints.len() as i64);
                for constraint in &c.constraints {
                    match constraint {
                        ColumnConstraint::NotNull => self.put_byte(CONSTRAINT_NOT_NULL),
                        ColumnConstraint::Default(v) => {
                            self.put_byte(CONSTRAINT_DEFAULT);
                            self.put_value(v)?;
                        }
                    }
                }
            }
            DbObject::Record(r) => self.put_fields(r)?,
            DbObject::Update(r) => {
                self.put_fields(r)?;
                self.put_uid(r.defpos);
            }
            DbObject::Delete(d) => {
                self.put_uid(d.table);
                self.put_uid(d.delpos);
            }
            DbObject::Alter(a) => {
                self.put_uid(a.defpos);
                self.put_uid(a.column_or_none());
                self.put_string(&a.name);
                self.put_byte(a.data_type.map_or(0, DataType::tag));
            }
            DbObject::Drop(d) => {
                self.put_uid(d.drpos);
                self.put_uid(d.parent);
                self.put_string(&d.detail);
            }
            DbObject::Index(i) => {
                self.put_uid(i.table);
                self.put_byte(u8::from(i.primary));
                self.put_int(i.columns.len() as i64);
                for c in i.columns.iter() {
                    self.put_uid(*c);
                }
                self.put_uid(i.references);
            }
            DbObject::View(v) => {
                self.put_string(&v.name);
                self.put_query(&v.definition)?;
            }
        }
        Ok(())
    }
}

// ── Reader ───────────────────────────────────────────────────────────

/// Decoder over a slice of the log that starts at byte offset `base`.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Self { data, pos: 0, base }
    }

    /// Log offset of the next unread byte.
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|e| *e <= self.data.len())
            .ok_or_else(|| DbError::malformed(self.offset(), "unexpected end of log"))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn get_byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_integer(&mut self) -> Result<BigInt> {
        let len = self.get_byte()? as usize;
        Ok(BigInt::from_signed_bytes_be(self.take(len)?))
    }

    pub fn get_int(&mut self) -> Result<i64> {
        let at = self.offset();
        self.get_integer()?
            .to_i64()
            .ok_or_else(|| DbError::malformed(at, "integer out of range"))
    }

    pub fn get_uid(&mut self) -> Result<Uid> {
        self.get_int().map(Uid::new)
    }

    /// A length or element count. Every element takes at least one byte,
    /// so a count beyond the bytes left is malformed.
    pub fn get_count(&mut self) -> Result<usize> {
        let at = self.offset();
        let n = usize::try_from(self.get_int()?)
            .map_err(|_| DbError::malformed(at, "negative length"))?;
        if n > self.data.len() - self.pos {
            return Err(DbError::malformed(
                at,
                format!("length {} runs past the end of the log", n),
            ));
        }
        Ok(n)
    }

    pub fn get_string(&mut self) -> Result<Arc<str>> {
        let len = self.get_count()?;
        let at = self.offset();
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(Arc::from)
            .map_err(|_| DbError::malformed(at, "invalid UTF-8"))
    }

    pub fn get_value(&mut self) -> Result<Value> {
        let at = self.offset();
        let tag = self.get_byte()?;
        self.value_with_tag(tag, at)
    }

    /// Payload of a value whose tag has already been read.
    pub(crate) fn value_with_tag(&mut self, tag: u8, at: u64) -> Result<Value> {
        match tag {
            value_tags::NULL => Ok(Value::Null),
            value_tags::INTEGER => Ok(Value::Integer(self.get_integer()?)),
            value_tags::NUMERIC => {
                let mantissa = self.get_integer()?;
                let scale = self.get_int()?;
                Ok(Value::Numeric(BigDecimal::new(mantissa, scale)))
            }
            value_tags::STRING => Ok(Value::Str(self.get_string()?)),
            value_tags::BOOLEAN => Ok(Value::Boolean(self.get_byte()? != 0)),
            tag => Err(DbError::UnknownTag { tag, offset: at }),
        }
    }

    fn get_data_type(&mut self) -> Result<DataType> {
        let at = self.offset();
        let tag = self.get_byte()?;
        DataType::from_tag(tag).ok_or(DbError::UnknownTag { tag, offset: at })
    }

    fn get_fields(&mut self) -> Result<(Uid, OrderedMap<Uid, Value>)> {
        let table = self.get_uid()?;
        let n = self.get_count()?;
        let mut fields = OrderedMap::new();
        for _ in 0..n {
            let col = self.get_uid()?;
            fields = fields.insert(col, self.get_value()?);
        }
        Ok((table, fields))
    }

    /// Decode the object starting at the current offset; its uid is that
    /// offset.
    pub fn get_object(&mut self) -> Result<DbObject> {
        let uid = Uid::at_offset(self.offset());
        let tag = self.get_byte()?;
        let obj = match tag {
            tags::TABLE => DbObject::Table(Table::new(uid, &self.get_string()?)),
            tags::COLUMN => {
                let name = self.get_string()?;
                let data_type = self.get_data_type()?;
                let table = self.get_uid()?;
                let n = self.get_count()?;
                let mut constraints = Vec::with_capacity(n);
                for _ in 0..n {
                    let at = self.offset();
                    constraints.push(match self.get_byte()? {
                        CONSTRAINT_NOT_NULL => ColumnConstraint::NotNull,
                        CONSTRAINT_DEFAULT => ColumnConstraint::Default(self.get_value()?),
                        tag => return Err(DbError::UnknownTag { tag, offset: at }),
                    });
                }
                DbObject::Column(Column {
                    uid,
                    table,
                    name,
                    data_type,
                    constraints,
                })
            }
            tags::RECORD => {
                let (table, fields) = self.get_fields()?;
                DbObject::Record(Record::new(uid, table, fields))
            }
            tags::UPDATE => {
                let (table, fields) = self.get_fields()?;
                let defpos = self.get_uid()?;
                DbObject::Update(Record::update(uid, defpos, table, fields))
            }
            tags::DELETE => {
                let table = self.get_uid()?;
                let delpos = self.get_uid()?;
                DbObject::Delete(Delete { uid, table, delpos })
            }
            tags::ALTER => {
                let defpos = self.get_uid()?;
                let column = self.get_uid()?;
                let name = self.get_string()?;
                let at = self.offset();
                let data_type = match self.get_byte()? {
                    0 => None,
                    tag => Some(
                        DataType::from_tag(tag).ok_or(DbError::UnknownTag { tag, offset: at })?,
                    ),
                };
                DbObject::Alter(Alter {
                    uid,
                    defpos,
                    column: (column != Uid::PUBLIC).then_some(column),
                    name,
                    data_type,
                })
            }
            tags::DROP => {
                let drpos = self.get_uid()?;
                let parent = self.get_uid()?;
                let detail = self.get_string()?;
                DbObject::Drop(Drop {
                    uid,
                    drpos,
                    parent,
                    detail,
                })
            }
            tags::INDEX => {
                let table = self.get_uid()?;
                let primary = self.get_byte()? != 0;
                let at = self.offset();
                let n = self.get_count()?;
                if n == 0 {
                    return Err(DbError::malformed(at, "index without columns"));
                }
                let mut columns = Vec::with_capacity(n);
                for _ in 0..n {
                    columns.push(self.get_uid()?);
                }
                let references = self.get_uid()?;
                DbObject::Index(Index::new(uid, table, primary, columns, references))
            }
            tags::VIEW => {
                let name = self.get_string()?;
                let definition = Arc::new(self.get_query()?);
                DbObject::View(View {
                    uid,
                    name,
                    definition,
                })
            }
            tag => {
                return Err(DbError::UnknownTag {
                    tag,
                    offset: uid.raw() as u64,
                })
            }
        };
        Ok(obj)
    }
}

/// Decode every object in `data`, which starts at log offset `base`.
pub fn decode_all(data: &[u8], base: u64) -> Result<Vec<DbObject>> {
    let mut reader = Reader::new(data, base);
    let mut out = Vec::new();
    while !reader.at_end() {
        out.push(reader.get_object()?);
    }
    Ok(out)
}
