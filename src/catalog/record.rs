//! Row versions and deletions

use crate::collections::OrderedMap;
use crate::uid::Uid;
use crate::value::Value;

/// One version of a row.
///
/// An inserted row has `defpos == uid`. An update is a new version with
/// its own uid whose `defpos` names the row it replaces; the table maps
/// each defpos to its latest version.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub uid: Uid,
    pub defpos: Uid,
    pub table: Uid,
    /// Column uid -> value. Null fields are not stored.
    pub fields: OrderedMap<Uid, Value>,
}

impl Record {
    pub fn new(uid: Uid, table: Uid, fields: OrderedMap<Uid, Value>) -> Self {
        Self {
            uid,
            defpos: uid,
            table,
            fields,
        }
    }

    /// A new version of the row `defpos`.
    pub fn update(uid: Uid, defpos: Uid, table: Uid, fields: OrderedMap<Uid, Value>) -> Self {
        Self {
            uid,
            defpos,
            table,
            fields,
        }
    }

    pub fn field(&self, column: Uid) -> Value {
        self.fields.get(&column).cloned().unwrap_or_default()
    }

    pub fn is_update(&self) -> bool {
        self.uid != self.defpos
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub uid: Uid,
    pub table: Uid,
    pub delpos: Uid,
}
