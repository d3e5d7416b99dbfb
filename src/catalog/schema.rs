//! Schema changes and views

use std::sync::Arc;

use crate::query::Query;
use crate::uid::Uid;
use crate::value::DataType;

/// Rename a table (`column == None`), or rename and/or retype one of
/// its columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Alter {
    pub uid: Uid,
    pub defpos: Uid,
    pub column: Option<Uid>,
    pub name: Arc<str>,
    pub data_type: Option<DataType>,
}

impl Alter {
    /// The column uid as written to the log, `PUBLIC` (-1) for none.
    pub fn column_or_none(&self) -> Uid {
        self.column.unwrap_or(Uid::PUBLIC)
    }
}

/// Drop a table, index or view (`parent == NONE`), or a column of the
/// table `parent`.
#[derive(Debug, Clone, PartialEq)]
pub struct Drop {
    pub uid: Uid,
    pub drpos: Uid,
    pub parent: Uid,
    pub detail: Arc<str>,
}

#[derive(Debug, Clone)]
pub struct View {
    pub uid: Uid,
    pub name: Arc<str>,
    pub definition: Arc<Query>,
}
