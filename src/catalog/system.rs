//! Built-in read-only tables
//!
//! System tables live in the system uid range and are installed into
//! every fresh snapshot. Their rows are computed on demand from the
//! snapshot or the log, never stored.

use std::sync::Arc;

use crate::uid::Uid;
use crate::value::DataType;

use super::table::{Column, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemTable {
    Log,
    Tables,
    Columns,
    Indexes,
}

impl SystemTable {
    pub const ALL: [SystemTable; 4] = [
        SystemTable::Log,
        SystemTable::Tables,
        SystemTable::Columns,
        SystemTable::Indexes,
    ];

    fn ordinal(self) -> i64 {
        match self {
            SystemTable::Log => 0,
            SystemTable::Tables => 1,
            SystemTable::Columns => 2,
            SystemTable::Indexes => 3,
        }
    }

    pub fn uid(self) -> Uid {
        Uid::new(Uid::SYSTEM.raw() - 100 * (self.ordinal() + 1))
    }

    pub fn from_uid(uid: Uid) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.uid() == uid)
    }

    pub fn name(self) -> &'static str {
        match self {
            SystemTable::Log => "_Log",
            SystemTable::Tables => "_Tables",
            SystemTable::Columns => "_Columns",
            SystemTable::Indexes => "_Indexes",
        }
    }

    pub fn columns(self) -> &'static [(&'static str, DataType)] {
        use DataType::{Integer, String};
        match self {
            SystemTable::Log => &[("Uid", String), ("Type", String), ("Desc", String)],
            SystemTable::Tables => &[
                ("Name", String),
                ("Cols", Integer),
                ("Rows", Integer),
                ("Indexes", Integer),
                ("Uid", String),
            ],
            SystemTable::Columns => &[
                ("Table", String),
                ("Name", String),
                ("Type", String),
                ("Constraints", String),
                ("Uid", String),
            ],
            SystemTable::Indexes => &[
                ("Table", String),
                ("Type", String),
                ("Cols", String),
                ("References", String),
            ],
        }
    }

    /// Table value with its columns, ready to install.
    pub fn definition(self) -> (Table, Vec<Column>) {
        let uid = self.uid();
        let columns: Vec<Column> = self
            .columns()
            .iter()
            .enumerate()
            .map(|(i, (name, data_type))| Column {
                uid: Uid::new(uid.raw() - 1 - i as i64),
                table: uid,
                name: Arc::from(*name),
                data_type: *data_type,
                constraints: Vec::new(),
            })
            .collect();
        (Table::new(uid, self.name()), columns)
    }
}
