//! Error types for the database engine

use thiserror::Error;

use crate::uid::Uid;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    // ── Structural violations ────────────────────────────────────────
    #[error("Duplicate key {key} in index {index}")]
    DuplicateKey { index: Uid, key: String },

    #[error("Null key rejected by index {0}")]
    NullKey(Uid),

    #[error("Column {0} cannot be null")]
    NotNull(String),

    #[error("Referential constraint: no key {key} in table {table}")]
    ReferentialInsert { table: Uid, key: String },

    #[error("Referential constraint: illegal delete from table {0}")]
    ReferentialDelete(Uid),

    #[error("Table {table} already has a column named {name}")]
    DuplicateColumn { table: Uid, name: String },

    #[error("Name {0} is already in use")]
    DuplicateName(String),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    // ── Transaction conflicts ────────────────────────────────────────
    #[error("Transaction conflict: {0} was changed by a concurrent commit")]
    ReadConflict(Uid),

    #[error("Transaction conflict: {0} clashes with a concurrent {1}")]
    WriteConflict(Uid, Uid),

    // ── Log ──────────────────────────────────────────────────────────
    #[error("Malformed log at offset {offset}: {reason}")]
    MalformedLog { offset: u64, reason: String },

    #[error("Unknown object {0}")]
    UnknownObject(Uid),

    #[error("Unknown type tag {tag} at offset {offset}")]
    UnknownTag { tag: u8, offset: u64 },

    // ── Name resolution ──────────────────────────────────────────────
    #[error("Unknown name {0}")]
    UnknownName(String),

    #[error("Unknown table {0}")]
    UnknownTable(String),

    #[error("Unknown column {0}")]
    UnknownColumn(String),

    // ── Evaluation ───────────────────────────────────────────────────
    #[error("Rows of this query cannot be updated or deleted")]
    NotUpdatable,

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Registry and sessions ────────────────────────────────────────
    #[error("Database '{0}' already exists")]
    DatabaseExists(String),

    #[error("Database '{0}' not found")]
    DatabaseNotFound(String),

    #[error("Database '{0}' is in use and cannot be dropped")]
    DatabaseInUse(String),

    #[error("No database selected")]
    NoDatabaseSelected,

    #[error("Operation not allowed in read-only mode")]
    ReadOnlyMode,

    #[error("Invalid database name: {0}")]
    InvalidDatabaseName(String),

    #[error("No transaction in progress")]
    NoTransaction,
}

impl DbError {
    /// Get error code for wire protocol
    pub fn code(&self) -> &'static str {
        match self {
            DbError::DuplicateKey { .. } => "DUPLICATE_KEY",
            DbError::NullKey(_) => "NULL_KEY",
            DbError::NotNull(_) => "NOT_NULL",
            DbError::ReferentialInsert { .. } | DbError::ReferentialDelete(_) => "REFERENTIAL",
            DbError::DuplicateColumn { .. } => "DUPLICATE_COLUMN",
            DbError::DuplicateName(_) => "DUPLICATE_NAME",
            DbError::TypeMismatch { .. } => "TYPE_MISMATCH",
            DbError::ReadConflict(_) => "READ_CONFLICT",
            DbError::WriteConflict(..) => "WRITE_CONFLICT",
            DbError::MalformedLog { .. } | DbError::UnknownTag { .. } => "MALFORMED_LOG",
            DbError::UnknownObject(_) => "UNKNOWN_OBJECT",
            DbError::UnknownName(_) | DbError::UnknownTable(_) | DbError::UnknownColumn(_) => {
                "UNKNOWN_NAME"
            }
            DbError::DatabaseExists(_) => "DATABASE_EXISTS",
            DbError::DatabaseNotFound(_) => "DATABASE_NOT_FOUND",
            DbError::DatabaseInUse(_) => "DATABASE_IN_USE",
            DbError::NoDatabaseSelected => "NO_DATABASE_SELECTED",
            DbError::ReadOnlyMode => "READ_ONLY_MODE",
            DbError::InvalidDatabaseName(_) => "INVALID_DATABASE_NAME",
            DbError::NoTransaction => "NO_TRANSACTION",
            _ => "INTERNAL_ERROR",
        }
    }

    /// True for commit-time conflicts; the caller may retry the transaction.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::ReadConflict(_) | DbError::WriteConflict(..))
    }

    /// True for integrity violations detected while installing an object.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            DbError::DuplicateKey { .. }
                | DbError::NullKey(_)
                | DbError::NotNull(_)
                | DbError::ReferentialInsert { .. }
                | DbError::ReferentialDelete(_)
                | DbError::DuplicateColumn { .. }
                | DbError::DuplicateName(_)
                | DbError::TypeMismatch { .. }
        )
    }

    pub(crate) fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        DbError::MalformedLog {
            offset,
            reason: reason.into(),
        }
    }
}
