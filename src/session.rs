//! ClientSession - per-client state
//!
//! Each client of the engine has its own session that tracks the
//! selected database, its access mode and the transaction in progress.
//! Statements run outside an explicit transaction auto-commit.

use std::sync::Arc;

use tracing::debug;

use crate::database_manager::{AccessMode, ClientId, SharedDatabase};
use crate::error::{DbError, Result};
use crate::query::Statement;
use crate::rowset::RowSet;
use crate::transaction::Transaction;

/// Session state for one client
pub struct ClientSession {
    /// Unique client ID
    pub id: ClientId,
    /// Currently selected database (None if no database open)
    pub current_db: Option<Arc<SharedDatabase>>,
    /// Access mode for current database (ReadOnly or ReadWrite)
    pub access_mode: AccessMode,
    transaction: Option<Transaction>,
}

impl ClientSession {
    pub fn new(id: ClientId) -> Self {
        Self {
            id,
            current_db: None,
            access_mode: AccessMode::ReadWrite,
            transaction: None,
        }
    }

    /// Select a database. An open transaction on the previous one is
    /// rolled back.
    pub fn set_database(&mut self, db: Arc<SharedDatabase>, mode: AccessMode) {
        self.abandon();
        self.current_db = Some(db);
        self.access_mode = mode;
    }

    pub fn clear_database(&mut self) {
        self.abandon();
        self.current_db = None;
        self.access_mode = AccessMode::ReadWrite;
    }

    pub fn current_db_name(&self) -> Option<&str> {
        self.current_db.as_ref().map(|db| db.name.as_str())
    }

    pub fn can_write(&self) -> bool {
        self.access_mode.is_write()
    }

    pub fn has_database(&self) -> bool {
        self.current_db.is_some()
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    fn database(&self) -> Result<&Arc<SharedDatabase>> {
        self.current_db.as_ref().ok_or(DbError::NoDatabaseSelected)
    }

    /// Start a transaction and return the log position its snapshot was
    /// taken at. An auto-commit transaction commits after every statement
    /// and then carries on from the new end of the log.
    pub fn begin(&mut self, auto_commit: bool) -> Result<u64> {
        if self.transaction.is_some() {
            return Err(DbError::InvalidOperation(
                "a transaction is already in progress".to_string(),
            ));
        }
        let tr = self.database()?.begin(auto_commit);
        let position = tr.start_position();
        debug!(client = self.id, position, auto_commit, "begin");
        self.transaction = Some(tr);
        Ok(position)
    }

    /// Run one statement. Inside a transaction a failing statement leaves
    /// the transaction as it was before the statement.
    pub fn execute(&mut self, stmt: &Statement) -> Result<Option<Arc<RowSet>>> {
        if stmt.is_write() && !self.can_write() {
            return Err(DbError::ReadOnlyMode);
        }
        debug!(client = self.id, statement = stmt.name(), "execute");
        match &self.transaction {
            Some(tr) if tr.auto_commit() => {
                let out = stmt.obey(tr)?;
                let committed = out.tr.commit();
                self.transaction = Some(self.database()?.begin(true));
                committed?;
                Ok(out.rows)
            }
            Some(tr) => {
                let out = stmt.obey(tr)?;
                self.transaction = Some(out.tr);
                Ok(out.rows)
            }
            None => {
                let tr = self.database()?.begin(true);
                let out = stmt.obey(&tr)?;
                out.tr.commit()?;
                Ok(out.rows)
            }
        }
    }

    pub fn commit(&mut self) -> Result<()> {
        let tr = self.transaction.take().ok_or(DbError::NoTransaction)?;
        tr.commit()?;
        debug!(client = self.id, "commit");
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        let tr = self.transaction.take().ok_or(DbError::NoTransaction)?;
        tr.rollback();
        debug!(client = self.id, "rollback");
        Ok(())
    }

    fn abandon(&mut self) {
        if let Some(tr) = self.transaction.take() {
            tr.rollback();
        }
    }
}
