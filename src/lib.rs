//! SDB - an embeddable relational engine built from immutable data
//!
//! Every structure in the engine is persistent: inserting into an index,
//! installing a table or applying a commit returns a new value and leaves
//! the old one untouched. A [`transaction::Transaction`] is therefore just
//! a private snapshot plus the objects it has added, and a commit is an
//! append to the database's log after an optimistic conflict check.
//!
//! - [`collections`]: persistent ordered map and multi-level key index
//! - [`catalog`] and [`database`]: schema objects and the committed snapshot
//! - [`log`]: the append-only binary log and its codec
//! - [`transaction`] and [`database_manager`]: transactions, commit and
//!   the registry of open databases
//! - [`query`] and [`rowset`]: expressions, queries, statements and the
//!   lazy row sets that evaluate them
//! - [`session`]: per-client state with auto-commit

pub mod catalog;
pub mod collections;
pub mod config;
pub mod database;
pub mod database_manager;
pub mod error;
pub mod log;
pub mod metrics;
pub mod query;
pub mod rowset;
pub mod session;
pub mod transaction;
pub mod uid;
pub mod value;

pub use database::Database;
pub use database_manager::{DatabaseManager, SharedDatabase};
pub use error::{DbError, Result};
pub use transaction::Transaction;
pub use uid::Uid;
pub use value::{DataType, Value};
