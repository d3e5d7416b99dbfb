//! Persistent data structures
//!
//! Everything here is immutable: operations return new values that share
//! unchanged structure with the old ones, so snapshots can be held by
//! any number of transactions without copying or locking.

pub mod multi_key;
pub mod ordered_map;

pub use multi_key::{KeyError, MultiCursor, MultiKeyIndex, TreeBehaviour, TreeInfo};
pub use ordered_map::{MapCursor, OrderedMap};
