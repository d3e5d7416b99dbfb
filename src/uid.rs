//! Object identifiers
//!
//! A [`Uid`] is a 64-bit signed integer whose range says what kind of
//! object it names:
//!
//! ```text
//!  0x4000_0000_0000_0000 ..        transaction-local (uncommitted)
//!  0 .. 0x4000_0000_0000_0000      committed (byte offset in the log)
//!  -1                              PUBLIC role
//!  -2 ..= -1_000_000               client/session objects
//!  -1_000_001 ..                   query aliases
//!  ..= -0x7000_0000_0000_0000      built-in system objects
//! ```
//!
//! The only time a uid changes is at commit, when a transaction-local
//! uid is translated to the log offset its object was written at.

use std::fmt;

const TRANSACTION_BASE: i64 = 0x4000_0000_0000_0000;
const CLIENT_LOW: i64 = -1_000_000;
const ALIAS_HIGH: i64 = -1_000_001;
const SYSTEM_HIGH: i64 = -0x7000_0000_0000_0000;

/// What kind of object a uid names, derived from its range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UidKind {
    Committed,
    Transaction,
    Public,
    Client,
    Alias,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Uid(i64);

impl Uid {
    /// The PUBLIC role; also used as the "no column" marker in alters.
    pub const PUBLIC: Uid = Uid(-1);
    /// Marks "no object", e.g. a drop with no parent.
    pub const NONE: Uid = Uid(0);
    /// First uid handed out to objects created inside a transaction.
    pub const FIRST_TRANSACTION: Uid = Uid(TRANSACTION_BASE);
    /// Top of the system range; system objects count downwards from here.
    pub const SYSTEM: Uid = Uid(SYSTEM_HIGH);
    /// Top of the alias range.
    pub const FIRST_ALIAS: Uid = Uid(ALIAS_HIGH);

    pub const fn new(raw: i64) -> Self {
        Uid(raw)
    }

    /// A committed uid for the object written at `offset`.
    pub fn at_offset(offset: u64) -> Self {
        Uid(offset as i64)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    pub fn kind(self) -> UidKind {
        match self.0 {
            n if n >= TRANSACTION_BASE => UidKind::Transaction,
            n if n >= 0 => UidKind::Committed,
            -1 => UidKind::Public,
            n if n >= CLIENT_LOW => UidKind::Client,
            n if n > SYSTEM_HIGH => UidKind::Alias,
            _ => UidKind::System,
        }
    }

    pub fn is_committed(self) -> bool {
        self.kind() == UidKind::Committed
    }

    pub fn is_local(self) -> bool {
        self.kind() == UidKind::Transaction
    }

    pub fn is_system(self) -> bool {
        self.kind() == UidKind::System
    }

    /// Log offset of a committed object.
    pub fn offset(self) -> Option<u64> {
        self.is_committed().then_some(self.0 as u64)
    }

    pub fn next(self) -> Self {
        Uid(self.0 + 1)
    }

    pub fn prev(self) -> Self {
        Uid(self.0 - 1)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            UidKind::Transaction => write!(f, "'{}", self.0 - TRANSACTION_BASE),
            UidKind::Committed => write!(f, "{}", self.0),
            UidKind::Public => write!(f, "PUBLIC"),
            UidKind::Client => write!(f, "#{}", -self.0),
            UidKind::Alias => write!(f, "${}", ALIAS_HIGH - self.0 + 1),
            UidKind::System => write!(f, "@{}", SYSTEM_HIGH - self.0),
        }
    }
}

impl From<i64> for Uid {
    fn from(raw: i64) -> Self {
        Uid(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_classification() {
        assert_eq!(Uid::new(0).kind(), UidKind::Committed);
        assert_eq!(Uid::new(1234).kind(), UidKind::Committed);
        assert_eq!(Uid::FIRST_TRANSACTION.kind(), UidKind::Transaction);
        assert_eq!(Uid::PUBLIC.kind(), UidKind::Public);
        assert_eq!(Uid::new(-2).kind(), UidKind::Client);
        assert_eq!(Uid::new(-1_000_000).kind(), UidKind::Client);
        assert_eq!(Uid::FIRST_ALIAS.kind(), UidKind::Alias);
        assert_eq!(Uid::SYSTEM.kind(), UidKind::System);
        assert_eq!(Uid::SYSTEM.prev().kind(), UidKind::System);
    }

    #[test]
    fn test_display() {
        assert_eq!(Uid::FIRST_TRANSACTION.next().to_string(), "'1");
        assert_eq!(Uid::new(77).to_string(), "77");
        assert_eq!(Uid::new(-5).to_string(), "#5");
        assert_eq!(Uid::FIRST_ALIAS.to_string(), "$1");
        assert_eq!(Uid::SYSTEM.prev().prev().to_string(), "@2");
    }

    #[test]
    fn test_offset_only_for_committed() {
        assert_eq!(Uid::at_offset(42).offset(), Some(42));
        assert_eq!(Uid::FIRST_TRANSACTION.offset(), None);
        assert_eq!(Uid::new(-3).offset(), None);
    }
}
