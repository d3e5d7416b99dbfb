//! Log storage and encoding

pub mod codec;
pub mod file;
pub mod query_codec;

pub use codec::{decode_all, Reader, Writer};
pub use file::{LogBytes, LogFile, HEADER_LEN, MAGIC};
