//! Append-only log storage
//!
//! A log is a 4-byte magic header followed by the encoded objects in
//! commit order. The byte offset of an object is its committed uid, so
//! the header also guarantees no object ever sits at offset 0
//! ([`Uid::NONE`](crate::uid::Uid::NONE)).
//!
//! Ephemeral databases keep the same byte layout in memory.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::{DbError, Result};

pub const MAGIC: &[u8; 4] = b"SDB1";

/// Offset of the first object.
pub const HEADER_LEN: u64 = MAGIC.len() as u64;

enum Backend {
    File { file: File, path: PathBuf },
    Memory(Vec<u8>),
}

pub struct LogFile {
    backend: Backend,
    len: u64,
}

/// Log contents, mapped from disk or borrowed from memory.
pub enum LogBytes<'a> {
    Mapped(Mmap),
    Memory(&'a [u8]),
}

impl Deref for LogBytes<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            LogBytes::Mapped(m) => m,
            LogBytes::Memory(b) => b,
        }
    }
}

impl LogFile {
    /// Create a new log at `path`; fails if the file exists.
    pub fn create(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create_new(true)
            .open(path)?;
        file.write_all(MAGIC)?;
        file.sync_all()?;
        Ok(Self {
            backend: Backend::File {
                file,
                path: path.to_path_buf(),
            },
            len: HEADER_LEN,
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        let mut magic = [0u8; 4];
        if len < HEADER_LEN {
            return Err(DbError::malformed(0, "file too small for log header"));
        }
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(DbError::malformed(0, "bad magic"));
        }
        Ok(Self {
            backend: Backend::File {
                file,
                path: path.to_path_buf(),
            },
            len,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(MAGIC.to_vec()),
            len: HEADER_LEN,
        }
    }

    /// Current length in bytes, header included.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True when the log holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len <= HEADER_LEN
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.backend {
            Backend::File { path, .. } => Some(path),
            Backend::Memory(_) => None,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self.backend, Backend::Memory(_))
    }

    /// The whole log.
    pub fn read_all(&self) -> Result<LogBytes<'_>> {
        match &self.backend {
            Backend::File { file, .. } => {
                let mmap = unsafe { Mmap::map(file) }?;
                Ok(LogBytes::Mapped(mmap))
            }
            Backend::Memory(buf) => Ok(LogBytes::Memory(buf)),
        }
    }

    /// Bytes in `[from, to)`.
    pub fn read_range(&self, from: u64, to: u64) -> Result<Vec<u8>> {
        if from > to || to > self.len {
            return Err(DbError::malformed(
                from,
                format!("range {}..{} outside log of {} bytes", from, to, self.len),
            ));
        }
        match &self.backend {
            Backend::File { file, .. } => {
                let mut buf = vec![0u8; (to - from) as usize];
                let mut reader = file;
                reader.seek(SeekFrom::Start(from))?;
                reader.read_exact(&mut buf)?;
                Ok(buf)
            }
            Backend::Memory(buf) => Ok(buf[from as usize..to as usize].to_vec()),
        }
    }

    /// Append `bytes`, returning the offset they start at.
    pub fn append(&mut self, bytes: &[u8]) -> Result<u64> {
        let start = self.len;
        match &mut self.backend {
            Backend::File { file, .. } => file.write_all(bytes)?,
            Backend::Memory(buf) => buf.extend_from_slice(bytes),
        }
        self.len += bytes.len() as u64;
        Ok(start)
    }

    pub fn sync(&mut self) -> Result<()> {
        if let Backend::File { file, .. } = &mut self.backend {
            file.sync_data()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_append_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.sdb");
        {
            let mut log = LogFile::create(&path).unwrap();
            assert!(log.is_empty());
            assert_eq!(log.append(b"hello").unwrap(), HEADER_LEN);
            assert_eq!(log.append(b"!").unwrap(), HEADER_LEN + 5);
            log.sync().unwrap();
        }
        let log = LogFile::open(&path).unwrap();
        assert_eq!(log.len(), HEADER_LEN + 6);
        assert_eq!(log.read_range(HEADER_LEN, HEADER_LEN + 5).unwrap(), b"hello");
        assert_eq!(&log.read_all().unwrap()[..4], MAGIC);
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.sdb");
        LogFile::create(&path).unwrap();
        assert!(matches!(LogFile::create(&path), Err(DbError::Io(_))));
    }

    #[test]
    fn test_open_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.sdb");
        std::fs::write(&path, b"NOPE and more").unwrap();
        assert!(matches!(
            LogFile::open(&path),
            Err(DbError::MalformedLog { offset: 0, .. })
        ));
    }

    #[test]
    fn test_memory_log_uses_same_offsets() {
        let mut log = LogFile::in_memory();
        assert_eq!(log.append(b"abc").unwrap(), HEADER_LEN);
        assert_eq!(log.read_range(HEADER_LEN + 1, HEADER_LEN + 3).unwrap(), b"bc");
        assert!(log.read_range(0, 99).is_err());
        assert!(log.path().is_none());
    }
}
