//! Engine configuration
//!
//! Stored as `sdb_config.json` in the data directory. A missing file
//! means defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const CONFIG_FILE: &str = "sdb_config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// fsync the log after every commit.
    pub sync_on_commit: bool,
    /// Commits slower than this are logged and kept in the metrics.
    pub slow_commit_threshold_ms: u64,
    pub metrics_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
            slow_commit_threshold_ms: 100,
            metrics_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Read config from the data directory. Returns None if the file
    /// doesn't exist.
    pub fn read_from(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub fn write_to(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(dir.join(CONFIG_FILE), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempdir().unwrap();
        assert_eq!(EngineConfig::read_from(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_written_config_reads_back() {
        let dir = tempdir().unwrap();
        let config = EngineConfig {
            sync_on_commit: false,
            slow_commit_threshold_ms: 5,
            metrics_enabled: false,
        };
        config.write_to(dir.path()).unwrap();
        assert_eq!(EngineConfig::read_from(dir.path()).unwrap(), Some(config));
    }

    #[test]
    fn test_partial_file_takes_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{"sync_on_commit": false}"#).unwrap();
        let config = EngineConfig::read_from(dir.path()).unwrap().unwrap();
        assert!(!config.sync_on_commit);
        assert_eq!(config.slow_commit_threshold_ms, 100);
    }

    #[test]
    fn test_malformed_file_is_json_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{").unwrap();
        let err = EngineConfig::read_from(dir.path()).unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(matches!(err, crate::error::DbError::Json(_)));
    }
}
