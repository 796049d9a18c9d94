//! Durable blocklist storage.
//!
//! The blocklist lives under one fixed key in a small JSON document:
//!
//! ```json
//! { "blocked_ips": ["192.168.0.102", "10.0.0.1"] }
//! ```
//!
//! Entries are validated on load exactly as on edit; a document holding a
//! malformed entry is refused rather than partially loaded.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config;
use crate::constants;
use crate::error::StoreError;
use crate::state::BlockedIpSet;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    blocked_ips: Vec<String>,
}

/// File-backed blocklist store.
#[derive(Clone, Debug)]
pub struct BlocklistStore {
    path: PathBuf,
}

impl BlocklistStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the per-user default location.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoDataDir`] if no data directory can be determined.
    pub fn open_default() -> Result<Self, StoreError> {
        config::default_store_path()
            .map(Self::new)
            .ok_or(StoreError::NoDataDir)
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the saved blocklist.
    ///
    /// A store that has never been saved yields the default seed entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the file cannot be read, is not a store
    /// document, or holds entries that fail validation.
    pub fn load(&self) -> Result<BlockedIpSet, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No saved blocklist, using default");
            return BlockedIpSet::from_entries([constants::DEFAULT_BLOCKED_IP]).map_err(|source| {
                StoreError::Invalid {
                    path: self.path.clone(),
                    source,
                }
            });
        }

        let content = fs::read_to_string(&self.path).map_err(|source| self.io_error(source))?;
        let document: StoreDocument =
            serde_json::from_str(&content).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })?;

        let set = BlockedIpSet::from_entries(&document.blocked_ips).map_err(|source| {
            StoreError::Invalid {
                path: self.path.clone(),
                source,
            }
        })?;
        debug!(path = %self.path.display(), entries = set.len(), "Blocklist loaded");
        Ok(set)
    }

    /// Saves `set`, replacing the previous contents atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory or file cannot be written,
    /// or [`StoreError::Serialize`] if the set cannot be encoded.
    pub fn save(&self, set: &BlockedIpSet) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let document = StoreDocument {
            blocked_ips: set.to_strings(),
        };
        let json = serde_json::to_string_pretty(&document).map_err(|source| StoreError::Serialize {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| self.io_error(source))?;
        restrict_permissions(&tmp).map_err(|source| self.io_error(source))?;
        fs::rename(&tmp, &self.path).map_err(|source| self.io_error(source))?;

        info!(path = %self.path.display(), entries = set.len(), "Blocklist saved");
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Owner read/write only (chmod 600).
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn temp_store(name: &str) -> BlocklistStore {
        let path = std::env::temp_dir()
            .join(format!("tunblock-store-{}-{name}", std::process::id()))
            .join("blocklist.json");
        let _ = fs::remove_file(&path);
        BlocklistStore::new(path)
    }

    fn cleanup(store: &BlocklistStore) {
        if let Some(dir) = store.path().parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_missing_store_seeds_default() {
        let store = temp_store("missing");
        let set = store.load().unwrap();
        assert_eq!(set.to_strings(), vec![constants::DEFAULT_BLOCKED_IP]);
        cleanup(&store);
    }

    #[test]
    fn test_save_then_load() {
        let store = temp_store("roundtrip");
        let set = BlockedIpSet::parse_list("10.0.0.2,10.0.0.1").unwrap();

        store.save(&set).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, set);
        assert_eq!(loaded.to_strings(), vec!["10.0.0.2", "10.0.0.1"]);
        assert!(loaded.contains(Ipv4Addr::new(10, 0, 0, 1)));
        cleanup(&store);
    }

    #[test]
    fn test_saved_empty_set_stays_empty() {
        let store = temp_store("empty");
        store.save(&BlockedIpSet::new()).unwrap();
        assert!(store.load().unwrap().is_empty());
        cleanup(&store);
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let store = temp_store("perms");
        store.save(&BlockedIpSet::new()).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        cleanup(&store);
    }

    #[test]
    fn test_refuses_malformed_entries() {
        let store = temp_store("malformed");
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(
            store.path(),
            r#"{ "blocked_ips": ["10.0.0.1", "10.0.0.999"] }"#,
        )
        .unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, StoreError::Invalid { .. }));
        assert!(err.to_string().contains("10.0.0.999"));
        cleanup(&store);
    }

    #[test]
    fn test_save_under_a_file_reports_io() {
        let store = temp_store("blocked-dir");
        let parent = store.path().parent().unwrap().to_path_buf();
        fs::create_dir_all(&parent).unwrap();
        let blocker = parent.join("not-a-dir");
        fs::write(&blocker, "").unwrap();

        let nested = BlocklistStore::new(blocker.join("blocklist.json"));
        assert!(matches!(
            nested.save(&BlockedIpSet::new()),
            Err(StoreError::Io { .. })
        ));
        cleanup(&store);
    }

    #[test]
    fn test_encode_failure_is_not_reported_as_malformed() {
        let source = serde_json::from_str::<u8>("x").unwrap_err();
        let err = StoreError::Serialize {
            path: PathBuf::from("/tmp/blocklist.json"),
            source,
        };
        let message = err.to_string();
        assert!(message.contains("encode"));
        assert!(!message.contains("malformed"));
    }

    #[test]
    fn test_refuses_non_json() {
        let store = temp_store("garbage");
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "192.168.0.102").unwrap();

        assert!(matches!(store.load(), Err(StoreError::Parse { .. })));
        cleanup(&store);
    }
}
