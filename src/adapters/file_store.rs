//! A [`KeyValueStore`] backed by one JSON file.
//!
//! Every write rewrites the whole map through a temp file in the same
//! directory followed by a rename, so readers see either the old or the new
//! map, never a torn one.

use crate::ports::{KeyValueStore, PortError, PortResult};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> PortResult<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(s) if s.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(s) => serde_json::from_str(&s).map_err(|e| {
                PortError::Unexpected(format!("{} is not a JSON map: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(PortError::Unavailable(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> PortResult<()> {
        let io_err = |e: std::io::Error| {
            PortError::Unavailable(format!("cannot write {}: {}", self.path.display(), e))
        };
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let json = serde_json::to_vec_pretty(map)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        debug!("Wrote {} key(s) to {}", map.len(), self.path.display());
        Ok(())
    }

    fn modify(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> PortResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.read_map()?;
        f(&mut map);
        self.write_map(&map)
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> PortResult<()> {
        self.modify(|m| {
            m.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> PortResult<()> {
        self.modify(|m| {
            m.remove(key);
        })
    }
}
