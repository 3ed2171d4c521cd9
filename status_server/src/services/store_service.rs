//! File-backed status store: last known status per build name.
//!
//! The store file is a flat YAML mapping of build name to status string.
//! Every update re-reads the file, applies the change, and rewrites the whole
//! mapping under an exclusive advisory lock, so other processes following the
//! same discipline do not lose keys they wrote in between.
//!
//! Entries the server did not touch are written back exactly as loaded, even
//! when they are not `name: status` strings. Only the read view normalises
//! them: scalars become their text, anything else becomes `""` (failing), and
//! entries with non-scalar keys are left out.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use fs2::FileExt;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::models::status::{all_passing, StatusMap};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write store {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize store: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

#[derive(Debug)]
pub struct StatusStore {
    path: PathBuf,
    // Serializes read-modify-write cycles between this process's transports.
    local: Mutex<()>,
}

impl StatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            local: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current persisted mapping. A missing, unreadable, or malformed file
    /// reads as an empty store.
    pub fn read(&self) -> StatusMap {
        let _local = self.local_lock();
        status_view(&self.load())
    }

    /// Record `status` for `name`, keeping every other entry on disk.
    pub fn set(&self, name: &str, status: &str) -> Result<(), StoreError> {
        let _local = self.local_lock();
        let mut entries = self.load();
        upsert(&mut entries, name, status);
        self.write(&entries)
    }

    /// Whether every recorded build is passing. Re-reads the file first.
    pub fn aggregate(&self) -> bool {
        all_passing(&self.read())
    }

    fn local_lock(&self) -> MutexGuard<'_, ()> {
        self.local.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self) -> Mapping {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), "Unreadable store, treating as empty: {e}");
                }
                return Mapping::new();
            }
        };

        match serde_yaml::from_str::<Value>(&contents) {
            Ok(Value::Mapping(mapping)) => mapping,
            Ok(_) => {
                tracing::debug!(path = %self.path.display(), "Store is not a mapping, treating as empty");
                Mapping::new()
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Corrupt store, treating as empty: {e}");
                Mapping::new()
            }
        }
    }

    fn write(&self, entries: &Mapping) -> Result<(), StoreError> {
        let body = serde_yaml::to_string(entries)?;
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        // Not truncated on open: another writer may still hold the lock.
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(io_err)?;
        let mut locked = ExclusiveLock::acquire(file).map_err(io_err)?;

        locked.file.set_len(0).map_err(io_err)?;
        locked.file.write_all(body.as_bytes()).map_err(io_err)?;
        locked.file.sync_all().map_err(io_err)?;
        Ok(())
    }
}

/// Exclusive advisory lock on the store file, released on drop.
struct ExclusiveLock {
    file: File,
}

impl ExclusiveLock {
    fn acquire(file: File) -> std::io::Result<Self> {
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for ExclusiveLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn status_view(entries: &Mapping) -> StatusMap {
    entries
        .iter()
        .filter_map(|(key, value)| {
            let name = scalar_text(key)?;
            Some((name, scalar_text(value).unwrap_or_default()))
        })
        .collect()
}

/// Replace the value of the entry whose key reads as `name`, keeping that key
/// as written; otherwise append a new string entry.
fn upsert(entries: &mut Mapping, name: &str, status: &str) {
    let key = entries
        .keys()
        .find(|key| scalar_text(key).as_deref() == Some(name))
        .cloned()
        .unwrap_or_else(|| Value::String(name.to_string()));
    entries.insert(key, Value::String(status.to_string()));
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_text(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> StatusStore {
        StatusStore::new(dir.path().join("build_result.yml"))
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.read().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn corrupt_file_reads_empty() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{ this is: [not yaml").unwrap();
        assert!(store.read().is_empty());
    }

    #[test]
    fn non_mapping_file_reads_empty() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "- 1\n- 2\n- 3\n").unwrap();
        assert!(store.read().is_empty());
    }

    #[test]
    fn set_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store.set("x", "SUCCESS").unwrap();

        assert_eq!(store.read().get("x").map(String::as_str), Some("SUCCESS"));
    }

    #[test]
    fn set_preserves_entries_written_by_others() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "legacy: pass\nother: FAILURE\n").unwrap();

        store.set("x", "SUCCESS").unwrap();

        let statuses = store.read();
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses["legacy"], "pass");
        assert_eq!(statuses["other"], "FAILURE");
        assert_eq!(statuses["x"], "SUCCESS");
    }

    #[test]
    fn set_overwrites_existing_key() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store.set("web", "FAILURE").unwrap();
        store.set("web", "SUCCESS").unwrap();
        store.set("web", "SUCCESS").unwrap();

        let statuses = store.read();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses["web"], "SUCCESS");
    }

    #[test]
    fn shrinking_rewrite_leaves_no_trailing_bytes() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), format!("web: {}\n", "x".repeat(200))).unwrap();

        store.set("web", "SUCCESS").unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw.trim_end(), "web: SUCCESS");
    }

    #[test]
    fn aggregate_follows_passing_rule() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.aggregate());

        store.set("a", "SUCCESS").unwrap();
        std::fs::write(store.path(), "a: SUCCESS\nb: pass\n").unwrap();
        assert!(store.aggregate());

        store.set("b", "FAILURE").unwrap();
        assert!(!store.aggregate());
    }

    #[test]
    fn non_string_values_count_as_failing() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "a: SUCCESS\nb: ~\nc: 3\n").unwrap();

        let statuses = store.read();
        assert_eq!(statuses["b"], "");
        assert_eq!(statuses["c"], "3");
        assert!(!store.aggregate());
    }

    #[test]
    fn untouched_entries_are_written_back_as_loaded() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            "b: ~\nlist: [1, 2]\n? [x, y]\n: nested\nc: 3\n",
        )
        .unwrap();

        store.set("web", "SUCCESS").unwrap();

        let raw: Value = serde_yaml::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        let entries = raw.as_mapping().unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries.get("b"), Some(&Value::Null));
        assert!(entries.get("list").unwrap().is_sequence());
        assert_eq!(entries.get("c"), Some(&Value::Number(3.into())));
        assert_eq!(entries.get("web"), Some(&Value::String("SUCCESS".to_string())));

        let statuses = store.read();
        assert_eq!(statuses.len(), 4);
        assert_eq!(statuses["b"], "");
        assert_eq!(statuses["list"], "");
    }

    #[test]
    fn set_reuses_a_non_string_key_with_the_same_text() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "1: FAILURE\n").unwrap();

        store.set("1", "SUCCESS").unwrap();

        let statuses = store.read();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses["1"], "SUCCESS");
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let store = StatusStore::new(dir.path().join("nope").join("build_result.yml"));

        let err = store.set("web", "SUCCESS").unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[test]
    fn concurrent_sets_on_distinct_keys_are_all_kept() {
        let dir = tempdir().unwrap();
        let store = Arc::new(store_in(&dir));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.set(&format!("build-{i}"), "SUCCESS").unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.read().len(), 8);
    }

    #[test]
    fn lock_is_released_after_write() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.set("web", "SUCCESS").unwrap();

        let file = File::open(store.path()).unwrap();
        file.try_lock_exclusive().unwrap();
        file.unlock().unwrap();
    }
}
