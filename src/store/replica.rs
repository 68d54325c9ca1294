//! File-backed replica store.
//!
//! Each namespace lives in its own JSON file under the data directory
//! (`users.json`, `bids.json`).  Every operation takes the store lock and
//! reloads both files before touching them, so writes that arrive through
//! replication, resynchronization or an external edit of the files are always
//! visible.  Writes follow the temp-file, fsync, rename pattern.
//!
//! The lock is per process only; two processes sharing a data directory are
//! not coordinated.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::{json, Value};
use tracing::debug;

use super::snapshot::Documents;
use super::{Namespace, Snapshot, StoreError};

/// Durable replica of both namespaces for one node.
pub struct ReplicaStore {
    /// Directory holding the namespace files.
    dir: PathBuf,
    /// Serializes all local reads and writes.
    lock: Mutex<()>,
}

impl ReplicaStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn path_of(&self, ns: Namespace) -> PathBuf {
        self.dir.join(ns.file_name())
    }

    /// Read one namespace file.  A missing or empty file is an empty namespace.
    fn load_namespace(&self, ns: Namespace) -> Result<Documents, StoreError> {
        let path = self.path_of(ns);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Documents::new()),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Documents::new());
        }
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt { path, source })
    }

    fn load(&self) -> Result<Snapshot, StoreError> {
        Ok(Snapshot {
            users: self.load_namespace(Namespace::Users)?,
            bids: self.load_namespace(Namespace::Bids)?,
        })
    }

    fn save_namespace(&self, ns: Namespace, docs: &Documents) -> Result<(), StoreError> {
        let path = self.path_of(ns);
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        let body = serde_json::to_vec_pretty(docs).map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(&body).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        for ns in Namespace::ALL {
            self.save_namespace(ns, snapshot.namespace(ns))?;
        }
        Ok(())
    }

    /// Unconditional upsert of `key` in `ns`.  Durable on return.
    pub fn write(&self, ns: Namespace, key: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.guard();
        let mut snapshot = self.load()?;
        snapshot.namespace_mut(ns).insert(key.to_string(), value);
        self.save(&snapshot)?;
        debug!(namespace = %ns, key, "record persisted");
        Ok(())
    }

    /// Current value of `key` in `ns`, if any.
    pub fn read(&self, ns: Namespace, key: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.guard();
        let snapshot = self.load()?;
        Ok(snapshot.namespace(ns).get(key).cloned())
    }

    /// Both namespaces as currently on disk.
    pub fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let _guard = self.guard();
        self.load()
    }

    /// Insert a new user.  Returns `false` without touching the store when
    /// `name` is already taken.
    pub fn add_user(&self, name: &str, password: &str) -> Result<bool, StoreError> {
        let _guard = self.guard();
        let mut snapshot = self.load()?;
        if snapshot.users.contains_key(name) {
            return Ok(false);
        }
        snapshot
            .users
            .insert(name.to_string(), user_document(password));
        self.save(&snapshot)?;
        Ok(true)
    }

    /// Verbatim password comparison against the stored user document.
    pub fn authenticate(&self, name: &str, password: &str) -> Result<bool, StoreError> {
        let _guard = self.guard();
        let snapshot = self.load()?;
        Ok(snapshot
            .users
            .get(name)
            .and_then(|doc| doc.get("password"))
            .and_then(Value::as_str)
            == Some(password))
    }

    /// Leader-wins merge of `incoming` into the local namespaces.
    ///
    /// Returns the number of keys that were added or overwritten.
    pub fn merge(&self, incoming: &Snapshot) -> Result<usize, StoreError> {
        let _guard = self.guard();
        let mut snapshot = self.load()?;
        let changed = snapshot.merge_from(incoming);
        if changed > 0 {
            self.save(&snapshot)?;
        }
        Ok(changed)
    }

    /// Replace both namespaces wholesale.
    pub fn replace(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let _guard = self.guard();
        self.save(snapshot)
    }
}

/// Document stored for a user account.
pub fn user_document(password: &str) -> Value {
    json!({ "password": password })
}
