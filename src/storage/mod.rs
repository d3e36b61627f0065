//! Durable key-value storage for the persisted session document.
//!
//! The session only needs `get`/`set`/`remove` on opaque bytes. An in-memory
//! map serves tests and throwaway sessions; [`SqliteStore`] keeps the document
//! in a small SQLite database under the app data directory.

mod document;
mod sqlite;

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

pub use document::{
    CorruptStateError, DEFAULT_DOCUMENT_KEY, DOCUMENT_VERSION, DocumentError, ParsedDocument,
    PersistedDocument, parse_document,
};
pub use sqlite::{STORE_DB_FILE_NAME, SqliteStore};

/// Errors returned by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage query failed: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("Could not create storage directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("App directory unavailable: {0}")]
    AppDirs(#[from] crate::app_dirs::AppDirError),
}

/// Byte-oriented key-value store.
pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

impl<T: KvStore + ?Sized> KvStore for Box<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// Volatile store backed by a `HashMap`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips_bytes() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", b"one").unwrap();
        store.set("k", b"two").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"two"[..]));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn boxed_store_delegates() {
        let mut store: Box<dyn KvStore> = Box::new(MemoryStore::new());
        store.set("k", b"v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"v"[..]));
    }
}
