//! Key-value persistence for analysis artifacts
//!
//! The analysis core only needs get/put/delete/list over opaque bytes; the
//! embedding application may supply its own [`KeyValueStore`].

mod file;
mod key;
mod memory;

pub use file::{decode_record, encode_record, FileStore, RECORD_EXTENSION, RECORD_MAGIC};
pub use key::{validate_key, MAX_KEY_LEN};
pub use memory::MemoryStore;

use std::sync::Arc;

use crate::Result;

/// Minimal key-value store
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    ///
    /// # Errors
    ///
    /// Returns error for an invalid key or an unreadable value
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a value, replacing any previous one
    ///
    /// # Errors
    ///
    /// Returns error for an invalid key or a failed write
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove a value; `false` when absent
    ///
    /// # Errors
    ///
    /// Returns error for an invalid key or a failed removal
    fn delete(&self, key: &str) -> Result<bool>;

    /// All keys in ascending order
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be listed
    fn keys(&self) -> Result<Vec<String>>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        (**self).delete(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        (**self).keys()
    }
}
