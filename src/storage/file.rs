//! Directory-backed key-value store with CRC-checked records

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use tracing::debug;

use super::{validate_key, KeyValueStore};
use crate::{ApiscopeError, Result};

/// Record magic bytes: "APSC"
pub const RECORD_MAGIC: [u8; 4] = *b"APSC";

/// Record file extension
pub const RECORD_EXTENSION: &str = "rec";

/// Magic + CRC32 + payload length
pub const RECORD_HEADER_SIZE: usize = 4 + 4 + 8;

/// One record file per key
///
/// Layout: magic (4) | CRC32 of payload (4, LE) | payload length (8, LE) | payload.
/// Writes go to a temporary file renamed over the record, so readers never
/// see a partial value.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Store directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{RECORD_EXTENSION}"))
    }
}

fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

/// Frame a payload as a record
#[must_use]
pub fn encode_record(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len());
    out.extend_from_slice(&RECORD_MAGIC);
    out.extend_from_slice(&checksum(payload).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Unframe and verify a record
///
/// # Errors
///
/// Returns `CorruptedData` on a bad magic, length or checksum
pub fn decode_record(key: &str, data: &[u8]) -> Result<Vec<u8>> {
    let corrupted = |expected: u32, actual: u32| ApiscopeError::CorruptedData {
        key: key.to_string(),
        expected,
        actual,
    };

    if data.len() < RECORD_HEADER_SIZE || data[..4] != RECORD_MAGIC {
        return Err(corrupted(
            u32::from_le_bytes(RECORD_MAGIC),
            data.get(..4)
                .and_then(|m| m.try_into().ok())
                .map_or(0, u32::from_le_bytes),
        ));
    }

    let expected = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&data[8..RECORD_HEADER_SIZE]);
    let len = u64::from_le_bytes(len_bytes);

    let payload = &data[RECORD_HEADER_SIZE..];
    if payload.len() as u64 != len {
        return Err(corrupted(expected, 0));
    }

    let actual = checksum(payload);
    if actual != expected {
        return Err(corrupted(expected, actual));
    }

    Ok(payload.to_vec())
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let data = match fs::read(self.record_path(key)) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        decode_record(key, &data).map(Some)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        validate_key(key)?;
        let path = self.record_path(key);
        let tmp = self.dir.join(format!("{key}.{RECORD_EXTENSION}.tmp"));

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(&encode_record(value))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &path)?;
        debug!("Stored {} bytes at {}", value.len(), path.display());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        match fs::remove_file(self.record_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_key(stem).is_ok() {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
