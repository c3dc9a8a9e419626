// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Filesystem object store
//!
//! One file per record. Each file is a small header followed by a bincode
//! payload:
//!
//! ```text
//! +--------+-------------+-----------+---------------------+
//! | "MEMO" | version u32 | crc32 u32 | bincode(Vec<Value>) |
//! +--------+-------------+-----------+---------------------+
//! ```
//!
//! Saves write a temporary sibling and rename it into place, so concurrent
//! readers see either the old record or the new one.

use super::traits::ObjectStore;
use super::types::{StoreError, StoreKind, StoreResult};
use crate::value::Value;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const MAGIC: &[u8; 4] = b"MEMO";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 12;

/// Directory-backed object store
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open<P: AsRef<Path>>(root: P) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> StoreResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn encode_record(values: &[Value]) -> StoreResult<Vec<u8>> {
    let payload = bincode::serialize(values)?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

fn decode_record(name: &str, bytes: &[u8]) -> StoreResult<Vec<Value>> {
    let corrupted = |reason: String| StoreError::Corrupted {
        name: name.to_string(),
        reason,
    };

    if bytes.len() < HEADER_LEN {
        return Err(corrupted(format!("truncated header ({} bytes)", bytes.len())));
    }
    if &bytes[0..4] != MAGIC {
        return Err(corrupted("missing magic bytes".to_string()));
    }

    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[4..8]);
    let version = u32::from_le_bytes(word);
    if version != FORMAT_VERSION {
        return Err(corrupted(format!(
            "format version {}, expected {}",
            version, FORMAT_VERSION
        )));
    }

    word.copy_from_slice(&bytes[8..12]);
    let expected = u32::from_le_bytes(word);
    let payload = &bytes[HEADER_LEN..];
    let actual = crc32fast::hash(payload);
    if expected != actual {
        return Err(corrupted(format!(
            "checksum mismatch: expected {:08x}, got {:08x}",
            expected, actual
        )));
    }

    bincode::deserialize(payload).map_err(|e| corrupted(e.to_string()))
}

impl ObjectStore for FsObjectStore {
    fn save(&self, name: &str, values: &[Value]) -> StoreResult<()> {
        let path = self.path_for(name)?;
        let bytes = encode_record(values)?;

        // Record names may already be close to the file-name limit
        let tmp = self.root.join(format!(
            ".tmp.{}.{:016x}",
            std::process::id(),
            fastrand::u64(..)
        ));
        let written = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            drop(file);
            fs::rename(&tmp, &path)
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn load(&self, name: &str) -> StoreResult<Vec<Value>> {
        let path = self.path_for(name)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        decode_record(name, &bytes)
    }

    fn exists(&self, name: &str) -> StoreResult<bool> {
        Ok(self.path_for(name)?.is_file())
    }

    fn last_modified(&self, name: &str) -> StoreResult<Option<SystemTime>> {
        match fs::metadata(self.path_for(name)?) {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, name: &str) -> StoreResult<bool> {
        match fs::remove_file(self.path_for(name)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !name.starts_with('.') && name.starts_with(prefix) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn location(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Filesystem
    }
}
