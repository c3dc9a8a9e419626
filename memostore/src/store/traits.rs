// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Object store trait
//!
//! The memoizer only needs to save and load a list of values under a name,
//! ask whether a record exists, when it was last written, and delete it.
//! Every backend implements this one trait.

use super::types::{StoreError, StoreKind, StoreResult};
use crate::value::Value;
use std::path::PathBuf;
use std::time::SystemTime;

/// A named-record store for lists of values
///
/// Names are flat (no directory separators). Callers serialize access to a
/// given name themselves; implementations only need to make a single save
/// appear atomically to readers.
pub trait ObjectStore: Send + Sync {
    /// Persist `values` under `name`, replacing any previous record
    fn save(&self, name: &str, values: &[Value]) -> StoreResult<()>;

    /// Load the record stored under `name`
    ///
    /// Returns [`StoreError::NotFound`] when there is no such record and
    /// [`StoreError::Corrupted`] when it cannot be decoded.
    fn load(&self, name: &str) -> StoreResult<Vec<Value>>;

    /// Check if a record exists
    fn exists(&self, name: &str) -> StoreResult<bool>;

    /// When the record was last written, `None` if it does not exist
    fn last_modified(&self, name: &str) -> StoreResult<Option<SystemTime>>;

    /// Remove a record. Returns whether anything was removed.
    fn delete(&self, name: &str) -> StoreResult<bool>;

    /// Names of all records starting with `prefix`, sorted
    fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Physical location of a record, for diagnostics and batch tooling
    fn location(&self, name: &str) -> PathBuf;

    /// Get store kind
    fn kind(&self) -> StoreKind;

    /// Persist a single text value
    fn save_text(&self, name: &str, text: &str) -> StoreResult<()> {
        self.save(name, &[Value::Text(text.to_string())])
    }

    /// Load a record written by [`ObjectStore::save_text`], `None` if absent
    fn load_text(&self, name: &str) -> StoreResult<Option<String>> {
        match self.load(name) {
            Ok(values) => match values.into_iter().next() {
                Some(Value::Text(text)) => Ok(Some(text)),
                _ => Err(StoreError::Corrupted {
                    name: name.to_string(),
                    reason: "expected a single text value".to_string(),
                }),
            },
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// Helper implementation for Box<dyn ObjectStore>
// so boxed stores returned by the factory can be used directly
impl ObjectStore for Box<dyn ObjectStore> {
    fn save(&self, name: &str, values: &[Value]) -> StoreResult<()> {
        (**self).save(name, values)
    }

    fn load(&self, name: &str) -> StoreResult<Vec<Value>> {
        (**self).load(name)
    }

    fn exists(&self, name: &str) -> StoreResult<bool> {
        (**self).exists(name)
    }

    fn last_modified(&self, name: &str) -> StoreResult<Option<SystemTime>> {
        (**self).last_modified(name)
    }

    fn delete(&self, name: &str) -> StoreResult<bool> {
        (**self).delete(name)
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        (**self).list(prefix)
    }

    fn location(&self, name: &str) -> PathBuf {
        (**self).location(name)
    }

    fn kind(&self) -> StoreKind {
        (**self).kind()
    }
}
