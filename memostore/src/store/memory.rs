// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory object store implementation for testing

use super::traits::ObjectStore;
use super::types::{StoreError, StoreKind, StoreResult};
use crate::value::Value;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Debug, Clone)]
struct MemoryRecord {
    values: Vec<Value>,
    written_at: SystemTime,
}

/// In-memory object store
///
/// Clones share the same records, so one store can be handed to several
/// memoizers inside a process.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    records: Arc<RwLock<HashMap<String, MemoryRecord>>>,
}

impl MemoryObjectStore {
    /// Create a new memory object store
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the write timestamp of a record
    pub fn set_modified(&self, name: &str, when: SystemTime) -> StoreResult<()> {
        let mut records = self.records.write();
        let record = records
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        record.written_at = when;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn save(&self, name: &str, values: &[Value]) -> StoreResult<()> {
        if name.is_empty() {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        self.records.write().insert(
            name.to_string(),
            MemoryRecord {
                values: values.to_vec(),
                written_at: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn load(&self, name: &str) -> StoreResult<Vec<Value>> {
        self.records
            .read()
            .get(name)
            .map(|record| record.values.clone())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn exists(&self, name: &str) -> StoreResult<bool> {
        Ok(self.records.read().contains_key(name))
    }

    fn last_modified(&self, name: &str) -> StoreResult<Option<SystemTime>> {
        Ok(self.records.read().get(name).map(|record| record.written_at))
    }

    fn delete(&self, name: &str) -> StoreResult<bool> {
        Ok(self.records.write().remove(name).is_some())
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self
            .records
            .read()
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    fn location(&self, name: &str) -> PathBuf {
        PathBuf::from(format!("memory://{}", name))
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }
}
