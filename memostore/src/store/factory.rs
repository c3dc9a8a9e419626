// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Object store factory
//!
//! Creates a store of the configured kind as a trait object.

use super::fs::FsObjectStore;
use super::memory::MemoryObjectStore;
use super::traits::ObjectStore;
use super::types::{StoreKind, StoreResult};
use std::path::Path;

/// Create an object store of the given kind rooted at `path`
///
/// The memory store ignores `path`.
///
/// # Examples
/// ```ignore
/// use memostore::store::{open_store, StoreKind};
///
/// let store = open_store(StoreKind::Filesystem, "./cache/results")?;
/// store.save("mean-1.cache", &values)?;
/// ```
pub fn open_store<P: AsRef<Path>>(kind: StoreKind, path: P) -> StoreResult<Box<dyn ObjectStore>> {
    match kind {
        StoreKind::Filesystem => {
            let store = FsObjectStore::open(path)?;
            Ok(Box::new(store) as Box<dyn ObjectStore>)
        }
        StoreKind::Memory => Ok(Box::new(MemoryObjectStore::new()) as Box<dyn ObjectStore>),
    }
}
