// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Persistent object stores
//!
//! This module provides a trait-based abstraction over "save/load a list of
//! values under a name", so the memoizer can run against a shared directory
//! or an in-memory map interchangeably.
//!
//! # Architecture
//!
//! ```text
//! Memoizer (results, error records, true-identifier records, dependency graph)
//!     ↓
//! ObjectStore (named-record abstraction)
//!     ↓
//! Concrete Implementations (FsObjectStore, MemoryObjectStore)
//! ```

// Core modules
pub mod factory;
pub mod traits;
pub mod types;

// Store implementations
pub mod fs;
pub mod memory;

// Public API re-exports
pub use factory::open_store;
pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use traits::ObjectStore;
pub use types::{StoreError, StoreKind, StoreResult};
