// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! memostore - durable memoization for deterministic pipeline computations
//!
//! Given a computation and its arguments, memostore either loads a previously
//! persisted result or runs the computation and persists what it returns.
//!
//! # Features
//!
//! - **Readable cache keys**: arguments are rendered into a stable identifier,
//!   with default and ignored fields collapsed away
//! - **Staleness tracking**: source artifacts touched by a computation (and by
//!   every memoized call nested beneath it) invalidate its cached results
//! - **Multi-process safety**: every read and write of shared state happens under
//!   a filesystem-only semaphore, so many workers can share one cache directory
//! - **Error replay**: failures can be cached and re-raised without rerunning work
//!
//! # Usage
//!
//! ```ignore
//! use memostore::{CallOptions, CallStack, MemoConfig, Memoizer, Tracked, Value};
//!
//! let memo = Memoizer::open(MemoConfig::at("./cache"))?;
//! let square = Tracked::new("square", |_stack, args, _nargout| {
//!     let x = args[0].as_number().unwrap_or_default();
//!     Ok(vec![Value::from(x * x)])
//! })
//! .with_source(file!());
//!
//! let out = memo.load_or_run(&CallStack::root(), &square, &[Value::from(3)], 1, &CallOptions::default())?;
//! ```

pub mod config;
pub mod deps;
pub mod error;
pub mod key;
pub mod lock;
pub mod memo;
pub mod store;
pub mod value;

pub use config::{DependencyPolicy, ErrorCaching, ForceRecompute, MemoConfig};
pub use deps::{DependencyGraph, DependencyTracker, StaleArtifact};
pub use error::{BoxError, MemoError, MemoResult};
pub use key::{build_uid, encode, Encoded, KeyOptions, KeySource, Uid};
pub use lock::{MarkerInfo, ReleaseOutcome, Semaphore, SemaphoreGuard, SemaphoreToken};
pub use memo::{
    CallOptions, CallStack, Computation, ComputeReason, DryRunReport, EntryInfo, Identity,
    Memoizer, Outcome, StaleEntry, Tracked,
};
pub use store::{open_store, FsObjectStore, MemoryObjectStore, ObjectStore, StoreKind};
pub use value::{Fields, ToFields, Value};

/// memostore version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// memostore crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
