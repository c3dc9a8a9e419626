// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Memoization error types

use std::path::PathBuf;
use std::time::Duration;

use crate::store::StoreError;
use thiserror::Error;

/// Error type computations report failures with
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced to callers of the memoizer
#[derive(Error, Debug)]
pub enum MemoError {
    /// Conflicting or missing options, arity mismatches, invalid option values
    #[error("Usage error: {0}")]
    Usage(String),

    /// Structural key derivation was attempted on an unconverted object
    #[error("Identity error: {0}")]
    Identity(String),

    #[error("Timed out after {waited:?} waiting for lock '{name}'")]
    LockTimeout { name: String, waited: Duration },

    /// Failure raised by the wrapped computation, or replayed from the error cache
    #[error("{function} failed{}: {message}", replay_note(.replayed))]
    Callable {
        function: String,
        message: String,
        replayed: bool,
    },

    /// A persisted entry could not be decoded. Handled locally as a cache miss.
    #[error("Corrupted entry at {}: {reason}", .path.display())]
    Corrupted { path: PathBuf, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl MemoError {
    pub fn is_usage(&self) -> bool {
        matches!(self, MemoError::Usage(_))
    }

    pub fn is_replayed(&self) -> bool {
        matches!(self, MemoError::Callable { replayed: true, .. })
    }
}

fn replay_note(replayed: &bool) -> &'static str {
    if *replayed {
        " (cached error)"
    } else {
        ""
    }
}

/// Result type for memoizer operations
pub type MemoResult<T> = Result<T, MemoError>;
