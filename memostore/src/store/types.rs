// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Object store types and error handling
//!
//! This module defines the types, enums, and error handling used throughout
//! the object store backends.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Object store backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum StoreKind {
    /// One file per record under a directory.
    /// Best for: shared caches used by many worker processes
    #[default]
    Filesystem,

    /// In-memory records with synthetic modification times.
    /// Best for: unit testing, single-process pipelines
    Memory,
}

impl std::str::FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "filesystem" | "fs" => Ok(StoreKind::Filesystem),
            "memory" => Ok(StoreKind::Memory),
            _ => Err(format!(
                "Unknown store kind: {}. Valid options: filesystem, memory",
                s
            )),
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StoreKind::Filesystem => "filesystem",
            StoreKind::Memory => "memory",
        };
        write!(f, "{}", name)
    }
}

/// Error type for object store operations
#[derive(Debug)]
pub enum StoreError {
    /// I/O related errors (file system, permissions, ...)
    Io(std::io::Error),

    /// Data serialization failed
    Serialization(String),

    /// A record exists but its header, checksum or payload is unreadable
    Corrupted { name: String, reason: String },

    /// Requested record was not found
    NotFound(String),

    /// Record name is empty or contains path separators
    InvalidName(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "I/O error: {}", e),
            StoreError::Serialization(e) => write!(f, "Serialization error: {}", e),
            StoreError::Corrupted { name, reason } => {
                write!(f, "Corrupted record {}: {}", name, reason)
            }
            StoreError::NotFound(name) => write!(f, "Record not found: {}", name),
            StoreError::InvalidName(name) => write!(f, "Invalid record name: {:?}", name),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for object store operations
pub type StoreResult<T> = Result<T, StoreError>;
