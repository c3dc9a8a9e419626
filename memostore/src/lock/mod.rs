// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cross-process locking built from marker files only

pub mod semaphore;

pub use semaphore::{
    marker_stem, MarkerInfo, ReleaseOutcome, Semaphore, SemaphoreGuard, SemaphoreToken,
    DEFAULT_LOCK_WAIT, DEFAULT_RACE_WINDOW, DEFAULT_STALE_LOCK_AGE,
};
