// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Memoized invocation of computations
//!
//! [`Memoizer`] ties the key codec, dependency tracker, semaphore and
//! object stores together behind `load_or_run` and `dry_run_check`.

pub mod computation;
pub mod context;
pub mod entry;
pub mod options;
pub mod orchestrator;

pub use computation::{Computation, Tracked};
pub use context::CallStack;
pub use entry::EntryRecords;
pub use options::{CallOptions, Identity};
pub use orchestrator::{
    ComputeReason, DryRunReport, EntryInfo, Memoizer, Outcome, StaleEntry,
};
