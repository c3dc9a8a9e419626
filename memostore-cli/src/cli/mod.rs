// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI module for memostore
//!
//! Read-mostly maintenance over existing stores: dependency graph and
//! staleness reports, lock marker cleanup, entry inspection and eviction.

pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{Cli, Commands};
pub use handlers::{
    handle_config, handle_deps, handle_evict, handle_inspect, handle_locks, handle_stale,
};
