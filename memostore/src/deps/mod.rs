// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Source-artifact dependency tracking

pub mod graph;
pub mod tracker;

pub use graph::{leaf_name, DependencyGraph, GRAPH_RECORD};
pub use tracker::{stale_artifacts, DependencyTracker, StaleArtifact, GRAPH_LOCK};
