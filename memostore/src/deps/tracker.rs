// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Dependency registration and staleness detection
//!
//! The graph is a single record in the metadata store. Every read and write
//! of it happens under the [`GRAPH_LOCK`] semaphore name, which makes it the
//! one global serialization point of the memoizer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use log::{debug, warn};

use super::graph::{DependencyGraph, GRAPH_RECORD};
use crate::error::MemoResult;
use crate::lock::Semaphore;
use crate::memo::CallStack;
use crate::store::{ObjectStore, StoreError};

/// Semaphore name guarding the dependency graph record
pub const GRAPH_LOCK: &str = "dependency-graph";

/// A dependency artifact modified after the cached entry was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleArtifact {
    pub artifact: PathBuf,
    pub modified: SystemTime,
    /// Write time of the entry (result or error record) it is newer than
    pub entry_written: SystemTime,
}

/// Loads, extends and queries the persisted dependency graph
pub struct DependencyTracker {
    metadata: Arc<dyn ObjectStore>,
    semaphore: Arc<Semaphore>,
}

impl DependencyTracker {
    pub fn new(metadata: Arc<dyn ObjectStore>, semaphore: Arc<Semaphore>) -> Self {
        Self {
            metadata,
            semaphore,
        }
    }

    /// Current graph, read under the graph lock
    pub fn load(&self) -> MemoResult<DependencyGraph> {
        self.semaphore.with_lock(GRAPH_LOCK, || self.read_graph())
    }

    /// Record `source` as a dependency of `function_key` and of every
    /// enclosing call on `stack`, then persist the graph if it grew.
    pub fn register(
        &self,
        function_key: &str,
        source: Option<&Path>,
        stack: &CallStack,
    ) -> MemoResult<DependencyGraph> {
        self.semaphore.with_lock(GRAPH_LOCK, || -> MemoResult<DependencyGraph> {
            let mut graph = self.read_graph()?;
            if extend(&mut graph, function_key, source, stack) {
                debug!(
                    "Registered {} as a dependency of '{}' and {} enclosing call(s)",
                    source.map(|p| p.display().to_string()).unwrap_or_default(),
                    function_key,
                    stack.depth()
                );
                self.metadata.save(GRAPH_RECORD, &[graph.to_value()])?;
            }
            Ok(graph)
        })
    }

    /// What [`DependencyTracker::register`] would produce, without writing it
    pub fn preview(
        &self,
        function_key: &str,
        source: Option<&Path>,
        stack: &CallStack,
    ) -> MemoResult<DependencyGraph> {
        let mut graph = self.load()?;
        extend(&mut graph, function_key, source, stack);
        Ok(graph)
    }

    fn read_graph(&self) -> MemoResult<DependencyGraph> {
        match self.metadata.load(GRAPH_RECORD) {
            Ok(values) => match values.first().map(DependencyGraph::from_value) {
                Some(Ok(graph)) => Ok(graph),
                Some(Err(e)) => {
                    warn!("Discarding unreadable dependency graph: {}", e);
                    Ok(DependencyGraph::new())
                }
                None => Ok(DependencyGraph::new()),
            },
            Err(StoreError::NotFound(_)) => Ok(DependencyGraph::new()),
            Err(StoreError::Corrupted { reason, .. }) => {
                warn!("Discarding corrupted dependency graph: {}", reason);
                Ok(DependencyGraph::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn extend(
    graph: &mut DependencyGraph,
    function_key: &str,
    source: Option<&Path>,
    stack: &CallStack,
) -> bool {
    let Some(source) = source else {
        return false;
    };
    let mut changed = graph.add(function_key, source);
    for enclosing in stack.frames() {
        changed |= graph.add(enclosing, source);
    }
    changed
}

/// Dependencies of `function_key` modified strictly after the entry's
/// result (`result_written`) or error record (`error_written`)
///
/// Artifacts that no longer exist are skipped.
pub fn stale_artifacts(
    graph: &DependencyGraph,
    function_key: &str,
    result_written: Option<SystemTime>,
    error_written: Option<SystemTime>,
) -> Vec<StaleArtifact> {
    let mut stale = Vec::new();
    for artifact in graph.dependencies(function_key) {
        let modified = match std::fs::metadata(artifact).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                debug!("Skipping dependency {}: {}", artifact.display(), e);
                continue;
            }
        };
        let newer_than = [result_written, error_written]
            .into_iter()
            .flatten()
            .find(|written| modified > *written);
        if let Some(entry_written) = newer_than {
            stale.push(StaleArtifact {
                artifact: artifact.to_path_buf(),
                modified,
                entry_written,
            });
        }
    }
    stale
}
