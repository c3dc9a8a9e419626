// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Function-to-artifact dependency graph

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::store::{StoreError, StoreResult};
use crate::value::{Fields, Value};

/// Record name of the persisted graph in the metadata store
pub const GRAPH_RECORD: &str = "dependency-graph.deps";

/// Maps a function key to every source artifact its execution touched
///
/// Edges are only ever added, so staleness checks stay conservative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<PathBuf>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `artifact` as a dependency of `function_key`.
    /// Returns true if the edge is new.
    pub fn add(&mut self, function_key: &str, artifact: &Path) -> bool {
        self.edges
            .entry(function_key.to_string())
            .or_default()
            .insert(artifact.to_path_buf())
    }

    pub fn dependencies(&self, function_key: &str) -> impl Iterator<Item = &Path> {
        self.edges
            .get(function_key)
            .into_iter()
            .flat_map(|artifacts| artifacts.iter().map(PathBuf::as_path))
    }

    pub fn contains(&self, function_key: &str) -> bool {
        self.edges.contains_key(function_key)
    }

    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Stored form: a map of function key to a list of artifact paths
    pub fn to_value(&self) -> Value {
        Value::Map(
            self.edges
                .iter()
                .map(|(key, artifacts)| {
                    let paths: Vec<Value> = artifacts
                        .iter()
                        .map(|p| Value::Text(p.to_string_lossy().into_owned()))
                        .collect();
                    (key.clone(), Value::List(paths))
                })
                .collect::<Fields>(),
        )
    }

    pub fn from_value(value: &Value) -> StoreResult<Self> {
        let corrupted = |reason: String| StoreError::Corrupted {
            name: GRAPH_RECORD.to_string(),
            reason,
        };

        let fields = value
            .as_map()
            .ok_or_else(|| corrupted(format!("expected a map, found {}", value.type_name())))?;

        let mut graph = Self::new();
        for (key, artifacts) in fields.iter() {
            let artifacts = artifacts
                .as_list()
                .ok_or_else(|| corrupted(format!("dependencies of '{}' are not a list", key)))?;
            let set = graph.edges.entry(key.to_string()).or_default();
            for artifact in artifacts {
                let path = artifact
                    .as_text()
                    .ok_or_else(|| corrupted(format!("non-text dependency of '{}'", key)))?;
                set.insert(PathBuf::from(path));
            }
        }
        Ok(graph)
    }
}

/// Dependency-graph node of a possibly qualified function name
///
/// `stats::mean`, `stats.mean` and `mean` all map to `mean`, so functions
/// sharing a leaf name share their dependencies.
pub fn leaf_name(function: &str) -> &str {
    let after_path = function.rsplit("::").next().unwrap_or(function);
    after_path
        .rsplit(|c| c == '.' || c == '/')
        .next()
        .filter(|leaf| !leaf.is_empty())
        .unwrap_or(after_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let mut graph = DependencyGraph::new();
        assert!(graph.add("top", Path::new("src/top.rs")));
        assert!(!graph.add("top", Path::new("src/top.rs")));
        assert!(graph.add("top", Path::new("src/mid.rs")));
        assert_eq!(graph.dependencies("top").count(), 2);
        assert_eq!(graph.dependencies("missing").count(), 0);
    }

    #[test]
    fn test_value_round_trip() {
        let mut graph = DependencyGraph::new();
        graph.add("top", Path::new("src/top.rs"));
        graph.add("top", Path::new("src/bottom.rs"));
        graph.add("bottom", Path::new("src/bottom.rs"));

        let restored = DependencyGraph::from_value(&graph.to_value()).unwrap();
        assert_eq!(restored, graph);
    }

    #[test]
    fn test_from_value_rejects_wrong_shape() {
        assert!(DependencyGraph::from_value(&Value::from(1)).is_err());
        let bad = Value::Map(Fields::new().with("top", 3));
        assert!(matches!(
            DependencyGraph::from_value(&bad),
            Err(StoreError::Corrupted { .. })
        ));
    }

    #[test]
    fn test_leaf_names() {
        assert_eq!(leaf_name("mean"), "mean");
        assert_eq!(leaf_name("stats::mean"), "mean");
        assert_eq!(leaf_name("pkg.stats.mean"), "mean");
        assert_eq!(leaf_name("analysis/mean"), "mean");
        assert_eq!(leaf_name("trailing."), "trailing.");
    }
}
