// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Record names making up one cache entry

use crate::deps::{leaf_name, DependencyGraph};

pub const RESULT_SUFFIX: &str = ".cache";
pub const UID_SUFFIX: &str = ".uid";
pub const ERROR_SUFFIX: &str = ".err";

/// Names of the records stored for a cache identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecords {
    pub identifier: String,
    /// Result values
    pub result: String,
    /// Raw uid, present only when the identifier is hashed
    pub uid: String,
    /// Error report, present only after a cached failure
    pub error: String,
}

impl EntryRecords {
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            result: format!("{}{}", identifier, RESULT_SUFFIX),
            uid: format!("{}{}", identifier, UID_SUFFIX),
            error: format!("{}{}", identifier, ERROR_SUFFIX),
        }
    }

    /// Entry owning a record name, if it is one of ours
    pub fn from_record(record: &str) -> Option<Self> {
        [RESULT_SUFFIX, UID_SUFFIX, ERROR_SUFFIX]
            .iter()
            .find_map(|suffix| record.strip_suffix(suffix))
            .filter(|identifier| !identifier.is_empty())
            .map(Self::new)
    }

    /// Semaphore name serializing access to this entry
    pub fn lock_name(&self) -> &str {
        &self.identifier
    }

    pub fn names(&self) -> [&str; 3] {
        [&self.result, &self.uid, &self.error]
    }
}

/// Dependency key of the function owning `identifier`
///
/// Identifiers are `<function>-<uid>` and function names may themselves
/// contain `-`, so every split point is tried, shortest function first,
/// until one names a node of the graph.
pub fn owning_function<'a>(identifier: &'a str, graph: &DependencyGraph) -> Option<&'a str> {
    identifier
        .match_indices('-')
        .map(|(at, _)| leaf_name(&identifier[..at]))
        .find(|key| graph.contains(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_record_names() {
        let entry = EntryRecords::new("mean-1-2");
        assert_eq!(entry.result, "mean-1-2.cache");
        assert_eq!(entry.uid, "mean-1-2.uid");
        assert_eq!(entry.error, "mean-1-2.err");
        assert_eq!(entry.lock_name(), "mean-1-2");
    }

    #[test]
    fn test_from_record() {
        assert_eq!(
            EntryRecords::from_record("mean-1.err").unwrap().identifier,
            "mean-1"
        );
        assert!(EntryRecords::from_record("dependency-graph.deps").is_none());
        assert!(EntryRecords::from_record(".cache").is_none());
    }

    #[test]
    fn test_owning_function() {
        let mut graph = DependencyGraph::new();
        graph.add("mean", Path::new("stats.rs"));
        graph.add("load-session", Path::new("io.rs"));

        assert_eq!(owning_function("mean-1-2", &graph), Some("mean"));
        assert_eq!(owning_function("stats.mean-default", &graph), Some("mean"));
        assert_eq!(owning_function("load-session-m12", &graph), Some("load-session"));
        assert_eq!(owning_function("unknown-1", &graph), None);
    }
}
