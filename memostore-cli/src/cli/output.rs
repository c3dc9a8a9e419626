// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Report formatting for CLI output

use chrono::{DateTime, Utc};
use colored::*;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use memostore::{DependencyGraph, EntryInfo, MarkerInfo, StaleEntry, Value};
use std::time::{Duration, SystemTime};

use super::commands::OutputFormat;

/// Formatter for every report the CLI prints
pub struct ReportFormatter;

impl ReportFormatter {
    /// Dependency graph, optionally restricted to one function
    pub fn graph(graph: &DependencyGraph, function: Option<&str>, format: OutputFormat) -> String {
        let functions: Vec<&str> = match function {
            Some(function) => vec![function],
            None => graph.functions().collect(),
        };

        match format {
            OutputFormat::Json => {
                let mut object = serde_json::Map::new();
                for function in &functions {
                    let artifacts: Vec<String> = graph
                        .dependencies(function)
                        .map(|p| p.display().to_string())
                        .collect();
                    object.insert(function.to_string(), serde_json::json!(artifacts));
                }
                Self::pretty(&serde_json::Value::Object(object))
            }
            OutputFormat::Table => {
                if functions.iter().all(|f| graph.dependencies(f).next().is_none()) {
                    return format!("{}\n", "No dependencies recorded".yellow());
                }

                let mut table = Self::table(&["Function", "Dependency", "Modified"]);
                for function in &functions {
                    for artifact in graph.dependencies(function) {
                        let modified = std::fs::metadata(artifact)
                            .and_then(|m| m.modified())
                            .map(Self::timestamp)
                            .unwrap_or_else(|_| "missing".to_string());
                        table.add_row(vec![
                            function.to_string(),
                            artifact.display().to_string(),
                            modified,
                        ]);
                    }
                }
                format!(
                    "{}\n{}\n",
                    format!("Dependency graph ({} functions)", functions.len())
                        .bold()
                        .green(),
                    table
                )
            }
        }
    }

    /// Stale entries, each with the artifacts that outdate it
    pub fn stale(entries: &[StaleEntry], format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => Self::pretty(&serde_json::json!(entries
                .iter()
                .map(|entry| serde_json::json!({
                    "identifier": entry.identifier,
                    "function": entry.function,
                    "artifacts": entry
                        .artifacts
                        .iter()
                        .map(|a| serde_json::json!({
                            "path": a.artifact.display().to_string(),
                            "modified": Self::timestamp(a.modified),
                            "entry_written": Self::timestamp(a.entry_written),
                        }))
                        .collect::<Vec<_>>(),
                }))
                .collect::<Vec<_>>())),
            OutputFormat::Table => {
                if entries.is_empty() {
                    return format!("{}\n", "No stale entries".green());
                }

                let mut table = Self::table(&["Entry", "Function", "Changed dependency", "Newer by"]);
                for entry in entries {
                    for artifact in &entry.artifacts {
                        let newer_by = artifact
                            .modified
                            .duration_since(artifact.entry_written)
                            .unwrap_or_default();
                        table.add_row(vec![
                            entry.identifier.clone(),
                            entry.function.clone(),
                            artifact.artifact.display().to_string(),
                            Self::duration(newer_by),
                        ]);
                    }
                }
                format!(
                    "{}\n{}\n",
                    format!("{} stale entries", entries.len()).bold().yellow(),
                    table
                )
            }
        }
    }

    /// Lock markers; those past `stale_age` are flagged as orphans
    pub fn markers(markers: &[MarkerInfo], stale_age: Duration, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => Self::pretty(&serde_json::json!(markers
                .iter()
                .map(|m| serde_json::json!({
                    "lock": m.lock,
                    "suffix": m.suffix,
                    "path": m.path.display().to_string(),
                    "age_secs": m.age.as_secs_f64(),
                    "orphaned": m.age > stale_age,
                }))
                .collect::<Vec<_>>())),
            OutputFormat::Table => {
                if markers.is_empty() {
                    return format!("{}\n", "No lock markers".green());
                }

                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(
                    ["Lock", "Holder", "Age", "State"]
                        .iter()
                        .map(|h| Cell::new(h).fg(Color::Green))
                        .collect::<Vec<_>>(),
                );
                for marker in markers {
                    let state = if marker.age > stale_age {
                        Cell::new("orphaned").fg(Color::Red)
                    } else {
                        Cell::new("held")
                    };
                    table.add_row(vec![
                        Cell::new(&marker.lock),
                        Cell::new(&marker.suffix),
                        Cell::new(Self::duration(marker.age)),
                        state,
                    ]);
                }
                format!("{}\n", table)
            }
        }
    }

    /// Everything stored for one entry
    pub fn entry(info: &EntryInfo, format: OutputFormat) -> String {
        let outputs: Option<Vec<serde_json::Value>> = info
            .outputs
            .as_ref()
            .map(|values| values.iter().map(Self::value_to_json).collect());

        match format {
            OutputFormat::Json => Self::pretty(&serde_json::json!({
                "identifier": info.identifier,
                "result_path": info.result_path.display().to_string(),
                "outputs": outputs,
                "unreadable": info.unreadable,
                "raw_uid": info.raw_uid,
                "error": info.error,
                "written": info.written.map(Self::timestamp),
            })),
            OutputFormat::Table => {
                let mut output = format!("{}\n", info.identifier.bold().green());
                output.push_str(&format!("Result record: {}\n", info.result_path.display()));
                if let Some(written) = info.written {
                    output.push_str(&format!("Written: {}\n", Self::timestamp(written)));
                }
                if let Some(raw_uid) = &info.raw_uid {
                    output.push_str(&format!("True identifier: {}\n", raw_uid));
                }
                if let Some(reason) = &info.unreadable {
                    output.push_str(&format!("{}\n", format!("Unreadable result: {}", reason).red()));
                }
                if let Some(error) = &info.error {
                    output.push_str(&format!("{}\n", format!("Cached error: {}", error).red()));
                }

                match &info.outputs {
                    Some(values) => {
                        let mut table = Self::table(&["#", "Type", "Value"]);
                        for (i, value) in values.iter().enumerate() {
                            table.add_row(vec![
                                (i + 1).to_string(),
                                value.type_name().to_string(),
                                value.to_string(),
                            ]);
                        }
                        output.push('\n');
                        output.push_str(&table.to_string());
                        output.push('\n');
                    }
                    None if info.unreadable.is_none() && info.error.is_none() => {
                        output.push_str(&format!("{}\n", "No records found".yellow()));
                    }
                    None => {}
                }
                output
            }
        }
    }

    fn table(header: &[&str]) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(
            header
                .iter()
                .map(|h| Cell::new(h).fg(Color::Green))
                .collect::<Vec<_>>(),
        );
        table
    }

    fn value_to_json(value: &Value) -> serde_json::Value {
        value
            .deserialize_into::<serde_json::Value>()
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()))
    }

    fn timestamp(time: SystemTime) -> String {
        DateTime::<Utc>::from(time).to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }

    fn duration(duration: Duration) -> String {
        let secs = duration.as_secs();
        if secs >= 3600 {
            format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
        } else if secs >= 60 {
            format!("{}m {:02}s", secs / 60, secs % 60)
        } else {
            format!("{:.1}s", duration.as_secs_f64())
        }
    }

    fn pretty(json: &serde_json::Value) -> String {
        serde_json::to_string_pretty(json).unwrap_or_else(|_| {
            "{\"status\": \"error\", \"error\": \"Could not serialize report to JSON\"}".to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memostore::StaleArtifact;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_duration_formatting() {
        assert_eq!(ReportFormatter::duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(ReportFormatter::duration(Duration::from_secs(125)), "2m 05s");
        assert_eq!(ReportFormatter::duration(Duration::from_secs(7260)), "2h 01m");
    }

    #[test]
    fn test_graph_json() {
        let mut graph = DependencyGraph::new();
        graph.add("fit", Path::new("/src/fit.rs"));
        graph.add("fit", Path::new("/src/io.rs"));
        graph.add("load", Path::new("/src/io.rs"));

        let json: serde_json::Value =
            serde_json::from_str(&ReportFormatter::graph(&graph, None, OutputFormat::Json)).unwrap();
        assert_eq!(json["fit"].as_array().map(Vec::len), Some(2));
        assert_eq!(json["load"][0], "/src/io.rs");

        let only: serde_json::Value = serde_json::from_str(&ReportFormatter::graph(
            &graph,
            Some("load"),
            OutputFormat::Json,
        ))
        .unwrap();
        assert!(only.get("fit").is_none());
    }

    #[test]
    fn test_stale_table_lists_artifacts() {
        let now = SystemTime::now();
        let entries = vec![StaleEntry {
            identifier: "fit-3".to_string(),
            function: "fit".to_string(),
            artifacts: vec![StaleArtifact {
                artifact: PathBuf::from("/src/fit.rs"),
                modified: now,
                entry_written: now - Duration::from_secs(90),
            }],
        }];
        let table = ReportFormatter::stale(&entries, OutputFormat::Table);
        assert!(table.contains("fit-3"));
        assert!(table.contains("/src/fit.rs"));
        assert!(table.contains("1m 30s"));

        assert!(ReportFormatter::stale(&[], OutputFormat::Table).contains("No stale entries"));
    }

    #[test]
    fn test_entry_json_uses_plain_values() {
        let info = EntryInfo {
            identifier: "fit-3".to_string(),
            result_path: PathBuf::from("/cache/results/fit-3.cache"),
            outputs: Some(vec![Value::from(2.5), Value::from(vec![1, 2])]),
            unreadable: None,
            raw_uid: None,
            error: None,
            written: None,
        };
        let json: serde_json::Value =
            serde_json::from_str(&ReportFormatter::entry(&info, OutputFormat::Json)).unwrap();
        assert_eq!(json["outputs"][0], 2.5);
        assert_eq!(json["outputs"][1], serde_json::json!([1, 2]));
        assert!(json["error"].is_null());
    }

    #[test]
    fn test_orphaned_markers_flagged() {
        let markers = vec![MarkerInfo {
            lock: "fit-3".to_string(),
            suffix: "00000000deadbeef".to_string(),
            path: PathBuf::from("/cache/metadata/locks/fit-3.00000000deadbeef.lock"),
            age: Duration::from_secs(45),
        }];
        let json: serde_json::Value = serde_json::from_str(&ReportFormatter::markers(
            &markers,
            Duration::from_secs(30),
            OutputFormat::Json,
        ))
        .unwrap();
        assert_eq!(json[0]["orphaned"], true);
    }
}
