// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI command handlers for memostore

use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::commands::OutputFormat;
use super::output::ReportFormatter;
use memostore::deps::leaf_name;
use memostore::{
    DependencyTracker, FsObjectStore, MemoConfig, Memoizer, ObjectStore, Semaphore, StoreKind,
};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Configuration from `--config`, or the defaults
fn base_config(config: Option<&Path>) -> Result<MemoConfig, Box<dyn std::error::Error>> {
    match config {
        Some(path) => Ok(MemoConfig::load(path)?),
        None => Ok(MemoConfig::default()),
    }
}

fn require_dir(path: &Path, what: &str) -> CliResult {
    if !path.is_dir() {
        return Err(format!("{} not found at {}", what, path.display()).into());
    }
    Ok(())
}

fn semaphore_for(config: &MemoConfig) -> Result<Semaphore, Box<dyn std::error::Error>> {
    Ok(Semaphore::open(config.lock_dir())?
        .with_wait(config.lock_wait)
        .with_stale_age(config.stale_lock_age)
        .with_race_window(config.race_window)
        .with_verbose(config.diagnostics_level >= 2))
}

fn open_memoizer(
    config: Option<&Path>,
    results: PathBuf,
    metadata: PathBuf,
) -> Result<Memoizer, Box<dyn std::error::Error>> {
    require_dir(&results, "Result store")?;
    require_dir(&metadata, "Metadata store")?;

    let config = MemoConfig {
        result_store_path: results,
        metadata_store_path: metadata,
        store: StoreKind::Filesystem,
        ..base_config(config)?
    };
    Ok(Memoizer::open(config)?)
}

/// Handle the deps command
pub fn handle_deps(
    config: Option<&Path>,
    metadata: PathBuf,
    function: Option<String>,
    format: OutputFormat,
) -> CliResult {
    require_dir(&metadata, "Metadata store")?;
    let config = MemoConfig {
        metadata_store_path: metadata.clone(),
        ..base_config(config)?
    };

    let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::open(&metadata)?);
    let tracker = DependencyTracker::new(store, Arc::new(semaphore_for(&config)?));
    let graph = tracker.load()?;

    let function = function.as_deref().map(leaf_name);
    if let Some(function) = function {
        if !graph.contains(function) {
            println!(
                "{}",
                format!("No dependencies recorded for '{}'", function).yellow()
            );
            return Ok(());
        }
    }

    print!("{}", ReportFormatter::graph(&graph, function, format));
    Ok(())
}

/// Handle the stale command
pub fn handle_stale(
    config: Option<&Path>,
    metadata: PathBuf,
    results: PathBuf,
    evict: bool,
    format: OutputFormat,
) -> CliResult {
    let memo = open_memoizer(config, results, metadata)?;
    let stale = memo.stale_entries()?;
    print!("{}", ReportFormatter::stale(&stale, format));

    if evict && !stale.is_empty() {
        let mut evicted = 0;
        for entry in &stale {
            if memo.evict(&entry.identifier)? {
                evicted += 1;
            }
        }
        eprintln!("{}", format!("Evicted {} entries", evicted).green());
    }
    Ok(())
}

/// Handle the locks command
pub fn handle_locks(
    config: Option<&Path>,
    metadata: PathBuf,
    clean: bool,
    format: OutputFormat,
) -> CliResult {
    require_dir(&metadata, "Metadata store")?;
    let config = MemoConfig {
        metadata_store_path: metadata,
        ..base_config(config)?
    };
    let semaphore = semaphore_for(&config)?;

    let markers = semaphore.markers()?;
    print!(
        "{}",
        ReportFormatter::markers(&markers, semaphore.stale_age(), format)
    );

    if clean {
        let removed = semaphore.clear_orphans()?;
        let message = format!("Removed {} orphaned marker(s)", removed.len());
        if removed.is_empty() {
            eprintln!("{}", message);
        } else {
            eprintln!("{}", message.green());
        }
    }
    Ok(())
}

/// Handle the evict command
pub fn handle_evict(
    config: Option<&Path>,
    results: PathBuf,
    metadata: PathBuf,
    id: String,
) -> CliResult {
    let memo = open_memoizer(config, results, metadata)?;
    if memo.evict(&id)? {
        println!("{}", format!("Evicted {}", id).green());
    } else {
        println!("{}", format!("No records found for {}", id).yellow());
    }
    Ok(())
}

/// Handle the inspect command
pub fn handle_inspect(
    config: Option<&Path>,
    results: PathBuf,
    metadata: Option<PathBuf>,
    id: String,
    format: OutputFormat,
) -> CliResult {
    let metadata = match metadata {
        Some(metadata) => metadata,
        None => results
            .parent()
            .map(|parent| parent.join("metadata"))
            .ok_or("cannot derive the metadata store from the result store; pass --metadata")?,
    };
    let memo = open_memoizer(config, results, metadata)?;
    let info = memo.inspect(&id)?;
    print!("{}", ReportFormatter::entry(&info, format));
    Ok(())
}

/// Handle the config command
pub fn handle_config(init: Option<PathBuf>, root: PathBuf, shared: bool, force: bool) -> CliResult {
    let config = if shared {
        MemoConfig::shared_filesystem(&root)
    } else {
        MemoConfig::at(&root)
    };

    match init {
        Some(path) => {
            if path.exists() && !force {
                println!(
                    "{}",
                    format!("Configuration already exists at {}", path.display()).yellow()
                );
                println!("Use --force to overwrite it.");
                return Err("Configuration already exists".into());
            }
            config.save(&path)?;
            println!(
                "{}",
                format!("Configuration written to {}", path.display()).green()
            );
        }
        None => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}
