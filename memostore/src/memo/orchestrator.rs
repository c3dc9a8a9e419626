// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! The memoizer: load a persisted result or run the computation
//!
//! Every call goes through the same steps:
//!
//! 1. validate options and derive the cache identifier (no I/O yet)
//! 2. register the callable's source artifact in the dependency graph,
//!    for this function and every enclosing memoized call
//! 3. under the entry lock: evict if stale, replay a cached error, and
//!    decide between loading and computing
//! 4. outside any lock: run the computation
//! 5. under the entry lock: persist the result (or the error report)
//!
//! A dry run stops after step 3 without writing anything.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::computation::Computation;
use super::context::CallStack;
use super::entry::{owning_function, EntryRecords, RESULT_SUFFIX};
use super::options::{CallOptions, Settings};
use crate::config::{DependencyPolicy, ErrorCaching, MemoConfig};
use crate::deps::{leaf_name, stale_artifacts, DependencyGraph, DependencyTracker, StaleArtifact};
use crate::error::{BoxError, MemoError, MemoResult};
use crate::key::{build_uid, Uid};
use crate::lock::Semaphore;
use crate::store::{open_store, ObjectStore, StoreError};
use crate::value::Value;

/// What a call did
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The computation ran and its result was persisted
    Computed(Vec<Value>),
    /// The persisted result was returned
    Loaded(Vec<Value>),
    /// Nothing ran; what a real call would do
    DryRun(DryRunReport),
}

impl Outcome {
    pub fn was_computed(&self) -> bool {
        matches!(self, Outcome::Computed(_))
    }

    /// Result values, `None` for a dry run
    pub fn into_values(self) -> Option<Vec<Value>> {
        match self {
            Outcome::Computed(values) | Outcome::Loaded(values) => Some(values),
            Outcome::DryRun(_) => None,
        }
    }
}

/// Why a call has to run its computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeReason {
    Missing,
    Forced,
    Stale,
    HashCollision,
    Corrupted,
}

impl fmt::Display for ComputeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ComputeReason::Missing => "no cached result",
            ComputeReason::Forced => "recompute forced",
            ComputeReason::Stale => "dependency changed",
            ComputeReason::HashCollision => "hashed identifier collision",
            ComputeReason::Corrupted => "cached result unreadable",
        };
        write!(f, "{}", text)
    }
}

/// Answer of [`Memoizer::dry_run_check`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunReport {
    pub needs_compute: bool,
    pub identifier: String,
    /// Location of the result record
    pub entry_path: PathBuf,
    pub reason: Option<ComputeReason>,
    /// A real call would replay a cached error
    pub cached_error: bool,
}

/// An entry whose function has a dependency newer than the entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleEntry {
    pub identifier: String,
    pub function: String,
    pub artifacts: Vec<StaleArtifact>,
}

/// Everything stored for one identifier
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    pub identifier: String,
    pub result_path: PathBuf,
    pub outputs: Option<Vec<Value>>,
    /// Why `outputs` could not be read, if a result record exists but is unreadable
    pub unreadable: Option<String>,
    pub raw_uid: Option<String>,
    pub error: Option<String>,
    pub written: Option<SystemTime>,
}

enum Decision {
    Load(Vec<Value>),
    Compute(ComputeReason),
    Replay(String),
    Report(DryRunReport),
}

/// Per-call state shared by the decision and persistence steps
struct Call<'a> {
    function: &'a str,
    dep_key: &'a str,
    settings: Settings,
    uid: Uid,
    entry: EntryRecords,
    nargout: usize,
}

/// Loads persisted results or runs computations and persists what they return
pub struct Memoizer {
    config: MemoConfig,
    results: Arc<dyn ObjectStore>,
    metadata: Arc<dyn ObjectStore>,
    semaphore: Arc<Semaphore>,
    tracker: DependencyTracker,
}

impl Memoizer {
    /// Open the stores named by `config`
    pub fn open(config: MemoConfig) -> MemoResult<Self> {
        config.validate()?;
        let results: Arc<dyn ObjectStore> =
            Arc::from(open_store(config.store, &config.result_store_path)?);
        let metadata: Arc<dyn ObjectStore> =
            Arc::from(open_store(config.store, &config.metadata_store_path)?);
        Self::with_stores(config, results, metadata)
    }

    /// Use already opened stores; lock markers still go to `config.lock_dir()`
    pub fn with_stores(
        config: MemoConfig,
        results: Arc<dyn ObjectStore>,
        metadata: Arc<dyn ObjectStore>,
    ) -> MemoResult<Self> {
        config.validate()?;
        let semaphore = Arc::new(
            Semaphore::open(config.lock_dir())?
                .with_wait(config.lock_wait)
                .with_stale_age(config.stale_lock_age)
                .with_race_window(config.race_window)
                .with_verbose(config.diagnostics_level >= 2),
        );
        let tracker = DependencyTracker::new(Arc::clone(&metadata), Arc::clone(&semaphore));
        Ok(Self {
            config,
            results,
            metadata,
            semaphore,
            tracker,
        })
    }

    pub fn config(&self) -> &MemoConfig {
        &self.config
    }

    pub fn results(&self) -> &dyn ObjectStore {
        self.results.as_ref()
    }

    pub fn metadata(&self) -> &dyn ObjectStore {
        self.metadata.as_ref()
    }

    pub fn semaphore(&self) -> &Semaphore {
        &self.semaphore
    }

    /// Return the `nargout` outputs of `callable(args)`, computing them only
    /// when no usable persisted result exists
    pub fn load_or_run<C: Computation + ?Sized>(
        &self,
        stack: &CallStack,
        callable: &C,
        args: &[Value],
        nargout: usize,
        options: &CallOptions,
    ) -> MemoResult<Vec<Value>> {
        match self.run(stack, callable, args, nargout, options)? {
            Outcome::Computed(values) | Outcome::Loaded(values) => Ok(values),
            Outcome::DryRun(_) => Err(MemoError::Usage(
                "load_or_run called with dry_run set; use dry_run_check".to_string(),
            )),
        }
    }

    /// Report whether a real call would compute, without running or writing anything
    pub fn dry_run_check<C: Computation + ?Sized>(
        &self,
        stack: &CallStack,
        callable: &C,
        args: &[Value],
        options: &CallOptions,
    ) -> MemoResult<DryRunReport> {
        let options = options.clone().dry_run(true);
        match self.run(stack, callable, args, 0, &options)? {
            Outcome::DryRun(report) => Ok(report),
            Outcome::Computed(_) | Outcome::Loaded(_) => Err(MemoError::Usage(
                "dry run unexpectedly produced values".to_string(),
            )),
        }
    }

    /// Like [`Memoizer::load_or_run`], but also says whether the result was computed
    pub fn run<C: Computation + ?Sized>(
        &self,
        stack: &CallStack,
        callable: &C,
        args: &[Value],
        nargout: usize,
        options: &CallOptions,
    ) -> MemoResult<Outcome> {
        let settings = options.resolve(&self.config)?;
        let function = callable.name();
        if function.trim().is_empty() {
            return Err(MemoError::Usage(
                "computation has an empty name".to_string(),
            ));
        }
        let dep_key = leaf_name(function);
        let uid = build_uid(function, settings.identity.key_source(args), &settings.key)?;
        let entry = EntryRecords::new(&uid.identifier);

        let source = callable.source();
        if source.is_none() {
            warn!(
                "'{}' has no source artifact; its results are not staleness-tracked",
                function
            );
        }
        if settings.diagnostics >= 2 {
            debug!(
                "{} -> {} (uid '{}'{}), stack {}",
                function,
                entry.identifier,
                uid.raw,
                if uid.hashed { ", hashed" } else { "" },
                stack
            );
        }

        let graph = if settings.dry_run {
            self.tracker.preview(dep_key, source, stack)?
        } else {
            self.tracker.register(dep_key, source, stack)?
        };

        let call = Call {
            function,
            dep_key,
            settings,
            uid,
            entry,
            nargout,
        };

        let decision = self
            .semaphore
            .with_lock(call.entry.lock_name(), || self.decide(&call, &graph))?;

        match decision {
            Decision::Report(report) => Ok(Outcome::DryRun(report)),
            Decision::Load(values) => {
                if call.settings.diagnostics >= 1 {
                    info!("Loaded {}", call.entry.identifier);
                }
                Ok(Outcome::Loaded(values))
            }
            Decision::Replay(message) => {
                if call.settings.diagnostics >= 1 {
                    info!("Replaying cached error of {}", call.entry.identifier);
                }
                Err(MemoError::Callable {
                    function: function.to_string(),
                    message,
                    replayed: true,
                })
            }
            Decision::Compute(reason) => {
                if call.settings.diagnostics >= 1 {
                    info!("Computing {} ({})", call.entry.identifier, reason);
                }
                self.compute(&call, stack, callable, args)
            }
        }
    }

    /// Steps 4 to 6, run while holding the entry lock
    fn decide(&self, call: &Call<'_>, graph: &DependencyGraph) -> MemoResult<Decision> {
        let entry = &call.entry;
        let settings = &call.settings;
        let result_written = self.results.last_modified(&entry.result)?;
        let mut error_written = self.results.last_modified(&entry.error)?;

        let mut evicted = false;
        if settings.policy != DependencyPolicy::Ignore {
            let stale = stale_artifacts(graph, call.dep_key, result_written, error_written);
            if let Some(first) = stale.first() {
                match settings.policy {
                    DependencyPolicy::Warn => warn!(
                        "{} predates a change to {} ({} changed dependency(ies)); using it anyway",
                        entry.identifier,
                        first.artifact.display(),
                        stale.len()
                    ),
                    _ => {
                        if settings.diagnostics >= 1 {
                            info!(
                                "Evicting {}: {} changed",
                                entry.identifier,
                                first.artifact.display()
                            );
                        }
                        if !settings.dry_run {
                            self.remove_entry(entry)?;
                            error_written = None;
                        }
                        evicted = true;
                    }
                }
            }
        }

        let mut collided = false;
        if settings.error_caching == ErrorCaching::Cache && error_written.is_some() && !evicted {
            if call.uid.hashed && !self.true_uid_matches(call)? {
                warn!(
                    "Hash collision on {}: cached error belongs to another uid than '{}', recomputing",
                    entry.identifier, call.uid.raw
                );
                collided = true;
            } else {
                match self.results.load_text(&entry.error) {
                    Ok(Some(message)) if settings.dry_run => {
                        debug!("Dry run of {} would replay: {}", entry.identifier, message);
                        return Ok(Decision::Report(self.report(call, None, true)));
                    }
                    Ok(Some(message)) => return Ok(Decision::Replay(message)),
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Ignoring unreadable error record of {}: {}", entry.identifier, e)
                    }
                }
            }
        }

        let reason = match result_written {
            _ if evicted => Some(ComputeReason::Stale),
            _ if collided => Some(ComputeReason::HashCollision),
            None => Some(ComputeReason::Missing),
            Some(written) if settings.force.applies_to(DateTime::<Utc>::from(written)) => {
                Some(ComputeReason::Forced)
            }
            Some(_) if call.uid.hashed && !self.true_uid_matches(call)? => {
                warn!(
                    "Hash collision on {}: stored uid differs from '{}', recomputing",
                    entry.identifier, call.uid.raw
                );
                Some(ComputeReason::HashCollision)
            }
            Some(_) => None,
        };

        if settings.dry_run {
            return Ok(Decision::Report(self.report(call, reason, false)));
        }
        if let Some(reason) = reason {
            return Ok(Decision::Compute(reason));
        }

        match self.results.load(&entry.result) {
            Ok(values) if values.len() == call.nargout => Ok(Decision::Load(values)),
            Ok(values) => Err(MemoError::Usage(format!(
                "{} was cached with {} output(s) but {} were requested",
                entry.identifier,
                values.len(),
                call.nargout
            ))),
            Err(StoreError::Corrupted { reason, .. }) => {
                let corrupted = MemoError::Corrupted {
                    path: self.results.location(&entry.result),
                    reason,
                };
                warn!("{}; recomputing", corrupted);
                Ok(Decision::Compute(ComputeReason::Corrupted))
            }
            Err(StoreError::NotFound(_)) => Ok(Decision::Compute(ComputeReason::Missing)),
            Err(e) => Err(e.into()),
        }
    }

    fn true_uid_matches(&self, call: &Call<'_>) -> MemoResult<bool> {
        match self.results.load_text(&call.entry.uid) {
            Ok(stored) => Ok(stored.as_deref() == Some(call.uid.raw.as_str())),
            Err(StoreError::Corrupted { reason, .. }) => {
                warn!("Unreadable uid record of {}: {}", call.entry.identifier, reason);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn report(&self, call: &Call<'_>, reason: Option<ComputeReason>, cached_error: bool) -> DryRunReport {
        DryRunReport {
            needs_compute: reason.is_some(),
            identifier: call.entry.identifier.clone(),
            entry_path: self.results.location(&call.entry.result),
            reason,
            cached_error,
        }
    }

    /// Steps 7 and 8: run outside the lock, persist under it
    fn compute<C: Computation + ?Sized>(
        &self,
        call: &Call<'_>,
        stack: &CallStack,
        callable: &C,
        args: &[Value],
    ) -> MemoResult<Outcome> {
        let inner = stack.push(call.dep_key);
        let values = match callable.call(&inner, args, call.nargout) {
            Ok(values) => values,
            Err(error) => return Err(self.record_failure(call, error)),
        };

        if values.len() != call.nargout {
            return Err(MemoError::Usage(format!(
                "{} returned {} value(s) but {} were requested",
                call.function,
                values.len(),
                call.nargout
            )));
        }

        let entry = &call.entry;
        self.semaphore.with_lock(entry.lock_name(), || -> MemoResult<()> {
            self.results.save(&entry.result, &values)?;
            if call.uid.hashed {
                self.results.save_text(&entry.uid, &call.uid.raw)?;
            } else {
                self.results.delete(&entry.uid)?;
            }
            self.results.delete(&entry.error)?;
            Ok(())
        })?;

        Ok(Outcome::Computed(values))
    }

    /// Turn a computation failure into the error returned to the caller,
    /// persisting its report when error caching is on
    fn record_failure(&self, call: &Call<'_>, error: BoxError) -> MemoError {
        // Infrastructure failures of nested memoized calls are not the
        // computation's fault and are neither wrapped nor cached.
        let message = match error.downcast::<MemoError>() {
            Ok(nested) if !matches!(*nested, MemoError::Callable { .. }) => return *nested,
            Ok(nested) => nested.to_string(),
            Err(error) => error.to_string(),
        };

        if call.settings.error_caching == ErrorCaching::Cache {
            let entry = &call.entry;
            let saved = self.semaphore.with_lock(entry.lock_name(), || -> MemoResult<()> {
                self.results.save_text(&entry.error, &message)?;
                if call.uid.hashed {
                    self.results.save_text(&entry.uid, &call.uid.raw)?;
                }
                Ok(())
            });
            match saved {
                Ok(()) if call.settings.diagnostics >= 1 => {
                    info!("Cached failure of {}", entry.identifier)
                }
                Ok(()) => {}
                Err(e) => warn!("Could not cache failure of {}: {}", entry.identifier, e),
            }
        }

        MemoError::Callable {
            function: call.function.to_string(),
            message,
            replayed: false,
        }
    }

    /// Delete every record of an entry. Caller holds the entry lock.
    fn remove_entry(&self, entry: &EntryRecords) -> MemoResult<bool> {
        let mut removed = false;
        for name in entry.names() {
            removed |= self.results.delete(name)?;
        }
        Ok(removed)
    }

    /// Remove the result, uid and error records of `identifier`
    pub fn evict(&self, identifier: &str) -> MemoResult<bool> {
        let identifier = identifier.strip_suffix(RESULT_SUFFIX).unwrap_or(identifier);
        let entry = EntryRecords::new(identifier);
        let removed = self
            .semaphore
            .with_lock(entry.lock_name(), || self.remove_entry(&entry))?;
        if removed {
            info!("Evicted {}", identifier);
        }
        Ok(removed)
    }

    /// Persisted dependency graph
    pub fn dependency_graph(&self) -> MemoResult<DependencyGraph> {
        self.tracker.load()
    }

    /// Identifiers with at least one record in the result store
    pub fn entries(&self) -> MemoResult<Vec<String>> {
        let mut identifiers: Vec<String> = self
            .results
            .list("")?
            .iter()
            .filter_map(|record| EntryRecords::from_record(record))
            .map(|entry| entry.identifier)
            .collect();
        identifiers.sort();
        identifiers.dedup();
        Ok(identifiers)
    }

    /// Entries a call under the `autoremove` policy would evict
    pub fn stale_entries(&self) -> MemoResult<Vec<StaleEntry>> {
        let graph = self.dependency_graph()?;
        let mut stale = Vec::new();
        for identifier in self.entries()? {
            let Some(function) = owning_function(&identifier, &graph) else {
                continue;
            };
            let entry = EntryRecords::new(&identifier);
            let artifacts = self.semaphore.with_lock(entry.lock_name(), || -> MemoResult<_> {
                Ok(stale_artifacts(
                    &graph,
                    function,
                    self.results.last_modified(&entry.result)?,
                    self.results.last_modified(&entry.error)?,
                ))
            })?;
            if !artifacts.is_empty() {
                stale.push(StaleEntry {
                    function: function.to_string(),
                    identifier,
                    artifacts,
                });
            }
        }
        Ok(stale)
    }

    /// Read every record of `identifier` under its lock
    pub fn inspect(&self, identifier: &str) -> MemoResult<EntryInfo> {
        let identifier = identifier.strip_suffix(RESULT_SUFFIX).unwrap_or(identifier);
        let entry = EntryRecords::new(identifier);
        self.semaphore.with_lock(entry.lock_name(), || -> MemoResult<EntryInfo> {
            let (outputs, unreadable) = match self.results.load(&entry.result) {
                Ok(values) => (Some(values), None),
                Err(StoreError::NotFound(_)) => (None, None),
                Err(StoreError::Corrupted { reason, .. }) => (None, Some(reason)),
                Err(e) => return Err(e.into()),
            };
            Ok(EntryInfo {
                identifier: identifier.to_string(),
                result_path: self.results.location(&entry.result),
                outputs,
                unreadable,
                raw_uid: self.results.load_text(&entry.uid)?,
                error: self.results.load_text(&entry.error)?,
                written: self.results.last_modified(&entry.result)?,
            })
        })
    }
}
