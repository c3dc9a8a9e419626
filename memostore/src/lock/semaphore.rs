// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Filesystem semaphore
//!
//! A lock named `n` is held by whoever owns the only marker file
//! `<n>.<suffix>.lock` in the lock directory. Acquisition is optimistic:
//!
//! ```text
//! loop:
//!   list markers of n, force-release those older than stale_age
//!   others left?      -> sleep 10-30ms, retry
//!   create my marker
//!   sleep race_window, list again
//!   others appeared?  -> delete mine, back off 10-50ms, retry
//!   otherwise held
//! ```
//!
//! Nothing here relies on an atomic filesystem primitive beyond file
//! creation, so the protocol is probabilistic: two claimants whose create
//! and re-list steps are further apart than `race_window` can both win.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::error::{MemoError, MemoResult};
use crate::store::StoreError;

/// Default time an acquirer keeps retrying
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(10);

/// Markers older than this are assumed to belong to a crashed holder
pub const DEFAULT_STALE_LOCK_AGE: Duration = Duration::from_secs(30);

/// Pause between creating a marker and checking for competitors
pub const DEFAULT_RACE_WINDOW: Duration = Duration::from_millis(20);

const MARKER_EXTENSION: &str = "lock";
const SUFFIX_LEN: usize = 16;
// 255 minus ".<suffix>.lock"
const MAX_STEM_LEN: usize = 255 - 1 - SUFFIX_LEN - 1 - MARKER_EXTENSION.len();

static SEED_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Proof of holding a lock, handed back to [`Semaphore::release`]
#[derive(Debug)]
pub struct SemaphoreToken {
    name: String,
    marker: PathBuf,
    acquired_at: Instant,
}

impl SemaphoreToken {
    /// Lock name as requested by the caller
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Marker file backing this token
    pub fn marker(&self) -> &Path {
        &self.marker
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

/// Result of releasing a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The marker was deleted
    Released,
    /// The marker was already gone (released twice, or taken over as stale)
    AlreadyGone,
}

/// A marker file found in the lock directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerInfo {
    /// Marker file name stem, i.e. the sanitised lock name
    pub lock: String,
    pub suffix: String,
    pub path: PathBuf,
    pub age: Duration,
}

/// Filesystem-marker based named mutual exclusion
#[derive(Debug)]
pub struct Semaphore {
    dir: PathBuf,
    wait: Duration,
    stale_age: Duration,
    race_window: Duration,
    verbose: bool,
    rng: Mutex<fastrand::Rng>,
}

impl Semaphore {
    /// Open (creating if needed) a lock directory with default timings
    pub fn open<P: AsRef<Path>>(dir: P) -> MemoResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(StoreError::from)?;
        Ok(Self {
            dir,
            wait: DEFAULT_LOCK_WAIT,
            stale_age: DEFAULT_STALE_LOCK_AGE,
            race_window: DEFAULT_RACE_WINDOW,
            verbose: false,
            rng: Mutex::new(fastrand::Rng::with_seed(process_seed())),
        })
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_stale_age(mut self, stale_age: Duration) -> Self {
        self.stale_age = stale_age;
        self
    }

    pub fn with_race_window(mut self, race_window: Duration) -> Self {
        self.race_window = race_window;
        self
    }

    /// Log every acquisition attempt at debug level
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stale_age(&self) -> Duration {
        self.stale_age
    }

    /// Block until the lock `name` is held or the wait time runs out
    pub fn acquire(&self, name: &str) -> MemoResult<SemaphoreToken> {
        let stem = marker_stem(name);
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let others = self.live_markers(&stem, None)?;

            if others.is_empty() {
                let marker = self.dir.join(format!(
                    "{}.{}.{}",
                    stem,
                    self.next_suffix(),
                    MARKER_EXTENSION
                ));
                if self.create_marker(&marker)? {
                    thread::sleep(self.race_window);
                    let competing = self.live_markers(&stem, Some(&marker))?;
                    if competing.is_empty() {
                        if self.verbose {
                            debug!(
                                "Acquired lock '{}' after {} attempt(s) in {:?}",
                                name,
                                attempts,
                                started.elapsed()
                            );
                        }
                        return Ok(SemaphoreToken {
                            name: name.to_string(),
                            marker,
                            acquired_at: Instant::now(),
                        });
                    }
                    if self.verbose {
                        debug!(
                            "Race on lock '{}' with {} other marker(s), backing off",
                            name,
                            competing.len()
                        );
                    }
                    remove_marker(&marker)?;
                    self.pause(10, 50);
                } else {
                    self.pause(10, 30);
                }
            } else {
                if self.verbose {
                    debug!("Lock '{}' is held ({} marker(s)), waiting", name, others.len());
                }
                self.pause(10, 30);
            }

            let waited = started.elapsed();
            if waited >= self.wait {
                return Err(MemoError::LockTimeout {
                    name: name.to_string(),
                    waited,
                });
            }
        }
    }

    /// Delete the marker behind `token`
    pub fn release(&self, token: &SemaphoreToken) -> MemoResult<ReleaseOutcome> {
        let outcome = if remove_marker(&token.marker)? {
            ReleaseOutcome::Released
        } else {
            warn!(
                "Lock '{}' was already released (marker {} missing)",
                token.name,
                token.marker.display()
            );
            ReleaseOutcome::AlreadyGone
        };
        if self.verbose {
            debug!("Released lock '{}' after {:?}", token.name, token.held_for());
        }
        Ok(outcome)
    }

    /// Acquire `name` and release it when the guard is dropped
    pub fn lock(&self, name: &str) -> MemoResult<SemaphoreGuard<'_>> {
        let token = self.acquire(name)?;
        Ok(SemaphoreGuard {
            semaphore: self,
            token: Some(token),
        })
    }

    /// Run `f` while holding `name`
    pub fn with_lock<T, E, F>(&self, name: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<MemoError>,
    {
        let guard = self.lock(name)?;
        let result = f();
        match guard.release() {
            Ok(_) => result,
            // The closure's own failure says more than the release failure
            Err(e) if result.is_err() => {
                warn!("Failed to release lock '{}': {}", name, e);
                result
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Every marker currently in the lock directory
    pub fn markers(&self) -> MemoResult<Vec<MarkerInfo>> {
        let mut markers = self.scan()?;
        markers.sort_by(|a, b| a.lock.cmp(&b.lock).then(a.suffix.cmp(&b.suffix)));
        Ok(markers)
    }

    /// Force-release every marker older than the stale age
    pub fn clear_orphans(&self) -> MemoResult<Vec<MarkerInfo>> {
        let mut removed = Vec::new();
        for marker in self.markers()? {
            if marker.age > self.stale_age && remove_marker(&marker.path)? {
                warn!(
                    "Removed orphaned lock marker {} (age {:?})",
                    marker.path.display(),
                    marker.age
                );
                removed.push(marker);
            }
        }
        Ok(removed)
    }

    /// Markers of `stem` other than `mine`, after force-releasing stale ones
    fn live_markers(&self, stem: &str, mine: Option<&Path>) -> MemoResult<Vec<MarkerInfo>> {
        let mut live = Vec::new();
        for marker in self.scan()? {
            if marker.lock != stem || Some(marker.path.as_path()) == mine {
                continue;
            }
            if marker.age > self.stale_age {
                warn!(
                    "Lock marker {} is {:?} old, assuming its holder crashed and taking over",
                    marker.path.display(),
                    marker.age
                );
                remove_marker(&marker.path)?;
                continue;
            }
            live.push(marker);
        }
        Ok(live)
    }

    fn scan(&self) -> MemoResult<Vec<MarkerInfo>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::from(e).into()),
        };

        let now = SystemTime::now();
        let mut markers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(StoreError::from)?;
            let file_name = entry.file_name();
            let Some((lock, suffix)) = file_name.to_str().and_then(parse_marker_name) else {
                continue;
            };
            // A marker may vanish between listing and stat
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::from(e).into()),
            };
            markers.push(MarkerInfo {
                lock: lock.to_string(),
                suffix: suffix.to_string(),
                path: entry.path(),
                age: now.duration_since(modified).unwrap_or_default(),
            });
        }
        Ok(markers)
    }

    /// Returns false if the exact marker already exists
    fn create_marker(&self, marker: &Path) -> MemoResult<bool> {
        match OpenOptions::new().write(true).create_new(true).open(marker) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id()).map_err(StoreError::from)?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StoreError::from(e).into()),
        }
    }

    fn next_suffix(&self) -> String {
        format!("{:016x}", self.rng.lock().u64(..))
    }

    fn pause(&self, min_ms: u64, max_ms: u64) {
        let ms = self.rng.lock().u64(min_ms..=max_ms);
        thread::sleep(Duration::from_millis(ms));
    }
}

/// RAII holder of a lock
#[derive(Debug)]
pub struct SemaphoreGuard<'a> {
    semaphore: &'a Semaphore,
    token: Option<SemaphoreToken>,
}

impl SemaphoreGuard<'_> {
    pub fn token(&self) -> Option<&SemaphoreToken> {
        self.token.as_ref()
    }

    /// Release now and report the outcome instead of waiting for drop
    pub fn release(mut self) -> MemoResult<ReleaseOutcome> {
        match self.token.take() {
            Some(token) => self.semaphore.release(&token),
            None => Ok(ReleaseOutcome::AlreadyGone),
        }
    }
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            if let Err(e) = self.semaphore.release(&token) {
                warn!("Failed to release lock '{}': {}", token.name, e);
            }
        }
    }
}

/// Turn a lock name into a marker file stem
pub fn marker_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '(' | ')' | '=' | '{' | '}') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() || stem.len() > MAX_STEM_LEN || stem.starts_with('.') {
        format!("h{:032x}", xxhash_rust::xxh3::xxh3_128(name.as_bytes()))
    } else {
        stem
    }
}

fn parse_marker_name(file_name: &str) -> Option<(&str, &str)> {
    let rest = file_name.strip_suffix(MARKER_EXTENSION)?.strip_suffix('.')?;
    let (stem, suffix) = rest.rsplit_once('.')?;
    if stem.is_empty() || suffix.len() != SUFFIX_LEN || !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some((stem, suffix))
}

/// Returns false if the marker was already gone
fn remove_marker(path: &Path) -> MemoResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::from(e).into()),
    }
}

/// Seed that differs per process, host, thread and semaphore instance
fn process_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_default();
    let material = format!(
        "{}:{}:{:?}:{}:{}",
        std::process::id(),
        nanos,
        thread::current().id(),
        host,
        SEED_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    xxhash_rust::xxh3::xxh3_64(material.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn quick(dir: &Path) -> Semaphore {
        Semaphore::open(dir)
            .unwrap()
            .with_race_window(Duration::from_millis(5))
    }

    #[test]
    fn test_acquire_and_release() {
        let temp_dir = TempDir::new().unwrap();
        let semaphore = quick(temp_dir.path());

        let token = semaphore.acquire("graph").unwrap();
        assert!(token.marker().exists());
        assert_eq!(semaphore.markers().unwrap().len(), 1);

        assert_eq!(semaphore.release(&token).unwrap(), ReleaseOutcome::Released);
        assert!(semaphore.markers().unwrap().is_empty());
    }

    #[test]
    fn test_release_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let semaphore = quick(temp_dir.path());

        let token = semaphore.acquire("graph").unwrap();
        semaphore.release(&token).unwrap();
        assert_eq!(semaphore.release(&token).unwrap(), ReleaseOutcome::AlreadyGone);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let semaphore = quick(temp_dir.path());
        {
            let _guard = semaphore.lock("entry").unwrap();
            assert_eq!(semaphore.markers().unwrap().len(), 1);
        }
        assert!(semaphore.markers().unwrap().is_empty());
    }

    #[test]
    fn test_timeout_while_held() {
        let temp_dir = TempDir::new().unwrap();
        let holder = quick(temp_dir.path());
        let waiter = quick(temp_dir.path()).with_wait(Duration::from_millis(200));

        let _guard = holder.lock("entry").unwrap();
        match waiter.acquire("entry") {
            Err(MemoError::LockTimeout { name, waited }) => {
                assert_eq!(name, "entry");
                assert!(waited >= Duration::from_millis(200));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_with_lock_keeps_the_closure_error() {
        let temp_dir = TempDir::new().unwrap();
        let semaphore = quick(temp_dir.path());

        // Swap the held marker for a directory so that releasing it fails
        let jam = |name: &str| {
            let marker = semaphore
                .markers()
                .unwrap()
                .into_iter()
                .find(|m| m.lock == name)
                .unwrap();
            fs::remove_file(&marker.path).unwrap();
            fs::create_dir_all(marker.path.join("held")).unwrap();
        };

        let failed: MemoResult<()> = semaphore.with_lock("entry-a", || {
            jam("entry-a");
            Err(MemoError::Usage("computation rejected".to_string()))
        });
        assert!(matches!(failed, Err(MemoError::Usage(_))));

        let succeeded: MemoResult<()> = semaphore.with_lock("entry-b", || {
            jam("entry-b");
            Ok(())
        });
        assert!(matches!(succeeded, Err(MemoError::Storage(_))));
    }

    #[test]
    fn test_different_names_do_not_contend() {
        let temp_dir = TempDir::new().unwrap();
        let semaphore = quick(temp_dir.path()).with_wait(Duration::from_millis(200));

        let _a = semaphore.lock("f-1").unwrap();
        let _b = semaphore.lock("f-1.x").unwrap();
        assert_eq!(semaphore.markers().unwrap().len(), 2);
    }

    #[test]
    fn test_stale_marker_is_taken_over() {
        let temp_dir = TempDir::new().unwrap();
        let semaphore = quick(temp_dir.path()).with_wait(Duration::from_millis(500));

        let orphan = temp_dir.path().join("entry.00000000deadbeef.lock");
        let file = File::create(&orphan).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(120))
            .unwrap();
        drop(file);

        let token = semaphore.acquire("entry").unwrap();
        assert!(!orphan.exists());
        semaphore.release(&token).unwrap();
    }

    #[test]
    fn test_clear_orphans_keeps_fresh_markers() {
        let temp_dir = TempDir::new().unwrap();
        let semaphore = quick(temp_dir.path());

        let old = temp_dir.path().join("a.0000000000000001.lock");
        File::create(&old)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(60))
            .unwrap();
        let _fresh = semaphore.lock("b").unwrap();

        let removed = semaphore.clear_orphans().unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].lock, "a");
        assert_eq!(semaphore.markers().unwrap().len(), 1);
    }

    #[test]
    fn test_marker_names() {
        assert_eq!(marker_stem("f-1.cache"), "f-1.cache");
        assert_eq!(marker_stem("a/b c"), "a_b_c");
        assert!(marker_stem(&"x".repeat(300)).starts_with('h'));
        assert!(marker_stem(&"x".repeat(300)).len() <= MAX_STEM_LEN);

        assert_eq!(
            parse_marker_name("f-1.cache.0123456789abcdef.lock"),
            Some(("f-1.cache", "0123456789abcdef"))
        );
        assert_eq!(parse_marker_name("f-1.cache"), None);
        assert_eq!(parse_marker_name("f.xyz.lock"), None);
    }

    #[test]
    fn test_suffixes_differ_between_instances() {
        let temp_dir = TempDir::new().unwrap();
        let a = quick(temp_dir.path());
        let b = quick(temp_dir.path());
        assert_ne!(a.next_suffix(), b.next_suffix());
    }

    #[test]
    fn test_mutual_exclusion_counter() {
        let temp_dir = TempDir::new().unwrap();
        let counter = temp_dir.path().join("counter");
        fs::write(&counter, "0").unwrap();
        let lock_dir = Arc::new(temp_dir.path().join("locks"));

        let workers = 4;
        let increments = 5;
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let lock_dir = Arc::clone(&lock_dir);
                let counter = counter.clone();
                thread::spawn(move || {
                    let semaphore = Semaphore::open(lock_dir.as_path())
                        .unwrap()
                        .with_wait(Duration::from_secs(60));
                    for _ in 0..increments {
                        semaphore
                            .with_lock("counter", || -> MemoResult<()> {
                                let value: u32 =
                                    fs::read_to_string(&counter).unwrap().parse().unwrap();
                                thread::sleep(Duration::from_millis(2));
                                fs::write(&counter, (value + 1).to_string()).unwrap();
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let total: u32 = fs::read_to_string(&counter).unwrap().parse().unwrap();
        assert_eq!(total, workers * increments);
    }
}
