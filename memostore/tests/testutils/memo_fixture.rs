//! Memoizer fixture for integration tests
//!
//! Every fixture owns its own temporary directory, so tests can run in
//! parallel without sharing results, dependency graphs or lock markers.

#![allow(dead_code)]

use memostore::{BoxError, CallStack, MemoConfig, Memoizer, Tracked, Value};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Age given to freshly created source artifacts
pub const SOURCE_AGE: Duration = Duration::from_secs(3 * 3600);

/// Memoizer over an isolated cache directory
pub struct MemoFixture {
    memo: Memoizer,
    config: MemoConfig,
    sources: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl MemoFixture {
    /// Fixture with the default configuration
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_config(|_| {})
    }

    /// Fixture whose configuration is adjusted before the memoizer opens
    pub fn with_config(
        adjust: impl FnOnce(&mut MemoConfig),
    ) -> Result<Self, Box<dyn std::error::Error>> {
        // RUST_LOG=memostore=debug shows lock and key diagnostics
        let _ = env_logger::builder().is_test(true).try_init();

        let temp_dir = tempfile::tempdir()?;
        let root = temp_dir.path().join(format!("cache_{}", fastrand::u64(..)));
        let sources = temp_dir.path().join("src");
        fs::create_dir_all(&sources)?;

        let mut config = MemoConfig::at(&root);
        config.race_window = Duration::from_millis(2);
        adjust(&mut config);

        let memo = Memoizer::open(config.clone())?;
        Ok(Self {
            memo,
            config,
            sources,
            _temp_dir: temp_dir,
        })
    }

    pub fn memo(&self) -> &Memoizer {
        &self.memo
    }

    pub fn config(&self) -> &MemoConfig {
        &self.config
    }

    /// A second memoizer over the same stores, as another worker would open
    pub fn reopen(&self) -> Memoizer {
        Memoizer::open(self.config.clone()).expect("Failed to reopen memoizer")
    }

    /// Create a source artifact last modified [`SOURCE_AGE`] ago
    pub fn source_file(&self, name: &str) -> PathBuf {
        let path = self.sources.join(name);
        fs::write(&path, format!("// {}\n", name)).expect("Failed to write source");
        set_mtime(&path, SystemTime::now() - SOURCE_AGE);
        path
    }

    /// Mark a source artifact as edited `ago` before now
    pub fn touch(&self, path: &Path, ago: Duration) {
        set_mtime(path, SystemTime::now() - ago);
    }

    /// Pretend every record in the result store was written `ago` before now
    pub fn age_results(&self, ago: Duration) {
        let when = SystemTime::now() - ago;
        for entry in fs::read_dir(&self.config.result_store_path).expect("Failed to list results")
        {
            let path = entry.expect("Failed to read entry").path();
            if path.is_file() {
                set_mtime(&path, when);
            }
        }
    }

    /// On-disk path of a record in the result store
    pub fn result_record(&self, name: &str) -> PathBuf {
        self.config.result_store_path.join(name)
    }
}

fn set_mtime(path: &Path, when: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(when))
        .expect("Failed to set modification time");
}

/// Wrap `f` in a tracked computation that counts its real invocations
pub fn counting<F>(
    name: &str,
    source: Option<&Path>,
    f: F,
) -> (
    Tracked<impl Fn(&CallStack, &[Value], usize) -> Result<Vec<Value>, BoxError>>,
    Arc<AtomicUsize>,
)
where
    F: Fn(&CallStack, &[Value], usize) -> Result<Vec<Value>, BoxError>,
{
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut tracked = Tracked::new(name, move |stack: &CallStack, args: &[Value], nargout| {
        counter.fetch_add(1, Ordering::SeqCst);
        f(stack, args, nargout)
    });
    if let Some(source) = source {
        tracked = tracked.with_source(source);
    }
    (tracked, calls)
}

pub fn count(calls: &AtomicUsize) -> usize {
    calls.load(Ordering::SeqCst)
}

/// `x -> x * x` over the first argument
pub fn square(_stack: &CallStack, args: &[Value], _nargout: usize) -> Result<Vec<Value>, BoxError> {
    let x = args
        .first()
        .and_then(Value::as_number)
        .ok_or("square expects a number")?;
    Ok(vec![Value::from(x * x)])
}
