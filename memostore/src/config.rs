// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Memoizer configuration and policies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{MemoError, MemoResult};
use crate::lock::{DEFAULT_LOCK_WAIT, DEFAULT_RACE_WINDOW, DEFAULT_STALE_LOCK_AGE};
use crate::store::{StoreError, StoreKind};

/// Sub-directory of the metadata store holding lock markers
pub const LOCK_DIR: &str = "locks";

/// Process-wide memoizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoConfig {
    /// Where result, true-identifier and error records live
    pub result_store_path: PathBuf,

    /// Where the dependency graph and lock markers live
    pub metadata_store_path: PathBuf,

    /// Backend for both stores
    pub store: StoreKind,

    /// How long a lock acquisition keeps retrying
    pub lock_wait: Duration,

    /// Lock markers older than this are taken over as orphans
    pub stale_lock_age: Duration,

    /// Pause between claiming a lock and checking for competitors
    pub race_window: Duration,

    /// Significant digits used when numbers are rendered into identifiers
    pub numeric_precision: usize,

    /// Text shown in place of collapsed default values
    pub placeholder: String,

    pub error_caching: ErrorCaching,

    pub on_dependency_change: DependencyPolicy,

    /// 0 = warnings only, 1 = one line per call, 2 = debug detail
    pub diagnostics_level: u8,
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            result_store_path: PathBuf::from("cache/results"),
            metadata_store_path: PathBuf::from("cache/metadata"),
            store: StoreKind::Filesystem,
            lock_wait: DEFAULT_LOCK_WAIT,
            stale_lock_age: DEFAULT_STALE_LOCK_AGE,
            race_window: DEFAULT_RACE_WINDOW,
            numeric_precision: 6,
            placeholder: "default".to_string(),
            error_caching: ErrorCaching::None,
            on_dependency_change: DependencyPolicy::AutoRemove,
            diagnostics_level: 0,
        }
    }
}

impl MemoConfig {
    /// Default configuration with both stores under `root`
    pub fn at<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            result_store_path: root.join("results"),
            metadata_store_path: root.join("metadata"),
            ..Self::default()
        }
    }

    /// Configuration for a cache directory shared over a network filesystem
    ///
    /// Marker files take longer to become visible to other hosts, so the race
    /// window and the lock wait are stretched.
    pub fn shared_filesystem<P: AsRef<Path>>(root: P) -> Self {
        Self {
            lock_wait: Duration::from_secs(60),
            race_window: Duration::from_millis(200),
            stale_lock_age: Duration::from_secs(120),
            ..Self::at(root)
        }
    }

    /// In-memory stores; lock markers still go under `root`
    pub fn in_memory<P: AsRef<Path>>(root: P) -> Self {
        Self {
            store: StoreKind::Memory,
            ..Self::at(root)
        }
    }

    /// Directory holding semaphore markers
    pub fn lock_dir(&self) -> PathBuf {
        self.metadata_store_path.join(LOCK_DIR)
    }

    /// Validate the configuration
    pub fn validate(&self) -> MemoResult<()> {
        if self.lock_wait.is_zero() {
            return Err(MemoError::Usage("lock_wait must be positive".to_string()));
        }
        if self.race_window >= self.stale_lock_age {
            return Err(MemoError::Usage(format!(
                "race_window ({:?}) must be shorter than stale_lock_age ({:?})",
                self.race_window, self.stale_lock_age
            )));
        }
        validate_precision(self.numeric_precision)?;
        validate_placeholder(&self.placeholder)?;
        validate_diagnostics_level(self.diagnostics_level)?;
        Ok(())
    }

    /// Read a JSON configuration file; missing keys take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> MemoResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(StoreError::from)?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            MemoError::Usage(format!("invalid config file {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write this configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> MemoResult<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(path, text).map_err(StoreError::from)?;
        Ok(())
    }
}

pub(crate) fn validate_precision(precision: usize) -> MemoResult<()> {
    if precision == 0 || precision > 17 {
        return Err(MemoError::Usage(format!(
            "numeric precision must be between 1 and 17 significant digits, got {}",
            precision
        )));
    }
    Ok(())
}

pub(crate) fn validate_placeholder(placeholder: &str) -> MemoResult<()> {
    if placeholder.is_empty() {
        return Err(MemoError::Usage("placeholder text must not be empty".to_string()));
    }
    if placeholder.contains(['-', '/', '\\', '{', '}', '(', ')', '=']) {
        return Err(MemoError::Usage(format!(
            "placeholder '{}' contains identifier syntax characters",
            placeholder
        )));
    }
    Ok(())
}

pub(crate) fn validate_diagnostics_level(level: u8) -> MemoResult<()> {
    if level > 2 {
        return Err(MemoError::Usage(format!(
            "diagnostics level must be 0, 1 or 2, got {}",
            level
        )));
    }
    Ok(())
}

/// When to ignore an existing result and run the computation again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForceRecompute {
    #[default]
    Never,
    Always,
    /// Recompute results written before this instant
    OlderThan(DateTime<Utc>),
}

impl ForceRecompute {
    /// Whether an entry written at `written` must be recomputed
    pub fn applies_to(&self, written: DateTime<Utc>) -> bool {
        match self {
            ForceRecompute::Never => false,
            ForceRecompute::Always => true,
            ForceRecompute::OlderThan(threshold) => written < *threshold,
        }
    }
}

impl FromStr for ForceRecompute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "never" | "false" | "no" => Ok(ForceRecompute::Never),
            "always" | "true" | "yes" => Ok(ForceRecompute::Always),
            _ => DateTime::parse_from_rfc3339(s)
                .map(|t| ForceRecompute::OlderThan(t.with_timezone(&Utc)))
                .map_err(|_| {
                    format!(
                        "Unknown force-recompute value: {}. Valid options: never, always, an RFC 3339 timestamp",
                        s
                    )
                }),
        }
    }
}

impl fmt::Display for ForceRecompute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForceRecompute::Never => write!(f, "never"),
            ForceRecompute::Always => write!(f, "always"),
            ForceRecompute::OlderThan(t) => write!(f, "older than {}", t.to_rfc3339()),
        }
    }
}

/// Whether failures of a computation are persisted and replayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCaching {
    #[default]
    None,
    Cache,
}

impl FromStr for ErrorCaching {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "off" => Ok(ErrorCaching::None),
            "cache" | "on" => Ok(ErrorCaching::Cache),
            _ => Err(format!(
                "Unknown error caching mode: {}. Valid options: none, cache",
                s
            )),
        }
    }
}

impl fmt::Display for ErrorCaching {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCaching::None => write!(f, "none"),
            ErrorCaching::Cache => write!(f, "cache"),
        }
    }
}

/// What happens when a dependency artifact is newer than a cached entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyPolicy {
    /// Skip the staleness check entirely
    Ignore,
    /// Log a warning and keep using the entry
    Warn,
    /// Delete the entry so it is recomputed
    #[default]
    AutoRemove,
}

impl FromStr for DependencyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ignore" => Ok(DependencyPolicy::Ignore),
            "warn" => Ok(DependencyPolicy::Warn),
            "autoremove" | "auto-remove" | "remove" => Ok(DependencyPolicy::AutoRemove),
            _ => Err(format!(
                "Unknown dependency policy: {}. Valid options: ignore, warn, autoremove",
                s
            )),
        }
    }
}

impl fmt::Display for DependencyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyPolicy::Ignore => write!(f, "ignore"),
            DependencyPolicy::Warn => write!(f, "warn"),
            DependencyPolicy::AutoRemove => write!(f, "autoremove"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = MemoConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lock_wait, Duration::from_secs(10));
        assert_eq!(config.stale_lock_age, Duration::from_secs(30));
        assert_eq!(config.on_dependency_change, DependencyPolicy::AutoRemove);
        assert_eq!(config.error_caching, ErrorCaching::None);
    }

    #[test]
    fn test_presets() {
        let config = MemoConfig::at("/tmp/memo");
        assert_eq!(config.result_store_path, PathBuf::from("/tmp/memo/results"));
        assert_eq!(config.lock_dir(), PathBuf::from("/tmp/memo/metadata/locks"));

        let shared = MemoConfig::shared_filesystem("/tmp/memo");
        assert!(shared.validate().is_ok());
        assert!(shared.race_window > config.race_window);

        assert_eq!(MemoConfig::in_memory("/tmp/memo").store, StoreKind::Memory);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = MemoConfig::default();
        config.numeric_precision = 0;
        assert!(config.validate().unwrap_err().is_usage());

        let mut config = MemoConfig::default();
        config.placeholder = "a-b".to_string();
        assert!(config.validate().is_err());

        let mut config = MemoConfig::default();
        config.diagnostics_level = 3;
        assert!(config.validate().is_err());

        let mut config = MemoConfig::default();
        config.race_window = Duration::from_secs(60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memo.json");

        let mut config = MemoConfig::at(temp_dir.path());
        config.error_caching = ErrorCaching::Cache;
        config.on_dependency_change = DependencyPolicy::Warn;
        config.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"warn\""));
        assert_eq!(MemoConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memo.json");
        std::fs::write(&path, r#"{ "numeric_precision": 4, "error_caching": "cache" }"#).unwrap();

        let config = MemoConfig::load(&path).unwrap();
        assert_eq!(config.numeric_precision, 4);
        assert_eq!(config.error_caching, ErrorCaching::Cache);
        assert_eq!(config.placeholder, "default");
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memo.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(MemoConfig::load(&path).unwrap_err().is_usage());
    }

    #[test]
    fn test_parse_options() {
        assert_eq!("warn".parse::<DependencyPolicy>().unwrap(), DependencyPolicy::Warn);
        assert_eq!(
            "AutoRemove".parse::<DependencyPolicy>().unwrap(),
            DependencyPolicy::AutoRemove
        );
        assert_eq!("cache".parse::<ErrorCaching>().unwrap(), ErrorCaching::Cache);
        assert!("sometimes".parse::<ErrorCaching>().is_err());

        assert_eq!("always".parse::<ForceRecompute>().unwrap(), ForceRecompute::Always);
        let threshold = "2024-03-01T12:00:00Z".parse::<ForceRecompute>().unwrap();
        match threshold {
            ForceRecompute::OlderThan(t) => assert_eq!(t.to_rfc3339(), "2024-03-01T12:00:00+00:00"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_force_recompute_threshold() {
        let threshold: DateTime<Utc> = "2024-03-01T12:00:00Z".parse().unwrap();
        let force = ForceRecompute::OlderThan(threshold);
        assert!(force.applies_to(threshold - chrono::Duration::hours(1)));
        assert!(!force.applies_to(threshold + chrono::Duration::hours(1)));
        assert!(!ForceRecompute::Never.applies_to(threshold));
    }
}
