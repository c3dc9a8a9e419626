// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-call options
//!
//! Options left unset fall back to the memoizer's [`MemoConfig`].

use crate::config::{
    validate_diagnostics_level, validate_placeholder, validate_precision, DependencyPolicy,
    ErrorCaching, ForceRecompute, MemoConfig,
};
use crate::error::{MemoError, MemoResult};
use crate::key::{KeyOptions, KeySource};
use crate::value::Value;

/// How the uid of a call is derived
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    /// Caller-supplied uid
    Explicit(String),
    /// A named query, optionally diffed against a default query
    Query {
        query: Value,
        default_query: Option<Value>,
    },
    /// The positional arguments, optionally diffed against positional defaults
    Args { defaults: Option<Vec<Value>> },
}

impl Identity {
    pub(crate) fn key_source<'a>(&'a self, args: &'a [Value]) -> KeySource<'a> {
        match self {
            Identity::Explicit(id) => KeySource::Explicit(id),
            Identity::Query {
                query,
                default_query,
            } => KeySource::Query {
                query,
                defaults: default_query.as_ref(),
            },
            Identity::Args { defaults } => KeySource::Args {
                args,
                defaults: defaults.as_deref(),
            },
        }
    }
}

/// Options for one `load_or_run` call
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    explicit_id: Option<String>,
    query: Option<Value>,
    default_query: Option<Value>,
    default_args: Option<Vec<Value>>,
    placeholder: Option<String>,
    precision: Option<usize>,
    force: ForceRecompute,
    error_caching: Option<ErrorCaching>,
    on_dependency_change: Option<DependencyPolicy>,
    diagnostics_level: Option<u8>,
    dry_run: bool,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `id` verbatim as the uid
    pub fn explicit_id(mut self, id: impl Into<String>) -> Self {
        self.explicit_id = Some(id.into());
        self
    }

    /// Derive the uid from a named query instead of the arguments
    pub fn query(mut self, query: impl Into<Value>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn default_query(mut self, default_query: impl Into<Value>) -> Self {
        self.default_query = Some(default_query.into());
        self
    }

    /// Positional defaults; [`Value::Absent`] marks an ignored argument
    pub fn default_args(mut self, defaults: Vec<Value>) -> Self {
        self.default_args = Some(defaults);
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn precision(mut self, digits: usize) -> Self {
        self.precision = Some(digits);
        self
    }

    pub fn force(mut self, force: ForceRecompute) -> Self {
        self.force = force;
        self
    }

    pub fn error_caching(mut self, mode: ErrorCaching) -> Self {
        self.error_caching = Some(mode);
        self
    }

    pub fn on_dependency_change(mut self, policy: DependencyPolicy) -> Self {
        self.on_dependency_change = Some(policy);
        self
    }

    pub fn diagnostics_level(mut self, level: u8) -> Self {
        self.diagnostics_level = Some(level);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Check option combinations and return the identity mode they select
    pub fn validate(&self) -> MemoResult<Identity> {
        if let Some(precision) = self.precision {
            validate_precision(precision)?;
        }
        if let Some(placeholder) = &self.placeholder {
            validate_placeholder(placeholder)?;
        }
        if let Some(level) = self.diagnostics_level {
            validate_diagnostics_level(level)?;
        }
        if self.default_query.is_some() && self.query.is_none() {
            return Err(MemoError::Usage(
                "default_query given without a query".to_string(),
            ));
        }

        match (&self.explicit_id, &self.query) {
            (Some(_), Some(_)) => Err(MemoError::Usage(
                "explicit_id and query are mutually exclusive".to_string(),
            )),
            (Some(_), None) if self.default_args.is_some() => Err(MemoError::Usage(
                "explicit_id and default_args are mutually exclusive".to_string(),
            )),
            (Some(id), None) => {
                if id.trim().is_empty() {
                    return Err(MemoError::Usage("explicit_id must not be empty".to_string()));
                }
                Ok(Identity::Explicit(id.clone()))
            }
            (None, Some(_)) if self.default_args.is_some() => Err(MemoError::Usage(
                "query and default_args are mutually exclusive".to_string(),
            )),
            (None, Some(query)) => Ok(Identity::Query {
                query: query.clone(),
                default_query: self.default_query.clone(),
            }),
            (None, None) => Ok(Identity::Args {
                defaults: self.default_args.clone(),
            }),
        }
    }

    /// Merge with the process-wide configuration
    pub(crate) fn resolve(&self, config: &MemoConfig) -> MemoResult<Settings> {
        let identity = self.validate()?;
        Ok(Settings {
            identity,
            key: KeyOptions {
                precision: self.precision.unwrap_or(config.numeric_precision),
                placeholder: self
                    .placeholder
                    .clone()
                    .unwrap_or_else(|| config.placeholder.clone()),
            },
            force: self.force,
            error_caching: self.error_caching.unwrap_or(config.error_caching),
            policy: self
                .on_dependency_change
                .unwrap_or(config.on_dependency_change),
            diagnostics: self.diagnostics_level.unwrap_or(config.diagnostics_level),
            dry_run: self.dry_run,
        })
    }
}

/// Effective settings of one call
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub identity: Identity,
    pub key: KeyOptions,
    pub force: ForceRecompute,
    pub error_caching: ErrorCaching,
    pub policy: DependencyPolicy,
    pub diagnostics: u8,
    pub dry_run: bool,
}
