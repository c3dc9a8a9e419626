// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Memoizable computations

use std::fmt;
use std::path::{Path, PathBuf};

use super::context::CallStack;
use crate::error::BoxError;
use crate::value::Value;

/// A deterministic computation the memoizer can run or skip
pub trait Computation {
    /// Display name, used as the prefix of every cache identifier
    fn name(&self) -> &str;

    /// Source artifact defining the computation. `None` disables staleness
    /// tracking for it.
    fn source(&self) -> Option<&Path> {
        None
    }

    /// Run the computation and return exactly `nargout` values
    fn call(&self, stack: &CallStack, args: &[Value], nargout: usize)
        -> Result<Vec<Value>, BoxError>;
}

/// A closure-backed [`Computation`]
pub struct Tracked<F> {
    name: String,
    source: Option<PathBuf>,
    f: F,
}

impl<F> Tracked<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&CallStack, &[Value], usize) -> Result<Vec<Value>, BoxError>,
    {
        Self {
            name: name.into(),
            source: None,
            f,
        }
    }

    /// Attach the file whose modification invalidates cached results
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl<F> Computation for Tracked<F>
where
    F: Fn(&CallStack, &[Value], usize) -> Result<Vec<Value>, BoxError>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn call(&self, stack: &CallStack, args: &[Value], nargout: usize) -> Result<Vec<Value>, BoxError> {
        (self.f)(stack, args, nargout)
    }
}

impl<F> fmt::Debug for Tracked<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracked_closure() {
        let double = Tracked::new("double", |_stack: &CallStack, args: &[Value], _nargout| {
            let x = args[0].as_number().ok_or("expected a number")?;
            Ok(vec![Value::from(2.0 * x)])
        })
        .with_source("src/double.rs");

        assert_eq!(double.name(), "double");
        assert_eq!(double.source(), Some(Path::new("src/double.rs")));
        assert_eq!(
            double.call(&CallStack::root(), &[Value::from(4)], 1).unwrap(),
            vec![Value::from(8)]
        );
        assert!(double
            .call(&CallStack::root(), &[Value::from("x")], 1)
            .is_err());
    }

    #[test]
    fn test_untracked_by_default() {
        let constant = Tracked::new("constant", |_: &CallStack, _: &[Value], _| Ok(vec![]));
        assert!(constant.source().is_none());
    }
}
