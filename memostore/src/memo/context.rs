// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Invocation context passed down through nested memoized calls

use std::fmt;

/// Dependency keys of the memoized calls currently executing, outermost first
///
/// The memoizer hands a callable the stack with its own key pushed; a callable
/// that memoizes nested work passes that stack on so the nested call's source
/// artifacts are recorded against every enclosing function as well.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStack {
    frames: Vec<String>,
}

impl CallStack {
    /// Context of a call made outside any memoized computation
    pub fn root() -> Self {
        Self::default()
    }

    /// A new stack with `function_key` as the innermost frame
    pub fn push(&self, function_key: impl Into<String>) -> Self {
        let mut frames = self.frames.clone();
        frames.push(function_key.into());
        Self { frames }
    }

    pub fn frames(&self) -> impl Iterator<Item = &str> {
        self.frames.iter().map(String::as_str)
    }

    pub fn innermost(&self) -> Option<&str> {
        self.frames.last().map(String::as_str)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_root(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn contains(&self, function_key: &str) -> bool {
        self.frames.iter().any(|f| f == function_key)
    }
}

impl fmt::Display for CallStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.frames.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.frames.join(" > "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_leaves_parent_untouched() {
        let root = CallStack::root();
        let top = root.push("top");
        let mid = top.push("mid");

        assert!(root.is_root());
        assert_eq!(top.depth(), 1);
        assert_eq!(mid.frames().collect::<Vec<_>>(), vec!["top", "mid"]);
        assert_eq!(mid.innermost(), Some("mid"));
        assert!(mid.contains("top"));
        assert_eq!(mid.to_string(), "top > mid");
        assert_eq!(root.to_string(), "<root>");
    }
}
