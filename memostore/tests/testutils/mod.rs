//! Test utilities for memostore integration tests
//!
//! - MemoFixture: a memoizer over a private temporary cache directory, plus
//!   helpers to create source artifacts and shift modification times
//! - counting: wraps a closure so tests can see how often it really ran

pub mod memo_fixture;
