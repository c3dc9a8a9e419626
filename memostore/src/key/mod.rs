// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cache key derivation
//!
//! - [`codec`]: renders argument values against default specs
//! - [`identifier`]: turns the rendering into a bounded, file-safe identifier

pub mod codec;
pub mod identifier;

pub use codec::{encode, format_significant, render, Encoded};
pub use identifier::{build_uid, hash_uid, KeySource, Uid};

/// Rendering knobs shared by every key derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOptions {
    /// Significant digits for numbers
    pub precision: usize,
    /// Token standing in for collapsed default values
    pub placeholder: String,
}

impl Default for KeyOptions {
    fn default() -> Self {
        Self {
            precision: 6,
            placeholder: "default".to_string(),
        }
    }
}
