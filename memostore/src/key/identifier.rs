// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cache identifier construction
//!
//! Combines a function name with an explicit id, a rendered query, or the
//! rendered argument list into `"<function>-<uid>"`. Identifiers that would
//! not fit a 255-byte file name (or that contain characters a file name
//! cannot hold) are replaced by a 32-digit XXH3-128 hash of the raw uid.
//! The raw uid is then kept in a side record so hash collisions are caught.

use crate::error::{MemoError, MemoResult};
use crate::value::Value;

use super::codec::encode;
use super::KeyOptions;

/// File-name length limit the final identifier must respect
pub const MAX_NAME_LEN: usize = 255;

/// Bytes reserved after the identifier for record extensions
pub const RESERVED_SUFFIX_LEN: usize = 6;

/// Extension of result records, stripped from explicit ids
pub const RESULT_EXTENSION: &str = ".cache";

const HASH_LEN: usize = 32;

/// Where the uid of a call comes from
#[derive(Debug, Clone, Copy)]
pub enum KeySource<'a> {
    /// Caller-supplied id, used verbatim
    Explicit(&'a str),
    /// Named query rendered against its default query
    Query {
        query: &'a Value,
        defaults: Option<&'a Value>,
    },
    /// Positional arguments rendered against positional defaults
    Args {
        args: &'a [Value],
        defaults: Option<&'a [Value]>,
    },
}

/// A derived cache identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uid {
    /// Uid before any hashing
    pub raw: String,
    /// `"<function>-<uid or hash>"`, the name every record of the entry is based on
    pub identifier: String,
    /// Whether `raw` was replaced by its hash
    pub hashed: bool,
}

/// Derive the cache identifier for one call of `function`
pub fn build_uid(function: &str, source: KeySource<'_>, options: &KeyOptions) -> MemoResult<Uid> {
    let function = file_safe_function_name(function);
    let max_len = MAX_NAME_LEN
        .checked_sub(function.len() + 1 + RESERVED_SUFFIX_LEN)
        .filter(|max| *max >= HASH_LEN)
        .ok_or_else(|| {
            MemoError::Usage(format!(
                "function name '{}' is too long to build cache identifiers",
                function
            ))
        })?;

    let raw = match source {
        KeySource::Explicit(id) => id.strip_suffix(RESULT_EXTENSION).unwrap_or(id).to_string(),
        KeySource::Query { query, defaults } => {
            if !matches!(query, Value::Map(_)) {
                return Err(MemoError::Usage(format!(
                    "query must be a map of named fields, got {}",
                    query.type_name()
                )));
            }
            let encoded = encode(query, defaults, options)?;
            if encoded.is_ignored {
                String::new()
            } else {
                encoded.text
            }
        }
        KeySource::Args { args, defaults } => {
            let args = Value::List(args.to_vec());
            let defaults = defaults.map(|d| Value::List(d.to_vec()));
            let encoded = encode(&args, defaults.as_ref(), options)?;
            if encoded.is_ignored {
                String::new()
            } else if encoded.is_default {
                encoded.text
            } else {
                strip_list_brackets(&encoded.text).to_string()
            }
        }
    };

    let hashed = raw.len() > max_len || !is_file_safe(&raw);
    let tail = if hashed { hash_uid(&raw) } else { raw.clone() };

    Ok(Uid {
        identifier: format!("{}-{}", function, tail),
        raw,
        hashed,
    })
}

/// Fixed-width hex hash used for over-long or unsafe uids
pub fn hash_uid(raw: &str) -> String {
    format!("{:032x}", xxhash_rust::xxh3::xxh3_128(raw.as_bytes()))
}

/// Function display names may be paths like `stats::mean`; keep them file-safe
pub fn file_safe_function_name(function: &str) -> String {
    function
        .replace("::", ".")
        .chars()
        .map(|c| if is_file_safe_char(c) { c } else { '_' })
        .collect()
}

fn strip_list_brackets(text: &str) -> &str {
    text.strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .unwrap_or(text)
}

fn is_file_safe(raw: &str) -> bool {
    raw.chars().all(is_file_safe_char)
}

fn is_file_safe_char(c: char) -> bool {
    !c.is_control() && !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
}
