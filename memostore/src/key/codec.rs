// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Structural rendering of argument values into cache-key fragments
//!
//! Rendering rules:
//! - Number: `precision` significant digits, C `%g` style (`3.142`, `1e+10`)
//! - Bool: `T` / `F`
//! - Text: spaces become underscores, nothing else is escaped
//! - List: `{a-b-c}`
//! - Map: `(k1=v1-k2=v2)`
//!
//! When a default spec is supplied, the value is walked alongside it:
//! - a spec of [`Value::Absent`] ignores the value entirely
//! - a value equal to its spec is a default, shown as the placeholder when it
//!   is a list, a map, or text longer than the placeholder, literally otherwise
//! - default list elements keep their (collapsed) slot, default map fields are
//!   dropped from the rendering altogether

use crate::error::{MemoError, MemoResult};
use crate::value::{Fields, Value};

use super::KeyOptions;

/// Result of encoding one (sub)value against its default spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub text: String,
    /// The value matched its spec (after ignoring ignored parts)
    pub is_default: bool,
    /// Every part of the value was ignored; it contributes nothing
    pub is_ignored: bool,
}

impl Encoded {
    fn plain(text: String) -> Self {
        Self {
            text,
            is_default: false,
            is_ignored: false,
        }
    }

    fn defaulted(text: String) -> Self {
        Self {
            text,
            is_default: true,
            is_ignored: false,
        }
    }

    fn ignored() -> Self {
        Self {
            text: String::new(),
            is_default: false,
            is_ignored: true,
        }
    }
}

/// Encode `value` against an optional default spec
///
/// Fails with [`MemoError::Identity`] if either side still holds an
/// unconverted [`Value::Opaque`] object.
pub fn encode(value: &Value, spec: Option<&Value>, options: &KeyOptions) -> MemoResult<Encoded> {
    ensure_structural(value)?;
    if let Some(spec) = spec {
        ensure_structural(spec)?;
    }
    encode_value(value, spec, options)
}

/// Render a value with no default handling
pub fn render(value: &Value, options: &KeyOptions) -> MemoResult<String> {
    ensure_structural(value)?;
    render_value(value, options)
}

fn ensure_structural(value: &Value) -> MemoResult<()> {
    match value {
        Value::Opaque { type_name } => Err(MemoError::Identity(format!(
            "{} must be converted to fields before it can be part of a cache key",
            type_name
        ))),
        Value::List(items) => items.iter().try_for_each(ensure_structural),
        Value::Map(fields) => fields.iter().try_for_each(|(_, v)| ensure_structural(v)),
        _ => Ok(()),
    }
}

fn encode_value(value: &Value, spec: Option<&Value>, options: &KeyOptions) -> MemoResult<Encoded> {
    let spec = match spec {
        None => return Ok(Encoded::plain(render_value(value, options)?)),
        Some(Value::Absent) => return Ok(Encoded::ignored()),
        Some(spec) => spec,
    };

    if value == spec {
        return Ok(Encoded::defaulted(collapsed_default(value, options)?));
    }

    match (value, spec) {
        (Value::List(items), Value::List(specs)) => encode_list(items, specs, options),
        (Value::Map(fields), Value::Map(spec_fields)) => encode_map(fields, spec_fields, options),
        _ => Ok(Encoded::plain(render_value(value, options)?)),
    }
}

fn encode_list(items: &[Value], specs: &[Value], options: &KeyOptions) -> MemoResult<Encoded> {
    if items.is_empty() {
        // Nothing but ignored slots in the spec: an empty list is ignored too
        if !specs.is_empty() && specs.iter().all(Value::is_absent) {
            return Ok(Encoded::ignored());
        }
        return Ok(Encoded::plain("{}".to_string()));
    }

    let mut parts = Vec::with_capacity(items.len());
    let mut all_ignored = true;
    let mut all_default = true;

    for (i, item) in items.iter().enumerate() {
        let part = encode_value(item, specs.get(i), options)?;
        if part.is_ignored {
            continue;
        }
        all_ignored = false;
        all_default &= part.is_default;
        parts.push(part.text);
    }

    // A shorter list than its spec is only a default if the missing tail was ignorable.
    if specs.len() > items.len() && specs[items.len()..].iter().any(|s| !s.is_absent()) {
        all_default = false;
    }

    if all_ignored {
        return Ok(Encoded::ignored());
    }
    if all_default {
        return Ok(Encoded::defaulted(options.placeholder.clone()));
    }
    Ok(Encoded::plain(format!("{{{}}}", parts.join("-"))))
}

fn encode_map(fields: &Fields, spec_fields: &Fields, options: &KeyOptions) -> MemoResult<Encoded> {
    if fields.is_empty() {
        if !spec_fields.is_empty() && spec_fields.iter().all(|(_, spec)| spec.is_absent()) {
            return Ok(Encoded::ignored());
        }
        return Ok(Encoded::plain("()".to_string()));
    }

    let mut parts = Vec::with_capacity(fields.len());
    let mut all_ignored = true;
    let mut all_default = true;

    for (name, field) in fields.iter() {
        let part = encode_value(field, spec_fields.get(name), options)?;
        if part.is_ignored {
            continue;
        }
        all_ignored = false;
        if part.is_default {
            continue;
        }
        all_default = false;
        parts.push(format!("{}={}", name, part.text));
    }

    if spec_fields
        .iter()
        .any(|(name, spec)| !fields.contains(name) && !spec.is_absent())
    {
        all_default = false;
    }

    if all_ignored {
        return Ok(Encoded::ignored());
    }
    if all_default {
        return Ok(Encoded::defaulted(options.placeholder.clone()));
    }
    Ok(Encoded::plain(format!("({})", parts.join("-"))))
}

fn collapsed_default(value: &Value, options: &KeyOptions) -> MemoResult<String> {
    match value {
        Value::List(_) | Value::Map(_) => Ok(options.placeholder.clone()),
        Value::Text(text) if text.chars().count() > options.placeholder.chars().count() => {
            Ok(options.placeholder.clone())
        }
        _ => render_value(value, options),
    }
}

fn render_value(value: &Value, options: &KeyOptions) -> MemoResult<String> {
    Ok(match value {
        Value::Number(n) => format_significant(*n, options.precision),
        Value::Bool(b) => (if *b { "T" } else { "F" }).to_string(),
        Value::Text(text) => text.replace(' ', "_"),
        Value::List(items) => {
            let parts = items
                .iter()
                .map(|item| render_value(item, options))
                .collect::<MemoResult<Vec<_>>>()?;
            format!("{{{}}}", parts.join("-"))
        }
        Value::Map(fields) => {
            let parts = fields
                .iter()
                .map(|(name, field)| Ok(format!("{}={}", name, render_value(field, options)?)))
                .collect::<MemoResult<Vec<_>>>()?;
            format!("({})", parts.join("-"))
        }
        Value::Absent => String::new(),
        Value::Opaque { type_name } => {
            return Err(MemoError::Identity(format!(
                "{} must be converted to fields before it can be part of a cache key",
                type_name
            )))
        }
    })
}

/// Format a number with `digits` significant digits, like C's `%.{digits}g`
pub fn format_significant(x: f64, digits: usize) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        return (if x > 0.0 { "Inf" } else { "-Inf" }).to_string();
    }
    if x == 0.0 {
        return "0".to_string();
    }

    let digits = digits.max(1);
    let scientific = format!("{:.*e}", digits - 1, x);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };

    if exponent < -4 || exponent >= digits as i32 {
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            if exponent < 0 { '-' } else { '+' },
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (digits as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, x)).to_string()
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(precision: usize, placeholder: &str) -> KeyOptions {
        KeyOptions {
            precision,
            placeholder: placeholder.to_string(),
        }
    }

    #[test]
    fn test_format_significant() {
        assert_eq!(format_significant(std::f64::consts::PI, 4), "3.142");
        assert_eq!(format_significant(12.0, 4), "12");
        assert_eq!(format_significant(100.0, 4), "100");
        assert_eq!(format_significant(-2.5, 4), "-2.5");
        assert_eq!(format_significant(0.0001234, 4), "0.0001234");
        assert_eq!(format_significant(0.00001234, 4), "1.234e-05");
        assert_eq!(format_significant(1e10, 4), "1e+10");
        assert_eq!(format_significant(123456.0, 4), "1.235e+05");
        assert_eq!(format_significant(0.0, 4), "0");
        assert_eq!(format_significant(f64::NAN, 4), "NaN");
        assert_eq!(format_significant(f64::NEG_INFINITY, 4), "-Inf");
    }

    #[test]
    fn test_render_plain() {
        let value = Value::List(vec![
            Value::from(12),
            Value::from(true),
            Value::from("foo bar"),
            Value::Map(
                Fields::new()
                    .with("a", 1)
                    .with("b", vec![Value::from("c"), Value::from("d")]),
            ),
        ]);
        assert_eq!(
            render(&value, &opts(4, "default")).unwrap(),
            "{12-T-foo_bar-(a=1-b={c-d})}"
        );
    }

    #[test]
    fn test_ignored_field_dropped_from_map() {
        let value = Value::Map(
            Fields::new()
                .with("a", 100)
                .with("b", vec![Value::from("x"), Value::from("y")]),
        );
        let spec = Value::Map(Fields::new().with("a", 1).with("b", Value::Absent));
        let encoded = encode(&value, Some(&spec), &opts(4, "default")).unwrap();
        assert_eq!(encoded.text, "(a=100)");
        assert!(!encoded.is_default);
        assert!(!encoded.is_ignored);
    }

    #[test]
    fn test_default_field_dropped_default_element_kept() {
        let options = opts(4, "default");

        let map = Value::Map(Fields::new().with("a", 1).with("b", 2));
        let map_spec = Value::Map(Fields::new().with("a", 1).with("b", 3));
        assert_eq!(encode(&map, Some(&map_spec), &options).unwrap().text, "(b=2)");

        let list = Value::from(vec![1, 2]);
        let list_spec = Value::from(vec![1, 3]);
        assert_eq!(encode(&list, Some(&list_spec), &options).unwrap().text, "{1-2}");
    }

    #[test]
    fn test_whole_value_default() {
        let options = opts(4, "default");
        let value = Value::Map(Fields::new().with("a", 1));
        let encoded = encode(&value, Some(&value.clone()), &options).unwrap();
        assert_eq!(encoded.text, "default");
        assert!(encoded.is_default);

        // Only the ignored part differs, so the list still counts as default
        let list = Value::from(vec![Value::from(1), Value::from("noise")]);
        let spec = Value::List(vec![Value::from(1), Value::Absent]);
        let encoded = encode(&list, Some(&spec), &options).unwrap();
        assert_eq!(encoded.text, "default");
        assert!(encoded.is_default);
    }

    #[test]
    fn test_absent_checked_before_equality() {
        let encoded = encode(&Value::Absent, Some(&Value::Absent), &opts(4, "d")).unwrap();
        assert!(encoded.is_ignored);
        assert_eq!(encoded.text, "");
    }

    #[test]
    fn test_empty_collection_spec_is_a_real_default() {
        let options = opts(4, "default");
        let empty = Value::List(vec![]);
        let encoded = encode(&empty, Some(&Value::List(vec![])), &options).unwrap();
        assert!(encoded.is_default);
        assert!(!encoded.is_ignored);

        let encoded = encode(&Value::from(vec![5]), Some(&Value::List(vec![])), &options).unwrap();
        assert_eq!(encoded.text, "{5}");
        assert!(!encoded.is_default);
    }

    #[test]
    fn test_all_ignored_list() {
        let value = Value::from(vec![1, 2]);
        let spec = Value::List(vec![Value::Absent, Value::Absent]);
        let encoded = encode(&value, Some(&spec), &opts(4, "default")).unwrap();
        assert!(encoded.is_ignored);
    }

    #[test]
    fn test_empty_collection_against_ignored_spec() {
        let options = opts(4, "default");
        let nested_spec = Value::List(vec![Value::List(vec![Value::Absent])]);

        let one = Value::List(vec![Value::from(vec![Value::from("x")])]);
        let empty = Value::List(vec![Value::List(vec![])]);
        for value in [&one, &empty] {
            let encoded = encode(value, Some(&nested_spec), &options).unwrap();
            assert!(encoded.is_ignored);
            assert_eq!(encoded.text, "");
        }

        let map_spec = Value::Map(Fields::new().with("a", Value::Absent));
        let encoded = encode(&Value::Map(Fields::new()), Some(&map_spec), &options).unwrap();
        assert!(encoded.is_ignored);

        // An ignored slot next to a real default still leaves a rendered empty list
        let mixed = Value::List(vec![Value::Absent, Value::from(1)]);
        let encoded = encode(&Value::List(vec![]), Some(&mixed), &options).unwrap();
        assert_eq!(encoded.text, "{}");
        assert!(!encoded.is_ignored);
    }

    #[test]
    fn test_shorter_than_spec_is_not_default() {
        let options = opts(4, "default");
        let value = Value::from(vec![1]);
        let spec = Value::from(vec![1, 2]);
        let encoded = encode(&value, Some(&spec), &options).unwrap();
        assert!(!encoded.is_default);
        assert_eq!(encoded.text, "{1}");

        let map = Value::Map(Fields::new().with("a", 1));
        let map_spec = Value::Map(Fields::new().with("a", 1).with("b", 2));
        let encoded = encode(&map, Some(&map_spec), &options).unwrap();
        assert!(!encoded.is_default);
        assert_eq!(encoded.text, "()");
    }

    #[test]
    fn test_placeholder_threshold() {
        let short = Value::from("ab");
        let long = Value::from("a longer value");
        let number = Value::from(42);

        let wide = opts(4, "default");
        assert_eq!(encode(&short, Some(&short), &wide).unwrap().text, "ab");
        assert_eq!(encode(&long, Some(&long), &wide).unwrap().text, "default");
        assert_eq!(encode(&number, Some(&number), &wide).unwrap().text, "42");

        let narrow = opts(4, "X");
        assert_eq!(encode(&short, Some(&short), &narrow).unwrap().text, "X");
        assert_eq!(encode(&long, Some(&long), &narrow).unwrap().text, "X");
        assert_eq!(encode(&number, Some(&number), &narrow).unwrap().text, "42");
    }

    #[test]
    fn test_opaque_rejected() {
        let value = Value::List(vec![Value::from(1), Value::opaque::<std::fs::File>()]);
        let result = encode(&value, None, &opts(4, "default"));
        assert!(matches!(result, Err(MemoError::Identity(_))));

        // Even when it would have been collapsed into the placeholder
        let result = encode(&value, Some(&value.clone()), &opts(4, "default"));
        assert!(matches!(result, Err(MemoError::Identity(_))));
    }

    #[test]
    fn test_spec_shape_mismatch_renders_plainly() {
        let value = Value::from(vec![1, 2]);
        let encoded = encode(&value, Some(&Value::from(7)), &opts(4, "default")).unwrap();
        assert_eq!(encoded.text, "{1-2}");
        assert!(!encoded.is_default);
    }
}
