//! RFC 8785 JSON Canonicalization Scheme (JCS).
//!
//! # Canonicalization Rules
//!
//! 1. Object members are sorted by the UTF-16 code units of their names
//! 2. No whitespace between tokens
//! 3. Numbers use the ECMAScript `Number.prototype.toString` form
//! 4. Strings use minimal escaping (only required escapes)
//!
//! Parsing through [`parse_strict`] additionally rejects duplicate object
//! member names, which RFC 8785 leaves to the parser. An event with two
//! `EventType` members would otherwise hash one value and display the
//! other.
//!
//! # Example
//!
//! ```
//! use cpv_core::canonical::canonicalize_str;
//!
//! let canonical = canonicalize_str(r#"{ "b": 1, "a": [true, null, 1.5] }"#).unwrap();
//! assert_eq!(canonical, r#"{"a":[true,null,1.5],"b":1}"#);
//! ```

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use super::Canonicalizer;
use crate::error::VerifyError;

/// Canonicalizer identifier.
pub const CANONICALIZER_ID: &str = "jcs-rfc8785";

/// Maximum nesting depth accepted before canonicalization.
pub const MAX_DEPTH: usize = 128;

/// Errors that can occur during JCS canonicalization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum JcsError {
    /// A duplicate member name was found in an object.
    #[error("duplicate key: '{key}' appears multiple times in object")]
    DuplicateKey {
        /// The duplicated key.
        key: String,
    },

    /// The maximum nesting depth was exceeded.
    #[error("max depth exceeded: JSON nested deeper than {max_depth} levels")]
    MaxDepthExceeded {
        /// The maximum depth that was exceeded.
        max_depth: usize,
    },

    /// A number has no finite IEEE-754 double representation.
    #[error("number {value} cannot be represented as a finite double")]
    NonFiniteNumber {
        /// String representation of the number.
        value: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
    },
}

impl From<JcsError> for VerifyError {
    fn from(err: JcsError) -> Self {
        Self::encoding(err.to_string())
    }
}

/// The default [`Canonicalizer`]: RFC 8785 over `serde_json` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JcsCanonicalizer;

impl Canonicalizer for JcsCanonicalizer {
    fn id(&self) -> &'static str {
        CANONICALIZER_ID
    }

    fn canonicalize(&self, value: &Value) -> Result<Vec<u8>, VerifyError> {
        Ok(to_canonical_string(value)?.into_bytes())
    }
}

/// Canonicalizes a JSON string.
///
/// # Errors
///
/// Returns [`JcsError`] if the input is not valid JSON, contains duplicate
/// member names, or nests deeper than [`MAX_DEPTH`].
pub fn canonicalize_str(input: &str) -> Result<String, JcsError> {
    let value = parse_strict(input)?;
    to_canonical_string(&value)
}

/// Produces the canonical form of an already-parsed value.
///
/// # Errors
///
/// Returns [`JcsError::MaxDepthExceeded`] for values nested deeper than
/// [`MAX_DEPTH`].
pub fn to_canonical_string(value: &Value) -> Result<String, JcsError> {
    let mut output = String::new();
    emit_value(value, &mut output, 0)?;
    Ok(output)
}

/// Parses JSON, rejecting duplicate object member names.
///
/// Standard JSON parsers silently accept duplicate keys (last value wins).
/// Duplicates are checked after decoding key strings, so `"a"` and
/// `"\u0061"` collide.
///
/// # Errors
///
/// Returns [`JcsError::DuplicateKey`] or [`JcsError::ParseError`].
pub fn parse_strict(input: &str) -> Result<Value, JcsError> {
    let mut deserializer = serde_json::Deserializer::from_str(input);
    let value = ValueWithDuplicateCheck::deserialize(&mut deserializer).map_err(|e| {
        let msg = e.to_string();
        if let Some(rest) = msg.strip_prefix("duplicate key: ") {
            // serde_json appends " at line X column Y"
            let key = rest.split(" at line ").next().unwrap_or(rest).to_string();
            JcsError::DuplicateKey { key }
        } else {
            JcsError::ParseError { message: msg }
        }
    })?;
    deserializer.end().map_err(|e| JcsError::ParseError {
        message: e.to_string(),
    })?;
    Ok(value.0)
}

/// Wrapper type for JSON values that checks for duplicate keys during
/// deserialization.
struct ValueWithDuplicateCheck(Value);

impl<'de> Deserialize<'de> for ValueWithDuplicateCheck {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("any valid JSON value")
            }

            fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
                Ok(Value::Number(v.into()))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
                Ok(Value::Number(v.into()))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Number::from_f64(v)
                    .map(Value::Number)
                    .ok_or_else(|| de::Error::custom("invalid float value"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
                Ok(Value::String(v.to_owned()))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
                Ok(Value::String(v))
            }

            fn visit_none<E>(self) -> Result<Self::Value, E> {
                Ok(Value::Null)
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(Value::Null)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut vec = Vec::new();
                while let Some(elem) = seq.next_element::<ValueWithDuplicateCheck>()? {
                    vec.push(elem.0);
                }
                Ok(Value::Array(vec))
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut seen_keys = BTreeSet::new();
                let mut obj = Map::new();

                while let Some(key) = map.next_key::<String>()? {
                    if !seen_keys.insert(key.clone()) {
                        return Err(de::Error::custom(format!("duplicate key: {key}")));
                    }
                    let value = map.next_value::<ValueWithDuplicateCheck>()?;
                    obj.insert(key, value.0);
                }
                Ok(Value::Object(obj))
            }
        }

        deserializer
            .deserialize_any(ValueVisitor)
            .map(ValueWithDuplicateCheck)
    }
}

fn emit_value(value: &Value, output: &mut String, depth: usize) -> Result<(), JcsError> {
    if depth > MAX_DEPTH {
        return Err(JcsError::MaxDepthExceeded {
            max_depth: MAX_DEPTH,
        });
    }
    match value {
        Value::Null => output.push_str("null"),
        Value::Bool(b) => output.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => emit_number(n, output)?,
        Value::String(s) => emit_string(s, output),
        Value::Array(arr) => {
            output.push('[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    output.push(',');
                }
                emit_value(item, output, depth + 1)?;
            }
            output.push(']');
        },
        Value::Object(obj) => {
            // RFC 8785 §3.2.3: sort by UTF-16 code units, not UTF-8 bytes.
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));

            output.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    output.push(',');
                }
                emit_string(key, output);
                output.push(':');
                emit_value(&obj[key.as_str()], output, depth + 1)?;
            }
            output.push('}');
        },
    }
    Ok(())
}

/// Emits a number in ECMAScript form (RFC 8785 §3.2.2.3).
/// Largest magnitude below which every integer is exactly a double.
const MAX_EXACT_INTEGER: u64 = 1 << 53;

/// Numbers are IEEE-754 doubles in RFC 8785, so integers beyond 2^53 are
/// rounded like any other double.
fn emit_number(n: &Number, output: &mut String) -> Result<(), JcsError> {
    if let Some(i) = n.as_i64().filter(|i| i.unsigned_abs() <= MAX_EXACT_INTEGER) {
        let _ = write!(output, "{i}");
        return Ok(());
    }
    let Some(f) = n.as_f64().filter(|f| f.is_finite()) else {
        return Err(JcsError::NonFiniteNumber {
            value: n.to_string(),
        });
    };
    output.push_str(&format_es_double(f));
    Ok(())
}

/// Formats a finite double the way ECMAScript `Number.prototype.toString`
/// does: plain decimal notation for magnitudes in `[1e-6, 1e21)`, shortest
/// round-trip exponent notation with an explicit sign otherwise.
fn format_es_double(f: f64) -> String {
    if f == 0.0 {
        return "0".to_string();
    }
    let magnitude = f.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return format!("{f}");
    }
    let exp = format!("{f:e}");
    match exp.split_once('e') {
        Some((mantissa, power)) if !power.starts_with('-') => format!("{mantissa}e+{power}"),
        _ => exp,
    }
}

/// Emits a string with minimal escaping per RFC 8785 §3.2.2.2.
fn emit_string(s: &str, output: &mut String) {
    output.push('"');
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\u{0008}' => output.push_str("\\b"),
            '\u{000C}' => output.push_str("\\f"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if ('\u{0000}'..='\u{001F}').contains(&c) => {
                let _ = write!(output, "\\u{:04x}", c as u32);
            },
            c => output.push(c),
        }
    }
    output.push('"');
}

/// Checks if the input JSON is already in canonical form.
#[must_use]
pub fn is_canonical(input: &str) -> bool {
    canonicalize_str(input).is_ok_and(|canonical| canonical == input)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn integers_beyond_two_pow_53_use_double_form() {
        assert_eq!(
            canonicalize_str(r#"{"n":9007199254740993}"#).unwrap(),
            r#"{"n":9007199254740992}"#
        );
        assert_eq!(
            canonicalize_str(r#"{"n":-9007199254740993}"#).unwrap(),
            r#"{"n":-9007199254740992}"#
        );
        assert_eq!(
            canonicalize_str("18446744073709551615").unwrap(),
            "18446744073709552000"
        );
    }

    #[test]
    fn integers_up_to_two_pow_53_are_exact() {
        assert_eq!(canonicalize_str("9007199254740992").unwrap(), "9007199254740992");
        assert_eq!(canonicalize_str("-9007199254740991").unwrap(), "-9007199254740991");
        assert_eq!(canonicalize_str("[0,-0,1e2]").unwrap(), "[0,0,100]");
    }

    #[test]
    fn test_canonicalize_simple_object() {
        let result = canonicalize_str(r#"{"z": 1, "a": 2, "m": 3}"#).unwrap();
        assert_eq!(result, r#"{"a":2,"m":3,"z":1}"#);
    }

    #[test]
    fn test_canonicalize_nested_object() {
        let result = canonicalize_str(r#"{"outer": {"z": 1, "a": 2}}"#).unwrap();
        assert_eq!(result, r#"{"outer":{"a":2,"z":1}}"#);
    }

    #[test]
    fn test_array_order_preserved() {
        let result = canonicalize_str("[3, 1, 2]").unwrap();
        assert_eq!(result, "[3,1,2]");
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let err = canonicalize_str(r#"{"a": 1, "a": 2}"#).unwrap_err();
        assert_eq!(err, JcsError::DuplicateKey { key: "a".into() });
    }

    #[test]
    fn test_escaped_duplicate_key_rejected() {
        let err = canonicalize_str(r#"{"a": 1, "\u0061": 2}"#).unwrap_err();
        assert!(matches!(err, JcsError::DuplicateKey { .. }));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(matches!(
            canonicalize_str(r#"{"a": 1} x"#),
            Err(JcsError::ParseError { .. })
        ));
    }

    #[test]
    fn test_utf16_key_order() {
        // UTF-8 byte order would put U+E000 first; in UTF-16 the surrogate
        // 0xD83D of U+1F600 sorts before 0xE000.
        let value = json!({"\u{E000}": 1, "\u{1F600}": 2});
        let out = to_canonical_string(&value).unwrap();
        assert_eq!(out, "{\"\u{1F600}\":2,\"\u{E000}\":1}");
    }

    #[test]
    fn test_rfc8785_number_forms() {
        assert_eq!(format_es_double(1.5), "1.5");
        assert_eq!(format_es_double(100.0), "100");
        assert_eq!(format_es_double(-0.0), "0");
        assert_eq!(format_es_double(1e21), "1e+21");
        assert_eq!(format_es_double(1e-7), "1e-7");
        assert_eq!(format_es_double(0.000_001), "0.000001");
        assert_eq!(format_es_double(4.5e-7), "4.5e-7");
        assert_eq!(format_es_double(333_333_333.333_333_3), "333333333.3333333");
    }

    #[test]
    fn test_string_escaping() {
        let value = json!("quote\" back\\ nl\n tab\t bell\u{0007} del\u{007f}");
        let out = to_canonical_string(&value).unwrap();
        assert_eq!(
            out,
            "\"quote\\\" back\\\\ nl\\n tab\\t bell\\u0007 del\u{007f}\""
        );
    }

    #[test]
    fn test_depth_limit() {
        let mut value = json!(1);
        for _ in 0..=MAX_DEPTH {
            value = json!([value]);
        }
        assert!(matches!(
            to_canonical_string(&value),
            Err(JcsError::MaxDepthExceeded { .. })
        ));
    }

    #[test]
    fn test_is_canonical() {
        assert!(is_canonical(r#"{"a":1,"b":[null]}"#));
        assert!(!is_canonical(r#"{"b":1,"a":2}"#));
        assert!(!is_canonical(r#"{"a": 1}"#));
    }

    #[test]
    fn test_canonicalizer_trait_returns_utf8_bytes() {
        let bytes = JcsCanonicalizer
            .canonicalize(&json!({"b": "é", "a": 0}))
            .unwrap();
        assert_eq!(bytes, "{\"a\":0,\"b\":\"é\"}".as_bytes());
    }
}
