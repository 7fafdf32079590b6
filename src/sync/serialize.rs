//! Canonical text encoding of session trees.
//!
//! Deltas are computed over this text, so two computations of the same
//! logical state must produce identical bytes. Output is the format remote
//! clients already parse and patch:
//!
//! - object keys sorted by code point;
//! - `", "` between items and `": "` after keys;
//! - only printable ASCII is written raw; everything else is a lowercase
//!   `\uXXXX` escape (surrogate pairs above the BMP);
//! - floats in shortest round-trip form, with exponent notation below
//!   `1e-4` and from `1e16` (`1e-05`, `1.5e+16`).
//!
//! Since the output is pure ASCII, delta offsets over it are byte offsets.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::ser::Formatter;
use serde_json::Value;
use std::io;

/// Serializes `tree` canonically.
pub fn serialize(tree: &Value) -> Result<String, serde_json::Error> {
    let mut buf = Vec::with_capacity(128);
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, ReferenceFormatter);
    Canonical(tree).serialize(&mut ser)?;
    // The formatter only ever emits ASCII.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Serializes a value with object keys in sorted order, whatever the map
/// implementation underneath.
struct Canonical<'a>(&'a Value);

impl Serialize for Canonical<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));

                let mut out = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    out.serialize_entry(key, &Canonical(value))?;
                }
                out.end()
            }
            Value::Array(items) => {
                let mut out = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    out.serialize_element(&Canonical(item))?;
                }
                out.end()
            }
            scalar => scalar.serialize(serializer),
        }
    }
}

struct ReferenceFormatter;

impl Formatter for ReferenceFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    // Quotes, backslashes and control characters never reach this method;
    // serde_json escapes those itself.
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if (' '..='~').contains(&c) {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    writer.write_all(format!("\\u{:04x}", unit).as_bytes())?;
                }
            }
        }
        Ok(())
    }

    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(float_repr(value).as_bytes())
    }
}

/// Shortest round-trip rendering of a finite float.
fn float_repr(value: f64) -> String {
    // `{:e}` yields the shortest digits that round-trip, e.g. "-1.25e-7".
    let sci = format!("{:e}", value);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };

    if !(-4..16).contains(&exponent) {
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}{}e{}{:02}", sign, mantissa, exp_sign, exponent.abs());
    }

    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    if exponent < 0 {
        let zeros = "0".repeat((-exponent - 1) as usize);
        return format!("{}0.{}{}", sign, zeros, digits);
    }

    let int_len = exponent as usize + 1;
    if digits.len() <= int_len {
        let zeros = "0".repeat(int_len - digits.len());
        format!("{}{}{}.0", sign, digits, zeros)
    } else {
        format!("{}{}.{}", sign, &digits[..int_len], &digits[int_len..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sorted_keys_and_separators() {
        let out = serialize(&json!({"thumbnail": "test1.jpg", "id": 1})).unwrap();
        assert_eq!(out, r#"{"id": 1, "thumbnail": "test1.jpg"}"#);
    }

    #[test]
    fn test_nested_structures() {
        let tree = json!({
            "search_results": {"tags=cat": [{"thumbnail": "a.jpg", "id": 1}]},
            "item_details": {},
        });
        assert_eq!(
            serialize(&tree).unwrap(),
            r#"{"item_details": {}, "search_results": {"tags=cat": [{"id": 1, "thumbnail": "a.jpg"}]}}"#
        );
    }

    #[test]
    fn test_scalars() {
        assert_eq!(serialize(&json!(null)).unwrap(), "null");
        assert_eq!(serialize(&json!([true, false, -3])).unwrap(), "[true, false, -3]");
        assert_eq!(serialize(&json!([])).unwrap(), "[]");
        assert_eq!(serialize(&json!({})).unwrap(), "{}");
    }

    #[test]
    fn test_non_ascii_is_escaped() {
        assert_eq!(serialize(&json!("café")).unwrap(), r#""caf\u00e9""#);
        assert_eq!(serialize(&json!("🦀")).unwrap(), r#""\ud83e\udd80""#);
        assert_eq!(serialize(&json!("\u{7f}")).unwrap(), r#""\u007f""#);
    }

    #[test]
    fn test_control_characters_use_short_escapes() {
        assert_eq!(
            serialize(&json!("a\"b\\c\nd\te\u{1}")).unwrap(),
            r#""a\"b\\c\nd\te\u0001""#
        );
    }

    #[test]
    fn test_float_repr() {
        assert_eq!(float_repr(0.0), "0.0");
        assert_eq!(float_repr(-0.0), "-0.0");
        assert_eq!(float_repr(1.5), "1.5");
        assert_eq!(float_repr(123.0), "123.0");
        assert_eq!(float_repr(0.0001), "0.0001");
        assert_eq!(float_repr(0.00012), "0.00012");
        assert_eq!(float_repr(1e-5), "1e-05");
        assert_eq!(float_repr(-2.5e-7), "-2.5e-07");
        assert_eq!(float_repr(1e15), "1000000000000000.0");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(1.5e16), "1.5e+16");
        assert_eq!(float_repr(1e100), "1e+100");
    }

    #[test]
    fn test_float_in_tree() {
        assert_eq!(
            serialize(&json!({"ratio": 0.5, "big": 1e20})).unwrap(),
            r#"{"big": 1e+20, "ratio": 0.5}"#
        );
    }

    #[test]
    fn test_output_is_stable() {
        let tree = json!({"b": {"y": 1, "x": [3, 2]}, "a": "z"});
        assert_eq!(serialize(&tree).unwrap(), serialize(&tree.clone()).unwrap());
    }
}
