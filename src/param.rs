//! Query string serialization.
//!
//! [`param`] turns [`RequestData`] into the `key=value&key2=value2` form used when
//! appending data to a request URL (or sending it as a form body). The output is kept
//! byte-compatible with what existing consumers expect:
//!
//! - keys and values are serialized in insertion order
//! - the whole string is percent-encoded like `encodeURIComponent`
//! - `%20` becomes `+`
//! - escapes of the form `%<digit><D|6|F>` are decoded again, which restores `=`, `&`,
//!   `/` and `?` (among a few control characters)
//! - one leading `?` and one trailing `&` are stripped
//!
//! ```
//! use gosub_ajax::param::{param, RequestData};
//! use serde_json::json;
//!
//! let data = RequestData::fields([("id", json!(3)), ("name", json!("a b"))]);
//! assert_eq!(param(&data), "id=3&name=a+b");
//! assert_eq!(param(&"already=a&string=b".into()), "already=a&string=b");
//! ```
use indexmap::IndexMap;
use lazy_static::lazy_static;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::{Captures, Regex};
use serde_json::{Number, Value};

/// Characters left untouched by `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

lazy_static! {
    static ref RESERVED_ESCAPE: Regex = Regex::new(r"%\d[D6F]").expect("valid reserved escape pattern");
}

/// Data attached to a request: either a preformatted string or an ordered field map.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestData {
    Text(String),
    Fields(IndexMap<String, Value>),
}

impl RequestData {
    /// Builds a field map, keeping the order of `fields`.
    pub fn fields<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        RequestData::Fields(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Empty text counts as no data. A field map always counts, even when empty.
    pub fn is_blank(&self) -> bool {
        matches!(self, RequestData::Text(s) if s.is_empty())
    }
}

impl From<&str> for RequestData {
    fn from(s: &str) -> Self {
        RequestData::Text(s.to_string())
    }
}

impl From<String> for RequestData {
    fn from(s: String) -> Self {
        RequestData::Text(s)
    }
}

impl From<IndexMap<String, Value>> for RequestData {
    fn from(map: IndexMap<String, Value>) -> Self {
        RequestData::Fields(map)
    }
}

/// Serializes `data` into a query string. Pure; see the module docs for the exact rules.
pub fn param(data: &RequestData) -> String {
    let params = match data {
        RequestData::Text(text) => text.clone(),
        RequestData::Fields(fields) => {
            let mut out = String::new();
            for (name, value) in fields {
                out.push_str(name);
                out.push('=');
                out.push_str(&value_to_string(value));
                out.push('&');
            }
            out
        }
    };

    let encoded = utf8_percent_encode(&params, URI_COMPONENT)
        .to_string()
        .replace("%20", "+");

    let decoded = RESERVED_ESCAPE.replace_all(&encoded, |caps: &Captures| {
        // always two hex digits after the '%'
        u8::from_str_radix(&caps[0][1..], 16)
            .map(|b| char::from(b).to_string())
            .unwrap_or_else(|_| caps[0].to_string())
    });

    let trimmed = decoded.strip_prefix('?').unwrap_or(&decoded);
    trimmed.strip_suffix('&').unwrap_or(trimmed).to_string()
}

/// Numbers print like `String(n)` in a script host: integral values without a
/// fraction, exponent notation outside of `[1e-6, 1e21)`.
fn number_to_string(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    let Some(f) = n.as_f64() else {
        return n.to_string();
    };
    if f == 0.0 {
        // also covers -0
        return "0".to_string();
    }

    let abs = f.abs();
    if (1e-6..1e21).contains(&abs) {
        // shortest round-trip digits, never in exponent form
        return format!("{f}");
    }
    let exp = format!("{f:e}");
    match exp.split_once('e') {
        Some((mantissa, power)) if !power.starts_with('-') => format!("{mantissa}e+{power}"),
        _ => exp,
    }
}

/// String form of a field value, the way a script host would stringify it.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_to_string(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => value_to_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fields_keep_insertion_order_and_use_plus_for_spaces() {
        let data = RequestData::fields([("id", json!(3)), ("name", json!("a b"))]);
        assert_eq!(param(&data), "id=3&name=a+b");

        let data = RequestData::fields([("z", json!(1)), ("a", json!(2)), ("m", json!(3))]);
        assert_eq!(param(&data), "z=1&a=2&m=3");
    }

    #[test]
    fn preformatted_strings_pass_through() {
        assert_eq!(param(&"already=a&string=b".into()), "already=a&string=b");
    }

    #[test]
    fn leading_question_mark_and_trailing_ampersand_are_stripped() {
        assert_eq!(param(&"?q=1&".into()), "q=1");
        // only one of each
        assert_eq!(param(&"??q=1&&".into()), "?q=1&");
    }

    #[test]
    fn other_special_characters_stay_escaped() {
        let data = RequestData::fields([("q", json!("c++ #1")), ("path", json!("a/b?c"))]);
        assert_eq!(param(&data), "q=c%2B%2B+%231&path=a/b?c");

        let data = RequestData::fields([("city", json!("Zürich"))]);
        assert_eq!(param(&data), "city=Z%C3%BCrich");
    }

    #[test]
    fn values_degrade_to_their_string_form() {
        let data = RequestData::fields([
            ("flag", json!(true)),
            ("none", json!(null)),
            ("list", json!([1, null, "x"])),
            ("obj", json!({"a": 1})),
        ]);
        assert_eq!(
            param(&data),
            "flag=true&none=null&list=1%2C%2Cx&obj=%5Bobject+Object]"
        );
    }

    #[test]
    fn floats_print_like_script_numbers() {
        let data = RequestData::fields([("n", json!(1.0)), ("m", json!(2.50))]);
        assert_eq!(param(&data), "n=1&m=2.5");

        let cases = [
            (json!(-3.0), "-3"),
            (json!(-0.0), "0"),
            (json!(0.000001), "0.000001"),
            (json!(1.5e-7), "1.5e-7"),
            (json!(1e20), "100000000000000000000"),
            (json!(1e21), "1e+21"),
            (json!(1.23e22), "1.23e+22"),
            (json!(u64::MAX), "18446744073709551615"),
        ];
        for (value, expected) in cases {
            assert_eq!(value_to_string(&value), expected, "{value}");
        }

        // the exponent sign is escaped like any other `+`
        let data = RequestData::fields([("big", json!(1e21))]);
        assert_eq!(param(&data), "big=1e%2B21");
    }

    #[test]
    fn blank_detection() {
        assert!(RequestData::from("").is_blank());
        assert!(!RequestData::from("a=1").is_blank());
        assert!(!RequestData::Fields(IndexMap::new()).is_blank());
        assert_eq!(param(&RequestData::Fields(IndexMap::new())), "");
    }
}
