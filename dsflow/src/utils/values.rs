//! Helpers for loosely typed values coming from the API and from tools.

use std::str::FromStr;

/// Parses `input` into a number, returning `None` when absent or invalid.
#[must_use]
pub fn parse_number<T: FromStr>(input: Option<&str>) -> Option<T> {
    input.and_then(|s| s.trim().parse().ok())
}

/// Converts a human-readable size such as `1.5G` to bytes.
///
/// Recognises the binary suffixes `K`, `M`, `G` and `T`. A value without a
/// suffix is parsed as a plain byte count. Returns `None` when the input
/// cannot be parsed.
#[must_use]
pub fn convert_size_to_bytes(size: &str) -> Option<u64> {
    let size = size.trim();
    let (num, multiplier) = match size.chars().last()? {
        'K' => (&size[..size.len() - 1], 1u64 << 10),
        'M' => (&size[..size.len() - 1], 1u64 << 20),
        'G' => (&size[..size.len() - 1], 1u64 << 30),
        'T' => (&size[..size.len() - 1], 1u64 << 40),
        _ => return size.parse().ok(),
    };
    let value: f64 = num.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let bytes = (value * multiplier as f64) as u64;
    Some(bytes)
}

/// Merges `b` into `a`.
///
/// Nested objects are merged key by key. Any other value in `b`, including
/// arrays, replaces the value in `a`.
pub fn merge(a: &mut serde_json::Value, b: serde_json::Value) {
    match (a, b) {
        (serde_json::Value::Object(a), serde_json::Value::Object(b)) => {
            for (key, value) in b {
                let nested =
                    value.is_object() && a.get(&key).is_some_and(serde_json::Value::is_object);
                if nested {
                    if let Some(existing) = a.get_mut(&key) {
                        merge(existing, value);
                    }
                } else {
                    a.insert(key, value);
                }
            }
        }
        (a, b) => *a = b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number::<u64>(Some("1024")), Some(1024));
        assert_eq!(parse_number::<u64>(Some(" 7 ")), Some(7));
        assert_eq!(parse_number::<u64>(Some("abc")), None);
        assert_eq!(parse_number::<u64>(None), None);
        assert_eq!(parse_number::<f64>(Some("2.5")), Some(2.5));
    }

    #[test]
    fn test_convert_size_to_bytes() {
        assert_eq!(convert_size_to_bytes("2K"), Some(2048));
        assert_eq!(convert_size_to_bytes("1.5M"), Some(1_572_864));
        assert_eq!(convert_size_to_bytes("1G"), Some(1 << 30));
        assert_eq!(convert_size_to_bytes("2T"), Some(2 << 40));
        assert_eq!(convert_size_to_bytes("512"), Some(512));
        assert_eq!(convert_size_to_bytes("lots"), None);
        assert_eq!(convert_size_to_bytes(""), None);
        assert_eq!(convert_size_to_bytes("-1K"), None);
    }

    #[test]
    fn test_merge_nested() {
        let mut a = json!({
            "1": {"a": "A"},
            "2": {"b": "B"},
            "3": [1, 2, 3],
            "4": {"a": {"b": 2}}
        });
        let b = json!({
            "2": {"c": "C"},
            "3": {"d": "D"},
            "4": {"c": {"b": 3}, "a": [1, 2, {"b": 2}]}
        });
        merge(&mut a, b);
        assert_eq!(
            a,
            json!({
                "1": {"a": "A"},
                "2": {"b": "B", "c": "C"},
                "3": {"d": "D"},
                "4": {"a": [1, 2, {"b": 2}], "c": {"b": 3}}
            })
        );
    }

    #[test]
    fn test_merge_non_object_replaces() {
        let mut a = json!({"x": 1});
        merge(&mut a, json!([1]));
        assert_eq!(a, json!([1]));
    }
}
