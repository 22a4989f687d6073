//! Conversions between JSON values and Rhai values.

use rhai::{Array, Dynamic, Map};
use serde_json::{Number, Value};

/// JSON value as a script value.
///
/// Integers that fit `i64` stay integers. Integers beyond that range are
/// passed as their decimal string rather than rounded through `f64`.
pub(crate) fn json_to_dynamic(value: Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(b),
        Value::Number(n) => match (n.as_i64(), n.is_u64()) {
            (Some(i), _) => Dynamic::from(i),
            (None, true) => Dynamic::from(n.to_string()),
            (None, false) => n.as_f64().map_or(Dynamic::UNIT, Dynamic::from),
        },
        Value::String(s) => Dynamic::from(s),
        Value::Array(items) => {
            Dynamic::from(items.into_iter().map(json_to_dynamic).collect::<Array>())
        }
        Value::Object(fields) => Dynamic::from(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), json_to_dynamic(v)))
                .collect::<Map>(),
        ),
    }
}

/// Script value as JSON.
///
/// Blobs become arrays of bytes. Values with no JSON counterpart (function
/// pointers, timestamps, custom types) become their string form.
pub(crate) fn dynamic_to_json(value: Dynamic) -> Value {
    if value.is_unit() {
        return Value::Null;
    }
    if let Ok(b) = value.as_bool() {
        return Value::Bool(b);
    }
    if let Ok(i) = value.as_int() {
        return Value::from(i);
    }
    if let Ok(f) = value.as_float() {
        return Number::from_f64(f).map_or(Value::Null, Value::Number);
    }
    if let Ok(c) = value.as_char() {
        return Value::String(c.into());
    }
    if value.is_string() {
        return value.into_string().map_or(Value::Null, Value::String);
    }
    if value.is_blob() {
        return value
            .into_blob()
            .map_or(Value::Null, |bytes| bytes.into_iter().map(Value::from).collect());
    }
    if value.is_array() {
        return value.into_array().map_or(Value::Null, |items| {
            items.into_iter().map(dynamic_to_json).collect()
        });
    }
    if value.is_map() {
        return value.try_cast::<Map>().map_or(Value::Null, |fields| {
            fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), dynamic_to_json(v)))
                .collect::<serde_json::Map<_, _>>()
                .into()
        });
    }
    Value::String(value.to_string())
}

/// Serialize a Rhai value as a JSON string.
pub(crate) fn dynamic_to_json_string(v: Dynamic) -> String {
    serde_json::to_string(&dynamic_to_json(v)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_values_keep_types() {
        let value = json!({
            "name": "scene",
            "count": 3,
            "ratio": 0.5,
            "tags": ["a", "b"],
            "enabled": true,
            "parent": null
        });
        assert_eq!(dynamic_to_json(json_to_dynamic(value.clone())), value);
    }

    #[test]
    fn test_non_finite_float_becomes_null() {
        assert_eq!(dynamic_to_json(Dynamic::from(f64::NAN)), Value::Null);
    }

    #[test]
    fn test_large_unsigned_keeps_digits() {
        let big = json!(u64::MAX);
        let value = json_to_dynamic(big);
        assert_eq!(value.into_string().unwrap(), u64::MAX.to_string());
        assert_eq!(json_to_dynamic(json!(7u64)).as_int().unwrap(), 7);
    }

    #[test]
    fn test_blob_becomes_byte_array() {
        let blob: rhai::Blob = vec![1, 2, 255];
        assert_eq!(dynamic_to_json(Dynamic::from_blob(blob)), json!([1, 2, 255]));
    }

    #[test]
    fn test_char_becomes_string() {
        assert_eq!(dynamic_to_json(Dynamic::from('x')), json!("x"));
    }

    #[test]
    fn test_json_string() {
        let mut map = Map::new();
        map.insert("ok".into(), Dynamic::from(true));
        assert_eq!(dynamic_to_json_string(Dynamic::from(map)), r#"{"ok":true}"#);
    }
}
