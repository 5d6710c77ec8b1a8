use serde::de::DeserializeOwned;
use serde_json::{Number, Value};

use super::shape::Shape;
use crate::error::BindError;

/// Convert a raw wire value into `T`.
///
/// A raw value that already deserializes as `T` passes through untouched.
/// Otherwise the value is stringified and parsed according to `shape`. Kinds
/// outside integer/float/bool/string are given one more chance as JSON text;
/// anything that still does not fit is a coercion error, never a silent zero.
pub(crate) fn coerce<T: DeserializeOwned>(
    field: &str,
    shape: Shape,
    raw: Value,
) -> Result<T, BindError> {
    if let Ok(value) = T::deserialize(&raw) {
        return Ok(value);
    }

    let text = match raw {
        Value::String(s) => s,
        other => other.to_string(),
    };
    let parsed = match shape {
        Shape::Integer => parse_integer(text.trim()),
        Shape::Float => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        Shape::Bool => parse_bool(text.trim()).map(Value::Bool),
        Shape::String => Some(Value::String(text.clone())),
        _ => serde_json::from_str::<Value>(&text).ok(),
    };

    parsed
        .and_then(|value| T::deserialize(&value).ok())
        .ok_or_else(|| BindError::Coercion {
            field: field.to_string(),
            kind: shape.kind(),
            value: text,
        })
}

fn parse_integer(text: &str) -> Option<Value> {
    text.parse::<i64>()
        .map(Value::from)
        .or_else(|_| text.parse::<u64>().map(Value::from))
        .ok()
}

/// Boolean spellings accepted on the wire.
pub(crate) fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
