//! Type shape probing.
//!
//! A resolver needs to know, before any request arrives, whether its target is
//! a scalar (and of which kind) or a record with named fields. That information
//! is recovered from the target's own `Deserialize` impl by driving it with a
//! deserializer that answers every request with the shape it was asked for.

use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer, Visitor};

/// What a target type looks like on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Integer,
    Float,
    Bool,
    String,
    /// Record with the given serialized field names
    Struct(&'static [&'static str]),
    /// String-keyed map
    Map,
    /// Self-describing target such as `serde_json::Value`
    Any,
    /// Anything else (sequences, enums, bytes, ...), named for error messages
    Other(&'static str),
}

impl Shape {
    /// Records and maps are bound field by field; everything else is coerced as one value.
    pub fn is_composite(&self) -> bool {
        matches!(self, Shape::Struct(_) | Shape::Map)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Integer => "integer",
            Shape::Float => "float",
            Shape::Bool => "bool",
            Shape::String => "string",
            Shape::Struct(_) => "struct",
            Shape::Map => "map",
            Shape::Any => "any",
            Shape::Other(kind) => *kind,
        }
    }

    /// Field names of a record, empty for every other shape.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Shape::Struct(fields) => *fields,
            _ => &[],
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Probe the shape of `T`.
///
/// `Option<T>` and newtype wrappers report the shape of what they wrap.
pub fn probe<T: DeserializeOwned>() -> Shape {
    match T::deserialize(Probe) {
        Err(Found(shape)) => shape,
        Ok(_) => Shape::Other("unit"),
    }
}

#[derive(Debug)]
struct Found(Shape);

impl fmt::Display for Found {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "found {}", self.0)
    }
}

impl std::error::Error for Found {}

impl de::Error for Found {
    fn custom<T: fmt::Display>(_msg: T) -> Self {
        Found(Shape::Other("unknown"))
    }
}

struct Probe;

macro_rules! found {
    ($($method:ident => $shape:expr),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Found> {
                Err(Found($shape))
            }
        )*
    };
}

impl<'de> Deserializer<'de> for Probe {
    type Error = Found;

    found! {
        deserialize_any => Shape::Any,
        deserialize_ignored_any => Shape::Any,
        deserialize_bool => Shape::Bool,
        deserialize_i8 => Shape::Integer,
        deserialize_i16 => Shape::Integer,
        deserialize_i32 => Shape::Integer,
        deserialize_i64 => Shape::Integer,
        deserialize_i128 => Shape::Integer,
        deserialize_u8 => Shape::Integer,
        deserialize_u16 => Shape::Integer,
        deserialize_u32 => Shape::Integer,
        deserialize_u64 => Shape::Integer,
        deserialize_u128 => Shape::Integer,
        deserialize_f32 => Shape::Float,
        deserialize_f64 => Shape::Float,
        deserialize_char => Shape::String,
        deserialize_str => Shape::String,
        deserialize_string => Shape::String,
        deserialize_identifier => Shape::String,
        deserialize_bytes => Shape::Other("bytes"),
        deserialize_byte_buf => Shape::Other("bytes"),
        deserialize_unit => Shape::Other("unit"),
        deserialize_seq => Shape::Other("sequence"),
        deserialize_map => Shape::Map,
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Found> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Found> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _visitor: V,
    ) -> Result<V::Value, Found> {
        Err(Found(Shape::Other("unit")))
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, _visitor: V) -> Result<V::Value, Found> {
        Err(Found(Shape::Other("sequence")))
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, Found> {
        Err(Found(Shape::Other("sequence")))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Found> {
        Err(Found(Shape::Struct(fields)))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Found> {
        Err(Found(Shape::Other("enum")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Deserialize)]
    #[allow(dead_code)]
    struct Login {
        username: String,
        #[serde(rename = "pass")]
        password: String,
    }

    #[derive(Deserialize)]
    #[allow(dead_code)]
    struct UserId(u64);

    #[test]
    fn test_scalar_shapes() {
        assert_eq!(probe::<i32>(), Shape::Integer);
        assert_eq!(probe::<u64>(), Shape::Integer);
        assert_eq!(probe::<f64>(), Shape::Float);
        assert_eq!(probe::<bool>(), Shape::Bool);
        assert_eq!(probe::<String>(), Shape::String);
        assert_eq!(probe::<serde_json::Value>(), Shape::Any);
    }

    #[test]
    fn test_wrappers_report_inner_shape() {
        assert_eq!(probe::<Option<i64>>(), Shape::Integer);
        assert_eq!(probe::<UserId>(), Shape::Integer);
    }

    #[test]
    fn test_struct_fields_use_serialized_names() {
        let shape = probe::<Login>();
        assert!(shape.is_composite());
        assert_eq!(shape.fields(), &["username", "pass"]);
    }

    #[test]
    fn test_other_shapes() {
        assert_eq!(probe::<HashMap<String, String>>(), Shape::Map);
        assert_eq!(probe::<Vec<u8>>(), Shape::Other("sequence"));
        assert!(!probe::<Vec<u8>>().is_composite());
    }
}
