//! Struct binder.
//!
//! Maps a flat `field -> raw value` set onto a record type. The set is lifted
//! into an explicit intermediate form, a `serde_json::Value::Object`, and the
//! target is deserialized from it with its own serde field rules (renames,
//! defaults, `deny_unknown_fields`, ...). Failures surface verbatim as
//! [`BindError::Bind`].

use serde::de::{
    self, DeserializeOwned, DeserializeSeed, Deserializer, MapAccess, SeqAccess, Unexpected,
    Visitor,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BindError;
use crate::value::coerce::parse_bool;

/// Bind a flat value set onto `T`.
///
/// ```
/// use serde::Deserialize;
/// use serde_json::{json, Map};
///
/// #[derive(Deserialize)]
/// struct Login { username: String }
///
/// let mut values = Map::new();
/// values.insert("username".into(), json!("admin"));
/// let login: Login = brrtbind::bind(values).unwrap();
/// assert_eq!(login.username, "admin");
/// ```
pub fn bind<T: DeserializeOwned>(values: Map<String, Value>) -> Result<T, BindError> {
    let intermediate = Value::Object(values);
    Ok(serde_json::from_value(intermediate)?)
}

/// Bind values that all arrived as text (query, path, headers, form fields).
///
/// Numeric and boolean fields accept their text form (`"10"`, `"true"`,
/// `"t"`); string fields keep the text as-is. Nested objects and arrays are
/// read the same way.
pub fn bind_text<T: DeserializeOwned>(values: Map<String, Value>) -> Result<T, BindError> {
    Ok(<T as Deserialize>::deserialize(TextValue(Value::Object(values)))?)
}

/// Convert one serializable record into another through the intermediate form.
pub fn rebind<S, T>(source: &S) -> Result<T, BindError>
where
    S: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let intermediate = serde_json::to_value(source)?;
    Ok(serde_json::from_value(intermediate)?)
}

/// Intermediate value whose strings parse on demand into numbers and bools.
struct TextValue(Value);

macro_rules! parse_number {
    ($($method:ident => $visit:ident($ty:ty)),* $(,)?) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
            match self.0 {
                Value::String(s) => match s.trim().parse::<$ty>() {
                    Ok(n) => visitor.$visit(n),
                    Err(_) => Err(de::Error::invalid_value(Unexpected::Str(&s), &visitor)),
                },
                other => other.$method(visitor),
            }
        }
    )*};
}

impl<'de> Deserializer<'de> for TextValue {
    type Error = serde_json::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            Value::Object(map) => visitor.visit_map(TextMap::new(map)),
            Value::Array(items) => visitor.visit_seq(TextSeq(items.into_iter())),
            other => other.deserialize_any(visitor),
        }
    }

    parse_number! {
        deserialize_i8 => visit_i8(i8),
        deserialize_i16 => visit_i16(i16),
        deserialize_i32 => visit_i32(i32),
        deserialize_i64 => visit_i64(i64),
        deserialize_u8 => visit_u8(u8),
        deserialize_u16 => visit_u16(u16),
        deserialize_u32 => visit_u32(u32),
        deserialize_u64 => visit_u64(u64),
        deserialize_f32 => visit_f32(f32),
        deserialize_f64 => visit_f64(f64),
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            Value::String(s) => match parse_bool(&s) {
                Some(b) => visitor.visit_bool(b),
                None => Err(de::Error::invalid_value(Unexpected::Str(&s), &visitor)),
            },
            other => other.deserialize_bool(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            Value::Null => visitor.visit_none(),
            other => visitor.visit_some(TextValue(other)),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            Value::Array(items) => visitor.visit_seq(TextSeq(items.into_iter())),
            other => other.deserialize_seq(visitor),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            Value::Object(map) => visitor.visit_map(TextMap::new(map)),
            other => other.deserialize_map(visitor),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.0.deserialize_enum(name, variants, visitor)
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.0.deserialize_unit_struct(name, visitor)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.0.deserialize_char(visitor)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.0.deserialize_str(visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.0.deserialize_string(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.0.deserialize_bytes(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.0.deserialize_byte_buf(visitor)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.0.deserialize_unit(visitor)
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.0.deserialize_identifier(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }
}

struct TextMap {
    iter: serde_json::map::IntoIter,
    value: Option<Value>,
}

impl TextMap {
    fn new(map: Map<String, Value>) -> Self {
        Self {
            iter: map.into_iter(),
            value: None,
        }
    }
}

impl<'de> MapAccess<'de> for TextMap {
    type Error = serde_json::Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Self::Error> {
        match self.iter.next() {
            Some((key, value)) => {
                self.value = Some(value);
                seed.deserialize(TextValue(Value::String(key))).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Self::Error> {
        let value = self
            .value
            .take()
            .ok_or_else(|| de::Error::custom("value requested before key"))?;
        seed.deserialize(TextValue(value))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct TextSeq(std::vec::IntoIter<Value>);

impl<'de> SeqAccess<'de> for TextSeq {
    type Error = serde_json::Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error> {
        self.0
            .next()
            .map(|value| seed.deserialize(TextValue(value)))
            .transpose()
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Login {
        username: String,
        password: String,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Page {
        limit: u32,
        #[serde(default)]
        desc: bool,
    }

    fn map(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_bind_record() {
        let login: Login = bind(map(json!({"username": "admin", "password": "pass"}))).unwrap();
        assert_eq!(login.username, "admin");
        assert_eq!(login.password, "pass");
    }

    #[test]
    fn test_bind_error_is_verbatim() {
        let err = bind::<Login>(map(json!({"username": "admin"}))).unwrap_err();
        assert!(err.to_string().contains("missing field `password`"));
    }

    #[test]
    fn test_bind_text_converts_numbers_and_bools() {
        let page: Page = bind_text(map(json!({"limit": "10", "desc": "true"}))).unwrap();
        assert_eq!(page, Page { limit: 10, desc: true });
    }

    #[test]
    fn test_bind_text_keeps_strings_when_they_fit() {
        let login: Login = bind_text(map(json!({"username": "42", "password": "x"}))).unwrap();
        assert_eq!(login.username, "42");
    }

    #[test]
    fn test_bind_text_numeric_string_field_stays_text() {
        #[derive(Debug, Deserialize)]
        struct Item {
            code: String,
            qty: u32,
        }
        let item: Item = bind_text(map(json!({"code": "007", "qty": "3"}))).unwrap();
        assert_eq!(item.code, "007");
        assert_eq!(item.qty, 3);
    }

    #[test]
    fn test_bind_text_bad_number_names_value() {
        let err = bind_text::<Page>(map(json!({"limit": "lots"}))).unwrap_err();
        assert!(err.to_string().contains("\"lots\""));
    }

    #[test]
    fn test_bind_text_optional_and_nested() {
        #[derive(Debug, Deserialize)]
        struct Outer {
            inner: Page,
            note: Option<u8>,
        }
        let out: Outer =
            bind_text(map(json!({"inner": {"limit": "5", "desc": "F"}, "note": "9"}))).unwrap();
        assert_eq!(out.inner, Page { limit: 5, desc: false });
        assert_eq!(out.note, Some(9));
    }

    #[test]
    fn test_rebind() {
        let login = Login {
            username: "a".into(),
            password: "b".into(),
        };
        let value: Value = rebind(&login).unwrap();
        assert_eq!(value, json!({"username": "a", "password": "b"}));
    }
}
