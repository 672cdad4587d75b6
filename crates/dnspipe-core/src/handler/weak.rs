//! Tolerant decoding for plugin args.
//!
//! Config documents are written by hand, so scalar types arrive loose:
//! `timeout: "5"`, `deduplicate: "true"`, a numeric tag where a string is
//! expected. [`from_value`] decodes through a wrapper that coerces between
//! string, number and bool wherever the target asks for a scalar, and keeps
//! that tolerance through nested maps and lists. Unknown keys are ignored by
//! the arg structs themselves.

use serde::de::{
    DeserializeOwned, DeserializeSeed, Deserializer, Error as _, MapAccess, SeqAccess, Visitor,
};
use serde_yaml::{Mapping, Value};

/// Decode `value` into `T` with weak scalar handling.
pub(crate) fn from_value<T>(value: Value) -> Result<T, serde_yaml::Error>
where
    T: DeserializeOwned,
{
    T::deserialize(WeakValue::new(value))
}

struct WeakValue {
    value: Value,
}

impl WeakValue {
    fn new(value: Value) -> Self {
        // YAML tags carry no meaning for plugin args.
        match value {
            Value::Tagged(tagged) => Self { value: tagged.value },
            value => Self { value },
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "true" | "True" | "TRUE" => Some(true),
        "0" | "f" | "F" | "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

fn parse_number(raw: &str) -> Result<Value, serde_yaml::Error> {
    let trimmed = raw.trim();
    if let Ok(unsigned) = trimmed.parse::<u64>() {
        return Ok(Value::Number(unsigned.into()));
    }
    if let Ok(signed) = trimmed.parse::<i64>() {
        return Ok(Value::Number(signed.into()));
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        return Ok(Value::Number(float.into()));
    }
    Err(serde_yaml::Error::custom(format!("invalid number literal '{raw}'")))
}

macro_rules! weak_number {
    ($($method:ident)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value, Self::Error>
            where
                V: Visitor<'de>,
            {
                match self.value {
                    Value::Number(_) => self.value.$method(visitor),
                    Value::String(s) => parse_number(&s)?.$method(visitor),
                    Value::Bool(b) => visitor.visit_u64(u64::from(b)),
                    other => other.$method(visitor),
                }
            }
        )*
    };
}

macro_rules! weak_delegate {
    ($($method:ident)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value, Self::Error>
            where
                V: Visitor<'de>,
            {
                self.value.$method(visitor)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for WeakValue {
    type Error = serde_yaml::Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::Sequence(seq) => visitor.visit_seq(WeakSeq { iter: seq.into_iter() }),
            Value::Mapping(map) => visitor.visit_map(WeakMap::new(map)),
            scalar => scalar.deserialize_any(visitor),
        }
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::Bool(b) => visitor.visit_bool(b),
            Value::Number(n) => visitor.visit_bool(n.as_f64().is_some_and(|f| f != 0.0)),
            Value::String(s) => match parse_bool(&s) {
                Some(b) => visitor.visit_bool(b),
                None => Err(serde_yaml::Error::custom(format!("invalid bool literal '{s}'"))),
            },
            other => other.deserialize_bool(visitor),
        }
    }

    weak_number! {
        deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_f32 deserialize_f64
    }

    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_string(visitor)
    }

    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::String(s) => visitor.visit_string(s),
            Value::Number(n) => visitor.visit_string(n.to_string()),
            Value::Bool(b) => visitor.visit_string(b.to_string()),
            other => other.deserialize_string(visitor),
        }
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::Sequence(seq) => visitor.visit_seq(WeakSeq { iter: seq.into_iter() }),
            other => other.deserialize_seq(visitor),
        }
    }

    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::Mapping(map) => visitor.visit_map(WeakMap::new(map)),
            other => other.deserialize_map(visitor),
        }
    }

    fn deserialize_struct<V>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::Mapping(map) => visitor.visit_map(WeakMap::new(map)),
            other => other.deserialize_struct(name, fields, visitor),
        }
    }

    fn deserialize_newtype_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_unit_struct<V>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.value.deserialize_unit_struct(name, visitor)
    }

    fn deserialize_tuple<V>(self, len: usize, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.value.deserialize_tuple(len, visitor)
    }

    fn deserialize_tuple_struct<V>(
        self,
        name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.value.deserialize_tuple_struct(name, len, visitor)
    }

    fn deserialize_enum<V>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.value.deserialize_enum(name, variants, visitor)
    }

    weak_delegate! {
        deserialize_char deserialize_bytes deserialize_byte_buf
        deserialize_unit deserialize_identifier deserialize_ignored_any
    }
}

struct WeakSeq {
    iter: std::vec::IntoIter<Value>,
}

impl<'de> SeqAccess<'de> for WeakSeq {
    type Error = serde_yaml::Error;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>, Self::Error>
    where
        T: DeserializeSeed<'de>,
    {
        match self.iter.next() {
            Some(value) => seed.deserialize(WeakValue::new(value)).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct WeakMap {
    iter: serde_yaml::mapping::IntoIter,
    value: Option<Value>,
}

impl WeakMap {
    fn new(map: Mapping) -> Self {
        Self { iter: map.into_iter(), value: None }
    }
}

impl<'de> MapAccess<'de> for WeakMap {
    type Error = serde_yaml::Error;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>, Self::Error>
    where
        K: DeserializeSeed<'de>,
    {
        match self.iter.next() {
            Some((key, value)) => {
                self.value = Some(value);
                seed.deserialize(WeakValue::new(key)).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value, Self::Error>
    where
        V: DeserializeSeed<'de>,
    {
        match self.value.take() {
            Some(value) => seed.deserialize(WeakValue::new(value)),
            None => Err(serde_yaml::Error::custom("map value read before its key")),
        }
    }
}
