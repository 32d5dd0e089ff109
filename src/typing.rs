// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::value::{Record, Value};
use crate::Rc;

use core::fmt;
use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declared type of a struct field or of a resolver parameter.
///
/// Types are declared explicitly when a struct schema or a resolver is
/// registered. They drive resolver matching, literal coercion and the
/// dereferencing done during traversal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "camelCase")]
pub enum Type {
    // Dynamic value; any value can be stored.
    Any,

    Bool,
    Int,
    UInt,
    Float,
    String,
    Timestamp,

    // Nullable wrapper.
    Optional { item_type: Box<Type> },

    Array { item_type: Box<Type> },
    Map { key_type: Box<Type>, value_type: Box<Type> },

    // Registered struct type.
    Struct { name: Rc<str> },

    // Resolution context marker. Only meaningful as a resolver parameter.
    Context,
}

impl Type {
    pub fn optional(item_type: Type) -> Type {
        Type::Optional {
            item_type: Box::new(item_type),
        }
    }

    pub fn array(item_type: Type) -> Type {
        Type::Array {
            item_type: Box::new(item_type),
        }
    }

    pub fn map(key_type: Type, value_type: Type) -> Type {
        Type::Map {
            key_type: Box::new(key_type),
            value_type: Box::new(value_type),
        }
    }

    pub fn record(name: &str) -> Type {
        Type::Struct { name: name.into() }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Optional { .. } | Type::Any)
    }

    /// Strip optional layers.
    pub fn inner(&self) -> &Type {
        match self {
            Type::Optional { item_type } => item_type.inner(),
            t => t,
        }
    }

    /// Element type of an array or value type of a map.
    pub fn element_type(&self) -> Option<&Type> {
        match self.inner() {
            Type::Array { item_type } => Some(&**item_type),
            Type::Map { value_type, .. } => Some(&**value_type),
            Type::Any => Some(&Type::Any),
            _ => None,
        }
    }

    /// Whether a value of type `self` may be stored where `target` is expected.
    pub fn is_assignable_to(&self, target: &Type) -> bool {
        if self == target {
            return true;
        }
        match target {
            Type::Any => *self != Type::Context,
            Type::Optional { item_type } => self.is_assignable_to(item_type),
            _ => false,
        }
    }

    /// Shallow check that a runtime value fits this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Type::Any, _) => true,
            (Type::Optional { .. }, Value::Null) => true,
            (Type::Optional { item_type }, v) => item_type.accepts(v),
            (Type::Bool, Value::Bool(_)) => true,
            (Type::Int, Value::Number(n)) => n.as_i64().is_some(),
            (Type::UInt, Value::Number(n)) => n.as_u64().is_some(),
            (Type::Float, Value::Number(_)) => true,
            (Type::String, Value::String(_)) => true,
            (Type::Timestamp, Value::Timestamp(_)) => true,
            (Type::Array { .. }, Value::Array(_)) => true,
            (Type::Map { .. }, Value::Map(_)) => true,
            (Type::Struct { name }, Value::Struct(r)) => r.type_name() == &**name,
            _ => false,
        }
    }

    /// The zero value of the type.
    pub fn zero_value(&self) -> Value {
        match self {
            Type::Any | Type::Optional { .. } | Type::Context => Value::Null,
            Type::Bool => Value::Bool(false),
            Type::Int => Value::from(0i64),
            Type::UInt => Value::from(0u64),
            Type::Float => Value::from(0.0),
            Type::String => Value::from(""),
            Type::Timestamp => Value::Timestamp(DateTime::<Utc>::default()),
            Type::Array { .. } => Value::new_array(),
            Type::Map { .. } => Value::new_map(),
            Type::Struct { name } => Value::from(Record::new(name)),
        }
    }

    /// Coerce a literal taken from a directive or a path segment.
    pub fn parse_literal(&self, text: &str) -> Result<Value> {
        Ok(match self {
            Type::Any | Type::String => Value::from(text),
            Type::Bool => match text {
                "1" | "t" | "T" | "true" | "TRUE" | "True" => Value::Bool(true),
                "0" | "f" | "F" | "false" | "FALSE" | "False" => Value::Bool(false),
                _ => bail!("`{text}` is not a bool"),
            },
            Type::Int => Value::from(parse_i64(text)?),
            Type::UInt => Value::from(parse_u64(text)?),
            Type::Float => match text.parse::<f64>() {
                Ok(f) => Value::from(f),
                Err(_) => bail!("`{text}` is not a float"),
            },
            Type::Timestamp => match DateTime::parse_from_rfc3339(text) {
                Ok(t) => Value::Timestamp(t.with_timezone(&Utc)),
                Err(e) => bail!("`{text}` is not an RFC 3339 timestamp: {e}"),
            },
            Type::Optional { item_type } => item_type.parse_literal(text)?,
            _ => bail!("literal `{text}` cannot be used for type {self}"),
        })
    }
}

// Digits of an integer literal whose sign has already been stripped.
fn split_radix(text: &str) -> Result<(&str, u32)> {
    let (digits, radix) = if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        (hex, 16)
    } else if let Some(bin) = text.strip_prefix("0b") {
        (bin, 2)
    } else if let Some(oct) = text.strip_prefix("0o") {
        (oct, 8)
    } else {
        (text, 10)
    };
    // from_str_radix accepts a sign of its own.
    if digits.starts_with(['+', '-']) {
        bail!("a sign must be followed by digits, found `{text}`");
    }
    Ok((digits, radix))
}

fn parse_i64(text: &str) -> Result<i64> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (digits, radix) = split_radix(body)?;
    let magnitude = i128::from_str_radix(digits, radix)
        .map_err(|e| anyhow!("`{text}` is not an integer: {e}"))?;
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value).map_err(|_| anyhow!("`{text}` is out of range"))
}

fn parse_u64(text: &str) -> Result<u64> {
    let (digits, radix) = split_radix(text.strip_prefix('+').unwrap_or(text))?;
    u64::from_str_radix(digits, radix).map_err(|e| anyhow!("`{text}` is not an unsigned integer: {e}"))
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "any"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::UInt => write!(f, "uint"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "string"),
            Type::Timestamp => write!(f, "timestamp"),
            Type::Optional { item_type } => write!(f, "*{item_type}"),
            Type::Array { item_type } => write!(f, "[]{item_type}"),
            Type::Map {
                key_type,
                value_type,
            } => write!(f, "map[{key_type}]{value_type}"),
            Type::Struct { name } => write!(f, "{name}"),
            Type::Context => write!(f, "context"),
        }
    }
}

/// Rust types that have a declared [`Type`] and convert to and from [`Value`].
///
/// Resolver arguments and results are expressed with this trait. Implement it
/// for your own structs to let resolvers return them.
pub trait Typed: Sized {
    fn value_type() -> Type;
    fn from_value(value: &Value) -> Result<Self>;
    fn into_value(self) -> Value;
}

impl Typed for Value {
    fn value_type() -> Type {
        Type::Any
    }

    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }

    fn into_value(self) -> Value {
        self
    }
}

impl Typed for bool {
    fn value_type() -> Type {
        Type::Bool
    }

    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool()
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl Typed for i64 {
    fn value_type() -> Type {
        Type::Int
    }

    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64()
    }

    fn into_value(self) -> Value {
        Value::from(self)
    }
}

impl Typed for i32 {
    fn value_type() -> Type {
        Type::Int
    }

    fn from_value(value: &Value) -> Result<Self> {
        Ok(i32::try_from(value.as_i64()?)?)
    }

    fn into_value(self) -> Value {
        Value::from(self)
    }
}

impl Typed for u64 {
    fn value_type() -> Type {
        Type::UInt
    }

    fn from_value(value: &Value) -> Result<Self> {
        value.as_u64()
    }

    fn into_value(self) -> Value {
        Value::from(self)
    }
}

impl Typed for u32 {
    fn value_type() -> Type {
        Type::UInt
    }

    fn from_value(value: &Value) -> Result<Self> {
        Ok(u32::try_from(value.as_u64()?)?)
    }

    fn into_value(self) -> Value {
        Value::from(self)
    }
}

impl Typed for f64 {
    fn value_type() -> Type {
        Type::Float
    }

    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64()
    }

    fn into_value(self) -> Value {
        Value::from(self)
    }
}

impl Typed for String {
    fn value_type() -> Type {
        Type::String
    }

    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.as_string()?.to_string())
    }

    fn into_value(self) -> Value {
        Value::from(self)
    }
}

impl Typed for DateTime<Utc> {
    fn value_type() -> Type {
        Type::Timestamp
    }

    fn from_value(value: &Value) -> Result<Self> {
        Ok(*value.as_timestamp()?)
    }

    fn into_value(self) -> Value {
        Value::Timestamp(self)
    }
}

impl<T: Typed> Typed for Option<T> {
    fn value_type() -> Type {
        Type::optional(T::value_type())
    }

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            v => Ok(Some(T::from_value(v)?)),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::Null,
        }
    }
}

impl<T: Typed> Typed for Vec<T> {
    fn value_type() -> Type {
        Type::array(T::value_type())
    }

    fn from_value(value: &Value) -> Result<Self> {
        value.as_array()?.iter().map(T::from_value).collect()
    }

    fn into_value(self) -> Value {
        Value::from(self.into_iter().map(T::into_value).collect::<Vec<_>>())
    }
}

impl<K: Typed + Ord, V: Typed> Typed for BTreeMap<K, V> {
    fn value_type() -> Type {
        Type::map(K::value_type(), V::value_type())
    }

    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_map()?
            .iter()
            .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
            .collect()
    }

    fn into_value(self) -> Value {
        Value::from(
            self.into_iter()
                .map(|(k, v)| (k.into_value(), v.into_value()))
                .collect::<BTreeMap<_, _>>(),
        )
    }
}
