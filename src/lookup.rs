// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Namespace addressing.
//!
//! Resolves paths such as `C.Username`, `Items[2].Name` or `Mp[a]` against a
//! live object graph. Struct fields that are not stored read as the zero value
//! of their declared type. Map keys are written as text and coerced with the
//! declared key type.

use crate::engine::Engine;
use crate::number::Number;
use crate::typing::Type;
use crate::value::{Record, Value};
use crate::Rc;

impl Type {
    /// Dynamic type of a value stored in an `Any` slot.
    pub fn of(value: &Value) -> Type {
        match value {
            Value::Null => Type::Any,
            Value::Bool(_) => Type::Bool,
            Value::Number(Number::Int(_)) => Type::Int,
            Value::Number(Number::UInt(_)) => Type::UInt,
            Value::Number(Number::Float(_)) => Type::Float,
            Value::String(_) => Type::String,
            Value::Timestamp(_) => Type::Timestamp,
            Value::Array(_) => Type::array(Type::Any),
            Value::Map(_) => Type::map(Type::Any, Type::Any),
            Value::Struct(r) => Type::record(r.type_name()),
        }
    }
}

// Peel optional and dynamic layers off a present value. Null keeps its
// declared type.
fn deref(value: &Value, declared: Type) -> Type {
    if value.is_null() {
        return declared;
    }
    match declared {
        Type::Optional { item_type } => deref(value, *item_type),
        Type::Any => Type::of(value),
        t => t,
    }
}

impl Engine {
    /// Resolve `namespace` starting at `current`.
    ///
    /// Returns the value found and its type. An empty namespace returns
    /// `current` itself. `None` means the path does not address anything:
    /// an unknown field, an index out of range, a missing map key or a
    /// segment applied to a scalar.
    pub fn get_field(&self, current: &Value, namespace: &str) -> Option<(Value, Type)> {
        self.walk(current.clone(), Type::of(current), namespace)
    }

    pub(crate) fn lookup_record(&self, record: &Record, namespace: &str) -> Option<(Value, Type)> {
        let (name, rest) = split_field(namespace);
        let field = self.schema(record.type_name())?.get(name)?;
        let value = record
            .get(name)
            .cloned()
            .unwrap_or_else(|| field.field_type.zero_value());
        self.walk(value, field.field_type.clone(), rest)
    }

    fn walk(&self, current: Value, declared: Type, namespace: &str) -> Option<(Value, Type)> {
        let current_type = deref(&current, declared);
        if namespace.is_empty() {
            return Some((current, current_type));
        }

        match &current {
            Value::Struct(record) => self.lookup_record(record, namespace),
            Value::Array(items) => {
                let (key, rest) = split_index(namespace)?;
                let idx: usize = key.parse().ok()?;
                let item = items.get(idx)?.clone();
                let item_type = current_type.element_type().cloned().unwrap_or(Type::Any);
                self.walk(item, item_type, rest)
            }
            Value::Map(entries) => {
                let (key, rest) = split_index(namespace)?;
                let (key_type, value_type) = match current_type {
                    Type::Map {
                        key_type,
                        value_type,
                    } => (*key_type, *value_type),
                    _ => (Type::Any, Type::Any),
                };
                let key = coerce_key(&key_type, key, entries.keys().next())?;
                let item = entries.get(&key)?.clone();
                self.walk(item, value_type, rest)
            }
            _ => None,
        }
    }
}

// `Name.rest`, `Name[0].rest` -> ("Name", ".rest" without the dot | "[0].rest")
fn split_field(namespace: &str) -> (&str, &str) {
    match namespace.find(['.', '[']) {
        Some(idx) => {
            let (name, rest) = namespace.split_at(idx);
            (name, rest.strip_prefix('.').unwrap_or(rest))
        }
        None => (namespace, ""),
    }
}

// `[key].rest` -> ("key", "rest")
fn split_index(namespace: &str) -> Option<(&str, &str)> {
    let inner = namespace.strip_prefix('[')?;
    let end = inner.find(']')?;
    let rest = &inner[end + 1..];
    Some((&inner[..end], rest.strip_prefix('.').unwrap_or(rest)))
}

fn coerce_key(key_type: &Type, text: &str, sample: Option<&Value>) -> Option<Value> {
    match key_type.inner() {
        // Keys of a dynamic map are matched by the kind of the stored keys.
        Type::Any => match sample {
            Some(v) if !matches!(v, Value::String(_)) => Type::of(v).parse_literal(text).ok(),
            _ => Some(Value::String(Rc::from(text))),
        },
        t => t.parse_literal(text).ok(),
    }
}
