// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

pub mod by;
pub mod defaults;
pub mod enums;
pub mod utils;

use crate::engine::Engine;
use crate::schema::StructSchema;
use crate::typing::Type;
use crate::value::{Record, Value};
use crate::Rc;

use std::collections::BTreeMap;

use anyhow::Result;
use lazy_static::lazy_static;

/// Everything a directive factory sees when a directive occurrence is bound
/// to a field.
pub struct DirectiveInit<'a> {
    pub engine: &'a Engine,
    pub schema: &'a StructSchema,
    /// The record used to build the descriptor.
    pub current_struct: &'a Record,
    pub field_name: &'a str,
    /// Declared type of the value the handler will receive. After `dive` this
    /// is the element type.
    pub field_type: &'a Type,
    pub field: &'a Value,
    /// Parameter with `0x2C` and `0x7C` decoded.
    pub param: &'a str,
    pub raw_param: &'a str,
    pub ctx: Option<&'a Value>,
}

/// Per call state passed to a bound handler.
pub struct HandlerState<'a> {
    pub engine: &'a Engine,
    pub current_struct: &'a Record,
    pub field: &'a Value,
    pub field_type: &'a Type,
    pub param: &'a str,
    pub ctx: Option<&'a Value>,
}

impl HandlerState<'_> {
    /// Look up a key of the context bag.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self.ctx? {
            Value::Map(m) => m.get(&Value::from(key)),
            Value::Struct(r) => r.get(key),
            _ => None,
        }
    }
}

/// Closure bound once per directive occurrence. Returns the new field value.
pub type Handler = Rc<dyn Fn(&HandlerState) -> Result<Value> + Send + Sync>;

/// Binds a directive occurrence to a field.
pub type DirectiveFactory = dyn Fn(&DirectiveInit) -> Result<Handler> + Send + Sync;

pub type BuiltinDirective = fn(&DirectiveInit) -> Result<Handler>;

#[rustfmt::skip]
lazy_static! {
    pub static ref BUILTINS: BTreeMap<&'static str, BuiltinDirective> = {
	let mut m: BTreeMap<&'static str, BuiltinDirective> = BTreeMap::new();

	by::register(&mut m);
	defaults::register(&mut m);
	enums::register(&mut m);

	m
    };
}
