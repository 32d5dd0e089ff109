// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::engine::{Engine, ValueFn};
use crate::typing::Type;
use crate::value::Value;
use crate::Rc;

use anyhow::{anyhow, bail, Result};

pub const FUNC_PREFIX: &str = "fn@";
pub const VAR_PREFIX: &str = "var@";

/// A directive parameter that is either written inline or names a registered
/// function or variable.
pub enum Indirect<'a> {
    Literal(&'a str),
    Func(Rc<ValueFn>),
    Var(Rc<Value>),
}

pub fn parse_indirect<'a>(engine: &Engine, param: &'a str) -> Result<Indirect<'a>> {
    if let Some(name) = param.strip_prefix(FUNC_PREFIX) {
        return match engine.funcs().get(name) {
            Some(f) => Ok(Indirect::Func(f.clone())),
            None => bail!("function `{name}` is not registered"),
        };
    }
    if let Some(name) = param.strip_prefix(VAR_PREFIX) {
        return match engine.vars().get(name) {
            Some(v) => Ok(Indirect::Var(v.clone())),
            None => bail!("variable `{name}` is not registered"),
        };
    }
    Ok(Indirect::Literal(param))
}

pub fn ensure_param<'a>(directive: &str, param: &'a str) -> Result<&'a str> {
    if param.is_empty() {
        bail!("`{directive}` requires a parameter");
    }
    Ok(param)
}

/// Accept `string` and optional string declarations.
pub fn ensure_string_type(directive: &str, t: &Type) -> Result<()> {
    match t.inner() {
        Type::String => Ok(()),
        other => bail!("`{directive}` applies to string fields, found {other}"),
    }
}

pub fn ensure_value_type(directive: &str, t: &Type, v: &Value) -> Result<()> {
    if !t.accepts(v) {
        bail!(
            "`{directive}` produced a {} which does not fit type {t}",
            v.kind_name()
        );
    }
    Ok(())
}

pub fn ensure_string_collection(directive: &str, v: &Value) -> Result<Vec<Rc<str>>> {
    let items = v
        .as_array()
        .map_err(|_| anyhow!("`{directive}` expects a string array. Got `{v}` instead"))?;
    items
        .iter()
        .enumerate()
        .map(|(idx, elem)| match elem {
            Value::String(s) => Ok(s.clone()),
            _ => Err(anyhow!(
                "`{directive}` expects string collection. Element {idx} is not a string."
            )),
        })
        .collect()
}
