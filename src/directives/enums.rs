// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::directives::utils::{
    ensure_param, ensure_string_collection, ensure_string_type, parse_indirect, Indirect,
};
use crate::directives::{BuiltinDirective, DirectiveInit, Handler, HandlerState};
use crate::parser::decode_param;
use crate::value::Value;
use crate::Rc;

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};

pub fn register(m: &mut BTreeMap<&'static str, BuiltinDirective>) {
    m.insert("enum", enum_directive);
}

/// `enum=a,b,c` or `enum=var@name`.
///
/// The field must hold one of the members. An empty field takes the first
/// member.
fn enum_directive(init: &DirectiveInit) -> Result<Handler> {
    ensure_string_type("enum", init.field_type)?;
    let raw = ensure_param("enum", init.raw_param)?;

    let members: Vec<Rc<str>> = match parse_indirect(init.engine, raw)? {
        Indirect::Literal(list) => list.split(',').map(|m| decode_param(m).into()).collect(),
        Indirect::Var(v) => ensure_string_collection("enum", &v)?,
        Indirect::Func(_) => bail!("`enum` does not accept a function parameter"),
    };
    let Some(first) = members.first().cloned() else {
        bail!("`enum` requires at least one member");
    };
    let allowed: BTreeSet<Rc<str>> = members.into_iter().collect();

    Ok(Rc::new(move |state: &HandlerState| -> Result<Value> {
        let current = match state.field {
            Value::String(s) => &**s,
            Value::Null => "",
            v => bail!("`enum` expects a string. Got `{v}` instead"),
        };
        if allowed.contains(current) {
            return Ok(state.field.clone());
        }
        if current.is_empty() {
            return Ok(Value::String(first.clone()));
        }
        bail!("[{current}] is not valid option")
    }))
}
