// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::directives::utils::{ensure_param, ensure_value_type, parse_indirect, Indirect};
use crate::directives::{BuiltinDirective, DirectiveInit, Handler, HandlerState};
use crate::value::Value;
use crate::Rc;

use std::collections::BTreeMap;

use anyhow::{Context, Result};

pub fn register(m: &mut BTreeMap<&'static str, BuiltinDirective>) {
    m.insert("default", default_directive);
}

// `default=literal`, `default=fn@name` or `default=var@name`. Applied only
// while the field is empty.
fn default_directive(init: &DirectiveInit) -> Result<Handler> {
    ensure_param("default", init.param)?;
    let field_type = init.field_type.clone();

    match parse_indirect(init.engine, init.param)? {
        Indirect::Func(f) => Ok(Rc::new(move |state: &HandlerState| -> Result<Value> {
            if !state.field.is_empty() {
                return Ok(state.field.clone());
            }
            let value = f();
            ensure_value_type("default", &field_type, &value)?;
            Ok(value)
        })),
        Indirect::Var(v) => {
            ensure_value_type("default", &field_type, &v)?;
            Ok(fill_empty((*v).clone()))
        }
        Indirect::Literal(text) => {
            let value = field_type
                .parse_literal(text)
                .with_context(|| format!("invalid default for field `{}`", init.field_name))?;
            Ok(fill_empty(value))
        }
    }
}

fn fill_empty(value: Value) -> Handler {
    Rc::new(move |state: &HandlerState| -> Result<Value> {
        Ok(if state.field.is_empty() {
            value.clone()
        } else {
            state.field.clone()
        })
    })
}
