// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::directives::{BuiltinDirective, DirectiveInit, Handler, HandlerState};
use crate::error::{ResolverFault, SetupError};
use crate::resolver::{self, Arg, Binding, ResolveContext, Resolver, Slot};
use crate::value::Value;
use crate::Rc;

use core::panic::AssertUnwindSafe;
use std::collections::BTreeMap;
use std::panic;

use anyhow::{anyhow, bail, Context, Result};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CHANNEL_PREFIX: Result<Regex, regex::Error> = Regex::new(r"^@(\w+):");
}

pub fn register(m: &mut BTreeMap<&'static str, BuiltinDirective>) {
    m.insert("by", by_directive);
}

/// Split an optional `@channel:` prefix off a `by` parameter.
pub fn split_channel(param: &str) -> Result<(Option<&str>, &str)> {
    let re = CHANNEL_PREFIX
        .as_ref()
        .map_err(|e| anyhow!("invalid channel pattern: {e}"))?;
    Ok(match re.captures(param) {
        Some(caps) => match (caps.get(0), caps.get(1)) {
            (Some(whole), Some(name)) => (Some(name.as_str()), &param[whole.end()..]),
            _ => (None, param),
        },
        None => (None, param),
    })
}

/// `by=[@channel:]path1,path2`.
///
/// Binds the field to the first registered resolver whose parameters accept
/// the types of the named sibling fields and whose result fits the field.
fn by_directive(init: &DirectiveInit) -> Result<Handler> {
    let (channel, rest) = split_channel(init.param)?;
    let paths: Vec<Rc<str>> = if rest.is_empty() {
        vec![]
    } else {
        rest.split(',').map(Rc::from).collect()
    };

    let mut sibling_types = Vec::with_capacity(paths.len());
    for path in &paths {
        match init.engine.lookup_record(init.current_struct, path) {
            Some((_, t)) => sibling_types.push(t),
            None => {
                return Err(SetupError::UnresolvedPath {
                    type_name: init.schema.name.to_string(),
                    field: init.field_name.to_string(),
                    param: init.param.to_string(),
                    path: path.to_string(),
                }
                .into())
            }
        }
    }

    let Some(binding) = init
        .engine
        .resolvers()
        .find(channel, &sibling_types, init.field_type)
    else {
        return Err(SetupError::NoResolver {
            type_name: init.schema.name.to_string(),
            field: init.field_name.to_string(),
            param: init.param.to_string(),
            signature: resolver::describe_call(&sibling_types, init.field_type),
        }
        .into());
    };

    tracing::debug!(
        type_name = %init.schema.name,
        field = init.field_name,
        resolver = binding.index,
        signature = %binding.resolver.signature,
        "bound resolver"
    );
    Ok(bound_handler(binding, paths))
}

fn bound_handler(binding: Binding, paths: Vec<Rc<str>>) -> Handler {
    let Binding {
        slots, resolver, ..
    } = binding;
    Rc::new(move |state: &HandlerState| -> Result<Value> {
        let mut args = Vec::with_capacity(slots.len());
        for (idx, slot) in slots.iter().enumerate() {
            args.push(match slot {
                Slot::Context => Arg::Context(ResolveContext::from_state(state)),
                Slot::Sibling(s) => {
                    let path = &paths[*s];
                    let (value, _) = state
                        .engine
                        .lookup_record(state.current_struct, path)
                        .ok_or_else(|| anyhow!("get field {path} error"))
                        .with_context(|| {
                            format!(
                                "make resolver param {idx} [{}] error",
                                resolver.signature.inputs[idx]
                            )
                        })?;
                    Arg::Value(value)
                }
            });
        }
        invoke(&resolver, args)
    })
}

// Panics raised by a resolver stop here and become a ResolverFault.
fn invoke(resolver: &Resolver, args: Vec<Arg>) -> Result<Value> {
    match panic::catch_unwind(AssertUnwindSafe(|| (resolver.call)(args))) {
        Ok(result) => result,
        Err(payload) => {
            let message = match payload.downcast_ref::<&str>() {
                Some(s) => s.to_string(),
                None => match payload.downcast_ref::<String>() {
                    Some(s) => s.clone(),
                    None => "unknown panic payload".to_string(),
                },
            };
            tracing::error!(
                signature = %resolver.signature,
                message = %message,
                "resolver panicked"
            );
            bail!(ResolverFault { message })
        }
    }
}
