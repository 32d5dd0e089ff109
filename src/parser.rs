// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::cache::{DirectiveKind, DirectiveNode};
use crate::directives::DirectiveInit;
use crate::engine::Engine;
use crate::error::SetupError;
use crate::schema::StructSchema;
use crate::typing::Type;
use crate::value::{Record, Value};
use crate::Rc;

pub const DIRECTIVE_SEPARATOR: char = ';';
pub const OR_SEPARATOR: char = '|';
pub const PARAM_SEPARATOR: char = '=';

pub const SKIP: &str = "-";
pub const DIVE: &str = "dive";
pub const OMITEMPTY: &str = "omitempty";
pub const EXISTS: &str = "exists";
pub const STRUCT_ONLY: &str = "structonly";
pub const NO_STRUCT_LEVEL: &str = "nostructlevel";

const COMMA_PLACEHOLDER: &str = "0x2C";
const PIPE_PLACEHOLDER: &str = "0x7C";

// Aliases may refer to other aliases; a longer chain is a loop.
const MAX_ALIAS_DEPTH: usize = 32;

/// Names reserved by the grammar. They cannot be registered as directives or
/// aliases.
pub(crate) fn is_restricted(name: &str) -> bool {
    matches!(
        name,
        SKIP | DIVE | OMITEMPTY | EXISTS | STRUCT_ONLY | NO_STRUCT_LEVEL
    )
}

/// Decode the `0x2C` and `0x7C` placeholders used to write `,` and `|`
/// inside a parameter.
pub(crate) fn decode_param(raw: &str) -> String {
    raw.replace(COMMA_PLACEHOLDER, ",")
        .replace(PIPE_PLACEHOLDER, "|")
}

fn marker_kind(segment: &str) -> Option<DirectiveKind> {
    Some(match segment {
        DIVE => DirectiveKind::Dive,
        OMITEMPTY => DirectiveKind::OmitEmpty,
        EXISTS => DirectiveKind::Exists,
        STRUCT_ONLY => DirectiveKind::StructOnly,
        NO_STRUCT_LEVEL => DirectiveKind::NoStructLevel,
        _ => return None,
    })
}

/// The field whose directive string is being parsed.
pub(crate) struct FieldSite<'a> {
    pub engine: &'a Engine,
    pub schema: &'a StructSchema,
    pub record: &'a Record,
    pub field_name: &'a str,
    pub field_type: &'a Type,
    pub value: &'a Value,
    pub ctx: Option<&'a Value>,
}

impl FieldSite<'_> {
    fn invalid(&self, reason: impl Into<String>) -> SetupError {
        SetupError::InvalidDirective {
            type_name: self.schema.name.to_string(),
            field: self.field_name.to_string(),
            reason: reason.into(),
        }
    }
}

// Parsing state that changes as the chain advances: after a dive the
// remaining directives apply to elements.
struct Cursor {
    item_type: Type,
    item_value: Value,
}

/// Parse a field's directive string into a chain of nodes, binding a handler
/// for every concrete directive.
pub(crate) fn parse_chain(
    site: &FieldSite,
    directives: &str,
) -> Result<Vec<DirectiveNode>, SetupError> {
    let mut chain = vec![];
    let mut cursor = Cursor {
        item_type: site.field_type.clone(),
        item_value: site.value.clone(),
    };
    parse_into(site, directives, None, &mut cursor, &mut chain, 0)?;
    Ok(chain)
}

fn parse_into(
    site: &FieldSite,
    directives: &str,
    alias: Option<&str>,
    cursor: &mut Cursor,
    chain: &mut Vec<DirectiveNode>,
    depth: usize,
) -> Result<(), SetupError> {
    if depth > MAX_ALIAS_DEPTH {
        return Err(site.invalid(format!(
            "alias expansion of `{}` does not terminate",
            alias.unwrap_or(directives)
        )));
    }

    for segment in directives.split(DIRECTIVE_SEPARATOR) {
        if let Some(expanded) = site.engine.aliases().get(segment) {
            parse_into(site, expanded, Some(segment), cursor, chain, depth + 1)?;
            continue;
        }

        if let Some(kind) = marker_kind(segment) {
            if kind == DirectiveKind::Dive {
                let Some(element_type) = cursor.item_type.element_type() else {
                    return Err(site.invalid(format!(
                        "dive applied to a field of type {}, expected an array or a map",
                        cursor.item_type
                    )));
                };
                cursor.item_type = element_type.clone();
                cursor.item_value = cursor.item_type.zero_value();
            }
            chain.push(DirectiveNode::marker(kind, segment, alias));
            continue;
        }

        let mut alternatives = vec![];
        for alternative in segment.split(OR_SEPARATOR) {
            let (name, raw_param) = alternative
                .split_once(PARAM_SEPARATOR)
                .unwrap_or((alternative, ""));
            if name.is_empty() {
                return Err(site.invalid(format!("empty directive name in `{segment}`")));
            }
            if is_restricted(name) {
                return Err(site.invalid(format!(
                    "`{name}` takes no parameter and cannot be part of an or-group"
                )));
            }
            alternatives.push(bind(site, cursor, name, raw_param, alias)?);
        }

        if alternatives.len() == 1 {
            chain.extend(alternatives);
        } else {
            let joined = alternatives
                .iter()
                .map(|n| n.actual_tag().to_string())
                .collect::<Vec<_>>()
                .join("|");
            chain.push(DirectiveNode::or_group(&joined, alias, alternatives));
        }
    }
    Ok(())
}

fn bind(
    site: &FieldSite,
    cursor: &Cursor,
    name: &str,
    raw_param: &str,
    alias: Option<&str>,
) -> Result<DirectiveNode, SetupError> {
    let Some(factory) = site.engine.directives().get(name) else {
        return Err(SetupError::UndefinedDirective {
            type_name: site.schema.name.to_string(),
            field: site.field_name.to_string(),
            directive: name.to_string(),
        });
    };

    let param = decode_param(raw_param);
    let init = DirectiveInit {
        engine: site.engine,
        schema: site.schema,
        current_struct: site.record,
        field_name: site.field_name,
        field_type: &cursor.item_type,
        field: &cursor.item_value,
        param: &param,
        raw_param,
        ctx: site.ctx,
    };

    let handler = factory(&init).map_err(|e| match e.downcast::<SetupError>() {
        Ok(setup) => setup,
        Err(source) => SetupError::Directive {
            type_name: site.schema.name.to_string(),
            field: site.field_name.to_string(),
            directive: name.to_string(),
            source,
        },
    })?;

    Ok(DirectiveNode::handler(name, alias, Rc::from(param.as_str()), handler))
}
