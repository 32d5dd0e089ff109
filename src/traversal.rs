// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::cache::{DirectiveKind, DirectiveNode};
use crate::directives::HandlerState;
use crate::engine::Engine;
use crate::error::{FieldError, InjectError};
use crate::typing::Type;
use crate::value::{Record, Value};
use crate::Rc;

use std::collections::{BTreeMap, BTreeSet};
use std::mem;

use anyhow::{anyhow, Result};

/// State handed to a struct level hook after the fields of a struct have
/// been processed.
pub struct StructLevel<'a> {
    pub engine: &'a Engine,
    /// The object passed to the traversal with every change made so far,
    /// including those to `current`.
    pub top: &'a Value,
    pub current: &'a mut Record,
    /// Namespace prefix of the current struct, e.g. `Order.Items[0].`
    pub namespace: &'a str,
    /// Same prefix built from display names.
    pub name_namespace: &'a str,
    pub ctx: Option<&'a Value>,
}

/// Hook run once per struct instance of the types it is registered for.
pub type StructHook = Rc<dyn Fn(&mut StructLevel) -> Result<()> + Send + Sync>;

/// Restricts a traversal to part of the object graph.
#[derive(Debug, Clone)]
pub(crate) enum Filter {
    Include(BTreeSet<String>),
    Exclude(BTreeSet<String>),
}

impl Filter {
    /// Include every listed path and all of its ancestors.
    pub(crate) fn include(root: &str, paths: &[&str]) -> Self {
        let mut keys = BTreeSet::new();
        for path in paths {
            let mut key = format!("{root}.");
            for segment in path.split('.') {
                let mut s = segment;
                while let Some(open) = s.find('[') {
                    key.push_str(&s[..open]);
                    keys.insert(key.clone());
                    let Some(close) = s[open..].find(']') else {
                        break;
                    };
                    key.push_str(&s[open..open + close + 1]);
                    keys.insert(key.clone());
                    s = &s[open + close + 1..];
                }
                key.push_str(s);
                keys.insert(key.clone());
                key.push('.');
            }
        }
        Filter::Include(keys)
    }

    pub(crate) fn exclude(root: &str, paths: &[&str]) -> Self {
        Filter::Exclude(paths.iter().map(|p| format!("{root}.{p}")).collect())
    }

    fn skips(&self, key: &str) -> bool {
        match self {
            Filter::Include(keys) => !keys.contains(key),
            Filter::Exclude(keys) => keys.contains(key),
        }
    }
}

// Position of a field in the object graph, used for error namespaces.
struct Location<'a> {
    namespace: &'a str,
    name_namespace: &'a str,
    field: String,
    name: String,
}

impl Location<'_> {
    fn path(&self) -> String {
        format!("{}{}", self.namespace, self.field)
    }

    fn name_path(&self) -> String {
        format!("{}{}", self.name_namespace, self.name)
    }

    fn element(&self, suffix: &str) -> Location<'_> {
        Location {
            namespace: self.namespace,
            name_namespace: self.name_namespace,
            field: format!("{}{suffix}", self.field),
            name: format!("{}{suffix}", self.name),
        }
    }
}

// A value is moved out of its container while it is walked. Each frame
// remembers the container and the slot it came from.
enum Hole<'a> {
    Field(&'a Record, &'a str),
    Index(&'a [Value], usize),
    Key(&'a BTreeMap<Value, Value>, &'a Value),
}

pub(crate) struct Frame<'a> {
    hole: Hole<'a>,
    parent: Option<&'a Frame<'a>>,
}

impl Frame<'_> {
    /// Rebuild the root with `value` put back into this hole and every hole
    /// above it.
    fn rebuild(&self, value: Value) -> Value {
        let filled = match &self.hole {
            Hole::Field(record, name) => {
                let mut record = (*record).clone();
                record.set(name, value);
                Value::from(record)
            }
            Hole::Index(items, idx) => {
                let mut items = items.to_vec();
                if let Some(slot) = items.get_mut(*idx) {
                    *slot = value;
                }
                Value::from(items)
            }
            Hole::Key(entries, key) => {
                let mut entries = (*entries).clone();
                entries.insert((*key).clone(), value);
                Value::from(entries)
            }
        };
        match self.parent {
            Some(parent) => parent.rebuild(filled),
            None => filled,
        }
    }
}

/// One traversal over one object graph.
pub(crate) struct Walker<'a> {
    pub engine: &'a Engine,
    pub filter: Option<&'a Filter>,
    pub ctx: Option<&'a Value>,
}

impl Walker<'_> {
    pub(crate) fn traverse_struct(
        &self,
        record: &mut Record,
        namespace: &str,
        name_namespace: &str,
        struct_only: bool,
        frame: Option<&Frame<'_>>,
        depth: usize,
    ) -> Result<(), InjectError> {
        let descriptor = self.engine.struct_descriptor(record, self.ctx)?;

        if !struct_only {
            for field in descriptor.fields() {
                if let Some(filter) = self.filter {
                    if filter.skips(&format!("{namespace}{}", field.name())) {
                        continue;
                    }
                }

                // Absent fields are walked as their zero value and only
                // stored if something changed them.
                let (mut value, zero) = match record.get_mut(field.name()) {
                    Some(slot) => (mem::replace(slot, Value::Null), None),
                    None => {
                        let zero = field.field_type().zero_value();
                        (zero.clone(), Some(zero))
                    }
                };
                let location = Location {
                    namespace,
                    name_namespace,
                    field: field.name().to_string(),
                    name: field.alt_name().to_string(),
                };
                let here = Frame {
                    hole: Hole::Field(&*record, field.name()),
                    parent: frame,
                };
                let result = self.traverse_field(
                    &*record,
                    &mut value,
                    field.field_type(),
                    &location,
                    field.chain(),
                    &here,
                    depth,
                );
                // Nested changes made before a failure are kept.
                if zero.as_ref() != Some(&value) {
                    record.set(field.name(), value);
                }
                result?;
            }
        }

        if let Some(hook) = descriptor.hook() {
            let snapshot = Value::from(record.clone());
            let top = match frame {
                Some(frame) => frame.rebuild(snapshot),
                None => snapshot,
            };
            let mut level = StructLevel {
                engine: self.engine,
                top: &top,
                current: &mut *record,
                namespace,
                name_namespace,
                ctx: self.ctx,
            };
            if let Err(cause) = hook(&mut level) {
                return Err(FieldError {
                    namespace: namespace.trim_end_matches('.').to_string(),
                    name_namespace: name_namespace.trim_end_matches('.').to_string(),
                    field: descriptor.name().to_string(),
                    name: descriptor.name().to_string(),
                    tag: "structlevel".to_string(),
                    actual_tag: "structlevel".to_string(),
                    param: String::new(),
                    value: Value::from(record.clone()),
                    value_type: Type::record(descriptor.name()),
                    cause,
                }
                .into());
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn traverse_field(
        &self,
        owner: &Record,
        value: &mut Value,
        field_type: &Type,
        location: &Location,
        chain: &[DirectiveNode],
        frame: &Frame<'_>,
        depth: usize,
    ) -> Result<(), InjectError> {
        if depth >= self.engine.config().max_depth {
            return Err(self.field_error(
                location,
                "",
                "",
                "",
                value,
                field_type,
                anyhow!(
                    "maximum nesting depth of {} exceeded",
                    self.engine.config().max_depth
                ),
            ));
        }

        if let Value::Struct(nested) = value {
            if !chain.iter().any(|n| n.kind() == DirectiveKind::NoStructLevel) {
                let struct_only = chain.iter().any(|n| n.kind() == DirectiveKind::StructOnly);
                self.traverse_struct(
                    Rc::make_mut(nested),
                    &format!("{}.", location.path()),
                    &format!("{}.", location.name_path()),
                    struct_only,
                    Some(frame),
                    depth + 1,
                )?;
            }
        }

        for (idx, node) in chain.iter().enumerate() {
            match node.kind() {
                DirectiveKind::Exists | DirectiveKind::StructOnly | DirectiveKind::NoStructLevel => {}
                DirectiveKind::OmitEmpty => {
                    // A present optional is not omitted even if its content is empty.
                    if value.is_empty() && (!field_type.is_nullable() || value.is_null()) {
                        return Ok(());
                    }
                }
                DirectiveKind::Dive => {
                    return self.dive(
                        owner,
                        value,
                        field_type,
                        location,
                        &chain[idx + 1..],
                        frame,
                        depth,
                    );
                }
                DirectiveKind::Or => {
                    let mut last = None;
                    for alternative in node.alternatives() {
                        match self.call(owner, value, field_type, alternative) {
                            Ok(v) => {
                                *value = v;
                                last = None;
                                break;
                            }
                            Err(e) => last = Some(e),
                        }
                    }
                    if let Some(cause) = last {
                        return Err(self.field_error(
                            location,
                            node.tag(),
                            node.actual_tag(),
                            "",
                            value,
                            field_type,
                            cause,
                        ));
                    }
                }
                DirectiveKind::Default => match self.call(owner, value, field_type, node) {
                    Ok(v) => *value = v,
                    Err(cause) => {
                        return Err(self.field_error(
                            location,
                            node.tag(),
                            node.actual_tag(),
                            node.param(),
                            value,
                            field_type,
                            cause,
                        ))
                    }
                },
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn dive(
        &self,
        owner: &Record,
        value: &mut Value,
        field_type: &Type,
        location: &Location,
        rest: &[DirectiveNode],
        frame: &Frame<'_>,
        depth: usize,
    ) -> Result<(), InjectError> {
        let item_type = field_type.element_type().cloned().unwrap_or(Type::Any);
        match value {
            Value::Null => Ok(()),
            Value::Array(items) => {
                let items = Rc::make_mut(items);
                for idx in 0..items.len() {
                    let mut item = mem::replace(&mut items[idx], Value::Null);
                    let element = location.element(&format!("[{idx}]"));
                    let here = Frame {
                        hole: Hole::Index(&items[..], idx),
                        parent: Some(frame),
                    };
                    let result = self.traverse_field(
                        owner,
                        &mut item,
                        &item_type,
                        &element,
                        rest,
                        &here,
                        depth + 1,
                    );
                    items[idx] = item;
                    result?;
                }
                Ok(())
            }
            Value::Map(entries) => {
                let entries = Rc::make_mut(entries);
                let keys: Vec<Value> = entries.keys().cloned().collect();
                for key in &keys {
                    let Some(slot) = entries.get_mut(key) else {
                        continue;
                    };
                    let mut item = mem::replace(slot, Value::Null);
                    let element = location.element(&format!("[{}]", key.key_text()));
                    let here = Frame {
                        hole: Hole::Key(&*entries, key),
                        parent: Some(frame),
                    };
                    let result = self.traverse_field(
                        owner,
                        &mut item,
                        &item_type,
                        &element,
                        rest,
                        &here,
                        depth + 1,
                    );
                    entries.insert(key.clone(), item);
                    result?;
                }
                Ok(())
            }
            other => {
                let cause = anyhow!("dive error: can't dive on a non slice or map ({})", other.kind_name());
                Err(self.field_error(location, "dive", "dive", "", other, field_type, cause))
            }
        }
    }

    fn call(
        &self,
        owner: &Record,
        value: &Value,
        field_type: &Type,
        node: &DirectiveNode,
    ) -> Result<Value> {
        let Some(handler) = node.bound_handler() else {
            return Ok(value.clone());
        };
        let state = HandlerState {
            engine: self.engine,
            current_struct: owner,
            field: value,
            field_type,
            param: node.param(),
            ctx: self.ctx,
        };
        let result = handler(&state)?;
        if !field_type.accepts(&result) {
            return Err(anyhow!(
                "`{}` returned a {} for a field of type {field_type}",
                node.actual_tag(),
                result.kind_name()
            ));
        }
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn field_error(
        &self,
        location: &Location,
        tag: &str,
        actual_tag: &str,
        param: &str,
        value: &Value,
        field_type: &Type,
        cause: anyhow::Error,
    ) -> InjectError {
        FieldError {
            namespace: location.path(),
            name_namespace: location.name_path(),
            field: location.field.clone(),
            name: location.name.clone(),
            tag: tag.to_string(),
            actual_tag: actual_tag.to_string(),
            param: param.to_string(),
            value: value.clone(),
            value_type: field_type.clone(),
            cause,
        }
        .into()
    }
}
