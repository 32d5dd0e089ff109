// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::directives::Handler;
use crate::engine::Engine;
use crate::error::SetupError;
use crate::parser::{self, FieldSite};
use crate::traversal::StructHook;
use crate::typing::Type;
use crate::value::{Record, Value};
use crate::Rc;

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::collections::BTreeMap;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, MutexGuard};

/// Operation performed by a node of a directive chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DirectiveKind {
    /// Invoke the bound handler.
    Default,
    OmitEmpty,
    NoStructLevel,
    StructOnly,
    Dive,
    /// Try each alternative until one succeeds.
    Or,
    Exists,
}

/// One step of a parsed directive chain.
#[derive(Clone)]
pub struct DirectiveNode {
    kind: DirectiveKind,
    // Name reported in errors: the alias when expanded from one.
    tag: Rc<str>,
    actual_tag: Rc<str>,
    has_alias: bool,
    param: Rc<str>,
    handler: Option<Handler>,
    alternatives: Vec<DirectiveNode>,
}

impl DirectiveNode {
    pub(crate) fn marker(kind: DirectiveKind, name: &str, alias: Option<&str>) -> Self {
        Self {
            kind,
            tag: alias.unwrap_or(name).into(),
            actual_tag: name.into(),
            has_alias: alias.is_some(),
            param: "".into(),
            handler: None,
            alternatives: vec![],
        }
    }

    pub(crate) fn handler(name: &str, alias: Option<&str>, param: Rc<str>, handler: Handler) -> Self {
        Self {
            kind: DirectiveKind::Default,
            tag: alias.unwrap_or(name).into(),
            actual_tag: name.into(),
            has_alias: alias.is_some(),
            param,
            handler: Some(handler),
            alternatives: vec![],
        }
    }

    pub(crate) fn or_group(joined: &str, alias: Option<&str>, alternatives: Vec<DirectiveNode>) -> Self {
        Self {
            kind: DirectiveKind::Or,
            tag: alias.unwrap_or(joined).into(),
            actual_tag: joined.into(),
            has_alias: alias.is_some(),
            param: "".into(),
            handler: None,
            alternatives,
        }
    }

    pub fn kind(&self) -> DirectiveKind {
        self.kind
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn actual_tag(&self) -> &str {
        &self.actual_tag
    }

    pub fn has_alias(&self) -> bool {
        self.has_alias
    }

    pub fn param(&self) -> &str {
        &self.param
    }

    pub fn alternatives(&self) -> &[DirectiveNode] {
        &self.alternatives
    }

    pub(crate) fn bound_handler(&self) -> Option<&Handler> {
        self.handler.as_ref()
    }
}

impl fmt::Debug for DirectiveNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("DirectiveNode");
        s.field("kind", &self.kind)
            .field("tag", &self.tag)
            .field("actual_tag", &self.actual_tag)
            .field("param", &self.param);
        if !self.alternatives.is_empty() {
            s.field("alternatives", &self.alternatives);
        }
        s.finish()
    }
}

/// A field of a struct type together with its parsed directive chain.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    index: usize,
    name: Rc<str>,
    alt_name: Rc<str>,
    field_type: Type,
    chain: Vec<DirectiveNode>,
}

impl FieldDescriptor {
    /// Position of the field in its schema.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display name used in name namespaces.
    pub fn alt_name(&self) -> &str {
        &self.alt_name
    }

    pub fn field_type(&self) -> &Type {
        &self.field_type
    }

    pub fn chain(&self) -> &[DirectiveNode] {
        &self.chain
    }
}

/// Everything the engine needs to process one struct type. Built once per
/// type and shared by all later traversals.
#[derive(Clone)]
pub struct StructDescriptor {
    name: Rc<str>,
    fields: Vec<FieldDescriptor>,
    hook: Option<StructHook>,
}

impl StructDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn has_hook(&self) -> bool {
        self.hook.is_some()
    }

    pub(crate) fn hook(&self) -> Option<&StructHook> {
        self.hook.as_ref()
    }
}

impl fmt::Debug for StructDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructDescriptor")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("has_hook", &self.hook.is_some())
            .finish()
    }
}

type Descriptors = BTreeMap<Rc<str>, Rc<StructDescriptor>>;

/// Copy-on-write map of built descriptors.
///
/// Readers load the current snapshot without locking. Builders serialize on
/// `build_lock` and swap in a new snapshot containing their entry.
#[derive(Default)]
pub(crate) struct StructCache {
    pub(crate) build_lock: Mutex<()>,
    snapshot: ArcSwap<Descriptors>,
    builds: AtomicUsize,
}

impl StructCache {
    pub(crate) fn get(&self, name: &str) -> Option<Rc<StructDescriptor>> {
        self.snapshot.load().get(name).cloned()
    }

    // The guard proves the caller holds `build_lock`, so no concurrent
    // publish can be lost between the load and the store.
    fn publish(&self, _guard: &MutexGuard<'_, ()>, descriptor: Rc<StructDescriptor>) {
        let mut next = Descriptors::clone(&self.snapshot.load());
        next.insert(descriptor.name.clone(), descriptor);
        self.snapshot.store(Rc::new(next));
        self.builds.fetch_add(1, Ordering::SeqCst);
    }

    // Drop every descriptor. The build counter keeps counting.
    pub(crate) fn clear(&mut self) {
        self.snapshot.store(Rc::default());
    }

    pub(crate) fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl Engine {
    /// Descriptor of the record's type, built on first use.
    pub(crate) fn struct_descriptor(
        &self,
        record: &Record,
        ctx: Option<&Value>,
    ) -> Result<Rc<StructDescriptor>, SetupError> {
        let name = record.type_name();
        if let Some(descriptor) = self.cache().get(name) {
            tracing::trace!(type_name = name, "struct descriptor cache hit");
            return Ok(descriptor);
        }

        let guard = self.cache().build_lock.lock();
        // Another thread may have finished the build while we waited.
        if let Some(descriptor) = self.cache().get(name) {
            return Ok(descriptor);
        }

        let descriptor = Rc::new(self.build_descriptor(record, ctx)?);
        self.cache().publish(&guard, descriptor.clone());
        tracing::debug!(
            type_name = name,
            fields = descriptor.fields.len(),
            hook = descriptor.hook.is_some(),
            "built struct descriptor"
        );
        Ok(descriptor)
    }

    fn build_descriptor(
        &self,
        record: &Record,
        ctx: Option<&Value>,
    ) -> Result<StructDescriptor, SetupError> {
        let schema = self
            .schema(record.type_name())
            .ok_or_else(|| SetupError::UnknownType(record.type_name().to_string()))?;

        let mut fields = Vec::with_capacity(schema.fields.len());
        for (index, field) in schema.fields.iter().enumerate() {
            let directives = field.tag_value(&self.config().tag_name).unwrap_or("");
            if directives == parser::SKIP {
                continue;
            }

            let alt_name = match &self.config().field_name_tag {
                Some(tag) => field
                    .tag_value(tag)
                    .and_then(|v| v.split(',').next())
                    .filter(|n| !n.is_empty() && *n != parser::SKIP)
                    .map(Rc::from)
                    .unwrap_or_else(|| field.name.clone()),
                None => field.name.clone(),
            };

            let chain = if directives.is_empty() {
                vec![]
            } else {
                let value = record
                    .get(&field.name)
                    .cloned()
                    .unwrap_or_else(|| field.field_type.zero_value());
                let site = FieldSite {
                    engine: self,
                    schema,
                    record,
                    field_name: &field.name,
                    field_type: &field.field_type,
                    value: &value,
                    ctx,
                };
                parser::parse_chain(&site, directives)?
            };

            fields.push(FieldDescriptor {
                index,
                name: field.name.clone(),
                alt_name,
                field_type: field.field_type.clone(),
                chain,
            });
        }

        Ok(StructDescriptor {
            name: schema.name.clone(),
            fields,
            hook: self.struct_hook(&schema.name),
        })
    }
}
