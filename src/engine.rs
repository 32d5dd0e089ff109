// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::cache::{StructCache, StructDescriptor};
use crate::directives::{DirectiveFactory, DirectiveInit, Handler, BUILTINS};
use crate::error::{InjectError, SetupError};
use crate::registry::{validate_directive_name, validate_name, Registry, RegistryError};
use crate::resolver::{Arg, IntoResolver, Resolver, ResolverRegistry, ResolverSignature};
use crate::schema::StructSchema;
use crate::traversal::{Filter, StructHook, StructLevel, Walker};
use crate::typing::Type;
use crate::value::{Record, Value};
use crate::Rc;

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

/// Zero argument function usable from `default=fn@name`.
pub type ValueFn = dyn Fn() -> Value + Send + Sync;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Tag holding a field's directive string.
    pub tag_name: String,
    /// Tag whose first comma separated part gives a field's display name,
    /// e.g. `json`.
    pub field_name_tag: Option<String>,
    /// Maximum nesting of structs and containers visited by one traversal.
    pub max_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tag_name: "inject".to_string(),
            field_name_tag: None,
            max_depth: 64,
        }
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// The field population engine.
///
/// Registration methods take `&mut self` and traversal methods take `&self`,
/// so everything is registered before the engine is shared between threads.
/// Struct descriptors are built lazily on the first traversal of each type.
pub struct Engine {
    config: Config,
    schemas: Registry<StructSchema>,
    directives: Registry<DirectiveFactory>,
    aliases: Registry<String>,
    hooks: BTreeMap<Rc<str>, StructHook>,
    funcs: Registry<ValueFn>,
    vars: Registry<Value>,
    resolvers: ResolverRegistry,
    cache: StructCache,
}

/// Create an engine with the default configuration.
impl Default for Engine {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let mut directives: Registry<DirectiveFactory> = Registry::new("directives");
        for (name, f) in BUILTINS.iter() {
            let factory: Rc<DirectiveFactory> = Rc::new(*f);
            directives.insert(name, factory);
        }

        Self {
            config,
            schemas: Registry::new("schemas"),
            directives,
            aliases: Registry::new("aliases"),
            hooks: BTreeMap::new(),
            funcs: Registry::new("functions"),
            vars: Registry::new("variables"),
            resolvers: ResolverRegistry::default(),
            cache: StructCache::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // Registrations can change how a type is processed.
    fn invalidate(&mut self) {
        self.cache.clear();
    }

    /// Register a struct type.
    pub fn register_type(&mut self, schema: StructSchema) -> Result<(), RegistryError> {
        schema.validate()?;
        let name = schema.name.clone();
        self.schemas.register(&name, Rc::new(schema))?;
        self.invalidate();
        Ok(())
    }

    /// Register every schema in a json array.
    pub fn register_types_from_json(&mut self, json: &str) -> Result<()> {
        for schema in StructSchema::list_from_json_str(json)? {
            self.register_type(schema)?;
        }
        Ok(())
    }

    #[cfg(feature = "yaml")]
    pub fn register_types_from_yaml(&mut self, yaml: &str) -> Result<()> {
        for schema in StructSchema::list_from_yaml_str(yaml)? {
            self.register_type(schema)?;
        }
        Ok(())
    }

    pub fn schema(&self, name: &str) -> Option<&StructSchema> {
        self.schemas.get(name).map(|s| &**s)
    }

    /// Register a resolver usable by `by` directives. Returns its position in
    /// the resolver table.
    pub fn add_resolver<Args>(&mut self, f: impl IntoResolver<Args>) -> Result<usize, RegistryError> {
        self.add(None, f.into_resolver())
    }

    /// Register a resolver on a named channel, selected with `by=@channel:...`.
    pub fn add_resolver_with_name<Args>(
        &mut self,
        channel: &str,
        f: impl IntoResolver<Args>,
    ) -> Result<usize, RegistryError> {
        self.add(Some(channel), f.into_resolver())
    }

    /// Register a resolver with an explicit signature.
    ///
    /// `f` receives one [`Arg`] per input of the signature. `Type::Context`
    /// inputs receive [`Arg::Context`].
    pub fn add_dyn_resolver(
        &mut self,
        channel: Option<&str>,
        signature: ResolverSignature,
        f: impl Fn(Vec<Arg>) -> Result<Value> + Send + Sync + 'static,
    ) -> Result<usize, RegistryError> {
        self.add(channel, Resolver::new(signature, f))
    }

    fn add(&mut self, channel: Option<&str>, resolver: Resolver) -> Result<usize, RegistryError> {
        let index = self.resolvers.add(channel, resolver)?;
        self.invalidate();
        Ok(index)
    }

    pub fn resolver_count(&self) -> usize {
        self.resolvers.len()
    }

    /// Register a directive. A directive registered under an existing name
    /// replaces it, built-in directives included.
    pub fn register_directive(
        &mut self,
        name: &str,
        factory: impl Fn(&DirectiveInit) -> Result<Handler> + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        validate_directive_name(name, self.directives.name())?;
        if self.aliases.contains(name) {
            return Err(RegistryError::Collision {
                name: name.into(),
                registry: self.directives.name().into(),
                other: self.aliases.name().into(),
            });
        }
        let factory: Rc<DirectiveFactory> = Rc::new(factory);
        if self.directives.replace(name, factory)?.is_some() {
            tracing::warn!(directive = name, "directive registration replaced an existing one");
        }
        self.invalidate();
        Ok(())
    }

    /// Register `alias` as a name for a directive string, e.g.
    /// `register_alias("iscolor", "enum=red,green")`.
    pub fn register_alias(&mut self, alias: &str, directives: &str) -> Result<(), RegistryError> {
        validate_directive_name(alias, self.aliases.name())?;
        if self.directives.contains(alias) {
            return Err(RegistryError::Collision {
                name: alias.into(),
                registry: self.aliases.name().into(),
                other: self.directives.name().into(),
            });
        }
        self.aliases.replace(alias, Rc::new(directives.to_string()))?;
        self.invalidate();
        Ok(())
    }

    /// Register a hook run after the fields of every instance of `types`
    /// have been processed. A later registration for a type replaces the
    /// earlier one.
    pub fn register_struct_hook(
        &mut self,
        hook: impl Fn(&mut StructLevel) -> Result<()> + Send + Sync + 'static,
        types: &[&str],
    ) -> Result<(), RegistryError> {
        let hook: StructHook = Rc::new(hook);
        for name in types {
            validate_name(name, "struct hooks")?;
            self.hooks.insert(Rc::from(*name), hook.clone());
        }
        self.invalidate();
        Ok(())
    }

    pub(crate) fn struct_hook(&self, name: &str) -> Option<StructHook> {
        self.hooks.get(name).cloned()
    }

    /// Register a function for `fn@name` parameters.
    pub fn add_func(
        &mut self,
        name: &str,
        f: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        let f: Rc<ValueFn> = Rc::new(f);
        self.funcs.replace(name, f)?;
        self.invalidate();
        Ok(())
    }

    /// Register a variable for `var@name` parameters.
    pub fn add_var(&mut self, name: &str, value: Value) -> Result<(), RegistryError> {
        self.vars.replace(name, Rc::new(value))?;
        self.invalidate();
        Ok(())
    }

    pub(crate) fn directives(&self) -> &Registry<DirectiveFactory> {
        &self.directives
    }

    pub(crate) fn aliases(&self) -> &Registry<String> {
        &self.aliases
    }

    pub(crate) fn funcs(&self) -> &Registry<ValueFn> {
        &self.funcs
    }

    pub(crate) fn vars(&self) -> &Registry<Value> {
        &self.vars
    }

    pub(crate) fn resolvers(&self) -> &ResolverRegistry {
        &self.resolvers
    }

    pub(crate) fn cache(&self) -> &StructCache {
        &self.cache
    }

    /// Build the descriptor of the sample's type, surfacing wiring errors
    /// before the first real traversal.
    pub fn prepare(&self, sample: &Value) -> Result<Rc<StructDescriptor>, InjectError> {
        self.prepare_impl(sample, None)
    }

    pub fn prepare_with_ctx(
        &self,
        sample: &Value,
        ctx: &Value,
    ) -> Result<Rc<StructDescriptor>, InjectError> {
        self.prepare_impl(sample, Some(ctx))
    }

    /// Build the descriptor of a registered type using its zero value.
    pub fn prepare_type(&self, name: &str) -> Result<Rc<StructDescriptor>, SetupError> {
        self.struct_descriptor(&Record::new(name), None)
    }

    fn prepare_impl(
        &self,
        sample: &Value,
        ctx: Option<&Value>,
    ) -> Result<Rc<StructDescriptor>, InjectError> {
        match sample {
            Value::Struct(record) => Ok(self.struct_descriptor(record, ctx)?),
            other => Err(InjectError::InvalidTarget(other.kind_name().to_string())),
        }
    }

    /// Descriptor of a type, if it has been built.
    pub fn descriptor(&self, name: &str) -> Option<Rc<StructDescriptor>> {
        self.cache.get(name)
    }

    /// Number of descriptors built so far.
    pub fn build_count(&self) -> usize {
        self.cache.build_count()
    }

    /// Process every field of `current` and of the structs it contains.
    ///
    /// Stops at the first failing field. Fields processed before the failure
    /// keep their new values.
    pub fn inject(&self, current: &mut Value) -> Result<(), InjectError> {
        self.run(current, None, None)
    }

    /// Like [`Engine::inject`], with a context bag visible to resolvers,
    /// handlers and hooks.
    pub fn inject_with_ctx(&self, current: &mut Value, ctx: &Value) -> Result<(), InjectError> {
        self.run(current, None, Some(ctx))
    }

    /// Process only the listed fields and their ancestors. Paths are relative
    /// to `current`, e.g. `Inner.Name` or `Items[0].Sku`.
    pub fn inject_partial(&self, current: &mut Value, fields: &[&str]) -> Result<(), InjectError> {
        self.run_partial(current, fields, None, Filter::include)
    }

    pub fn inject_partial_with_ctx(
        &self,
        current: &mut Value,
        fields: &[&str],
        ctx: &Value,
    ) -> Result<(), InjectError> {
        self.run_partial(current, fields, Some(ctx), Filter::include)
    }

    /// Process every field except the listed ones.
    pub fn inject_except(&self, current: &mut Value, fields: &[&str]) -> Result<(), InjectError> {
        self.run_partial(current, fields, None, Filter::exclude)
    }

    pub fn inject_except_with_ctx(
        &self,
        current: &mut Value,
        fields: &[&str],
        ctx: &Value,
    ) -> Result<(), InjectError> {
        self.run_partial(current, fields, Some(ctx), Filter::exclude)
    }

    fn run_partial(
        &self,
        current: &mut Value,
        fields: &[&str],
        ctx: Option<&Value>,
        make_filter: fn(&str, &[&str]) -> Filter,
    ) -> Result<(), InjectError> {
        if fields.is_empty() {
            return self.run(current, None, ctx);
        }
        let filter = match &*current {
            Value::Struct(record) => make_filter(record.type_name(), fields),
            other => return Err(InjectError::InvalidTarget(other.kind_name().to_string())),
        };
        self.run(current, Some(&filter), ctx)
    }

    fn run(
        &self,
        current: &mut Value,
        filter: Option<&Filter>,
        ctx: Option<&Value>,
    ) -> Result<(), InjectError> {
        let record = match current {
            Value::Struct(record) => Rc::make_mut(record),
            other => return Err(InjectError::InvalidTarget(other.kind_name().to_string())),
        };

        let namespace = format!("{}.", record.type_name());
        let name_namespace = match self.config.field_name_tag {
            Some(_) => namespace.clone(),
            None => String::new(),
        };

        let walker = Walker {
            engine: self,
            filter,
            ctx,
        };
        walker.traverse_struct(record, &namespace, &name_namespace, false, None, 0)
    }

    pub fn zero_value(&self, t: &Type) -> Value {
        t.zero_value()
    }

    /// Decode json into an instance of a registered type.
    ///
    /// Numbers, timestamps, map keys and nested structs are converted to the
    /// declared field types. Null or missing fields take their zero value.
    pub fn record_from_json(&self, type_name: &str, json: &str) -> Result<Value> {
        self.record_from_value(type_name, Value::from_json_str(json)?)
    }

    /// Like [`Engine::record_from_json`], for an already decoded value.
    pub fn record_from_value(&self, type_name: &str, value: Value) -> Result<Value> {
        self.coerce(value, &Type::record(type_name), type_name)
    }

    fn coerce(&self, value: Value, t: &Type, path: &str) -> Result<Value> {
        if value.is_null() {
            return Ok(t.zero_value());
        }
        Ok(match (t, value) {
            (Type::Any, v) => v,
            (Type::Optional { item_type }, v) => self.coerce(v, item_type, path)?,
            (Type::Bool, v @ Value::Bool(_)) => v,
            (Type::Int, v @ Value::Number(_)) => Value::from(v.as_i64()?),
            (Type::UInt, v @ Value::Number(_)) => Value::from(v.as_u64()?),
            (Type::Float, v @ Value::Number(_)) => Value::from(v.as_f64()?),
            (Type::String, v @ Value::String(_)) => v,
            (Type::Timestamp, Value::String(s)) => t.parse_literal(&s)?,
            (Type::Array { item_type }, Value::Array(items)) => Value::from(
                items
                    .iter()
                    .enumerate()
                    .map(|(idx, v)| self.coerce(v.clone(), item_type, &format!("{path}[{idx}]")))
                    .collect::<Result<Vec<_>>>()?,
            ),
            (
                Type::Map {
                    key_type,
                    value_type,
                },
                Value::Map(entries),
            ) => {
                let mut m = BTreeMap::new();
                for (k, v) in entries.iter() {
                    let text = k.key_text();
                    let key = match k {
                        Value::String(s) => key_type.parse_literal(s)?,
                        other => other.clone(),
                    };
                    m.insert(key, self.coerce(v.clone(), value_type, &format!("{path}[{text}]"))?);
                }
                Value::from(m)
            }
            (Type::Struct { name }, Value::Struct(r)) if r.type_name() == &**name => {
                Value::Struct(r)
            }
            (Type::Struct { name }, Value::Map(entries)) => {
                let schema = self
                    .schema(name)
                    .ok_or_else(|| anyhow!("type `{name}` is not registered"))?;
                let mut record = Record::new(name);
                for (k, v) in entries.iter() {
                    let key = k.as_string()?;
                    let Some(field) = schema.get(key) else {
                        bail!("{path}: `{name}` has no field `{key}`");
                    };
                    let v = self.coerce(v.clone(), &field.field_type, &format!("{path}.{key}"))?;
                    record.set(key, v);
                }
                Value::from(record)
            }
            (t, v) => bail!("{path}: expected {t}, found {}", v.kind_name()),
        })
    }
}
