// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Typed resolver table.
//!
//! A resolver is a plain Rust function or closure. Its parameter and return
//! types are captured at registration through [`Typed`], giving every
//! registration an explicit [`ResolverSignature`]. The `by` directive picks a
//! registration by comparing that signature with the types of the sibling
//! fields it names.

use crate::directives::HandlerState;
use crate::registry::RegistryError;
use crate::typing::{Type, Typed};
use crate::value::{Record, Value};
use crate::Rc;

use core::fmt;

use anyhow::{bail, Result};

/// Per call context handed to resolvers that declare a [`ResolveContext`]
/// parameter.
#[derive(Debug, Clone)]
pub struct ResolveContext {
    owner: Rc<Record>,
    field: Value,
    field_type: Type,
    param: Rc<str>,
    data: Value,
}

impl ResolveContext {
    pub(crate) fn from_state(state: &HandlerState) -> Self {
        Self {
            owner: Rc::new(state.current_struct.clone()),
            field: state.field.clone(),
            field_type: state.field_type.clone(),
            param: state.param.into(),
            data: state.ctx.cloned().unwrap_or(Value::Null),
        }
    }

    /// The record that owns the field being resolved.
    pub fn owner(&self) -> &Record {
        &self.owner
    }

    pub fn field(&self) -> &Value {
        &self.field
    }

    pub fn field_type(&self) -> &Type {
        &self.field_type
    }

    pub fn param(&self) -> &str {
        &self.param
    }

    /// Context bag supplied by the caller, `Value::Null` if none.
    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match &self.data {
            Value::Map(m) => m.get(&Value::from(key)),
            Value::Struct(r) => r.get(key),
            _ => None,
        }
    }
}

/// An argument passed to an erased resolver.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Context(ResolveContext),
}

/// Types usable as resolver parameters.
pub trait ResolverArg: Sized {
    fn arg_type() -> Type;
    fn from_arg(arg: Arg) -> Result<Self>;
}

impl<T: Typed> ResolverArg for T {
    fn arg_type() -> Type {
        T::value_type()
    }

    fn from_arg(arg: Arg) -> Result<Self> {
        match arg {
            Arg::Value(v) => T::from_value(&v),
            Arg::Context(_) => bail!("context passed where a {} was expected", T::value_type()),
        }
    }
}

impl ResolverArg for ResolveContext {
    fn arg_type() -> Type {
        Type::Context
    }

    fn from_arg(arg: Arg) -> Result<Self> {
        match arg {
            Arg::Context(c) => Ok(c),
            Arg::Value(_) => bail!("value passed where the resolution context was expected"),
        }
    }
}

/// Types usable as resolver results: a [`Typed`] value or a `Result` of one.
pub trait ResolverOutput {
    fn output_type() -> Type;
    fn fallible() -> bool;
    fn into_result(self) -> Result<Value>;
}

impl<T: Typed> ResolverOutput for T {
    fn output_type() -> Type {
        T::value_type()
    }

    fn fallible() -> bool {
        false
    }

    fn into_result(self) -> Result<Value> {
        Ok(self.into_value())
    }
}

impl<T: Typed, E: Into<anyhow::Error>> ResolverOutput for Result<T, E> {
    fn output_type() -> Type {
        T::value_type()
    }

    fn fallible() -> bool {
        true
    }

    fn into_result(self) -> Result<Value> {
        self.map(T::into_value).map_err(Into::into)
    }
}

/// Declared shape of a resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSignature {
    pub inputs: Vec<Type>,
    pub output: Type,
    pub fallible: bool,
}

impl fmt::Display for ResolverSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_inputs(f, &self.inputs)?;
        write!(f, " -> {}", self.output)?;
        if self.fallible {
            write!(f, " (fallible)")?;
        }
        Ok(())
    }
}

fn write_inputs(f: &mut fmt::Formatter<'_>, inputs: &[Type]) -> fmt::Result {
    write!(f, "(")?;
    for (idx, t) in inputs.iter().enumerate() {
        if idx > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{t}")?;
    }
    write!(f, ")")
}

pub(crate) type ResolverFn = dyn Fn(Vec<Arg>) -> Result<Value> + Send + Sync;

/// A resolver with its signature and erased callable.
#[derive(Clone)]
pub struct Resolver {
    pub(crate) signature: ResolverSignature,
    pub(crate) call: Rc<ResolverFn>,
}

impl Resolver {
    pub fn new(
        signature: ResolverSignature,
        call: impl Fn(Vec<Arg>) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            signature,
            call: Rc::new(call),
        }
    }

    pub fn signature(&self) -> &ResolverSignature {
        &self.signature
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resolver{}", self.signature)
    }
}

/// Functions and closures that can be registered as resolvers.
///
/// Implemented for functions of up to five parameters whose parameters
/// implement [`ResolverArg`] and whose result implements [`ResolverOutput`].
pub trait IntoResolver<Args>: Send + Sync + 'static {
    fn into_resolver(self) -> Resolver;
}

macro_rules! impl_into_resolver {
    ($($arg:ident),*) => {
        impl<F, R, $($arg,)*> IntoResolver<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: ResolverOutput,
            $($arg: ResolverArg,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_resolver(self) -> Resolver {
                let signature = ResolverSignature {
                    inputs: vec![$($arg::arg_type()),*],
                    output: R::output_type(),
                    fallible: R::fallible(),
                };
                Resolver::new(signature, move |args: Vec<Arg>| -> Result<Value> {
                    let mut args = args.into_iter();
                    $(
                        let $arg = match args.next() {
                            Some(a) => $arg::from_arg(a)?,
                            None => bail!("resolver called with too few arguments"),
                        };
                    )*
                    (self)($($arg),*).into_result()
                })
            }
        }
    };
}

impl_into_resolver!();
impl_into_resolver!(A1);
impl_into_resolver!(A1, A2);
impl_into_resolver!(A1, A2, A3);
impl_into_resolver!(A1, A2, A3, A4);
impl_into_resolver!(A1, A2, A3, A4, A5);

/// Where a matched resolver takes each argument from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Index into the sibling paths of the `by` directive.
    Sibling(usize),
    Context,
}

/// Result of matching a `by` occurrence against the table.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub index: usize,
    pub slots: Vec<Slot>,
    pub resolver: Resolver,
}

struct Registration {
    channel: Option<Rc<str>>,
    resolver: Resolver,
}

/// Append-only list of resolvers, scanned in registration order.
#[derive(Default)]
pub(crate) struct ResolverRegistry {
    entries: Vec<Registration>,
}

fn valid_channel(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

impl ResolverRegistry {
    pub(crate) fn add(
        &mut self,
        channel: Option<&str>,
        resolver: Resolver,
    ) -> Result<usize, RegistryError> {
        if let Some(name) = channel {
            if !valid_channel(name) {
                return Err(RegistryError::InvalidName {
                    name: name.into(),
                    registry: "resolver channels".into(),
                });
            }
        }
        if resolver.signature.output == Type::Context {
            return Err(RegistryError::InvalidResolver {
                reason: format!(
                    "resolver {} returns the context marker type",
                    resolver.signature
                )
                .into(),
            });
        }
        self.entries.push(Registration {
            channel: channel.map(Rc::from),
            resolver,
        });
        Ok(self.entries.len() - 1)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// First registration, in order, that accepts the sibling types and
    /// produces something assignable to `target`.
    pub(crate) fn find(
        &self,
        channel: Option<&str>,
        siblings: &[Type],
        target: &Type,
    ) -> Option<Binding> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, r)| match channel {
                Some(c) => r.channel.as_deref() == Some(c),
                None => true,
            })
            .filter(|(_, r)| r.resolver.signature.output.is_assignable_to(target))
            .find_map(|(index, r)| {
                bind_params(&r.resolver.signature.inputs, siblings).map(|slots| Binding {
                    index,
                    slots,
                    resolver: r.resolver.clone(),
                })
            })
    }
}

// Walk the parameters left to right. A context parameter binds the context;
// any other parameter consumes the next sibling if its type fits.
fn bind_params(params: &[Type], siblings: &[Type]) -> Option<Vec<Slot>> {
    let mut slots = Vec::with_capacity(params.len());
    let mut next = 0;
    for param in params {
        if *param == Type::Context {
            slots.push(Slot::Context);
            continue;
        }
        let sibling = siblings.get(next)?;
        if !sibling.is_assignable_to(param) {
            return None;
        }
        slots.push(Slot::Sibling(next));
        next += 1;
    }
    (next == siblings.len()).then_some(slots)
}

/// Render a signature for a `by` occurrence that found no resolver.
pub(crate) fn describe_call(siblings: &[Type], target: &Type) -> String {
    struct Inputs<'a>(&'a [Type]);
    impl fmt::Display for Inputs<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write_inputs(f, self.0)
        }
    }
    format!("{} -> {target}", Inputs(siblings))
}
