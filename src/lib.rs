// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

// Descriptors and values are shared across threads by the engine.
use std::sync::Arc as Rc;

mod cache;
mod directives;
mod engine;
mod error;
mod lookup;
mod number;
mod parser;
mod registry;
mod resolver;
mod schema;
mod traversal;
mod typing;
mod value;

pub use cache::{DirectiveKind, DirectiveNode, FieldDescriptor, StructDescriptor};
pub use directives::{DirectiveFactory, DirectiveInit, Handler, HandlerState};
pub use engine::{Config, Engine, ValueFn};
pub use error::{FieldError, InjectError, ResolverFault, SetupError};
pub use number::Number;
pub use registry::{Registry, RegistryError};
pub use resolver::{
    Arg, IntoResolver, ResolveContext, Resolver, ResolverArg, ResolverOutput, ResolverSignature,
};
pub use schema::{Field, StructSchema};
pub use traversal::{StructHook, StructLevel};
pub use typing::{Type, Typed};
pub use value::{Record, Value};

#[cfg(test)]
mod tests;
