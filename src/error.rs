// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::typing::Type;
use crate::value::Value;

/// Wiring defects detected while building a struct descriptor.
///
/// These point at a bad directive string, a missing registration or a schema
/// mismatch. They are meant to be surfaced at startup through
/// [`crate::Engine::prepare`].
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Invalid injection directive on field {type_name}.{field}: {reason}")]
    InvalidDirective {
        type_name: String,
        field: String,
        reason: String,
    },

    #[error("Undefined injection directive '{directive}' on field {type_name}.{field}")]
    UndefinedDirective {
        type_name: String,
        field: String,
        directive: String,
    },

    #[error("directive '{directive}' on field {type_name}.{field} could not be initialized: {source}")]
    Directive {
        type_name: String,
        field: String,
        directive: String,
        source: anyhow::Error,
    },

    #[error("by directive init failed: struct: {type_name}, field: {field}, param: {param}; get field {path} not ok")]
    UnresolvedPath {
        type_name: String,
        field: String,
        param: String,
        path: String,
    },

    #[error("by directive init failed: struct: {type_name}, field: {field}, param: {param}; no resolver accepts {signature}, are you registered?")]
    NoResolver {
        type_name: String,
        field: String,
        param: String,
        signature: String,
    },

    #[error("type `{0}` is not registered")]
    UnknownType(String),
}

/// A field failed validation or resolution during a traversal.
#[derive(Debug, thiserror::Error)]
#[error("Key: '{namespace}' Error:Field injection for '{field}' failed on the '{tag}' tag: {cause}")]
pub struct FieldError {
    /// Fully qualified path using declared field names, e.g. `Order.Items[2].Sku`.
    pub namespace: String,
    /// Same path built from display names.
    pub name_namespace: String,
    pub field: String,
    pub name: String,
    /// Directive name, or the alias it was expanded from.
    pub tag: String,
    pub actual_tag: String,
    pub param: String,
    pub value: Value,
    pub value_type: Type,
    #[source]
    pub cause: anyhow::Error,
}

impl FieldError {
    /// Whether the failure was a panic caught at the resolver boundary rather
    /// than an error returned by the resolver.
    pub fn is_fault(&self) -> bool {
        self.cause.chain().any(|e| e.is::<ResolverFault>())
    }
}

/// A resolver panicked while computing a field.
#[derive(Debug, thiserror::Error)]
#[error("resolver panicked: {message}")]
pub struct ResolverFault {
    pub message: String,
}

/// Error returned by every traversal entry point.
#[derive(Debug, thiserror::Error)]
pub enum InjectError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Field(#[from] Box<FieldError>),

    #[error("value passed for injection is not a struct: {0}")]
    InvalidTarget(String),
}

impl InjectError {
    pub fn field_error(&self) -> Option<&FieldError> {
        match self {
            InjectError::Field(e) => Some(&**e),
            _ => None,
        }
    }

    pub fn setup_error(&self) -> Option<&SetupError> {
        match self {
            InjectError::Setup(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FieldError> for InjectError {
    fn from(e: FieldError) -> Self {
        InjectError::Field(Box::new(e))
    }
}
