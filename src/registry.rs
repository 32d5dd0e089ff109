// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::Rc;

use core::fmt;
use std::collections::BTreeMap;

type String = Rc<str>;

/// Characters that may not appear in directive or alias names.
pub const RESTRICTED_CHARS: &str = ".[],;|=+()`~!@#$%^&*\\\"/?<>{}";

/// Errors that can occur when interacting with a Registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    AlreadyExists { name: String, registry: String },
    InvalidName { name: String, registry: String },
    Restricted { name: String, registry: String },
    Collision { name: String, registry: String, other: String },
    InvalidResolver { reason: String },
    InvalidSchema { name: String, reason: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::AlreadyExists { name, registry } => {
                write!(
                    f,
                    "{registry} registration failed: An item with the name '{name}' is already registered."
                )
            }
            RegistryError::InvalidName { name, registry } => {
                write!(f, "{registry} registration failed: The name '{name}' is invalid (empty or whitespace-only names are not allowed).")
            }
            RegistryError::Restricted { name, registry } => {
                write!(f, "{registry} registration failed: '{name}' either contains restricted characters or is the same as a restricted directive needed for normal operation.")
            }
            RegistryError::Collision {
                name,
                registry,
                other,
            } => {
                write!(
                    f,
                    "{registry} registration failed: '{name}' is already registered in {other}."
                )
            }
            RegistryError::InvalidResolver { reason } => {
                write!(f, "resolver registration failed: {reason}")
            }
            RegistryError::InvalidSchema { name, reason } => {
                write!(f, "schema registration failed for '{name}': {reason}")
            }
        }
    }
}

impl core::error::Error for RegistryError {}

/// Validates that a name is not empty or whitespace-only.
pub fn validate_name(name: &str, registry_name: &str) -> Result<(), RegistryError> {
    if name.is_empty() || name.trim().is_empty() {
        Err(RegistryError::InvalidName {
            name: String::from(name),
            registry: String::from(registry_name),
        })
    } else {
        Ok(())
    }
}

/// Rejects names that collide with structural directives or contain
/// characters used by the directive grammar.
pub fn validate_directive_name(name: &str, registry_name: &str) -> Result<(), RegistryError> {
    validate_name(name, registry_name)?;
    if crate::parser::is_restricted(name) || name.contains(|c| RESTRICTED_CHARS.contains(c)) {
        return Err(RegistryError::Restricted {
            name: String::from(name),
            registry: String::from(registry_name),
        });
    }
    Ok(())
}

/// Named registry for items of type T.
///
/// Registries are owned by an engine and populated before any traversal, so
/// lookups take no lock.
pub struct Registry<T: ?Sized> {
    inner: BTreeMap<String, Rc<T>>,
    name: String,
}

impl<T: ?Sized> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            name: self.name.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("items", &self.inner.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<T: ?Sized> Registry<T> {
    /// Create a new, empty registry with a given name.
    pub fn new(registry_name: &str) -> Self {
        Self {
            inner: BTreeMap::new(),
            name: registry_name.into(),
        }
    }

    /// Get the name of this registry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register an item with a given name. Returns Err if name already exists.
    pub fn register(&mut self, name: &str, item: Rc<T>) -> Result<(), RegistryError> {
        validate_name(name, &self.name)?;

        if let Some((existing, _)) = self.inner.get_key_value(name) {
            return Err(RegistryError::AlreadyExists {
                name: existing.clone(),
                registry: self.name.clone(),
            });
        }
        self.inner.insert(name.into(), item);
        Ok(())
    }

    /// Register an item, replacing any previous item with the same name.
    /// Returns the replaced item.
    pub fn replace(&mut self, name: &str, item: Rc<T>) -> Result<Option<Rc<T>>, RegistryError> {
        validate_name(name, &self.name)?;
        Ok(self.inner.insert(name.into(), item))
    }

    // Names of built-in items are known to be valid.
    pub(crate) fn insert(&mut self, name: &str, item: Rc<T>) {
        self.inner.insert(name.into(), item);
    }

    /// Retrieve an item by name, if it exists.
    pub fn get(&self, name: &str) -> Option<&Rc<T>> {
        self.inner.get(name)
    }

    /// Check if an item with the given name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Get the number of registered items.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Get an iterator over all entries in the registry.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rc<T>)> + '_ {
        self.inner.iter().map(|(k, v)| (&**k, v))
    }
}
