// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::registry::RegistryError;
use crate::typing::Type;
use crate::Rc;

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Declaration of one struct field: its name, type and tags.
///
/// Tags play the role of struct tags: the engine reads its directive string
/// from the tag named by [`crate::Config::tag_name`] and an optional display
/// name from [`crate::Config::field_name_tag`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Field {
    pub name: Rc<str>,
    #[serde(rename = "type")]
    pub field_type: Type,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Field {
    pub fn new(name: &str, field_type: Type) -> Self {
        Self {
            name: name.into(),
            field_type,
            tags: BTreeMap::new(),
        }
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Declaration of a struct type, registered with the engine at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StructSchema {
    pub name: Rc<str>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl StructSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            fields: vec![],
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| *f.name == *name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| *f.name == *name)
    }

    pub(crate) fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidSchema {
            name: self.name.clone(),
            reason: reason.into(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("type name is empty"));
        }
        let mut seen = BTreeSet::new();
        for f in &self.fields {
            if f.name.trim().is_empty() {
                return Err(invalid("field name is empty"));
            }
            if !seen.insert(f.name.clone()) {
                return Err(invalid(&format!("field `{}` declared twice", f.name)));
            }
            if contains_context(&f.field_type) {
                return Err(invalid(&format!(
                    "field `{}` uses the context marker type",
                    f.name
                )));
            }
        }
        Ok(())
    }

    /// Parse a list of schemas from json.
    pub fn list_from_json_str(json: &str) -> Result<Vec<StructSchema>> {
        Ok(serde_json::from_str(json)?)
    }

    #[cfg(feature = "yaml")]
    pub fn list_from_yaml_str(yaml: &str) -> Result<Vec<StructSchema>> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

fn contains_context(t: &Type) -> bool {
    match t {
        Type::Context => true,
        Type::Optional { item_type } | Type::Array { item_type } => contains_context(item_type),
        Type::Map {
            key_type,
            value_type,
        } => contains_context(key_type) || contains_context(value_type),
        _ => false,
    }
}
