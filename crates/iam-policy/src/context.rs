//! Attribute store the policy expression is evaluated against.

use crate::error::Result;
use crate::request::{Resource, ResourceNode};
use crate::types::{AttributeValue, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attribute bag of one object type.
pub type Attributes = HashMap<String, AttributeValue>;

/// Attribute bags keyed by object type.
///
/// Each type appears at most once. Attributes are addressed by
/// `"type.attribute"` keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeStore {
    objects: HashMap<String, Attributes>,
}

impl AttributeStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a resource chain.
    ///
    /// Each node's attributes are stored under its type together with the
    /// synthetic `id` attribute. With `only_local`, nodes owned by another
    /// system are skipped.
    pub fn from_resource(system: &str, resource: &Resource, only_local: bool) -> Result<Self> {
        let mut store = Self::new();

        for node in resource.nodes() {
            if only_local && node.system != system {
                continue;
            }
            store.put(node.resource_type.clone(), node_attributes(node)?);
        }

        Ok(store)
    }

    /// Inserts or replaces the attribute bag of `object_type`.
    pub fn put(&mut self, object_type: impl Into<String>, attributes: Attributes) {
        self.objects.insert(object_type.into(), attributes);
    }

    /// Adds an object to the store.
    pub fn with_object(mut self, object_type: impl Into<String>, attributes: Attributes) -> Self {
        self.put(object_type, attributes);
        self
    }

    pub fn get(&self, object_type: &str) -> Option<&Attributes> {
        self.objects.get(object_type)
    }

    pub fn has(&self, object_type: &str) -> bool {
        self.objects.contains_key(object_type)
    }

    pub fn remove(&mut self, object_type: &str) -> Option<Attributes> {
        self.objects.remove(object_type)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Resolves a `"type.attribute"` key.
    ///
    /// Returns `None` when the key does not have exactly two parts, the
    /// type is unknown, or the attribute is missing. An absent value is a
    /// valid operand, not an error.
    pub fn resolve(&self, key: &str) -> Option<&AttributeValue> {
        let mut parts = key.split('.');
        let (object_type, attribute) = match (parts.next(), parts.next(), parts.next()) {
            (Some(object_type), Some(attribute), None) => (object_type, attribute),
            _ => return None,
        };

        self.objects.get(object_type)?.get(attribute)
    }
}

/// Converts a node's JSON attributes, skipping `null` entries and injecting `id`.
fn node_attributes(node: &ResourceNode) -> Result<Attributes> {
    let mut attributes = Attributes::with_capacity(node.attributes.len() + 1);

    for (name, value) in &node.attributes {
        if value.is_null() {
            continue;
        }
        let key = format!("{}.{}", node.resource_type, name);
        attributes.insert(name.clone(), AttributeValue::from_json(&key, value)?);
    }
    attributes.insert(
        "id".to_string(),
        AttributeValue::Scalar(Scalar::Str(node.id.clone())),
    );

    Ok(attributes)
}
