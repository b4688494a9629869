//! Permission request types sent to the authorization service.

use crate::canonicalization::canonical_hash;
use crate::error::{PolicyError, Result};
use serde::{Deserialize, Serialize};

/// Who is asking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(rename = "type")]
    pub subject_type: String,
    pub id: String,
}

impl Subject {
    pub fn new(subject_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            id: id.into(),
        }
    }

    /// Shorthand for a `user` subject.
    pub fn user(id: impl Into<String>) -> Self {
        Self::new("user", id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.subject_type.is_empty() {
            return Err(PolicyError::MissingField("subject.type".to_string()));
        }
        if self.id.is_empty() {
            return Err(PolicyError::MissingField("subject.id".to_string()));
        }
        Ok(())
    }
}

/// What is being done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
}

impl Action {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(PolicyError::MissingField("action.id".to_string()));
        }
        Ok(())
    }
}

/// One level of a resource instance chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub system: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl ResourceNode {
    pub fn new(
        system: impl Into<String>,
        resource_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            system: system.into(),
            resource_type: resource_type.into(),
            id: id.into(),
            attributes: serde_json::Map::new(),
        }
    }

    /// Adds an attribute to the node.
    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Replaces all attributes of the node.
    pub fn with_attributes(mut self, attributes: serde_json::Map<String, serde_json::Value>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.system.is_empty() {
            return Err(PolicyError::MissingField("resource_node.system".to_string()));
        }
        if self.resource_type.is_empty() {
            return Err(PolicyError::MissingField("resource_node.type".to_string()));
        }
        if self.id.is_empty() {
            return Err(PolicyError::MissingField("resource_node.id".to_string()));
        }
        Ok(())
    }
}

/// A resource instance, expressed as its chain of nodes from the top level down.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource {
    nodes: Vec<ResourceNode>,
}

impl Resource {
    pub fn new(nodes: Vec<ResourceNode>) -> Self {
        Self { nodes }
    }

    /// A resource made of one node.
    pub fn single(node: ResourceNode) -> Self {
        Self { nodes: vec![node] }
    }

    pub fn add_node(&mut self, node: ResourceNode) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            node.validate().map_err(|e| {
                PolicyError::ValidationError(format!("resource node validation failed: {}", e))
            })?;
        }
        Ok(())
    }

    /// Identifier used as the key of batch results.
    ///
    /// A single node yields its bare id. A chain yields
    /// `type,id/type2,id2`; every node must then belong to `system`.
    pub fn resource_id(&self, system: &str) -> Result<String> {
        if let [node] = self.nodes.as_slice() {
            return Ok(node.id.clone());
        }

        let mut parts = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if node.system != system {
                return Err(PolicyError::invalid_field(
                    "resource_node.system",
                    format!(
                        "cannot build a resource id across systems ('{}' is not '{}')",
                        node.system, system
                    ),
                ));
            }
            parts.push(format!("{},{}", node.resource_type, node.id));
        }
        Ok(parts.join("/"))
    }
}

/// A single-action permission request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub system: String,
    pub subject: Subject,
    pub action: Action,
    #[serde(rename = "resources", default)]
    pub resource: Resource,
}

impl Request {
    pub fn new(
        system: impl Into<String>,
        subject: Subject,
        action: Action,
        resource: Resource,
    ) -> Self {
        Self {
            system: system.into(),
            subject,
            action,
            resource,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_common(&self.system, &self.subject, &self.resource)?;
        self.action.validate().map_err(|e| {
            PolicyError::ValidationError(format!("request `action` validation failed: {}", e))
        })
    }

    /// Query payload. Without resources the service returns every policy
    /// for system + subject + action, to be evaluated locally per resource.
    pub fn to_value(&self, with_resources: bool) -> Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if !with_resources {
            value["resources"] = serde_json::Value::Array(Vec::new());
        }
        Ok(value)
    }

    /// Stable digest of the request, used as the result cache key.
    pub fn fingerprint(&self) -> Result<String> {
        canonical_hash(&serde_json::to_value(self)?)
    }
}

/// A request checking several actions on one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiActionRequest {
    pub system: String,
    pub subject: Subject,
    pub actions: Vec<Action>,
    #[serde(rename = "resources", default)]
    pub resource: Resource,
}

impl MultiActionRequest {
    pub fn new(
        system: impl Into<String>,
        subject: Subject,
        actions: Vec<Action>,
        resource: Resource,
    ) -> Self {
        Self {
            system: system.into(),
            subject,
            actions,
            resource,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_common(&self.system, &self.subject, &self.resource)?;
        for action in &self.actions {
            action.validate().map_err(|e| {
                PolicyError::ValidationError(format!("request `actions` validation failed: {}", e))
            })?;
        }
        Ok(())
    }

    pub fn to_value(&self, with_resources: bool) -> Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if !with_resources {
            value["resources"] = serde_json::Value::Array(Vec::new());
        }
        Ok(value)
    }

    pub fn fingerprint(&self) -> Result<String> {
        canonical_hash(&serde_json::to_value(self)?)
    }
}

fn validate_common(system: &str, subject: &Subject, resource: &Resource) -> Result<()> {
    if system.is_empty() {
        return Err(PolicyError::MissingField("system".to_string()));
    }
    subject.validate().map_err(|e| {
        PolicyError::ValidationError(format!("request `subject` validation failed: {}", e))
    })?;
    resource.validate().map_err(|e| {
        PolicyError::ValidationError(format!("request `resource` validation failed: {}", e))
    })
}
