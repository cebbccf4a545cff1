use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request context presented with an authorization check.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccessContext {
    #[serde(default)]
    require_ownership: bool,
    #[serde(default)]
    resource_id: Option<String>,
    #[serde(default)]
    attributes: Map<String, Value>,
}

impl AccessContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context from constraint attributes.
    #[must_use]
    pub fn from_attributes(attributes: Map<String, Value>) -> Self {
        Self {
            attributes,
            ..Self::default()
        }
    }

    /// Requires the caller to own the addressed resource instance.
    #[must_use]
    pub fn require_ownership_of(mut self, resource_id: impl Into<String>) -> Self {
        self.require_ownership = true;
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Sets the addressed resource instance without requiring ownership.
    #[must_use]
    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Adds one attribute consulted by constraint evaluation.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns whether ownership must be established.
    #[must_use]
    pub fn requires_ownership(&self) -> bool {
        self.require_ownership
    }

    /// Returns the addressed resource instance.
    #[must_use]
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    /// Returns the constraint attributes.
    #[must_use]
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }
}
