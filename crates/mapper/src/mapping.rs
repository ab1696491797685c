//! Class mappings: which attributes of a class are persisted, and how.

use docmap_core::ClassName;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMapping {
    pub name: String,
    /// Store entity values inline instead of as references.
    pub embedded: bool,
}

/// Persisted attribute declarations for one class.
///
/// A mapping without declarations persists every attribute an entity carries,
/// storing entity values as references. Once any attribute is declared, only
/// declared attributes reach the data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMapping {
    class: ClassName,
    attributes: Vec<AttributeMapping>,
}

impl ClassMapping {
    pub fn new(class: impl Into<ClassName>) -> Self {
        Self {
            class: class.into(),
            attributes: Vec::new(),
        }
    }

    pub fn attribute(self, name: impl Into<String>) -> Self {
        self.declare(name.into(), false)
    }

    pub fn embedded(self, name: impl Into<String>) -> Self {
        self.declare(name.into(), true)
    }

    fn declare(mut self, name: String, embedded: bool) -> Self {
        match self.attributes.iter().position(|a| a.name == name) {
            Some(index) => self.attributes[index].embedded = embedded,
            None => self.attributes.push(AttributeMapping { name, embedded }),
        }
        self
    }

    pub fn class(&self) -> &ClassName {
        &self.class
    }

    pub fn attributes(&self) -> &[AttributeMapping] {
        &self.attributes
    }

    /// True when no attribute is declared.
    pub fn is_dynamic(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn persists(&self, name: &str) -> bool {
        self.is_dynamic() || self.attributes.iter().any(|a| a.name == name)
    }

    pub fn is_embedded(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name && a.embedded)
    }
}
