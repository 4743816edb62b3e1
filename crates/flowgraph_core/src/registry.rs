// SPDX-License-Identifier: MIT OR Apache-2.0
//! Processor classes available for construction by class identifier.

use crate::node::{Node, NodeError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Processor category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessorCategory {
    /// Produces data from properties
    Source,
    /// Routes data without changing it
    Flow,
    /// Computes new values
    Math,
    /// Consumes data at the end of a chain
    Sink,
    /// Application defined
    Custom,
}

/// Builds a node with the given identifier
pub type ProcessorFactory = Box<dyn Fn(&str) -> Result<Node, NodeError>>;

/// A registered processor class
pub struct ProcessorInfo {
    /// Class identifier, as reported by the processor
    pub class_identifier: String,
    /// Display name
    pub name: String,
    /// Category
    pub category: ProcessorCategory,
    /// Description
    pub description: String,
    factory: ProcessorFactory,
}

impl ProcessorInfo {
    /// Describe a class
    pub fn new(
        class_identifier: impl Into<String>,
        name: impl Into<String>,
        category: ProcessorCategory,
        factory: impl Fn(&str) -> Result<Node, NodeError> + 'static,
    ) -> Self {
        Self {
            class_identifier: class_identifier.into(),
            name: name.into(),
            category,
            description: String::new(),
            factory: Box::new(factory),
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl fmt::Debug for ProcessorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorInfo")
            .field("class_identifier", &self.class_identifier)
            .field("name", &self.name)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// Registry of available processor classes
#[derive(Debug, Default)]
pub struct ProcessorRegistry {
    types: IndexMap<String, ProcessorInfo>,
}

impl ProcessorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the builtin processors
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtin::register_builtins(&mut registry);
        registry
    }

    /// Register a class, replacing any class with the same identifier
    pub fn register(&mut self, info: ProcessorInfo) {
        if self.types.contains_key(&info.class_identifier) {
            tracing::warn!(class = %info.class_identifier, "Replacing registered processor class");
        }
        self.types.insert(info.class_identifier.clone(), info);
    }

    /// Get a class by identifier
    pub fn get(&self, class_identifier: &str) -> Option<&ProcessorInfo> {
        self.types.get(class_identifier)
    }

    /// Whether a class is registered
    pub fn contains(&self, class_identifier: &str) -> bool {
        self.types.contains_key(class_identifier)
    }

    /// All classes in registration order
    pub fn types(&self) -> impl Iterator<Item = &ProcessorInfo> {
        self.types.values()
    }

    /// Classes in one category
    pub fn types_in_category(
        &self,
        category: ProcessorCategory,
    ) -> impl Iterator<Item = &ProcessorInfo> {
        self.types.values().filter(move |t| t.category == category)
    }

    /// Build a node of a class; `None` if the class is unknown
    pub fn create(
        &self,
        class_identifier: &str,
        identifier: &str,
    ) -> Option<Result<Node, NodeError>> {
        self.get(class_identifier)
            .map(|info| (info.factory)(identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::Source;

    #[test]
    fn test_create_known_class() {
        let registry = ProcessorRegistry::with_builtins();
        let node = registry
            .create("flowgraph.Source.Float", "Constant")
            .unwrap()
            .unwrap();
        assert_eq!(node.identifier(), "Constant");
        assert_eq!(node.class_identifier(), "flowgraph.Source.Float");
        assert!(registry.create("flowgraph.Missing", "x").is_none());
    }

    #[test]
    fn test_builtin_classes_report_registered_identifier() {
        let registry = ProcessorRegistry::with_builtins();
        for info in registry.types() {
            let node = registry
                .create(&info.class_identifier, "probe")
                .unwrap()
                .unwrap();
            assert_eq!(node.class_identifier(), info.class_identifier);
        }
        assert!(registry.types_in_category(ProcessorCategory::Sink).count() >= 4);
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ProcessorRegistry::new();
        registry.register(ProcessorInfo::new(
            "custom.Value",
            "Value",
            ProcessorCategory::Custom,
            |id| Source::<i64>::node(id, 1),
        ));
        registry.register(
            ProcessorInfo::new("custom.Value", "Value 2", ProcessorCategory::Custom, |id| {
                Source::<i64>::node(id, 2)
            })
            .with_description("replacement"),
        );
        assert_eq!(registry.types().count(), 1);
        assert_eq!(registry.get("custom.Value").unwrap().name, "Value 2");
    }
}
