// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hierarchical processor configuration.
//!
//! Every processor owns a [`PropertyOwner`] tree. Leaves hold a typed
//! [`PropertyValue`]; composites group further properties. Each leaf declares
//! the [`InvalidationLevel`] a change to it raises on the owning processor.

use crate::invalidation::InvalidationLevel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value stored in a leaf property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// 3D vector
    Vector3([f64; 3]),
    /// String
    String(String),
}

impl PropertyValue {
    /// Kind of value, used to check link compatibility
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Bool(_) => PropertyKind::Bool,
            Self::Int(_) => PropertyKind::Int,
            Self::Float(_) => PropertyKind::Float,
            Self::Vector3(_) => PropertyKind::Vector3,
            Self::String(_) => PropertyKind::String,
        }
    }

    /// Boolean content
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer content
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float content
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String content
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

/// Kind of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKind {
    /// Boolean leaf
    Bool,
    /// Integer leaf
    Int,
    /// Float leaf
    Float,
    /// Vector leaf
    Vector3,
    /// String leaf
    String,
    /// Group of properties
    Composite,
}

/// Dot separated path from a processor's property root to a property
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyPath(Vec<String>);

impl PropertyPath {
    /// Parse a path such as `"camera.position"`
    pub fn parse(path: &str) -> Self {
        Self(
            path.split('.')
                .filter(|part| !part.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    /// Path segments
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Path of a child property
    #[must_use]
    pub fn child(&self, identifier: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(identifier.to_owned());
        Self(segments)
    }

    /// Whether the path has no segments
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl From<&str> for PropertyPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl From<&PropertyPath> for PropertyPath {
    fn from(path: &PropertyPath) -> Self {
        path.clone()
    }
}

/// Errors raised by property trees
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PropertyError {
    /// An owner already has a property with this identifier
    #[error("Property identifier already exists: {0}")]
    DuplicateIdentifier(String),

    /// No property at the path
    #[error("Property not found: {0}")]
    NotFound(PropertyPath),

    /// The path points at a composite where a leaf was expected
    #[error("Property is not a value property: {0}")]
    NotALeaf(PropertyPath),

    /// The new value has a different kind than the property
    #[error("Type mismatch for {path}: expected {expected:?}, got {found:?}")]
    TypeMismatch {
        /// Property path
        path: PropertyPath,
        /// Kind of the property
        expected: PropertyKind,
        /// Kind of the rejected value
        found: PropertyKind,
    },
}

#[derive(Debug, Clone)]
enum PropertyContent {
    Value(PropertyValue),
    Composite(PropertyOwner),
}

/// A named leaf or composite property
#[derive(Debug, Clone)]
pub struct Property {
    identifier: String,
    display_name: String,
    content: PropertyContent,
    invalidation_level: InvalidationLevel,
    modified: bool,
}

impl Property {
    /// Create a leaf property that raises its processor to `InvalidOutput` on change
    pub fn new(identifier: impl Into<String>, value: PropertyValue) -> Self {
        let identifier = identifier.into();
        Self {
            display_name: identifier.clone(),
            identifier,
            content: PropertyContent::Value(value),
            invalidation_level: InvalidationLevel::InvalidOutput,
            modified: false,
        }
    }

    /// Boolean property
    pub fn bool(identifier: impl Into<String>, value: bool) -> Self {
        Self::new(identifier, PropertyValue::Bool(value))
    }

    /// Integer property
    pub fn int(identifier: impl Into<String>, value: i64) -> Self {
        Self::new(identifier, PropertyValue::Int(value))
    }

    /// Float property
    pub fn float(identifier: impl Into<String>, value: f64) -> Self {
        Self::new(identifier, PropertyValue::Float(value))
    }

    /// String property
    pub fn string(identifier: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(identifier, PropertyValue::String(value.into()))
    }

    /// Composite property grouping `children`
    pub fn composite(
        identifier: impl Into<String>,
        children: impl IntoIterator<Item = Property>,
    ) -> Result<Self, PropertyError> {
        let mut owner = PropertyOwner::new();
        for child in children {
            owner.add_property(child)?;
        }
        let identifier = identifier.into();
        Ok(Self {
            display_name: identifier.clone(),
            identifier,
            content: PropertyContent::Composite(owner),
            invalidation_level: InvalidationLevel::InvalidOutput,
            modified: false,
        })
    }

    /// Set the display name
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Changes to this property require resource reinitialization
    #[must_use]
    pub fn invalidates_resources(mut self) -> Self {
        self.invalidation_level = InvalidationLevel::InvalidResources;
        self
    }

    /// Identifier, unique within the owner
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Display name
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Level a change to this property raises its processor to
    pub fn invalidation_level(&self) -> InvalidationLevel {
        self.invalidation_level
    }

    /// Kind of property
    pub fn kind(&self) -> PropertyKind {
        match &self.content {
            PropertyContent::Value(value) => value.kind(),
            PropertyContent::Composite(_) => PropertyKind::Composite,
        }
    }

    /// Leaf value, `None` for composites
    pub fn value(&self) -> Option<&PropertyValue> {
        match &self.content {
            PropertyContent::Value(value) => Some(value),
            PropertyContent::Composite(_) => None,
        }
    }

    /// Children of a composite, `None` for leaves
    pub fn children(&self) -> Option<&PropertyOwner> {
        match &self.content {
            PropertyContent::Value(_) => None,
            PropertyContent::Composite(owner) => Some(owner),
        }
    }

    /// Whether the property changed since the processor last became valid
    pub fn is_modified(&self) -> bool {
        match &self.content {
            PropertyContent::Value(_) => self.modified,
            PropertyContent::Composite(owner) => self.modified || owner.is_modified(),
        }
    }
}

/// Ordered collection of properties, the root of a processor's configuration
#[derive(Debug, Clone, Default)]
pub struct PropertyOwner {
    properties: Vec<Property>,
}

impl PropertyOwner {
    /// Create an empty owner
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property at the end of the list
    pub fn add_property(&mut self, property: Property) -> Result<(), PropertyError> {
        if self.by_identifier(&property.identifier).is_some() {
            return Err(PropertyError::DuplicateIdentifier(property.identifier));
        }
        self.properties.push(property);
        Ok(())
    }

    /// Detach the property at `path`
    pub fn remove_property(&mut self, path: &PropertyPath) -> Option<Property> {
        let (last, parents) = path.segments().split_last()?;
        let mut owner = self;
        for segment in parents {
            owner = match &mut owner.by_identifier_mut(segment)?.content {
                PropertyContent::Composite(children) => children,
                PropertyContent::Value(_) => return None,
            };
        }
        let position = owner.properties.iter().position(|p| &p.identifier == last)?;
        Some(owner.properties.remove(position))
    }

    /// Direct children
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Number of direct children
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether there are no properties
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    fn by_identifier(&self, identifier: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.identifier == identifier)
    }

    fn by_identifier_mut(&mut self, identifier: &str) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.identifier == identifier)
    }

    /// Look up a property by path
    pub fn get(&self, path: &PropertyPath) -> Option<&Property> {
        let (first, rest) = path.segments().split_first()?;
        let mut property = self.by_identifier(first)?;
        for segment in rest {
            property = property.children()?.by_identifier(segment)?;
        }
        Some(property)
    }

    fn get_mut(&mut self, path: &PropertyPath) -> Option<&mut Property> {
        let (first, rest) = path.segments().split_first()?;
        let mut property = self.by_identifier_mut(first)?;
        for segment in rest {
            property = match &mut property.content {
                PropertyContent::Composite(children) => children.by_identifier_mut(segment)?,
                PropertyContent::Value(_) => return None,
            };
        }
        Some(property)
    }

    /// Value of the leaf at `path`
    pub fn value(&self, path: &PropertyPath) -> Option<&PropertyValue> {
        self.get(path).and_then(Property::value)
    }

    /// Set a leaf value.
    ///
    /// Returns the level the owning processor must be raised to, or `None`
    /// when the value did not change.
    pub fn set_value(
        &mut self,
        path: &PropertyPath,
        value: PropertyValue,
    ) -> Result<Option<InvalidationLevel>, PropertyError> {
        let property = self
            .get_mut(path)
            .ok_or_else(|| PropertyError::NotFound(path.clone()))?;
        let level = property.invalidation_level;
        let current = match &mut property.content {
            PropertyContent::Value(current) => current,
            PropertyContent::Composite(_) => return Err(PropertyError::NotALeaf(path.clone())),
        };
        if current.kind() != value.kind() {
            return Err(PropertyError::TypeMismatch {
                path: path.clone(),
                expected: current.kind(),
                found: value.kind(),
            });
        }
        if *current == value {
            return Ok(None);
        }
        *current = value;
        property.modified = true;
        Ok(Some(level))
    }

    /// Paths of all leaf properties, depth first
    pub fn leaf_paths(&self) -> Vec<PropertyPath> {
        let mut paths = Vec::new();
        self.collect_leaves(&PropertyPath(Vec::new()), &mut paths);
        paths
    }

    fn collect_leaves(&self, prefix: &PropertyPath, paths: &mut Vec<PropertyPath>) {
        for property in &self.properties {
            let path = prefix.child(&property.identifier);
            match &property.content {
                PropertyContent::Value(_) => paths.push(path),
                PropertyContent::Composite(children) => children.collect_leaves(&path, paths),
            }
        }
    }

    /// Whether any property changed since the last reset
    pub fn is_modified(&self) -> bool {
        self.properties.iter().any(Property::is_modified)
    }

    /// Clear all modified flags
    pub fn clear_modified(&mut self) {
        for property in &mut self.properties {
            property.modified = false;
            if let PropertyContent::Composite(children) = &mut property.content {
                children.clear_modified();
            }
        }
    }
}
