//! Resource type metadata: attributes, relationships, and descriptors.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::error::ApiError;
use crate::permissions::{Permission, PermissionPredicate, RequestContext};
use crate::store::{InstanceRef, ResourceStore};

/// Relationship cardinality. Drives reference-vs-list rendering and
/// distinct mutation rules throughout the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// A single target or none.
    One,
    /// Zero or more targets.
    Many,
}

/// A custom attribute getter: transforms the raw stored value before it is
/// rendered.
pub type AttributeGetter = Box<dyn Fn(Value) -> Value + Send + Sync>;

/// A custom attribute setter: validates or transforms an inbound payload
/// value before it is written to the store.
pub type AttributeSetter = Box<dyn Fn(Value) -> Result<Value, ApiError> + Send + Sync>;

/// An attribute descriptor: name, sortability, and optional get/set
/// overrides. Absent a custom getter, the raw stored value is used as-is.
pub struct Attribute {
    name: String,
    sortable: bool,
    getter: Option<AttributeGetter>,
    setter: Option<AttributeSetter>,
}

impl Attribute {
    /// Creates a plain, sortable attribute with default accessors.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sortable: true,
            getter: None,
            setter: None,
        }
    }

    /// Excludes the attribute from `sort` keys.
    #[must_use]
    pub fn unsortable(mut self) -> Self {
        self.sortable = false;
        self
    }

    /// Registers a getter override.
    #[must_use]
    pub fn with_getter(mut self, getter: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.getter = Some(Box::new(getter));
        self
    }

    /// Registers a setter override.
    #[must_use]
    pub fn with_setter(
        mut self,
        setter: impl Fn(Value) -> Result<Value, ApiError> + Send + Sync + 'static,
    ) -> Self {
        self.setter = Some(Box::new(setter));
        self
    }

    /// The attribute's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the attribute may be used as a sort key.
    #[must_use]
    pub const fn is_sortable(&self) -> bool {
        self.sortable
    }

    /// Applies the getter descriptor to a raw stored value.
    #[must_use]
    pub fn get(&self, raw: Value) -> Value {
        self.getter.as_ref().map_or(raw.clone(), |getter| getter(raw))
    }

    /// Applies the setter descriptor to an inbound payload value.
    ///
    /// # Errors
    ///
    /// Propagates the setter's error, typically [`ApiError::Validation`].
    pub fn set(&self, value: Value) -> Result<Value, ApiError> {
        self.setter.as_ref().map_or(Ok(value.clone()), |setter| setter(value))
    }
}

impl From<&str> for Attribute {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl std::fmt::Debug for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("sortable", &self.sortable)
            .field("getter", &self.getter.as_ref().map(|_| "<fn>"))
            .field("setter", &self.setter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// A relationship descriptor.
///
/// The cardinality is declared from the store's metadata, never guessed.
/// A to-one relationship may name the local foreign-key attribute, which
/// the renderer strips from `attributes` (JSON:API forbids exposing raw
/// foreign keys).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    name: String,
    target: String,
    cardinality: Cardinality,
    back_reference: Option<String>,
    foreign_key: Option<String>,
    cascade_delete: bool,
}

impl Relationship {
    /// Declares a to-one relationship to `target`.
    #[must_use]
    pub fn to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::One,
            back_reference: None,
            foreign_key: None,
            cascade_delete: false,
        }
    }

    /// Declares a to-many relationship to `target`.
    #[must_use]
    pub fn to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::Many,
            back_reference: None,
            foreign_key: None,
            cascade_delete: false,
        }
    }

    /// Names the inverse relationship on the target type.
    #[must_use]
    pub fn with_back_reference(mut self, name: impl Into<String>) -> Self {
        self.back_reference = Some(name.into());
        self
    }

    /// Names the local foreign-key attribute backing this to-one
    /// relationship.
    #[must_use]
    pub fn with_foreign_key(mut self, attribute: impl Into<String>) -> Self {
        self.foreign_key = Some(attribute.into());
        self
    }

    /// Propagates deletion of the owner to the relationship's targets.
    #[must_use]
    pub const fn cascading_delete(mut self) -> Self {
        self.cascade_delete = true;
        self
    }

    /// The relationship's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The external type name of the target.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The declared cardinality.
    #[must_use]
    pub const fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// The inverse relationship name on the target type, if declared.
    #[must_use]
    pub fn back_reference(&self) -> Option<&str> {
        self.back_reference.as_deref()
    }

    /// The local foreign-key attribute, if declared.
    #[must_use]
    pub fn foreign_key(&self) -> Option<&str> {
        self.foreign_key.as_deref()
    }

    /// Whether deleting the owner cascades to the targets.
    #[must_use]
    pub const fn cascades_delete(&self) -> bool {
        self.cascade_delete
    }
}

type PermissionKey = (Option<String>, Permission);

/// A registered resource type: external name, attribute and relationship
/// tables, and permission predicates. Built once via
/// [`ResourceTypeBuilder`]; immutable thereafter.
pub struct ResourceType {
    name: String,
    attributes: BTreeMap<String, Attribute>,
    relationships: BTreeMap<String, Relationship>,
    permissions: HashMap<PermissionKey, PermissionPredicate>,
}

impl ResourceType {
    /// Starts building a type with the given external name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ResourceTypeBuilder {
        ResourceTypeBuilder {
            name: name.into(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
            permissions: HashMap::new(),
        }
    }

    /// The external, URL-safe type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up an attribute descriptor by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Iterates attributes in stable (sorted) order.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    /// Looks up a relationship descriptor by name.
    #[must_use]
    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.get(name)
    }

    /// Iterates relationships in stable (sorted) order.
    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }

    /// Looks up the predicate registered for `(field, permission)`.
    #[must_use]
    pub fn predicate(
        &self,
        field: Option<&str>,
        permission: Permission,
    ) -> Option<&PermissionPredicate> {
        self.permissions
            .get(&(field.map(ToString::to_string), permission))
    }
}

impl std::fmt::Debug for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceType")
            .field("name", &self.name)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field(
                "relationships",
                &self.relationships.keys().collect::<Vec<_>>(),
            )
            .field("permissions", &format!("<{} predicates>", self.permissions.len()))
            .finish()
    }
}

/// Builder for [`ResourceType`].
pub struct ResourceTypeBuilder {
    name: String,
    attributes: BTreeMap<String, Attribute>,
    relationships: BTreeMap<String, Relationship>,
    permissions: HashMap<PermissionKey, PermissionPredicate>,
}

impl ResourceTypeBuilder {
    /// Adds an attribute. Accepts a bare name or a full [`Attribute`]
    /// descriptor; a repeated name replaces the earlier descriptor.
    #[must_use]
    pub fn attribute(mut self, attribute: impl Into<Attribute>) -> Self {
        let attribute = attribute.into();
        self.attributes.insert(attribute.name().to_string(), attribute);
        self
    }

    /// Adds a relationship; a repeated name replaces the earlier
    /// descriptor.
    #[must_use]
    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationships
            .insert(relationship.name().to_string(), relationship);
        self
    }

    /// Registers a permission predicate for `(field, permission)`.
    ///
    /// `field = None` registers the instance-wide predicate.
    #[must_use]
    pub fn permission(
        mut self,
        field: Option<&str>,
        permission: Permission,
        predicate: impl Fn(&RequestContext, &dyn ResourceStore, Option<&InstanceRef>) -> bool
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.permissions.insert(
            (field.map(ToString::to_string), permission),
            Box::new(predicate),
        );
        self
    }

    /// Finishes the type.
    #[must_use]
    pub fn build(self) -> ResourceType {
        ResourceType {
            name: self.name,
            attributes: self.attributes,
            relationships: self.relationships,
            permissions: self.permissions,
        }
    }
}
