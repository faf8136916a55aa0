//! Resource graph rendering.
//!
//! The [`Renderer`] walks an instance graph and produces JSON:API document
//! pieces: full [`ResourceObject`]s with attributes and relationship
//! linkage, short [`ResourceIdentifier`] references, and a deduplicated
//! [`IncludedMap`] of side-loaded resources. [`Document`] assembles the
//! pieces into the top-level response shape.
//!
//! Three filters apply on every walk, independently:
//!
//! - **Permissions.** An instance failing its VIEW check never appears
//!   anywhere in the output. A field failing its VIEW check is omitted
//!   entirely, neither reference nor inclusion, so a denial leaks no
//!   partial information.
//! - **Sparse fieldsets.** `fields[<type>]` restricts which attributes
//!   and relationships render for that type, everywhere it appears.
//! - **Includes.** Recursion depth is bounded by the include tree; a
//!   relationship absent from the tree renders linkage but is not
//!   side-loaded.
//!
//! Foreign-key attributes backing a to-one relationship never render as
//! attributes; the relationship entry replaces them.
//!
//! # Example
//!
//! ```rust
//! use jsonapi_engine::permissions::RequestContext;
//! use jsonapi_engine::query::{FieldSelection, IncludeTree};
//! use jsonapi_engine::registry::{Registry, ResourceType};
//! use jsonapi_engine::render::{Document, Renderer};
//! use jsonapi_engine::store::MemoryStore;
//! use serde_json::json;
//!
//! let registry = Registry::builder()
//!     .register(ResourceType::builder("posts").attribute("title").build())
//!     .build()
//!     .unwrap();
//! let mut store = MemoryStore::new();
//! store.define_type("posts");
//! let post = store.insert("posts", "1", json!({"title": "Hello"})).unwrap();
//!
//! let ctx = RequestContext::anonymous();
//! let renderer = Renderer::new(&registry, &ctx);
//! let (object, included) = renderer
//!     .render_full(&store, &post, &IncludeTree::none(), &FieldSelection::unrestricted())
//!     .unwrap();
//! let document = Document::single(object, included);
//! assert_eq!(document.to_value()["data"]["attributes"]["title"], json!("Hello"));
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::ApiError;
use crate::permissions::{self, Permission, RequestContext};
use crate::query::{FieldSelection, IncludeTree};
use crate::registry::Registry;
use crate::store::{InstanceRef, Related, ResourceStore};

/// A short `{id, type}` resource reference.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResourceIdentifier {
    /// The instance's id.
    pub id: String,
    /// The external type name.
    #[serde(rename = "type")]
    pub type_name: String,
}

impl From<&InstanceRef> for ResourceIdentifier {
    fn from(instance: &InstanceRef) -> Self {
        Self {
            id: instance.id.clone(),
            type_name: instance.type_name.clone(),
        }
    }
}

/// Relationship linkage: a single reference (or null) for to-one, a list
/// for to-many. The two shapes never mix.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RelationshipData {
    /// To-one linkage.
    One(Option<ResourceIdentifier>),
    /// To-many linkage.
    Many(Vec<ResourceIdentifier>),
}

/// The `links` member of a relationship object.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RelationshipLinks {
    /// Link to the relationship itself.
    #[serde(rename = "self")]
    pub self_link: String,
    /// Link to the related resource(s).
    pub related: String,
}

impl RelationshipLinks {
    fn new(type_name: &str, id: &str, relationship: &str) -> Self {
        Self {
            self_link: format!("/{type_name}/{id}/relationships/{relationship}/"),
            related: format!("/{type_name}/{id}/{relationship}/"),
        }
    }
}

/// One entry under a resource object's `relationships` member.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RelationshipObject {
    /// Current linkage, filtered by per-target VIEW checks.
    pub data: RelationshipData,
    /// Navigation links.
    pub links: RelationshipLinks,
}

/// A full JSON:API resource object.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResourceObject {
    /// The instance's id.
    pub id: String,
    /// The external type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Rendered attributes, sorted by key.
    pub attributes: Map<String, Value>,
    /// Rendered relationship objects, sorted by name.
    pub relationships: BTreeMap<String, RelationshipObject>,
}

impl ResourceObject {
    fn key(&self) -> (String, String) {
        (self.type_name.clone(), self.id.clone())
    }
}

/// Side-loaded resources keyed by `(type, id)`. The key is the
/// deduplication invariant: a resource reachable via two include paths
/// renders once.
pub type IncludedMap = BTreeMap<(String, String), ResourceObject>;

// All document types are string-keyed plain data; serializing them cannot
// fail.
fn value_of<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// A top-level JSON:API document.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    /// Primary data: object, array, reference(s), or null.
    pub data: Value,
    /// Deduplicated side-loaded resources.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<ResourceObject>,
    /// Document metadata.
    pub meta: Value,
    /// Protocol version marker.
    pub jsonapi: Value,
}

impl Document {
    fn assemble(data: Value, included: IncludedMap) -> Self {
        Self {
            data,
            included: included.into_values().collect(),
            meta: json!({ "jsonapi_engine_version": env!("CARGO_PKG_VERSION") }),
            jsonapi: json!({ "version": "1.0" }),
        }
    }

    /// A single-resource document. The primary object's `(type, id)` is
    /// removed from `included` so it never renders twice.
    #[must_use]
    pub fn single(primary: ResourceObject, mut included: IncludedMap) -> Self {
        included.remove(&primary.key());
        Self::assemble(value_of(&primary), included)
    }

    /// A collection document. Every primary object's `(type, id)` is
    /// removed from `included`.
    #[must_use]
    pub fn collection(primary: Vec<ResourceObject>, mut included: IncludedMap) -> Self {
        for object in &primary {
            included.remove(&object.key());
        }
        Self::assemble(value_of(&primary), included)
    }

    /// A to-one relationship document: a short reference or null.
    #[must_use]
    pub fn identifier(target: Option<ResourceIdentifier>) -> Self {
        Self::assemble(value_of(&target), IncludedMap::new())
    }

    /// A to-many relationship document: a list of short references.
    #[must_use]
    pub fn identifiers(targets: Vec<ResourceIdentifier>) -> Self {
        Self::assemble(value_of(&targets), IncludedMap::new())
    }

    /// Serializes the document to a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        value_of(self)
    }
}

/// Walks instance graphs into document pieces for one request.
#[derive(Debug, Clone, Copy)]
pub struct Renderer<'a> {
    registry: &'a Registry,
    ctx: &'a RequestContext,
}

impl<'a> Renderer<'a> {
    /// Creates a renderer bound to a registry and a request context.
    #[must_use]
    pub const fn new(registry: &'a Registry, ctx: &'a RequestContext) -> Self {
        Self { registry, ctx }
    }

    /// Renders an instance as a full resource object plus its side-loaded
    /// includes.
    ///
    /// The caller is responsible for VIEW-checking the root instance;
    /// related instances are VIEW-checked here and silently filtered.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotARelationship`] when the include tree names
    /// a field that is not a relationship of the instance's type, and
    /// propagates store errors.
    pub fn render_full(
        &self,
        store: &dyn ResourceStore,
        instance: &InstanceRef,
        include: &IncludeTree,
        fields: &FieldSelection,
    ) -> Result<(ResourceObject, IncludedMap), ApiError> {
        let mut included = IncludedMap::new();
        let object = self.render_into(store, instance, include, fields, &mut included)?;
        Ok((object, included))
    }

    /// Whether an instance passes its instance-wide VIEW check.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::ResourceTypeNotFound`] for an unregistered
    /// type.
    pub fn viewable(
        &self,
        store: &dyn ResourceStore,
        instance: &InstanceRef,
    ) -> Result<bool, ApiError> {
        let ty = self.registry.resolve(&instance.type_name)?;
        Ok(permissions::check(
            self.ctx,
            store,
            ty,
            Some(instance),
            None,
            Permission::View,
        ))
    }

    fn render_into(
        &self,
        store: &dyn ResourceStore,
        instance: &InstanceRef,
        include: &IncludeTree,
        fields: &FieldSelection,
        included: &mut IncludedMap,
    ) -> Result<ResourceObject, ApiError> {
        let ty = self.registry.resolve(&instance.type_name)?;

        // Include paths are validated lazily, once the type is known.
        for key in include.keys() {
            if ty.relationship(key).is_none() {
                return Err(ApiError::NotARelationship {
                    type_name: ty.name().to_string(),
                    field: key.to_string(),
                });
            }
        }

        // Relationship names and their backing foreign keys never render
        // as attributes.
        let mut hidden: BTreeSet<&str> = BTreeSet::new();
        for relationship in ty.relationships() {
            hidden.insert(relationship.name());
            if let Some(fk) = relationship.foreign_key() {
                hidden.insert(fk);
            }
        }

        let mut attributes = Map::new();
        for attribute in ty.attributes() {
            let name = attribute.name();
            if name == "id" || hidden.contains(name) {
                continue;
            }
            if !fields.allows(ty.name(), name) {
                continue;
            }
            if !permissions::check(
                self.ctx,
                store,
                ty,
                Some(instance),
                Some(name),
                Permission::View,
            ) {
                continue;
            }
            let raw = store.attribute(instance, name)?;
            attributes.insert(name.to_string(), attribute.get(raw));
        }

        let mut relationships = BTreeMap::new();
        for relationship in ty.relationships() {
            let name = relationship.name();
            if !fields.allows(ty.name(), name) {
                continue;
            }
            if !permissions::check(
                self.ctx,
                store,
                ty,
                Some(instance),
                Some(name),
                Permission::View,
            ) {
                // Omitted entirely: neither reference nor inclusion.
                continue;
            }
            let subtree = include.child(name);
            let data = match store.get_relationship(instance, name)? {
                Related::One(target) => {
                    let visible = match target {
                        Some(target) if self.viewable(store, &target)? => Some(target),
                        _ => None,
                    };
                    if let (Some(target), Some(subtree)) = (&visible, subtree) {
                        self.side_load(store, target, subtree, fields, included)?;
                    }
                    RelationshipData::One(visible.as_ref().map(ResourceIdentifier::from))
                }
                Related::Many(targets) => {
                    let mut references = Vec::new();
                    for target in targets {
                        if !self.viewable(store, &target)? {
                            continue;
                        }
                        if let Some(subtree) = subtree {
                            self.side_load(store, &target, subtree, fields, included)?;
                        }
                        references.push(ResourceIdentifier::from(&target));
                    }
                    RelationshipData::Many(references)
                }
            };
            relationships.insert(
                name.to_string(),
                RelationshipObject {
                    data,
                    links: RelationshipLinks::new(ty.name(), &instance.id, name),
                },
            );
        }

        Ok(ResourceObject {
            id: instance.id.clone(),
            type_name: ty.name().to_string(),
            attributes,
            relationships,
        })
    }

    fn side_load(
        &self,
        store: &dyn ResourceStore,
        instance: &InstanceRef,
        subtree: &IncludeTree,
        fields: &FieldSelection,
        included: &mut IncludedMap,
    ) -> Result<(), ApiError> {
        // First render wins; merged include trees share subtrees, so a
        // repeat visit has nothing new to add.
        if included.contains_key(&instance.key()) {
            return Ok(());
        }
        let object = self.render_into(store, instance, subtree, fields, included)?;
        included.insert(instance.key(), object);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Attribute, Relationship, ResourceType};
    use crate::store::MemoryStore;

    fn registry() -> Registry {
        Registry::builder()
            .register(
                ResourceType::builder("posts")
                    .attribute("title")
                    .attribute("author_id")
                    .relationship(
                        Relationship::to_one("author", "users").with_foreign_key("author_id"),
                    )
                    .relationship(Relationship::to_many("comments", "comments"))
                    .build(),
            )
            .register(
                ResourceType::builder("users")
                    .attribute("name")
                    .attribute(Attribute::new("password").unsortable())
                    .permission(Some("password"), Permission::View, |_, _, _| false)
                    .relationship(Relationship::to_many("posts", "posts"))
                    .build(),
            )
            .register(
                ResourceType::builder("comments")
                    .attribute("body")
                    .relationship(Relationship::to_one("author", "users"))
                    .relationship(Relationship::to_one("post", "posts"))
                    .build(),
            )
            .build()
            .unwrap()
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.define_type("posts");
        store.define_to_one("posts", "author");
        store.define_to_many("posts", "comments");
        store.define_type("users");
        store.define_to_many("users", "posts");
        store.define_type("comments");
        store.define_to_one("comments", "author");
        store.define_to_one("comments", "post");

        let user = store
            .insert("users", "1", json!({"name": "ann", "password": "hunter2"}))
            .unwrap();
        let post = store
            .insert("posts", "1", json!({"title": "Hello", "author_id": "1"}))
            .unwrap();
        let comment = store.insert("comments", "1", json!({"body": "First"})).unwrap();

        store
            .set_relationship(&post, "author", Related::One(Some(user.clone())))
            .unwrap();
        store.append_relationship(&post, "comments", &comment).unwrap();
        store.append_relationship(&user, "posts", &post).unwrap();
        store
            .set_relationship(&comment, "author", Related::One(Some(user)))
            .unwrap();
        store
            .set_relationship(&comment, "post", Related::One(Some(post)))
            .unwrap();
        store
    }

    fn render(
        include: &str,
        raw_fields: &[(&str, &str)],
    ) -> (ResourceObject, IncludedMap) {
        let registry = registry();
        let store = store();
        let ctx = RequestContext::anonymous();
        let renderer = Renderer::new(&registry, &ctx);
        let mut fields = std::collections::HashMap::new();
        for (key, value) in raw_fields {
            fields.insert((*key).to_string(), (*value).to_string());
        }
        let params = crate::query::QueryParams::parse(&fields).unwrap();
        renderer
            .render_full(
                &store,
                &InstanceRef::new("posts", "1"),
                &IncludeTree::parse(include),
                &params.fields,
            )
            .unwrap()
    }

    #[test]
    fn test_foreign_key_never_renders_as_attribute() {
        let (object, _) = render("", &[]);
        assert_eq!(object.attributes.get("title"), Some(&json!("Hello")));
        assert!(!object.attributes.contains_key("author_id"));
        assert!(object.relationships.contains_key("author"));
    }

    #[test]
    fn test_to_one_and_to_many_linkage_shapes() {
        let (object, _) = render("", &[]);
        assert_eq!(
            object.relationships["author"].data,
            RelationshipData::One(Some(ResourceIdentifier {
                id: "1".to_string(),
                type_name: "users".to_string()
            }))
        );
        assert_eq!(
            object.relationships["comments"].data,
            RelationshipData::Many(vec![ResourceIdentifier {
                id: "1".to_string(),
                type_name: "comments".to_string()
            }])
        );
    }

    #[test]
    fn test_relationship_links_shape() {
        let (object, _) = render("", &[]);
        let links = &object.relationships["author"].links;
        assert_eq!(links.self_link, "/posts/1/relationships/author/");
        assert_eq!(links.related, "/posts/1/author/");
    }

    #[test]
    fn test_include_side_loads_and_deduplicates() {
        // ann is reachable as post author and as comment author; she must
        // render once.
        let (_, included) = render("author,comments.author", &[]);
        let keys: Vec<&(String, String)> = included.keys().collect();
        assert_eq!(
            keys,
            vec![
                &("comments".to_string(), "1".to_string()),
                &("users".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_primary_resource_not_duplicated_into_included() {
        let (object, included) = render("comments.post", &[]);
        let document = Document::single(object, included);
        assert!(document.included.is_empty());
        assert_eq!(document.to_value()["data"]["id"], json!("1"));
    }

    #[test]
    fn test_include_of_non_relationship_is_an_error() {
        let registry = registry();
        let store = store();
        let ctx = RequestContext::anonymous();
        let renderer = Renderer::new(&registry, &ctx);
        let err = renderer
            .render_full(
                &store,
                &InstanceRef::new("posts", "1"),
                &IncludeTree::parse("title"),
                &FieldSelection::unrestricted(),
            )
            .unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(err.code(), "not_a_relationship");
    }

    #[test]
    fn test_sparse_fields_restrict_attributes_and_relationships() {
        let (object, _) = render("", &[("fields[posts]", "title")]);
        assert!(object.attributes.contains_key("title"));
        assert!(object.relationships.is_empty());

        let (object, _) = render("", &[("fields[posts]", "comments")]);
        assert!(object.attributes.is_empty());
        assert!(object.relationships.contains_key("comments"));
        assert!(!object.relationships.contains_key("author"));
    }

    #[test]
    fn test_view_denied_attribute_is_omitted() {
        let (_, included) = render("author", &[]);
        let ann = &included[&("users".to_string(), "1".to_string())];
        assert_eq!(ann.attributes.get("name"), Some(&json!("ann")));
        assert!(!ann.attributes.contains_key("password"));
    }

    #[test]
    fn test_view_denied_instance_vanishes_from_linkage_and_included() {
        let registry = Registry::builder()
            .register(
                ResourceType::builder("posts")
                    .attribute("title")
                    .relationship(Relationship::to_one("author", "users"))
                    .relationship(Relationship::to_many("comments", "comments"))
                    .build(),
            )
            .register(
                ResourceType::builder("users")
                    .attribute("name")
                    .permission(None, Permission::View, |_, _, _| false)
                    .build(),
            )
            .register(
                ResourceType::builder("comments")
                    .attribute("body")
                    .permission(None, Permission::View, |_, _, _| false)
                    .build(),
            )
            .build()
            .unwrap();
        let store = store();
        let ctx = RequestContext::anonymous();
        let renderer = Renderer::new(&registry, &ctx);
        let (object, included) = renderer
            .render_full(
                &store,
                &InstanceRef::new("posts", "1"),
                &IncludeTree::parse("author,comments"),
                &FieldSelection::unrestricted(),
            )
            .unwrap();

        // To-one linkage to a denied instance renders as null; denied
        // to-many members drop silently; nothing is side-loaded.
        assert_eq!(object.relationships["author"].data, RelationshipData::One(None));
        assert_eq!(
            object.relationships["comments"].data,
            RelationshipData::Many(vec![])
        );
        assert!(included.is_empty());
    }

    #[test]
    fn test_view_denied_relationship_field_is_omitted_entirely() {
        let registry = Registry::builder()
            .register(
                ResourceType::builder("posts")
                    .attribute("title")
                    .relationship(Relationship::to_one("author", "users"))
                    .permission(Some("author"), Permission::View, |_, _, _| false)
                    .build(),
            )
            .register(ResourceType::builder("users").attribute("name").build())
            .build()
            .unwrap();
        let store = store();
        let ctx = RequestContext::anonymous();
        let renderer = Renderer::new(&registry, &ctx);
        let (object, included) = renderer
            .render_full(
                &store,
                &InstanceRef::new("posts", "1"),
                &IncludeTree::parse("author"),
                &FieldSelection::unrestricted(),
            )
            .unwrap();
        assert!(!object.relationships.contains_key("author"));
        assert!(included.is_empty());
    }

    #[test]
    fn test_viewable_reports_instance_predicate() {
        let registry = Registry::builder()
            .register(
                ResourceType::builder("users")
                    .permission(None, Permission::View, |ctx, _, _| {
                        ctx.actor.as_deref() == Some("admin")
                    })
                    .build(),
            )
            .build()
            .unwrap();
        let store = store();
        let anonymous = RequestContext::anonymous();
        let admin = RequestContext::for_actor("admin");
        let target = InstanceRef::new("users", "1");
        assert!(!Renderer::new(&registry, &anonymous)
            .viewable(&store, &target)
            .unwrap());
        assert!(Renderer::new(&registry, &admin)
            .viewable(&store, &target)
            .unwrap());
    }

    #[test]
    fn test_document_envelope_members() {
        let document = Document::identifier(None);
        let value = document.to_value();
        assert_eq!(value["data"], Value::Null);
        assert_eq!(value["jsonapi"]["version"], json!("1.0"));
        assert!(value["meta"]["jsonapi_engine_version"].is_string());
        assert!(value.get("included").is_none());
    }

    #[test]
    fn test_idempotent_rendering_with_sparse_fields() {
        let first = serde_json::to_string(&render("", &[("fields[posts]", "title")]).0);
        let second = serde_json::to_string(&render("", &[("fields[posts]", "title")]).0);
        assert_eq!(first.unwrap(), second.unwrap());
    }
}
