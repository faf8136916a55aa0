//! Collection endpoint handlers: listing and creation.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::ApiError;
use crate::permissions::{self, Permission, RequestContext};
use crate::query::QueryParams;
use crate::registry::{Registry, ResourceType};
use crate::render::{Document, IncludedMap, Renderer};
use crate::store::{InstanceRef, ResourceStore};

use super::{data_of, fetch_linked, JsonApiResponse};

// Cross-type ordering for sort keys: null < bool < number < string <
// composite. Within composites, the serialized form decides.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    const fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(_) | Value::Object(_), Value::Array(_) | Value::Object(_)) => {
            a.to_string().cmp(&b.to_string())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

// A sort key must name a sortable attribute. Relationships, unknown
// names, and unsortable attributes all fail the same way.
fn validate_sort_keys(ty: &ResourceType, query: &QueryParams) -> Result<(), ApiError> {
    for key in &query.sort {
        let sortable = ty.relationship(&key.field).is_none()
            && ty
                .attribute(&key.field)
                .is_some_and(|attribute| attribute.is_sortable());
        if !sortable {
            return Err(ApiError::NotSortable {
                type_name: ty.name().to_string(),
                field: key.field.clone(),
            });
        }
    }
    Ok(())
}

fn sorted_members(
    ty: &ResourceType,
    store: &dyn ResourceStore,
    members: Vec<InstanceRef>,
    query: &QueryParams,
) -> Result<Vec<InstanceRef>, ApiError> {
    if query.sort.is_empty() {
        return Ok(members);
    }
    // Decorate each member with its sort key values, sort, undecorate.
    let mut decorated = Vec::with_capacity(members.len());
    for instance in members {
        let mut keys = Vec::with_capacity(query.sort.len());
        for key in &query.sort {
            let raw = store.attribute(&instance, &key.field)?;
            let value = ty
                .attribute(&key.field)
                .map_or(Value::Null, |attribute| attribute.get(raw));
            keys.push(value);
        }
        decorated.push((keys, instance));
    }
    decorated.sort_by(|(a, _), (b, _)| {
        for (position, key) in query.sort.iter().enumerate() {
            let ordering = compare_values(&a[position], &b[position]);
            let ordering = if key.ascending {
                ordering
            } else {
                ordering.reverse()
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(decorated.into_iter().map(|(_, instance)| instance).collect())
}

/// `GET /{type}/`: sort, paginate, VIEW-filter, and render the collection.
///
/// Pagination positions count VIEW-passing members, so a denied instance
/// never shifts a page boundary it is not part of. An out-of-range page
/// yields an empty 200, not an error.
pub(super) fn get_collection(
    registry: &Registry,
    store: &dyn ResourceStore,
    ctx: &RequestContext,
    type_name: &str,
    query: &QueryParams,
) -> Result<JsonApiResponse, ApiError> {
    let ty = registry.resolve(type_name)?;
    validate_sort_keys(ty, query)?;
    let members = sorted_members(ty, store, store.query(type_name)?, query)?;

    let renderer = Renderer::new(registry, ctx);
    let mut objects = Vec::new();
    let mut included = IncludedMap::new();
    let mut position: i64 = 0;
    for instance in members {
        if !permissions::check(ctx, store, ty, Some(&instance), None, Permission::View) {
            continue;
        }
        if query.page.contains(position) {
            let (object, side_loaded) =
                renderer.render_full(store, &instance, &query.include, &query.fields)?;
            objects.push(object);
            included.extend(side_loaded);
        }
        position += 1;
    }
    Ok(JsonApiResponse::ok(&Document::collection(objects, included)))
}

pub(super) fn apply_attributes(
    ty: &ResourceType,
    store: &mut dyn ResourceStore,
    instance: &InstanceRef,
    attributes: &Value,
) -> Result<(), ApiError> {
    let Value::Object(attributes) = attributes else {
        return Err(ApiError::BadRequest {
            detail: "The attributes member must be a JSON object".to_string(),
        });
    };
    for (name, value) in attributes {
        if ty.relationship(name).is_some() {
            return Err(ApiError::Validation {
                detail: format!("Relationship '{name}' must be set under relationships"),
            });
        }
        let attribute = ty
            .attribute(name)
            .ok_or_else(|| ApiError::NotAnAttribute {
                type_name: ty.name().to_string(),
                field: name.clone(),
            })?;
        let value = attribute.set(value.clone())?;
        store.set_attribute(instance, name, value)?;
    }
    Ok(())
}

pub(super) fn apply_relationships(
    ty: &ResourceType,
    store: &mut dyn ResourceStore,
    instance: &InstanceRef,
    relationships: &Value,
) -> Result<(), ApiError> {
    let Value::Object(relationships) = relationships else {
        return Err(ApiError::BadRequest {
            detail: "The relationships member must be a JSON object".to_string(),
        });
    };
    for (name, value) in relationships {
        let relationship =
            ty.relationship(name)
                .ok_or_else(|| ApiError::RelationshipNotFound {
                    type_name: ty.name().to_string(),
                    relationship: name.clone(),
                })?;
        let data = value.get("data").ok_or_else(|| ApiError::BadRequest {
            detail: format!("Relationship '{name}' must carry a data key"),
        })?;
        let linked = resolve_linkage(&*store, relationship, data)?;
        store.set_relationship(instance, name, linked)?;
    }
    Ok(())
}

/// `POST /{type}/`: create a resource from a JSON:API payload.
///
/// The payload `type` must match the endpoint; a client-supplied `id` is
/// honored when the store accepts it. Attributes and relationships apply
/// inside one transaction, committed before rendering the 201 body.
pub(super) fn post_collection(
    registry: &Registry,
    store: &mut dyn ResourceStore,
    ctx: &RequestContext,
    type_name: &str,
    body: Option<&Value>,
) -> Result<JsonApiResponse, ApiError> {
    let ty = registry.resolve(type_name)?;
    let data = data_of(body)?;
    let payload_type = data
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ApiError::MissingType)?;
    if payload_type != type_name {
        return Err(ApiError::InvalidTypeForEndpoint {
            expected: type_name.to_string(),
            actual: payload_type.to_string(),
        });
    }
    permissions::enforce(ctx, store, ty, None, None, Permission::Create)?;

    store.begin();
    let client_id = data.get("id").and_then(Value::as_str);
    let instance = store.create(type_name, client_id)?;
    if let Some(attributes) = data.get("attributes") {
        apply_attributes(ty, store, &instance, attributes)?;
    }
    if let Some(relationships) = data.get("relationships") {
        apply_relationships(ty, store, &instance, relationships)?;
    }
    store.commit()?;

    let renderer = Renderer::new(registry, ctx);
    let defaults = QueryParams::none();
    let (object, included) =
        renderer.render_full(store, &instance, &defaults.include, &defaults.fields)?;
    Ok(JsonApiResponse::created(&Document::single(object, included)))
}

/// Resolves a relationship `data` payload into store linkage, enforcing
/// cardinality: a hash or null for to-one, a list of hashes for to-many.
pub(crate) fn resolve_linkage(
    store: &dyn ResourceStore,
    relationship: &crate::registry::Relationship,
    data: &Value,
) -> Result<crate::store::Related, ApiError> {
    use crate::registry::Cardinality;
    use crate::store::Related;

    match relationship.cardinality() {
        Cardinality::One => match data {
            Value::Null => Ok(Related::One(None)),
            Value::Object(_) => {
                let target = fetch_linked(store, relationship.target(), data)?;
                Ok(Related::One(Some(target)))
            }
            _ => Err(ApiError::Validation {
                detail: "Provided data must be a hash".to_string(),
            }),
        },
        Cardinality::Many => {
            let Value::Array(items) = data else {
                return Err(ApiError::Validation {
                    detail: "Provided data must be a list of hashes".to_string(),
                });
            };
            let mut members = Vec::with_capacity(items.len());
            for item in items {
                members.push(fetch_linked(store, relationship.target(), item)?);
            }
            Ok(Related::Many(members))
        }
    }
}
