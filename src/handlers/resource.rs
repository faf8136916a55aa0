//! Single-resource endpoint handlers: fetch, update, delete.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::ApiError;
use crate::permissions::{self, Permission, RequestContext};
use crate::query::QueryParams;
use crate::registry::Registry;
use crate::render::{Document, Renderer};
use crate::store::{InstanceRef, Related, ResourceStore};

use super::{collection, data_of, JsonApiResponse};

fn fetch_instance(
    store: &dyn ResourceStore,
    type_name: &str,
    id: &str,
) -> Result<InstanceRef, ApiError> {
    store
        .fetch(type_name, id)?
        .ok_or_else(|| ApiError::ResourceNotFound {
            type_name: type_name.to_string(),
            id: id.to_string(),
        })
}

/// `GET /{type}/{id}/`: render one resource with includes and sparse
/// fields.
pub(super) fn get_resource(
    registry: &Registry,
    store: &dyn ResourceStore,
    ctx: &RequestContext,
    type_name: &str,
    id: &str,
    query: &QueryParams,
) -> Result<JsonApiResponse, ApiError> {
    let ty = registry.resolve(type_name)?;
    let instance = fetch_instance(store, type_name, id)?;
    permissions::enforce(ctx, store, ty, Some(&instance), None, Permission::View)?;

    let renderer = Renderer::new(registry, ctx);
    let (object, included) =
        renderer.render_full(store, &instance, &query.include, &query.fields)?;
    Ok(JsonApiResponse::ok(&Document::single(object, included)))
}

/// `PATCH /{type}/{id}/`: partial update of attributes and relationships.
///
/// The payload must carry `type` and `id` members matching the endpoint.
/// Every touched field needs EDIT; a to-many relationship in the payload
/// replaces the membership wholesale.
pub(super) fn patch_resource(
    registry: &Registry,
    store: &mut dyn ResourceStore,
    ctx: &RequestContext,
    type_name: &str,
    id: &str,
    body: Option<&Value>,
) -> Result<JsonApiResponse, ApiError> {
    let ty = registry.resolve(type_name)?;
    let instance = fetch_instance(&*store, type_name, id)?;
    permissions::enforce(ctx, store, ty, Some(&instance), None, Permission::Edit)?;

    let data = data_of(body)?;
    let payload_type = data.get("type").and_then(Value::as_str);
    let payload_id = match data.get("id") {
        Some(Value::String(id)) => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    };
    let (Some(payload_type), Some(payload_id)) = (payload_type, payload_id) else {
        return Err(ApiError::BadRequest {
            detail: "Request data must carry type and id members".to_string(),
        });
    };
    if payload_type != type_name {
        return Err(ApiError::InvalidTypeForEndpoint {
            expected: type_name.to_string(),
            actual: payload_type.to_string(),
        });
    }
    if payload_id != id {
        return Err(ApiError::BadRequest {
            detail: "Payload id does not match the endpoint id".to_string(),
        });
    }

    for member in ["attributes", "relationships"] {
        if let Some(Value::Object(fields)) = data.get(member) {
            for name in fields.keys() {
                permissions::enforce(
                    ctx,
                    store,
                    ty,
                    Some(&instance),
                    Some(name),
                    Permission::Edit,
                )?;
            }
        }
    }

    store.begin();
    if let Some(attributes) = data.get("attributes") {
        collection::apply_attributes(ty, store, &instance, attributes)?;
    }
    if let Some(relationships) = data.get("relationships") {
        collection::apply_relationships(ty, store, &instance, relationships)?;
    }
    store.commit()?;

    let renderer = Renderer::new(registry, ctx);
    let defaults = QueryParams::none();
    let (object, included) =
        renderer.render_full(store, &instance, &defaults.include, &defaults.fields)?;
    Ok(JsonApiResponse::ok(&Document::single(object, included)))
}

// Depth-first collection of the cascade closure. Children land before
// their owner, so deletion runs leaf-first; the visited set makes cyclic
// cascades terminate.
fn collect_cascade(
    registry: &Registry,
    store: &dyn ResourceStore,
    ctx: &RequestContext,
    instance: &InstanceRef,
    visited: &mut HashSet<(String, String)>,
    victims: &mut Vec<InstanceRef>,
) -> Result<(), ApiError> {
    if !visited.insert(instance.key()) {
        return Ok(());
    }
    let ty = registry.resolve(&instance.type_name)?;
    permissions::enforce(ctx, store, ty, Some(instance), None, Permission::Delete)?;
    for relationship in ty.relationships() {
        // Deletion unlinks every relationship, so each field needs EDIT.
        permissions::enforce(
            ctx,
            store,
            ty,
            Some(instance),
            Some(relationship.name()),
            Permission::Edit,
        )?;
        if !relationship.cascades_delete() {
            continue;
        }
        match store.get_relationship(instance, relationship.name())? {
            Related::One(Some(target)) => {
                collect_cascade(registry, store, ctx, &target, visited, victims)?;
            }
            Related::One(None) => {}
            Related::Many(targets) => {
                for target in targets {
                    collect_cascade(registry, store, ctx, &target, visited, victims)?;
                }
            }
        }
    }
    victims.push(instance.clone());
    Ok(())
}

/// `DELETE /{type}/{id}/`: delete a resource and its cascade closure.
///
/// Permission checks for the whole closure run before the first delete,
/// so a denial deep in the cascade leaves everything in place.
pub(super) fn delete_resource(
    registry: &Registry,
    store: &mut dyn ResourceStore,
    ctx: &RequestContext,
    type_name: &str,
    id: &str,
) -> Result<JsonApiResponse, ApiError> {
    registry.resolve(type_name)?;
    let instance = fetch_instance(&*store, type_name, id)?;

    store.begin();
    let mut visited = HashSet::new();
    let mut victims = Vec::new();
    collect_cascade(registry, &*store, ctx, &instance, &mut visited, &mut victims)?;
    for victim in &victims {
        store.delete(victim)?;
    }
    store.commit()?;
    Ok(JsonApiResponse::no_content())
}
