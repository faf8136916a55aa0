//! Related-resource and relationship endpoint handlers.
//!
//! The related endpoint (`/{type}/{id}/{relationship}/`) renders full
//! resource objects; the relationship endpoint
//! (`/{type}/{id}/relationships/{relationship}/`) renders and mutates
//! short `{id, type}` linkage only.

use serde_json::Value;

use crate::error::ApiError;
use crate::permissions::{self, Permission, RequestContext};
use crate::query::QueryParams;
use crate::registry::{Cardinality, Registry, Relationship, ResourceType};
use crate::render::{Document, IncludedMap, Renderer};
use crate::store::{InstanceRef, Related, ResourceStore};

use super::{collection, data_of, fetch_linked, JsonApiResponse};

struct Addressed<'a> {
    ty: &'a ResourceType,
    instance: InstanceRef,
    relationship: &'a Relationship,
}

// Resolves the shared prefix of every relationship endpoint: the type,
// the instance, and the named relationship.
fn address<'a>(
    registry: &'a Registry,
    store: &dyn ResourceStore,
    type_name: &str,
    id: &str,
    relationship: &str,
) -> Result<Addressed<'a>, ApiError> {
    let ty = registry.resolve(type_name)?;
    let instance = store
        .fetch(type_name, id)?
        .ok_or_else(|| ApiError::ResourceNotFound {
            type_name: type_name.to_string(),
            id: id.to_string(),
        })?;
    let relationship =
        ty.relationship(relationship)
            .ok_or_else(|| ApiError::RelationshipNotFound {
                type_name: type_name.to_string(),
                relationship: relationship.to_string(),
            })?;
    Ok(Addressed {
        ty,
        instance,
        relationship,
    })
}

// Renders current linkage as short references, omitting what the caller
// may not see: a denied to-one target renders as null, denied to-many
// members drop silently. Never errs on permissions, so mutation handlers
// can render their response after the commit without opening a failure
// path on persisted state.
fn linkage_document(
    registry: &Registry,
    store: &dyn ResourceStore,
    ctx: &RequestContext,
    instance: &InstanceRef,
    relationship: &str,
) -> Result<Document, ApiError> {
    let renderer = Renderer::new(registry, ctx);
    match store.get_relationship(instance, relationship)? {
        Related::One(None) => Ok(Document::identifier(None)),
        Related::One(Some(target)) => {
            let reference = renderer
                .viewable(store, &target)?
                .then(|| crate::render::ResourceIdentifier::from(&target));
            Ok(Document::identifier(reference))
        }
        Related::Many(targets) => {
            let mut references = Vec::with_capacity(targets.len());
            for target in targets {
                if renderer.viewable(store, &target)? {
                    references.push(crate::render::ResourceIdentifier::from(&target));
                }
            }
            Ok(Document::identifiers(references))
        }
    }
}

// Linkage payloads on relationship endpoints address resources directly,
// so a dangling reference is a plain resource-not-found.
fn fetch_addressed(
    store: &dyn ResourceStore,
    expected_type: &str,
    value: &Value,
) -> Result<InstanceRef, ApiError> {
    fetch_linked(store, expected_type, value).map_err(|error| match error {
        ApiError::RelatedResourceNotFound { type_name, id } => {
            ApiError::ResourceNotFound { type_name, id }
        }
        other => other,
    })
}

// Linking (or unlinking) a target also mutates the inverse field on the
// target's side when a back-reference is declared; the permission needed
// there depends on the inverse cardinality.
fn enforce_reverse(
    registry: &Registry,
    store: &dyn ResourceStore,
    ctx: &RequestContext,
    relationship: &Relationship,
    target: &InstanceRef,
    on_to_one: Permission,
    on_to_many: Permission,
) -> Result<(), ApiError> {
    let Some(back) = relationship.back_reference() else {
        return Ok(());
    };
    let target_ty = registry.resolve(relationship.target())?;
    let Some(inverse) = target_ty.relationship(back) else {
        return Ok(());
    };
    let permission = match inverse.cardinality() {
        Cardinality::One => on_to_one,
        Cardinality::Many => on_to_many,
    };
    permissions::enforce(ctx, store, target_ty, Some(target), Some(back), permission)
}

/// `GET /{type}/{id}/{relationship}/`: render linked instances as full
/// resource objects, honoring includes and sparse fields.
pub(super) fn get_related(
    registry: &Registry,
    store: &dyn ResourceStore,
    ctx: &RequestContext,
    type_name: &str,
    id: &str,
    relationship: &str,
    query: &QueryParams,
) -> Result<JsonApiResponse, ApiError> {
    let addressed = address(registry, store, type_name, id, relationship)?;
    permissions::enforce(
        ctx,
        store,
        addressed.ty,
        Some(&addressed.instance),
        None,
        Permission::View,
    )?;
    permissions::enforce(
        ctx,
        store,
        addressed.ty,
        Some(&addressed.instance),
        Some(relationship),
        Permission::View,
    )?;

    let renderer = Renderer::new(registry, ctx);
    let document = match store.get_relationship(&addressed.instance, relationship)? {
        Related::One(None) => Document::identifier(None),
        Related::One(Some(target)) => {
            // The target is primary data here, so a denial is an error,
            // not an omission.
            let target_ty = registry.resolve(&target.type_name)?;
            permissions::enforce(ctx, store, target_ty, Some(&target), None, Permission::View)?;
            let (object, included) =
                renderer.render_full(store, &target, &query.include, &query.fields)?;
            Document::single(object, included)
        }
        Related::Many(targets) => {
            let mut objects = Vec::new();
            let mut included = IncludedMap::new();
            for target in targets {
                if !renderer.viewable(store, &target)? {
                    continue;
                }
                let (object, side_loaded) =
                    renderer.render_full(store, &target, &query.include, &query.fields)?;
                objects.push(object);
                included.extend(side_loaded);
            }
            Document::collection(objects, included)
        }
    };
    Ok(JsonApiResponse::ok(&document))
}

/// `GET /{type}/{id}/relationships/{relationship}/`: render current
/// linkage as short references.
pub(super) fn get_relationship(
    registry: &Registry,
    store: &dyn ResourceStore,
    ctx: &RequestContext,
    type_name: &str,
    id: &str,
    relationship: &str,
) -> Result<JsonApiResponse, ApiError> {
    let addressed = address(registry, store, type_name, id, relationship)?;
    permissions::enforce(
        ctx,
        store,
        addressed.ty,
        Some(&addressed.instance),
        None,
        Permission::View,
    )?;
    permissions::enforce(
        ctx,
        store,
        addressed.ty,
        Some(&addressed.instance),
        Some(relationship),
        Permission::View,
    )?;
    let document = linkage_document(registry, store, ctx, &addressed.instance, relationship)?;
    Ok(JsonApiResponse::ok(&document))
}

/// `PATCH /{type}/{id}/relationships/{relationship}/`: replace linkage
/// wholesale — a hash or null for to-one, a full membership list for
/// to-many.
pub(super) fn patch_relationship(
    registry: &Registry,
    store: &mut dyn ResourceStore,
    ctx: &RequestContext,
    type_name: &str,
    id: &str,
    relationship: &str,
    body: Option<&Value>,
) -> Result<JsonApiResponse, ApiError> {
    let addressed = address(registry, &*store, type_name, id, relationship)?;
    permissions::enforce(
        ctx,
        store,
        addressed.ty,
        Some(&addressed.instance),
        None,
        Permission::Edit,
    )?;
    permissions::enforce(
        ctx,
        store,
        addressed.ty,
        Some(&addressed.instance),
        Some(relationship),
        Permission::Edit,
    )?;
    let data = data_of(body)?;

    store.begin();
    let linked = collection::resolve_linkage(&*store, addressed.relationship, data).map_err(
        |error| match error {
            ApiError::RelatedResourceNotFound { type_name, id } => {
                ApiError::ResourceNotFound { type_name, id }
            }
            other => other,
        },
    )?;
    let targets: Vec<&InstanceRef> = match &linked {
        Related::One(target) => target.iter().collect(),
        Related::Many(members) => members.iter().collect(),
    };
    for target in targets {
        enforce_reverse(
            registry,
            &*store,
            ctx,
            addressed.relationship,
            target,
            Permission::Edit,
            Permission::Create,
        )?;
    }
    store.set_relationship(&addressed.instance, relationship, linked)?;
    store.commit()?;

    let document = linkage_document(registry, &*store, ctx, &addressed.instance, relationship)?;
    Ok(JsonApiResponse::ok(&document))
}

/// `POST /{type}/{id}/relationships/{relationship}/`: append members to a
/// to-many relationship. Appending an existing member is a no-op.
pub(super) fn post_relationship(
    registry: &Registry,
    store: &mut dyn ResourceStore,
    ctx: &RequestContext,
    type_name: &str,
    id: &str,
    relationship: &str,
    body: Option<&Value>,
) -> Result<JsonApiResponse, ApiError> {
    let addressed = address(registry, &*store, type_name, id, relationship)?;
    if addressed.relationship.cardinality() == Cardinality::One {
        return Err(ApiError::ToManyExpected {
            type_name: type_name.to_string(),
            relationship: relationship.to_string(),
        });
    }
    permissions::enforce(
        ctx,
        store,
        addressed.ty,
        Some(&addressed.instance),
        Some(relationship),
        Permission::Create,
    )?;
    let data = data_of(body)?;
    let Value::Array(items) = data else {
        return Err(ApiError::Validation {
            detail: "Provided data must be a list of hashes".to_string(),
        });
    };

    store.begin();
    for item in items {
        let target = fetch_addressed(&*store, addressed.relationship.target(), item)?;
        enforce_reverse(
            registry,
            &*store,
            ctx,
            addressed.relationship,
            &target,
            Permission::Edit,
            Permission::Create,
        )?;
        store.append_relationship(&addressed.instance, relationship, &target)?;
    }
    store.commit()?;

    let document = linkage_document(registry, &*store, ctx, &addressed.instance, relationship)?;
    Ok(JsonApiResponse::ok(&document))
}

/// `DELETE /{type}/{id}/relationships/{relationship}/`: remove members
/// from a to-many relationship. Removing an absent member is a no-op.
pub(super) fn delete_relationship(
    registry: &Registry,
    store: &mut dyn ResourceStore,
    ctx: &RequestContext,
    type_name: &str,
    id: &str,
    relationship: &str,
    body: Option<&Value>,
) -> Result<JsonApiResponse, ApiError> {
    let addressed = address(registry, &*store, type_name, id, relationship)?;
    if addressed.relationship.cardinality() == Cardinality::One {
        return Err(ApiError::ToManyExpected {
            type_name: type_name.to_string(),
            relationship: relationship.to_string(),
        });
    }
    permissions::enforce(
        ctx,
        store,
        addressed.ty,
        Some(&addressed.instance),
        Some(relationship),
        Permission::Delete,
    )?;
    let data = data_of(body)?;
    let Value::Array(items) = data else {
        return Err(ApiError::Validation {
            detail: "Provided data must be a list of hashes".to_string(),
        });
    };

    store.begin();
    for item in items {
        let target = fetch_addressed(&*store, addressed.relationship.target(), item)?;
        let target_ty = registry.resolve(&target.type_name)?;
        permissions::enforce(ctx, store, target_ty, Some(&target), None, Permission::Edit)?;
        enforce_reverse(
            registry,
            &*store,
            ctx,
            addressed.relationship,
            &target,
            Permission::Edit,
            Permission::Delete,
        )?;
        store.remove_relationship(&addressed.instance, relationship, &target)?;
    }
    store.commit()?;

    let document = linkage_document(registry, &*store, ctx, &addressed.instance, relationship)?;
    Ok(JsonApiResponse::ok(&document))
}
