//! Permission engine.
//!
//! Authorization decisions are boolean predicates registered on a
//! [`ResourceType`](crate::registry::ResourceType), keyed by `(field,
//! permission)`. The engine is permissive by default: with no predicate
//! registered, every check passes. Restrictions are opt-in.
//!
//! Field-level and instance-level checks compose: a field passes only if
//! both the field predicate and the instance-wide (field = `None`)
//! predicate pass. Predicates receive the request-scoped
//! [`RequestContext`] on every call; nothing is cached across requests.
//!
//! # Example
//!
//! ```rust
//! use jsonapi_engine::permissions::{Permission, RequestContext};
//! use jsonapi_engine::registry::ResourceType;
//! use jsonapi_engine::store::MemoryStore;
//!
//! let ty = ResourceType::builder("secrets")
//!     .attribute("value")
//!     .permission(None, Permission::View, |ctx, _store, _instance| {
//!         ctx.actor.as_deref() == Some("admin")
//!     })
//!     .build();
//!
//! let store = MemoryStore::new();
//! let admin = RequestContext::for_actor("admin");
//! let anon = RequestContext::anonymous();
//! assert!(jsonapi_engine::permissions::check(&admin, &store, &ty, None, None, Permission::View));
//! assert!(!jsonapi_engine::permissions::check(&anon, &store, &ty, None, None, Permission::View));
//! ```

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::error::ApiError;
use crate::registry::ResourceType;
use crate::store::{InstanceRef, ResourceStore};

/// The permissions that can be checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Read access to an instance or field.
    View,
    /// Permission to create an instance or link into a relationship.
    Create,
    /// Permission to modify an instance or field.
    Edit,
    /// Permission to delete an instance or unlink from a relationship.
    Delete,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::View => "VIEW",
            Self::Create => "CREATE",
            Self::Edit => "EDIT",
            Self::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A boolean authorization predicate.
///
/// Receives the request context, the store, and the instance under test.
/// The instance is `None` for type-level checks (e.g. CREATE on a
/// collection endpoint).
pub type PermissionPredicate =
    Box<dyn Fn(&RequestContext, &dyn ResourceStore, Option<&InstanceRef>) -> bool + Send + Sync>;

/// Request-scoped authorization context supplied by the caller.
///
/// Carries the acting principal and an open claims map that predicates may
/// inspect. Built fresh per request; the engine never retains one.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// The acting principal's identifier, if authenticated.
    pub actor: Option<String>,
    /// Free-form claims for predicate use.
    pub claims: HashMap<String, Value>,
}

impl RequestContext {
    /// Context with no principal and no claims.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Context for a named principal.
    #[must_use]
    pub fn for_actor(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
            claims: HashMap::new(),
        }
    }

    /// Adds a claim, consuming and returning the context.
    #[must_use]
    pub fn with_claim(mut self, key: impl Into<String>, value: Value) -> Self {
        self.claims.insert(key.into(), value);
        self
    }
}

fn run_predicate(
    ty: &ResourceType,
    field: Option<&str>,
    permission: Permission,
    ctx: &RequestContext,
    store: &dyn ResourceStore,
    instance: Option<&InstanceRef>,
) -> bool {
    ty.predicate(field, permission)
        .map_or(true, |predicate| predicate(ctx, store, instance))
}

/// Evaluates a permission, composing field- and instance-level predicates.
///
/// With `field` set, both the field predicate and the instance-wide
/// predicate must pass. With `field` unset, only the instance-wide
/// predicate applies. Absent predicates default to allowed.
#[must_use]
pub fn check(
    ctx: &RequestContext,
    store: &dyn ResourceStore,
    ty: &ResourceType,
    instance: Option<&InstanceRef>,
    field: Option<&str>,
    permission: Permission,
) -> bool {
    let field_ok = field.map_or(true, |name| {
        run_predicate(ty, Some(name), permission, ctx, store, instance)
    });
    field_ok && run_predicate(ty, None, permission, ctx, store, instance)
}

/// Like [`check`], but raises [`ApiError::PermissionDenied`] on failure.
///
/// # Errors
///
/// Returns [`ApiError::PermissionDenied`] carrying the permission, type,
/// instance id, and field of the failed check.
pub fn enforce(
    ctx: &RequestContext,
    store: &dyn ResourceStore,
    ty: &ResourceType,
    instance: Option<&InstanceRef>,
    field: Option<&str>,
    permission: Permission,
) -> Result<(), ApiError> {
    if check(ctx, store, ty, instance, field, permission) {
        Ok(())
    } else {
        Err(ApiError::PermissionDenied {
            permission,
            type_name: ty.name().to_string(),
            id: instance.map(|i| i.id.clone()),
            field: field.map(ToString::to_string),
        })
    }
}

// Verify context and predicate types are Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<RequestContext>();
    assert_send_sync::<PermissionPredicate>();
};
