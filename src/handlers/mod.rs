//! Operation handlers and the dispatch boundary.
//!
//! [`JsonApi`] is the engine's front door. Callers describe a request with
//! [`Request`], hand it to [`JsonApi::handle`] together with a store and a
//! permission context, and receive a [`JsonApiResponse`]: an HTTP status
//! code plus an optional JSON:API document.
//!
//! Every handler is a short pipeline: resolve type, fetch the resource,
//! gate on permissions, mutate, render, commit. Errors propagate to the
//! dispatch boundary, which rolls the transaction back exactly once and
//! renders the error document — callers never see a partial mutation or a
//! non-conformant body.
//!
//! # Example
//!
//! ```rust
//! use jsonapi_engine::handlers::{JsonApi, Request};
//! use jsonapi_engine::permissions::RequestContext;
//! use jsonapi_engine::registry::{Registry, ResourceType};
//! use jsonapi_engine::store::MemoryStore;
//! use serde_json::json;
//!
//! let registry = Registry::builder()
//!     .register(ResourceType::builder("posts").attribute("title").build())
//!     .build()
//!     .unwrap();
//! let api = JsonApi::new(registry);
//!
//! let mut store = MemoryStore::new();
//! store.define_type("posts");
//! store.insert("posts", "1", json!({"title": "Hello"})).unwrap();
//!
//! let ctx = RequestContext::anonymous();
//! let response = api.handle(&mut store, &ctx, &Request::get_resource("posts", "1"));
//! assert_eq!(response.status, 200);
//! ```

mod collection;
mod relationship;
mod resource;

use std::collections::HashMap;

use serde_json::Value;

use crate::error::ApiError;
use crate::permissions::RequestContext;
use crate::query::QueryParams;
use crate::registry::Registry;
use crate::render::Document;
use crate::store::{InstanceRef, ResourceStore};

/// The JSON:API media type. Mutating requests must declare it.
pub const MEDIA_TYPE: &str = "application/vnd.api+json";

/// HTTP verbs the engine dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read operations.
    Get,
    /// Resource creation and relationship append.
    Post,
    /// Resource and relationship replacement.
    Patch,
    /// Resource deletion and relationship removal.
    Delete,
}

/// The four endpoint shapes of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `/{type}/`
    Collection,
    /// `/{type}/{id}/`
    Resource,
    /// `/{type}/{id}/{relationship}/`
    Related,
    /// `/{type}/{id}/relationships/{relationship}/`
    Relationship,
}

/// A protocol-level request, decoupled from any HTTP framework.
///
/// The named constructors cover the ten canonical operations; mutating
/// constructors default the content type to [`MEDIA_TYPE`].
#[derive(Debug, Clone)]
pub struct Request {
    /// The HTTP verb.
    pub method: Method,
    /// The endpoint shape.
    pub endpoint: Endpoint,
    /// The external resource type from the URL.
    pub type_name: String,
    /// The instance id, for non-collection endpoints.
    pub id: Option<String>,
    /// The relationship name, for related/relationship endpoints.
    pub relationship: Option<String>,
    /// Raw query parameters.
    pub query: HashMap<String, String>,
    /// The parsed request body, when one was sent.
    pub body: Option<Value>,
    /// The declared content type, when one was sent.
    pub content_type: Option<String>,
}

impl Request {
    fn new(method: Method, endpoint: Endpoint, type_name: &str) -> Self {
        let content_type = match method {
            Method::Get => None,
            _ => Some(MEDIA_TYPE.to_string()),
        };
        Self {
            method,
            endpoint,
            type_name: type_name.to_string(),
            id: None,
            relationship: None,
            query: HashMap::new(),
            body: None,
            content_type,
        }
    }

    /// `GET /{type}/`
    #[must_use]
    pub fn get_collection(type_name: &str) -> Self {
        Self::new(Method::Get, Endpoint::Collection, type_name)
    }

    /// `POST /{type}/`
    #[must_use]
    pub fn post_collection(type_name: &str, body: Value) -> Self {
        let mut request = Self::new(Method::Post, Endpoint::Collection, type_name);
        request.body = Some(body);
        request
    }

    /// `GET /{type}/{id}/`
    #[must_use]
    pub fn get_resource(type_name: &str, id: &str) -> Self {
        let mut request = Self::new(Method::Get, Endpoint::Resource, type_name);
        request.id = Some(id.to_string());
        request
    }

    /// `PATCH /{type}/{id}/`
    #[must_use]
    pub fn patch_resource(type_name: &str, id: &str, body: Value) -> Self {
        let mut request = Self::new(Method::Patch, Endpoint::Resource, type_name);
        request.id = Some(id.to_string());
        request.body = Some(body);
        request
    }

    /// `DELETE /{type}/{id}/`
    #[must_use]
    pub fn delete_resource(type_name: &str, id: &str) -> Self {
        let mut request = Self::new(Method::Delete, Endpoint::Resource, type_name);
        request.id = Some(id.to_string());
        request
    }

    /// `GET /{type}/{id}/{relationship}/`
    #[must_use]
    pub fn get_related(type_name: &str, id: &str, relationship: &str) -> Self {
        let mut request = Self::new(Method::Get, Endpoint::Related, type_name);
        request.id = Some(id.to_string());
        request.relationship = Some(relationship.to_string());
        request
    }

    /// `GET /{type}/{id}/relationships/{relationship}/`
    #[must_use]
    pub fn get_relationship(type_name: &str, id: &str, relationship: &str) -> Self {
        let mut request = Self::new(Method::Get, Endpoint::Relationship, type_name);
        request.id = Some(id.to_string());
        request.relationship = Some(relationship.to_string());
        request
    }

    /// `PATCH /{type}/{id}/relationships/{relationship}/`
    #[must_use]
    pub fn patch_relationship(type_name: &str, id: &str, relationship: &str, body: Value) -> Self {
        let mut request = Self::new(Method::Patch, Endpoint::Relationship, type_name);
        request.id = Some(id.to_string());
        request.relationship = Some(relationship.to_string());
        request.body = Some(body);
        request
    }

    /// `POST /{type}/{id}/relationships/{relationship}/`
    #[must_use]
    pub fn post_relationship(type_name: &str, id: &str, relationship: &str, body: Value) -> Self {
        let mut request = Self::new(Method::Post, Endpoint::Relationship, type_name);
        request.id = Some(id.to_string());
        request.relationship = Some(relationship.to_string());
        request.body = Some(body);
        request
    }

    /// `DELETE /{type}/{id}/relationships/{relationship}/`
    #[must_use]
    pub fn delete_relationship(type_name: &str, id: &str, relationship: &str, body: Value) -> Self {
        let mut request = Self::new(Method::Delete, Endpoint::Relationship, type_name);
        request.id = Some(id.to_string());
        request.relationship = Some(relationship.to_string());
        request.body = Some(body);
        request
    }

    /// Adds a raw query parameter, consuming and returning the request.
    #[must_use]
    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    /// Overrides the declared content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: Option<&str>) -> Self {
        self.content_type = content_type.map(ToString::to_string);
        self
    }
}

/// An HTTP status code plus an optional JSON:API document.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonApiResponse {
    /// The HTTP status code.
    pub status: u16,
    /// The response body, absent for 204.
    pub document: Option<Value>,
}

impl JsonApiResponse {
    pub(crate) fn ok(document: &Document) -> Self {
        Self {
            status: 200,
            document: Some(document.to_value()),
        }
    }

    pub(crate) fn created(document: &Document) -> Self {
        Self {
            status: 201,
            document: Some(document.to_value()),
        }
    }

    pub(crate) const fn no_content() -> Self {
        Self {
            status: 204,
            document: None,
        }
    }
}

/// The engine: a registry plus the dispatch logic for the ten canonical
/// operations.
#[derive(Debug)]
pub struct JsonApi {
    registry: Registry,
}

impl JsonApi {
    /// Creates an engine over a built registry.
    #[must_use]
    pub const fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// The registry this engine serves.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Handles one request end to end.
    ///
    /// Never returns an error: failures are rolled back and rendered as
    /// JSON:API error documents with the variant's status code.
    pub fn handle(
        &self,
        store: &mut dyn ResourceStore,
        ctx: &RequestContext,
        request: &Request,
    ) -> JsonApiResponse {
        match self.dispatch(store, ctx, request) {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(
                    status = error.status(),
                    code = error.code(),
                    "request failed: {error}"
                );
                // Roll back whatever the failing handler left open.
                store.rollback();
                JsonApiResponse {
                    status: error.status(),
                    document: Some(error.to_document()),
                }
            }
        }
    }

    fn dispatch(
        &self,
        store: &mut dyn ResourceStore,
        ctx: &RequestContext,
        request: &Request,
    ) -> Result<JsonApiResponse, ApiError> {
        if request.method != Method::Get && request.content_type.as_deref() != Some(MEDIA_TYPE) {
            return Err(ApiError::MissingContentType);
        }
        let query = QueryParams::parse(&request.query)?;
        let registry = &self.registry;
        let type_name = request.type_name.as_str();
        tracing::debug!(?request.method, ?request.endpoint, type_name, "dispatching");

        match (request.method, request.endpoint) {
            (Method::Get, Endpoint::Collection) => {
                collection::get_collection(registry, &*store, ctx, type_name, &query)
            }
            (Method::Post, Endpoint::Collection) => {
                collection::post_collection(registry, store, ctx, type_name, request.body.as_ref())
            }
            (Method::Get, Endpoint::Resource) => {
                resource::get_resource(registry, &*store, ctx, type_name, id(request)?, &query)
            }
            (Method::Patch, Endpoint::Resource) => resource::patch_resource(
                registry,
                store,
                ctx,
                type_name,
                id(request)?,
                request.body.as_ref(),
            ),
            (Method::Delete, Endpoint::Resource) => {
                resource::delete_resource(registry, store, ctx, type_name, id(request)?)
            }
            (Method::Get, Endpoint::Related) => relationship::get_related(
                registry,
                &*store,
                ctx,
                type_name,
                id(request)?,
                relationship_name(request)?,
                &query,
            ),
            (Method::Get, Endpoint::Relationship) => relationship::get_relationship(
                registry,
                &*store,
                ctx,
                type_name,
                id(request)?,
                relationship_name(request)?,
            ),
            (Method::Patch, Endpoint::Relationship) => relationship::patch_relationship(
                registry,
                store,
                ctx,
                type_name,
                id(request)?,
                relationship_name(request)?,
                request.body.as_ref(),
            ),
            (Method::Post, Endpoint::Relationship) => relationship::post_relationship(
                registry,
                store,
                ctx,
                type_name,
                id(request)?,
                relationship_name(request)?,
                request.body.as_ref(),
            ),
            (Method::Delete, Endpoint::Relationship) => relationship::delete_relationship(
                registry,
                store,
                ctx,
                type_name,
                id(request)?,
                relationship_name(request)?,
                request.body.as_ref(),
            ),
            _ => Err(ApiError::BadRequest {
                detail: "Method not supported on this endpoint".to_string(),
            }),
        }
    }
}

fn id(request: &Request) -> Result<&str, ApiError> {
    request.id.as_deref().ok_or_else(|| ApiError::BadRequest {
        detail: "Endpoint requires a resource id".to_string(),
    })
}

fn relationship_name(request: &Request) -> Result<&str, ApiError> {
    request
        .relationship
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest {
            detail: "Endpoint requires a relationship name".to_string(),
        })
}

/// Extracts the `data` member of a mutation body.
fn data_of(body: Option<&Value>) -> Result<&Value, ApiError> {
    body.and_then(|body| body.get("data"))
        .ok_or_else(|| ApiError::BadRequest {
            detail: "Request body must be a JSON object with a data key".to_string(),
        })
}

/// Parses one linkage object `{type, id}` against an expected target type.
///
/// Returns the referenced id; the caller fetches and decides which
/// not-found error applies.
fn parse_linkage(expected_type: &str, value: &Value) -> Result<String, ApiError> {
    let Value::Object(linkage) = value else {
        return Err(ApiError::Validation {
            detail: "Provided data must be a hash".to_string(),
        });
    };
    let type_name = linkage
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ApiError::MissingType)?;
    if type_name != expected_type {
        return Err(ApiError::Validation {
            detail: format!("Incompatible type provided: {type_name}"),
        });
    }
    match linkage.get("id") {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(ApiError::BadRequest {
            detail: "Linkage objects must carry an id".to_string(),
        }),
    }
}

/// Fetches the instance a payload linkage object refers to.
fn fetch_linked(
    store: &dyn ResourceStore,
    expected_type: &str,
    value: &Value,
) -> Result<InstanceRef, ApiError> {
    let id = parse_linkage(expected_type, value)?;
    store
        .fetch(expected_type, &id)?
        .ok_or_else(|| ApiError::RelatedResourceNotFound {
            type_name: expected_type.to_string(),
            id,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mutating_constructors_default_media_type() {
        let request = Request::post_collection("posts", json!({}));
        assert_eq!(request.content_type.as_deref(), Some(MEDIA_TYPE));
        let request = Request::get_collection("posts");
        assert_eq!(request.content_type, None);
    }

    #[test]
    fn test_parse_linkage_accepts_string_and_numeric_ids() {
        assert_eq!(
            parse_linkage("posts", &json!({"type": "posts", "id": "7"})).unwrap(),
            "7"
        );
        assert_eq!(
            parse_linkage("posts", &json!({"type": "posts", "id": 7})).unwrap(),
            "7"
        );
    }

    #[test]
    fn test_parse_linkage_rejects_bad_shapes() {
        let err = parse_linkage("posts", &json!("posts")).unwrap_err();
        assert_eq!(err.code(), "validation_error");

        let err = parse_linkage("posts", &json!({"id": "7"})).unwrap_err();
        assert_eq!(err.code(), "missing_type");

        let err = parse_linkage("posts", &json!({"type": "users", "id": "7"})).unwrap_err();
        assert_eq!(err.code(), "validation_error");

        let err = parse_linkage("posts", &json!({"type": "posts"})).unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }
}
