//! Error taxonomy for the JSON:API engine.
//!
//! Every failure the engine can surface is a variant of [`ApiError`]. Each
//! variant carries a fixed HTTP status code and a stable machine-readable
//! error code, and renders into a JSON:API error document via
//! [`ApiError::to_document`].
//!
//! # Error Handling
//!
//! Errors are raised at the point of detection and propagate with `?` up to
//! the operation-handler boundary, where the active transaction is rolled
//! back and the error is translated into an error document. Clients always
//! receive a JSON:API-conformant body, never a partial document.
//!
//! # Example
//!
//! ```rust
//! use jsonapi_engine::error::ApiError;
//!
//! let error = ApiError::ResourceNotFound {
//!     type_name: "posts".to_string(),
//!     id: "42".to_string(),
//! };
//! assert_eq!(error.status(), 404);
//! assert_eq!(error.code(), "resource_not_found");
//!
//! let document = error.to_document();
//! assert_eq!(document["errors"][0]["status"], "404");
//! ```

use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::permissions::Permission;

/// Errors surfaced by the engine, each mapped to an HTTP status code and a
/// stable error code.
///
/// The taxonomy distinguishes malformed requests (400), missing resources
/// (404), authorization failures (403), and JSON:API constraint violations
/// (409).
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request was structurally malformed (HTTP 400).
    #[error("Bad request: {detail}")]
    BadRequest {
        /// What was wrong with the request.
        detail: String,
    },

    /// An include path named a field that is not a relationship (HTTP 400).
    #[error("'{field}' is not a relationship on '{type_name}'")]
    NotARelationship {
        /// The resource type being rendered.
        type_name: String,
        /// The offending field name.
        field: String,
    },

    /// A payload referenced a field that is not an attribute (HTTP 409).
    #[error("'{field}' is not an attribute of '{type_name}'")]
    NotAnAttribute {
        /// The resource type being mutated.
        type_name: String,
        /// The offending field name.
        field: String,
    },

    /// A sort key does not resolve to a sortable attribute (HTTP 409).
    ///
    /// Sorting by a relationship is explicitly disallowed.
    #[error("Cannot sort '{type_name}' by '{field}'")]
    NotSortable {
        /// The resource type being sorted.
        type_name: String,
        /// The offending sort key.
        field: String,
    },

    /// The endpoint named an unknown resource type (HTTP 404).
    #[error("No resource type named '{type_name}'")]
    ResourceTypeNotFound {
        /// The unknown external type name.
        type_name: String,
    },

    /// The addressed resource does not exist (HTTP 404).
    #[error("No '{type_name}' resource with id {id}")]
    ResourceNotFound {
        /// The resource type.
        type_name: String,
        /// The id that was requested.
        id: String,
    },

    /// The URL named an unknown relationship (HTTP 404).
    #[error("'{type_name}' has no relationship named '{relationship}'")]
    RelationshipNotFound {
        /// The resource type.
        type_name: String,
        /// The unknown relationship name.
        relationship: String,
    },

    /// A linkage object in a payload referenced a missing resource (HTTP 404).
    #[error("Related '{type_name}' resource with id {id} not found")]
    RelatedResourceNotFound {
        /// The related resource type.
        type_name: String,
        /// The id that was referenced.
        id: String,
    },

    /// A permission predicate denied the operation (HTTP 403).
    #[error("{permission} denied on '{type_name}'")]
    PermissionDenied {
        /// The permission that was checked.
        permission: Permission,
        /// The resource type.
        type_name: String,
        /// The instance id, when an instance was involved.
        id: Option<String>,
        /// The field name, for field-level denials.
        field: Option<String>,
    },

    /// The payload `data` object is missing its `type` member (HTTP 409).
    #[error("Payload data must carry a type member")]
    MissingType,

    /// The payload `type` does not match the endpoint's type (HTTP 409).
    #[error("Endpoint expects type '{expected}', payload carried '{actual}'")]
    InvalidTypeForEndpoint {
        /// The type the endpoint serves.
        expected: String,
        /// The type the payload declared.
        actual: String,
    },

    /// A to-many operation addressed a to-one relationship (HTTP 409).
    #[error("Relationship '{relationship}' on '{type_name}' is not to-many")]
    ToManyExpected {
        /// The resource type.
        type_name: String,
        /// The to-one relationship that was addressed.
        relationship: String,
    },

    /// A data-integrity or payload-shape violation during mutation (HTTP 409).
    #[error("Validation failed: {detail}")]
    Validation {
        /// The violated constraint.
        detail: String,
    },

    /// A mutating request did not declare `application/vnd.api+json` (HTTP 409).
    #[error("Request must declare the application/vnd.api+json content type")]
    MissingContentType,
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::BadRequest { .. } | Self::NotARelationship { .. } => 400,
            Self::PermissionDenied { .. } => 403,
            Self::ResourceTypeNotFound { .. }
            | Self::ResourceNotFound { .. }
            | Self::RelationshipNotFound { .. }
            | Self::RelatedResourceNotFound { .. } => 404,
            Self::NotAnAttribute { .. }
            | Self::NotSortable { .. }
            | Self::MissingType
            | Self::InvalidTypeForEndpoint { .. }
            | Self::ToManyExpected { .. }
            | Self::Validation { .. }
            | Self::MissingContentType => 409,
        }
    }

    /// Returns the stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::NotARelationship { .. } => "not_a_relationship",
            Self::NotAnAttribute { .. } => "not_an_attribute",
            Self::NotSortable { .. } => "not_sortable",
            Self::ResourceTypeNotFound { .. } => "resource_type_not_found",
            Self::ResourceNotFound { .. } => "resource_not_found",
            Self::RelationshipNotFound { .. } => "relationship_not_found",
            Self::RelatedResourceNotFound { .. } => "related_resource_not_found",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::MissingType => "missing_type",
            Self::InvalidTypeForEndpoint { .. } => "invalid_type_for_endpoint",
            Self::ToManyExpected { .. } => "to_many_expected",
            Self::Validation { .. } => "validation_error",
            Self::MissingContentType => "missing_content_type",
        }
    }

    /// Returns the stable human-readable title for this error.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "Bad Request",
            Self::NotARelationship { .. } => "Not A Relationship",
            Self::NotAnAttribute { .. } => "Not An Attribute",
            Self::NotSortable { .. } => "Not Sortable",
            Self::ResourceTypeNotFound { .. } => "Resource Type Not Found",
            Self::ResourceNotFound { .. } => "Resource Not Found",
            Self::RelationshipNotFound { .. } => "Relationship Not Found",
            Self::RelatedResourceNotFound { .. } => "Related Resource Not Found",
            Self::PermissionDenied { .. } => "Permission Denied",
            Self::MissingType => "Missing Type",
            Self::InvalidTypeForEndpoint { .. } => "Invalid Type For Endpoint",
            Self::ToManyExpected { .. } => "To-Many Relationship Expected",
            Self::Validation { .. } => "Validation Failed",
            Self::MissingContentType => "Missing Content Type",
        }
    }

    /// Renders this error as a JSON:API error document.
    ///
    /// The document carries a single error object with a fresh per-occurrence
    /// `id`, the stringified `status`, the stable `code` and `title`, and the
    /// `Display` output as `detail`.
    #[must_use]
    pub fn to_document(&self) -> Value {
        json!({
            "errors": [{
                "id": Uuid::new_v4().to_string(),
                "status": self.status().to_string(),
                "code": self.code(),
                "title": self.title(),
                "detail": self.to_string(),
            }],
            "jsonapi": {"version": "1.0"},
            "meta": {"jsonapi_engine_version": env!("CARGO_PKG_VERSION")},
        })
    }
}

// Verify ApiError is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ApiError>();
};
