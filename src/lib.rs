//! # jsonapi-engine
//!
//! A resource-graph rendering and mutation engine for the
//! [JSON:API 1.0](https://jsonapi.org/format/1.0/) protocol.
//!
//! The engine walks an object graph of typed resources and their
//! relationships, renders it into compound JSON:API documents under
//! permission, sparse-fieldset, and include constraints, and performs
//! permission-checked mutations (create, update, delete, relationship
//! linkage) with transactional rollback on failure. It is deliberately
//! framework-free: resource state lives behind the
//! [`ResourceStore`](store::ResourceStore) trait, and requests arrive as
//! plain [`Request`](handlers::Request) values, so the engine drops into
//! any HTTP server or none at all.
//!
//! ## Architecture
//!
//! - [`registry`] — immutable metadata: types, attributes, relationships,
//!   and their permission predicates.
//! - [`permissions`] — boolean predicate evaluation with default-allow
//!   semantics and field/instance composition.
//! - [`query`] — parsing of `include`, `fields[...]`, `sort`, and
//!   `page[...]` parameters.
//! - [`render`] — the graph walker producing resource objects, linkage,
//!   and deduplicated compound documents.
//! - [`handlers`] — the ten canonical operations and the dispatch
//!   boundary that turns every failure into a JSON:API error document.
//! - [`store`] — the storage trait plus an in-memory reference backend.
//! - [`error`] — the error taxonomy with stable codes and status
//!   mappings.
//!
//! ## Example
//!
//! ```rust
//! use jsonapi_engine::handlers::{JsonApi, Request};
//! use jsonapi_engine::permissions::RequestContext;
//! use jsonapi_engine::registry::{Registry, Relationship, ResourceType};
//! use jsonapi_engine::store::MemoryStore;
//! use serde_json::json;
//!
//! let registry = Registry::builder()
//!     .register(
//!         ResourceType::builder("posts")
//!             .attribute("title")
//!             .relationship(Relationship::to_many("comments", "comments"))
//!             .build(),
//!     )
//!     .register(ResourceType::builder("comments").attribute("body").build())
//!     .build()
//!     .unwrap();
//! let api = JsonApi::new(registry);
//!
//! let mut store = MemoryStore::new();
//! store.define_type("posts");
//! store.define_to_many("posts", "comments");
//! store.define_type("comments");
//!
//! let ctx = RequestContext::anonymous();
//! let response = api.handle(
//!     &mut store,
//!     &ctx,
//!     &Request::post_collection(
//!         "posts",
//!         json!({"data": {"type": "posts", "attributes": {"title": "Hello"}}}),
//!     ),
//! );
//! assert_eq!(response.status, 201);
//!
//! let response = api.handle(&mut store, &ctx, &Request::get_collection("posts"));
//! assert_eq!(response.status, 200);
//! ```

pub mod error;
pub mod handlers;
pub mod permissions;
pub mod query;
pub mod registry;
pub mod render;
pub mod store;

pub use error::ApiError;
pub use handlers::{Endpoint, JsonApi, JsonApiResponse, Method, Request, MEDIA_TYPE};
pub use permissions::{Permission, RequestContext};
pub use query::{FieldSelection, IncludeTree, PageWindow, QueryParams, SortKey};
pub use registry::{
    Attribute, Cardinality, Registry, RegistryBuilder, RegistryError, Relationship, ResourceType,
};
pub use render::{Document, Renderer, ResourceIdentifier, ResourceObject};
pub use store::{InstanceRef, MemoryStore, Related, ResourceStore, StoreError};
