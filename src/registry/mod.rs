//! Resource type registry.
//!
//! The registry is built once at startup from a [`RegistryBuilder`] and is
//! immutable afterwards, so concurrent request handling over a shared
//! registry needs no locking. Building fails fast on naming collisions,
//! invalid external names, and relationships whose target type is not
//! registered.
//!
//! # Example
//!
//! ```rust
//! use jsonapi_engine::registry::{Registry, Relationship, ResourceType};
//!
//! let registry = Registry::builder()
//!     .register(
//!         ResourceType::builder("posts")
//!             .attribute("title")
//!             .relationship(Relationship::to_one("author", "users"))
//!             .build(),
//!     )
//!     .register(ResourceType::builder("users").attribute("name").build())
//!     .build()
//!     .unwrap();
//!
//! assert!(registry.resolve("posts").is_ok());
//! assert!(registry.resolve("nope").is_err());
//! ```

mod types;

pub use types::{
    Attribute, AttributeGetter, AttributeSetter, Cardinality, Relationship, ResourceType,
    ResourceTypeBuilder,
};

use std::collections::HashMap;

use thiserror::Error;

use crate::error::ApiError;

/// Errors detected while building a [`Registry`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Two types mapped to the same external name.
    #[error("Duplicate resource type name '{name}'")]
    DuplicateTypeName {
        /// The colliding external name.
        name: String,
    },

    /// An external name is empty or not URL-safe.
    #[error("Invalid resource type name '{name}'. Expected a non-empty name of [a-z0-9_-] characters.")]
    InvalidTypeName {
        /// The rejected name.
        name: String,
    },

    /// A relationship targets a type that is not registered.
    #[error("Relationship '{relationship}' on '{type_name}' targets unregistered type '{target}'")]
    UnknownTargetType {
        /// The type declaring the relationship.
        type_name: String,
        /// The relationship name.
        relationship: String,
        /// The unregistered target.
        target: String,
    },
}

/// Immutable lookup table from external type name to [`ResourceType`].
pub struct Registry {
    types: HashMap<String, ResourceType>,
}

impl Registry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder { types: Vec::new() }
    }

    /// Resolves an external type name.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::ResourceTypeNotFound`] for unknown names.
    pub fn resolve(&self, name: &str) -> Result<&ResourceType, ApiError> {
        self.types
            .get(name)
            .ok_or_else(|| ApiError::ResourceTypeNotFound {
                type_name: name.to_string(),
            })
    }

    /// Whether a type with the given external name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Iterates all registered types.
    pub fn types(&self) -> impl Iterator<Item = &ResourceType> {
        self.types.values()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn valid_type_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Builder for [`Registry`]. Collects types, then validates the whole set
/// at [`build`](Self::build).
pub struct RegistryBuilder {
    types: Vec<ResourceType>,
}

impl RegistryBuilder {
    /// Registers a type. Validation is deferred to [`build`](Self::build).
    #[must_use]
    pub fn register(mut self, ty: ResourceType) -> Self {
        self.types.push(ty);
        self
    }

    /// Validates and finishes the registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTypeName`] when two types share an
    /// external name, [`RegistryError::InvalidTypeName`] for names that are
    /// not URL-safe, and [`RegistryError::UnknownTargetType`] when a
    /// relationship targets an unregistered type.
    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut types: HashMap<String, ResourceType> = HashMap::with_capacity(self.types.len());
        for ty in self.types {
            if !valid_type_name(ty.name()) {
                return Err(RegistryError::InvalidTypeName {
                    name: ty.name().to_string(),
                });
            }
            if types.contains_key(ty.name()) {
                return Err(RegistryError::DuplicateTypeName {
                    name: ty.name().to_string(),
                });
            }
            types.insert(ty.name().to_string(), ty);
        }
        for ty in types.values() {
            for relationship in ty.relationships() {
                if !types.contains_key(relationship.target()) {
                    return Err(RegistryError::UnknownTargetType {
                        type_name: ty.name().to_string(),
                        relationship: relationship.name().to_string(),
                        target: relationship.target().to_string(),
                    });
                }
            }
        }
        Ok(Registry { types })
    }
}
