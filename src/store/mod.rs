//! Resource store boundary.
//!
//! The engine never owns instance state. It reads and writes through the
//! [`ResourceStore`] trait, which abstracts the backing data store: fetching
//! by id, querying collections, navigating relationships, and transactional
//! commit/rollback. Instances are addressed by the opaque [`InstanceRef`]
//! handle; the engine's interaction window with any instance is a single
//! operation.
//!
//! A reference in-memory implementation, [`MemoryStore`], backs the test
//! suite and can serve as an embedded backend.
//!
//! # Transactions
//!
//! Mutating operation handlers call [`ResourceStore::begin`] before touching
//! data, commit exactly once at the end of a successful mutation sequence,
//! and roll back on any error before re-surfacing it. `rollback` without an
//! open transaction must be a no-op, so the dispatch boundary can always
//! roll back defensively.

mod memory;

pub use memory::MemoryStore;

use serde_json::Value;
use thiserror::Error;

use crate::error::ApiError;

/// An opaque handle to a resource instance owned by the store.
///
/// The engine only ever holds `(type, id)` pairs; all state access goes
/// through the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceRef {
    /// The external type name of the instance.
    pub type_name: String,
    /// The instance's primary key, stringified.
    pub id: String,
}

impl InstanceRef {
    /// Creates a new instance handle.
    #[must_use]
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }

    /// Returns the `(type, id)` pair used as a deduplication key.
    #[must_use]
    pub fn key(&self) -> (String, String) {
        (self.type_name.clone(), self.id.clone())
    }
}

/// The value of a relationship, as reported by the store.
///
/// Cardinality is intrinsic: a to-one relationship is `One` (possibly
/// empty), a to-many relationship is `Many` (possibly an empty list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Related {
    /// A to-one relationship: a single target or none.
    One(Option<InstanceRef>),
    /// A to-many relationship: zero or more targets.
    Many(Vec<InstanceRef>),
}

/// Errors raised at the store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store has no table for the given type.
    #[error("Store has no type named '{type_name}'")]
    UnknownType {
        /// The unknown type name.
        type_name: String,
    },

    /// The addressed row does not exist.
    #[error("No '{type_name}' row with id {id}")]
    NotFound {
        /// The type of the missing row.
        type_name: String,
        /// The id of the missing row.
        id: String,
    },

    /// The addressed field does not exist on the type.
    #[error("'{type_name}' has no field named '{field}'")]
    UnknownField {
        /// The type name.
        type_name: String,
        /// The unknown field name.
        field: String,
    },

    /// A data-integrity constraint was violated.
    ///
    /// Typically surfaced at commit time; the engine translates this into a
    /// validation error and rolls the transaction back.
    #[error("Constraint violated: {detail}")]
    Constraint {
        /// The violated constraint.
        detail: String,
    },

    /// The backend failed in a way the taxonomy cannot express.
    #[error("Store backend error: {detail}")]
    Backend {
        /// Backend-specific diagnostics.
        detail: String,
    },
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownType { type_name } => Self::ResourceTypeNotFound { type_name },
            StoreError::NotFound { type_name, id } => Self::ResourceNotFound { type_name, id },
            StoreError::UnknownField { type_name, field } => Self::NotAnAttribute { type_name, field },
            StoreError::Constraint { detail } | StoreError::Backend { detail } => {
                Self::Validation { detail }
            }
        }
    }
}

/// Abstract resource store consumed by the engine.
///
/// Implementations own instance lifecycle and transactional state. The
/// engine is single-threaded per request, so methods take `&mut self` for
/// mutation without interior locking.
pub trait ResourceStore {
    /// Fetches an instance by type and id, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownType`] for an unknown type name.
    fn fetch(&self, type_name: &str, id: &str) -> Result<Option<InstanceRef>, StoreError>;

    /// Returns the full collection for a type, in stable store order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownType`] for an unknown type name.
    fn query(&self, type_name: &str) -> Result<Vec<InstanceRef>, StoreError>;

    /// Reads a raw attribute value. Unset attributes read as JSON null.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the instance vanished.
    fn attribute(&self, instance: &InstanceRef, name: &str) -> Result<Value, StoreError>;

    /// Writes a raw attribute value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the instance vanished.
    fn set_attribute(
        &mut self,
        instance: &InstanceRef,
        name: &str,
        value: Value,
    ) -> Result<(), StoreError>;

    /// Reads a relationship's current linkage.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownField`] for an undeclared relationship.
    fn get_relationship(&self, instance: &InstanceRef, name: &str) -> Result<Related, StoreError>;

    /// Replaces a relationship's linkage wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Constraint`] on a cardinality mismatch.
    fn set_relationship(
        &mut self,
        instance: &InstanceRef,
        name: &str,
        value: Related,
    ) -> Result<(), StoreError>;

    /// Appends a member to a to-many relationship.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Constraint`] if the relationship is to-one.
    fn append_relationship(
        &mut self,
        instance: &InstanceRef,
        name: &str,
        value: &InstanceRef,
    ) -> Result<(), StoreError>;

    /// Removes a member from a to-many relationship. Removing an absent
    /// member is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Constraint`] if the relationship is to-one.
    fn remove_relationship(
        &mut self,
        instance: &InstanceRef,
        name: &str,
        value: &InstanceRef,
    ) -> Result<(), StoreError>;

    /// Creates a new instance, with a client-supplied id when given.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Constraint`] if the id is already taken.
    fn create(&mut self, type_name: &str, id: Option<&str>) -> Result<InstanceRef, StoreError>;

    /// Deletes an instance and prunes any linkage referencing it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the instance does not exist.
    fn delete(&mut self, instance: &InstanceRef) -> Result<(), StoreError>;

    /// Opens a transaction. Nested calls are absorbed into the outer one.
    fn begin(&mut self);

    /// Commits the open transaction, validating integrity constraints.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Constraint`] when validation fails; the
    /// transaction stays open so the caller can roll back.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Discards all changes since `begin`. No-op without an open transaction.
    fn rollback(&mut self);
}
