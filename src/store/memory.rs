//! Reference in-memory resource store.
//!
//! [`MemoryStore`] implements [`ResourceStore`](super::ResourceStore) over
//! plain maps with snapshot-based transactions. It backs the test suite and
//! is usable as an embedded backend for small deployments.
//!
//! # Example
//!
//! ```rust
//! use jsonapi_engine::store::{MemoryStore, ResourceStore};
//! use serde_json::json;
//!
//! let mut store = MemoryStore::new();
//! store.define_type("posts");
//! store.define_to_many("posts", "comments");
//!
//! let post = store
//!     .insert("posts", "1", json!({"title": "Hello"}))
//!     .unwrap();
//! assert_eq!(store.attribute(&post, "title").unwrap(), json!("Hello"));
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;

use super::{InstanceRef, Related, ResourceStore, StoreError};

#[derive(Debug, Clone, Default)]
struct Record {
    attributes: BTreeMap<String, Value>,
    relationships: BTreeMap<String, Related>,
}

#[derive(Debug, Clone, Default)]
struct Table {
    /// Insertion order of ids; `query` iterates in this order.
    order: Vec<String>,
    records: HashMap<String, Record>,
    to_one: BTreeSet<String>,
    to_many: BTreeSet<String>,
    required: BTreeSet<String>,
}

impl Table {
    fn blank_record(&self) -> Record {
        let mut relationships = BTreeMap::new();
        for name in &self.to_one {
            relationships.insert(name.clone(), Related::One(None));
        }
        for name in &self.to_many {
            relationships.insert(name.clone(), Related::Many(Vec::new()));
        }
        Record {
            attributes: BTreeMap::new(),
            relationships,
        }
    }
}

/// In-memory [`ResourceStore`] with snapshot transactions.
///
/// Types, relationship slots, and required attributes are declared up front
/// with [`define_type`](Self::define_type),
/// [`define_to_one`](Self::define_to_one),
/// [`define_to_many`](Self::define_to_many), and
/// [`require`](Self::require). Required attributes are validated at commit
/// time, mirroring deferred integrity checks in a relational backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, Table>,
    next_id: u64,
    snapshot: Option<BTreeMap<String, Table>>,
}

impl MemoryStore {
    /// Creates an empty store with no types defined.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
            next_id: 1,
            snapshot: None,
        }
    }

    /// Declares a type. Idempotent. Returns `&mut Self` for chaining.
    pub fn define_type(&mut self, type_name: &str) -> &mut Self {
        self.tables.entry(type_name.to_string()).or_default();
        self
    }

    /// Declares a to-one relationship slot on a type.
    pub fn define_to_one(&mut self, type_name: &str, name: &str) -> &mut Self {
        let table = self.tables.entry(type_name.to_string()).or_default();
        table.to_one.insert(name.to_string());
        for record in table.records.values_mut() {
            record
                .relationships
                .entry(name.to_string())
                .or_insert(Related::One(None));
        }
        self
    }

    /// Declares a to-many relationship slot on a type.
    pub fn define_to_many(&mut self, type_name: &str, name: &str) -> &mut Self {
        let table = self.tables.entry(type_name.to_string()).or_default();
        table.to_many.insert(name.to_string());
        for record in table.records.values_mut() {
            record
                .relationships
                .entry(name.to_string())
                .or_insert_with(|| Related::Many(Vec::new()));
        }
        self
    }

    /// Marks an attribute as required (non-null), validated at commit.
    pub fn require(&mut self, type_name: &str, attribute: &str) -> &mut Self {
        let table = self.tables.entry(type_name.to_string()).or_default();
        table.required.insert(attribute.to_string());
        self
    }

    /// Inserts a record with the given id and attribute object.
    ///
    /// Fixture convenience over [`create`](ResourceStore::create) plus
    /// [`set_attribute`](ResourceStore::set_attribute) calls.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownType`] for an undeclared type and
    /// [`StoreError::Constraint`] for a duplicate id or a non-object
    /// attribute value.
    pub fn insert(
        &mut self,
        type_name: &str,
        id: &str,
        attributes: Value,
    ) -> Result<InstanceRef, StoreError> {
        let Value::Object(attributes) = attributes else {
            return Err(StoreError::Constraint {
                detail: "insert expects a JSON object of attributes".to_string(),
            });
        };
        let instance = self.create(type_name, Some(id))?;
        for (name, value) in attributes {
            self.set_attribute(&instance, &name, value)?;
        }
        Ok(instance)
    }

    fn table(&self, type_name: &str) -> Result<&Table, StoreError> {
        self.tables
            .get(type_name)
            .ok_or_else(|| StoreError::UnknownType {
                type_name: type_name.to_string(),
            })
    }

    fn table_mut(&mut self, type_name: &str) -> Result<&mut Table, StoreError> {
        self.tables
            .get_mut(type_name)
            .ok_or_else(|| StoreError::UnknownType {
                type_name: type_name.to_string(),
            })
    }

    fn record(&self, instance: &InstanceRef) -> Result<&Record, StoreError> {
        self.table(&instance.type_name)?
            .records
            .get(&instance.id)
            .ok_or_else(|| StoreError::NotFound {
                type_name: instance.type_name.clone(),
                id: instance.id.clone(),
            })
    }

    fn record_mut(&mut self, instance: &InstanceRef) -> Result<&mut Record, StoreError> {
        let type_name = instance.type_name.clone();
        let id = instance.id.clone();
        self.table_mut(&type_name)?
            .records
            .get_mut(&id)
            .ok_or(StoreError::NotFound { type_name, id })
    }
}

impl ResourceStore for MemoryStore {
    fn fetch(&self, type_name: &str, id: &str) -> Result<Option<InstanceRef>, StoreError> {
        let table = self.table(type_name)?;
        Ok(table
            .records
            .contains_key(id)
            .then(|| InstanceRef::new(type_name, id)))
    }

    fn query(&self, type_name: &str) -> Result<Vec<InstanceRef>, StoreError> {
        let table = self.table(type_name)?;
        Ok(table
            .order
            .iter()
            .map(|id| InstanceRef::new(type_name, id.clone()))
            .collect())
    }

    fn attribute(&self, instance: &InstanceRef, name: &str) -> Result<Value, StoreError> {
        let record = self.record(instance)?;
        Ok(record.attributes.get(name).cloned().unwrap_or(Value::Null))
    }

    fn set_attribute(
        &mut self,
        instance: &InstanceRef,
        name: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        let record = self.record_mut(instance)?;
        record.attributes.insert(name.to_string(), value);
        Ok(())
    }

    fn get_relationship(&self, instance: &InstanceRef, name: &str) -> Result<Related, StoreError> {
        let record = self.record(instance)?;
        record
            .relationships
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownField {
                type_name: instance.type_name.clone(),
                field: name.to_string(),
            })
    }

    fn set_relationship(
        &mut self,
        instance: &InstanceRef,
        name: &str,
        value: Related,
    ) -> Result<(), StoreError> {
        let current = self.get_relationship(instance, name)?;
        match (&current, &value) {
            (Related::One(_), Related::One(_)) | (Related::Many(_), Related::Many(_)) => {}
            _ => {
                return Err(StoreError::Constraint {
                    detail: format!(
                        "cardinality mismatch writing relationship '{name}' on '{}'",
                        instance.type_name
                    ),
                })
            }
        }
        let record = self.record_mut(instance)?;
        record.relationships.insert(name.to_string(), value);
        Ok(())
    }

    fn append_relationship(
        &mut self,
        instance: &InstanceRef,
        name: &str,
        value: &InstanceRef,
    ) -> Result<(), StoreError> {
        match self.get_relationship(instance, name)? {
            Related::Many(mut members) => {
                if !members.contains(value) {
                    members.push(value.clone());
                }
                let record = self.record_mut(instance)?;
                record
                    .relationships
                    .insert(name.to_string(), Related::Many(members));
                Ok(())
            }
            Related::One(_) => Err(StoreError::Constraint {
                detail: format!(
                    "cannot append to to-one relationship '{name}' on '{}'",
                    instance.type_name
                ),
            }),
        }
    }

    fn remove_relationship(
        &mut self,
        instance: &InstanceRef,
        name: &str,
        value: &InstanceRef,
    ) -> Result<(), StoreError> {
        match self.get_relationship(instance, name)? {
            Related::Many(mut members) => {
                members.retain(|member| member != value);
                let record = self.record_mut(instance)?;
                record
                    .relationships
                    .insert(name.to_string(), Related::Many(members));
                Ok(())
            }
            Related::One(_) => Err(StoreError::Constraint {
                detail: format!(
                    "cannot remove from to-one relationship '{name}' on '{}'",
                    instance.type_name
                ),
            }),
        }
    }

    fn create(&mut self, type_name: &str, id: Option<&str>) -> Result<InstanceRef, StoreError> {
        // Generate before borrowing the table mutably.
        let generated;
        let id = match id {
            Some(id) => id,
            None => {
                let table = self.table(type_name)?;
                let mut candidate = self.next_id;
                while table.records.contains_key(&candidate.to_string()) {
                    candidate += 1;
                }
                self.next_id = candidate + 1;
                generated = candidate.to_string();
                &generated
            }
        };
        let table = self.table_mut(type_name)?;
        if table.records.contains_key(id) {
            return Err(StoreError::Constraint {
                detail: format!("'{type_name}' id {id} already exists"),
            });
        }
        let record = table.blank_record();
        table.records.insert(id.to_string(), record);
        table.order.push(id.to_string());
        Ok(InstanceRef::new(type_name, id))
    }

    fn delete(&mut self, instance: &InstanceRef) -> Result<(), StoreError> {
        {
            let table = self.table_mut(&instance.type_name)?;
            if table.records.remove(&instance.id).is_none() {
                return Err(StoreError::NotFound {
                    type_name: instance.type_name.clone(),
                    id: instance.id.clone(),
                });
            }
            table.order.retain(|id| id != &instance.id);
        }
        // Prune dangling linkage across every table.
        for table in self.tables.values_mut() {
            for record in table.records.values_mut() {
                for slot in record.relationships.values_mut() {
                    match slot {
                        Related::One(target) => {
                            if target.as_ref() == Some(instance) {
                                *target = None;
                            }
                        }
                        Related::Many(members) => members.retain(|member| member != instance),
                    }
                }
            }
        }
        Ok(())
    }

    fn begin(&mut self) {
        if self.snapshot.is_none() {
            self.snapshot = Some(self.tables.clone());
        }
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        for (type_name, table) in &self.tables {
            for attribute in &table.required {
                for (id, record) in &table.records {
                    let value = record.attributes.get(attribute).unwrap_or(&Value::Null);
                    if value.is_null() {
                        return Err(StoreError::Constraint {
                            detail: format!(
                                "'{attribute}' may not be null on '{type_name}' {id}"
                            ),
                        });
                    }
                }
            }
        }
        self.snapshot = None;
        Ok(())
    }

    fn rollback(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.tables = snapshot;
        }
    }
}

// Verify MemoryStore is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<MemoryStore>();
};
