//! Schema-validated document collection
//!
//! A `Collection` owns an ordered list of records bound to a schema and a
//! storage key. Reads are served from memory. Every mutation validates,
//! then writes the whole collection, then commits the change to memory.
//!
//! ## Write policy
//!
//! Mutations are staged on a copy of the records. The staged copy is
//! persisted first and only replaces the in-memory records if the write
//! succeeds, so a `PersistenceError` leaves memory equal to what is
//! durably stored.
//!
//! ## Usage
//!
//! ```ignore
//! let mut users = Collection::open(schema, "users", storage, "pewpi_model");
//! let bo = users.create(json!({"name": "Bo", "age": 30}))?;
//! let admins = users.find(&Query::all().eq("role", "admin"));
//! ```

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::error::{ModelError, PersistenceError, ValidationError};
use crate::models::{keys, Fields, Query, Record};
use crate::schema::{Schema, ValidationResult};
use crate::storage::{CollectionPersistence, KeyValueStore};

/// An ordered, persisted set of records sharing one schema
pub struct Collection {
    /// Collection name (without namespace)
    name: String,
    /// Field rules, fixed for the collection's lifetime
    schema: Arc<Schema>,
    /// Records in insertion order
    records: Vec<Record>,
    /// Backend binding
    persistence: CollectionPersistence,
}

impl Collection {
    /// Open a collection, hydrating it from storage
    pub fn open(
        schema: impl Into<Arc<Schema>>,
        name: impl Into<String>,
        storage: Arc<dyn KeyValueStore>,
        namespace: &str,
    ) -> Self {
        let name = name.into();
        let persistence = CollectionPersistence::new(storage, namespace, &name);
        let records = persistence.load();
        Self {
            name,
            schema: schema.into(),
            records,
            persistence,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Storage key backing this collection
    pub fn storage_key(&self) -> &str {
        self.persistence.key()
    }

    /// Validate a candidate document against the schema
    pub fn validate(&self, candidate: &Value) -> ValidationResult {
        self.schema.validate(candidate)
    }

    /// Re-read the collection from storage, discarding memory
    pub fn reload(&mut self) {
        self.records = self.persistence.load();
    }

    // ==================== Create ====================

    /// Validate, apply defaults, assign ID and timestamps, then store
    pub fn create(&mut self, data: Value) -> Result<Record, ModelError> {
        let mut fields = into_fields(data)?;
        self.schema.validate_fields(&fields).into_result()?;

        fields.retain(|field, _| !keys::is_managed(field));
        self.schema.apply_defaults(&mut fields).into_result()?;

        let record = Record::new(fields);
        let mut staged = self.records.clone();
        staged.push(record.clone());
        self.commit(staged)?;

        Ok(record)
    }

    // ==================== Query ====================

    /// All records matching `query`, in collection order
    pub fn find(&self, query: &Query) -> Vec<Record> {
        self.records
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect()
    }

    /// Every record
    pub fn find_all(&self) -> Vec<Record> {
        self.records.clone()
    }

    /// First record matching `query`
    pub fn find_one(&self, query: &Query) -> Option<Record> {
        self.records.iter().find(|r| query.matches(r)).cloned()
    }

    /// Record with the given ID
    pub fn find_by_id(&self, id: &str) -> Option<Record> {
        self.records.iter().find(|r| r.id == id).cloned()
    }

    /// Number of records matching `query`
    pub fn count_documents(&self, query: &Query) -> usize {
        self.records.iter().filter(|r| query.matches(r)).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // ==================== Update ====================

    /// Merge `patch` into the first match
    ///
    /// Returns `None` if nothing matched.
    pub fn update_one(&mut self, query: &Query, patch: Value) -> Result<Option<Record>, ModelError> {
        let Some(index) = self.records.iter().position(|r| query.matches(r)) else {
            return Ok(None);
        };
        let patch = self.checked_patch(patch)?;

        let mut staged = self.records.clone();
        staged[index].apply_patch(&patch);
        let updated = staged[index].clone();
        self.commit(staged)?;

        Ok(Some(updated))
    }

    /// Merge `patch` into every match, returning how many changed
    pub fn update_many(&mut self, query: &Query, patch: Value) -> Result<usize, ModelError> {
        if !self.records.iter().any(|r| query.matches(r)) {
            return Ok(0);
        }
        let patch = self.checked_patch(patch)?;

        let mut staged = self.records.clone();
        let mut count = 0;
        for record in staged.iter_mut().filter(|r| query.matches(r)) {
            record.apply_patch(&patch);
            count += 1;
        }
        self.commit(staged)?;

        Ok(count)
    }

    /// Validate the declared fields a patch sets, dropping managed fields
    fn checked_patch(&self, patch: Value) -> Result<Fields, ValidationError> {
        let mut patch = into_fields(patch)?;
        patch.retain(|field, _| !keys::is_managed(field));
        self.schema.validate_patch(&patch).into_result()?;
        Ok(patch)
    }

    // ==================== Delete ====================

    /// Remove the first match, returning it
    pub fn delete_one(&mut self, query: &Query) -> Result<Option<Record>, PersistenceError> {
        let Some(index) = self.records.iter().position(|r| query.matches(r)) else {
            return Ok(None);
        };

        let mut staged = self.records.clone();
        let removed = staged.remove(index);
        self.commit(staged)?;

        Ok(Some(removed))
    }

    /// Remove every match, returning how many were removed
    pub fn delete_many(&mut self, query: &Query) -> Result<usize, PersistenceError> {
        let staged: Vec<Record> = self
            .records
            .iter()
            .filter(|r| !query.matches(r))
            .cloned()
            .collect();
        let removed = self.records.len() - staged.len();
        if removed == 0 {
            return Ok(0);
        }

        self.commit(staged)?;
        Ok(removed)
    }

    /// Empty the collection and persist the empty state
    pub fn clear_all(&mut self) -> Result<(), PersistenceError> {
        self.commit(Vec::new())?;
        info!(key = %self.storage_key(), "Cleared collection");
        Ok(())
    }

    // ==================== Restore ====================

    /// Replace the whole collection with previously exported records
    ///
    /// Each record's user fields must satisfy the schema. IDs must be
    /// unique. Timestamps are kept as given.
    pub fn restore(&mut self, records: Vec<Record>) -> Result<usize, ModelError> {
        let mut errors = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for record in &records {
            if !seen.insert(record.id.as_str()) {
                errors.push(format!("id {} is duplicated", record.id));
            }
            let result = self.schema.validate_fields(&record.fields);
            errors.extend(
                result
                    .errors
                    .into_iter()
                    .map(|e| format!("record {}: {e}", record.id)),
            );
        }
        if !errors.is_empty() {
            return Err(ValidationError::new(errors).into());
        }

        let count = records.len();
        self.commit(records)?;
        info!(key = %self.storage_key(), count, "Restored collection");
        Ok(count)
    }

    /// Persist `staged`, then make it the in-memory state
    fn commit(&mut self, staged: Vec<Record>) -> Result<(), PersistenceError> {
        self.persistence.save(&staged)?;
        self.records = staged;
        Ok(())
    }
}

/// Unwrap a JSON object, rejecting anything else
fn into_fields(value: Value) -> Result<Fields, ValidationError> {
    match value {
        Value::Object(fields) => Ok(fields),
        _ => Err(ValidationError::new(vec![
            "document must be an object".to_string(),
        ])),
    }
}
