//! Data models for PewPi collections
//!
//! A `Record` is a free-form JSON object plus three store-managed fields
//! (`id`, `createdAt`, `updatedAt`). A `Query` is an equality filter over
//! those fields.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// JSON object holding a record's user fields
pub type Fields = Map<String, Value>;

/// Names of the fields the store owns
pub mod keys {
    pub const ID: &str = "id";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";

    /// Whether `field` is store-managed
    pub fn is_managed(field: &str) -> bool {
        matches!(field, ID | CREATED_AT | UPDATED_AT)
    }
}

/// One stored document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Unique identifier, immutable after creation
    pub id: String,
    /// When this record was created
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// When this record was last mutated
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    /// User fields, including ones the schema does not declare
    #[serde(flatten)]
    pub fields: Fields,
}

impl Record {
    /// Create a record with a fresh ID and timestamps
    pub fn new(fields: Fields) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            fields,
        }
    }

    /// Read a field, managed fields included
    pub fn get(&self, field: &str) -> Option<Value> {
        match field {
            keys::ID => Some(Value::String(self.id.clone())),
            keys::CREATED_AT => serde_json::to_value(self.created_at).ok(),
            keys::UPDATED_AT => serde_json::to_value(self.updated_at).ok(),
            _ => self.fields.get(field).cloned(),
        }
    }

    /// Merge `patch` over the user fields and refresh `updated_at`
    ///
    /// Managed fields in the patch are ignored.
    pub fn apply_patch(&mut self, patch: &Fields) {
        for (field, value) in patch {
            if !keys::is_managed(field) {
                self.fields.insert(field.clone(), value.clone());
            }
        }
        self.touch();
    }

    /// Refresh `updated_at`, keeping it strictly increasing
    pub fn touch(&mut self) {
        self.updated_at = next_timestamp(self.updated_at);
    }

    /// Serialize to a single JSON object
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert(keys::ID.to_string(), Value::String(self.id.clone()));
        if let Some(created) = self.get(keys::CREATED_AT) {
            object.insert(keys::CREATED_AT.to_string(), created);
        }
        if let Some(updated) = self.get(keys::UPDATED_AT) {
            object.insert(keys::UPDATED_AT.to_string(), updated);
        }
        for (field, value) in &self.fields {
            object.insert(field.clone(), value.clone());
        }
        Value::Object(object)
    }
}

/// Current time, or one microsecond past `previous` if the clock has not moved
pub fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

/// Equality filter over record fields
///
/// An empty query matches every record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(Fields);

impl Query {
    /// Query matching every record
    pub fn all() -> Self {
        Self::default()
    }

    /// Add an equality condition
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Query matching a single ID
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::all().eq(keys::ID, id.into())
    }

    /// Build a query from a JSON value; `null` matches everything
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            Value::Null => Some(Self::all()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every condition holds for `record`
    pub fn matches(&self, record: &Record) -> bool {
        self.0.iter().all(|(field, expected)| {
            record
                .get(field)
                .map(|actual| values_equal(&actual, expected))
                .unwrap_or(false)
        })
    }
}

impl From<Fields> for Query {
    fn from(map: Fields) -> Self {
        Self(map)
    }
}

/// JSON equality with numbers compared by value (`30 == 30.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).map(|y| values_equal(x, y)).unwrap_or(false))
        }
        _ => a == b,
    }
}
