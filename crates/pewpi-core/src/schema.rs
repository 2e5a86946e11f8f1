//! Field-level validation rules for collections
//!
//! A `Schema` maps field names to `FieldSpec`s. Each spec carries a
//! `FieldType` with the constraints that make sense for that type, plus
//! the `required` flag and an optional default.
//!
//! Schemas can be written in TOML:
//!
//! ```toml
//! [fields.name]
//! type = "text"
//! required = true
//! min_length = 2
//!
//! [fields.role]
//! type = "text"
//! enum = ["user", "admin"]
//! default = "user"
//! ```
//!
//! Validation is pure. Fields the schema does not declare are left alone.

use std::collections::BTreeMap;
use std::fmt;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SchemaError, ValidationError};
use crate::models::Fields;

/// Value type of a field, with its type-specific constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
        #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
        one_of: Option<Vec<String>>,
    },
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
        one_of: Option<Vec<f64>>,
    },
    Boolean,
    /// RFC 3339 string or integer epoch milliseconds
    Timestamp,
}

impl FieldType {
    /// Name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Text { .. } => "Text",
            FieldType::Number { .. } => "Number",
            FieldType::Boolean => "Boolean",
            FieldType::Timestamp => "Timestamp",
        }
    }

    /// Whether `value` has this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::Text { .. } => value.is_string(),
            FieldType::Number { .. } => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Timestamp => match value {
                Value::String(s) => DateTime::parse_from_rfc3339(s).is_ok(),
                Value::Number(n) => n.is_i64() || n.is_u64(),
                _ => false,
            },
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Descriptor of one declared field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(flatten)]
    pub kind: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldSpec {
    fn of(kind: FieldType) -> Self {
        Self {
            kind,
            required: false,
            default: None,
        }
    }

    pub fn text() -> Self {
        Self::of(FieldType::Text {
            min_length: None,
            max_length: None,
            one_of: None,
        })
    }

    pub fn number() -> Self {
        Self::of(FieldType::Number {
            min: None,
            max: None,
            one_of: None,
        })
    }

    pub fn boolean() -> Self {
        Self::of(FieldType::Boolean)
    }

    pub fn timestamp() -> Self {
        Self::of(FieldType::Timestamp)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Value applied on create when the field is absent or null
    ///
    /// Not checked here; `Schema::check_defaults` and `Collection::create` do.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Minimum length in characters (text fields only)
    pub fn min_length(mut self, n: usize) -> Self {
        if let FieldType::Text { min_length, .. } = &mut self.kind {
            *min_length = Some(n);
        }
        self
    }

    /// Maximum length in characters (text fields only)
    pub fn max_length(mut self, n: usize) -> Self {
        if let FieldType::Text { max_length, .. } = &mut self.kind {
            *max_length = Some(n);
        }
        self
    }

    /// Inclusive lower bound (number fields only)
    pub fn min(mut self, bound: f64) -> Self {
        if let FieldType::Number { min, .. } = &mut self.kind {
            *min = Some(bound);
        }
        self
    }

    /// Inclusive upper bound (number fields only)
    pub fn max(mut self, bound: f64) -> Self {
        if let FieldType::Number { max, .. } = &mut self.kind {
            *max = Some(bound);
        }
        self
    }

    /// Restrict the field to a fixed set of values
    ///
    /// Values of the wrong JSON type for the field are dropped.
    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        match &mut self.kind {
            FieldType::Text { one_of, .. } => {
                *one_of = Some(
                    values
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                );
            }
            FieldType::Number { one_of, .. } => {
                *one_of = Some(values.iter().filter_map(Value::as_f64).collect());
            }
            FieldType::Boolean | FieldType::Timestamp => {}
        }
        self
    }

    /// Check one field value, appending messages to `errors`
    fn check(&self, field: &str, value: Option<&Value>, errors: &mut Vec<String>) {
        let value = match value {
            None | Some(Value::Null) => {
                if self.required {
                    errors.push(format!("{field} is required"));
                }
                return;
            }
            Some(value) => value,
        };

        if !self.kind.accepts(value) {
            errors.push(format!("{field} must be of type {}", self.kind));
            return;
        }

        match &self.kind {
            FieldType::Text {
                min_length,
                max_length,
                one_of,
            } => {
                let text = value.as_str().unwrap_or_default();
                let len = text.chars().count();
                if let Some(min) = min_length {
                    if len < *min {
                        errors.push(format!("{field} must be at least {min} characters"));
                    }
                }
                if let Some(max) = max_length {
                    if len > *max {
                        errors.push(format!("{field} must be at most {max} characters"));
                    }
                }
                if let Some(allowed) = one_of {
                    if !allowed.iter().any(|a| a == text) {
                        errors.push(format!("{field} must be one of: {}", allowed.join(", ")));
                    }
                }
            }
            FieldType::Number { min, max, one_of } => {
                let number = value.as_f64().unwrap_or_default();
                if let Some(min) = min {
                    if number < *min {
                        errors.push(format!("{field} must be at least {min}"));
                    }
                }
                if let Some(max) = max {
                    if number > *max {
                        errors.push(format!("{field} must be at most {max}"));
                    }
                }
                if let Some(allowed) = one_of {
                    if !allowed.contains(&number) {
                        let allowed: Vec<String> = allowed.iter().map(f64::to_string).collect();
                        errors.push(format!("{field} must be one of: {}", allowed.join(", ")));
                    }
                }
            }
            FieldType::Boolean | FieldType::Timestamp => {}
        }
    }
}

/// Outcome of validating a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Convert into a `Result`, failing on any error
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_valid {
            Ok(())
        } else {
            Err(ValidationError::new(self.errors))
        }
    }
}

/// Field-level contract of a collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    fields: BTreeMap<String, FieldSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    /// Parse a schema from TOML, rejecting defaults that break their own rules
    pub fn from_toml_str(content: &str) -> Result<Self, SchemaError> {
        let schema: Schema = toml::from_str(content)?;
        schema.check_defaults().into_result()?;
        Ok(schema)
    }

    /// Look up a declared field
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Declared fields in name order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate any JSON value as a full document
    pub fn validate(&self, candidate: &Value) -> ValidationResult {
        match candidate {
            Value::Object(fields) => self.validate_fields(fields),
            _ => ValidationResult::from_errors(vec!["document must be an object".to_string()]),
        }
    }

    /// Validate every declared field of a full document
    pub fn validate_fields(&self, candidate: &Fields) -> ValidationResult {
        let mut errors = Vec::new();
        for (name, spec) in &self.fields {
            spec.check(name, candidate.get(name), &mut errors);
        }
        ValidationResult::from_errors(errors)
    }

    /// Validate only the declared fields a patch touches
    pub fn validate_patch(&self, patch: &Fields) -> ValidationResult {
        let mut errors = Vec::new();
        for (name, value) in patch {
            if let Some(spec) = self.fields.get(name) {
                spec.check(name, Some(value), &mut errors);
            }
        }
        ValidationResult::from_errors(errors)
    }

    /// Validate every declared default against its own field
    pub fn check_defaults(&self) -> ValidationResult {
        let mut errors = Vec::new();
        for (name, spec) in &self.fields {
            if let Some(default) = &spec.default {
                spec.check(name, Some(default), &mut errors);
            }
        }
        ValidationResult::from_errors(errors)
    }

    /// Fill in defaults for declared fields that are missing from `fields`
    ///
    /// A null value counts as missing. Returns the validation of the
    /// defaults that were actually applied.
    pub fn apply_defaults(&self, fields: &mut Fields) -> ValidationResult {
        let mut errors = Vec::new();
        for (name, spec) in &self.fields {
            let Some(default) = &spec.default else {
                continue;
            };
            if fields.get(name).map_or(true, Value::is_null) {
                spec.check(name, Some(default), &mut errors);
                fields.insert(name.clone(), default.clone());
            }
        }
        ValidationResult::from_errors(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_schema() -> Schema {
        Schema::new()
            .field(
                "name",
                FieldSpec::text().required().min_length(2).max_length(50),
            )
            .field("email", FieldSpec::text().required())
            .field("age", FieldSpec::number().min(0.0).max(150.0))
            .field(
                "role",
                FieldSpec::text()
                    .one_of(["user", "admin", "moderator"])
                    .default_value("user"),
            )
            .field("active", FieldSpec::boolean().default_value(true))
    }

    #[test]
    fn test_required_field_missing() {
        let result = user_schema().validate(&json!({"email": "test@example.com"}));
        assert!(!result.is_valid);
        assert!(result.errors.contains(&"name is required".to_string()));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let result = user_schema().validate(&json!({"name": null, "email": "a@b.c"}));
        assert_eq!(result.errors, vec!["name is required"]);
    }

    #[test]
    fn test_type_mismatch() {
        let result = user_schema().validate(&json!({
            "name": "John",
            "email": "test@example.com",
            "age": "not a number"
        }));
        assert!(!result.is_valid);
        assert_eq!(result.errors, vec!["age must be of type Number"]);
    }

    #[test]
    fn test_number_bounds() {
        let schema = user_schema();

        let result = schema.validate(&json!({"name": "John", "email": "a@b.c", "age": 200}));
        assert_eq!(result.errors, vec!["age must be at most 150"]);

        let result = schema.validate(&json!({"name": "John", "email": "a@b.c", "age": -1}));
        assert_eq!(result.errors, vec!["age must be at least 0"]);

        // Bounds are inclusive
        let result = schema.validate(&json!({"name": "John", "email": "a@b.c", "age": 150}));
        assert!(result.is_valid);
    }

    #[test]
    fn test_text_length_mentions_characters() {
        let result = user_schema().validate(&json!({"name": "J", "email": "a@b.c"}));
        assert!(!result.is_valid);
        assert_eq!(result.errors, vec!["name must be at least 2 characters"]);

        let long = "x".repeat(51);
        let result = user_schema().validate(&json!({"name": long, "email": "a@b.c"}));
        assert_eq!(result.errors, vec!["name must be at most 50 characters"]);
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let schema = Schema::new().field("tag", FieldSpec::text().max_length(2));
        assert!(schema.validate(&json!({"tag": "éé"})).is_valid);
    }

    #[test]
    fn test_enum_violation() {
        let result = user_schema().validate(&json!({
            "name": "John",
            "email": "a@b.c",
            "role": "superuser"
        }));
        assert_eq!(
            result.errors,
            vec!["role must be one of: user, admin, moderator"]
        );
    }

    #[test]
    fn test_number_enum() {
        let schema = Schema::new().field("tier", FieldSpec::number().one_of([1, 5, 10]));
        assert!(schema.validate(&json!({"tier": 5})).is_valid);
        assert!(schema.validate(&json!({"tier": 5.0})).is_valid);
        assert!(schema
            .validate(&json!({"tier": 7}))
            .errors[0]
            .contains("one of"));
    }

    #[test]
    fn test_errors_accumulate() {
        let result = user_schema().validate(&json!({"name": "J", "age": 500, "active": "yes"}));
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 4);
        assert!(result.errors.contains(&"email is required".to_string()));
        assert!(result.errors.contains(&"active must be of type Boolean".to_string()));
    }

    #[test]
    fn test_valid_document() {
        let result = user_schema().validate(&json!({
            "name": "John Doe",
            "email": "john@example.com",
            "age": 30,
            "role": "admin",
            "nickname": "undeclared fields pass through"
        }));
        assert!(result.is_valid);
        assert!(result.errors.is_empty());
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn test_non_object_rejected() {
        let result = user_schema().validate(&json!([1, 2]));
        assert_eq!(result.errors, vec!["document must be an object"]);
    }

    #[test]
    fn test_timestamp_type() {
        let schema = Schema::new().field("at", FieldSpec::timestamp());
        assert!(schema.validate(&json!({"at": "2024-05-01T10:00:00Z"})).is_valid);
        assert!(schema.validate(&json!({"at": 1714557600000_i64})).is_valid);
        assert!(!schema.validate(&json!({"at": "yesterday"})).is_valid);
        assert!(!schema.validate(&json!({"at": 1.5})).is_valid);
    }

    #[test]
    fn test_validate_patch_only_checks_present_fields() {
        let schema = user_schema();
        let patch = json!({"age": 31}).as_object().cloned().unwrap();
        assert!(schema.validate_patch(&patch).is_valid);

        let patch = json!({"age": 999, "unknown": 1}).as_object().cloned().unwrap();
        assert_eq!(
            schema.validate_patch(&patch).errors,
            vec!["age must be at most 150"]
        );

        let patch = json!({"name": null}).as_object().cloned().unwrap();
        assert_eq!(schema.validate_patch(&patch).errors, vec!["name is required"]);
    }

    #[test]
    fn test_apply_defaults() {
        let mut fields = json!({"name": "Bo", "role": "admin"})
            .as_object()
            .cloned()
            .unwrap();
        user_schema().apply_defaults(&mut fields);

        assert_eq!(fields["role"], json!("admin"));
        assert_eq!(fields["active"], json!(true));
        assert!(!fields.contains_key("age"));
    }

    #[test]
    fn test_apply_defaults_replaces_null() {
        let mut fields = Fields::new();
        fields.insert("name".into(), json!("Bo"));
        fields.insert("role".into(), Value::Null);

        let result = user_schema().apply_defaults(&mut fields);
        assert!(result.is_valid);
        assert_eq!(fields["role"], json!("user"));
    }

    #[test]
    fn test_invalid_default_reported_when_applied() {
        let schema = Schema::new().field("tag", FieldSpec::text().one_of(["a"]).default_value("b"));
        assert_eq!(
            schema.check_defaults().errors,
            vec!["tag must be one of: a"]
        );

        let mut fields = Fields::new();
        let result = schema.apply_defaults(&mut fields);
        assert_eq!(result.errors, vec!["tag must be one of: a"]);

        // Not applied, not reported
        let mut fields = Fields::new();
        fields.insert("tag".into(), json!("a"));
        assert!(schema.apply_defaults(&mut fields).is_valid);
    }

    #[test]
    fn test_schema_from_toml_rejects_invalid_default() {
        let err = Schema::from_toml_str(
            r#"
            [fields.age]
            type = "number"
            min = 0
            default = -5
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDefault(_)));
        assert!(err.to_string().contains("age must be at least 0"));

        let err = Schema::from_toml_str("[fields.x]\ntype = \"colour\"").unwrap_err();
        assert!(matches!(err, SchemaError::Parse(_)));
    }

    #[test]
    fn test_validation_never_mutates_candidate() {
        let candidate = json!({"name": "J"});
        let before = candidate.clone();
        let _ = user_schema().validate(&candidate);
        assert_eq!(candidate, before);
    }

    #[test]
    fn test_schema_from_toml() {
        let schema = Schema::from_toml_str(
            r#"
            [fields.name]
            type = "text"
            required = true
            min_length = 2

            [fields.age]
            type = "number"
            min = 0
            max = 150

            [fields.role]
            type = "text"
            enum = ["user", "admin"]
            default = "user"

            [fields.active]
            type = "boolean"
            "#,
        )
        .unwrap();

        assert_eq!(schema.len(), 4);
        let name = schema.get("name").unwrap();
        assert!(name.required);
        assert_eq!(name, &FieldSpec::text().required().min_length(2));

        let role = schema.get("role").unwrap();
        assert_eq!(role.default, Some(json!("user")));
        assert_eq!(
            role.kind,
            FieldType::Text {
                min_length: None,
                max_length: None,
                one_of: Some(vec!["user".into(), "admin".into()]),
            }
        );

        assert_eq!(schema.get("age").unwrap(), &FieldSpec::number().min(0.0).max(150.0));
    }
}
