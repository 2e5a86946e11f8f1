//! Document collection command handlers
//!
//! Every command names a collection and the TOML schema file describing
//! it; documents, filters and patches are given as JSON objects.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;

use pewpi_core::{Collection, Query, Schema, Store};

use crate::output::Output;
use crate::prompt::confirm;

/// Load a schema from a TOML file
pub fn load_schema(path: &Path) -> Result<Schema> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file: {:?}", path))?;
    Schema::from_toml_str(&content)
        .with_context(|| format!("Failed to parse schema file: {:?}", path))
}

fn open(store: &Store, collection: &str, schema: &Path) -> Result<Collection> {
    if collection.is_empty() {
        bail!("Collection name cannot be empty");
    }
    Ok(store.collection(collection, load_schema(schema)?))
}

fn parse_object(json: &str, what: &str) -> Result<Value> {
    let value: Value =
        serde_json::from_str(json).with_context(|| format!("Invalid JSON in {}", what))?;
    if !value.is_object() {
        bail!("{} must be a JSON object", what);
    }
    Ok(value)
}

fn parse_query(filter: Option<&str>) -> Result<Query> {
    match filter {
        None => Ok(Query::all()),
        Some(json) => {
            let value = parse_object(json, "--where")?;
            Query::from_value(value).ok_or_else(|| anyhow!("--where must be a JSON object"))
        }
    }
}

/// Create a document
pub fn create(
    store: &Store,
    collection: &str,
    schema: &Path,
    data: &str,
    output: &Output,
) -> Result<()> {
    let mut docs = open(store, collection, schema)?;
    let record = docs
        .create(parse_object(data, "--data")?)
        .context("Failed to create document")?;

    output.success(&format!("Created document: {}", record.id));
    output.print_record(&record);
    Ok(())
}

/// Find documents
pub fn find(
    store: &Store,
    collection: &str,
    schema: &Path,
    filter: Option<&str>,
    one: bool,
    output: &Output,
) -> Result<()> {
    let docs = open(store, collection, schema)?;
    let query = parse_query(filter)?;

    if one {
        match docs.find_one(&query) {
            Some(record) => output.print_record(&record),
            None => bail!("No matching document in {}", collection),
        }
    } else {
        output.print_records(&docs.find(&query));
    }
    Ok(())
}

/// Update the first match, or every match with `many`
pub fn update(
    store: &Store,
    collection: &str,
    schema: &Path,
    filter: Option<&str>,
    patch: &str,
    many: bool,
    output: &Output,
) -> Result<()> {
    let mut docs = open(store, collection, schema)?;
    let query = parse_query(filter)?;
    let patch = parse_object(patch, "--set")?;

    if many {
        let count = docs
            .update_many(&query, patch)
            .context("Failed to update documents")?;
        output.success(&format!("Updated {} document(s)", count));
        output.print_count("updated", count);
    } else {
        match docs
            .update_one(&query, patch)
            .context("Failed to update document")?
        {
            Some(record) => {
                output.success(&format!("Updated document: {}", record.id));
                output.print_record(&record);
            }
            None => output.message("No matching document."),
        }
    }
    Ok(())
}

/// Delete the first match, or every match with `many`
pub fn delete(
    store: &Store,
    collection: &str,
    schema: &Path,
    filter: Option<&str>,
    many: bool,
    output: &Output,
) -> Result<()> {
    let mut docs = open(store, collection, schema)?;
    let query = parse_query(filter)?;

    if many {
        let count = docs
            .delete_many(&query)
            .context("Failed to delete documents")?;
        output.success(&format!("Deleted {} document(s)", count));
        output.print_count("deleted", count);
    } else {
        match docs
            .delete_one(&query)
            .context("Failed to delete document")?
        {
            Some(record) => {
                output.success(&format!("Deleted document: {}", record.id));
                output.print_record(&record);
            }
            None => output.message("No matching document."),
        }
    }
    Ok(())
}

/// Count matching documents
pub fn count(
    store: &Store,
    collection: &str,
    schema: &Path,
    filter: Option<&str>,
    output: &Output,
) -> Result<()> {
    let docs = open(store, collection, schema)?;
    let count = docs.count_documents(&parse_query(filter)?);
    output.print_count("document(s)", count);
    Ok(())
}

/// Remove every document
pub fn clear(
    store: &Store,
    collection: &str,
    schema: &Path,
    yes: bool,
    output: &Output,
) -> Result<()> {
    let mut docs = open(store, collection, schema)?;

    if !yes {
        if !output.should_prompt() {
            bail!("Refusing to clear {} without --yes", collection);
        }
        println!("This removes all {} document(s) from {}.", docs.len(), collection);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    docs.clear_all().context("Failed to clear collection")?;
    output.success(&format!("Cleared {}", collection));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const SCHEMA: &str = r#"
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
    "#;

    fn schema_file(temp_dir: &TempDir) -> PathBuf {
        let path = temp_dir.path().join("users.toml");
        std::fs::write(&path, SCHEMA).unwrap();
        path
    }

    fn quiet() -> Output {
        Output::new(OutputFormat::Quiet)
    }

    #[test]
    fn test_load_schema() {
        let temp_dir = TempDir::new().unwrap();
        let schema = load_schema(&schema_file(&temp_dir)).unwrap();
        assert_eq!(schema.len(), 3);

        assert!(load_schema(&temp_dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_create_update_delete() {
        let temp_dir = TempDir::new().unwrap();
        let schema = schema_file(&temp_dir);
        let store = Store::in_memory();

        create(&store, "users", &schema, r#"{"name": "Bo", "age": 30}"#, &quiet()).unwrap();
        assert!(create(&store, "users", &schema, r#"{"name": "B"}"#, &quiet()).is_err());

        let docs = store.collection("users", load_schema(&schema).unwrap());
        let bo = docs.find_one(&Query::all().eq("name", "Bo")).unwrap();
        assert_eq!(bo.get("role"), Some(serde_json::json!("user")));

        update(
            &store,
            "users",
            &schema,
            Some(r#"{"name": "Bo"}"#),
            r#"{"age": 31}"#,
            false,
            &quiet(),
        )
        .unwrap();
        let docs = store.collection("users", load_schema(&schema).unwrap());
        assert_eq!(
            docs.find_by_id(&bo.id).unwrap().get("age"),
            Some(serde_json::json!(31))
        );

        delete(&store, "users", &schema, Some(r#"{"name": "Bo"}"#), false, &quiet()).unwrap();
        let docs = store.collection("users", load_schema(&schema).unwrap());
        assert!(docs.is_empty());
    }

    #[test]
    fn test_rejects_non_object_arguments() {
        let temp_dir = TempDir::new().unwrap();
        let schema = schema_file(&temp_dir);
        let store = Store::in_memory();

        assert!(create(&store, "users", &schema, "[1, 2]", &quiet()).is_err());
        assert!(count(&store, "users", &schema, Some("\"name\""), &quiet()).is_err());
        assert!(find(&store, "users", &schema, Some("{oops"), false, &quiet()).is_err());
    }

    #[test]
    fn test_clear_requires_yes() {
        let temp_dir = TempDir::new().unwrap();
        let schema = schema_file(&temp_dir);
        let store = Store::in_memory();

        create(&store, "users", &schema, r#"{"name": "Al"}"#, &quiet()).unwrap();
        assert!(clear(&store, "users", &schema, false, &quiet()).is_err());
        clear(&store, "users", &schema, true, &quiet()).unwrap();

        let docs = store.collection("users", load_schema(&schema).unwrap());
        assert!(docs.is_empty());
    }
}
